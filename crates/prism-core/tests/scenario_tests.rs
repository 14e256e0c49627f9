// SPDX-License-Identifier: Apache-2.0

//! End-to-end scenarios: literal patches through compile and eval.

#![allow(missing_docs)]

use std::sync::Arc;

use prism_core::block::{publish_reserved, BlockRegistry};
use prism_core::combine::{CombineMode, CombinePolicy, CombineWhen};
use prism_core::compile::compile;
use prism_core::eval::Evaluator;
use prism_core::transform::TransformRegistry;
use prism_core::{
    classify_edit, make_block_id, make_edge_id, Block, DiagCode, Edge, EditClass, Patch, PortRef,
    SwapBoundary, SwapScheduler, TimeModel, Value,
};

fn registries() -> (BlockRegistry, TransformRegistry) {
    (
        BlockRegistry::with_system_blocks().expect("system blocks"),
        TransformRegistry::with_catalog().expect("transform catalog"),
    )
}

fn with_cycle_root(period_ms: f64) -> Patch {
    let mut patch = Patch::new();
    let root = make_block_id("root");
    patch
        .add_block(
            Block::new(root, "cycleTimeRoot").with_param("periodMs", Value::Duration(period_ms)),
        )
        .expect("add root");
    publish_reserved(&mut patch, &root).expect("publish");
    patch
}

// S1: scalar const wired to a signal input compiles via exactly one
// auto-inserted adapter and the oscillator starts at phase zero.
#[test]
fn s1_const_to_signal_auto_adapter() {
    let (blocks, transforms) = registries();
    let mut patch = with_cycle_root(1000.0);
    let c = make_block_id("c");
    let osc = make_block_id("osc");
    patch
        .add_block(Block::new(c, "const").with_param("value", Value::Number(5.0)))
        .expect("add const");
    patch.add_block(Block::new(osc, "oscillator")).expect("add osc");
    patch
        .add_edge(Edge::new(
            make_edge_id("e"),
            PortRef::new(c, "out"),
            PortRef::new(osc, "frequency"),
        ))
        .expect("add edge");

    let program = compile(&patch, &blocks, &transforms).expect("compile must succeed");
    assert_eq!(program.synthesized_adapters, 1);

    let mut eval = Evaluator::new(Arc::new(program));
    eval.step(0.0);
    assert_eq!(eval.output(&osc, "phase"), Some(Value::Phase(0.0)));
}

// S2: an energy bus with sum combine adds its writers; permuting sort keys
// keeps the sum but swaps the combine node's input order.
#[test]
fn s2_bus_combine_sum() {
    let (blocks, transforms) = registries();

    let build = |key_a: u32, key_b: u32| {
        let mut patch = with_cycle_root(1000.0);
        let energy = make_block_id("energy-bus");
        let mut bus = Block::new(energy, "bus.float").with_tag("energy");
        bus.hidden = true;
        bus.role = Some(prism_core::BlockRole::Bus);
        bus.combine.insert(
            "in".to_owned(),
            CombinePolicy {
                when: CombineWhen::Always,
                mode: CombineMode::Sum,
            },
        );
        patch.add_block(bus).expect("add bus");
        for (label, value, key) in [("w1", 2.0, key_a), ("w2", 3.0, key_b)] {
            let id = make_block_id(label);
            patch
                .add_block(Block::new(id, "const").with_param("value", Value::Number(value)))
                .expect("add writer");
            patch
                .add_edge(
                    Edge::new(
                        make_edge_id(label),
                        PortRef::new(id, "out"),
                        PortRef::new(energy, "in"),
                    )
                    .with_sort_key(key),
                )
                .expect("add write edge");
        }
        compile(&patch, &blocks, &transforms).expect("compile must succeed")
    };

    // Writer order inside the sum combine node follows `(sort_key, id)`.
    let combine_inputs = |program: &prism_core::compile::CompiledProgram| -> Vec<f64> {
        program
            .nodes
            .iter()
            .find_map(|node| match node {
                prism_core::ir::IrNode::Combine {
                    mode: CombineMode::Sum,
                    srcs,
                } => Some(
                    srcs.iter()
                        .filter_map(|src| match &program.nodes[src.index()] {
                            prism_core::ir::IrNode::Const { const_id } => program
                                .const_pool
                                .get(*const_id as usize)
                                .and_then(Value::as_f64),
                            _ => None,
                        })
                        .collect(),
                ),
                _ => None,
            })
            .expect("expected a sum combine node")
    };

    let forward = build(1, 2);
    assert_eq!(combine_inputs(&forward), vec![2.0, 3.0]);
    let mut eval = Evaluator::new(Arc::new(forward));
    eval.step(16.0);
    assert_eq!(eval.tap("energy"), Some(Value::Number(5.0)));

    let swapped = build(2, 1);
    assert_eq!(combine_inputs(&swapped), vec![3.0, 2.0]);
    let mut eval = Evaluator::new(Arc::new(swapped));
    eval.step(16.0);
    assert_eq!(eval.tap("energy"), Some(Value::Number(5.0)));
}

// S3: two writers under `latest` resolve to the higher sort key's value.
#[test]
fn s3_multi_writer_latest() {
    let (blocks, transforms) = registries();
    let mut patch = with_cycle_root(1000.0);
    let w1 = make_block_id("w1");
    let w2 = make_block_id("w2");
    let sink = make_block_id("sink");
    patch
        .add_block(Block::new(w1, "const").with_param("value", Value::Number(1.0)))
        .expect("add w1");
    patch
        .add_block(Block::new(w2, "const").with_param("value", Value::Number(9.0)))
        .expect("add w2");
    patch.add_block(Block::new(sink, "add")).expect("add sink");
    patch
        .add_edge(
            Edge::new(
                make_edge_id("e1"),
                PortRef::new(w1, "out"),
                PortRef::new(sink, "a"),
            )
            .with_sort_key(10),
        )
        .expect("edge 1");
    patch
        .add_edge(
            Edge::new(
                make_edge_id("e2"),
                PortRef::new(w2, "out"),
                PortRef::new(sink, "a"),
            )
            .with_sort_key(20),
        )
        .expect("edge 2");

    let program = compile(&patch, &blocks, &transforms).expect("compile must succeed");
    let mut eval = Evaluator::new(Arc::new(program));
    eval.step(16.0);
    // `a` resolves to the sortKey=20 writer; `b` defaults to 0.
    assert_eq!(eval.output(&sink, "out"), Some(Value::Number(9.0)));
}

// S4: cyclic time root fixes the model and phaseA wraps with the cycle.
#[test]
fn s4_cyclic_time() {
    let (blocks, transforms) = registries();
    let patch = with_cycle_root(1000.0);
    let program = compile(&patch, &blocks, &transforms).expect("compile must succeed");
    assert!(matches!(
        program.time_model,
        TimeModel::Cyclic { period_ms, .. } if (period_ms - 1000.0).abs() < f64::EPSILON
    ));
    assert!(program.ui_bindings.phase_a.is_some());

    let mut eval = Evaluator::new(Arc::new(program));
    eval.step(250.0);
    assert_eq!(eval.tap("phaseA"), Some(Value::Phase(0.25)));
    eval.step(1000.0);
    assert_eq!(eval.tap("phaseA"), Some(Value::Phase(0.25)));
}

// S5: a memoryless two-block loop fails with FB-301 and names the cycle.
#[test]
fn s5_illegal_feedback() {
    let (blocks, transforms) = registries();
    let mut patch = with_cycle_root(1000.0);
    let a = make_block_id("a");
    let b = make_block_id("b");
    patch.add_block(Block::new(a, "add")).expect("add a");
    patch.add_block(Block::new(b, "add")).expect("add b");
    patch
        .add_edge(Edge::new(
            make_edge_id("ab"),
            PortRef::new(a, "out"),
            PortRef::new(b, "a"),
        ))
        .expect("edge ab");
    patch
        .add_edge(Edge::new(
            make_edge_id("ba"),
            PortRef::new(b, "out"),
            PortRef::new(a, "a"),
        ))
        .expect("edge ba");

    let diags = compile(&patch, &blocks, &transforms).expect_err("compile must fail");
    let feedback = diags
        .iter()
        .find(|d| d.code == DiagCode::IllegalFeedback)
        .expect("expected FB-301");
    let mut expected = vec![a, b];
    expected.sort_unstable();
    assert!(feedback.locations.iter().any(
        |l| matches!(l, prism_core::GraphLoc::Scc(members) if *members == expected)
    ));
}

// S6: removing and re-adding a stateless edge is Class B and the running
// integral survives both swaps.
#[test]
fn s6_hot_swap_class_b_preserves_state() {
    let (blocks, transforms) = registries();
    let mut patch = with_cycle_root(1000.0);
    let c = make_block_id("c");
    let i = make_block_id("i");
    let probe = make_block_id("probe");
    patch
        .add_block(Block::new(c, "const").with_param("value", Value::Number(2.0)))
        .expect("add const");
    patch.add_block(Block::new(i, "integrate")).expect("add integrator");
    patch.add_block(Block::new(probe, "add")).expect("add probe");
    patch
        .add_edge(Edge::new(
            make_edge_id("ci"),
            PortRef::new(c, "out"),
            PortRef::new(i, "in"),
        ))
        .expect("edge ci");
    let stateless_edge = make_edge_id("ip");
    patch
        .add_edge(Edge::new(
            stateless_edge,
            PortRef::new(i, "out"),
            PortRef::new(probe, "a"),
        ))
        .expect("edge ip");

    let original = Arc::new(compile(&patch, &blocks, &transforms).expect("compile"));
    let mut eval = Evaluator::new(Arc::clone(&original));
    eval.step(500.0);
    eval.step(500.0); // committed integral: 2.0

    // Remove the stateless probe edge.
    let mut without = patch.clone();
    without.remove_edge(&stateless_edge).expect("remove edge");
    let removed = Arc::new(compile(&without, &blocks, &transforms).expect("compile"));
    assert_eq!(
        classify_edit(&patch, &without, &original, &removed),
        EditClass::B
    );

    let mut sched = SwapScheduler::new();
    sched
        .submit(Arc::clone(&removed), EditClass::B, Some(SwapBoundary::NextFrame))
        .expect("submit");
    sched.try_commit(&mut eval, false).expect("commit swap");
    eval.step(500.0);
    assert_eq!(eval.output(&i, "out"), Some(Value::Number(2.0)));

    // Re-add the same edge between the same ports.
    let readded = Arc::new(compile(&patch, &blocks, &transforms).expect("compile"));
    assert_eq!(
        classify_edit(&without, &patch, &removed, &readded),
        EditClass::B
    );
    sched
        .submit(Arc::clone(&readded), EditClass::B, Some(SwapBoundary::NextFrame))
        .expect("submit");
    sched.try_commit(&mut eval, false).expect("commit swap");
    eval.step(500.0);
    // The integral grows 1.0 per half-second frame and survived both
    // swaps: frames 1-4 show 0, 1, 2, 3.
    assert_eq!(eval.output(&i, "out"), Some(Value::Number(3.0)));
}
