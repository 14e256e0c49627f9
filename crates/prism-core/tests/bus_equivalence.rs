// SPDX-License-Identifier: Apache-2.0

//! Bus rewrite law: a bus is semantically a per-input combine. Routing
//! writers through a bus block or straight into the reader with the same
//! policy must produce the same values and the same combine structure.

#![allow(missing_docs)]

use std::sync::Arc;

use prism_core::block::{publish_reserved, BlockRegistry};
use prism_core::combine::{CombineMode, CombinePolicy, CombineWhen};
use prism_core::compile::{compile, CompiledProgram};
use prism_core::eval::Evaluator;
use prism_core::ir::IrNode;
use prism_core::transform::TransformRegistry;
use prism_core::{make_block_id, make_edge_id, Block, BlockRole, Patch, PortRef, Value};

fn registries() -> (BlockRegistry, TransformRegistry) {
    (
        BlockRegistry::with_system_blocks().expect("system blocks"),
        TransformRegistry::with_catalog().expect("transform catalog"),
    )
}

fn base() -> Patch {
    let mut patch = Patch::new();
    let root = make_block_id("root");
    patch
        .add_block(
            Block::new(root, "cycleTimeRoot").with_param("periodMs", Value::Duration(1000.0)),
        )
        .expect("root");
    publish_reserved(&mut patch, &root).expect("publish");
    for (label, value) in [("w1", 2.0), ("w2", 3.0)] {
        patch
            .add_block(
                Block::new(make_block_id(label), "const").with_param("value", Value::Number(value)),
            )
            .expect("writer");
    }
    patch
        .add_block(Block::new(make_block_id("reader"), "add"))
        .expect("reader");
    patch
}

fn wire(patch: &mut Patch, label: &str, from: &str, from_slot: &str, to: &str, to_slot: &str, key: u32) {
    patch
        .add_edge(
            prism_core::Edge::new(
                make_edge_id(label),
                PortRef::new(make_block_id(from), from_slot),
                PortRef::new(make_block_id(to), to_slot),
            )
            .with_sort_key(key),
        )
        .expect("edge");
}

fn sum_policy() -> CombinePolicy {
    CombinePolicy {
        when: CombineWhen::Always,
        mode: CombineMode::Sum,
    }
}

/// Writers → bus → reader.
fn via_bus() -> Patch {
    let mut patch = base();
    let bus = make_block_id("bus");
    let mut bus_block = Block::new(bus, "bus.float").with_role(BlockRole::Bus);
    bus_block.hidden = true;
    bus_block.combine.insert("in".to_owned(), sum_policy());
    patch.add_block(bus_block).expect("bus");
    wire(&mut patch, "w1b", "w1", "out", "bus", "in", 1);
    wire(&mut patch, "w2b", "w2", "out", "bus", "in", 2);
    wire(&mut patch, "br", "bus", "out", "reader", "a", 1);
    patch
}

/// Writers → reader directly, identical combine policy on the input.
fn direct() -> Patch {
    let mut patch = base();
    let reader = make_block_id("reader");
    patch
        .set_combine(&reader, "a", sum_policy())
        .expect("combine override");
    wire(&mut patch, "w1r", "w1", "out", "reader", "a", 1);
    wire(&mut patch, "w2r", "w2", "out", "reader", "a", 2);
    patch
}

fn sum_combine_count(program: &CompiledProgram) -> usize {
    program
        .nodes
        .iter()
        .filter(|n| {
            matches!(
                n,
                IrNode::Combine {
                    mode: CombineMode::Sum,
                    ..
                }
            )
        })
        .count()
}

#[test]
fn bus_and_direct_routing_agree() {
    let (blocks, transforms) = registries();
    let reader = make_block_id("reader");

    let bus_program = Arc::new(compile(&via_bus(), &blocks, &transforms).expect("compile bus"));
    let direct_program =
        Arc::new(compile(&direct(), &blocks, &transforms).expect("compile direct"));

    // Same combine structure: one sum node over the two writers.
    assert_eq!(sum_combine_count(&bus_program), 1);
    assert_eq!(sum_combine_count(&direct_program), 1);

    let mut bus_eval = Evaluator::new(bus_program);
    let mut direct_eval = Evaluator::new(direct_program);
    for _ in 0..8 {
        bus_eval.step(16.0);
        direct_eval.step(16.0);
        assert_eq!(
            bus_eval.output(&reader, "out"),
            direct_eval.output(&reader, "out")
        );
    }
    assert_eq!(
        bus_eval.output(&reader, "out"),
        Some(Value::Number(5.0))
    );
}
