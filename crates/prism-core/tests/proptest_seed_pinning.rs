// SPDX-License-Identifier: Apache-2.0

#![allow(missing_docs)]
use std::sync::Arc;

use proptest::prelude::*;
use proptest::test_runner::{Config as PropConfig, RngAlgorithm, TestRng, TestRunner};

use prism_core::block::{publish_reserved, BlockRegistry};
use prism_core::compile::compile;
use prism_core::eval::Evaluator;
use prism_core::transform::TransformRegistry;
use prism_core::{make_block_id, make_edge_id, Block, Edge, Patch, PortRef, Value};

// Demonstrates how to pin a deterministic seed for property tests so
// failures are reproducible across machines and CI.
//
// To re-run with a different seed locally, you can set PROPTEST_SEED, e.g.:
//   PROPTEST_SEED=0000000000000000000000000000000000000000000000000000000000000042 cargo test -p prism-core -- proptest_seed_pinned_compile_eval

fn build_patch(period_ms: f64, freq: f64, gain: f64) -> Patch {
    let mut patch = Patch::new();
    let root = make_block_id("root");
    patch
        .add_block(
            Block::new(root, "cycleTimeRoot").with_param("periodMs", Value::Duration(period_ms)),
        )
        .expect("root");
    publish_reserved(&mut patch, &root).expect("publish");

    let c = make_block_id("freq");
    let osc = make_block_id("osc");
    let amp = make_block_id("amp");
    patch
        .add_block(Block::new(c, "const").with_param("value", Value::Number(freq)))
        .expect("const");
    patch.add_block(Block::new(osc, "oscillator")).expect("osc");
    patch
        .add_block(Block::new(amp, "const").with_param("value", Value::Number(gain)))
        .expect("amp");
    let mul = make_block_id("mul");
    patch.add_block(Block::new(mul, "multiply")).expect("mul");
    patch
        .add_edge(Edge::new(
            make_edge_id("cf"),
            PortRef::new(c, "out"),
            PortRef::new(osc, "frequency"),
        ))
        .expect("edge");
    patch
        .add_edge(Edge::new(
            make_edge_id("om"),
            PortRef::new(osc, "out"),
            PortRef::new(mul, "a"),
        ))
        .expect("edge");
    patch
        .add_edge(Edge::new(
            make_edge_id("am"),
            PortRef::new(amp, "out"),
            PortRef::new(mul, "b"),
        ))
        .expect("edge");
    patch
}

#[test]
fn proptest_seed_pinned_compile_eval() {
    const SEED_BYTES: [u8; 32] = [
        0x42, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        0, 0, 0,
    ];

    let rng = TestRng::from_seed(RngAlgorithm::ChaCha, &SEED_BYTES);
    let mut runner = TestRunner::new_with_rng(PropConfig::default(), rng);

    let blocks = BlockRegistry::with_system_blocks().expect("system blocks");
    let transforms = TransformRegistry::with_catalog().expect("catalog");

    // Strategy: sane, finite parameters (the compiler itself must not care,
    // but the assertion compares bit patterns across two full pipelines).
    let scalar = (1.0f64..4000.0).prop_filter("finite", |v| v.is_finite());
    let prop = (scalar.clone(), scalar.clone(), scalar);

    runner
        .run(&prop, |(period_ms, freq, gain)| {
            let patch = build_patch(period_ms, freq, gain);
            let a = compile(&patch, &blocks, &transforms).expect("compile a");
            let b = compile(&patch, &blocks, &transforms).expect("compile b");
            prop_assert_eq!(a.digest(), b.digest());

            let mul = make_block_id("mul");
            let mut eval_a = Evaluator::new(Arc::new(a));
            let mut eval_b = Evaluator::new(Arc::new(b));
            for _ in 0..16 {
                eval_a.step(16.0);
                eval_b.step(16.0);
                let va = eval_a
                    .output(&mul, "out")
                    .and_then(|v| v.as_f64())
                    .expect("output a");
                let vb = eval_b
                    .output(&mul, "out")
                    .and_then(|v| v.as_f64())
                    .expect("output b");
                prop_assert_eq!(va.to_bits(), vb.to_bits());
            }
            Ok(())
        })
        .expect("proptest with pinned seed should complete");
}
