// SPDX-License-Identifier: Apache-2.0
//! Pass 2: edge typing and adapter auto-insertion.
//!
//! Each enabled edge is walked once: the producing type flows through the
//! user's transform chain step by step, and the result must be assignable
//! to the consuming slot. Wherever the chain (or its end) does not fit, the
//! pathfinder is consulted with an auto-only context; a usable path becomes
//! synthesized adapter steps recorded in the edge plan, a
//! confirmation-requiring path becomes `AdapterPolicyViolation`, and no
//! path becomes `TypeMismatch` naming the exact chain position.

use crate::compile::{EdgePlan, PlannedStep, Session};
use crate::diag::{DiagCode, Diagnostic, GraphLoc};
use crate::patch::{Edge, PortRef};
use crate::transform::pathfind::PathCtx;
use crate::types::{assignable, TypeDesc};

pub(crate) fn run(session: &mut Session<'_>) {
    let edges: Vec<Edge> = session
        .patch
        .edges
        .iter()
        .filter(|e| e.enabled)
        .cloned()
        .collect();
    for edge in edges {
        plan_edge(session, &edge);
    }
}

fn port_type(session: &Session<'_>, port: &PortRef, output: bool) -> Option<TypeDesc> {
    let block = session.patch.block(&port.block)?;
    let def = session.blocks.get(&block.ty)?;
    if output {
        def.output(&port.slot).map(|o| o.ty)
    } else {
        def.input(&port.slot).map(|s| s.ty)
    }
}

fn plan_edge(session: &mut Session<'_>, edge: &Edge) {
    let (Some(src_ty), Some(dst_ty)) = (
        port_type(session, &edge.from, true),
        port_type(session, &edge.to, false),
    ) else {
        return; // Normalization already reported the broken endpoint.
    };

    let transforms = session.transforms;
    let mut steps: Vec<PlannedStep> = Vec::new();
    let mut current = src_ty;
    let chain_len = edge.transforms.len();

    for (index, step) in edge.transforms.iter().enumerate() {
        let Some(def) = transforms.get(&step.id) else {
            session.diags.push(
                Diagnostic::error(
                    DiagCode::UnknownTransform,
                    format!("transform {:?} is not registered", step.id),
                )
                .at(GraphLoc::Edge(edge.id))
                .with_details(format!("step {} of {chain_len}", index + 1)),
            );
            return;
        };
        if !def.input_matches(&current) {
            let want = def.preferred_input(&current);
            if !bridge(session, edge, &mut steps, &mut current, &want, index, chain_len) {
                return;
            }
            if !transforms
                .get(step.id.as_str())
                .is_some_and(|d| d.input_matches(&current))
            {
                push_type_mismatch(session, edge, &current, &want, Some(index), chain_len);
                return;
            }
        }
        steps.push(PlannedStep {
            name: def.name,
            params: step.params.clone(),
            synthesized: false,
        });
        current = def.output_type(&current);
    }

    if !assignable(&current, &dst_ty)
        && !bridge(session, edge, &mut steps, &mut current, &dst_ty, chain_len, chain_len)
    {
        return;
    }
    if !assignable(&current, &dst_ty) {
        push_type_mismatch(session, edge, &current, &dst_ty, None, chain_len);
        return;
    }

    session.edge_plans.insert(edge.id, EdgePlan { steps });
}

/// Attempts auto-only adapter insertion from `current` to `want`. Returns
/// false (after reporting) when the edge cannot be planned.
fn bridge(
    session: &mut Session<'_>,
    edge: &Edge,
    steps: &mut Vec<PlannedStep>,
    current: &mut TypeDesc,
    want: &TypeDesc,
    index: usize,
    chain_len: usize,
) -> bool {
    let transforms = session.transforms;
    match session
        .pathfinder
        .find(transforms, current, want, PathCtx::default())
    {
        Some(path) if !path.requires_confirmation => {
            for name in path.steps {
                let Some(def) = transforms.get(name) else {
                    session.diags.push(
                        Diagnostic::error(DiagCode::Internal, "pathfinder returned an unregistered adapter")
                            .at(GraphLoc::Edge(edge.id)),
                    );
                    return false;
                };
                steps.push(PlannedStep {
                    name: def.name,
                    params: std::collections::BTreeMap::new(),
                    synthesized: true,
                });
                *current = def.output_type(current);
                session.synthesized_adapters += 1;
            }
            true
        }
        Some(path) => {
            session.diags.push(
                Diagnostic::error(
                    DiagCode::AdapterPolicyViolation,
                    format!(
                        "bridging {current} to {want} requires {} which the compiler may not insert silently",
                        path.steps.join(" then ")
                    ),
                )
                .at(GraphLoc::Edge(edge.id))
                .with_details(chain_position(index, chain_len))
                .with_help("add the adapter to the edge's transform chain to confirm it"),
            );
            false
        }
        None => {
            push_type_mismatch(session, edge, current, want, Some(index), chain_len);
            false
        }
    }
}

fn chain_position(index: usize, chain_len: usize) -> String {
    if index >= chain_len {
        "after the transform chain".to_owned()
    } else {
        format!("at step {} of {chain_len}", index + 1)
    }
}

fn push_type_mismatch(
    session: &mut Session<'_>,
    edge: &Edge,
    got: &TypeDesc,
    want: &TypeDesc,
    index: Option<usize>,
    chain_len: usize,
) {
    let position = index.map_or_else(
        || "after the transform chain".to_owned(),
        |i| chain_position(i, chain_len),
    );
    session.diags.push(
        Diagnostic::error(
            DiagCode::TypeMismatch,
            format!("{got} is not assignable to {want}"),
        )
        .at(GraphLoc::Edge(edge.id))
        .at(GraphLoc::Port {
            block: edge.to.block,
            slot: edge.to.slot.clone(),
        })
        .with_details(position),
    );
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::block::BlockRegistry;
    use crate::ident::{make_block_id, make_edge_id};
    use crate::patch::{Block, Patch, TransformStep};
    use crate::transform::TransformRegistry;
    use crate::value::Value;

    fn setup() -> (BlockRegistry, TransformRegistry) {
        (
            BlockRegistry::with_system_blocks().unwrap(),
            TransformRegistry::with_catalog().unwrap(),
        )
    }

    fn const_to_osc(transform: Option<TransformStep>) -> Patch {
        let mut patch = Patch::new();
        let c = make_block_id("c");
        let osc = make_block_id("osc");
        patch
            .add_block(Block::new(c, "const").with_param("value", Value::Number(5.0)))
            .unwrap();
        patch.add_block(Block::new(osc, "oscillator")).unwrap();
        let mut edge = crate::patch::Edge::new(
            make_edge_id("e"),
            PortRef::new(c, "out"),
            PortRef::new(osc, "frequency"),
        );
        if let Some(step) = transform {
            edge = edge.with_transform(step);
        }
        patch.add_edge(edge).unwrap();
        patch
    }

    #[test]
    fn scalar_to_signal_synthesizes_const_to_signal() {
        let (blocks, transforms) = setup();
        let mut s = Session::new(const_to_osc(None), &blocks, &transforms);
        run(&mut s);
        assert!(s.diags.is_empty(), "unexpected diags: {:?}", s.diags);
        assert_eq!(s.synthesized_adapters, 1);
        let plan = s.edge_plans.values().next().unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].name, "ConstToSignal");
        assert!(plan.steps[0].synthesized);
    }

    #[test]
    fn lens_on_scalar_edge_bridges_before_the_lens() {
        let (blocks, transforms) = setup();
        let patch = const_to_osc(Some(TransformStep::bare("gain")));
        let mut s = Session::new(patch, &blocks, &transforms);
        run(&mut s);
        assert!(s.diags.is_empty(), "unexpected diags: {:?}", s.diags);
        let plan = s.edge_plans.values().next().unwrap();
        let names: Vec<_> = plan.steps.iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["ConstToSignal", "gain"]);
    }

    #[test]
    fn suggest_adapters_are_policy_violations_not_silent_inserts() {
        // oscillator.out (signal:float) → oscillator2.phase (signal:phase)
        // only bridges via NormalizeToPhase, which is suggest-policy.
        let (blocks, transforms) = setup();
        let mut patch = Patch::new();
        let a = make_block_id("a");
        let b = make_block_id("b");
        patch.add_block(Block::new(a, "oscillator")).unwrap();
        patch.add_block(Block::new(b, "oscillator")).unwrap();
        patch
            .add_edge(crate::patch::Edge::new(
                make_edge_id("e"),
                PortRef::new(a, "out"),
                PortRef::new(b, "phase"),
            ))
            .unwrap();
        let mut s = Session::new(patch, &blocks, &transforms);
        run(&mut s);
        assert!(s
            .diags
            .iter()
            .any(|d| d.code == DiagCode::AdapterPolicyViolation));
    }

    #[test]
    fn user_placed_suggest_adapters_are_honored() {
        let (blocks, transforms) = setup();
        let mut patch = Patch::new();
        let a = make_block_id("a");
        let b = make_block_id("b");
        patch.add_block(Block::new(a, "oscillator")).unwrap();
        patch.add_block(Block::new(b, "oscillator")).unwrap();
        patch
            .add_edge(
                crate::patch::Edge::new(
                    make_edge_id("e"),
                    PortRef::new(a, "out"),
                    PortRef::new(b, "phase"),
                )
                .with_transform(TransformStep::bare("NormalizeToPhase")),
            )
            .unwrap();
        let mut s = Session::new(patch, &blocks, &transforms);
        run(&mut s);
        assert!(s.diags.is_empty(), "unexpected diags: {:?}", s.diags);
        assert_eq!(s.synthesized_adapters, 0);
    }

    #[test]
    fn unknown_transforms_are_reported() {
        let (blocks, transforms) = setup();
        let patch = const_to_osc(Some(TransformStep::bare("warble")));
        let mut s = Session::new(patch, &blocks, &transforms);
        run(&mut s);
        assert!(s.diags.iter().any(|d| d.code == DiagCode::UnknownTransform));
    }
}
