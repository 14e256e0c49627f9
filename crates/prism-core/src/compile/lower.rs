// SPDX-License-Identifier: Apache-2.0
//! Passes 6–8: block lowering, bus sanity, link resolution.
//!
//! Blocks lower in the deterministic topological order from Pass 4. Hidden
//! providers compile exactly like visible blocks. Inputs arrive as the
//! combined `ValueRef`s planned in Pass 5 with edge transform chains
//! applied; a memory block's deferred input is withheld here and patched in
//! link resolution once every producer exists, which is what lets feedback
//! compile at all.

use std::collections::BTreeMap;

use crate::block::{Artifact, ArtifactValue, BlockArgs, BlockCompile, SlotDef, V1Args};
use crate::combine::{CombineMode, CombineWhen};
use crate::compile::Session;
use crate::diag::{DiagCode, Diagnostic, GraphLoc};
use crate::ir::{IrId, IrNode, Kernel, RefKind, ValueRef};
use crate::patch::{Block, Edge, ParamBinding};
use crate::transform::{CompileStepError, ParamRefs};
use crate::types::World;

pub(crate) fn run(session: &mut Session<'_>) {
    // Pass 6: lower blocks in topological order.
    let order = session.order.clone();
    for block_id in order {
        lower_block(session, block_id);
    }
    // Pass 7: bus sanity. Buses are plain blocks, so this is only an
    // invariant check: every bus input must have produced a combine node.
    bus_sanity(session);
    // Pass 8: link resolution for deferred memory inputs and anything the
    // plans left pending.
    let fixups = std::mem::take(&mut session.fixups);
    for (node, block_id, slot_id) in fixups {
        let Some(block) = session.patch.block(&block_id).cloned() else {
            continue;
        };
        let slot = session
            .blocks
            .get(&block.ty)
            .and_then(|def| def.input(slot_id))
            .cloned();
        let Some(slot) = slot else { continue };
        let Some(resolved) = resolve_input(session, &block, &slot) else {
            continue;
        };
        if let Err(err) = session.builder.patch_deferred_src(node, resolved) {
            session.diags.push(
                Diagnostic::error(DiagCode::Internal, format!("link resolution failed: {err}"))
                    .at(GraphLoc::Block(block_id)),
            );
        }
    }
}

fn lower_block(session: &mut Session<'_>, block_id: crate::ident::BlockId) {
    let Some(block) = session.patch.block(&block_id).cloned() else {
        return;
    };
    let Some(def) = session.blocks.get(&block.ty) else {
        return;
    };
    let compile = def.compile;
    let deferred = def.deferred_input;
    let slots: Vec<SlotDef> = def.inputs.to_vec();
    let output_defs: Vec<(&'static str, crate::types::TypeDesc)> =
        def.outputs.iter().map(|o| (o.id, o.ty)).collect();

    let mut inputs: BTreeMap<&'static str, ValueRef> = BTreeMap::new();
    for slot in &slots {
        if deferred == Some(slot.id) {
            continue;
        }
        let Some(resolved) = resolve_input(session, &block, slot) else {
            return; // Diagnostic already recorded.
        };
        inputs.insert(slot.id, resolved);
    }

    let outputs = match compile {
        BlockCompile::V2(f) => {
            let args = BlockArgs {
                id: block_id,
                params: &block.params,
                inputs: &inputs,
            };
            match f(&args, &mut session.builder) {
                Ok(outputs) => outputs,
                Err(err) => {
                    session.diags.push(
                        Diagnostic::error(
                            DiagCode::BlockCompileFailed,
                            format!("block type {:?} failed to compile: {err}", block.ty),
                        )
                        .at(GraphLoc::Block(block_id)),
                    );
                    return;
                }
            }
        }
        BlockCompile::V1(f) => {
            let const_inputs: BTreeMap<&'static str, Option<crate::value::Value>> = inputs
                .iter()
                .map(|(slot, r)| (*slot, session.builder.const_value(*r).cloned()))
                .collect();
            let args = V1Args {
                id: block_id,
                params: &block.params,
                inputs: &const_inputs,
            };
            match f(&args) {
                Ok(artifacts) => bridge_v1(session, &output_defs, artifacts),
                Err(err) => {
                    session.diags.push(
                        Diagnostic::error(
                            DiagCode::BlockCompileFailed,
                            format!("block type {:?} failed to compile: {err}", block.ty),
                        )
                        .at(GraphLoc::Block(block_id)),
                    );
                    return;
                }
            }
        }
    };

    if let Some(slot_id) = deferred {
        // Convention: a memory block's sole output IS its memory node.
        if let Some(out) = outputs.get("out") {
            session.fixups.push((IrId(out.id), block_id, slot_id));
        }
    }
    for (out_id, r) in outputs {
        session.outputs.insert((block_id, out_id.to_owned()), r);
    }
}

/// Bridges V1 artifacts to refs: constants become const nodes, closures
/// become closure leaves.
fn bridge_v1(
    session: &mut Session<'_>,
    output_defs: &[(&'static str, crate::types::TypeDesc)],
    artifacts: BTreeMap<&'static str, Artifact>,
) -> BTreeMap<&'static str, ValueRef> {
    let mut outputs = BTreeMap::new();
    for (out_id, artifact) in artifacts {
        let declared = output_defs
            .iter()
            .find(|(id, _)| *id == out_id)
            .map(|(_, ty)| *ty)
            .unwrap_or(artifact.ty);
        let r = match artifact.value {
            ArtifactValue::Const(v) => {
                if declared.world == World::Scalar {
                    session.builder.scalar_const(&v)
                } else {
                    session.builder.sig_const(&v)
                }
            }
            ArtifactValue::Closure(f) => session.builder.closure(f, declared),
        };
        outputs.insert(out_id, r);
    }
    outputs
}

/// Resolves one input slot: producer refs through their edge plans, then
/// the slot's combine policy.
fn resolve_input(session: &mut Session<'_>, block: &Block, slot: &SlotDef) -> Option<ValueRef> {
    let plan = session
        .input_plans
        .get(&(block.id, slot.id.to_owned()))?
        .clone();
    let mut writers = Vec::with_capacity(plan.edges.len());
    for edge_id in &plan.edges {
        let edge = session.patch.edge(edge_id)?.clone();
        let key = (edge.from.block, edge.from.slot.clone());
        let Some(producer) = session.outputs.get(&key).copied() else {
            session.diags.push(
                Diagnostic::error(
                    DiagCode::Internal,
                    "producer output missing during lowering",
                )
                .at(GraphLoc::Edge(*edge_id)),
            );
            return None;
        };
        writers.push(apply_edge_plan(session, &edge, producer));
    }

    if writers.len() == 1 && plan.policy.when == CombineWhen::Multi {
        return writers.pop();
    }
    Some(lower_combine(session, plan.policy.mode, &writers))
}

/// Emits the combine for a writer list. Signal and event writers get a
/// `Combine` node; lazy field writers fold structurally.
fn lower_combine(session: &mut Session<'_>, mode: CombineMode, writers: &[ValueRef]) -> ValueRef {
    let any_field = writers.iter().any(|r| r.kind == RefKind::FieldExpr);
    if !any_field {
        return session.builder.combine(mode, writers);
    }
    match mode {
        CombineMode::Sum => fold_fields(session, writers, Kernel::Add),
        CombineMode::Merge => fold_fields(session, writers, Kernel::Max),
        CombineMode::Latest | CombineMode::Array | CombineMode::Error => {
            // Field worlds have no per-frame value list to collect; latest
            // keeps the final writer, which the canonical order makes
            // deterministic.
            writers.last().copied().unwrap_or(ValueRef {
                kind: RefKind::FieldExpr,
                id: 0,
            })
        }
    }
}

fn fold_fields(session: &mut Session<'_>, writers: &[ValueRef], kernel: Kernel) -> ValueRef {
    let mut iter = writers.iter().copied();
    let Some(first) = iter.next() else {
        return ValueRef {
            kind: RefKind::FieldExpr,
            id: 0,
        };
    };
    iter.fold(first, |acc, next| session.builder.zip(&[acc, next], kernel))
}

/// Applies one edge's planned transform chain to the producer ref.
///
/// Lens parameter bindings resolve to literal consts, declared defaults,
/// wire outputs, or bus outputs; an unresolvable binding or failing compile
/// step reports a diagnostic and skips the step, leaving the chain's value
/// flowing.
fn apply_edge_plan(session: &mut Session<'_>, edge: &Edge, producer: ValueRef) -> ValueRef {
    let Some(plan) = session.edge_plans.get(&edge.id).cloned() else {
        return producer;
    };
    let transforms = session.transforms;
    let mut current = producer;
    for step in &plan.steps {
        let Some(def) = transforms.get(step.name) else {
            continue; // Typecheck reported it.
        };
        let mut params = ParamRefs::new();
        let mut resolvable = true;
        for spec in def.params {
            let binding = step
                .params
                .get(spec.name)
                .cloned()
                .unwrap_or(ParamBinding::Default);
            let resolved = match binding {
                ParamBinding::Literal(v) => Some(session.builder.scalar_const(&v)),
                ParamBinding::Default => Some(session.builder.scalar_const(&spec.default)),
                ParamBinding::Wire(port) => session
                    .outputs
                    .get(&(port.block, port.slot.clone()))
                    .copied(),
                ParamBinding::Bus(bus) => {
                    session.outputs.get(&(bus, "out".to_owned())).copied()
                }
            };
            match resolved {
                Some(r) => {
                    params.insert(spec.name, r);
                }
                None => {
                    session.diags.push(
                        Diagnostic::warning(
                            DiagCode::UnresolvedParamBinding,
                            format!(
                                "param {:?} of transform {:?} is unresolvable; step skipped",
                                spec.name, step.name
                            ),
                        )
                        .at(GraphLoc::Edge(edge.id)),
                    );
                    resolvable = false;
                }
            }
        }
        if !resolvable {
            continue;
        }
        match (def.compile)(current, &params, &mut session.builder) {
            Ok(next) => current = next,
            Err(CompileStepError::Build(err)) => {
                session.diags.push(
                    Diagnostic::error(DiagCode::Internal, format!("transform lowering failed: {err}"))
                        .at(GraphLoc::Edge(edge.id)),
                );
            }
            Err(err) => {
                session.diags.push(
                    Diagnostic::warning(
                        DiagCode::UnresolvedParamBinding,
                        format!("transform {:?} skipped: {err}", step.name),
                    )
                    .at(GraphLoc::Edge(edge.id)),
                );
            }
        }
    }
    current
}

/// Pass 7: every bus input must have lowered to a combine node.
fn bus_sanity(session: &mut Session<'_>) {
    let buses: Vec<_> = session.patch.bus_blocks().map(|b| b.id).collect();
    for bus in buses {
        let combined = session.outputs.get(&(bus, "out".to_owned())).copied();
        let is_combine = combined.is_some_and(|r| {
            matches!(
                session.builder.node(IrId(r.id)),
                Some(IrNode::Combine { .. })
            )
        });
        if !is_combine {
            session.diags.push(
                Diagnostic::error(
                    DiagCode::Internal,
                    "bus input did not lower to a combine node",
                )
                .at(GraphLoc::Bus(bus)),
            );
        }
    }
}
