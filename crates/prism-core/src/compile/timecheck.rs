// SPDX-License-Identifier: Apache-2.0
//! Pass 3: time topology inference and reserved-bus checks.

use crate::compile::Session;
use crate::diag::{DiagCode, Diagnostic, GraphLoc};
use crate::ident::BlockId;
use crate::patch::BlockRole;
use crate::time::reserved_bus_type;

pub(crate) fn run(session: &mut Session<'_>) {
    check_roots(session);
    bind_reserved_buses(session);

    if session.time_model.is_some_and(|m| m.is_cyclic()) && session.ui.phase_a.is_none() {
        session.diags.push(
            Diagnostic::error(
                DiagCode::MissingPrimaryPhase,
                "cyclic patch never publishes a primary phase",
            )
            .with_help("wire the time root's phase output to the phaseA bus"),
        );
    }
}

fn role_of(session: &Session<'_>, block: &crate::patch::Block) -> Option<BlockRole> {
    session
        .blocks
        .get(&block.ty)
        .and_then(|def| def.role)
        .or(block.role)
}

fn check_roots(session: &mut Session<'_>) {
    let roots: Vec<BlockId> = session
        .patch
        .blocks
        .iter()
        .filter(|b| role_of(session, b) == Some(BlockRole::TimeRoot))
        .map(|b| b.id)
        .collect();

    match roots.as_slice() {
        [] => {
            session.diags.push(
                Diagnostic::error(DiagCode::MissingTimeRoot, "patch has no time root")
                    .with_help("add a finite, cycle, or infinite time root"),
            );
        }
        [root] => {
            let root = *root;
            let has_input = session
                .patch
                .edges
                .iter()
                .any(|e| e.enabled && e.to.block == root);
            if has_input {
                session.diags.push(
                    Diagnostic::error(
                        DiagCode::TimeRootHasInput,
                        "the time root must not have incoming edges",
                    )
                    .at(GraphLoc::Block(root)),
                );
            }
            // The model is a pure function of the root's type and params.
            let block = session
                .patch
                .block(&root)
                .cloned();
            match block.as_ref().and_then(crate::block::time_model_of) {
                Some(model) => session.time_model = Some(model),
                None => session.diags.push(
                    Diagnostic::error(
                        DiagCode::MissingTimeRoot,
                        "time root type declares no time model",
                    )
                    .at(GraphLoc::Block(root)),
                ),
            }
        }
        many => {
            let mut diag = Diagnostic::error(
                DiagCode::MultipleTimeRoots,
                format!("patch has {} time roots; exactly one is required", many.len()),
            );
            for id in many {
                diag = diag.at(GraphLoc::Block(*id));
            }
            session.diags.push(diag.with_help("remove all but one time root"));
        }
    }
}

fn bind_reserved_buses(session: &mut Session<'_>) {
    let buses: Vec<(BlockId, String, String)> = session
        .patch
        .blocks
        .iter()
        .filter(|b| role_of(session, b) == Some(BlockRole::Bus))
        .flat_map(|b| {
            b.tags
                .iter()
                .filter(|t| reserved_bus_type(t).is_some())
                .map(|t| (b.id, b.ty.clone(), t.clone()))
                .collect::<Vec<_>>()
        })
        .collect();

    for (bus_id, bus_ty, name) in buses {
        let Some(expected) = reserved_bus_type(&name) else {
            continue;
        };
        let actual = session
            .blocks
            .get(&bus_ty)
            .and_then(|def| def.input("in"))
            .map(|slot| slot.ty);
        match actual {
            Some(actual) if actual.same_shape(&expected) => {
                let slot = match name.as_str() {
                    "phaseA" => &mut session.ui.phase_a,
                    "phaseB" => &mut session.ui.phase_b,
                    "pulse" => &mut session.ui.pulse,
                    "energy" => &mut session.ui.energy,
                    "palette" => &mut session.ui.palette,
                    "progress" => &mut session.ui.progress,
                    _ => continue,
                };
                *slot = Some(bus_id);
            }
            Some(actual) => {
                session.diags.push(
                    Diagnostic::error(
                        DiagCode::ReservedBusTypeMismatch,
                        format!("reserved bus {name:?} must carry {expected}, found {actual}"),
                    )
                    .at(GraphLoc::Bus(bus_id)),
                );
            }
            None => {
                session.diags.push(
                    Diagnostic::error(
                        DiagCode::ReservedBusTypeMismatch,
                        format!("reserved bus {name:?} has no input slot"),
                    )
                    .at(GraphLoc::Bus(bus_id)),
                );
            }
        }
    }
}
