// SPDX-License-Identifier: Apache-2.0
//! Pass 5: writer resolution.
//!
//! For every input slot the multi-set of writers is fixed here, in canonical
//! `(sort_key, id)` order. Writers are wires or defaults — bus outputs are
//! ordinary wires, there is no third kind. The pass only plans; combine
//! nodes are emitted during lowering from these plans.

use crate::compile::{InputPlan, Session};
use crate::combine::CombineMode;
use crate::diag::{DiagCode, Diagnostic, GraphLoc};
use crate::types::DomainKind;

pub(crate) fn run(session: &mut Session<'_>) {
    let block_ids: Vec<_> = session.patch.blocks.iter().map(|b| b.id).collect();
    for block_id in block_ids {
        let Some(block) = session.patch.block(&block_id).cloned() else {
            continue;
        };
        let Some(def) = session.blocks.get(&block.ty) else {
            continue;
        };
        for slot in def.inputs {
            let edges: Vec<_> = session
                .patch
                .edges_into_input(&block_id, slot.id)
                .iter()
                .map(|e| e.id)
                .collect();
            let policy = block.combine.get(slot.id).copied().unwrap_or(slot.combine);

            if edges.is_empty() {
                // Impossible after Pass 0 unless the slot has no default
                // source; that makes it a required input.
                session.diags.push(
                    Diagnostic::error(
                        DiagCode::MissingInput,
                        format!("required input {:?} has no writer", slot.id),
                    )
                    .at(GraphLoc::Port {
                        block: block_id,
                        slot: slot.id.to_owned(),
                    })
                    .with_help("wire the input or give the slot a default"),
                );
                continue;
            }

            if policy.mode == CombineMode::Error && edges.len() > 1 {
                let mut diag = Diagnostic::error(
                    DiagCode::MultiWriterForbidden,
                    format!(
                        "input {:?} forbids multiple writers but has {}",
                        slot.id,
                        edges.len()
                    ),
                )
                .at(GraphLoc::Port {
                    block: block_id,
                    slot: slot.id.to_owned(),
                });
                for id in &edges {
                    diag = diag.at(GraphLoc::Edge(*id));
                }
                session.diags.push(diag);
                continue;
            }

            if slot.ty.domain == DomainKind::Time
                && edges.len() > 1
                && !block.combine.contains_key(slot.id)
            {
                session.diags.push(
                    Diagnostic::error(
                        DiagCode::AmbiguousClockInput,
                        format!(
                            "time input {:?} has {} competing writers and no explicit combine policy",
                            slot.id,
                            edges.len()
                        ),
                    )
                    .at(GraphLoc::Port {
                        block: block_id,
                        slot: slot.id.to_owned(),
                    })
                    .with_help("set a combine policy on the slot or remove the extra clock"),
                );
                continue;
            }

            session
                .input_plans
                .insert((block_id, slot.id.to_owned()), InputPlan { edges, policy });
        }
    }
}
