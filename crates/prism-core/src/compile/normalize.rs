// SPDX-License-Identifier: Apache-2.0
//! Pass 1: normalization and structural validation.
//!
//! Edge order is already canonical (`Patch::edges_into_input` sorts by
//! `(sort_key, id)`); this pass validates what the patch layer cannot:
//! block types against the registry and slot ids against block definitions.
//! Disabled edges are kept in the patch for the UI but never reach later
//! passes. Bus blocks receive no special treatment anywhere here.

use crate::compile::Session;
use crate::diag::{DiagCode, Diagnostic, GraphLoc};

pub(crate) fn run(session: &mut Session<'_>) {
    for block in &session.patch.blocks {
        if session.blocks.get(&block.ty).is_none() {
            session.diags.push(
                Diagnostic::error(
                    DiagCode::UnknownBlockType,
                    format!("block type {:?} is not registered", block.ty),
                )
                .at(GraphLoc::Block(block.id))
                .with_help("register the block type before compiling"),
            );
        }
    }

    for edge in &session.patch.edges {
        if !edge.enabled {
            continue;
        }
        for (endpoint, is_output) in [(&edge.from, true), (&edge.to, false)] {
            let Some(block) = session.patch.block(&endpoint.block) else {
                session.diags.push(
                    Diagnostic::error(
                        DiagCode::DanglingEdge,
                        "edge endpoint references a block missing from the patch",
                    )
                    .at(GraphLoc::Edge(edge.id)),
                );
                continue;
            };
            let Some(def) = session.blocks.get(&block.ty) else {
                continue; // Unknown block type already reported above.
            };
            let found = if is_output {
                def.output(&endpoint.slot).is_some()
            } else {
                def.input(&endpoint.slot).is_some()
            };
            if !found {
                let direction = if is_output { "output" } else { "input" };
                session.diags.push(
                    Diagnostic::error(
                        DiagCode::UnknownSlot,
                        format!(
                            "block type {:?} has no {direction} slot {:?}",
                            block.ty, endpoint.slot
                        ),
                    )
                    .at(GraphLoc::Port {
                        block: endpoint.block,
                        slot: endpoint.slot.clone(),
                    })
                    .at(GraphLoc::Edge(edge.id)),
                );
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::block::BlockRegistry;
    use crate::ident::{make_block_id, make_edge_id};
    use crate::patch::{Block, Edge, Patch, PortRef};
    use crate::transform::TransformRegistry;

    #[test]
    fn unknown_block_types_are_reported() {
        let blocks = BlockRegistry::with_system_blocks().unwrap();
        let transforms = TransformRegistry::with_catalog().unwrap();
        let mut patch = Patch::new();
        patch
            .add_block(Block::new(make_block_id("x"), "warpDrive"))
            .unwrap();
        let mut s = Session::new(patch, &blocks, &transforms);
        run(&mut s);
        assert!(s
            .diags
            .iter()
            .any(|d| d.code == DiagCode::UnknownBlockType));
    }

    #[test]
    fn unknown_slots_are_reported_with_port_locations() {
        let blocks = BlockRegistry::with_system_blocks().unwrap();
        let transforms = TransformRegistry::with_catalog().unwrap();
        let mut patch = Patch::new();
        let c = make_block_id("c");
        let osc = make_block_id("osc");
        patch.add_block(Block::new(c, "const")).unwrap();
        patch.add_block(Block::new(osc, "oscillator")).unwrap();
        patch
            .add_edge(Edge::new(
                make_edge_id("e"),
                PortRef::new(c, "out"),
                PortRef::new(osc, "detune"),
            ))
            .unwrap();
        let mut s = Session::new(patch, &blocks, &transforms);
        run(&mut s);
        let diag = s
            .diags
            .iter()
            .find(|d| d.code == DiagCode::UnknownSlot)
            .expect("missing UnknownSlot diagnostic");
        assert!(diag
            .locations
            .iter()
            .any(|l| matches!(l, GraphLoc::Port { slot, .. } if slot == "detune")));
    }

    #[test]
    fn disabled_edges_are_not_validated() {
        let blocks = BlockRegistry::with_system_blocks().unwrap();
        let transforms = TransformRegistry::with_catalog().unwrap();
        let mut patch = Patch::new();
        let c = make_block_id("c");
        let osc = make_block_id("osc");
        patch.add_block(Block::new(c, "const")).unwrap();
        patch.add_block(Block::new(osc, "oscillator")).unwrap();
        let mut edge = Edge::new(
            make_edge_id("e"),
            PortRef::new(c, "out"),
            PortRef::new(osc, "detune"),
        );
        edge.enabled = false;
        patch.add_edge(edge).unwrap();
        let mut s = Session::new(patch, &blocks, &transforms);
        run(&mut s);
        assert!(s.diags.is_empty());
    }
}
