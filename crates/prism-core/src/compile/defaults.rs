// SPDX-License-Identifier: Apache-2.0
//! Pass 0: default-source materialization.
//!
//! Every input slot with no enabled incoming edge gets a hidden provider
//! block and an edge, both with ids derived deterministically from
//! `(consumer, slot)`. After this pass no later pass distinguishes "unwired"
//! from "wired": a slot either has writers or is a hard `MissingInput`
//! (required slots with no default, surfaced in writer resolution).

use crate::compile::Session;
use crate::ident::{derived_provider_edge_id, derived_provider_id};
use crate::patch::{Block, BlockRole, Edge, PortRef};

pub(crate) fn run(session: &mut Session<'_>) {
    // Collect first: we mutate the patch while iterating over its blocks.
    let mut pending: Vec<(Block, Edge)> = Vec::new();

    for block in &session.patch.blocks {
        let Some(def) = session.blocks.get(&block.ty) else {
            // Unknown block types surface in normalization.
            continue;
        };
        for slot in def.inputs {
            if !session
                .patch
                .edges_into_input(&block.id, slot.id)
                .is_empty()
            {
                continue;
            }
            // Bus blocks carry their default in `params.default`; plain
            // slots carry it in the slot definition.
            let default = block
                .params
                .get("default")
                .cloned()
                .or_else(|| slot.default_source.as_ref().map(|s| s.value().clone()));
            let Some(default) = default else {
                continue; // Required input; writer resolution reports it.
            };
            let Some(provider_ty) = crate::block::provider_type_for(&slot.ty) else {
                continue;
            };
            let provider_id = derived_provider_id(&block.id, slot.id);
            if session.patch.block(&provider_id).is_some() {
                continue; // Already materialized (idempotent recompiles).
            }
            let mut provider = Block::new(provider_id, provider_ty)
                .with_param("value", default)
                .with_role(BlockRole::DefaultSource);
            provider.hidden = true;
            let edge = Edge::new(
                derived_provider_edge_id(&block.id, slot.id),
                PortRef::new(provider_id, "out"),
                PortRef::new(block.id, slot.id),
            );
            pending.push((provider, edge));
        }
    }

    for (provider, edge) in pending {
        // Both inserts are infallible by construction (derived ids are
        // fresh); a failure here is an engine bug worth surfacing loudly.
        if session.patch.add_block(provider).is_err() || session.patch.add_edge(edge).is_err() {
            session.diags.push(
                crate::diag::Diagnostic::error(
                    crate::diag::DiagCode::Internal,
                    "default-source materialization collided with an existing id",
                ),
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::block::BlockRegistry;
    use crate::compile::Session;
    use crate::ident::make_block_id;
    use crate::patch::Patch;
    use crate::transform::TransformRegistry;
    use crate::value::Value;

    fn session<'a>(
        patch: Patch,
        blocks: &'a BlockRegistry,
        transforms: &'a TransformRegistry,
    ) -> Session<'a> {
        Session::new(patch, blocks, transforms)
    }

    #[test]
    fn unwired_inputs_get_providers() {
        let blocks = BlockRegistry::with_system_blocks().unwrap();
        let transforms = TransformRegistry::with_catalog().unwrap();
        let mut patch = Patch::new();
        let osc = make_block_id("osc");
        patch.add_block(Block::new(osc, "oscillator")).unwrap();

        let mut s = session(patch, &blocks, &transforms);
        run(&mut s);

        // frequency + phase providers, each with one edge.
        assert_eq!(s.patch.blocks.len(), 3);
        assert_eq!(s.patch.edges.len(), 2);
        assert_eq!(s.patch.edges_into_input(&osc, "frequency").len(), 1);
        assert_eq!(s.patch.edges_into_input(&osc, "phase").len(), 1);
    }

    #[test]
    fn materialization_is_idempotent_and_deterministic() {
        let blocks = BlockRegistry::with_system_blocks().unwrap();
        let transforms = TransformRegistry::with_catalog().unwrap();
        let mut patch = Patch::new();
        patch
            .add_block(Block::new(make_block_id("osc"), "oscillator"))
            .unwrap();

        let mut s1 = session(patch.clone(), &blocks, &transforms);
        run(&mut s1);
        let digest_once = s1.patch.digest();
        run(&mut s1);
        assert_eq!(s1.patch.digest(), digest_once);

        let mut s2 = session(patch, &blocks, &transforms);
        run(&mut s2);
        assert_eq!(s2.patch.digest(), digest_once);
    }

    #[test]
    fn wired_inputs_are_left_alone() {
        let blocks = BlockRegistry::with_system_blocks().unwrap();
        let transforms = TransformRegistry::with_catalog().unwrap();
        let mut patch = Patch::new();
        let c = make_block_id("c");
        let osc = make_block_id("osc");
        patch
            .add_block(Block::new(c, "const").with_param("value", Value::Number(5.0)))
            .unwrap();
        patch.add_block(Block::new(osc, "oscillator")).unwrap();
        patch
            .add_edge(Edge::new(
                crate::ident::make_edge_id("e"),
                PortRef::new(c, "out"),
                PortRef::new(osc, "frequency"),
            ))
            .unwrap();

        let mut s = session(patch, &blocks, &transforms);
        run(&mut s);
        // Only the phase slot needed a provider.
        assert_eq!(s.patch.edges_into_input(&osc, "frequency").len(), 1);
        let freq_writer = s.patch.edges_into_input(&osc, "frequency")[0].from.block;
        assert_eq!(freq_writer, c);
    }
}
