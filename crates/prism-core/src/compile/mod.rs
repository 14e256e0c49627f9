// SPDX-License-Identifier: Apache-2.0
//! The compiler pipeline: patch → compiled program.
//!
//! Determinism contract
//! - The pipeline is a pure function of `(patch, block registry, transform
//!   registry)`. Iteration that reaches output walks `BTreeMap`s or
//!   pre-sorted vectors; the lowering order is the deterministic
//!   topological order fixed in the graph pass.
//! - [`CompiledProgram::digest`] is a BLAKE3 digest over a canonical
//!   little-endian encoding of every program artifact. Two compilations of
//!   the same inputs produce equal digests, byte for byte.
//!
//! Failure semantics: diagnostics accumulate across passes; any error means
//! `Err(diags)` and no partial program. Warnings ride along in the success
//! case.
//!
//! Pass order:
//! 0. default-source materialization (`defaults`)
//! 1. normalization and structural validation (`normalize`)
//! 2. edge typing and adapter auto-insertion (`typecheck`)
//! 3. time topology and reserved buses (`timecheck`)
//! 4. graph canonicalization: SCC legality + lowering order (`graphpass`)
//! 5. writer resolution (`writers`)
//! 6–8. block lowering, bus sanity, link resolution (`lower`)
//! 9. scheduling and program assembly (`schedule`)

mod defaults;
mod graphpass;
mod lower;
mod normalize;
mod schedule;
mod timecheck;
mod typecheck;
mod writers;

use std::collections::BTreeMap;

use crate::block::BlockRegistry;
use crate::combine::CombinePolicy;
use crate::diag::Diagnostic;
use crate::ident::{BlockId, EdgeId, Hash};
use crate::ir::{IrBuilder, IrId, IrNode, RenderSpec, StateKey, ValueRef};
use crate::patch::{ParamBinding, Patch};
use crate::time::TimeModel;
use crate::transform::pathfind::Pathfinder;
use crate::transform::TransformRegistry;
use crate::value::Value;

/// Reserved-bus block bindings surfaced to the UI.
///
/// Every field holds the hidden bus block's id when the patch carries that
/// reserved bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UiBindings {
    /// Primary phase bus.
    pub phase_a: Option<BlockId>,
    /// Secondary phase bus.
    pub phase_b: Option<BlockId>,
    /// Pulse event bus.
    pub pulse: Option<BlockId>,
    /// Energy bus.
    pub energy: Option<BlockId>,
    /// Palette bus.
    pub palette: Option<BlockId>,
    /// Progress bus.
    pub progress: Option<BlockId>,
}

/// One planned transform step on an edge after type checking.
#[derive(Debug, Clone)]
pub(crate) struct PlannedStep {
    /// Registry id of the lens/adapter.
    pub name: &'static str,
    /// User-authored param bindings (empty for synthesized steps).
    pub params: BTreeMap<String, ParamBinding>,
    /// True when the compiler auto-inserted this adapter.
    pub synthesized: bool,
}

/// Typing result for one enabled edge.
#[derive(Debug, Clone)]
pub(crate) struct EdgePlan {
    pub steps: Vec<PlannedStep>,
}

/// Writer plan for one input slot.
#[derive(Debug, Clone)]
pub(crate) struct InputPlan {
    /// Writer edges in canonical `(sort_key, id)` order.
    pub edges: Vec<EdgeId>,
    /// Effective combine policy (instance override or slot default).
    pub policy: CombinePolicy,
}

/// Mutable state threaded through the passes.
pub(crate) struct Session<'a> {
    pub patch: Patch,
    pub blocks: &'a BlockRegistry,
    pub transforms: &'a TransformRegistry,
    pub pathfinder: Pathfinder,
    pub diags: Vec<Diagnostic>,
    pub edge_plans: BTreeMap<EdgeId, EdgePlan>,
    pub input_plans: BTreeMap<(BlockId, String), InputPlan>,
    pub time_model: Option<TimeModel>,
    pub ui: UiBindings,
    pub taps: BTreeMap<String, ValueRef>,
    pub order: Vec<BlockId>,
    pub builder: IrBuilder,
    pub outputs: BTreeMap<(BlockId, String), ValueRef>,
    pub fixups: Vec<(IrId, BlockId, &'static str)>,
    pub synthesized_adapters: u32,
}

impl<'a> Session<'a> {
    pub(crate) fn new(
        patch: Patch,
        blocks: &'a BlockRegistry,
        transforms: &'a TransformRegistry,
    ) -> Self {
        Self {
            patch,
            blocks,
            transforms,
            pathfinder: Pathfinder::new(),
            diags: Vec::new(),
            edge_plans: BTreeMap::new(),
            input_plans: BTreeMap::new(),
            time_model: None,
            ui: UiBindings::default(),
            taps: BTreeMap::new(),
            order: Vec::new(),
            builder: IrBuilder::new(),
            outputs: BTreeMap::new(),
            fixups: Vec::new(),
            synthesized_adapters: 0,
        }
    }

    pub(crate) fn has_errors(&self) -> bool {
        self.diags.iter().any(Diagnostic::is_error)
    }
}

/// An immutable compiled program.
///
/// Lifetime ends when a successor program is swapped in; the evaluator
/// holds it behind an `Arc` so the swap is one pointer exchange.
#[derive(Debug)]
pub struct CompiledProgram {
    /// IR node array.
    pub nodes: Vec<IrNode>,
    /// Interned constants.
    pub const_pool: Vec<Value>,
    /// Evaluation order (topological, deterministic).
    pub schedule: Vec<IrId>,
    /// State-bearing nodes committed at end of frame, ascending id order.
    pub commits: Vec<IrId>,
    /// State key per state-bearing node id.
    pub state_keys: BTreeMap<u32, StateKey>,
    /// Initial live-param table.
    pub params: Vec<Value>,
    /// Param slot per `(block, param name)`; Class A retunes go through
    /// this.
    pub param_index: BTreeMap<(BlockId, String), u32>,
    /// Patch time topology.
    pub time_model: TimeModel,
    /// Reserved bus block bindings for the UI.
    pub ui_bindings: UiBindings,
    /// Value taps for reserved buses (bus name → bus output ref).
    pub taps: BTreeMap<String, ValueRef>,
    /// Every block output's ref, for UI meters and probes.
    pub outputs: BTreeMap<(BlockId, String), ValueRef>,
    /// Root render sink, when the patch has one.
    pub render: Option<RenderSpec>,
    /// Combined digest of the registries this program was compiled
    /// against.
    pub registry_digest: Hash,
    /// Number of adapter steps the compiler inserted automatically.
    pub synthesized_adapters: u32,
    /// Digest of the source patch snapshot.
    pub patch_digest: Hash,
    /// Non-fatal diagnostics that accompanied a successful compile.
    /// Excluded from [`CompiledProgram::digest`].
    pub warnings: Vec<Diagnostic>,
}

impl CompiledProgram {
    /// Canonical program digest.
    ///
    /// Everything observable about the program folds in: nodes, const pool,
    /// schedule, commits, state keys, params, time model, taps, and the
    /// registry digest. Closure nodes hash by position only (their behavior
    /// is a pure function of the patch + registries, which are covered by
    /// their own digests).
    #[must_use]
    pub fn digest(&self) -> Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"program:");
        hasher.update(&self.registry_digest);
        hasher.update(&self.patch_digest);
        hasher.update(&(self.nodes.len() as u64).to_le_bytes());
        for node in &self.nodes {
            hasher.update(&node_encoding(node));
        }
        hasher.update(&(self.const_pool.len() as u64).to_le_bytes());
        for value in &self.const_pool {
            hasher.update(&value.encoded());
        }
        for id in &self.schedule {
            hasher.update(&id.0.to_le_bytes());
        }
        hasher.update(b"|commits|");
        for id in &self.commits {
            hasher.update(&id.0.to_le_bytes());
        }
        for (node, key) in &self.state_keys {
            hasher.update(&node.to_le_bytes());
            hasher.update(key.block.as_bytes());
            hasher.update(key.internal.as_bytes());
        }
        for value in &self.params {
            hasher.update(&value.encoded());
        }
        hasher.update(format!("{:?}", self.time_model).as_bytes());
        for (name, tap) in &self.taps {
            hasher.update(name.as_bytes());
            hasher.update(&tap.id.to_le_bytes());
        }
        for ((block, slot), r) in &self.outputs {
            hasher.update(block.as_bytes());
            hasher.update(slot.as_bytes());
            hasher.update(&r.id.to_le_bytes());
        }
        if let Some(render) = &self.render {
            hasher.update(b"render");
            for r in [render.domain, render.position, render.color, render.size] {
                hasher.update(&r.id.to_le_bytes());
            }
        }
        hasher.finalize().into()
    }

    /// State key of a node, if it has one.
    #[must_use]
    pub fn state_key_of(&self, node: IrId) -> Option<StateKey> {
        self.state_keys.get(&node.0).copied()
    }
}

/// Canonical per-node encoding for the program digest. Unlike the builder's
/// dedup hash this covers identity-bearing nodes too: their array position
/// plus payload is exactly what must match for byte-identical programs.
fn node_encoding(node: &IrNode) -> Vec<u8> {
    let mut buf = Vec::with_capacity(24);
    let push_ids = |buf: &mut Vec<u8>, ids: &[IrId]| {
        buf.extend_from_slice(&(ids.len() as u64).to_le_bytes());
        for id in ids {
            buf.extend_from_slice(&id.0.to_le_bytes());
        }
    };
    match node {
        IrNode::Const { const_id } => {
            buf.push(1);
            buf.extend_from_slice(&const_id.to_le_bytes());
        }
        IrNode::Param { param_id } => {
            buf.push(2);
            buf.extend_from_slice(&param_id.to_le_bytes());
        }
        IrNode::Time => buf.push(3),
        IrNode::Dt => buf.push(4),
        IrNode::Map { src, kernel } => {
            buf.push(5);
            buf.extend_from_slice(&src.0.to_le_bytes());
            buf.push(kernel.discriminant());
        }
        IrNode::Zip { srcs, kernel } => {
            buf.push(6);
            push_ids(&mut buf, srcs);
            buf.push(kernel.discriminant());
        }
        IrNode::Closure { ty, .. } => {
            buf.push(7);
            buf.extend_from_slice(ty.to_string().as_bytes());
        }
        IrNode::Combine { mode, srcs } => {
            buf.push(8);
            buf.extend_from_slice(format!("{mode:?}").as_bytes());
            push_ids(&mut buf, srcs);
        }
        IrNode::Delay { src, init_const } => {
            buf.push(9);
            buf.extend_from_slice(&src.0.to_le_bytes());
            buf.extend_from_slice(&init_const.to_le_bytes());
        }
        IrNode::Integrate { src } => {
            buf.push(10);
            buf.extend_from_slice(&src.0.to_le_bytes());
        }
        IrNode::SampleHold { src, trigger } => {
            buf.push(11);
            buf.extend_from_slice(&src.0.to_le_bytes());
            buf.extend_from_slice(&trigger.0.to_le_bytes());
        }
        IrNode::Broadcast { src } => {
            buf.push(12);
            buf.extend_from_slice(&src.0.to_le_bytes());
        }
        IrNode::FieldSource { domain, kind } => {
            buf.push(13);
            buf.extend_from_slice(&domain.0.to_le_bytes());
            buf.extend_from_slice(format!("{kind:?}").as_bytes());
        }
        IrNode::FieldMap { src, kernel } => {
            buf.push(14);
            buf.extend_from_slice(&src.0.to_le_bytes());
            buf.push(kernel.discriminant());
        }
        IrNode::FieldZip { srcs, kernel } => {
            buf.push(15);
            push_ids(&mut buf, srcs);
            buf.push(kernel.discriminant());
        }
        IrNode::FieldZipSig {
            field,
            sigs,
            kernel,
        } => {
            buf.push(16);
            buf.extend_from_slice(&field.0.to_le_bytes());
            push_ids(&mut buf, sigs);
            buf.push(kernel.discriminant());
        }
        IrNode::ReduceField { field, mode } => {
            buf.push(17);
            buf.extend_from_slice(&field.0.to_le_bytes());
            buf.extend_from_slice(format!("{mode:?}").as_bytes());
        }
        IrNode::Pulse { src } => {
            buf.push(18);
            buf.extend_from_slice(&src.0.to_le_bytes());
        }
        IrNode::Rising { src } => {
            buf.push(19);
            buf.extend_from_slice(&src.0.to_le_bytes());
        }
        IrNode::EventDiv { src, n } => {
            buf.push(20);
            buf.extend_from_slice(&src.0.to_le_bytes());
            buf.extend_from_slice(&n.to_le_bytes());
        }
        IrNode::EventOr { srcs } => {
            buf.push(21);
            push_ids(&mut buf, srcs);
        }
    }
    buf
}

/// Compiles a patch against the given registries.
///
/// # Errors
///
/// All accumulated [`Diagnostic`]s when any of them is an error; no partial
/// program is ever returned.
pub fn compile(
    patch: &Patch,
    blocks: &BlockRegistry,
    transforms: &TransformRegistry,
) -> Result<CompiledProgram, Vec<Diagnostic>> {
    let patch_digest = patch.digest();
    let mut session = Session::new(patch.clone(), blocks, transforms);

    defaults::run(&mut session);
    normalize::run(&mut session);
    if session.has_errors() {
        return Err(session.diags);
    }
    typecheck::run(&mut session);
    timecheck::run(&mut session);
    graphpass::run(&mut session);
    writers::run(&mut session);
    if session.has_errors() {
        return Err(session.diags);
    }
    lower::run(&mut session);
    if session.has_errors() {
        return Err(session.diags);
    }
    schedule::run(session, patch_digest)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ident::make_block_id;
    use crate::patch::{Block, BlockRole};

    fn registries() -> (BlockRegistry, TransformRegistry) {
        (
            BlockRegistry::with_system_blocks().unwrap(),
            TransformRegistry::with_catalog().unwrap(),
        )
    }

    fn cyclic_patch() -> Patch {
        let mut p = Patch::new();
        let root = make_block_id("root");
        p.add_block(
            Block::new(root, "cycleTimeRoot")
                .with_param("periodMs", Value::Duration(1000.0))
                .with_role(BlockRole::TimeRoot),
        )
        .unwrap();
        crate::block::publish_reserved(&mut p, &root).unwrap();
        p
    }

    #[test]
    fn compiling_twice_yields_identical_digests() {
        let (blocks, transforms) = registries();
        let p = cyclic_patch();
        let a = compile(&p, &blocks, &transforms).unwrap();
        let b = compile(&p, &blocks, &transforms).unwrap();
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn empty_patch_is_missing_a_time_root() {
        let (blocks, transforms) = registries();
        let diags = compile(&Patch::new(), &blocks, &transforms).unwrap_err();
        assert!(diags
            .iter()
            .any(|d| d.code == crate::diag::DiagCode::MissingTimeRoot));
    }
}
