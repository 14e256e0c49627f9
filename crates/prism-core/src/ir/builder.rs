// SPDX-License-Identifier: Apache-2.0
//! IR builder with const interning and content addressing.
//!
//! Allocation discipline:
//! - Pure nodes are content-addressed: the builder hashes a canonical
//!   encoding of `(variant, inputs, payload)` and returns the existing id on
//!   a hit. Identical subexpressions therefore share one node, which is what
//!   makes at-most-once evaluation equivalent to full memoization.
//! - Constants intern into a shared pool keyed by their canonical byte
//!   encoding.
//! - State-bearing nodes (memory, edge detectors, counters) and closures are
//!   identity-bearing: never deduplicated, and memory nodes register the
//!   [`StateKey`] that survives hot swaps.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::combine::CombineMode;
use crate::ident::{BlockId, Hash};
use crate::ir::{
    FieldSourceKind, IrId, IrNode, Kernel, OpaqueFn, RefKind, ReduceMode, StateKey, ValueRef,
};
use crate::types::{TypeDesc, World};
use crate::value::Value;

/// Declarative description of what the root render sink draws.
///
/// The evaluator materializes the three field inputs over `domain` into
/// reused buffers each frame and assembles the `RenderTree` from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSpec {
    /// Node producing the `Value::Domain` artifact.
    pub domain: ValueRef,
    /// Field of `point` values, one per element.
    pub position: ValueRef,
    /// Field of `color` values, one per element.
    pub color: ValueRef,
    /// Field of `float` sizes, one per element.
    pub size: ValueRef,
}

/// Errors raised while assembling IR.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// Two nodes registered the same state key.
    #[error("duplicate state key {0:?}/{1}")]
    DuplicateStateKey(BlockId, &'static str),
    /// A pending-input patch targeted a node without a deferred input.
    #[error("node {0:?} has no deferred input to patch")]
    NotDeferred(IrId),
    /// Two render sinks tried to claim the frame.
    #[error("render spec already set")]
    RenderSpecTaken,
}

/// Sequential IR builder shared by the compiler passes and block compile
/// functions.
#[derive(Debug, Default)]
pub struct IrBuilder {
    nodes: Vec<IrNode>,
    const_pool: Vec<Value>,
    const_index: FxHashMap<Vec<u8>, u32>,
    dedup: FxHashMap<Hash, u32>,
    state_keys: BTreeMap<u32, StateKey>,
    params: Vec<Value>,
    param_index: BTreeMap<(BlockId, String), u32>,
    render: Option<RenderSpec>,
}

/// Finished IR handed to scheduling.
#[derive(Debug)]
pub struct BuiltIr {
    /// Node array.
    pub nodes: Vec<IrNode>,
    /// Interned constants.
    pub const_pool: Vec<Value>,
    /// State keys per state-bearing node.
    pub state_keys: BTreeMap<u32, StateKey>,
    /// Initial param table values.
    pub params: Vec<Value>,
    /// Param slot per `(block, param name)`.
    pub param_index: BTreeMap<(BlockId, String), u32>,
    /// Root render sink description.
    pub render: Option<RenderSpec>,
}

impl IrBuilder {
    /// Empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes allocated so far.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Read access to an allocated node.
    #[must_use]
    pub fn node(&self, id: IrId) -> Option<&IrNode> {
        self.nodes.get(id.index())
    }

    /// Interns a constant and returns its pool slot.
    pub fn intern_const(&mut self, value: &Value) -> u32 {
        let key = value.encoded();
        if let Some(&id) = self.const_index.get(&key) {
            return id;
        }
        #[allow(clippy::cast_possible_truncation)]
        let id = self.const_pool.len() as u32;
        self.const_pool.push(value.clone());
        self.const_index.insert(key, id);
        id
    }

    /// Scalar constant reference (no node allocated).
    pub fn scalar_const(&mut self, value: &Value) -> ValueRef {
        ValueRef {
            kind: RefKind::ScalarConst,
            id: self.intern_const(value),
        }
    }

    /// The pool value behind a reference, when it is a scalar constant.
    #[must_use]
    pub fn const_value(&self, r: ValueRef) -> Option<&Value> {
        match r.kind {
            RefKind::ScalarConst => self.const_pool.get(r.id as usize),
            _ => match self.nodes.get(r.id as usize) {
                Some(IrNode::Const { const_id }) => self.const_pool.get(*const_id as usize),
                _ => None,
            },
        }
    }

    fn alloc_pure(&mut self, node: IrNode) -> IrId {
        let digest = content_hash(&node);
        if let Some(digest) = digest {
            if let Some(&id) = self.dedup.get(&digest) {
                return IrId(id);
            }
            #[allow(clippy::cast_possible_truncation)]
            let id = self.nodes.len() as u32;
            self.nodes.push(node);
            self.dedup.insert(digest, id);
            return IrId(id);
        }
        self.alloc_identity(node)
    }

    fn alloc_identity(&mut self, node: IrNode) -> IrId {
        #[allow(clippy::cast_possible_truncation)]
        let id = self.nodes.len() as u32;
        self.nodes.push(node);
        IrId(id)
    }

    fn alloc_state(
        &mut self,
        node: IrNode,
        key: StateKey,
    ) -> Result<IrId, BuildError> {
        if self.state_keys.values().any(|k| *k == key) {
            return Err(BuildError::DuplicateStateKey(key.block, key.internal));
        }
        let id = self.alloc_identity(node);
        self.state_keys.insert(id.0, key);
        Ok(id)
    }

    /// Node id for a reference, materializing `Const` nodes for scalar
    /// constants.
    pub fn as_node(&mut self, r: ValueRef) -> IrId {
        match r.kind {
            RefKind::ScalarConst => self.alloc_pure(IrNode::Const { const_id: r.id }),
            _ => IrId(r.id),
        }
    }

    /// Signal-world constant node.
    pub fn sig_const(&mut self, value: &Value) -> ValueRef {
        let const_id = self.intern_const(value);
        let id = self.alloc_pure(IrNode::Const { const_id });
        ValueRef {
            kind: RefKind::Sig,
            id: id.0,
        }
    }

    /// Monotonic host time signal.
    pub fn time(&mut self) -> ValueRef {
        let id = self.alloc_pure(IrNode::Time);
        ValueRef {
            kind: RefKind::Sig,
            id: id.0,
        }
    }

    /// Speed-scaled frame delta signal.
    pub fn dt(&mut self) -> ValueRef {
        let id = self.alloc_pure(IrNode::Dt);
        ValueRef {
            kind: RefKind::Sig,
            id: id.0,
        }
    }

    /// Live parameter slot for `(block, name)`, initialized to `value`.
    ///
    /// Repeated calls with the same key return the same slot; the initial
    /// value of the first call wins.
    pub fn param(&mut self, block: BlockId, name: &str, value: &Value) -> ValueRef {
        let key = (block, name.to_owned());
        let param_id = if let Some(&id) = self.param_index.get(&key) {
            id
        } else {
            #[allow(clippy::cast_possible_truncation)]
            let id = self.params.len() as u32;
            self.params.push(value.clone());
            self.param_index.insert(key, id);
            id
        };
        let id = self.alloc_pure(IrNode::Param { param_id });
        ValueRef {
            kind: RefKind::Sig,
            id: id.0,
        }
    }

    /// Unary kernel application; field inputs stay in the field world.
    pub fn map(&mut self, src: ValueRef, kernel: Kernel) -> ValueRef {
        if src.kind == RefKind::FieldExpr {
            let id = self.alloc_pure(IrNode::FieldMap {
                src: IrId(src.id),
                kernel,
            });
            return ValueRef {
                kind: RefKind::FieldExpr,
                id: id.0,
            };
        }
        let node = self.as_node(src);
        let id = self.alloc_pure(IrNode::Map { src: node, kernel });
        ValueRef {
            kind: src.kind_or_sig(),
            id: id.0,
        }
    }

    /// N-ary kernel application.
    ///
    /// If any input is a field, the result is a field: a single field plus
    /// signal arguments lowers to `FieldZipSig`, several fields broadcast
    /// their signal peers and lower to `FieldZip`.
    pub fn zip(&mut self, srcs: &[ValueRef], kernel: Kernel) -> ValueRef {
        let field_count = srcs
            .iter()
            .filter(|r| r.kind == RefKind::FieldExpr)
            .count();
        if field_count == 0 {
            let nodes: Vec<IrId> = srcs.iter().map(|r| self.as_node(*r)).collect();
            let id = self.alloc_pure(IrNode::Zip {
                srcs: nodes,
                kernel,
            });
            return ValueRef {
                kind: RefKind::Sig,
                id: id.0,
            };
        }
        if field_count == 1 && srcs.first().is_some_and(|r| r.kind == RefKind::FieldExpr) {
            let field = IrId(srcs[0].id);
            let sigs: Vec<IrId> = srcs[1..].iter().map(|r| self.as_node(*r)).collect();
            let id = self.alloc_pure(IrNode::FieldZipSig {
                field,
                sigs,
                kernel,
            });
            return ValueRef {
                kind: RefKind::FieldExpr,
                id: id.0,
            };
        }
        let fields: Vec<IrId> = srcs
            .iter()
            .map(|r| {
                if r.kind == RefKind::FieldExpr {
                    IrId(r.id)
                } else {
                    let sig = self.as_node(*r);
                    self.alloc_pure(IrNode::Broadcast { src: sig })
                }
            })
            .collect();
        let id = self.alloc_pure(IrNode::FieldZip {
            srcs: fields,
            kernel,
        });
        ValueRef {
            kind: RefKind::FieldExpr,
            id: id.0,
        }
    }

    /// Multi-writer combine node over signal or event writers.
    pub fn combine(&mut self, mode: CombineMode, srcs: &[ValueRef]) -> ValueRef {
        let kind = if srcs.iter().all(|r| r.kind == RefKind::Event) {
            RefKind::Event
        } else {
            RefKind::Sig
        };
        let nodes: Vec<IrId> = srcs.iter().map(|r| self.as_node(*r)).collect();
        let id = self.alloc_pure(IrNode::Combine { mode, srcs: nodes });
        ValueRef { kind, id: id.0 }
    }

    /// Opaque closure leaf (V1 bridge).
    pub fn closure(&mut self, f: OpaqueFn, ty: TypeDesc) -> ValueRef {
        let kind = match ty.world {
            World::Event => RefKind::Event,
            World::Field => RefKind::FieldExpr,
            World::Scalar | World::Signal => RefKind::Sig,
        };
        let id = self.alloc_identity(IrNode::Closure { f, ty });
        ValueRef { kind, id: id.0 }
    }

    /// One-frame delay line.
    ///
    /// `src` may be `None` inside a feedback cycle; link resolution patches
    /// it later via [`IrBuilder::patch_deferred_src`].
    ///
    /// # Errors
    ///
    /// [`BuildError::DuplicateStateKey`] when `key` is already taken.
    pub fn delay(
        &mut self,
        src: Option<ValueRef>,
        init: &Value,
        key: StateKey,
    ) -> Result<ValueRef, BuildError> {
        let init_const = self.intern_const(init);
        let src = match src {
            Some(r) => self.as_node(r),
            None => IrId::PENDING,
        };
        let id = self.alloc_state(IrNode::Delay { src, init_const }, key)?;
        Ok(ValueRef {
            kind: RefKind::Sig,
            id: id.0,
        })
    }

    /// Running integral node.
    ///
    /// # Errors
    ///
    /// [`BuildError::DuplicateStateKey`] when `key` is already taken.
    pub fn integrate(
        &mut self,
        src: Option<ValueRef>,
        key: StateKey,
    ) -> Result<ValueRef, BuildError> {
        let src = match src {
            Some(r) => self.as_node(r),
            None => IrId::PENDING,
        };
        let id = self.alloc_state(IrNode::Integrate { src }, key)?;
        Ok(ValueRef {
            kind: RefKind::Sig,
            id: id.0,
        })
    }

    /// Sample-and-hold latch.
    ///
    /// # Errors
    ///
    /// [`BuildError::DuplicateStateKey`] when `key` is already taken.
    pub fn sample_hold(
        &mut self,
        src: Option<ValueRef>,
        trigger: ValueRef,
        key: StateKey,
    ) -> Result<ValueRef, BuildError> {
        let trigger = self.as_node(trigger);
        let src = match src {
            Some(r) => self.as_node(r),
            None => IrId::PENDING,
        };
        let id = self.alloc_state(IrNode::SampleHold { src, trigger }, key)?;
        Ok(ValueRef {
            kind: RefKind::Sig,
            id: id.0,
        })
    }

    /// Patches the deferred input of a memory node.
    ///
    /// # Errors
    ///
    /// [`BuildError::NotDeferred`] when the node has no pending input.
    pub fn patch_deferred_src(&mut self, node: IrId, src: ValueRef) -> Result<(), BuildError> {
        let src = self.as_node(src);
        match self.nodes.get_mut(node.index()) {
            Some(
                IrNode::Delay { src: slot, .. }
                | IrNode::Integrate { src: slot }
                | IrNode::SampleHold { src: slot, .. },
            ) if *slot == IrId::PENDING => {
                *slot = src;
                Ok(())
            }
            _ => Err(BuildError::NotDeferred(node)),
        }
    }

    /// Lifts a signal to a field.
    pub fn broadcast(&mut self, src: ValueRef) -> ValueRef {
        if src.kind == RefKind::FieldExpr {
            return src;
        }
        let node = self.as_node(src);
        let id = self.alloc_pure(IrNode::Broadcast { src: node });
        ValueRef {
            kind: RefKind::FieldExpr,
            id: id.0,
        }
    }

    /// Per-element generator over a domain.
    pub fn field_source(&mut self, domain: ValueRef, kind: FieldSourceKind) -> ValueRef {
        let domain = self.as_node(domain);
        let id = self.alloc_pure(IrNode::FieldSource { domain, kind });
        ValueRef {
            kind: RefKind::FieldExpr,
            id: id.0,
        }
    }

    /// Field reduction to a signal.
    pub fn reduce_field(&mut self, field: ValueRef, mode: ReduceMode) -> ValueRef {
        let field = IrId(field.id);
        let id = self.alloc_pure(IrNode::ReduceField { field, mode });
        ValueRef {
            kind: RefKind::Sig,
            id: id.0,
        }
    }

    /// Phase-wrap pulse detector.
    ///
    /// # Errors
    ///
    /// [`BuildError::DuplicateStateKey`] when `key` is already taken.
    pub fn pulse(&mut self, phase: ValueRef, key: StateKey) -> Result<ValueRef, BuildError> {
        let src = self.as_node(phase);
        let id = self.alloc_state(IrNode::Pulse { src }, key)?;
        Ok(ValueRef {
            kind: RefKind::Event,
            id: id.0,
        })
    }

    /// Rising-edge pulse detector.
    ///
    /// # Errors
    ///
    /// [`BuildError::DuplicateStateKey`] when `key` is already taken.
    pub fn rising(&mut self, sig: ValueRef, key: StateKey) -> Result<ValueRef, BuildError> {
        let src = self.as_node(sig);
        let id = self.alloc_state(IrNode::Rising { src }, key)?;
        Ok(ValueRef {
            kind: RefKind::Event,
            id: id.0,
        })
    }

    /// Pulse divider.
    ///
    /// # Errors
    ///
    /// [`BuildError::DuplicateStateKey`] when `key` is already taken.
    pub fn event_div(
        &mut self,
        src: ValueRef,
        n: u32,
        key: StateKey,
    ) -> Result<ValueRef, BuildError> {
        let src = self.as_node(src);
        let id = self.alloc_state(IrNode::EventDiv { src, n: n.max(1) }, key)?;
        Ok(ValueRef {
            kind: RefKind::Event,
            id: id.0,
        })
    }

    /// Event union.
    pub fn event_or(&mut self, srcs: &[ValueRef]) -> ValueRef {
        let nodes: Vec<IrId> = srcs.iter().map(|r| self.as_node(*r)).collect();
        let id = self.alloc_pure(IrNode::EventOr { srcs: nodes });
        ValueRef {
            kind: RefKind::Event,
            id: id.0,
        }
    }

    /// Claims the frame's render sink.
    ///
    /// # Errors
    ///
    /// [`BuildError::RenderSpecTaken`] when another sink already claimed it.
    pub fn set_render(&mut self, spec: RenderSpec) -> Result<(), BuildError> {
        if self.render.is_some() {
            return Err(BuildError::RenderSpecTaken);
        }
        self.render = Some(spec);
        Ok(())
    }

    /// Finalizes the builder.
    #[must_use]
    pub fn finish(self) -> BuiltIr {
        BuiltIr {
            nodes: self.nodes,
            const_pool: self.const_pool,
            state_keys: self.state_keys,
            params: self.params,
            param_index: self.param_index,
            render: self.render,
        }
    }
}

impl ValueRef {
    /// Scalar constants promote to the signal world once a node consumes
    /// them; everything else keeps its world.
    #[must_use]
    const fn kind_or_sig(self) -> RefKind {
        match self.kind {
            RefKind::ScalarConst => RefKind::Sig,
            k => k,
        }
    }
}

/// Canonical content hash for pure nodes; `None` for identity-bearing nodes.
fn content_hash(node: &IrNode) -> Option<Hash> {
    if node.state_kind().is_some() {
        return None;
    }
    let mut buf: Vec<u8> = Vec::with_capacity(32);
    let ids = |buf: &mut Vec<u8>, ids: &[IrId]| {
        buf.extend_from_slice(&(ids.len() as u64).to_le_bytes());
        for id in ids {
            buf.extend_from_slice(&id.0.to_le_bytes());
        }
    };
    match node {
        IrNode::Const { const_id } => {
            buf.push(0x01);
            buf.extend_from_slice(&const_id.to_le_bytes());
        }
        IrNode::Param { param_id } => {
            buf.push(0x02);
            buf.extend_from_slice(&param_id.to_le_bytes());
        }
        IrNode::Time => buf.push(0x03),
        IrNode::Dt => buf.push(0x04),
        IrNode::Map { src, kernel } => {
            buf.push(0x05);
            buf.extend_from_slice(&src.0.to_le_bytes());
            buf.push(kernel.discriminant());
        }
        IrNode::Zip { srcs, kernel } => {
            buf.push(0x06);
            ids(&mut buf, srcs);
            buf.push(kernel.discriminant());
        }
        IrNode::Combine { mode, srcs } => {
            buf.push(0x07);
            buf.push(combine_tag(*mode));
            ids(&mut buf, srcs);
        }
        IrNode::Broadcast { src } => {
            buf.push(0x08);
            buf.extend_from_slice(&src.0.to_le_bytes());
        }
        IrNode::FieldSource { domain, kind } => {
            buf.push(0x09);
            buf.extend_from_slice(&domain.0.to_le_bytes());
            buf.push(match kind {
                FieldSourceKind::Index => 0,
                FieldSourceKind::UnitCoord => 1,
                FieldSourceKind::GridPos => 2,
            });
        }
        IrNode::FieldMap { src, kernel } => {
            buf.push(0x0a);
            buf.extend_from_slice(&src.0.to_le_bytes());
            buf.push(kernel.discriminant());
        }
        IrNode::FieldZip { srcs, kernel } => {
            buf.push(0x0b);
            ids(&mut buf, srcs);
            buf.push(kernel.discriminant());
        }
        IrNode::FieldZipSig {
            field,
            sigs,
            kernel,
        } => {
            buf.push(0x0c);
            buf.extend_from_slice(&field.0.to_le_bytes());
            ids(&mut buf, sigs);
            buf.push(kernel.discriminant());
        }
        IrNode::ReduceField { field, mode } => {
            buf.push(0x0d);
            buf.extend_from_slice(&field.0.to_le_bytes());
            buf.push(match mode {
                ReduceMode::Mean => 0,
                ReduceMode::Sum => 1,
                ReduceMode::Min => 2,
                ReduceMode::Max => 3,
            });
        }
        IrNode::EventOr { srcs } => {
            buf.push(0x0e);
            ids(&mut buf, srcs);
        }
        // Closures are opaque; never deduplicate them.
        IrNode::Closure { .. } => return None,
        // State-bearing variants were filtered above.
        IrNode::Delay { .. }
        | IrNode::Integrate { .. }
        | IrNode::SampleHold { .. }
        | IrNode::Pulse { .. }
        | IrNode::Rising { .. }
        | IrNode::EventDiv { .. } => return None,
    }
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"ir-node:");
    hasher.update(&buf);
    Some(hasher.finalize().into())
}

const fn combine_tag(mode: CombineMode) -> u8 {
    match mode {
        CombineMode::Latest => 0,
        CombineMode::Sum => 1,
        CombineMode::Merge => 2,
        CombineMode::Array => 3,
        CombineMode::Error => 4,
    }
}
