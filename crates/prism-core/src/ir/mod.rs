// SPDX-License-Identifier: Apache-2.0
//! Typed expression IR.
//!
//! The IR is an indexed array of tagged nodes, never a pointer graph.
//! Sharing is by construction: the builder content-addresses each node's
//! canonical encoding and returns the existing index on a hit, so two
//! structurally identical subexpressions occupy one slot. State-bearing and
//! closure nodes are identity-bearing and exempt from deduplication.
//!
//! Worlds map onto node families:
//! - signal: `Const`/`Param`/`Time`/`Dt`/`Map`/`Zip`/`Closure`/`Combine`
//!   plus the memory nodes `Delay`/`Integrate`/`SampleHold`,
//! - field: `Broadcast`/`FieldSource`/`FieldMap`/`FieldZip`/`FieldZipSig`
//!   (lazy; materialized only by render sinks and `ReduceField`),
//! - event: `Pulse`/`Rising`/`EventDiv`/`EventOr`.

mod builder;
mod kernel;

pub use builder::{BuildError, BuiltIr, IrBuilder, RenderSpec};
pub use kernel::{EaseKind, Kernel, KernelError};

use std::sync::Arc;

use crate::combine::CombineMode;
use crate::ident::BlockId;
use crate::types::TypeDesc;
use crate::value::Value;

/// Dense index of a node within a program's node array.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IrId(pub u32);

impl IrId {
    /// Placeholder used for deferred inputs of memory nodes inside feedback
    /// cycles; link resolution (Pass 8) patches these before scheduling.
    pub const PENDING: Self = Self(u32::MAX);

    /// Index into the node array.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Which table a [`ValueRef`] addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RefKind {
    /// Compile-time constant; `id` indexes the const pool.
    ScalarConst,
    /// Signal-world node; `id` indexes the node array.
    Sig,
    /// Field-world expression node; `id` indexes the node array.
    FieldExpr,
    /// Event-world node; `id` indexes the node array.
    Event,
}

/// Opaque reference to a value produced somewhere in the IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValueRef {
    /// Which table `id` addresses.
    pub kind: RefKind,
    /// Index into the const pool (`ScalarConst`) or node array (others).
    pub id: u32,
}

impl ValueRef {
    /// The node this reference addresses, if it addresses one.
    #[must_use]
    pub const fn node(self) -> Option<IrId> {
        match self.kind {
            RefKind::ScalarConst => None,
            RefKind::Sig | RefKind::FieldExpr | RefKind::Event => Some(IrId(self.id)),
        }
    }
}

/// Stable identifier for a node's persistent state across program swaps.
///
/// Keys are `(block, internal)`: the owning patch block plus a block-local
/// discriminator. Program swaps migrate state forward exactly when the key
/// and the node's [`StateKind`] both match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateKey {
    /// Owning patch block.
    pub block: BlockId,
    /// Block-local discriminator (`"delay"`, `"integrate"`, ...).
    pub internal: &'static str,
}

impl StateKey {
    /// Constructs a key.
    #[must_use]
    pub const fn new(block: BlockId, internal: &'static str) -> Self {
        Self { block, internal }
    }
}

/// Kind tag used when matching state entries across swaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    /// One-frame delay line.
    Delay,
    /// Running integral.
    Integrate,
    /// Sample-and-hold latch.
    SampleHold,
    /// Previous-sample memory for edge/wrap detection.
    EdgeDetect,
    /// Pulse-division counter.
    Counter,
}

/// Per-element generator kinds for [`IrNode::FieldSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FieldSourceKind {
    /// Element index as a float.
    Index,
    /// Index normalized to `[0, 1]` (`unit` domain).
    UnitCoord,
    /// Grid position normalized to `[0, 1]²` (`point` domain); line domains
    /// place elements along the x axis.
    GridPos,
}

/// Reduction mode for [`IrNode::ReduceField`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ReduceMode {
    /// Arithmetic mean.
    Mean,
    /// Sum.
    Sum,
    /// Minimum.
    Min,
    /// Maximum.
    Max,
}

/// Per-frame evaluation context passed to closure nodes.
#[derive(Debug, Clone, Copy)]
pub struct EvalCtx {
    /// Monotonic host time in milliseconds (never wrapped by the runtime).
    pub t_ms: f64,
    /// Frame delta in milliseconds, already speed-scaled.
    pub dt_ms: f64,
    /// Monotonic frame counter.
    pub frame: u64,
}

/// Boxed closure acting as an opaque IR leaf (the V1 bridge escape hatch).
#[derive(Clone)]
pub struct OpaqueFn(pub Arc<dyn Fn(&EvalCtx) -> Value + Send + Sync>);

impl core::fmt::Debug for OpaqueFn {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("OpaqueFn")
    }
}

/// One IR node. Variants are a closed set; polymorphic behavior lives in
/// kernels and block compile functions, never in node subtyping.
#[derive(Debug, Clone)]
pub enum IrNode {
    /// Constant view of a const-pool slot.
    Const {
        /// Index into the const pool.
        const_id: u32,
    },
    /// Live block parameter; reads the program's param table, which Class A
    /// swaps retune in place without structural replacement.
    Param {
        /// Index into the param table.
        param_id: u32,
    },
    /// Monotonic host time in milliseconds.
    Time,
    /// Speed-scaled frame delta in milliseconds.
    Dt,
    /// Unary kernel application over a signal.
    Map {
        /// Input node.
        src: IrId,
        /// Pure kernel.
        kernel: Kernel,
    },
    /// N-ary kernel application over signals.
    Zip {
        /// Input nodes, kernel argument order.
        srcs: Vec<IrId>,
        /// Pure kernel.
        kernel: Kernel,
    },
    /// Opaque closure leaf (V1 bridge).
    Closure {
        /// The wrapped closure.
        f: OpaqueFn,
        /// Static type the closure promises to produce.
        ty: TypeDesc,
    },
    /// Multi-writer combine; inputs in canonical writer order.
    Combine {
        /// Combine mode.
        mode: CombineMode,
        /// Writer nodes in `(sort_key, id)` order.
        srcs: Vec<IrId>,
    },
    /// One-frame delay. Output is last frame's input; state-bearing.
    Delay {
        /// Input node (deferred inside feedback cycles).
        src: IrId,
        /// Const-pool index of the initial value.
        init_const: u32,
    },
    /// Running integral `state += src * dt_seconds`; output is the state
    /// before this frame's commit.
    Integrate {
        /// Input node (deferred inside feedback cycles).
        src: IrId,
    },
    /// Latches `src` whenever `trigger` pulses; output is the held value.
    SampleHold {
        /// Sampled input (deferred inside feedback cycles).
        src: IrId,
        /// Event node that triggers the latch.
        trigger: IrId,
    },
    /// Lifts a signal to a field (same value for every element).
    Broadcast {
        /// Signal input.
        src: IrId,
    },
    /// Per-element generator over a domain.
    FieldSource {
        /// Node producing the `Value::Domain` artifact.
        domain: IrId,
        /// Generator kind.
        kind: FieldSourceKind,
    },
    /// Unary kernel over each element of a field.
    FieldMap {
        /// Field input.
        src: IrId,
        /// Pure kernel.
        kernel: Kernel,
    },
    /// Element-wise kernel over several fields.
    FieldZip {
        /// Field inputs, kernel argument order.
        srcs: Vec<IrId>,
        /// Pure kernel.
        kernel: Kernel,
    },
    /// Element-wise kernel combining one field with per-frame signals.
    /// Kernel arguments are `[element, sig0, sig1, ...]`.
    FieldZipSig {
        /// Field input.
        field: IrId,
        /// Signal inputs appended to each element.
        sigs: Vec<IrId>,
        /// Pure kernel.
        kernel: Kernel,
    },
    /// Reduces a field to a signal; the one place fields materialize outside
    /// render sinks.
    ReduceField {
        /// Field input.
        field: IrId,
        /// Reduction mode.
        mode: ReduceMode,
    },
    /// Pulses when a phase signal wraps (current < previous); state-bearing.
    Pulse {
        /// Phase input.
        src: IrId,
    },
    /// Pulses on a rising edge of a boolean/numeric signal; state-bearing.
    Rising {
        /// Signal input.
        src: IrId,
    },
    /// Passes every `n`-th pulse; state-bearing counter.
    EventDiv {
        /// Event input.
        src: IrId,
        /// Division factor (≥ 1).
        n: u32,
    },
    /// Fires when any input fires this frame.
    EventOr {
        /// Event inputs.
        srcs: Vec<IrId>,
    },
}

impl IrNode {
    /// State kind for state-bearing nodes, `None` otherwise.
    ///
    /// Swap-time migration copies state forward only between nodes of equal
    /// kind; everything else reinitializes.
    #[must_use]
    pub const fn state_kind(&self) -> Option<StateKind> {
        match self {
            Self::Delay { .. } => Some(StateKind::Delay),
            Self::Integrate { .. } => Some(StateKind::Integrate),
            Self::SampleHold { .. } => Some(StateKind::SampleHold),
            Self::Pulse { .. } | Self::Rising { .. } => Some(StateKind::EdgeDetect),
            Self::EventDiv { .. } => Some(StateKind::Counter),
            _ => None,
        }
    }

    /// True when the node's output breaks dependency cycles: its frame value
    /// derives from state, not from its current-frame inputs.
    #[must_use]
    pub const fn breaks_cycles(&self) -> bool {
        matches!(
            self,
            Self::Delay { .. } | Self::Integrate { .. } | Self::SampleHold { .. }
        )
    }

    /// Input node ids used for scheduling.
    ///
    /// Memory nodes report their deferred inputs as *commit* dependencies
    /// via [`IrNode::commit_deps`], not here; their frame value needs no
    /// inputs at all.
    pub fn schedule_deps(&self, out: &mut Vec<IrId>) {
        match self {
            Self::Const { .. }
            | Self::Param { .. }
            | Self::Time
            | Self::Dt
            | Self::Closure { .. }
            | Self::Delay { .. }
            | Self::Integrate { .. } => {}
            Self::SampleHold { trigger, .. } => out.push(*trigger),
            Self::Map { src, kernel: _ }
            | Self::Broadcast { src }
            | Self::FieldMap { src, kernel: _ }
            | Self::Pulse { src }
            | Self::Rising { src }
            | Self::EventDiv { src, .. } => out.push(*src),
            Self::Zip { srcs, kernel: _ }
            | Self::Combine { srcs, .. }
            | Self::FieldZip { srcs, kernel: _ }
            | Self::EventOr { srcs } => out.extend_from_slice(srcs),
            Self::FieldSource { domain, .. } => out.push(*domain),
            Self::FieldZipSig { field, sigs, .. } => {
                out.push(*field);
                out.extend_from_slice(sigs);
            }
            Self::ReduceField { field, .. } => out.push(*field),
        }
    }

    /// Node ids that must be evaluated before this node's end-of-frame state
    /// commit. Empty for stateless nodes.
    pub fn commit_deps(&self, out: &mut Vec<IrId>) {
        match self {
            Self::Delay { src, .. } | Self::Integrate { src } => {
                if *src != IrId::PENDING {
                    out.push(*src);
                }
            }
            Self::SampleHold { src, trigger } => {
                if *src != IrId::PENDING {
                    out.push(*src);
                }
                out.push(*trigger);
            }
            Self::Pulse { src } | Self::Rising { src } | Self::EventDiv { src, .. } => {
                out.push(*src);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_nodes_break_cycles_and_carry_state() {
        let delay = IrNode::Delay {
            src: IrId(3),
            init_const: 0,
        };
        assert!(delay.breaks_cycles());
        assert_eq!(delay.state_kind(), Some(StateKind::Delay));

        let map = IrNode::Map {
            src: IrId(1),
            kernel: Kernel::Abs,
        };
        assert!(!map.breaks_cycles());
        assert_eq!(map.state_kind(), None);
    }

    #[test]
    fn delay_defers_its_input_to_commit_time() {
        let delay = IrNode::Delay {
            src: IrId(7),
            init_const: 0,
        };
        let mut sched = Vec::new();
        delay.schedule_deps(&mut sched);
        assert!(sched.is_empty());

        let mut commit = Vec::new();
        delay.commit_deps(&mut commit);
        assert_eq!(commit, vec![IrId(7)]);
    }

    #[test]
    fn pending_inputs_are_not_reported_as_deps() {
        let delay = IrNode::Delay {
            src: IrId::PENDING,
            init_const: 0,
        };
        let mut commit = Vec::new();
        delay.commit_deps(&mut commit);
        assert!(commit.is_empty());
    }
}
