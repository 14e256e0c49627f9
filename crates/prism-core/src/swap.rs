// SPDX-License-Identifier: Apache-2.0
//! Hot-swap scheduling: two-phase program replacement.
//!
//! Phase one compiles the successor while the old program keeps rendering.
//! Phase two is a single atomic exchange of the active program at a chosen
//! frame boundary, followed by state migration keyed by [`StateKey`].
//!
//! Edit classes:
//! - **A** (param-only): swap at the next frame, preserve all state, no
//!   interruption.
//! - **B** (structural, state-preservable): swap at the next frame; cyclic
//!   patches prefer the pulse boundary. State carries for unchanged keys
//!   with matching node kinds.
//! - **C** (identity): time-root kind change, domain identity change, or
//!   changed memory placement. Requires an explicit boundary choice from
//!   the user; nothing resets silently.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use thiserror::Error;

use crate::compile::CompiledProgram;
use crate::eval::Evaluator;
use crate::ident::{DomainId, Hash};
use crate::ir::{IrNode, StateKey};
use crate::patch::Patch;
use crate::telemetry::{NullTelemetrySink, TelemetrySink};
use crate::time::TimeModel;
use crate::value::Value;

/// Classification of an edit between two compiled snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditClass {
    /// Parameter values only; structure is byte-identical.
    A,
    /// Structural but state-preservable.
    B,
    /// Identity-changing; demands an explicit boundary choice.
    C,
}

impl EditClass {
    /// Short label for receipts and telemetry.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        }
    }
}

/// When a pending swap may commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapBoundary {
    /// The next frame boundary.
    NextFrame,
    /// The next pulse of the reserved pulse bus (cyclic patches).
    NextPulse,
    /// Only while the evaluator is frozen.
    WhenFrozen,
    /// Immediately, accepting possible state reinitialization.
    Now,
}

/// Errors raised by swap scheduling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SwapError {
    /// A Class C edit was submitted without an explicit boundary choice.
    #[error("class C edit requires an explicit boundary choice")]
    ChoiceRequired,
    /// The pulse boundary was requested for a non-cyclic patch.
    #[error("pulse boundary requires a cyclic time model")]
    PulseRequiresCyclic,
}

/// A compiled successor waiting for its boundary.
#[derive(Debug)]
pub struct PendingSwap {
    /// The successor program.
    pub program: Arc<CompiledProgram>,
    /// Edit classification.
    pub class: EditClass,
    /// Chosen boundary.
    pub boundary: SwapBoundary,
}

/// What a committed swap did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapReceipt {
    /// Edit classification.
    pub class: EditClass,
    /// Boundary the swap committed at.
    pub boundary: SwapBoundary,
    /// State keys whose slots carried forward.
    pub preserved: Vec<StateKey>,
    /// State keys that reinitialized.
    pub reset: Vec<StateKey>,
    /// Digest of the replaced program.
    pub old_digest: Hash,
    /// Digest of the installed program.
    pub new_digest: Hash,
}

/// Structural digest of a patch: everything except block param values.
///
/// Two patches with equal structural digests differ at most in params,
/// which is exactly the Class A criterion.
fn structural_digest(patch: &Patch) -> Hash {
    let mut stripped = patch.clone();
    for block in &mut stripped.blocks {
        block.params.clear();
    }
    stripped.digest()
}

fn domains_of(program: &CompiledProgram) -> BTreeSet<DomainId> {
    program
        .const_pool
        .iter()
        .filter_map(|v| match v {
            Value::Domain(d) => Some(d.id),
            _ => None,
        })
        .collect()
}

const fn time_kind(model: &TimeModel) -> u8 {
    match model {
        TimeModel::Finite { .. } => 0,
        TimeModel::Cyclic { .. } => 1,
        TimeModel::Infinite { .. } => 2,
    }
}

/// Classifies the edit between two compiled snapshots.
#[must_use]
pub fn classify_edit(
    old_patch: &Patch,
    new_patch: &Patch,
    old_program: &CompiledProgram,
    new_program: &CompiledProgram,
) -> EditClass {
    // Time-root kind change is identity-level.
    if time_kind(&old_program.time_model) != time_kind(&new_program.time_model) {
        return EditClass::C;
    }
    // A domain that disappeared or changed identity invalidates every field
    // buffer and element-keyed artifact downstream.
    let old_domains = domains_of(old_program);
    let new_domains = domains_of(new_program);
    if !old_domains.is_subset(&new_domains) {
        return EditClass::C;
    }
    // Memory placement: a key present in both programs whose node kind
    // changed means a cycle was re-broken somewhere else.
    let kinds = |p: &CompiledProgram| -> BTreeMap<StateKey, _> {
        p.state_keys
            .iter()
            .filter_map(|(node, key)| {
                p.nodes
                    .get(*node as usize)
                    .and_then(IrNode::state_kind)
                    .map(|kind| (*key, kind))
            })
            .collect()
    };
    let old_kinds = kinds(old_program);
    for (key, kind) in kinds(new_program) {
        if old_kinds.get(&key).is_some_and(|old| *old != kind) {
            return EditClass::C;
        }
    }

    if structural_digest(old_patch) == structural_digest(new_patch) {
        EditClass::A
    } else {
        EditClass::B
    }
}

/// Two-phase swap scheduler.
#[derive(Debug)]
pub struct SwapScheduler {
    pending: Option<PendingSwap>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl Default for SwapScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl SwapScheduler {
    /// Scheduler with the null telemetry sink.
    #[must_use]
    pub fn new() -> Self {
        Self::with_telemetry(Arc::new(NullTelemetrySink))
    }

    /// Scheduler with a host telemetry sink.
    #[must_use]
    pub fn with_telemetry(telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self {
            pending: None,
            telemetry,
        }
    }

    /// The swap waiting for its boundary, if any.
    #[must_use]
    pub fn pending(&self) -> Option<&PendingSwap> {
        self.pending.as_ref()
    }

    /// Submits a compiled successor.
    ///
    /// A newer submission supersedes any pending one. `boundary` may be
    /// omitted for Class A/B (the scheduler picks the no-jank default);
    /// Class C demands an explicit choice.
    ///
    /// # Errors
    ///
    /// - [`SwapError::ChoiceRequired`] for Class C without a boundary.
    /// - [`SwapError::PulseRequiresCyclic`] when `NextPulse` is chosen for
    ///   a non-cyclic successor.
    pub fn submit(
        &mut self,
        program: Arc<CompiledProgram>,
        class: EditClass,
        boundary: Option<SwapBoundary>,
    ) -> Result<(), SwapError> {
        let boundary = match (class, boundary) {
            (EditClass::C, None) => return Err(SwapError::ChoiceRequired),
            (_, Some(b)) => b,
            (EditClass::A, None) => SwapBoundary::NextFrame,
            (EditClass::B, None) => {
                if program.time_model.is_cyclic() {
                    SwapBoundary::NextPulse
                } else {
                    SwapBoundary::NextFrame
                }
            }
        };
        if boundary == SwapBoundary::NextPulse && !program.time_model.is_cyclic() {
            return Err(SwapError::PulseRequiresCyclic);
        }
        self.pending = Some(PendingSwap {
            program,
            class,
            boundary,
        });
        Ok(())
    }

    /// Drops any pending swap (a newer edit superseded the compile).
    pub fn discard(&mut self) {
        self.pending = None;
    }

    /// Attempts to commit the pending swap at the current boundary.
    ///
    /// `at_pulse` reports whether the reserved pulse bus fired this frame.
    /// Returns the receipt when the swap committed; `None` while waiting.
    pub fn try_commit(&mut self, eval: &mut Evaluator, at_pulse: bool) -> Option<SwapReceipt> {
        let due = match self.pending.as_ref()?.boundary {
            SwapBoundary::NextFrame | SwapBoundary::Now => true,
            SwapBoundary::NextPulse => at_pulse,
            SwapBoundary::WhenFrozen => eval.is_frozen(),
        };
        if !due {
            return None;
        }
        let PendingSwap {
            program,
            class,
            boundary,
        } = self.pending.take()?;
        let old_digest = eval.program().digest();
        let new_digest = program.digest();
        let receipt = match class {
            EditClass::A => {
                let preserved: Vec<StateKey> = program.state_keys.values().copied().collect();
                eval.retune(program);
                SwapReceipt {
                    class,
                    boundary,
                    preserved,
                    reset: Vec::new(),
                    old_digest,
                    new_digest,
                }
            }
            EditClass::B | EditClass::C => {
                let outcome = eval.install(program);
                SwapReceipt {
                    class,
                    boundary,
                    preserved: outcome.preserved,
                    reset: outcome.reset,
                    old_digest,
                    new_digest,
                }
            }
        };
        self.telemetry.program_swapped(
            receipt.class.label(),
            receipt.preserved.len(),
            receipt.reset.len(),
        );
        Some(receipt)
    }
}
