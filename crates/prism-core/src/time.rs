// SPDX-License-Identifier: Apache-2.0
//! Time topology: the `TimeModel` and the reserved bus table.
//!
//! Exactly one TimeRoot block exists per patch. The model it declares is a
//! pure function of the block's type name and params; the runtime and the
//! UI derive playback affordances (scrubbing, export paths, loop handles)
//! from it without inspecting the graph again.

use crate::types::{DomainKind, TypeDesc};

/// Wrap behavior of a cyclic time root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CycleMode {
    /// Phase wraps from 1 back to 0.
    Loop,
    /// Phase reflects: 0 → 1 → 0.
    PingPong,
}

/// Patch-level time topology, derived from the single TimeRoot.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TimeModel {
    /// One-shot timeline of fixed length.
    Finite {
        /// Total duration in milliseconds.
        duration_ms: f64,
    },
    /// Repeating timeline.
    Cyclic {
        /// Period of one cycle in milliseconds.
        period_ms: f64,
        /// Wrap behavior at cycle boundaries.
        mode: CycleMode,
    },
    /// Unbounded timeline with a rolling analysis window.
    Infinite {
        /// Rolling window length in milliseconds.
        window_ms: f64,
    },
}

impl TimeModel {
    /// True for cyclic topologies; hot-swap prefers pulse boundaries only
    /// for these.
    #[must_use]
    pub const fn is_cyclic(&self) -> bool {
        matches!(self, Self::Cyclic { .. })
    }
}

/// Reserved bus identifiers with their required types.
///
/// Only the TimeRoot (and explicit user publishers) may write these; a bus
/// block carrying a reserved id with a non-matching type is a fatal
/// `ReservedBusTypeMismatch`.
pub const RESERVED_BUSES: &[(&str, TypeDesc)] = &[
    ("phaseA", TypeDesc::signal(DomainKind::Phase)),
    ("phaseB", TypeDesc::signal(DomainKind::Phase)),
    ("pulse", TypeDesc::event()),
    ("energy", TypeDesc::signal(DomainKind::Float)),
    ("palette", TypeDesc::signal(DomainKind::Color)),
    ("progress", TypeDesc::signal(DomainKind::Unit)),
];

/// Looks up the required type of a reserved bus id.
#[must_use]
pub fn reserved_bus_type(name: &str) -> Option<TypeDesc> {
    RESERVED_BUSES
        .iter()
        .find(|(id, _)| *id == name)
        .map(|(_, ty)| *ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_table_covers_canonical_ids() {
        for id in ["phaseA", "phaseB", "pulse", "energy", "palette", "progress"] {
            assert!(reserved_bus_type(id).is_some(), "missing reserved bus {id}");
        }
        assert!(reserved_bus_type("phaseC").is_none());
    }

    #[test]
    fn primary_phase_is_signal_phase() {
        assert_eq!(
            reserved_bus_type("phaseA"),
            Some(TypeDesc::signal(DomainKind::Phase))
        );
    }

    #[test]
    fn only_cyclic_models_are_cyclic() {
        assert!(TimeModel::Cyclic {
            period_ms: 1000.0,
            mode: CycleMode::Loop
        }
        .is_cyclic());
        assert!(!TimeModel::Finite { duration_ms: 1.0 }.is_cyclic());
        assert!(!TimeModel::Infinite { window_ms: 1.0 }.is_cyclic());
    }
}
