// SPDX-License-Identifier: Apache-2.0
//! Deterministic adapter pathfinder.
//!
//! Ordering invariant:
//! - Candidate sequences are enumerated in ascending registry-id order, so
//!   the search itself is deterministic before any selection happens.
//! - Selection minimizes total cost, then step count, then the
//!   lexicographic id list. Two registries with equal content therefore
//!   always produce the same path.
//!
//! Paths are at most two adapters long. When no path survives the policy
//! filter but a suggest-policy path exists, it is returned flagged
//! `requires_confirmation` instead of being silently dropped.

use rustc_hash::FxHashMap;

use crate::transform::{AdapterCost, AdapterPolicy, TransformDef, TransformRegistry};
use crate::types::{assignable, TypeDesc};

/// Policy context for one pathfinding query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PathCtx {
    /// Permit explicit-policy adapters (user already confirmed placement).
    pub allow_explicit: bool,
    /// Permit heavy-cost adapters.
    pub allow_heavy: bool,
}

/// A found adapter path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterPath {
    /// Adapter ids in application order; empty when the types were already
    /// assignable.
    pub steps: Vec<&'static str>,
    /// Sum of step cost weights.
    pub total_cost: u32,
    /// True when the path uses suggest-policy adapters under an auto-only
    /// query and therefore needs user confirmation before insertion.
    pub requires_confirmation: bool,
}

impl AdapterPath {
    const fn empty() -> Self {
        Self {
            steps: Vec::new(),
            total_cost: 0,
            requires_confirmation: false,
        }
    }
}

/// Memoizing pathfinder.
///
/// The cache key includes the full policy context; results are only valid
/// for the registry the finder was queried with, which callers guarantee by
/// owning one finder per registry (the compiler embeds one per compilation
/// session).
#[derive(Debug, Default)]
pub struct Pathfinder {
    cache: FxHashMap<(TypeDesc, TypeDesc, PathCtx), Option<AdapterPath>>,
}

impl Pathfinder {
    /// Empty pathfinder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds the best adapter path from `from` to `to` under `ctx`.
    ///
    /// Returns `None` when no path of length ≤ 2 exists even with suggest
    /// adapters considered.
    pub fn find(
        &mut self,
        reg: &TransformRegistry,
        from: &TypeDesc,
        to: &TypeDesc,
        ctx: PathCtx,
    ) -> Option<AdapterPath> {
        let key = (*from, *to, ctx);
        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }
        let result = Self::search(reg, from, to, ctx);
        self.cache.insert(key, result.clone());
        result
    }

    fn search(
        reg: &TransformRegistry,
        from: &TypeDesc,
        to: &TypeDesc,
        ctx: PathCtx,
    ) -> Option<AdapterPath> {
        if assignable(from, to) {
            return Some(AdapterPath::empty());
        }
        // First pass: policies the context allows outright.
        if let Some(path) = Self::best_path(reg, from, to, ctx, false) {
            return Some(path);
        }
        // Fallback: widen to suggest-policy adapters; the result demands
        // confirmation.
        let mut path = Self::best_path(reg, from, to, ctx, true)?;
        path.requires_confirmation = true;
        Some(path)
    }

    fn policy_allowed(def: &TransformDef, ctx: PathCtx, include_suggest: bool) -> bool {
        let Some(policy) = def.policy() else {
            return false;
        };
        let Some(cost) = def.cost() else {
            return false;
        };
        if cost == AdapterCost::Heavy && !ctx.allow_heavy {
            return false;
        }
        match policy {
            AdapterPolicy::Auto => true,
            AdapterPolicy::Suggest => include_suggest,
            AdapterPolicy::Explicit => ctx.allow_explicit,
        }
    }

    fn best_path(
        reg: &TransformRegistry,
        from: &TypeDesc,
        to: &TypeDesc,
        ctx: PathCtx,
        include_suggest: bool,
    ) -> Option<AdapterPath> {
        let mut best: Option<AdapterPath> = None;
        let mut consider = |candidate: AdapterPath| {
            let better = match &best {
                None => true,
                Some(current) => {
                    (candidate.total_cost, candidate.steps.len(), &candidate.steps)
                        < (current.total_cost, current.steps.len(), &current.steps)
                }
            };
            if better {
                best = Some(candidate);
            }
        };

        for head in reg.adapters() {
            if !Self::policy_allowed(head, ctx, include_suggest) || !head.input_matches(from) {
                continue;
            }
            let mid = head.output_type(from);
            let head_cost = head.cost().map_or(0, AdapterCost::weight);
            if assignable(&mid, to) {
                consider(AdapterPath {
                    steps: vec![head.name],
                    total_cost: head_cost,
                    requires_confirmation: false,
                });
                continue;
            }
            for tail in reg.adapters() {
                if !Self::policy_allowed(tail, ctx, include_suggest)
                    || !tail.input_matches(&mid)
                {
                    continue;
                }
                let out = tail.output_type(&mid);
                if assignable(&out, to) {
                    consider(AdapterPath {
                        steps: vec![head.name, tail.name],
                        total_cost: head_cost + tail.cost().map_or(0, AdapterCost::weight),
                        requires_confirmation: false,
                    });
                }
            }
        }
        best
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::transform::TransformRegistry;
    use crate::types::DomainKind;

    fn registry() -> TransformRegistry {
        TransformRegistry::with_catalog().unwrap()
    }

    #[test]
    fn assignable_types_yield_the_empty_path() {
        let reg = registry();
        let mut finder = Pathfinder::new();
        let t = TypeDesc::signal(DomainKind::Float);
        let path = finder.find(&reg, &t, &t, PathCtx::default()).unwrap();
        assert!(path.steps.is_empty());
        assert_eq!(path.total_cost, 0);
    }

    #[test]
    fn const_to_signal_is_found_auto_only() {
        let reg = registry();
        let mut finder = Pathfinder::new();
        let path = finder
            .find(
                &reg,
                &TypeDesc::scalar(DomainKind::Float),
                &TypeDesc::signal(DomainKind::Float),
                PathCtx::default(),
            )
            .unwrap();
        assert_eq!(path.steps, vec!["ConstToSignal"]);
        assert!(!path.requires_confirmation);
    }

    #[test]
    fn two_step_paths_compose() {
        // scalar:phase → signal:phase → signal:float.
        let reg = registry();
        let mut finder = Pathfinder::new();
        let path = finder
            .find(
                &reg,
                &TypeDesc::scalar(DomainKind::Phase),
                &TypeDesc::signal(DomainKind::Float),
                PathCtx::default(),
            )
            .unwrap();
        assert_eq!(path.steps, vec!["ConstToSignal", "PhaseToNumber"]);
    }

    #[test]
    fn suggest_paths_require_confirmation_under_auto_only() {
        let reg = registry();
        let mut finder = Pathfinder::new();
        let path = finder
            .find(
                &reg,
                &TypeDesc::signal(DomainKind::Float),
                &TypeDesc::signal(DomainKind::Phase),
                PathCtx::default(),
            )
            .unwrap();
        assert_eq!(path.steps, vec!["NormalizeToPhase"]);
        assert!(path.requires_confirmation);
    }

    #[test]
    fn heavy_adapters_are_gated() {
        let reg = registry();
        let mut finder = Pathfinder::new();
        let from = TypeDesc::field(DomainKind::Float);
        let to = TypeDesc::signal(DomainKind::Float);
        assert!(finder.find(&reg, &from, &to, PathCtx::default()).is_none());
        let widened = PathCtx {
            allow_explicit: true,
            allow_heavy: true,
        };
        let path = finder.find(&reg, &from, &to, widened).unwrap();
        assert_eq!(path.steps, vec!["ReduceFieldToSignal.max"]);
        assert!(!path.requires_confirmation);
    }

    #[test]
    fn results_are_deterministic_across_finders() {
        let reg = registry();
        let from = TypeDesc::scalar(DomainKind::Float);
        let to = TypeDesc::field(DomainKind::Float);
        let a = Pathfinder::new().find(&reg, &from, &to, PathCtx::default());
        let b = Pathfinder::new().find(&reg, &from, &to, PathCtx::default());
        assert_eq!(a, b);
        // Direct broadcast beats const→signal→broadcast on cost.
        assert_eq!(a.unwrap().steps, vec!["BroadcastScalarToField"]);
    }
}
