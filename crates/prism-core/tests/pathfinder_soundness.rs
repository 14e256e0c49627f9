// SPDX-License-Identifier: Apache-2.0

//! Pathfinder soundness: returned paths type-check end to end, and an
//! auto-only `None` really means no short auto path exists.

#![allow(missing_docs)]

use prism_core::transform::pathfind::{PathCtx, Pathfinder};
use prism_core::transform::{AdapterPolicy, TransformRegistry};
use prism_core::{assignable, DomainKind, TypeDesc, World};

fn all_types() -> Vec<TypeDesc> {
    let domains = [
        DomainKind::Float,
        DomainKind::Phase,
        DomainKind::Unit,
        DomainKind::Duration,
        DomainKind::Color,
        DomainKind::Vec2,
        DomainKind::Point,
        DomainKind::Time,
        DomainKind::Rate,
        DomainKind::Bool,
    ];
    let mut types = Vec::new();
    for world in [World::Scalar, World::Signal, World::Field] {
        for domain in domains {
            types.push(TypeDesc::new(world, domain));
        }
    }
    types.push(TypeDesc::event());
    types
}

/// Applies a path's adapters over a starting type, if the chain matches.
fn walk(reg: &TransformRegistry, from: TypeDesc, steps: &[&str]) -> Option<TypeDesc> {
    let mut current = from;
    for name in steps {
        let def = reg.get(name)?;
        if !def.input_matches(&current) {
            return None;
        }
        current = def.output_type(&current);
    }
    Some(current)
}

/// Brute-force: does any auto-only path of length ≤ 2 exist?
fn exhaustive_auto_path(reg: &TransformRegistry, from: &TypeDesc, to: &TypeDesc) -> bool {
    let autos: Vec<_> = reg
        .adapters()
        .filter(|d| d.policy() == Some(AdapterPolicy::Auto))
        .collect();
    for head in &autos {
        if !head.input_matches(from) {
            continue;
        }
        let mid = head.output_type(from);
        if assignable(&mid, to) {
            return true;
        }
        for tail in &autos {
            if tail.input_matches(&mid) && assignable(&tail.output_type(&mid), to) {
                return true;
            }
        }
    }
    false
}

#[test]
fn returned_paths_always_type_check() {
    let reg = TransformRegistry::with_catalog().expect("catalog");
    let mut finder = Pathfinder::new();
    let ctx = PathCtx {
        allow_explicit: true,
        allow_heavy: true,
    };
    for from in all_types() {
        for to in all_types() {
            if let Some(path) = finder.find(&reg, &from, &to, ctx) {
                let end = walk(&reg, from, &path.steps)
                    .unwrap_or_else(|| panic!("path {:?} does not chain from {from}", path.steps));
                assert!(
                    assignable(&end, &to),
                    "path {:?} ends at {end}, not assignable to {to}",
                    path.steps
                );
                assert!(path.steps.len() <= 2);
            }
        }
    }
}

#[test]
fn auto_only_none_is_complete() {
    let reg = TransformRegistry::with_catalog().expect("catalog");
    let mut finder = Pathfinder::new();
    for from in all_types() {
        for to in all_types() {
            let found = finder.find(&reg, &from, &to, PathCtx::default());
            let confirmed_auto = found
                .as_ref()
                .is_some_and(|p| !p.requires_confirmation && !p.steps.is_empty());
            if !confirmed_auto && !assignable(&from, &to) {
                assert!(
                    !exhaustive_auto_path(&reg, &from, &to),
                    "pathfinder missed an auto path {from} → {to}"
                );
            }
        }
    }
}

#[test]
fn selection_prefers_cheaper_then_shorter_paths() {
    let reg = TransformRegistry::with_catalog().expect("catalog");
    let mut finder = Pathfinder::new();
    // scalar:float → field:float: one medium broadcast (4) beats
    // const-to-signal + broadcast (1 + 4).
    let path = finder
        .find(
            &reg,
            &TypeDesc::scalar(DomainKind::Float),
            &TypeDesc::field(DomainKind::Float),
            PathCtx::default(),
        )
        .expect("path must exist");
    assert_eq!(path.steps, vec!["BroadcastScalarToField"]);
    assert_eq!(path.total_cost, 4);
}
