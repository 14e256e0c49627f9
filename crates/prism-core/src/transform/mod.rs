// SPDX-License-Identifier: Apache-2.0
//! Transform registry: lenses and adapters.
//!
//! A single registry holds both kinds, keyed by stable transform id:
//! - **lenses** are pure, unary, parameterized, and type-preserving; they
//!   match any signal- or field-world type of their declared domain.
//! - **adapters** are pure, unary, type-converting; each carries a policy
//!   (auto / suggest / explicit) and a cost class consumed by the
//!   pathfinder.
//!
//! Registration fails fast: duplicate ids, stateful lenses, and adapters
//! that convert nothing are configuration bugs, not compile diagnostics.

mod adapter;
mod lens;
pub mod pathfind;

pub use adapter::register_canonical_adapters;
pub use lens::register_lens_catalog;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::ident::Hash;
use crate::ir::{BuildError, IrBuilder, ValueRef};
use crate::types::{Category, DomainKind, TypeDesc, World};
use crate::value::Value;

/// Insertion policy of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum AdapterPolicy {
    /// The compiler may insert this adapter silently.
    Auto,
    /// The compiler may propose this adapter; the user must confirm.
    Suggest,
    /// Only a user-supplied instance is accepted.
    Explicit,
}

/// Cost class of an adapter, the pathfinder's distance metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum AdapterCost {
    /// Constant-time value reshaping.
    Cheap,
    /// Per-element or per-frame allocation.
    Medium,
    /// Materializes a field.
    Heavy,
}

impl AdapterCost {
    /// Numeric weight used for shortest-path totals.
    #[must_use]
    pub const fn weight(self) -> u32 {
        match self {
            Self::Cheap => 1,
            Self::Medium => 4,
            Self::Heavy => 16,
        }
    }
}

/// Type pattern an adapter endpoint matches.
///
/// `AnyDomain` is the polymorphic shape used by world-lifting adapters
/// (const → signal, broadcast to field): the domain passes through
/// unchanged. Patterns match the `Core` category only; category crossings
/// are never implicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypePattern {
    /// Matches exactly one type (ignoring bus eligibility).
    Exact(TypeDesc),
    /// Matches any core type of the given world; the domain is preserved
    /// through the adapter.
    AnyDomain(World),
}

impl TypePattern {
    /// Whether the pattern accepts `ty`.
    #[must_use]
    pub fn matches(&self, ty: &TypeDesc) -> bool {
        match self {
            Self::Exact(t) => t.same_shape(ty),
            Self::AnyDomain(world) => ty.world == *world && ty.category == Category::Core,
        }
    }

    /// The concrete type this endpoint takes for a given input type.
    #[must_use]
    pub fn concrete(&self, input: &TypeDesc) -> TypeDesc {
        match self {
            Self::Exact(t) => *t,
            Self::AnyDomain(world) => TypeDesc::new(*world, input.domain),
        }
    }
}

/// Lens or adapter discriminator with kind-specific typing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    /// Type-preserving lens over one domain, any signal/field world.
    Lens {
        /// The domain the lens operates on.
        domain: DomainKind,
    },
    /// Type-converting adapter.
    Adapter {
        /// Input pattern.
        input: TypePattern,
        /// Output pattern.
        output: TypePattern,
        /// Insertion policy.
        policy: AdapterPolicy,
        /// Cost class.
        cost: AdapterCost,
    },
}

/// Declared parameter of a lens.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: &'static str,
    /// Value domain.
    pub domain: DomainKind,
    /// Default when unbound.
    pub default: Value,
    /// UI widget hint (`"slider"`, `"select"`, ...).
    pub ui_hint: &'static str,
    /// Optional numeric range hint.
    pub range: Option<(f64, f64)>,
}

/// Parameter values resolved for a direct `apply` call.
pub type ResolvedParams = BTreeMap<&'static str, Value>;

/// Parameter references resolved for IR compilation.
pub type ParamRefs = BTreeMap<&'static str, ValueRef>;

/// Errors raised by a transform's value-level `apply`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransformError {
    /// The input value's domain does not fit the transform.
    #[error("transform {transform} cannot consume a {got} value")]
    BadInput {
        /// Transform id.
        transform: &'static str,
        /// Offending domain name.
        got: &'static str,
    },
    /// A required parameter was not resolved.
    #[error("transform {transform} is missing param {param}")]
    MissingParam {
        /// Transform id.
        transform: &'static str,
        /// Missing parameter name.
        param: &'static str,
    },
}

/// Errors raised by a transform's `compile` step.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileStepError {
    /// A structural parameter (curve selector, mode) was bound to a live
    /// wire; it must be a literal or default.
    #[error("transform {transform} param {param} must be a constant")]
    NonConstParam {
        /// Transform id.
        transform: &'static str,
        /// Offending parameter name.
        param: &'static str,
    },
    /// A required parameter reference was not supplied.
    #[error("transform {transform} is missing param {param}")]
    MissingParam {
        /// Transform id.
        transform: &'static str,
        /// Missing parameter name.
        param: &'static str,
    },
    /// IR assembly failed.
    #[error(transparent)]
    Build(#[from] BuildError),
}

/// Value-level application function. Pure; lenses may read resolved param
/// bindings.
pub type ApplyFn = fn(&Value, &ResolvedParams) -> Result<Value, TransformError>;

/// IR compilation function.
pub type CompileFn =
    fn(ValueRef, &ParamRefs, &mut IrBuilder) -> Result<ValueRef, CompileStepError>;

/// One registry entry.
#[derive(Debug, Clone)]
pub struct TransformDef {
    /// Stable transform id (the registry key).
    pub name: &'static str,
    /// Lens/adapter discriminator and typing data.
    pub kind: TransformKind,
    /// Declared parameters (lenses; adapters take none).
    pub params: &'static [ParamSpec],
    /// Pure value-level application.
    pub apply: ApplyFn,
    /// IR lowering.
    pub compile: CompileFn,
    /// Statefulness marker. Always false for registrable lenses; the
    /// registry rejects `true` at registration (statefulness belongs in
    /// blocks).
    pub stateful: bool,
}

impl TransformDef {
    /// True for lenses.
    #[must_use]
    pub const fn is_lens(&self) -> bool {
        matches!(self.kind, TransformKind::Lens { .. })
    }

    /// Adapter policy, if this is an adapter.
    #[must_use]
    pub const fn policy(&self) -> Option<AdapterPolicy> {
        match self.kind {
            TransformKind::Adapter { policy, .. } => Some(policy),
            TransformKind::Lens { .. } => None,
        }
    }

    /// Adapter cost, if this is an adapter.
    #[must_use]
    pub const fn cost(&self) -> Option<AdapterCost> {
        match self.kind {
            TransformKind::Adapter { cost, .. } => Some(cost),
            TransformKind::Lens { .. } => None,
        }
    }

    /// Whether this transform accepts an input of type `ty`.
    #[must_use]
    pub fn input_matches(&self, ty: &TypeDesc) -> bool {
        match &self.kind {
            TransformKind::Lens { domain } => {
                ty.domain == *domain && matches!(ty.world, World::Signal | World::Field)
            }
            TransformKind::Adapter { input, .. } => input.matches(ty),
        }
    }

    /// Output type for a matching input type.
    #[must_use]
    pub fn output_type(&self, input: &TypeDesc) -> TypeDesc {
        match &self.kind {
            TransformKind::Lens { .. } => *input,
            TransformKind::Adapter { output, .. } => output.concrete(input),
        }
    }

    /// The canonical input type a non-matching value should be adapted to
    /// before this transform, used for mid-chain auto-insertion.
    #[must_use]
    pub fn preferred_input(&self, current: &TypeDesc) -> TypeDesc {
        match &self.kind {
            TransformKind::Lens { domain } => TypeDesc::signal(*domain),
            TransformKind::Adapter { input, .. } => input.concrete(current),
        }
    }
}

/// Errors raised at registry construction time. These fail fast at startup;
/// they are never compile diagnostics.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A transform with this id already exists.
    #[error("duplicate transform id: {0}")]
    DuplicateTransform(&'static str),
    /// A lens declared itself stateful; statefulness belongs in blocks.
    #[error("stateful lens rejected: {0}")]
    StatefulLens(&'static str),
    /// An adapter whose input and output patterns are identical converts
    /// nothing.
    #[error("adapter converts nothing: {0}")]
    AdapterConvertsNothing(&'static str),
    /// A block type with this name already exists.
    #[error("duplicate block type: {0}")]
    DuplicateBlockType(&'static str),
    /// A block declared the same slot id twice.
    #[error("duplicate slot {slot} on block type {block}")]
    DuplicateSlot {
        /// Block type name.
        block: &'static str,
        /// Offending slot id.
        slot: &'static str,
    },
    /// A block declared a default source whose value does not inhabit the
    /// slot's domain.
    #[error("default source domain mismatch on {block}:{slot}")]
    DefaultSourceMismatch {
        /// Block type name.
        block: &'static str,
        /// Offending slot id.
        slot: &'static str,
    },
}

/// The single transform registry.
#[derive(Debug, Default)]
pub struct TransformRegistry {
    defs: BTreeMap<&'static str, TransformDef>,
}

impl TransformRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the lens catalog and canonical adapters.
    ///
    /// # Errors
    ///
    /// Propagates [`RegistryError`] from catalog registration; the built-in
    /// catalog registering twice is the only way this fails.
    pub fn with_catalog() -> Result<Self, RegistryError> {
        let mut reg = Self::new();
        register_lens_catalog(&mut reg)?;
        register_canonical_adapters(&mut reg)?;
        Ok(reg)
    }

    /// Registers one transform.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::DuplicateTransform`] for id collisions.
    /// - [`RegistryError::StatefulLens`] for lenses flagged stateful.
    /// - [`RegistryError::AdapterConvertsNothing`] for identity adapters.
    pub fn register(&mut self, def: TransformDef) -> Result<(), RegistryError> {
        if self.defs.contains_key(def.name) {
            return Err(RegistryError::DuplicateTransform(def.name));
        }
        if def.stateful && def.is_lens() {
            return Err(RegistryError::StatefulLens(def.name));
        }
        if let TransformKind::Adapter { input, output, .. } = &def.kind {
            if input == output {
                return Err(RegistryError::AdapterConvertsNothing(def.name));
            }
        }
        self.defs.insert(def.name, def);
        Ok(())
    }

    /// Looks up a transform by id.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TransformDef> {
        self.defs.get(name)
    }

    /// All transforms in ascending id order (the pathfinder's deterministic
    /// enumeration order).
    pub fn iter(&self) -> impl Iterator<Item = &TransformDef> {
        self.defs.values()
    }

    /// All adapters in ascending id order.
    pub fn adapters(&self) -> impl Iterator<Item = &TransformDef> {
        self.iter().filter(|d| !d.is_lens())
    }

    /// Canonical digest over the registered id set and typing data.
    ///
    /// Folded into program digests so "same patch, same registry version"
    /// is checkable, not assumed.
    #[must_use]
    pub fn digest(&self) -> Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"transform-registry:");
        for def in self.defs.values() {
            hasher.update(&(def.name.len() as u64).to_le_bytes());
            hasher.update(def.name.as_bytes());
            match &def.kind {
                TransformKind::Lens { domain } => {
                    hasher.update(&[0u8]);
                    hasher.update(domain.name().as_bytes());
                }
                TransformKind::Adapter {
                    input,
                    output,
                    policy,
                    cost,
                } => {
                    hasher.update(&[1u8]);
                    hasher.update(format!("{input:?}|{output:?}|{policy:?}|{cost:?}").as_bytes());
                }
            }
        }
        hasher.finalize().into()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn identity_apply(v: &Value, _: &ResolvedParams) -> Result<Value, TransformError> {
        Ok(v.clone())
    }

    fn identity_compile(
        input: ValueRef,
        _: &ParamRefs,
        _: &mut IrBuilder,
    ) -> Result<ValueRef, CompileStepError> {
        Ok(input)
    }

    fn test_lens(name: &'static str, stateful: bool) -> TransformDef {
        TransformDef {
            name,
            kind: TransformKind::Lens {
                domain: DomainKind::Float,
            },
            params: &[],
            apply: identity_apply,
            compile: identity_compile,
            stateful,
        }
    }

    #[test]
    fn duplicate_ids_fail_fast() {
        let mut reg = TransformRegistry::new();
        reg.register(test_lens("x", false)).unwrap();
        assert_eq!(
            reg.register(test_lens("x", false)),
            Err(RegistryError::DuplicateTransform("x"))
        );
    }

    #[test]
    fn stateful_lenses_are_rejected() {
        let mut reg = TransformRegistry::new();
        assert_eq!(
            reg.register(test_lens("smooth", true)),
            Err(RegistryError::StatefulLens("smooth"))
        );
    }

    #[test]
    fn identity_adapters_are_rejected() {
        let mut reg = TransformRegistry::new();
        let def = TransformDef {
            name: "noop",
            kind: TransformKind::Adapter {
                input: TypePattern::AnyDomain(World::Signal),
                output: TypePattern::AnyDomain(World::Signal),
                policy: AdapterPolicy::Auto,
                cost: AdapterCost::Cheap,
            },
            params: &[],
            apply: identity_apply,
            compile: identity_compile,
            stateful: false,
        };
        assert_eq!(
            reg.register(def),
            Err(RegistryError::AdapterConvertsNothing("noop"))
        );
    }

    #[test]
    fn lenses_match_signal_and_field_worlds_of_their_domain() {
        let lens = test_lens("g", false);
        assert!(lens.input_matches(&TypeDesc::signal(DomainKind::Float)));
        assert!(lens.input_matches(&TypeDesc::field(DomainKind::Float)));
        assert!(!lens.input_matches(&TypeDesc::scalar(DomainKind::Float)));
        assert!(!lens.input_matches(&TypeDesc::signal(DomainKind::Phase)));
    }

    #[test]
    fn catalog_builds_and_digest_is_stable() {
        let a = TransformRegistry::with_catalog().unwrap();
        let b = TransformRegistry::with_catalog().unwrap();
        assert_eq!(a.digest(), b.digest());
    }
}
