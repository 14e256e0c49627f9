// SPDX-License-Identifier: Apache-2.0
//! Block registry: slot signatures, default sources, compile functions.
//!
//! A [`BlockDef`] is a static descriptor with fn-pointer callbacks, the same
//! shape rewrite rules take in a rule table: data describes the interface,
//! functions implement the lowering. Hosts register additional defs before
//! compiling; registration fails fast on malformed descriptors.
//!
//! Two compile forms exist:
//! - **V2** receives resolved input [`ValueRef`]s and an [`IrBuilder`] and
//!   returns output refs.
//! - **V1** (legacy) receives const-resolvable inputs as plain values and
//!   returns [`Artifact`]s; the lowering pass bridges artifacts into
//!   `const`/`closure` nodes so V2 consumers see ordinary refs.

mod basic;
mod bus;
mod default_source;
mod field;
mod time_root;

pub use bus::bus_type_for;
pub use default_source::provider_type_for;
pub use time_root::{publish_reserved, time_model_of};

use std::collections::BTreeMap;

use thiserror::Error;

use crate::combine::CombinePolicy;
use crate::ident::{BlockId, Hash};
use crate::ir::{BuildError, IrBuilder, OpaqueFn, ValueRef};
use crate::patch::BlockRole;
use crate::transform::RegistryError;
use crate::types::TypeDesc;
use crate::value::Value;

/// Default source attached to an input slot: the value a synthesized hidden
/// provider emits when nothing is wired.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultSource {
    /// Constant default of the slot's domain.
    Const(Value),
}

impl DefaultSource {
    /// The provider's emitted value.
    #[must_use]
    pub const fn value(&self) -> &Value {
        match self {
            Self::Const(v) => v,
        }
    }
}

/// One declared input slot.
#[derive(Debug, Clone)]
pub struct SlotDef {
    /// Slot id, unique within the block.
    pub id: &'static str,
    /// Declared type.
    pub ty: TypeDesc,
    /// Default source materialized when the slot is unwired; `None` makes
    /// the slot required.
    pub default_source: Option<DefaultSource>,
    /// Multi-writer combine policy (instances may override per slot).
    pub combine: CombinePolicy,
}

/// One declared output slot.
#[derive(Debug, Clone, Copy)]
pub struct OutputDef {
    /// Slot id, unique within the block.
    pub id: &'static str,
    /// Produced type.
    pub ty: TypeDesc,
}

/// Compile-time arguments handed to a V2 block compile function.
#[derive(Debug)]
pub struct BlockArgs<'a> {
    /// The block instance being compiled.
    pub id: BlockId,
    /// Instance params from the patch.
    pub params: &'a BTreeMap<String, Value>,
    /// Resolved input refs, one per non-deferred slot, post-combine.
    pub inputs: &'a BTreeMap<&'static str, ValueRef>,
}

impl BlockArgs<'_> {
    /// Instance param lookup.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Numeric param with fallback.
    #[must_use]
    pub fn param_f64(&self, key: &str, fallback: f64) -> f64 {
        self.params
            .get(key)
            .and_then(Value::as_f64)
            .unwrap_or(fallback)
    }

    /// Resolved input ref for a slot.
    ///
    /// # Errors
    ///
    /// [`BlockError::MissingInput`] when the lowering pass did not supply
    /// the slot (a compiler invariant violation, not a user error).
    pub fn input(&self, slot: &'static str) -> Result<ValueRef, BlockError> {
        self.inputs
            .get(slot)
            .copied()
            .ok_or(BlockError::MissingInput { slot })
    }
}

/// Compile-time arguments handed to a legacy V1 block compile function.
///
/// V1 blocks predate the builder; they only observe inputs that resolve to
/// compile-time constants and express dynamics through closures.
#[derive(Debug)]
pub struct V1Args<'a> {
    /// The block instance being compiled.
    pub id: BlockId,
    /// Instance params from the patch.
    pub params: &'a BTreeMap<String, Value>,
    /// Const-resolvable inputs; wire-driven inputs appear as `None`.
    pub inputs: &'a BTreeMap<&'static str, Option<Value>>,
}

/// Output of a V1 block: a typed value or closure.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Produced type.
    pub ty: TypeDesc,
    /// Constant or closure payload.
    pub value: ArtifactValue,
}

/// Payload of a V1 [`Artifact`].
#[derive(Debug, Clone)]
pub enum ArtifactValue {
    /// Compile-time constant; bridges to a `const` node.
    Const(Value),
    /// Per-frame closure; bridges to a `closure` node.
    Closure(OpaqueFn),
}

/// Errors raised by block compile functions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockError {
    /// The lowering pass did not supply a declared input.
    #[error("missing input {slot}")]
    MissingInput {
        /// Slot id.
        slot: &'static str,
    },
    /// A structural param had the wrong domain or a non-constant binding.
    #[error("bad param {param}")]
    BadParam {
        /// Param name.
        param: &'static str,
    },
    /// IR assembly failed.
    #[error(transparent)]
    Build(#[from] BuildError),
}

/// Output refs keyed by output slot id.
pub type Outputs = BTreeMap<&'static str, ValueRef>;

/// V2 compile function.
pub type CompileV2Fn = fn(&BlockArgs<'_>, &mut IrBuilder) -> Result<Outputs, BlockError>;

/// V1 compile function.
pub type CompileV1Fn = fn(&V1Args<'_>) -> Result<BTreeMap<&'static str, Artifact>, BlockError>;

/// Either compile form.
#[derive(Debug, Clone, Copy)]
pub enum BlockCompile {
    /// Builder-form compile.
    V2(CompileV2Fn),
    /// Legacy closure-form compile; bridged automatically.
    V1(CompileV1Fn),
}

/// Static descriptor of a block type.
#[derive(Debug, Clone)]
pub struct BlockDef {
    /// Stable type name (the registry key).
    pub type_name: &'static str,
    /// Distinguished role, if any.
    pub role: Option<BlockRole>,
    /// Hidden block types never appear on the canvas.
    pub hidden: bool,
    /// Ordered input slots.
    pub inputs: &'static [SlotDef],
    /// Ordered output slots.
    pub outputs: &'static [OutputDef],
    /// Input slot whose value is read through state rather than in the
    /// current frame. Edges into it do not constrain evaluation order, which
    /// is what makes feedback through this block legal; link resolution
    /// patches the value in after lowering.
    pub deferred_input: Option<&'static str>,
    /// Compile callback.
    pub compile: BlockCompile,
}

impl BlockDef {
    /// Input slot lookup.
    #[must_use]
    pub fn input(&self, id: &str) -> Option<&SlotDef> {
        self.inputs.iter().find(|s| s.id == id)
    }

    /// Output slot lookup.
    #[must_use]
    pub fn output(&self, id: &str) -> Option<&OutputDef> {
        self.outputs.iter().find(|o| o.id == id)
    }

    /// True when this block type carries per-frame state that survives
    /// swaps (equivalently: when feedback through it is legal).
    #[must_use]
    pub const fn is_memory(&self) -> bool {
        self.deferred_input.is_some()
    }
}

/// The pluggable block registry.
#[derive(Debug, Default)]
pub struct BlockRegistry {
    defs: BTreeMap<&'static str, BlockDef>,
}

impl BlockRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the system blocks the core relies on:
    /// time roots, buses, default-source providers, and the basic
    /// signal/field archetypes.
    ///
    /// # Errors
    ///
    /// Propagates [`RegistryError`]; the built-in set registering twice is
    /// the only way this fails.
    pub fn with_system_blocks() -> Result<Self, RegistryError> {
        let mut reg = Self::new();
        basic::register(&mut reg)?;
        field::register(&mut reg)?;
        time_root::register(&mut reg)?;
        bus::register(&mut reg)?;
        default_source::register(&mut reg)?;
        Ok(reg)
    }

    /// Registers one block type after validating its descriptor.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::DuplicateBlockType`] for name collisions.
    /// - [`RegistryError::DuplicateSlot`] for repeated slot ids.
    /// - [`RegistryError::DefaultSourceMismatch`] when a default value does
    ///   not inhabit its slot's domain.
    pub fn register(&mut self, def: BlockDef) -> Result<(), RegistryError> {
        if self.defs.contains_key(def.type_name) {
            return Err(RegistryError::DuplicateBlockType(def.type_name));
        }
        // Input and output slots are separate namespaces (a block may
        // legitimately pair an input `phase` with an output `phase`).
        let mut seen_inputs: Vec<&'static str> = Vec::new();
        for slot in def.inputs {
            if seen_inputs.contains(&slot.id) {
                return Err(RegistryError::DuplicateSlot {
                    block: def.type_name,
                    slot: slot.id,
                });
            }
            seen_inputs.push(slot.id);
            if let Some(source) = &slot.default_source {
                if source.value().domain_kind() != slot.ty.domain {
                    return Err(RegistryError::DefaultSourceMismatch {
                        block: def.type_name,
                        slot: slot.id,
                    });
                }
            }
        }
        let mut seen_outputs: Vec<&'static str> = Vec::new();
        for out in def.outputs {
            if seen_outputs.contains(&out.id) {
                return Err(RegistryError::DuplicateSlot {
                    block: def.type_name,
                    slot: out.id,
                });
            }
            seen_outputs.push(out.id);
        }
        self.defs.insert(def.type_name, def);
        Ok(())
    }

    /// Looks up a block type.
    #[must_use]
    pub fn get(&self, type_name: &str) -> Option<&BlockDef> {
        self.defs.get(type_name)
    }

    /// All registered defs in ascending type-name order.
    pub fn iter(&self) -> impl Iterator<Item = &BlockDef> {
        self.defs.values()
    }

    /// Canonical digest over registered type names and slot signatures,
    /// folded into program digests.
    #[must_use]
    pub fn digest(&self) -> Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"block-registry:");
        for def in self.defs.values() {
            hasher.update(&(def.type_name.len() as u64).to_le_bytes());
            hasher.update(def.type_name.as_bytes());
            for slot in def.inputs {
                hasher.update(slot.id.as_bytes());
                hasher.update(slot.ty.to_string().as_bytes());
            }
            for out in def.outputs {
                hasher.update(out.id.as_bytes());
                hasher.update(out.ty.to_string().as_bytes());
            }
        }
        hasher.finalize().into()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::DomainKind;

    fn no_compile(_: &BlockArgs<'_>, _: &mut IrBuilder) -> Result<Outputs, BlockError> {
        Ok(Outputs::new())
    }

    #[test]
    fn system_registry_builds() {
        let reg = BlockRegistry::with_system_blocks().unwrap();
        for ty in [
            "const",
            "oscillator",
            "add",
            "multiply",
            "delay",
            "integrate",
            "sampleHold",
            "gridDomain",
            "fieldCoord",
            "renderInstances",
            "finiteTimeRoot",
            "cycleTimeRoot",
            "infiniteTimeRoot",
            "bus.phase",
            "bus.event",
            "ds.signal.float",
        ] {
            assert!(reg.get(ty).is_some(), "missing system block {ty}");
        }
    }

    #[test]
    fn duplicate_type_names_fail_fast() {
        static NO_SLOTS: &[SlotDef] = &[];
        static NO_OUTS: &[OutputDef] = &[];
        let def = || BlockDef {
            type_name: "x",
            role: None,
            hidden: false,
            inputs: NO_SLOTS,
            outputs: NO_OUTS,
            deferred_input: None,
            compile: BlockCompile::V2(no_compile),
        };
        let mut reg = BlockRegistry::new();
        reg.register(def()).unwrap();
        assert_eq!(
            reg.register(def()),
            Err(RegistryError::DuplicateBlockType("x"))
        );
    }

    #[test]
    fn default_source_domains_are_validated() {
        static BAD: &[SlotDef] = &[SlotDef {
            id: "in",
            ty: TypeDesc::signal(DomainKind::Phase),
            default_source: Some(DefaultSource::Const(Value::Number(0.0))),
            combine: CombinePolicy::latest(),
        }];
        static NO_OUTS: &[OutputDef] = &[];
        let mut reg = BlockRegistry::new();
        let result = reg.register(BlockDef {
            type_name: "bad",
            role: None,
            hidden: false,
            inputs: BAD,
            outputs: NO_OUTS,
            deferred_input: None,
            compile: BlockCompile::V2(no_compile),
        });
        assert_eq!(
            result,
            Err(RegistryError::DefaultSourceMismatch {
                block: "bad",
                slot: "in",
            })
        );
    }

    #[test]
    fn registry_digests_are_stable() {
        let a = BlockRegistry::with_system_blocks().unwrap();
        let b = BlockRegistry::with_system_blocks().unwrap();
        assert_eq!(a.digest(), b.digest());
    }
}
