// SPDX-License-Identifier: Apache-2.0
//! Type descriptors for the three value worlds.
//!
//! A value's type is `(world, domain, category, bus_eligible)`:
//! - `world` is the structural kind: compile-time scalar, time-varying
//!   signal, per-element field, or discrete event stream.
//! - `domain` is the semantic content (float, phase, color, ...).
//! - `category` is a one-way relaxation: `Core` is assignable to `Internal`
//!   of the same world/domain; the reverse requires an explicit adapter.
//! - `bus_eligible` gates whether the type may flow through buses. It is
//!   ignored by structural equality used for transform dispatch.

use thiserror::Error;

/// Structural kind of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum World {
    /// Compile-time constant.
    Scalar,
    /// Time-varying sample, one value per frame.
    Signal,
    /// Per-element value over a [`crate::value::DomainDesc`].
    Field,
    /// Discrete pulse stream; at most one pulse per frame.
    Event,
}

impl World {
    /// Lowercase name used in formatted types and diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::Signal => "signal",
            Self::Field => "field",
            Self::Event => "event",
        }
    }
}

/// Semantic content of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DomainKind {
    /// IEEE-754 double.
    Float,
    /// Signed 64-bit integer.
    Int,
    /// Cyclic position in `[0, 1)`.
    Phase,
    /// Clamped position in `[0, 1]`.
    Unit,
    /// Duration in milliseconds.
    Duration,
    /// RGBA color, linear components.
    Color,
    /// 2-vector.
    Vec2,
    /// 2-D point (position semantics, distinct from direction vectors).
    Point,
    /// UTF-8 string.
    Str,
    /// Waveform shape selector.
    Waveform,
    /// Absolute time in milliseconds since program start.
    Time,
    /// Rate multiplier (unitless, per-second semantics defined by consumers).
    Rate,
    /// Boolean.
    Bool,
    /// Field domain artifact (element set with stable identity and order).
    Domain,
}

impl DomainKind {
    /// Lowercase name used in formatted types and in the persisted form.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Int => "int",
            Self::Phase => "phase",
            Self::Unit => "unit",
            Self::Duration => "duration",
            Self::Color => "color",
            Self::Vec2 => "vec2",
            Self::Point => "point",
            Self::Str => "string",
            Self::Waveform => "waveform",
            Self::Time => "time",
            Self::Rate => "rate",
            Self::Bool => "boolean",
            Self::Domain => "domain",
        }
    }

    /// Parses a persisted domain name.
    ///
    /// # Errors
    ///
    /// Returns [`TypeParseError::UnknownDomain`] when the name is not part of
    /// the closed domain vocabulary.
    pub fn parse(name: &str) -> Result<Self, TypeParseError> {
        Ok(match name {
            "float" => Self::Float,
            "int" => Self::Int,
            "phase" => Self::Phase,
            "unit" => Self::Unit,
            "duration" => Self::Duration,
            "color" => Self::Color,
            "vec2" => Self::Vec2,
            "point" => Self::Point,
            "string" => Self::Str,
            "waveform" => Self::Waveform,
            "time" => Self::Time,
            "rate" => Self::Rate,
            "boolean" => Self::Bool,
            "domain" => Self::Domain,
            other => return Err(TypeParseError::UnknownDomain(other.to_owned())),
        })
    }
}

/// One-way category relaxation.
///
/// `Core` types are the public vocabulary; `Internal` types are compiler- or
/// block-private. Assignment from `Core` into `Internal` is free; the reverse
/// direction requires an explicit adapter (never auto-inserted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Category {
    /// Public, host-visible type vocabulary.
    Core,
    /// Compiler/block-private relaxation of a core type.
    Internal,
}

impl Category {
    /// Lowercase name used in formatted types.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Internal => "internal",
        }
    }
}

/// Full type descriptor: `(world, domain, category, bus_eligible)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TypeDesc {
    /// Structural kind.
    pub world: World,
    /// Semantic content.
    pub domain: DomainKind,
    /// One-way relaxation category.
    pub category: Category,
    /// Whether values of this type may flow through buses.
    pub bus_eligible: bool,
}

impl TypeDesc {
    /// Core, bus-eligible type of the given world and domain.
    #[must_use]
    pub const fn new(world: World, domain: DomainKind) -> Self {
        Self {
            world,
            domain,
            category: Category::Core,
            bus_eligible: true,
        }
    }

    /// Shorthand for `scalar` world types.
    #[must_use]
    pub const fn scalar(domain: DomainKind) -> Self {
        Self::new(World::Scalar, domain)
    }

    /// Shorthand for `signal` world types.
    #[must_use]
    pub const fn signal(domain: DomainKind) -> Self {
        Self::new(World::Signal, domain)
    }

    /// Shorthand for `field` world types.
    #[must_use]
    pub const fn field(domain: DomainKind) -> Self {
        Self::new(World::Field, domain)
    }

    /// The event pulse type.
    #[must_use]
    pub const fn event() -> Self {
        Self::new(World::Event, DomainKind::Bool)
    }

    /// Same type, demoted to the `Internal` category.
    #[must_use]
    pub const fn internal(self) -> Self {
        Self {
            category: Category::Internal,
            ..self
        }
    }

    /// Same type, excluded from buses.
    #[must_use]
    pub const fn not_bus_eligible(self) -> Self {
        Self {
            bus_eligible: false,
            ..self
        }
    }

    /// Structural equality for transform dispatch.
    ///
    /// Compares world, domain, and category; `bus_eligible` is deliberately
    /// excluded.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        self.world == other.world
            && self.domain == other.domain
            && self.category == other.category
    }
}

/// Directional assignability check.
///
/// True iff world and domain are equal and the categories are equal or relax
/// from `Core` into `Internal`. `Internal` → `Core` is never assignable here;
/// that direction requires an explicit adapter.
#[must_use]
pub fn assignable(src: &TypeDesc, dst: &TypeDesc) -> bool {
    src.world == dst.world
        && src.domain == dst.domain
        && (src.category == dst.category
            || (src.category == Category::Core && dst.category == Category::Internal))
}

impl core::fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}:{}/{}",
            self.world.name(),
            self.domain.name(),
            self.category.name()
        )
    }
}

/// Errors raised while decoding persisted type descriptors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeParseError {
    /// The domain name is not part of the closed vocabulary.
    #[error("unknown domain: {0}")]
    UnknownDomain(String),
}
