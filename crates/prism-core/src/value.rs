// SPDX-License-Identifier: Apache-2.0
//! Runtime value representation and canonical encoding.
//!
//! Determinism contract
//! - Every value has a fixed-layout canonical encoding (tag byte, then
//!   little-endian payload bits). The encoding feeds BLAKE3 digests for
//!   const-pool interning, IR content addressing, and program digests;
//!   changing it changes every downstream hash and must be treated as a
//!   breaking change.
//! - Floats are encoded via `to_bits`, so `-0.0` and `0.0` intern to
//!   different pool slots and NaN payloads are preserved bit-exactly.

use crate::ident::DomainId;
use crate::types::DomainKind;

/// RGBA color with linear `f64` components.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rgba {
    /// Red component.
    pub r: f64,
    /// Green component.
    pub g: f64,
    /// Blue component.
    pub b: f64,
    /// Alpha component.
    pub a: f64,
}

impl Rgba {
    /// Opaque color from RGB components.
    #[must_use]
    pub const fn rgb(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b, a: 1.0 }
    }
}

/// 2-vector with `f64` components.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vec2 {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
}

impl Vec2 {
    /// Constructs a vector from components.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Waveform shape selector consumed by oscillator blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Waveform {
    /// Sine wave.
    Sine,
    /// Triangle wave.
    Triangle,
    /// Square wave.
    Square,
    /// Rising sawtooth.
    Saw,
}

/// Shape of a field domain.
///
/// The shape fixes both the element count and the deterministic element
/// order (row-major for grids).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DomainShape {
    /// Rectangular grid, elements ordered row-major.
    Grid {
        /// Number of columns.
        cols: u32,
        /// Number of rows.
        rows: u32,
    },
    /// Flat run of `count` elements in index order.
    Line {
        /// Number of elements.
        count: u32,
    },
}

impl DomainShape {
    /// Total element count.
    #[must_use]
    pub const fn count(self) -> u32 {
        match self {
            Self::Grid { cols, rows } => cols * rows,
            Self::Line { count } => count,
        }
    }
}

/// First-class field domain artifact.
///
/// Identity is carried by `id`, not by shape: two grids with equal
/// dimensions but different producing blocks are distinct domains, and
/// hot-swap treats an `id` change as a Class C edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DomainDesc {
    /// Stable identity of the domain.
    pub id: DomainId,
    /// Element count and order.
    pub shape: DomainShape,
}

impl DomainDesc {
    /// Total element count, addressable only through field operators.
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.shape.count()
    }
}

/// Closed runtime value vocabulary.
///
/// Every variant corresponds to exactly one [`DomainKind`]; the evaluator
/// relies on this bijection when substituting defaults for failed nodes.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Value {
    /// `float` domain.
    Number(f64),
    /// `int` domain.
    Int(i64),
    /// `boolean` domain. Also the per-frame sample of the event world
    /// (`true` = a pulse fired this frame).
    Bool(bool),
    /// `phase` domain, cyclic in `[0, 1)`.
    Phase(f64),
    /// `unit` domain, clamped to `[0, 1]`.
    Unit(f64),
    /// `duration` domain, milliseconds.
    Duration(f64),
    /// `time` domain, milliseconds since program start.
    Time(f64),
    /// `rate` domain.
    Rate(f64),
    /// `color` domain.
    Color(Rgba),
    /// `vec2` domain.
    Vec2(Vec2),
    /// `point` domain.
    Point(Vec2),
    /// `string` domain.
    Str(String),
    /// `waveform` domain.
    Waveform(Waveform),
    /// `domain` domain: the field-domain artifact itself.
    Domain(DomainDesc),
    /// Ordered collection produced by `array` combine mode. Not a persisted
    /// domain; only flows between combine nodes and array-aware consumers.
    List(Vec<Value>),
}

impl Value {
    /// The domain this value inhabits.
    ///
    /// `List` reports the domain of its first element (lists are homogeneous
    /// by construction; combine nodes never mix writer domains).
    #[must_use]
    pub fn domain_kind(&self) -> DomainKind {
        match self {
            Self::Number(_) => DomainKind::Float,
            Self::Int(_) => DomainKind::Int,
            Self::Bool(_) => DomainKind::Bool,
            Self::Phase(_) => DomainKind::Phase,
            Self::Unit(_) => DomainKind::Unit,
            Self::Duration(_) => DomainKind::Duration,
            Self::Time(_) => DomainKind::Time,
            Self::Rate(_) => DomainKind::Rate,
            Self::Color(_) => DomainKind::Color,
            Self::Vec2(_) => DomainKind::Vec2,
            Self::Point(_) => DomainKind::Point,
            Self::Str(_) => DomainKind::Str,
            Self::Waveform(_) => DomainKind::Waveform,
            Self::Domain(_) => DomainKind::Domain,
            Self::List(items) => items
                .first()
                .map_or(DomainKind::Float, Self::domain_kind),
        }
    }

    /// Numeric view over the scalar-ish variants.
    ///
    /// Returns `None` for colors, vectors, strings, waveforms, domains, and
    /// lists; kernels that need components address them explicitly.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) | Self::Phase(v) | Self::Unit(v) | Self::Duration(v)
            | Self::Time(v) | Self::Rate(v) => Some(*v),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(v) => Some(*v as f64),
            Self::Bool(v) => Some(f64::from(u8::from(*v))),
            _ => None,
        }
    }

    /// Rebuilds a numeric value in the same domain as `self`.
    ///
    /// Non-numeric receivers fall back to `float`; kernels and combine
    /// modes use this to keep arithmetic closed over the numeric domains.
    #[must_use]
    pub fn number_like(&self, v: f64) -> Self {
        match self {
            Self::Phase(_) => Self::Phase(v),
            Self::Unit(_) => Self::Unit(v),
            Self::Duration(_) => Self::Duration(v),
            Self::Time(_) => Self::Time(v),
            Self::Rate(_) => Self::Rate(v),
            #[allow(clippy::cast_possible_truncation)]
            Self::Int(_) => Self::Int(v as i64),
            _ => Self::Number(v),
        }
    }

    /// The zero/neutral value of a domain, used when the evaluator
    /// substitutes a default for a failed node.
    #[must_use]
    pub fn zero_of(domain: DomainKind) -> Self {
        match domain {
            DomainKind::Float => Self::Number(0.0),
            DomainKind::Int => Self::Int(0),
            DomainKind::Bool => Self::Bool(false),
            DomainKind::Phase => Self::Phase(0.0),
            DomainKind::Unit => Self::Unit(0.0),
            DomainKind::Duration => Self::Duration(0.0),
            DomainKind::Time => Self::Time(0.0),
            DomainKind::Rate => Self::Rate(1.0),
            DomainKind::Color => Self::Color(Rgba::rgb(0.0, 0.0, 0.0)),
            DomainKind::Vec2 => Self::Vec2(Vec2::new(0.0, 0.0)),
            DomainKind::Point => Self::Point(Vec2::new(0.0, 0.0)),
            DomainKind::Str => Self::Str(String::new()),
            DomainKind::Waveform => Self::Waveform(Waveform::Sine),
            DomainKind::Domain => Self::Domain(DomainDesc {
                id: crate::ident::make_domain_id("empty"),
                shape: DomainShape::Line { count: 0 },
            }),
        }
    }

    /// Appends the canonical encoding of this value to `out`.
    ///
    /// Layout: 1 tag byte, then little-endian payload. Strings and lists are
    /// length-prefixed with a u64.
    pub fn encode(&self, out: &mut Vec<u8>) {
        fn f(out: &mut Vec<u8>, v: f64) {
            out.extend_from_slice(&v.to_bits().to_le_bytes());
        }
        match self {
            Self::Number(v) => {
                out.push(0x01);
                f(out, *v);
            }
            Self::Int(v) => {
                out.push(0x02);
                out.extend_from_slice(&v.to_le_bytes());
            }
            Self::Bool(v) => {
                out.push(0x03);
                out.push(u8::from(*v));
            }
            Self::Phase(v) => {
                out.push(0x04);
                f(out, *v);
            }
            Self::Unit(v) => {
                out.push(0x05);
                f(out, *v);
            }
            Self::Duration(v) => {
                out.push(0x06);
                f(out, *v);
            }
            Self::Time(v) => {
                out.push(0x07);
                f(out, *v);
            }
            Self::Rate(v) => {
                out.push(0x08);
                f(out, *v);
            }
            Self::Color(c) => {
                out.push(0x09);
                f(out, c.r);
                f(out, c.g);
                f(out, c.b);
                f(out, c.a);
            }
            Self::Vec2(v) => {
                out.push(0x0a);
                f(out, v.x);
                f(out, v.y);
            }
            Self::Point(v) => {
                out.push(0x0b);
                f(out, v.x);
                f(out, v.y);
            }
            Self::Str(s) => {
                out.push(0x0c);
                out.extend_from_slice(&(s.len() as u64).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            Self::Waveform(w) => {
                out.push(0x0d);
                out.push(match w {
                    Waveform::Sine => 0,
                    Waveform::Triangle => 1,
                    Waveform::Square => 2,
                    Waveform::Saw => 3,
                });
            }
            Self::Domain(d) => {
                out.push(0x0e);
                out.extend_from_slice(d.id.as_bytes());
                match d.shape {
                    DomainShape::Grid { cols, rows } => {
                        out.push(0);
                        out.extend_from_slice(&cols.to_le_bytes());
                        out.extend_from_slice(&rows.to_le_bytes());
                    }
                    DomainShape::Line { count } => {
                        out.push(1);
                        out.extend_from_slice(&count.to_le_bytes());
                    }
                }
            }
            Self::List(items) => {
                out.push(0x0f);
                out.extend_from_slice(&(items.len() as u64).to_le_bytes());
                for item in items {
                    item.encode(out);
                }
            }
        }
    }

    /// Canonical encoding as an owned buffer.
    #[must_use]
    pub fn encoded(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16);
        self.encode(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_distinguishes_domains_with_equal_bits() {
        // 0.25 as phase and 0.25 as unit must not intern to the same slot.
        assert_ne!(Value::Phase(0.25).encoded(), Value::Unit(0.25).encoded());
    }

    #[test]
    fn encoding_distinguishes_zero_signs() {
        assert_ne!(Value::Number(0.0).encoded(), Value::Number(-0.0).encoded());
    }

    #[test]
    fn zero_of_round_trips_domain_kind() {
        for d in [
            DomainKind::Float,
            DomainKind::Phase,
            DomainKind::Color,
            DomainKind::Vec2,
            DomainKind::Waveform,
            DomainKind::Bool,
        ] {
            assert_eq!(Value::zero_of(d).domain_kind(), d);
        }
    }

    #[test]
    fn list_encoding_is_length_prefixed() {
        let a = Value::List(vec![Value::Number(1.0), Value::Number(2.0)]);
        let b = Value::List(vec![Value::Number(1.0)]);
        assert_ne!(a.encoded(), b.encoded());
    }
}
