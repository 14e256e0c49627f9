// SPDX-License-Identifier: Apache-2.0
//! Combine policies for multi-writer inputs.
//!
//! Every input slot (and every bus, which is just a hidden block's `in`
//! slot) carries a policy that decides how N writers collapse into one
//! value.
//!
//! # Algebraic Categories
//!
//! **Commutative** (permutation-invariant):
//! - [`Sum`](CombineMode::Sum) — result is identical regardless of writer
//!   order.
//! - [`Merge`](CombineMode::Merge) — domain-aware union (event `or`,
//!   numeric/color `max`); permutation-invariant by construction.
//!
//! **Order-dependent** (deterministic via `(sort_key, id)` writer order):
//! - [`Latest`](CombineMode::Latest), [`Array`](CombineMode::Array)
//! - NOT commutative — the compiler fixes writer order before these run.
//!
//! [`Error`](CombineMode::Error) is not a merge at all: more than one writer
//! is a compile error (`MultiWriterForbidden`).

use crate::value::{Rgba, Value};

/// When a combine node is emitted for an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CombineWhen {
    /// Emit a combine node only when two or more writers exist; a single
    /// writer passes through untouched.
    #[default]
    Multi,
    /// Always emit a combine node, even for a single writer. Buses use this
    /// so that readers observe a stable node identity as writers come and
    /// go.
    Always,
}

/// How multiple writers collapse into one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CombineMode {
    /// The last writer in `(sort_key, id)` order wins.
    #[default]
    Latest,
    /// Numeric sum across writers.
    Sum,
    /// Domain-aware union: events `or`, numerics `max`, colors
    /// component-wise `max`; all other domains fall back to latest.
    Merge,
    /// All writer values collected into a [`Value::List`] in writer order.
    Array,
    /// More than one writer is a compile error.
    Error,
}

impl CombineMode {
    /// Returns true when the result depends on writer order.
    ///
    /// Order-dependent modes rely on the canonical `(sort_key, id)` edge
    /// ordering fixed during compilation; commutative modes produce the same
    /// value under any permutation of their inputs.
    #[must_use]
    pub const fn is_order_sensitive(self) -> bool {
        matches!(self, Self::Latest | Self::Array)
    }

    /// Applies this mode to writer samples in canonical order.
    ///
    /// Empty input returns `None`; the compiler guarantees at least one
    /// writer after default-source materialization, so `None` only surfaces
    /// on internal misuse.
    #[must_use]
    pub fn apply(self, values: &[Value]) -> Option<Value> {
        let first = values.first()?;
        match self {
            Self::Latest | Self::Error => values.last().cloned(),
            Self::Array => Some(Value::List(values.to_vec())),
            Self::Sum => {
                let mut acc = 0.0f64;
                for v in values {
                    acc += v.as_f64().unwrap_or(0.0);
                }
                Some(first.number_like(acc))
            }
            Self::Merge => Some(merge(values, first)),
        }
    }
}

fn merge(values: &[Value], first: &Value) -> Value {
    match first {
        Value::Bool(_) => Value::Bool(values.iter().any(|v| matches!(v, Value::Bool(true)))),
        Value::Color(_) => {
            let mut acc = Rgba {
                r: 0.0,
                g: 0.0,
                b: 0.0,
                a: 0.0,
            };
            for v in values {
                if let Value::Color(c) = v {
                    acc.r = acc.r.max(c.r);
                    acc.g = acc.g.max(c.g);
                    acc.b = acc.b.max(c.b);
                    acc.a = acc.a.max(c.a);
                }
            }
            Value::Color(acc)
        }
        _ if first.as_f64().is_some() => {
            let mut acc = f64::NEG_INFINITY;
            for v in values {
                if let Some(x) = v.as_f64() {
                    acc = acc.max(x);
                }
            }
            first.number_like(acc)
        }
        _ => values.last().cloned().unwrap_or_else(|| first.clone()),
    }
}

/// Combine policy attached to an input slot or bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CombinePolicy {
    /// When a combine node is emitted.
    pub when: CombineWhen,
    /// How writer values collapse.
    pub mode: CombineMode,
}

impl CombinePolicy {
    /// `{multi, latest}` — the slot default.
    #[must_use]
    pub const fn latest() -> Self {
        Self {
            when: CombineWhen::Multi,
            mode: CombineMode::Latest,
        }
    }

    /// `{always, mode}` — the bus default shape.
    #[must_use]
    pub const fn always(mode: CombineMode) -> Self {
        Self {
            when: CombineWhen::Always,
            mode,
        }
    }
}
