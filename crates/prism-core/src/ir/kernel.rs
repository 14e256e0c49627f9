// SPDX-License-Identifier: Apache-2.0
//! Closed set of pure kernels.
//!
//! Kernels are the only computation the evaluator performs over signal and
//! field samples; lenses, adapters, and blocks compile down to them. All
//! transcendental math goes through `libm` so results are bit-identical
//! across platforms.

use thiserror::Error;

use crate::value::{Rgba, Value, Vec2, Waveform};

/// Easing curve selector for [`Kernel::Ease`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum EaseKind {
    /// Identity.
    Linear,
    /// Quadratic ease-in.
    InQuad,
    /// Quadratic ease-out.
    OutQuad,
    /// Quadratic ease-in-out.
    InOutQuad,
    /// Cubic ease-in.
    InCubic,
    /// Cubic ease-out.
    OutCubic,
    /// Hermite smoothstep.
    Smoothstep,
}

impl EaseKind {
    /// Parses the persisted curve name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "linear" => Self::Linear,
            "in-quad" => Self::InQuad,
            "out-quad" => Self::OutQuad,
            "in-out-quad" => Self::InOutQuad,
            "in-cubic" => Self::InCubic,
            "out-cubic" => Self::OutCubic,
            "smoothstep" => Self::Smoothstep,
            _ => return None,
        })
    }

    fn curve(self, x: f64) -> f64 {
        let x = x.clamp(0.0, 1.0);
        match self {
            Self::Linear => x,
            Self::InQuad => x * x,
            Self::OutQuad => x * (2.0 - x),
            Self::InOutQuad => {
                if x < 0.5 {
                    2.0 * x * x
                } else {
                    -1.0 + (4.0 - 2.0 * x) * x
                }
            }
            Self::InCubic => x * x * x,
            Self::OutCubic => {
                let u = x - 1.0;
                u * u * u + 1.0
            }
            Self::Smoothstep => x * x * (3.0 - 2.0 * x),
        }
    }
}

/// Errors raised by kernel application; non-fatal at frame level (the
/// evaluator substitutes the slot default and reports the substitution).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// Wrong number of arguments for the kernel.
    #[error("kernel {kernel} expects {expected} args, got {got}")]
    Arity {
        /// Kernel name.
        kernel: &'static str,
        /// Required argument count.
        expected: usize,
        /// Supplied argument count.
        got: usize,
    },
    /// An argument had a domain the kernel cannot consume.
    #[error("kernel {kernel} cannot consume argument {index}")]
    BadArg {
        /// Kernel name.
        kernel: &'static str,
        /// Offending argument position.
        index: usize,
    },
}

/// Pure n-ary operation over values.
///
/// Arity is fixed per variant and documented inline as
/// `(arg0, arg1, ...) -> result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    /// `(x) -> x`.
    Id,
    /// `(a, b) -> a + b` in the domain of `a`.
    Add,
    /// `(a, b) -> a - b`.
    Sub,
    /// `(a, b) -> a * b`.
    Mul,
    /// `(a, b) -> a / b`; division by zero yields 0.
    Div,
    /// `(a, b) -> min`.
    Min,
    /// `(a, b) -> max`.
    Max,
    /// `(x) -> -x`.
    Neg,
    /// `(x) -> |x|`.
    Abs,
    /// `(x, lo, hi) -> clamped x`.
    Clamp,
    /// `(x, in0, in1, out0, out1)` linear remap; degenerate input range
    /// yields `out0`.
    MapRange,
    /// `(x, steps) -> floor(x·steps)/steps`; `steps ≤ 0` is identity.
    Quantize,
    /// `(x, rate) -> clamp(x·max(rate, 0), 0, 1)` — pure ramp-slope limiter.
    SlewRamp,
    /// `(x)` eased by the embedded curve.
    Ease(EaseKind),
    /// `(x) -> x - floor(x)` as `phase`.
    Fract,
    /// `(phase, amount) -> fract(phase + amount)`.
    PhaseAdd,
    /// `(phase, factor) -> fract(phase · factor)`.
    PhaseScale,
    /// `(phase) -> 1 - |2·phase - 1|` (triangle fold, stays in `[0, 1]`).
    PingPong,
    /// `(phase, steps)` quantized phase.
    PhaseQuantize,
    /// `(x) -> (x + 1) / 2`.
    ToUnipolar,
    /// `(x) -> 2·x - 1`.
    ToBipolar,
    /// `(phase) -> float` with identical bits.
    PhaseToNumber,
    /// `(float) -> duration` (milliseconds, identical bits).
    NumberToDuration,
    /// `(duration) -> float`.
    DurationToNumber,
    /// `(phase, waveform) -> float` in `[-1, 1]`.
    Shape,
    /// `(v, gain: vec2, bias: vec2) -> v·gain + bias` component-wise.
    Vec2GainBias,
    /// `(v, offset) -> v + offset`.
    Vec2Add,
    /// `(v, radians)` rotated about the origin.
    Rotate2D,
    /// `(x, y) -> vec2`.
    MakeVec2,
    /// `(x, y) -> point`.
    MakePoint,
    /// `(r, g, b, a) -> color`.
    MakeColor,
    /// `(color, gain)` RGB scaled, alpha kept.
    ColorGain,
    /// `(color, turns)` hue rotated (luminance-preserving YIQ rotation).
    HueShift,
    /// `(color, amount)` saturation lerp about luma; 0 = grayscale,
    /// 1 = unchanged.
    Saturate,
    /// `(t_ms, period_ms) -> phase`; non-positive period yields phase 0.
    TimePhase,
    /// `(t_ms, period_ms) -> phase` folded 0→1→0 across two periods.
    TimePhasePingPong,
    /// `(t_ms, duration_ms) -> unit` progress; non-positive duration yields
    /// 1.
    Progress,
}

impl Kernel {
    /// Kernel name for diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Min => "min",
            Self::Max => "max",
            Self::Neg => "neg",
            Self::Abs => "abs",
            Self::Clamp => "clamp",
            Self::MapRange => "map-range",
            Self::Quantize => "quantize",
            Self::SlewRamp => "slew-ramp",
            Self::Ease(_) => "ease",
            Self::Fract => "fract",
            Self::PhaseAdd => "phase-add",
            Self::PhaseScale => "phase-scale",
            Self::PingPong => "ping-pong",
            Self::PhaseQuantize => "phase-quantize",
            Self::ToUnipolar => "to-unipolar",
            Self::ToBipolar => "to-bipolar",
            Self::PhaseToNumber => "phase-to-number",
            Self::NumberToDuration => "number-to-duration",
            Self::DurationToNumber => "duration-to-number",
            Self::Shape => "shape",
            Self::Vec2GainBias => "vec2-gain-bias",
            Self::Vec2Add => "vec2-add",
            Self::Rotate2D => "rotate-2d",
            Self::MakeVec2 => "make-vec2",
            Self::MakePoint => "make-point",
            Self::MakeColor => "make-color",
            Self::ColorGain => "color-gain",
            Self::HueShift => "hue-shift",
            Self::Saturate => "saturate",
            Self::TimePhase => "time-phase",
            Self::TimePhasePingPong => "time-phase-ping-pong",
            Self::Progress => "progress",
        }
    }

    /// Canonical one-byte discriminant for content addressing.
    #[must_use]
    pub const fn discriminant(self) -> u8 {
        match self {
            Self::Id => 0,
            Self::Add => 1,
            Self::Sub => 2,
            Self::Mul => 3,
            Self::Div => 4,
            Self::Min => 5,
            Self::Max => 6,
            Self::Neg => 7,
            Self::Abs => 8,
            Self::Clamp => 9,
            Self::MapRange => 10,
            Self::Quantize => 11,
            Self::SlewRamp => 12,
            Self::Ease(EaseKind::Linear) => 13,
            Self::Ease(EaseKind::InQuad) => 14,
            Self::Ease(EaseKind::OutQuad) => 15,
            Self::Ease(EaseKind::InOutQuad) => 16,
            Self::Ease(EaseKind::InCubic) => 17,
            Self::Ease(EaseKind::OutCubic) => 18,
            Self::Ease(EaseKind::Smoothstep) => 19,
            Self::Fract => 20,
            Self::PhaseAdd => 21,
            Self::PhaseScale => 22,
            Self::PingPong => 23,
            Self::PhaseQuantize => 24,
            Self::ToUnipolar => 25,
            Self::ToBipolar => 26,
            Self::PhaseToNumber => 27,
            Self::NumberToDuration => 28,
            Self::DurationToNumber => 29,
            Self::Shape => 30,
            Self::Vec2GainBias => 31,
            Self::Vec2Add => 32,
            Self::Rotate2D => 33,
            Self::MakeVec2 => 34,
            Self::MakePoint => 35,
            Self::MakeColor => 36,
            Self::ColorGain => 37,
            Self::HueShift => 38,
            Self::Saturate => 39,
            Self::TimePhase => 40,
            Self::TimePhasePingPong => 41,
            Self::Progress => 42,
        }
    }

    /// Applies the kernel to `args`.
    ///
    /// # Errors
    ///
    /// [`KernelError`] on arity or argument-domain mismatches.
    #[allow(clippy::too_many_lines)]
    pub fn apply(self, args: &[Value]) -> Result<Value, KernelError> {
        let name = self.name();
        let need = |expected: usize| -> Result<(), KernelError> {
            if args.len() == expected {
                Ok(())
            } else {
                Err(KernelError::Arity {
                    kernel: name,
                    expected,
                    got: args.len(),
                })
            }
        };
        let num = |i: usize| -> Result<f64, KernelError> {
            args[i]
                .as_f64()
                .ok_or(KernelError::BadArg { kernel: name, index: i })
        };
        let vec2 = |i: usize| -> Result<Vec2, KernelError> {
            match &args[i] {
                Value::Vec2(v) | Value::Point(v) => Ok(*v),
                _ => Err(KernelError::BadArg { kernel: name, index: i }),
            }
        };
        let color = |i: usize| -> Result<Rgba, KernelError> {
            match &args[i] {
                Value::Color(c) => Ok(*c),
                _ => Err(KernelError::BadArg { kernel: name, index: i }),
            }
        };
        let fract = |x: f64| x - libm::floor(x);

        Ok(match self {
            Self::Id => {
                need(1)?;
                args[0].clone()
            }
            Self::Add => {
                need(2)?;
                args[0].number_like(num(0)? + num(1)?)
            }
            Self::Sub => {
                need(2)?;
                args[0].number_like(num(0)? - num(1)?)
            }
            Self::Mul => {
                need(2)?;
                args[0].number_like(num(0)? * num(1)?)
            }
            Self::Div => {
                need(2)?;
                let d = num(1)?;
                args[0].number_like(if d == 0.0 { 0.0 } else { num(0)? / d })
            }
            Self::Min => {
                need(2)?;
                args[0].number_like(num(0)?.min(num(1)?))
            }
            Self::Max => {
                need(2)?;
                args[0].number_like(num(0)?.max(num(1)?))
            }
            Self::Neg => {
                need(1)?;
                args[0].number_like(-num(0)?)
            }
            Self::Abs => {
                need(1)?;
                args[0].number_like(num(0)?.abs())
            }
            Self::Clamp => {
                need(3)?;
                args[0].number_like(num(0)?.clamp(num(1)?, num(2)?))
            }
            Self::MapRange => {
                need(5)?;
                let (x, in0, in1) = (num(0)?, num(1)?, num(2)?);
                let (out0, out1) = (num(3)?, num(4)?);
                let span = in1 - in0;
                let v = if span == 0.0 {
                    out0
                } else {
                    out0 + (x - in0) / span * (out1 - out0)
                };
                args[0].number_like(v)
            }
            Self::Quantize => {
                need(2)?;
                let (x, steps) = (num(0)?, num(1)?);
                let v = if steps <= 0.0 {
                    x
                } else {
                    libm::floor(x * steps) / steps
                };
                args[0].number_like(v)
            }
            Self::SlewRamp => {
                need(2)?;
                let (x, rate) = (num(0)?, num(1)?);
                args[0].number_like((x * rate.max(0.0)).clamp(0.0, 1.0))
            }
            Self::Ease(kind) => {
                need(1)?;
                args[0].number_like(kind.curve(num(0)?))
            }
            Self::Fract => {
                need(1)?;
                Value::Phase(fract(num(0)?))
            }
            Self::PhaseAdd => {
                need(2)?;
                Value::Phase(fract(num(0)? + num(1)?))
            }
            Self::PhaseScale => {
                need(2)?;
                Value::Phase(fract(num(0)? * num(1)?))
            }
            Self::PingPong => {
                need(1)?;
                Value::Phase(1.0 - (2.0 * num(0)? - 1.0).abs())
            }
            Self::PhaseQuantize => {
                need(2)?;
                let (p, steps) = (num(0)?, num(1)?);
                let v = if steps <= 0.0 {
                    p
                } else {
                    libm::floor(p * steps) / steps
                };
                Value::Phase(v)
            }
            Self::ToUnipolar => {
                need(1)?;
                args[0].number_like((num(0)? + 1.0) / 2.0)
            }
            Self::ToBipolar => {
                need(1)?;
                args[0].number_like(2.0 * num(0)? - 1.0)
            }
            Self::PhaseToNumber => {
                need(1)?;
                Value::Number(num(0)?)
            }
            Self::NumberToDuration => {
                need(1)?;
                Value::Duration(num(0)?)
            }
            Self::DurationToNumber => {
                need(1)?;
                Value::Number(num(0)?)
            }
            Self::Shape => {
                need(2)?;
                let p = num(0)?;
                let wave = match &args[1] {
                    Value::Waveform(w) => *w,
                    _ => return Err(KernelError::BadArg { kernel: name, index: 1 }),
                };
                let v = match wave {
                    Waveform::Sine => libm::sin(core::f64::consts::TAU * p),
                    Waveform::Triangle => 1.0 - 4.0 * (p - 0.5).abs(),
                    Waveform::Square => {
                        if p < 0.5 {
                            1.0
                        } else {
                            -1.0
                        }
                    }
                    Waveform::Saw => 2.0 * p - 1.0,
                };
                Value::Number(v)
            }
            Self::Vec2GainBias => {
                need(3)?;
                let (v, g, b) = (vec2(0)?, vec2(1)?, vec2(2)?);
                Value::Vec2(Vec2::new(v.x * g.x + b.x, v.y * g.y + b.y))
            }
            Self::Vec2Add => {
                need(2)?;
                let (v, o) = (vec2(0)?, vec2(1)?);
                let sum = Vec2::new(v.x + o.x, v.y + o.y);
                match &args[0] {
                    Value::Point(_) => Value::Point(sum),
                    _ => Value::Vec2(sum),
                }
            }
            Self::Rotate2D => {
                need(2)?;
                let v = vec2(0)?;
                let theta = num(1)?;
                let (s, c) = (libm::sin(theta), libm::cos(theta));
                let rot = Vec2::new(v.x * c - v.y * s, v.x * s + v.y * c);
                match &args[0] {
                    Value::Point(_) => Value::Point(rot),
                    _ => Value::Vec2(rot),
                }
            }
            Self::MakeVec2 => {
                need(2)?;
                Value::Vec2(Vec2::new(num(0)?, num(1)?))
            }
            Self::MakePoint => {
                need(2)?;
                Value::Point(Vec2::new(num(0)?, num(1)?))
            }
            Self::MakeColor => {
                need(4)?;
                Value::Color(Rgba {
                    r: num(0)?,
                    g: num(1)?,
                    b: num(2)?,
                    a: num(3)?,
                })
            }
            Self::ColorGain => {
                need(2)?;
                let c = color(0)?;
                let g = num(1)?;
                Value::Color(Rgba {
                    r: c.r * g,
                    g: c.g * g,
                    b: c.b * g,
                    a: c.a,
                })
            }
            Self::HueShift => {
                need(2)?;
                let c = color(0)?;
                let theta = num(1)? * core::f64::consts::TAU;
                let (u, w) = (libm::cos(theta), libm::sin(theta));
                let r = (0.299 + 0.701 * u + 0.168 * w) * c.r
                    + (0.587 - 0.587 * u + 0.330 * w) * c.g
                    + (0.114 - 0.114 * u - 0.497 * w) * c.b;
                let g = (0.299 - 0.299 * u - 0.328 * w) * c.r
                    + (0.587 + 0.413 * u + 0.035 * w) * c.g
                    + (0.114 - 0.114 * u + 0.292 * w) * c.b;
                let b = (0.299 - 0.300 * u + 1.250 * w) * c.r
                    + (0.587 - 0.588 * u - 1.050 * w) * c.g
                    + (0.114 + 0.886 * u - 0.203 * w) * c.b;
                Value::Color(Rgba { r, g, b, a: c.a })
            }
            Self::Saturate => {
                need(2)?;
                let c = color(0)?;
                let amount = num(1)?;
                let luma = 0.2126 * c.r + 0.7152 * c.g + 0.0722 * c.b;
                let lerp = |ch: f64| luma + (ch - luma) * amount;
                Value::Color(Rgba {
                    r: lerp(c.r),
                    g: lerp(c.g),
                    b: lerp(c.b),
                    a: c.a,
                })
            }
            Self::TimePhase => {
                need(2)?;
                let (t, period) = (num(0)?, num(1)?);
                Value::Phase(if period <= 0.0 { 0.0 } else { fract(t / period) })
            }
            Self::TimePhasePingPong => {
                need(2)?;
                let (t, period) = (num(0)?, num(1)?);
                if period <= 0.0 {
                    Value::Phase(0.0)
                } else {
                    let u = fract(t / (2.0 * period));
                    Value::Phase(1.0 - (2.0 * u - 1.0).abs())
                }
            }
            Self::Progress => {
                need(2)?;
                let (t, duration) = (num(0)?, num(1)?);
                Value::Unit(if duration <= 0.0 {
                    1.0
                } else {
                    (t / duration).clamp(0.0, 1.0)
                })
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_preserves_lhs_domain() {
        let out = Kernel::Add
            .apply(&[Value::Duration(100.0), Value::Number(50.0)])
            .unwrap();
        assert_eq!(out, Value::Duration(150.0));
    }

    #[test]
    fn division_by_zero_is_zero() {
        let out = Kernel::Div
            .apply(&[Value::Number(5.0), Value::Number(0.0)])
            .unwrap();
        assert_eq!(out, Value::Number(0.0));
    }

    #[test]
    fn time_phase_wraps_like_a_cycle() {
        let at = |t: f64| {
            Kernel::TimePhase
                .apply(&[Value::Time(t), Value::Duration(1000.0)])
                .unwrap()
        };
        assert_eq!(at(250.0), Value::Phase(0.25));
        assert_eq!(at(1250.0), Value::Phase(0.25));
    }

    #[test]
    fn ping_pong_folds_phase() {
        let out = Kernel::PingPong.apply(&[Value::Phase(0.75)]).unwrap();
        assert_eq!(out, Value::Phase(0.5));
    }

    #[test]
    fn shape_square_splits_at_half() {
        let sq = |p: f64| {
            Kernel::Shape
                .apply(&[Value::Phase(p), Value::Waveform(Waveform::Square)])
                .unwrap()
        };
        assert_eq!(sq(0.25), Value::Number(1.0));
        assert_eq!(sq(0.75), Value::Number(-1.0));
    }

    #[test]
    fn slew_ramp_limits_attack() {
        let out = Kernel::SlewRamp
            .apply(&[Value::Unit(0.2), Value::Rate(2.0)])
            .unwrap();
        assert_eq!(out, Value::Unit(0.4));
        let capped = Kernel::SlewRamp
            .apply(&[Value::Unit(0.9), Value::Rate(2.0)])
            .unwrap();
        assert_eq!(capped, Value::Unit(1.0));
    }

    #[test]
    fn arity_errors_are_reported() {
        assert!(matches!(
            Kernel::Add.apply(&[Value::Number(1.0)]),
            Err(KernelError::Arity { expected: 2, .. })
        ));
    }

    #[test]
    fn saturate_zero_is_grayscale() {
        let out = Kernel::Saturate
            .apply(&[Value::Color(Rgba::rgb(1.0, 0.0, 0.0)), Value::Number(0.0)])
            .unwrap();
        if let Value::Color(c) = out {
            assert!((c.r - c.g).abs() < 1e-12);
            assert!((c.g - c.b).abs() < 1e-12);
        } else {
            panic!("expected color");
        }
    }

    #[test]
    fn discriminants_are_unique() {
        let all = [
            Kernel::Id,
            Kernel::Add,
            Kernel::Sub,
            Kernel::Mul,
            Kernel::Div,
            Kernel::Min,
            Kernel::Max,
            Kernel::Neg,
            Kernel::Abs,
            Kernel::Clamp,
            Kernel::MapRange,
            Kernel::Quantize,
            Kernel::SlewRamp,
            Kernel::Ease(EaseKind::Linear),
            Kernel::Ease(EaseKind::Smoothstep),
            Kernel::Fract,
            Kernel::PhaseAdd,
            Kernel::PhaseScale,
            Kernel::PingPong,
            Kernel::PhaseQuantize,
            Kernel::ToUnipolar,
            Kernel::ToBipolar,
            Kernel::PhaseToNumber,
            Kernel::NumberToDuration,
            Kernel::DurationToNumber,
            Kernel::Shape,
            Kernel::Vec2GainBias,
            Kernel::Vec2Add,
            Kernel::Rotate2D,
            Kernel::MakeVec2,
            Kernel::MakePoint,
            Kernel::MakeColor,
            Kernel::ColorGain,
            Kernel::HueShift,
            Kernel::Saturate,
            Kernel::TimePhase,
            Kernel::TimePhasePingPong,
            Kernel::Progress,
        ];
        let mut seen = std::collections::BTreeSet::new();
        for k in all {
            assert!(seen.insert(k.discriminant()), "duplicate discriminant");
        }
    }
}
