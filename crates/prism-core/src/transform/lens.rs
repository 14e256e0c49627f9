// SPDX-License-Identifier: Apache-2.0
//! Built-in lens catalog.
//!
//! Every lens is pure and type-preserving; parameterized lenses compile to
//! `zip` nodes whose extra arguments are the resolved parameter references,
//! so a wire-bound parameter animates for free. Structural parameters
//! (polarity mode, easing curve) select a kernel at compile time and must be
//! bound to constants.

use crate::ir::{EaseKind, IrBuilder, Kernel, ValueRef};
use crate::transform::{
    CompileStepError, ParamRefs, ParamSpec, RegistryError, ResolvedParams, TransformDef,
    TransformError, TransformKind, TransformRegistry,
};
use crate::types::DomainKind;
use crate::value::{Value, Vec2};

/// Registers the full lens catalog.
///
/// # Errors
///
/// [`RegistryError`] on id collisions (only possible if called twice on the
/// same registry).
pub fn register_lens_catalog(reg: &mut TransformRegistry) -> Result<(), RegistryError> {
    for def in catalog() {
        reg.register(def)?;
    }
    Ok(())
}

fn lens(
    name: &'static str,
    domain: DomainKind,
    params: &'static [ParamSpec],
    apply: fn(&Value, &ResolvedParams) -> Result<Value, TransformError>,
    compile: fn(ValueRef, &ParamRefs, &mut IrBuilder) -> Result<ValueRef, CompileStepError>,
) -> TransformDef {
    TransformDef {
        name,
        kind: TransformKind::Lens { domain },
        params,
        apply,
        compile,
        stateful: false,
    }
}

fn catalog() -> Vec<TransformDef> {
    vec![
        lens("gain", DomainKind::Float, GAIN_PARAMS, gain_apply, gain_compile),
        lens(
            "polarity",
            DomainKind::Float,
            POLARITY_PARAMS,
            polarity_apply,
            polarity_compile,
        ),
        lens("clamp", DomainKind::Float, CLAMP_PARAMS, clamp_apply, clamp_compile),
        lens("slew", DomainKind::Float, SLEW_PARAMS, slew_apply, slew_compile),
        lens(
            "quantize",
            DomainKind::Float,
            QUANTIZE_PARAMS,
            quantize_apply,
            quantize_compile,
        ),
        lens("ease", DomainKind::Float, EASE_PARAMS, ease_apply, ease_compile),
        lens(
            "mapRange",
            DomainKind::Float,
            MAP_RANGE_PARAMS,
            map_range_apply,
            map_range_compile,
        ),
        lens(
            "phaseOffset",
            DomainKind::Phase,
            PHASE_OFFSET_PARAMS,
            phase_offset_apply,
            phase_offset_compile,
        ),
        lens(
            "phaseScale",
            DomainKind::Phase,
            PHASE_SCALE_PARAMS,
            phase_scale_apply,
            phase_scale_compile,
        ),
        lens("pingPong", DomainKind::Phase, &[], ping_pong_apply, ping_pong_compile),
        lens(
            "phaseQuantize",
            DomainKind::Phase,
            PHASE_QUANTIZE_PARAMS,
            phase_quantize_apply,
            phase_quantize_compile,
        ),
        lens(
            "vec2GainBias",
            DomainKind::Vec2,
            VEC2_GAIN_BIAS_PARAMS,
            vec2_gain_bias_apply,
            vec2_gain_bias_compile,
        ),
        lens(
            "rotate2D",
            DomainKind::Vec2,
            ROTATE_2D_PARAMS,
            rotate_2d_apply,
            rotate_2d_compile,
        ),
        lens(
            "translate2D",
            DomainKind::Vec2,
            TRANSLATE_2D_PARAMS,
            translate_2d_apply,
            translate_2d_compile,
        ),
        lens(
            "colorGain",
            DomainKind::Color,
            COLOR_GAIN_PARAMS,
            color_gain_apply,
            color_gain_compile,
        ),
        lens(
            "hueShift",
            DomainKind::Color,
            HUE_SHIFT_PARAMS,
            hue_shift_apply,
            hue_shift_compile,
        ),
        lens(
            "saturate",
            DomainKind::Color,
            SATURATE_PARAMS,
            saturate_apply,
            saturate_compile,
        ),
    ]
}

// ─── Shared plumbing ───────────────────────────────────────────────────

fn resolved<'a>(
    transform: &'static str,
    params: &'a ResolvedParams,
    name: &'static str,
) -> Result<&'a Value, TransformError> {
    params
        .get(name)
        .ok_or(TransformError::MissingParam { transform, param: name })
}

fn param_ref(
    transform: &'static str,
    params: &ParamRefs,
    name: &'static str,
) -> Result<ValueRef, CompileStepError> {
    params
        .get(name)
        .copied()
        .ok_or(CompileStepError::MissingParam { transform, param: name })
}

fn apply_kernel(
    transform: &'static str,
    kernel: Kernel,
    args: &[Value],
) -> Result<Value, TransformError> {
    kernel.apply(args).map_err(|_| TransformError::BadInput {
        transform,
        got: args.first().map_or("empty", |v| v.domain_kind().name()),
    })
}

fn zip_params(
    transform: &'static str,
    kernel: Kernel,
    input: ValueRef,
    params: &ParamRefs,
    names: &[&'static str],
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    let mut srcs = Vec::with_capacity(names.len() + 1);
    srcs.push(input);
    for name in names {
        srcs.push(param_ref(transform, params, name)?);
    }
    Ok(b.zip(&srcs, kernel))
}

fn const_param_int(
    transform: &'static str,
    params: &ParamRefs,
    name: &'static str,
    b: &IrBuilder,
) -> Result<i64, CompileStepError> {
    let r = param_ref(transform, params, name)?;
    match b.const_value(r) {
        Some(Value::Int(v)) => Ok(*v),
        #[allow(clippy::cast_possible_truncation)]
        Some(v) => v
            .as_f64()
            .map(|x| x as i64)
            .ok_or(CompileStepError::NonConstParam { transform, param: name }),
        None => Err(CompileStepError::NonConstParam { transform, param: name }),
    }
}

// ─── Number lenses ─────────────────────────────────────────────────────

static GAIN_PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "amount",
    domain: DomainKind::Float,
    default: Value::Number(1.0),
    ui_hint: "slider",
    range: Some((0.0, 4.0)),
}];

fn gain_apply(v: &Value, p: &ResolvedParams) -> Result<Value, TransformError> {
    let amount = resolved("gain", p, "amount")?.clone();
    apply_kernel("gain", Kernel::Mul, &[v.clone(), amount])
}

fn gain_compile(
    input: ValueRef,
    p: &ParamRefs,
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    zip_params("gain", Kernel::Mul, input, p, &["amount"], b)
}

static POLARITY_PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "mode",
    domain: DomainKind::Int,
    default: Value::Int(0),
    ui_hint: "select:invert,unipolar,bipolar",
    range: Some((0.0, 2.0)),
}];

fn polarity_kernel(mode: i64) -> Kernel {
    match mode {
        1 => Kernel::ToUnipolar,
        2 => Kernel::ToBipolar,
        _ => Kernel::Neg,
    }
}

fn polarity_apply(v: &Value, p: &ResolvedParams) -> Result<Value, TransformError> {
    let mode = resolved("polarity", p, "mode")?
        .as_f64()
        .ok_or(TransformError::BadInput {
            transform: "polarity",
            got: "non-numeric mode",
        })?;
    #[allow(clippy::cast_possible_truncation)]
    apply_kernel("polarity", polarity_kernel(mode as i64), &[v.clone()])
}

fn polarity_compile(
    input: ValueRef,
    p: &ParamRefs,
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    let mode = const_param_int("polarity", p, "mode", b)?;
    Ok(b.map(input, polarity_kernel(mode)))
}

static CLAMP_PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "min",
        domain: DomainKind::Float,
        default: Value::Number(0.0),
        ui_hint: "number",
        range: None,
    },
    ParamSpec {
        name: "max",
        domain: DomainKind::Float,
        default: Value::Number(1.0),
        ui_hint: "number",
        range: None,
    },
];

fn clamp_apply(v: &Value, p: &ResolvedParams) -> Result<Value, TransformError> {
    let lo = resolved("clamp", p, "min")?.clone();
    let hi = resolved("clamp", p, "max")?.clone();
    apply_kernel("clamp", Kernel::Clamp, &[v.clone(), lo, hi])
}

fn clamp_compile(
    input: ValueRef,
    p: &ParamRefs,
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    zip_params("clamp", Kernel::Clamp, input, p, &["min", "max"], b)
}

static SLEW_PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "rate",
    domain: DomainKind::Float,
    default: Value::Number(1.0),
    ui_hint: "slider",
    range: Some((0.0, 16.0)),
}];

fn slew_apply(v: &Value, p: &ResolvedParams) -> Result<Value, TransformError> {
    let rate = resolved("slew", p, "rate")?.clone();
    apply_kernel("slew", Kernel::SlewRamp, &[v.clone(), rate])
}

fn slew_compile(
    input: ValueRef,
    p: &ParamRefs,
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    zip_params("slew", Kernel::SlewRamp, input, p, &["rate"], b)
}

static QUANTIZE_PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "steps",
    domain: DomainKind::Float,
    default: Value::Number(8.0),
    ui_hint: "slider",
    range: Some((1.0, 64.0)),
}];

fn quantize_apply(v: &Value, p: &ResolvedParams) -> Result<Value, TransformError> {
    let steps = resolved("quantize", p, "steps")?.clone();
    apply_kernel("quantize", Kernel::Quantize, &[v.clone(), steps])
}

fn quantize_compile(
    input: ValueRef,
    p: &ParamRefs,
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    zip_params("quantize", Kernel::Quantize, input, p, &["steps"], b)
}

static EASE_PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "curve",
    domain: DomainKind::Int,
    default: Value::Int(0),
    ui_hint: "select:linear,in-quad,out-quad,in-out-quad,in-cubic,out-cubic,smoothstep",
    range: Some((0.0, 6.0)),
}];

fn ease_kind(index: i64) -> EaseKind {
    match index {
        1 => EaseKind::InQuad,
        2 => EaseKind::OutQuad,
        3 => EaseKind::InOutQuad,
        4 => EaseKind::InCubic,
        5 => EaseKind::OutCubic,
        6 => EaseKind::Smoothstep,
        _ => EaseKind::Linear,
    }
}

fn ease_apply(v: &Value, p: &ResolvedParams) -> Result<Value, TransformError> {
    let curve = resolved("ease", p, "curve")?
        .as_f64()
        .ok_or(TransformError::BadInput {
            transform: "ease",
            got: "non-numeric curve",
        })?;
    #[allow(clippy::cast_possible_truncation)]
    apply_kernel("ease", Kernel::Ease(ease_kind(curve as i64)), &[v.clone()])
}

fn ease_compile(
    input: ValueRef,
    p: &ParamRefs,
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    let curve = const_param_int("ease", p, "curve", b)?;
    Ok(b.map(input, Kernel::Ease(ease_kind(curve))))
}

static MAP_RANGE_PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "inMin",
        domain: DomainKind::Float,
        default: Value::Number(0.0),
        ui_hint: "number",
        range: None,
    },
    ParamSpec {
        name: "inMax",
        domain: DomainKind::Float,
        default: Value::Number(1.0),
        ui_hint: "number",
        range: None,
    },
    ParamSpec {
        name: "outMin",
        domain: DomainKind::Float,
        default: Value::Number(0.0),
        ui_hint: "number",
        range: None,
    },
    ParamSpec {
        name: "outMax",
        domain: DomainKind::Float,
        default: Value::Number(1.0),
        ui_hint: "number",
        range: None,
    },
];

fn map_range_apply(v: &Value, p: &ResolvedParams) -> Result<Value, TransformError> {
    let args = [
        v.clone(),
        resolved("mapRange", p, "inMin")?.clone(),
        resolved("mapRange", p, "inMax")?.clone(),
        resolved("mapRange", p, "outMin")?.clone(),
        resolved("mapRange", p, "outMax")?.clone(),
    ];
    apply_kernel("mapRange", Kernel::MapRange, &args)
}

fn map_range_compile(
    input: ValueRef,
    p: &ParamRefs,
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    zip_params(
        "mapRange",
        Kernel::MapRange,
        input,
        p,
        &["inMin", "inMax", "outMin", "outMax"],
        b,
    )
}

// ─── Phase lenses ──────────────────────────────────────────────────────

static PHASE_OFFSET_PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "amount",
    domain: DomainKind::Float,
    default: Value::Number(0.0),
    ui_hint: "slider",
    range: Some((-1.0, 1.0)),
}];

fn phase_offset_apply(v: &Value, p: &ResolvedParams) -> Result<Value, TransformError> {
    let amount = resolved("phaseOffset", p, "amount")?.clone();
    apply_kernel("phaseOffset", Kernel::PhaseAdd, &[v.clone(), amount])
}

fn phase_offset_compile(
    input: ValueRef,
    p: &ParamRefs,
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    zip_params("phaseOffset", Kernel::PhaseAdd, input, p, &["amount"], b)
}

static PHASE_SCALE_PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "factor",
    domain: DomainKind::Float,
    default: Value::Number(1.0),
    ui_hint: "slider",
    range: Some((0.0, 16.0)),
}];

fn phase_scale_apply(v: &Value, p: &ResolvedParams) -> Result<Value, TransformError> {
    let factor = resolved("phaseScale", p, "factor")?.clone();
    apply_kernel("phaseScale", Kernel::PhaseScale, &[v.clone(), factor])
}

fn phase_scale_compile(
    input: ValueRef,
    p: &ParamRefs,
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    zip_params("phaseScale", Kernel::PhaseScale, input, p, &["factor"], b)
}

fn ping_pong_apply(v: &Value, _: &ResolvedParams) -> Result<Value, TransformError> {
    apply_kernel("pingPong", Kernel::PingPong, &[v.clone()])
}

fn ping_pong_compile(
    input: ValueRef,
    _: &ParamRefs,
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    Ok(b.map(input, Kernel::PingPong))
}

static PHASE_QUANTIZE_PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "steps",
    domain: DomainKind::Float,
    default: Value::Number(8.0),
    ui_hint: "slider",
    range: Some((1.0, 64.0)),
}];

fn phase_quantize_apply(v: &Value, p: &ResolvedParams) -> Result<Value, TransformError> {
    let steps = resolved("phaseQuantize", p, "steps")?.clone();
    apply_kernel("phaseQuantize", Kernel::PhaseQuantize, &[v.clone(), steps])
}

fn phase_quantize_compile(
    input: ValueRef,
    p: &ParamRefs,
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    zip_params("phaseQuantize", Kernel::PhaseQuantize, input, p, &["steps"], b)
}

// ─── Vec2 lenses ───────────────────────────────────────────────────────

static VEC2_GAIN_BIAS_PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "gain",
        domain: DomainKind::Vec2,
        default: Value::Vec2(Vec2::new(1.0, 1.0)),
        ui_hint: "vec2",
        range: None,
    },
    ParamSpec {
        name: "bias",
        domain: DomainKind::Vec2,
        default: Value::Vec2(Vec2::new(0.0, 0.0)),
        ui_hint: "vec2",
        range: None,
    },
];

fn vec2_gain_bias_apply(v: &Value, p: &ResolvedParams) -> Result<Value, TransformError> {
    let gain = resolved("vec2GainBias", p, "gain")?.clone();
    let bias = resolved("vec2GainBias", p, "bias")?.clone();
    apply_kernel("vec2GainBias", Kernel::Vec2GainBias, &[v.clone(), gain, bias])
}

fn vec2_gain_bias_compile(
    input: ValueRef,
    p: &ParamRefs,
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    zip_params(
        "vec2GainBias",
        Kernel::Vec2GainBias,
        input,
        p,
        &["gain", "bias"],
        b,
    )
}

static ROTATE_2D_PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "radians",
    domain: DomainKind::Float,
    default: Value::Number(0.0),
    ui_hint: "dial",
    range: None,
}];

fn rotate_2d_apply(v: &Value, p: &ResolvedParams) -> Result<Value, TransformError> {
    let radians = resolved("rotate2D", p, "radians")?.clone();
    apply_kernel("rotate2D", Kernel::Rotate2D, &[v.clone(), radians])
}

fn rotate_2d_compile(
    input: ValueRef,
    p: &ParamRefs,
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    zip_params("rotate2D", Kernel::Rotate2D, input, p, &["radians"], b)
}

static TRANSLATE_2D_PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "offset",
    domain: DomainKind::Vec2,
    default: Value::Vec2(Vec2::new(0.0, 0.0)),
    ui_hint: "vec2",
    range: None,
}];

fn translate_2d_apply(v: &Value, p: &ResolvedParams) -> Result<Value, TransformError> {
    let offset = resolved("translate2D", p, "offset")?.clone();
    apply_kernel("translate2D", Kernel::Vec2Add, &[v.clone(), offset])
}

fn translate_2d_compile(
    input: ValueRef,
    p: &ParamRefs,
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    zip_params("translate2D", Kernel::Vec2Add, input, p, &["offset"], b)
}

// ─── Color lenses ──────────────────────────────────────────────────────

static COLOR_GAIN_PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "amount",
    domain: DomainKind::Float,
    default: Value::Number(1.0),
    ui_hint: "slider",
    range: Some((0.0, 4.0)),
}];

fn color_gain_apply(v: &Value, p: &ResolvedParams) -> Result<Value, TransformError> {
    let amount = resolved("colorGain", p, "amount")?.clone();
    apply_kernel("colorGain", Kernel::ColorGain, &[v.clone(), amount])
}

fn color_gain_compile(
    input: ValueRef,
    p: &ParamRefs,
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    zip_params("colorGain", Kernel::ColorGain, input, p, &["amount"], b)
}

static HUE_SHIFT_PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "amount",
    domain: DomainKind::Float,
    default: Value::Number(0.0),
    ui_hint: "dial",
    range: Some((-0.5, 0.5)),
}];

fn hue_shift_apply(v: &Value, p: &ResolvedParams) -> Result<Value, TransformError> {
    let amount = resolved("hueShift", p, "amount")?.clone();
    apply_kernel("hueShift", Kernel::HueShift, &[v.clone(), amount])
}

fn hue_shift_compile(
    input: ValueRef,
    p: &ParamRefs,
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    zip_params("hueShift", Kernel::HueShift, input, p, &["amount"], b)
}

static SATURATE_PARAMS: &[ParamSpec] = &[ParamSpec {
    name: "amount",
    domain: DomainKind::Float,
    default: Value::Number(1.0),
    ui_hint: "slider",
    range: Some((0.0, 2.0)),
}];

fn saturate_apply(v: &Value, p: &ResolvedParams) -> Result<Value, TransformError> {
    let amount = resolved("saturate", p, "amount")?.clone();
    apply_kernel("saturate", Kernel::Saturate, &[v.clone(), amount])
}

fn saturate_compile(
    input: ValueRef,
    p: &ParamRefs,
    b: &mut IrBuilder,
) -> Result<ValueRef, CompileStepError> {
    zip_params("saturate", Kernel::Saturate, input, p, &["amount"], b)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::transform::TransformRegistry;

    fn registry() -> TransformRegistry {
        let mut reg = TransformRegistry::new();
        register_lens_catalog(&mut reg).unwrap();
        reg
    }

    #[test]
    fn catalog_spans_required_lenses() {
        let reg = registry();
        for id in [
            "gain",
            "polarity",
            "clamp",
            "slew",
            "quantize",
            "ease",
            "mapRange",
            "phaseOffset",
            "phaseScale",
            "pingPong",
            "phaseQuantize",
            "vec2GainBias",
            "rotate2D",
            "translate2D",
            "colorGain",
            "hueShift",
            "saturate",
        ] {
            let def = reg.get(id).unwrap_or_else(|| panic!("missing lens {id}"));
            assert!(def.is_lens(), "{id} must be a lens");
            assert!(!def.stateful);
        }
    }

    #[test]
    fn gain_apply_scales_numbers() {
        let reg = registry();
        let def = reg.get("gain").unwrap();
        let mut params = ResolvedParams::new();
        params.insert("amount", Value::Number(2.0));
        let out = (def.apply)(&Value::Number(3.0), &params).unwrap();
        assert_eq!(out, Value::Number(6.0));
    }

    #[test]
    fn phase_offset_wraps() {
        let reg = registry();
        let def = reg.get("phaseOffset").unwrap();
        let mut params = ResolvedParams::new();
        params.insert("amount", Value::Number(0.5));
        let out = (def.apply)(&Value::Phase(0.75), &params).unwrap();
        assert_eq!(out, Value::Phase(0.25));
    }

    #[test]
    fn ease_compile_requires_const_curve() {
        let reg = registry();
        let def = reg.get("ease").unwrap();
        let mut b = IrBuilder::new();
        let input = b.sig_const(&Value::Number(0.5));
        let wire = b.time();
        let mut params = ParamRefs::new();
        params.insert("curve", wire);
        assert!(matches!(
            (def.compile)(input, &params, &mut b),
            Err(CompileStepError::NonConstParam { .. })
        ));
    }

    #[test]
    fn lens_compile_over_field_stays_in_field_world() {
        use crate::ir::{FieldSourceKind, RefKind};
        use crate::value::{DomainDesc, DomainShape};
        let reg = registry();
        let def = reg.get("gain").unwrap();
        let mut b = IrBuilder::new();
        let domain = b.sig_const(&Value::Domain(DomainDesc {
            id: crate::ident::make_domain_id("g"),
            shape: DomainShape::Line { count: 4 },
        }));
        let field = b.field_source(domain, FieldSourceKind::UnitCoord);
        let amount = b.sig_const(&Value::Number(2.0));
        let mut params = ParamRefs::new();
        params.insert("amount", amount);
        let out = (def.compile)(field, &params, &mut b).unwrap();
        assert_eq!(out.kind, RefKind::FieldExpr);
    }
}
