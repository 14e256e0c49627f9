// SPDX-License-Identifier: Apache-2.0
//! Basic signal archetypes: constants, oscillator, arithmetic, memory.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::block::{
    Artifact, ArtifactValue, BlockArgs, BlockCompile, BlockDef, BlockError, BlockRegistry,
    DefaultSource, OutputDef, Outputs, SlotDef, V1Args,
};
use crate::combine::CombinePolicy;
use crate::ir::{IrBuilder, Kernel, OpaqueFn, StateKey};
use crate::transform::RegistryError;
use crate::types::{DomainKind, TypeDesc};
use crate::value::{Value, Waveform};

pub(crate) fn register(reg: &mut BlockRegistry) -> Result<(), RegistryError> {
    reg.register(const_def())?;
    reg.register(oscillator_def())?;
    reg.register(add_def())?;
    reg.register(multiply_def())?;
    reg.register(delay_def())?;
    reg.register(integrate_def())?;
    reg.register(sample_hold_def())?;
    reg.register(noise_def())?;
    Ok(())
}

// ─── const ─────────────────────────────────────────────────────────────

static CONST_OUTPUTS: &[OutputDef] = &[OutputDef {
    id: "out",
    ty: TypeDesc::scalar(DomainKind::Float),
}];

fn const_compile(args: &BlockArgs<'_>, b: &mut IrBuilder) -> Result<Outputs, BlockError> {
    let value = args.param("value").cloned().unwrap_or(Value::Number(0.0));
    let mut outputs = Outputs::new();
    outputs.insert("out", b.scalar_const(&value));
    Ok(outputs)
}

fn const_def() -> BlockDef {
    BlockDef {
        type_name: "const",
        role: None,
        hidden: false,
        inputs: &[],
        outputs: CONST_OUTPUTS,
        deferred_input: None,
        compile: BlockCompile::V2(const_compile),
    }
}

// ─── oscillator ────────────────────────────────────────────────────────

static OSC_INPUTS: &[SlotDef] = &[
    SlotDef {
        id: "frequency",
        ty: TypeDesc::signal(DomainKind::Float),
        default_source: Some(DefaultSource::Const(Value::Number(1.0))),
        combine: CombinePolicy::latest(),
    },
    SlotDef {
        id: "phase",
        ty: TypeDesc::signal(DomainKind::Phase),
        default_source: Some(DefaultSource::Const(Value::Phase(0.0))),
        combine: CombinePolicy::latest(),
    },
];

static OSC_OUTPUTS: &[OutputDef] = &[
    OutputDef {
        id: "out",
        ty: TypeDesc::signal(DomainKind::Float),
    },
    OutputDef {
        id: "phase",
        ty: TypeDesc::signal(DomainKind::Phase),
    },
];

fn oscillator_compile(args: &BlockArgs<'_>, b: &mut IrBuilder) -> Result<Outputs, BlockError> {
    let frequency = args.input("frequency")?;
    let phase_offset = args.input("phase")?;
    let waveform = args
        .param("waveform")
        .cloned()
        .unwrap_or(Value::Waveform(Waveform::Sine));
    let waveform = b.param(args.id, "waveform", &waveform);

    let t = b.time();
    let to_seconds = b.scalar_const(&Value::Number(0.001));
    let seconds = b.zip(&[t, to_seconds], Kernel::Mul);
    let turns = b.zip(&[seconds, frequency], Kernel::Mul);
    let phase = b.map(turns, Kernel::Fract);
    let phase = b.zip(&[phase, phase_offset], Kernel::PhaseAdd);
    let out = b.zip(&[phase, waveform], Kernel::Shape);

    let mut outputs = Outputs::new();
    outputs.insert("out", out);
    outputs.insert("phase", phase);
    Ok(outputs)
}

fn oscillator_def() -> BlockDef {
    BlockDef {
        type_name: "oscillator",
        role: None,
        hidden: false,
        inputs: OSC_INPUTS,
        outputs: OSC_OUTPUTS,
        deferred_input: None,
        compile: BlockCompile::V2(oscillator_compile),
    }
}

// ─── arithmetic ────────────────────────────────────────────────────────

static ADD_INPUTS: &[SlotDef] = &[
    SlotDef {
        id: "a",
        ty: TypeDesc::signal(DomainKind::Float),
        default_source: Some(DefaultSource::Const(Value::Number(0.0))),
        combine: CombinePolicy::latest(),
    },
    SlotDef {
        id: "b",
        ty: TypeDesc::signal(DomainKind::Float),
        default_source: Some(DefaultSource::Const(Value::Number(0.0))),
        combine: CombinePolicy::latest(),
    },
];

static MUL_INPUTS: &[SlotDef] = &[
    SlotDef {
        id: "a",
        ty: TypeDesc::signal(DomainKind::Float),
        default_source: Some(DefaultSource::Const(Value::Number(1.0))),
        combine: CombinePolicy::latest(),
    },
    SlotDef {
        id: "b",
        ty: TypeDesc::signal(DomainKind::Float),
        default_source: Some(DefaultSource::Const(Value::Number(1.0))),
        combine: CombinePolicy::latest(),
    },
];

static BINOP_OUTPUTS: &[OutputDef] = &[OutputDef {
    id: "out",
    ty: TypeDesc::signal(DomainKind::Float),
}];

fn add_compile(args: &BlockArgs<'_>, b: &mut IrBuilder) -> Result<Outputs, BlockError> {
    let lhs = args.input("a")?;
    let rhs = args.input("b")?;
    let mut outputs = Outputs::new();
    outputs.insert("out", b.zip(&[lhs, rhs], Kernel::Add));
    Ok(outputs)
}

fn multiply_compile(args: &BlockArgs<'_>, b: &mut IrBuilder) -> Result<Outputs, BlockError> {
    let lhs = args.input("a")?;
    let rhs = args.input("b")?;
    let mut outputs = Outputs::new();
    outputs.insert("out", b.zip(&[lhs, rhs], Kernel::Mul));
    Ok(outputs)
}

fn add_def() -> BlockDef {
    BlockDef {
        type_name: "add",
        role: None,
        hidden: false,
        inputs: ADD_INPUTS,
        outputs: BINOP_OUTPUTS,
        deferred_input: None,
        compile: BlockCompile::V2(add_compile),
    }
}

fn multiply_def() -> BlockDef {
    BlockDef {
        type_name: "multiply",
        role: None,
        hidden: false,
        inputs: MUL_INPUTS,
        outputs: BINOP_OUTPUTS,
        deferred_input: None,
        compile: BlockCompile::V2(multiply_compile),
    }
}

// ─── memory blocks ─────────────────────────────────────────────────────

static DELAY_INPUTS: &[SlotDef] = &[SlotDef {
    id: "in",
    ty: TypeDesc::signal(DomainKind::Float),
    default_source: Some(DefaultSource::Const(Value::Number(0.0))),
    combine: CombinePolicy::latest(),
}];

static MEMORY_OUTPUTS: &[OutputDef] = &[OutputDef {
    id: "out",
    ty: TypeDesc::signal(DomainKind::Float),
}];

fn delay_compile(args: &BlockArgs<'_>, b: &mut IrBuilder) -> Result<Outputs, BlockError> {
    let initial = args.param("initial").cloned().unwrap_or(Value::Number(0.0));
    let src = args.inputs.get("in").copied();
    let out = b.delay(src, &initial, StateKey::new(args.id, "delay"))?;
    let mut outputs = Outputs::new();
    outputs.insert("out", out);
    Ok(outputs)
}

fn delay_def() -> BlockDef {
    BlockDef {
        type_name: "delay",
        role: None,
        hidden: false,
        inputs: DELAY_INPUTS,
        outputs: MEMORY_OUTPUTS,
        deferred_input: Some("in"),
        compile: BlockCompile::V2(delay_compile),
    }
}

fn integrate_compile(args: &BlockArgs<'_>, b: &mut IrBuilder) -> Result<Outputs, BlockError> {
    let src = args.inputs.get("in").copied();
    let out = b.integrate(src, StateKey::new(args.id, "integrate"))?;
    let mut outputs = Outputs::new();
    outputs.insert("out", out);
    Ok(outputs)
}

fn integrate_def() -> BlockDef {
    BlockDef {
        type_name: "integrate",
        role: None,
        hidden: false,
        inputs: DELAY_INPUTS,
        outputs: MEMORY_OUTPUTS,
        deferred_input: Some("in"),
        compile: BlockCompile::V2(integrate_compile),
    }
}

static SAMPLE_HOLD_INPUTS: &[SlotDef] = &[
    SlotDef {
        id: "in",
        ty: TypeDesc::signal(DomainKind::Float),
        default_source: Some(DefaultSource::Const(Value::Number(0.0))),
        combine: CombinePolicy::latest(),
    },
    SlotDef {
        id: "trigger",
        ty: TypeDesc::event(),
        default_source: Some(DefaultSource::Const(Value::Bool(false))),
        combine: CombinePolicy::latest(),
    },
];

fn sample_hold_compile(args: &BlockArgs<'_>, b: &mut IrBuilder) -> Result<Outputs, BlockError> {
    let trigger = args.input("trigger")?;
    let src = args.inputs.get("in").copied();
    let out = b.sample_hold(src, trigger, StateKey::new(args.id, "hold"))?;
    let mut outputs = Outputs::new();
    outputs.insert("out", out);
    Ok(outputs)
}

fn sample_hold_def() -> BlockDef {
    BlockDef {
        type_name: "sampleHold",
        role: None,
        hidden: false,
        inputs: SAMPLE_HOLD_INPUTS,
        outputs: MEMORY_OUTPUTS,
        deferred_input: Some("in"),
        compile: BlockCompile::V2(sample_hold_compile),
    }
}

// ─── noise (legacy V1 block, exercises the closure bridge) ─────────────

static NOISE_OUTPUTS: &[OutputDef] = &[OutputDef {
    id: "out",
    ty: TypeDesc::signal(DomainKind::Float),
}];

/// Deterministic value noise over a 1-D lattice. Pure in `(x, seed)`, so
/// frames replay bit-identically.
fn value_noise(x: f64, seed: u64) -> f64 {
    fn lattice(i: i64, seed: u64) -> f64 {
        let mut z = (i as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15) ^ seed;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^= z >> 31;
        #[allow(clippy::cast_precision_loss)]
        let unit = (z >> 11) as f64 / (1u64 << 53) as f64;
        2.0 * unit - 1.0
    }
    let floor = libm::floor(x);
    #[allow(clippy::cast_possible_truncation)]
    let i = floor as i64;
    let f = x - floor;
    let smooth = f * f * (3.0 - 2.0 * f);
    let a = lattice(i, seed);
    let b = lattice(i + 1, seed);
    a + (b - a) * smooth
}

fn noise_v1(args: &V1Args<'_>) -> Result<BTreeMap<&'static str, Artifact>, BlockError> {
    let rate = args
        .params
        .get("rate")
        .and_then(Value::as_f64)
        .unwrap_or(1.0);
    let seed = u64::from_le_bytes(
        args.id.as_bytes()[0..8]
            .try_into()
            .map_err(|_| BlockError::BadParam { param: "rate" })?,
    );
    let f = OpaqueFn(Arc::new(move |ctx: &crate::ir::EvalCtx| {
        Value::Number(value_noise(ctx.t_ms * 0.001 * rate, seed))
    }));
    let mut outputs = BTreeMap::new();
    outputs.insert(
        "out",
        Artifact {
            ty: TypeDesc::signal(DomainKind::Float),
            value: ArtifactValue::Closure(f),
        },
    );
    Ok(outputs)
}

fn noise_def() -> BlockDef {
    BlockDef {
        type_name: "noise",
        role: None,
        hidden: false,
        inputs: &[],
        outputs: NOISE_OUTPUTS,
        deferred_input: None,
        compile: BlockCompile::V1(noise_v1),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn value_noise_is_deterministic_and_bounded() {
        for i in 0..64 {
            let x = f64::from(i) * 0.37;
            let a = value_noise(x, 42);
            let b = value_noise(x, 42);
            assert_eq!(a.to_bits(), b.to_bits());
            assert!((-1.0..=1.0).contains(&a));
        }
    }

    #[test]
    fn value_noise_seed_separates_streams() {
        assert_ne!(value_noise(0.5, 1), value_noise(0.5, 2));
    }
}
