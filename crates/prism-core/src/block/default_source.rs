// SPDX-License-Identifier: Apache-2.0
//! Hidden default-source provider blocks.
//!
//! Default sources and hidden providers are one mechanism: every unwired
//! input is backed by a synthesized provider block plus an edge, so no later
//! pass ever special-cases "missing input". One provider type exists per
//! `(world, domain)` pair that can carry a default; [`provider_type_for`]
//! picks the member for a slot type.
//!
//! Signal providers compile to `param` nodes, so retuning a default value is
//! a Class A edit: the running program updates without a structural swap.

use crate::block::{
    BlockArgs, BlockCompile, BlockDef, BlockError, BlockRegistry, OutputDef, Outputs,
};
use crate::ir::IrBuilder;
use crate::patch::BlockRole;
use crate::transform::RegistryError;
use crate::types::{DomainKind, TypeDesc, World};
use crate::value::Value;

pub(crate) fn register(reg: &mut BlockRegistry) -> Result<(), RegistryError> {
    for def in family() {
        reg.register(def)?;
    }
    Ok(())
}

/// The provider type name for a slot type, when one exists.
#[must_use]
pub fn provider_type_for(ty: &TypeDesc) -> Option<&'static str> {
    match (ty.world, ty.domain) {
        (World::Scalar, DomainKind::Float) => Some("ds.scalar.float"),
        (World::Event, _) => Some("ds.event"),
        (World::Signal, DomainKind::Float) => Some("ds.signal.float"),
        (World::Signal, DomainKind::Int) => Some("ds.signal.int"),
        (World::Signal, DomainKind::Phase) => Some("ds.signal.phase"),
        (World::Signal, DomainKind::Unit) => Some("ds.signal.unit"),
        (World::Signal, DomainKind::Duration) => Some("ds.signal.duration"),
        (World::Signal, DomainKind::Rate) => Some("ds.signal.rate"),
        (World::Signal, DomainKind::Color) => Some("ds.signal.color"),
        (World::Signal, DomainKind::Vec2) => Some("ds.signal.vec2"),
        (World::Signal, DomainKind::Point) => Some("ds.signal.point"),
        (World::Signal, DomainKind::Bool) => Some("ds.signal.bool"),
        (World::Signal, DomainKind::Waveform) => Some("ds.signal.waveform"),
        (World::Field, DomainKind::Float) => Some("ds.field.float"),
        (World::Field, DomainKind::Unit) => Some("ds.field.unit"),
        (World::Field, DomainKind::Color) => Some("ds.field.color"),
        (World::Field, DomainKind::Vec2) => Some("ds.field.vec2"),
        (World::Field, DomainKind::Point) => Some("ds.field.point"),
        _ => None,
    }
}

fn value_param(args: &BlockArgs<'_>, domain: DomainKind) -> Value {
    args.param("value")
        .cloned()
        .unwrap_or_else(|| Value::zero_of(domain))
}

fn scalar_compile(args: &BlockArgs<'_>, b: &mut IrBuilder) -> Result<Outputs, BlockError> {
    let value = value_param(args, DomainKind::Float);
    let mut outputs = Outputs::new();
    outputs.insert("out", b.scalar_const(&value));
    Ok(outputs)
}

fn event_compile(_: &BlockArgs<'_>, b: &mut IrBuilder) -> Result<Outputs, BlockError> {
    // A default event source never fires.
    let mut outputs = Outputs::new();
    outputs.insert("out", b.event_or(&[]));
    Ok(outputs)
}

macro_rules! provider {
    ($fn_name:ident, $static_name:ident, $world:ident, $domain:ident) => {
        static $static_name: &[OutputDef] = &[OutputDef {
            id: "out",
            ty: TypeDesc::new(World::$world, DomainKind::$domain),
        }];

        fn $fn_name(args: &BlockArgs<'_>, b: &mut IrBuilder) -> Result<Outputs, BlockError> {
            let value = value_param(args, DomainKind::$domain);
            let sig = b.param(args.id, "value", &value);
            let mut outputs = Outputs::new();
            let out = if World::$world == World::Field {
                b.broadcast(sig)
            } else {
                sig
            };
            outputs.insert("out", out);
            Ok(outputs)
        }
    };
}

provider!(sig_float, SIG_FLOAT_OUT, Signal, Float);
provider!(sig_int, SIG_INT_OUT, Signal, Int);
provider!(sig_phase, SIG_PHASE_OUT, Signal, Phase);
provider!(sig_unit, SIG_UNIT_OUT, Signal, Unit);
provider!(sig_duration, SIG_DURATION_OUT, Signal, Duration);
provider!(sig_rate, SIG_RATE_OUT, Signal, Rate);
provider!(sig_color, SIG_COLOR_OUT, Signal, Color);
provider!(sig_vec2, SIG_VEC2_OUT, Signal, Vec2);
provider!(sig_point, SIG_POINT_OUT, Signal, Point);
provider!(sig_bool, SIG_BOOL_OUT, Signal, Bool);
provider!(sig_waveform, SIG_WAVEFORM_OUT, Signal, Waveform);
provider!(field_float, FIELD_FLOAT_OUT, Field, Float);
provider!(field_unit, FIELD_UNIT_OUT, Field, Unit);
provider!(field_color, FIELD_COLOR_OUT, Field, Color);
provider!(field_vec2, FIELD_VEC2_OUT, Field, Vec2);
provider!(field_point, FIELD_POINT_OUT, Field, Point);

static SCALAR_FLOAT_OUT: &[OutputDef] = &[OutputDef {
    id: "out",
    ty: TypeDesc::scalar(DomainKind::Float),
}];

static EVENT_OUT: &[OutputDef] = &[OutputDef {
    id: "out",
    ty: TypeDesc::event(),
}];

fn family() -> Vec<BlockDef> {
    let make = |type_name: &'static str,
                outputs: &'static [OutputDef],
                compile: fn(&BlockArgs<'_>, &mut IrBuilder) -> Result<Outputs, BlockError>| {
        BlockDef {
            type_name,
            role: Some(BlockRole::DefaultSource),
            hidden: true,
            inputs: &[],
            outputs,
            deferred_input: None,
            compile: BlockCompile::V2(compile),
        }
    };
    vec![
        make("ds.scalar.float", SCALAR_FLOAT_OUT, scalar_compile),
        make("ds.event", EVENT_OUT, event_compile),
        make("ds.signal.float", SIG_FLOAT_OUT, sig_float),
        make("ds.signal.int", SIG_INT_OUT, sig_int),
        make("ds.signal.phase", SIG_PHASE_OUT, sig_phase),
        make("ds.signal.unit", SIG_UNIT_OUT, sig_unit),
        make("ds.signal.duration", SIG_DURATION_OUT, sig_duration),
        make("ds.signal.rate", SIG_RATE_OUT, sig_rate),
        make("ds.signal.color", SIG_COLOR_OUT, sig_color),
        make("ds.signal.vec2", SIG_VEC2_OUT, sig_vec2),
        make("ds.signal.point", SIG_POINT_OUT, sig_point),
        make("ds.signal.bool", SIG_BOOL_OUT, sig_bool),
        make("ds.signal.waveform", SIG_WAVEFORM_OUT, sig_waveform),
        make("ds.field.float", FIELD_FLOAT_OUT, field_float),
        make("ds.field.unit", FIELD_UNIT_OUT, field_unit),
        make("ds.field.color", FIELD_COLOR_OUT, field_color),
        make("ds.field.vec2", FIELD_VEC2_OUT, field_vec2),
        make("ds.field.point", FIELD_POINT_OUT, field_point),
    ]
}
