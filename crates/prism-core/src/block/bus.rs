// SPDX-License-Identifier: Apache-2.0
//! Bus blocks.
//!
//! A bus is a hidden block with one `in` and one `out` of the same type.
//! All bus writes are ordinary edges into `in`; all reads are edges from
//! `out`. Writer resolution emits the combine node on `in` exactly as it
//! does for any other slot, and `out` is a pass-through alias of that
//! combine node — there is no separate bus entity anywhere downstream.
//!
//! Bus types are a closed per-domain family (`bus.float`, `bus.phase`, ...)
//! because slot signatures are static; [`bus_type_for`] picks the member
//! for a value type.

use crate::block::{
    BlockArgs, BlockCompile, BlockDef, BlockError, BlockRegistry, DefaultSource, OutputDef,
    Outputs, SlotDef,
};
use crate::combine::{CombineMode, CombinePolicy};
use crate::ir::IrBuilder;
use crate::patch::BlockRole;
use crate::transform::RegistryError;
use crate::types::{DomainKind, TypeDesc, World};
use crate::value::{Rgba, Value, Vec2};

pub(crate) fn register(reg: &mut BlockRegistry) -> Result<(), RegistryError> {
    for def in family() {
        reg.register(def)?;
    }
    Ok(())
}

/// The bus block type name carrying values of `ty`, when the type is bus
/// eligible.
#[must_use]
pub fn bus_type_for(ty: &TypeDesc) -> Option<&'static str> {
    if !ty.bus_eligible {
        return None;
    }
    match (ty.world, ty.domain) {
        (World::Event, _) => Some("bus.event"),
        (World::Signal, DomainKind::Float) => Some("bus.float"),
        (World::Signal, DomainKind::Phase) => Some("bus.phase"),
        (World::Signal, DomainKind::Unit) => Some("bus.unit"),
        (World::Signal, DomainKind::Duration) => Some("bus.duration"),
        (World::Signal, DomainKind::Rate) => Some("bus.rate"),
        (World::Signal, DomainKind::Color) => Some("bus.color"),
        (World::Signal, DomainKind::Vec2) => Some("bus.vec2"),
        (World::Signal, DomainKind::Point) => Some("bus.point"),
        (World::Signal, DomainKind::Bool) => Some("bus.bool"),
        _ => None,
    }
}

const fn bus_slot(ty: TypeDesc, default: Value) -> SlotDef {
    SlotDef {
        id: "in",
        ty,
        default_source: Some(DefaultSource::Const(default)),
        combine: CombinePolicy::always(CombineMode::Latest),
    }
}

const fn bus_out(ty: TypeDesc) -> OutputDef {
    OutputDef { id: "out", ty }
}

fn bus_compile(args: &BlockArgs<'_>, _: &mut IrBuilder) -> Result<Outputs, BlockError> {
    // Pass-through alias: writer resolution already emitted the combine node
    // for `in` (policy `always`), so `out` is that node.
    let combined = args.input("in")?;
    let mut outputs = Outputs::new();
    outputs.insert("out", combined);
    Ok(outputs)
}

macro_rules! bus_def {
    ($name:ident, $ty:expr, $default:expr) => {
        static $name: (&[SlotDef], &[OutputDef]) =
            (&[bus_slot($ty, $default)], &[bus_out($ty)]);
    };
}

bus_def!(
    BUS_FLOAT,
    TypeDesc::signal(DomainKind::Float),
    Value::Number(0.0)
);
bus_def!(
    BUS_PHASE,
    TypeDesc::signal(DomainKind::Phase),
    Value::Phase(0.0)
);
bus_def!(BUS_UNIT, TypeDesc::signal(DomainKind::Unit), Value::Unit(0.0));
bus_def!(
    BUS_DURATION,
    TypeDesc::signal(DomainKind::Duration),
    Value::Duration(0.0)
);
bus_def!(BUS_RATE, TypeDesc::signal(DomainKind::Rate), Value::Rate(1.0));
bus_def!(
    BUS_COLOR,
    TypeDesc::signal(DomainKind::Color),
    Value::Color(Rgba::rgb(0.0, 0.0, 0.0))
);
bus_def!(
    BUS_VEC2,
    TypeDesc::signal(DomainKind::Vec2),
    Value::Vec2(Vec2::new(0.0, 0.0))
);
bus_def!(
    BUS_POINT,
    TypeDesc::signal(DomainKind::Point),
    Value::Point(Vec2::new(0.0, 0.0))
);
bus_def!(BUS_BOOL, TypeDesc::signal(DomainKind::Bool), Value::Bool(false));
bus_def!(BUS_EVENT, TypeDesc::event(), Value::Bool(false));

fn family() -> Vec<BlockDef> {
    let make = |type_name: &'static str, slots: &'static (&'static [SlotDef], &'static [OutputDef])| BlockDef {
        type_name,
        role: Some(BlockRole::Bus),
        hidden: true,
        inputs: slots.0,
        outputs: slots.1,
        deferred_input: None,
        compile: BlockCompile::V2(bus_compile),
    };
    vec![
        make("bus.float", &BUS_FLOAT),
        make("bus.phase", &BUS_PHASE),
        make("bus.unit", &BUS_UNIT),
        make("bus.duration", &BUS_DURATION),
        make("bus.rate", &BUS_RATE),
        make("bus.color", &BUS_COLOR),
        make("bus.vec2", &BUS_VEC2),
        make("bus.point", &BUS_POINT),
        make("bus.bool", &BUS_BOOL),
        make("bus.event", &BUS_EVENT),
    ]
}
