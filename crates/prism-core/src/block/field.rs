// SPDX-License-Identifier: Apache-2.0
//! Field-world blocks: domain producer, per-element coordinates, and the
//! instance render sink.

use crate::block::{
    BlockArgs, BlockCompile, BlockDef, BlockError, BlockRegistry, DefaultSource, OutputDef,
    Outputs, SlotDef,
};
use crate::combine::CombinePolicy;
use crate::ident::make_domain_id;
use crate::ir::{FieldSourceKind, IrBuilder, RenderSpec};
use crate::patch::BlockRole;
use crate::transform::RegistryError;
use crate::types::{DomainKind, TypeDesc};
use crate::value::{DomainDesc, DomainShape, Rgba, Value, Vec2};

pub(crate) fn register(reg: &mut BlockRegistry) -> Result<(), RegistryError> {
    reg.register(grid_domain_def())?;
    reg.register(field_coord_def())?;
    reg.register(render_instances_def())?;
    Ok(())
}

/// The domain artifact type: scalar world, excluded from buses.
const DOMAIN_TY: TypeDesc = TypeDesc::scalar(DomainKind::Domain).not_bus_eligible();

// ─── gridDomain ────────────────────────────────────────────────────────

static GRID_OUTPUTS: &[OutputDef] = &[OutputDef {
    id: "domain",
    ty: DOMAIN_TY,
}];

fn grid_domain_compile(args: &BlockArgs<'_>, b: &mut IrBuilder) -> Result<Outputs, BlockError> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let cols = args.param_f64("cols", 8.0).max(1.0) as u32;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rows = args.param_f64("rows", 8.0).max(1.0) as u32;
    // Domain identity covers the producing block and the shape: resizing the
    // grid is a new domain, which hot-swap classifies as Class C.
    let label = format!("{}/{cols}x{rows}", hex::encode(args.id.as_bytes()));
    let desc = DomainDesc {
        id: make_domain_id(&label),
        shape: DomainShape::Grid { cols, rows },
    };
    let mut outputs = Outputs::new();
    outputs.insert("domain", b.scalar_const(&Value::Domain(desc)));
    Ok(outputs)
}

fn grid_domain_def() -> BlockDef {
    BlockDef {
        type_name: "gridDomain",
        role: None,
        hidden: false,
        inputs: &[],
        outputs: GRID_OUTPUTS,
        deferred_input: None,
        compile: BlockCompile::V2(grid_domain_compile),
    }
}

// ─── fieldCoord ────────────────────────────────────────────────────────

static FIELD_COORD_INPUTS: &[SlotDef] = &[SlotDef {
    id: "domain",
    ty: DOMAIN_TY,
    default_source: None,
    combine: CombinePolicy::latest(),
}];

static FIELD_COORD_OUTPUTS: &[OutputDef] = &[
    OutputDef {
        id: "index",
        ty: TypeDesc::field(DomainKind::Float),
    },
    OutputDef {
        id: "unit",
        ty: TypeDesc::field(DomainKind::Unit),
    },
    OutputDef {
        id: "position",
        ty: TypeDesc::field(DomainKind::Point),
    },
];

fn field_coord_compile(args: &BlockArgs<'_>, b: &mut IrBuilder) -> Result<Outputs, BlockError> {
    let domain = args.input("domain")?;
    let mut outputs = Outputs::new();
    outputs.insert("index", b.field_source(domain, FieldSourceKind::Index));
    outputs.insert("unit", b.field_source(domain, FieldSourceKind::UnitCoord));
    outputs.insert("position", b.field_source(domain, FieldSourceKind::GridPos));
    Ok(outputs)
}

fn field_coord_def() -> BlockDef {
    BlockDef {
        type_name: "fieldCoord",
        role: None,
        hidden: false,
        inputs: FIELD_COORD_INPUTS,
        outputs: FIELD_COORD_OUTPUTS,
        deferred_input: None,
        compile: BlockCompile::V2(field_coord_compile),
    }
}

// ─── renderInstances ───────────────────────────────────────────────────

static RENDER_INPUTS: &[SlotDef] = &[
    SlotDef {
        id: "domain",
        ty: DOMAIN_TY,
        default_source: None,
        combine: CombinePolicy::latest(),
    },
    SlotDef {
        id: "position",
        ty: TypeDesc::field(DomainKind::Point),
        default_source: Some(DefaultSource::Const(Value::Point(Vec2::new(0.5, 0.5)))),
        combine: CombinePolicy::latest(),
    },
    SlotDef {
        id: "color",
        ty: TypeDesc::field(DomainKind::Color),
        default_source: Some(DefaultSource::Const(Value::Color(Rgba::rgb(
            1.0, 1.0, 1.0,
        )))),
        combine: CombinePolicy::latest(),
    },
    SlotDef {
        id: "size",
        ty: TypeDesc::field(DomainKind::Float),
        default_source: Some(DefaultSource::Const(Value::Number(8.0))),
        combine: CombinePolicy::latest(),
    },
];

fn render_instances_compile(
    args: &BlockArgs<'_>,
    b: &mut IrBuilder,
) -> Result<Outputs, BlockError> {
    let spec = RenderSpec {
        domain: args.input("domain")?,
        position: args.input("position")?,
        color: args.input("color")?,
        size: args.input("size")?,
    };
    b.set_render(spec)?;
    Ok(Outputs::new())
}

fn render_instances_def() -> BlockDef {
    BlockDef {
        type_name: "renderInstances",
        role: Some(BlockRole::RenderRoot),
        hidden: false,
        inputs: RENDER_INPUTS,
        outputs: &[],
        deferred_input: None,
        compile: BlockCompile::V2(render_instances_compile),
    }
}
