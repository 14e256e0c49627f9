// SPDX-License-Identifier: Apache-2.0
//! Time root blocks and reserved-bus publication.
//!
//! Exactly one time root exists per patch; it has no inputs, and the
//! [`crate::time::TimeModel`] is a pure function of its type name and
//! params. Each root publishes its canonical outputs onto the reserved
//! buses via ordinary hidden bus blocks and edges, so the compiler never
//! special-cases time plumbing.

use crate::block::{
    bus_type_for, BlockArgs, BlockCompile, BlockDef, BlockError, BlockRegistry, OutputDef,
    Outputs, SlotDef,
};
use crate::ident::{make_block_id, make_edge_id, BlockId};
use crate::ir::{IrBuilder, Kernel, StateKey};
use crate::patch::{Block, BlockRole, Edge, Patch, PatchError, PortRef};
use crate::time::{reserved_bus_type, CycleMode, TimeModel};
use crate::transform::RegistryError;
use crate::types::{DomainKind, TypeDesc};
use crate::value::Value;

pub(crate) fn register(reg: &mut BlockRegistry) -> Result<(), RegistryError> {
    reg.register(finite_def())?;
    reg.register(cycle_def())?;
    reg.register(infinite_def())?;
    Ok(())
}

static NO_INPUTS: &[SlotDef] = &[];

// ─── finiteTimeRoot ────────────────────────────────────────────────────

static FINITE_OUTPUTS: &[OutputDef] = &[
    OutputDef {
        id: "time",
        ty: TypeDesc::signal(DomainKind::Time),
    },
    OutputDef {
        id: "progress",
        ty: TypeDesc::signal(DomainKind::Unit),
    },
];

fn finite_compile(args: &BlockArgs<'_>, b: &mut IrBuilder) -> Result<Outputs, BlockError> {
    let duration = args
        .param("durationMs")
        .cloned()
        .unwrap_or(Value::Duration(5000.0));
    let duration = b.param(args.id, "durationMs", &duration);
    let t = b.time();
    let progress = b.zip(&[t, duration], Kernel::Progress);
    let mut outputs = Outputs::new();
    outputs.insert("time", t);
    outputs.insert("progress", progress);
    Ok(outputs)
}

fn finite_def() -> BlockDef {
    BlockDef {
        type_name: "finiteTimeRoot",
        role: Some(BlockRole::TimeRoot),
        hidden: false,
        inputs: NO_INPUTS,
        outputs: FINITE_OUTPUTS,
        deferred_input: None,
        compile: BlockCompile::V2(finite_compile),
    }
}

// ─── cycleTimeRoot ─────────────────────────────────────────────────────

static CYCLE_OUTPUTS: &[OutputDef] = &[
    OutputDef {
        id: "time",
        ty: TypeDesc::signal(DomainKind::Time),
    },
    OutputDef {
        id: "phase",
        ty: TypeDesc::signal(DomainKind::Phase),
    },
    OutputDef {
        id: "wrap",
        ty: TypeDesc::event(),
    },
];

fn cycle_compile(args: &BlockArgs<'_>, b: &mut IrBuilder) -> Result<Outputs, BlockError> {
    let period = args
        .param("periodMs")
        .cloned()
        .unwrap_or(Value::Duration(1000.0));
    let period = b.param(args.id, "periodMs", &period);
    // Wrap mode is structural: it changes the TimeModel (and therefore the
    // swap class), so it is not a live param.
    let ping_pong = args.param_f64("mode", 0.0) >= 1.0;
    let kernel = if ping_pong {
        Kernel::TimePhasePingPong
    } else {
        Kernel::TimePhase
    };
    let t = b.time();
    let phase = b.zip(&[t, period], kernel);
    let wrap = b.pulse(phase, StateKey::new(args.id, "wrap"))?;
    let mut outputs = Outputs::new();
    outputs.insert("time", t);
    outputs.insert("phase", phase);
    outputs.insert("wrap", wrap);
    Ok(outputs)
}

fn cycle_def() -> BlockDef {
    BlockDef {
        type_name: "cycleTimeRoot",
        role: Some(BlockRole::TimeRoot),
        hidden: false,
        inputs: NO_INPUTS,
        outputs: CYCLE_OUTPUTS,
        deferred_input: None,
        compile: BlockCompile::V2(cycle_compile),
    }
}

// ─── infiniteTimeRoot ──────────────────────────────────────────────────

static INFINITE_OUTPUTS: &[OutputDef] = &[
    OutputDef {
        id: "time",
        ty: TypeDesc::signal(DomainKind::Time),
    },
    OutputDef {
        id: "phase",
        ty: TypeDesc::signal(DomainKind::Phase),
    },
];

fn infinite_compile(args: &BlockArgs<'_>, b: &mut IrBuilder) -> Result<Outputs, BlockError> {
    let window = args
        .param("windowMs")
        .cloned()
        .unwrap_or(Value::Duration(10_000.0));
    let window = b.param(args.id, "windowMs", &window);
    let t = b.time();
    let phase = b.zip(&[t, window], Kernel::TimePhase);
    let mut outputs = Outputs::new();
    outputs.insert("time", t);
    outputs.insert("phase", phase);
    Ok(outputs)
}

fn infinite_def() -> BlockDef {
    BlockDef {
        type_name: "infiniteTimeRoot",
        role: Some(BlockRole::TimeRoot),
        hidden: false,
        inputs: NO_INPUTS,
        outputs: INFINITE_OUTPUTS,
        deferred_input: None,
        compile: BlockCompile::V2(infinite_compile),
    }
}

/// Derives the patch's [`TimeModel`] from a time-root block instance.
///
/// Pure in the block's type name and params; returns `None` for non-root
/// block types.
#[must_use]
pub fn time_model_of(block: &Block) -> Option<TimeModel> {
    let num = |key: &str, fallback: f64| {
        block.params.get(key).and_then(Value::as_f64).unwrap_or(fallback)
    };
    match block.ty.as_str() {
        "finiteTimeRoot" => Some(TimeModel::Finite {
            duration_ms: num("durationMs", 5000.0),
        }),
        "cycleTimeRoot" => Some(TimeModel::Cyclic {
            period_ms: num("periodMs", 1000.0),
            mode: if num("mode", 0.0) >= 1.0 {
                CycleMode::PingPong
            } else {
                CycleMode::Loop
            },
        }),
        "infiniteTimeRoot" => Some(TimeModel::Infinite {
            window_ms: num("windowMs", 10_000.0),
        }),
        _ => None,
    }
}

/// Outputs each root type publishes, as `(output slot, reserved bus id)`.
fn publications(ty: &str) -> &'static [(&'static str, &'static str)] {
    match ty {
        "finiteTimeRoot" => &[("progress", "progress")],
        "cycleTimeRoot" => &[("phase", "phaseA"), ("wrap", "pulse")],
        "infiniteTimeRoot" => &[("phase", "phaseA")],
        _ => &[],
    }
}

/// The singleton bus block id for a reserved bus name.
#[must_use]
pub fn reserved_bus_block_id(bus: &str) -> BlockId {
    make_block_id(&format!("bus:{bus}"))
}

/// Auto-publishes a time root's reserved outputs.
///
/// Creates the reserved hidden bus blocks that do not yet exist and wires
/// the root's outputs into them. Idempotent: existing buses and edges are
/// left alone.
///
/// # Errors
///
/// Propagates [`PatchError`] from block/edge insertion; the root must exist
/// in `patch`.
pub fn publish_reserved(patch: &mut Patch, root: &BlockId) -> Result<(), PatchError> {
    let ty = patch
        .block(root)
        .ok_or(PatchError::UnknownBlock(*root))?
        .ty
        .clone();
    for (out_slot, bus_name) in publications(&ty) {
        let Some(bus_ty) = reserved_bus_type(bus_name).and_then(|t| bus_type_for(&t)) else {
            continue;
        };
        let bus_id = reserved_bus_block_id(bus_name);
        if patch.block(&bus_id).is_none() {
            let mut bus = Block::new(bus_id, bus_ty)
                .with_role(BlockRole::Bus)
                .with_tag(*bus_name);
            bus.hidden = true;
            patch.add_block(bus)?;
        }
        let from = PortRef::new(*root, *out_slot);
        let to = PortRef::new(bus_id, "in");
        let already = patch
            .edges
            .iter()
            .any(|e| e.from == from && e.to == to);
        if !already {
            let edge_id = make_edge_id(&format!(
                "publish:{bus_name}:{}",
                hex::encode(root.as_bytes())
            ));
            patch.add_edge(Edge::new(edge_id, from, to))?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn time_model_is_pure_in_type_and_params() {
        let id = make_block_id("root");
        let cyc = Block::new(id, "cycleTimeRoot")
            .with_param("periodMs", Value::Duration(1000.0))
            .with_param("mode", Value::Int(0));
        assert_eq!(
            time_model_of(&cyc),
            Some(TimeModel::Cyclic {
                period_ms: 1000.0,
                mode: CycleMode::Loop
            })
        );

        let fin = Block::new(id, "finiteTimeRoot").with_param("durationMs", Value::Duration(250.0));
        assert_eq!(
            time_model_of(&fin),
            Some(TimeModel::Finite { duration_ms: 250.0 })
        );

        assert_eq!(time_model_of(&Block::new(id, "oscillator")), None);
    }

    #[test]
    fn publish_reserved_is_idempotent() {
        let mut patch = Patch::new();
        let root = make_block_id("root");
        patch
            .add_block(
                Block::new(root, "cycleTimeRoot").with_role(BlockRole::TimeRoot),
            )
            .unwrap();
        publish_reserved(&mut patch, &root).unwrap();
        let blocks = patch.blocks.len();
        let edges = patch.edges.len();
        publish_reserved(&mut patch, &root).unwrap();
        assert_eq!(patch.blocks.len(), blocks);
        assert_eq!(patch.edges.len(), edges);
        // phaseA and pulse buses plus two publication edges.
        assert_eq!(blocks, 3);
        assert_eq!(edges, 2);
    }
}
