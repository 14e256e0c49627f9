// SPDX-License-Identifier: Apache-2.0
//! prism-core: deterministic visual-patch graph compiler and frame runtime.
//!
//! A patch is a directed graph of typed blocks wired by edges across three
//! value worlds (scalar, signal, field) plus discrete events. The compiler
//! lowers a patch snapshot into an indexed-array IR with a deterministic
//! schedule; the evaluator executes one frame at a time with at-most-once
//! node evaluation; the swap scheduler exchanges programs at frame
//! boundaries while migrating keyed state.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::unreadable_literal,
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::redundant_pub_crate,
    clippy::many_single_char_names,
    clippy::module_name_repetitions,
    clippy::use_self
)]

/// Block registry: slot signatures, default sources, compile functions.
pub mod block;
/// Combine policies for multi-writer inputs and buses.
pub mod combine;
/// The compiler pipeline and compiled program artifact.
pub mod compile;
mod diag;
/// The frame evaluator and its state store.
pub mod eval;
mod ident;
/// Typed expression IR and its builder.
pub mod ir;
mod patch;
mod swap;
mod telemetry;
mod time;
/// Transform registry: lenses, adapters, and the pathfinder.
pub mod transform;
mod tx;
mod types;
mod value;

// Re-exports for the stable public API.
/// Structured compile diagnostics with graph locations.
pub use diag::{DiagCode, Diagnostic, GraphLoc, Severity};
/// Core identifier types and constructors.
pub use ident::{
    derived_provider_edge_id, derived_provider_id, make_block_id, make_domain_id, make_edge_id,
    short_hex, BlockId, DomainId, EdgeId, Hash,
};
/// Patch model: blocks, edges, transform steps, and structural mutation.
pub use patch::{
    Block, BlockRole, Edge, ParamBinding, Patch, PatchError, PortRef, TransformStep,
};
/// Hot-swap scheduling: edit classes, boundaries, receipts.
pub use swap::{
    classify_edit, EditClass, PendingSwap, SwapBoundary, SwapError, SwapReceipt, SwapScheduler,
};
/// Runtime telemetry sink.
pub use telemetry::{NullTelemetrySink, TelemetrySink};
/// Time topology: the time model and reserved buses.
pub use time::{reserved_bus_type, CycleMode, TimeModel, RESERVED_BUSES};
/// Transactions: ops, change events, undo history.
pub use tx::{apply_tx, ChangeEvent, History, PatchOp, TxError};
/// Type descriptors for the value worlds.
pub use types::{assignable, Category, DomainKind, TypeDesc, TypeParseError, World};
/// Runtime values.
pub use value::{DomainDesc, DomainShape, Rgba, Value, Vec2, Waveform};
