// SPDX-License-Identifier: Apache-2.0
//! Structured compile diagnostics with graph locations.
//!
//! Diagnostics accumulate: the compiler never aborts on the first error, and
//! it never hands out a partial program. Every diagnostic references a
//! deterministic graph location so a canvas UI can jump straight to the
//! offending block, edge, port, bus, or cycle.

use crate::ident::{short_hex, BlockId, EdgeId};

/// Stable diagnostic code taxonomy.
///
/// Codes are part of the host contract: inspectors key help content and
/// quick-fixes off them, so variants are append-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DiagCode {
    /// No TimeRoot block in the patch.
    MissingTimeRoot,
    /// More than one TimeRoot block in the patch.
    MultipleTimeRoots,
    /// A TimeRoot has an incoming edge.
    TimeRootHasInput,
    /// The cyclic patch never publishes a primary phase.
    MissingPrimaryPhase,
    /// A reserved bus exists with a non-matching type.
    ReservedBusTypeMismatch,
    /// A cycle is not broken by any memory-bearing block.
    IllegalFeedback,
    /// A time-domain input has competing writers with no explicit policy.
    AmbiguousClockInput,
    /// An edge's transform chain does not produce an assignable type.
    TypeMismatch,
    /// Multiple writers hit an input whose combine mode is `error`.
    MultiWriterForbidden,
    /// An edge references a transform id missing from the registry.
    UnknownTransform,
    /// A transform chain requires an adapter the policy context forbids.
    AdapterPolicyViolation,
    /// A block references a type name missing from the registry.
    UnknownBlockType,
    /// An edge endpoint references a slot the block does not declare.
    UnknownSlot,
    /// An edge endpoint references a block missing from the patch.
    DanglingEdge,
    /// A lens parameter binding could not be resolved.
    UnresolvedParamBinding,
    /// An input slot has no writer and no default source after Pass 0.
    MissingInput,
    /// A block's compile function failed.
    BlockCompileFailed,
    /// A compiler invariant was violated (engine bug, not a patch error).
    Internal,
}

impl DiagCode {
    /// Stable wire code, e.g. `TR-001`.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::MissingTimeRoot => "TR-001",
            Self::MultipleTimeRoots => "TR-002",
            Self::TimeRootHasInput => "TR-003",
            Self::MissingPrimaryPhase => "TM-101",
            Self::ReservedBusTypeMismatch => "TM-103",
            Self::IllegalFeedback => "FB-301",
            Self::AmbiguousClockInput => "PC-202",
            Self::TypeMismatch => "TY-201",
            Self::MultiWriterForbidden => "MW-401",
            Self::UnknownTransform => "XF-402",
            Self::AdapterPolicyViolation => "XF-403",
            Self::UnknownBlockType => "PG-501",
            Self::UnknownSlot => "PG-502",
            Self::DanglingEdge => "PG-503",
            Self::UnresolvedParamBinding => "XF-404",
            Self::MissingInput => "PG-504",
            Self::BlockCompileFailed => "PG-505",
            Self::Internal => "IC-901",
        }
    }

    /// Short human title for inspector headers.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::MissingTimeRoot => "missing time root",
            Self::MultipleTimeRoots => "multiple time roots",
            Self::TimeRootHasInput => "time root has input",
            Self::MissingPrimaryPhase => "missing primary phase",
            Self::ReservedBusTypeMismatch => "reserved bus type mismatch",
            Self::IllegalFeedback => "illegal feedback",
            Self::AmbiguousClockInput => "ambiguous clock input",
            Self::TypeMismatch => "type mismatch",
            Self::MultiWriterForbidden => "multiple writers forbidden",
            Self::UnknownTransform => "unknown transform",
            Self::AdapterPolicyViolation => "adapter policy violation",
            Self::UnknownBlockType => "unknown block type",
            Self::UnknownSlot => "unknown slot",
            Self::DanglingEdge => "dangling edge",
            Self::UnresolvedParamBinding => "unresolved parameter binding",
            Self::MissingInput => "missing input",
            Self::BlockCompileFailed => "block compile failed",
            Self::Internal => "internal compiler invariant violated",
        }
    }
}

/// Diagnostic severity. Errors block run; warnings are advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Severity {
    /// Advisory; compilation still yields a program.
    Warning,
    /// Fatal; the compiler returns diagnostics and no program.
    Error,
}

/// Deterministic reference into the patch graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum GraphLoc {
    /// A block.
    Block(BlockId),
    /// An edge.
    Edge(EdgeId),
    /// One port (input or output slot) of a block.
    Port {
        /// Owning block.
        block: BlockId,
        /// Slot id within the block.
        slot: String,
    },
    /// A bus (identified by its hidden `BusBlock`).
    Bus(BlockId),
    /// A strongly connected component, blocks in ascending id order.
    Scc(Vec<BlockId>),
}

impl core::fmt::Display for GraphLoc {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Block(b) => write!(f, "block {}", short_hex(&b.0)),
            Self::Edge(e) => write!(f, "edge {}", short_hex(&e.0)),
            Self::Port { block, slot } => {
                write!(f, "port {}:{slot}", short_hex(&block.0))
            }
            Self::Bus(b) => write!(f, "bus {}", short_hex(&b.0)),
            Self::Scc(blocks) => {
                write!(f, "cycle {{")?;
                for (i, b) in blocks.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", short_hex(&b.0))?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// One structured compile diagnostic.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Diagnostic {
    /// Stable taxonomy code.
    pub code: DiagCode,
    /// Error or warning.
    pub severity: Severity,
    /// One-line human message.
    pub message: String,
    /// Optional expanded detail (formatted types, writer lists, ...).
    pub details: Option<String>,
    /// Graph locations this diagnostic refers to, deterministic order.
    pub locations: Vec<GraphLoc>,
    /// Optional fix hint.
    pub help: Option<String>,
}

impl Diagnostic {
    /// New error diagnostic.
    #[must_use]
    pub fn error(code: DiagCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: Severity::Error,
            message: message.into(),
            details: None,
            locations: Vec::new(),
            help: None,
        }
    }

    /// New warning diagnostic.
    #[must_use]
    pub fn warning(code: DiagCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(code, message)
        }
    }

    /// Appends a graph location.
    #[must_use]
    pub fn at(mut self, loc: GraphLoc) -> Self {
        self.locations.push(loc);
        self
    }

    /// Attaches expanded detail text.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Attaches a fix hint.
    #[must_use]
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// True for `Severity::Error`.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl core::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} {}: {}",
            self.code.code(),
            self.code.title(),
            self.message
        )?;
        for loc in &self.locations {
            write!(f, " [{loc}]")?;
        }
        Ok(())
    }
}
