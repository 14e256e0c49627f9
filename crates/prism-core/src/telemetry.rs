// SPDX-License-Identifier: Apache-2.0
//! Telemetry sink for runtime observability.
//!
//! The deterministic core never writes to stdout/stderr; hosts that want
//! eval-error logs, swap audits, or frame accounting install a sink. The
//! default [`NullTelemetrySink`] drops everything.

/// Host-provided observer for runtime events.
///
/// All methods have empty defaults so sinks implement only what they need.
/// Implementations must be cheap; they run on the render thread.
pub trait TelemetrySink: Send + Sync + core::fmt::Debug {
    /// A node failed during evaluation and its value was substituted with a
    /// default. The frame completed anyway.
    fn node_substituted(&self, _node: u32, _reason: &str) {}

    /// The root render sink failed; the previous frame's tree was kept.
    fn render_kept_previous(&self, _reason: &str) {}

    /// A program swap committed.
    fn program_swapped(&self, _class: &str, _preserved: usize, _reset: usize) {}
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetrySink;

impl TelemetrySink for NullTelemetrySink {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sink_accepts_events() {
        let sink = NullTelemetrySink;
        sink.node_substituted(3, "kernel arity");
        sink.render_kept_previous("sink failed");
        sink.program_swapped("B", 2, 0);
    }
}
