// SPDX-License-Identifier: Apache-2.0
//! The render tree handed to host backends.

use crate::ident::DomainId;
use crate::value::{Rgba, Vec2};

/// Materialized per-frame output of the root render sink.
///
/// Buffers are parallel over the domain's elements in the domain's
/// deterministic order. The evaluator reuses the backing allocations across
/// frames; hosts must copy anything they keep past the next frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderTree {
    /// Identity of the domain the buffers cover.
    pub domain: Option<DomainId>,
    /// Normalized instance positions.
    pub positions: Vec<Vec2>,
    /// Instance colors.
    pub colors: Vec<Rgba>,
    /// Instance sizes.
    pub sizes: Vec<f64>,
}

impl RenderTree {
    /// Number of instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// True when nothing is drawn.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
