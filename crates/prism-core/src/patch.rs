// SPDX-License-Identifier: Apache-2.0
//! The patch value: blocks, edges, and edge transform chains.
//!
//! A `Patch` is an immutable snapshot in spirit: the transaction layer clones
//! it, applies validated mutations, and publishes the result as a new
//! snapshot. The mutating methods here are the single place structural
//! invariants are enforced:
//!
//! - every edge endpoint references an existing block,
//! - no two edges share an identical `(from, to)` pair,
//! - `(sort_key, id)` forms a total order among edges targeting the same
//!   input.
//!
//! Slot existence and type connectability are compiler concerns (the patch
//! layer has no registry access); they surface as diagnostics in Pass 1/2.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::combine::CombinePolicy;
use crate::ident::{BlockId, EdgeId, Hash};
use crate::value::Value;

/// Distinguished roles a block can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum BlockRole {
    /// The patch's single time topology root.
    TimeRoot,
    /// Hidden bus node (`in`/`out` of the same type plus a combine policy).
    Bus,
    /// Hidden synthesized default-source provider.
    DefaultSource,
    /// Root render sink; produces the frame's `RenderTree`.
    RenderRoot,
}

/// One endpoint of an edge: a block plus one of its slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortRef {
    /// Owning block.
    pub block: BlockId,
    /// Slot id within the block's definition.
    pub slot: String,
}

impl PortRef {
    /// Convenience constructor.
    #[must_use]
    pub fn new(block: BlockId, slot: impl Into<String>) -> Self {
        Self {
            block,
            slot: slot.into(),
        }
    }
}

/// How a lens parameter obtains its value.
///
/// Bindings resolve directly; nested lens stacks on a binding's path are not
/// interpreted. Resolution depth is bounded at 3 (`default` may point at a
/// provider whose own params are literals).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ParamBinding {
    /// A literal value, interned into the const pool at compile time.
    Literal(Value),
    /// The parameter's declared default from the transform registry.
    Default,
    /// The live output of another block.
    Wire(PortRef),
    /// The output of a bus (its hidden `BusBlock`).
    Bus(BlockId),
}

/// One ordered step on an edge: a lens or adapter instance with parameter
/// bindings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransformStep {
    /// Registry id of the lens or adapter.
    pub id: String,
    /// Parameter bindings; unbound params fall back to declared defaults.
    pub params: BTreeMap<String, ParamBinding>,
}

impl TransformStep {
    /// Step with no explicit bindings (all params at declared defaults).
    #[must_use]
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            params: BTreeMap::new(),
        }
    }
}

/// A block instance within a patch.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Block {
    /// Stable identifier.
    pub id: BlockId,
    /// Type name, key into the block registry.
    pub ty: String,
    /// Scalar defaults per input slot (and block-specific config).
    pub params: BTreeMap<String, Value>,
    /// Per-slot combine policy overrides; slot defaults apply otherwise.
    pub combine: BTreeMap<String, CombinePolicy>,
    /// Hidden blocks are engine plumbing, not canvas citizens.
    pub hidden: bool,
    /// Optional distinguished role.
    pub role: Option<BlockRole>,
    /// Free-form tags. Bus blocks carry their bus name here (e.g.
    /// `phaseA` for the reserved primary phase bus).
    pub tags: BTreeSet<String>,
    /// Deterministic ordering key among sibling writers.
    pub sort_key: u32,
}

impl Block {
    /// Plain visible block with empty params and sort key 0.
    #[must_use]
    pub fn new(id: BlockId, ty: impl Into<String>) -> Self {
        Self {
            id,
            ty: ty.into(),
            params: BTreeMap::new(),
            combine: BTreeMap::new(),
            hidden: false,
            role: None,
            tags: BTreeSet::new(),
            sort_key: 0,
        }
    }

    /// Sets a scalar param.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Marks the block hidden with the given role.
    #[must_use]
    pub fn with_role(mut self, role: BlockRole) -> Self {
        self.role = Some(role);
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Sets the sort key.
    #[must_use]
    pub fn with_sort_key(mut self, sort_key: u32) -> Self {
        self.sort_key = sort_key;
        self
    }

    /// True if the block carries the given tag.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// A directed connection from an output port to an input port.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Edge {
    /// Stable identifier.
    pub id: EdgeId,
    /// Producing endpoint.
    pub from: PortRef,
    /// Consuming endpoint.
    pub to: PortRef,
    /// Ordered transform chain applied along the edge.
    pub transforms: Vec<TransformStep>,
    /// Disabled edges are kept for the UI but ignored downstream of Pass 1.
    pub enabled: bool,
    /// Optional writer weight (consumed by weighted combine blocks).
    pub weight: Option<f64>,
    /// Deterministic ordering key among writers to the same input.
    pub sort_key: u32,
}

impl Edge {
    /// Enabled, transform-free edge with sort key 0.
    #[must_use]
    pub fn new(id: EdgeId, from: PortRef, to: PortRef) -> Self {
        Self {
            id,
            from,
            to,
            transforms: Vec::new(),
            enabled: true,
            weight: None,
            sort_key: 0,
        }
    }

    /// Sets the sort key.
    #[must_use]
    pub fn with_sort_key(mut self, sort_key: u32) -> Self {
        self.sort_key = sort_key;
        self
    }

    /// Appends a transform step.
    #[must_use]
    pub fn with_transform(mut self, step: TransformStep) -> Self {
        self.transforms.push(step);
        self
    }
}

/// Errors raised by structural patch mutations.
#[derive(Debug, Error, PartialEq)]
pub enum PatchError {
    /// A block with this id already exists.
    #[error("duplicate block id")]
    DuplicateBlock(BlockId),
    /// The referenced block does not exist.
    #[error("unknown block id")]
    UnknownBlock(BlockId),
    /// An edge with this id already exists.
    #[error("duplicate edge id")]
    DuplicateEdgeId(EdgeId),
    /// An edge with the identical `(from, to)` pair already exists.
    #[error("duplicate edge between {from_slot} and {to_slot}")]
    DuplicateEdge {
        /// Producing slot id.
        from_slot: String,
        /// Consuming slot id.
        to_slot: String,
    },
    /// The referenced edge does not exist.
    #[error("unknown edge id")]
    UnknownEdge(EdgeId),
    /// An edge endpoint references a block missing from the patch.
    #[error("edge endpoint references missing block")]
    EndpointMissing(BlockId),
}

/// An ordered set of blocks and edges; the unit of compilation.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Patch {
    /// Blocks in insertion order (persisted order round-trips exactly).
    pub blocks: Vec<Block>,
    /// Edges in insertion order.
    pub edges: Vec<Edge>,
    /// Persisted format version.
    pub version: u32,
}

impl Patch {
    /// Empty patch at the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            edges: Vec::new(),
            version: 1,
        }
    }

    /// Looks up a block by id.
    #[must_use]
    pub fn block(&self, id: &BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == *id)
    }

    /// Mutable block lookup.
    pub fn block_mut(&mut self, id: &BlockId) -> Option<&mut Block> {
        self.blocks.iter_mut().find(|b| b.id == *id)
    }

    /// Looks up an edge by id.
    #[must_use]
    pub fn edge(&self, id: &EdgeId) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == *id)
    }

    /// Mutable edge lookup.
    pub fn edge_mut(&mut self, id: &EdgeId) -> Option<&mut Edge> {
        self.edges.iter_mut().find(|e| e.id == *id)
    }

    /// Inserts a new block.
    ///
    /// # Errors
    ///
    /// [`PatchError::DuplicateBlock`] when the id is already present.
    pub fn add_block(&mut self, block: Block) -> Result<(), PatchError> {
        if self.block(&block.id).is_some() {
            return Err(PatchError::DuplicateBlock(block.id));
        }
        self.blocks.push(block);
        Ok(())
    }

    /// Removes a block and cascades removal of every incident edge.
    ///
    /// # Errors
    ///
    /// [`PatchError::UnknownBlock`] when the id is absent.
    pub fn remove_block(&mut self, id: &BlockId) -> Result<(), PatchError> {
        let before = self.blocks.len();
        self.blocks.retain(|b| b.id != *id);
        if self.blocks.len() == before {
            return Err(PatchError::UnknownBlock(*id));
        }
        self.edges
            .retain(|e| e.from.block != *id && e.to.block != *id);
        Ok(())
    }

    /// Inserts a new edge after structural validation.
    ///
    /// # Errors
    ///
    /// - [`PatchError::DuplicateEdgeId`] when the id is already present.
    /// - [`PatchError::EndpointMissing`] when either endpoint block is
    ///   absent.
    /// - [`PatchError::DuplicateEdge`] when an edge with the identical
    ///   `(from, to)` port pair exists.
    pub fn add_edge(&mut self, edge: Edge) -> Result<(), PatchError> {
        if self.edge(&edge.id).is_some() {
            return Err(PatchError::DuplicateEdgeId(edge.id));
        }
        for endpoint in [&edge.from.block, &edge.to.block] {
            if self.block(endpoint).is_none() {
                return Err(PatchError::EndpointMissing(*endpoint));
            }
        }
        if self
            .edges
            .iter()
            .any(|e| e.from == edge.from && e.to == edge.to)
        {
            return Err(PatchError::DuplicateEdge {
                from_slot: edge.from.slot.clone(),
                to_slot: edge.to.slot.clone(),
            });
        }
        self.edges.push(edge);
        Ok(())
    }

    /// Removes an edge by id.
    ///
    /// # Errors
    ///
    /// [`PatchError::UnknownEdge`] when the id is absent.
    pub fn remove_edge(&mut self, id: &EdgeId) -> Result<(), PatchError> {
        let before = self.edges.len();
        self.edges.retain(|e| e.id != *id);
        if self.edges.len() == before {
            return Err(PatchError::UnknownEdge(*id));
        }
        Ok(())
    }

    /// Sets one scalar param on a block.
    ///
    /// # Errors
    ///
    /// [`PatchError::UnknownBlock`] when the block is absent.
    pub fn set_param(
        &mut self,
        id: &BlockId,
        key: impl Into<String>,
        value: Value,
    ) -> Result<(), PatchError> {
        let block = self.block_mut(id).ok_or(PatchError::UnknownBlock(*id))?;
        block.params.insert(key.into(), value);
        Ok(())
    }

    /// Replaces the transform chain on an edge.
    ///
    /// # Errors
    ///
    /// [`PatchError::UnknownEdge`] when the edge is absent.
    pub fn set_transforms(
        &mut self,
        id: &EdgeId,
        transforms: Vec<TransformStep>,
    ) -> Result<(), PatchError> {
        let edge = self.edge_mut(id).ok_or(PatchError::UnknownEdge(*id))?;
        edge.transforms = transforms;
        Ok(())
    }

    /// Sets the combine policy override for one input slot of a block.
    ///
    /// # Errors
    ///
    /// [`PatchError::UnknownBlock`] when the block is absent.
    pub fn set_combine(
        &mut self,
        id: &BlockId,
        slot: impl Into<String>,
        policy: CombinePolicy,
    ) -> Result<(), PatchError> {
        let block = self.block_mut(id).ok_or(PatchError::UnknownBlock(*id))?;
        block.combine.insert(slot.into(), policy);
        Ok(())
    }

    /// All blocks of the given type name, patch order.
    pub fn blocks_by_type<'a>(&'a self, ty: &'a str) -> impl Iterator<Item = &'a Block> {
        self.blocks.iter().filter(move |b| b.ty == ty)
    }

    /// All blocks carrying the given role, patch order.
    pub fn blocks_by_role(&self, role: BlockRole) -> impl Iterator<Item = &Block> {
        self.blocks.iter().filter(move |b| b.role == Some(role))
    }

    /// Enabled edges into one input slot, sorted by `(sort_key, id)` with
    /// ties broken by the upstream block's `sort_key`.
    #[must_use]
    pub fn edges_into_input(&self, block: &BlockId, slot: &str) -> Vec<&Edge> {
        let mut edges: Vec<&Edge> = self
            .edges
            .iter()
            .filter(|e| e.enabled && e.to.block == *block && e.to.slot == slot)
            .collect();
        edges.sort_by(|a, b| {
            (a.sort_key, a.id, self.writer_sort_key(a))
                .cmp(&(b.sort_key, b.id, self.writer_sort_key(b)))
        });
        edges
    }

    fn writer_sort_key(&self, edge: &Edge) -> u32 {
        self.block(&edge.from.block).map_or(0, |b| b.sort_key)
    }

    /// All hidden bus blocks, patch order.
    pub fn bus_blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks_by_role(BlockRole::Bus)
    }

    /// Canonical content digest over the full persisted value.
    ///
    /// Encoding mirrors the value encoding discipline: explicit field order,
    /// little-endian lengths, ids as raw 32-byte values.
    #[must_use]
    pub fn digest(&self) -> Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"patch:");
        hasher.update(&self.version.to_le_bytes());
        hasher.update(&(self.blocks.len() as u64).to_le_bytes());
        for b in &self.blocks {
            hasher.update(b.id.as_bytes());
            hasher.update(&(b.ty.len() as u64).to_le_bytes());
            hasher.update(b.ty.as_bytes());
            hasher.update(&(b.params.len() as u64).to_le_bytes());
            for (k, v) in &b.params {
                hasher.update(&(k.len() as u64).to_le_bytes());
                hasher.update(k.as_bytes());
                hasher.update(&v.encoded());
            }
            hasher.update(&[u8::from(b.hidden)]);
            hasher.update(&b.sort_key.to_le_bytes());
            for t in &b.tags {
                hasher.update(&(t.len() as u64).to_le_bytes());
                hasher.update(t.as_bytes());
            }
        }
        hasher.update(&(self.edges.len() as u64).to_le_bytes());
        for e in &self.edges {
            hasher.update(e.id.as_bytes());
            hasher.update(e.from.block.as_bytes());
            hasher.update(&(e.from.slot.len() as u64).to_le_bytes());
            hasher.update(e.from.slot.as_bytes());
            hasher.update(e.to.block.as_bytes());
            hasher.update(&(e.to.slot.len() as u64).to_le_bytes());
            hasher.update(e.to.slot.as_bytes());
            hasher.update(&[u8::from(e.enabled)]);
            hasher.update(&e.sort_key.to_le_bytes());
            hasher.update(&(e.transforms.len() as u64).to_le_bytes());
            for step in &e.transforms {
                hasher.update(&(step.id.len() as u64).to_le_bytes());
                hasher.update(step.id.as_bytes());
            }
        }
        hasher.finalize().into()
    }
}
