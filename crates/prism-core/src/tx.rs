// SPDX-License-Identifier: Apache-2.0
//! Transactions: atomic patch mutation with undo history.
//!
//! Ops form a closed vocabulary. A transaction applies its ops to a working
//! copy; every op validates against the state the previous ops produced,
//! and the whole transaction either yields a new immutable snapshot plus
//! typed change events or fails with no effect at all.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::combine::CombinePolicy;
use crate::ident::{BlockId, EdgeId};
use crate::patch::{Block, BlockRole, Edge, Patch, PatchError, TransformStep};
use crate::value::Value;

/// Closed vocabulary of atomic patch operations.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOp {
    /// Insert a block.
    AddBlock(Block),
    /// Remove a block; incident edges cascade.
    RemoveBlock(BlockId),
    /// Insert an edge.
    AddEdge(Edge),
    /// Remove an edge.
    RemoveEdge(EdgeId),
    /// Merge scalar params into a block.
    SetParams {
        /// Target block.
        block: BlockId,
        /// Params to merge.
        params: BTreeMap<String, Value>,
    },
    /// Replace an edge's transform chain.
    SetTransforms {
        /// Target edge.
        edge: EdgeId,
        /// New chain.
        transforms: Vec<TransformStep>,
    },
    /// Override the combine policy of one input slot.
    SetCombine {
        /// Target block.
        block: BlockId,
        /// Slot id.
        slot: String,
        /// New policy.
        policy: CombinePolicy,
    },
    /// Replace the patch's time root and republish its reserved buses.
    SetTimeRoot(Block),
    /// Apply a sequence as one op.
    Many(Vec<PatchOp>),
}

/// Typed change notifications emitted by a successful transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A block was added.
    BlockAdded(BlockId),
    /// A block (and its edges) was removed.
    BlockRemoved(BlockId),
    /// An edge was added.
    EdgeAdded(EdgeId),
    /// An edge was removed.
    EdgeRemoved(EdgeId),
    /// A block's params changed.
    ParamsChanged(BlockId),
    /// An edge's transform chain changed.
    TransformsChanged(EdgeId),
    /// A slot's combine policy changed.
    CombineChanged {
        /// Owning block.
        block: BlockId,
        /// Slot id.
        slot: String,
    },
    /// The time root was replaced.
    TimeRootChanged(BlockId),
}

/// A failed op within a transaction.
#[derive(Debug, Error, PartialEq)]
#[error("op {index} failed: {source}")]
pub struct TxError {
    /// Position of the failing op (depth-first across `Many`).
    pub index: usize,
    /// The underlying validation failure.
    #[source]
    pub source: PatchError,
}

/// Applies `ops` atomically to `patch`.
///
/// # Errors
///
/// The failing op's [`TxError`]; the input patch is untouched and no events
/// are emitted.
pub fn apply_tx(
    patch: &Patch,
    ops: &[PatchOp],
) -> Result<(Patch, Vec<ChangeEvent>), Vec<TxError>> {
    let mut working = patch.clone();
    let mut events = Vec::new();
    let mut index = 0usize;
    for op in ops {
        if let Err(source) = apply_op(&mut working, op, &mut events, &mut index) {
            return Err(vec![TxError {
                index: index.saturating_sub(1),
                source,
            }]);
        }
    }
    Ok((working, events))
}

fn apply_op(
    patch: &mut Patch,
    op: &PatchOp,
    events: &mut Vec<ChangeEvent>,
    index: &mut usize,
) -> Result<(), PatchError> {
    *index += 1;
    match op {
        PatchOp::AddBlock(block) => {
            patch.add_block(block.clone())?;
            events.push(ChangeEvent::BlockAdded(block.id));
        }
        PatchOp::RemoveBlock(id) => {
            let removed_edges: Vec<EdgeId> = patch
                .edges
                .iter()
                .filter(|e| e.from.block == *id || e.to.block == *id)
                .map(|e| e.id)
                .collect();
            patch.remove_block(id)?;
            events.push(ChangeEvent::BlockRemoved(*id));
            events.extend(removed_edges.into_iter().map(ChangeEvent::EdgeRemoved));
        }
        PatchOp::AddEdge(edge) => {
            patch.add_edge(edge.clone())?;
            events.push(ChangeEvent::EdgeAdded(edge.id));
        }
        PatchOp::RemoveEdge(id) => {
            patch.remove_edge(id)?;
            events.push(ChangeEvent::EdgeRemoved(*id));
        }
        PatchOp::SetParams { block, params } => {
            for (key, value) in params {
                patch.set_param(block, key.clone(), value.clone())?;
            }
            events.push(ChangeEvent::ParamsChanged(*block));
        }
        PatchOp::SetTransforms { edge, transforms } => {
            patch.set_transforms(edge, transforms.clone())?;
            events.push(ChangeEvent::TransformsChanged(*edge));
        }
        PatchOp::SetCombine {
            block,
            slot,
            policy,
        } => {
            patch.set_combine(block, slot.clone(), *policy)?;
            events.push(ChangeEvent::CombineChanged {
                block: *block,
                slot: slot.clone(),
            });
        }
        PatchOp::SetTimeRoot(block) => {
            let old_roots: Vec<BlockId> = patch
                .blocks
                .iter()
                .filter(|b| {
                    b.role == Some(BlockRole::TimeRoot)
                        || crate::block::time_model_of(b).is_some()
                })
                .map(|b| b.id)
                .collect();
            for id in old_roots {
                patch.remove_block(&id)?;
            }
            let id = block.id;
            patch.add_block(block.clone())?;
            crate::block::publish_reserved(patch, &id)?;
            events.push(ChangeEvent::TimeRootChanged(id));
        }
        PatchOp::Many(ops) => {
            for inner in ops {
                apply_op(patch, inner, events, index)?;
            }
        }
    }
    Ok(())
}

/// Undo/redo history over immutable patch snapshots.
#[derive(Debug)]
pub struct History {
    current: Arc<Patch>,
    undo: Vec<Arc<Patch>>,
    redo: Vec<Arc<Patch>>,
}

impl History {
    /// History rooted at an initial snapshot.
    #[must_use]
    pub fn new(initial: Patch) -> Self {
        Self {
            current: Arc::new(initial),
            undo: Vec::new(),
            redo: Vec::new(),
        }
    }

    /// The current snapshot.
    #[must_use]
    pub fn current(&self) -> &Arc<Patch> {
        &self.current
    }

    /// Applies a transaction; on success the previous snapshot is pushed
    /// onto the undo stack and the redo stack clears. No-op transactions
    /// (digest unchanged) leave history untouched.
    ///
    /// # Errors
    ///
    /// Propagates [`TxError`]s; history is unchanged on failure.
    pub fn apply(&mut self, ops: &[PatchOp]) -> Result<Vec<ChangeEvent>, Vec<TxError>> {
        let (next, events) = apply_tx(&self.current, ops)?;
        if next.digest() == self.current.digest() {
            return Ok(events);
        }
        self.undo.push(Arc::clone(&self.current));
        self.redo.clear();
        self.current = Arc::new(next);
        Ok(events)
    }

    /// Steps back one snapshot. Returns the new current snapshot.
    pub fn undo(&mut self) -> Option<&Arc<Patch>> {
        let previous = self.undo.pop()?;
        self.redo.push(Arc::clone(&self.current));
        self.current = previous;
        Some(&self.current)
    }

    /// Steps forward one snapshot. Returns the new current snapshot.
    pub fn redo(&mut self) -> Option<&Arc<Patch>> {
        let next = self.redo.pop()?;
        self.undo.push(Arc::clone(&self.current));
        self.current = next;
        Some(&self.current)
    }

    /// Number of undoable snapshots.
    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ident::{make_block_id, make_edge_id};
    use crate::patch::PortRef;

    fn add_const(label: &str) -> PatchOp {
        PatchOp::AddBlock(Block::new(make_block_id(label), "const"))
    }

    #[test]
    fn failed_transactions_change_nothing() {
        let patch = Patch::new();
        let ghost = make_block_id("ghost");
        let ops = [
            add_const("a"),
            PatchOp::RemoveBlock(ghost), // fails
        ];
        let err = apply_tx(&patch, &ops).unwrap_err();
        assert_eq!(err[0].index, 1);
        assert_eq!(err[0].source, PatchError::UnknownBlock(ghost));
        assert!(patch.blocks.is_empty());
    }

    #[test]
    fn events_describe_the_delta() {
        let patch = Patch::new();
        let a = make_block_id("a");
        let b = make_block_id("b");
        let e = make_edge_id("e");
        let ops = [
            add_const("a"),
            PatchOp::AddBlock(Block::new(b, "oscillator")),
            PatchOp::AddEdge(Edge::new(
                e,
                PortRef::new(a, "out"),
                PortRef::new(b, "frequency"),
            )),
        ];
        let (next, events) = apply_tx(&patch, &ops).unwrap();
        assert_eq!(next.blocks.len(), 2);
        assert_eq!(
            events,
            vec![
                ChangeEvent::BlockAdded(a),
                ChangeEvent::BlockAdded(b),
                ChangeEvent::EdgeAdded(e),
            ]
        );
    }

    #[test]
    fn many_ops_apply_depth_first() {
        let patch = Patch::new();
        let ops = [PatchOp::Many(vec![add_const("a"), add_const("b")])];
        let (next, events) = apply_tx(&patch, &ops).unwrap();
        assert_eq!(next.blocks.len(), 2);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn set_time_root_replaces_and_republishes() {
        let patch = Patch::new();
        let root1 = Block::new(make_block_id("r1"), "cycleTimeRoot");
        let (with_root, _) = apply_tx(&patch, &[PatchOp::SetTimeRoot(root1)]).unwrap();
        assert!(with_root
            .blocks
            .iter()
            .any(|b| b.ty == "cycleTimeRoot"));

        let root2 = Block::new(make_block_id("r2"), "finiteTimeRoot");
        let (swapped, events) =
            apply_tx(&with_root, &[PatchOp::SetTimeRoot(root2)]).unwrap();
        assert!(!swapped.blocks.iter().any(|b| b.ty == "cycleTimeRoot"));
        assert!(swapped.blocks.iter().any(|b| b.ty == "finiteTimeRoot"));
        assert!(events
            .iter()
            .any(|e| matches!(e, ChangeEvent::TimeRootChanged(_))));
    }

    #[test]
    fn undo_and_redo_are_symmetric() {
        let mut history = History::new(Patch::new());
        history.apply(&[add_const("a")]).unwrap();
        history.apply(&[add_const("b")]).unwrap();
        assert_eq!(history.current().blocks.len(), 2);
        assert_eq!(history.undo_depth(), 2);

        history.undo().unwrap();
        assert_eq!(history.current().blocks.len(), 1);
        history.undo().unwrap();
        assert_eq!(history.current().blocks.len(), 0);
        assert!(history.undo().is_none());

        history.redo().unwrap();
        history.redo().unwrap();
        assert_eq!(history.current().blocks.len(), 2);
        assert!(history.redo().is_none());
    }

    #[test]
    fn new_edits_clear_the_redo_stack() {
        let mut history = History::new(Patch::new());
        history.apply(&[add_const("a")]).unwrap();
        history.undo().unwrap();
        history.apply(&[add_const("b")]).unwrap();
        assert!(history.redo().is_none());
    }

    #[test]
    fn noop_transactions_do_not_grow_history() {
        let mut history = History::new(Patch::new());
        history.apply(&[]).unwrap();
        assert_eq!(history.undo_depth(), 0);
    }
}
