// SPDX-License-Identifier: Apache-2.0
//! Pass 4: graph canonicalization.
//!
//! Builds the block-level dependency graph and derives two artifacts:
//! - feedback legality: edges into a memory block's deferred input are
//!   dropped from the graph, so any strongly connected component that
//!   remains is a cycle no memory node breaks — `IllegalFeedback`;
//! - the lowering order: Kahn's algorithm over the reduced graph with the
//!   ready set ordered by `(sort_key, id)`, which fixes the deterministic
//!   topological order every later pass and the scheduler inherit.
//!
//! Lens parameter bindings (`wire`/`bus`) count as dependencies too: the
//! producing block must lower before the edge that reads it.

use std::collections::{BTreeMap, BTreeSet};

use crate::compile::Session;
use crate::diag::{DiagCode, Diagnostic, GraphLoc};
use crate::ident::BlockId;
use crate::patch::ParamBinding;

pub(crate) fn run(session: &mut Session<'_>) {
    let deps = dependencies(session);

    report_illegal_feedback(session, &deps);
    if session.has_errors() {
        return;
    }
    session.order = topo_order(session, &deps);
}

/// Block-level dependency map: `to → {from, ...}` over the reduced graph.
fn dependencies(session: &Session<'_>) -> BTreeMap<BlockId, BTreeSet<BlockId>> {
    let mut deps: BTreeMap<BlockId, BTreeSet<BlockId>> = BTreeMap::new();
    for block in &session.patch.blocks {
        deps.entry(block.id).or_default();
    }
    for edge in &session.patch.edges {
        if !edge.enabled {
            continue;
        }
        let deferred = session
            .patch
            .block(&edge.to.block)
            .and_then(|b| session.blocks.get(&b.ty))
            .and_then(|def| def.deferred_input)
            .is_some_and(|slot| slot == edge.to.slot);
        if !deferred {
            deps.entry(edge.to.block).or_default().insert(edge.from.block);
        }
        for step in &edge.transforms {
            for binding in step.params.values() {
                match binding {
                    ParamBinding::Wire(port) => {
                        deps.entry(edge.to.block).or_default().insert(port.block);
                    }
                    ParamBinding::Bus(bus) => {
                        deps.entry(edge.to.block).or_default().insert(*bus);
                    }
                    ParamBinding::Literal(_) | ParamBinding::Default => {}
                }
            }
        }
    }
    deps
}

/// Kahn's algorithm; ties broken by `(sort_key, id)`.
fn topo_order(
    session: &Session<'_>,
    deps: &BTreeMap<BlockId, BTreeSet<BlockId>>,
) -> Vec<BlockId> {
    let sort_key = |id: &BlockId| session.patch.block(id).map_or(0, |b| b.sort_key);
    let mut remaining: BTreeMap<BlockId, BTreeSet<BlockId>> = deps
        .iter()
        .map(|(k, v)| {
            (
                *k,
                v.iter()
                    .filter(|d| deps.contains_key(*d) && *d != k)
                    .copied()
                    .collect(),
            )
        })
        .collect();
    let mut ready: BTreeSet<(u32, BlockId)> = remaining
        .iter()
        .filter(|(_, d)| d.is_empty())
        .map(|(id, _)| (sort_key(id), *id))
        .collect();
    let mut order = Vec::with_capacity(remaining.len());

    while let Some(&(key, id)) = ready.iter().next() {
        ready.remove(&(key, id));
        remaining.remove(&id);
        order.push(id);
        let mut now_ready = Vec::new();
        for (candidate, d) in &mut remaining {
            if d.remove(&id) && d.is_empty() {
                now_ready.push(*candidate);
            }
        }
        for candidate in now_ready {
            ready.insert((sort_key(&candidate), candidate));
        }
    }
    order
}

/// Finds strongly connected components of the reduced graph and reports
/// each non-trivial one (or self-loop) as `FB-301`.
fn report_illegal_feedback(
    session: &mut Session<'_>,
    deps: &BTreeMap<BlockId, BTreeSet<BlockId>>,
) {
    for scc in tarjan(deps) {
        let illegal = scc.len() > 1
            || scc
                .first()
                .is_some_and(|id| deps.get(id).is_some_and(|d| d.contains(id)));
        if illegal {
            let mut sorted = scc;
            sorted.sort_unstable();
            let mut diag = Diagnostic::error(
                DiagCode::IllegalFeedback,
                "cycle is not broken by any memory block",
            )
            .at(GraphLoc::Scc(sorted.clone()))
            .with_help("insert a delay, integrate, or sample-hold block into the loop");
            for id in sorted {
                diag = diag.at(GraphLoc::Block(id));
            }
            session.diags.push(diag);
        }
    }
}

/// Iterative Tarjan over the dependency map. Deterministic: roots and
/// successors are visited in ascending id order.
fn tarjan(deps: &BTreeMap<BlockId, BTreeSet<BlockId>>) -> Vec<Vec<BlockId>> {
    struct Frame<'a> {
        node: BlockId,
        successors: Vec<&'a BlockId>,
        next: usize,
    }

    let mut index: BTreeMap<BlockId, u32> = BTreeMap::new();
    let mut lowlink: BTreeMap<BlockId, u32> = BTreeMap::new();
    let mut on_stack: BTreeSet<BlockId> = BTreeSet::new();
    let mut stack: Vec<BlockId> = Vec::new();
    let mut next_index = 0u32;
    let mut sccs: Vec<Vec<BlockId>> = Vec::new();

    for root in deps.keys() {
        if index.contains_key(root) {
            continue;
        }
        let mut frames = vec![Frame {
            node: *root,
            successors: deps.get(root).map(|d| d.iter().collect()).unwrap_or_default(),
            next: 0,
        }];
        index.insert(*root, next_index);
        lowlink.insert(*root, next_index);
        next_index += 1;
        stack.push(*root);
        on_stack.insert(*root);

        while let Some(frame) = frames.last_mut() {
            if frame.next < frame.successors.len() {
                let succ = *frame.successors[frame.next];
                frame.next += 1;
                if !deps.contains_key(&succ) {
                    continue; // Dangling reference; normalization reported it.
                }
                if let Some(&succ_index) = index.get(&succ) {
                    if on_stack.contains(&succ) {
                        let node = frame.node;
                        let low = (*lowlink.get(&node).unwrap_or(&0)).min(succ_index);
                        lowlink.insert(node, low);
                    }
                } else {
                    index.insert(succ, next_index);
                    lowlink.insert(succ, next_index);
                    next_index += 1;
                    stack.push(succ);
                    on_stack.insert(succ);
                    frames.push(Frame {
                        node: succ,
                        successors: deps.get(&succ).map(|d| d.iter().collect()).unwrap_or_default(),
                        next: 0,
                    });
                }
            } else {
                let node = frame.node;
                frames.pop();
                let node_low = *lowlink.get(&node).unwrap_or(&0);
                if let Some(parent) = frames.last() {
                    let parent_low = (*lowlink.get(&parent.node).unwrap_or(&0)).min(node_low);
                    lowlink.insert(parent.node, parent_low);
                }
                if Some(&node_low) == index.get(&node) {
                    let mut scc = Vec::new();
                    while let Some(member) = stack.pop() {
                        on_stack.remove(&member);
                        scc.push(member);
                        if member == node {
                            break;
                        }
                    }
                    sccs.push(scc);
                }
            }
        }
    }
    sccs
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::block::BlockRegistry;
    use crate::ident::{make_block_id, make_edge_id};
    use crate::patch::{Block, Edge, Patch, PortRef};
    use crate::transform::TransformRegistry;

    fn setup() -> (BlockRegistry, TransformRegistry) {
        (
            BlockRegistry::with_system_blocks().unwrap(),
            TransformRegistry::with_catalog().unwrap(),
        )
    }

    #[test]
    fn memoryless_two_block_cycle_is_fb301() {
        let (blocks, transforms) = setup();
        let mut patch = Patch::new();
        let a = make_block_id("a");
        let b = make_block_id("b");
        patch.add_block(Block::new(a, "add")).unwrap();
        patch.add_block(Block::new(b, "add")).unwrap();
        patch
            .add_edge(Edge::new(
                make_edge_id("ab"),
                PortRef::new(a, "out"),
                PortRef::new(b, "a"),
            ))
            .unwrap();
        patch
            .add_edge(Edge::new(
                make_edge_id("ba"),
                PortRef::new(b, "out"),
                PortRef::new(a, "a"),
            ))
            .unwrap();
        let mut s = Session::new(patch, &blocks, &transforms);
        run(&mut s);
        let diag = s
            .diags
            .iter()
            .find(|d| d.code == DiagCode::IllegalFeedback)
            .expect("expected FB-301");
        let mut expected = vec![a, b];
        expected.sort_unstable();
        assert!(diag
            .locations
            .iter()
            .any(|l| matches!(l, GraphLoc::Scc(members) if *members == expected)));
    }

    #[test]
    fn cycle_through_a_delay_is_legal() {
        let (blocks, transforms) = setup();
        let mut patch = Patch::new();
        let d = make_block_id("d");
        let g = make_block_id("g");
        patch.add_block(Block::new(d, "delay")).unwrap();
        patch.add_block(Block::new(g, "add")).unwrap();
        patch
            .add_edge(Edge::new(
                make_edge_id("dg"),
                PortRef::new(d, "out"),
                PortRef::new(g, "a"),
            ))
            .unwrap();
        patch
            .add_edge(Edge::new(
                make_edge_id("gd"),
                PortRef::new(g, "out"),
                PortRef::new(d, "in"),
            ))
            .unwrap();
        let mut s = Session::new(patch, &blocks, &transforms);
        run(&mut s);
        assert!(s.diags.is_empty(), "unexpected diags: {:?}", s.diags);
        // The delay lowers before the adder: its output needs no input.
        let di = s.order.iter().position(|x| *x == d).unwrap();
        let gi = s.order.iter().position(|x| *x == g).unwrap();
        assert!(di < gi);
    }

    #[test]
    fn order_is_deterministic_and_respects_sort_keys() {
        let (blocks, transforms) = setup();
        let mut patch = Patch::new();
        let a = make_block_id("a");
        let b = make_block_id("b");
        patch
            .add_block(Block::new(a, "const").with_sort_key(2))
            .unwrap();
        patch
            .add_block(Block::new(b, "const").with_sort_key(1))
            .unwrap();
        let mut s1 = Session::new(patch.clone(), &blocks, &transforms);
        run(&mut s1);
        let mut s2 = Session::new(patch, &blocks, &transforms);
        run(&mut s2);
        assert_eq!(s1.order, s2.order);
        assert_eq!(s1.order, vec![b, a]);
    }
}
