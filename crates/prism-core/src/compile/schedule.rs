// SPDX-License-Identifier: Apache-2.0
//! Pass 9: scheduling and program assembly.
//!
//! The schedule is a topological order over IR dependence, computed by a
//! deterministic depth-first walk: roots ascend by node id, successors are
//! visited in declared order. Memory nodes contribute no schedule edges for
//! their deferred inputs (their frame value is state), but those inputs are
//! still reachable as commit dependencies so the end-of-frame state commit
//! always has its operands evaluated.
//!
//! Roots are everything observable: block outputs, reserved bus taps, the
//! render sink's fields, and every state-bearing node.

use std::collections::{BTreeMap, BTreeSet};

use crate::compile::{CompiledProgram, Session};
use crate::diag::{DiagCode, Diagnostic};
use crate::ident::Hash;
use crate::ir::{IrId, ValueRef};

pub(crate) fn run(
    mut session: Session<'_>,
    patch_digest: Hash,
) -> Result<CompiledProgram, Vec<Diagnostic>> {
    let Some(time_model) = session.time_model else {
        session.diags.push(Diagnostic::error(
            DiagCode::Internal,
            "scheduling reached without a time model",
        ));
        return Err(session.diags);
    };

    // Reserved-bus taps resolve through the bound bus blocks' outputs.
    let bindings = [
        ("phaseA", session.ui.phase_a),
        ("phaseB", session.ui.phase_b),
        ("pulse", session.ui.pulse),
        ("energy", session.ui.energy),
        ("palette", session.ui.palette),
        ("progress", session.ui.progress),
    ];
    for (name, bus) in bindings {
        if let Some(bus) = bus {
            if let Some(r) = session.outputs.get(&(bus, "out".to_owned())) {
                session.taps.insert(name.to_owned(), *r);
            }
        }
    }

    let built = std::mem::take(&mut session.builder).finish();
    let node_count = built.nodes.len();

    // Roots, ascending node id.
    let mut roots: BTreeSet<IrId> = BTreeSet::new();
    let mut add_root = |r: ValueRef| {
        if let Some(id) = r.node() {
            roots.insert(id);
        }
    };
    for r in session.outputs.values() {
        add_root(*r);
    }
    for r in session.taps.values() {
        add_root(*r);
    }
    if let Some(render) = &built.render {
        for r in [render.domain, render.position, render.color, render.size] {
            add_root(r);
        }
    }
    for node in built.state_keys.keys() {
        roots.insert(IrId(*node));
    }
    // Commit dependencies must be scheduled too.
    let mut commit_roots: Vec<IrId> = Vec::new();
    for node in built.state_keys.keys() {
        if let Some(n) = built.nodes.get(*node as usize) {
            n.commit_deps(&mut commit_roots);
        }
    }
    roots.extend(commit_roots);

    // Deterministic DFS post-order.
    let mut mark = vec![0u8; node_count]; // 0 = new, 1 = on stack, 2 = done
    let mut schedule: Vec<IrId> = Vec::with_capacity(node_count);
    let mut cyclic = false;
    for root in roots {
        if root.index() >= node_count || mark[root.index()] == 2 {
            continue;
        }
        let mut stack: Vec<(IrId, Vec<IrId>, usize)> = Vec::new();
        let mut deps = Vec::new();
        if let Some(node) = built.nodes.get(root.index()) {
            node.schedule_deps(&mut deps);
        }
        mark[root.index()] = 1;
        stack.push((root, deps, 0));
        while let Some((node, deps, next)) = stack.last_mut() {
            if *next < deps.len() {
                let dep = deps[*next];
                *next += 1;
                if dep == IrId::PENDING || dep.index() >= node_count {
                    continue;
                }
                match mark[dep.index()] {
                    0 => {
                        let mut dep_deps = Vec::new();
                        if let Some(n) = built.nodes.get(dep.index()) {
                            n.schedule_deps(&mut dep_deps);
                        }
                        mark[dep.index()] = 1;
                        stack.push((dep, dep_deps, 0));
                    }
                    1 => cyclic = true,
                    _ => {}
                }
            } else {
                mark[node.index()] = 2;
                schedule.push(*node);
                stack.pop();
            }
        }
    }
    if cyclic {
        session.diags.push(Diagnostic::error(
            DiagCode::Internal,
            "IR dependence graph is cyclic after link resolution",
        ));
    }
    if session.has_errors() {
        return Err(session.diags);
    }

    let commits: Vec<IrId> = built
        .state_keys
        .keys()
        .map(|id| IrId(*id))
        .filter(|id| mark.get(id.index()).copied() == Some(2))
        .collect();

    let registry_digest = {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"registries:");
        hasher.update(&session.blocks.digest());
        hasher.update(&session.transforms.digest());
        hasher.finalize().into()
    };

    let state_keys: BTreeMap<u32, crate::ir::StateKey> = built.state_keys;
    let warnings = std::mem::take(&mut session.diags);
    Ok(CompiledProgram {
        nodes: built.nodes,
        const_pool: built.const_pool,
        schedule,
        commits,
        state_keys,
        params: built.params,
        param_index: built.param_index,
        time_model,
        ui_bindings: session.ui,
        taps: session.taps,
        outputs: session.outputs,
        render: built.render,
        registry_digest,
        synthesized_adapters: session.synthesized_adapters,
        patch_digest,
        warnings,
    })
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use crate::block::BlockRegistry;
    use crate::compile::compile;
    use crate::ident::{make_block_id, make_edge_id};
    use crate::ir::IrId;
    use crate::patch::{Block, Edge, Patch, PortRef};
    use crate::transform::TransformRegistry;
    use crate::value::Value;
    use std::collections::BTreeSet;

    fn registries() -> (BlockRegistry, TransformRegistry) {
        (
            BlockRegistry::with_system_blocks().unwrap(),
            TransformRegistry::with_catalog().unwrap(),
        )
    }

    fn patch_with_root() -> (Patch, crate::ident::BlockId) {
        let mut patch = Patch::new();
        let root = make_block_id("root");
        patch
            .add_block(
                Block::new(root, "cycleTimeRoot").with_param("periodMs", Value::Duration(1000.0)),
            )
            .unwrap();
        crate::block::publish_reserved(&mut patch, &root).unwrap();
        (patch, root)
    }

    #[test]
    fn schedule_respects_ir_dependence() {
        let (blocks, transforms) = registries();
        let (mut patch, _) = patch_with_root();
        let c = make_block_id("c");
        let osc = make_block_id("osc");
        patch
            .add_block(Block::new(c, "const").with_param("value", Value::Number(5.0)))
            .unwrap();
        patch.add_block(Block::new(osc, "oscillator")).unwrap();
        patch
            .add_edge(Edge::new(
                make_edge_id("e"),
                PortRef::new(c, "out"),
                PortRef::new(osc, "frequency"),
            ))
            .unwrap();
        let program = compile(&patch, &blocks, &transforms).unwrap();

        let position: std::collections::BTreeMap<IrId, usize> = program
            .schedule
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i))
            .collect();
        for id in &program.schedule {
            let mut deps = Vec::new();
            program.nodes[id.index()].schedule_deps(&mut deps);
            for dep in deps {
                assert!(
                    position[&dep] < position[id],
                    "dependency must precede its consumer"
                );
            }
        }
    }

    #[test]
    fn schedule_contains_no_duplicates() {
        let (blocks, transforms) = registries();
        let (patch, _) = patch_with_root();
        let program = compile(&patch, &blocks, &transforms).unwrap();
        let unique: BTreeSet<_> = program.schedule.iter().collect();
        assert_eq!(unique.len(), program.schedule.len());
    }

    #[test]
    fn taps_cover_published_reserved_buses() {
        let (blocks, transforms) = registries();
        let (patch, _) = patch_with_root();
        let program = compile(&patch, &blocks, &transforms).unwrap();
        assert!(program.taps.contains_key("phaseA"));
        assert!(program.taps.contains_key("pulse"));
        assert!(program.ui_bindings.phase_a.is_some());
    }

    #[test]
    fn commits_cover_reachable_state_nodes() {
        let (blocks, transforms) = registries();
        let (patch, _) = patch_with_root();
        let program = compile(&patch, &blocks, &transforms).unwrap();
        // The cycle root's wrap detector carries state.
        assert!(!program.commits.is_empty());
        for id in &program.commits {
            assert!(program.nodes[id.index()].state_kind().is_some());
        }
    }
}
