// SPDX-License-Identifier: Apache-2.0
//! The frame evaluator.
//!
//! Scheduling model: single-threaded, cooperative, one frame at a time. The
//! host supplies monotonic time deltas; the evaluator never wraps `t` —
//! wrapping is a patch-level concept realized by cyclic time roots.
//!
//! Per frame:
//! 1. the frame cache resets (node id → value, at-most-once execution; hit
//!    counters verify the at-most-once property from outside),
//! 2. the schedule is walked in order — field nodes stay lazy,
//! 3. state-bearing nodes commit at end of frame in ascending id order,
//! 4. the render sink (if any) materializes its fields into reused buffers
//!    and replaces the frame's `RenderTree`.
//!
//! Evaluation errors are non-fatal: the node's value is substituted, the
//! substitution is reported through the telemetry sink and the frame
//! report, and the frame completes. A failing render sink keeps the
//! previous frame's tree.

mod render;
mod state;

pub use render::RenderTree;
pub use state::{StateSlot, StateStore};

use std::sync::Arc;

use crate::compile::CompiledProgram;
use crate::ir::{EvalCtx, FieldSourceKind, IrId, IrNode, RefKind, ReduceMode, ValueRef};
use crate::telemetry::{NullTelemetrySink, TelemetrySink};
use crate::value::{DomainDesc, DomainShape, Rgba, Value, Vec2};

/// Per-frame evaluation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frame index these counters describe.
    pub frame: u64,
    /// Nodes executed this frame.
    pub evaluated: u64,
    /// Node values served from the frame cache instead of re-execution.
    pub cache_hits: u64,
}

/// One non-fatal substitution recorded during a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalNote {
    /// Offending node id.
    pub node: u32,
    /// Human-readable reason.
    pub message: String,
}

/// Result of one frame tick.
#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    /// Counters for the frame.
    pub stats: FrameStats,
    /// Substitutions that occurred; empty on clean frames.
    pub notes: Vec<EvalNote>,
}

/// Counts of state slots affected by a program swap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationOutcome {
    /// Keys whose state carried forward.
    pub preserved: Vec<crate::ir::StateKey>,
    /// Keys that reinitialized (new, or node kind mismatch).
    pub reset: Vec<crate::ir::StateKey>,
}

/// Single-threaded program evaluator.
#[derive(Debug)]
pub struct Evaluator {
    program: Arc<CompiledProgram>,
    params: Vec<Value>,
    state: StateStore,
    cache: Vec<Option<Value>>,
    frame: u64,
    t_ms: f64,
    dt_ms: f64,
    speed: f64,
    frozen: bool,
    telemetry: Arc<dyn TelemetrySink>,
    last_render: Option<RenderTree>,
    scratch: Vec<Value>,
}

impl Evaluator {
    /// Evaluator with the null telemetry sink.
    #[must_use]
    pub fn new(program: Arc<CompiledProgram>) -> Self {
        Self::with_telemetry(program, Arc::new(NullTelemetrySink))
    }

    /// Evaluator with a host telemetry sink.
    #[must_use]
    pub fn with_telemetry(
        program: Arc<CompiledProgram>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let params = program.params.clone();
        Self {
            program,
            params,
            state: StateStore::new(),
            cache: Vec::new(),
            frame: 0,
            t_ms: 0.0,
            dt_ms: 0.0,
            speed: 1.0,
            frozen: false,
            telemetry,
            last_render: None,
            scratch: Vec::new(),
        }
    }

    /// The active program.
    #[must_use]
    pub fn program(&self) -> &Arc<CompiledProgram> {
        &self.program
    }

    /// Monotonic evaluator time in milliseconds.
    #[must_use]
    pub fn t_ms(&self) -> f64 {
        self.t_ms
    }

    /// Frames evaluated so far.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Stops advancing time; state is preserved and frames keep rendering
    /// the frozen instant.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Resumes time advancement.
    pub fn run(&mut self) {
        self.frozen = false;
    }

    /// True while frozen.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Scales subsequent `dt`s.
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed.max(0.0);
    }

    /// Advances one frame by `dt_ms` host milliseconds and evaluates it.
    pub fn step(&mut self, dt_ms: f64) -> FrameReport {
        let scaled = dt_ms * self.speed;
        if !self.frozen {
            self.t_ms += scaled;
        }
        self.dt_ms = if self.frozen { 0.0 } else { scaled };
        self.run_frame()
    }

    /// The current frame's render tree, when the patch has a render root.
    #[must_use]
    pub fn render(&self) -> Option<&RenderTree> {
        self.last_render.as_ref()
    }

    /// Post-frame value of an arbitrary reference.
    #[must_use]
    pub fn value_of(&self, r: ValueRef) -> Option<Value> {
        match r.kind {
            RefKind::ScalarConst => self.program.const_pool.get(r.id as usize).cloned(),
            _ => self.cache.get(r.id as usize).cloned().flatten(),
        }
    }

    /// Post-frame value of a reserved bus tap.
    #[must_use]
    pub fn tap(&self, name: &str) -> Option<Value> {
        self.program.taps.get(name).and_then(|r| self.value_of(*r))
    }

    /// Post-frame value of a block output.
    #[must_use]
    pub fn output(&self, block: &crate::ident::BlockId, slot: &str) -> Option<Value> {
        self.program
            .outputs
            .get(&(*block, slot.to_owned()))
            .and_then(|r| self.value_of(*r))
    }

    /// Read-only snapshot of persistent state.
    #[must_use]
    pub fn state_snapshot(&self) -> std::collections::BTreeMap<crate::ir::StateKey, StateSlot> {
        self.state.snapshot()
    }

    /// Class A retune: adopt the successor program without touching state,
    /// time, or the render tree. Caller guarantees structural identity.
    pub fn retune(&mut self, program: Arc<CompiledProgram>) {
        self.params = program.params.clone();
        self.program = program;
    }

    /// Structural swap: adopt the successor program and migrate state by
    /// key. A key present in both programs whose node kinds match carries
    /// forward; everything else reinitializes.
    pub fn install(&mut self, program: Arc<CompiledProgram>) -> MigrationOutcome {
        let mut outcome = MigrationOutcome::default();
        let old = Arc::clone(&self.program);
        let old_kinds: std::collections::BTreeMap<_, _> = old
            .state_keys
            .iter()
            .filter_map(|(node, key)| {
                old.nodes
                    .get(*node as usize)
                    .and_then(IrNode::state_kind)
                    .map(|kind| (*key, kind))
            })
            .collect();
        let mut next_state = StateStore::new();
        for (node, key) in &program.state_keys {
            let new_kind = program.nodes.get(*node as usize).and_then(IrNode::state_kind);
            let carried = match (old_kinds.get(key), new_kind) {
                (Some(old_kind), Some(new_kind)) if *old_kind == new_kind => {
                    self.state.get(key).cloned()
                }
                _ => None,
            };
            match carried {
                Some(slot) => {
                    next_state.set(*key, slot);
                    outcome.preserved.push(*key);
                }
                None => outcome.reset.push(*key),
            }
        }
        self.state = next_state;
        self.params = program.params.clone();
        self.program = program;
        self.cache.clear();
        outcome
    }

    fn run_frame(&mut self) -> FrameReport {
        let program = Arc::clone(&self.program);
        self.cache.clear();
        self.cache.resize(program.nodes.len(), None);
        let ctx = EvalCtx {
            t_ms: self.t_ms,
            dt_ms: self.dt_ms,
            frame: self.frame,
        };
        let mut report = FrameReport {
            stats: FrameStats {
                frame: self.frame,
                evaluated: 0,
                cache_hits: 0,
            },
            notes: Vec::new(),
        };

        for id in &program.schedule {
            let Some(node) = program.nodes.get(id.index()) else {
                continue;
            };
            if is_field_node(node) {
                continue; // Lazy until a sink or reduction demands it.
            }
            if self.cache.get(id.index()).is_some_and(Option::is_some) {
                report.stats.cache_hits += 1;
                continue;
            }
            let value = self.eval_node(&program, *id, node, &ctx, &mut report);
            if let Some(slot) = self.cache.get_mut(id.index()) {
                *slot = Some(value);
            }
            report.stats.evaluated += 1;
        }

        for id in &program.commits {
            if let Some(node) = program.nodes.get(id.index()) {
                self.commit_node(&program, *id, node);
            }
        }

        if let Some(spec) = program.render {
            self.materialize_render(&program, spec, &mut report);
        }

        self.frame += 1;
        report
    }

    fn substitute(&self, report: &mut FrameReport, node: IrId, reason: &str) -> Value {
        self.telemetry.node_substituted(node.0, reason);
        report.notes.push(EvalNote {
            node: node.0,
            message: reason.to_owned(),
        });
        Value::Number(0.0)
    }

    fn dep(&self, report: &mut FrameReport, id: IrId) -> Option<Value> {
        let v = self.cache.get(id.index()).cloned().flatten();
        if v.is_some() {
            report.stats.cache_hits += 1;
        }
        v
    }

    #[allow(clippy::too_many_lines)]
    fn eval_node(
        &mut self,
        program: &CompiledProgram,
        id: IrId,
        node: &IrNode,
        ctx: &EvalCtx,
        report: &mut FrameReport,
    ) -> Value {
        let state_key = program.state_key_of(id);
        match node {
            IrNode::Const { const_id } => program
                .const_pool
                .get(*const_id as usize)
                .cloned()
                .unwrap_or(Value::Number(0.0)),
            IrNode::Param { param_id } => self
                .params
                .get(*param_id as usize)
                .cloned()
                .unwrap_or(Value::Number(0.0)),
            IrNode::Time => Value::Time(ctx.t_ms),
            IrNode::Dt => Value::Duration(ctx.dt_ms),
            IrNode::Map { src, kernel } => {
                let Some(x) = self.dep(report, *src) else {
                    return self.substitute(report, id, "map input missing");
                };
                match kernel.apply(&[x]) {
                    Ok(v) => v,
                    Err(err) => self.substitute(report, id, &err.to_string()),
                }
            }
            IrNode::Zip { srcs, kernel } => {
                let mut args = Vec::with_capacity(srcs.len());
                for src in srcs {
                    let Some(x) = self.dep(report, *src) else {
                        return self.substitute(report, id, "zip input missing");
                    };
                    args.push(x);
                }
                match kernel.apply(&args) {
                    Ok(v) => v,
                    Err(err) => self.substitute(report, id, &err.to_string()),
                }
            }
            IrNode::Closure { f, .. } => (f.0)(ctx),
            IrNode::Combine { mode, srcs } => {
                let mut args = Vec::with_capacity(srcs.len());
                for src in srcs {
                    let Some(x) = self.dep(report, *src) else {
                        return self.substitute(report, id, "combine input missing");
                    };
                    args.push(x);
                }
                match mode.apply(&args) {
                    Some(v) => v,
                    None => self.substitute(report, id, "combine over no writers"),
                }
            }
            IrNode::Delay { init_const, .. } => match state_key.and_then(|k| self.state.get(&k)) {
                Some(StateSlot::Held(v)) => v.clone(),
                _ => program
                    .const_pool
                    .get(*init_const as usize)
                    .cloned()
                    .unwrap_or(Value::Number(0.0)),
            },
            IrNode::Integrate { .. } => match state_key.and_then(|k| self.state.get(&k)) {
                Some(StateSlot::Accum(acc)) => Value::Number(*acc),
                _ => Value::Number(0.0),
            },
            IrNode::SampleHold { .. } => match state_key.and_then(|k| self.state.get(&k)) {
                Some(StateSlot::Held(v)) => v.clone(),
                _ => Value::Number(0.0),
            },
            IrNode::Pulse { src } => {
                let cur = self.dep(report, *src).and_then(|v| v.as_f64()).unwrap_or(0.0);
                let fired = match state_key.and_then(|k| self.state.get(&k)) {
                    Some(StateSlot::Prev(prev)) => cur < *prev,
                    _ => false,
                };
                Value::Bool(fired)
            }
            IrNode::Rising { src } => {
                let cur = self.dep(report, *src).and_then(|v| v.as_f64()).unwrap_or(0.0);
                let fired = match state_key.and_then(|k| self.state.get(&k)) {
                    Some(StateSlot::Prev(prev)) => *prev <= 0.5 && cur > 0.5,
                    _ => false,
                };
                Value::Bool(fired)
            }
            IrNode::EventDiv { src, n } => {
                let fired_src = matches!(self.dep(report, *src), Some(Value::Bool(true)));
                let counter = match state_key.and_then(|k| self.state.get(&k)) {
                    Some(StateSlot::Counter(c)) => *c,
                    _ => 0,
                };
                Value::Bool(fired_src && (counter + 1) % (*n).max(1) == 0)
            }
            IrNode::EventOr { srcs } => {
                let fired = srcs
                    .iter()
                    .any(|s| matches!(self.dep(report, *s), Some(Value::Bool(true))));
                Value::Bool(fired)
            }
            IrNode::ReduceField { field, mode } => {
                let desc = field_domain(program, &self.cache, *field).unwrap_or(DomainDesc {
                    id: crate::ident::make_domain_id("broadcast"),
                    shape: DomainShape::Line { count: 1 },
                });
                let mut buf = std::mem::take(&mut self.scratch);
                eval_field(program, &self.params, &self.cache, ctx, *field, &desc, &mut buf);
                let value = reduce(*mode, &buf);
                self.scratch = buf;
                value
            }
            // Field nodes are lazy; reaching here means a scheduling bug.
            IrNode::Broadcast { .. }
            | IrNode::FieldSource { .. }
            | IrNode::FieldMap { .. }
            | IrNode::FieldZip { .. }
            | IrNode::FieldZipSig { .. } => {
                self.substitute(report, id, "field node evaluated eagerly")
            }
        }
    }

    fn commit_node(&mut self, program: &CompiledProgram, id: IrId, node: &IrNode) {
        let Some(key) = program.state_key_of(id) else {
            return;
        };
        let cached = |src: &IrId| self.cache.get(src.index()).cloned().flatten();
        match node {
            IrNode::Delay { src, init_const } => {
                let next = if *src == IrId::PENDING {
                    None
                } else {
                    cached(src)
                };
                let next = next.or_else(|| program.const_pool.get(*init_const as usize).cloned());
                if let Some(v) = next {
                    self.state.set(key, StateSlot::Held(v));
                }
            }
            IrNode::Integrate { src } => {
                let x = if *src == IrId::PENDING {
                    0.0
                } else {
                    cached(src).and_then(|v| v.as_f64()).unwrap_or(0.0)
                };
                let acc = match self.state.get(&key) {
                    Some(StateSlot::Accum(acc)) => *acc,
                    _ => 0.0,
                };
                self.state
                    .set(key, StateSlot::Accum(acc + x * self.dt_ms * 0.001));
            }
            IrNode::SampleHold { src, trigger } => {
                let fired = matches!(cached(trigger), Some(Value::Bool(true)));
                if fired && *src != IrId::PENDING {
                    if let Some(v) = cached(src) {
                        self.state.set(key, StateSlot::Held(v));
                    }
                }
            }
            IrNode::Pulse { src } | IrNode::Rising { src } => {
                let cur = cached(src).and_then(|v| v.as_f64()).unwrap_or(0.0);
                self.state.set(key, StateSlot::Prev(cur));
            }
            IrNode::EventDiv { src, n } => {
                if matches!(cached(src), Some(Value::Bool(true))) {
                    let counter = match self.state.get(&key) {
                        Some(StateSlot::Counter(c)) => *c,
                        _ => 0,
                    };
                    self.state
                        .set(key, StateSlot::Counter((counter + 1) % (*n).max(1)));
                }
            }
            _ => {}
        }
    }

    fn materialize_render(
        &mut self,
        program: &CompiledProgram,
        spec: crate::ir::RenderSpec,
        report: &mut FrameReport,
    ) {
        let domain_value = match spec.domain.kind {
            RefKind::ScalarConst => program.const_pool.get(spec.domain.id as usize).cloned(),
            _ => self.cache.get(spec.domain.id as usize).cloned().flatten(),
        };
        let Some(Value::Domain(desc)) = domain_value else {
            self.telemetry.render_kept_previous("render domain unavailable");
            report.notes.push(EvalNote {
                node: spec.domain.id,
                message: "render domain unavailable; kept previous frame".to_owned(),
            });
            return;
        };
        let ctx = EvalCtx {
            t_ms: self.t_ms,
            dt_ms: self.dt_ms,
            frame: self.frame,
        };
        let mut tree = self.last_render.take().unwrap_or_default();
        tree.domain = Some(desc.id);

        let mut buf = std::mem::take(&mut self.scratch);
        eval_field(
            program,
            &self.params,
            &self.cache,
            &ctx,
            IrId(spec.position.id),
            &desc,
            &mut buf,
        );
        tree.positions.clear();
        tree.positions.extend(buf.iter().map(|v| match v {
            Value::Point(p) | Value::Vec2(p) => *p,
            _ => Vec2::new(0.5, 0.5),
        }));

        eval_field(
            program,
            &self.params,
            &self.cache,
            &ctx,
            IrId(spec.color.id),
            &desc,
            &mut buf,
        );
        tree.colors.clear();
        tree.colors.extend(buf.iter().map(|v| match v {
            Value::Color(c) => *c,
            _ => Rgba::rgb(1.0, 1.0, 1.0),
        }));

        eval_field(
            program,
            &self.params,
            &self.cache,
            &ctx,
            IrId(spec.size.id),
            &desc,
            &mut buf,
        );
        tree.sizes.clear();
        tree.sizes
            .extend(buf.iter().map(|v| v.as_f64().unwrap_or(1.0)));

        self.scratch = buf;
        self.last_render = Some(tree);
    }
}

fn is_field_node(node: &IrNode) -> bool {
    matches!(
        node,
        IrNode::Broadcast { .. }
            | IrNode::FieldSource { .. }
            | IrNode::FieldMap { .. }
            | IrNode::FieldZip { .. }
            | IrNode::FieldZipSig { .. }
    )
}

/// Walks a field expression looking for the domain it ranges over.
fn field_domain(
    program: &CompiledProgram,
    cache: &[Option<Value>],
    node: IrId,
) -> Option<DomainDesc> {
    match program.nodes.get(node.index())? {
        IrNode::FieldSource { domain, .. } => {
            match cache.get(domain.index()).cloned().flatten() {
                Some(Value::Domain(d)) => Some(d),
                _ => match program.nodes.get(domain.index()) {
                    Some(IrNode::Const { const_id }) => {
                        match program.const_pool.get(*const_id as usize) {
                            Some(Value::Domain(d)) => Some(*d),
                            _ => None,
                        }
                    }
                    _ => None,
                },
            }
        }
        IrNode::FieldMap { src, .. } => field_domain(program, cache, *src),
        IrNode::FieldZip { srcs, .. } => srcs
            .iter()
            .find_map(|s| field_domain(program, cache, *s)),
        IrNode::FieldZipSig { field, .. } => field_domain(program, cache, *field),
        _ => None,
    }
}

/// Materializes a field expression over `desc` into `out`.
///
/// Iteration is the domain's deterministic order (row-major for grids).
/// Unresolvable pieces fill with domain-appropriate defaults rather than
/// aborting the frame.
#[allow(clippy::cast_precision_loss)]
fn eval_field(
    program: &CompiledProgram,
    params: &[Value],
    cache: &[Option<Value>],
    ctx: &EvalCtx,
    node: IrId,
    desc: &DomainDesc,
    out: &mut Vec<Value>,
) {
    let count = desc.count() as usize;
    out.clear();
    let Some(ir) = program.nodes.get(node.index()) else {
        out.resize(count, Value::Number(0.0));
        return;
    };
    match ir {
        IrNode::Broadcast { src } => {
            let v = cache
                .get(src.index())
                .cloned()
                .flatten()
                .unwrap_or(Value::Number(0.0));
            out.resize(count, v);
        }
        IrNode::FieldSource { domain, kind } => {
            // Prefer the source's own domain artifact; fall back to the
            // sink's.
            let own = match program.nodes.get(domain.index()) {
                Some(IrNode::Const { const_id }) => match program.const_pool.get(*const_id as usize)
                {
                    Some(Value::Domain(d)) => Some(*d),
                    _ => None,
                },
                _ => match cache.get(domain.index()).cloned().flatten() {
                    Some(Value::Domain(d)) => Some(d),
                    _ => None,
                },
            };
            let desc = own.unwrap_or(*desc);
            for i in 0..count {
                out.push(element(&desc, i, *kind));
            }
        }
        IrNode::FieldMap { src, kernel } => {
            let mut inner = Vec::with_capacity(count);
            eval_field(program, params, cache, ctx, *src, desc, &mut inner);
            for v in inner {
                out.push(kernel.apply(&[v]).unwrap_or(Value::Number(0.0)));
            }
        }
        IrNode::FieldZip { srcs, kernel } => {
            let mut columns: Vec<Vec<Value>> = Vec::with_capacity(srcs.len());
            for s in srcs {
                let mut col = Vec::with_capacity(count);
                eval_field(program, params, cache, ctx, *s, desc, &mut col);
                columns.push(col);
            }
            for i in 0..count {
                let args: Vec<Value> = columns
                    .iter()
                    .map(|c| c.get(i).cloned().unwrap_or(Value::Number(0.0)))
                    .collect();
                out.push(kernel.apply(&args).unwrap_or(Value::Number(0.0)));
            }
        }
        IrNode::FieldZipSig {
            field,
            sigs,
            kernel,
        } => {
            let mut inner = Vec::with_capacity(count);
            eval_field(program, params, cache, ctx, *field, desc, &mut inner);
            let sig_values: Vec<Value> = sigs
                .iter()
                .map(|s| {
                    cache
                        .get(s.index())
                        .cloned()
                        .flatten()
                        .unwrap_or(Value::Number(0.0))
                })
                .collect();
            for v in inner {
                let mut args = Vec::with_capacity(1 + sig_values.len());
                args.push(v);
                args.extend(sig_values.iter().cloned());
                out.push(kernel.apply(&args).unwrap_or(Value::Number(0.0)));
            }
        }
        IrNode::Closure { f, .. } => {
            let v = (f.0)(ctx);
            out.resize(count, v);
        }
        // A signal node referenced in field position broadcasts its cached
        // value.
        _ => {
            let v = cache
                .get(node.index())
                .cloned()
                .flatten()
                .unwrap_or(Value::Number(0.0));
            out.resize(count, v);
        }
    }
}

/// One element of a per-element generator.
#[allow(clippy::cast_precision_loss)]
fn element(desc: &DomainDesc, i: usize, kind: FieldSourceKind) -> Value {
    let count = desc.count() as usize;
    match kind {
        FieldSourceKind::Index => Value::Number(i as f64),
        FieldSourceKind::UnitCoord => {
            let denom = count.saturating_sub(1).max(1) as f64;
            Value::Unit(i as f64 / denom)
        }
        FieldSourceKind::GridPos => match desc.shape {
            DomainShape::Grid { cols, rows } => {
                let col = (i as u32) % cols.max(1);
                let row = (i as u32) / cols.max(1);
                let x = f64::from(col) / f64::from(cols.saturating_sub(1).max(1));
                let y = f64::from(row) / f64::from(rows.saturating_sub(1).max(1));
                Value::Point(Vec2::new(x, y))
            }
            DomainShape::Line { count } => {
                let x = i as f64 / f64::from(count.saturating_sub(1).max(1));
                Value::Point(Vec2::new(x, 0.5))
            }
        },
    }
}

fn reduce(mode: ReduceMode, values: &[Value]) -> Value {
    let nums: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
    if nums.is_empty() {
        return Value::Number(0.0);
    }
    #[allow(clippy::cast_precision_loss)]
    let value = match mode {
        ReduceMode::Sum => nums.iter().sum(),
        ReduceMode::Mean => nums.iter().sum::<f64>() / nums.len() as f64,
        ReduceMode::Min => nums.iter().copied().fold(f64::INFINITY, f64::min),
        ReduceMode::Max => nums.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    };
    Value::Number(value)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::block::BlockRegistry;
    use crate::compile::compile;
    use crate::ident::{make_block_id, make_edge_id};
    use crate::patch::{Block, Edge, Patch, PortRef};
    use crate::transform::TransformRegistry;

    fn registries() -> (BlockRegistry, TransformRegistry) {
        (
            BlockRegistry::with_system_blocks().unwrap(),
            TransformRegistry::with_catalog().unwrap(),
        )
    }

    fn cyclic_patch() -> Patch {
        let mut patch = Patch::new();
        let root = make_block_id("root");
        patch
            .add_block(
                Block::new(root, "cycleTimeRoot").with_param("periodMs", Value::Duration(1000.0)),
            )
            .unwrap();
        crate::block::publish_reserved(&mut patch, &root).unwrap();
        patch
    }

    #[test]
    fn phase_tap_follows_cyclic_time() {
        let (blocks, transforms) = registries();
        let program = Arc::new(compile(&cyclic_patch(), &blocks, &transforms).unwrap());
        let mut eval = Evaluator::new(program);
        eval.step(250.0);
        assert_eq!(eval.tap("phaseA"), Some(Value::Phase(0.25)));
        eval.step(1000.0);
        assert_eq!(eval.tap("phaseA"), Some(Value::Phase(0.25)));
    }

    #[test]
    fn pulse_fires_on_wrap_only() {
        let (blocks, transforms) = registries();
        let program = Arc::new(compile(&cyclic_patch(), &blocks, &transforms).unwrap());
        let mut eval = Evaluator::new(program);
        eval.step(600.0);
        assert_eq!(eval.tap("pulse"), Some(Value::Bool(false)));
        eval.step(600.0); // t = 1200, phase wrapped past 1.0
        assert_eq!(eval.tap("pulse"), Some(Value::Bool(true)));
        eval.step(100.0);
        assert_eq!(eval.tap("pulse"), Some(Value::Bool(false)));
    }

    #[test]
    fn each_node_evaluates_at_most_once_per_frame() {
        let (blocks, transforms) = registries();
        let program = Arc::new(compile(&cyclic_patch(), &blocks, &transforms).unwrap());
        let scheduled = u64::try_from(program.schedule.len()).unwrap();
        let field_nodes = u64::try_from(
            program
                .schedule
                .iter()
                .filter(|id| is_field_node(&program.nodes[id.index()]))
                .count(),
        )
        .unwrap();
        let mut eval = Evaluator::new(program);
        let report = eval.step(16.0);
        assert_eq!(report.stats.evaluated, scheduled - field_nodes);
    }

    #[test]
    fn freeze_stops_time_and_run_resumes() {
        let (blocks, transforms) = registries();
        let program = Arc::new(compile(&cyclic_patch(), &blocks, &transforms).unwrap());
        let mut eval = Evaluator::new(program);
        eval.step(100.0);
        eval.freeze();
        eval.step(500.0);
        assert_eq!(eval.t_ms(), 100.0);
        eval.run();
        eval.step(150.0);
        assert_eq!(eval.t_ms(), 250.0);
    }

    #[test]
    fn speed_scales_dt() {
        let (blocks, transforms) = registries();
        let program = Arc::new(compile(&cyclic_patch(), &blocks, &transforms).unwrap());
        let mut eval = Evaluator::new(program);
        eval.set_speed(2.0);
        eval.step(100.0);
        assert_eq!(eval.t_ms(), 200.0);
    }

    #[test]
    fn render_tree_materializes_grid_instances() {
        let (blocks, transforms) = registries();
        let mut patch = cyclic_patch();
        let grid = make_block_id("grid");
        let sink = make_block_id("sink");
        patch
            .add_block(
                Block::new(grid, "gridDomain")
                    .with_param("cols", Value::Int(2))
                    .with_param("rows", Value::Int(2)),
            )
            .unwrap();
        patch.add_block(Block::new(sink, "renderInstances")).unwrap();
        patch
            .add_edge(Edge::new(
                make_edge_id("gd"),
                PortRef::new(grid, "domain"),
                PortRef::new(sink, "domain"),
            ))
            .unwrap();
        let program = Arc::new(compile(&patch, &blocks, &transforms).unwrap());
        let mut eval = Evaluator::new(program);
        eval.step(16.0);
        let tree = eval.render().expect("expected a render tree");
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.colors.len(), 4);
        assert_eq!(tree.sizes.len(), 4);
    }

    #[test]
    fn integrator_accumulates_over_frames() {
        let (blocks, transforms) = registries();
        let mut patch = cyclic_patch();
        let c = make_block_id("c");
        let i = make_block_id("i");
        patch
            .add_block(Block::new(c, "const").with_param("value", Value::Number(2.0)))
            .unwrap();
        patch.add_block(Block::new(i, "integrate")).unwrap();
        patch
            .add_edge(Edge::new(
                make_edge_id("ci"),
                PortRef::new(c, "out"),
                PortRef::new(i, "in"),
            ))
            .unwrap();
        let program = Arc::new(compile(&patch, &blocks, &transforms).unwrap());
        let mut eval = Evaluator::new(program);
        eval.step(500.0); // integral committed after frame: 2.0 * 0.5s = 1.0
        eval.step(500.0);
        assert_eq!(eval.output(&i, "out"), Some(Value::Number(1.0)));
    }
}
