//! Andersen's Points-to Analysis Solver
//!
//! Inclusion-based pointer analysis:
//! - SCC collapse of static COPY cycles
//! - worklist propagation along COPY edges
//! - LOAD/STORE turned into COPY edges as pointer sets grow
//! - indirect calls bound to their targets as function addresses reach the pointer
//!
//! Field-insensitive: every abstract object owns a single memory cell.

use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::time::Instant;
use tracing::{debug, warn};

use super::constraint_generator::{generate_constraints, return_values};
use crate::features::points_to::domain::constraint::{
    Constraint, ConstraintKind, ConstraintSet, IndirectCall, VarId,
};
use crate::features::points_to::ports::PointsToOracle;
use crate::shared::models::{FunctionId, InstId, KModule, ValueId};
use crate::shared::utils::{tarjan_scc, SccResult};

/// Andersen solver configuration
#[derive(Debug, Clone)]
pub struct AndersenConfig {
    /// Maximum worklist pops (0 = unlimited)
    pub max_iterations: usize,

    /// Enable SCC optimization
    pub enable_scc: bool,
}

impl Default for AndersenConfig {
    fn default() -> Self {
        Self {
            max_iterations: 0,
            enable_scc: true,
        }
    }
}

/// Statistics for Andersen's analysis
#[derive(Debug, Clone, Default)]
pub struct AndersenStats {
    pub constraints_total: usize,
    pub constraints_alloc: usize,
    pub constraints_copy: usize,
    pub constraints_complex: usize,
    pub indirect_calls: usize,
    pub resolved_targets: usize,
    pub scc_count: usize,
    pub scc_collapsed: usize,
    pub iterations: usize,
    pub propagations: usize,
    pub duration_ms: f64,
}

/// Andersen's points-to analysis solver
pub struct AndersenSolver {
    config: AndersenConfig,

    /// First node id used for memory cells
    cell_base: VarId,

    /// Points-to sets (node → abstract objects)
    points_to: FxHashMap<VarId, FxHashSet<VarId>>,

    /// Copy edges for propagation (rhs → {lhs})
    copy_edges: FxHashMap<VarId, FxHashSet<VarId>>,

    /// LOAD constraints keyed by loaded-from pointer: ptr → {dst}
    loads_by_ptr: FxHashMap<VarId, Vec<VarId>>,

    /// STORE constraints keyed by stored-through pointer: ptr → {src}
    stores_by_ptr: FxHashMap<VarId, Vec<VarId>>,

    /// Indirect call indices keyed by function pointer node
    indirect_by_ptr: FxHashMap<VarId, Vec<usize>>,

    indirect_calls: Vec<IndirectCall>,

    /// Targets already bound per indirect call
    resolved: FxHashMap<InstId, FxHashSet<FunctionId>>,

    /// Function address value → function, for targets with a body
    function_values: FxHashMap<VarId, FunctionId>,

    params: FxHashMap<FunctionId, Vec<ValueId>>,
    returns: FxHashMap<FunctionId, Vec<ValueId>>,

    scc_result: Option<SccResult<VarId>>,

    constraints: ConstraintSet,

    worklist: VecDeque<VarId>,
    in_worklist: FxHashSet<VarId>,

    stats: AndersenStats,
}

impl AndersenSolver {
    pub fn new(config: AndersenConfig, module: &KModule) -> Self {
        let function_values = module
            .defined_functions()
            .map(|f| (f.value.0, f.id))
            .collect();
        let params = module
            .defined_functions()
            .map(|f| (f.id, f.params.clone()))
            .collect();

        Self {
            config,
            cell_base: module.value_count() as VarId,
            points_to: FxHashMap::default(),
            copy_edges: FxHashMap::default(),
            loads_by_ptr: FxHashMap::default(),
            stores_by_ptr: FxHashMap::default(),
            indirect_by_ptr: FxHashMap::default(),
            indirect_calls: Vec::new(),
            resolved: FxHashMap::default(),
            function_values,
            params,
            returns: return_values(module),
            scc_result: None,
            constraints: generate_constraints(module),
            worklist: VecDeque::new(),
            in_worklist: FxHashSet::default(),
            stats: AndersenStats::default(),
        }
    }

    /// Memory cell node of abstract object `obj`
    #[inline]
    fn cell(&self, obj: VarId) -> VarId {
        self.cell_base + obj
    }

    #[inline]
    fn get_rep(&self, var: VarId) -> VarId {
        self.scc_result
            .as_ref()
            .map(|scc| scc.rep(var))
            .unwrap_or(var)
    }

    /// Solve all constraints
    pub fn solve(&mut self) -> &AndersenStats {
        let start = Instant::now();

        self.stats.constraints_total = self.constraints.len();
        self.stats.constraints_alloc = self.constraints.alloc_count;
        self.stats.constraints_copy = self.constraints.copy_count;
        self.stats.constraints_complex =
            self.constraints.load_count + self.constraints.store_count;
        self.stats.indirect_calls = self.constraints.indirect_calls.len();

        // Phase 1: SCC detection
        if self.config.enable_scc {
            self.detect_sccs();
        }

        // Phase 2: Process constraints
        self.process_allocs();
        self.build_edges();
        self.solve_with_worklist();

        self.stats.duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        debug!(
            constraints = self.stats.constraints_total,
            iterations = self.stats.iterations,
            resolved_targets = self.stats.resolved_targets,
            "Andersen analysis finished"
        );
        &self.stats
    }

    fn detect_sccs(&mut self) {
        let edges: Vec<(VarId, VarId)> = self
            .constraints
            .copies()
            .map(|c| (c.rhs, c.lhs))
            .collect();

        if edges.is_empty() {
            return;
        }

        let result = tarjan_scc(std::iter::empty(), &edges);
        self.stats.scc_count = result.stats.scc_count;
        self.stats.scc_collapsed = result.stats.collapsed_nodes;
        self.scc_result = Some(result);
    }

    fn process_allocs(&mut self) {
        let allocs: Vec<Constraint> = self.constraints.allocs().copied().collect();
        for constraint in allocs {
            let var = self.get_rep(constraint.lhs);
            self.points_to.entry(var).or_default().insert(constraint.rhs);
        }
    }

    fn build_edges(&mut self) {
        let constraints: Vec<Constraint> = self
            .constraints
            .constraints
            .iter()
            .filter(|c| c.kind != ConstraintKind::Alloc)
            .copied()
            .collect();

        for constraint in constraints {
            let lhs = self.get_rep(constraint.lhs);
            let rhs = self.get_rep(constraint.rhs);
            match constraint.kind {
                ConstraintKind::Copy => {
                    if lhs != rhs {
                        self.copy_edges.entry(rhs).or_default().insert(lhs);
                    }
                }
                ConstraintKind::Load => self.loads_by_ptr.entry(rhs).or_default().push(lhs),
                ConstraintKind::Store => self.stores_by_ptr.entry(lhs).or_default().push(rhs),
                ConstraintKind::Alloc => {}
            }
        }

        self.indirect_calls = std::mem::take(&mut self.constraints.indirect_calls);
        for (idx, call) in self.indirect_calls.iter().enumerate() {
            let fp = self
                .scc_result
                .as_ref()
                .map(|scc| scc.rep(call.fn_ptr.0))
                .unwrap_or(call.fn_ptr.0);
            self.indirect_by_ptr.entry(fp).or_default().push(idx);
        }
    }

    fn enqueue(&mut self, var: VarId) {
        if self.in_worklist.insert(var) {
            self.worklist.push_back(var);
        }
    }

    /// Add `src → dst` and push pts(src) through it
    fn add_edge(&mut self, src: VarId, dst: VarId) {
        let src = self.get_rep(src);
        let dst = self.get_rep(dst);
        if src == dst || !self.copy_edges.entry(src).or_default().insert(dst) {
            return;
        }
        if let Some(pts) = self.points_to.get(&src).cloned() {
            self.propagate(&pts, dst);
        }
    }

    fn propagate(&mut self, pts: &FxHashSet<VarId>, dst: VarId) {
        let dst_pts = self.points_to.entry(dst).or_default();
        let old_len = dst_pts.len();
        dst_pts.extend(pts.iter().copied());
        if dst_pts.len() > old_len {
            self.stats.propagations += 1;
            self.enqueue(dst);
        }
    }

    fn solve_with_worklist(&mut self) {
        let initial: Vec<VarId> = self.points_to.keys().copied().collect();
        for var in initial {
            self.enqueue(var);
        }

        let max_iters = if self.config.max_iterations > 0 {
            self.config.max_iterations
        } else {
            usize::MAX
        };

        let mut iterations = 0;
        while let Some(var) = self.worklist.pop_front() {
            iterations += 1;
            if iterations > max_iters {
                warn!(max_iters, "Andersen: max iterations reached, result is incomplete");
                break;
            }
            self.in_worklist.remove(&var);

            let current_pts = match self.points_to.get(&var) {
                Some(pts) => pts.clone(),
                None => continue,
            };

            self.process_complex_for_var(var, &current_pts);
            self.resolve_indirect_for_var(var, &current_pts);

            if let Some(successors) = self.copy_edges.get(&var).cloned() {
                for succ in successors {
                    self.propagate(&current_pts, succ);
                }
            }
        }

        self.stats.iterations = iterations;
    }

    /// LOAD/STORE through `var` become COPY edges to and from the cells of its targets
    fn process_complex_for_var(&mut self, var: VarId, pts: &FxHashSet<VarId>) {
        if let Some(dsts) = self.loads_by_ptr.get(&var).cloned() {
            for &obj in pts {
                let cell = self.cell(obj);
                for &dst in &dsts {
                    self.add_edge(cell, dst);
                }
            }
        }
        if let Some(srcs) = self.stores_by_ptr.get(&var).cloned() {
            for &obj in pts {
                let cell = self.cell(obj);
                for &src in &srcs {
                    self.add_edge(src, cell);
                }
            }
        }
    }

    fn resolve_indirect_for_var(&mut self, var: VarId, pts: &FxHashSet<VarId>) {
        let Some(calls) = self.indirect_by_ptr.get(&var).cloned() else {
            return;
        };
        for idx in calls {
            for &obj in pts {
                let Some(&target) = self.function_values.get(&obj) else {
                    continue;
                };
                let call = self.indirect_calls[idx].clone();
                if !self.resolved.entry(call.call).or_default().insert(target) {
                    continue;
                }
                self.stats.resolved_targets += 1;

                let params = self.params.get(&target).cloned().unwrap_or_default();
                for (param, arg) in params.iter().zip(&call.args) {
                    self.add_edge(arg.0, param.0);
                }
                let returns = self.returns.get(&target).cloned().unwrap_or_default();
                for rv in returns {
                    self.add_edge(rv.0, call.call.0);
                }
            }
        }
    }

    pub fn stats(&self) -> &AndersenStats {
        &self.stats
    }

    /// Consume the solver, keeping only value-level results
    pub fn into_oracle(self) -> AndersenOracle {
        let cell_base = self.cell_base;
        let var_to_rep = self
            .scc_result
            .map(|scc| scc.node_to_rep)
            .unwrap_or_default()
            .into_iter()
            .filter(|(var, _)| *var < cell_base)
            .collect();
        let points_to = self
            .points_to
            .into_iter()
            .filter(|(var, _)| *var < cell_base)
            .map(|(var, pts)| (var, pts.into_iter().map(ValueId).collect()))
            .collect();

        AndersenOracle {
            var_to_rep,
            points_to,
            resolved_targets: self.resolved,
            stats: self.stats,
        }
    }
}

/// Solved Andersen facts served as a [`PointsToOracle`]
#[derive(Debug, Clone, Default)]
pub struct AndersenOracle {
    var_to_rep: FxHashMap<VarId, VarId>,
    points_to: FxHashMap<VarId, FxHashSet<ValueId>>,
    resolved_targets: FxHashMap<InstId, FxHashSet<FunctionId>>,
    stats: AndersenStats,
}

impl AndersenOracle {
    /// Generate constraints for `module` and solve them
    pub fn analyze(module: &KModule) -> Self {
        Self::analyze_with(module, AndersenConfig::default())
    }

    pub fn analyze_with(module: &KModule, config: AndersenConfig) -> Self {
        let mut solver = AndersenSolver::new(config, module);
        solver.solve();
        solver.into_oracle()
    }

    /// Functions an indirect call may reach
    pub fn indirect_targets(&self, call: InstId) -> Vec<FunctionId> {
        let mut targets: Vec<FunctionId> = self
            .resolved_targets
            .get(&call)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        targets.sort();
        targets
    }

    pub fn may_alias(&self, a: ValueId, b: ValueId) -> bool {
        let pa = self.points_to(a);
        let pb = self.points_to(b);
        pa.iter().any(|o| pb.contains(o))
    }

    pub fn stats(&self) -> &AndersenStats {
        &self.stats
    }
}

impl PointsToOracle for AndersenOracle {
    fn points_to(&self, v: ValueId) -> FxHashSet<ValueId> {
        let rep = self.var_to_rep.get(&v.0).copied().unwrap_or(v.0);
        self.points_to.get(&rep).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::ModuleBuilder;

    #[test]
    fn test_store_load_through_memory() {
        // a = alloca; p = mmap(); *a = p; q = *a
        let mut mb = ModuleBuilder::new("m");
        let mmap = mb.declare_function("mmap", &[]);
        let main = mb.declare_function("main", &[]);
        let (a, p, q);
        {
            let mut fb = mb.define(main);
            a = fb.alloca("a");
            p = fb.call("p", mmap, &[]);
            fb.store(p, a);
            q = fb.load("q", a);
            fb.ret(None);
        }
        let module = mb.build().unwrap();
        let oracle = AndersenOracle::analyze(&module);

        assert!(oracle.points_to(q).contains(&p));
        assert!(oracle.points_to(a).contains(&a));
        assert!(!oracle.points_to(q).contains(&a));
    }

    #[test]
    fn test_copy_cycle_collapsed() {
        // f(a) { g(a) }  g(b) { f(b) }  main { f(mmap()) }
        let mut mb = ModuleBuilder::new("m");
        let mmap = mb.declare_function("mmap", &[]);
        let f = mb.declare_function("f", &["a"]);
        let g = mb.declare_function("g", &["b"]);
        let main = mb.declare_function("main", &[]);
        let a = mb.param(f, 0);
        let b = mb.param(g, 0);
        {
            let mut fb = mb.define(f);
            fb.call("", g, &[a]);
            fb.ret(None);
        }
        {
            let mut fb = mb.define(g);
            fb.call("", f, &[b]);
            fb.ret(None);
        }
        let p;
        {
            let mut fb = mb.define(main);
            p = fb.call("p", mmap, &[]);
            fb.call("", f, &[p]);
            fb.ret(None);
        }
        let module = mb.build().unwrap();
        let mut solver = AndersenSolver::new(AndersenConfig::default(), &module);
        let stats = solver.solve().clone();
        let oracle = solver.into_oracle();

        assert_eq!(stats.scc_count, 1);
        assert_eq!(stats.scc_collapsed, 1);
        assert!(oracle.points_to(a).contains(&p));
        assert!(oracle.points_to(b).contains(&p));
    }

    #[test]
    fn test_indirect_call_resolved() {
        // fp = &id; r = fp(m) where id(x) returns x
        let mut mb = ModuleBuilder::new("m");
        let mmap = mb.declare_function("mmap", &[]);
        let id = mb.declare_function("id", &["x"]);
        let main = mb.declare_function("main", &[]);
        let x = mb.param(id, 0);
        mb.define(id).ret(Some(x));
        let id_value = mb.function_value(id);
        let (m, fp, r, call);
        {
            let mut fb = mb.define(main);
            m = fb.call("m", mmap, &[]);
            fp = fb.cast("fp", id_value);
            call = fb.call_indirect("r", fp, &[m]);
            r = call;
            fb.ret(None);
        }
        let module = mb.build().unwrap();
        let oracle = AndersenOracle::analyze(&module);

        assert_eq!(oracle.indirect_targets(call), vec![id]);
        assert!(oracle.points_to(x).contains(&m));
        assert!(oracle.points_to(r).contains(&m));
        assert!(oracle.stats().resolved_targets >= 1);
    }

    #[test]
    fn test_unrelated_allocations_do_not_alias() {
        let mut mb = ModuleBuilder::new("m");
        let main = mb.declare_function("main", &[]);
        let (a, b);
        {
            let mut fb = mb.define(main);
            a = fb.alloca("a");
            b = fb.alloca("b");
            fb.ret(None);
        }
        let module = mb.build().unwrap();
        let oracle = AndersenOracle::analyze(&module);
        assert!(!oracle.may_alias(a, b));
        assert!(oracle.may_alias(a, a));
    }
}
