//! NVM context descriptor
//!
//! One activation of a function under a value descriptor: per-instruction
//! weights (how much NVM work the instruction does, including callees),
//! priorities (weight still reachable from the instruction) and the child
//! contexts of its call sites.
//!
//! Contexts are immutable once built. Updates produce new contexts, either
//! from the [`ContextCache`] or by copying with one child replaced.

use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use super::value_desc::{NvmValueDesc, SharedValueDesc};
use crate::features::nvm_heuristic::infrastructure::context_cache::ContextCache;
use crate::features::nvm_heuristic::infrastructure::priority::compute_priorities;
use crate::shared::models::{Callee, FunctionId, InstId, InstKind, Intrinsic, KInstruction, KModule, ValueId};

pub type SharedContextDesc = Arc<NvmContextDesc>;

/// Where execution continues after stepping `pc`
#[derive(Debug, Clone)]
pub enum NextContext {
    Same,
    Enter(SharedContextDesc),
    Return,
}

/// Weight of `inst` on its own: NVM stores, flushes and allocations weigh 1,
/// fences weigh 1, returns weigh 1 when the caller cares about the result
pub fn core_weight(
    value_state: &NvmValueDesc,
    module: &KModule,
    inst: &KInstruction,
    return_has_weight: bool,
) -> u64 {
    let weight = match &inst.kind {
        InstKind::Store { ptr, .. } => value_state.may_point_to_nvm(*ptr),
        InstKind::Call { args, .. } => {
            if value_state.is_nvm_alloc_call(inst.id) {
                true
            } else {
                match module.intrinsic_of(inst.id) {
                    Some(Intrinsic::Flush) => args
                        .first()
                        .map(|p| value_state.may_point_to_nvm(*p))
                        .unwrap_or(false),
                    // weighted whether or not a store is pending
                    Some(Intrinsic::Fence) => true,
                    _ => false,
                }
            }
        }
        InstKind::Ret { .. } => return_has_weight,
        _ => false,
    };
    u64::from(weight)
}

#[derive(Clone)]
pub struct NvmContextDesc {
    function: FunctionId,
    value_state: SharedValueDesc,
    return_has_weight: bool,
    /// Weight of the instruction itself, without callee contributions
    core_weights: FxHashMap<InstId, u64>,
    weights: FxHashMap<InstId, u64>,
    priorities: FxHashMap<InstId, u64>,
    contexts: FxHashMap<InstId, SharedContextDesc>,
    has_core_weight: bool,
}

impl NvmContextDesc {
    /// Context for `function` under `value_state`, from the cache when possible
    ///
    /// `parent_has_weight` decides whether returns weigh 1; it is not part of
    /// the cache key, the first construction for a key wins.
    pub fn construct(
        cache: &ContextCache,
        function: FunctionId,
        value_state: SharedValueDesc,
        parent_has_weight: bool,
    ) -> SharedContextDesc {
        let value_state = cache.intern(value_state);
        if let Some(hit) = cache.lookup(function, &value_state) {
            trace!(function = function.0, "context cache hit");
            return hit;
        }

        let started = cache.begin(function, &value_state);
        let context = Self::build(cache, function, Arc::clone(&value_state), parent_has_weight);
        if started {
            cache.finish(function, &value_state);
        }
        cache.insert(Arc::new(context))
    }

    fn build(
        cache: &ContextCache,
        function: FunctionId,
        value_state: SharedValueDesc,
        parent_has_weight: bool,
    ) -> Self {
        let module = Arc::clone(value_state.points_to_cache().module());
        let mut ctx = Self {
            function,
            value_state,
            return_has_weight: parent_has_weight,
            core_weights: FxHashMap::default(),
            weights: FxHashMap::default(),
            priorities: FxHashMap::default(),
            contexts: FxHashMap::default(),
            has_core_weight: false,
        };

        // core pass
        for inst in module.instructions_of(function) {
            let w = core_weight(&ctx.value_state, &module, inst, ctx.return_has_weight);
            if w > 0 {
                ctx.core_weights.insert(inst.id, w);
                ctx.has_core_weight = true;
            }
            ctx.weights.insert(inst.id, w);
        }

        // aux pass: direct calls into defined functions
        for inst in module.instructions_of(function) {
            let InstKind::Call {
                callee: Callee::Direct(callee),
                ..
            } = inst.kind
            else {
                continue;
            };
            if module.function(callee).is_declaration() {
                continue;
            }
            let contribution = ctx.construct_called_context(cache, &module, inst.id, callee);
            if let Some(w) = ctx.weights.get_mut(&inst.id) {
                *w = w.saturating_add(contribution);
            }
        }

        ctx.priorities = compute_priorities(&module, function, &ctx.weights);

        debug!(
            function = %module.function(function).name,
            root_priority = ctx.root_priority(),
            has_core_weight = ctx.has_core_weight,
            children = ctx.contexts.len(),
            "constructed NVM context"
        );
        ctx
    }

    /// Build (or fetch) the child context of `call`; returns its root priority
    ///
    /// Recursive activations contribute 0 and get their child lazily when stepped into.
    fn construct_called_context(
        &mut self,
        cache: &ContextCache,
        module: &KModule,
        call: InstId,
        callee: FunctionId,
    ) -> u64 {
        let child_state = cache.intern(self.value_state.do_call(call, callee));
        if cache.is_in_progress(callee, &child_state) {
            trace!(callee = %module.function(callee).name, "recursive call weighs 0");
            return 0;
        }
        let returns_nvm = self.value_state.may_point_to_nvm(call);
        let child = Self::construct(cache, callee, child_state, returns_nvm);
        let priority = child.root_priority();
        self.has_core_weight |= child.has_core_weight;
        self.contexts.insert(call, child);
        priority
    }

    pub fn function(&self) -> FunctionId {
        self.function
    }

    pub fn value_state(&self) -> &SharedValueDesc {
        &self.value_state
    }

    pub fn return_has_weight(&self) -> bool {
        self.return_has_weight
    }

    pub fn has_core_weight(&self) -> bool {
        self.has_core_weight
    }

    pub fn weight(&self, inst: InstId) -> Option<u64> {
        self.weights.get(&inst).copied()
    }

    pub fn priority(&self, inst: InstId) -> Option<u64> {
        self.priorities.get(&inst).copied()
    }

    pub fn weights(&self) -> &FxHashMap<InstId, u64> {
        &self.weights
    }

    pub fn priorities(&self) -> &FxHashMap<InstId, u64> {
        &self.priorities
    }

    pub fn child(&self, call: InstId) -> Option<&SharedContextDesc> {
        self.contexts.get(&call)
    }

    pub fn children(&self) -> impl Iterator<Item = (&InstId, &SharedContextDesc)> {
        self.contexts.iter()
    }

    fn module(&self) -> &KModule {
        self.value_state.module()
    }

    /// Priority of the entry block's first non-phi instruction
    pub fn root_priority(&self) -> u64 {
        self.module()
            .entry_first_non_phi(self.function)
            .and_then(|first| self.priority(first))
            .unwrap_or(u64::from(self.has_core_weight))
    }

    /// Copy of `self` with `child` installed at `call`, weights and priorities recomputed
    pub fn with_child(&self, call: InstId, child: SharedContextDesc) -> SharedContextDesc {
        let mut next = self.clone();
        let core = next.core_weights.get(&call).copied().unwrap_or(0);
        next.weights
            .insert(call, core.saturating_add(child.root_priority()));
        next.has_core_weight |= child.has_core_weight;
        next.contexts.insert(call, child);
        next.priorities = compute_priorities(self.module(), self.function, &next.weights);
        Arc::new(next)
    }

    /// Context execution moves to after stepping `pc`, landing on `next_pc`
    pub fn try_get_next_context(
        &self,
        cache: &ContextCache,
        pc: InstId,
        next_pc: InstId,
    ) -> NextContext {
        let module = self.module();
        let Some(inst) = module.instruction(pc) else {
            return NextContext::Same;
        };
        match inst.kind {
            InstKind::Call { .. } => {
                let Some(target) = module.instruction(next_pc).map(|i| i.function) else {
                    return NextContext::Same;
                };
                if target == self.function && module.first_instruction(target) != Some(next_pc) {
                    // external call or intrinsic, execution stays here
                    return NextContext::Same;
                }
                if let Some(child) = self.contexts.get(&pc) {
                    if child.function == target {
                        return NextContext::Enter(Arc::clone(child));
                    }
                }
                let child_state = self.value_state.do_call(pc, target);
                let returns_nvm = self.value_state.may_point_to_nvm(pc);
                NextContext::Enter(Self::construct(cache, target, child_state, returns_nvm))
            }
            InstKind::Ret { .. } => NextContext::Return,
            _ => NextContext::Same,
        }
    }

    /// Context after learning that `value` is (or is not) NVM
    pub fn try_update_context(
        self: &Arc<Self>,
        cache: &ContextCache,
        value: ValueId,
        is_nvm: bool,
    ) -> SharedContextDesc {
        let next_state = self.value_state.update(value, is_nvm);
        if Arc::ptr_eq(&next_state, &self.value_state) {
            return Arc::clone(self);
        }
        self.rebuild(cache, next_state)
    }

    /// Context of the same function under `next_state`
    ///
    /// Indirect call targets resolved in `self` are resolved again in the
    /// result, since construction only knows direct callees.
    pub fn rebuild(&self, cache: &ContextCache, next_state: SharedValueDesc) -> SharedContextDesc {
        let module = self.module();
        let mut resolved: Vec<(InstId, FunctionId)> = self
            .contexts
            .iter()
            .filter(|(call, _)| {
                matches!(
                    module.instruction(**call).map(|i| &i.kind),
                    Some(InstKind::Call {
                        callee: Callee::Indirect(_),
                        ..
                    })
                )
            })
            .map(|(call, child)| (*call, child.function))
            .collect();
        resolved.sort_unstable();

        let mut next = Self::construct(cache, self.function, next_state, self.return_has_weight);
        for (call, callee) in resolved {
            next = next.try_resolve_fn_ptr(cache, call, callee);
        }
        next
    }

    /// Context with the now-known target `callee` of the indirect call `call`
    pub fn try_resolve_fn_ptr(
        self: &Arc<Self>,
        cache: &ContextCache,
        call: InstId,
        callee: FunctionId,
    ) -> SharedContextDesc {
        if let Some(existing) = self.contexts.get(&call) {
            if existing.function == callee {
                return Arc::clone(self);
            }
        }
        if self.module().function(callee).is_declaration() {
            return Arc::clone(self);
        }
        let child_state = self.value_state.resolve_function_pointer(call, callee);
        let returns_nvm = self.value_state.may_point_to_nvm(call);
        let child = Self::construct(cache, callee, child_state, returns_nvm);
        self.with_child(call, child)
    }

    pub fn str(&self) -> String {
        let module = self.module();
        let mut out = format!(
            "NvmContextDesc {{ function: {}, root_priority: {}, return_has_weight: {}, has_core_weight: {} }}\n",
            module.function(self.function).name,
            self.root_priority(),
            self.return_has_weight,
            self.has_core_weight
        );
        for inst in module.instructions_of(self.function) {
            let weight = self.weight(inst.id).unwrap_or(0);
            let priority = self.priority(inst.id).unwrap_or(0);
            out.push_str(&format!(
                "  {:<40} weight={} priority={}\n",
                module.describe(inst.id),
                weight,
                priority
            ));
        }
        out
    }
}

impl fmt::Debug for NvmContextDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NvmContextDesc")
            .field("function", &self.function)
            .field("root_priority", &self.root_priority())
            .field("return_has_weight", &self.return_has_weight)
            .field("has_core_weight", &self.has_core_weight)
            .field("children", &self.contexts.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::nvm_heuristic::domain::value_desc::NvmValueDesc;
    use crate::features::nvm_heuristic::infrastructure::points_to_cache::PointsToCache;
    use crate::features::points_to::AndersenOracle;
    use crate::shared::models::ModuleBuilder;

    fn analysis(module: KModule) -> (Arc<KModule>, SharedValueDesc) {
        let module = Arc::new(module);
        let oracle = Arc::new(AndersenOracle::analyze(&module));
        let pts = Arc::new(PointsToCache::new(Arc::clone(&module), oracle));
        let vs = NvmValueDesc::static_state(pts, &["mmap".to_string(), "mmap64".to_string()]);
        (module, vs)
    }

    #[test]
    fn test_store_to_nvm_weighs_one() {
        let mut mb = ModuleBuilder::new("m");
        let mmap = mb.declare_function("mmap", &[]);
        let main = mb.declare_function("main", &[]);
        let c = mb.constant("c");
        let (p, st);
        {
            let mut fb = mb.define(main);
            p = fb.call("p", mmap, &[]);
            st = fb.store(c, p);
            fb.ret(None);
        }
        let (_module, vs) = analysis(mb.build().unwrap());
        let cache = ContextCache::new();
        let ctx = NvmContextDesc::construct(&cache, main, vs, false);

        assert_eq!(ctx.weight(p), Some(1));
        assert_eq!(ctx.weight(st), Some(1));
        assert_eq!(ctx.priority(st), Some(1));
        assert_eq!(ctx.root_priority(), 2);
        assert!(ctx.has_core_weight());
        assert!(ctx.str().contains("main"));
    }

    #[test]
    fn test_flush_and_fence_weights_are_local() {
        let mut mb = ModuleBuilder::new("m");
        let mmap = mb.declare_function("mmap", &[]);
        let clwb = mb.declare_function("clwb", &["addr"]);
        let sfence = mb.declare_function("sfence", &[]);
        let main = mb.declare_function("main", &[]);
        let (slot, m, flush_slot, flush_m, fence);
        {
            let mut fb = mb.define(main);
            slot = fb.alloca("slot");
            m = fb.call("m", mmap, &[]);
            flush_slot = fb.call("", clwb, &[slot]);
            flush_m = fb.call("", clwb, &[m]);
            fence = fb.call("", sfence, &[]);
            fb.ret(None);
        }
        let (_module, vs) = analysis(mb.build().unwrap());
        let cache = ContextCache::new();
        let ctx = NvmContextDesc::construct(&cache, main, vs, false);

        assert_eq!(ctx.weight(slot), Some(0));
        assert_eq!(ctx.weight(flush_slot), Some(0));
        assert_eq!(ctx.weight(flush_m), Some(1));
        // no store is pending, the fence still counts
        assert_eq!(ctx.weight(fence), Some(1));
        assert_eq!(ctx.priority(fence), Some(1));
        assert_eq!(ctx.priority(flush_m), Some(2));
        assert_eq!(ctx.root_priority(), 3);
    }

    #[test]
    fn test_equal_keys_share_context() {
        let mut mb = ModuleBuilder::new("m");
        let main = mb.declare_function("main", &[]);
        mb.define(main).ret(None);
        let (_module, vs) = analysis(mb.build().unwrap());
        let cache = ContextCache::new();

        let a = NvmContextDesc::construct(&cache, main, Arc::clone(&vs), false);
        let b = NvmContextDesc::construct(&cache, main, vs, false);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_callee_priority_flows_into_call_weight() {
        // writer(p) { *p = c }  main { m = mmap(); writer(m); ret }
        let mut mb = ModuleBuilder::new("m");
        let mmap = mb.declare_function("mmap", &[]);
        let writer = mb.declare_function("writer", &["p"]);
        let main = mb.declare_function("main", &[]);
        let c = mb.constant("c");
        let p = mb.param(writer, 0);
        {
            let mut fb = mb.define(writer);
            fb.store(c, p);
            fb.ret(None);
        }
        let call;
        {
            let mut fb = mb.define(main);
            let m = fb.call("m", mmap, &[]);
            call = fb.call("", writer, &[m]);
            fb.ret(None);
        }
        let (_module, vs) = analysis(mb.build().unwrap());
        let cache = ContextCache::new();
        let ctx = NvmContextDesc::construct(&cache, main, vs, false);

        let child = ctx.child(call).unwrap();
        assert_eq!(child.root_priority(), 1);
        assert_eq!(ctx.weight(call), Some(1));
        assert_eq!(ctx.priority(call), Some(1));
    }

    #[test]
    fn test_recursion_terminates() {
        // rec(p) { *p = c; rec(p); ret }
        let mut mb = ModuleBuilder::new("m");
        let mmap = mb.declare_function("mmap", &[]);
        let rec = mb.declare_function("rec", &["p"]);
        let main = mb.declare_function("main", &[]);
        let c = mb.constant("c");
        let p = mb.param(rec, 0);
        let inner;
        {
            let mut fb = mb.define(rec);
            fb.store(c, p);
            inner = fb.call("", rec, &[p]);
            fb.ret(None);
        }
        {
            let mut fb = mb.define(main);
            let m = fb.call("m", mmap, &[]);
            fb.call("", rec, &[m]);
            fb.ret(None);
        }
        let (_module, vs) = analysis(mb.build().unwrap());
        let cache = ContextCache::new();
        let ctx = NvmContextDesc::construct(&cache, main, vs, false);

        let rec_ctx = ctx.children().next().map(|(_, c)| Arc::clone(c)).unwrap();
        assert_eq!(rec_ctx.weight(inner), Some(0));
        assert!(rec_ctx.child(inner).is_none());
        assert_eq!(rec_ctx.root_priority(), 1);
    }
}
