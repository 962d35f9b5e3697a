//! NVM value descriptor
//!
//! Records, for one activation context, which allocation sites are NVM and
//! which values are known *not* to refer to NVM. A value may point to NVM iff
//! its allocation sites intersect `nvm_allocs` and it is in neither not-NVM
//! set.
//!
//! Descriptors are immutable and shared as [`SharedValueDesc`]; every
//! transition returns the receiver itself when nothing changed, so callers
//! can detect no-ops with `Arc::ptr_eq`.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::features::nvm_heuristic::infrastructure::points_to_cache::PointsToCache;
use crate::shared::models::{FunctionId, InstId, InstKind, Intrinsic, KModule, ValueId};

pub type SharedValueDesc = Arc<NvmValueDesc>;

#[derive(Clone)]
pub struct NvmValueDesc {
    points_to: Arc<PointsToCache>,
    nvm_allocs: BTreeSet<ValueId>,
    not_local_nvm: BTreeSet<ValueId>,
    not_global_nvm: BTreeSet<ValueId>,
}

impl NvmValueDesc {
    /// Initial descriptor: every call to an NVM allocation function is an NVM site
    pub fn static_state(points_to: Arc<PointsToCache>, alloc_functions: &[String]) -> SharedValueDesc {
        Self::static_state_with_sites(points_to, alloc_functions, std::iter::empty())
    }

    /// Initial descriptor plus user-annotated NVM allocation sites
    pub fn static_state_with_sites(
        points_to: Arc<PointsToCache>,
        alloc_functions: &[String],
        annotated: impl IntoIterator<Item = ValueId>,
    ) -> SharedValueDesc {
        let module = Arc::clone(points_to.module());
        let mut nvm_allocs: BTreeSet<ValueId> = module
            .defined_functions()
            .flat_map(|f| module.instructions_of(f.id))
            .filter(|inst| {
                module
                    .called_function(inst.id)
                    .map(|callee| alloc_functions.iter().any(|n| *n == module.function(callee).name))
                    .unwrap_or(false)
            })
            .map(|inst| inst.id)
            .collect();
        nvm_allocs.extend(annotated);

        Arc::new(Self {
            points_to,
            nvm_allocs,
            not_local_nvm: BTreeSet::new(),
            not_global_nvm: BTreeSet::new(),
        })
    }

    pub fn nvm_allocs(&self) -> &BTreeSet<ValueId> {
        &self.nvm_allocs
    }

    pub fn not_local_nvm(&self) -> &BTreeSet<ValueId> {
        &self.not_local_nvm
    }

    pub fn not_global_nvm(&self) -> &BTreeSet<ValueId> {
        &self.not_global_nvm
    }

    pub fn module(&self) -> &KModule {
        self.points_to.module()
    }

    pub fn points_to_cache(&self) -> &Arc<PointsToCache> {
        &self.points_to
    }

    pub fn may_point_to_nvm(&self, v: ValueId) -> bool {
        if self.not_local_nvm.contains(&v) || self.not_global_nvm.contains(&v) {
            return false;
        }
        let sites = self.points_to.allocation_sites(v);
        if sites.len() < self.nvm_allocs.len() {
            sites.iter().any(|s| self.nvm_allocs.contains(s))
        } else {
            self.nvm_allocs.iter().any(|s| sites.contains(s))
        }
    }

    /// `inst` is one of the NVM allocation sites of this descriptor
    pub fn is_nvm_alloc_call(&self, inst: InstId) -> bool {
        self.nvm_allocs.contains(&inst) && self.module().is_call(inst)
    }

    /// Store or cache-line flush whose pointer operand may refer to NVM
    pub fn may_modify_nvm(&self, inst: InstId) -> bool {
        let module = self.module();
        let Some(instruction) = module.instruction(inst) else {
            return false;
        };
        match &instruction.kind {
            InstKind::Store { ptr, .. } => self.may_point_to_nvm(*ptr),
            InstKind::Call { args, .. } if module.intrinsic_of(inst) == Some(Intrinsic::Flush) => {
                args.first().map(|p| self.may_point_to_nvm(*p)).unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Vararg tracking is disabled: no variadic argument is ever important
    pub fn is_important_va_arg(&self, _inst: InstId) -> bool {
        false
    }

    fn share(self: &Arc<Self>, next: Self) -> SharedValueDesc {
        if next == **self {
            Arc::clone(self)
        } else {
            Arc::new(next)
        }
    }

    /// Descriptor for the callee of `call`
    ///
    /// Formals whose actual argument cannot refer to NVM here start out in the
    /// callee's `not_local_nvm`; the caller's locals are out of scope.
    pub fn do_call(self: &Arc<Self>, call: InstId, callee: FunctionId) -> SharedValueDesc {
        let module = self.module();
        if !module.is_call(call) {
            return Arc::clone(self);
        }

        let not_local_nvm = module
            .function(callee)
            .params
            .iter()
            .zip(module.call_args(call))
            .filter(|(_, actual)| !self.may_point_to_nvm(**actual))
            .map(|(formal, _)| *formal)
            .collect();

        self.share(Self {
            points_to: Arc::clone(&self.points_to),
            nvm_allocs: self.nvm_allocs.clone(),
            not_local_nvm,
            not_global_nvm: self.not_global_nvm.clone(),
        })
    }

    /// Caller's descriptor after returning from the context described by `self`
    ///
    /// The caller adopts globals the callee proved volatile, and learns whether
    /// `dest` (the call) may refer to NVM from the returned operand of `ret`.
    pub fn do_return(&self, caller: &SharedValueDesc, ret: InstId, dest: InstId) -> SharedValueDesc {
        let mut next = (**caller).clone();
        next.not_global_nvm
            .extend(self.not_global_nvm.iter().copied());

        let returned = match self.module().instruction(ret).map(|i| &i.kind) {
            Some(InstKind::Ret { value }) => *value,
            _ => None,
        };
        if let Some(rv) = returned {
            if self.may_point_to_nvm(rv) {
                next.not_local_nvm.remove(&dest);
            } else {
                next.not_local_nvm.insert(dest);
            }
        }

        caller.share(next)
    }

    /// Record that `value` is (or is not) NVM
    ///
    /// For allocation-site calls this also adds or removes the site itself.
    pub fn update(self: &Arc<Self>, value: ValueId, is_nvm: bool) -> SharedValueDesc {
        let module = self.module();
        let mut next = (**self).clone();

        if module.is_call(value) {
            if is_nvm {
                next.nvm_allocs.insert(value);
            } else {
                next.nvm_allocs.remove(&value);
            }
        }

        let set = if module.is_global(value) {
            &mut next.not_global_nvm
        } else {
            &mut next.not_local_nvm
        };
        if is_nvm {
            set.remove(&value);
        } else {
            set.insert(value);
        }

        self.share(next)
    }

    /// Descriptor for a newly discovered indirect callee
    pub fn resolve_function_pointer(self: &Arc<Self>, call: InstId, callee: FunctionId) -> SharedValueDesc {
        self.do_call(call, callee)
    }

    /// Size-based hash, stable across descriptors sharing different caches
    pub fn hash_value(&self) -> u64 {
        ((self.not_local_nvm.len() as u64) << 16)
            | ((self.not_global_nvm.len() as u64) << 8)
            | self.nvm_allocs.len() as u64
    }

    pub fn str(&self) -> String {
        let module = self.module();
        let names = |set: &BTreeSet<ValueId>| {
            set.iter()
                .map(|v| module.value_name(*v).to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "NvmValueDesc {{ nvm_allocs: [{}], not_local_nvm: [{}], not_global_nvm: [{}] }}",
            names(&self.nvm_allocs),
            names(&self.not_local_nvm),
            names(&self.not_global_nvm)
        )
    }
}

impl PartialEq for NvmValueDesc {
    fn eq(&self, other: &Self) -> bool {
        self.nvm_allocs == other.nvm_allocs
            && self.not_local_nvm == other.not_local_nvm
            && self.not_global_nvm == other.not_global_nvm
    }
}

impl Eq for NvmValueDesc {}

impl Hash for NvmValueDesc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_value());
    }
}

impl fmt::Debug for NvmValueDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NvmValueDesc")
            .field("nvm_allocs", &self.nvm_allocs)
            .field("not_local_nvm", &self.not_local_nvm)
            .field("not_global_nvm", &self.not_global_nvm)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::points_to::AndersenOracle;
    use crate::shared::models::ModuleBuilder;

    struct Fixture {
        desc: SharedValueDesc,
        m: ValueId,
        a: ValueId,
        g: ValueId,
        call_f: InstId,
        f: FunctionId,
        x: ValueId,
        y: ValueId,
        f_ret: InstId,
    }

    /// main: m = mmap(); a = alloca; call f(m, a)   f(x, y) returns x
    fn fixture() -> Fixture {
        let mut mb = ModuleBuilder::new("vd");
        let mmap = mb.declare_function("mmap", &[]);
        let f = mb.declare_function("f", &["x", "y"]);
        let main = mb.declare_function("main", &[]);
        let g = mb.global("g");
        let x = mb.param(f, 0);
        let y = mb.param(f, 1);
        let f_ret = mb.define(f).ret(Some(x));
        let (m, a, call_f);
        {
            let mut fb = mb.define(main);
            m = fb.call("m", mmap, &[]);
            a = fb.alloca("a");
            call_f = fb.call("r", f, &[m, a]);
            fb.ret(None);
        }
        let module = Arc::new(mb.build().unwrap());
        let oracle = Arc::new(AndersenOracle::analyze(&module));
        let cache = Arc::new(PointsToCache::new(module, oracle));
        let desc = NvmValueDesc::static_state(cache, &["mmap".to_string()]);
        Fixture {
            desc,
            m,
            a,
            g,
            call_f,
            f,
            x,
            y,
            f_ret,
        }
    }

    #[test]
    fn test_static_state_seeds_alloc_calls() {
        let fx = fixture();
        assert!(fx.desc.nvm_allocs().contains(&fx.m));
        assert!(fx.desc.is_nvm_alloc_call(fx.m));
        assert!(fx.desc.not_local_nvm().is_empty());
        assert!(fx.desc.may_point_to_nvm(fx.m));
        assert!(!fx.desc.may_point_to_nvm(fx.a));
    }

    #[test]
    fn test_do_call_reseeds_formals() {
        let fx = fixture();
        let callee = fx.desc.do_call(fx.call_f, fx.f);
        assert!(!callee.not_local_nvm().contains(&fx.x));
        assert!(callee.not_local_nvm().contains(&fx.y));
        assert!(callee.may_point_to_nvm(fx.x));
        assert!(!callee.may_point_to_nvm(fx.y));
    }

    #[test]
    fn test_update_is_idempotent() {
        let fx = fixture();
        let once = fx.desc.update(fx.m, false);
        let twice = once.update(fx.m, false);
        assert!(Arc::ptr_eq(&once, &twice));
        assert!(!once.may_point_to_nvm(fx.m));
        assert!(!once.nvm_allocs().contains(&fx.m));

        let restored = once.update(fx.m, true);
        assert_eq!(*restored, *fx.desc);
    }

    #[test]
    fn test_update_global_uses_global_set() {
        let fx = fixture();
        let next = fx.desc.update(fx.g, false);
        assert!(next.not_global_nvm().contains(&fx.g));
        assert!(next.not_local_nvm().is_empty());
    }

    #[test]
    fn test_noop_update_returns_self() {
        let fx = fixture();
        let same = fx.desc.update(fx.a, true);
        assert!(Arc::ptr_eq(&same, &fx.desc));
    }

    #[test]
    fn test_do_return_marks_dest() {
        let fx = fixture();
        let callee = fx.desc.do_call(fx.call_f, fx.f);
        let after = callee.do_return(&fx.desc, fx.f_ret, fx.call_f);
        // returned x refers to the mmap region, so nothing changes for the caller
        assert!(Arc::ptr_eq(&after, &fx.desc));

        let volatile_callee = callee.update(fx.x, false);
        let after = volatile_callee.do_return(&fx.desc, fx.f_ret, fx.call_f);
        assert!(after.not_local_nvm().contains(&fx.call_f));
    }

    #[test]
    fn test_hash_formula() {
        let fx = fixture();
        let next = fx.desc.update(fx.a, false).update(fx.g, false);
        assert_eq!(next.hash_value(), (1 << 16) | (1 << 8) | 1);
    }
}
