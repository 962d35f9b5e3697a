//! Constraint generation from the IR

use rustc_hash::FxHashMap;

use crate::features::points_to::domain::constraint::{Constraint, ConstraintSet, IndirectCall};
use crate::shared::models::{Callee, FunctionId, InstKind, KModule, ValueId};

/// Collect ALLOC/COPY/LOAD/STORE constraints for every defined function
///
/// Calls to external declarations are allocation sites of their own result,
/// which is how `mmap` and friends hand out fresh objects.
pub fn generate_constraints(module: &KModule) -> ConstraintSet {
    let mut set = ConstraintSet::new();

    for &g in module.globals() {
        set.add(Constraint::alloc(g, g));
    }
    for f in module.functions() {
        set.add(Constraint::alloc(f.value, f.value));
    }

    let returns = return_values(module);

    for func in module.defined_functions() {
        for inst in module.instructions_of(func.id) {
            let id = inst.id;
            match &inst.kind {
                InstKind::Alloca => set.add(Constraint::alloc(id, id)),
                InstKind::Load { ptr } => set.add(Constraint::load(id, *ptr)),
                InstKind::Store { value, ptr } => set.add(Constraint::store(*ptr, *value)),
                InstKind::Gep { base, .. } => set.add(Constraint::copy(id, *base)),
                InstKind::Cast { src } => set.add(Constraint::copy(id, *src)),
                InstKind::Phi { incoming } => {
                    for (v, _) in incoming {
                        set.add(Constraint::copy(id, *v));
                    }
                }
                InstKind::Other { operands } => {
                    for v in operands {
                        set.add(Constraint::copy(id, *v));
                    }
                }
                InstKind::Call {
                    callee: Callee::Direct(target),
                    args,
                } => {
                    let callee = module.function(*target);
                    if callee.is_declaration() {
                        set.add(Constraint::alloc(id, id));
                    } else {
                        for (param, arg) in callee.params.iter().zip(args) {
                            set.add(Constraint::copy(*param, *arg));
                        }
                        for rv in returns.get(target).into_iter().flatten() {
                            set.add(Constraint::copy(id, *rv));
                        }
                    }
                }
                InstKind::Call {
                    callee: Callee::Indirect(fn_ptr),
                    args,
                } => set.add_indirect_call(IndirectCall {
                    call: id,
                    fn_ptr: *fn_ptr,
                    args: args.clone(),
                }),
                InstKind::Ret { .. } | InstKind::Br { .. } | InstKind::Unreachable => {}
            }
        }
    }

    set
}

/// Returned operands of each defined function
pub fn return_values(module: &KModule) -> FxHashMap<FunctionId, Vec<ValueId>> {
    let mut returns: FxHashMap<FunctionId, Vec<ValueId>> = FxHashMap::default();
    for func in module.defined_functions() {
        for inst in module.instructions_of(func.id) {
            if let InstKind::Ret { value: Some(v) } = inst.kind {
                returns.entry(func.id).or_default().push(v);
            }
        }
    }
    returns
}
