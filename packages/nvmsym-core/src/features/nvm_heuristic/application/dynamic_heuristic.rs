//! Dynamic NVM heuristic
//!
//! Follows one thread through the program with a stack of contexts that
//! mirrors its call stack. Discovering that a value is (or is not) NVM, or
//! the target of an indirect call, replaces the top context; the new root
//! priority is then pushed into the parents' call-site weights.

use std::sync::Arc;
use tracing::info;
#[cfg(feature = "trace")]
use tracing::trace;

use super::heuristic::HeuristicStats;
use crate::config::HeuristicKind;
use crate::errors::{NvmError, Result};
use crate::features::nvm_heuristic::domain::{NextContext, NvmContextDesc, SharedContextDesc, SharedValueDesc};
use crate::features::nvm_heuristic::infrastructure::ContextCache;
use crate::shared::models::{FunctionId, InstId, InstKind, Intrinsic, ValueId};

#[derive(Debug, Clone)]
pub struct NvmDynamicHeuristic {
    cache: Arc<ContextCache>,
    /// Never empty; the last entry is the active context
    contexts: Vec<SharedContextDesc>,
    /// `call_sites[i]` is the call in `contexts[i]` that entered `contexts[i + 1]`
    call_sites: Vec<InstId>,
    curr: InstId,
}

impl NvmDynamicHeuristic {
    pub fn new(cache: Arc<ContextCache>, main: FunctionId, initial: SharedValueDesc) -> Result<Self> {
        let module = Arc::clone(initial.points_to_cache().module());
        let curr = module.first_instruction(main).ok_or_else(|| {
            NvmError::UnknownFunction(format!("{} has no body", module.function(main).name))
        })?;
        let root = NvmContextDesc::construct(&cache, main, initial, false);
        Ok(Self {
            cache,
            contexts: vec![root],
            call_sites: Vec::new(),
            curr,
        })
    }

    fn top(&self) -> &SharedContextDesc {
        &self.contexts[self.contexts.len() - 1]
    }

    pub fn current_context(&self) -> &SharedContextDesc {
        self.top()
    }

    pub fn current(&self) -> InstId {
        self.curr
    }

    pub fn depth(&self) -> usize {
        self.contexts.len()
    }

    pub fn try_current_priority(&self) -> Result<u64> {
        let top = self.top();
        top.priority(self.curr).ok_or_else(|| {
            let module = top.value_state().module();
            NvmError::analysis(format!(
                "current instruction {} is not part of the active context {}",
                module.describe(self.curr),
                module.function(top.function()).name
            ))
        })
    }

    /// Priority of the current instruction
    ///
    /// # Panics
    /// If the current instruction does not belong to the active context.
    pub fn get_current_priority(&self) -> u64 {
        match self.try_current_priority() {
            Ok(p) => p,
            Err(e) => panic!("NVM heuristic out of sync with the interpreter: {e}"),
        }
    }

    /// Value whose NVM-ness an event at `pc` is about
    fn nvm_operand(&self, pc: InstId) -> Option<ValueId> {
        let module = self.top().value_state().module();
        let inst = module.instruction(pc)?;
        match &inst.kind {
            InstKind::Store { ptr, .. } | InstKind::Load { ptr } => Some(*ptr),
            InstKind::Call { args, .. } if module.intrinsic_of(pc) == Some(Intrinsic::Flush) => {
                args.first().copied()
            }
            _ => Some(pc),
        }
    }

    pub fn update_current_state(&mut self, pc: InstId, is_nvm: bool) {
        let Some(value) = self.nvm_operand(pc) else {
            return;
        };
        let top = Arc::clone(self.top());
        let next = top.try_update_context(&self.cache, value, is_nvm);
        if !Arc::ptr_eq(&next, &top) {
            self.replace_top(next);
        }
    }

    pub fn resolve_function_call(&mut self, pc: InstId, callee: FunctionId) {
        let top = Arc::clone(self.top());
        let next = top.try_resolve_fn_ptr(&self.cache, pc, callee);
        if !Arc::ptr_eq(&next, &top) {
            self.replace_top(next);
        }
    }

    pub fn step_state(&mut self, pc: InstId, next_pc: InstId) {
        let next = self.top().try_get_next_context(&self.cache, pc, next_pc);
        match next {
            NextContext::Same => {}
            NextContext::Enter(child) => {
                #[cfg(feature = "trace")]
                trace!(call = pc.0, depth = self.contexts.len() + 1, "enter context");
                self.call_sites.push(pc);
                self.contexts.push(child);
            }
            NextContext::Return => self.return_to_caller(pc),
        }
        self.curr = next_pc;
    }

    fn return_to_caller(&mut self, ret: InstId) {
        if self.contexts.len() < 2 {
            return;
        }
        let (Some(callee), Some(call)) = (self.contexts.pop(), self.call_sites.pop()) else {
            return;
        };
        #[cfg(feature = "trace")]
        trace!(call = call.0, depth = self.contexts.len(), "leave context");

        let caller = Arc::clone(self.top());
        let next_state = callee
            .value_state()
            .do_return(caller.value_state(), ret, call);
        if !Arc::ptr_eq(&next_state, caller.value_state()) {
            let next = caller.rebuild(&self.cache, next_state);
            self.replace_top(next);
        }
    }

    fn replace_top(&mut self, context: SharedContextDesc) {
        let last = self.contexts.len() - 1;
        self.contexts[last] = context;
        self.propagate_to_parents();
    }

    /// Push the active context's root priority up the stack, stopping at the
    /// first parent whose priorities do not move
    fn propagate_to_parents(&mut self) {
        for j in (0..self.contexts.len() - 1).rev() {
            let call = self.call_sites[j];
            let child = Arc::clone(&self.contexts[j + 1]);
            let parent = Arc::clone(&self.contexts[j]);
            if parent.child(call).map(|c| Arc::ptr_eq(c, &child)).unwrap_or(false) {
                break;
            }
            let updated = parent.with_child(call, child);
            let unchanged = updated.weight(call) == parent.weight(call)
                && updated.root_priority() == parent.root_priority();
            self.contexts[j] = updated;
            if unchanged {
                break;
            }
        }
    }

    /// Priorities are kept current on every event, never recomputed in bulk
    pub fn needs_recomputation(&self) -> bool {
        false
    }

    /// `v` may refer to NVM in the active context
    pub fn is_important(&self, v: ValueId) -> bool {
        self.top().value_state().may_point_to_nvm(v)
    }

    pub fn stats(&self) -> HeuristicStats {
        let top = self.top();
        HeuristicStats {
            kind: HeuristicKind::Dynamic,
            instructions: top.weights().len(),
            weighted_instructions: top.weights().values().filter(|w| **w > 0).count(),
            prioritized_instructions: top.priorities().values().filter(|p| **p > 0).count(),
            stack_depth: self.contexts.len(),
            current_priority: self.try_current_priority().unwrap_or(0),
        }
    }

    pub fn dump(&self) {
        let stats = self.stats();
        let top = self.top();
        info!(
            function = %top.value_state().module().function(top.function()).name,
            depth = stats.stack_depth,
            instructions = stats.instructions,
            weighted_percent = format!("{:.2}", stats.weighted_percent()),
            prioritized_percent = format!("{:.2}", stats.prioritized_percent()),
            cache = ?self.cache.stats(),
            "dynamic NVM heuristic"
        );
    }
}
