//! Static NVM heuristic
//!
//! Weights and priorities are computed once for the whole module under the
//! initial value descriptor, ignoring call stacks. Functions are processed
//! callee-first over the call graph's SCCs so a call weighs its callee's
//! entry priority; calls inside one SCC (recursion) weigh 0.
//!
//! The tables are shared between every state; only `curr` is per state.

use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::info;

use super::heuristic::HeuristicStats;
use crate::config::HeuristicKind;
use crate::features::nvm_heuristic::domain::{core_weight, SharedValueDesc};
use crate::features::nvm_heuristic::infrastructure::compute_priorities;
use crate::shared::models::{FunctionId, InstId, ValueId};
use crate::shared::utils::tarjan_scc;

#[derive(Debug, Clone)]
pub struct NvmStaticHeuristic {
    value_state: SharedValueDesc,
    weights: Arc<FxHashMap<InstId, u64>>,
    priorities: Arc<FxHashMap<InstId, u64>>,
    curr: Option<InstId>,
}

impl NvmStaticHeuristic {
    pub fn new(value_state: SharedValueDesc) -> Self {
        let module = Arc::clone(value_state.points_to_cache().module());
        let mut weights: FxHashMap<InstId, u64> = FxHashMap::default();
        for func in module.defined_functions() {
            for inst in module.instructions_of(func.id) {
                weights.insert(inst.id, core_weight(&value_state, &module, inst, false));
            }
        }

        let defined: Vec<FunctionId> = module.defined_functions().map(|f| f.id).collect();
        let call_graph = tarjan_scc(defined.iter().copied(), &module.call_graph_edges());

        let mut entry_priority: FxHashMap<FunctionId, u64> = FxHashMap::default();
        let mut priorities: FxHashMap<InstId, u64> = FxHashMap::default();

        // callees come first
        for component in &call_graph.components {
            for &f in component {
                for inst in module.instructions_of(f) {
                    let Some(callee) = module.called_function(inst.id) else {
                        continue;
                    };
                    if call_graph.same_component(f, callee) {
                        continue;
                    }
                    if let Some(&p) = entry_priority.get(&callee) {
                        if let Some(w) = weights.get_mut(&inst.id) {
                            *w = w.saturating_add(p);
                        }
                    }
                }
            }
            for &f in component {
                let local = compute_priorities(&module, f, &weights);
                let entry = module
                    .entry_first_non_phi(f)
                    .and_then(|i| local.get(&i).copied())
                    .unwrap_or(0);
                entry_priority.insert(f, entry);
                priorities.extend(local);
            }
        }

        Self {
            value_state,
            weights: Arc::new(weights),
            priorities: Arc::new(priorities),
            curr: None,
        }
    }

    /// Per-state copy sharing the tables, positioned at the start of `main`
    pub fn start_at(&self, main: FunctionId) -> Self {
        let mut state = self.clone();
        state.curr = self.value_state.module().first_instruction(main);
        state
    }

    pub fn current(&self) -> Option<InstId> {
        self.curr
    }

    pub fn value_state(&self) -> &SharedValueDesc {
        &self.value_state
    }

    pub fn weight(&self, inst: InstId) -> Option<u64> {
        self.weights.get(&inst).copied()
    }

    pub fn priority(&self, inst: InstId) -> Option<u64> {
        self.priorities.get(&inst).copied()
    }

    pub fn get_current_priority(&self) -> u64 {
        self.curr.and_then(|c| self.priority(c)).unwrap_or(0)
    }

    /// Static weights never change
    pub fn update_current_state(&mut self, _pc: InstId, _is_nvm: bool) {}

    pub fn resolve_function_call(&mut self, _pc: InstId, _callee: FunctionId) {}

    pub fn step_state(&mut self, _pc: InstId, next_pc: InstId) {
        self.curr = Some(next_pc);
    }

    pub fn needs_recomputation(&self) -> bool {
        false
    }

    /// Important values are not tracked statically
    pub fn is_important(&self, _v: ValueId) -> bool {
        false
    }

    pub fn stats(&self) -> HeuristicStats {
        HeuristicStats {
            kind: HeuristicKind::Static,
            instructions: self.weights.len(),
            weighted_instructions: self.weights.values().filter(|w| **w > 0).count(),
            prioritized_instructions: self.priorities.values().filter(|p| **p > 0).count(),
            stack_depth: 0,
            current_priority: self.get_current_priority(),
        }
    }

    pub fn dump(&self) {
        let stats = self.stats();
        info!(
            instructions = stats.instructions,
            weighted_percent = format!("{:.2}", stats.weighted_percent()),
            prioritized_percent = format!("{:.2}", stats.prioritized_percent()),
            "static NVM heuristic"
        );
    }
}
