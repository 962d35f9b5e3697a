//! The heuristic handle embedded in every thread

use serde::Serialize;

use super::dynamic_heuristic::NvmDynamicHeuristic;
use super::static_heuristic::NvmStaticHeuristic;
use crate::config::HeuristicKind;
use crate::shared::models::{FunctionId, InstId, ValueId};

/// Summary of the active weight table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeuristicStats {
    pub kind: HeuristicKind,
    pub instructions: usize,
    pub weighted_instructions: usize,
    pub prioritized_instructions: usize,
    pub stack_depth: usize,
    pub current_priority: u64,
}

impl HeuristicStats {
    fn none() -> Self {
        Self {
            kind: HeuristicKind::None,
            instructions: 0,
            weighted_instructions: 0,
            prioritized_instructions: 0,
            stack_depth: 0,
            current_priority: 0,
        }
    }

    pub fn weighted_percent(&self) -> f64 {
        percent(self.weighted_instructions, self.instructions)
    }

    pub fn prioritized_percent(&self) -> f64 {
        percent(self.prioritized_instructions, self.instructions)
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

#[derive(Debug, Clone)]
pub enum NvmHeuristic {
    None,
    Static(NvmStaticHeuristic),
    Dynamic(NvmDynamicHeuristic),
}

impl NvmHeuristic {
    pub fn kind(&self) -> HeuristicKind {
        match self {
            Self::None => HeuristicKind::None,
            Self::Static(_) => HeuristicKind::Static,
            Self::Dynamic(_) => HeuristicKind::Dynamic,
        }
    }

    pub fn get_current_priority(&self) -> u64 {
        match self {
            Self::None => 0,
            Self::Static(h) => h.get_current_priority(),
            Self::Dynamic(h) => h.get_current_priority(),
        }
    }

    /// `pc` allocated NVM, or wrote through a pointer that is (not) NVM
    pub fn update_current_state(&mut self, pc: InstId, is_nvm: bool) {
        match self {
            Self::None => {}
            Self::Static(h) => h.update_current_state(pc, is_nvm),
            Self::Dynamic(h) => h.update_current_state(pc, is_nvm),
        }
    }

    /// The indirect call `pc` was resolved to `callee`
    pub fn resolve_function_call(&mut self, pc: InstId, callee: FunctionId) {
        match self {
            Self::None => {}
            Self::Static(h) => h.resolve_function_call(pc, callee),
            Self::Dynamic(h) => h.resolve_function_call(pc, callee),
        }
    }

    /// The interpreter executed `pc` and will execute `next_pc` next
    pub fn step_state(&mut self, pc: InstId, next_pc: InstId) {
        match self {
            Self::None => {}
            Self::Static(h) => h.step_state(pc, next_pc),
            Self::Dynamic(h) => h.step_state(pc, next_pc),
        }
    }

    pub fn needs_recomputation(&self) -> bool {
        match self {
            Self::None | Self::Static(_) => false,
            Self::Dynamic(h) => h.needs_recomputation(),
        }
    }

    pub fn is_important(&self, v: ValueId) -> bool {
        match self {
            Self::None => false,
            Self::Static(h) => h.is_important(v),
            Self::Dynamic(h) => h.is_important(v),
        }
    }

    pub fn stats(&self) -> HeuristicStats {
        match self {
            Self::None => HeuristicStats::none(),
            Self::Static(h) => h.stats(),
            Self::Dynamic(h) => h.stats(),
        }
    }

    pub fn dump(&self) {
        match self {
            Self::None => tracing::info!("NVM heuristic disabled"),
            Self::Static(h) => h.dump(),
            Self::Dynamic(h) => h.dump(),
        }
    }
}
