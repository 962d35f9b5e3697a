//! Builders for heuristics, states and the POSIX model

use nvmsym_core::config::{HeuristicConfig, HeuristicKind};
use nvmsym_core::features::execution_state::ExecutionState;
use nvmsym_core::features::nvm_heuristic::NvmHeuristicBuilder;
use nvmsym_core::features::pmem_runtime::{InMemoryHost, MmanModel, PersistenceChecker};
use nvmsym_core::features::points_to::AndersenOracle;
use nvmsym_core::features::root_cause::{RootCauseManager, SharedRootCauseManager};
use nvmsym_core::shared::models::KModule;
use std::sync::Arc;

pub const PAGE: u64 = 4096;
pub const PMEM_BASE: u64 = 0x20_0000;

pub fn heuristic_builder(module: &Arc<KModule>, kind: HeuristicKind) -> Arc<NvmHeuristicBuilder> {
    let oracle = Arc::new(AndersenOracle::analyze(module));
    let builder = NvmHeuristicBuilder::new(HeuristicConfig::new(kind), Arc::clone(module), oracle).unwrap();
    Arc::new(builder)
}

pub fn state_for(module: &Arc<KModule>, kind: HeuristicKind) -> (ExecutionState, SharedRootCauseManager) {
    let builder = heuristic_builder(module, kind);
    let main = module.function_by_name("main").unwrap();
    let mgr = RootCauseManager::shared();
    let state = ExecutionState::new(builder, main, Arc::clone(&mgr)).unwrap();
    (state, mgr)
}

/// Records every page handed to `check_persisted`
#[derive(Debug, Default)]
pub struct RecordingChecker {
    pub volatile_pages: Vec<u64>,
    pub checked: Vec<u64>,
}

impl PersistenceChecker for RecordingChecker {
    fn is_pmem(&self, address: u64, _length: u64) -> bool {
        !self.volatile_pages.contains(&address)
    }

    fn check_persisted(&mut self, address: u64, _length: u64) {
        self.checked.push(address);
    }
}

/// Model with a persistent file of `pages` pages opened at [`PMEM_BASE`]
pub fn pmem_model(pages: u64) -> (MmanModel<InMemoryHost, RecordingChecker>, i32) {
    let mut model = MmanModel::new(PAGE, InMemoryHost::new(PAGE), RecordingChecker::default());
    let fd = model.open_pmem_file("pmem.img", PMEM_BASE, pages * PAGE);
    (model, fd)
}
