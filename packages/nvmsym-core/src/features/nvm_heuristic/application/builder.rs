//! Heuristic construction
//!
//! One builder per run owns the shared pieces (points-to query cache, context
//! cache, initial value descriptor, static tables) and hands out a fresh
//! [`NvmHeuristic`] for every new thread.

use std::sync::Arc;
use tracing::info;

use super::dynamic_heuristic::NvmDynamicHeuristic;
use super::heuristic::NvmHeuristic;
use super::static_heuristic::NvmStaticHeuristic;
use crate::config::{ConfigError, HeuristicConfig, HeuristicKind};
use crate::errors::{NvmError, Result};
use crate::features::nvm_heuristic::domain::{NvmValueDesc, SharedValueDesc};
use crate::features::nvm_heuristic::infrastructure::{ContextCache, PointsToCache};
use crate::features::points_to::PointsToOracle;
use crate::shared::models::{FunctionId, KModule, ValueId};

pub struct NvmHeuristicBuilder {
    config: HeuristicConfig,
    points_to: Arc<PointsToCache>,
    contexts: Arc<ContextCache>,
    initial: SharedValueDesc,
    static_template: Option<NvmStaticHeuristic>,
}

impl NvmHeuristicBuilder {
    pub fn new(
        config: HeuristicConfig,
        module: Arc<KModule>,
        oracle: Arc<dyn PointsToOracle>,
    ) -> Result<Self> {
        config.validate()?;
        let points_to = Arc::new(PointsToCache::new(module, oracle));
        let mut builder = Self {
            initial: NvmValueDesc::static_state(Arc::clone(&points_to), &config.nvm_alloc_functions),
            config,
            points_to,
            contexts: Arc::new(ContextCache::new()),
            static_template: None,
        };
        builder.prepare();
        Ok(builder)
    }

    /// Treat `sites` as NVM allocation sites in addition to the configured functions
    pub fn with_annotated_sites(mut self, sites: impl IntoIterator<Item = ValueId>) -> Self {
        self.initial = NvmValueDesc::static_state_with_sites(
            Arc::clone(&self.points_to),
            &self.config.nvm_alloc_functions,
            sites,
        );
        self.prepare();
        self
    }

    fn prepare(&mut self) {
        self.initial = self.contexts.intern(Arc::clone(&self.initial));
        self.static_template = (self.config.kind == HeuristicKind::Static)
            .then(|| NvmStaticHeuristic::new(Arc::clone(&self.initial)));
        info!(
            kind = %self.config.kind,
            nvm_allocs = self.initial.nvm_allocs().len(),
            "NVM heuristic builder ready"
        );
    }

    pub fn kind(&self) -> HeuristicKind {
        self.config.kind
    }

    pub fn config(&self) -> &HeuristicConfig {
        &self.config
    }

    pub fn module(&self) -> &Arc<KModule> {
        self.points_to.module()
    }

    pub fn points_to(&self) -> &Arc<PointsToCache> {
        &self.points_to
    }

    pub fn context_cache(&self) -> &Arc<ContextCache> {
        &self.contexts
    }

    pub fn initial_state(&self) -> &SharedValueDesc {
        &self.initial
    }

    /// Fresh heuristic for a thread starting in `entry`
    pub fn create(&self, entry: FunctionId) -> Result<NvmHeuristic> {
        let module = self.module();
        let Some(func) = module.functions().get(entry.0 as usize) else {
            return Err(NvmError::UnknownFunction(entry.to_string()));
        };
        if func.is_declaration() {
            return Err(NvmError::UnknownFunction(format!("{} has no body", func.name)));
        }

        let heuristic = match self.config.kind {
            HeuristicKind::None => NvmHeuristic::None,
            HeuristicKind::Static => match &self.static_template {
                Some(template) => NvmHeuristic::Static(template.start_at(entry)),
                None => NvmHeuristic::Static(
                    NvmStaticHeuristic::new(Arc::clone(&self.initial)).start_at(entry),
                ),
            },
            HeuristicKind::Dynamic => NvmHeuristic::Dynamic(NvmDynamicHeuristic::new(
                Arc::clone(&self.contexts),
                entry,
                Arc::clone(&self.initial),
            )?),
            HeuristicKind::Invalid => return Err(ConfigError::InvalidHeuristic.into()),
        };

        if self.config.dump_on_construction {
            heuristic.dump();
        }
        Ok(heuristic)
    }

    pub fn create_for(&self, entry: &str) -> Result<NvmHeuristic> {
        let f = self
            .module()
            .function_by_name(entry)
            .ok_or_else(|| NvmError::UnknownFunction(entry.to_string()))?;
        self.create(f)
    }
}

impl std::fmt::Debug for NvmHeuristicBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NvmHeuristicBuilder")
            .field("config", &self.config)
            .field("contexts", &self.contexts)
            .finish()
    }
}
