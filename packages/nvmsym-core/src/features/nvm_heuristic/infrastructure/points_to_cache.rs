//! Memoized allocation-site queries
//!
//! Shared by every value descriptor of a run. Insert-only: entries are never
//! invalidated because the oracle's answers never change.

use dashmap::DashMap;
use rustc_hash::FxHashSet;
use std::sync::Arc;

use crate::features::points_to::PointsToOracle;
use crate::shared::models::{KModule, ValueId};

pub struct PointsToCache {
    module: Arc<KModule>,
    oracle: Arc<dyn PointsToOracle>,
    /// Value → allocation sites it may refer to
    sites: DashMap<ValueId, Arc<FxHashSet<ValueId>>>,
}

impl PointsToCache {
    pub fn new(module: Arc<KModule>, oracle: Arc<dyn PointsToOracle>) -> Self {
        Self {
            module,
            oracle,
            sites: DashMap::new(),
        }
    }

    pub fn module(&self) -> &Arc<KModule> {
        &self.module
    }

    /// Allocation sites `v` may point to, asking the oracle on first use
    pub fn allocation_sites(&self, v: ValueId) -> Arc<FxHashSet<ValueId>> {
        if let Some(hit) = self.sites.get(&v) {
            return Arc::clone(&hit);
        }

        let sites: FxHashSet<ValueId> = self
            .oracle
            .points_to(v)
            .into_iter()
            .filter(|site| self.module.is_allocation_site(*site))
            .collect();

        Arc::clone(&self.sites.entry(v).or_insert_with(|| Arc::new(sites)))
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

impl std::fmt::Debug for PointsToCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointsToCache")
            .field("module", &self.module.name())
            .field("cached_queries", &self.sites.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::ModuleBuilder;
    use rustc_hash::FxHashMap;

    #[test]
    fn test_non_sites_filtered_and_memoized() {
        let mut mb = ModuleBuilder::new("m");
        let main = mb.declare_function("main", &[]);
        let c = mb.constant("c");
        let (a, l);
        {
            let mut fb = mb.define(main);
            a = fb.alloca("a");
            l = fb.load("l", a);
            fb.ret(None);
        }
        let module = Arc::new(mb.build().unwrap());

        let mut table: FxHashMap<ValueId, FxHashSet<ValueId>> = FxHashMap::default();
        table.insert(l, [a, c].into_iter().collect());
        let cache = PointsToCache::new(module, Arc::new(table));

        let first = cache.allocation_sites(l);
        assert_eq!(first.len(), 1);
        assert!(first.contains(&a));

        let second = cache.allocation_sites(l);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }
}
