//! Port consumed by the NVM heuristic

use rustc_hash::{FxHashMap, FxHashSet};

use crate::shared::models::ValueId;

/// Whole-program may-point-to information
///
/// `points_to(v)` returns every value that may be the abstract object `v`
/// refers to. Callers filter the result down to allocation sites.
pub trait PointsToOracle: Send + Sync {
    fn points_to(&self, v: ValueId) -> FxHashSet<ValueId>;
}

/// Fixed table, handy when the facts are known up front
impl PointsToOracle for FxHashMap<ValueId, FxHashSet<ValueId>> {
    fn points_to(&self, v: ValueId) -> FxHashSet<ValueId> {
        self.get(&v).cloned().unwrap_or_default()
    }
}
