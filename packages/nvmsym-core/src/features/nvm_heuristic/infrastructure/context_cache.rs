//! Process-wide context cache
//!
//! Maps `(function, value_state)` to the context built for it so equal keys
//! share one descriptor. Also interns value descriptors and tracks contexts
//! under construction, which is how recursion is cut.
//!
//! Insert-only. Locks are never held while a context is being built.

use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::features::nvm_heuristic::domain::context_desc::SharedContextDesc;
use crate::features::nvm_heuristic::domain::value_desc::SharedValueDesc;
use crate::shared::models::FunctionId;

#[derive(Clone)]
pub struct ContextKey {
    function: FunctionId,
    value_state: SharedValueDesc,
}

impl ContextKey {
    pub fn new(function: FunctionId, value_state: SharedValueDesc) -> Self {
        Self {
            function,
            value_state,
        }
    }
}

impl PartialEq for ContextKey {
    fn eq(&self, other: &Self) -> bool {
        self.function == other.function && *self.value_state == *other.value_state
    }
}

impl Eq for ContextKey {}

impl Hash for ContextKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.function.hash(state);
        state.write_u64(self.value_state.hash_value());
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextCacheStats {
    pub contexts: usize,
    pub value_states: usize,
    pub hits: usize,
    pub misses: usize,
}

#[derive(Default)]
pub struct ContextCache {
    contexts: RwLock<FxHashMap<ContextKey, SharedContextDesc>>,
    value_states: RwLock<FxHashMap<u64, Vec<SharedValueDesc>>>,
    in_progress: Mutex<FxHashSet<ContextKey>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl ContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical shared descriptor structurally equal to `value_state`
    pub fn intern(&self, value_state: SharedValueDesc) -> SharedValueDesc {
        let hash = value_state.hash_value();
        if let Some(found) = self
            .value_states
            .read()
            .get(&hash)
            .and_then(|bucket| bucket.iter().find(|vs| ***vs == *value_state))
        {
            return Arc::clone(found);
        }

        let mut states = self.value_states.write();
        let bucket = states.entry(hash).or_default();
        if let Some(found) = bucket.iter().find(|vs| ***vs == *value_state) {
            return Arc::clone(found);
        }
        bucket.push(Arc::clone(&value_state));
        value_state
    }

    pub fn lookup(&self, function: FunctionId, value_state: &SharedValueDesc) -> Option<SharedContextDesc> {
        let key = ContextKey::new(function, Arc::clone(value_state));
        let found = self.contexts.read().get(&key).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Insert `context` unless an equal key is present; returns the cached entry
    pub fn insert(&self, context: SharedContextDesc) -> SharedContextDesc {
        let key = ContextKey::new(context.function(), Arc::clone(context.value_state()));
        Arc::clone(self.contexts.write().entry(key).or_insert(context))
    }

    /// Mark `(function, value_state)` as under construction
    ///
    /// Returns false if it already is, i.e. the caller is a recursive activation.
    pub fn begin(&self, function: FunctionId, value_state: &SharedValueDesc) -> bool {
        self.in_progress
            .lock()
            .insert(ContextKey::new(function, Arc::clone(value_state)))
    }

    pub fn finish(&self, function: FunctionId, value_state: &SharedValueDesc) {
        self.in_progress
            .lock()
            .remove(&ContextKey::new(function, Arc::clone(value_state)));
    }

    pub fn is_in_progress(&self, function: FunctionId, value_state: &SharedValueDesc) -> bool {
        self.in_progress
            .lock()
            .contains(&ContextKey::new(function, Arc::clone(value_state)))
    }

    pub fn len(&self) -> usize {
        self.contexts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.read().is_empty()
    }

    pub fn stats(&self) -> ContextCacheStats {
        ContextCacheStats {
            contexts: self.len(),
            value_states: self.value_states.read().values().map(Vec::len).sum(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for ContextCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextCache")
            .field("stats", &self.stats())
            .finish()
    }
}
