//! Root-cause bookkeeping
//!
//! Assigns stable ids to persistence bug locations, counts how often each
//! one is hit and records which earlier root causes a report may be masking.
//! Ids start at 1 and are never handed out twice, not even after `clear`.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::features::execution_state::ExecutionState;
use crate::features::root_cause::domain::{RootCauseLocation, RootCauseReason};
use crate::shared::models::{InstId, ValueId};

pub type SharedRootCauseManager = Arc<Mutex<RootCauseManager>>;

#[derive(Debug, Clone)]
struct RootCauseInfo {
    root_cause: RootCauseLocation,
    occurrences: u64,
}

/// One buggy root cause as reported in summaries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BugReport {
    pub id: u64,
    pub reason: RootCauseReason,
    pub occurrences: u64,
    pub masked: Vec<u64>,
    pub location: String,
}

#[derive(Debug)]
pub struct RootCauseManager {
    next_id: u64,
    root_to_id: FxHashMap<RootCauseLocation, u64>,
    id_to_root: BTreeMap<u64, RootCauseInfo>,
    total_occurrences: u64,
    buggy_ids: BTreeSet<u64>,
}

impl Default for RootCauseManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RootCauseManager {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            root_to_id: FxHashMap::default(),
            id_to_root: BTreeMap::new(),
            total_occurrences: 0,
            buggy_ids: BTreeSet::new(),
        }
    }

    pub fn shared() -> SharedRootCauseManager {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Id of `location`, registering it on first sight; every call counts as
    /// one occurrence
    pub fn get_id_for(&mut self, location: RootCauseLocation) -> u64 {
        self.total_occurrences += 1;
        if let Some(&id) = self.root_to_id.get(&location) {
            if let Some(info) = self.id_to_root.get_mut(&id) {
                info.occurrences += 1;
            }
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        debug!(id, reason = %location.reason(), "new root cause");
        self.root_to_id.insert(location.clone(), id);
        self.id_to_root.insert(
            id,
            RootCauseInfo {
                root_cause: location,
                occurrences: 1,
            },
        );
        id
    }

    pub fn get_id(
        &mut self,
        state: &ExecutionState,
        alloc_site: ValueId,
        pc: InstId,
        reason: RootCauseReason,
    ) -> u64 {
        self.get_id_for(RootCauseLocation::at(state, alloc_site, pc, reason))
    }

    /// As [`get_id`](Self::get_id), also recording that this location may
    /// mask the root causes in `masked_ids`
    pub fn get_id_with_masked(
        &mut self,
        state: &ExecutionState,
        alloc_site: ValueId,
        pc: InstId,
        reason: RootCauseReason,
        masked_ids: &BTreeSet<u64>,
    ) -> u64 {
        let id = self.get_id(state, alloc_site, pc, reason);
        self.add_masked(id, masked_ids.iter().copied());
        id
    }

    pub fn add_masked(&mut self, id: u64, masked_ids: impl IntoIterator<Item = u64>) {
        if let Some(info) = self.id_to_root.get_mut(&id) {
            for m in masked_ids {
                info.root_cause.add_masked_error(m);
            }
        }
    }

    pub fn mark_as_bug(&mut self, id: u64) -> bool {
        if !self.id_to_root.contains_key(&id) {
            warn!(id, "mark_as_bug on an unknown root cause id");
            return false;
        }
        self.buggy_ids.insert(id)
    }

    pub fn is_bug(&self, id: u64) -> bool {
        self.buggy_ids.contains(&id)
    }

    pub fn get(&self, id: u64) -> Option<&RootCauseLocation> {
        self.id_to_root.get(&id).map(|info| &info.root_cause)
    }

    pub fn occurrences(&self, id: u64) -> Option<u64> {
        self.id_to_root.get(&id).map(|info| info.occurrences)
    }

    pub fn total_occurrences(&self) -> u64 {
        self.total_occurrences
    }

    pub fn len(&self) -> usize {
        self.id_to_root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_root.is_empty()
    }

    /// Every id reachable from `id` through masked sets
    pub fn masked_closure(&self, id: u64) -> BTreeSet<u64> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(info) = self.id_to_root.get(&current) else {
                continue;
            };
            for &m in info.root_cause.masked_set() {
                if seen.insert(m) {
                    stack.push(m);
                }
            }
        }
        seen
    }

    pub fn get_root_cause_string(&self, id: u64) -> String {
        let Some(info) = self.id_to_root.get(&id) else {
            return format!("<unknown root cause #{}>", id);
        };
        let mut out = format!("Root cause #{}: {}", id, info.root_cause.str());
        let masked = self.masked_closure(id);
        if !masked.is_empty() {
            let ids: Vec<String> = masked.iter().map(|m| format!("#{}", m)).collect();
            let _ = writeln!(out, "  may mask: {}", ids.join(", "));
        }
        out
    }

    pub fn bug_reports(&self) -> Vec<BugReport> {
        self.buggy_ids
            .iter()
            .filter_map(|id| {
                self.id_to_root.get(id).map(|info| BugReport {
                    id: *id,
                    reason: info.root_cause.reason(),
                    occurrences: info.occurrences,
                    masked: self.masked_closure(*id).into_iter().collect(),
                    location: info.root_cause.str(),
                })
            })
            .collect()
    }

    /// Report of every buggy root cause, ordered by id
    pub fn get_summary(&self) -> String {
        let reports = self.bug_reports();
        let mut out = format!(
            "Found {} unique bug(s) among {} root cause(s), {} occurrence(s) in total\n",
            reports.len(),
            self.id_to_root.len(),
            self.total_occurrences
        );
        for r in &reports {
            let _ = write!(
                out,
                "\n[Bug #{}] {} occurrence(s)\n{}",
                r.id, r.occurrences, r.location
            );
            if r.masked.is_empty() {
                out.push_str("  masked root causes: none\n");
            } else {
                let ids: Vec<String> = r.masked.iter().map(|m| format!("#{}", m)).collect();
                let _ = writeln!(out, "  masked root causes: {}", ids.join(", "));
            }
        }
        out
    }

    pub fn summary_json(&self) -> serde_json::Value {
        json!({
            "root_causes": self.id_to_root.len(),
            "total_occurrences": self.total_occurrences,
            "bugs": self.bug_reports(),
        })
    }

    pub fn str(&self) -> String {
        let mut out = format!(
            "RootCauseManager: {} root cause(s), {} occurrence(s)\n",
            self.id_to_root.len(),
            self.total_occurrences
        );
        for (id, info) in &self.id_to_root {
            let _ = writeln!(
                out,
                "  #{} x{}{} {}",
                id,
                info.occurrences,
                if self.buggy_ids.contains(id) { " [bug]" } else { "" },
                info.root_cause.reason()
            );
        }
        out
    }

    /// Forget every location; ids and the total occurrence count keep increasing
    pub fn clear(&mut self) {
        self.root_to_id.clear();
        self.id_to_root.clear();
        self.buggy_ids.clear();
    }
}
