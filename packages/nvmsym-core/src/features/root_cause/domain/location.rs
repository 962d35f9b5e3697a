//! Persistence bug locations
//!
//! A location is the tuple (allocation site, faulting instruction, call
//! stack, reason). Two reports of the same tuple are the same root cause no
//! matter which state produced them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::features::execution_state::ExecutionState;
use crate::shared::models::{FunctionId, InstId, ValueId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RootCauseReason {
    /// Store to NVM never made durable before the program ended
    #[serde(rename = "PM_Unpersisted")]
    Unpersisted,
    /// Flush of a line that was already persistent
    #[serde(rename = "PM_UnnecessaryFlush")]
    UnnecessaryFlush,
    /// Flush of a line that was never written
    #[serde(rename = "PM_FlushOnUnmodified")]
    FlushOnUnmodified,
}

impl RootCauseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RootCauseReason::Unpersisted => "PM_Unpersisted",
            RootCauseReason::UnnecessaryFlush => "PM_UnnecessaryFlush",
            RootCauseReason::FlushOnUnmodified => "PM_FlushOnUnmodified",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RootCauseReason::Unpersisted => "modification to persistent memory was never persisted",
            RootCauseReason::UnnecessaryFlush => "flush of an already persisted cache line",
            RootCauseReason::FlushOnUnmodified => "flush of an unmodified cache line",
        }
    }
}

impl fmt::Display for RootCauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type StackFingerprint = Vec<(Option<InstId>, FunctionId)>;

#[derive(Debug, Clone)]
pub struct RootCauseLocation {
    alloc_site: ValueId,
    inst: InstId,
    stack: StackFingerprint,
    reason: RootCauseReason,
    // rendered when the location is first seen; not part of identity
    inst_str: String,
    alloc_str: String,
    stack_str: String,
    masked_roots: BTreeSet<u64>,
}

impl RootCauseLocation {
    pub fn new(
        alloc_site: ValueId,
        inst: InstId,
        stack: StackFingerprint,
        reason: RootCauseReason,
    ) -> Self {
        Self {
            alloc_site,
            inst,
            stack,
            reason,
            inst_str: inst.to_string(),
            alloc_str: alloc_site.to_string(),
            stack_str: String::new(),
            masked_roots: BTreeSet::new(),
        }
    }

    /// Location of `pc` on the current thread of `state`
    pub fn at(state: &ExecutionState, alloc_site: ValueId, pc: InstId, reason: RootCauseReason) -> Self {
        let module = state.module();
        Self {
            inst_str: module.describe(pc),
            alloc_str: module.describe(alloc_site),
            stack_str: state.stack_string(),
            ..Self::new(alloc_site, pc, state.current_thread().stack_fingerprint(), reason)
        }
    }

    pub fn alloc_site(&self) -> ValueId {
        self.alloc_site
    }

    pub fn inst(&self) -> InstId {
        self.inst
    }

    pub fn stack(&self) -> &StackFingerprint {
        &self.stack
    }

    pub fn reason(&self) -> RootCauseReason {
        self.reason
    }

    pub fn add_masked_error(&mut self, id: u64) {
        self.masked_roots.insert(id);
    }

    pub fn masked_set(&self) -> &BTreeSet<u64> {
        &self.masked_roots
    }

    pub fn str(&self) -> String {
        let mut out = format!(
            "{} ({})\n  at {}\n  allocated at {}\n",
            self.reason,
            self.reason.description(),
            self.inst_str,
            self.alloc_str
        );
        if !self.stack_str.is_empty() {
            out.push_str("  stack:\n");
            for line in self.stack_str.lines() {
                out.push_str("    ");
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }
}

impl PartialEq for RootCauseLocation {
    fn eq(&self, other: &Self) -> bool {
        self.alloc_site == other.alloc_site
            && self.inst == other.inst
            && self.stack == other.stack
            && self.reason == other.reason
    }
}

impl Eq for RootCauseLocation {}

impl Hash for RootCauseLocation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.alloc_site.hash(state);
        self.inst.hash(state);
        self.stack.hash(state);
        self.reason.hash(state);
    }
}
