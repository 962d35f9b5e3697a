//! Guest threads and their call stacks

use serde::{Deserialize, Serialize};
use std::fmt;

use super::expr::ExprRef;
use super::memory::MemoryObjectRef;
use crate::features::nvm_heuristic::NvmHeuristic;
use crate::shared::models::{FunctionId, InstId};

pub type ProcessId = u64;
pub type ThreadId = u64;
pub type WaitListId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadUid {
    pub pid: ProcessId,
    pub tid: ThreadId,
}

impl ThreadUid {
    pub const MAIN: ThreadUid = ThreadUid { pid: 1, tid: 0 };

    pub fn new(pid: ProcessId, tid: ThreadId) -> Self {
        Self { pid, tid }
    }
}

impl fmt::Display for ThreadUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.pid, self.tid)
    }
}

/// Register slot of a frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cell {
    pub value: Option<ExprRef>,
}

#[derive(Debug, Clone)]
pub struct StackFrame {
    /// Call instruction that created the frame; `None` for a thread's entry
    pub caller: Option<InstId>,
    pub function: FunctionId,
    pub locals: Vec<Cell>,
    /// Stack objects released when the frame is popped
    pub allocas: Vec<MemoryObjectRef>,
}

impl StackFrame {
    pub fn new(caller: Option<InstId>, function: FunctionId, num_locals: usize) -> Self {
        Self {
            caller,
            function,
            locals: vec![Cell::default(); num_locals],
            allocas: Vec::new(),
        }
    }

    /// Same call site and function
    pub fn same_shape(&self, other: &StackFrame) -> bool {
        self.caller == other.caller
            && self.function == other.function
            && self.locals.len() == other.locals.len()
    }
}

#[derive(Debug, Clone)]
pub struct Thread {
    pub uid: ThreadUid,
    pub pc: InstId,
    pub prev_pc: InstId,
    pub stack: Vec<StackFrame>,
    pub incoming_bb_index: u32,
    pub nvm_info: NvmHeuristic,
    /// False while the thread sits in a waiting list
    pub enabled: bool,
    pub wlist: Option<WaitListId>,
}

impl Thread {
    pub fn new(uid: ThreadUid, entry: InstId, nvm_info: NvmHeuristic) -> Self {
        Self {
            uid,
            pc: entry,
            prev_pc: entry,
            stack: Vec::new(),
            incoming_bb_index: 0,
            nvm_info,
            enabled: true,
            wlist: None,
        }
    }

    /// `(caller, function)` of every frame, outermost first
    pub fn stack_fingerprint(&self) -> Vec<(Option<InstId>, FunctionId)> {
        self.stack.iter().map(|f| (f.caller, f.function)).collect()
    }

    pub fn same_position(&self, other: &Thread) -> bool {
        self.pc == other.pc
            && self.stack.len() == other.stack.len()
            && self.stack.iter().zip(&other.stack).all(|(a, b)| a.same_shape(b))
    }
}
