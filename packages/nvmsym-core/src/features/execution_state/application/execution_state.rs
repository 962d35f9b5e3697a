//! Symbolic execution state
//!
//! One path through the guest program: its threads and their stacks, the
//! address space, path constraints and symbolic inputs. Branching copies
//! everything a path owns and shares the analysis (points-to data, context
//! cache, root-cause manager) with the original.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::errors::{NvmError, Result};
use crate::features::execution_state::domain::expr::{ArrayRef, Expr, ExprRef};
use crate::features::execution_state::domain::memory::{MemoryObjectId, MemoryObjectRef, ObjectState};
use crate::features::execution_state::domain::thread::{StackFrame, Thread, ThreadId, ThreadUid, WaitListId};
use crate::features::execution_state::infrastructure::{AddressSpace, ConstraintManager, PTree, PTreeNodeId, StateId};
use crate::features::nvm_heuristic::NvmHeuristicBuilder;
use crate::features::root_cause::SharedRootCauseManager;
use crate::shared::models::{FunctionId, InstId, KModule, ValueId};

static NEXT_STATE_ID: AtomicU64 = AtomicU64::new(1);

fn fresh_state_id() -> StateId {
    StateId(NEXT_STATE_ID.fetch_add(1, Ordering::Relaxed))
}

#[derive(Debug, Clone)]
pub struct ExecutionState {
    id: StateId,
    heuristics: Arc<NvmHeuristicBuilder>,

    pub threads: BTreeMap<ThreadUid, Thread>,
    pub waiting_lists: BTreeMap<WaitListId, BTreeSet<ThreadUid>>,
    pub wlist_counter: WaitListId,
    current_thread: ThreadUid,

    pub state_time: u64,
    pub root_cause_mgr: SharedRootCauseManager,
    pub address_space: AddressSpace,
    pub constraints: ConstraintManager,
    pub query_cost: Duration,
    pub depth: u32,
    pub insts_since_cov_new: u32,
    pub covered_new: bool,
    pub fork_disabled: bool,
    /// Source file -> executed lines
    pub covered_lines: BTreeMap<String, BTreeSet<u32>>,
    pub ptree_node: Option<PTreeNodeId>,
    symbolics: Vec<(MemoryObjectRef, ArrayRef)>,
    pub persistent_objects: BTreeSet<MemoryObjectId>,
    array_names: BTreeSet<String>,
    stepped_instructions: u64,
}

impl ExecutionState {
    /// Initial state with a single thread entering `main`
    pub fn new(
        heuristics: Arc<NvmHeuristicBuilder>,
        main: FunctionId,
        root_cause_mgr: SharedRootCauseManager,
    ) -> Result<Self> {
        let nvm_info = heuristics.create(main)?;
        let module = Arc::clone(heuristics.module());
        let entry = entry_of(&module, main)?;
        let mut thread = Thread::new(ThreadUid::MAIN, entry, nvm_info);
        thread.stack.push(StackFrame::new(None, main, num_locals(&module, main)));

        Ok(Self {
            id: fresh_state_id(),
            heuristics,
            threads: BTreeMap::from([(ThreadUid::MAIN, thread)]),
            waiting_lists: BTreeMap::new(),
            wlist_counter: 1,
            current_thread: ThreadUid::MAIN,
            state_time: 0,
            root_cause_mgr,
            address_space: AddressSpace::new(),
            constraints: ConstraintManager::new(),
            query_cost: Duration::ZERO,
            depth: 0,
            insts_since_cov_new: 0,
            covered_new: false,
            fork_disabled: false,
            covered_lines: BTreeMap::new(),
            ptree_node: None,
            symbolics: Vec::new(),
            persistent_objects: BTreeSet::new(),
            array_names: BTreeSet::new(),
            stepped_instructions: 0,
        })
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn module(&self) -> &Arc<KModule> {
        self.heuristics.module()
    }

    pub fn heuristics(&self) -> &Arc<NvmHeuristicBuilder> {
        &self.heuristics
    }

    pub fn stepped_instructions(&self) -> u64 {
        self.stepped_instructions
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Forking and merging
    // ═══════════════════════════════════════════════════════════════════════

    /// Copy of this state one level deeper in the execution tree
    pub fn branch(&mut self) -> ExecutionState {
        self.depth += 1;
        let mut other = self.clone();
        other.id = fresh_state_id();
        other.ptree_node = None;
        other.covered_new = false;
        other
    }

    /// [`branch`](Self::branch) and record the fork in `tree`
    pub fn fork_into(&mut self, tree: &mut PTree) -> ExecutionState {
        let mut other = self.branch();
        if let Some(node) = self.ptree_node {
            let (left, right) = tree.attach(node, self.id, other.id);
            self.ptree_node = Some(left);
            other.ptree_node = Some(right);
        }
        other
    }

    /// Fold `other` into `self` under the disjunction of both path conditions
    ///
    /// Both states must stand at the same instruction in every thread with
    /// the same frames, symbolic inputs and bound objects. Returns false,
    /// leaving `self` untouched, otherwise.
    pub fn merge(&mut self, other: &ExecutionState) -> bool {
        if let Err(reason) = self.check_mergeable(other) {
            debug!(state = %self.id, other = %other.id, reason, "states not mergeable");
            return false;
        }

        let common: BTreeSet<ExprRef> = self
            .constraints
            .iter()
            .filter(|c| other.constraints.contains(c))
            .cloned()
            .collect();
        let suffix = |cm: &ConstraintManager| {
            cm.iter()
                .filter(|c| !common.contains(*c))
                .fold(Expr::bool(true), |acc, c| Expr::and(acc, Arc::clone(c)))
        };
        let in_self = suffix(&self.constraints);
        let in_other = suffix(&other.constraints);

        for (mine, theirs) in self.threads.values_mut().zip(other.threads.values()) {
            for (fa, fb) in mine.stack.iter_mut().zip(&theirs.stack) {
                for (ca, cb) in fa.locals.iter_mut().zip(&fb.locals) {
                    let merged = match (&ca.value, &cb.value) {
                        (Some(a), Some(b)) if a != b => {
                            Some(Expr::select(Arc::clone(&in_self), Arc::clone(a), Arc::clone(b)))
                        }
                        _ => None,
                    };
                    if merged.is_some() {
                        ca.value = merged;
                    }
                }
            }
        }

        self.address_space.merge(&other.address_space, &in_self);
        let mut constraints = ConstraintManager::from_constraints(common);
        constraints.add_constraint(Expr::or(in_self, in_other));
        self.constraints = constraints;
        true
    }

    fn check_mergeable(&self, other: &ExecutionState) -> std::result::Result<(), &'static str> {
        if self.current_thread != other.current_thread || self.threads.len() != other.threads.len() {
            return Err("different threads");
        }
        let same_threads = self
            .threads
            .iter()
            .zip(&other.threads)
            .all(|((ua, ta), (ub, tb))| ua == ub && ta.same_position(tb));
        if !same_threads {
            return Err("different pc or stack");
        }
        if self.symbolics != other.symbolics {
            return Err("different symbolic inputs");
        }
        if !self.address_space.same_objects(&other.address_space) {
            return Err("different memory objects");
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Symbolic inputs and constraints
    // ═══════════════════════════════════════════════════════════════════════

    pub fn add_symbolic(&mut self, object: MemoryObjectRef, array: ArrayRef) -> Result<()> {
        if !self.array_names.insert(array.name.clone()) {
            return Err(NvmError::DuplicateArrayName(array.name.clone()));
        }
        self.symbolics.push((object, array));
        Ok(())
    }

    /// `base`, or `base_N` with the smallest `N` not yet used in this state
    pub fn unique_array_name(&self, base: &str) -> String {
        if !self.array_names.contains(base) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{}_{}", base, n))
            .find(|name| !self.array_names.contains(name))
            .unwrap_or_else(|| base.to_string())
    }

    pub fn symbolics(&self) -> &[(MemoryObjectRef, ArrayRef)] {
        &self.symbolics
    }

    pub fn add_constraint(&mut self, e: ExprRef) {
        self.constraints.add_constraint(e);
    }

    pub fn mark_persistent(&mut self, object: MemoryObjectId) {
        self.persistent_objects.insert(object);
    }

    pub fn is_persistent(&self, object: MemoryObjectId) -> bool {
        self.persistent_objects.contains(&object)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Threads
    // ═══════════════════════════════════════════════════════════════════════

    pub fn current_thread_id(&self) -> ThreadUid {
        self.current_thread
    }

    pub fn current_thread(&self) -> &Thread {
        match self.threads.get(&self.current_thread) {
            Some(t) => t,
            None => panic!("current thread {} does not exist", self.current_thread),
        }
    }

    pub fn current_thread_mut(&mut self) -> &mut Thread {
        let uid = self.current_thread;
        match self.threads.get_mut(&uid) {
            Some(t) => t,
            None => panic!("current thread {} does not exist", uid),
        }
    }

    pub fn pc(&self) -> InstId {
        self.current_thread().pc
    }

    pub fn prev_pc(&self) -> InstId {
        self.current_thread().prev_pc
    }

    pub fn stack(&self) -> &[StackFrame] {
        &self.current_thread().stack
    }

    /// Start thread `tid` of the current process in `function`
    ///
    /// # Panics
    /// If the thread already exists.
    pub fn create_thread(&mut self, tid: ThreadId, function: FunctionId) -> Result<&mut Thread> {
        let uid = ThreadUid::new(self.current_thread.pid, tid);
        assert!(!self.threads.contains_key(&uid), "thread {} already exists", uid);

        let nvm_info = self.heuristics.create(function)?;
        let module = Arc::clone(self.heuristics.module());
        let mut thread = Thread::new(uid, entry_of(&module, function)?, nvm_info);
        thread.stack.push(StackFrame::new(None, function, num_locals(&module, function)));
        Ok(self.threads.entry(uid).or_insert(thread))
    }

    /// # Panics
    /// If `uid` is the current thread.
    pub fn terminate_thread(&mut self, uid: ThreadUid) -> bool {
        assert!(uid != self.current_thread, "cannot terminate the current thread {}", uid);
        let Some(thread) = self.threads.remove(&uid) else {
            return false;
        };
        if let Some(wlist) = thread.wlist {
            if let Some(set) = self.waiting_lists.get_mut(&wlist) {
                set.remove(&uid);
                if set.is_empty() {
                    self.waiting_lists.remove(&wlist);
                }
            }
        }
        true
    }

    /// Thread after `uid` in id order, wrapping around
    pub fn next_thread(&self, uid: ThreadUid) -> ThreadUid {
        self.threads
            .range((Excluded(uid), Unbounded))
            .next()
            .or_else(|| self.threads.iter().next())
            .map(|(k, _)| *k)
            .unwrap_or(uid)
    }

    /// # Panics
    /// If `uid` does not exist or is waiting.
    pub fn schedule_next(&mut self, uid: ThreadUid) {
        let thread = self.threads.get(&uid);
        assert!(thread.is_some(), "cannot schedule missing thread {}", uid);
        assert!(
            thread.map(|t| t.enabled).unwrap_or(false),
            "cannot schedule waiting thread {}",
            uid
        );
        self.current_thread = uid;
    }

    pub fn has_runnable_thread(&self) -> bool {
        self.threads.values().any(|t| t.enabled)
    }

    fn next_runnable(&self, after: ThreadUid) -> Option<ThreadUid> {
        self.threads
            .range((Excluded(after), Unbounded))
            .chain(self.threads.range(..=after))
            .find(|(_, t)| t.enabled)
            .map(|(k, _)| *k)
    }

    pub fn get_waiting_list(&mut self) -> WaitListId {
        let id = self.wlist_counter;
        self.wlist_counter += 1;
        id
    }

    /// Park the current thread on `wlist` and switch to the next runnable
    /// thread, if any
    pub fn sleep_thread(&mut self, wlist: WaitListId) {
        assert!(wlist > 0, "waiting list ids start at 1");
        let uid = self.current_thread;
        let thread = self.current_thread_mut();
        assert!(thread.enabled, "thread {} is already waiting", uid);
        thread.enabled = false;
        thread.wlist = Some(wlist);
        self.waiting_lists.entry(wlist).or_default().insert(uid);

        if let Some(next) = self.next_runnable(uid) {
            self.current_thread = next;
        }
    }

    pub fn notify_one(&mut self, wlist: WaitListId, uid: ThreadUid) -> bool {
        let Some(set) = self.waiting_lists.get_mut(&wlist) else {
            return false;
        };
        if !set.remove(&uid) {
            return false;
        }
        if set.is_empty() {
            self.waiting_lists.remove(&wlist);
        }
        if let Some(thread) = self.threads.get_mut(&uid) {
            assert_eq!(thread.wlist, Some(wlist), "thread {} waits elsewhere", uid);
            thread.enabled = true;
            thread.wlist = None;
        }
        true
    }

    pub fn notify_all(&mut self, wlist: WaitListId) -> usize {
        let Some(set) = self.waiting_lists.remove(&wlist) else {
            return 0;
        };
        for uid in &set {
            if let Some(thread) = self.threads.get_mut(uid) {
                thread.enabled = true;
                thread.wlist = None;
            }
        }
        set.len()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Frames
    // ═══════════════════════════════════════════════════════════════════════

    pub fn push_frame(&mut self, caller: InstId, function: FunctionId) {
        let locals = num_locals(self.heuristics.module(), function);
        self.current_thread_mut()
            .stack
            .push(StackFrame::new(Some(caller), function, locals));
    }

    /// Drop the innermost frame of the current thread and its stack objects
    ///
    /// # Panics
    /// If the stack is empty.
    pub fn pop_frame(&mut self) {
        let frame = self.current_thread_mut().stack.pop();
        let Some(frame) = frame else {
            panic!("pop_frame on an empty stack");
        };
        for object in &frame.allocas {
            self.address_space.unbind_object(object);
        }
    }

    /// Bind a stack object owned by the innermost frame
    pub fn bind_local(&mut self, object: MemoryObjectRef, contents: ObjectState) {
        self.address_space.bind_object(Arc::clone(&object), contents);
        if let Some(frame) = self.current_thread_mut().stack.last_mut() {
            frame.allocas.push(object);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Heuristic
    // ═══════════════════════════════════════════════════════════════════════

    pub fn current_priority(&self) -> u64 {
        self.current_thread().nvm_info.get_current_priority()
    }

    pub fn update_nvm_state(&mut self, pc: InstId, is_nvm: bool) {
        self.current_thread_mut().nvm_info.update_current_state(pc, is_nvm);
    }

    pub fn resolve_function_call(&mut self, pc: InstId, callee: FunctionId) {
        self.current_thread_mut().nvm_info.resolve_function_call(pc, callee);
    }

    pub fn is_important(&self, v: ValueId) -> bool {
        self.current_thread().nvm_info.is_important(v)
    }

    /// Advance the current thread to `next_pc`, keeping its heuristic and
    /// the line coverage in step
    pub fn step_instruction(&mut self, next_pc: InstId) {
        let module = Arc::clone(self.heuristics.module());
        let thread = self.current_thread_mut();
        let pc = thread.pc;
        thread.nvm_info.step_state(pc, next_pc);
        thread.prev_pc = pc;
        thread.pc = next_pc;
        self.stepped_instructions += 1;

        let newly_covered = module
            .instruction(pc)
            .and_then(|i| i.location.as_ref())
            .map(|loc| self.covered_lines.entry(loc.file.clone()).or_default().insert(loc.line))
            .unwrap_or(false);
        if newly_covered {
            self.covered_new = true;
            self.insts_since_cov_new = 0;
        } else {
            self.insts_since_cov_new += 1;
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Diagnostics
    // ═══════════════════════════════════════════════════════════════════════

    /// Call stack of the current thread, innermost frame first
    pub fn stack_string(&self) -> String {
        let module = self.module();
        let thread = self.current_thread();
        let mut out = String::new();
        let mut target = Some(thread.prev_pc);
        for (idx, frame) in thread.stack.iter().rev().enumerate() {
            let _ = write!(out, "#{:<4} in {}", idx, module.function(frame.function).name);
            if let Some(loc) = target
                .and_then(|t| module.instruction(t))
                .and_then(|i| i.location.as_ref())
            {
                let _ = write!(out, " at {}:{}", loc.file, loc.line);
            }
            out.push('\n');
            target = frame.caller;
        }
        out
    }

    pub fn constraints_string(&self) -> String {
        self.constraints.to_string()
    }
}

fn entry_of(module: &KModule, function: FunctionId) -> Result<InstId> {
    module
        .first_instruction(function)
        .ok_or_else(|| NvmError::UnknownFunction(format!("{} has no body", module.function(function).name)))
}

fn num_locals(module: &KModule, function: FunctionId) -> usize {
    module.function(function).params.len() + module.instructions_of(function).count()
}
