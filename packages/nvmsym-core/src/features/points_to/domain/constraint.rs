//! Points-to Analysis Constraints
//!
//! Four constraint types following Andersen's formulation:
//! - ALLOC: x = alloca / call ext / @g → x ⊇ {site}
//! - COPY:  x = y                      → x ⊇ y
//! - LOAD:  x = *y                     → x ⊇ *y
//! - STORE: *x = y                     → *x ⊇ y
//!
//! Indirect calls are not constraints; they are recorded as [`IndirectCall`]
//! and turned into COPY edges once the solver learns their targets.

use serde::{Deserialize, Serialize};

use crate::shared::models::{InstId, ValueId};

/// Solver node identifier
///
/// Values use their own index. The memory cell of abstract object `o`
/// uses `cell_base + o`, see `AndersenSolver::cell`.
pub type VarId = u32;

/// Constraint types for points-to analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// pts(lhs) ⊇ {rhs}
    Alloc,

    /// pts(lhs) ⊇ pts(rhs)
    Copy,

    /// ∀o ∈ pts(rhs): pts(lhs) ⊇ pts(*o)
    Load,

    /// ∀o ∈ pts(lhs): pts(*o) ⊇ pts(rhs)
    Store,
}

impl ConstraintKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintKind::Alloc => "ALLOC",
            ConstraintKind::Copy => "COPY",
            ConstraintKind::Load => "LOAD",
            ConstraintKind::Store => "STORE",
        }
    }
}

/// A single constraint in the points-to analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Constraint {
    pub kind: ConstraintKind,

    /// Destination (ALLOC/COPY/LOAD) or stored-through pointer (STORE)
    pub lhs: VarId,

    /// Allocation site (ALLOC), source (COPY/STORE) or loaded-from pointer (LOAD)
    pub rhs: VarId,
}

impl Constraint {
    #[inline]
    pub fn alloc(lhs: ValueId, site: ValueId) -> Self {
        Self {
            kind: ConstraintKind::Alloc,
            lhs: lhs.0,
            rhs: site.0,
        }
    }

    #[inline]
    pub fn copy(lhs: ValueId, rhs: ValueId) -> Self {
        Self {
            kind: ConstraintKind::Copy,
            lhs: lhs.0,
            rhs: rhs.0,
        }
    }

    /// x = *y
    #[inline]
    pub fn load(lhs: ValueId, ptr: ValueId) -> Self {
        Self {
            kind: ConstraintKind::Load,
            lhs: lhs.0,
            rhs: ptr.0,
        }
    }

    /// *x = y
    #[inline]
    pub fn store(ptr: ValueId, value: ValueId) -> Self {
        Self {
            kind: ConstraintKind::Store,
            lhs: ptr.0,
            rhs: value.0,
        }
    }

    #[inline]
    pub fn is_complex(&self) -> bool {
        matches!(self.kind, ConstraintKind::Load | ConstraintKind::Store)
    }
}

/// Call through a function pointer, resolved during solving
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndirectCall {
    pub call: InstId,
    pub fn_ptr: ValueId,
    pub args: Vec<ValueId>,
}

/// Constraint set with statistics
#[derive(Debug, Default)]
pub struct ConstraintSet {
    pub constraints: Vec<Constraint>,
    pub indirect_calls: Vec<IndirectCall>,

    pub alloc_count: usize,
    pub copy_count: usize,
    pub load_count: usize,
    pub store_count: usize,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constraint and update statistics
    pub fn add(&mut self, constraint: Constraint) {
        match constraint.kind {
            ConstraintKind::Alloc => self.alloc_count += 1,
            ConstraintKind::Copy => self.copy_count += 1,
            ConstraintKind::Load => self.load_count += 1,
            ConstraintKind::Store => self.store_count += 1,
        }
        self.constraints.push(constraint);
    }

    pub fn add_indirect_call(&mut self, call: IndirectCall) {
        self.indirect_calls.push(call);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn by_kind(&self, kind: ConstraintKind) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter().filter(move |c| c.kind == kind)
    }

    pub fn allocs(&self) -> impl Iterator<Item = &Constraint> {
        self.by_kind(ConstraintKind::Alloc)
    }

    pub fn copies(&self) -> impl Iterator<Item = &Constraint> {
        self.by_kind(ConstraintKind::Copy)
    }

    /// LOAD + STORE
    pub fn complex(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter().filter(|c| c.is_complex())
    }
}
