//! Per-path execution record
//!
//! - `domain`: expressions, memory objects, guest threads
//! - `infrastructure`: constraint store, address space, process tree
//! - `application`: [`ExecutionState`] itself

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::ExecutionState;
pub use domain::{
    Array, ArrayRef, Expr, ExprRef, MemoryObject, MemoryObjectId, MemoryObjectRef, ObjectState, StackFrame, Thread,
    ThreadUid, WaitListId,
};
pub use infrastructure::{AddressSpace, ConstraintManager, PTree, PTreeNodeId, StateId};
