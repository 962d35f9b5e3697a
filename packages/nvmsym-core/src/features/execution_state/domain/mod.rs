pub mod expr;
pub mod memory;
pub mod thread;

pub use expr::{rewrite, Array, ArrayRef, Expr, ExprRef, ExprReplaceVisitor, ExprVisitor};
pub use memory::{MemoryObject, MemoryObjectId, MemoryObjectRef, ObjectState};
pub use thread::{Cell, ProcessId, StackFrame, Thread, ThreadId, ThreadUid, WaitListId};
