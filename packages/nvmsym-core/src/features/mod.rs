//! Feature modules - each one follows the hexagonal layout
//!
//! - domain/         - plain data and pure logic
//! - ports/          - traits for collaborators
//! - application/    - use cases
//! - infrastructure/ - concrete implementations

pub mod execution_state;
pub mod nvm_heuristic;
pub mod pmem_runtime;
pub mod points_to;
pub mod root_cause;
