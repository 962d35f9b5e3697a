//! Points-to analysis
//!
//! The NVM heuristic consumes aliasing facts through [`PointsToOracle`].
//! [`AndersenOracle`] is the reference implementation: an inclusion-based,
//! field-insensitive analysis over the IR with on-the-fly resolution of
//! indirect calls.
//!
//! ## References
//! - Andersen, L. O. "Program Analysis and Specialization for C" (PhD 1994)
//! - Hardekopf & Lin "The Ant and the Grasshopper" (PLDI 2007)

pub mod domain;
pub mod infrastructure;
pub mod ports;

pub use domain::constraint::{Constraint, ConstraintKind, ConstraintSet};
pub use infrastructure::andersen_solver::{AndersenConfig, AndersenOracle, AndersenSolver, AndersenStats};
pub use ports::PointsToOracle;
