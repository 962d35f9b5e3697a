/*
 * nvmsym core - NVM-aware path prioritization
 *
 * Feature-First Hexagonal Architecture:
 * - shared/   : IR model (functions, blocks, instructions) and graph utils
 * - config/   : heuristic configuration (YAML)
 * - features/ : points_to → nvm_heuristic → execution_state → root_cause, pmem_runtime
 */

// Crate-level lint configuration
#![allow(clippy::too_many_arguments)] // mmap-shaped signatures
#![allow(clippy::type_complexity)]
#![allow(clippy::should_implement_trait)] // from_str naming intentional
#![allow(clippy::inherent_to_string)]
#![allow(clippy::new_without_default)]
#![allow(clippy::module_inception)] // execution_state::application::execution_state

pub mod config;
pub mod errors;
pub mod features;
pub mod shared;

pub use config::{ConfigError, HeuristicConfig, HeuristicKind};
pub use errors::{NvmError, Result};
pub use features::execution_state::ExecutionState;
pub use features::nvm_heuristic::{NvmHeuristic, NvmHeuristicBuilder};
pub use features::points_to::{AndersenOracle, PointsToOracle};
pub use features::root_cause::{RootCauseManager, RootCauseReason, SharedRootCauseManager};
