//! Heuristic configuration
//!
//! YAML-backed settings with range validation:
//! - `HeuristicKind`: which prioritization engine to build (None/Static/Dynamic)
//! - `HeuristicConfig`: kind, NVM allocation entry points, page size

pub mod error;
pub mod heuristic_config;
pub mod heuristic_kind;

pub use error::{ConfigError, ConfigResult};
pub use heuristic_config::HeuristicConfig;
pub use heuristic_kind::HeuristicKind;
