pub mod builder;
pub mod dynamic_heuristic;
pub mod heuristic;
pub mod static_heuristic;

pub use builder::NvmHeuristicBuilder;
pub use dynamic_heuristic::NvmDynamicHeuristic;
pub use heuristic::{HeuristicStats, NvmHeuristic};
pub use static_heuristic::NvmStaticHeuristic;
