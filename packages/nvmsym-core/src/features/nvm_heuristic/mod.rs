//! NVM-aware instruction prioritization
//!
//! - `domain`: value descriptors (which values refer to NVM) and context
//!   descriptors (weights and priorities of one activation)
//! - `infrastructure`: query cache, context cache, priority computation
//! - `application`: the None / Static / Dynamic engines and their builder

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{
    HeuristicStats, NvmDynamicHeuristic, NvmHeuristic, NvmHeuristicBuilder, NvmStaticHeuristic,
};
pub use domain::{NextContext, NvmContextDesc, NvmValueDesc, SharedContextDesc, SharedValueDesc};
pub use infrastructure::{ContextCache, PointsToCache};
