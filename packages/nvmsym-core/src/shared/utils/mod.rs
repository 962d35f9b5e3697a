//! Shared utilities

pub mod scc;

pub use scc::{tarjan_scc, SccResult, SccStats};
