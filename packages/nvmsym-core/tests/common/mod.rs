//! Common test utilities for nvmsym-core
//!
//! IR fixtures for the heuristic scenarios, builders for heuristics and
//! states, and a persistence checker that records what it was asked.

#![allow(dead_code)]

mod builders;
mod fixtures;

pub use builders::*;
pub use fixtures::*;
