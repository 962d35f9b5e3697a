//! Shared data models

pub mod ir;

pub use ir::*;
