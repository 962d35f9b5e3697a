//! Deduplication and chaining of persistence bug reports
//!
//! Checker passes call [`RootCauseManager::get_id`] for every persistence
//! violation they observe. The manager is shared by all states of a run.

pub mod application;
pub mod domain;

pub use application::{BugReport, RootCauseManager, SharedRootCauseManager};
pub use domain::{RootCauseLocation, RootCauseReason, StackFingerprint};
