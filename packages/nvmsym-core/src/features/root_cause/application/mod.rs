pub mod manager;

pub use manager::{BugReport, RootCauseManager, SharedRootCauseManager};
