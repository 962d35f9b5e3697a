pub mod location;

pub use location::{RootCauseLocation, RootCauseReason, StackFingerprint};
