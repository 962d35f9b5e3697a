//! Error types for nvmsym-core
//!
//! Provides unified error handling across the crate. Persistence bugs found in
//! the guest are *findings* (see `features::root_cause`) and never surface here;
//! faults raised by the POSIX model use `features::pmem_runtime::GuestFault`.

use thiserror::Error;

use crate::config::ConfigError;

/// Main error type for nvmsym-core operations
#[derive(Debug, Error)]
pub enum NvmError {
    /// Heuristic configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed module handed to the analysis
    #[error("Invalid module: {0}")]
    InvalidModule(String),

    /// A function required by the caller does not exist or has no body
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// `add_symbolic` was given an array whose name is already used by the state
    #[error("Array name '{0}' is already used in this state")]
    DuplicateArrayName(String),

    /// Analysis error
    #[error("Analysis error: {0}")]
    Analysis(String),
}

impl NvmError {
    /// Create an invalid-module error
    pub fn invalid_module(msg: impl Into<String>) -> Self {
        NvmError::InvalidModule(msg.into())
    }

    /// Create an analysis error
    pub fn analysis(msg: impl Into<String>) -> Self {
        NvmError::Analysis(msg.into())
    }
}

/// Result type alias for nvmsym operations
pub type Result<T> = std::result::Result<T, NvmError>;
