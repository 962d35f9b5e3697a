//! Configuration error types

use thiserror::Error;

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Range validation error
    #[error("Invalid range for field '{field}': {value} not in {min}..={max}. {hint}")]
    Range {
        field: String,
        value: String,
        min: String,
        max: String,
        hint: String,
    },

    /// Unknown heuristic name
    #[error("Unknown heuristic '{0}'. Valid heuristics: none, static, dynamic")]
    UnknownHeuristic(String),

    /// The parser produced `Invalid`, which cannot be instantiated
    #[error("Heuristic kind 'invalid' cannot be instantiated")]
    InvalidHeuristic,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

impl ConfigError {
    /// Create a range error with a hint
    pub fn range_with_hint(
        field: impl Into<String>,
        value: impl ToString,
        min: impl ToString,
        max: impl ToString,
        hint: impl Into<String>,
    ) -> Self {
        Self::Range {
            field: field.into(),
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
            hint: hint.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_formatting() {
        let err = ConfigError::range_with_hint(
            "page_size",
            100,
            512,
            2097152,
            "Page size must be a power of two",
        );

        let msg = err.to_string();
        assert!(msg.contains("page_size"));
        assert!(msg.contains("100"));
        assert!(msg.contains("512..=2097152"));
        assert!(msg.contains("power of two"));
    }

    #[test]
    fn test_unknown_heuristic_lists_choices() {
        let msg = ConfigError::UnknownHeuristic("fancy".to_string()).to_string();
        assert!(msg.contains("fancy"));
        assert!(msg.contains("none, static, dynamic"));
    }
}
