//! Heuristic kinds
//!
//! The prioritization engine selected for every new thread.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeuristicKind {
    /// Every instruction has priority 0
    None,

    /// Whole-module weights under the initial value descriptor
    Static,

    /// Call-stack-sensitive contexts updated as the state executes
    Dynamic,

    /// Produced only by [`HeuristicKind::parse`] for unrecognised names
    Invalid,
}

impl HeuristicKind {
    /// Every name accepted by the parser
    pub const NAMES: [&'static str; 3] = ["none", "static", "dynamic"];

    /// Parse heuristic kind from string
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        match Self::parse(s) {
            Self::Invalid => Err(ConfigError::UnknownHeuristic(s.to_string())),
            kind => Ok(kind),
        }
    }

    /// Lenient parse: unknown names map to `Invalid`
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "none" => Self::None,
            "static" => Self::Static,
            "dynamic" => Self::Dynamic,
            _ => Self::Invalid,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Static => "static",
            Self::Dynamic => "dynamic",
            Self::Invalid => "invalid",
        }
    }

    /// One-line help text for the option
    pub fn explanation(&self) -> &'static str {
        match self {
            Self::None => "no NVM prioritization, every instruction has priority 0",
            Self::Static => "context-insensitive priorities computed once for the whole module",
            Self::Dynamic => "call-stack-sensitive priorities refined as NVM values are discovered",
            Self::Invalid => "unrecognised heuristic",
        }
    }
}

impl Default for HeuristicKind {
    fn default() -> Self {
        Self::Dynamic
    }
}

impl fmt::Display for HeuristicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
