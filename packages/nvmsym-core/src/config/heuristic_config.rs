//! Heuristic configuration loaded from YAML

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::{ConfigError, ConfigResult};
use super::heuristic_kind::HeuristicKind;

const MIN_PAGE_SIZE: usize = 512;
const MAX_PAGE_SIZE: usize = 1 << 21;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeuristicConfig {
    /// Engine built for each new thread
    pub kind: HeuristicKind,

    /// Functions whose call sites allocate NVM
    pub nvm_alloc_functions: Vec<String>,

    /// Page granularity of the persistent-memory model
    pub page_size: usize,

    /// Log the heuristic's statistics right after it is built
    pub dump_on_construction: bool,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            kind: HeuristicKind::default(),
            nvm_alloc_functions: vec!["mmap".to_string(), "mmap64".to_string()],
            page_size: 4096,
            dump_on_construction: false,
        }
    }
}

impl HeuristicConfig {
    pub fn new(kind: HeuristicKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Builder: Set kind
    pub fn kind(mut self, v: HeuristicKind) -> Self {
        self.kind = v;
        self
    }

    /// Builder: Add an NVM allocation entry point
    pub fn nvm_alloc_function(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.nvm_alloc_functions.contains(&name) {
            self.nvm_alloc_functions.push(name);
        }
        self
    }

    /// Builder: Set page size
    pub fn page_size(mut self, v: usize) -> Self {
        self.page_size = v;
        self
    }

    /// Builder: Set dump on construction
    pub fn dump_on_construction(mut self, v: bool) -> Self {
        self.dump_on_construction = v;
        self
    }

    pub fn is_nvm_alloc_function(&self, name: &str) -> bool {
        self.nvm_alloc_functions.iter().any(|f| f == name)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.kind == HeuristicKind::Invalid {
            return Err(ConfigError::InvalidHeuristic);
        }

        if !self.page_size.is_power_of_two()
            || self.page_size < MIN_PAGE_SIZE
            || self.page_size > MAX_PAGE_SIZE
        {
            return Err(ConfigError::range_with_hint(
                "page_size",
                self.page_size,
                MIN_PAGE_SIZE,
                MAX_PAGE_SIZE,
                "Page size must be a power of two",
            ));
        }

        if self.nvm_alloc_functions.is_empty() {
            return Err(ConfigError::Validation(
                "nvm_alloc_functions must name at least one allocation entry point".to_string(),
            ));
        }

        if self.nvm_alloc_functions.iter().any(|f| f.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "nvm_alloc_functions contains an empty name".to_string(),
            ));
        }

        Ok(())
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn from_yaml(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
