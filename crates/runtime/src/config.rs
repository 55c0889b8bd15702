//! Runtime configuration
//!
//! Controls the size of a root's arena and the limits applied while reading
//! and evaluating. Built in code with the `with_*` builder methods, or loaded
//! from TOML:
//!
//! ```toml
//! arena_capacity = 4096
//! max_steps = 100000
//! max_read_depth = 64
//! recycle = true
//! ```

use plisp_core::DEFAULT_CAPACITY;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Reader nesting limit unless configured otherwise
pub const DEFAULT_MAX_READ_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Cells in the root arena
    pub arena_capacity: usize,

    /// Evaluator step budget per `eval` (no limit when absent)
    pub max_steps: Option<u64>,

    /// Deepest list/map/set nesting the reader accepts
    pub max_read_depth: usize,

    /// Return cells of finished frames to the arena's free list
    pub recycle: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            arena_capacity: DEFAULT_CAPACITY,
            max_steps: None,
            max_read_depth: DEFAULT_MAX_READ_DEPTH,
            recycle: true,
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        RuntimeConfig::default()
    }

    pub fn with_arena_capacity(mut self, capacity: usize) -> Self {
        self.arena_capacity = capacity;
        self
    }

    pub fn with_max_steps(mut self, steps: u64) -> Self {
        self.max_steps = Some(steps);
        self
    }

    pub fn with_max_read_depth(mut self, depth: usize) -> Self {
        self.max_read_depth = depth;
        self
    }

    pub fn with_recycle(mut self, recycle: bool) -> Self {
        self.recycle = recycle;
        self
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        let config: RuntimeConfig =
            toml::from_str(toml_str).map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config {}: {}", path.display(), e))?;
        Self::from_toml(&content)
    }

    fn validate(&self) -> Result<(), String> {
        if self.arena_capacity == 0 {
            return Err("arena_capacity must be at least 1".to_string());
        }
        if self.max_read_depth == 0 {
            return Err("max_read_depth must be at least 1".to_string());
        }
        Ok(())
    }
}
