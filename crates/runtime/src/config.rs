//! Director configuration
//!
//! Loaded from YAML; every field has a default, so an empty document is a
//! valid configuration.
//!
//! ```yaml
//! iterations: 10
//! check_invariants: true
//! unresolved: warn
//! tie_break: reverse
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// What to do with cells still unknown when an instant commits.
///
/// An unknown cell is a legitimate fixed point (for example downstream of an
/// excluded actor or on an unbroken cycle), so the default only logs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedPolicy {
    #[default]
    Allow,
    /// Record a warning in the instant report.
    Warn,
    /// Fail the instant with [`Error::CausalityLoop`](crate::Error::CausalityLoop).
    Reject,
}

/// Tie breaking among ready nodes when sorting the dependency graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Earliest registered port first.
    #[default]
    Registration,
    /// Latest registered port first.
    Reverse,
}

/// Configuration for a [`Director`](crate::Director).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorConfig {
    /// Instants executed by `Director::run`. `0` runs until every actor is
    /// excluded or a stop is requested.
    pub iterations: u64,
    /// Re-query `prime` before re-evaluating an allowed actor and fail if
    /// it turned false.
    pub check_invariants: bool,
    pub unresolved: UnresolvedPolicy,
    pub tie_break: TieBreak,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            iterations: 0,
            check_invariants: true,
            unresolved: UnresolvedPolicy::Allow,
            tie_break: TieBreak::Registration,
        }
    }
}

impl DirectorConfig {
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&source)
    }

    pub fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn with_unresolved(mut self, policy: UnresolvedPolicy) -> Self {
        self.unresolved = policy;
        self
    }
}
