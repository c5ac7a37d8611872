//! Configuration system for KeepForge.
//!
//! Load engine defaults from TOML or YAML so solver selection cadence,
//! metric ordering and the reference solvers' limits can be tuned without
//! code changes.
//!
//! # Examples
//!
//! Load configuration from a TOML string:
//!
//! ```
//! use keepforge_config::EngineConfig;
//! use keepforge_core::Metric;
//!
//! let config = EngineConfig::from_toml_str(r#"
//!     reevaluation_interval = 50
//!     optimization_priority = ["number_of_changed_variables", "time"]
//!
//!     [relax]
//!     max_iterations = 200
//! "#).unwrap();
//!
//! assert_eq!(config.reevaluation_interval, 50);
//! assert_eq!(config.optimization_priority[0], Metric::NumberOfChangedVariables);
//! assert_eq!(config.relax.max_iterations, 200);
//! ```
//!
//! Use the defaults when the file is missing:
//!
//! ```
//! use keepforge_config::EngineConfig;
//!
//! let config = EngineConfig::load("keepforge.toml").unwrap_or_default();
//! assert_eq!(config.reevaluation_interval, 1000);
//! ```

use std::path::Path;

use keepforge_core::Metric;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Process-wide engine defaults. Every request option left unset falls
/// back to the value configured here.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", default)]
pub struct EngineConfig {
    /// Number of initiating writes on a constraint between two solver
    /// re-selections.
    pub reevaluation_interval: u32,

    /// Metric ordering used to rank candidate solvers.
    pub optimization_priority: Vec<Metric>,

    /// Amount added to the defining solver's weight for the duration of a
    /// write, so it stays defining while downstream solvers catch up.
    pub weight_bump: f64,

    /// Emit a timing event for every solve.
    pub log_timings: bool,

    /// Emit an event for every solver rejected by capability filtering.
    pub log_reasons: bool,

    pub relax: RelaxConfig,

    pub domain: DomainConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reevaluation_interval: 1000,
            optimization_priority: Metric::default_priority(),
            weight_bump: 987_654_321.0,
            log_timings: false,
            log_reasons: false,
            relax: RelaxConfig::default(),
            domain: DomainConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if file doesn't exist, contains invalid TOML, or fails
    /// [`validate`](Self::validate).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_file(path)
    }

    /// Loads configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Parses configuration from a YAML string.
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values a loader cannot reject by type alone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reevaluation_interval == 0 {
            return Err(ConfigError::Invalid(
                "reevaluation_interval must be at least 1".to_string(),
            ));
        }
        if self.optimization_priority.is_empty() {
            return Err(ConfigError::Invalid(
                "optimization_priority must name at least one metric".to_string(),
            ));
        }
        if !(self.weight_bump.is_finite() && self.weight_bump > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "weight_bump must be a positive number, got {}",
                self.weight_bump
            )));
        }
        if self.relax.tolerance.is_nan() || self.relax.tolerance <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "relax.tolerance must be positive, got {}",
                self.relax.tolerance
            )));
        }
        Ok(())
    }

    /// Sets the re-selection cadence.
    pub fn with_reevaluation_interval(mut self, interval: u32) -> Self {
        self.reevaluation_interval = interval;
        self
    }

    /// Sets the metric ordering.
    pub fn with_optimization_priority(mut self, metrics: Vec<Metric>) -> Self {
        self.optimization_priority = metrics;
        self
    }

    pub fn with_log_timings(mut self, enabled: bool) -> Self {
        self.log_timings = enabled;
        self
    }

    pub fn with_log_reasons(mut self, enabled: bool) -> Self {
        self.log_reasons = enabled;
        self
    }

    pub fn with_relax(mut self, relax: RelaxConfig) -> Self {
        self.relax = relax;
        self
    }

    pub fn with_domain(mut self, domain: DomainConfig) -> Self {
        self.domain = domain;
        self
    }
}

/// Limits for the iterative relaxation solver.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", default)]
pub struct RelaxConfig {
    /// Projection sweeps before giving up.
    pub max_iterations: u32,

    /// Largest residual accepted as satisfied.
    pub tolerance: f64,
}

impl Default for RelaxConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1e-9,
        }
    }
}

/// Limits for the finite-domain search solver.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", default)]
pub struct DomainConfig {
    /// Search nodes visited before the search reports failure.
    pub max_nodes: u64,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self { max_nodes: 100_000 }
    }
}
