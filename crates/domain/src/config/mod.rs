mod logging;
mod pool;
mod session;
mod targets;

pub use logging::*;
pub use pool::*;
pub use session::*;
pub use targets::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Subprocess targets, addressed by `id`.
    #[serde(default)]
    pub targets: Vec<ConnectionTarget>,
}

impl Config {
    /// Parse a config from TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load the config at `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))
    }

    /// Look up a target by id.
    pub fn target(&self, id: &str) -> Result<&ConnectionTarget> {
        self.targets
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::UnknownTarget(id.to_string()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        // Pool must be able to hold at least one session.
        if self.pool.max_sessions == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "pool.max_sessions".into(),
                message: "max_sessions must be greater than 0".into(),
            });
        }

        // Marker readiness needs something to wait for.
        if let Readiness::Marker { marker, .. } = &self.session.readiness {
            if marker.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "session.readiness.marker".into(),
                    message: "marker readiness needs a non-empty marker line".into(),
                });
            }
        }

        // Warn when no targets are configured.
        if self.targets.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "targets".into(),
                message: "no targets configured".into(),
            });
        }

        // Each target needs a unique non-empty id and a program.
        let mut seen = HashSet::new();
        for (i, target) in self.targets.iter().enumerate() {
            if target.id.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("targets[{i}].id"),
                    message: "target id must not be empty".into(),
                });
            } else if !seen.insert(target.id.as_str()) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("targets[{i}].id"),
                    message: format!("duplicate target id \"{}\"", target.id),
                });
            }
            if target.program.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("targets[{i}].program"),
                    message: "program must not be empty".into(),
                });
            }
            // Warn when a working dir does not exist (yet).
            if let Some(dir) = &target.working_dir {
                if !dir.is_dir() {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Warning,
                        field: format!("targets[{i}].working_dir"),
                        message: format!("{} is not an existing directory", dir.display()),
                    });
                }
            }
        }

        errors
    }
}
