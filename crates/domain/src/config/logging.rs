use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Logging configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Log output settings for the `toolwire` binary.
///
/// `RUST_LOG` always wins over `filter`; the filter here is only the
/// fallback used when the environment variable is unset. Logs go to
/// stderr so stdout stays clean for command output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive string.
    #[serde(default = "d_filter")]
    pub filter: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: d_filter(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Compact human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

fn d_filter() -> String {
    "warn".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_warn_pretty() {
        let cfg = LoggingConfig::default();
        assert_eq!(cfg.filter, "warn");
        assert_eq!(cfg.format, LogFormat::Pretty);
    }

    #[test]
    fn json_format_parses() {
        let cfg: LoggingConfig = toml::from_str("format = \"json\"").unwrap();
        assert_eq!(cfg.format, LogFormat::Json);
        assert_eq!(cfg.filter, "warn");
    }
}
