pub mod config;
pub mod ops;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use tw_domain::config::Config;

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV: &str = "TOOLWIRE_CONFIG";
const DEFAULT_CONFIG: &str = "toolwire.toml";

/// toolwire: talk to line-delimited RPC tool servers over stdio.
#[derive(Debug, Parser)]
#[command(name = "toolwire", version, about)]
pub struct Cli {
    /// Path to the config file (overrides TOOLWIRE_CONFIG).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Spawn the target, negotiate capabilities and print its server info.
    Handshake {
        /// Target id from the config file.
        target: String,
    },
    /// List the operations a target offers.
    Discover {
        /// Target id from the config file.
        target: String,
        /// Print the full descriptors (with parameter schemas) as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Invoke one operation and print the text it returns.
    Invoke {
        /// Target id from the config file.
        target: String,
        /// Operation name as reported by `discover`.
        operation: String,
        /// Arguments as a JSON object, e.g. '{"path": "/tmp/x"}'.
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Resolve the config path: `--config`, then `TOOLWIRE_CONFIG`, then
/// `toolwire.toml` in the current directory.
pub fn config_path(flag: Option<&Path>) -> PathBuf {
    match flag {
        Some(path) => path.to_path_buf(),
        None => std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG)),
    }
}

/// Load the configuration, falling back to defaults when the file does
/// not exist. Returns the parsed [`Config`] and the path that was used.
pub fn load_config(flag: Option<&Path>) -> anyhow::Result<(Config, PathBuf)> {
    let path = config_path(flag);
    let config = Config::load(&path)?;
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn invoke_parses_with_global_config_flag() {
        let cli = Cli::try_parse_from([
            "toolwire",
            "invoke",
            "files",
            "read_file",
            "--args",
            r#"{"path":"/tmp/x"}"#,
            "--config",
            "alt.toml",
        ])
        .unwrap();

        assert_eq!(cli.config.as_deref(), Some(Path::new("alt.toml")));
        match cli.command {
            Command::Invoke {
                target,
                operation,
                args,
            } => {
                assert_eq!(target, "files");
                assert_eq!(operation, "read_file");
                assert_eq!(args, r#"{"path":"/tmp/x"}"#);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn invoke_args_default_to_empty_object() {
        let cli = Cli::try_parse_from(["toolwire", "invoke", "files", "stat"]).unwrap();
        assert!(matches!(cli.command, Command::Invoke { args, .. } if args == "{}"));
    }

    #[test]
    fn explicit_flag_wins_over_default() {
        assert_eq!(
            config_path(Some(Path::new("/etc/tw.toml"))),
            PathBuf::from("/etc/tw.toml")
        );
    }

    #[test]
    fn missing_config_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let (config, used) = load_config(Some(&path)).unwrap();
        assert_eq!(used, path);
        assert!(config.targets.is_empty());
    }
}
