use clap::Parser;
use tracing_subscriber::EnvFilter;

use tw_cli::cli::{self, Cli, Command, ConfigCommand};
use tw_domain::config::{LogFormat, LoggingConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let flag = cli.config.as_deref();

    match cli.command {
        Command::Handshake { target } => {
            let (config, _) = cli::load_config(flag)?;
            init_tracing(&config.logging);
            report(cli::ops::handshake(&config, &target).await)
        }
        Command::Discover { target, json } => {
            let (config, _) = cli::load_config(flag)?;
            init_tracing(&config.logging);
            report(cli::ops::discover(&config, &target, json).await)
        }
        Command::Invoke {
            target,
            operation,
            args,
        } => {
            let (config, _) = cli::load_config(flag)?;
            init_tracing(&config.logging);
            report(cli::ops::invoke(&config, &target, &operation, &args).await)
        }
        Command::Config(ConfigCommand::Validate) => {
            let (config, config_path) = cli::load_config(flag)?;
            if !cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Config(ConfigCommand::Show) => {
            let (config, _) = cli::load_config(flag)?;
            print!("{}", cli::config::show(&config)?);
            Ok(())
        }
        Command::Version => {
            println!("toolwire {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Print a hint for session failures before handing the error back to
/// `main`. The session has already been closed by the time this runs.
fn report(result: anyhow::Result<()>) -> anyhow::Result<()> {
    if let Err(err) = &result {
        if let Some(hint) = cli::ops::hint(err) {
            eprintln!("hint: {hint}");
        }
    }
    result
}

/// Initialize stderr-only tracing so diagnostics never mix with command
/// output on stdout.
///
/// `RUST_LOG` wins over `logging.filter` from the config file.
fn init_tracing(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.compact().init(),
    }
}
