use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sb_chat::cli::{Cli, Command, ConfigCommand};
use sb_domain::config::ObservabilityConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Chat { data_dir } => {
            let (config, _) = sb_chat::cli::load_config()?;
            init_cli_tracing(&config.observability);
            sb_chat::cli::chat::chat(Arc::new(config), data_dir).await
        }
        Command::Run {
            message,
            data_dir,
            json,
        } => {
            let (config, _) = sb_chat::cli::load_config()?;
            init_cli_tracing(&config.observability);
            sb_chat::cli::run::run(Arc::new(config), message, data_dir, json).await
        }
        Command::Config(ConfigCommand::Validate) => {
            let (config, config_path) = sb_chat::cli::load_config()?;
            if !sb_chat::cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Config(ConfigCommand::Show) => {
            let (config, _) = sb_chat::cli::load_config()?;
            sb_chat::cli::config::show(&config)
        }
    }
}

/// Stderr-only tracing so diagnostics never mix with reply text on stdout.
///
/// `RUST_LOG` wins over `observability.log_filter`.
fn init_cli_tracing(obs: &ObservabilityConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&obs.log_filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    if obs.json_logs {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
