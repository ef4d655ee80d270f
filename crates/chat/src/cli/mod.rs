pub mod chat;
pub mod config;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// studybuddy: a study assistant that answers from your own schedule,
/// deadlines, inbox and notes.
#[derive(Debug, Parser)]
#[command(name = "studybuddy", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactive chat session.
    Chat {
        /// Directory for the persisted conversation; in-memory when omitted.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Send a single message and print the reply.
    Run {
        /// The message to send.
        message: String,
        /// Directory for the persisted conversation; in-memory when omitted.
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Print the full turn outcome as JSON instead of streaming text.
        #[arg(long)]
        json: bool,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `SB_CONFIG` (or `config.toml`).
/// A missing file yields the defaults. Returns the config and the path used.
pub fn load_config() -> anyhow::Result<(sb_domain::config::Config, String)> {
    let config_path = std::env::var("SB_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        sb_domain::config::Config::default()
    };

    Ok((config, config_path))
}
