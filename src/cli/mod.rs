//! CLI entry point for Conduit.

pub mod chat;
pub mod session;

use clap::{Parser, Subcommand};

/// Conduit agent CLI
#[derive(Parser, Debug)]
#[command(name = "conduit", version, about = "Conduit agent orchestration CLI")]
pub struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one tool-use loop against the completions endpoint
    Chat(ChatArgs),
    /// Open an interactive session with a remote agent runtime
    Session(SessionArgs),
}

/// Arguments for the `chat` subcommand.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Model override
    #[arg(short, long)]
    pub model: Option<String>,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    /// Temperature (0.0 - 2.0)
    #[arg(short, long)]
    pub temperature: Option<f64>,

    /// Max tokens per completion
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Turn budget
    #[arg(long)]
    pub max_turns: Option<usize>,

    /// Directory the local tools may read
    #[arg(long, default_value = ".")]
    pub workspace: std::path::PathBuf,

    /// User prompt (positional)
    pub prompt: Option<String>,
}

/// Arguments for the `session` subcommand.
#[derive(Parser, Debug)]
pub struct SessionArgs {
    /// WebSocket URL override
    #[arg(long)]
    pub url: Option<String>,

    /// Workspace reference sent on connect
    #[arg(short, long)]
    pub workspace: Option<String>,

    /// Resume this chat id after connecting
    #[arg(long)]
    pub resume: Option<String>,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Load configuration from `--config` or the default location, then the
    /// environment.
    pub fn load_config(&self) -> crate::error::Result<crate::config::ConduitConfig> {
        match &self.config {
            Some(path) => {
                let mut config = crate::config::ConduitConfig::from_file(path)?;
                config.apply_env();
                Ok(config)
            }
            None => crate::config::ConduitConfig::load(),
        }
    }
}
