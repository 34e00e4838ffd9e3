//! Conduit CLI binary entry point.

use conduit::cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_args();
    let result = match cli.load_config() {
        Ok(config) => match cli.command {
            Commands::Chat(args) => conduit::cli::chat::handle_chat(args, config).await,
            Commands::Session(args) => conduit::cli::session::handle_session(args, config).await,
        },
        Err(error) => Err(error),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
