mod cmd;
mod config;
mod error;

use clap::Parser;
use config::{Cli, Commands};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => cmd::run::run(args).await,
        Commands::Tail(args) => cmd::tail::run(args).await,
    };
    if let Err(e) = result {
        tracing::error!(error = %e, "fatal");
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}
