//! Dockwatch CLI entry point

use clap::Parser;
use tracing_subscriber::EnvFilter;

use dockwatch_cli::{Cli, exit_codes};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("dockwatch_cli=debug"))
            .with_writer(std::io::stderr)
            .try_init();
    }

    let code = match dockwatch_cli::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            exit_codes::INTERNAL_ERROR
        }
    };

    std::process::exit(code);
}
