use clap::Parser;
use tlsb2_storage::config::ENV_DEBUG;
use tracing::Level;

mod cli;
mod commands;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    let debug = cli.verbose || std::env::var(ENV_DEBUG).is_ok_and(|v| v == "1");
    tracing_subscriber::fmt()
        .with_max_level(if debug { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .init();

    commands::run_command(cli).await
}
