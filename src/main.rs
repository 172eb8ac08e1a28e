use anyhow::Result;
use clap::Parser;
use meetcap::{
    app,
    cli::{handle_recording_command, Cli, CliCommand},
    config::Config,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("meetcap {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(command @ (CliCommand::Start(_) | CliCommand::Stop | CliCommand::Status)) => {
            let port = match cli.port {
                Some(port) => port,
                None => Config::load()?.api.port,
            };
            handle_recording_command(command, port).await
        }
        Some(CliCommand::Serve) | None => app::run_service().await,
    }
}
