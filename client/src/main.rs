use clap::{Parser, ValueEnum};
use client::runner;
use log::info;
use shared::DEFAULT_PORT;
use std::time::Duration;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    /// Watch the world (venue screen)
    Viewer,
    /// Control one player from stdin
    Controller,
    /// Print periodic world statistics
    Dashboard,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server URL to connect to
    #[arg(short = 's', long, default_value_t = format!("ws://127.0.0.1:{}", DEFAULT_PORT))]
    server: String,

    /// Client mode
    #[arg(short, long, value_enum, default_value_t = Mode::Viewer)]
    mode: Mode,

    /// Milliseconds between repeated moves while a direction is held
    #[arg(long, default_value = "100", value_parser = clap::value_parser!(u64).range(1..))]
    input_rate: u64,

    /// Seconds between dashboard reports
    #[arg(long, default_value = "5", value_parser = clap::value_parser!(u64).range(1..))]
    stats_interval: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client in {:?} mode", args.mode);
    info!("Connecting to: {}", args.server);

    let view = match args.mode {
        Mode::Viewer => runner::run_viewer(&args.server).await?,
        Mode::Controller => {
            runner::run_controller(&args.server, Duration::from_millis(args.input_rate)).await?
        }
        Mode::Dashboard => {
            runner::run_dashboard(&args.server, Duration::from_secs(args.stats_interval)).await?
        }
    };

    info!("Disconnected with {} players in view", view.players().len());
    Ok(())
}
