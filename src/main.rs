//! `pylsltools` binary: dispatches to one of the five entry points in
//! spec.md §6 (`control`, `monitor`, `relay`, `simulate`, `playback`).
//! Exit code 0 on clean shutdown, non-zero on unhandled error.

mod cli;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pylsltools", about = "Time-disciplined multi-stream engine toolkit for Lab Streaming Layer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Spawn a Control Sender REPL publishing START/PAUSE/STOP markers.
    Control(cli::control::ControlArgs),
    /// Spawn the monitor aggregator tracking every `_monitor_*` stream.
    Monitor(cli::monitor::MonitorArgs),
    /// Spawn a Supervisor managing Relay Workers.
    Relay(cli::relay::RelayArgs),
    /// Spawn N synthetic Stream Workers emitting deterministic data.
    Simulate(cli::simulate::SimulateArgs),
    /// Spawn a Stream Worker driven by a Generator Driver reading a dataset.
    Playback(cli::playback::PlaybackArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let result = match cli.command {
        Command::Control(args) => cli::control::run(args).await,
        Command::Monitor(args) => cli::monitor::run(args).await,
        Command::Relay(args) => cli::relay::run(args).await,
        Command::Simulate(args) => cli::simulate::run(args).await,
        Command::Playback(args) => cli::playback::run(args).await,
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "pylsltools exited with an error");
    }

    result
}
