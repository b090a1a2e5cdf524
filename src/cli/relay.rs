//! `relay` subcommand: spawn a Supervisor managing Relay Workers (grounded
//! in `relay.py`'s `Relay` class).

use crate::control::{ControlMessage, ControlReceiver};
use crate::supervisor::{Supervisor, SupervisorConfig};
use clap::Args;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;

#[derive(Args, Debug)]
pub struct RelayArgs {
    #[arg(long, short = 'p', default_value = "")]
    pub pred: String,

    #[arg(long)]
    pub non_local: bool,

    #[arg(long)]
    pub monitor: bool,

    #[arg(long)]
    pub keep_orig_timestamps: bool,

    #[arg(long, default_value_t = 1)]
    pub chunk_size: i32,

    #[arg(long, default_value_t = 360)]
    pub max_buffered: i32,

    #[arg(long)]
    pub control_name: Option<String>,

    #[arg(long, default_value_t = 1.0)]
    pub monitor_interval: f64,

    #[arg(long)]
    pub debug: bool,
}

pub async fn run(args: RelayArgs) -> anyhow::Result<()> {
    let hostname = if args.non_local { None } else { Some(hostname::get()?.to_string_lossy().into_owned()) };

    let predicate_note = if args.pred.is_empty() { String::new() } else { format!(" and ({})", args.pred) };
    if !predicate_note.is_empty() {
        info!(extra_predicate = %args.pred, "relay using additional predicate clause");
    }
    if args.monitor {
        info!("running as a relay-of-monitors (matching _monitor_* instead of excluding it)");
    }

    let config = SupervisorConfig {
        hostname,
        re_encode_timestamps: !args.keep_orig_timestamps,
        monitor_interval: args.monitor_interval,
        chunk_size: args.chunk_size,
        max_buffered: args.max_buffered,
        resolve_timeout: 1.0,
    };
    let supervisor = Arc::new(Supervisor::new(config));

    let (control_tx, control_rx) = mpsc::channel::<ControlMessage>(16);
    let _control_receiver = if let Some(name) = args.control_name {
        let (receiver, mut upstream_rx) = ControlReceiver::spawn(name);
        let forward_tx = control_tx.clone();
        tokio::spawn(async move {
            while let Some(msg) = upstream_rx.recv().await {
                let _ = forward_tx.send(msg).await;
            }
        });
        Some(receiver)
    } else {
        None
    };

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = stop_tx.send(true);
    });

    supervisor.run(control_rx, stop_rx).await?;
    Ok(())
}
