//! `monitor` subcommand: spawn the aggregator that tracks every
//! `_monitor_*` stream on the network (grounded in `monitor.py`'s
//! `Monitor` class).

use crate::monitor::{run_aggregator_loop, Aggregator};
use clap::Args;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Args, Debug)]
pub struct MonitorArgs {
    #[arg(long, short = 'p', default_value = "")]
    pub pred: String,

    #[arg(long)]
    pub debug: bool,
}

pub async fn run(args: MonitorArgs) -> anyhow::Result<()> {
    if !args.pred.is_empty() {
        tracing::info!(extra_predicate = %args.pred, "monitor using additional predicate clause (always scoped to _monitor_*)");
    }

    let aggregator = Arc::new(Aggregator::new());
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = stop_tx.send(true);
    });

    run_aggregator_loop(aggregator, stop_rx).await?;
    Ok(())
}
