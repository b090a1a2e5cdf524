//! `playback` subcommand: spawn a single Stream Worker driven by a
//! Generator Driver reading a stored dataset (grounded in `playback.py`'s
//! `GeneratorStream`). Dataset decoding itself (HDF5/pdxdf) is out of
//! scope; this wires the lazy chunked-read contract against whatever
//! `RowSource` is available.

use crate::control::{ControlMessage, ControlState};
use crate::generator_driver::{GeneratorDriver, InMemoryRowSource};
use crate::sample::{ChannelFormat, StreamDescriptor};
use crate::stream_key::StreamKey;
use crate::worker::{self, WorkerConfig};
use clap::Args;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct PlaybackArgs {
    pub path: PathBuf,

    #[arg(long, default_value_t = 0)]
    pub start: u64,

    #[arg(long)]
    pub stop: Option<u64>,

    #[arg(long = "loop")]
    pub loop_playback: bool,

    #[arg(long, default_value_t = 120)]
    pub read_chunk_size: usize,

    #[arg(long, default_value_t = 0.1)]
    pub latency: f64,

    #[arg(long, default_value_t = 0.0)]
    pub start_delay: f64,

    #[arg(long)]
    pub source_id: Option<String>,

    #[arg(long, default_value_t = 0)]
    pub chunk_size: i32,

    #[arg(long, default_value_t = 360)]
    pub max_buffered: i32,

    #[arg(long)]
    pub debug: bool,
}

/// Stub dataset loader: real datasets are read by a `RowSource`
/// implementation decoding HDF5/pdxdf, which is out of scope here (spec.md
/// §1 Out of scope). Rows are plain comma-separated floats, one sample per
/// line, so this entry point has something concrete to drive end-to-end;
/// a production deployment supplies its own `RowSource` reading the
/// dataset's native format and sampling rate.
fn load_rows(path: &std::path::Path, start: u64, stop: Option<u64>) -> anyhow::Result<Vec<Vec<f64>>> {
    if !path.exists() {
        warn!(path = %path.display(), "dataset path does not exist, using an empty row source");
        return Ok(Vec::new());
    }
    let contents = std::fs::read_to_string(path)?;
    let mut rows: Vec<Vec<f64>> = contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.split(',').map(|v| v.trim().parse::<f64>()).collect::<Result<Vec<_>, _>>())
        .collect::<Result<_, _>>()?;
    let start = (start as usize).min(rows.len());
    let end = stop.map(|s| (s as usize).min(rows.len())).unwrap_or(rows.len());
    rows = if start < end { rows[start..end].to_vec() } else { Vec::new() };
    Ok(rows)
}

pub async fn run(args: PlaybackArgs) -> anyhow::Result<()> {
    let rows = load_rows(&args.path, args.start, args.stop)?;
    let channel_count = rows.first().map(|r| r.len()).unwrap_or(1);
    // Fall back to a fresh UUID rather than a fixed string so two playback
    // runs against the same dataset never collide on source_id (spec.md §3:
    // source_id is part of the Supervisor's dedup identity).
    let source_id = args.source_id.clone().unwrap_or_else(|| format!("playback-{}", uuid::Uuid::new_v4()));

    // Treated as irregular-rate: the stub row source carries no sampling
    // rate metadata (that lives in the dataset's own header, out of scope
    // here), so each row is stamped with the clock at the moment it is
    // actually emitted rather than a precomputed logical timestamp.
    let descriptor = StreamDescriptor::new("playback", "data", channel_count as u32, 0.0, ChannelFormat::Double64, source_id);

    let driver = GeneratorDriver::new(Box::new(InMemoryRowSource::new(rows)), args.read_chunk_size, args.loop_playback);
    let key = StreamKey::new(descriptor.name.clone(), descriptor.source_id.clone(), descriptor.hostname.clone(), descriptor.channel_count);

    let config = WorkerConfig {
        descriptor: descriptor.clone(),
        source: Box::new(driver),
        max_time: None,
        max_samples: None,
        chunk_size: args.chunk_size,
        max_buffered: args.max_buffered,
        monitor_interval: 1.0,
    };

    let (mailbox_tx, mailbox_rx) = mpsc::channel::<ControlMessage>(4);
    let (events_tx, mut events_rx) = mpsc::channel(16);

    if args.start_delay > 0.0 {
        tokio::time::sleep(std::time::Duration::from_secs_f64(args.start_delay)).await;
    }

    let start = ControlMessage { state: ControlState::Start, latency: Some(args.latency), time_stamp: None };
    mailbox_tx.send(start).await.ok();

    info!(stream = %descriptor.name, "playback started");
    let worker_handle = tokio::spawn(async move { worker::run(config, key, mailbox_rx, events_tx, None).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received interrupt, stopping playback");
            let _ = mailbox_tx.send(ControlMessage { state: ControlState::Stop, latency: None, time_stamp: None }).await;
        }
        _ = async { while events_rx.recv().await.is_some() {} } => {
            info!(stream = %descriptor.name, "playback source exhausted");
        }
    }

    let _ = worker_handle.await;
    Ok(())
}
