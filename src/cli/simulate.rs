//! `simulate` subcommand: spawn N synthetic Stream Workers, optionally
//! driven by a Control Receiver instead of starting immediately (grounded
//! in `simulate.py`'s `Simulate` class).

use crate::control::{ControlMessage, ControlReceiver, ControlState};
use crate::generator::{ChannelGenerators, GeneratorTag};
use crate::sample::{ChannelFormat, StreamDescriptor};
use crate::stream_key::StreamKey;
use crate::worker::{self, GeneratorSource, WorkerConfig, WorkerEvent};
use clap::Args;
use std::sync::Arc;
use tokio::sync::{mpsc, Barrier};
use tracing::info;

#[derive(Args, Debug)]
pub struct SimulateArgs {
    #[arg(long, short = 'n', default_value_t = 1)]
    pub num_streams: u32,

    #[arg(long, short = 'c', default_value_t = 30)]
    pub num_channels: u32,

    #[arg(long, short = 's', default_value_t = 500.0)]
    pub sample_rate: f64,

    #[arg(long, short = 'g', num_args = 1.., default_values_t = ["counter".to_string()])]
    pub generators: Vec<String>,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long, default_value = "data")]
    pub content_type: String,

    #[arg(long, default_value = "float32")]
    pub channel_format: String,

    #[arg(long, short = 't', default_value = "misc")]
    pub channel_type: String,

    #[arg(long)]
    pub max_time: Option<f64>,

    #[arg(long)]
    pub max_samples: Option<u64>,

    #[arg(long, default_value_t = 0)]
    pub chunk_size: i32,

    #[arg(long, default_value_t = 360)]
    pub max_buffered: i32,

    #[arg(long)]
    pub control_name: Option<String>,

    #[arg(long, default_value_t = 0.2)]
    pub latency: f64,

    #[arg(long)]
    pub debug: bool,
}

pub async fn run(args: SimulateArgs) -> anyhow::Result<()> {
    let channel_format: ChannelFormat = args.channel_format.parse().map_err(anyhow::Error::msg)?;
    let tags: Vec<GeneratorTag> = args
        .generators
        .iter()
        .map(|s| s.parse::<GeneratorTag>())
        .collect::<Result<_, _>>()
        .map_err(anyhow::Error::msg)?;

    let base_name = args.name.clone().unwrap_or_else(|| "test".to_string());
    let barrier = Arc::new(Barrier::new(args.num_streams as usize));
    let (events_tx, mut events_rx) = mpsc::channel::<WorkerEvent>(256);

    let mut mailboxes = Vec::with_capacity(args.num_streams as usize);
    let mut handles = Vec::with_capacity(args.num_streams as usize);

    for i in 0..args.num_streams {
        let name = if args.num_streams == 1 { base_name.clone() } else { format!("{base_name}{i}") };
        let source_id = format!("{name}_src");

        let mut descriptor = StreamDescriptor::new(
            name.clone(),
            args.content_type.clone(),
            args.num_channels,
            args.sample_rate,
            channel_format,
            source_id,
        );
        descriptor.channel_types = vec![args.channel_type.clone(); args.num_channels as usize];

        let generator = ChannelGenerators::new(&tags, args.num_channels as usize);
        descriptor.channel_labels = generator.default_labels();
        descriptor.normalize_metadata();

        let key = StreamKey::new(descriptor.name.clone(), descriptor.source_id.clone(), descriptor.hostname.clone(), descriptor.channel_count);

        let config = WorkerConfig {
            descriptor,
            source: Box::new(GeneratorSource { generator, stream_idx: i as u64 }),
            max_time: args.max_time,
            max_samples: args.max_samples,
            chunk_size: args.chunk_size,
            max_buffered: args.max_buffered,
            monitor_interval: 1.0,
        };

        let (mailbox_tx, mailbox_rx) = mpsc::channel::<ControlMessage>(4);
        let events_tx = events_tx.clone();
        let barrier = barrier.clone();
        let handle = tokio::spawn(async move { worker::run(config, key, mailbox_rx, events_tx, Some(barrier)).await });

        mailboxes.push(mailbox_tx);
        handles.push(handle);
    }

    let control_receiver = if let Some(control_name) = args.control_name.clone() {
        let (receiver, mut control_rx) = ControlReceiver::spawn(control_name);
        let fanout_mailboxes = mailboxes.clone();
        tokio::spawn(async move {
            while let Some(msg) = control_rx.recv().await {
                for mailbox in &fanout_mailboxes {
                    let _ = mailbox.send(msg.clone()).await;
                }
            }
        });
        Some(receiver)
    } else {
        info!("no --control-name given, starting all streams immediately");
        let start = ControlMessage { state: ControlState::Start, latency: Some(args.latency), time_stamp: None };
        for mailbox in &mailboxes {
            let _ = mailbox.send(start.clone()).await;
        }
        None
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received interrupt, stopping all streams");
        }
        _ = drain_events(&mut events_rx) => {}
    }

    let stop = ControlMessage { state: ControlState::Stop, latency: None, time_stamp: None };
    for mailbox in &mailboxes {
        let _ = mailbox.send(stop.clone()).await;
    }
    for handle in handles {
        let _ = handle.await;
    }
    if let Some(receiver) = control_receiver {
        receiver.stop().await;
    }

    Ok(())
}

async fn drain_events(events_rx: &mut mpsc::Receiver<WorkerEvent>) {
    while let Some(event) = events_rx.recv().await {
        if let WorkerEvent::SamplesEmitted { key, sample_count } = event {
            tracing::trace!(?key, sample_count, "worker progress");
        }
    }
}
