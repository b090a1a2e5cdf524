//! Supervisor (spec.md §4.6): runs the resolver loop that discovers
//! upstream streams and spawns one Relay Worker per match, and the
//! dispatcher loop that broadcasts control transitions and drains worker
//! output into the monitor aggregator. Grounded in the device-bridge
//! `AppState` pattern (`Arc<DashMap<..>>` + a broadcast-style fanout) for
//! its active-worker bookkeeping.

use crate::control::{ControlMessage, ControlState};
use crate::error::Result;
use crate::relay::{self, RelayConfig, RelayEvent};
use crate::resolver::{self, ResolvedStream};
use crate::stream_key::StreamKey;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::info;

struct ActiveRelay {
    stop_flag: Arc<AtomicBool>,
    handle: tokio::task::JoinHandle<Result<()>>,
}

pub struct SupervisorConfig {
    pub hostname: Option<String>,
    pub re_encode_timestamps: bool,
    pub monitor_interval: f64,
    pub chunk_size: i32,
    pub max_buffered: i32,
    pub resolve_timeout: f64,
}

/// Supervises a set of Relay Workers keyed by `StreamKey`, respawning a
/// relay whenever its StreamKey reappears on a later resolver tick (the
/// "simplest policy" the spec's open question leaves to the implementer).
pub struct Supervisor {
    config: SupervisorConfig,
    active: DashMap<StreamKey, ActiveRelay>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config, active: DashMap::new() }
    }

    pub async fn run(self: Arc<Self>, mut control_rx: mpsc::Receiver<ControlMessage>, mut stop: watch::Receiver<bool>) -> Result<()> {
        let (events_tx, mut events_rx) = mpsc::channel::<RelayEvent>(256);
        let mut ticker = tokio::time::interval(Duration::from_secs(1));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.resolver_tick(events_tx.clone()).await?;
                    self.reap_finished();
                }
                Some(event) = events_rx.recv() => {
                    self.handle_event(event);
                }
                Some(msg) = control_rx.recv() => {
                    self.handle_control(msg);
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        self.stop_all();
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    async fn resolver_tick(&self, events_tx: mpsc::Sender<RelayEvent>) -> Result<()> {
        let predicate = resolver::relay_predicate(self.config.hostname.as_deref());
        let matches = resolver::resolve(predicate, self.config.resolve_timeout).await?;

        for stream in matches {
            let key = stream_key_for(&stream, true);
            if self.active.contains_key(&key) {
                continue;
            }

            info!(stream = %stream.descriptor.name, "supervisor spawning relay");
            let stop_flag = Arc::new(AtomicBool::new(false));
            let relay_config = RelayConfig {
                upstream_descriptor: stream.descriptor.clone(),
                hostname: self.config.hostname.clone(),
                re_encode_timestamps: self.config.re_encode_timestamps,
                monitor_interval: self.config.monitor_interval,
                chunk_size: self.config.chunk_size,
                max_buffered: self.config.max_buffered,
            };
            let task_stop_flag = stop_flag.clone();
            let task_key = key.clone();
            let task_events_tx = events_tx.clone();
            let handle = tokio::spawn(async move { relay::run(relay_config, task_key, task_events_tx, task_stop_flag).await });

            self.active.insert(key, ActiveRelay { stop_flag, handle });
        }

        Ok(())
    }

    fn reap_finished(&self) {
        self.active.retain(|_, relay| !relay.handle.is_finished());
    }

    fn handle_event(&self, event: RelayEvent) {
        match event {
            RelayEvent::SamplesRelayed { key, sample_count } => {
                tracing::debug!(?key, sample_count, "relay progress");
            }
            RelayEvent::UpstreamLost { key } => {
                info!(?key, "relay lost upstream, will respawn on reappearance");
                self.active.remove(&key);
            }
        }
    }

    fn handle_control(&self, msg: ControlMessage) {
        if msg.state == ControlState::Stop {
            self.stop_all();
        }
    }

    fn stop_all(&self) {
        for entry in self.active.iter() {
            entry.value().stop_flag.store(true, Ordering::Relaxed);
        }
    }
}

fn stream_key_for(stream: &ResolvedStream, relay: bool) -> StreamKey {
    let key = StreamKey::new(
        stream.descriptor.name.clone(),
        stream.descriptor.source_id.clone(),
        stream.descriptor.hostname.clone(),
        stream.descriptor.channel_count,
    );
    if relay {
        key.with_content_type(stream.descriptor.content_type.clone())
    } else {
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{ChannelFormat, StreamDescriptor};

    fn resolved(name: &str) -> ResolvedStream {
        ResolvedStream {
            descriptor: StreamDescriptor::new(name, "EEG", 8, 500.0, ChannelFormat::Float32, "src1"),
            uid: "uid1".into(),
        }
    }

    #[test]
    fn relay_stream_key_includes_content_type() {
        let key = stream_key_for(&resolved("eeg"), true);
        assert_eq!(key.content_type, Some("EEG".to_string()));
    }
}
