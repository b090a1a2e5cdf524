//! Relay Worker (spec.md §4.4): a Stream Worker variant that owns both an
//! upstream inlet and a downstream outlet instead of a generator, optionally
//! re-encoding timestamps at the moment of receipt.

use crate::error::Result;
use crate::inlet::StreamInlet;
use crate::monitor::MonitorSender;
use crate::outlet::StreamOutlet;
use crate::resolver;
use crate::sample::StreamDescriptor;
use crate::stream_key::StreamKey;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub struct RelayConfig {
    pub upstream_descriptor: StreamDescriptor,
    pub hostname: Option<String>,
    pub re_encode_timestamps: bool,
    pub monitor_interval: f64,
    pub chunk_size: i32,
    pub max_buffered: i32,
}

#[derive(Debug, Clone)]
pub enum RelayEvent {
    SamplesRelayed { key: StreamKey, sample_count: u64 },
    UpstreamLost { key: StreamKey },
}

fn relay_descriptor(config: &RelayConfig) -> StreamDescriptor {
    let mut descriptor = config.upstream_descriptor.clone();
    descriptor.name = format!("_relay_{}", config.upstream_descriptor.name);
    // Copy upstream `desc` verbatim per spec.md §9's resolved open question;
    // channel labels/types/units travel with the rest of the descriptor.
    descriptor
}

/// Runs one Relay Worker to completion: resolve upstream, open inlet+outlet,
/// pump samples until the upstream disappears (`stop_flag` also ends the
/// loop early so the Supervisor can tear a relay down on STOP).
pub async fn run(config: RelayConfig, key: StreamKey, outbound: mpsc::Sender<RelayEvent>, stop_flag: Arc<AtomicBool>) -> Result<()> {
    let predicate = resolver::upstream_predicate(
        &config.upstream_descriptor.name,
        &config.upstream_descriptor.content_type,
        config.upstream_descriptor.channel_count,
        config.hostname.as_deref(),
    );

    let chunk_size = if config.re_encode_timestamps { 1 } else { config.chunk_size };

    let outlet_descriptor = relay_descriptor(&config);
    let outlet = StreamOutlet::new(outlet_descriptor.clone(), chunk_size, config.max_buffered)?;
    let monitor = MonitorSender::new(&config.upstream_descriptor.name, &config.upstream_descriptor.source_id).ok();

    let format = config.upstream_descriptor.channel_format;
    let resolve_predicate = predicate.clone();
    let stop_for_thread = stop_flag.clone();
    let inlet = tokio::task::spawn_blocking(move || {
        loop {
            if stop_for_thread.load(Ordering::Relaxed) {
                return Err(crate::error::EngineError::ResolveTimeout);
            }
            // No postprocessing: re-encoding (if enabled) stamps with
            // local_clock() directly, and byte-for-byte relay fidelity
            // (spec.md §8 property 7) requires untouched ground-truth data.
            match StreamInlet::open(resolve_predicate.clone(), 1.0, format, 360, chunk_size, false, &[]) {
                Ok(inlet) => return Ok(inlet),
                Err(crate::error::EngineError::ResolveTimeout) | Err(crate::error::EngineError::StreamNotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    })
    .await
    .map_err(|e| crate::error::EngineError::LslLibraryError(format!("relay resolve task panicked: {e}")))??;

    info!(upstream = %config.upstream_descriptor.name, relay = %outlet_descriptor.name, "relay worker started");

    let mut sample_count: u64 = 0;
    let mut last_monitor_emit = f64::NEG_INFINITY;

    loop {
        if stop_flag.load(Ordering::Relaxed) {
            break;
        }

        match inlet.pull(0.5) {
            Ok(Some(sample)) => {
                let timestamp = if config.re_encode_timestamps { lsl::local_clock() } else { sample.timestamp };
                outlet.push(sample.data, timestamp)?;
                sample_count += 1;

                let _ = outbound.try_send(RelayEvent::SamplesRelayed { key: key.clone(), sample_count });

                if let Some(monitor) = &monitor {
                    if timestamp - last_monitor_emit >= config.monitor_interval {
                        last_monitor_emit = timestamp;
                        let _ = monitor.send_heartbeat(&config.upstream_descriptor.name, sample_count);
                    }
                }
            }
            Ok(None) => continue,
            Err(e) => {
                warn!(upstream = %config.upstream_descriptor.name, error = %e, "relay lost upstream");
                break;
            }
        }
    }

    let _ = outbound.send(RelayEvent::UpstreamLost { key }).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::ChannelFormat;

    #[test]
    fn relay_descriptor_prefixes_upstream_name() {
        let config = RelayConfig {
            upstream_descriptor: StreamDescriptor::new("eeg", "EEG", 8, 500.0, ChannelFormat::Float32, "src"),
            hostname: None,
            re_encode_timestamps: false,
            monitor_interval: 1.0,
            chunk_size: 32,
            max_buffered: 360,
        };
        assert_eq!(relay_descriptor(&config).name, "_relay_eeg");
    }
}
