//! Stream Worker: the state machine in spec.md §4.3. One worker owns one
//! outlet and the Clock & Pacer driving it, and is driven entirely by
//! messages on its own mailbox — no shared mutable state with the
//! Supervisor (spec.md §5 Shared-resource policy).

use crate::clock::Pacer;
use crate::control::{ControlMessage, ControlState};
use crate::error::Result;
use crate::generator::ChannelGenerators;
use crate::generator_driver::GeneratorDriver;
use crate::monitor::MonitorSender;
use crate::outlet::StreamOutlet;
use crate::sample::{SampleData, StreamDescriptor};
use crate::stream_key::StreamKey;
use std::sync::Arc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, Barrier};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Paused,
    Terminal,
}

/// Where a worker's per-tick channel values come from: the live Sample
/// Generator (spec.md §4.2) or a Generator Driver reading a stored dataset
/// (spec.md §4.7). `None` signals the source is exhausted, which ends the
/// worker the same way a STOP would.
pub trait SampleSource: Send {
    fn next_values(&mut self, sample_count: u64, elapsed_time: f64, nominal_srate: f64) -> Option<Vec<f64>>;
}

pub struct GeneratorSource {
    pub generator: ChannelGenerators,
    pub stream_idx: u64,
}

impl SampleSource for GeneratorSource {
    fn next_values(&mut self, sample_count: u64, elapsed_time: f64, nominal_srate: f64) -> Option<Vec<f64>> {
        Some(self.generator.sample(self.stream_idx, sample_count, elapsed_time, nominal_srate))
    }
}

impl SampleSource for GeneratorDriver {
    fn next_values(&mut self, _sample_count: u64, _elapsed_time: f64, _nominal_srate: f64) -> Option<Vec<f64>> {
        match self.next_row() {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(error = %e, "generator driver failed to read the next row, ending worker");
                None
            }
        }
    }
}

pub struct WorkerConfig {
    pub descriptor: StreamDescriptor,
    pub source: Box<dyn SampleSource>,
    pub max_time: Option<f64>,
    pub max_samples: Option<u64>,
    pub chunk_size: i32,
    pub max_buffered: i32,
    pub monitor_interval: f64,
}

#[derive(Debug, Clone)]
pub enum WorkerEvent {
    SamplesEmitted { key: StreamKey, sample_count: u64 },
    Terminated { key: StreamKey },
}

/// Drives one worker to completion. `barrier`, when set, is rendezvoused
/// once before the worker starts watching its mailbox, so a batch of
/// workers spawned together begin observing control traffic at nearly the
/// same wall time (spec.md §4.3 Barrier synchronisation).
pub async fn run(
    config: WorkerConfig,
    key: StreamKey,
    mut mailbox: mpsc::Receiver<ControlMessage>,
    outbound: mpsc::Sender<WorkerEvent>,
    barrier: Option<Arc<Barrier>>,
) -> Result<()> {
    if let Some(barrier) = &barrier {
        barrier.wait().await;
    }

    let outlet = StreamOutlet::new(config.descriptor.clone(), config.chunk_size, config.max_buffered)?;
    let monitor = MonitorSender::new(&config.descriptor.name, &config.descriptor.source_id).ok();

    let mut phase = Phase::Idle;
    let mut pacer: Option<Pacer> = None;
    let mut sample_count: u64 = 0;
    let mut start_time: f64 = 0.0;
    let mut latency: f64 = 0.0;
    // `(stop_time, phase once logical_time reaches it)` — the future-value
    // technique from spec.md §4.3 that lets a worker keep emitting until a
    // precise logical instant instead of stopping the moment the PAUSE/STOP
    // message is merely observed.
    let mut pending_transition: Option<(f64, Phase)> = None;
    let mut last_monitor_emit = f64::NEG_INFINITY;

    loop {
        match phase {
            Phase::Idle | Phase::Paused => match mailbox.recv().await {
                Some(msg) if msg.state == ControlState::Start => {
                    start_time = msg.time_stamp.unwrap_or_else(lsl::local_clock);
                    latency = msg.latency.unwrap_or(latency);
                    match (phase, &mut pacer) {
                        (Phase::Paused, Some(existing)) => existing.restart(start_time, latency),
                        _ => {
                            sample_count = 0;
                            pacer = Some(Pacer::new(config.descriptor.nominal_srate, latency, start_time));
                        }
                    }
                    pending_transition = None;
                    phase = Phase::Running;
                }
                Some(msg) if msg.state == ControlState::Stop => {
                    phase = Phase::Terminal;
                }
                Some(_) => continue, // PAUSE is a no-op outside Running
                None => break,       // mailbox closed: treat as an implicit STOP
            },
            Phase::Running => {
                let pacer_ref = pacer.as_mut().expect("pacer is set before entering Running");

                if pending_transition.is_none() {
                    match mailbox.try_recv() {
                        Ok(msg) if msg.state == ControlState::Pause => {
                            let stop_time = msg.time_stamp.unwrap_or_else(|| pacer_ref.logical_time());
                            pending_transition = Some((stop_time, Phase::Paused));
                        }
                        Ok(msg) if msg.state == ControlState::Stop => {
                            let stop_time = msg.time_stamp.unwrap_or_else(|| pacer_ref.logical_time());
                            pending_transition = Some((stop_time, Phase::Terminal));
                        }
                        Ok(_) => {}
                        Err(TryRecvError::Empty) => {}
                        Err(TryRecvError::Disconnected) => {
                            pending_transition = Some((pacer_ref.logical_time(), Phase::Terminal));
                        }
                    }
                }

                if pending_transition.is_none() {
                    if let Some(cap) = config.max_samples {
                        if sample_count >= cap {
                            pending_transition = Some((pacer_ref.logical_time(), Phase::Terminal));
                        }
                    }
                }
                if pending_transition.is_none() {
                    if let Some(cap) = config.max_time {
                        if pacer_ref.logical_time() - start_time >= cap {
                            pending_transition = Some((pacer_ref.logical_time(), Phase::Terminal));
                        }
                    }
                }

                // Pick `>=` for the stop_time/logical_time comparison (spec.md
                // §9 open question) so a stop scheduled exactly on a tick
                // boundary takes effect on that very tick rather than one
                // tick later.
                if let Some((stop_time, next_phase)) = pending_transition {
                    if pacer_ref.logical_time() >= stop_time {
                        phase = next_phase;
                        pending_transition = None;
                        continue;
                    }
                }

                let elapsed = pacer_ref.logical_time() - start_time;
                let timestamp = pacer_ref.next_timestamp();
                let Some(values) = config.source.next_values(sample_count, elapsed, config.descriptor.nominal_srate) else {
                    phase = Phase::Terminal;
                    continue;
                };
                let data = SampleData::from_f64(&values, config.descriptor.channel_format);
                outlet.push(data, timestamp)?;
                sample_count += 1;

                let _ = outbound.try_send(WorkerEvent::SamplesEmitted { key: key.clone(), sample_count });

                if let Some(monitor) = &monitor {
                    if timestamp - last_monitor_emit >= config.monitor_interval {
                        last_monitor_emit = timestamp;
                        let _ = monitor.send_heartbeat(&config.descriptor.name, sample_count);
                    }
                }

                pacer_ref.advance_and_wait().await;
            }
            Phase::Terminal => break,
        }
    }

    info!(stream = %config.descriptor.name, sample_count, "worker terminated");
    let _ = outbound.send(WorkerEvent::Terminated { key }).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::GeneratorTag;
    use crate::sample::ChannelFormat;

    fn descriptor() -> StreamDescriptor {
        StreamDescriptor::new("test", "data", 1, 0.0, ChannelFormat::Double64, "src")
    }

    fn config() -> WorkerConfig {
        WorkerConfig {
            descriptor: descriptor(),
            source: Box::new(GeneratorSource { generator: ChannelGenerators::new(&[GeneratorTag::Counter], 1), stream_idx: 0 }),
            max_time: None,
            max_samples: Some(3),
            chunk_size: 1,
            max_buffered: 1,
            monitor_interval: 1.0,
        }
    }

    #[tokio::test]
    async fn idle_ignores_pause_and_terminates_on_stop() {
        let (mailbox_tx, mailbox_rx) = mpsc::channel::<ControlMessage>(4);
        let (events_tx, _events_rx) = mpsc::channel(64);
        let key = StreamKey::new("test", "src", "", 1);

        let handle = tokio::spawn(run(config(), key, mailbox_rx, events_tx, None));

        mailbox_tx.send(ControlMessage { state: ControlState::Pause, latency: None, time_stamp: None }).await.unwrap();
        mailbox_tx.send(ControlMessage { state: ControlState::Stop, latency: None, time_stamp: None }).await.unwrap();

        let result = tokio::time::timeout(std::time::Duration::from_secs(2), handle).await;
        assert!(result.is_ok(), "PAUSE while idle must be ignored and STOP must terminate promptly");
        assert!(result.unwrap().unwrap().is_ok());
    }
}
