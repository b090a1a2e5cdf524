//! Monitor channel: lightweight per-worker heartbeat outlets plus a
//! receiver/aggregator that turns them into a one-line-per-stream status
//! view (spec.md §4.8).

use crate::error::Result;
use crate::inlet::StreamInlet;
use crate::outlet::StreamOutlet;
use crate::resolver::{self, ResolvedStream};
use crate::sample::{ChannelFormat, SampleData, StreamDescriptor};
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

fn monitor_descriptor(upstream_name: &str, source_id: &str) -> StreamDescriptor {
    let mut descriptor = StreamDescriptor::marker(format!("_monitor_{upstream_name}"), "monitor", source_id);
    descriptor.nominal_srate = 0.0;
    descriptor
}

/// Colocated with a Stream Worker; pushes `{name, sample_count, ...}`
/// heartbeats. `chunk_size=1, max_buffered=1` so a slow consumer never
/// accumulates backlog (spec.md §4.8).
pub struct MonitorSender {
    outlet: StreamOutlet,
}

impl MonitorSender {
    pub fn new(upstream_name: &str, source_id: &str) -> Result<Self> {
        let outlet = StreamOutlet::new(monitor_descriptor(upstream_name, source_id), 1, 1)?;
        Ok(Self { outlet })
    }

    pub fn send_json(&self, fields: Map<String, Value>) -> Result<()> {
        let payload = serde_json::to_string(&Value::Object(fields))?;
        self.outlet.push(SampleData::marker(payload), 0.0)
    }

    pub fn send_heartbeat(&self, name: &str, sample_count: u64) -> Result<()> {
        let mut fields = Map::new();
        fields.insert("name".into(), Value::String(name.to_string()));
        fields.insert("sample_count".into(), Value::Number(sample_count.into()));
        self.send_json(fields)
    }
}

/// A decoded monitor heartbeat, enriched with the upstream descriptor
/// fields the receiver can see but the sender's own payload may not carry.
#[derive(Debug, Clone)]
pub struct MonitorReport {
    pub source_id: String,
    pub hostname: String,
    pub name: String,
    pub fields: Map<String, Value>,
}

/// One per discovered `_monitor_*` stream: pulls samples, decodes JSON
/// (wrapping non-JSON payloads as `{message: raw}`), and enqueues reports
/// to the central aggregator.
pub struct MonitorReceiver {
    stop_flag: Arc<AtomicBool>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl MonitorReceiver {
    pub fn spawn(stream: ResolvedStream, tx: mpsc::Sender<MonitorReport>) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let thread_stop_flag = stop_flag.clone();
        let handle = tokio::task::spawn_blocking(move || receiver_loop(stream, thread_stop_flag, tx));
        Self { stop_flag, handle: Some(handle) }
    }

    pub async fn stop(mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

fn receiver_loop(stream: ResolvedStream, stop_flag: Arc<AtomicBool>, tx: mpsc::Sender<MonitorReport>) {
    let predicate = format!("uid='{}'", stream.uid);
    let inlet = match StreamInlet::open(predicate, 1.0, ChannelFormat::String, 1, 1, false, &[]) {
        Ok(inlet) => inlet,
        Err(e) => {
            warn!(stream = %stream.descriptor.name, error = %e, "monitor receiver failed to open inlet");
            return;
        }
    };

    let upstream_name = stream.descriptor.name.trim_start_matches("_monitor_").to_string();

    while !stop_flag.load(Ordering::Relaxed) {
        match inlet.pull(0.5) {
            Ok(Some(sample)) => {
                let SampleData::String(payload) = sample.data else { continue };
                let Some(payload) = payload.into_iter().next() else { continue };
                let fields = match serde_json::from_str::<Value>(&payload) {
                    Ok(Value::Object(map)) => map,
                    _ => {
                        let mut map = Map::new();
                        map.insert("message".into(), Value::String(payload));
                        map
                    }
                };
                let report = MonitorReport {
                    source_id: stream.descriptor.source_id.clone(),
                    hostname: stream.descriptor.hostname.clone(),
                    name: upstream_name.clone(),
                    fields,
                };
                if tx.blocking_send(report).is_err() {
                    break;
                }
            }
            Ok(None) => continue,
            Err(e) => {
                debug!(error = %e, "monitor receiver pull failed, stream likely gone");
                break;
            }
        }
    }
}

/// Maintains `source_id -> latest_message` and renders one line per stream
/// (spec.md §4.8).
#[derive(Debug, Default)]
pub struct Aggregator {
    latest: DashMap<String, MonitorReport>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(&self, report: MonitorReport) {
        self.latest.insert(report.source_id.clone(), report);
    }

    pub fn render(&self) -> Vec<String> {
        let now = chrono::Local::now().format("%H:%M:%S%.3f");
        self.latest
            .iter()
            .map(|entry| {
                let report = entry.value();
                format!("[{now}] {} ({}@{}): {}", report.name, report.source_id, report.hostname, Value::Object(report.fields.clone()))
            })
            .collect()
    }
}

/// Run the monitor aggregator's own resolver loop: rediscover `_monitor_*`
/// streams every second, spawning a receiver for each one not already
/// tracked (shape shared with the Supervisor's resolver loop, spec.md §4.6).
pub async fn run_aggregator_loop(aggregator: Arc<Aggregator>, mut stop: tokio::sync::watch::Receiver<bool>) -> Result<()> {
    let mut receivers: std::collections::HashMap<String, MonitorReceiver> = std::collections::HashMap::new();
    let (tx, mut rx) = mpsc::channel(256);
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let resolved = resolver::resolve(resolver::monitor_predicate(), 0.5).await?;
                for stream in resolved {
                    if !receivers.contains_key(&stream.uid) {
                        info!(stream = %stream.descriptor.name, "monitor aggregator tracking new stream");
                        let receiver = MonitorReceiver::spawn(stream.clone(), tx.clone());
                        receivers.insert(stream.uid.clone(), receiver);
                    }
                }
            }
            Some(report) = rx.recv() => {
                aggregator.ingest(report);
                for line in aggregator.render() {
                    println!("{line}");
                }
            }
            _ = stop.changed() => {
                if *stop.borrow() {
                    break;
                }
            }
        }
    }

    for (_, receiver) in receivers {
        receiver.stop().await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregator_keeps_latest_report_per_source() {
        let aggregator = Aggregator::new();
        let mut fields_a = Map::new();
        fields_a.insert("sample_count".into(), Value::Number(1.into()));
        aggregator.ingest(MonitorReport { source_id: "s1".into(), hostname: "h1".into(), name: "eeg".into(), fields: fields_a });

        let mut fields_b = Map::new();
        fields_b.insert("sample_count".into(), Value::Number(2.into()));
        aggregator.ingest(MonitorReport { source_id: "s1".into(), hostname: "h1".into(), name: "eeg".into(), fields: fields_b });

        let rendered = aggregator.render();
        assert_eq!(rendered.len(), 1);
        assert!(rendered[0].contains("\"sample_count\":2"));
    }

    #[test]
    fn non_json_payload_is_wrapped_as_message() {
        let fields: Map<String, Value> = match serde_json::from_str::<Value>("not json") {
            Ok(Value::Object(map)) => map,
            _ => {
                let mut map = Map::new();
                map.insert("message".into(), Value::String("not json".into()));
                map
            }
        };
        assert_eq!(fields.get("message").unwrap(), "not json");
    }
}
