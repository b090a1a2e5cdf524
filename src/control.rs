//! Control channel: a single-channel string LSL marker stream carrying
//! JSON-encoded STOP/START/PAUSE transitions (spec.md §4.5, §6).

use crate::error::{EngineError, Result};
use crate::inlet::StreamInlet;
use crate::outlet::StreamOutlet;
use crate::resolver;
use crate::sample::{ChannelFormat, SampleData, StreamDescriptor};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Wire encoding per spec.md §6: `1=STOP, 2=START, 3=PAUSE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Stop,
    Start,
    Pause,
}

impl Serialize for ControlState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_i32(match self {
            ControlState::Stop => 1,
            ControlState::Start => 2,
            ControlState::Pause => 3,
        })
    }
}

impl<'de> Deserialize<'de> for ControlState {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match i32::deserialize(deserializer)? {
            1 => Ok(ControlState::Stop),
            2 => Ok(ControlState::Start),
            3 => Ok(ControlState::Pause),
            other => Err(serde::de::Error::custom(format!("unknown control state: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlMessage {
    pub state: ControlState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_stamp: Option<f64>,
}

impl ControlMessage {
    pub fn from_json(payload: &str) -> Result<Self> {
        serde_json::from_str(payload).map_err(|e| EngineError::MalformedControl(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

fn control_descriptor(name: &str, content_type: &str, source_id: &str) -> StreamDescriptor {
    let mut descriptor = StreamDescriptor::marker(name, content_type, source_id);
    descriptor.nominal_srate = 0.0;
    descriptor
}

/// Opens a control outlet and drives a REPL: lines `start`, `pause`, `stop`
/// (case-insensitive, trimmed) each push one `ControlMessage` stamped
/// `local_clock() + latency` (spec.md §4.5). Returns once stdin closes.
pub struct ControlSender {
    outlet: StreamOutlet,
    latency: f64,
}

impl ControlSender {
    pub fn new(name: &str, content_type: &str, source_id: &str, latency: f64) -> Result<Self> {
        let outlet = StreamOutlet::new(control_descriptor(name, content_type, source_id), 1, 1)?;
        Ok(Self { outlet, latency })
    }

    pub async fn run_repl(&self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("control> (start|pause|stop, Ctrl-D to quit)");
        while let Some(line) = lines.next_line().await? {
            let command = line.trim().to_ascii_lowercase();
            let state = match command.as_str() {
                "start" => ControlState::Start,
                "pause" => ControlState::Pause,
                "stop" => ControlState::Stop,
                "" => continue,
                other => {
                    warn!(command = other, "unrecognised control command");
                    continue;
                }
            };
            self.send(state)?;
        }
        Ok(())
    }

    pub fn send(&self, state: ControlState) -> Result<()> {
        let time_stamp = lsl::local_clock() + self.latency;
        let message = ControlMessage {
            state,
            latency: if state == ControlState::Start { Some(self.latency) } else { None },
            time_stamp: Some(time_stamp),
        };
        let payload = message.to_json()?;
        info!(?state, time_stamp, "sending control message");
        self.outlet.push(SampleData::marker(payload), time_stamp)
    }
}

/// Resolves a named control marker stream and forwards state-change-only
/// `ControlMessage`s to subscribers via a bounded queue (spec.md §4.5).
/// Runs its own resolve-and-pull loop on a blocking task because opening
/// and reading from an `lsl::StreamInlet` must happen off the async
/// executor's worker threads.
pub struct ControlReceiver {
    stop_flag: Arc<AtomicBool>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl ControlReceiver {
    pub fn spawn(name: String) -> (Self, mpsc::Receiver<ControlMessage>) {
        let (tx, rx) = mpsc::channel(16);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let thread_stop_flag = stop_flag.clone();

        let handle = tokio::task::spawn_blocking(move || receiver_loop(name, thread_stop_flag, tx));

        (Self { stop_flag, handle: Some(handle) }, rx)
    }

    pub async fn stop(mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

fn receiver_loop(name: String, stop_flag: Arc<AtomicBool>, tx: mpsc::Sender<ControlMessage>) {
    let predicate = format!("name='{name}'");

    let inlet = loop {
        if stop_flag.load(Ordering::Relaxed) {
            return;
        }
        // processing_flags=ALL per spec.md §4.5: enables the clock
        // synchronisation and jitter correction the synchronous-start and
        // relay re-encoding scenarios depend on.
        match StreamInlet::open(predicate.clone(), 0.5, ChannelFormat::String, 1, 1, false, &[lsl::ProcessingOption::ALL]) {
            Ok(inlet) => break inlet,
            Err(EngineError::ResolveTimeout) | Err(EngineError::StreamNotFound(_)) => continue,
            Err(e) => {
                warn!(error = %e, "control receiver failed to open inlet, retrying");
                continue;
            }
        }
    };

    let mut last_state: Option<ControlState> = None;

    while !stop_flag.load(Ordering::Relaxed) {
        match inlet.pull(0.5) {
            Ok(Some(sample)) => {
                let SampleData::String(payload) = sample.data else {
                    continue;
                };
                let Some(payload) = payload.into_iter().next() else { continue };
                match ControlMessage::from_json(&payload) {
                    Ok(mut message) => {
                        message.time_stamp = Some(sample.timestamp);
                        if last_state != Some(message.state) {
                            last_state = Some(message.state);
                            if tx.blocking_send(message).is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => debug!(error = %e, "dropped malformed control payload"),
                }
            }
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %e, "control receiver pull failed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_message_round_trips_through_json() {
        let message = ControlMessage { state: ControlState::Start, latency: Some(0.2), time_stamp: Some(123.456) };
        let json = message.to_json().unwrap();
        let parsed = ControlMessage::from_json(&json).unwrap();
        assert_eq!(parsed.state, ControlState::Start);
        assert_eq!(parsed.latency, Some(0.2));
    }

    #[test]
    fn control_state_encodes_to_spec_integers() {
        assert_eq!(serde_json::to_string(&ControlState::Stop).unwrap(), "1");
        assert_eq!(serde_json::to_string(&ControlState::Start).unwrap(), "2");
        assert_eq!(serde_json::to_string(&ControlState::Pause).unwrap(), "3");
    }

    #[test]
    fn malformed_payload_is_rejected_not_panicked() {
        assert!(ControlMessage::from_json("not json").is_err());
    }
}
