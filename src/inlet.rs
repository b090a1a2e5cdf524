//! StreamInlet: dedicated-thread wrapper around `lsl::StreamInlet`,
//! generalized from the device-bridge LSL integration's inlet thread to
//! pull any `ChannelFormat` and to surface the LSL "timestamp 0.0 means
//! timed out" convention as `Ok(None)` rather than a sentinel sample.

use crate::error::{EngineError, Result};
use crate::sample::{ChannelFormat, Sample, SampleData};
use lsl::ProcessingOption;
use std::sync::mpsc as std_mpsc;
use std::thread;
use tracing::{debug, info};

enum InletCommand {
    Pull { timeout: f64, response: std_mpsc::Sender<Result<Option<Sample>>> },
    Shutdown,
}

/// Owns an `lsl::StreamInlet` on a dedicated OS thread. Must be opened and
/// closed from the same thread (spec.md §3 Lifecycle), which this wrapper
/// guarantees by never letting the inlet value itself leave the thread.
pub struct StreamInlet {
    command_tx: std_mpsc::Sender<InletCommand>,
    _thread_handle: Option<thread::JoinHandle<()>>,
}

impl std::fmt::Debug for StreamInlet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamInlet").finish()
    }
}

impl StreamInlet {
    /// Resolves a stream matching `predicate` and opens an inlet with the
    /// given buffering, all from inside the dedicated thread: `lsl::StreamInfo`
    /// is not `Send`, so the resolve call must happen on the same thread that
    /// will go on to own the inlet built from it (mirrors the device-bridge
    /// inlet thread, which resolves by `uid` internally rather than accepting
    /// a pre-resolved `StreamInfo` from the caller).
    ///
    /// `postprocessing` is applied via `set_postprocessing` before the pull
    /// loop starts; pass `&[]` for ground-truth timestamps (the default LSL
    /// behaviour) or `&[ProcessingOption::ALL]` where spec.md mandates clock
    /// synchronisation and jitter correction (the Control Receiver, per
    /// spec.md §4.5).
    pub fn open(
        predicate: String,
        resolve_timeout: f64,
        channel_format: ChannelFormat,
        max_buflen: i32,
        max_chunklen: i32,
        recover: bool,
        postprocessing: &[ProcessingOption],
    ) -> Result<Self> {
        let postprocessing = postprocessing.to_vec();
        let (command_tx, command_rx) = std_mpsc::channel::<InletCommand>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();

        let thread_handle = thread::spawn(move || {
            let lsl_streams = match lsl::resolve_bypred(&predicate, 1, resolve_timeout) {
                Ok(streams) => streams,
                Err(e) => {
                    let _ = ready_tx.send(Err(EngineError::ResolveTimeout));
                    let _ = e;
                    return;
                }
            };
            let Some(lsl_info) = lsl_streams.into_iter().next() else {
                let _ = ready_tx.send(Err(EngineError::StreamNotFound(predicate.clone())));
                return;
            };

            let inlet = match lsl::StreamInlet::new(&lsl_info, max_buflen, max_chunklen, recover) {
                Ok(inlet) => inlet,
                Err(e) => {
                    let _ = ready_tx.send(Err(EngineError::InletCreationFailed(format!("{e:?}"))));
                    return;
                }
            };
            if let Err(e) = inlet.open_stream(5.0) {
                let _ = ready_tx.send(Err(EngineError::InletCreationFailed(format!("open_stream failed: {e:?}"))));
                return;
            }
            if !postprocessing.is_empty() {
                if let Err(e) = inlet.set_postprocessing(&postprocessing) {
                    let _ = ready_tx.send(Err(EngineError::InletCreationFailed(format!("set_postprocessing failed: {e:?}"))));
                    return;
                }
            }
            let _ = ready_tx.send(Ok(()));

            info!("inlet thread started");

            loop {
                match command_rx.recv() {
                    Ok(InletCommand::Pull { timeout, response }) => {
                        let result = pull_sample_from_lsl(&inlet, channel_format, timeout);
                        let _ = response.send(result);
                    }
                    Ok(InletCommand::Shutdown) | Err(_) => {
                        debug!("inlet thread shutting down");
                        inlet.close_stream();
                        break;
                    }
                }
            }
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { command_tx, _thread_handle: Some(thread_handle) }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(EngineError::InletCreationFailed("inlet thread died before reporting readiness".into())),
        }
    }

    /// Returns `Ok(None)` on timeout, matching the `timestamp == 0.0` LSL
    /// convention (never a valid timestamp for a real sample).
    pub fn pull(&self, timeout: f64) -> Result<Option<Sample>> {
        let (response_tx, response_rx) = std_mpsc::channel();
        self.command_tx
            .send(InletCommand::Pull { timeout, response: response_tx })
            .map_err(|_| EngineError::MailboxClosed)?;
        response_rx.recv().map_err(|_| EngineError::MailboxClosed)?
    }
}

impl Drop for StreamInlet {
    fn drop(&mut self) {
        let _ = self.command_tx.send(InletCommand::Shutdown);
    }
}

fn pull_sample_from_lsl(inlet: &lsl::StreamInlet, channel_format: ChannelFormat, timeout: f64) -> Result<Option<Sample>> {
    use lsl::Pullable;

    macro_rules! pull {
        ($ty:ty, $variant:ident) => {{
            let (values, ts): ($ty, f64) = inlet
                .pull_sample(timeout)
                .map_err(|e| EngineError::LslLibraryError(format!("pull failed: {e:?}")))?;
            if ts == 0.0 || values.is_empty() {
                Ok(None)
            } else {
                Ok(Some(Sample { data: SampleData::$variant(values), timestamp: ts }))
            }
        }};
    }

    match channel_format {
        ChannelFormat::Float32 => pull!(Vec<f32>, Float32),
        ChannelFormat::Double64 => pull!(Vec<f64>, Double64),
        ChannelFormat::String => pull!(Vec<String>, String),
        ChannelFormat::Int32 => pull!(Vec<i32>, Int32),
        ChannelFormat::Int16 => pull!(Vec<i16>, Int16),
        ChannelFormat::Int8 => pull!(Vec<i8>, Int8),
        ChannelFormat::Int64 => pull!(Vec<i64>, Int64),
    }
}
