//! StreamOutlet: dedicated-thread wrapper around `lsl::StreamOutlet`,
//! generalized from the device-bridge LSL integration's outlet thread
//! to push any `ChannelFormat` for an arbitrary `StreamDescriptor` rather
//! than a handful of device-specific channel layouts.

use crate::error::{EngineError, Result};
use crate::sample::{ChannelFormat, SampleData, StreamDescriptor};
use std::sync::mpsc as std_mpsc;
use std::thread;
use tracing::{debug, info};

enum OutletCommand {
    Push { data: SampleData, timestamp: f64, response: std_mpsc::Sender<Result<()>> },
    Shutdown,
}

/// Owns an `lsl::StreamOutlet` on a dedicated OS thread, because the
/// underlying library object is not `Send`. All pushes are proxied over a
/// blocking std channel.
pub struct StreamOutlet {
    descriptor: StreamDescriptor,
    command_tx: std_mpsc::Sender<OutletCommand>,
    _thread_handle: Option<thread::JoinHandle<()>>,
}

impl std::fmt::Debug for StreamOutlet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamOutlet").field("descriptor", &self.descriptor).finish()
    }
}

impl StreamOutlet {
    pub fn new(descriptor: StreamDescriptor, chunk_size: i32, max_buffered: i32) -> Result<Self> {
        let (command_tx, command_rx) = std_mpsc::channel::<OutletCommand>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();

        let thread_descriptor = descriptor.clone();
        let thread_handle = thread::spawn(move || {
            let info = match build_stream_info(&thread_descriptor, chunk_size) {
                Ok(info) => info,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            let outlet = match lsl::StreamOutlet::new(&info, chunk_size, max_buffered) {
                Ok(outlet) => outlet,
                Err(e) => {
                    let _ = ready_tx.send(Err(EngineError::OutletCreationFailed(format!("{e:?}"))));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));

            info!(stream = %thread_descriptor.name, "outlet thread started");

            loop {
                match command_rx.recv() {
                    Ok(OutletCommand::Push { data, timestamp, response }) => {
                        let result = push_sample_to_lsl(&outlet, &data, timestamp);
                        let _ = response.send(result);
                    }
                    Ok(OutletCommand::Shutdown) | Err(_) => {
                        debug!(stream = %thread_descriptor.name, "outlet thread shutting down");
                        break;
                    }
                }
            }
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { descriptor, command_tx, _thread_handle: Some(thread_handle) }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(EngineError::OutletCreationFailed("outlet thread died before reporting readiness".into())),
        }
    }

    pub fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    /// `timestamp <= 0.0` means "use the outlet's own clock reading",
    /// matching `push_sample` vs `push_sample_ex` in the LSL API.
    pub fn push(&self, data: SampleData, timestamp: f64) -> Result<()> {
        let (response_tx, response_rx) = std_mpsc::channel();
        self.command_tx
            .send(OutletCommand::Push { data, timestamp, response: response_tx })
            .map_err(|_| EngineError::MailboxClosed)?;
        response_rx.recv().map_err(|_| EngineError::MailboxClosed)?
    }
}

impl Drop for StreamOutlet {
    fn drop(&mut self) {
        let _ = self.command_tx.send(OutletCommand::Shutdown);
    }
}

fn build_stream_info(descriptor: &StreamDescriptor, chunk_size: i32) -> Result<lsl::StreamInfo> {
    let mut info = lsl::StreamInfo::new(
        &descriptor.name,
        &descriptor.content_type,
        descriptor.channel_count as i32,
        descriptor.nominal_srate,
        descriptor.channel_format.to_lsl(),
        &descriptor.source_id,
    )
    .map_err(|e| EngineError::OutletCreationFailed(format!("{e:?}")))?;

    let _ = chunk_size;

    if !descriptor.channel_labels.is_empty() || !descriptor.channel_types.is_empty() || !descriptor.channel_units.is_empty() {
        let mut channels = info.desc().append_child("channels");
        for idx in 0..descriptor.channel_count as usize {
            let mut channel = channels.append_child("channel");
            if let Some(label) = descriptor.channel_labels.get(idx) {
                channel.append_child_value("label", label);
            }
            if let Some(ty) = descriptor.channel_types.get(idx) {
                channel.append_child_value("type", ty);
            }
            if let Some(unit) = descriptor.channel_units.get(idx) {
                channel.append_child_value("unit", unit);
            }
        }
    }
    for (key, value) in &descriptor.desc {
        info.desc().append_child_value(key, value);
    }

    Ok(info)
}

fn push_sample_to_lsl(outlet: &lsl::StreamOutlet, data: &SampleData, timestamp: f64) -> Result<()> {
    use lsl::{ExPushable, Pushable};

    let use_explicit_timestamp = timestamp > 0.0;

    macro_rules! push {
        ($values:expr) => {
            if use_explicit_timestamp {
                outlet
                    .push_sample_ex($values, timestamp, true)
                    .map_err(|e| EngineError::LslLibraryError(format!("push failed: {e:?}")))
            } else {
                outlet
                    .push_sample($values)
                    .map_err(|e| EngineError::LslLibraryError(format!("push failed: {e:?}")))
            }
        };
    }

    match data {
        SampleData::Float32(v) => push!(v),
        SampleData::Double64(v) => push!(v),
        SampleData::String(v) => push!(v),
        SampleData::Int32(v) => push!(v),
        SampleData::Int16(v) => push!(v),
        SampleData::Int8(v) => push!(v),
        SampleData::Int64(v) => push!(v),
    }?;

    Ok(())
}
