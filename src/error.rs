use thiserror::Error;

/// Errors shared across the LSL stream engine.
///
/// Individual subsystems (outlet, inlet, resolver, control, monitor) define
/// their own narrower error enums; this one is what the CLI entry points and
/// the supervisor see once those are collapsed.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to create stream outlet: {0}")]
    OutletCreationFailed(String),

    #[error("failed to create stream inlet: {0}")]
    InletCreationFailed(String),

    #[error("stream not found: {0}")]
    StreamNotFound(String),

    #[error("data format mismatch: expected {expected}, got {actual}")]
    DataFormatMismatch { expected: String, actual: String },

    #[error("stream resolution timed out")]
    ResolveTimeout,

    #[error("invalid sample data: {0}")]
    InvalidSampleData(String),

    #[error("lsl library error: {0}")]
    LslLibraryError(String),

    #[error("worker mailbox closed")]
    MailboxClosed,

    #[error("malformed control message: {0}")]
    MalformedControl(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
