//! Crate-wide error taxonomy.
//!
//! Protocol errors (bad HTTP bodies, unknown saving modes) surface to the
//! caller synchronously and never cross into a device worker. Failures inside
//! a worker end that worker's loops only; the coordinator keeps running.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("device '{0}' is already registered")]
    DuplicateDevice(String),

    #[error("unknown saving mode '{0}'")]
    UnknownSavingMode(String),

    #[error("malformed recording {path:?}: {detail}")]
    MalformedRecording { path: PathBuf, detail: String },

    #[error("source adapter failure: {0}")]
    Adapter(String),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("endpoint failure: {0}")]
    Endpoint(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
