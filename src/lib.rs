//! Synchronized multi-sensor acquisition and offline reconstruction.
//!
//! The online half is a control plane: a [`Coordinator`] fans immutable
//! [`Message`]s out to per-device workers, each of which runs its own
//! acquisition and monitoring loops and writes timestamped, trigger-tagged
//! CSV recordings according to its saving mode. Two HTTP endpoints expose
//! control dispatch and realtime snapshots to external processes.
//!
//! The offline half reverses the recordings: inline markers are split back
//! into trials, irregular sample timing is regularized to exact per-second
//! blocks, and per-modality cleaners filter the result into analysis-ready
//! trial files.

pub mod control;
pub mod device;
pub mod error;
pub mod monitoring;
pub mod reconstruct;

pub use control::coordinator::Coordinator;
pub use control::message::{Message, MessageKind};
pub use device::adapter::{SimulatedSource, SourceAdapter};
pub use device::worker::{Device, DeviceConfig, RunMode, Sample, SavingMode};
pub use error::{Error, Result};
