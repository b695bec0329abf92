//! Monitoring: realtime snapshots and the HTTP surface that exposes them.

pub mod endpoint;
pub mod snapshot;
