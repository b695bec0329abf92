//! Devices: source adapters plus the worker machinery that records them.

pub mod adapter;
pub mod worker;
