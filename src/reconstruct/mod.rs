//! Offline reconstruction: recordings back into analysis-ready trials.

pub mod clean;
pub mod preprocess;
pub mod resample;
pub mod trials;
