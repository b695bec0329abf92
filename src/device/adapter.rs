//! Source adapters: the seam between a device worker and its physical source.
//!
//! A worker never talks to hardware directly. It owns a boxed [`SourceAdapter`]
//! that turns whatever the source produces (serial bytes, SDK callbacks, a
//! simulation) into one row of channel values per call. Tests and the demo
//! binary inject [`SimulatedSource`]; real hardware gets its own adapter crate
//! or module without touching the worker.

use crate::error::Result;
use rand::random_range;
use spin_sleep::{SpinSleeper, SpinStrategy};
use std::time::{Duration, Instant};

/// Contract every sensing source implements.
///
/// `read` blocks until the next sample is available and returns one row of
/// channel values. Acquisition cancellation is cooperative: the worker stops
/// calling `read` once it is told to terminate, then calls `stop` so the
/// adapter can shut the underlying source down.
pub trait SourceAdapter: Send {
    fn start(&mut self) -> Result<()>;

    /// Blocks until the next sample and returns its channel values.
    fn read(&mut self) -> Result<Vec<f64>>;

    fn stop(&mut self);

    fn channels(&self) -> &[String];

    /// Nominal samples per second. Drives monitoring-window arithmetic only;
    /// real inter-sample spacing is whatever the source delivers.
    fn sampling_rate(&self) -> usize;

    /// Short label stored in snapshot metadata (e.g. "eeg", "gsr").
    fn kind(&self) -> &'static str {
        "generic"
    }
}

/// Sine-plus-noise source paced at a fixed sampling rate.
pub struct SimulatedSource {
    channels: Vec<String>,
    sampling_rate: usize,
    kind: &'static str,
    period: Duration,
    sleeper: SpinSleeper,
    next_tick: Option<Instant>,
    phase: f64,
}

impl SimulatedSource {
    pub fn new(kind: &'static str, channel_names: &[&str], sampling_rate: usize) -> Self {
        let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
        SimulatedSource {
            channels: channel_names.iter().map(|s| s.to_string()).collect(),
            sampling_rate,
            kind,
            period: Duration::from_secs_f64(1.0 / sampling_rate.max(1) as f64),
            sleeper,
            next_tick: None,
            phase: 0.0,
        }
    }
}

impl SourceAdapter for SimulatedSource {
    fn start(&mut self) -> Result<()> {
        self.next_tick = Some(Instant::now() + self.period);
        Ok(())
    }

    fn read(&mut self) -> Result<Vec<f64>> {
        let deadline = self.next_tick.get_or_insert_with(|| Instant::now() + self.period);
        let now = Instant::now();
        if now < *deadline {
            self.sleeper.sleep(*deadline - now);
        }
        *deadline += self.period;

        self.phase += 2.0 * std::f64::consts::PI / self.sampling_rate as f64;
        let base = self.phase.sin();
        let row = (0..self.channels.len())
            .map(|ch| base * (ch + 1) as f64 + random_range(-0.05..0.05))
            .collect();
        Ok(row)
    }

    fn stop(&mut self) {
        self.next_tick = None;
    }

    fn channels(&self) -> &[String] {
        &self.channels
    }

    fn sampling_rate(&self) -> usize {
        self.sampling_rate
    }

    fn kind(&self) -> &'static str {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_source_produces_one_row_per_read() {
        let mut source = SimulatedSource::new("eeg", &["ch1", "ch2", "ch3"], 500);
        source.start().unwrap();
        for _ in 0..5 {
            let row = source.read().unwrap();
            assert_eq!(row.len(), 3);
        }
        source.stop();
    }
}
