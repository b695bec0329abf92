//! Realtime snapshots: the read-only monitoring view of a device buffer.

use serde::{Deserialize, Serialize};

use crate::device::worker::Sample;

/// Static facts about the device a snapshot came from, so consumers can
/// interpret the rows without out-of-band knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub sampling_rate: usize,
    pub channels: Vec<String>,
    pub device_type: String,
}

/// The last `duration * sampling_rate` samples of a device buffer, captured
/// without mutating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeSnapshot {
    pub data: Vec<Sample>,
    pub metadata: SnapshotMetadata,
}

impl RealtimeSnapshot {
    /// Copies the trailing window out of `buffer`. When fewer samples exist
    /// than requested, whatever is available is returned; that is not an
    /// error, just a short window early in a session.
    pub fn capture(buffer: &[Sample], duration_secs: usize, metadata: SnapshotMetadata) -> Self {
        let wanted = duration_secs.saturating_mul(metadata.sampling_rate);
        let start = buffer.len().saturating_sub(wanted);
        RealtimeSnapshot {
            data: buffer[start..].to_vec(),
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(rate: usize) -> SnapshotMetadata {
        SnapshotMetadata {
            sampling_rate: rate,
            channels: vec!["ch1".to_string()],
            device_type: "eeg".to_string(),
        }
    }

    fn samples(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| Sample {
                values: vec![i as f64],
                timestamp: i as f64,
                trigger: None,
            })
            .collect()
    }

    #[test]
    fn capture_takes_trailing_window() {
        let buffer = samples(100);
        let snap = RealtimeSnapshot::capture(&buffer, 2, metadata(10));
        assert_eq!(snap.data.len(), 20);
        assert_eq!(snap.data[0].values[0], 80.0);
        assert_eq!(snap.data[19].values[0], 99.0);
    }

    #[test]
    fn capture_returns_all_samples_when_buffer_is_short() {
        let buffer = samples(5);
        let snap = RealtimeSnapshot::capture(&buffer, 3, metadata(10));
        assert_eq!(snap.data.len(), 5);
    }

    #[test]
    fn capture_of_empty_buffer_is_empty() {
        let snap = RealtimeSnapshot::capture(&[], 3, metadata(10));
        assert!(snap.data.is_empty());
    }
}
