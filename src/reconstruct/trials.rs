//! Recording loaders and the trial extractor.
//!
//! Recordings are CSV files with a header row of channel names followed by
//! `timestamp` and `trigger`; data rows carry the trailing trigger field only
//! when tagged. Continuous-mode session files interleave START/STOP markers
//! with data; the extractor splits them back into per-stimulus trials.

use log::warn;
use std::mem;
use std::path::Path;

use crate::error::{Error, Result};

/// One extracted stimulus window: the rows between a START marker and its
/// matching STOP, tagged with the trial number both markers carry.
#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    pub number: u32,
    /// Rows of channel values, channels in file order.
    pub data: Vec<Vec<f32>>,
    /// Per-row timestamps, seconds since the epoch.
    pub times: Vec<f64>,
}

struct Row {
    values: Vec<f32>,
    time: f64,
    trigger: Option<String>,
}

fn malformed(path: &Path, detail: String) -> Error {
    Error::MalformedRecording {
        path: path.to_path_buf(),
        detail,
    }
}

fn read_rows(path: &Path, n_channels: usize) -> Result<Vec<Row>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() < n_channels + 1 {
            return Err(malformed(
                path,
                format!(
                    "row {} has {} fields, expected at least {}",
                    index + 2,
                    record.len(),
                    n_channels + 1
                ),
            ));
        }

        let mut values = Vec::with_capacity(n_channels);
        for cell in record.iter().take(n_channels) {
            let parsed = cell
                .trim()
                .parse::<f32>()
                .map_err(|_| malformed(path, format!("bad channel value '{cell}'")))?;
            values.push(parsed);
        }
        let time_cell = record.get(n_channels).unwrap_or("");
        let time = time_cell
            .trim()
            .parse::<f64>()
            .map_err(|_| malformed(path, format!("bad timestamp '{time_cell}'")))?;
        let trigger = record
            .get(n_channels + 1)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        rows.push(Row { values, time, trigger });
    }
    Ok(rows)
}

/// Loads a whole recording as (rows, timestamps), ignoring trigger markers.
/// Used for separated-mode files, which are one trial each by construction.
pub fn load_samples(path: &Path, n_channels: usize) -> Result<(Vec<Vec<f32>>, Vec<f64>)> {
    let rows = read_rows(path, n_channels)?;
    let mut data = Vec::with_capacity(rows.len());
    let mut times = Vec::with_capacity(rows.len());
    for row in rows {
        data.push(row.values);
        times.push(row.time);
    }
    Ok((data, times))
}

/// Splits a continuous-mode session file into its trials.
pub fn extract_trials(path: &Path, n_channels: usize) -> Result<Vec<Trial>> {
    let rows = read_rows(path, n_channels)?;
    split_trials(rows, path)
}

/// The marker walk. A START row opens a trial and is itself included; a STOP
/// row closes it, is excluded, and flushes the accumulator under the STOP
/// marker's trial number. A START with no matching STOP is discarded.
fn split_trials(rows: Vec<Row>, path: &Path) -> Result<Vec<Trial>> {
    let mut trials = Vec::new();
    let mut open = false;
    let mut data: Vec<Vec<f32>> = Vec::new();
    let mut times: Vec<f64> = Vec::new();

    for row in rows {
        if let Some(trigger) = &row.trigger {
            let action = trigger.get(..4).unwrap_or(trigger.as_str());
            match action {
                "STAR" => open = true,
                "STOP" => {
                    open = false;
                    trials.push(Trial {
                        number: trial_number(trigger, path)?,
                        data: mem::take(&mut data),
                        times: mem::take(&mut times),
                    });
                }
                other => warn!("{path:?}: unrecognized marker action '{other}'"),
            }
        }
        if open {
            data.push(row.values);
            times.push(row.time);
        }
    }

    if open {
        warn!("{path:?}: trailing START without STOP; {} rows discarded", data.len());
    }
    Ok(trials)
}

/// Trial numbers are the marker's trailing two digits.
fn trial_number(trigger: &str, path: &Path) -> Result<u32> {
    let start = trigger.len().saturating_sub(2);
    let digits = trigger.get(start..).unwrap_or("");
    digits
        .parse::<u32>()
        .map_err(|_| malformed(path, format!("bad trial number in marker '{trigger}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn write_recording(lines: &[&str]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev-e1.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "ch1,ch2,timestamp,trigger").unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        (dir, path)
    }

    #[test]
    fn extracts_rows_between_start_and_stop() {
        let (_dir, path) = write_recording(&[
            "0.1,0.2,100.000000",
            "0.3,0.4,100.250000,START-e1-00",
            "0.5,0.6,100.500000",
            "0.7,0.8,100.750000,STOP-e1-00",
            "0.9,1.0,101.000000",
        ]);
        let trials = extract_trials(&path, 2).unwrap();
        assert_eq!(trials.len(), 1);
        assert_eq!(trials[0].number, 0);
        // START row included, STOP row and surroundings excluded.
        assert_eq!(trials[0].data, vec![vec![0.3, 0.4], vec![0.5, 0.6]]);
        assert_eq!(trials[0].times, vec![100.25, 100.5]);
    }

    #[test]
    fn splits_multiple_trials_by_number() {
        let (_dir, path) = write_recording(&[
            "1.0,1.0,10.000000,START-e1-00",
            "2.0,2.0,10.100000",
            "3.0,3.0,10.200000,STOP-e1-00",
            "4.0,4.0,10.300000",
            "5.0,5.0,10.400000,START-e1-01",
            "6.0,6.0,10.500000,STOP-e1-01",
        ]);
        let trials = extract_trials(&path, 2).unwrap();
        assert_eq!(trials.len(), 2);
        assert_eq!(trials[0].number, 0);
        assert_eq!(trials[0].data.len(), 2);
        assert_eq!(trials[1].number, 1);
        assert_eq!(trials[1].data.len(), 1);
    }

    #[test]
    fn start_without_stop_is_discarded() {
        let (_dir, path) = write_recording(&[
            "1.0,1.0,10.000000,START-e1-00",
            "2.0,2.0,10.100000,STOP-e1-00",
            "3.0,3.0,10.200000,START-e1-01",
            "4.0,4.0,10.300000",
        ]);
        let trials = extract_trials(&path, 2).unwrap();
        assert_eq!(trials.len(), 1);
        assert_eq!(trials[0].number, 0);
    }

    #[test]
    fn stop_without_start_emits_empty_trial() {
        let (_dir, path) = write_recording(&["1.0,1.0,10.000000,STOP-e1-02"]);
        let trials = extract_trials(&path, 2).unwrap();
        assert_eq!(trials.len(), 1);
        assert_eq!(trials[0].number, 2);
        assert!(trials[0].data.is_empty());
    }

    #[test]
    fn bad_trial_number_is_fatal_for_the_file() {
        let (_dir, path) = write_recording(&[
            "1.0,1.0,10.000000,START-e1-00",
            "2.0,2.0,10.100000,STOP-e1-xy",
        ]);
        let err = extract_trials(&path, 2);
        assert!(matches!(err, Err(Error::MalformedRecording { .. })));
    }

    #[test]
    fn bad_numeric_cell_is_fatal() {
        let (_dir, path) = write_recording(&["oops,1.0,10.000000"]);
        assert!(matches!(
            load_samples(&path, 2),
            Err(Error::MalformedRecording { .. })
        ));
    }

    #[test]
    fn load_samples_keeps_every_row() {
        let (_dir, path) = write_recording(&[
            "1.0,2.0,10.000000",
            "3.0,4.0,10.100000,START-e1-00",
            "5.0,6.0,10.200000",
        ]);
        let (data, times) = load_samples(&path, 2).unwrap();
        assert_eq!(data.len(), 3);
        assert_eq!(times, vec![10.0, 10.1, 10.2]);
    }
}
