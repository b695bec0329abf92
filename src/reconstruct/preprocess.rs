//! Recording-to-trials preprocessing: the offline entry point.
//!
//! Takes one raw recording file plus the saving mode it was written under,
//! and emits per-trial CSV files of regularized (and optionally cleaned)
//! data. Continuous session files are split on their inline markers first;
//! separated files are already one trial each.

use log::{info, warn};
use std::path::{Path, PathBuf};

use crate::device::worker::SavingMode;
use crate::error::Result;
use crate::reconstruct::clean::{clean_eeg, clean_gsr, clean_ppg};
use crate::reconstruct::resample::resample;
use crate::reconstruct::trials::{extract_trials, load_samples};

/// Which cleaner runs after rate regularization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Modality {
    Eeg,
    Gsr,
    Ppg,
    /// Resample only, no filtering.
    #[default]
    Generic,
}

#[derive(Debug, Clone)]
pub struct PreprocessOptions {
    /// Nominal sampling rate of the recording device.
    pub sampling_rate: usize,
    pub modality: Modality,
    /// Skip the modality cleaner and keep raw resampled values.
    pub resample_only: bool,
}

impl PreprocessOptions {
    pub fn new(sampling_rate: usize, modality: Modality) -> Self {
        PreprocessOptions {
            sampling_rate,
            modality,
            resample_only: false,
        }
    }
}

/// Processes one recording into per-trial files under `output_dir` and
/// returns the paths written.
///
/// Continuous recordings produce `{stem}-{NN}.csv` per extracted trial;
/// separated recordings produce a single `{stem}.csv`. Empty trials (a STOP
/// marker with no preceding data) are logged and skipped, not written.
pub fn preprocess_recording(
    input_file: &Path,
    output_dir: &Path,
    channels: &[String],
    saving_mode: SavingMode,
    options: &PreprocessOptions,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)?;
    let stem = input_file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("recording");

    let mut written = Vec::new();
    match saving_mode {
        SavingMode::Separated => {
            let (data, times) = load_samples(input_file, channels.len())?;
            let processed = regularize(&data, &times, options);
            let path = output_dir.join(format!("{stem}.csv"));
            write_trial(&path, channels, &processed)?;
            info!("{input_file:?}: wrote {} rows to {path:?}", processed.len());
            written.push(path);
        }
        SavingMode::Continuous => {
            for trial in extract_trials(input_file, channels.len())? {
                if trial.data.is_empty() {
                    warn!("{input_file:?}: trial {:02} is empty, skipped", trial.number);
                    continue;
                }
                let processed = regularize(&trial.data, &trial.times, options);
                let path = output_dir.join(format!("{stem}-{:02}.csv", trial.number));
                write_trial(&path, channels, &processed)?;
                info!(
                    "{input_file:?}: trial {:02} wrote {} rows to {path:?}",
                    trial.number,
                    processed.len()
                );
                written.push(path);
            }
        }
    }
    Ok(written)
}

fn regularize(data: &[Vec<f32>], times: &[f64], options: &PreprocessOptions) -> Vec<Vec<f32>> {
    let resampled = resample(data, times, options.sampling_rate);
    if options.resample_only {
        return resampled;
    }
    match options.modality {
        Modality::Eeg => clean_eeg(&resampled, options.sampling_rate),
        Modality::Gsr => clean_gsr(&resampled, options.sampling_rate),
        Modality::Ppg => clean_ppg(&resampled, options.sampling_rate),
        Modality::Generic => resampled,
    }
}

fn write_trial(path: &Path, channels: &[String], rows: &[Vec<f32>]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(channels)?;
    for row in rows {
        writer.write_record(row.iter().map(|v| format!("{v:.6}")))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn channels() -> Vec<String> {
        vec!["ch1".to_string(), "ch2".to_string()]
    }

    fn write_session_file(dir: &Path, lines: &[String]) -> PathBuf {
        let path = dir.join("dev-e1.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "ch1,ch2,timestamp,trigger").unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        path
    }

    #[test]
    fn continuous_recording_splits_into_numbered_trial_files() {
        let dir = tempfile::tempdir().unwrap();
        let rate = 4;
        let mut lines = Vec::new();
        // Trial 0: two seconds of on-grid samples, START inline, STOP after.
        for i in 0..9 {
            let t = 100.0 + i as f64 * 0.25;
            let marker = if i == 0 { ",START-e1-00" } else { "" };
            lines.push(format!("{i}.0,{i}.5,{t:.6}{marker}"));
        }
        lines.push(format!("9.0,9.5,102.250000,STOP-e1-00"));
        // Trial 1 lacks enough data and will resample to a full block anyway.
        lines.push(format!("1.0,1.0,110.000000,START-e1-01"));
        lines.push(format!("2.0,2.0,110.400000"));
        lines.push(format!("3.0,3.0,110.800000"));
        lines.push(format!("4.0,4.0,111.500000,STOP-e1-01"));

        let input = write_session_file(dir.path(), &lines);
        let out_dir = dir.path().join("out");
        let options = PreprocessOptions::new(rate, Modality::Generic);
        let written = preprocess_recording(
            &input,
            &out_dir,
            &channels(),
            SavingMode::Continuous,
            &options,
        )
        .unwrap();

        assert_eq!(
            written,
            vec![out_dir.join("dev-e1-00.csv"), out_dir.join("dev-e1-01.csv")]
        );
        let first = std::fs::read_to_string(&written[0]).unwrap();
        // Header plus two full one-second blocks.
        assert_eq!(first.lines().count(), 1 + 2 * rate);
        assert!(first.starts_with("ch1,ch2"));
    }

    #[test]
    fn empty_trial_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let lines = vec!["1.0,1.0,10.000000,STOP-e1-00".to_string()];
        let input = write_session_file(dir.path(), &lines);
        let out_dir = dir.path().join("out");

        let written = preprocess_recording(
            &input,
            &out_dir,
            &channels(),
            SavingMode::Continuous,
            &PreprocessOptions::new(4, Modality::Generic),
        )
        .unwrap();
        assert!(written.is_empty());
    }

    #[test]
    fn separated_recording_yields_one_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev-e1-00.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "ch1,ch2,timestamp,trigger").unwrap();
        for i in 0..8 {
            writeln!(file, "{i}.0,{i}.5,{:.6}", 50.0 + i as f64 * 0.25).unwrap();
        }
        drop(file);

        let out_dir = dir.path().join("out");
        let written = preprocess_recording(
            &path,
            &out_dir,
            &channels(),
            SavingMode::Separated,
            &PreprocessOptions::new(4, Modality::Generic),
        )
        .unwrap();

        assert_eq!(written, vec![out_dir.join("dev-e1-00.csv")]);
        let contents = std::fs::read_to_string(&written[0]).unwrap();
        assert!(contents.lines().count() > 1);
    }
}
