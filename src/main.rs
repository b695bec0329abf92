//! Scripted demo session: two simulated devices, a short stimulus sequence,
//! then offline reconstruction of everything that was recorded.

use log::info;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sensorium::monitoring::endpoint::{start_control_endpoint, start_realtime_endpoint};
use sensorium::reconstruct::preprocess::{Modality, PreprocessOptions, preprocess_recording};
use sensorium::{Coordinator, Device, DeviceConfig, Message, Result, SavingMode, SimulatedSource};

const CONTROL_PORT: u16 = 9331;
const REALTIME_PORT: u16 = 9330;

const EXPERIMENT_ID: &str = "demo01";
const EEG_RATE: usize = 128;
const GSR_RATE: usize = 16;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let output_dir = std::path::PathBuf::from("recordings");
    let eeg_channels = ["fp1", "fp2", "c3", "c4", "p3", "p4", "o1", "o2"];

    let coordinator = Arc::new(Coordinator::new());
    coordinator.register(Device::new(
        Box::new(SimulatedSource::new("eeg", &eeg_channels, EEG_RATE)),
        DeviceConfig::new("eeg", SavingMode::Continuous, &output_dir),
    ))?;
    coordinator.register(Device::new(
        Box::new(SimulatedSource::new("gsr", &["conductance"], GSR_RATE)),
        DeviceConfig::new("gsr", SavingMode::Separated, &output_dir),
    ))?;

    let control = start_control_endpoint(coordinator.clone(), CONTROL_PORT)?;
    let realtime = start_realtime_endpoint(coordinator.clone(), REALTIME_PORT)?;

    info!(
        "session {EXPERIMENT_ID} starting with devices {:?}",
        coordinator.device_names()
    );

    for stimulus in 0..3 {
        let stimulus_id = stimulus.to_string();
        thread::sleep(Duration::from_secs(2));

        coordinator.dispatch(&Message::start(EXPERIMENT_ID, &stimulus_id));
        info!("stimulus {stimulus_id} started");
        thread::sleep(Duration::from_secs(4));

        coordinator.dispatch(&Message::stop(EXPERIMENT_ID, &stimulus_id));
        info!("stimulus {stimulus_id} stopped");
    }

    let snapshots = coordinator.realtime_data(3, None);
    for (name, snapshot) in &snapshots {
        let rows = snapshot["data"].as_array().map_or(0, |a| a.len());
        info!("realtime check: '{name}' has {rows} samples in the last 3s");
    }

    coordinator.terminate();
    coordinator.join();
    control.stop();
    realtime.stop();
    info!("session {EXPERIMENT_ID} finished; reconstructing trials");

    let reconstructed = output_dir.join("preprocessed");
    let eeg_channel_names: Vec<String> = eeg_channels.iter().map(|s| s.to_string()).collect();
    let written = preprocess_recording(
        &output_dir.join(format!("eeg-{EXPERIMENT_ID}.csv")),
        &reconstructed,
        &eeg_channel_names,
        SavingMode::Continuous,
        &PreprocessOptions::new(EEG_RATE, Modality::Eeg),
    )?;
    info!("eeg: {} trial files written", written.len());

    for stimulus in 0..3 {
        let input = output_dir.join(format!("gsr-{EXPERIMENT_ID}-{stimulus}.csv"));
        let written = preprocess_recording(
            &input,
            &reconstructed,
            &["conductance".to_string()],
            SavingMode::Separated,
            &PreprocessOptions::new(GSR_RATE, Modality::Gsr),
        )?;
        info!("gsr stimulus {stimulus}: {} file(s) written", written.len());
    }

    Ok(())
}
