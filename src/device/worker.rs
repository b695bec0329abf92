//! Device worker: one autonomous unit of concurrency per sensing source.
//!
//! Each worker runs three loops:
//! - **Control loop** (the worker thread itself): blocks on the command queue,
//!   applies the saving-mode policy and drives the IDLE → RECORDING → IDLE →
//!   TERMINATED state machine.
//! - **Acquisition loop** (own thread): blocks on the source adapter, stamps
//!   each row with a timestamp and, when armed, the pending trigger.
//! - **Monitor loop** (own thread): answers realtime-snapshot requests with a
//!   short producer-side timeout so acquisition never stalls for a slow poller.
//!
//! The armed trigger is a single-slot, overwrite-semantics channel between the
//! control loop and the acquisition loop. Because the two loops run
//! concurrently, a trigger may land a few sampling periods after the logical
//! event instant; that bounded latency is part of the recording contract and
//! is never corrected retroactively.

use crossbeam::channel::{Receiver, Sender};
use crossbeam_queue::ArrayQueue;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::control::message::{Message, MessageKind};
use crate::device::adapter::SourceAdapter;
use crate::error::{Error, Result};
use crate::monitoring::snapshot::{RealtimeSnapshot, SnapshotMetadata};

/// How START/STOP map onto files for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SavingMode {
    /// One buffer and one file for the whole session; START/STOP become
    /// inline trigger markers and only TERMINATE (or SAVE) flushes to disk.
    Continuous,
    /// One file per (experiment, stimulus); START clears the buffer, STOP
    /// flushes it to its own file.
    Separated,
}

impl SavingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SavingMode::Continuous => "continuous",
            SavingMode::Separated => "separated",
        }
    }
}

impl FromStr for SavingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "continuous" => Ok(SavingMode::Continuous),
            "separated" => Ok(SavingMode::Separated),
            other => Err(Error::UnknownSavingMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Idle,
    Recording,
    Terminated,
}

/// Scheduling backend for a registered worker.
///
/// Selected once at composition time and threaded through construction; there
/// is no global switch. Only the in-process thread backend exists today: an
/// OS-process backend would change the wire format of every channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Threaded,
}

/// One timestamped row of channel values, optionally tagged with a trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub values: Vec<f64>,
    /// Seconds since the Unix epoch, fractional.
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Unique device name; the coordinator assigns `device_{n}` when absent.
    pub name: Option<String>,
    pub saving_mode: SavingMode,
    /// Directory recordings are written into.
    pub output_path: PathBuf,
    pub run_mode: RunMode,
}

impl DeviceConfig {
    pub fn new(name: &str, saving_mode: SavingMode, output_path: impl Into<PathBuf>) -> Self {
        DeviceConfig {
            name: Some(name.to_string()),
            saving_mode,
            output_path: output_path.into(),
            run_mode: RunMode::default(),
        }
    }

    pub fn unnamed(saving_mode: SavingMode, output_path: impl Into<PathBuf>) -> Self {
        DeviceConfig {
            name: None,
            saving_mode,
            output_path: output_path.into(),
            run_mode: RunMode::default(),
        }
    }
}

/// An unstarted device: an adapter plus its configuration. Registering it
/// with a coordinator consumes it and spawns the worker.
pub struct Device {
    pub(crate) config: DeviceConfig,
    pub(crate) adapter: Box<dyn SourceAdapter>,
}

impl Device {
    pub fn new(adapter: Box<dyn SourceAdapter>, config: DeviceConfig) -> Self {
        Device { config, adapter }
    }

    pub fn name(&self) -> Option<&str> {
        self.config.name.as_deref()
    }
}

/// Channel ends handed to a spawned worker by the coordinator.
pub(crate) struct WorkerChannels {
    pub command_rx: Receiver<Message>,
    pub monitor_rx: Receiver<u64>,
    pub snapshot_tx: Sender<String>,
}

/// Spawns the worker for a registered device and returns its join handle.
pub(crate) fn spawn(name: String, device: Device, channels: WorkerChannels) -> JoinHandle<()> {
    let Device { config, adapter } = device;
    match config.run_mode {
        RunMode::Threaded => thread::spawn(move || {
            let worker = Worker::new(name, config, &*adapter);
            worker.run(adapter, channels);
        }),
    }
}

fn epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Per-device state shared between the worker's loops.
struct Worker {
    name: String,
    saving_mode: SavingMode,
    output_path: PathBuf,
    state: DeviceState,
    experiment_id: Option<String>,
    buffer: Arc<Mutex<Vec<Sample>>>,
    trigger_slot: Arc<ArrayQueue<String>>,
    terminate: Arc<AtomicBool>,
    channels: Vec<String>,
    sampling_rate: usize,
    device_type: String,
}

impl Worker {
    fn new(name: String, config: DeviceConfig, adapter: &dyn SourceAdapter) -> Self {
        Worker {
            name,
            saving_mode: config.saving_mode,
            output_path: config.output_path,
            state: DeviceState::Idle,
            experiment_id: None,
            buffer: Arc::new(Mutex::new(Vec::new())),
            trigger_slot: Arc::new(ArrayQueue::new(1)),
            terminate: Arc::new(AtomicBool::new(false)),
            channels: adapter.channels().to_vec(),
            sampling_rate: adapter.sampling_rate(),
            device_type: adapter.kind().to_string(),
        }
    }

    fn run(mut self, adapter: Box<dyn SourceAdapter>, channels: WorkerChannels) {
        let acquisition = {
            let buffer = self.buffer.clone();
            let slot = self.trigger_slot.clone();
            let terminate = self.terminate.clone();
            let name = self.name.clone();
            thread::spawn(move || acquisition_loop(adapter, buffer, slot, terminate, name))
        };

        {
            // Monitor thread exits on its own once the coordinator drops the
            // request sender; it is deliberately not joined here.
            let buffer = self.buffer.clone();
            let metadata = SnapshotMetadata {
                sampling_rate: self.sampling_rate,
                channels: self.channels.clone(),
                device_type: self.device_type.clone(),
            };
            let name = self.name.clone();
            let monitor_rx = channels.monitor_rx;
            let snapshot_tx = channels.snapshot_tx;
            thread::spawn(move || monitor_loop(buffer, monitor_rx, snapshot_tx, metadata, name));
        }

        loop {
            let message = match channels.command_rx.recv() {
                Ok(m) => m,
                Err(_) => {
                    warn!("[{}] command queue closed before TERMINATE", self.name);
                    break;
                }
            };
            if !self.handle(&message) {
                break;
            }
        }

        self.state = DeviceState::Terminated;
        self.terminate.store(true, Ordering::Release);
        let _ = acquisition.join();
        debug!("[{}] worker stopped", self.name);
    }

    /// Applies one control message. Returns false when the worker must exit.
    fn handle(&mut self, message: &Message) -> bool {
        match message.kind {
            MessageKind::Start => {
                if self.state == DeviceState::Recording {
                    info!("[{}] duplicate START ignored", self.name);
                    return true;
                }
                self.note_experiment(message);
                match self.saving_mode {
                    SavingMode::Separated => self.buffer.lock().clear(),
                    SavingMode::Continuous => self.arm_trigger(message),
                }
                self.state = DeviceState::Recording;
            }
            MessageKind::Stop => {
                if self.state != DeviceState::Recording {
                    info!("[{}] duplicate STOP ignored", self.name);
                    return true;
                }
                self.note_experiment(message);
                match self.saving_mode {
                    SavingMode::Separated => {
                        let stimulus = message.stimulus_id.as_deref().unwrap_or("00");
                        let path = self.separated_path(stimulus);
                        self.flush_buffer(&path);
                    }
                    SavingMode::Continuous => self.arm_trigger(message),
                }
                self.state = DeviceState::Idle;
            }
            MessageKind::Save => {
                // Partial flush mid-session; meaningful only when everything
                // funnels into one session file.
                if self.saving_mode == SavingMode::Continuous {
                    self.note_experiment(message);
                    let path = self.session_path();
                    self.flush_buffer(&path);
                }
            }
            MessageKind::Terminate => {
                if self.saving_mode == SavingMode::Continuous {
                    let path = self.session_path();
                    self.flush_buffer(&path);
                }
                return false;
            }
        }
        true
    }

    fn note_experiment(&mut self, message: &Message) {
        if message.experiment_id.is_some() {
            self.experiment_id = message.experiment_id.clone();
        }
    }

    fn arm_trigger(&self, message: &Message) {
        if self.trigger_slot.force_push(message.trigger()).is_some() {
            debug!("[{}] unconsumed trigger overwritten", self.name);
        }
    }

    fn experiment_label(&self) -> &str {
        self.experiment_id.as_deref().unwrap_or("unnamed")
    }

    fn session_path(&self) -> PathBuf {
        self.output_path
            .join(format!("{}-{}.csv", self.name, self.experiment_label()))
    }

    fn separated_path(&self, stimulus_id: &str) -> PathBuf {
        self.output_path.join(format!(
            "{}-{}-{}.csv",
            self.name,
            self.experiment_label(),
            stimulus_id
        ))
    }

    /// Drains the buffer and appends it to `path`. Write failures are logged
    /// and isolated to this device; the worker keeps running.
    fn flush_buffer(&self, path: &Path) {
        let rows = {
            let mut buffer = self.buffer.lock();
            std::mem::take(&mut *buffer)
        };
        info!("[{}] saving {} rows to {:?}", self.name, rows.len(), path);
        if let Err(e) = append_rows(path, &self.channels, &rows) {
            error!("[{}] failed to save {:?}: {}", self.name, path, e);
        }
    }
}

fn acquisition_loop(
    mut adapter: Box<dyn SourceAdapter>,
    buffer: Arc<Mutex<Vec<Sample>>>,
    slot: Arc<ArrayQueue<String>>,
    terminate: Arc<AtomicBool>,
    name: String,
) {
    if let Err(e) = adapter.start() {
        error!("[{name}] source failed to start: {e}");
        return;
    }

    while !terminate.load(Ordering::Acquire) {
        match adapter.read() {
            Ok(values) => {
                let sample = Sample {
                    values,
                    timestamp: epoch_seconds(),
                    trigger: slot.pop(),
                };
                buffer.lock().push(sample);
            }
            Err(e) => {
                // Isolated to this device; coordinator and siblings keep going.
                error!("[{name}] acquisition failed: {e}");
                break;
            }
        }
    }

    adapter.stop();
    debug!("[{name}] acquisition loop exited");
}

fn monitor_loop(
    buffer: Arc<Mutex<Vec<Sample>>>,
    monitor_rx: Receiver<u64>,
    snapshot_tx: Sender<String>,
    metadata: SnapshotMetadata,
    name: String,
) {
    while let Ok(duration) = monitor_rx.recv() {
        let snapshot = {
            let buffer = buffer.lock();
            RealtimeSnapshot::capture(&buffer, duration as usize, metadata.clone())
        };
        let encoded = match serde_json::to_string(&snapshot) {
            Ok(s) => s,
            Err(e) => {
                error!("[{name}] failed to encode snapshot: {e}");
                continue;
            }
        };
        // 10ms budget: a slow or absent poller misses the snapshot, the
        // acquisition hot path is never held up on its behalf.
        if snapshot_tx
            .send_timeout(encoded, Duration::from_millis(10))
            .is_err()
        {
            debug!("[{name}] snapshot dropped; consumer not ready");
        }
    }
    debug!("[{name}] monitor loop exited");
}

/// Appends rows to a recording file, writing the header once on creation.
/// Rows carry a trailing trigger field only when tagged, so the writer runs
/// in flexible mode.
fn append_rows(path: &Path, channels: &[String], rows: &[Sample]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let new_file = !path.exists();
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(file);

    if new_file {
        let mut header: Vec<String> = channels.to_vec();
        header.push("timestamp".to_string());
        header.push("trigger".to_string());
        writer.write_record(&header)?;
    }

    for sample in rows {
        let mut record: Vec<String> = sample.values.iter().map(|v| format!("{v:.6}")).collect();
        record.push(format!("{:.6}", sample.timestamp));
        if let Some(trigger) = &sample.trigger {
            record.push(trigger.clone());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}
