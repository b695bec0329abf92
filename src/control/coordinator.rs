//! The coordinator: single dispatch point for a fleet of device workers.
//!
//! Registration spawns a worker and wires three channels per device: an
//! unbounded command queue, a bounded(1) monitoring request channel, and a
//! bounded(1) snapshot response channel. Dispatch is fire-and-forget in
//! registration order; the coordinator never learns whether a worker acted on
//! a message, only whether its queue still accepts one.

use crossbeam::channel::{Receiver, Sender, bounded, unbounded};
use log::{info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::control::message::Message;
use crate::device::worker::{self, Device, WorkerChannels};
use crate::error::{Error, Result};

/// Per-poll budget for one device's snapshot. A device that cannot answer in
/// this window is skipped for that poll, not marked dead.
const SNAPSHOT_TIMEOUT: Duration = Duration::from_millis(100);

struct Registered {
    name: String,
    command_tx: Sender<Message>,
    monitor_tx: Sender<u64>,
    snapshot_rx: Receiver<String>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
    devices: Vec<Registered>,
    auto_names: usize,
}

#[derive(Default)]
pub struct Coordinator {
    inner: Mutex<Inner>,
}

impl Coordinator {
    pub fn new() -> Self {
        Coordinator::default()
    }

    /// Spawns a worker for `device` and returns its registered name.
    ///
    /// Unnamed devices get `device_{n}`. A second device with an
    /// already-registered name is rejected and the registry is left unchanged.
    pub fn register(&self, device: Device) -> Result<String> {
        let mut inner = self.inner.lock();
        let name = match device.name() {
            Some(n) => n.to_string(),
            None => {
                inner.auto_names += 1;
                format!("device_{}", inner.auto_names)
            }
        };
        if inner.devices.iter().any(|d| d.name == name) {
            return Err(Error::DuplicateDevice(name));
        }

        let (command_tx, command_rx) = unbounded();
        let (monitor_tx, monitor_rx) = bounded(1);
        let (snapshot_tx, snapshot_rx) = bounded(1);
        let handle = worker::spawn(
            name.clone(),
            device,
            WorkerChannels {
                command_rx,
                monitor_rx,
                snapshot_tx,
            },
        );
        info!("registered device '{name}'");
        inner.devices.push(Registered {
            name: name.clone(),
            command_tx,
            monitor_tx,
            snapshot_rx,
            handle,
        });
        Ok(name)
    }

    pub fn register_many(&self, devices: Vec<Device>) -> Result<Vec<String>> {
        devices.into_iter().map(|d| self.register(d)).collect()
    }

    pub fn device_names(&self) -> Vec<String> {
        self.inner.lock().devices.iter().map(|d| d.name.clone()).collect()
    }

    /// Clones `message` onto every device's command queue, in registration
    /// order. A closed queue (worker already gone) is logged and skipped.
    pub fn dispatch(&self, message: &Message) {
        let inner = self.inner.lock();
        for device in &inner.devices {
            if device.command_tx.send(message.clone()).is_err() {
                warn!("device '{}' no longer accepts commands; message dropped", device.name);
            }
        }
    }

    /// Dispatches TERMINATE to every device. Does not wait; call [`join`]
    /// afterwards to block until workers have flushed and exited.
    ///
    /// [`join`]: Coordinator::join
    pub fn terminate(&self) {
        self.dispatch(&Message::terminate());
    }

    /// Blocks until every worker thread has exited, then empties the registry.
    /// Only meaningful after [`terminate`](Coordinator::terminate).
    pub fn join(&self) {
        let devices: Vec<Registered> = {
            let mut inner = self.inner.lock();
            std::mem::take(&mut inner.devices)
        };
        for device in devices {
            if device.handle.join().is_err() {
                warn!("worker '{}' panicked", device.name);
            }
            // Dropping monitor_tx here lets the worker's monitor thread exit.
        }
    }

    /// Collects the last `duration` seconds of data from the selected devices.
    ///
    /// Requests fan out to every target first, then responses are collected,
    /// so devices prepare their snapshots concurrently. Devices that miss the
    /// per-device timeout are absent from the result map.
    pub fn realtime_data(
        &self,
        duration: u64,
        device_filter: Option<&[String]>,
    ) -> HashMap<String, serde_json::Value> {
        let targets: Vec<(String, Sender<u64>, Receiver<String>)> = {
            let inner = self.inner.lock();
            inner
                .devices
                .iter()
                .filter(|d| device_filter.is_none_or(|f| f.iter().any(|n| *n == d.name)))
                .map(|d| (d.name.clone(), d.monitor_tx.clone(), d.snapshot_rx.clone()))
                .collect()
        };

        for (name, monitor_tx, _) in &targets {
            if monitor_tx.try_send(duration).is_err() {
                warn!("could not queue monitoring request for '{name}'");
            }
        }

        let mut out = HashMap::new();
        for (name, _, snapshot_rx) in &targets {
            match snapshot_rx.recv_timeout(SNAPSHOT_TIMEOUT) {
                Ok(raw) => match serde_json::from_str(&raw) {
                    Ok(value) => {
                        out.insert(name.clone(), value);
                    }
                    Err(e) => warn!("device '{name}' produced an unreadable snapshot: {e}"),
                },
                Err(_) => warn!("no realtime data from '{name}' within {SNAPSHOT_TIMEOUT:?}"),
            }
        }
        out
    }
}
