//! End-to-end session tests: real worker threads, real files, real sockets.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sensorium::monitoring::endpoint::start_control_endpoint;
use sensorium::reconstruct::trials::extract_trials;
use sensorium::{
    Coordinator, Device, DeviceConfig, Message, Result, SavingMode, SourceAdapter,
};

/// Fast deterministic source: one counter row per millisecond.
struct TickSource {
    channels: Vec<String>,
    counter: u64,
}

impl TickSource {
    fn new() -> Self {
        TickSource {
            channels: vec!["ch1".to_string(), "ch2".to_string()],
            counter: 0,
        }
    }
}

impl SourceAdapter for TickSource {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn read(&mut self) -> Result<Vec<f64>> {
        thread::sleep(Duration::from_millis(1));
        self.counter += 1;
        Ok(vec![self.counter as f64, self.counter as f64 * 0.5])
    }

    fn stop(&mut self) {}

    fn channels(&self) -> &[String] {
        &self.channels
    }

    fn sampling_rate(&self) -> usize {
        1000
    }

    fn kind(&self) -> &'static str {
        "tick"
    }
}

fn tick_device(name: &str, saving_mode: SavingMode, dir: &Path) -> Device {
    Device::new(
        Box::new(TickSource::new()),
        DeviceConfig::new(name, saving_mode, dir),
    )
}

fn settle() {
    thread::sleep(Duration::from_millis(60));
}

#[test]
fn separated_session_writes_one_file_per_stimulus() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = Coordinator::new();
    coordinator
        .register(tick_device("dev", SavingMode::Separated, dir.path()))
        .unwrap();

    for stimulus in ["00", "01"] {
        coordinator.dispatch(&Message::start("e1", stimulus));
        settle();
        coordinator.dispatch(&Message::stop("e1", stimulus));
        settle();
    }
    coordinator.terminate();
    coordinator.join();

    let first = std::fs::read_to_string(dir.path().join("dev-e1-00.csv")).unwrap();
    let second = std::fs::read_to_string(dir.path().join("dev-e1-01.csv")).unwrap();
    assert!(first.lines().count() > 1);
    assert!(second.lines().count() > 1);
    assert!(first.starts_with("ch1,ch2,timestamp,trigger"));
    // Terminate in separated mode writes nothing extra.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
}

#[test]
fn continuous_session_is_one_file_that_splits_back_into_trials() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = Coordinator::new();
    coordinator
        .register(tick_device("dev", SavingMode::Continuous, dir.path()))
        .unwrap();

    for stimulus in ["0", "1"] {
        coordinator.dispatch(&Message::start("e1", stimulus));
        settle();
        coordinator.dispatch(&Message::stop("e1", stimulus));
        settle();
    }
    coordinator.terminate();
    coordinator.join();

    // Whole session lands in one file.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    let session_file = dir.path().join("dev-e1.csv");

    // Markers recorded inline recover both trials, in order.
    let trials = extract_trials(&session_file, 2).unwrap();
    assert_eq!(trials.len(), 2);
    assert_eq!(trials[0].number, 0);
    assert_eq!(trials[1].number, 1);
    assert!(!trials[0].data.is_empty());
    assert!(!trials[1].data.is_empty());
    // Counter values keep increasing across trials: same buffer throughout.
    assert!(trials[1].data[0][0] > trials[0].data[0][0]);
}

#[test]
fn sibling_devices_receive_the_same_commands() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = Coordinator::new();
    coordinator
        .register(tick_device("a", SavingMode::Separated, dir.path()))
        .unwrap();
    coordinator
        .register(tick_device("b", SavingMode::Separated, dir.path()))
        .unwrap();

    coordinator.dispatch(&Message::start("e1", "00"));
    settle();
    coordinator.dispatch(&Message::stop("e1", "00"));
    settle();
    coordinator.terminate();
    coordinator.join();

    assert!(dir.path().join("a-e1-00.csv").exists());
    assert!(dir.path().join("b-e1-00.csv").exists());
}

#[test]
fn realtime_data_returns_short_window_early_in_session() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = Coordinator::new();
    coordinator
        .register(tick_device("dev", SavingMode::Continuous, dir.path()))
        .unwrap();

    settle();
    // 60s requested, far more than has been acquired.
    let snapshots = coordinator.realtime_data(60, None);
    let snapshot = snapshots.get("dev").unwrap();
    let rows = snapshot["data"].as_array().unwrap();
    assert!(!rows.is_empty());
    assert!(rows.len() < 60 * 1000);
    assert_eq!(snapshot["metadata"]["device_type"], "tick");
    assert_eq!(snapshot["metadata"]["sampling_rate"], 1000);

    coordinator.terminate();
    coordinator.join();
}

#[test]
fn realtime_data_honors_device_filter() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = Coordinator::new();
    coordinator
        .register(tick_device("a", SavingMode::Continuous, dir.path()))
        .unwrap();
    coordinator
        .register(tick_device("b", SavingMode::Continuous, dir.path()))
        .unwrap();

    settle();
    let filter = vec!["b".to_string()];
    let snapshots = coordinator.realtime_data(1, Some(&filter));
    assert!(snapshots.contains_key("b"));
    assert!(!snapshots.contains_key("a"));

    coordinator.terminate();
    coordinator.join();
}

fn http_roundtrip(port: u16, request: &str) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream.write_all(request.as_bytes()).unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    response
}

#[test]
fn control_endpoint_validates_before_dispatching() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = Arc::new(Coordinator::new());
    coordinator
        .register(tick_device("dev", SavingMode::Separated, dir.path()))
        .unwrap();

    let port = 19431;
    let endpoint = start_control_endpoint(coordinator.clone(), port).unwrap();
    thread::sleep(Duration::from_millis(50));

    // Not JSON at all.
    let response = http_roundtrip(
        port,
        "POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: 9\r\nConnection: close\r\n\r\nnot json!",
    );
    assert!(response.starts_with("HTTP/1.1 400"));

    // JSON but missing the mandatory type field.
    let body = r#"{"experiment_id":"e1"}"#;
    let response = http_roundtrip(
        port,
        &format!(
            "POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        ),
    );
    assert!(response.starts_with("HTTP/1.1 400"));

    // Well-formed START then STOP reach the device and produce a recording.
    for message in [
        serde_json::to_string(&Message::start("e1", "00")).unwrap(),
        serde_json::to_string(&Message::stop("e1", "00")).unwrap(),
    ] {
        let response = http_roundtrip(
            port,
            &format!(
                "POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                message.len(),
                message
            ),
        );
        assert!(response.starts_with("HTTP/1.1 200"));
        settle();
    }

    coordinator.terminate();
    coordinator.join();
    endpoint.stop();

    assert!(dir.path().join("dev-e1-00.csv").exists());
}
