//! HTTP endpoints: the network face of the control plane.
//!
//! Two tiny_http servers, each on its own thread. The control endpoint takes
//! POSTed JSON messages and hands them straight to the coordinator; the
//! realtime endpoint answers GET polls with per-device snapshot maps. Both
//! validate before acting: a malformed request is answered with 400 and never
//! reaches a device queue.

use log::{debug, error, info};
use std::collections::HashMap;
use std::io::Read;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread::{self, JoinHandle};
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

use crate::control::coordinator::Coordinator;
use crate::control::message::Message;
use crate::error::{Error, Result};

const DEFAULT_SNAPSHOT_SECS: u64 = 3;

/// A running endpoint. `stop` unblocks the accept loop and joins the thread.
pub struct EndpointHandle {
    server: Arc<Server>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EndpointHandle {
    pub fn stop(mut self) {
        self.running.store(false, Ordering::Release);
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Starts the control endpoint: `POST /` with a JSON message body.
pub fn start_control_endpoint(coordinator: Arc<Coordinator>, port: u16) -> Result<EndpointHandle> {
    serve(port, "control", move |request| {
        handle_control_request(&coordinator, request)
    })
}

/// Starts the realtime endpoint:
/// `GET /?duration=3&device_list=eeg,gsr` returns a JSON map of device name
/// to snapshot. Omitting `device_list` polls every device.
pub fn start_realtime_endpoint(coordinator: Arc<Coordinator>, port: u16) -> Result<EndpointHandle> {
    serve(port, "realtime", move |request| {
        handle_realtime_request(&coordinator, request)
    })
}

fn serve<F>(port: u16, label: &'static str, handler: F) -> Result<EndpointHandle>
where
    F: Fn(Request) + Send + 'static,
{
    let server = Server::http(("0.0.0.0", port)).map_err(|e| Error::Endpoint(e.to_string()))?;
    let server = Arc::new(server);
    let running = Arc::new(AtomicBool::new(true));
    info!("{label} endpoint listening on port {port}");

    let handle = {
        let server = server.clone();
        let running = running.clone();
        thread::spawn(move || {
            for request in server.incoming_requests() {
                if !running.load(Ordering::Acquire) {
                    break;
                }
                handler(request);
            }
            debug!("{label} endpoint stopped");
        })
    };

    Ok(EndpointHandle {
        server,
        running,
        handle: Some(handle),
    })
}

fn handle_control_request(coordinator: &Coordinator, mut request: Request) {
    if request.method() != &Method::Post {
        respond(request, 405, "only POST is supported");
        return;
    }

    let content_type = request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Content-Type"))
        .map(|h| h.value.as_str().to_ascii_lowercase());
    if let Some(ct) = content_type
        && !ct.contains("application/json")
    {
        respond(request, 400, &format!("unsupported content type '{ct}'"));
        return;
    }

    let mut body = String::new();
    if request.as_reader().read_to_string(&mut body).is_err() {
        respond(request, 400, "request body is not valid UTF-8");
        return;
    }

    match serde_json::from_str::<Message>(&body) {
        Ok(message) => {
            debug!("control endpoint dispatching {:?}", message.kind);
            coordinator.dispatch(&message);
            respond(request, 200, "message dispatched");
        }
        Err(e) => respond(request, 400, &format!("malformed control message: {e}")),
    }
}

fn handle_realtime_request(coordinator: &Coordinator, request: Request) {
    if request.method() != &Method::Get {
        respond(request, 405, "only GET is supported");
        return;
    }

    let params = parse_query(request.url());
    let duration = match params.get("duration") {
        Some(raw) => match raw.parse::<u64>() {
            Ok(d) => d,
            Err(_) => {
                respond(request, 400, "duration must be a whole number of seconds");
                return;
            }
        },
        None => DEFAULT_SNAPSHOT_SECS,
    };
    let filter: Option<Vec<String>> = params
        .get("device_list")
        .filter(|raw| !raw.is_empty())
        .map(|raw| raw.split(',').map(str::to_string).collect());

    let data = coordinator.realtime_data(duration, filter.as_deref());
    match serde_json::to_string(&data) {
        Ok(body) => respond_json(request, &body),
        Err(e) => {
            error!("failed to encode realtime response: {e}");
            respond(request, 500, "internal encoding failure");
        }
    }
}

fn parse_query(url: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some((_, query)) = url.split_once('?') {
        for pair in query.split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                params.insert(key.to_string(), value.to_string());
            }
        }
    }
    params
}

fn respond(request: Request, status: u16, body: &str) {
    let response = Response::from_string(body).with_status_code(StatusCode(status));
    if let Err(e) = request.respond(response) {
        debug!("failed to send response: {e}");
    }
}

fn respond_json(request: Request, body: &str) {
    let mut response = Response::from_string(body);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        response = response.with_header(header);
    }
    if let Err(e) = request.respond(response) {
        debug!("failed to send response: {e}");
    }
}
