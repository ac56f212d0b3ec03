//! Inspector transport: request/response multiplexing and event fan-out
//! over the runtime's WebSocket endpoint.
//!
//! A dedicated I/O thread owns the socket. It alternates between draining
//! queued outgoing frames and a short-timeout read, so neither direction
//! can starve the other. Callers correlate through monotonically increasing
//! request ids; responses complete oneshot channels, events run the
//! registered listeners in arrival order on the I/O thread.

use std::collections::HashMap;
use std::io::Write;
use std::net::TcpStream;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::error::{Error, Result};
use crate::protocol::Inbound;

/// Budget for one request/response round trip.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a blocked read waits before giving writes a turn.
const READ_POLL: Duration = Duration::from_millis(50);

// ── Protocol log ─────────────────────────────────────────────────────────────

/// Append-only JSONL capture of everything crossing the transport.
pub struct ProtocolLog {
    file: Mutex<std::fs::File>,
}

impl ProtocolLog {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    fn write(&self, entry: Value) {
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{entry}");
        }
    }

    fn ts() -> u64 {
        crate::buffers::now_millis()
    }

    pub fn log_send(&self, id: u32, method: &str, params: Option<&Value>) {
        let mut entry = json!({"ts": Self::ts(), "dir": "send", "method": method, "id": id});
        if let Some(p) = params {
            entry["params"] = p.clone();
        }
        self.write(entry);
    }

    pub fn log_recv(&self, id: u32, method: &str, ms: u64, result: Option<&Value>, error: Option<&Value>) {
        let mut entry = json!({"ts": Self::ts(), "dir": "recv", "method": method, "id": id, "ms": ms});
        if let Some(r) = result {
            entry["result"] = r.clone();
        }
        if let Some(e) = error {
            entry["error"] = e.clone();
        }
        self.write(entry);
    }

    pub fn log_event(&self, method: &str, params: &Value) {
        self.write(json!({"ts": Self::ts(), "dir": "event", "method": method, "params": params.clone()}));
    }
}

// ── Transport ────────────────────────────────────────────────────────────────

/// Listener callback for one named event. Runs on the I/O thread; keep it
/// short and never block on the transport from inside it.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

enum Outgoing {
    Frame(String),
    Shutdown,
}

struct Pending {
    method: String,
    sent_at: Instant,
    tx: oneshot::Sender<Result<Value>>,
}

struct Inner {
    next_id: AtomicU32,
    connected: AtomicBool,
    pending: Mutex<HashMap<u32, Pending>>,
    listeners: Mutex<HashMap<String, Vec<(u64, EventHandler)>>>,
    next_listener: AtomicU64,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    log: Option<Arc<ProtocolLog>>,
}

/// Handle to a connected inspector endpoint. Cheap to clone.
#[derive(Clone)]
pub struct CdpTransport {
    inner: Arc<Inner>,
}

impl CdpTransport {
    /// Establish the WebSocket and start the I/O thread.
    pub fn connect(endpoint: &str, log: Option<Arc<ProtocolLog>>) -> Result<Self> {
        let (socket, _response) = tungstenite::connect(endpoint)
            .map_err(|e| Error::TransportFailed(e.to_string()))?;

        if let MaybeTlsStream::Plain(stream) = socket.get_ref() {
            let _ = stream.set_read_timeout(Some(READ_POLL));
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            next_id: AtomicU32::new(1),
            connected: AtomicBool::new(true),
            pending: Mutex::new(HashMap::new()),
            listeners: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
            outgoing: out_tx,
            log,
        });

        let io_inner = inner.clone();
        std::thread::Builder::new()
            .name("jsdbg-inspector-io".into())
            .spawn(move || io_loop(socket, io_inner, out_rx))
            .map_err(|e| Error::TransportFailed(e.to_string()))?;

        Ok(Self { inner })
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Relaxed)
    }

    /// Issue one request and wait for its correlated response.
    pub async fn send(&self, method: &str, params: Option<Value>) -> Result<Value> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().unwrap().insert(
            id,
            Pending {
                method: method.to_string(),
                sent_at: Instant::now(),
                tx,
            },
        );

        let mut frame = json!({"id": id, "method": method});
        if let Some(p) = params {
            frame["params"] = p;
        }
        if let Some(log) = &self.inner.log {
            log.log_send(id, method, frame.get("params"));
        }

        if self
            .inner
            .outgoing
            .send(Outgoing::Frame(frame.to_string()))
            .is_err()
        {
            self.inner.pending.lock().unwrap().remove(&id);
            return Err(Error::Disconnected);
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Disconnected),
            Err(_) => {
                // Drop the pending record; a late response with this id is
                // silently discarded by the I/O thread.
                self.inner.pending.lock().unwrap().remove(&id);
                Err(Error::RequestTimedOut {
                    method: method.to_string(),
                    id,
                })
            }
        }
    }

    /// Register a listener for one event method. Returns a token for `off`.
    pub fn on(&self, method: &str, handler: EventHandler) -> u64 {
        let token = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push((token, handler));
        token
    }

    /// Remove a previously registered listener.
    pub fn off(&self, method: &str, token: u64) {
        if let Some(handlers) = self.inner.listeners.lock().unwrap().get_mut(method) {
            handlers.retain(|(t, _)| *t != token);
        }
    }

    /// Close the stream. Every outstanding request fails with
    /// `Disconnected`; further sends fail with `NotConnected`.
    pub fn disconnect(&self) {
        let _ = self.inner.outgoing.send(Outgoing::Shutdown);
        self.inner.fail_all();
    }
}

impl Inner {
    /// Mark disconnected and cancel every outstanding request. Idempotent.
    fn fail_all(&self) {
        self.connected.store(false, Ordering::Relaxed);
        let drained: Vec<Pending> = {
            let mut pending = self.pending.lock().unwrap();
            pending.drain().map(|(_, p)| p).collect()
        };
        for p in drained {
            let _ = p.tx.send(Err(Error::Disconnected));
        }
    }

    fn handle_incoming(&self, text: &str) {
        // Malformed frames are silently discarded.
        let Ok(value) = serde_json::from_str::<Value>(text) else {
            return;
        };
        let Some(inbound) = Inbound::classify(value) else {
            return;
        };

        match inbound {
            Inbound::Response { id, result, error } => {
                let Some(pending) = self.pending.lock().unwrap().remove(&id) else {
                    // Response for a request that already timed out.
                    return;
                };
                let ms = pending.sent_at.elapsed().as_millis() as u64;
                if let Some(log) = &self.log {
                    let error_json = error
                        .as_ref()
                        .map(|e| json!({"code": e.code, "message": e.message}));
                    log.log_recv(id, &pending.method, ms, result.as_ref(), error_json.as_ref());
                }
                let outcome = match error {
                    Some(e) => Err(Error::Inspector {
                        method: pending.method,
                        code: e.code,
                        message: e.message,
                    }),
                    None => Ok(result.unwrap_or(Value::Null)),
                };
                let _ = pending.tx.send(outcome);
            }
            Inbound::Event { method, params } => {
                if let Some(log) = &self.log {
                    log.log_event(&method, &params);
                }
                // Snapshot so handlers can call on/off without deadlock.
                let handlers: Vec<EventHandler> = self
                    .listeners
                    .lock()
                    .unwrap()
                    .get(&method)
                    .map(|hs| hs.iter().map(|(_, h)| h.clone()).collect())
                    .unwrap_or_default();
                for handler in handlers {
                    handler(&params);
                }
            }
        }
    }
}

fn io_loop(
    mut socket: WebSocket<MaybeTlsStream<TcpStream>>,
    inner: Arc<Inner>,
    mut out_rx: mpsc::UnboundedReceiver<Outgoing>,
) {
    use tokio::sync::mpsc::error::TryRecvError;

    loop {
        loop {
            match out_rx.try_recv() {
                Ok(Outgoing::Frame(text)) => {
                    if socket.send(Message::Text(text.into())).is_err() {
                        inner.fail_all();
                        return;
                    }
                }
                Ok(Outgoing::Shutdown) | Err(TryRecvError::Disconnected) => {
                    let _ = socket.close(None);
                    let _ = socket.flush();
                    inner.fail_all();
                    return;
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        match socket.read() {
            Ok(message) => {
                if let Ok(text) = message.to_text() {
                    if !text.is_empty() {
                        inner.handle_incoming(text);
                    }
                }
            }
            Err(tungstenite::Error::Io(e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(_) => {
                inner.fail_all();
                return;
            }
        }
    }
}
