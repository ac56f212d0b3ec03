//! The debug session: one daemon-owned target, its execution-control state
//! machine, and the command catalogue.
//!
//! All mutable session state lives behind one mutex in [`Core`]; commands
//! lock it briefly and never across an await. Pause and exit signalling
//! uses watch channels so pause-waiters can subscribe before the command
//! that causes suspension is sent.

mod breaks;
mod control;
mod events;
mod inspect;
mod mutate;

pub use breaks::{BreakLocationDisplay, BreakpointListing, BreakpointOptions, BreakpointSet, ToggleOutcome};
pub use control::ControlOutcome;
pub use inspect::{
    BreakableLocation, EvalOptions, EvalOutcome, FrameEntry, LocationOut, PropEntry, PropsOptions,
    ScriptListing, SearchHit, SourceLine, SourceOptions, SourceText, StackOptions, StateOptions,
    StateSnapshot, VarEntry, VarsOptions,
};
pub use mutate::{HotpatchOutcome, SetVariableOutcome};

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{oneshot, watch};

use crate::breakpoints::BreakpointStore;
use crate::buffers::{now_millis, ConsoleMessage, ExceptionEntry, RingBuffer};
use crate::error::{Error, Result};
use crate::protocol;
use crate::refs::{RefKind, RefTable};
use crate::scripts::ScriptRegistry;
use crate::sourcemap::SourceMapResolver;
use crate::transport::{CdpTransport, ProtocolLog};
use crate::waiter::{PauseWaiter, DEFAULT_PAUSE_TIMEOUT};

// ── State machine ────────────────────────────────────────────────────────────

/// Execution-control states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecState {
    Idle,
    Running,
    Paused,
}

impl ExecState {
    pub fn describe(self) -> &'static str {
        match self {
            ExecState::Idle => "idle",
            ExecState::Running => "running",
            ExecState::Paused => "paused",
        }
    }
}

/// Set exactly while paused; cleared on resume and exit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseInfo {
    pub reason: String,
    pub script_id: String,
    pub url: String,
    /// 1-based.
    pub line: u32,
    pub column: u32,
    pub call_frame_count: usize,
}

// ── Shared state ─────────────────────────────────────────────────────────────

/// Everything a command or event handler may mutate.
pub(crate) struct Core {
    pub exec: ExecState,
    pub pause: Option<PauseInfo>,
    /// Valid only while `pause` is unchanged; every resume invalidates.
    pub frames: Vec<protocol::CallFrame>,
    pub scripts: ScriptRegistry,
    pub refs: RefTable,
    pub breaks: BreakpointStore,
    pub console: RingBuffer<ConsoleMessage>,
    pub exceptions: RingBuffer<ExceptionEntry>,
    /// Remembered across stop so launch can re-apply them.
    pub blackbox: Vec<String>,
    pub exception_pause_mode: String,
    pub pid: Option<u32>,
    pub ws_url: Option<String>,
}

impl Core {
    fn new() -> Self {
        Self {
            exec: ExecState::Idle,
            pause: None,
            frames: Vec::new(),
            scripts: ScriptRegistry::new(),
            refs: RefTable::new(),
            breaks: BreakpointStore::new(),
            console: RingBuffer::default(),
            exceptions: RingBuffer::default(),
            blackbox: Vec::new(),
            exception_pause_mode: "none".to_string(),
            pid: None,
            ws_url: None,
        }
    }
}

pub(crate) struct Shared {
    pub core: Mutex<Core>,
    pub pause_epoch: watch::Sender<u64>,
    pub exit_epoch: watch::Sender<u64>,
    pub resolver: Arc<SourceMapResolver>,
    pub rt: tokio::runtime::Handle,
}

impl Shared {
    pub fn bump_pause(&self) {
        self.pause_epoch.send_modify(|n| *n += 1);
    }

    pub fn bump_exit(&self) {
        self.exit_epoch.send_modify(|n| *n += 1);
    }

    /// Full idle reset: stop, child exit. Blackbox patterns survive.
    pub fn reset_to_idle(&self) {
        {
            let mut core = self.core.lock().unwrap();
            core.exec = ExecState::Idle;
            core.pause = None;
            core.frames.clear();
            core.scripts.clear();
            core.refs.clear_all();
            core.breaks.clear();
            core.console.clear();
            core.exceptions.clear();
            core.exception_pause_mode = "none".to_string();
            core.pid = None;
            core.ws_url = None;
        }
        self.resolver.clear();
    }
}

/// How the current target was started, for `restart`.
#[derive(Debug, Clone)]
struct LaunchSpec {
    command: Vec<String>,
    brk: bool,
    port: u16,
}

// ── Session ──────────────────────────────────────────────────────────────────

/// One daemon-owned debug target.
pub struct Session {
    pub(crate) shared: Arc<Shared>,
    pub(crate) transport: Mutex<Option<CdpTransport>>,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
    launch_spec: Mutex<Option<LaunchSpec>>,
    name: String,
    started_at: Instant,
    protocol_log: Option<Arc<ProtocolLog>>,
}

/// Status projection returned by the `status` command.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusInfo {
    pub session: String,
    pub state: ExecState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pause_info: Option<PauseInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_pause_mode: Option<String>,
    pub uptime_seconds: u64,
    pub script_count: usize,
}

impl Session {
    /// Create an idle session. Must be called from within a tokio runtime;
    /// the handle is captured for event-driven background work.
    pub fn new(name: impl Into<String>, protocol_log_path: Option<PathBuf>) -> Self {
        let (pause_tx, _) = watch::channel(0u64);
        let (exit_tx, _) = watch::channel(0u64);
        let protocol_log = protocol_log_path
            .and_then(|p| ProtocolLog::create(&p).ok())
            .map(Arc::new);
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(Core::new()),
                pause_epoch: pause_tx,
                exit_epoch: exit_tx,
                resolver: Arc::new(SourceMapResolver::new()),
                rt: tokio::runtime::Handle::current(),
            }),
            transport: Mutex::new(None),
            kill_tx: Mutex::new(None),
            launch_spec: Mutex::new(None),
            name: name.into(),
            started_at: Instant::now(),
            protocol_log,
        }
    }

    pub fn resolver(&self) -> &Arc<SourceMapResolver> {
        &self.shared.resolver
    }

    // ── State helpers ────────────────────────────────────────────────────────

    pub fn state(&self) -> ExecState {
        self.shared.core.lock().unwrap().exec
    }

    pub(crate) fn require_state(&self, expected: ExecState) -> Result<()> {
        let actual = self.state();
        if actual == expected {
            Ok(())
        } else {
            Err(Error::BadState {
                expected: expected.describe(),
                actual: actual.describe(),
            })
        }
    }

    pub(crate) fn transport_handle(&self) -> Result<CdpTransport> {
        self.transport
            .lock()
            .unwrap()
            .clone()
            .ok_or(Error::NotConnected)
    }

    /// Subscribe a pause-waiter. Must be called before the command that
    /// will cause suspension is sent.
    pub(crate) fn pause_waiter(&self, timeout: Duration) -> PauseWaiter {
        let shared = self.shared.clone();
        PauseWaiter::new(
            self.shared.pause_epoch.subscribe(),
            self.shared.exit_epoch.subscribe(),
            move || {
                let core = shared.core.lock().unwrap();
                matches!(core.exec, ExecState::Paused | ExecState::Idle)
            },
            timeout,
        )
    }

    /// Resolve an optional frame selector (`@fN` handle or bare index) to
    /// `(index, frame)`. Defaults to the top frame.
    pub(crate) fn select_frame(&self, frame: Option<&str>) -> Result<(usize, protocol::CallFrame)> {
        let core = self.shared.core.lock().unwrap();
        if core.exec != ExecState::Paused {
            return Err(Error::BadState {
                expected: "paused",
                actual: core.exec.describe(),
            });
        }
        let index = match frame {
            None => 0,
            Some(sel) => {
                if let Ok(n) = sel.parse::<usize>() {
                    n
                } else {
                    let entry = core
                        .refs
                        .resolve(sel)
                        .ok_or_else(|| Error::UnknownRef(sel.to_string()))?;
                    match (entry.kind, &entry.meta) {
                        (RefKind::Frame, crate::refs::RefMeta::Frame { index }) => *index,
                        _ => {
                            return Err(Error::BadRefKind {
                                handle: sel.to_string(),
                                expected: "frame",
                            })
                        }
                    }
                }
            }
        };
        let frame = core
            .frames
            .get(index)
            .cloned()
            .ok_or_else(|| Error::invalid("frame", format!("no call frame at index {index}")))?;
        Ok((index, frame))
    }

    // ── Status ───────────────────────────────────────────────────────────────

    pub fn status(&self) -> StatusInfo {
        let core = self.shared.core.lock().unwrap();
        let pause_info = core.pause.as_ref().map(|p| {
            // Source-map-translate the display location.
            match self.shared.resolver.resolve_display(&p.script_id, p.line, p.column) {
                Some(orig) => PauseInfo {
                    url: orig.source,
                    line: orig.line,
                    column: orig.column,
                    ..p.clone()
                },
                None => p.clone(),
            }
        });
        StatusInfo {
            session: self.name.clone(),
            state: core.exec,
            pid: core.pid,
            ws_url: core.ws_url.clone(),
            pause_info,
            exception_pause_mode: Some(core.exception_pause_mode.clone())
                .filter(|m| m != "none"),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            script_count: core.scripts.len(),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Spawn the runtime with an inspect flag, wait for its endpoint line,
    /// connect, and enable the protocol domains.
    pub async fn launch(&self, command: Vec<String>, brk: bool, port: Option<u16>) -> Result<StatusInfo> {
        self.require_state(ExecState::Idle)?;
        if command.is_empty() {
            return Err(Error::invalid("command", "empty command line"));
        }

        let port = port.unwrap_or(0);
        let flag = if brk {
            format!("--inspect-brk={port}")
        } else {
            format!("--inspect={port}")
        };

        let mut cmd = tokio::process::Command::new(&command[0]);
        cmd.arg(&flag)
            .args(&command[1..])
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::TransportFailed(format!("spawn {}: {e}", command[0])))?;
        let pid = child.id();

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::TransportFailed("child stderr unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::TransportFailed("child stdout unavailable".into()))?;

        // The runtime announces its endpoint on stderr within 5 s.
        let mut err_lines = BufReader::new(stderr).lines();
        let listening = regex::Regex::new(r"Debugger listening on (wss?://\S+)")
            .expect("static regex");
        let deadline = Instant::now() + Duration::from_secs(5);
        let ws_url = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                let _ = child.start_kill();
                return Err(Error::InspectorDetectionFailed);
            }
            match tokio::time::timeout(remaining, err_lines.next_line()).await {
                Ok(Ok(Some(line))) => {
                    if let Some(cap) = listening.captures(&line) {
                        break cap[1].to_string();
                    }
                    if !line.starts_with("For help, see") {
                        self.push_child_line("stderr", line);
                    }
                }
                Ok(Ok(None)) | Ok(Err(_)) => {
                    let _ = child.start_kill();
                    return Err(Error::InspectorDetectionFailed);
                }
                Err(_) => {
                    let _ = child.start_kill();
                    return Err(Error::InspectorDetectionFailed);
                }
            }
        };

        // Forward remaining child output into the console ring.
        self.spawn_output_pump("stderr", err_lines);
        self.spawn_output_pump("stdout", BufReader::new(stdout).lines());

        // Monitor exit; `stop` signals the same task to kill.
        let (kill_tx, kill_rx) = oneshot::channel();
        *self.kill_tx.lock().unwrap() = Some(kill_tx);
        let monitor_shared = self.shared.clone();
        self.shared.rt.spawn(async move {
            let mut child = child;
            tokio::select! {
                _ = child.wait() => {}
                _ = kill_rx => {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
            }
            monitor_shared.reset_to_idle();
            monitor_shared.bump_exit();
        });

        {
            let mut core = self.shared.core.lock().unwrap();
            core.pid = pid;
            core.ws_url = Some(ws_url.clone());
        }
        *self.launch_spec.lock().unwrap() = Some(LaunchSpec {
            command,
            brk,
            port,
        });

        match self.connect_and_enable(&ws_url, brk).await {
            Ok(()) => {}
            Err(e) => {
                self.stop().await;
                return Err(e);
            }
        }

        if brk {
            self.recover_brk_pause().await;
        }
        Ok(self.status())
    }

    /// Connect to a running target: a WebSocket endpoint, or a port whose
    /// `/json` listing supplies one.
    pub async fn attach(&self, target: &str) -> Result<StatusInfo> {
        self.require_state(ExecState::Idle)?;

        let ws_url = if target.starts_with("ws://") || target.starts_with("wss://") {
            target.to_string()
        } else if let Ok(port) = target.parse::<u16>() {
            let listing: Vec<serde_json::Value> =
                reqwest::get(format!("http://127.0.0.1:{port}/json"))
                    .await
                    .map_err(|e| Error::TransportFailed(e.to_string()))?
                    .json()
                    .await
                    .map_err(|e| Error::TransportFailed(e.to_string()))?;
            listing
                .first()
                .and_then(|t| t["webSocketDebuggerUrl"].as_str())
                .map(str::to_string)
                .ok_or_else(|| {
                    Error::TransportFailed(format!("no debug targets on port {port}"))
                })?
        } else {
            return Err(Error::invalid(
                "target",
                "expected a ws:// URL or a port number",
            ));
        };

        self.shared.core.lock().unwrap().ws_url = Some(ws_url.clone());
        self.connect_and_enable(&ws_url, false).await?;
        Ok(self.status())
    }

    /// Connect the transport, install event handlers before any domain is
    /// enabled, enable the domains concurrently, and re-apply remembered
    /// blackbox patterns.
    async fn connect_and_enable(&self, ws_url: &str, brk: bool) -> Result<()> {
        let transport = CdpTransport::connect(ws_url, self.protocol_log.clone())?;
        events::install(&transport, &self.shared);
        *self.transport.lock().unwrap() = Some(transport.clone());

        let (debugger, runtime, profiler, heap) = tokio::join!(
            transport.send("Debugger.enable", None),
            transport.send("Runtime.enable", None),
            transport.send("Profiler.enable", None),
            transport.send("HeapProfiler.enable", None),
        );
        debugger?;
        runtime?;
        // Profiler domains are best-effort; some targets do not expose them.
        let _ = profiler;
        let _ = heap;

        let blackbox = self.shared.core.lock().unwrap().blackbox.clone();
        if !blackbox.is_empty() {
            let _ = transport
                .send("Debugger.setBlackboxPatterns", Some(json!({"patterns": blackbox})))
                .await;
        }

        if !brk {
            let mut core = self.shared.core.lock().unwrap();
            if core.exec == ExecState::Idle {
                core.exec = ExecState::Running;
            }
        }
        Ok(())
    }

    /// Break-on-start recovery for runtimes that do not emit the expected
    /// pause event, or that first pause inside internal bootstrap modules.
    async fn recover_brk_pause(&self) {
        // 1. Give the normal pause event 100 ms.
        for _ in 0..10 {
            if self.state() == ExecState::Paused {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // 2. Nudge the runtime and poll up to 2 s.
        if self.state() != ExecState::Paused {
            if let Ok(transport) = self.transport_handle() {
                let _ = transport.send("Debugger.pause", None).await;
                let _ = transport.send("Runtime.runIfWaitingForDebugger", None).await;
            }
            for _ in 0..40 {
                if self.state() == ExecState::Paused {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }

        // 3. Step past internal bootstrap pauses.
        for _ in 0..5 {
            let in_internal = {
                let core = self.shared.core.lock().unwrap();
                core.exec == ExecState::Paused
                    && core
                        .pause
                        .as_ref()
                        .is_some_and(|p| p.url.starts_with("node:"))
            };
            if !in_internal {
                break;
            }
            let Ok(transport) = self.transport_handle() else {
                break;
            };
            let waiter = self.pause_waiter(Duration::from_secs(5));
            if transport.send("Debugger.resume", None).await.is_err() {
                break;
            }
            waiter.wait().await;
        }
    }

    /// Relaunch the remembered target. Attach-only sessions cannot restart.
    pub async fn restart(&self) -> Result<StatusInfo> {
        let spec = self
            .launch_spec
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::invalid("restart", "session was not launched"))?;
        self.stop().await;
        self.launch(spec.command, spec.brk, Some(spec.port)).await
    }

    /// Disconnect, kill the child, and reset every piece of in-memory
    /// state. Idempotent.
    pub async fn stop(&self) {
        if let Some(transport) = self.transport.lock().unwrap().take() {
            transport.disconnect();
        }
        if let Some(kill) = self.kill_tx.lock().unwrap().take() {
            let _ = kill.send(());
        }
        // Grace period for the monitor to reap the child.
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.shared.reset_to_idle();
        self.shared.bump_exit();
    }

    // ── Ring-buffer readers ──────────────────────────────────────────────────

    pub fn console_messages(
        &self,
        level: Option<&str>,
        since: Option<u64>,
        clear: bool,
    ) -> Vec<ConsoleMessage> {
        let mut core = self.shared.core.lock().unwrap();
        let out: Vec<ConsoleMessage> = core
            .console
            .iter()
            .filter(|m| level.is_none_or(|l| m.level == l))
            .filter(|m| since.is_none_or(|s| m.ts >= s))
            .cloned()
            .collect();
        if clear {
            core.console.clear();
        }
        out
    }

    pub fn exceptions(&self, since: Option<u64>) -> Vec<ExceptionEntry> {
        let core = self.shared.core.lock().unwrap();
        core.exceptions
            .iter()
            .filter(|e| since.is_none_or(|s| e.ts >= s))
            .cloned()
            .collect()
    }

    // ── Blackbox ─────────────────────────────────────────────────────────────

    pub async fn blackbox_add(&self, patterns: Vec<String>) -> Result<Vec<String>> {
        if patterns.is_empty() {
            return Err(Error::invalid("patterns", "no patterns supplied"));
        }
        let all = {
            let mut core = self.shared.core.lock().unwrap();
            for p in patterns {
                if !core.blackbox.contains(&p) {
                    core.blackbox.push(p);
                }
            }
            core.blackbox.clone()
        };
        self.apply_blackbox(&all).await?;
        Ok(all)
    }

    pub fn blackbox_list(&self) -> Vec<String> {
        self.shared.core.lock().unwrap().blackbox.clone()
    }

    pub async fn blackbox_remove(&self, patterns: Vec<String>) -> Result<Vec<String>> {
        let all = {
            let mut core = self.shared.core.lock().unwrap();
            core.blackbox.retain(|p| !patterns.contains(p));
            core.blackbox.clone()
        };
        self.apply_blackbox(&all).await?;
        Ok(all)
    }

    async fn apply_blackbox(&self, patterns: &[String]) -> Result<()> {
        // Patterns are remembered while idle and re-applied on launch.
        let Ok(transport) = self.transport_handle() else {
            return Ok(());
        };
        transport
            .send("Debugger.setBlackboxPatterns", Some(json!({"patterns": patterns})))
            .await?;
        Ok(())
    }

    /// Exception-pause mode. The wire has no caught-only mode, so `caught`
    /// maps to `all`.
    pub async fn set_exception_pause(&self, mode: &str) -> Result<String> {
        let wire = match mode {
            "all" | "uncaught" | "none" => mode,
            "caught" => "all",
            other => {
                return Err(Error::invalid(
                    "mode",
                    format!("expected all|uncaught|caught|none, got {other}"),
                ))
            }
        };
        let transport = self.transport_handle()?;
        transport
            .send("Debugger.setPauseOnExceptions", Some(json!({"state": wire})))
            .await?;
        self.shared.core.lock().unwrap().exception_pause_mode = wire.to_string();
        Ok(wire.to_string())
    }

    // ── Source-map operator commands ─────────────────────────────────────────

    pub fn sourcemap_summaries(&self, file: Option<&str>) -> Vec<crate::sourcemap::MapSummary> {
        self.shared.resolver.summaries(file)
    }

    pub fn sourcemap_disable(&self) {
        self.shared.resolver.set_disabled(true);
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn push_child_line(&self, level: &str, line: String) {
        let mut core = self.shared.core.lock().unwrap();
        core.console.push(ConsoleMessage {
            ts: now_millis(),
            level: level.to_string(),
            text: line,
            location: None,
        });
    }

    fn spawn_output_pump<R>(&self, level: &'static str, mut lines: tokio::io::Lines<R>)
    where
        R: tokio::io::AsyncBufRead + Unpin + Send + 'static,
    {
        let shared = self.shared.clone();
        self.shared.rt.spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                let mut core = shared.core.lock().unwrap();
                core.console.push(ConsoleMessage {
                    ts: now_millis(),
                    level: level.to_string(),
                    text: line,
                    location: None,
                });
            }
        });
    }

    pub(crate) fn default_waiter(&self) -> PauseWaiter {
        self.pause_waiter(DEFAULT_PAUSE_TIMEOUT)
    }
}
