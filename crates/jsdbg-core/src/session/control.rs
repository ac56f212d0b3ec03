//! Execution control: continue, step, pause, run-to, restart-frame.
//!
//! Every command follows the same shape: subscribe a pause-waiter first,
//! send the command, then await the waiter. The subscription-before-send
//! order is what keeps a fast pause from being lost.

use serde::Serialize;
use serde_json::json;

use crate::breakpoints::url_regex_for_path;
use crate::error::{Error, Result};
use crate::scripts::strip_file_scheme;
use crate::session::breaks::{resolve_target, WireTarget};
use crate::session::{ExecState, PauseInfo, Session};

/// Result of an execution-control command: the state observed after the
/// waiter settled, plus the translated pause location when paused.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlOutcome {
    pub state: ExecState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pause: Option<PauseInfo>,
}

impl Session {
    fn control_outcome(&self) -> ControlOutcome {
        let status = self.status();
        ControlOutcome {
            state: status.state,
            pause: status.pause_info,
        }
    }

    /// Resume execution and wait for the next pause, exit, or timeout.
    pub async fn resume(&self) -> Result<ControlOutcome> {
        self.require_state(ExecState::Paused)?;
        let transport = self.transport_handle()?;
        let waiter = self.default_waiter();
        transport.send("Debugger.resume", None).await?;
        waiter.wait().await;
        Ok(self.control_outcome())
    }

    /// One step: `over`, `into`, or `out`.
    pub async fn step(&self, mode: &str) -> Result<ControlOutcome> {
        self.require_state(ExecState::Paused)?;
        let method = match mode {
            "over" => "Debugger.stepOver",
            "into" => "Debugger.stepInto",
            "out" => "Debugger.stepOut",
            other => {
                return Err(Error::invalid(
                    "mode",
                    format!("expected over|into|out, got {other}"),
                ))
            }
        };
        let transport = self.transport_handle()?;
        let waiter = self.default_waiter();
        transport.send(method, None).await?;
        waiter.wait().await;
        Ok(self.control_outcome())
    }

    /// Interrupt a running target.
    pub async fn pause(&self) -> Result<ControlOutcome> {
        self.require_state(ExecState::Running)?;
        let transport = self.transport_handle()?;
        let waiter = self.default_waiter();
        transport.send("Debugger.pause", None).await?;
        waiter.wait().await;
        Ok(self.control_outcome())
    }

    /// Run to a location: temporary breakpoint, resume, remove.
    pub async fn run_to(&self, path: &str, line: u32) -> Result<ControlOutcome> {
        self.require_state(ExecState::Paused)?;
        if line == 0 {
            return Err(Error::invalid("line", "lines are 1-based"));
        }
        let transport = self.transport_handle()?;

        let (pattern, wire_line) = match resolve_target(self, path, line) {
            (WireTarget::Url { url, line }, _) => {
                (url_regex_for_path(strip_file_scheme(&url)), line)
            }
            (WireTarget::Regex { pattern, line }, _) => (pattern, line),
        };

        let result = transport
            .send(
                "Debugger.setBreakpointByUrl",
                Some(json!({
                    "lineNumber": wire_line.saturating_sub(1),
                    "urlRegex": pattern,
                })),
            )
            .await?;
        let temp_id = result["breakpointId"].as_str().map(str::to_string);

        let waiter = self.default_waiter();
        transport.send("Debugger.resume", None).await?;
        waiter.wait().await;

        // Best-effort removal; the process may have exited while running.
        if let Some(id) = temp_id {
            let _ = transport
                .send("Debugger.removeBreakpoint", Some(json!({"breakpointId": id})))
                .await;
        }
        Ok(self.control_outcome())
    }

    /// Re-enter the selected frame from its top, pausing at its first
    /// statement.
    pub async fn restart_frame(&self, frame: Option<&str>) -> Result<ControlOutcome> {
        self.require_state(ExecState::Paused)?;
        let (_, call_frame) = self.select_frame(frame)?;
        let transport = self.transport_handle()?;
        let waiter = self.default_waiter();
        transport
            .send(
                "Debugger.restartFrame",
                Some(json!({
                    "callFrameId": call_frame.call_frame_id,
                    "mode": "StepInto",
                })),
            )
            .await?;
        waiter.wait().await;
        Ok(self.control_outcome())
    }
}
