//! Mutation commands: assign a variable, override a return value, and
//! hot-patch a script's source.

use serde::Serialize;
use serde_json::json;

use crate::error::{Error, Result};
use crate::format::format_remote_object;
use crate::protocol::{EvaluateResult, RemoteObject, SetScriptSourceResult};
use crate::session::{ExecState, Session};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVariableOutcome {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    pub value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HotpatchOutcome {
    pub status: String,
    /// True when the patch forced a restack.
    pub stack_changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

impl Session {
    /// Assign `value_expr` to `name` in the selected frame. The previous
    /// value is captured best-effort for the response.
    pub async fn set_variable(
        &self,
        name: &str,
        value_expr: &str,
        frame: Option<&str>,
    ) -> Result<SetVariableOutcome> {
        let (_, call_frame) = self.select_frame(frame)?;
        let transport = self.transport_handle()?;

        let old_value = match transport
            .send(
                "Debugger.evaluateOnCallFrame",
                Some(json!({
                    "callFrameId": call_frame.call_frame_id,
                    "expression": name,
                    "returnByValue": false,
                })),
            )
            .await
        {
            Ok(value) => serde_json::from_value::<EvaluateResult>(value)
                .ok()
                .filter(|r| r.exception_details.is_none())
                .map(|r| format_remote_object(&r.result)),
            Err(_) => None,
        };

        let value = transport
            .send(
                "Debugger.evaluateOnCallFrame",
                Some(json!({
                    "callFrameId": call_frame.call_frame_id,
                    "expression": format!("{name} = ({value_expr})"),
                    "returnByValue": false,
                })),
            )
            .await?;
        let result: EvaluateResult = serde_json::from_value(value)
            .map_err(|e| Error::TransportFailed(format!("malformed protocol result: {e}")))?;
        if let Some(details) = result.exception_details {
            return Err(Error::MutationFailed(details.message()));
        }

        Ok(SetVariableOutcome {
            name: name.to_string(),
            old_value,
            value: format_remote_object(&result.result),
        })
    }

    /// Override the return value of the frame about to return. Objects go
    /// by reference, special numerics by unserializable value, the rest by
    /// value.
    pub async fn set_return_value(&self, value_expr: &str) -> Result<String> {
        self.require_state(ExecState::Paused)?;
        let (_, top) = self.select_frame(None)?;
        let transport = self.transport_handle()?;

        let value = transport
            .send(
                "Debugger.evaluateOnCallFrame",
                Some(json!({
                    "callFrameId": top.call_frame_id,
                    "expression": value_expr,
                    "returnByValue": false,
                })),
            )
            .await?;
        let result: EvaluateResult = serde_json::from_value(value)
            .map_err(|e| Error::TransportFailed(format!("malformed protocol result: {e}")))?;
        if let Some(details) = result.exception_details {
            return Err(Error::MutationFailed(details.message()));
        }

        transport
            .send(
                "Debugger.setReturnValue",
                Some(json!({"newValue": call_argument(&result.result)})),
            )
            .await?;
        Ok(format_remote_object(&result.result))
    }

    /// Replace a script's source in the running target.
    pub async fn hotpatch(
        &self,
        path: &str,
        new_source: &str,
        dry_run: bool,
    ) -> Result<HotpatchOutcome> {
        let script_id = self.find_script_for_path(path)?;
        let transport = self.transport_handle()?;
        let value = transport
            .send(
                "Debugger.setScriptSource",
                Some(json!({
                    "scriptId": script_id,
                    "scriptSource": new_source,
                    "dryRun": dry_run,
                })),
            )
            .await?;
        let result: SetScriptSourceResult = serde_json::from_value(value)
            .map_err(|e| Error::TransportFailed(format!("malformed protocol result: {e}")))?;

        Ok(HotpatchOutcome {
            status: result.status.unwrap_or_else(|| "Ok".to_string()),
            stack_changed: result.call_frames.as_ref().is_some_and(|f| !f.is_empty()),
            exception: result.exception_details.map(|d| d.message()),
        })
    }
}

/// Build the wire argument handing a remote object to a mutation
/// primitive.
fn call_argument(obj: &RemoteObject) -> serde_json::Value {
    if let Some(id) = &obj.object_id {
        json!({"objectId": id})
    } else if let Some(unserializable) = &obj.unserializable_value {
        json!({"unserializableValue": unserializable})
    } else {
        json!({"value": obj.value})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(json: serde_json::Value) -> RemoteObject {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_call_argument_prefers_object_id() {
        let arg = call_argument(&obj(json!({"type":"object","objectId":"42"})));
        assert_eq!(arg, json!({"objectId":"42"}));
    }

    #[test]
    fn test_call_argument_unserializable() {
        let arg = call_argument(&obj(json!({"type":"number","unserializableValue":"NaN"})));
        assert_eq!(arg, json!({"unserializableValue":"NaN"}));
    }

    #[test]
    fn test_call_argument_by_value() {
        let arg = call_argument(&obj(json!({"type":"number","value":7})));
        assert_eq!(arg, json!({"value":7}));
        let arg = call_argument(&obj(json!({"type":"undefined"})));
        assert_eq!(arg, json!({"value":null}));
    }
}
