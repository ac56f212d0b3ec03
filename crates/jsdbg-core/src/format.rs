//! Display formatting for remote values.
//!
//! Shared by the vars/eval/props commands and the console event handler so
//! every surface renders a value the same way.

use crate::protocol::RemoteObject;

/// Render a remote object for display.
pub fn format_remote_object(obj: &RemoteObject) -> String {
    // Unserializable numerics (NaN, Infinity, -0, bigint literals) carry
    // their own spelling.
    if let Some(unser) = &obj.unserializable_value {
        return unser.clone();
    }

    match obj.object_type.as_str() {
        "undefined" => "undefined".to_string(),
        "string" => obj
            .value
            .as_ref()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| obj.description.clone().unwrap_or_default()),
        "number" | "boolean" | "bigint" => obj
            .description
            .clone()
            .or_else(|| obj.value.as_ref().map(ToString::to_string))
            .unwrap_or_default(),
        "function" => first_line(obj.description.as_deref().unwrap_or("function")),
        "symbol" => obj.description.clone().unwrap_or_else(|| "Symbol()".into()),
        "object" => {
            if obj.subtype.as_deref() == Some("null") {
                return "null".to_string();
            }
            obj.description
                .clone()
                .or_else(|| obj.class_name.clone())
                .unwrap_or_else(|| "Object".into())
        }
        _ => obj
            .description
            .clone()
            .or_else(|| obj.value.as_ref().map(ToString::to_string))
            .unwrap_or_default(),
    }
}

/// Short type tag for a remote object (`number`, `string`, `Array`, ...).
pub fn type_label(obj: &RemoteObject) -> String {
    if obj.object_type == "object" {
        if let Some(subtype) = &obj.subtype {
            if subtype == "null" {
                return "null".to_string();
            }
        }
        if let Some(class) = &obj.class_name {
            return class.clone();
        }
    }
    obj.object_type.clone()
}

fn first_line(s: &str) -> String {
    s.lines().next().unwrap_or(s).to_string()
}
