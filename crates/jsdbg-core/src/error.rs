//! Error taxonomy for the debug session engine.
//!
//! Every failure a command can surface to the control socket is one of these
//! variants. The daemon renders them with `to_string()`; variants carry just
//! enough structure for callers to attach a suggestion.

use thiserror::Error;

/// Errors produced by the session engine and its transport.
#[derive(Debug, Error)]
pub enum Error {
    /// No inspector transport is connected.
    #[error("not connected to a debug target")]
    NotConnected,

    /// A command was issued in the wrong execution state.
    #[error("bad state: expected {expected}, session is {actual}")]
    BadState {
        expected: &'static str,
        actual: &'static str,
    },

    /// A handle is not present in the reference table.
    #[error("unknown ref: {0}")]
    UnknownRef(String),

    /// A handle exists but has the wrong kind for the operation.
    #[error("ref {handle} is not a {expected} ref")]
    BadRefKind {
        handle: String,
        expected: &'static str,
    },

    /// No loaded script matches the supplied path, even after suffix
    /// matching and source-map reverse lookup.
    #[error("no loaded script matches {0}")]
    ScriptNotFound(String),

    /// The runtime reported exception details while evaluating.
    #[error("evaluation failed: {0}")]
    EvalFailed(String),

    /// The runtime reported exception details while mutating state.
    #[error("mutation failed: {0}")]
    MutationFailed(String),

    /// An inspector request exceeded its 30 s budget.
    #[error("request timed out: {method} (id {id})")]
    RequestTimedOut { method: String, id: u32 },

    /// Could not connect, or the underlying stream errored.
    #[error("transport failed: {0}")]
    TransportFailed(String),

    /// A pending request was cancelled because the transport closed.
    #[error("disconnected from debug target")]
    Disconnected,

    /// The inspector responded to a request with a protocol-level error.
    #[error("{method} failed: {message} (code {code})")]
    Inspector {
        method: String,
        code: i64,
        message: String,
    },

    /// The child never printed its inspector endpoint.
    #[error("did not detect inspector endpoint within 5s of spawn")]
    InspectorDetectionFailed,

    /// Malformed input at the schema boundary.
    #[error("invalid argument {field}: {reason}")]
    InvalidArgument { field: &'static str, reason: String },
}

impl Error {
    /// Shorthand for [`Error::InvalidArgument`].
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;
