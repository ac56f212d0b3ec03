//! jsdbg-core — the debug session engine.
//!
//! A headless controller for the V8 inspector protocol: one [`Session`]
//! owns one debug target, speaks the wire protocol through
//! [`transport::CdpTransport`], and exposes the command catalogue a
//! control-socket daemon serves to clients.

/// Engine version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod breakpoints;
pub mod buffers;
pub mod error;
pub mod format;
pub mod protocol;
pub mod refs;
pub mod scripts;
pub mod session;
pub mod sourcemap;
pub mod transport;
pub mod waiter;

pub use error::{Error, Result};
pub use session::{ExecState, PauseInfo, Session, StatusInfo};
