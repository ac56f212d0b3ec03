//! jsdbg CLI internals: control-socket protocol, daemon, client, output.
//!
//! The `jsdbg` binary in `main.rs` is a thin clap layer over these
//! modules; they are a library so the daemon can be integration-tested
//! in-process.

pub mod client;
pub mod daemon;
pub mod ipc;
pub mod output;
pub mod paths;
