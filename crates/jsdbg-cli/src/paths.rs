//! Per-user runtime directory for control sockets and logs.
//!
//! `JSDBG_RUNTIME_DIR` overrides the default, which is the platform
//! runtime dir (falling back to the system temp dir) plus `jsdbg/`.

use std::path::PathBuf;

pub fn runtime_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("JSDBG_RUNTIME_DIR") {
        return PathBuf::from(dir);
    }
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("jsdbg")
}

pub fn socket_path(session: &str) -> PathBuf {
    runtime_dir().join(format!("{session}.sock"))
}

pub fn daemon_log_path(session: &str) -> PathBuf {
    runtime_dir().join(format!("{session}.log"))
}

pub fn protocol_log_path(session: &str) -> PathBuf {
    runtime_dir().join(format!("{session}.protocol.jsonl"))
}

/// Sessions with a control socket present, sorted.
pub fn list_sessions() -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(runtime_dir()) else {
        return Vec::new();
    };
    let mut sessions: Vec<String> = entries
        .flatten()
        .filter_map(|e| {
            let name = e.file_name().into_string().ok()?;
            name.strip_suffix(".sock").map(str::to_string)
        })
        .collect();
    sessions.sort();
    sessions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_path_under_runtime_dir() {
        let path = socket_path("default");
        assert!(path.ends_with("default.sock"));
        assert!(path.starts_with(runtime_dir()));
    }
}
