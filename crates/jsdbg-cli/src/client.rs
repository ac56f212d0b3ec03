//! CLI-side control-socket client with daemon autostart.

use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::ipc::{Request, Response};
use crate::paths;

/// Send one request to the session daemon, starting it if needed.
pub async fn request(session: &str, request: &Request) -> anyhow::Result<Response> {
    let sock = paths::socket_path(session);

    let stream = match UnixStream::connect(&sock).await {
        Ok(stream) => stream,
        Err(_) => {
            spawn_daemon(session)?;
            wait_for_socket(session).await?;
            UnixStream::connect(&sock)
                .await
                .with_context(|| format!("connecting to {}", sock.display()))?
        }
    };

    let (read_half, mut write_half) = stream.into_split();
    let mut payload = serde_json::to_string(request)?;
    payload.push('\n');
    write_half.write_all(payload.as_bytes()).await?;

    let mut line = String::new();
    let mut reader = BufReader::new(read_half);
    reader.read_line(&mut line).await?;
    if line.trim().is_empty() {
        anyhow::bail!("daemon closed the connection without a response");
    }
    serde_json::from_str(&line).context("malformed response from daemon")
}

/// Start the daemon detached, with its diagnostics in the session log.
fn spawn_daemon(session: &str) -> anyhow::Result<()> {
    let exe = std::env::current_exe().context("locating jsdbg binary")?;
    std::fs::create_dir_all(paths::runtime_dir())?;
    let log = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(paths::daemon_log_path(session))?;

    std::process::Command::new(exe)
        .args(["--session", session, "daemon"])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(log)
        .spawn()
        .context("spawning session daemon")?;
    Ok(())
}

async fn wait_for_socket(session: &str) -> anyhow::Result<()> {
    let sock = paths::socket_path(session);
    for _ in 0..40 {
        if UnixStream::connect(&sock).await.is_ok() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    anyhow::bail!(
        "daemon did not come up; check {}",
        paths::daemon_log_path(session).display()
    )
}
