//! Executor process supervision and stream tasks.
//!
//! Spawns the executor with a scrubbed environment and runs the tasks that
//! move lines between the process and the tracker:
//!
//! | Task        | Does                                                     |
//! |-------------|----------------------------------------------------------|
//! | writer      | encodes requests onto the executor's stdin               |
//! | reader      | decodes responses from stdout, counts noise              |
//! | stderr      | logs each stderr line at `DEBUG`, never parses it        |
//! | monitor     | waits for exit; on cancellation sends SIGTERM, then kills |
//! | closer      | marks the bridge ended and rejects pending requests      |
//!
//! Every task that notices the executor going away cancels the shared
//! [`CancellationToken`]; the closer turns that into the terminal state.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::tracker::Command as TrackerCommand;
use crate::config::BridgeConfig;
use crate::protocol::codec::{encode_line, Line, LineCodec};
use crate::protocol::{decode_line, Decoded, Request, Response};
use crate::{BridgeError, Result};

/// How long the executor gets to exit after SIGTERM before it is killed.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(2);

// ── Spawner ──────────────────────────────────────────────────────────────────

/// Launch the executor process described by `config`.
///
/// The child starts with `env_clear()` plus the configured allowlist, piped
/// stdio and `kill_on_drop(true)`.
///
/// # Errors
///
/// Returns [`BridgeError::Spawn`] if the process cannot be started.
pub fn spawn_executor(config: &BridgeConfig) -> Result<Child> {
    let program = config.resolve_executor();
    let mut cmd = Command::new(&program);
    cmd.args(config.executor_command_args());

    // Strip inherited environment, then inject only the allowlist.
    cmd.env_clear();
    for key in &config.env_allowlist {
        if let Ok(val) = std::env::var(key) {
            cmd.env(key, val);
        }
    }

    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|err| {
        BridgeError::Spawn(format!(
            "failed to spawn executor {}: {err}",
            program.display()
        ))
    })?;
    info!(pid = ?child.id(), program = %program.display(), "executor spawned");
    Ok(child)
}

// ── Stream tasks ─────────────────────────────────────────────────────────────

/// Writer task: encode queued requests onto `output`.
///
/// Stops on cancellation or once the queue closes. A failed write cancels
/// `cancel`, since the executor can no longer be reached.
pub(crate) async fn run_writer<W>(
    mut output: W,
    mut requests: mpsc::UnboundedReceiver<Request>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("writer: cancellation received, stopping");
                break;
            }

            request = requests.recv() => {
                let Some(request) = request else {
                    debug!("writer: request queue closed, stopping");
                    break;
                };

                if let Err(e) = write_request(&mut output, &request).await {
                    warn!(id = ?request.id, error = %e, "writer: write to executor failed");
                    cancel.cancel();
                    break;
                }
            }
        }
    }
}

async fn write_request<W: AsyncWrite + Unpin>(output: &mut W, request: &Request) -> Result<()> {
    let bytes = encode_line(request)?;
    output.write_all(&bytes).await?;
    output.flush().await?;
    Ok(())
}

/// Reader task: decode response lines and hand them to the tracker.
///
/// Malformed lines, falsy packets and over-long lines bump `noise` and are
/// skipped. EOF or a read error cancels `cancel`.
pub(crate) async fn run_reader<R>(
    input: R,
    max_line_bytes: usize,
    commands: mpsc::UnboundedSender<TrackerCommand>,
    noise: Arc<AtomicU64>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut framed = FramedRead::new(input, LineCodec::with_max_line_bytes(max_line_bytes));

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("reader: cancellation received, stopping");
                return;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!("reader: EOF detected");
                        break;
                    }

                    Some(Err(e)) => {
                        warn!(error = %e, "reader: IO error, stopping");
                        break;
                    }

                    Some(Ok(Line::TooLong)) => {
                        noise.fetch_add(1, Ordering::Relaxed);
                        warn!(max_line_bytes, "reader: line too long, skipping");
                    }

                    Some(Ok(Line::Text(line))) => match decode_line::<Response>(&line) {
                        Decoded::Packet(response) => {
                            if commands.send(TrackerCommand::Response(response)).is_err() {
                                debug!("reader: tracker gone, stopping");
                                break;
                            }
                        }
                        Decoded::Noise(reason) => {
                            noise.fetch_add(1, Ordering::Relaxed);
                            warn!(reason = reason.as_str(), "reader: discarding malformed line");
                        }
                    },
                }
            }
        }
    }

    cancel.cancel();
}

/// Stderr task: log every line at `DEBUG` until EOF.
pub(crate) async fn run_stderr<R>(stderr: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(target: "farside::executor", "{line}"),
            Ok(None) => break,
            Err(err) => {
                debug!(%err, "stderr: read failed, stopping");
                break;
            }
        }
    }
}

/// Closer task: once `cancel` fires, mark the bridge ended and reject
/// everything still pending.
pub(crate) async fn run_closer(
    cancel: CancellationToken,
    ended: Arc<AtomicBool>,
    commands: mpsc::UnboundedSender<TrackerCommand>,
) {
    cancel.cancelled().await;
    ended.store(true, Ordering::SeqCst);
    let _ = commands.send(TrackerCommand::Closed);
    info!("bridge ended");
}

// ── Exit monitor ─────────────────────────────────────────────────────────────

/// Spawn a task that waits for the executor to exit.
///
/// An exit, by any code or signal, cancels `cancel`. Cancellation from
/// elsewhere terminates the child instead.
#[must_use]
pub(crate) fn monitor_exit(mut child: Child, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = child.wait() => {
                match result {
                    Ok(status) => {
                        let reason = status.code().map_or_else(
                            || "terminated by signal".to_owned(),
                            |c| format!("exited with code {c}"),
                        );
                        info!(reason, "executor process ended");
                    }
                    Err(err) => warn!(%err, "error waiting for executor process"),
                }
                cancel.cancel();
            }
            () = cancel.cancelled() => {
                terminate(&mut child).await;
            }
        }
    })
}

/// Ask the child to stop with SIGTERM, then kill it if it lingers.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
            if let Err(err) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
                debug!(%err, pid, "SIGTERM failed");
            }
            if let Ok(Ok(status)) = tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
                info!(?status, "executor exited after SIGTERM");
                return;
            }
        }
    }

    match child.kill().await {
        Ok(()) => info!("executor killed"),
        Err(err) => debug!(%err, "kill failed, executor already gone"),
    }
}
