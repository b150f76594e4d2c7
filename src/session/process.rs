//! I/O tasks for a running CLI process
//!
//! Each session gets four tasks: stdout reader, stderr forwarder, stdin
//! writer and a supervisor that owns the `Child`. Only the supervisor
//! touches the process, so signals are never sent to a reaped pid.

use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use super::agent_session::SessionInner;
use crate::error::{RelayError, Result};
use crate::protocol::RecordCodec;
use crate::types::records::UserTurn;

/// How long to keep draining stdout after exit
const STDOUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Requests handled by the supervisor task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ProcessSignal {
    /// Polite termination (SIGTERM on unix)
    Terminate,
    /// Forced termination
    Kill,
}

/// Senders kept by the session once the process is attached
pub(super) struct ProcessHandles {
    pub stdin_tx: mpsc::UnboundedSender<UserTurn>,
    pub signal_tx: mpsc::UnboundedSender<ProcessSignal>,
}

/// Take the child's pipes and spawn its I/O tasks
pub(super) fn attach(inner: Arc<SessionInner>, mut child: Child) -> Result<ProcessHandles> {
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| RelayError::process("Failed to get stdin handle"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| RelayError::process("Failed to get stdout handle"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| RelayError::process("Failed to get stderr handle"))?;

    let (stdin_tx, stdin_rx) = mpsc::unbounded_channel();
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();

    tokio::spawn(write_stdin(Arc::clone(&inner), stdin, stdin_rx));
    tokio::spawn(forward_stderr(Arc::clone(&inner), stderr));
    let reader = tokio::spawn(read_stdout(Arc::clone(&inner), stdout));
    tokio::spawn(supervise(inner, child, signal_rx, reader));

    Ok(ProcessHandles {
        stdin_tx,
        signal_tx,
    })
}

/// Decode stdout line by line and dispatch records
async fn read_stdout(inner: Arc<SessionInner>, stdout: ChildStdout) {
    let mut frames = FramedRead::new(stdout, RecordCodec::new());
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(Ok(record)) => inner.dispatch(record),
            Ok(Err(e)) => inner.report(e),
            Err(e) => {
                inner.fail(RelayError::process(format!("Failed to read stdout: {e}")));
                break;
            }
        }
    }
    log::debug!("[{}] stdout closed", inner.provisional_id);
}

/// Surface stderr output as advisory errors
async fn forward_stderr(inner: Arc<SessionInner>, mut stderr: ChildStderr) {
    let mut buffer = vec![0u8; 4096];
    loop {
        match stderr.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => {
                let text = String::from_utf8_lossy(&buffer[..n]);
                let text = text.trim();
                if !text.is_empty() {
                    inner.report(RelayError::process(format!("stderr: {text}")));
                }
            }
            Err(e) => {
                log::debug!("[{}] stderr read failed: {e}", inner.provisional_id);
                break;
            }
        }
    }
}

/// Write queued user turns to stdin; closing the queue closes stdin
async fn write_stdin(
    inner: Arc<SessionInner>,
    stdin: ChildStdin,
    mut turns: mpsc::UnboundedReceiver<UserTurn>,
) {
    let mut sink = FramedWrite::new(stdin, RecordCodec::new());
    while let Some(turn) = turns.recv().await {
        if let Err(e) = sink.send(turn).await {
            inner.close_stdin();
            inner.fail(RelayError::process(format!("Failed to write to stdin: {e}")));
            return;
        }
    }
    if let Err(e) = sink.close().await {
        log::debug!("[{}] Failed to close stdin: {e}", inner.provisional_id);
    }
}

/// Own the child: deliver signals, observe exit
async fn supervise(
    inner: Arc<SessionInner>,
    mut child: Child,
    mut signals: mpsc::UnboundedReceiver<ProcessSignal>,
    reader: JoinHandle<()>,
) {
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            Some(signal) = signals.recv() => deliver(&inner, &mut child, signal),
        }
    };

    inner.disarm_grace();

    let abort = reader.abort_handle();
    if tokio::time::timeout(STDOUT_DRAIN_TIMEOUT, reader).await.is_err() {
        log::debug!("[{}] stdout still open after exit", inner.provisional_id);
        abort.abort();
    }

    match status {
        Ok(status) => inner.on_exit(status.code()),
        Err(e) => {
            inner.fail(RelayError::process(format!("Failed to wait for process: {e}")));
            inner.on_exit(None);
        }
    }
}

fn deliver(inner: &SessionInner, child: &mut Child, signal: ProcessSignal) {
    match signal {
        ProcessSignal::Terminate => terminate(inner, child),
        ProcessSignal::Kill => {
            if let Err(e) = child.start_kill() {
                log::debug!("[{}] Kill failed: {e}", inner.provisional_id);
            }
        }
    }
}

#[cfg(unix)]
fn terminate(inner: &SessionInner, child: &mut Child) {
    // `id()` is None once the child has been reaped
    let Some(pid) = child.id().and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return;
    };
    // SAFETY: `pid` is our own child and has not been reaped yet.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        log::debug!(
            "[{}] SIGTERM failed: {}",
            inner.provisional_id,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn terminate(inner: &SessionInner, child: &mut Child) {
    if let Err(e) = child.start_kill() {
        log::debug!("[{}] Kill failed: {e}", inner.provisional_id);
    }
}

/// Kill the process if it has not exited within `grace`
pub(super) fn arm_grace_timer(
    inner: &Arc<SessionInner>,
    signal_tx: mpsc::UnboundedSender<ProcessSignal>,
    token: CancellationToken,
    grace: Duration,
) {
    let weak = Arc::downgrade(inner);
    tokio::spawn(async move {
        tokio::select! {
            () = token.cancelled() => {}
            () = tokio::time::sleep(grace) => {
                let Some(inner) = weak.upgrade() else { return };
                if inner.record_forced_termination(&token) {
                    log::warn!(
                        "[{}] CLI did not exit within {:?}, killing",
                        inner.provisional_id,
                        grace
                    );
                    let _ = signal_tx.send(ProcessSignal::Kill);
                }
            }
        }
    });
}
