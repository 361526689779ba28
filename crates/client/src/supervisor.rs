//! Process supervisor: owns at most one subprocess and its two pipes.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use tw_domain::config::{ConnectionTarget, Readiness};

use crate::error::{RpcError, TransportError};
use crate::framing;
use crate::protocol::RequestEnvelope;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Result of [`Supervisor::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new process was launched.
    Spawned { pid: Option<u32> },
    /// A live process already existed; nothing was launched.
    AlreadyRunning { pid: Option<u32> },
}

impl StartOutcome {
    pub fn pid(&self) -> Option<u32> {
        match self {
            Self::Spawned { pid } | Self::AlreadyRunning { pid } => *pid,
        }
    }
}

/// Snapshot of the supervised process.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessInfo {
    pub pid: Option<u32>,
    pub spawned_at: DateTime<Utc>,
}

struct ProcessHandle {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    info: ProcessInfo,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Supervisor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Starts, health-checks and stops one subprocess at a time.
pub struct Supervisor {
    readiness: Readiness,
    handle: Option<ProcessHandle>,
    spawn_count: u64,
}

impl Supervisor {
    pub fn new(readiness: Readiness) -> Self {
        Self {
            readiness,
            handle: None,
            spawn_count: 0,
        }
    }

    /// Launch the target unless a live process already exists.
    ///
    /// A handle whose process has died is reaped and replaced. Any spawn
    /// failure, including an exit during the readiness wait, comes back as
    /// [`RpcError::Spawn`].
    pub async fn start(&mut self, target: &ConnectionTarget) -> Result<StartOutcome, RpcError> {
        if self.is_running() {
            return Ok(StartOutcome::AlreadyRunning { pid: self.pid() });
        }
        if self.handle.is_some() {
            tracing::debug!(target_id = %target.id, "reaping dead subprocess before respawn");
            self.stop().await;
        }

        let spawn_err = |source: io::Error| RpcError::Spawn {
            program: target.program.clone(),
            source,
        };

        let mut cmd = Command::new(&target.program);
        cmd.args(&target.args)
            .envs(&target.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &target.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(spawn_err)?;

        let stdin = child.stdin.take().ok_or_else(|| {
            spawn_err(io::Error::new(io::ErrorKind::BrokenPipe, "failed to capture child stdin"))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            spawn_err(io::Error::new(io::ErrorKind::BrokenPipe, "failed to capture child stdout"))
        })?;

        let pid = child.id();
        let mut handle = ProcessHandle {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            info: ProcessInfo {
                pid,
                spawned_at: Utc::now(),
            },
        };

        if let Err(e) = wait_ready(&mut handle.stdout, &self.readiness).await {
            if let Err(kill_err) = handle.child.kill().await {
                tracing::debug!(error = %kill_err, "failed to kill subprocess that never became ready");
            }
            return Err(spawn_err(e));
        }

        if let Ok(Some(status)) = handle.child.try_wait() {
            return Err(spawn_err(io::Error::other(format!(
                "process exited during startup ({status})"
            ))));
        }

        tracing::info!(
            target_id = %target.id,
            program = %target.program,
            pid = ?pid,
            "subprocess spawned"
        );

        self.handle = Some(handle);
        self.spawn_count += 1;
        Ok(StartOutcome::Spawned { pid })
    }

    /// Whether the current handle refers to a live process.
    pub fn is_running(&mut self) -> bool {
        let Some(handle) = self.handle.as_mut() else {
            return false;
        };
        match handle.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                tracing::debug!(pid = ?handle.info.pid, %status, "subprocess has exited");
                false
            }
            Err(e) => {
                tracing::debug!(pid = ?handle.info.pid, error = %e, "failed to poll subprocess status");
                false
            }
        }
    }

    /// Whether a handle is held, live or not.
    pub fn has_handle(&self) -> bool {
        self.handle.is_some()
    }

    /// Close stdin, drop stdout, then kill and reap the process.
    ///
    /// Every step runs even when an earlier one fails; the handle is
    /// cleared unconditionally. Calling this without a handle is a no-op.
    pub async fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let ProcessHandle {
            mut child,
            stdin,
            stdout,
            info,
        } = handle;

        if let Some(mut stdin) = stdin {
            if let Err(e) = stdin.shutdown().await {
                tracing::debug!(pid = ?info.pid, error = %e, "error closing subprocess stdin");
            }
        }

        drop(stdout);

        match child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(pid = ?info.pid, %status, "subprocess already exited");
            }
            _ => match child.kill().await {
                Ok(()) => tracing::info!(pid = ?info.pid, "subprocess killed"),
                Err(e) => tracing::warn!(pid = ?info.pid, error = %e, "failed to kill subprocess"),
            },
        }
    }

    /// Write one request line to the subprocess.
    pub async fn write_request(&mut self, request: &RequestEnvelope) -> Result<(), TransportError> {
        let handle = self.handle.as_mut().ok_or(TransportError::NotStarted)?;
        let stdin = handle.stdin.as_mut().ok_or(TransportError::ProcessExited)?;
        match framing::write_envelope(stdin, request).await {
            Err(TransportError::Io(e)) if e.kind() == io::ErrorKind::BrokenPipe => {
                Err(TransportError::ProcessExited)
            }
            other => other,
        }
    }

    /// Read one reply line from the subprocess.
    pub async fn read_line(&mut self) -> Result<String, TransportError> {
        let handle = self.handle.as_mut().ok_or(TransportError::NotStarted)?;
        framing::read_line(&mut handle.stdout).await
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().and_then(|h| h.info.pid)
    }

    pub fn info(&self) -> Option<ProcessInfo> {
        self.handle.as_ref().map(|h| h.info.clone())
    }

    /// Number of process handles held (0 or 1).
    pub fn live_handles(&self) -> usize {
        usize::from(self.handle.is_some())
    }

    /// How many processes this supervisor has launched over its lifetime.
    pub fn spawn_count(&self) -> u64 {
        self.spawn_count
    }
}

/// Apply the readiness policy to a freshly spawned process.
async fn wait_ready(stdout: &mut BufReader<ChildStdout>, readiness: &Readiness) -> io::Result<()> {
    match readiness {
        Readiness::Immediate => Ok(()),
        Readiness::Delay { delay_ms } => {
            tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
            Ok(())
        }
        Readiness::Marker { marker, timeout_ms } => {
            let scan = async {
                let mut line = String::new();
                loop {
                    line.clear();
                    if stdout.read_line(&mut line).await? == 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "stdout closed before the ready marker",
                        ));
                    }
                    let trimmed = line.trim();
                    if trimmed == marker {
                        return Ok(());
                    }
                    tracing::debug!(line = %trimmed, "skipping output before ready marker");
                }
            };
            tokio::time::timeout(Duration::from_millis(*timeout_ms), scan)
                .await
                .map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("no ready marker within {timeout_ms}ms"),
                    )
                })?
        }
    }
}
