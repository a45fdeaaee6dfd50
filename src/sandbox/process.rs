//! Spawning sandbox children with a socket pair on their stdin.

use std::ffi::OsStr;
use std::os::fd::OwnedFd;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UnixStream;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::SandboxError;

/// Grace period between SIGTERM and SIGKILL.
pub const TERMINATE_GRACE: Duration = Duration::from_millis(500);

/// A running child. Dropping the handle kills the child.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    child: Child,
    active: Arc<AtomicUsize>,
}

impl ProcessHandle {
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Whether the child has not exited yet. Reaps it if it has.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Spawns children and tracks how many are alive.
#[derive(Clone, Debug, Default)]
pub struct ChildProcessManager {
    active: Arc<AtomicUsize>,
}

impl ChildProcessManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles that have not been dropped yet.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Spawn `program` with one end of a fresh socket pair as its stdin.
    ///
    /// Returns the handle and the parent's end of the channel. Stdout is
    /// discarded; stderr is inherited so child logs reach the host.
    pub fn spawn<I, A>(&self, program: &OsStr, args: I) -> Result<(ProcessHandle, UnixStream), SandboxError>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<OsStr>,
    {
        let (parent, child_end) = std::os::unix::net::UnixStream::pair().map_err(SandboxError::Channel)?;
        parent.set_nonblocking(true).map_err(SandboxError::Channel)?;

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::from(OwnedFd::from(child_end)))
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SandboxError::Spawn {
                path: program.to_string_lossy().into_owned(),
                source,
            })?;
        let pid = child.id().ok_or(SandboxError::MissingPid)?;
        let channel = UnixStream::from_std(parent).map_err(SandboxError::Channel)?;

        self.active.fetch_add(1, Ordering::Relaxed);
        debug!(pid, program = %program.to_string_lossy(), "spawned sandbox child");
        Ok((
            ProcessHandle {
                pid,
                child,
                active: self.active.clone(),
            },
            channel,
        ))
    }

    /// Wait for the child to exit. On timeout the child is killed and reaped.
    pub async fn wait_for_exit(&self, handle: &mut ProcessHandle, timeout: Duration) -> Result<ExitStatus, SandboxError> {
        match tokio::time::timeout(timeout, handle.child.wait()).await {
            Ok(status) => {
                let status = status.map_err(SandboxError::Wait)?;
                debug!(pid = handle.pid, %status, "sandbox child exited");
                Ok(status)
            }
            Err(_) => {
                warn!(pid = handle.pid, ?timeout, "sandbox child timed out, killing");
                if let Err(e) = handle.child.kill().await {
                    warn!(pid = handle.pid, error = %e, "failed to kill sandbox child");
                }
                Err(SandboxError::Timeout(timeout))
            }
        }
    }

    /// SIGTERM, then SIGKILL if the child outlives [`TERMINATE_GRACE`].
    pub async fn terminate(&self, handle: &mut ProcessHandle) {
        if !handle.is_running() {
            return;
        }
        if let Ok(pid) = libc::pid_t::try_from(handle.pid) {
            // SAFETY: plain signal delivery to a child we spawned and have not reaped.
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
        }
        if self.wait_for_exit(handle, TERMINATE_GRACE).await.is_err() {
            debug!(pid = handle.pid, "sandbox child ignored SIGTERM");
        }
    }
}
