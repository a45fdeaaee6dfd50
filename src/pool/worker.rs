use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::net::UnixStream;
use tracing::{debug, warn};

use crate::error::{IpcError, PoolError};
use crate::ipc::{ExecuteRequest, IpcClient};
use crate::pool::config::SandboxPoolConfiguration;
use crate::pool::stats::{WorkerHealth, WorkerStatistics};
use crate::sandbox::{ChildProcessManager, ProcessHandle};
use crate::types::VmExecutionResult;

/// One sandbox child and its channel.
///
/// A worker is owned by exactly one party at a time: the pool's idle set or
/// the request executing on it. Dropping it kills the child.
#[derive(Debug)]
pub struct SandboxWorker {
    id: u64,
    overflow: bool,
    handle: ProcessHandle,
    client: IpcClient<UnixStream>,
    consecutive_failures: u32,
    failure_times: VecDeque<Instant>,
    stats: WorkerStatistics,
}

impl SandboxWorker {
    pub fn spawn(
        id: u64,
        overflow: bool,
        manager: &ChildProcessManager,
        config: &SandboxPoolConfiguration,
    ) -> Result<Self, PoolError> {
        let executable = config.sandbox_executable();
        let (handle, channel) = manager
            .spawn(executable.as_os_str(), config.sandbox_args())
            .map_err(|e| PoolError::WorkerSpawnFailed(e.to_string()))?;
        debug!(worker = id, pid = handle.pid(), overflow, "worker spawned");
        Ok(Self {
            id,
            overflow,
            handle,
            client: IpcClient::new(channel, config.execution_timeout),
            consecutive_failures: 0,
            failure_times: VecDeque::new(),
            stats: WorkerStatistics::default(),
        })
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn is_overflow(&self) -> bool {
        self.overflow
    }

    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.handle.pid()
    }

    #[must_use]
    pub const fn statistics(&self) -> &WorkerStatistics {
        &self.stats
    }

    /// One execute exchange. Any error leaves the child in an unknown state.
    pub async fn execute(&mut self, request: &ExecuteRequest, config: &SandboxPoolConfiguration) -> Result<VmExecutionResult, IpcError> {
        let started = Instant::now();
        let result = self.client.execute(request).await;
        self.stats.total_executions += 1;
        self.stats.current_execution_count += 1;
        self.stats.total_execution_time += started.elapsed();
        match &result {
            Ok(_) => {
                self.stats.successful_executions += 1;
                self.stats.health = WorkerHealth::Healthy;
                self.consecutive_failures = 0;
            }
            Err(e) => self.record_failure(e, config),
        }
        result
    }

    /// Heartbeat exchange; `false` counts as a failure.
    pub async fn check_heartbeat(&mut self, config: &SandboxPoolConfiguration) -> bool {
        match self.client.heartbeat().await {
            Ok(_) => true,
            Err(e) => {
                warn!(worker = self.id, error = %e, "heartbeat failed");
                self.record_failure(&e, config);
                false
            }
        }
    }

    fn record_failure(&mut self, error: &IpcError, config: &SandboxPoolConfiguration) {
        self.stats.failed_executions += 1;
        self.consecutive_failures += 1;
        let now = Instant::now();
        self.failure_times.push_back(now);
        self.prune_failures(now, config.failure_tracking_window);
        self.stats.health = if self.trips_breaker(config) {
            WorkerHealth::Unhealthy(error.to_string())
        } else {
            WorkerHealth::Degraded(error.to_string())
        };
    }

    fn prune_failures(&mut self, now: Instant, window: Duration) {
        while self
            .failure_times
            .front()
            .is_some_and(|&t| now.duration_since(t) > window)
        {
            self.failure_times.pop_front();
        }
    }

    fn trips_breaker(&self, config: &SandboxPoolConfiguration) -> bool {
        let limit = config.max_consecutive_failures.max(1);
        self.consecutive_failures >= limit || self.failure_times.len() >= limit as usize
    }

    /// Whether the worker should be retired after its last exchange.
    #[must_use]
    pub fn should_recycle(&self, config: &SandboxPoolConfiguration) -> bool {
        self.trips_breaker(config)
            || (config.enable_worker_recycling && self.stats.current_execution_count >= config.worker_recycle_threshold)
    }

    /// SIGTERM the child, escalating to SIGKILL, and reap it.
    pub async fn terminate(mut self, manager: &ChildProcessManager) {
        debug!(worker = self.id, pid = self.handle.pid(), "terminating worker");
        manager.terminate(&mut self.handle).await;
    }
}
