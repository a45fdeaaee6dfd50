use std::time::Duration;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum WorkerHealth {
    #[default]
    Healthy,
    /// Last exchange failed.
    Degraded(String),
    /// Too many failures; the worker is retired.
    Unhealthy(String),
}

impl WorkerHealth {
    #[must_use]
    pub const fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkerStatistics {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub total_execution_time: Duration,
    /// Executions since the worker process was spawned.
    pub current_execution_count: u64,
    pub health: WorkerHealth,
}

impl WorkerStatistics {
    #[must_use]
    pub fn average_execution_time(&self) -> Duration {
        u32::try_from(self.total_executions)
            .ok()
            .filter(|&n| n > 0)
            .map_or(Duration::ZERO, |n| self.total_execution_time / n)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PoolStatistics {
    /// Live workers, overflow included.
    pub total_workers: usize,
    pub active_workers: usize,
    pub idle_workers: usize,
    pub overflow_workers: usize,
    pub queued_requests: usize,
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub uptime: Duration,
    pub is_healthy: bool,
    pub average_queue_wait_time: Duration,
    /// Failed executions per minute over the tracking window.
    pub worker_failure_rate: f64,
}

impl PoolStatistics {
    /// Percentage of successful executions; 100 before any execution.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            return 100.0;
        }
        self.successful_executions as f64 / self.total_executions as f64 * 100.0
    }

    /// Percentage of live workers currently executing.
    #[must_use]
    pub fn utilization_rate(&self) -> f64 {
        if self.total_workers == 0 {
            return 0.0;
        }
        self.active_workers as f64 / self.total_workers as f64 * 100.0
    }
}
