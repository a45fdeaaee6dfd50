use std::path::PathBuf;
use std::time::Duration;

use crate::error::PoolError;
use crate::sandbox::resolve_sandbox_path;

/// What to do when every core worker is busy and no overflow worker can be spawned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExhaustionPolicy {
    /// Wait up to `worker_wait_timeout` in a queue of at most `max_queue_depth`.
    #[default]
    Queue,
    /// Reject immediately with [`PoolError::PoolExhausted`].
    FailFast,
    /// Spawn an overflow worker when allowed, otherwise reject.
    SpawnOverflow,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SandboxPoolConfiguration {
    /// Workers spawned at start-up and kept alive.
    pub pool_size: usize,
    pub max_queue_depth: usize,
    pub worker_wait_timeout: Duration,
    /// Upper bound of one IPC exchange; the worker is killed when it elapses.
    pub execution_timeout: Duration,
    pub enable_worker_recycling: bool,
    pub worker_recycle_threshold: u64,
    /// Zero disables periodic heartbeats.
    pub health_check_interval: Duration,
    pub max_consecutive_failures: u32,
    pub failure_tracking_window: Duration,
    pub allow_overflow_workers: bool,
    /// Overflow workers alive at once. Zero allows none.
    pub max_overflow_workers: usize,
    pub exhaustion_policy: ExhaustionPolicy,
    /// Sandbox executable; resolved from the environment when `None`.
    pub sandbox_path: Option<PathBuf>,
    /// Pass `--limit-resources` to every child.
    pub limit_resources: bool,
}

fn cpus() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

impl Default for SandboxPoolConfiguration {
    fn default() -> Self {
        Self {
            pool_size: cpus(),
            max_queue_depth: 1000,
            worker_wait_timeout: Duration::from_secs(30),
            execution_timeout: Duration::from_secs(120),
            enable_worker_recycling: true,
            worker_recycle_threshold: 10_000,
            health_check_interval: Duration::ZERO,
            max_consecutive_failures: 3,
            failure_tracking_window: Duration::from_secs(60),
            allow_overflow_workers: false,
            max_overflow_workers: 0,
            exhaustion_policy: ExhaustionPolicy::Queue,
            sandbox_path: None,
            limit_resources: false,
        }
    }
}

impl SandboxPoolConfiguration {
    /// Twice the cores, deep queue, overflow up to one worker per core, no health checks.
    #[must_use]
    pub fn throughput_optimized() -> Self {
        Self {
            pool_size: cpus() * 2,
            max_queue_depth: 10_000,
            worker_wait_timeout: Duration::from_secs(60),
            worker_recycle_threshold: 50_000,
            allow_overflow_workers: true,
            max_overflow_workers: cpus(),
            ..Self::default()
        }
    }

    /// Warm workers that are never recycled, frequent health checks, fail fast.
    #[must_use]
    pub fn latency_optimized() -> Self {
        Self {
            max_queue_depth: 100,
            worker_wait_timeout: Duration::from_secs(5),
            execution_timeout: Duration::from_secs(30),
            enable_worker_recycling: false,
            worker_recycle_threshold: 0,
            health_check_interval: Duration::from_secs(1),
            exhaustion_policy: ExhaustionPolicy::FailFast,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn memory_efficient() -> Self {
        Self {
            pool_size: (cpus() / 2).max(2),
            max_queue_depth: 500,
            worker_recycle_threshold: 1000,
            health_check_interval: Duration::from_secs(5),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn development() -> Self {
        Self {
            pool_size: 2,
            max_queue_depth: 100,
            worker_wait_timeout: Duration::from_secs(10),
            execution_timeout: Duration::from_secs(30),
            enable_worker_recycling: false,
            worker_recycle_threshold: 100,
            health_check_interval: Duration::from_secs(1),
            exhaustion_policy: ExhaustionPolicy::FailFast,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), PoolError> {
        let invalid = |reason: &str| Err(PoolError::InvalidConfiguration(reason.to_owned()));
        if self.pool_size == 0 {
            return invalid("pool_size must be > 0");
        }
        if self.worker_wait_timeout.is_zero() {
            return invalid("worker_wait_timeout must be > 0");
        }
        if self.execution_timeout.is_zero() {
            return invalid("execution_timeout must be > 0");
        }
        if self.enable_worker_recycling && self.worker_recycle_threshold == 0 {
            return invalid("worker_recycle_threshold must be > 0 when recycling is enabled");
        }
        Ok(())
    }

    /// Most workers that can be alive at once.
    #[must_use]
    pub const fn max_live_workers(&self) -> usize {
        if self.allow_overflow_workers {
            self.pool_size + self.max_overflow_workers
        } else {
            self.pool_size
        }
    }

    #[must_use]
    pub fn sandbox_executable(&self) -> PathBuf {
        self.sandbox_path.clone().unwrap_or_else(resolve_sandbox_path)
    }

    pub(crate) fn sandbox_args(&self) -> Vec<&'static str> {
        if self.limit_resources {
            vec!["--limit-resources"]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        for config in [
            SandboxPoolConfiguration::default(),
            SandboxPoolConfiguration::throughput_optimized(),
            SandboxPoolConfiguration::latency_optimized(),
            SandboxPoolConfiguration::memory_efficient(),
            SandboxPoolConfiguration::development(),
        ] {
            config.validate().unwrap();
        }
        assert_eq!(SandboxPoolConfiguration::development().pool_size, 2);
        assert!(SandboxPoolConfiguration::memory_efficient().pool_size >= 2);
        assert_eq!(
            SandboxPoolConfiguration::latency_optimized().exhaustion_policy,
            ExhaustionPolicy::FailFast
        );
    }

    #[test]
    fn validation_rejects_zero_sizes_and_timeouts() {
        let base = SandboxPoolConfiguration::development();
        for broken in [
            SandboxPoolConfiguration { pool_size: 0, ..base.clone() },
            SandboxPoolConfiguration {
                worker_wait_timeout: Duration::ZERO,
                ..base.clone()
            },
            SandboxPoolConfiguration {
                execution_timeout: Duration::ZERO,
                ..base.clone()
            },
            SandboxPoolConfiguration {
                enable_worker_recycling: true,
                worker_recycle_threshold: 0,
                ..base.clone()
            },
        ] {
            assert!(matches!(broken.validate(), Err(PoolError::InvalidConfiguration(_))));
        }
    }

    #[test]
    fn live_worker_bound_counts_overflow_only_when_allowed() {
        let mut config = SandboxPoolConfiguration {
            pool_size: 2,
            max_overflow_workers: 3,
            ..SandboxPoolConfiguration::default()
        };
        assert_eq!(config.max_live_workers(), 2);
        config.allow_overflow_workers = true;
        assert_eq!(config.max_live_workers(), 5);
    }
}
