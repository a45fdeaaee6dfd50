use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::error::PoolError;
use crate::ipc::ExecuteRequest;
use crate::pool::config::{ExhaustionPolicy, SandboxPoolConfiguration};
use crate::pool::stats::{PoolStatistics, WorkerStatistics};
use crate::pool::worker::SandboxWorker;
use crate::sandbox::ChildProcessManager;
use crate::types::VmExecutionResult;

const QUEUE_WAIT_SAMPLES: usize = 1000;

/// A bounded set of sandbox workers.
///
/// Core workers are admitted through a semaphore with `pool_size` permits;
/// overflow workers through a second one with `max_overflow_workers` permits,
/// so live workers never exceed [`SandboxPoolConfiguration::max_live_workers`].
/// A worker whose exchange failed is never handed out again: it is terminated
/// and replaced.
#[derive(Clone)]
pub struct SandboxPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    config: SandboxPoolConfiguration,
    manager: ChildProcessManager,
    core_slots: Arc<Semaphore>,
    overflow_slots: Arc<Semaphore>,
    queued: AtomicUsize,
    shutdown: AtomicBool,
    started: Instant,
    state: Mutex<PoolState>,
    background: Mutex<JoinSet<()>>,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct PoolState {
    idle: VecDeque<SandboxWorker>,
    next_id: u64,
    live_core: usize,
    overflow: usize,
    active: usize,
    total_executions: u64,
    successful_executions: u64,
    failed_executions: u64,
    failure_times: VecDeque<Instant>,
    queue_waits: VecDeque<Duration>,
    spawn_failures: u32,
    unhealthy: Option<(String, Instant)>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A checked-out worker. Dropping a lease that still holds its worker kills
/// the child and frees its slot.
struct Lease {
    pool: Arc<PoolInner>,
    worker: Option<SandboxWorker>,
    permit: Option<OwnedSemaphorePermit>,
    request: bool,
}

impl Lease {
    fn worker_mut(&mut self) -> Result<&mut SandboxWorker, PoolError> {
        self.worker.as_mut().ok_or(PoolError::WorkerNotAvailable(0))
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mut state = lock(&self.pool.state);
        if self.request {
            state.active = state.active.saturating_sub(1);
        }
        if let Some(worker) = self.worker.take() {
            debug!(worker = worker.id(), "dropping abandoned worker");
            forget_worker(&mut state, worker.is_overflow());
        }
    }
}

fn forget_worker(state: &mut PoolState, overflow: bool) {
    if overflow {
        state.overflow = state.overflow.saturating_sub(1);
    } else {
        state.live_core = state.live_core.saturating_sub(1);
    }
}

/// Position in the wait queue, released on drop.
struct QueueTicket<'a>(&'a AtomicUsize);

impl<'a> QueueTicket<'a> {
    fn enter(queued: &'a AtomicUsize, max_depth: usize) -> Result<Self, PoolError> {
        if queued.fetch_add(1, Ordering::AcqRel) >= max_depth {
            queued.fetch_sub(1, Ordering::AcqRel);
            return Err(PoolError::QueueFull(max_depth));
        }
        Ok(Self(queued))
    }
}

impl Drop for QueueTicket<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl SandboxPool {
    /// Validate `config`, spawn `pool_size` workers and start health checks.
    pub async fn new(config: SandboxPoolConfiguration) -> Result<Self, PoolError> {
        config.validate()?;
        let overflow = if config.allow_overflow_workers {
            config.max_overflow_workers
        } else {
            0
        };
        let inner = Arc::new(PoolInner {
            manager: ChildProcessManager::new(),
            core_slots: Arc::new(Semaphore::new(config.pool_size)),
            overflow_slots: Arc::new(Semaphore::new(overflow)),
            queued: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            started: Instant::now(),
            state: Mutex::new(PoolState::default()),
            background: Mutex::new(JoinSet::new()),
            health_task: Mutex::new(None),
            config,
        });

        for _ in 0..inner.config.pool_size {
            let worker = inner.spawn_worker(false)?;
            lock(&inner.state).idle.push_back(worker);
        }
        info!(
            pool_size = inner.config.pool_size,
            overflow,
            policy = ?inner.config.exhaustion_policy,
            "sandbox pool ready"
        );

        if !inner.config.health_check_interval.is_zero() {
            let task = tokio::spawn(run_health_checks(Arc::downgrade(&inner), inner.config.health_check_interval));
            *lock(&inner.health_task) = Some(task);
        }
        Ok(Self { inner })
    }

    #[must_use]
    pub fn config(&self) -> &SandboxPoolConfiguration {
        &self.inner.config
    }

    /// Run `request` on a worker.
    pub async fn execute(&self, request: &ExecuteRequest) -> Result<VmExecutionResult, PoolError> {
        let inner = &self.inner;
        inner.check_available()?;
        let waiting = Instant::now();
        let mut lease = inner.acquire().await?;
        inner.record_wait(waiting.elapsed());

        let worker = lease.worker_mut()?;
        let worker_id = worker.id();
        let result = worker.execute(request, &inner.config).await;
        inner.release(lease, result.is_ok());
        result.map_err(|source| {
            warn!(worker = worker_id, error = %source, "sandboxed execution failed");
            PoolError::ExecutionFailed {
                worker: worker_id,
                source,
            }
        })
    }

    #[must_use]
    pub fn statistics(&self) -> PoolStatistics {
        self.inner.statistics()
    }

    /// Statistics of the workers currently idle.
    #[must_use]
    pub fn idle_worker_statistics(&self) -> Vec<(u64, WorkerStatistics)> {
        lock(&self.inner.state)
            .idle
            .iter()
            .map(|worker| (worker.id(), worker.statistics().clone()))
            .collect()
    }

    /// Heartbeat every idle worker once, replacing those that fail.
    pub async fn check_health(&self) {
        self.inner.check_health().await;
    }

    /// Stop admitting requests, then terminate idle workers and wait for
    /// pending replacements. Workers still executing are terminated when they
    /// finish.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        if inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("shutting down sandbox pool");
        inner.core_slots.close();
        inner.overflow_slots.close();
        if let Some(task) = lock(&inner.health_task).take() {
            task.abort();
        }
        inner.terminate_idle().await;
        let mut background = std::mem::take(&mut *lock(&inner.background));
        while background.join_next().await.is_some() {}
        // replacements that raced the first pass
        inner.terminate_idle().await;
        debug!("sandbox pool shut down");
    }
}

impl PoolInner {
    fn check_available(&self) -> Result<(), PoolError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::PoolShutdown);
        }
        let mut state = lock(&self.state);
        if let Some((reason, since)) = &state.unhealthy {
            if since.elapsed() < self.config.failure_tracking_window {
                return Err(PoolError::PoolUnhealthy(reason.clone()));
            }
            info!("failure window elapsed, admitting requests again");
            state.unhealthy = None;
            state.spawn_failures = 0;
        }
        Ok(())
    }

    async fn terminate_idle(&self) {
        let idle: Vec<_> = {
            let mut state = lock(&self.state);
            let idle: Vec<_> = state.idle.drain(..).collect();
            state.live_core = state.live_core.saturating_sub(idle.len());
            idle
        };
        for worker in idle {
            worker.terminate(&self.manager).await;
        }
    }

    fn spawn_worker(&self, overflow: bool) -> Result<SandboxWorker, PoolError> {
        let id = {
            let mut state = lock(&self.state);
            state.next_id += 1;
            state.next_id
        };
        let spawned = SandboxWorker::spawn(id, overflow, &self.manager, &self.config);
        let mut state = lock(&self.state);
        match spawned {
            Ok(worker) => {
                state.spawn_failures = 0;
                if overflow {
                    state.overflow += 1;
                } else {
                    state.live_core += 1;
                }
                Ok(worker)
            }
            Err(e) => {
                state.spawn_failures += 1;
                if state.spawn_failures >= self.config.max_consecutive_failures.max(1) {
                    let reason = format!("{} consecutive worker spawn failures", state.spawn_failures);
                    error!(%reason, "marking pool unhealthy");
                    state.unhealthy = Some((reason, Instant::now()));
                }
                Err(e)
            }
        }
    }

    async fn acquire(self: &Arc<Self>) -> Result<Lease, PoolError> {
        match self.core_slots.clone().try_acquire_owned() {
            Ok(permit) => return self.checkout(permit),
            Err(TryAcquireError::Closed) => return Err(PoolError::PoolShutdown),
            Err(TryAcquireError::NoPermits) => {}
        }
        if let Ok(permit) = self.overflow_slots.clone().try_acquire_owned() {
            debug!("all core workers busy, spawning an overflow worker");
            let worker = self.spawn_worker(true)?;
            return Ok(self.lease(worker, permit, true));
        }

        match self.config.exhaustion_policy {
            ExhaustionPolicy::FailFast | ExhaustionPolicy::SpawnOverflow => Err(PoolError::PoolExhausted),
            ExhaustionPolicy::Queue => {
                let _ticket = QueueTicket::enter(&self.queued, self.config.max_queue_depth)?;
                let wait = self.config.worker_wait_timeout;
                let permit = tokio::time::timeout(wait, self.core_slots.clone().acquire_owned())
                    .await
                    .map_err(|_| PoolError::RequestTimeout(wait))?
                    .map_err(|_| PoolError::PoolShutdown)?;
                self.checkout(permit)
            }
        }
    }

    /// An idle core worker, or a fresh one when the slot's worker was retired.
    fn checkout(self: &Arc<Self>, permit: OwnedSemaphorePermit) -> Result<Lease, PoolError> {
        let idle = lock(&self.state).idle.pop_front();
        let worker = match idle {
            Some(worker) => worker,
            None => self.spawn_worker(false)?,
        };
        Ok(self.lease(worker, permit, true))
    }

    fn lease(self: &Arc<Self>, worker: SandboxWorker, permit: OwnedSemaphorePermit, request: bool) -> Lease {
        if request {
            lock(&self.state).active += 1;
        }
        Lease {
            pool: self.clone(),
            worker: Some(worker),
            permit: Some(permit),
            request,
        }
    }

    fn record_wait(&self, waited: Duration) {
        let mut state = lock(&self.state);
        state.queue_waits.push_back(waited);
        if state.queue_waits.len() > QUEUE_WAIT_SAMPLES {
            state.queue_waits.pop_front();
        }
    }

    /// Return a worker after a request, or retire it.
    fn release(self: &Arc<Self>, mut lease: Lease, succeeded: bool) {
        let Some(worker) = lease.worker.take() else {
            return;
        };
        let mut state = lock(&self.state);
        if lease.request {
            state.total_executions += 1;
            if succeeded {
                state.successful_executions += 1;
            } else {
                state.failed_executions += 1;
                let now = Instant::now();
                state.failure_times.push_back(now);
                let window = self.config.failure_tracking_window;
                while state.failure_times.front().is_some_and(|&t| now.duration_since(t) > window) {
                    state.failure_times.pop_front();
                }
            }
        }

        let shutting_down = self.shutdown.load(Ordering::Acquire);
        if succeeded && !worker.is_overflow() && !shutting_down && !worker.should_recycle(&self.config) {
            state.idle.push_back(worker);
            return;
        }
        forget_worker(&mut state, worker.is_overflow());
        drop(state);

        let replace = !worker.is_overflow() && !shutting_down;
        debug!(worker = worker.id(), succeeded, replace, "retiring worker");
        let permit = lease.permit.take();
        let pool = self.clone();
        let mut background = lock(&self.background);
        // finished retire tasks stay in the set until joined
        while background.try_join_next().is_some() {}
        background.spawn(async move {
            worker.terminate(&pool.manager).await;
            if replace && !pool.shutdown.load(Ordering::Acquire) {
                match pool.spawn_worker(false) {
                    Ok(fresh) => lock(&pool.state).idle.push_back(fresh),
                    Err(e) => warn!(error = %e, "failed to replace worker; will spawn on demand"),
                }
            }
            drop(permit);
        });
    }

    async fn check_health(self: &Arc<Self>) {
        let candidates = lock(&self.state).idle.len();
        let (mut checked, mut failed) = (0usize, 0usize);
        for _ in 0..candidates {
            // busy workers hold the remaining permits and are skipped
            let Ok(permit) = self.core_slots.clone().try_acquire_owned() else {
                break;
            };
            let Some(worker) = lock(&self.state).idle.pop_front() else {
                break;
            };
            let mut lease = self.lease(worker, permit, false);
            let healthy = match lease.worker.as_mut() {
                Some(worker) => worker.check_heartbeat(&self.config).await,
                None => false,
            };
            checked += 1;
            if !healthy {
                failed += 1;
            }
            self.release(lease, healthy);
        }
        if checked == 0 {
            return;
        }
        let mut state = lock(&self.state);
        if failed * 2 > checked {
            let reason = format!("{failed} of {checked} workers failed health checks");
            error!(%reason, "marking pool unhealthy");
            state.unhealthy = Some((reason, Instant::now()));
        } else if failed == 0 && state.unhealthy.take().is_some() {
            info!("all workers healthy again");
        }
        debug!(checked, failed, "health check round");
    }

    fn statistics(&self) -> PoolStatistics {
        let state = lock(&self.state);
        let waits = state.queue_waits.len();
        let average_queue_wait_time = u32::try_from(waits)
            .ok()
            .filter(|&n| n > 0)
            .map_or(Duration::ZERO, |n| state.queue_waits.iter().sum::<Duration>() / n);
        let window = self.config.failure_tracking_window;
        let recent = state
            .failure_times
            .iter()
            .filter(|t| t.elapsed() <= window)
            .count();
        let minutes = window.as_secs_f64() / 60.0;
        PoolStatistics {
            total_workers: state.live_core + state.overflow,
            active_workers: state.active,
            idle_workers: state.idle.len(),
            overflow_workers: state.overflow,
            queued_requests: self.queued.load(Ordering::Acquire),
            total_executions: state.total_executions,
            successful_executions: state.successful_executions,
            failed_executions: state.failed_executions,
            uptime: self.started.elapsed(),
            is_healthy: state.unhealthy.is_none(),
            average_queue_wait_time,
            worker_failure_rate: if minutes > 0.0 { recent as f64 / minutes } else { 0.0 },
        }
    }
}

async fn run_health_checks(pool: Weak<PoolInner>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    // the first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(pool) = pool.upgrade() else { break };
        if pool.shutdown.load(Ordering::Acquire) {
            break;
        }
        pool.check_health().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config(path: &str, pool_size: usize) -> SandboxPoolConfiguration {
        SandboxPoolConfiguration {
            pool_size,
            sandbox_path: Some(PathBuf::from(path)),
            execution_timeout: Duration::from_millis(200),
            worker_wait_timeout: Duration::from_millis(300),
            ..SandboxPoolConfiguration::development()
        }
    }

    fn request() -> ExecuteRequest {
        ExecuteRequest {
            blob: vec![],
            pc: 0,
            gas: 1,
            argument_data: None,
            execution_mode: 0,
        }
    }

    #[tokio::test]
    async fn invalid_configuration_is_rejected() {
        let err = SandboxPool::new(config("sleep", 0)).await.err().unwrap();
        assert!(matches!(err, PoolError::InvalidConfiguration(_)));
    }

    async fn wait_for_idle(pool: &SandboxPool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while pool.statistics().idle_workers == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn unresponsive_workers_are_replaced() {
        // `cat` never writes to the channel, so every exchange times out
        let pool = SandboxPool::new(config("cat", 1)).await.unwrap();
        let err = pool.execute(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            PoolError::ExecutionFailed {
                source: crate::error::IpcError::Timeout(_),
                ..
            }
        ));
        let stats = pool.statistics();
        assert_eq!(stats.failed_executions, 1);
        assert_eq!(stats.total_workers, 0);

        // the replacement holds the slot's permit until it is idle
        wait_for_idle(&pool).await;
        let err = pool.execute(&request()).await.unwrap_err();
        assert!(matches!(err, PoolError::ExecutionFailed { worker: 2, .. }));
        pool.shutdown().await;
        assert_eq!(pool.inner.manager.active_count(), 0);
    }

    #[tokio::test]
    async fn finished_replacements_are_reaped() {
        let pool = SandboxPool::new(SandboxPoolConfiguration {
            health_check_interval: Duration::ZERO,
            ..config("cat", 1)
        })
        .await
        .unwrap();
        for _ in 0..4 {
            assert!(pool.execute(&request()).await.is_err());
            wait_for_idle(&pool).await;
        }
        // only the last replacement task may still be in the set
        assert!(lock(&pool.inner.background).len() <= 1);
        assert_eq!(pool.statistics().failed_executions, 4);
        pool.shutdown().await;
        assert_eq!(pool.inner.manager.active_count(), 0);
    }

    #[tokio::test]
    async fn cancelled_requests_never_return_their_worker() {
        let pool = SandboxPool::new(SandboxPoolConfiguration {
            health_check_interval: Duration::ZERO,
            execution_timeout: Duration::from_secs(2),
            ..config("cat", 1)
        })
        .await
        .unwrap();
        assert_eq!(pool.inner.manager.active_count(), 1);

        let cancelled = tokio::time::timeout(Duration::from_millis(50), pool.execute(&request())).await;
        assert!(cancelled.is_err());
        assert_eq!(pool.inner.manager.active_count(), 0);
        let stats = pool.statistics();
        assert_eq!((stats.total_workers, stats.active_workers, stats.idle_workers), (0, 0, 0));

        // the slot is free again and gets a fresh child
        let busy = pool.clone();
        let next = tokio::spawn(async move { busy.execute(&request()).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pool.inner.manager.active_count(), 1);
        next.abort();
        assert!(next.await.unwrap_err().is_cancelled());
        assert_eq!(pool.inner.manager.active_count(), 0);

        let fresh = tokio::time::timeout(Duration::from_millis(50), pool.execute(&request())).await;
        assert!(fresh.is_err());
        assert_eq!(lock(&pool.inner.state).next_id, 3);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn fail_fast_rejects_at_capacity() {
        let pool = SandboxPool::new(config("cat", 1)).await.unwrap();
        let busy = pool.clone();
        let running = tokio::spawn(async move { busy.execute(&request()).await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = Instant::now();
        assert!(matches!(pool.execute(&request()).await, Err(PoolError::PoolExhausted)));
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(pool.statistics().active_workers, 1);

        let _ = running.await;
        pool.shutdown().await;
        assert!(matches!(pool.execute(&request()).await, Err(PoolError::PoolShutdown)));
    }

    #[tokio::test]
    async fn queued_requests_time_out_and_respect_depth() {
        let pool = SandboxPool::new(SandboxPoolConfiguration {
            exhaustion_policy: ExhaustionPolicy::Queue,
            max_queue_depth: 1,
            execution_timeout: Duration::from_secs(2),
            ..config("cat", 1)
        })
        .await
        .unwrap();
        let busy = pool.clone();
        let running = tokio::spawn(async move { busy.execute(&request()).await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let queued = pool.clone();
        let waiting = tokio::spawn(async move { queued.execute(&request()).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pool.statistics().queued_requests, 1);
        assert!(matches!(pool.execute(&request()).await, Err(PoolError::QueueFull(1))));

        assert!(matches!(waiting.await.unwrap(), Err(PoolError::RequestTimeout(_))));
        assert_eq!(pool.statistics().queued_requests, 0);
        running.abort();
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn overflow_workers_are_bounded_and_temporary() {
        let pool = SandboxPool::new(SandboxPoolConfiguration {
            allow_overflow_workers: true,
            max_overflow_workers: 1,
            exhaustion_policy: ExhaustionPolicy::SpawnOverflow,
            ..config("cat", 1)
        })
        .await
        .unwrap();
        let first = pool.clone();
        let second = pool.clone();
        let a = tokio::spawn(async move { first.execute(&request()).await });
        let b = tokio::spawn(async move { second.execute(&request()).await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let stats = pool.statistics();
        assert_eq!(stats.overflow_workers, 1);
        assert!(stats.total_workers <= pool.config().max_live_workers());
        assert!(matches!(pool.execute(&request()).await, Err(PoolError::PoolExhausted)));

        let _ = (a.await, b.await);
        assert_eq!(pool.statistics().overflow_workers, 0);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn health_checks_replace_silent_workers() {
        let pool = SandboxPool::new(config("cat", 2)).await.unwrap();
        pool.check_health().await;
        let stats = pool.statistics();
        assert!(!stats.is_healthy);
        assert!(matches!(pool.execute(&request()).await, Err(PoolError::PoolUnhealthy(_))));
        pool.shutdown().await;
        assert_eq!(pool.inner.manager.active_count(), 0);
    }

    #[tokio::test]
    async fn spawn_failure_fails_construction() {
        let err = SandboxPool::new(config("/nonexistent/pvm-sandbox", 2)).await.err().unwrap();
        assert!(matches!(err, PoolError::WorkerSpawnFailed(_)));
    }
}
