//! Bounded pool of sandbox workers with overflow, queueing and health checks.

pub mod config;
#[allow(clippy::module_inception)]
pub mod pool;
pub mod stats;
pub mod worker;

pub use config::{ExhaustionPolicy, SandboxPoolConfiguration};
pub use pool::SandboxPool;
pub use stats::{PoolStatistics, WorkerHealth, WorkerStatistics};
pub use worker::SandboxWorker;
