//! PVM execution core: program decoding, paged memory, the reference interpreter,
//! a rebased JIT backend and sandboxed execution through a pool of child processes.
//!
//! [`executor::Executor`] is the entry point; it picks a backend from an
//! [`ExecutionMode`] and always returns a [`VmExecutionResult`].

/// Per-instruction tracing. No-op unless built with `--features instruction_tracing`.
#[macro_export]
macro_rules! step_log {
    ($($t:tt)*) => {
        #[cfg(feature = "instruction_tracing")]
        ::tracing::trace!($($t)*);
    };
}

/// Host-call dispatch logging. No-op unless built with `--features host_calls_logging`.
#[macro_export]
macro_rules! host_log {
    ($($t:tt)*) => {
        #[cfg(feature = "host_calls_logging")]
        ::tracing::debug!($($t)*);
    };
}

/// Failing host calls only. Enabled by `host_calls_errors_only` or `host_calls_logging`.
#[macro_export]
macro_rules! host_log_error {
    ($($t:tt)*) => {
        #[cfg(any(feature = "host_calls_logging", feature = "host_calls_errors_only"))]
        ::tracing::warn!($($t)*);
    };
}

pub mod assembler;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod executor;
pub mod gas;
pub mod instructions;
pub mod interpreter;
pub mod ipc;
pub mod jit;
pub mod memory;
pub mod parser;
pub mod pool;
pub mod program;
pub mod sandbox;
pub mod types;

#[cfg(feature = "napi")]
mod node;

pub use error::{
    ExecutorError, HostCallError, IpcError, JitError, MemoryError, PoolError, ProgramError, SandboxError,
    StandardProgramError,
};
pub use executor::Executor;
pub use gas::Gas;
pub use interpreter::{Engine, HostCallOutcome, HostCallState, InvocationContext, VmState};
pub use parser::ProgramCode;
pub use program::StandardProgram;
pub use types::{ExecutionMode, ExitReason, PanicReason, RegisterState, VmExecutionResult};
