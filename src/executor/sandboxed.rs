//! Execution in a pooled sandbox child.

use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::ExecutorError;
use crate::gas::Gas;
use crate::ipc::ExecuteRequest;
use crate::pool::{SandboxPool, SandboxPoolConfiguration};
use crate::program::StandardProgram;
use crate::types::{ExecutionMode, VmExecutionResult};

/// Ships requests to a [`SandboxPool`] created on first use.
pub struct SandboxedExecutor {
    config: SandboxPoolConfiguration,
    pool: OnceCell<SandboxPool>,
}

impl SandboxedExecutor {
    #[must_use]
    pub fn new(config: SandboxPoolConfiguration) -> Self {
        Self {
            config,
            pool: OnceCell::new(),
        }
    }

    /// The pool, if a sandboxed execution already started it.
    #[must_use]
    pub fn pool(&self) -> Option<&SandboxPool> {
        self.pool.get()
    }

    /// Run `blob` in a child process. The blob is decoded here first so a
    /// malformed program is reported as such and never costs a worker.
    ///
    /// Host calls cannot cross the channel; they end the run with
    /// `ExitReason::HostCall`.
    pub async fn execute(
        &self,
        blob: &[u8],
        pc: u32,
        gas: Gas,
        argument: Option<&[u8]>,
        mode: ExecutionMode,
    ) -> Result<VmExecutionResult, ExecutorError> {
        StandardProgram::new(blob, argument)?;
        let pool = self
            .pool
            .get_or_try_init(|| SandboxPool::new(self.config.clone()))
            .await?;
        let request = ExecuteRequest {
            blob: blob.to_vec(),
            pc,
            gas: gas.value(),
            argument_data: argument.map(<[u8]>::to_vec),
            execution_mode: mode.bits(),
        };
        debug!(pc, gas = gas.value(), ?mode, "dispatching to sandbox pool");
        Ok(pool.execute(&request).await?)
    }

    pub async fn shutdown(&self) {
        if let Some(pool) = self.pool.get() {
            pool.shutdown().await;
        }
    }
}
