//! The single entry point: picks a backend from an [`ExecutionMode`].

mod in_process;
mod sandboxed;

pub use in_process::InProcessExecutor;
pub use sandboxed::SandboxedExecutor;

use tracing::trace;

use crate::error::ExecutorError;
use crate::gas::Gas;
use crate::interpreter::InvocationContext;
use crate::jit::JitExecutor;
use crate::pool::{SandboxPool, SandboxPoolConfiguration};
use crate::program::StandardProgram;
use crate::types::{ExecutionMode, VmExecutionResult};

/// Interpreter, JIT and sandboxed execution behind one call.
///
/// | mode                 | backend                              |
/// |----------------------|--------------------------------------|
/// | empty                | interpreter, in process              |
/// | `JIT`                | JIT, in process                      |
/// | `SANDBOXED`          | interpreter in a pooled child        |
/// | `SANDBOXED \| JIT`   | JIT in a pooled child                |
///
/// Every branch returns the same [`VmExecutionResult`]; halts, panics and
/// running out of gas are results, not errors.
pub struct Executor {
    in_process: InProcessExecutor,
    sandboxed: SandboxedExecutor,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(SandboxPoolConfiguration::default())
    }
}

impl Executor {
    /// `pool_config` is used when the first sandboxed execution starts the pool.
    #[must_use]
    pub fn new(pool_config: SandboxPoolConfiguration) -> Self {
        Self::with_jit(JitExecutor::default(), pool_config)
    }

    #[must_use]
    pub fn with_jit(jit: JitExecutor, pool_config: SandboxPoolConfiguration) -> Self {
        Self {
            in_process: InProcessExecutor::new(jit),
            sandboxed: SandboxedExecutor::new(pool_config),
        }
    }

    #[must_use]
    pub const fn jit(&self) -> &JitExecutor {
        self.in_process.jit()
    }

    #[must_use]
    pub fn pool(&self) -> Option<&SandboxPool> {
        self.sandboxed.pool()
    }

    /// Decode `blob` as a standard program with `argument` and run it from `pc`.
    ///
    /// `context` receives host calls of in-process runs. Sandboxed runs stop at
    /// the first host call instead.
    pub async fn execute(
        &self,
        blob: &[u8],
        pc: u32,
        gas: Gas,
        argument: Option<&[u8]>,
        mode: ExecutionMode,
        context: Option<&mut dyn InvocationContext>,
    ) -> Result<VmExecutionResult, ExecutorError> {
        trace!(pc, gas = gas.value(), ?mode, blob_len = blob.len(), "execute");
        if mode.contains(ExecutionMode::SANDBOXED) {
            return self.sandboxed.execute(blob, pc, gas, argument, mode).await;
        }
        let program = StandardProgram::new(blob, argument)?;
        self.in_process.run(&program, pc, gas, mode, context).await
    }

    /// Terminate the sandbox pool, if one was started.
    pub async fn shutdown(&self) {
        self.sandboxed.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::ProgramBuilder;
    use crate::error::{HostCallError, PoolError, StandardProgramError};
    use crate::interpreter::{HostCallOutcome, HostCallState};
    use crate::types::ExitReason;

    fn unreachable_pool() -> SandboxPoolConfiguration {
        SandboxPoolConfiguration {
            sandbox_path: Some("/nonexistent/pvm-sandbox".into()),
            ..SandboxPoolConfiguration::development()
        }
    }

    #[tokio::test]
    async fn in_process_modes_halt() {
        let blob = ProgramBuilder::new().halt().minimal_standard_blob();
        let executor = Executor::new(unreachable_pool());
        for mode in [ExecutionMode::empty(), ExecutionMode::JIT] {
            let result = executor
                .execute(&blob, 0, Gas::new(10), None, mode, None)
                .await
                .unwrap();
            assert_eq!(result.exit_reason, ExitReason::Halt);
            assert_eq!(result.gas_used, 1);
            assert_eq!(result.output, None);
        }
        assert!(executor.pool().is_none());
    }

    #[tokio::test]
    async fn host_calls_reach_the_context() {
        let blob = ProgramBuilder::new()
            .ecalli(7)
            .add_imm_64(2, 2, 1)
            .halt()
            .minimal_standard_blob();
        let executor = Executor::new(unreachable_pool());
        for mode in [ExecutionMode::empty(), ExecutionMode::JIT] {
            let mut seen = Vec::new();
            let mut context = |index: u32, state: &mut dyn HostCallState| -> Result<HostCallOutcome, HostCallError> {
                seen.push(index);
                state.registers_mut()[2] = 41;
                Ok(HostCallOutcome::Continue)
            };
            let result = executor
                .execute(&blob, 0, Gas::new(10), None, mode, Some(&mut context))
                .await
                .unwrap();
            assert_eq!(result.exit_reason, ExitReason::Halt);
            assert_eq!(result.gas_used, 3);
            assert_eq!(seen, vec![7]);
        }

        let result = executor
            .execute(&blob, 0, Gas::new(10), None, ExecutionMode::empty(), None)
            .await
            .unwrap();
        assert_eq!(result.exit_reason, ExitReason::HostCall(7));
    }

    #[tokio::test]
    async fn malformed_blobs_never_reach_the_pool() {
        let executor = Executor::new(unreachable_pool());
        for mode in [ExecutionMode::empty(), ExecutionMode::SANDBOXED] {
            let err = executor
                .execute(&[0; 4], 0, Gas::new(10), None, mode, None)
                .await
                .unwrap_err();
            assert!(matches!(err, ExecutorError::Program(StandardProgramError::InvalidReadWriteLength)));
        }
        assert!(executor.pool().is_none());
    }

    #[tokio::test]
    async fn sandboxed_mode_reports_pool_failures() {
        let blob = ProgramBuilder::new().halt().minimal_standard_blob();
        let executor = Executor::new(unreachable_pool());
        let err = executor
            .execute(&blob, 0, Gas::new(10), None, ExecutionMode::SANDBOXED, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Pool(PoolError::WorkerSpawnFailed(_))));
        executor.shutdown().await;
    }
}
