//! Interpreter and JIT execution inside the current process.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::ExecutorError;
use crate::gas::Gas;
use crate::interpreter::{Engine, InvocationContext, VmState};
use crate::ipc::{ExecuteRequest, ExecuteResponse, RequestHandler};
use crate::jit::JitExecutor;
use crate::program::StandardProgram;
use crate::types::{ExecutionMode, VmExecutionResult};

/// Runs decoded programs with the interpreter or the JIT, picked per call.
#[derive(Default)]
pub struct InProcessExecutor {
    jit: JitExecutor,
}

impl InProcessExecutor {
    #[must_use]
    pub fn new(jit: JitExecutor) -> Self {
        Self { jit }
    }

    #[must_use]
    pub const fn jit(&self) -> &JitExecutor {
        &self.jit
    }

    /// Run `program` from `pc` with `gas`. `mode` only selects the backend;
    /// the sandboxed bit is ignored here.
    pub async fn run(
        &self,
        program: &StandardProgram,
        pc: u32,
        gas: Gas,
        mode: ExecutionMode,
        context: Option<&mut dyn InvocationContext>,
    ) -> Result<VmExecutionResult, ExecutorError> {
        if mode.contains(ExecutionMode::JIT) {
            return Ok(self.jit.execute(program, pc, gas, context).await?);
        }
        let engine = Engine::new(Arc::new(program.code().clone()));
        let mut state = VmState::for_program(program, pc, gas)?;
        let exit_reason = engine.execute(&mut state, context).await;
        Ok(VmExecutionResult {
            exit_reason,
            gas_used: gas.value().saturating_sub(state.gas.value()),
            output: if exit_reason.is_halt() { state.output() } else { None },
        })
    }
}

/// Child side of the sandbox: every request runs in-process without host calls.
#[async_trait]
impl RequestHandler for InProcessExecutor {
    async fn handle(&self, request: ExecuteRequest) -> Result<ExecuteResponse, String> {
        let mode = ExecutionMode::from_bits_truncate(request.execution_mode).without(ExecutionMode::SANDBOXED);
        debug!(
            pc = request.pc,
            gas = request.gas,
            blob_len = request.blob.len(),
            ?mode,
            "sandbox execute"
        );
        let program =
            StandardProgram::new(&request.blob, request.argument_data.as_deref()).map_err(|e| e.to_string())?;
        let result = self
            .run(&program, request.pc, Gas::new(request.gas), mode, None)
            .await
            .map_err(|e| e.to_string())?;
        Ok(ExecuteResponse::from_result(&result))
    }
}
