//! Node binding for the executor facade.

use std::sync::OnceLock;

use napi::bindgen_prelude::{BigInt, Buffer};
use napi_derive::napi;

use crate::executor::Executor;
use crate::gas::Gas;
use crate::types::ExecutionMode;

static EXECUTOR: OnceLock<Executor> = OnceLock::new();

fn executor() -> &'static Executor {
    EXECUTOR.get_or_init(Executor::default)
}

/// Execution result as seen from JS; u64 fields are BigInt to keep precision.
#[napi(object)]
pub struct ExecutionOutput {
    /// Exit reason wire tag (`ExitReason::to_u64`).
    pub exit_reason: BigInt,
    pub gas_used: BigInt,
    pub output: Option<Buffer>,
}

/// `mode` bits: 1 = jit, 2 = sandboxed.
#[napi]
pub async fn execute(
    blob: Buffer,
    pc: u32,
    gas: BigInt,
    argument: Option<Buffer>,
    mode: u8,
) -> napi::Result<ExecutionOutput> {
    let blob = blob.to_vec();
    let argument = argument.map(|a| a.to_vec());
    let (_, gas, _) = gas.get_u64();
    let result = executor()
        .execute(
            &blob,
            pc,
            Gas::new(gas),
            argument.as_deref(),
            ExecutionMode::from_bits_truncate(mode),
            None,
        )
        .await
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    Ok(ExecutionOutput {
        exit_reason: BigInt::from(result.exit_reason.to_u64()),
        gas_used: BigInt::from(result.gas_used),
        output: result.output.map(Buffer::from),
    })
}
