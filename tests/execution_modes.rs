use std::path::PathBuf;
use std::time::Duration;

use pbnjam_pvm_core::assembler::ProgramBuilder;
use pbnjam_pvm_core::config::STACK_SEGMENT_END;
use pbnjam_pvm_core::pool::SandboxPoolConfiguration;
use pbnjam_pvm_core::{ExecutionMode, Executor, ExitReason, Gas, PanicReason};

const ALL_MODES: [ExecutionMode; 4] = [
    ExecutionMode::empty(),
    ExecutionMode::JIT,
    ExecutionMode::SANDBOXED,
    ExecutionMode::from_bits_truncate(ExecutionMode::JIT.bits() | ExecutionMode::SANDBOXED.bits()),
];

fn sandbox_config() -> SandboxPoolConfiguration {
    SandboxPoolConfiguration {
        pool_size: 1,
        sandbox_path: Some(PathBuf::from(env!("CARGO_BIN_EXE_pvm-sandbox"))),
        execution_timeout: Duration::from_secs(10),
        health_check_interval: Duration::ZERO,
        ..SandboxPoolConfiguration::development()
    }
}

/// Sum of 1..=n counted down in r1, stored on the stack and returned as output.
fn sum_program(n: i64) -> Vec<u8> {
    let slot = STACK_SEGMENT_END - 8;
    ProgramBuilder::new()
        .load_imm(1, n)
        .load_imm(2, 0)
        .fallthrough()
        .label("loop")
        .add_64(2, 2, 1)
        .add_imm_64(1, 1, -1)
        .branch_ne_imm(1, 0, "loop")
        .store_u64(2, slot)
        .load_imm_64(7, u64::from(slot))
        .load_imm(8, 8)
        .halt()
        .minimal_standard_blob()
}

#[tokio::test]
async fn single_halt_in_every_mode() {
    let executor = Executor::new(sandbox_config());
    let blob = ProgramBuilder::new().halt().minimal_standard_blob();
    for mode in ALL_MODES {
        let result = executor
            .execute(&blob, 0, Gas::new(100), None, mode, None)
            .await
            .unwrap();
        assert_eq!(result.exit_reason, ExitReason::Halt, "{mode:?}");
        assert_eq!(result.gas_used, 1, "{mode:?}");
        assert_eq!(result.output, None, "{mode:?}");
    }
    executor.shutdown().await;
}

#[tokio::test]
async fn division_by_zero_traps_identically() {
    let executor = Executor::new(sandbox_config());
    let blob = ProgramBuilder::new()
        .load_imm(2, 9)
        .div_u_64(3, 2, 4)
        .halt()
        .minimal_standard_blob();
    let mut results = Vec::new();
    for mode in ALL_MODES {
        let result = executor
            .execute(&blob, 0, Gas::new(100), None, mode, None)
            .await
            .unwrap();
        assert_eq!(result.exit_reason, ExitReason::Panic(PanicReason::Trap), "{mode:?}");
        results.push(result);
    }
    assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
    executor.shutdown().await;
}

#[tokio::test]
async fn summing_is_exact_and_reproducible() {
    const N: i64 = 100;
    let executor = Executor::new(sandbox_config());
    let blob = sum_program(N);
    // setup 3, 3 per iteration, then store, two loads and the halt
    let expected_gas = 3 + 3 * N as u64 + 4;
    for mode in ALL_MODES {
        for _ in 0..2 {
            let result = executor
                .execute(&blob, 0, Gas::new(10_000), None, mode, None)
                .await
                .unwrap();
            assert_eq!(result.exit_reason, ExitReason::Halt, "{mode:?}");
            assert_eq!(result.gas_used, expected_gas, "{mode:?}");
            assert_eq!(result.output, Some(5050u64.to_le_bytes().to_vec()), "{mode:?}");
        }
    }

    let starved = executor
        .execute(&blob, 0, Gas::new(50), None, ExecutionMode::JIT, None)
        .await
        .unwrap();
    assert_eq!(starved.exit_reason, ExitReason::OutOfGas);
    assert_eq!(starved.gas_used, 50);
    assert_eq!(starved.output, None);
    executor.shutdown().await;
}

#[tokio::test]
async fn arguments_reach_the_sandbox() {
    let executor = Executor::new(sandbox_config());
    // r7/r8 already point at the argument on entry
    let blob = ProgramBuilder::new().halt().minimal_standard_blob();
    for mode in ALL_MODES {
        let result = executor
            .execute(&blob, 0, Gas::new(10), Some(b"ping"), mode, None)
            .await
            .unwrap();
        assert_eq!(result.output.as_deref(), Some(&b"ping"[..]), "{mode:?}");
    }
    executor.shutdown().await;
}
