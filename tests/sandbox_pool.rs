use std::path::PathBuf;
use std::time::{Duration, Instant};

use pbnjam_pvm_core::assembler::ProgramBuilder;
use pbnjam_pvm_core::ipc::{ExecuteRequest, IpcClient};
use pbnjam_pvm_core::pool::{SandboxPool, SandboxPoolConfiguration};
use pbnjam_pvm_core::{ExecutionMode, ExitReason, IpcError};
use tokio::net::UnixStream;

fn config(pool_size: usize) -> SandboxPoolConfiguration {
    SandboxPoolConfiguration {
        pool_size,
        sandbox_path: Some(PathBuf::from(env!("CARGO_BIN_EXE_pvm-sandbox"))),
        execution_timeout: Duration::from_secs(10),
        health_check_interval: Duration::ZERO,
        ..SandboxPoolConfiguration::development()
    }
}

fn halt_request(mode: ExecutionMode) -> ExecuteRequest {
    ExecuteRequest {
        blob: ProgramBuilder::new().halt().minimal_standard_blob(),
        pc: 0,
        gas: 100,
        argument_data: None,
        execution_mode: mode.bits(),
    }
}

#[tokio::test]
async fn single_worker_serves_sequential_requests() {
    let pool = SandboxPool::new(config(1)).await.unwrap();
    for i in 0..10 {
        let mode = if i % 2 == 0 { ExecutionMode::SANDBOXED } else { ExecutionMode::SANDBOXED | ExecutionMode::JIT };
        let result = pool.execute(&halt_request(mode)).await.unwrap();
        assert_eq!(result.exit_reason, ExitReason::Halt);
        assert_eq!(result.gas_used, 1);
    }

    let stats = pool.statistics();
    assert_eq!(stats.total_executions, 10);
    assert_eq!(stats.successful_executions, 10);
    assert_eq!(stats.total_workers, 1);
    assert_eq!(stats.idle_workers, 1);
    assert_eq!(stats.active_workers, 0);
    assert!(stats.is_healthy);
    let workers = pool.idle_worker_statistics();
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0].1.successful_executions, 10);

    pool.shutdown().await;
    assert_eq!(pool.statistics().total_workers, 0);
}

#[tokio::test]
async fn health_checks_keep_live_workers() {
    let pool = SandboxPool::new(config(2)).await.unwrap();
    pool.check_health().await;
    let stats = pool.statistics();
    assert!(stats.is_healthy);
    assert_eq!(stats.idle_workers, 2);
    assert_eq!(stats.total_executions, 0);
    pool.shutdown().await;
}

#[tokio::test]
async fn concurrent_requests_share_the_pool() {
    let pool = SandboxPool::new(SandboxPoolConfiguration {
        exhaustion_policy: pbnjam_pvm_core::pool::ExhaustionPolicy::Queue,
        ..config(2)
    })
    .await
    .unwrap();
    let tasks: Vec<_> = (0..6)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move { pool.execute(&halt_request(ExecutionMode::SANDBOXED)).await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap().exit_reason, ExitReason::Halt);
    }
    let stats = pool.statistics();
    assert_eq!(stats.successful_executions, 6);
    assert!(stats.total_workers <= 2);
    pool.shutdown().await;
}

#[tokio::test]
async fn silent_peer_times_out_promptly() {
    let (local, _peer) = UnixStream::pair().unwrap();
    let mut client = IpcClient::new(local, Duration::from_millis(200));
    let started = Instant::now();
    let err = client.execute(&halt_request(ExecutionMode::empty())).await.unwrap_err();
    let elapsed = started.elapsed();
    assert!(matches!(err, IpcError::Timeout(_)), "{err}");
    assert!(elapsed >= Duration::from_millis(190), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(600), "{elapsed:?}");
}
