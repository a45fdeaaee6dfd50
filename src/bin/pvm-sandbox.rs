//! Sandbox child: serves execute requests over the socket inherited on stdin.
//!
//! Spawned by the sandbox pool; not meant to be run by hand. Logs go to
//! stderr, stdout is unused.

use std::io;
use std::os::fd::AsFd;
use std::process::ExitCode;

use clap::Parser;
use tokio::net::UnixStream;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use pbnjam_pvm_core::executor::InProcessExecutor;
use pbnjam_pvm_core::ipc::IpcServer;

const ADDRESS_SPACE_LIMIT: u64 = 4 << 30;
const CPU_SECONDS_LIMIT: u64 = 300;
const OPEN_FILES_LIMIT: u64 = 64;

#[derive(Parser, Debug)]
#[command(name = "pvm-sandbox", about = "PVM sandbox worker")]
struct Cli {
    /// Cap address space, CPU time and open files; disable core dumps and file writes.
    #[arg(long)]
    limit_resources: bool,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
type Resource = libc::__rlimit_resource_t;
#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
type Resource = libc::c_int;

fn set_limit(resource: Resource, value: u64) -> io::Result<()> {
    let limit = libc::rlimit {
        rlim_cur: value as libc::rlim_t,
        rlim_max: value as libc::rlim_t,
    };
    // SAFETY: `limit` is a valid rlimit for the duration of the call.
    if unsafe { libc::setrlimit(resource, &limit) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn limit_resources() -> io::Result<()> {
    set_limit(libc::RLIMIT_AS, ADDRESS_SPACE_LIMIT)?;
    set_limit(libc::RLIMIT_CPU, CPU_SECONDS_LIMIT)?;
    set_limit(libc::RLIMIT_NOFILE, OPEN_FILES_LIMIT)?;
    set_limit(libc::RLIMIT_CORE, 0)?;
    set_limit(libc::RLIMIT_FSIZE, 0)?;
    debug!("resource limits applied");
    Ok(())
}

fn channel() -> io::Result<UnixStream> {
    let fd = io::stdin().as_fd().try_clone_to_owned()?;
    let stream = std::os::unix::net::UnixStream::from(fd);
    stream.set_nonblocking(true)?;
    UnixStream::from_std(stream)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    if cli.limit_resources {
        if let Err(e) = limit_resources() {
            error!(error = %e, "failed to apply resource limits");
            return ExitCode::FAILURE;
        }
    }

    let stream = match channel() {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "stdin is not a usable socket");
            return ExitCode::FAILURE;
        }
    };
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            return ExitCode::FAILURE;
        }
    };

    info!(pid = std::process::id(), "sandbox ready");
    let server = IpcServer::new(stream, InProcessExecutor::default());
    tokio::select! {
        served = server.serve() => match served {
            Ok(summary) => {
                info!(?summary, "channel closed, exiting");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "ipc failure");
                ExitCode::FAILURE
            }
        },
        _ = terminate.recv() => {
            warn!("SIGTERM received, exiting");
            ExitCode::SUCCESS
        }
    }
}
