//! Process isolation: child spawning and sandbox executable lookup.

pub mod process;
pub mod resolver;

pub use process::{ChildProcessManager, ProcessHandle, TERMINATE_GRACE};
pub use resolver::{resolve_sandbox_path, resolve_with, SANDBOX_BINARY_NAME, SANDBOX_PATH_ENV};
