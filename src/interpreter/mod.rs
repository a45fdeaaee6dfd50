//! Reference interpreter: per-instruction gas, registry dispatch and host-call suspension.

mod engine;
mod state;

pub use engine::{run_with_host_calls, Engine, StepOutcome};
pub use state::{HostCallOutcome, HostCallState, InvocationContext, VmState};
