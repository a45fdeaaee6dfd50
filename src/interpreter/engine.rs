//! Fetch, decode and execute loop over a decoded program.

use std::sync::Arc;

use tracing::debug;

use crate::config::INSTRUCTION_GAS_COST;
use crate::instructions::InstructionRegistry;
use crate::interpreter::state::{HostCallOutcome, InvocationContext, VmState};
use crate::memory::Memory;
use crate::parser::ProgramCode;
use crate::types::{ExitReason, InstructionContext, InstructionResult, PanicReason};
use crate::{host_log, host_log_error, step_log};

/// Result of executing a single instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    /// `ecalli` executed; the pc already points past it.
    HostCall(u32),
    Exit(ExitReason),
}

/// Interpreter for one program. Cheap to clone; the program is shared.
#[derive(Clone)]
pub struct Engine {
    program: Arc<ProgramCode>,
    registry: &'static InstructionRegistry,
}

impl Engine {
    #[must_use]
    pub fn new(program: Arc<ProgramCode>) -> Self {
        Self::with_registry(program, InstructionRegistry::global())
    }

    #[must_use]
    pub const fn with_registry(program: Arc<ProgramCode>, registry: &'static InstructionRegistry) -> Self {
        Self { program, registry }
    }

    #[must_use]
    pub fn program(&self) -> &ProgramCode {
        &self.program
    }

    /// Execute the instruction at `state.pc`.
    ///
    /// Gas is checked before anything else happens, so an out-of-gas step leaves
    /// registers, memory and pc untouched.
    pub fn step<M: Memory>(&self, state: &mut VmState<M>) -> StepOutcome {
        let pc = state.pc;
        let Some(opcode) = self
            .program
            .opcode_at(pc)
            .filter(|_| self.program.is_instruction_boundary(pc))
        else {
            debug!(pc, "pc is not an instruction boundary");
            return StepOutcome::Exit(ExitReason::Panic(PanicReason::InvalidInstructionIndex));
        };
        if !state.gas.charge(INSTRUCTION_GAS_COST) {
            return StepOutcome::Exit(ExitReason::OutOfGas);
        }

        let skip = self.program.skip(pc);
        let operands = self.program.operands(pc, skip);
        step_log!(
            pc,
            gas = state.gas.value(),
            instruction = %self.registry.disassemble(opcode, operands),
            "step"
        );

        let mut context = InstructionContext {
            program: &self.program,
            registers: &mut state.registers,
            memory: &mut state.memory,
            program_counter: pc,
            operands,
            skip,
        };
        let next = pc + skip + 1;
        match self.registry.execute(opcode, &mut context) {
            InstructionResult::Continue => {
                state.pc = next;
                StepOutcome::Continue
            }
            InstructionResult::Jump(target) => {
                state.pc = target;
                StepOutcome::Continue
            }
            InstructionResult::HostCall(index) => {
                state.pc = next;
                StepOutcome::HostCall(index)
            }
            InstructionResult::Fault(address) => {
                debug!(pc, address = format_args!("{address:#x}"), "memory fault");
                StepOutcome::Exit(ExitReason::Panic(PanicReason::Trap))
            }
            InstructionResult::Exit(reason) => StepOutcome::Exit(reason),
        }
    }

    /// Run until the program exits.
    ///
    /// Host calls go to `context`; without one the run stops with
    /// [`ExitReason::HostCall`] so the caller can dispatch and resume.
    pub async fn execute<M: Memory>(
        &self,
        state: &mut VmState<M>,
        context: Option<&mut dyn InvocationContext>,
    ) -> ExitReason {
        run_with_host_calls(state, context, |state| loop {
            match self.step(state) {
                StepOutcome::Continue => {}
                other => break other,
            }
        })
        .await
    }
}

/// Drive `run` (which returns at every host call or exit) and dispatch host calls
/// to `context` in between.
pub async fn run_with_host_calls<M, F>(
    state: &mut VmState<M>,
    mut context: Option<&mut dyn InvocationContext>,
    mut run: F,
) -> ExitReason
where
    M: Memory,
    F: FnMut(&mut VmState<M>) -> StepOutcome + Send,
{
    loop {
        match run(state) {
            StepOutcome::Continue => {}
            StepOutcome::Exit(reason) => {
                debug!(%reason, pc = state.pc, gas = state.gas.value(), "execution finished");
                return reason;
            }
            StepOutcome::HostCall(index) => {
                let Some(dispatcher) = context.as_deref_mut() else {
                    return ExitReason::HostCall(index);
                };
                host_log!(index, pc = state.pc, "host call");
                match dispatcher.dispatch(index, state).await {
                    Ok(HostCallOutcome::Continue) => {}
                    Ok(HostCallOutcome::Exit(reason)) => return reason,
                    Err(e) => {
                        host_log_error!(error = %e, "host call failed");
                        return ExitReason::Panic(PanicReason::Trap);
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("code_len", &self.program.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::ProgramBuilder;
    use crate::config::HALT_ADDRESS;
    use crate::error::HostCallError;
    use crate::gas::Gas;
    use crate::interpreter::state::HostCallState;
    use crate::memory::GeneralMemory;
    use crate::types::RegisterState;

    fn engine(builder: &ProgramBuilder) -> Engine {
        Engine::new(Arc::new(ProgramCode::new(&builder.code_blob()).unwrap()))
    }

    fn state(gas: u64) -> VmState<GeneralMemory> {
        let memory = GeneralMemory::new(&[(0x2_0000, 4096, true)], Vec::new()).unwrap();
        let mut registers = RegisterState::default();
        registers[0] = u64::from(HALT_ADDRESS);
        VmState::new(registers, memory, Gas::new(gas), 0)
    }

    fn sum_program(n: i64) -> ProgramBuilder {
        ProgramBuilder::new()
            .load_imm(1, n)
            .load_imm(2, 0)
            .fallthrough()
            .label("loop")
            .add_64(2, 2, 1)
            .add_imm_64(1, 1, -1)
            .branch_ne_imm(1, 0, "loop")
            .move_reg(7, 2)
            .halt()
    }

    #[tokio::test]
    async fn halts_through_r0() {
        let engine = engine(&ProgramBuilder::new().halt());
        let mut s = state(10);
        assert_eq!(engine.execute(&mut s, None).await, ExitReason::Halt);
        assert_eq!(s.gas.value(), 9);
    }

    #[tokio::test]
    async fn sums_with_exact_gas() {
        let engine = engine(&sum_program(10));
        let mut s = state(1_000);
        assert_eq!(engine.execute(&mut s, None).await, ExitReason::Halt);
        assert_eq!(s.registers[7], 55);
        // 3 setup + 3 per iteration + move + halt
        assert_eq!(1_000 - s.gas.value(), 3 + 3 * 10 + 2);
    }

    #[tokio::test]
    async fn out_of_gas_has_no_partial_effect() {
        let engine = engine(&ProgramBuilder::new().load_imm(1, 5).load_imm(2, 6).halt());
        let mut s = state(1);
        assert_eq!(engine.execute(&mut s, None).await, ExitReason::OutOfGas);
        assert_eq!(s.registers[1], 5);
        assert_eq!(s.registers[2], 0);
        assert_eq!(s.pc, 3);
        assert!(s.gas.is_exhausted());
    }

    #[test]
    fn invalid_pc_panics() {
        let engine = engine(&ProgramBuilder::new().load_imm(1, 5).trap());
        let mut s = state(10);
        s.pc = 1;
        assert_eq!(
            engine.step(&mut s),
            StepOutcome::Exit(ExitReason::Panic(PanicReason::InvalidInstructionIndex))
        );
        assert_eq!(s.gas.value(), 10);
        s.pc = 100;
        assert_eq!(
            engine.step(&mut s),
            StepOutcome::Exit(ExitReason::Panic(PanicReason::InvalidInstructionIndex))
        );
    }

    #[tokio::test]
    async fn faults_become_traps() {
        let engine = engine(&ProgramBuilder::new().store_u64(1, 0x5_0000).halt());
        let mut s = state(10);
        assert_eq!(engine.execute(&mut s, None).await, ExitReason::Panic(PanicReason::Trap));
    }

    #[tokio::test]
    async fn host_call_without_context_suspends() {
        let engine = engine(&ProgramBuilder::new().ecalli(4).load_imm(7, 1).halt());
        let mut s = state(10);
        assert_eq!(engine.execute(&mut s, None).await, ExitReason::HostCall(4));
        assert_eq!(s.pc, 2);
        // resume
        assert_eq!(engine.execute(&mut s, None).await, ExitReason::Halt);
        assert_eq!(s.registers[7], 1);
    }

    #[tokio::test]
    async fn host_calls_dispatch_through_context() {
        let builder = ProgramBuilder::new()
            .ecalli(1)
            .add_imm_64(7, 7, 1)
            .ecalli(2)
            .halt();
        let engine = engine(&builder);

        let mut ctx = |index: u32, state: &mut dyn HostCallState| -> Result<HostCallOutcome, HostCallError> {
            match index {
                1 => {
                    state.registers_mut()[7] = 41;
                    Ok(HostCallOutcome::Continue)
                }
                _ => Ok(HostCallOutcome::Exit(ExitReason::Halt)),
            }
        };
        let mut s = state(10);
        assert_eq!(engine.execute(&mut s, Some(&mut ctx)).await, ExitReason::Halt);
        assert_eq!(s.registers[7], 42);

        let mut failing = |index: u32, _: &mut dyn HostCallState| -> Result<HostCallOutcome, HostCallError> {
            Err(HostCallError {
                index,
                message: "unsupported".into(),
            })
        };
        let mut s = state(10);
        assert_eq!(
            engine.execute(&mut s, Some(&mut failing)).await,
            ExitReason::Panic(PanicReason::Trap)
        );
    }

    #[tokio::test]
    async fn falling_off_the_end_panics() {
        let engine = engine(&ProgramBuilder::new().load_imm(1, 5));
        let mut s = state(10);
        assert_eq!(
            engine.execute(&mut s, None).await,
            ExitReason::Panic(PanicReason::InvalidInstructionIndex)
        );
    }

    #[test]
    fn unknown_opcode_traps() {
        let engine = engine(&ProgramBuilder::new().no_args(2));
        let mut s = state(10);
        assert_eq!(engine.step(&mut s), StepOutcome::Exit(ExitReason::Panic(PanicReason::Trap)));
    }
}
