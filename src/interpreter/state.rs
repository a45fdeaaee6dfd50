//! Machine state owned by one execution and the host-call seam.

use async_trait::async_trait;

use crate::error::{HostCallError, StandardProgramError};
use crate::gas::Gas;
use crate::memory::{Memory, StandardMemory};
use crate::program::StandardProgram;
use crate::types::{ExitReason, RegisterState};

/// Registers, memory, gas and program counter of one execution.
#[derive(Clone, Debug)]
pub struct VmState<M: Memory = StandardMemory> {
    pub registers: RegisterState,
    pub memory: M,
    pub gas: Gas,
    pub pc: u32,
}

impl<M: Memory> VmState<M> {
    #[must_use]
    pub const fn new(registers: RegisterState, memory: M, gas: Gas, pc: u32) -> Self {
        Self {
            registers,
            memory,
            gas,
            pc,
        }
    }

    /// `mem[r7 .. r7 + r8]`; `None` when empty, out of range or unreadable.
    #[must_use]
    pub fn output(&self) -> Option<Vec<u8>> {
        let address = u32::try_from(self.registers[7]).ok()?;
        let length = self.registers[8];
        if length == 0 || u64::from(address) + length > 1 << 32 {
            return None;
        }
        let length = usize::try_from(length).ok()?;
        if !self.memory.is_readable(address, length) {
            return None;
        }
        self.memory.read(address, length).ok()
    }
}

impl VmState<StandardMemory> {
    /// Fresh state for `program`: initial registers, laid-out memory, `gas` and `pc`.
    pub fn for_program(program: &StandardProgram, pc: u32, gas: Gas) -> Result<Self, StandardProgramError> {
        Ok(Self::new(program.initial_registers(), program.initial_memory()?, gas, pc))
    }
}

/// The view of a suspended execution handed to a host-call dispatcher.
pub trait HostCallState: Send {
    fn registers(&self) -> &RegisterState;
    fn registers_mut(&mut self) -> &mut RegisterState;
    fn memory(&self) -> &dyn Memory;
    fn memory_mut(&mut self) -> &mut dyn Memory;
    fn gas(&self) -> Gas;
    fn gas_mut(&mut self) -> &mut Gas;
    /// Pc of the instruction after the `ecalli`.
    fn pc(&self) -> u32;
}

impl<M: Memory> HostCallState for VmState<M> {
    fn registers(&self) -> &RegisterState {
        &self.registers
    }

    fn registers_mut(&mut self) -> &mut RegisterState {
        &mut self.registers
    }

    fn memory(&self) -> &dyn Memory {
        &self.memory
    }

    fn memory_mut(&mut self) -> &mut dyn Memory {
        &mut self.memory
    }

    fn gas(&self) -> Gas {
        self.gas
    }

    fn gas_mut(&mut self) -> &mut Gas {
        &mut self.gas
    }

    fn pc(&self) -> u32 {
        self.pc
    }
}

/// What the dispatcher wants the machine to do after a host call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostCallOutcome {
    Continue,
    Exit(ExitReason),
}

/// Host-call dispatcher supplied by the embedding runtime.
///
/// A returned error terminates the execution with `panic(trap)`.
#[async_trait]
pub trait InvocationContext: Send {
    async fn dispatch(
        &mut self,
        index: u32,
        state: &mut dyn HostCallState,
    ) -> Result<HostCallOutcome, HostCallError>;
}

/// Synchronous dispatchers: any `FnMut(index, state)` closure.
#[async_trait]
impl<F> InvocationContext for F
where
    F: FnMut(u32, &mut dyn HostCallState) -> Result<HostCallOutcome, HostCallError> + Send,
{
    async fn dispatch(
        &mut self,
        index: u32,
        state: &mut dyn HostCallState,
    ) -> Result<HostCallOutcome, HostCallError> {
        self(index, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::GeneralMemory;

    fn state() -> VmState<GeneralMemory> {
        let memory = GeneralMemory::new(&[(0x2_0000, 4096, true)], vec![(0x2_0000, b"hello".to_vec())]).unwrap();
        VmState::new(RegisterState::default(), memory, Gas::new(10), 0)
    }

    #[test]
    fn output_reads_r7_r8() {
        let mut s = state();
        assert_eq!(s.output(), None);
        s.registers[7] = 0x2_0000;
        s.registers[8] = 5;
        assert_eq!(s.output().as_deref(), Some(&b"hello"[..]));
        s.registers[8] = 0;
        assert_eq!(s.output(), None);
    }

    #[test]
    fn output_is_none_when_unreadable() {
        let mut s = state();
        s.registers[7] = 0x5_0000;
        s.registers[8] = 1;
        assert_eq!(s.output(), None);
        s.registers[7] = u64::from(u32::MAX);
        s.registers[8] = 2;
        assert_eq!(s.output(), None);
        s.registers[7] = 1 << 40;
        assert_eq!(s.output(), None);
    }

    #[tokio::test]
    async fn closures_dispatch_host_calls() {
        let mut s = state();
        let mut calls = Vec::new();
        let mut ctx = |index: u32, state: &mut dyn HostCallState| -> Result<HostCallOutcome, HostCallError> {
            calls.push(index);
            state.registers_mut()[7] = 42;
            state.gas_mut().charge(3);
            Ok(HostCallOutcome::Continue)
        };
        let outcome = ctx.dispatch(9, &mut s).await.unwrap();
        assert_eq!(outcome, HostCallOutcome::Continue);
        assert_eq!(s.registers[7], 42);
        assert_eq!(s.gas.value(), 7);
        assert_eq!(calls, vec![9]);
    }
}
