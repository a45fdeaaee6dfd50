//! PVM type definitions: exit reasons, execution modes, instruction context and results.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::config::{
    REGISTER_COUNT, RESULT_CODE_HALT, RESULT_CODE_HOST, RESULT_CODE_OOG, RESULT_CODE_PANIC,
};
use crate::memory::Memory;
use crate::parser::ProgramCode;

/// Register state: 13 × 64-bit registers (r0–r12).
pub type RegisterState = [u64; REGISTER_COUNT];

// ============================================================================
// Exit reasons
// ============================================================================

/// Why a program stopped with a panic.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PanicReason {
    Trap = 0,
    InvalidInstructionIndex = 1,
    InvalidDynamicJump = 2,
    InvalidBranch = 3,
}

impl PanicReason {
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Trap),
            1 => Some(Self::InvalidInstructionIndex),
            2 => Some(Self::InvalidDynamicJump),
            3 => Some(Self::InvalidBranch),
            _ => None,
        }
    }
}

/// Terminal classification of one execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExitReason {
    Halt,
    OutOfGas,
    Panic(PanicReason),
    /// Stopped at `ecalli` with no dispatcher; the pc already points past it.
    HostCall(u32),
}

impl ExitReason {
    /// Wire tag: low byte result code, panic reason in bits 8..16, host call index in bits 32..64.
    #[must_use]
    pub const fn to_u64(self) -> u64 {
        match self {
            Self::Halt => RESULT_CODE_HALT as u64,
            Self::OutOfGas => RESULT_CODE_OOG as u64,
            Self::Panic(reason) => RESULT_CODE_PANIC as u64 | ((reason as u64) << 8),
            Self::HostCall(index) => RESULT_CODE_HOST as u64 | ((index as u64) << 32),
        }
    }

    #[must_use]
    pub const fn from_u64(value: u64) -> Option<Self> {
        match (value & 0xff) as u8 {
            RESULT_CODE_HALT => Some(Self::Halt),
            RESULT_CODE_OOG => Some(Self::OutOfGas),
            RESULT_CODE_PANIC => match PanicReason::from_u8(((value >> 8) & 0xff) as u8) {
                Some(reason) => Some(Self::Panic(reason)),
                None => None,
            },
            RESULT_CODE_HOST => Some(Self::HostCall((value >> 32) as u32)),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_halt(&self) -> bool {
        matches!(self, Self::Halt)
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Halt => write!(f, "halt"),
            Self::OutOfGas => write!(f, "out of gas"),
            Self::Panic(reason) => write!(f, "panic({reason:?})"),
            Self::HostCall(index) => write!(f, "host call {index}"),
        }
    }
}

// ============================================================================
// Execution mode
// ============================================================================

/// Capability set over {jit, sandboxed}; empty means plain interpretation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ExecutionMode(u8);

impl ExecutionMode {
    pub const JIT: Self = Self(1);
    pub const SANDBOXED: Self = Self(2);
    const ALL: u8 = 0b11;

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Unknown bits are dropped.
    #[must_use]
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::ALL)
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl BitOr for ExecutionMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ExecutionMode {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

// ============================================================================
// Execution result
// ============================================================================

/// Uniform result of every execution path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VmExecutionResult {
    pub exit_reason: ExitReason,
    pub gas_used: u64,
    /// `mem[r7 .. r7 + r8]` after a halt, when non-empty and readable.
    pub output: Option<Vec<u8>>,
}

// ============================================================================
// Instruction execution
// ============================================================================

/// Outcome of one instruction handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstructionResult {
    /// Fall through to the next instruction.
    Continue,
    /// Continue at the given pc.
    Jump(u32),
    /// Host call requested; the pc advances past the instruction first.
    HostCall(u32),
    /// Memory access fault at the given address.
    Fault(u32),
    Exit(ExitReason),
}

impl InstructionResult {
    pub const TRAP: Self = Self::Exit(ExitReason::Panic(PanicReason::Trap));

    #[must_use]
    pub const fn should_continue(&self) -> bool {
        matches!(self, Self::Continue | Self::Jump(_))
    }
}

/// Everything an instruction handler may read or mutate.
pub struct InstructionContext<'a> {
    pub program: &'a ProgramCode,
    pub registers: &'a mut RegisterState,
    pub memory: &'a mut dyn Memory,
    pub program_counter: u32,
    /// Bytes following the opcode up to the next instruction, zero padded past the code end.
    pub operands: &'a [u8],
    pub skip: u32,
}

// ============================================================================
// Helpers
// ============================================================================

/// Convert bytes to hex string.
#[must_use]
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
