//! Instruction handler trait plus the operand decoders and register/memory
//! helpers every instruction family shares.
//!
//! Operand slices are exactly `skip` bytes long (zero padded past the end of
//! the code), so decoders never index out of bounds.

use crate::config::{HALT_ADDRESS, RESERVED_MEMORY_END};
use crate::parser::{decode_immediate, decode_immediate2};
use crate::types::{ExitReason, InstructionContext, InstructionResult, PanicReason, RegisterState};

/// One opcode's behavior.
pub trait InstructionHandler: Send + Sync {
    fn opcode(&self) -> u8;
    fn name(&self) -> &'static str;

    fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult;

    /// Whether the operand run is long enough for this instruction's fixed fields.
    fn validate(&self, _operands: &[u8]) -> bool {
        true
    }

    fn disassemble(&self, operands: &[u8]) -> String {
        if operands.is_empty() {
            return self.name().to_string();
        }
        format!("{} {}", self.name(), crate::types::bytes_to_hex(operands))
    }
}

// ============================================================================
// Registers
// ============================================================================

/// r = min(12, nibble).
#[must_use]
pub const fn register_index(nibble: u8) -> usize {
    let index = (nibble & 0x0f) as usize;
    if index > 12 {
        12
    } else {
        index
    }
}

#[inline]
fn low_register(operands: &[u8], at: usize) -> usize {
    register_index(operands.get(at).copied().unwrap_or(0))
}

#[inline]
fn high_register(operands: &[u8], at: usize) -> usize {
    register_index(operands.get(at).copied().unwrap_or(0) >> 4)
}

/// Sign-extend the low `octets` bytes of `value`.
#[must_use]
pub const fn sign_extend(value: u64, octets: u32) -> u64 {
    if octets == 0 || octets >= 8 {
        return if octets == 0 { 0 } else { value };
    }
    let shift = 64 - 8 * octets;
    (((value << shift) as i64) >> shift) as u64
}

/// Keep the low 32 bits and sign-extend them to 64.
#[inline]
#[must_use]
pub const fn sext32(value: u64) -> u64 {
    value as u32 as i32 as i64 as u64
}

// ============================================================================
// Operand formats
// ============================================================================

fn offset_target(pc: u32, raw: u64) -> u32 {
    pc.wrapping_add(raw as u32)
}

/// One immediate: `lX = min(4, ℓ)`.
#[must_use]
pub fn parse_one_immediate(operands: &[u8]) -> u64 {
    decode_immediate(&operands[..operands.len().min(4)])
}

/// One offset, relative to the instruction's own pc.
#[must_use]
pub fn parse_one_offset(operands: &[u8], pc: u32) -> u32 {
    offset_target(pc, parse_one_immediate(operands))
}

/// One register and a full 64-bit immediate.
#[must_use]
pub fn parse_register_and_wide_immediate(operands: &[u8]) -> (usize, u64) {
    let mut bytes = [0u8; 8];
    let available = operands.len().saturating_sub(1).min(8);
    if available > 0 {
        bytes[..available].copy_from_slice(&operands[1..=available]);
    }
    (low_register(operands, 0), u64::from_le_bytes(bytes))
}

/// Two immediates; `lX` in the low three bits of the first byte.
#[must_use]
pub fn parse_two_immediates(operands: &[u8]) -> (u64, u64) {
    let len_byte = operands.first().copied().unwrap_or(0);
    decode_immediate2(operands.get(1..).unwrap_or(&[]), len_byte, 1, 1)
}

/// One register and one immediate: `lX = min(4, max(0, ℓ - 1))`.
#[must_use]
pub fn parse_register_and_immediate(operands: &[u8]) -> (usize, u64) {
    let rest = operands.get(1..).unwrap_or(&[]);
    (low_register(operands, 0), decode_immediate(&rest[..rest.len().min(4)]))
}

/// One register and two immediates; `lX` in bits 4..7 of the first byte.
#[must_use]
pub fn parse_register_and_two_immediates(operands: &[u8]) -> (usize, u64, u64) {
    let len_byte = operands.first().copied().unwrap_or(0);
    let (x, y) = decode_immediate2(operands.get(1..).unwrap_or(&[]), len_byte, 16, 1);
    (low_register(operands, 0), x, y)
}

/// One register, one immediate and one offset.
#[must_use]
pub fn parse_register_immediate_offset(operands: &[u8], pc: u32) -> (usize, u64, u32) {
    let (register, x, y) = parse_register_and_two_immediates(operands);
    (register, x, offset_target(pc, y))
}

/// `(d, a)`: d in the low nibble, a in the high nibble.
#[must_use]
pub fn parse_two_registers(operands: &[u8]) -> (usize, usize) {
    (low_register(operands, 0), high_register(operands, 0))
}

/// `(a, b, immediate)` with `lX = min(4, max(0, ℓ - 1))`.
#[must_use]
pub fn parse_two_registers_and_immediate(operands: &[u8]) -> (usize, usize, u64) {
    let rest = operands.get(1..).unwrap_or(&[]);
    (
        low_register(operands, 0),
        high_register(operands, 0),
        decode_immediate(&rest[..rest.len().min(4)]),
    )
}

/// `(a, b, target)`.
#[must_use]
pub fn parse_two_registers_and_offset(operands: &[u8], pc: u32) -> (usize, usize, u32) {
    let (a, b, raw) = parse_two_registers_and_immediate(operands);
    (a, b, offset_target(pc, raw))
}

/// `(a, b, x, y)`; `lX` in the low three bits of the second byte.
#[must_use]
pub fn parse_two_registers_and_two_immediates(operands: &[u8]) -> (usize, usize, u64, u64) {
    let len_byte = operands.get(1).copied().unwrap_or(0);
    let (x, y) = decode_immediate2(operands.get(2..).unwrap_or(&[]), len_byte, 1, 2);
    (low_register(operands, 0), high_register(operands, 0), x, y)
}

/// `(a, b, d)`: a low nibble, b high nibble of byte 0, d in byte 1.
#[must_use]
pub fn parse_three_registers(operands: &[u8]) -> (usize, usize, usize) {
    (
        low_register(operands, 0),
        high_register(operands, 0),
        low_register(operands, 1),
    )
}

// ============================================================================
// Control flow
// ============================================================================

/// Jump to a static target, which must start a basic block.
#[must_use]
pub fn branch_to(context: &InstructionContext<'_>, target: u32) -> InstructionResult {
    if context.program.is_basic_block_start(target) {
        InstructionResult::Jump(target)
    } else {
        InstructionResult::Exit(ExitReason::Panic(PanicReason::InvalidBranch))
    }
}

/// Conditional branch; the target is validated whether or not it is taken.
#[must_use]
pub fn branch_if(context: &InstructionContext<'_>, target: u32, condition: bool) -> InstructionResult {
    match branch_to(context, target) {
        InstructionResult::Jump(_) if !condition => InstructionResult::Continue,
        other => other,
    }
}

/// Dynamic jump through the jump table.
#[must_use]
pub fn dynamic_jump(context: &InstructionContext<'_>, address: u32) -> InstructionResult {
    const INVALID: InstructionResult =
        InstructionResult::Exit(ExitReason::Panic(PanicReason::InvalidDynamicJump));
    if address == HALT_ADDRESS {
        return InstructionResult::Exit(ExitReason::Halt);
    }
    let table_len = context.program.jump_table().len() as u64;
    if address == 0 || u64::from(address) > table_len * 2 || address % 2 != 0 {
        return INVALID;
    }
    match context.program.jump_target((address / 2 - 1) as usize) {
        Some(target) if context.program.is_basic_block_start(target) => InstructionResult::Jump(target),
        _ => INVALID,
    }
}

// ============================================================================
// Memory
// ============================================================================

/// Read `N` bytes little-endian; below 2^16 traps, missing permission faults.
pub fn load<const N: usize>(context: &InstructionContext<'_>, address: u32) -> Result<u64, InstructionResult> {
    if address < RESERVED_MEMORY_END {
        return Err(InstructionResult::TRAP);
    }
    let mut bytes = [0u8; 8];
    context
        .memory
        .read_into(address, &mut bytes[..N])
        .map_err(|e| InstructionResult::Fault(e.address()))?;
    Ok(u64::from_le_bytes(bytes))
}

/// Write the low `N` bytes of `value` little-endian.
pub fn store<const N: usize>(
    context: &mut InstructionContext<'_>,
    address: u32,
    value: u64,
) -> Result<(), InstructionResult> {
    if address < RESERVED_MEMORY_END {
        return Err(InstructionResult::TRAP);
    }
    context
        .memory
        .write(address, &value.to_le_bytes()[..N])
        .map_err(|e| InstructionResult::Fault(e.address()))
}

/// Zero or sign extension applied after a load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Extend {
    Zero,
    Sign,
}

impl Extend {
    #[must_use]
    pub const fn apply(self, value: u64, octets: u32) -> u64 {
        match self {
            Self::Zero => value,
            Self::Sign => sign_extend(value, octets),
        }
    }
}

/// Flatten a `Result`-shaped handler body.
#[must_use]
pub fn finish(result: Result<(), InstructionResult>) -> InstructionResult {
    result.err().unwrap_or(InstructionResult::Continue)
}

/// Write a register, ignoring indexes past the register file.
#[inline]
pub fn set_register(registers: &mut RegisterState, index: usize, value: u64) {
    if let Some(slot) = registers.get_mut(index) {
        *slot = value;
    }
}

/// Shared unit-struct boilerplate for handlers.
macro_rules! handler_struct {
    ($name:ident) => {
        pub struct $name;

        impl $name {
            #[must_use]
            pub const fn new() -> Self {
                Self
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

pub(crate) use handler_struct;

/// r_D = f(r_A, r_B). The `checked` form traps when the body yields `None`.
macro_rules! three_register_instruction {
    ($name:ident, $opcode:expr, $label:literal, |$a:ident, $b:ident| $body:expr) => {
        $crate::instructions::base::three_register_instruction!(@impl $name, $opcode, $label, |$a, $b| Some($body));
    };
    ($name:ident, $opcode:expr, $label:literal, checked |$a:ident, $b:ident| $body:expr) => {
        $crate::instructions::base::three_register_instruction!(@impl $name, $opcode, $label, |$a, $b| $body);
    };
    (@impl $name:ident, $opcode:expr, $label:literal, |$a:ident, $b:ident| $body:expr) => {
        $crate::instructions::base::handler_struct!($name);

        impl $crate::instructions::base::InstructionHandler for $name {
            fn opcode(&self) -> u8 {
                $opcode
            }

            fn name(&self) -> &'static str {
                $label
            }

            fn validate(&self, operands: &[u8]) -> bool {
                operands.len() >= 2
            }

            fn execute(
                &self,
                context: &mut $crate::types::InstructionContext<'_>,
            ) -> $crate::types::InstructionResult {
                let (ra, rb, rd) = $crate::instructions::base::parse_three_registers(context.operands);
                let $a: u64 = context.registers[ra];
                let $b: u64 = context.registers[rb];
                let result: Option<u64> = $body;
                match result {
                    Some(value) => {
                        $crate::instructions::base::set_register(context.registers, rd, value);
                        $crate::types::InstructionResult::Continue
                    }
                    None => $crate::types::InstructionResult::TRAP,
                }
            }
        }
    };
}

pub(crate) use three_register_instruction;

/// r_A = f(r_B, immed_X).
macro_rules! two_register_immediate_instruction {
    ($name:ident, $opcode:expr, $label:literal, |$b:ident, $imm:ident| $body:expr) => {
        $crate::instructions::base::handler_struct!($name);

        impl $crate::instructions::base::InstructionHandler for $name {
            fn opcode(&self) -> u8 {
                $opcode
            }

            fn name(&self) -> &'static str {
                $label
            }

            fn validate(&self, operands: &[u8]) -> bool {
                !operands.is_empty()
            }

            fn execute(
                &self,
                context: &mut $crate::types::InstructionContext<'_>,
            ) -> $crate::types::InstructionResult {
                let (ra, rb, $imm) =
                    $crate::instructions::base::parse_two_registers_and_immediate(context.operands);
                let $b: u64 = context.registers[rb];
                $crate::instructions::base::set_register(context.registers, ra, $body);
                $crate::types::InstructionResult::Continue
            }
        }
    };
}

pub(crate) use two_register_immediate_instruction;

/// r_D = f(r_A).
macro_rules! two_register_instruction {
    ($name:ident, $opcode:expr, $label:literal, |$a:ident| $body:expr) => {
        $crate::instructions::base::handler_struct!($name);

        impl $crate::instructions::base::InstructionHandler for $name {
            fn opcode(&self) -> u8 {
                $opcode
            }

            fn name(&self) -> &'static str {
                $label
            }

            fn validate(&self, operands: &[u8]) -> bool {
                !operands.is_empty()
            }

            fn execute(
                &self,
                context: &mut $crate::types::InstructionContext<'_>,
            ) -> $crate::types::InstructionResult {
                let (rd, ra) = $crate::instructions::base::parse_two_registers(context.operands);
                let $a: u64 = context.registers[ra];
                $crate::instructions::base::set_register(context.registers, rd, $body);
                $crate::types::InstructionResult::Continue
            }
        }
    };
}

pub(crate) use two_register_instruction;
