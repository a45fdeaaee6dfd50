//! Integer arithmetic, 32-bit (results sign-extended from the low word) and 64-bit.
//! Division and remainder by zero trap; signed overflow wraps.

use crate::config::opcode;
use crate::instructions::base::{sext32, three_register_instruction, two_register_immediate_instruction};

// ============================================================================
// Three registers, 32-bit
// ============================================================================

three_register_instruction!(Add32Instruction, opcode::ADD_32, "ADD_32", |a, b| sext32(a.wrapping_add(b)));
three_register_instruction!(Sub32Instruction, opcode::SUB_32, "SUB_32", |a, b| sext32(a.wrapping_sub(b)));
three_register_instruction!(Mul32Instruction, opcode::MUL_32, "MUL_32", |a, b| sext32(a.wrapping_mul(b)));

three_register_instruction!(DivU32Instruction, opcode::DIV_U_32, "DIV_U_32", checked |a, b| {
    (a as u32).checked_div(b as u32).map(|q| sext32(u64::from(q)))
});

three_register_instruction!(DivS32Instruction, opcode::DIV_S_32, "DIV_S_32", checked |a, b| {
    let divisor = b as i32;
    (divisor != 0).then(|| (a as i32).wrapping_div(divisor) as i64 as u64)
});

three_register_instruction!(RemU32Instruction, opcode::REM_U_32, "REM_U_32", checked |a, b| {
    (a as u32).checked_rem(b as u32).map(|r| sext32(u64::from(r)))
});

three_register_instruction!(RemS32Instruction, opcode::REM_S_32, "REM_S_32", checked |a, b| {
    let divisor = b as i32;
    (divisor != 0).then(|| (a as i32).wrapping_rem(divisor) as i64 as u64)
});

// ============================================================================
// Three registers, 64-bit
// ============================================================================

three_register_instruction!(Add64Instruction, opcode::ADD_64, "ADD_64", |a, b| a.wrapping_add(b));
three_register_instruction!(Sub64Instruction, opcode::SUB_64, "SUB_64", |a, b| a.wrapping_sub(b));
three_register_instruction!(Mul64Instruction, opcode::MUL_64, "MUL_64", |a, b| a.wrapping_mul(b));
three_register_instruction!(DivU64Instruction, opcode::DIV_U_64, "DIV_U_64", checked |a, b| a.checked_div(b));

three_register_instruction!(DivS64Instruction, opcode::DIV_S_64, "DIV_S_64", checked |a, b| {
    (b != 0).then(|| (a as i64).wrapping_div(b as i64) as u64)
});

three_register_instruction!(RemU64Instruction, opcode::REM_U_64, "REM_U_64", checked |a, b| a.checked_rem(b));

three_register_instruction!(RemS64Instruction, opcode::REM_S_64, "REM_S_64", checked |a, b| {
    (b != 0).then(|| (a as i64).wrapping_rem(b as i64) as u64)
});

// --- MUL_UPPER_* (213-215): high 64 bits of the 128-bit product ---
three_register_instruction!(MulUpperSSInstruction, opcode::MUL_UPPER_S_S, "MUL_UPPER_S_S", |a, b| {
    ((i128::from(a as i64) * i128::from(b as i64)) >> 64) as u64
});
three_register_instruction!(MulUpperUUInstruction, opcode::MUL_UPPER_U_U, "MUL_UPPER_U_U", |a, b| {
    ((u128::from(a) * u128::from(b)) >> 64) as u64
});
three_register_instruction!(MulUpperSUInstruction, opcode::MUL_UPPER_S_U, "MUL_UPPER_S_U", |a, b| {
    ((i128::from(a as i64) * i128::from(b)) >> 64) as u64
});

// ============================================================================
// Two registers and an immediate
// ============================================================================

two_register_immediate_instruction!(AddImm32Instruction, opcode::ADD_IMM_32, "ADD_IMM_32", |b, imm| {
    sext32(b.wrapping_add(imm))
});
two_register_immediate_instruction!(MulImm32Instruction, opcode::MUL_IMM_32, "MUL_IMM_32", |b, imm| {
    sext32(b.wrapping_mul(imm))
});
two_register_immediate_instruction!(NegAddImm32Instruction, opcode::NEG_ADD_IMM_32, "NEG_ADD_IMM_32", |b, imm| {
    sext32(imm.wrapping_sub(b))
});
two_register_immediate_instruction!(AddImm64Instruction, opcode::ADD_IMM_64, "ADD_IMM_64", |b, imm| b.wrapping_add(imm));
two_register_immediate_instruction!(MulImm64Instruction, opcode::MUL_IMM_64, "MUL_IMM_64", |b, imm| b.wrapping_mul(imm));
two_register_immediate_instruction!(NegAddImm64Instruction, opcode::NEG_ADD_IMM_64, "NEG_ADD_IMM_64", |b, imm| {
    imm.wrapping_sub(b)
});
