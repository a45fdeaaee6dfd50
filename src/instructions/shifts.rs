//! Shifts and rotations. Shift amounts are taken modulo the operand width.
//! `_ALT` forms swap roles: the immediate is shifted by the register.

use crate::config::opcode;
use crate::instructions::base::{sext32, three_register_instruction, two_register_immediate_instruction};

#[inline]
fn shl32(value: u64, amount: u64) -> u64 {
    sext32(u64::from((value as u32) << (amount % 32)))
}

#[inline]
fn shr32(value: u64, amount: u64) -> u64 {
    sext32(u64::from((value as u32) >> (amount % 32)))
}

#[inline]
fn sar32(value: u64, amount: u64) -> u64 {
    ((value as i32) >> (amount % 32)) as i64 as u64
}

#[inline]
fn sar64(value: u64, amount: u64) -> u64 {
    ((value as i64) >> (amount % 64)) as u64
}

#[inline]
fn rotr32(value: u64, amount: u64) -> u64 {
    sext32(u64::from((value as u32).rotate_right((amount % 32) as u32)))
}

// --- register amounts ---
three_register_instruction!(ShloL32Instruction, opcode::SHLO_L_32, "SHLO_L_32", |a, b| shl32(a, b));
three_register_instruction!(ShloR32Instruction, opcode::SHLO_R_32, "SHLO_R_32", |a, b| shr32(a, b));
three_register_instruction!(SharR32Instruction, opcode::SHAR_R_32, "SHAR_R_32", |a, b| sar32(a, b));
three_register_instruction!(ShloL64Instruction, opcode::SHLO_L_64, "SHLO_L_64", |a, b| a << (b % 64));
three_register_instruction!(ShloR64Instruction, opcode::SHLO_R_64, "SHLO_R_64", |a, b| a >> (b % 64));
three_register_instruction!(SharR64Instruction, opcode::SHAR_R_64, "SHAR_R_64", |a, b| sar64(a, b));

three_register_instruction!(RotL64Instruction, opcode::ROT_L_64, "ROT_L_64", |a, b| {
    a.rotate_left((b % 64) as u32)
});
three_register_instruction!(RotL32Instruction, opcode::ROT_L_32, "ROT_L_32", |a, b| {
    sext32(u64::from((a as u32).rotate_left((b % 32) as u32)))
});
three_register_instruction!(RotR64Instruction, opcode::ROT_R_64, "ROT_R_64", |a, b| {
    a.rotate_right((b % 64) as u32)
});
three_register_instruction!(RotR32Instruction, opcode::ROT_R_32, "ROT_R_32", |a, b| rotr32(a, b));

// --- immediate amounts ---
two_register_immediate_instruction!(ShloLImm32Instruction, opcode::SHLO_L_IMM_32, "SHLO_L_IMM_32", |b, imm| shl32(b, imm));
two_register_immediate_instruction!(ShloRImm32Instruction, opcode::SHLO_R_IMM_32, "SHLO_R_IMM_32", |b, imm| shr32(b, imm));
two_register_immediate_instruction!(SharRImm32Instruction, opcode::SHAR_R_IMM_32, "SHAR_R_IMM_32", |b, imm| sar32(b, imm));
two_register_immediate_instruction!(ShloLImm64Instruction, opcode::SHLO_L_IMM_64, "SHLO_L_IMM_64", |b, imm| b << (imm % 64));
two_register_immediate_instruction!(ShloRImm64Instruction, opcode::SHLO_R_IMM_64, "SHLO_R_IMM_64", |b, imm| b >> (imm % 64));
two_register_immediate_instruction!(SharRImm64Instruction, opcode::SHAR_R_IMM_64, "SHAR_R_IMM_64", |b, imm| sar64(b, imm));

two_register_immediate_instruction!(ShloLImmAlt32Instruction, opcode::SHLO_L_IMM_ALT_32, "SHLO_L_IMM_ALT_32", |b, imm| shl32(imm, b));
two_register_immediate_instruction!(ShloRImmAlt32Instruction, opcode::SHLO_R_IMM_ALT_32, "SHLO_R_IMM_ALT_32", |b, imm| shr32(imm, b));
two_register_immediate_instruction!(SharRImmAlt32Instruction, opcode::SHAR_R_IMM_ALT_32, "SHAR_R_IMM_ALT_32", |b, imm| sar32(imm, b));
two_register_immediate_instruction!(ShloLImmAlt64Instruction, opcode::SHLO_L_IMM_ALT_64, "SHLO_L_IMM_ALT_64", |b, imm| imm << (b % 64));
two_register_immediate_instruction!(ShloRImmAlt64Instruction, opcode::SHLO_R_IMM_ALT_64, "SHLO_R_IMM_ALT_64", |b, imm| imm >> (b % 64));
two_register_immediate_instruction!(SharRImmAlt64Instruction, opcode::SHAR_R_IMM_ALT_64, "SHAR_R_IMM_ALT_64", |b, imm| sar64(imm, b));

two_register_immediate_instruction!(RotR64ImmInstruction, opcode::ROT_R_64_IMM, "ROT_R_64_IMM", |b, imm| {
    b.rotate_right((imm % 64) as u32)
});
two_register_immediate_instruction!(RotR64ImmAltInstruction, opcode::ROT_R_64_IMM_ALT, "ROT_R_64_IMM_ALT", |b, imm| {
    imm.rotate_right((b % 64) as u32)
});
two_register_immediate_instruction!(RotR32ImmInstruction, opcode::ROT_R_32_IMM, "ROT_R_32_IMM", |b, imm| rotr32(b, imm));
two_register_immediate_instruction!(RotR32ImmAltInstruction, opcode::ROT_R_32_IMM_ALT, "ROT_R_32_IMM_ALT", |b, imm| rotr32(imm, b));
