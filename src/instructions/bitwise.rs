//! Bitwise logic on full 64-bit registers.

use crate::config::opcode;
use crate::instructions::base::{three_register_instruction, two_register_immediate_instruction};

three_register_instruction!(AndInstruction, opcode::AND, "AND", |a, b| a & b);
three_register_instruction!(XorInstruction, opcode::XOR, "XOR", |a, b| a ^ b);
three_register_instruction!(OrInstruction, opcode::OR, "OR", |a, b| a | b);
three_register_instruction!(AndInvInstruction, opcode::AND_INV, "AND_INV", |a, b| a & !b);
three_register_instruction!(OrInvInstruction, opcode::OR_INV, "OR_INV", |a, b| a | !b);
three_register_instruction!(XnorInstruction, opcode::XNOR, "XNOR", |a, b| !(a ^ b));

two_register_immediate_instruction!(AndImmInstruction, opcode::AND_IMM, "AND_IMM", |b, imm| b & imm);
two_register_immediate_instruction!(XorImmInstruction, opcode::XOR_IMM, "XOR_IMM", |b, imm| b ^ imm);
two_register_immediate_instruction!(OrImmInstruction, opcode::OR_IMM, "OR_IMM", |b, imm| b | imm);
