//! Register-relative memory access: STORE_IMM_IND_*, STORE_IND_*, LOAD_IND_*.

use crate::config::opcode;
use crate::instructions::base::{
    finish, handler_struct, load, parse_register_and_two_immediates,
    parse_two_registers_and_immediate, set_register, store, Extend, InstructionHandler,
};
use crate::types::{InstructionContext, InstructionResult};

// --- STORE_IMM_IND_* (70-73): mem[r_A + immed_X] = immed_Y ---
macro_rules! store_imm_ind_instruction {
    ($name:ident, $opcode:expr, $label:literal, $size:literal) => {
        handler_struct!($name);

        impl InstructionHandler for $name {
            fn opcode(&self) -> u8 {
                $opcode
            }

            fn name(&self) -> &'static str {
                $label
            }

            fn validate(&self, operands: &[u8]) -> bool {
                !operands.is_empty()
            }

            fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
                let (register, offset, value) = parse_register_and_two_immediates(context.operands);
                let address = context.registers[register].wrapping_add(offset) as u32;
                finish(store::<$size>(context, address, value))
            }
        }
    };
}

store_imm_ind_instruction!(StoreImmIndU8Instruction, opcode::STORE_IMM_IND_U8, "STORE_IMM_IND_U8", 1);
store_imm_ind_instruction!(StoreImmIndU16Instruction, opcode::STORE_IMM_IND_U16, "STORE_IMM_IND_U16", 2);
store_imm_ind_instruction!(StoreImmIndU32Instruction, opcode::STORE_IMM_IND_U32, "STORE_IMM_IND_U32", 4);
store_imm_ind_instruction!(StoreImmIndU64Instruction, opcode::STORE_IMM_IND_U64, "STORE_IMM_IND_U64", 8);

// --- STORE_IND_* (120-123): mem[r_B + immed_X] = r_A ---
macro_rules! store_ind_instruction {
    ($name:ident, $opcode:expr, $label:literal, $size:literal) => {
        handler_struct!($name);

        impl InstructionHandler for $name {
            fn opcode(&self) -> u8 {
                $opcode
            }

            fn name(&self) -> &'static str {
                $label
            }

            fn validate(&self, operands: &[u8]) -> bool {
                !operands.is_empty()
            }

            fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
                let (a, b, offset) = parse_two_registers_and_immediate(context.operands);
                let address = context.registers[b].wrapping_add(offset) as u32;
                let value = context.registers[a];
                finish(store::<$size>(context, address, value))
            }
        }
    };
}

store_ind_instruction!(StoreIndU8Instruction, opcode::STORE_IND_U8, "STORE_IND_U8", 1);
store_ind_instruction!(StoreIndU16Instruction, opcode::STORE_IND_U16, "STORE_IND_U16", 2);
store_ind_instruction!(StoreIndU32Instruction, opcode::STORE_IND_U32, "STORE_IND_U32", 4);
store_ind_instruction!(StoreIndU64Instruction, opcode::STORE_IND_U64, "STORE_IND_U64", 8);

// --- LOAD_IND_* (124-130): r_A = mem[r_B + immed_X] ---
macro_rules! load_ind_instruction {
    ($name:ident, $opcode:expr, $label:literal, $size:literal, $extend:expr) => {
        handler_struct!($name);

        impl InstructionHandler for $name {
            fn opcode(&self) -> u8 {
                $opcode
            }

            fn name(&self) -> &'static str {
                $label
            }

            fn validate(&self, operands: &[u8]) -> bool {
                !operands.is_empty()
            }

            fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
                let (a, b, offset) = parse_two_registers_and_immediate(context.operands);
                let address = context.registers[b].wrapping_add(offset) as u32;
                match load::<$size>(context, address) {
                    Ok(value) => {
                        set_register(context.registers, a, $extend.apply(value, $size));
                        InstructionResult::Continue
                    }
                    Err(result) => result,
                }
            }
        }
    };
}

load_ind_instruction!(LoadIndU8Instruction, opcode::LOAD_IND_U8, "LOAD_IND_U8", 1, Extend::Zero);
load_ind_instruction!(LoadIndI8Instruction, opcode::LOAD_IND_I8, "LOAD_IND_I8", 1, Extend::Sign);
load_ind_instruction!(LoadIndU16Instruction, opcode::LOAD_IND_U16, "LOAD_IND_U16", 2, Extend::Zero);
load_ind_instruction!(LoadIndI16Instruction, opcode::LOAD_IND_I16, "LOAD_IND_I16", 2, Extend::Sign);
load_ind_instruction!(LoadIndU32Instruction, opcode::LOAD_IND_U32, "LOAD_IND_U32", 4, Extend::Zero);
load_ind_instruction!(LoadIndI32Instruction, opcode::LOAD_IND_I32, "LOAD_IND_I32", 4, Extend::Sign);
load_ind_instruction!(LoadIndU64Instruction, opcode::LOAD_IND_U64, "LOAD_IND_U64", 8, Extend::Zero);
