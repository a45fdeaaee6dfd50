//! Immediate loads and direct-address memory access.
//! LOAD_IMM, LOAD_IMM_64, STORE_IMM_*, LOAD_* and STORE_* with an immediate address.

use crate::config::opcode;
use crate::instructions::base::{
    finish, handler_struct, load, parse_register_and_immediate, parse_register_and_wide_immediate,
    parse_two_immediates, set_register, store, Extend, InstructionHandler,
};
use crate::types::{InstructionContext, InstructionResult};

// --- LOAD_IMM_64 (20) ---
handler_struct!(LoadImm64Instruction);

impl InstructionHandler for LoadImm64Instruction {
    fn opcode(&self) -> u8 {
        opcode::LOAD_IMM_64
    }

    fn name(&self) -> &'static str {
        "LOAD_IMM_64"
    }

    fn validate(&self, operands: &[u8]) -> bool {
        operands.len() >= 9
    }

    fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
        let (register, value) = parse_register_and_wide_immediate(context.operands);
        set_register(context.registers, register, value);
        InstructionResult::Continue
    }
}

// --- LOAD_IMM (51) ---
handler_struct!(LoadImmInstruction);

impl InstructionHandler for LoadImmInstruction {
    fn opcode(&self) -> u8 {
        opcode::LOAD_IMM
    }

    fn name(&self) -> &'static str {
        "LOAD_IMM"
    }

    fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
        let (register, value) = parse_register_and_immediate(context.operands);
        set_register(context.registers, register, value);
        InstructionResult::Continue
    }
}

// --- STORE_IMM_U8/U16/U32/U64 (30-33) ---
macro_rules! store_imm_instruction {
    ($name:ident, $opcode:expr, $label:literal, $size:literal) => {
        handler_struct!($name);

        impl InstructionHandler for $name {
            fn opcode(&self) -> u8 {
                $opcode
            }

            fn name(&self) -> &'static str {
                $label
            }

            fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
                let (address, value) = parse_two_immediates(context.operands);
                finish(store::<$size>(context, address as u32, value))
            }
        }
    };
}

store_imm_instruction!(StoreImmU8Instruction, opcode::STORE_IMM_U8, "STORE_IMM_U8", 1);
store_imm_instruction!(StoreImmU16Instruction, opcode::STORE_IMM_U16, "STORE_IMM_U16", 2);
store_imm_instruction!(StoreImmU32Instruction, opcode::STORE_IMM_U32, "STORE_IMM_U32", 4);
store_imm_instruction!(StoreImmU64Instruction, opcode::STORE_IMM_U64, "STORE_IMM_U64", 8);

// --- LOAD_U8 .. LOAD_U64 (52-58) ---
macro_rules! load_instruction {
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
                let (register, address) = parse_register_and_immediate(context.operands);
                match load::<$size>(context, address as u32) {
                    Ok(value) => {
                        set_register(context.registers, register, $extend.apply(value, $size));
                        InstructionResult::Continue
                    }
                    Err(result) => result,
                }
            }
        }
    };
}

load_instruction!(LoadU8Instruction, opcode::LOAD_U8, "LOAD_U8", 1, Extend::Zero);
load_instruction!(LoadI8Instruction, opcode::LOAD_I8, "LOAD_I8", 1, Extend::Sign);
load_instruction!(LoadU16Instruction, opcode::LOAD_U16, "LOAD_U16", 2, Extend::Zero);
load_instruction!(LoadI16Instruction, opcode::LOAD_I16, "LOAD_I16", 2, Extend::Sign);
load_instruction!(LoadU32Instruction, opcode::LOAD_U32, "LOAD_U32", 4, Extend::Zero);
load_instruction!(LoadI32Instruction, opcode::LOAD_I32, "LOAD_I32", 4, Extend::Sign);
load_instruction!(LoadU64Instruction, opcode::LOAD_U64, "LOAD_U64", 8, Extend::Zero);

// --- STORE_U8 .. STORE_U64 (59-62) ---
macro_rules! store_instruction {
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
                let (register, address) = parse_register_and_immediate(context.operands);
                let value = context.registers[register];
                finish(store::<$size>(context, address as u32, value))
            }
        }
    };
}

store_instruction!(StoreU8Instruction, opcode::STORE_U8, "STORE_U8", 1);
store_instruction!(StoreU16Instruction, opcode::STORE_U16, "STORE_U16", 2);
store_instruction!(StoreU32Instruction, opcode::STORE_U32, "STORE_U32", 4);
store_instruction!(StoreU64Instruction, opcode::STORE_U64, "STORE_U64", 8);
