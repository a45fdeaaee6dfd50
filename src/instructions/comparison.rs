//! Comparisons, conditional moves, min and max.

use crate::config::opcode;
use crate::instructions::base::{
    handler_struct, parse_three_registers, parse_two_registers_and_immediate, set_register,
    three_register_instruction, two_register_immediate_instruction, InstructionHandler,
};
use crate::types::{InstructionContext, InstructionResult};

three_register_instruction!(SetLtUInstruction, opcode::SET_LT_U, "SET_LT_U", |a, b| u64::from(a < b));
three_register_instruction!(SetLtSInstruction, opcode::SET_LT_S, "SET_LT_S", |a, b| {
    u64::from((a as i64) < (b as i64))
});

two_register_immediate_instruction!(SetLtUImmInstruction, opcode::SET_LT_U_IMM, "SET_LT_U_IMM", |b, imm| {
    u64::from(b < imm)
});
two_register_immediate_instruction!(SetLtSImmInstruction, opcode::SET_LT_S_IMM, "SET_LT_S_IMM", |b, imm| {
    u64::from((b as i64) < (imm as i64))
});
two_register_immediate_instruction!(SetGtUImmInstruction, opcode::SET_GT_U_IMM, "SET_GT_U_IMM", |b, imm| {
    u64::from(b > imm)
});
two_register_immediate_instruction!(SetGtSImmInstruction, opcode::SET_GT_S_IMM, "SET_GT_S_IMM", |b, imm| {
    u64::from((b as i64) > (imm as i64))
});

three_register_instruction!(MaxInstruction, opcode::MAX, "MAX", |a, b| (a as i64).max(b as i64) as u64);
three_register_instruction!(MaxUInstruction, opcode::MAX_U, "MAX_U", |a, b| a.max(b));
three_register_instruction!(MinInstruction, opcode::MIN, "MIN", |a, b| (a as i64).min(b as i64) as u64);
three_register_instruction!(MinUInstruction, opcode::MIN_U, "MIN_U", |a, b| a.min(b));

// --- CMOV_IZ / CMOV_NZ (218, 219): r_D = r_A when r_B is (non)zero ---
macro_rules! cmov_instruction {
    ($name:ident, $opcode:expr, $label:literal, $when_zero:literal) => {
        handler_struct!($name);

        impl InstructionHandler for $name {
            fn opcode(&self) -> u8 {
                $opcode
            }

            fn name(&self) -> &'static str {
                $label
            }

            fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
                let (a, b, d) = parse_three_registers(context.operands);
                let value = context.registers[a];
                if (context.registers[b] == 0) == $when_zero {
                    set_register(context.registers, d, value);
                }
                InstructionResult::Continue
            }
        }
    };
}

cmov_instruction!(CmovIzInstruction, opcode::CMOV_IZ, "CMOV_IZ", true);
cmov_instruction!(CmovNzInstruction, opcode::CMOV_NZ, "CMOV_NZ", false);

// --- CMOV_IZ_IMM / CMOV_NZ_IMM (147, 148): r_A = immed_X when r_B is (non)zero ---
macro_rules! cmov_imm_instruction {
    ($name:ident, $opcode:expr, $label:literal, $when_zero:literal) => {
        handler_struct!($name);

        impl InstructionHandler for $name {
            fn opcode(&self) -> u8 {
                $opcode
            }

            fn name(&self) -> &'static str {
                $label
            }

            fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
                let (a, b, value) = parse_two_registers_and_immediate(context.operands);
                if (context.registers[b] == 0) == $when_zero {
                    set_register(context.registers, a, value);
                }
                InstructionResult::Continue
            }
        }
    };
}

cmov_imm_instruction!(CmovIzImmInstruction, opcode::CMOV_IZ_IMM, "CMOV_IZ_IMM", true);
cmov_imm_instruction!(CmovNzImmInstruction, opcode::CMOV_NZ_IMM, "CMOV_NZ_IMM", false);
