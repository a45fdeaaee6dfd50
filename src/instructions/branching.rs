//! Conditional branches against an immediate or a second register.

use crate::config::opcode;
use crate::instructions::base::{
    branch_if, handler_struct, parse_register_immediate_offset, parse_two_registers_and_offset,
    InstructionHandler,
};
use crate::types::{InstructionContext, InstructionResult};

// --- BRANCH_*_IMM (81-90): branch when cmp(r_A, immed_X) ---
macro_rules! branch_imm_instruction {
    ($name:ident, $opcode:expr, $label:literal, |$a:ident, $imm:ident| $condition:expr) => {
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
                let (register, $imm, target) =
                    parse_register_immediate_offset(context.operands, context.program_counter);
                let $a = context.registers[register];
                branch_if(context, target, $condition)
            }
        }
    };
}

branch_imm_instruction!(BranchEqImmInstruction, opcode::BRANCH_EQ_IMM, "BRANCH_EQ_IMM", |a, imm| a == imm);
branch_imm_instruction!(BranchNeImmInstruction, opcode::BRANCH_NE_IMM, "BRANCH_NE_IMM", |a, imm| a != imm);
branch_imm_instruction!(BranchLtUImmInstruction, opcode::BRANCH_LT_U_IMM, "BRANCH_LT_U_IMM", |a, imm| a < imm);
branch_imm_instruction!(BranchLeUImmInstruction, opcode::BRANCH_LE_U_IMM, "BRANCH_LE_U_IMM", |a, imm| a <= imm);
branch_imm_instruction!(BranchGeUImmInstruction, opcode::BRANCH_GE_U_IMM, "BRANCH_GE_U_IMM", |a, imm| a >= imm);
branch_imm_instruction!(BranchGtUImmInstruction, opcode::BRANCH_GT_U_IMM, "BRANCH_GT_U_IMM", |a, imm| a > imm);
branch_imm_instruction!(BranchLtSImmInstruction, opcode::BRANCH_LT_S_IMM, "BRANCH_LT_S_IMM", |a, imm| {
    (a as i64) < (imm as i64)
});
branch_imm_instruction!(BranchLeSImmInstruction, opcode::BRANCH_LE_S_IMM, "BRANCH_LE_S_IMM", |a, imm| {
    (a as i64) <= (imm as i64)
});
branch_imm_instruction!(BranchGeSImmInstruction, opcode::BRANCH_GE_S_IMM, "BRANCH_GE_S_IMM", |a, imm| {
    (a as i64) >= (imm as i64)
});
branch_imm_instruction!(BranchGtSImmInstruction, opcode::BRANCH_GT_S_IMM, "BRANCH_GT_S_IMM", |a, imm| {
    (a as i64) > (imm as i64)
});

// --- BRANCH_* (170-175): branch when cmp(r_A, r_B) ---
macro_rules! branch_instruction {
    ($name:ident, $opcode:expr, $label:literal, |$a:ident, $b:ident| $condition:expr) => {
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
                let (ra, rb, target) =
                    parse_two_registers_and_offset(context.operands, context.program_counter);
                let ($a, $b) = (context.registers[ra], context.registers[rb]);
                branch_if(context, target, $condition)
            }
        }
    };
}

branch_instruction!(BranchEqInstruction, opcode::BRANCH_EQ, "BRANCH_EQ", |a, b| a == b);
branch_instruction!(BranchNeInstruction, opcode::BRANCH_NE, "BRANCH_NE", |a, b| a != b);
branch_instruction!(BranchLtUInstruction, opcode::BRANCH_LT_U, "BRANCH_LT_U", |a, b| a < b);
branch_instruction!(BranchLtSInstruction, opcode::BRANCH_LT_S, "BRANCH_LT_S", |a, b| (a as i64) < (b as i64));
branch_instruction!(BranchGeUInstruction, opcode::BRANCH_GE_U, "BRANCH_GE_U", |a, b| a >= b);
branch_instruction!(BranchGeSInstruction, opcode::BRANCH_GE_S, "BRANCH_GE_S", |a, b| (a as i64) >= (b as i64));
