//! Control flow: trap, fallthrough, static and dynamic jumps.

use crate::config::opcode;
use crate::instructions::base::{
    branch_to, dynamic_jump, handler_struct, parse_one_offset, parse_register_and_immediate,
    parse_register_immediate_offset, parse_two_registers_and_two_immediates, set_register,
    InstructionHandler,
};
use crate::types::{InstructionContext, InstructionResult};

// --- TRAP (0) ---
handler_struct!(TrapInstruction);

impl InstructionHandler for TrapInstruction {
    fn opcode(&self) -> u8 {
        opcode::TRAP
    }

    fn name(&self) -> &'static str {
        "TRAP"
    }

    fn execute(&self, _context: &mut InstructionContext<'_>) -> InstructionResult {
        InstructionResult::TRAP
    }
}

// --- FALLTHROUGH (1) ---
handler_struct!(FallthroughInstruction);

impl InstructionHandler for FallthroughInstruction {
    fn opcode(&self) -> u8 {
        opcode::FALLTHROUGH
    }

    fn name(&self) -> &'static str {
        "FALLTHROUGH"
    }

    fn execute(&self, _context: &mut InstructionContext<'_>) -> InstructionResult {
        InstructionResult::Continue
    }
}

// --- JUMP (40) ---
handler_struct!(JumpInstruction);

impl InstructionHandler for JumpInstruction {
    fn opcode(&self) -> u8 {
        opcode::JUMP
    }

    fn name(&self) -> &'static str {
        "JUMP"
    }

    fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
        let target = parse_one_offset(context.operands, context.program_counter);
        branch_to(context, target)
    }
}

// --- JUMP_IND (50) ---
/// djump((r_A + immed_X) mod 2^32).
handler_struct!(JumpIndInstruction);

impl InstructionHandler for JumpIndInstruction {
    fn opcode(&self) -> u8 {
        opcode::JUMP_IND
    }

    fn name(&self) -> &'static str {
        "JUMP_IND"
    }

    fn validate(&self, operands: &[u8]) -> bool {
        !operands.is_empty()
    }

    fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
        let (register, offset) = parse_register_and_immediate(context.operands);
        let address = context.registers[register].wrapping_add(offset) as u32;
        dynamic_jump(context, address)
    }
}

// --- LOAD_IMM_JUMP (80) ---
handler_struct!(LoadImmJumpInstruction);

impl InstructionHandler for LoadImmJumpInstruction {
    fn opcode(&self) -> u8 {
        opcode::LOAD_IMM_JUMP
    }

    fn name(&self) -> &'static str {
        "LOAD_IMM_JUMP"
    }

    fn validate(&self, operands: &[u8]) -> bool {
        !operands.is_empty()
    }

    fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
        let (register, value, target) =
            parse_register_immediate_offset(context.operands, context.program_counter);
        let result = branch_to(context, target);
        if matches!(result, InstructionResult::Jump(_)) {
            set_register(context.registers, register, value);
        }
        result
    }
}

// --- LOAD_IMM_JUMP_IND (180) ---
/// r_A = immed_X; djump((r_B + immed_Y) mod 2^32). r_B is read before r_A is written.
handler_struct!(LoadImmJumpIndInstruction);

impl InstructionHandler for LoadImmJumpIndInstruction {
    fn opcode(&self) -> u8 {
        opcode::LOAD_IMM_JUMP_IND
    }

    fn name(&self) -> &'static str {
        "LOAD_IMM_JUMP_IND"
    }

    fn validate(&self, operands: &[u8]) -> bool {
        operands.len() >= 2
    }

    fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
        let (a, b, value, offset) = parse_two_registers_and_two_immediates(context.operands);
        let address = context.registers[b].wrapping_add(offset) as u32;
        set_register(context.registers, a, value);
        dynamic_jump(context, address)
    }
}

// --- ECALLI (10) ---
handler_struct!(EcalliInstruction);

impl InstructionHandler for EcalliInstruction {
    fn opcode(&self) -> u8 {
        opcode::ECALLI
    }

    fn name(&self) -> &'static str {
        "ECALLI"
    }

    fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
        let index = crate::instructions::base::parse_one_immediate(context.operands);
        InstructionResult::HostCall(index as u32)
    }
}
