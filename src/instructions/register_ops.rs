//! Two-register operations: moves, bit counts, extensions, byte swap and heap growth.

use tracing::debug;

use crate::config::opcode;
use crate::instructions::base::{
    handler_struct, parse_two_registers, set_register, two_register_instruction, InstructionHandler,
};
use crate::types::{InstructionContext, InstructionResult};

two_register_instruction!(MoveRegInstruction, opcode::MOVE_REG, "MOVE_REG", |a| a);
two_register_instruction!(CountSetBits64Instruction, opcode::COUNT_SET_BITS_64, "COUNT_SET_BITS_64", |a| {
    u64::from(a.count_ones())
});
two_register_instruction!(CountSetBits32Instruction, opcode::COUNT_SET_BITS_32, "COUNT_SET_BITS_32", |a| {
    u64::from((a as u32).count_ones())
});
two_register_instruction!(LeadingZeroBits64Instruction, opcode::LEADING_ZERO_BITS_64, "LEADING_ZERO_BITS_64", |a| {
    u64::from(a.leading_zeros())
});
two_register_instruction!(LeadingZeroBits32Instruction, opcode::LEADING_ZERO_BITS_32, "LEADING_ZERO_BITS_32", |a| {
    u64::from((a as u32).leading_zeros())
});
two_register_instruction!(TrailingZeroBits64Instruction, opcode::TRAILING_ZERO_BITS_64, "TRAILING_ZERO_BITS_64", |a| {
    u64::from(a.trailing_zeros())
});
two_register_instruction!(TrailingZeroBits32Instruction, opcode::TRAILING_ZERO_BITS_32, "TRAILING_ZERO_BITS_32", |a| {
    u64::from((a as u32).trailing_zeros())
});
two_register_instruction!(SignExtend8Instruction, opcode::SIGN_EXTEND_8, "SIGN_EXTEND_8", |a| {
    a as u8 as i8 as i64 as u64
});
two_register_instruction!(SignExtend16Instruction, opcode::SIGN_EXTEND_16, "SIGN_EXTEND_16", |a| {
    a as u16 as i16 as i64 as u64
});
two_register_instruction!(ZeroExtend16Instruction, opcode::ZERO_EXTEND_16, "ZERO_EXTEND_16", |a| a & 0xffff);
two_register_instruction!(ReverseBytesInstruction, opcode::REVERSE_BYTES, "REVERSE_BYTES", |a| a.swap_bytes());

// --- SBRK (101) ---
/// r_D = previous heap end after growing by r_A bytes; exhausting the heap traps.
handler_struct!(SbrkInstruction);

impl InstructionHandler for SbrkInstruction {
    fn opcode(&self) -> u8 {
        opcode::SBRK
    }

    fn name(&self) -> &'static str {
        "SBRK"
    }

    fn execute(&self, context: &mut InstructionContext<'_>) -> InstructionResult {
        let (d, a) = parse_two_registers(context.operands);
        let Ok(increment) = u32::try_from(context.registers[a]) else {
            debug!(increment = context.registers[a], "sbrk increment exceeds address space");
            return InstructionResult::TRAP;
        };
        match context.memory.sbrk(increment) {
            Ok(previous) => {
                set_register(context.registers, d, u64::from(previous));
                InstructionResult::Continue
            }
            Err(e) => {
                debug!(error = %e, increment, "sbrk failed");
                InstructionResult::TRAP
            }
        }
    }
}
