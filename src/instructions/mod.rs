//! Instruction set: one handler per opcode, grouped by family.

pub mod arithmetic;
pub mod base;
pub mod bitwise;
pub mod branching;
pub mod comparison;
pub mod control_flow;
pub mod memory;
pub mod memory_indirect;
pub mod register_ops;
pub mod registry;
pub mod registry_instructions;
pub mod shifts;

pub use base::InstructionHandler;
pub use registry::InstructionRegistry;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::ProgramBuilder;
    use crate::config::opcode;
    use crate::memory::{GeneralMemory, Memory};
    use crate::parser::ProgramCode;
    use crate::types::{ExitReason, InstructionContext, InstructionResult, PanicReason, RegisterState};

    const DATA: u32 = 0x2_0000;

    fn memory() -> GeneralMemory {
        GeneralMemory::new(&[(DATA, 4096, true)], Vec::new()).unwrap()
    }

    /// Execute the instruction at `pc` once.
    fn step_at(
        builder: ProgramBuilder,
        pc: u32,
        registers: &mut RegisterState,
        memory: &mut dyn Memory,
    ) -> InstructionResult {
        let program = ProgramCode::new(&builder.code_blob()).unwrap();
        let skip = program.skip(pc);
        let op = program.opcode_at(pc).unwrap();
        let mut context = InstructionContext {
            program: &program,
            registers,
            memory,
            program_counter: pc,
            operands: program.operands(pc, skip),
            skip,
        };
        InstructionRegistry::global().execute(op, &mut context)
    }

    fn step(builder: ProgramBuilder, registers: &mut RegisterState) -> InstructionResult {
        step_at(builder, 0, registers, &mut memory())
    }

    #[test]
    fn every_opcode_is_registered() {
        let registry = InstructionRegistry::global();
        assert_eq!(registry.len(), 139);
        assert!(registry.has_handler(opcode::MIN_U));
        assert!(!registry.has_handler(2));
        assert_eq!(registry.disassemble(2, &[]), "UNKNOWN(2)");
        assert_eq!(registry.disassemble(opcode::ADD_64, &[0x21, 3]), "ADD_64 2103");
    }

    #[test]
    fn unknown_opcode_traps() {
        let mut regs = RegisterState::default();
        let result = step(ProgramBuilder::new().no_args(2), &mut regs);
        assert_eq!(result, InstructionResult::TRAP);
    }

    #[test]
    fn arithmetic_32_sign_extends() {
        let mut regs = RegisterState::default();
        regs[1] = 0x7fff_ffff;
        regs[2] = 1;
        step(ProgramBuilder::new().three_reg(opcode::ADD_32, 3, 1, 2), &mut regs);
        assert_eq!(regs[3], 0xFFFF_FFFF_8000_0000);

        regs[1] = 10;
        step(ProgramBuilder::new().two_reg_imm(opcode::NEG_ADD_IMM_64, 4, 1, 3), &mut regs);
        assert_eq!(regs[4] as i64, -7);
    }

    #[test]
    fn division_by_zero_traps_and_overflow_wraps() {
        let mut regs = RegisterState::default();
        regs[1] = 10;
        let result = step(ProgramBuilder::new().div_u_64(3, 1, 2), &mut regs);
        assert_eq!(result, InstructionResult::TRAP);
        assert_eq!(regs[3], 0);

        regs[1] = i64::MIN as u64;
        regs[2] = u64::MAX;
        step(ProgramBuilder::new().three_reg(opcode::DIV_S_64, 3, 1, 2), &mut regs);
        assert_eq!(regs[3], i64::MIN as u64);
        step(ProgramBuilder::new().three_reg(opcode::REM_S_64, 3, 1, 2), &mut regs);
        assert_eq!(regs[3], 0);
    }

    #[test]
    fn mul_upper_variants() {
        let mut regs = RegisterState::default();
        regs[1] = u64::MAX;
        regs[2] = 2;
        step(ProgramBuilder::new().three_reg(opcode::MUL_UPPER_U_U, 3, 1, 2), &mut regs);
        assert_eq!(regs[3], 1);
        step(ProgramBuilder::new().three_reg(opcode::MUL_UPPER_S_S, 3, 1, 2), &mut regs);
        assert_eq!(regs[3], u64::MAX);
        step(ProgramBuilder::new().three_reg(opcode::MUL_UPPER_S_U, 3, 1, 2), &mut regs);
        assert_eq!(regs[3], u64::MAX);
    }

    #[test]
    fn shifts_and_rotations() {
        let mut regs = RegisterState::default();
        regs[1] = 1;
        regs[2] = 65;
        step(ProgramBuilder::new().three_reg(opcode::SHLO_L_64, 3, 1, 2), &mut regs);
        assert_eq!(regs[3], 2);
        step(ProgramBuilder::new().three_reg(opcode::ROT_R_32, 3, 1, 2), &mut regs);
        assert_eq!(regs[3], 0xFFFF_FFFF_8000_0000);
        step(ProgramBuilder::new().two_reg_imm(opcode::SHLO_L_IMM_ALT_64, 4, 1, 3), &mut regs);
        assert_eq!(regs[4], 6);
        regs[5] = 0x8000_0000;
        step(ProgramBuilder::new().two_reg_imm(opcode::SHAR_R_IMM_32, 6, 5, 4), &mut regs);
        assert_eq!(regs[6], 0xFFFF_FFFF_F800_0000);
    }

    #[test]
    fn register_ops() {
        let mut regs = RegisterState::default();
        regs[1] = 0x80;
        step(ProgramBuilder::new().two_reg(opcode::SIGN_EXTEND_8, 2, 1), &mut regs);
        assert_eq!(regs[2], 0xFFFF_FFFF_FFFF_FF80);
        step(ProgramBuilder::new().two_reg(opcode::TRAILING_ZERO_BITS_32, 2, 0), &mut regs);
        assert_eq!(regs[2], 32);
        step(ProgramBuilder::new().two_reg(opcode::REVERSE_BYTES, 2, 1), &mut regs);
        assert_eq!(regs[2], 0x8000_0000_0000_0000);
    }

    #[test]
    fn conditional_moves_and_comparisons() {
        let mut regs = RegisterState::default();
        regs[1] = 5;
        regs[3] = 9;
        step(ProgramBuilder::new().three_reg(opcode::CMOV_IZ, 3, 1, 2), &mut regs);
        assert_eq!(regs[3], 5);
        step(ProgramBuilder::new().two_reg_imm(opcode::CMOV_NZ_IMM, 4, 1, 7), &mut regs);
        assert_eq!(regs[4], 7);
        regs[6] = u64::MAX;
        step(ProgramBuilder::new().three_reg(opcode::SET_LT_S, 7, 6, 1), &mut regs);
        assert_eq!(regs[7], 1);
        step(ProgramBuilder::new().three_reg(opcode::MIN, 7, 6, 1), &mut regs);
        assert_eq!(regs[7], u64::MAX);
    }

    #[test]
    fn loads_and_stores() {
        let mut regs = RegisterState::default();
        let mut mem = memory();
        regs[1] = 0xFFFF_FFFF_FFFF_FF9C;
        step_at(ProgramBuilder::new().store_u64(1, DATA), 0, &mut regs, &mut mem);
        step_at(ProgramBuilder::new().reg_imm(opcode::LOAD_I8, 2, i64::from(DATA)), 0, &mut regs, &mut mem);
        assert_eq!(regs[2] as i64, -100);
        step_at(ProgramBuilder::new().reg_imm(opcode::LOAD_U16, 2, i64::from(DATA)), 0, &mut regs, &mut mem);
        assert_eq!(regs[2], 0xff9c);

        regs[3] = u64::from(DATA);
        step_at(
            ProgramBuilder::new().reg_two_imm(opcode::STORE_IMM_IND_U32, 3, 8, 0x1234),
            0,
            &mut regs,
            &mut mem,
        );
        step_at(
            ProgramBuilder::new().two_reg_imm(opcode::LOAD_IND_U32, 4, 3, 8),
            0,
            &mut regs,
            &mut mem,
        );
        assert_eq!(regs[4], 0x1234);
    }

    #[test]
    fn memory_faults() {
        let mut regs = RegisterState::default();
        let result = step(ProgramBuilder::new().load_u64(1, 0x100), &mut regs);
        assert_eq!(result, InstructionResult::TRAP);
        let result = step(ProgramBuilder::new().store_u64(1, 0x5_0000), &mut regs);
        assert_eq!(result, InstructionResult::Fault(0x5_0000));
    }

    #[test]
    fn branches_validate_targets() {
        let builder = ProgramBuilder::new()
            .branch_ne_imm(1, 0, "target")
            .label("target")
            .trap();
        let mut regs = RegisterState::default();
        assert_eq!(step(builder.clone(), &mut regs), InstructionResult::Continue);
        regs[1] = 1;
        assert_eq!(step(builder, &mut regs), InstructionResult::Jump(6));

        let bad = ProgramBuilder::new()
            .branch_ne_imm(1, 0, "bad")
            .load_imm(2, 0)
            .label("bad")
            .trap();
        regs[1] = 0;
        assert_eq!(
            step(bad, &mut regs),
            InstructionResult::Exit(ExitReason::Panic(PanicReason::InvalidBranch))
        );
    }

    #[test]
    fn dynamic_jumps() {
        let builder = || {
            ProgramBuilder::new()
                .jump_table_entry("target")
                .jump_ind(1, 0)
                .label("target")
                .trap()
        };
        let mut regs = RegisterState::default();
        regs[1] = 2;
        assert_eq!(step(builder(), &mut regs), InstructionResult::Jump(2));
        regs[1] = 0xFFFF_0000;
        assert_eq!(step(builder(), &mut regs), InstructionResult::Exit(ExitReason::Halt));
        for bad in [0, 3, 4] {
            regs[1] = bad;
            assert_eq!(
                step(builder(), &mut regs),
                InstructionResult::Exit(ExitReason::Panic(PanicReason::InvalidDynamicJump))
            );
        }
    }

    #[test]
    fn ecalli_requests_host_call() {
        let mut regs = RegisterState::default();
        assert_eq!(step(ProgramBuilder::new().ecalli(300), &mut regs), InstructionResult::HostCall(300));
    }
}
