//! Block compiler: every instruction is decoded once into a closure with its
//! operands, registers and branch targets baked in.
//!
//! This is closure compilation, not machine-code emission. Dispatch still
//! goes through one indirect call per instruction with an
//! [`InstructionContext`] built for it; what the compile step saves is
//! decoding, operand parsing and per-instruction gas checks.
//!
//! Opcodes without an entry in the [`JitCoverage`] table are routed to the
//! interpreter's handler for that opcode, so coverage can grow one opcode at a
//! time without changing behavior.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::config::{opcode, INSTRUCTION_GAS_COST, RESERVED_MEMORY_END};
use crate::gas::Gas;
use crate::instructions::base::{
    dynamic_jump, load, parse_one_immediate, parse_one_offset, parse_register_and_immediate,
    parse_register_and_wide_immediate, parse_register_immediate_offset, parse_three_registers,
    parse_two_registers, parse_two_registers_and_immediate, parse_two_registers_and_offset, set_register,
    sext32, store, Extend,
};
use crate::instructions::InstructionRegistry;
use crate::interpreter::{StepOutcome, VmState};
use crate::memory::Memory;
use crate::parser::ProgramCode;
use crate::types::{ExitReason, InstructionContext, InstructionResult, PanicReason};

/// A compiled instruction body.
pub type CompiledOp = Box<dyn Fn(&mut InstructionContext<'_>) -> InstructionResult + Send + Sync>;

/// Builds the body of one opcode from its decoded operands.
pub type OpCompiler = fn(&Decoded<'_>) -> CompiledOp;

/// One instruction as seen by an [`OpCompiler`].
#[derive(Clone, Copy, Debug)]
pub struct Decoded<'a> {
    pub program: &'a ProgramCode,
    pub pc: u32,
    pub operands: &'a [u8],
}

impl Decoded<'_> {
    /// Static branch result, with the target validated at compile time.
    fn branch(&self, target: u32) -> Option<u32> {
        self.program.is_basic_block_start(target).then_some(target)
    }
}

fn op<F>(f: F) -> CompiledOp
where
    F: Fn(&mut InstructionContext<'_>) -> InstructionResult + Send + Sync + 'static,
{
    Box::new(f)
}

const INVALID_BRANCH: InstructionResult = InstructionResult::Exit(ExitReason::Panic(PanicReason::InvalidBranch));

// ============================================================================
// Coverage table
// ============================================================================

/// Opcode → compiler. Missing entries fall back to the interpreter handler.
pub struct JitCoverage {
    compilers: [Option<OpCompiler>; 256],
}

impl JitCoverage {
    #[must_use]
    pub const fn empty() -> Self {
        Self { compilers: [None; 256] }
    }

    /// Control flow, immediate loads, integer arithmetic, bitwise ops, memory and branches.
    #[must_use]
    pub fn with_default_compilers() -> Self {
        let mut coverage = Self::empty();
        coverage.set(opcode::TRAP, compile_trap);
        coverage.set(opcode::FALLTHROUGH, compile_fallthrough);
        coverage.set(opcode::ECALLI, compile_ecalli);
        coverage.set(opcode::JUMP, compile_jump);
        coverage.set(opcode::JUMP_IND, compile_jump_ind);
        coverage.set(opcode::LOAD_IMM_JUMP, compile_load_imm_jump);
        coverage.set(opcode::LOAD_IMM, compile_load_imm);
        coverage.set(opcode::LOAD_IMM_64, compile_load_imm_64);
        coverage.set(opcode::MOVE_REG, compile_move_reg);
        coverage.set(opcode::ADD_32, compile_add_32);
        coverage.set(opcode::SUB_32, compile_sub_32);
        coverage.set(opcode::MUL_32, compile_mul_32);
        coverage.set(opcode::ADD_64, compile_add_64);
        coverage.set(opcode::SUB_64, compile_sub_64);
        coverage.set(opcode::MUL_64, compile_mul_64);
        coverage.set(opcode::DIV_U_64, compile_div_u_64);
        coverage.set(opcode::REM_U_64, compile_rem_u_64);
        coverage.set(opcode::AND, compile_and);
        coverage.set(opcode::OR, compile_or);
        coverage.set(opcode::XOR, compile_xor);
        coverage.set(opcode::ADD_IMM_32, compile_add_imm_32);
        coverage.set(opcode::ADD_IMM_64, compile_add_imm_64);
        coverage.set(opcode::MUL_IMM_64, compile_mul_imm_64);
        coverage.set(opcode::AND_IMM, compile_and_imm);
        coverage.set(opcode::OR_IMM, compile_or_imm);
        coverage.set(opcode::XOR_IMM, compile_xor_imm);
        coverage.set(opcode::LOAD_U8, compile_load_u8);
        coverage.set(opcode::LOAD_U16, compile_load_u16);
        coverage.set(opcode::LOAD_U32, compile_load_u32);
        coverage.set(opcode::LOAD_I32, compile_load_i32);
        coverage.set(opcode::LOAD_U64, compile_load_u64);
        coverage.set(opcode::STORE_U8, compile_store_u8);
        coverage.set(opcode::STORE_U16, compile_store_u16);
        coverage.set(opcode::STORE_U32, compile_store_u32);
        coverage.set(opcode::STORE_U64, compile_store_u64);
        coverage.set(opcode::LOAD_IND_U8, compile_load_ind_u8);
        coverage.set(opcode::LOAD_IND_U32, compile_load_ind_u32);
        coverage.set(opcode::LOAD_IND_I32, compile_load_ind_i32);
        coverage.set(opcode::LOAD_IND_U64, compile_load_ind_u64);
        coverage.set(opcode::STORE_IND_U8, compile_store_ind_u8);
        coverage.set(opcode::STORE_IND_U32, compile_store_ind_u32);
        coverage.set(opcode::STORE_IND_U64, compile_store_ind_u64);
        coverage.set(opcode::BRANCH_EQ_IMM, compile_branch_eq_imm);
        coverage.set(opcode::BRANCH_NE_IMM, compile_branch_ne_imm);
        coverage.set(opcode::BRANCH_LT_U_IMM, compile_branch_lt_u_imm);
        coverage.set(opcode::BRANCH_GE_U_IMM, compile_branch_ge_u_imm);
        coverage.set(opcode::BRANCH_EQ, compile_branch_eq);
        coverage.set(opcode::BRANCH_NE, compile_branch_ne);
        coverage.set(opcode::BRANCH_LT_U, compile_branch_lt_u);
        coverage.set(opcode::BRANCH_GE_U, compile_branch_ge_u);
        coverage
    }

    pub fn global() -> &'static Self {
        static COVERAGE: OnceLock<JitCoverage> = OnceLock::new();
        COVERAGE.get_or_init(Self::with_default_compilers)
    }

    pub fn set(&mut self, code: u8, compiler: OpCompiler) {
        self.compilers[usize::from(code)] = Some(compiler);
    }

    #[must_use]
    pub fn get(&self, code: u8) -> Option<OpCompiler> {
        self.compilers[usize::from(code)]
    }

    #[must_use]
    pub fn is_covered(&self, code: u8) -> bool {
        self.compilers[usize::from(code)].is_some()
    }

    #[must_use]
    pub fn covered_opcodes(&self) -> Vec<u8> {
        (0..=u8::MAX).filter(|&code| self.is_covered(code)).collect()
    }
}

impl Default for JitCoverage {
    fn default() -> Self {
        Self::with_default_compilers()
    }
}

// ============================================================================
// Op compilers
// ============================================================================

fn compile_trap(_: &Decoded<'_>) -> CompiledOp {
    op(|_| InstructionResult::TRAP)
}

fn compile_fallthrough(_: &Decoded<'_>) -> CompiledOp {
    op(|_| InstructionResult::Continue)
}

fn compile_ecalli(decoded: &Decoded<'_>) -> CompiledOp {
    let index = parse_one_immediate(decoded.operands) as u32;
    op(move |_| InstructionResult::HostCall(index))
}

fn compile_jump(decoded: &Decoded<'_>) -> CompiledOp {
    match decoded.branch(parse_one_offset(decoded.operands, decoded.pc)) {
        Some(target) => op(move |_| InstructionResult::Jump(target)),
        None => op(|_| INVALID_BRANCH),
    }
}

fn compile_jump_ind(decoded: &Decoded<'_>) -> CompiledOp {
    let (register, offset) = parse_register_and_immediate(decoded.operands);
    op(move |ctx| {
        let address = ctx.registers[register].wrapping_add(offset) as u32;
        dynamic_jump(ctx, address)
    })
}

fn compile_load_imm_jump(decoded: &Decoded<'_>) -> CompiledOp {
    let (register, value, target) = parse_register_immediate_offset(decoded.operands, decoded.pc);
    match decoded.branch(target) {
        Some(target) => op(move |ctx| {
            set_register(ctx.registers, register, value);
            InstructionResult::Jump(target)
        }),
        None => op(|_| INVALID_BRANCH),
    }
}

fn compile_load_imm(decoded: &Decoded<'_>) -> CompiledOp {
    let (register, value) = parse_register_and_immediate(decoded.operands);
    op(move |ctx| {
        set_register(ctx.registers, register, value);
        InstructionResult::Continue
    })
}

fn compile_load_imm_64(decoded: &Decoded<'_>) -> CompiledOp {
    let (register, value) = parse_register_and_wide_immediate(decoded.operands);
    op(move |ctx| {
        set_register(ctx.registers, register, value);
        InstructionResult::Continue
    })
}

fn compile_move_reg(decoded: &Decoded<'_>) -> CompiledOp {
    let (d, a) = parse_two_registers(decoded.operands);
    op(move |ctx| {
        let value = ctx.registers[a];
        set_register(ctx.registers, d, value);
        InstructionResult::Continue
    })
}

/// r_D = f(r_A, r_B); `None` traps.
macro_rules! compile_three_register {
    ($name:ident, |$a:ident, $b:ident| $body:expr) => {
        fn $name(decoded: &Decoded<'_>) -> CompiledOp {
            let (ra, rb, rd) = parse_three_registers(decoded.operands);
            op(move |ctx| {
                let ($a, $b) = (ctx.registers[ra], ctx.registers[rb]);
                let result: Option<u64> = $body;
                match result {
                    Some(value) => {
                        set_register(ctx.registers, rd, value);
                        InstructionResult::Continue
                    }
                    None => InstructionResult::TRAP,
                }
            })
        }
    };
}

compile_three_register!(compile_add_32, |a, b| Some(sext32(a.wrapping_add(b))));
compile_three_register!(compile_sub_32, |a, b| Some(sext32(a.wrapping_sub(b))));
compile_three_register!(compile_mul_32, |a, b| Some(sext32(a.wrapping_mul(b))));
compile_three_register!(compile_add_64, |a, b| Some(a.wrapping_add(b)));
compile_three_register!(compile_sub_64, |a, b| Some(a.wrapping_sub(b)));
compile_three_register!(compile_mul_64, |a, b| Some(a.wrapping_mul(b)));
compile_three_register!(compile_div_u_64, |a, b| a.checked_div(b));
compile_three_register!(compile_rem_u_64, |a, b| a.checked_rem(b));
compile_three_register!(compile_and, |a, b| Some(a & b));
compile_three_register!(compile_or, |a, b| Some(a | b));
compile_three_register!(compile_xor, |a, b| Some(a ^ b));

/// r_A = f(r_B, immediate).
macro_rules! compile_register_immediate {
    ($name:ident, |$b:ident, $imm:ident| $body:expr) => {
        fn $name(decoded: &Decoded<'_>) -> CompiledOp {
            let (ra, rb, $imm) = parse_two_registers_and_immediate(decoded.operands);
            op(move |ctx| {
                let $b = ctx.registers[rb];
                set_register(ctx.registers, ra, $body);
                InstructionResult::Continue
            })
        }
    };
}

compile_register_immediate!(compile_add_imm_32, |b, imm| sext32(b.wrapping_add(imm)));
compile_register_immediate!(compile_add_imm_64, |b, imm| b.wrapping_add(imm));
compile_register_immediate!(compile_mul_imm_64, |b, imm| b.wrapping_mul(imm));
compile_register_immediate!(compile_and_imm, |b, imm| b & imm);
compile_register_immediate!(compile_or_imm, |b, imm| b | imm);
compile_register_immediate!(compile_xor_imm, |b, imm| b ^ imm);

/// Direct-address load into r_A.
macro_rules! compile_load {
    ($name:ident, $size:literal, $extend:expr) => {
        fn $name(decoded: &Decoded<'_>) -> CompiledOp {
            let (register, address) = parse_register_and_immediate(decoded.operands);
            let address = address as u32;
            if address < RESERVED_MEMORY_END {
                return op(|_| InstructionResult::TRAP);
            }
            op(move |ctx| match load::<$size>(ctx, address) {
                Ok(value) => {
                    set_register(ctx.registers, register, $extend.apply(value, $size));
                    InstructionResult::Continue
                }
                Err(result) => result,
            })
        }
    };
}

compile_load!(compile_load_u8, 1, Extend::Zero);
compile_load!(compile_load_u16, 2, Extend::Zero);
compile_load!(compile_load_u32, 4, Extend::Zero);
compile_load!(compile_load_i32, 4, Extend::Sign);
compile_load!(compile_load_u64, 8, Extend::Zero);

/// Direct-address store of r_A.
macro_rules! compile_store {
    ($name:ident, $size:literal) => {
        fn $name(decoded: &Decoded<'_>) -> CompiledOp {
            let (register, address) = parse_register_and_immediate(decoded.operands);
            let address = address as u32;
            if address < RESERVED_MEMORY_END {
                return op(|_| InstructionResult::TRAP);
            }
            op(move |ctx| {
                let value = ctx.registers[register];
                store::<$size>(ctx, address, value).err().unwrap_or(InstructionResult::Continue)
            })
        }
    };
}

compile_store!(compile_store_u8, 1);
compile_store!(compile_store_u16, 2);
compile_store!(compile_store_u32, 4);
compile_store!(compile_store_u64, 8);

/// r_A = mem[r_B + immediate].
macro_rules! compile_load_indirect {
    ($name:ident, $size:literal, $extend:expr) => {
        fn $name(decoded: &Decoded<'_>) -> CompiledOp {
            let (a, b, offset) = parse_two_registers_and_immediate(decoded.operands);
            op(move |ctx| {
                let address = ctx.registers[b].wrapping_add(offset) as u32;
                match load::<$size>(ctx, address) {
                    Ok(value) => {
                        set_register(ctx.registers, a, $extend.apply(value, $size));
                        InstructionResult::Continue
                    }
                    Err(result) => result,
                }
            })
        }
    };
}

compile_load_indirect!(compile_load_ind_u8, 1, Extend::Zero);
compile_load_indirect!(compile_load_ind_u32, 4, Extend::Zero);
compile_load_indirect!(compile_load_ind_i32, 4, Extend::Sign);
compile_load_indirect!(compile_load_ind_u64, 8, Extend::Zero);

/// mem[r_B + immediate] = r_A.
macro_rules! compile_store_indirect {
    ($name:ident, $size:literal) => {
        fn $name(decoded: &Decoded<'_>) -> CompiledOp {
            let (a, b, offset) = parse_two_registers_and_immediate(decoded.operands);
            op(move |ctx| {
                let address = ctx.registers[b].wrapping_add(offset) as u32;
                let value = ctx.registers[a];
                store::<$size>(ctx, address, value).err().unwrap_or(InstructionResult::Continue)
            })
        }
    };
}

compile_store_indirect!(compile_store_ind_u8, 1);
compile_store_indirect!(compile_store_ind_u32, 4);
compile_store_indirect!(compile_store_ind_u64, 8);

/// Branch on cmp(r_A, immediate). Invalid targets panic whether or not the branch is taken.
macro_rules! compile_branch_immediate {
    ($name:ident, |$a:ident, $imm:ident| $cond:expr) => {
        fn $name(decoded: &Decoded<'_>) -> CompiledOp {
            let (register, $imm, target) = parse_register_immediate_offset(decoded.operands, decoded.pc);
            let Some(target) = decoded.branch(target) else {
                return op(|_| INVALID_BRANCH);
            };
            op(move |ctx| {
                let $a = ctx.registers[register];
                if $cond {
                    InstructionResult::Jump(target)
                } else {
                    InstructionResult::Continue
                }
            })
        }
    };
}

compile_branch_immediate!(compile_branch_eq_imm, |a, imm| a == imm);
compile_branch_immediate!(compile_branch_ne_imm, |a, imm| a != imm);
compile_branch_immediate!(compile_branch_lt_u_imm, |a, imm| a < imm);
compile_branch_immediate!(compile_branch_ge_u_imm, |a, imm| a >= imm);

/// Branch on cmp(r_A, r_B).
macro_rules! compile_branch {
    ($name:ident, |$a:ident, $b:ident| $cond:expr) => {
        fn $name(decoded: &Decoded<'_>) -> CompiledOp {
            let (ra, rb, target) = parse_two_registers_and_offset(decoded.operands, decoded.pc);
            let Some(target) = decoded.branch(target) else {
                return op(|_| INVALID_BRANCH);
            };
            op(move |ctx| {
                let ($a, $b) = (ctx.registers[ra], ctx.registers[rb]);
                if $cond {
                    InstructionResult::Jump(target)
                } else {
                    InstructionResult::Continue
                }
            })
        }
    };
}

compile_branch!(compile_branch_eq, |a, b| a == b);
compile_branch!(compile_branch_ne, |a, b| a != b);
compile_branch!(compile_branch_lt_u, |a, b| a < b);
compile_branch!(compile_branch_ge_u, |a, b| a >= b);

// ============================================================================
// Compiled programs
// ============================================================================

struct CompiledInstruction {
    pc: u32,
    next: u32,
    skip: u32,
    opcode: u8,
    /// Index one past the last instruction of this instruction's block.
    block_end: usize,
    body: Option<CompiledOp>,
}

/// Every instruction of a program, compiled and grouped into gas blocks.
pub struct CompiledProgram {
    program: Arc<ProgramCode>,
    registry: &'static InstructionRegistry,
    instructions: Vec<CompiledInstruction>,
    index: HashMap<u32, usize>,
}

impl CompiledProgram {
    #[must_use]
    pub fn program(&self) -> &ProgramCode {
        &self.program
    }

    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Instructions that run through the interpreter handler.
    #[must_use]
    pub fn fallback_count(&self) -> usize {
        self.instructions.iter().filter(|i| i.body.is_none()).count()
    }

    /// Number of gas blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.instructions
            .iter()
            .enumerate()
            .filter(|(i, _)| *i == 0 || self.instructions[i - 1].block_end == *i)
            .count()
    }

    /// Run from `state.pc` until the program exits or requests a host call.
    ///
    /// Each block charges the gas of its remaining instructions up front and
    /// refunds the tail it did not execute, so totals match per-instruction
    /// metering. With too little gas for the whole block it charges one
    /// instruction at a time and stops at the first unaffordable one.
    pub fn run<M: Memory>(&self, state: &mut VmState<M>) -> StepOutcome {
        loop {
            let Some(&start) = self.index.get(&state.pc) else {
                debug!(pc = state.pc, "pc is not an instruction boundary");
                return StepOutcome::Exit(ExitReason::Panic(PanicReason::InvalidInstructionIndex));
            };
            let end = self.instructions[start].block_end;
            let suffix = (end - start) as u64 * INSTRUCTION_GAS_COST;
            let prepaid = state.gas.can_afford(suffix);
            if prepaid {
                state.gas.charge(suffix);
            }

            for i in start..end {
                let instruction = &self.instructions[i];
                state.pc = instruction.pc;
                if !prepaid && !state.gas.charge(INSTRUCTION_GAS_COST) {
                    return StepOutcome::Exit(ExitReason::OutOfGas);
                }
                crate::step_log!(pc = instruction.pc, gas = state.gas.value(), opcode = instruction.opcode, "jit step");

                let result = self.execute_one(instruction, state);
                if !matches!(result, InstructionResult::Continue) && prepaid {
                    let unexecuted = (end - i - 1) as u64 * INSTRUCTION_GAS_COST;
                    state.gas = state.gas.saturating_add(Gas::new(unexecuted));
                }
                match result {
                    InstructionResult::Continue => state.pc = instruction.next,
                    InstructionResult::Jump(target) => {
                        state.pc = target;
                        break;
                    }
                    InstructionResult::HostCall(index) => {
                        state.pc = instruction.next;
                        return StepOutcome::HostCall(index);
                    }
                    InstructionResult::Fault(address) => {
                        debug!(pc = instruction.pc, address = format_args!("{address:#x}"), "memory fault");
                        return StepOutcome::Exit(ExitReason::Panic(PanicReason::Trap));
                    }
                    InstructionResult::Exit(reason) => return StepOutcome::Exit(reason),
                }
            }
        }
    }

    fn execute_one<M: Memory>(&self, instruction: &CompiledInstruction, state: &mut VmState<M>) -> InstructionResult {
        let mut context = InstructionContext {
            program: &self.program,
            registers: &mut state.registers,
            memory: &mut state.memory,
            program_counter: instruction.pc,
            operands: self.program.operands(instruction.pc, instruction.skip),
            skip: instruction.skip,
        };
        match &instruction.body {
            Some(body) => body(&mut context),
            None => self.registry.execute(instruction.opcode, &mut context),
        }
    }
}

impl std::fmt::Debug for CompiledProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledProgram")
            .field("instructions", &self.instructions.len())
            .field("fallbacks", &self.fallback_count())
            .finish_non_exhaustive()
    }
}

/// Turns decoded programs into [`CompiledProgram`]s.
#[derive(Clone, Copy)]
pub struct JitCompiler {
    coverage: &'static JitCoverage,
    registry: &'static InstructionRegistry,
}

impl JitCompiler {
    #[must_use]
    pub fn new() -> Self {
        Self::with_tables(JitCoverage::global(), InstructionRegistry::global())
    }

    #[must_use]
    pub const fn with_tables(coverage: &'static JitCoverage, registry: &'static InstructionRegistry) -> Self {
        Self { coverage, registry }
    }

    pub fn compile(&self, program: Arc<ProgramCode>) -> CompiledProgram {
        let len = program.len() as u32;
        let mut instructions: Vec<CompiledInstruction> = Vec::new();
        let mut index = HashMap::new();

        for pc in (0..len).filter(|&pc| program.is_instruction_boundary(pc)) {
            let skip = program.skip(pc);
            // boundaries are inside the code, so the opcode exists
            let code = program.opcode_at(pc).unwrap_or(opcode::TRAP);
            let decoded = Decoded {
                program: &program,
                pc,
                operands: program.operands(pc, skip),
            };
            index.insert(pc, instructions.len());
            instructions.push(CompiledInstruction {
                pc,
                next: pc + skip + 1,
                skip,
                opcode: code,
                block_end: 0,
                body: self.coverage.get(code).map(|compile| compile(&decoded)),
            });
        }

        // A block ends before every basic-block start and wherever execution
        // cannot fall through to the next listed instruction.
        let mut end = instructions.len();
        for i in (0..instructions.len()).rev() {
            instructions[i].block_end = end;
            let starts_block = i == 0
                || program.is_basic_block_start(instructions[i].pc)
                || instructions[i - 1].next != instructions[i].pc;
            if starts_block {
                end = i;
            }
        }

        let compiled = CompiledProgram {
            program,
            registry: self.registry,
            instructions,
            index,
        };
        debug!(
            instructions = compiled.instruction_count(),
            fallbacks = compiled.fallback_count(),
            "program compiled"
        );
        compiled
    }
}

impl Default for JitCompiler {
    fn default() -> Self {
        Self::new()
    }
}
