//! Register every instruction handler into a registry.

use super::arithmetic::{
    Add32Instruction, Add64Instruction, AddImm32Instruction, AddImm64Instruction, DivS32Instruction,
    DivS64Instruction, DivU32Instruction, DivU64Instruction, Mul32Instruction, Mul64Instruction,
    MulImm32Instruction, MulImm64Instruction, MulUpperSSInstruction, MulUpperSUInstruction,
    MulUpperUUInstruction, NegAddImm32Instruction, NegAddImm64Instruction, RemS32Instruction,
    RemS64Instruction, RemU32Instruction, RemU64Instruction, Sub32Instruction, Sub64Instruction,
};
use super::bitwise::{
    AndImmInstruction, AndInstruction, AndInvInstruction, OrImmInstruction, OrInstruction,
    OrInvInstruction, XnorInstruction, XorImmInstruction, XorInstruction,
};
use super::branching::{
    BranchEqImmInstruction, BranchEqInstruction, BranchGeSImmInstruction, BranchGeSInstruction,
    BranchGeUImmInstruction, BranchGeUInstruction, BranchGtSImmInstruction, BranchGtUImmInstruction,
    BranchLeSImmInstruction, BranchLeUImmInstruction, BranchLtSImmInstruction, BranchLtSInstruction,
    BranchLtUImmInstruction, BranchLtUInstruction, BranchNeImmInstruction, BranchNeInstruction,
};
use super::comparison::{
    CmovIzImmInstruction, CmovIzInstruction, CmovNzImmInstruction, CmovNzInstruction,
    MaxInstruction, MaxUInstruction, MinInstruction, MinUInstruction, SetGtSImmInstruction,
    SetGtUImmInstruction, SetLtSImmInstruction, SetLtSInstruction, SetLtUImmInstruction,
    SetLtUInstruction,
};
use super::control_flow::{
    EcalliInstruction, FallthroughInstruction, JumpIndInstruction, JumpInstruction,
    LoadImmJumpIndInstruction, LoadImmJumpInstruction, TrapInstruction,
};
use super::memory::{
    LoadI16Instruction, LoadI32Instruction, LoadI8Instruction, LoadImm64Instruction,
    LoadImmInstruction, LoadU16Instruction, LoadU32Instruction, LoadU64Instruction,
    LoadU8Instruction, StoreImmU16Instruction, StoreImmU32Instruction, StoreImmU64Instruction,
    StoreImmU8Instruction, StoreU16Instruction, StoreU32Instruction, StoreU64Instruction,
    StoreU8Instruction,
};
use super::memory_indirect::{
    LoadIndI16Instruction, LoadIndI32Instruction, LoadIndI8Instruction, LoadIndU16Instruction,
    LoadIndU32Instruction, LoadIndU64Instruction, LoadIndU8Instruction, StoreImmIndU16Instruction,
    StoreImmIndU32Instruction, StoreImmIndU64Instruction, StoreImmIndU8Instruction,
    StoreIndU16Instruction, StoreIndU32Instruction, StoreIndU64Instruction, StoreIndU8Instruction,
};
use super::register_ops::{
    CountSetBits32Instruction, CountSetBits64Instruction, LeadingZeroBits32Instruction,
    LeadingZeroBits64Instruction, MoveRegInstruction, ReverseBytesInstruction, SbrkInstruction,
    SignExtend16Instruction, SignExtend8Instruction, TrailingZeroBits32Instruction,
    TrailingZeroBits64Instruction, ZeroExtend16Instruction,
};
use super::registry::InstructionRegistry;
use super::shifts::{
    RotL32Instruction, RotL64Instruction, RotR32ImmAltInstruction, RotR32ImmInstruction,
    RotR32Instruction, RotR64ImmAltInstruction, RotR64ImmInstruction, RotR64Instruction,
    SharR32Instruction, SharR64Instruction, SharRImm32Instruction, SharRImm64Instruction,
    SharRImmAlt32Instruction, SharRImmAlt64Instruction, ShloL32Instruction, ShloL64Instruction,
    ShloLImm32Instruction, ShloLImm64Instruction, ShloLImmAlt32Instruction,
    ShloLImmAlt64Instruction, ShloR32Instruction, ShloR64Instruction, ShloRImm32Instruction,
    ShloRImm64Instruction, ShloRImmAlt32Instruction, ShloRImmAlt64Instruction,
};

pub fn register_default_instructions(registry: &mut InstructionRegistry) {
    // control flow
    registry.register(Box::new(TrapInstruction::new()));
    registry.register(Box::new(FallthroughInstruction::new()));
    registry.register(Box::new(EcalliInstruction::new()));
    registry.register(Box::new(JumpInstruction::new()));
    registry.register(Box::new(JumpIndInstruction::new()));
    registry.register(Box::new(LoadImmJumpInstruction::new()));
    registry.register(Box::new(LoadImmJumpIndInstruction::new()));

    // immediates and direct memory
    registry.register(Box::new(LoadImm64Instruction::new()));
    registry.register(Box::new(LoadImmInstruction::new()));
    registry.register(Box::new(StoreImmU8Instruction::new()));
    registry.register(Box::new(StoreImmU16Instruction::new()));
    registry.register(Box::new(StoreImmU32Instruction::new()));
    registry.register(Box::new(StoreImmU64Instruction::new()));
    registry.register(Box::new(LoadU8Instruction::new()));
    registry.register(Box::new(LoadI8Instruction::new()));
    registry.register(Box::new(LoadU16Instruction::new()));
    registry.register(Box::new(LoadI16Instruction::new()));
    registry.register(Box::new(LoadU32Instruction::new()));
    registry.register(Box::new(LoadI32Instruction::new()));
    registry.register(Box::new(LoadU64Instruction::new()));
    registry.register(Box::new(StoreU8Instruction::new()));
    registry.register(Box::new(StoreU16Instruction::new()));
    registry.register(Box::new(StoreU32Instruction::new()));
    registry.register(Box::new(StoreU64Instruction::new()));

    // indirect memory
    registry.register(Box::new(StoreImmIndU8Instruction::new()));
    registry.register(Box::new(StoreImmIndU16Instruction::new()));
    registry.register(Box::new(StoreImmIndU32Instruction::new()));
    registry.register(Box::new(StoreImmIndU64Instruction::new()));
    registry.register(Box::new(StoreIndU8Instruction::new()));
    registry.register(Box::new(StoreIndU16Instruction::new()));
    registry.register(Box::new(StoreIndU32Instruction::new()));
    registry.register(Box::new(StoreIndU64Instruction::new()));
    registry.register(Box::new(LoadIndU8Instruction::new()));
    registry.register(Box::new(LoadIndI8Instruction::new()));
    registry.register(Box::new(LoadIndU16Instruction::new()));
    registry.register(Box::new(LoadIndI16Instruction::new()));
    registry.register(Box::new(LoadIndU32Instruction::new()));
    registry.register(Box::new(LoadIndI32Instruction::new()));
    registry.register(Box::new(LoadIndU64Instruction::new()));

    // branches
    registry.register(Box::new(BranchEqImmInstruction::new()));
    registry.register(Box::new(BranchNeImmInstruction::new()));
    registry.register(Box::new(BranchLtUImmInstruction::new()));
    registry.register(Box::new(BranchLeUImmInstruction::new()));
    registry.register(Box::new(BranchGeUImmInstruction::new()));
    registry.register(Box::new(BranchGtUImmInstruction::new()));
    registry.register(Box::new(BranchLtSImmInstruction::new()));
    registry.register(Box::new(BranchLeSImmInstruction::new()));
    registry.register(Box::new(BranchGeSImmInstruction::new()));
    registry.register(Box::new(BranchGtSImmInstruction::new()));
    registry.register(Box::new(BranchEqInstruction::new()));
    registry.register(Box::new(BranchNeInstruction::new()));
    registry.register(Box::new(BranchLtUInstruction::new()));
    registry.register(Box::new(BranchLtSInstruction::new()));
    registry.register(Box::new(BranchGeUInstruction::new()));
    registry.register(Box::new(BranchGeSInstruction::new()));

    // register ops
    registry.register(Box::new(MoveRegInstruction::new()));
    registry.register(Box::new(SbrkInstruction::new()));
    registry.register(Box::new(CountSetBits64Instruction::new()));
    registry.register(Box::new(CountSetBits32Instruction::new()));
    registry.register(Box::new(LeadingZeroBits64Instruction::new()));
    registry.register(Box::new(LeadingZeroBits32Instruction::new()));
    registry.register(Box::new(TrailingZeroBits64Instruction::new()));
    registry.register(Box::new(TrailingZeroBits32Instruction::new()));
    registry.register(Box::new(SignExtend8Instruction::new()));
    registry.register(Box::new(SignExtend16Instruction::new()));
    registry.register(Box::new(ZeroExtend16Instruction::new()));
    registry.register(Box::new(ReverseBytesInstruction::new()));

    // arithmetic
    registry.register(Box::new(AddImm32Instruction::new()));
    registry.register(Box::new(MulImm32Instruction::new()));
    registry.register(Box::new(NegAddImm32Instruction::new()));
    registry.register(Box::new(AddImm64Instruction::new()));
    registry.register(Box::new(MulImm64Instruction::new()));
    registry.register(Box::new(NegAddImm64Instruction::new()));
    registry.register(Box::new(Add32Instruction::new()));
    registry.register(Box::new(Sub32Instruction::new()));
    registry.register(Box::new(Mul32Instruction::new()));
    registry.register(Box::new(DivU32Instruction::new()));
    registry.register(Box::new(DivS32Instruction::new()));
    registry.register(Box::new(RemU32Instruction::new()));
    registry.register(Box::new(RemS32Instruction::new()));
    registry.register(Box::new(Add64Instruction::new()));
    registry.register(Box::new(Sub64Instruction::new()));
    registry.register(Box::new(Mul64Instruction::new()));
    registry.register(Box::new(DivU64Instruction::new()));
    registry.register(Box::new(DivS64Instruction::new()));
    registry.register(Box::new(RemU64Instruction::new()));
    registry.register(Box::new(RemS64Instruction::new()));
    registry.register(Box::new(MulUpperSSInstruction::new()));
    registry.register(Box::new(MulUpperUUInstruction::new()));
    registry.register(Box::new(MulUpperSUInstruction::new()));

    // bitwise
    registry.register(Box::new(AndImmInstruction::new()));
    registry.register(Box::new(XorImmInstruction::new()));
    registry.register(Box::new(OrImmInstruction::new()));
    registry.register(Box::new(AndInstruction::new()));
    registry.register(Box::new(XorInstruction::new()));
    registry.register(Box::new(OrInstruction::new()));
    registry.register(Box::new(AndInvInstruction::new()));
    registry.register(Box::new(OrInvInstruction::new()));
    registry.register(Box::new(XnorInstruction::new()));

    // comparison and conditional moves
    registry.register(Box::new(SetLtUImmInstruction::new()));
    registry.register(Box::new(SetLtSImmInstruction::new()));
    registry.register(Box::new(SetGtUImmInstruction::new()));
    registry.register(Box::new(SetGtSImmInstruction::new()));
    registry.register(Box::new(SetLtUInstruction::new()));
    registry.register(Box::new(SetLtSInstruction::new()));
    registry.register(Box::new(CmovIzImmInstruction::new()));
    registry.register(Box::new(CmovNzImmInstruction::new()));
    registry.register(Box::new(CmovIzInstruction::new()));
    registry.register(Box::new(CmovNzInstruction::new()));
    registry.register(Box::new(MaxInstruction::new()));
    registry.register(Box::new(MaxUInstruction::new()));
    registry.register(Box::new(MinInstruction::new()));
    registry.register(Box::new(MinUInstruction::new()));

    // shifts and rotations
    registry.register(Box::new(ShloL32Instruction::new()));
    registry.register(Box::new(ShloR32Instruction::new()));
    registry.register(Box::new(SharR32Instruction::new()));
    registry.register(Box::new(ShloL64Instruction::new()));
    registry.register(Box::new(ShloR64Instruction::new()));
    registry.register(Box::new(SharR64Instruction::new()));
    registry.register(Box::new(ShloLImm32Instruction::new()));
    registry.register(Box::new(ShloRImm32Instruction::new()));
    registry.register(Box::new(SharRImm32Instruction::new()));
    registry.register(Box::new(ShloLImm64Instruction::new()));
    registry.register(Box::new(ShloRImm64Instruction::new()));
    registry.register(Box::new(SharRImm64Instruction::new()));
    registry.register(Box::new(ShloLImmAlt32Instruction::new()));
    registry.register(Box::new(ShloRImmAlt32Instruction::new()));
    registry.register(Box::new(SharRImmAlt32Instruction::new()));
    registry.register(Box::new(ShloLImmAlt64Instruction::new()));
    registry.register(Box::new(ShloRImmAlt64Instruction::new()));
    registry.register(Box::new(SharRImmAlt64Instruction::new()));
    registry.register(Box::new(RotL64Instruction::new()));
    registry.register(Box::new(RotL32Instruction::new()));
    registry.register(Box::new(RotR64Instruction::new()));
    registry.register(Box::new(RotR32Instruction::new()));
    registry.register(Box::new(RotR64ImmInstruction::new()));
    registry.register(Box::new(RotR64ImmAltInstruction::new()));
    registry.register(Box::new(RotR32ImmInstruction::new()));
    registry.register(Box::new(RotR32ImmAltInstruction::new()));
}
