//! Program builder: assembles instructions, bitmask and jump table into blobs.

use std::collections::HashMap;

use tracing::warn;

use crate::codec::encode_natural;
use crate::config::opcode;

/// Assembles program code. Branch and jump targets are named labels
/// resolved when the blob is produced; offsets are always encoded in 4 bytes.
#[derive(Clone, Debug, Default)]
pub struct ProgramBuilder {
    code: Vec<u8>,
    starts: Vec<u32>,
    jump_table: Vec<String>,
    labels: HashMap<String, u32>,
    fixups: Vec<Fixup>,
}

#[derive(Clone, Debug)]
struct Fixup {
    instruction: u32,
    position: usize,
    label: String,
}

/// Shortest little-endian encoding (at most 4 bytes) that sign-extends back to `value`.
#[must_use]
pub fn encode_immediate(value: i64) -> Vec<u8> {
    let truncated = value as i32 as i64;
    let value = if truncated == value { value } else { truncated };
    for len in 0..4usize {
        let shift = 64 - 8 * len as u32;
        let round_trip = if len == 0 { 0 } else { (value << shift) >> shift };
        if round_trip == value {
            return value.to_le_bytes()[..len].to_vec();
        }
    }
    value.to_le_bytes()[..4].to_vec()
}

impl ProgramBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset the next instruction will be placed at.
    #[must_use]
    pub fn pc(&self) -> u32 {
        self.code.len() as u32
    }

    #[must_use]
    pub fn label(mut self, name: impl Into<String>) -> Self {
        self.labels.insert(name.into(), self.pc());
        self
    }

    /// Append a jump table entry pointing at `label`; dynamic address is `2 * (index + 1)`.
    #[must_use]
    pub fn jump_table_entry(mut self, label: impl Into<String>) -> Self {
        self.jump_table.push(label.into());
        self
    }

    /// Raw instruction: opcode followed by operand bytes.
    #[must_use]
    pub fn instruction(mut self, op: u8, operands: &[u8]) -> Self {
        self.starts.push(self.pc());
        self.code.push(op);
        self.code.extend_from_slice(operands);
        self
    }

    fn with_offset(mut self, op: u8, prefix: &[u8], label: String) -> Self {
        let instruction = self.pc();
        let position = self.code.len() + 1 + prefix.len();
        self.fixups.push(Fixup { instruction, position, label });
        let mut operands = prefix.to_vec();
        operands.extend_from_slice(&[0; 4]);
        self.instruction(op, &operands)
    }

    // --- operand formats ---

    #[must_use]
    pub fn no_args(self, op: u8) -> Self {
        self.instruction(op, &[])
    }

    #[must_use]
    pub fn one_imm(self, op: u8, imm: i64) -> Self {
        self.instruction(op, &encode_immediate(imm))
    }

    #[must_use]
    pub fn reg_imm(self, op: u8, reg: u8, imm: i64) -> Self {
        let mut operands = vec![reg & 0x0f];
        operands.extend(encode_immediate(imm));
        self.instruction(op, &operands)
    }

    #[must_use]
    pub fn two_imm(self, op: u8, x: i64, y: i64) -> Self {
        let x_bytes = encode_immediate(x);
        let mut operands = vec![x_bytes.len() as u8];
        operands.extend(x_bytes);
        operands.extend(encode_immediate(y));
        self.instruction(op, &operands)
    }

    #[must_use]
    pub fn reg_two_imm(self, op: u8, reg: u8, x: i64, y: i64) -> Self {
        let x_bytes = encode_immediate(x);
        let mut operands = vec![(reg & 0x0f) | ((x_bytes.len() as u8) << 4)];
        operands.extend(x_bytes);
        operands.extend(encode_immediate(y));
        self.instruction(op, &operands)
    }

    #[must_use]
    pub fn reg_imm_offset(self, op: u8, reg: u8, imm: i64, label: impl Into<String>) -> Self {
        let x_bytes = encode_immediate(imm);
        let mut prefix = vec![(reg & 0x0f) | ((x_bytes.len() as u8) << 4)];
        prefix.extend(x_bytes);
        self.with_offset(op, &prefix, label.into())
    }

    /// `d` in the low nibble, `a` in the high nibble.
    #[must_use]
    pub fn two_reg(self, op: u8, d: u8, a: u8) -> Self {
        self.instruction(op, &[(d & 0x0f) | ((a & 0x0f) << 4)])
    }

    #[must_use]
    pub fn two_reg_imm(self, op: u8, a: u8, b: u8, imm: i64) -> Self {
        let mut operands = vec![(a & 0x0f) | ((b & 0x0f) << 4)];
        operands.extend(encode_immediate(imm));
        self.instruction(op, &operands)
    }

    #[must_use]
    pub fn two_reg_offset(self, op: u8, a: u8, b: u8, label: impl Into<String>) -> Self {
        self.with_offset(op, &[(a & 0x0f) | ((b & 0x0f) << 4)], label.into())
    }

    #[must_use]
    pub fn two_reg_two_imm(self, op: u8, a: u8, b: u8, x: i64, y: i64) -> Self {
        let x_bytes = encode_immediate(x);
        let mut operands = vec![(a & 0x0f) | ((b & 0x0f) << 4), x_bytes.len() as u8];
        operands.extend(x_bytes);
        operands.extend(encode_immediate(y));
        self.instruction(op, &operands)
    }

    #[must_use]
    pub fn three_reg(self, op: u8, d: u8, a: u8, b: u8) -> Self {
        self.instruction(op, &[(a & 0x0f) | ((b & 0x0f) << 4), d & 0x0f])
    }

    // --- common instructions ---

    #[must_use]
    pub fn trap(self) -> Self {
        self.no_args(opcode::TRAP)
    }

    #[must_use]
    pub fn fallthrough(self) -> Self {
        self.no_args(opcode::FALLTHROUGH)
    }

    #[must_use]
    pub fn ecalli(self, index: u32) -> Self {
        self.one_imm(opcode::ECALLI, i64::from(index as i32))
    }

    #[must_use]
    pub fn load_imm(self, reg: u8, value: i64) -> Self {
        self.reg_imm(opcode::LOAD_IMM, reg, value)
    }

    #[must_use]
    pub fn load_imm_64(self, reg: u8, value: u64) -> Self {
        let mut operands = vec![reg & 0x0f];
        operands.extend(value.to_le_bytes());
        self.instruction(opcode::LOAD_IMM_64, &operands)
    }

    #[must_use]
    pub fn move_reg(self, d: u8, a: u8) -> Self {
        self.two_reg(opcode::MOVE_REG, d, a)
    }

    #[must_use]
    pub fn add_64(self, d: u8, a: u8, b: u8) -> Self {
        self.three_reg(opcode::ADD_64, d, a, b)
    }

    #[must_use]
    pub fn add_imm_64(self, a: u8, b: u8, imm: i64) -> Self {
        self.two_reg_imm(opcode::ADD_IMM_64, a, b, imm)
    }

    #[must_use]
    pub fn div_u_64(self, d: u8, a: u8, b: u8) -> Self {
        self.three_reg(opcode::DIV_U_64, d, a, b)
    }

    /// `mem[address] = reg` (8 bytes).
    #[must_use]
    pub fn store_u64(self, reg: u8, address: u32) -> Self {
        self.reg_imm(opcode::STORE_U64, reg, i64::from(address as i32))
    }

    /// `reg = mem[address]` (8 bytes).
    #[must_use]
    pub fn load_u64(self, reg: u8, address: u32) -> Self {
        self.reg_imm(opcode::LOAD_U64, reg, i64::from(address as i32))
    }

    #[must_use]
    pub fn sbrk(self, d: u8, a: u8) -> Self {
        self.two_reg(opcode::SBRK, d, a)
    }

    #[must_use]
    pub fn jump(self, label: impl Into<String>) -> Self {
        self.with_offset(opcode::JUMP, &[], label.into())
    }

    #[must_use]
    pub fn jump_ind(self, reg: u8, offset: i64) -> Self {
        self.reg_imm(opcode::JUMP_IND, reg, offset)
    }

    #[must_use]
    pub fn branch_ne_imm(self, reg: u8, imm: i64, label: impl Into<String>) -> Self {
        self.reg_imm_offset(opcode::BRANCH_NE_IMM, reg, imm, label)
    }

    #[must_use]
    pub fn branch_lt_u(self, a: u8, b: u8, label: impl Into<String>) -> Self {
        self.two_reg_offset(opcode::BRANCH_LT_U, a, b, label)
    }

    /// Halt via `jump_ind r0` (r0 holds the halt address for standard programs).
    #[must_use]
    pub fn halt(self) -> Self {
        self.jump_ind(0, 0)
    }

    // --- output ---

    fn resolved_code(&self) -> Vec<u8> {
        let mut code = self.code.clone();
        for fixup in &self.fixups {
            let target = self.labels.get(&fixup.label).copied().unwrap_or_else(|| {
                warn!(label = %fixup.label, "unresolved label");
                fixup.instruction
            });
            let offset = target.wrapping_sub(fixup.instruction);
            code[fixup.position..fixup.position + 4].copy_from_slice(&offset.to_le_bytes());
        }
        code
    }

    fn bitmask(&self) -> Vec<u8> {
        let mut bitmask = vec![0u8; self.code.len().div_ceil(8)];
        for &start in &self.starts {
            bitmask[(start / 8) as usize] |= 1 << (start % 8);
        }
        bitmask
    }

    /// Program code blob: jump table, code and bitmask.
    #[must_use]
    pub fn code_blob(&self) -> Vec<u8> {
        let code = self.resolved_code();
        let entry_size: u8 = if self.jump_table.is_empty() { 0 } else { 4 };
        let mut out = encode_natural(self.jump_table.len() as u64);
        out.push(entry_size);
        out.extend(encode_natural(code.len() as u64));
        for label in &self.jump_table {
            let target = self.labels.get(label).copied().unwrap_or(u32::MAX);
            out.extend(target.to_le_bytes());
        }
        out.extend(code);
        out.extend(self.bitmask());
        out
    }

    /// Standard program blob wrapping the code blob.
    #[must_use]
    pub fn standard_blob(&self, read_only: &[u8], read_write: &[u8], heap_pages: u16, stack_size: u32) -> Vec<u8> {
        let code = self.code_blob();
        let mut out = Vec::with_capacity(15 + read_only.len() + read_write.len() + code.len());
        out.extend(&(read_only.len() as u32).to_le_bytes()[..3]);
        out.extend(&(read_write.len() as u32).to_le_bytes()[..3]);
        out.extend(heap_pages.to_le_bytes());
        out.extend(&stack_size.to_le_bytes()[..3]);
        out.extend_from_slice(read_only);
        out.extend_from_slice(read_write);
        out.extend((code.len() as u32).to_le_bytes());
        out.extend(code);
        out
    }

    /// Standard program with no data, no heap pages and a one-page stack.
    #[must_use]
    pub fn minimal_standard_blob(&self) -> Vec<u8> {
        self.standard_blob(&[], &[], 0, 4096)
    }
}
