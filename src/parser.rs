//! Program code decoding: jump table, code bytes and the instruction-boundary bitmask.

use std::collections::HashMap;

use tracing::error;

use crate::codec::{decode_fixed, decode_natural};
use crate::config::{
    is_termination_instruction, INSTRUCTION_GAS_COST, MAX_CODE_LENGTH, MAX_JUMP_TABLE_ENCODE_SIZE,
    MAX_JUMP_TABLE_ENTRIES, MAX_SKIP,
};
use crate::error::ProgramError;

/// Immutable view of a decoded program-code blob.
#[derive(Clone, Debug)]
pub struct ProgramCode {
    blob: Vec<u8>,
    code: Vec<u8>,
    /// Code followed by enough zero bytes to read any operand window.
    padded_code: Vec<u8>,
    bitmask: Vec<u8>,
    jump_table_entry_size: u8,
    jump_table: Vec<u32>,
    basic_blocks: Vec<bool>,
    block_gas: HashMap<u32, u64>,
}

impl ProgramCode {
    /// Decode `jumpTableCount, encodeSize, codeLength, jumpTable, code, bitmask`.
    pub fn new(blob: &[u8]) -> Result<Self, ProgramError> {
        let mut offset = 0usize;

        let entries = decode_natural(blob)
            .filter(|r| r.value <= MAX_JUMP_TABLE_ENTRIES)
            .ok_or(ProgramError::InvalidJumpTableEntriesCount)?;
        offset += entries.consumed;

        let encode_size = blob
            .get(offset)
            .copied()
            .filter(|&s| s <= MAX_JUMP_TABLE_ENCODE_SIZE)
            .ok_or(ProgramError::InvalidJumpTableEncodeSize)?;
        offset += 1;

        let code_length = blob
            .get(offset..)
            .and_then(decode_natural)
            .filter(|r| r.value <= MAX_CODE_LENGTH)
            .ok_or(ProgramError::InvalidCodeLength)?;
        offset += code_length.consumed;

        // bounded by the limits checked above
        let table_size = entries.value as usize * usize::from(encode_size);
        let code_len = code_length.value as usize;

        let table_end = offset + table_size;
        let Some(table_bytes) = blob.get(offset..table_end) else {
            error!(table_size, offset, blob_len = blob.len(), "jump table extends beyond blob");
            return Err(ProgramError::InvalidDataLength);
        };
        let code_end = table_end + code_len;
        let Some(code) = blob.get(table_end..code_end) else {
            error!(code_len, table_end, blob_len = blob.len(), "code extends beyond blob");
            return Err(ProgramError::InvalidDataLength);
        };
        let bitmask = &blob[code_end..];
        if bitmask.len() != code_len.div_ceil(8) {
            error!(
                code_len,
                expected = code_len.div_ceil(8),
                actual = bitmask.len(),
                "bitmask size mismatch"
            );
            return Err(ProgramError::InvalidDataLength);
        }

        let jump_table = if encode_size == 0 {
            vec![0; entries.value as usize]
        } else {
            table_bytes
                .chunks_exact(usize::from(encode_size))
                .map(|entry| u32::try_from(decode_fixed(entry)).unwrap_or(u32::MAX))
                .collect()
        };

        let mut padded_code = Vec::with_capacity(code_len + MAX_SKIP as usize + 1);
        padded_code.extend_from_slice(code);
        padded_code.resize(code_len + MAX_SKIP as usize + 1, 0);

        let mut program = Self {
            blob: blob.to_vec(),
            code: code.to_vec(),
            padded_code,
            bitmask: bitmask.to_vec(),
            jump_table_entry_size: encode_size,
            jump_table,
            basic_blocks: vec![false; code_len],
            block_gas: HashMap::new(),
        };
        program.build_metadata();
        Ok(program)
    }

    /// Mark basic block starts and sum per-block gas.
    fn build_metadata(&mut self) {
        let len = self.code.len() as u32;
        let mut block_start = 0u32;
        let mut block_cost = 0u64;
        if len > 0 {
            self.basic_blocks[0] = true;
        }
        let mut pc = 0u32;
        while pc < len {
            let skip = self.skip(pc);
            block_cost += INSTRUCTION_GAS_COST;
            let next = pc + skip + 1;
            if is_termination_instruction(self.code[pc as usize]) {
                self.block_gas.insert(block_start, block_cost);
                if next < len {
                    self.basic_blocks[next as usize] = true;
                }
                block_start = next;
                block_cost = 0;
            }
            pc = next;
        }
        if block_cost > 0 {
            self.block_gas.insert(block_start, block_cost);
        }
    }

    /// Bytes between the opcode at `start` and the next boundary, capped at 24.
    /// Bits past the end of the bitmask count as set.
    #[must_use]
    pub fn skip_in(start: u32, bitmask: &[u8]) -> u32 {
        for j in 0..MAX_SKIP {
            let bit = u64::from(start) + 1 + u64::from(j);
            if bit_is_set(bitmask, bit) {
                return j;
            }
        }
        MAX_SKIP
    }

    /// Position of the next set bit after `start`, scanning the whole bitmask.
    #[must_use]
    pub fn skip_offset(start: u32, bitmask: &[u8]) -> Option<u32> {
        let total_bits = bitmask.len() as u64 * 8;
        (u64::from(start) + 1..total_bits)
            .find(|&bit| bit_is_set(bitmask, bit))
            .and_then(|bit| u32::try_from(bit).ok())
    }

    /// Like [`Self::skip_in`], with every position past the last code byte counted as set.
    #[must_use]
    pub fn skip(&self, pc: u32) -> u32 {
        let remaining = (self.code.len() as u32).saturating_sub(pc.saturating_add(1));
        Self::skip_in(pc, &self.bitmask).min(remaining)
    }

    /// Start of the instruction following `pc`, or `None` at the end of the code.
    #[must_use]
    pub fn next_instruction(&self, pc: u32) -> Option<u32> {
        let next = pc.checked_add(self.skip(pc) + 1)?;
        self.is_instruction_boundary(next).then_some(next)
    }

    #[must_use]
    pub fn is_instruction_boundary(&self, pc: u32) -> bool {
        (pc as usize) < self.code.len() && bit_is_set(&self.bitmask, u64::from(pc))
    }

    #[must_use]
    pub fn is_basic_block_start(&self, pc: u32) -> bool {
        self.basic_blocks.get(pc as usize).copied().unwrap_or(false)
            && self.is_instruction_boundary(pc)
    }

    /// Gas of the block starting at `pc`; 0 if `pc` is not a block start.
    #[must_use]
    pub fn block_gas_cost(&self, pc: u32) -> u64 {
        self.block_gas.get(&pc).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn opcode_at(&self, pc: u32) -> Option<u8> {
        self.code.get(pc as usize).copied()
    }

    /// Operand bytes of the instruction at `pc` with the given skip, zero padded.
    #[must_use]
    pub fn operands(&self, pc: u32, skip: u32) -> &[u8] {
        let start = (pc as usize + 1).min(self.padded_code.len());
        let end = (start + skip as usize).min(self.padded_code.len());
        &self.padded_code[start..end]
    }

    /// Jump table entry for a dynamic jump index (0-based).
    #[must_use]
    pub fn jump_target(&self, index: usize) -> Option<u32> {
        self.jump_table.get(index).copied()
    }

    /// Instruction starts reached by walking skips from 0.
    pub fn instruction_starts(&self) -> impl Iterator<Item = u32> + '_ {
        let len = self.code.len() as u32;
        std::iter::successors(Some(0u32).filter(|_| len > 0), move |&pc| {
            let next = pc + self.skip(pc) + 1;
            (next < len).then_some(next)
        })
    }

    #[must_use]
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    #[must_use]
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    #[must_use]
    pub fn bitmask(&self) -> &[u8] {
        &self.bitmask
    }

    #[must_use]
    pub fn jump_table(&self) -> &[u32] {
        &self.jump_table
    }

    #[must_use]
    pub const fn jump_table_entry_size(&self) -> u8 {
        self.jump_table_entry_size
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

impl PartialEq for ProgramCode {
    fn eq(&self, other: &Self) -> bool {
        self.blob == other.blob
    }
}

impl Eq for ProgramCode {}

fn bit_is_set(bitmask: &[u8], bit: u64) -> bool {
    usize::try_from(bit / 8)
        .ok()
        .and_then(|byte| bitmask.get(byte))
        .map_or(true, |b| (b >> (bit % 8)) & 1 == 1)
}

// ============================================================================
// Immediate decoding
// ============================================================================

/// Sign-extend 0–4 little-endian bytes; the sign comes from the last supplied byte.
#[must_use]
pub fn decode_immediate(bytes: &[u8]) -> u64 {
    let len = bytes.len().min(4);
    if len == 0 {
        return 0;
    }
    let raw = decode_fixed(&bytes[..len]);
    let shift = 64 - 8 * len as u32;
    (((raw << shift) as i64) >> shift) as u64
}

/// Split `bytes` into two immediates. The length of the first is
/// `min(4, (len_byte / divide_by) & 7)`; the second takes the rest, capped at 4.
#[must_use]
pub fn decode_immediate2(bytes: &[u8], len_byte: u8, divide_by: u8, minus: usize) -> (u64, u64) {
    let len_x = usize::from((len_byte / divide_by.max(1)) & 7).min(4);
    let total = bytes.len() + minus;
    let len_y = total.saturating_sub(len_x + minus).min(4);
    let x = decode_immediate(bytes.get(..len_x.min(bytes.len())).unwrap_or(&[]));
    let y_bytes = bytes.get(len_x..).unwrap_or(&[]);
    let y = decode_immediate(&y_bytes[..len_y.min(y_bytes.len())]);
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_natural;
    use crate::config::opcode;

    fn blob(jump_table: &[u32], entry_size: u8, code: &[u8], bitmask: &[u8]) -> Vec<u8> {
        let mut out = encode_natural(jump_table.len() as u64);
        out.push(entry_size);
        out.extend(encode_natural(code.len() as u64));
        for entry in jump_table {
            out.extend(&entry.to_le_bytes()[..usize::from(entry_size)]);
        }
        out.extend_from_slice(code);
        out.extend_from_slice(bitmask);
        out
    }

    #[test]
    fn decodes_minimal_program() {
        let bytes = blob(&[], 0, &[opcode::TRAP], &[0b1]);
        let program = ProgramCode::new(&bytes).unwrap();
        assert_eq!(program.code(), &[opcode::TRAP]);
        assert!(program.jump_table().is_empty());
        assert!(program.is_basic_block_start(0));
        assert_eq!(program.block_gas_cost(0), 1);
    }

    #[test]
    fn decodes_jump_table_entries() {
        let code = [opcode::FALLTHROUGH, opcode::FALLTHROUGH, opcode::TRAP];
        let bytes = blob(&[1, 2], 2, &code, &[0b111]);
        let program = ProgramCode::new(&bytes).unwrap();
        assert_eq!(program.jump_table(), &[1, 2]);
        assert_eq!(program.jump_table_entry_size(), 2);
        assert!(program.is_basic_block_start(1));
        assert!(program.is_basic_block_start(2));
    }

    #[test]
    fn rejects_malformed_headers() {
        assert_eq!(
            ProgramCode::new(&[]).unwrap_err(),
            ProgramError::InvalidJumpTableEntriesCount
        );
        let mut too_many = encode_natural(MAX_JUMP_TABLE_ENTRIES + 1);
        too_many.extend([0, 0]);
        assert_eq!(
            ProgramCode::new(&too_many).unwrap_err(),
            ProgramError::InvalidJumpTableEntriesCount
        );
        assert_eq!(ProgramCode::new(&[0, 9, 0]).unwrap_err(), ProgramError::InvalidJumpTableEncodeSize);
        assert_eq!(ProgramCode::new(&[0, 1]).unwrap_err(), ProgramError::InvalidCodeLength);
    }

    #[test]
    fn rejects_length_mismatches() {
        let short_code = [0u8, 0, 4, opcode::TRAP];
        assert_eq!(ProgramCode::new(&short_code).unwrap_err(), ProgramError::InvalidDataLength);
        let extra = blob(&[], 0, &[opcode::TRAP], &[1, 0]);
        assert_eq!(ProgramCode::new(&extra).unwrap_err(), ProgramError::InvalidDataLength);
        let missing = blob(&[], 0, &[opcode::TRAP], &[]);
        assert_eq!(ProgramCode::new(&missing).unwrap_err(), ProgramError::InvalidDataLength);
        let table_overflow = blob(&[7], 4, &[], &[]);
        assert_eq!(
            ProgramCode::new(&table_overflow[..table_overflow.len() - 1]).unwrap_err(),
            ProgramError::InvalidDataLength
        );
    }

    #[test]
    fn skip_finds_next_boundary() {
        // instructions at 0, 3, 4
        let bitmask = [0b0001_1001];
        assert_eq!(ProgramCode::skip_in(0, &bitmask), 2);
        assert_eq!(ProgramCode::skip_in(3, &bitmask), 0);
        // past the end counts as set
        assert_eq!(ProgramCode::skip_in(4, &bitmask), 3);
        assert_eq!(ProgramCode::skip_in(0, &[0b1, 0, 0, 0, 0]), MAX_SKIP);
    }

    #[test]
    fn skip_offset_returns_none_past_last_boundary() {
        let bitmask = [0b0001_1001];
        assert_eq!(ProgramCode::skip_offset(0, &bitmask), Some(3));
        assert_eq!(ProgramCode::skip_offset(3, &bitmask), Some(4));
        assert_eq!(ProgramCode::skip_offset(4, &bitmask), None);
    }

    #[test]
    fn blocks_follow_terminators() {
        // load_imm r0, 1; trap; fallthrough; trap
        let code = [opcode::LOAD_IMM, 0x00, 0x01, opcode::TRAP, opcode::FALLTHROUGH, opcode::TRAP];
        let bytes = blob(&[], 0, &code, &[0b0011_1001]);
        let program = ProgramCode::new(&bytes).unwrap();
        assert!(program.is_basic_block_start(0));
        assert!(!program.is_basic_block_start(3));
        assert!(program.is_basic_block_start(4));
        assert!(program.is_basic_block_start(5));
        assert_eq!(program.block_gas_cost(0), 2);
        assert_eq!(program.block_gas_cost(4), 1);
        assert_eq!(program.instruction_starts().collect::<Vec<_>>(), vec![0, 3, 4, 5]);
        assert_eq!(program.next_instruction(0), Some(3));
        assert_eq!(program.next_instruction(5), None);
        assert_eq!(program.operands(0, 2), &[0x00, 0x01]);
        assert_eq!(program.operands(5, 3), &[0, 0, 0]);
    }

    #[test]
    fn immediates_sign_extend() {
        assert_eq!(decode_immediate(&[]), 0);
        assert_eq!(decode_immediate(&[0x7f]), 0x7f);
        assert_eq!(decode_immediate(&[0xff]), u64::MAX);
        assert_eq!(decode_immediate(&[0x00, 0x80]), 0xffff_ffff_ffff_8000);
        assert_eq!(decode_immediate(&[1, 2, 3, 4, 5]), 0x0403_0201);
    }

    #[test]
    fn two_immediates_split_by_length_byte() {
        let (x, y) = decode_immediate2(&[0x01, 0xfe, 0xff], 0x01, 1, 1);
        assert_eq!(x, 1);
        assert_eq!(y, 0xffff_ffff_ffff_fffe);
        let (x, y) = decode_immediate2(&[0x05], 0x07, 1, 1);
        assert_eq!(x, 5);
        assert_eq!(y, 0);
    }
}
