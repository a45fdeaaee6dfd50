//! Standard program: memory layout header plus program code.

use crate::codec::read_fixed;
use crate::config::{PvmConfig, MAX_TOTAL_MEMORY};
use crate::error::StandardProgramError;
use crate::memory::StandardMemory;
use crate::parser::ProgramCode;
use crate::types::RegisterState;

/// A decoded standard program together with the argument it runs with.
#[derive(Clone, Debug)]
pub struct StandardProgram {
    config: PvmConfig,
    code: ProgramCode,
    read_only: Vec<u8>,
    read_write: Vec<u8>,
    heap_pages: u16,
    stack_size: u32,
    argument: Vec<u8>,
}

impl StandardProgram {
    pub fn new(blob: &[u8], argument: Option<&[u8]>) -> Result<Self, StandardProgramError> {
        Self::with_config(PvmConfig::default(), blob, argument)
    }

    /// Decode `roLen:3, rwLen:3, heapPages:2, stack:3, ro, rw, codeLen:4, code`.
    pub fn with_config(
        config: PvmConfig,
        blob: &[u8],
        argument: Option<&[u8]>,
    ) -> Result<Self, StandardProgramError> {
        let ro_len = read_fixed(blob, 0, 3).ok_or(StandardProgramError::InvalidReadOnlyLength)? as usize;
        let rw_len = read_fixed(blob, 3, 3).ok_or(StandardProgramError::InvalidReadWriteLength)? as usize;
        let heap_pages = read_fixed(blob, 6, 2).ok_or(StandardProgramError::InvalidHeapPages)? as u16;
        let stack_size = read_fixed(blob, 8, 3).ok_or(StandardProgramError::InvalidStackSize)? as u32;

        let mut offset = 11;
        let read_only = blob
            .get(offset..offset + ro_len)
            .ok_or(StandardProgramError::InvalidDataLength)?;
        offset += ro_len;
        let read_write = blob
            .get(offset..offset + rw_len)
            .ok_or(StandardProgramError::InvalidDataLength)?;
        offset += rw_len;

        let code_len = read_fixed(blob, offset, 4).ok_or(StandardProgramError::InvalidCodeLength)? as usize;
        offset += 4;
        let code_blob = blob
            .get(offset..offset + code_len)
            .ok_or(StandardProgramError::InvalidCodeLength)?;

        let zz = u64::from(config.zone_size);
        let heap_empty = u64::from(heap_pages) * u64::from(config.page_size);
        let zone = |size: u64| size.div_ceil(zz) * zz;
        let total = 5 * zz
            + zone(ro_len as u64)
            + zone(rw_len as u64 + heap_empty)
            + zone(u64::from(stack_size))
            + u64::from(config.input_size);
        if total > MAX_TOTAL_MEMORY {
            return Err(StandardProgramError::InvalidTotalMemorySize);
        }

        let argument = argument.unwrap_or_default();
        if argument.len() > config.input_size as usize {
            return Err(StandardProgramError::InvalidArgumentLength(argument.len()));
        }

        let code = ProgramCode::new(code_blob)?;
        Ok(Self {
            config,
            code,
            read_only: read_only.to_vec(),
            read_write: read_write.to_vec(),
            heap_pages,
            stack_size,
            argument: argument.to_vec(),
        })
    }

    #[must_use]
    pub const fn code(&self) -> &ProgramCode {
        &self.code
    }

    #[must_use]
    pub const fn config(&self) -> &PvmConfig {
        &self.config
    }

    #[must_use]
    pub fn read_only_data(&self) -> &[u8] {
        &self.read_only
    }

    #[must_use]
    pub fn read_write_data(&self) -> &[u8] {
        &self.read_write
    }

    #[must_use]
    pub const fn heap_pages(&self) -> u16 {
        self.heap_pages
    }

    #[must_use]
    pub const fn stack_size(&self) -> u32 {
        self.stack_size
    }

    #[must_use]
    pub fn argument_data(&self) -> &[u8] {
        &self.argument
    }

    /// r0 = halt address, r1 = stack base, r7 = argument base, r8 = argument length.
    #[must_use]
    pub fn initial_registers(&self) -> RegisterState {
        let mut registers = RegisterState::default();
        registers[0] = u64::from(crate::config::HALT_ADDRESS);
        registers[1] = u64::from(self.config.stack_base);
        registers[7] = u64::from(self.config.argument_base);
        registers[8] = self.argument.len() as u64;
        registers
    }

    pub fn initial_memory(&self) -> Result<StandardMemory, StandardProgramError> {
        Ok(StandardMemory::new(
            &self.config,
            &self.read_only,
            &self.read_write,
            &self.argument,
            u32::from(self.heap_pages).saturating_mul(self.config.page_size),
            self.stack_size,
        )?)
    }
}
