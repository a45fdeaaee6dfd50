//! Flat-buffer memory addressed through a [`JitMemoryLayout`].

use tracing::{debug, trace};

use crate::error::{JitError, MemoryError};
use crate::jit::layout::JitMemoryLayout;
use crate::memory::{Memory, PageAccess, PageMap, StandardMemory, ZoneKind};

/// Standard-program memory rebased into one contiguous buffer.
///
/// Permissions are still checked against the logical page map, so faults name
/// the same addresses the interpreter reports. Only a prefix of the buffer is
/// backed; bytes past it read as zero until written.
#[derive(Clone, Debug)]
pub struct JitMemory {
    layout: JitMemoryLayout,
    buffer: Vec<u8>,
    page_map: PageMap,
    heap_start: u32,
    heap_end: u32,
    heap_limit: u32,
}

impl JitMemory {
    pub fn new(memory: &StandardMemory) -> Result<Self, JitError> {
        let layout = JitMemoryLayout::new(memory)?;
        let mut buffer = vec![0u8; layout.total_size() as usize];
        for source in memory.zones() {
            if let Some(zone) = layout.zone(source.kind()) {
                let offset = zone.rebased_offset as usize;
                let data = &source.data()[..source.data().len().min(zone.size as usize)];
                buffer[offset..offset + data.len()].copy_from_slice(data);
            }
        }
        debug!(
            zones = layout.zones().len(),
            total_size = layout.total_size(),
            "jit memory laid out"
        );
        let heap = memory.zone(ZoneKind::Heap);
        Ok(Self {
            buffer,
            page_map: memory.page_map().clone(),
            heap_start: heap.start(),
            heap_end: heap.end(),
            heap_limit: memory.heap_limit(),
            layout,
        })
    }

    #[must_use]
    pub const fn layout(&self) -> &JitMemoryLayout {
        &self.layout
    }

    /// Backed prefix of the flat buffer.
    #[must_use]
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    #[must_use]
    pub const fn heap_end(&self) -> u32 {
        self.heap_end
    }

    /// Buffer offset of `[address, address + length)`, which must sit inside one zone.
    fn flat_offset(&self, address: u32, length: usize) -> Result<usize, MemoryError> {
        let zone = self
            .layout
            .zone_for(address)
            .ok_or(MemoryError::ZoneNotFound(address))?;
        if u64::from(address) + length as u64 > zone.original_end() {
            return Err(MemoryError::ExceedZoneBoundary(address));
        }
        Ok(zone.translate(address) as usize)
    }
}

impl Memory for JitMemory {
    fn page_map(&self) -> &PageMap {
        &self.page_map
    }

    fn read_into(&self, address: u32, out: &mut [u8]) -> Result<(), MemoryError> {
        if out.is_empty() {
            return Ok(());
        }
        self.ensure_readable(address, out.len())?;
        let offset = self.flat_offset(address, out.len())?;
        let available = self.buffer.len().saturating_sub(offset).min(out.len());
        if available > 0 {
            out[..available].copy_from_slice(&self.buffer[offset..offset + available]);
        }
        out[available..].fill(0);
        Ok(())
    }

    fn write(&mut self, address: u32, values: &[u8]) -> Result<(), MemoryError> {
        if values.is_empty() {
            return Ok(());
        }
        self.ensure_writable(address, values.len())?;
        let offset = self.flat_offset(address, values.len())?;
        let end = offset + values.len();
        if self.buffer.len() < end {
            self.buffer.resize(end, 0);
        }
        self.buffer[offset..end].copy_from_slice(values);
        Ok(())
    }

    fn sbrk(&mut self, increment: u32) -> Result<u32, MemoryError> {
        let previous = self.heap_end;
        if increment == 0 {
            return Ok(previous);
        }
        let new_end = previous
            .checked_add(increment)
            .filter(|&end| end <= self.heap_limit)
            .ok_or(MemoryError::OutOfMemory(previous))?;

        let page_size = self.page_map.page_size();
        let mapped = self.layout.zone(ZoneKind::Heap).map_or(self.heap_start, |zone| {
            zone.original_base + zone.size
        });
        let new_mapped = crate::config::round_up(new_end, page_size);
        if new_mapped > mapped {
            self.layout
                .extend_tail(ZoneKind::Heap, self.heap_start, new_mapped - self.heap_start)
                .map_err(|e| {
                    debug!(error = %e, new_end, "jit heap growth rejected");
                    MemoryError::OutOfMemory(previous)
                })?;
            trace!(new_end, total_size = self.layout.total_size(), "jit heap grown");
            self.page_map
                .update_pages(mapped / page_size, (new_mapped - mapped) / page_size, PageAccess::ReadWrite);
        }
        self.heap_end = new_end;
        Ok(previous)
    }
}
