//! Standard program memory: read-only, heap, stack and argument zones.

use tracing::trace;

use crate::config::PvmConfig;
use crate::error::MemoryError;
use crate::memory::page_map::{PageAccess, PageMap};
use crate::memory::Memory;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ZoneKind {
    ReadOnly,
    Heap,
    Stack,
    Argument,
}

/// One contiguous zone backed by a flat buffer. Bytes past `data` read as zero.
#[derive(Clone, Debug)]
pub struct StandardZone {
    kind: ZoneKind,
    start: u32,
    end: u32,
    mapped_end: u32,
    data: Vec<u8>,
}

impl StandardZone {
    fn new(kind: ZoneKind, start: u32, end: u32, data: &[u8], config: &PvmConfig) -> Result<Self, MemoryError> {
        let mapped_end = u32::try_from(u64::from(start) + u64::from(config.align_to_page(end - start)))
            .map_err(|_| MemoryError::InvalidZone(start))?;
        Ok(Self {
            kind,
            start,
            end,
            mapped_end,
            data: data.to_vec(),
        })
    }

    #[must_use]
    pub const fn kind(&self) -> ZoneKind {
        self.kind
    }

    #[must_use]
    pub const fn start(&self) -> u32 {
        self.start
    }

    /// Logical end; for the heap this is the current break.
    #[must_use]
    pub const fn end(&self) -> u32 {
        self.end
    }

    /// End of the last page the zone maps.
    #[must_use]
    pub const fn mapped_end(&self) -> u32 {
        self.mapped_end
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub const fn contains(&self, address: u32) -> bool {
        address >= self.start && address < self.mapped_end
    }

    fn read_into(&self, address: u32, out: &mut [u8]) -> Result<(), MemoryError> {
        if u64::from(address) + out.len() as u64 > u64::from(self.mapped_end) {
            return Err(MemoryError::ExceedZoneBoundary(self.mapped_end));
        }
        let offset = (address - self.start) as usize;
        let available = self.data.len().saturating_sub(offset).min(out.len());
        if available > 0 {
            out[..available].copy_from_slice(&self.data[offset..offset + available]);
        }
        out[available..].fill(0);
        Ok(())
    }

    fn write(&mut self, address: u32, values: &[u8]) -> Result<(), MemoryError> {
        if u64::from(address) + values.len() as u64 > u64::from(self.mapped_end) {
            return Err(MemoryError::ExceedZoneBoundary(self.mapped_end));
        }
        let offset = (address - self.start) as usize;
        if self.data.len() < offset + values.len() {
            self.data.resize(offset + values.len(), 0);
        }
        self.data[offset..offset + values.len()].copy_from_slice(values);
        Ok(())
    }
}

/// Memory of a standard program.
#[derive(Clone, Debug)]
pub struct StandardMemory {
    config: PvmConfig,
    page_map: PageMap,
    read_only: StandardZone,
    heap: StandardZone,
    stack: StandardZone,
    argument: StandardZone,
}

impl StandardMemory {
    /// `heap_empty_size` is the byte size of the extra zeroed heap pages.
    ///
    /// Fails with [`MemoryError::InvalidZone`] naming the zone base when a zone
    /// would not fit in the 32-bit address space.
    pub fn new(
        config: &PvmConfig,
        read_only: &[u8],
        read_write: &[u8],
        argument: &[u8],
        heap_empty_size: u32,
        stack_size: u32,
    ) -> Result<Self, MemoryError> {
        let zz = config.zone_size;
        let length = |data: &[u8], base: u32| u32::try_from(data.len()).map_err(|_| MemoryError::InvalidZone(base));
        let ro_len = config.align_to_page(length(read_only, zz)?);
        let heap_start = config
            .align_to_zone(length(read_only, zz)?)
            .checked_add(2 * zz)
            .ok_or(MemoryError::InvalidZone(zz))?;
        let rw_len = config.align_to_page(length(read_write, heap_start)?);
        let heap_end = heap_start
            .checked_add(rw_len)
            .and_then(|end| end.checked_add(heap_empty_size))
            .ok_or(MemoryError::InvalidZone(heap_start))?;
        let stack_len = config.align_to_page(stack_size);
        let stack_start = config
            .stack_base
            .checked_sub(stack_len)
            .filter(|&start| start >= heap_end)
            .ok_or(MemoryError::InvalidZone(config.stack_base))?;
        let arg_len = config.align_to_page(length(argument, config.argument_base)?);
        let arg_end = config
            .argument_base
            .checked_add(arg_len)
            .ok_or(MemoryError::InvalidZone(config.argument_base))?;

        let page_map = PageMap::with_entries(
            config.page_size,
            &[
                (zz, ro_len, PageAccess::ReadOnly),
                (heap_start, rw_len + heap_empty_size, PageAccess::ReadWrite),
                (stack_start, stack_len, PageAccess::ReadWrite),
                (config.argument_base, arg_len, PageAccess::ReadOnly),
            ],
        );

        Ok(Self {
            read_only: StandardZone::new(ZoneKind::ReadOnly, zz, zz + ro_len, read_only, config)?,
            heap: StandardZone::new(ZoneKind::Heap, heap_start, heap_end, read_write, config)?,
            stack: StandardZone::new(ZoneKind::Stack, stack_start, config.stack_base, &[], config)?,
            argument: StandardZone::new(ZoneKind::Argument, config.argument_base, arg_end, argument, config)?,
            config: config.clone(),
            page_map,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &PvmConfig {
        &self.config
    }

    #[must_use]
    pub const fn heap_end(&self) -> u32 {
        self.heap.end
    }

    /// Highest address the heap may grow to.
    #[must_use]
    pub const fn heap_limit(&self) -> u32 {
        self.stack.start.saturating_sub(self.config.zone_size)
    }

    /// Zones in address order.
    #[must_use]
    pub const fn zones(&self) -> [&StandardZone; 4] {
        [&self.read_only, &self.heap, &self.stack, &self.argument]
    }

    #[must_use]
    pub const fn zone(&self, kind: ZoneKind) -> &StandardZone {
        match kind {
            ZoneKind::ReadOnly => &self.read_only,
            ZoneKind::Heap => &self.heap,
            ZoneKind::Stack => &self.stack,
            ZoneKind::Argument => &self.argument,
        }
    }

    fn zone_for(&self, address: u32) -> Result<&StandardZone, MemoryError> {
        [&self.stack, &self.heap, &self.read_only, &self.argument]
            .into_iter()
            .find(|zone| zone.contains(address))
            .ok_or(MemoryError::ZoneNotFound(address))
    }

    fn zone_for_mut(&mut self, address: u32) -> Result<&mut StandardZone, MemoryError> {
        [&mut self.stack, &mut self.heap, &mut self.read_only, &mut self.argument]
            .into_iter()
            .find(|zone| zone.contains(address))
            .ok_or(MemoryError::ZoneNotFound(address))
    }
}

impl Memory for StandardMemory {
    fn page_map(&self) -> &PageMap {
        &self.page_map
    }

    fn read_into(&self, address: u32, out: &mut [u8]) -> Result<(), MemoryError> {
        if out.is_empty() {
            return Ok(());
        }
        self.ensure_readable(address, out.len())?;
        self.zone_for(address)?.read_into(address, out)
    }

    fn write(&mut self, address: u32, values: &[u8]) -> Result<(), MemoryError> {
        if values.is_empty() {
            return Ok(());
        }
        self.ensure_writable(address, values.len())?;
        self.zone_for_mut(address)?.write(address, values)
    }

    fn sbrk(&mut self, increment: u32) -> Result<u32, MemoryError> {
        let previous = self.heap.end;
        if increment == 0 {
            return Ok(previous);
        }
        let new_end = previous
            .checked_add(increment)
            .filter(|&end| end <= self.heap_limit())
            .ok_or(MemoryError::OutOfMemory(previous))?;

        let page_size = self.config.page_size;
        let mapped = self.config.align_to_page(previous);
        let new_mapped = self.config.align_to_page(new_end);
        if new_mapped > mapped {
            self.page_map
                .update_pages(mapped / page_size, (new_mapped - mapped) / page_size, PageAccess::ReadWrite);
        }
        self.heap.end = new_end;
        self.heap.mapped_end = self.heap.mapped_end.max(new_mapped);
        trace!(previous, new_end, "sbrk");
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> StandardMemory {
        StandardMemory::new(&PvmConfig::default(), &[1, 2, 3], &[4, 5], &[6, 7, 8, 9], 4096, 8192).unwrap()
    }

    #[test]
    fn zone_layout() {
        let m = memory();
        assert_eq!(m.zone(ZoneKind::ReadOnly).start(), 0x1_0000);
        assert_eq!(m.zone(ZoneKind::ReadOnly).end(), 0x1_1000);
        assert_eq!(m.zone(ZoneKind::Heap).start(), 0x3_0000);
        assert_eq!(m.heap_end(), 0x3_2000);
        assert_eq!(m.zone(ZoneKind::Stack).start(), 0xFEFE_0000 - 8192);
        assert_eq!(m.zone(ZoneKind::Argument).start(), 0xFEFF_0000);
        let starts: Vec<u32> = m.zones().iter().map(|z| z.start()).collect();
        assert!(starts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn reads_initial_data_and_zero_tail() {
        let m = memory();
        assert_eq!(m.read(0x1_0000, 5).unwrap(), vec![1, 2, 3, 0, 0]);
        assert_eq!(m.read(0x3_0000, 3).unwrap(), vec![4, 5, 0]);
        assert_eq!(m.read(0xFEFF_0000, 4).unwrap(), vec![6, 7, 8, 9]);
        assert_eq!(m.read(0xFEFE_0000 - 4, 4).unwrap(), vec![0; 4]);
    }

    #[test]
    fn permissions_are_enforced() {
        let mut m = memory();
        assert_eq!(m.write(0x1_0000, &[1]).unwrap_err(), MemoryError::NotWritable(0x1_0000));
        assert_eq!(m.write(0xFEFF_0000, &[1]).unwrap_err(), MemoryError::NotWritable(0xFEFF_0000));
        assert_eq!(m.read(0x2_0000, 1).unwrap_err(), MemoryError::NotReadable(0x2_0000));
        assert_eq!(m.read(0x1_0ffc, 8).unwrap_err(), MemoryError::NotReadable(0x1_1000));
        m.write(0xFEFE_0000 - 8, &[0xaa; 8]).unwrap();
        assert_eq!(m.read(0xFEFE_0000 - 8, 8).unwrap(), vec![0xaa; 8]);
        m.write(0x3_1000, &[0xbb]).unwrap();
        assert_eq!(m.read(0x3_0ffe, 3).unwrap(), vec![0, 0, 0xbb]);
    }

    #[test]
    fn sbrk_extends_heap_by_pages() {
        let mut m = memory();
        assert_eq!(m.sbrk(0).unwrap(), 0x3_2000);
        assert_eq!(m.sbrk(10).unwrap(), 0x3_2000);
        assert_eq!(m.heap_end(), 0x3_200a);
        assert!(m.is_writable(0x3_2000, 4096));
        assert!(!m.is_writable(0x3_3000, 1));
        m.write(0x3_2fff, &[1]).unwrap();
        assert_eq!(m.sbrk(4096).unwrap(), 0x3_200a);
        assert!(m.is_writable(0x3_3000, 4096));
    }

    #[test]
    fn sbrk_stops_below_stack() {
        let mut m = memory();
        let limit = m.heap_limit();
        let room = limit - m.heap_end();
        assert_eq!(m.sbrk(room + 1).unwrap_err(), MemoryError::OutOfMemory(0x3_2000));
        assert_eq!(m.sbrk(room).unwrap(), 0x3_2000);
        assert_eq!(m.heap_end(), limit);
        assert!(m.sbrk(1).is_err());
    }

    #[test]
    fn zones_past_the_address_space_are_rejected() {
        let config = PvmConfig::default();
        assert_eq!(
            StandardMemory::new(&config, &[], &[], &vec![0; 0x0102_0000], 0, 4096).unwrap_err(),
            MemoryError::InvalidZone(0xFEFF_0000)
        );
        assert_eq!(
            StandardMemory::new(&config, &[], &[], &[], u32::MAX - 0x1_0000, 4096).unwrap_err(),
            MemoryError::InvalidZone(0x2_0000)
        );
    }
}
