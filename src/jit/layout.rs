//! Rebasing of the sparse standard-program zones into one compact buffer.
//!
//! Standard programs place their zones gigabytes apart so stray offsets land in
//! unmapped space. Native code wants one flat buffer instead, so every zone that
//! is actually present is packed back to back starting at offset 0 and each
//! access is translated through [`JitMemoryLayout::translate`]. The heap is
//! packed last so `sbrk` can extend it without moving any other zone.

use crate::config::round_up;
use crate::error::JitError;
use crate::memory::{StandardMemory, ZoneKind};

/// Upper bound of a freshly packed buffer; anything larger means the layout went wrong.
/// Only heap growth through [`JitMemoryLayout::extend_tail`] may pass it.
pub const MAX_JIT_BUFFER_SIZE: u64 = 1 << 30;

/// One rebased zone: `[original_base, original_base + size)` lives at `rebased_offset`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JitZone {
    pub kind: ZoneKind,
    pub original_base: u32,
    pub size: u32,
    pub rebased_offset: u32,
}

impl JitZone {
    #[must_use]
    pub const fn contains(&self, address: u32) -> bool {
        address >= self.original_base && (address - self.original_base) < self.size
    }

    /// Exclusive end in the logical address space.
    #[must_use]
    pub const fn original_end(&self) -> u64 {
        self.original_base as u64 + self.size as u64
    }

    /// Offset of `address` in the flat buffer; the caller checks [`Self::contains`].
    #[must_use]
    pub const fn translate(&self, address: u32) -> u32 {
        self.rebased_offset + (address - self.original_base)
    }
}

/// Zones ordered by rebased offset, the first one at offset 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JitMemoryLayout {
    zones: Vec<JitZone>,
    total_size: u32,
    alignment: u32,
}

impl JitMemoryLayout {
    /// Layout of every non-empty zone of `memory`, aligned to its page size.
    /// Zones keep their address order except the heap, which goes last.
    pub fn new(memory: &StandardMemory) -> Result<Self, JitError> {
        let mut zones = memory.zones();
        zones.sort_by_key(|zone| zone.kind() == ZoneKind::Heap);
        let extents: Vec<_> = zones
            .iter()
            .map(|zone| (zone.kind(), zone.start(), zone.mapped_end() - zone.start()))
            .collect();
        Self::from_extents(&extents, memory.config().page_size)
    }

    /// Pack `(kind, base, size)` extents in the given order. Empty extents are skipped.
    pub fn from_extents(extents: &[(ZoneKind, u32, u32)], alignment: u32) -> Result<Self, JitError> {
        let mut zones = Vec::with_capacity(extents.len());
        let mut offset = 0u64;
        for &(kind, original_base, size) in extents.iter().filter(|(_, _, size)| *size > 0) {
            let rebased_offset = u32::try_from(offset).map_err(|_| JitError::LayoutTooLarge(offset))?;
            zones.push(JitZone {
                kind,
                original_base,
                size,
                rebased_offset,
            });
            offset += u64::from(round_up(size, alignment));
        }
        if offset > MAX_JIT_BUFFER_SIZE {
            return Err(JitError::LayoutTooLarge(offset));
        }
        Ok(Self {
            zones,
            // bounded by MAX_JIT_BUFFER_SIZE
            total_size: offset as u32,
            alignment,
        })
    }

    /// Flat-buffer offset of `address`, or `None` outside every zone.
    #[must_use]
    pub fn translate(&self, address: u32) -> Option<u32> {
        self.zone_for(address).map(|zone| zone.translate(address))
    }

    #[must_use]
    pub fn zone_for(&self, address: u32) -> Option<&JitZone> {
        self.zones.iter().find(|zone| zone.contains(address))
    }

    #[must_use]
    pub fn zone(&self, kind: ZoneKind) -> Option<&JitZone> {
        self.zones.iter().find(|zone| zone.kind == kind)
    }

    #[must_use]
    pub fn zones(&self) -> &[JitZone] {
        &self.zones
    }

    #[must_use]
    pub const fn total_size(&self) -> u32 {
        self.total_size
    }

    #[must_use]
    pub const fn alignment(&self) -> u32 {
        self.alignment
    }

    /// Grow the last zone to `size` bytes, or append it when `kind` is absent.
    /// No other zone moves.
    pub fn extend_tail(&mut self, kind: ZoneKind, original_base: u32, size: u32) -> Result<(), JitError> {
        let existing = match self.zones.iter().position(|zone| zone.kind == kind) {
            Some(index) if index + 1 != self.zones.len() => return Err(JitError::ZoneNotAtTail(kind)),
            existing => existing,
        };
        let rebased_offset = existing.map_or(self.total_size, |index| self.zones[index].rebased_offset);
        let end = u64::from(rebased_offset) + u64::from(round_up(size, self.alignment));
        let total_size = u32::try_from(end).map_err(|_| JitError::LayoutTooLarge(end))?;
        match existing {
            Some(index) => self.zones[index].size = size,
            None => self.zones.push(JitZone {
                kind,
                original_base,
                size,
                rebased_offset,
            }),
        }
        self.total_size = total_size;
        Ok(())
    }
}
