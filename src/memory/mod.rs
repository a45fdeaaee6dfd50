//! Page-permissioned memory models.

mod general;
mod page_map;
mod standard;
mod zone;

pub use general::{GeneralMemory, PagesVariant};
pub use page_map::{PageAccess, PageMap};
pub use standard::{StandardMemory, StandardZone, ZoneKind};
pub use zone::{MemoryChunk, MemoryZone};

use crate::error::MemoryError;

/// Byte-addressable memory guarded by a page map.
pub trait Memory: Send {
    fn page_map(&self) -> &PageMap;

    /// Fill `out` from `address`; fails without side effects if any page is unreadable.
    fn read_into(&self, address: u32, out: &mut [u8]) -> Result<(), MemoryError>;

    fn write(&mut self, address: u32, values: &[u8]) -> Result<(), MemoryError>;

    /// Grow the heap by `increment` bytes and return the previous end.
    fn sbrk(&mut self, increment: u32) -> Result<u32, MemoryError>;

    fn read(&self, address: u32, length: usize) -> Result<Vec<u8>, MemoryError> {
        let mut out = vec![0u8; length];
        self.read_into(address, &mut out)?;
        Ok(out)
    }

    fn is_readable(&self, address: u32, length: usize) -> bool {
        length == 0 || self.page_map().first_unreadable(address, length).is_none()
    }

    fn is_writable(&self, address: u32, length: usize) -> bool {
        length == 0 || self.page_map().first_unwritable(address, length).is_none()
    }

    fn ensure_readable(&self, address: u32, length: usize) -> Result<(), MemoryError> {
        self.page_map().ensure_readable(address, length)
    }

    fn ensure_writable(&self, address: u32, length: usize) -> Result<(), MemoryError> {
        self.page_map().ensure_writable(address, length)
    }
}
