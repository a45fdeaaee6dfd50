//! General memory: an explicit page map over a single sparse zone.
//!
//! Backs programs run from raw code through [`Engine`](crate::interpreter::Engine)
//! or [`JitExecutor::execute_code`](crate::jit::JitExecutor::execute_code),
//! where the embedder reprotects pages with [`GeneralMemory::pages`] between
//! host calls. Standard programs use [`StandardMemory`](crate::memory::StandardMemory).

use tracing::debug;

use crate::config::PAGE_SIZE;
use crate::error::MemoryError;
use crate::memory::page_map::{PageAccess, PageMap};
use crate::memory::zone::{MemoryChunk, MemoryZone};
use crate::memory::Memory;

/// Page-level access change requested through `pages`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PagesVariant {
    /// 0: remove access and zero.
    Void,
    /// 1: zero and mark read-only.
    ZeroReadOnly,
    /// 2: zero and mark read-write.
    ZeroReadWrite,
    /// 3: mark read-only, keep contents.
    ReadOnly,
    /// 4: mark read-write, keep contents.
    ReadWrite,
}

impl PagesVariant {
    #[must_use]
    pub const fn from_u64(value: u64) -> Option<Self> {
        match value {
            0 => Some(Self::Void),
            1 => Some(Self::ZeroReadOnly),
            2 => Some(Self::ZeroReadWrite),
            3 => Some(Self::ReadOnly),
            4 => Some(Self::ReadWrite),
            _ => None,
        }
    }

    const fn zeroes(self) -> bool {
        matches!(self, Self::Void | Self::ZeroReadOnly | Self::ZeroReadWrite)
    }
}

/// Embedder-managed memory: `(address, length, writable)` pages plus explicit chunks.
#[derive(Clone, Debug)]
pub struct GeneralMemory {
    page_map: PageMap,
    zone: MemoryZone,
}

impl GeneralMemory {
    pub fn new(pages: &[(u32, u32, bool)], chunks: Vec<(u32, Vec<u8>)>) -> Result<Self, MemoryError> {
        let entries: Vec<(u32, u32, PageAccess)> = pages
            .iter()
            .map(|&(address, length, writable)| {
                let access = if writable {
                    PageAccess::ReadWrite
                } else {
                    PageAccess::ReadOnly
                };
                (address, length, access)
            })
            .collect();
        let mut chunks = chunks
            .into_iter()
            .map(|(address, data)| MemoryChunk::new(address, data))
            .collect::<Result<Vec<_>, _>>()?;
        chunks.sort_by_key(MemoryChunk::start);
        Ok(Self {
            page_map: PageMap::with_entries(PAGE_SIZE, &entries),
            zone: MemoryZone::new(0, u32::MAX, chunks)?,
        })
    }

    #[must_use]
    pub fn chunks(&self) -> &[MemoryChunk] {
        self.zone.chunks()
    }

    /// Reprotect `pages` pages starting at `page_index`.
    pub fn pages(&mut self, page_index: u32, pages: u32, variant: PagesVariant) -> Result<(), MemoryError> {
        debug!(page_index, pages, ?variant, "pages");
        match variant {
            PagesVariant::Void => self.page_map.remove_access_pages(page_index, pages),
            PagesVariant::ZeroReadOnly | PagesVariant::ReadOnly => {
                self.page_map.update_pages(page_index, pages, PageAccess::ReadOnly);
            }
            PagesVariant::ZeroReadWrite | PagesVariant::ReadWrite => {
                self.page_map.update_pages(page_index, pages, PageAccess::ReadWrite);
            }
        }
        if variant.zeroes() {
            self.zone.zero(page_index, pages, self.page_map.page_size())?;
        }
        Ok(())
    }

    /// Zero the pages and make them read-write.
    pub fn zero(&mut self, page_index: u32, pages: u32) -> Result<(), MemoryError> {
        self.pages(page_index, pages, PagesVariant::ZeroReadWrite)
    }

    /// Remove all access to the pages.
    pub fn void(&mut self, page_index: u32, pages: u32) -> Result<(), MemoryError> {
        self.pages(page_index, pages, PagesVariant::Void)
    }
}

impl Memory for GeneralMemory {
    fn page_map(&self) -> &PageMap {
        &self.page_map
    }

    fn read_into(&self, address: u32, out: &mut [u8]) -> Result<(), MemoryError> {
        self.ensure_readable(address, out.len())?;
        self.zone.read_into(address, out)
    }

    fn write(&mut self, address: u32, values: &[u8]) -> Result<(), MemoryError> {
        self.ensure_writable(address, values.len())?;
        self.zone.write(address, values)
    }

    /// Map a fresh read-write gap large enough for `increment` bytes; returns its address.
    fn sbrk(&mut self, increment: u32) -> Result<u32, MemoryError> {
        let page_size = self.page_map.page_size();
        let pages = increment.div_ceil(page_size);
        let page = self.page_map.find_gap(pages)?;
        self.page_map.update_pages(page, pages, PageAccess::ReadWrite);
        Ok(page * page_size)
    }
}
