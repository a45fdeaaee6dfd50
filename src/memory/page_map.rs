//! Per-page read/write permission bitsets.

use crate::config::RESERVED_MEMORY_END;
use crate::error::MemoryError;

/// Access granted to a page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageAccess {
    ReadOnly,
    ReadWrite,
}

impl PageAccess {
    #[must_use]
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::ReadWrite)
    }
}

/// Readable and writable bits, one per page, packed into u64 words.
#[derive(Clone, Debug)]
pub struct PageMap {
    page_size: u32,
    page_shift: u32,
    readable: Vec<u64>,
    writable: Vec<u64>,
}

impl PageMap {
    /// `page_size` must be a power of two.
    #[must_use]
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            page_shift: page_size.trailing_zeros(),
            readable: Vec::new(),
            writable: Vec::new(),
        }
    }

    /// Build from `(address, length, access)` entries.
    #[must_use]
    pub fn with_entries(page_size: u32, entries: &[(u32, u32, PageAccess)]) -> Self {
        let mut map = Self::new(page_size);
        for &(address, length, access) in entries {
            map.update(address, length as usize, access);
        }
        map
    }

    #[must_use]
    pub const fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Number of pages touched by `[address, address + length)`.
    #[must_use]
    pub fn pages_spanned(&self, address: u32, length: usize) -> u64 {
        if length == 0 {
            return 0;
        }
        let last = (u64::from(address) + length as u64 - 1).min(u64::from(u32::MAX));
        (last >> self.page_shift) - u64::from(address >> self.page_shift) + 1
    }

    fn ensure_capacity(&mut self, end_page: u64) {
        let words = end_page.div_ceil(64) as usize;
        if words > self.readable.len() {
            self.readable.resize(words, 0);
            self.writable.resize(words, 0);
        }
    }

    fn modify_range(&mut self, start: u64, count: u64, mut f: impl FnMut(&mut u64, &mut u64, u64)) {
        let end = start + count;
        let mut page = start;
        while page < end {
            let word = (page / 64) as usize;
            let (mask, span) = word_mask(page, end);
            if let (Some(r), Some(w)) = (self.readable.get_mut(word), self.writable.get_mut(word)) {
                f(r, w, mask);
            }
            page += span;
        }
    }

    pub fn update_pages(&mut self, page_index: u32, pages: u32, access: PageAccess) {
        let start = u64::from(page_index);
        let count = u64::from(pages);
        if count == 0 {
            return;
        }
        self.ensure_capacity(start + count);
        self.modify_range(start, count, |r, w, mask| {
            *r |= mask;
            if access.is_writable() {
                *w |= mask;
            } else {
                *w &= !mask;
            }
        });
    }

    pub fn update(&mut self, address: u32, length: usize, access: PageAccess) {
        let pages = self.pages_spanned(address, length);
        self.update_pages(address >> self.page_shift, pages as u32, access);
    }

    pub fn remove_access_pages(&mut self, page_index: u32, pages: u32) {
        self.modify_range(u64::from(page_index), u64::from(pages), |r, w, mask| {
            *r &= !mask;
            *w &= !mask;
        });
    }

    pub fn remove_access(&mut self, address: u32, length: usize) {
        let pages = self.pages_spanned(address, length);
        self.remove_access_pages(address >> self.page_shift, pages.min(u64::from(u32::MAX)) as u32);
    }

    /// First page of the range lacking read access, as an address.
    #[must_use]
    pub fn first_unreadable(&self, address: u32, length: usize) -> Option<u32> {
        let pages = self.pages_spanned(address, length);
        first_clear(&self.readable, u64::from(address >> self.page_shift), pages)
            .map(|page| page << self.page_shift)
    }

    /// First page of the range lacking write access, as an address.
    #[must_use]
    pub fn first_unwritable(&self, address: u32, length: usize) -> Option<u32> {
        let pages = self.pages_spanned(address, length);
        first_clear(&self.writable, u64::from(address >> self.page_shift), pages)
            .map(|page| page << self.page_shift)
    }

    pub fn ensure_readable(&self, address: u32, length: usize) -> Result<(), MemoryError> {
        self.first_unreadable(address, length)
            .map_or(Ok(()), |page| Err(MemoryError::NotReadable(page)))
    }

    pub fn ensure_writable(&self, address: u32, length: usize) -> Result<(), MemoryError> {
        self.first_unwritable(address, length)
            .map_or(Ok(()), |page| Err(MemoryError::NotWritable(page)))
    }

    #[must_use]
    pub fn is_readable_pages(&self, page_index: u32, pages: u32) -> bool {
        first_clear(&self.readable, u64::from(page_index), u64::from(pages)).is_none()
    }

    #[must_use]
    pub fn is_writable_pages(&self, page_index: u32, pages: u32) -> bool {
        first_clear(&self.writable, u64::from(page_index), u64::from(pages)).is_none()
    }

    fn is_occupied(&self, page: u64) -> bool {
        let word = (page / 64) as usize;
        let bit = 1u64 << (page % 64);
        let r = self.readable.get(word).copied().unwrap_or(0);
        let w = self.writable.get(word).copied().unwrap_or(0);
        (r | w) & bit != 0
    }

    /// First run of `pages` inaccessible pages above the reserved low region.
    pub fn find_gap(&self, pages: u32) -> Result<u32, MemoryError> {
        let needed = u64::from(pages.max(1));
        let first = u64::from(RESERVED_MEMORY_END >> self.page_shift);
        let total_pages = 1u64 << (32 - self.page_shift);
        let known = self.readable.len() as u64 * 64;
        let limit = (known + needed + 64).min(total_pages);

        let mut run_start = first;
        let mut run_len = 0u64;
        for page in first..limit {
            if self.is_occupied(page) {
                run_start = page + 1;
                run_len = 0;
                continue;
            }
            run_len += 1;
            if run_len >= needed {
                return Ok(run_start as u32);
            }
        }
        Err(MemoryError::OutOfMemory(0))
    }
}

/// Mask for the pages of `[page, end)` within `page`'s word, and how many pages it covers.
fn word_mask(page: u64, end: u64) -> (u64, u64) {
    let bit = page % 64;
    let span = (64 - bit).min(end - page);
    let mask = if span == 64 {
        u64::MAX
    } else {
        ((1u64 << span) - 1) << bit
    };
    (mask, span)
}

fn first_clear(bits: &[u64], start: u64, count: u64) -> Option<u32> {
    let end = start + count;
    let mut page = start;
    while page < end {
        let word = (page / 64) as usize;
        let (mask, span) = word_mask(page, end);
        let missing = !bits.get(word).copied().unwrap_or(0) & mask;
        if missing != 0 {
            return Some((word as u64 * 64 + u64::from(missing.trailing_zeros())) as u32);
        }
        page += span;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_and_check_ranges() {
        let mut map = PageMap::new(4096);
        map.update(0x1_0000, 8192, PageAccess::ReadOnly);
        assert!(map.ensure_readable(0x1_0000, 8192).is_ok());
        assert_eq!(map.ensure_writable(0x1_0000, 1), Err(MemoryError::NotWritable(0x1_0000)));
        assert_eq!(map.ensure_readable(0x1_1fff, 2), Err(MemoryError::NotReadable(0x1_2000)));
        assert!(map.ensure_readable(0, 0).is_ok());
    }

    #[test]
    fn ranges_across_word_boundaries() {
        let mut map = PageMap::new(4096);
        map.update_pages(60, 10, PageAccess::ReadWrite);
        assert!(map.is_writable_pages(60, 10));
        assert!(!map.is_readable_pages(59, 2));
        assert_eq!(map.first_unreadable(60 * 4096, 11 * 4096), Some(70 * 4096));
        map.remove_access_pages(63, 2);
        assert_eq!(map.first_unwritable(60 * 4096, 10 * 4096), Some(63 * 4096));
        assert!(map.is_readable_pages(65, 5));
    }

    #[test]
    fn downgrade_to_read_only() {
        let mut map = PageMap::new(4096);
        map.update_pages(20, 4, PageAccess::ReadWrite);
        map.update_pages(21, 1, PageAccess::ReadOnly);
        assert!(map.is_readable_pages(20, 4));
        assert!(!map.is_writable_pages(20, 4));
        assert!(map.is_writable_pages(22, 2));
    }

    #[test]
    fn span_near_address_space_end() {
        let map = PageMap::new(4096);
        assert_eq!(map.pages_spanned(u32::MAX, 16), 1);
        assert_eq!(map.pages_spanned(0xffff_f000, 4096), 1);
        assert_eq!(map.first_unreadable(u32::MAX - 1, 8), Some(0xffff_f000));
    }

    #[test]
    fn gap_search_skips_occupied_pages() {
        let mut map = PageMap::new(4096);
        assert_eq!(map.find_gap(3), Ok(16));
        map.update_pages(16, 2, PageAccess::ReadOnly);
        map.update_pages(19, 1, PageAccess::ReadWrite);
        assert_eq!(map.find_gap(1), Ok(18));
        assert_eq!(map.find_gap(2), Ok(20));
    }
}
