//! Sparse zones made of sorted, non-overlapping byte chunks.

use crate::error::MemoryError;

/// Contiguous run of bytes starting at `start`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryChunk {
    start: u32,
    data: Vec<u8>,
}

impl MemoryChunk {
    pub fn new(start: u32, data: Vec<u8>) -> Result<Self, MemoryError> {
        if u64::from(start) + data.len() as u64 > u64::from(u32::MAX) {
            return Err(MemoryError::InvalidChunk(start));
        }
        Ok(Self { start, data })
    }

    #[must_use]
    pub const fn start(&self) -> u32 {
        self.start
    }

    /// Exclusive end address.
    #[must_use]
    pub fn end(&self) -> u32 {
        self.start + self.data.len() as u32
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Append a chunk that starts exactly at this chunk's end.
    pub fn append(&mut self, other: &Self) -> Result<(), MemoryError> {
        if self.end() != other.start {
            return Err(MemoryError::NotAdjacent(other.start));
        }
        if u64::from(other.start) + other.data.len() as u64 > u64::from(u32::MAX) {
            return Err(MemoryError::OutOfMemory(self.end()));
        }
        self.data.extend_from_slice(&other.data);
        Ok(())
    }

    /// Grow with zeros until the chunk ends at `address`.
    pub fn zero_extend(&mut self, address: u32) -> Result<(), MemoryError> {
        if address < self.end() {
            return Err(MemoryError::OutOfMemory(self.end()));
        }
        self.data.resize((address - self.start) as usize, 0);
        Ok(())
    }

    fn contains_range(&self, address: u32, length: usize) -> bool {
        address >= self.start && u64::from(address) + length as u64 <= u64::from(self.end())
    }

    pub fn read(&self, address: u32, length: usize) -> Result<&[u8], MemoryError> {
        if !self.contains_range(address, length) {
            return Err(MemoryError::ExceedChunkBoundary(address));
        }
        let offset = (address - self.start) as usize;
        Ok(&self.data[offset..offset + length])
    }

    pub fn write(&mut self, address: u32, values: &[u8]) -> Result<(), MemoryError> {
        if !self.contains_range(address, values.len()) {
            return Err(MemoryError::ExceedChunkBoundary(address));
        }
        let offset = (address - self.start) as usize;
        self.data[offset..offset + values.len()].copy_from_slice(values);
        Ok(())
    }
}

/// Address range `[start, end)` owning sorted chunks. Gaps read as zero.
#[derive(Clone, Debug)]
pub struct MemoryZone {
    start: u32,
    end: u32,
    chunks: Vec<MemoryChunk>,
}

impl MemoryZone {
    pub fn new(start: u32, end: u32, chunks: Vec<MemoryChunk>) -> Result<Self, MemoryError> {
        let sorted = chunks.windows(2).all(|w| w[0].end() <= w[1].start());
        if start > end || !sorted {
            return Err(MemoryError::InvalidZone(start));
        }
        if chunks.last().is_some_and(|last| last.end() > end) {
            return Err(MemoryError::InvalidZone(start));
        }
        Ok(Self { start, end, chunks })
    }

    #[must_use]
    pub const fn start(&self) -> u32 {
        self.start
    }

    #[must_use]
    pub const fn end(&self) -> u32 {
        self.end
    }

    #[must_use]
    pub fn chunks(&self) -> &[MemoryChunk] {
        &self.chunks
    }

    /// Index of the chunk containing `address`, or where one would be inserted.
    fn search(&self, address: u32) -> Result<usize, usize> {
        self.chunks.binary_search_by(|chunk| {
            if chunk.end() <= address {
                std::cmp::Ordering::Less
            } else if chunk.start() > address {
                std::cmp::Ordering::Greater
            } else {
                std::cmp::Ordering::Equal
            }
        })
    }

    /// Write `data` at `address`, merging every chunk it overlaps.
    pub fn insert_or_update(&mut self, address: u32, data: &[u8]) -> Result<(), MemoryError> {
        let end = u64::from(address) + data.len() as u64;
        if end > u64::from(u32::MAX) {
            return Err(MemoryError::OutOfMemory(address));
        }
        let end = end as u32;

        if let Ok(index) = self.search(address) {
            let chunk = &mut self.chunks[index];
            if end <= chunk.end() {
                return chunk.write(address, data);
            }
        }

        let after_last = self.chunks.last().map_or(true, |last| address >= last.end());
        if after_last {
            let chunk = MemoryChunk::new(address, data.to_vec())?;
            match self.chunks.last_mut() {
                Some(last) if last.end() == address => last.append(&chunk)?,
                _ => self.chunks.push(chunk),
            }
            return Ok(());
        }

        let first = match self.search(address) {
            Ok(index) | Err(index) => index,
        };
        let last = first
            + self.chunks[first..]
                .iter()
                .take_while(|chunk| chunk.start() < end)
                .count();

        if first == last {
            self.chunks.insert(first, MemoryChunk::new(address, data.to_vec())?);
            return Ok(());
        }

        let merged_start = self.chunks[first].start().min(address);
        let merged_end = self.chunks[last - 1].end().max(end);
        let mut merged = MemoryChunk::new(merged_start, Vec::new())?;
        merged.zero_extend(merged_end)?;
        for chunk in &self.chunks[first..last] {
            merged.write(chunk.start(), chunk.data())?;
        }
        merged.write(address, data)?;
        self.chunks.splice(first..last, std::iter::once(merged));
        Ok(())
    }

    pub fn read(&self, address: u32, length: usize) -> Result<Vec<u8>, MemoryError> {
        let mut out = vec![0u8; length];
        self.read_into(address, &mut out)?;
        Ok(out)
    }

    /// Copy `[address, address + out.len())` into `out`, zero-filling gaps.
    pub fn read_into(&self, address: u32, out: &mut [u8]) -> Result<(), MemoryError> {
        if out.is_empty() {
            return Ok(());
        }
        let read_end = u64::from(address) + out.len() as u64;
        if read_end > u64::from(self.end) {
            return Err(MemoryError::ExceedZoneBoundary(self.end));
        }
        out.fill(0);
        let first = match self.search(address) {
            Ok(index) | Err(index) => index,
        };
        for chunk in &self.chunks[first..] {
            if u64::from(chunk.start()) >= read_end {
                break;
            }
            let from = chunk.start().max(address);
            let to = (u64::from(chunk.end()).min(read_end)) as u32;
            if from >= to {
                continue;
            }
            let bytes = chunk.read(from, (to - from) as usize)?;
            let offset = (from - address) as usize;
            out[offset..offset + bytes.len()].copy_from_slice(bytes);
        }
        Ok(())
    }

    pub fn write(&mut self, address: u32, values: &[u8]) -> Result<(), MemoryError> {
        if values.is_empty() {
            return Ok(());
        }
        self.insert_or_update(address, values)
    }

    pub fn increment_end(&mut self, increment: u32) -> Result<(), MemoryError> {
        self.end = self
            .end
            .checked_add(increment)
            .ok_or(MemoryError::OutOfMemory(self.end))?;
        Ok(())
    }

    /// Overwrite whole pages with zeros.
    pub fn zero(&mut self, page_index: u32, pages: u32, page_size: u32) -> Result<(), MemoryError> {
        let address = page_index
            .checked_mul(page_size)
            .ok_or(MemoryError::OutOfMemory(page_index))?;
        let length = u64::from(pages) * u64::from(page_size);
        if length == 0 {
            return Ok(());
        }
        let length = usize::try_from(length).map_err(|_| MemoryError::OutOfMemory(address))?;
        self.insert_or_update(address, &vec![0u8; length])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone() -> MemoryZone {
        MemoryZone::new(0, u32::MAX, Vec::new()).unwrap()
    }

    #[test]
    fn rejects_unsorted_chunks() {
        let a = MemoryChunk::new(10, vec![1; 4]).unwrap();
        let b = MemoryChunk::new(12, vec![2; 4]).unwrap();
        assert_eq!(
            MemoryZone::new(0, 100, vec![a.clone(), b]).unwrap_err(),
            MemoryError::InvalidZone(0)
        );
        assert_eq!(MemoryZone::new(0, 12, vec![a]).unwrap_err(), MemoryError::InvalidZone(0));
    }

    #[test]
    fn adjacent_writes_extend_last_chunk() {
        let mut z = zone();
        z.write(100, &[1, 2]).unwrap();
        z.write(102, &[3]).unwrap();
        assert_eq!(z.chunks().len(), 1);
        assert_eq!(z.read(99, 5).unwrap(), vec![0, 1, 2, 3, 0]);
    }

    #[test]
    fn overlapping_writes_merge() {
        let mut z = zone();
        z.write(10, &[1; 4]).unwrap();
        z.write(20, &[2; 4]).unwrap();
        z.write(30, &[3; 4]).unwrap();
        z.write(12, &[9; 10]).unwrap();
        assert_eq!(z.chunks().len(), 2);
        assert_eq!(z.chunks()[0].start(), 10);
        assert_eq!(z.chunks()[0].end(), 24);
        assert_eq!(
            z.read(10, 14).unwrap(),
            vec![1, 1, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 2, 2]
        );
    }

    #[test]
    fn write_into_gap_inserts_sorted() {
        let mut z = zone();
        z.write(10, &[1]).unwrap();
        z.write(30, &[3]).unwrap();
        z.write(20, &[2]).unwrap();
        let starts: Vec<u32> = z.chunks().iter().map(MemoryChunk::start).collect();
        assert_eq!(starts, vec![10, 20, 30]);
    }

    #[test]
    fn read_past_zone_end_fails() {
        let z = MemoryZone::new(0, 16, Vec::new()).unwrap();
        assert_eq!(z.read(10, 7).unwrap_err(), MemoryError::ExceedZoneBoundary(16));
        assert_eq!(z.read(10, 6).unwrap(), vec![0; 6]);
    }

    #[test]
    fn chunk_bounds_and_adjacency() {
        let mut a = MemoryChunk::new(0, vec![1, 2]).unwrap();
        let b = MemoryChunk::new(3, vec![3]).unwrap();
        assert_eq!(a.append(&b).unwrap_err(), MemoryError::NotAdjacent(3));
        assert_eq!(a.read(1, 2).unwrap_err(), MemoryError::ExceedChunkBoundary(1));
        a.zero_extend(4).unwrap();
        assert_eq!(a.data(), &[1, 2, 0, 0]);
        assert!(MemoryChunk::new(u32::MAX, vec![0; 2]).is_err());
    }

    #[test]
    fn zero_and_increment_end() {
        let mut z = MemoryZone::new(0, 8192, Vec::new()).unwrap();
        z.write(4100, &[7; 8]).unwrap();
        z.zero(1, 1, 4096).unwrap();
        assert_eq!(z.read(4100, 8).unwrap(), vec![0; 8]);
        z.increment_end(4096).unwrap();
        assert_eq!(z.end(), 12288);
        assert!(z.increment_end(u32::MAX).is_err());
    }
}
