//! Serialization helpers: variable-length naturals and fixed-width little-endian integers.

/// Decoding result: value and number of bytes consumed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodingResult<T> {
    pub value: T,
    pub consumed: usize,
}

impl<T> DecodingResult<T> {
    #[must_use]
    pub const fn new(value: T, consumed: usize) -> Self {
        Self { value, consumed }
    }
}

// ============================================================================
// Natural number encoding
// ============================================================================

/// Decode a variable-length natural. The count of leading one bits in the
/// first byte gives the number of trailing little-endian bytes.
#[must_use]
pub fn decode_natural(data: &[u8]) -> Option<DecodingResult<u64>> {
    let first = *data.first()?;
    let extra = first.leading_ones() as usize;
    let tail = data.get(1..=extra)?;
    let low = decode_fixed(tail);
    if extra == 8 {
        return Some(DecodingResult::new(low, 9));
    }
    let high = u64::from(first) & ((1u64 << (7 - extra)) - 1);
    Some(DecodingResult::new((high << (8 * extra)) | low, 1 + extra))
}

/// Encode a natural in the shortest variable-length form.
#[must_use]
pub fn encode_natural(value: u64) -> Vec<u8> {
    for extra in 0..8usize {
        if value < 1u64 << (7 * (extra + 1)) {
            let prefix = (0xff00u16 >> extra) as u8;
            let high = (value >> (8 * extra)) as u8;
            let mut out = Vec::with_capacity(1 + extra);
            out.push(prefix | high);
            out.extend_from_slice(&encode_fixed(value, extra));
            return out;
        }
    }
    let mut out = vec![0xff];
    out.extend_from_slice(&value.to_le_bytes());
    out
}

// ============================================================================
// Fixed-width little-endian integers
// ============================================================================

/// Little-endian bytes to u64 (at most 8 bytes are read).
#[must_use]
pub fn decode_fixed(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .take(8)
        .enumerate()
        .fold(0u64, |acc, (i, &b)| acc | (u64::from(b) << (8 * i)))
}

/// Lowest `width` bytes of `value`, little-endian.
#[must_use]
pub fn encode_fixed(value: u64, width: usize) -> Vec<u8> {
    (0..width.min(8)).map(|i| (value >> (8 * i)) as u8).collect()
}

/// Read `width` bytes at `offset`; None if they run past the end.
#[must_use]
pub fn read_fixed(data: &[u8], offset: usize, width: usize) -> Option<u64> {
    let end = offset.checked_add(width)?;
    data.get(offset..end).map(decode_fixed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_single_byte_forms() {
        assert_eq!(encode_natural(0), vec![0]);
        assert_eq!(encode_natural(127), vec![127]);
        assert_eq!(decode_natural(&[0x05, 0xaa]), Some(DecodingResult::new(5, 1)));
    }

    #[test]
    fn natural_multi_byte_forms() {
        assert_eq!(encode_natural(128), vec![0x80, 0x80]);
        assert_eq!(encode_natural(0x3fff), vec![0xbf, 0xff]);
        assert_eq!(encode_natural(0x4000), vec![0xc0, 0x00, 0x40]);
        assert_eq!(decode_natural(&[0xc0, 0x00, 0x40]).map(|r| r.value), Some(0x4000));
        let big = encode_natural(u64::MAX);
        assert_eq!(big.len(), 9);
        assert_eq!(decode_natural(&big), Some(DecodingResult::new(u64::MAX, 9)));
    }

    #[test]
    fn natural_round_trips_boundaries() {
        for shift in 0..64 {
            let value = 1u64 << shift;
            for v in [value - 1, value, value + 1] {
                let encoded = encode_natural(v);
                let decoded = decode_natural(&encoded).map(|r| (r.value, r.consumed));
                assert_eq!(decoded, Some((v, encoded.len())), "value {v:#x}");
            }
        }
    }

    #[test]
    fn truncated_natural_is_rejected() {
        assert_eq!(decode_natural(&[]), None);
        assert_eq!(decode_natural(&[0xc0, 0x00]), None);
        assert_eq!(decode_natural(&[0xff, 1, 2, 3]), None);
    }

    #[test]
    fn fixed_width_helpers() {
        assert_eq!(encode_fixed(0x0102_0304, 3), vec![4, 3, 2]);
        assert_eq!(read_fixed(&[1, 2, 3], 1, 2), Some(0x0302));
        assert_eq!(read_fixed(&[1, 2, 3], 2, 2), None);
    }
}
