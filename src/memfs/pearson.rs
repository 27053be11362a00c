//! Pearson hashing for the frozen lookup table.
//!
//! Eight 8-bit Pearson passes, each with the first byte offset by the pass
//! number, are concatenated into a 64-bit value. Only ASCII input is hashed.

/// Permutation of 0..=255, shuffled at compile time with a fixed xorshift seed
static TABLE: [u8; 256] = build_table();

const fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = i as u8;
        i += 1;
    }

    // Fisher-Yates
    let mut state: u32 = 0x9E37_79B9;
    let mut i = 255;
    while i > 0 {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let j = (state % (i as u32 + 1)) as usize;
        let tmp = table[i];
        table[i] = table[j];
        table[j] = tmp;
        i -= 1;
    }
    table
}

/// Hash `bytes`, or `None` if they are not all ASCII
pub(crate) fn pearson64(bytes: &[u8]) -> Option<u64> {
    if !bytes.is_ascii() {
        return None;
    }
    let first = bytes.first().copied().unwrap_or(0);
    let mut out = 0u64;
    for pass in 0..8u8 {
        let mut h = TABLE[first.wrapping_add(pass) as usize];
        for &b in bytes.iter().skip(1) {
            h = TABLE[(h ^ b) as usize];
        }
        out = (out << 8) | h as u64;
    }
    Some(out)
}

/// Slot for `path` in a table of `len` slots
#[inline]
pub(crate) fn slot(path: &str, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    pearson64(path.as_bytes()).map(|h| (h % len as u64) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_permutation() {
        let mut sorted = TABLE.to_vec();
        sorted.sort_unstable();
        let expected: Vec<u8> = (0..=255).collect();
        assert_eq!(sorted, expected);
        // Shuffled, not identity
        assert!(TABLE.iter().enumerate().any(|(i, &v)| i as u8 != v));
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(pearson64(b"a/b/c"), pearson64(b"a/b/c"));
        assert_ne!(pearson64(b"a/b/c"), pearson64(b"a/b/d"));
    }

    #[test]
    fn test_non_ascii_rejected() {
        assert_eq!(pearson64("caf\u{e9}".as_bytes()), None);
        assert_eq!(slot("caf\u{e9}", 16), None);
    }

    #[test]
    fn test_slot_bounds() {
        assert_eq!(slot("x", 0), None);
        for len in 1..50 {
            let s = slot("dir/file.txt", len).unwrap();
            assert!(s < len);
        }
    }
}
