//! CRC-32 (IEEE 802.3, reflected polynomial 0xEDB88320).
//!
//! Used by the write-ahead log to detect torn records. The table is
//! computed at first use rather than at compile time to keep the binary
//! small.

use core::sync::atomic::{AtomicU32, Ordering};

static TABLE: [AtomicU32; 256] = {
    const ZERO: AtomicU32 = AtomicU32::new(0);
    [ZERO; 256]
};
static TABLE_READY: AtomicU32 = AtomicU32::new(0);

fn table_entry(idx: usize) -> u32 {
    if TABLE_READY.load(Ordering::Acquire) == 0 {
        for n in 0..256u32 {
            let mut c = n;
            for _ in 0..8 {
                c = if c & 1 != 0 { 0xEDB8_8320 ^ (c >> 1) } else { c >> 1 };
            }
            TABLE[n as usize].store(c, Ordering::Relaxed);
        }
        TABLE_READY.store(1, Ordering::Release);
    }
    TABLE[idx].load(Ordering::Relaxed)
}

/// Computes the CRC-32 checksum of `bytes`.
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut c: u32 = 0xFFFF_FFFF;
    for &b in bytes {
        c = table_entry(((c ^ b as u32) & 0xFF) as usize) ^ (c >> 8);
    }
    c ^ 0xFFFF_FFFF
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vectors() {
        // Standard check value for "123456789".
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn detects_single_bit_flip() {
        let mut buf = [0xA5u8; 512];
        let before = crc32(&buf);
        buf[317] ^= 0x10;
        assert_ne!(crc32(&buf), before);
    }
}
