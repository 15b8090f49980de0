//! Checksums used on the wire.
//!
//! - CRC-16-CCITT (seed `0x1D0F`, poly `0x1021`) protects every UART and
//!   Ethernet packet.
//! - CRC-24Q protects RTCM3 frames.
//! - The byte-wise reflected CRC-32 (poly `0xEDB88320`, seed 0) protects
//!   OpenRTK block logs.
//!
//! All functions are pure and may be called from any thread.

use crate::constants::{CRC16_POLY, CRC16_SEED};

/// CRC-24Q generator polynomial (without the implicit x^24 term).
const CRC24Q_POLY: u32 = 0x86_4CFB;

/// Reflected IEEE 802.3 polynomial.
const CRC32_POLY_REFLECTED: u32 = 0xEDB8_8320;

const CRC24Q_TABLE: [u32; 256] = build_crc24q_table();

const fn build_crc24q_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 16;
        let mut bit = 0;
        while bit < 8 {
            crc <<= 1;
            if crc & 0x100_0000 != 0 {
                crc ^= CRC24Q_POLY;
            }
            bit += 1;
        }
        table[i] = crc & 0xFF_FFFF;
        i += 1;
    }
    table
}

/// CRC-16-CCITT as used by the UART and Ethernet packet trailers.
///
/// MSB-first, 8 shift rounds per byte. Callers append the result big-endian.
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc = CRC16_SEED;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ CRC16_POLY;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// CRC-16-CCITT rendered as the two trailer bytes (big-endian).
pub fn crc16_bytes(data: &[u8]) -> [u8; 2] {
    crc16_ccitt(data).to_be_bytes()
}

/// CRC-24Q over an RTCM3 frame (preamble through payload). Seed 0.
pub fn crc24q(data: &[u8]) -> u32 {
    let mut crc = 0u32;
    for &byte in data {
        let index = (((crc >> 16) ^ byte as u32) & 0xFF) as usize;
        crc = ((crc << 8) ^ CRC24Q_TABLE[index]) & 0xFF_FFFF;
    }
    crc
}

/// One byte worth of the reflected reduction.
fn crc32_reduce(value: u32) -> u32 {
    let mut crc = value;
    for _ in 0..8 {
        if crc & 1 != 0 {
            crc = (crc >> 1) ^ CRC32_POLY_REFLECTED;
        } else {
            crc >>= 1;
        }
    }
    crc
}

/// Block CRC-32 used by OpenRTK logs: reflected polynomial, seed 0, no final XOR.
pub fn crc32_ieee_variant(data: &[u8]) -> u32 {
    let mut crc = 0u32;
    for &byte in data {
        let shifted = (crc >> 8) & 0x00FF_FFFF;
        let reduced = crc32_reduce((crc ^ byte as u32) & 0xFF);
        crc = shifted ^ reduced;
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECK_INPUT: &[u8] = b"123456789";

    #[test]
    fn test_crc16_check_value() {
        // CRC-16/AUG-CCITT catalogue check value.
        assert_eq!(crc16_ccitt(CHECK_INPUT), 0xE5CC);
    }

    #[test]
    fn test_crc16_empty_is_seed() {
        assert_eq!(crc16_ccitt(&[]), CRC16_SEED);
    }

    #[test]
    fn test_crc16_bytes_big_endian() {
        assert_eq!(crc16_bytes(CHECK_INPUT), [0xE5, 0xCC]);
    }

    #[test]
    fn test_crc24q_check_value() {
        assert_eq!(crc24q(CHECK_INPUT), 0xCD_E703);
        assert_eq!(crc24q(&[]), 0);
    }

    #[test]
    fn test_crc32_single_bytes_match_reflected_table() {
        assert_eq!(crc32_ieee_variant(&[]), 0);
        assert_eq!(crc32_ieee_variant(&[0x01]), 0x7707_3096);
        assert_eq!(crc32_ieee_variant(&[0x80]), 0xEDB8_8320);
    }

    #[test]
    fn test_crc32_matches_table_driven_form() {
        let mut table = [0u32; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            *entry = crc32_reduce(i as u32);
        }
        let table_crc = |data: &[u8]| {
            data.iter().fold(0u32, |crc, &b| {
                (crc >> 8) ^ table[((crc ^ b as u32) & 0xFF) as usize]
            })
        };

        let data: Vec<u8> = (0..1000u32).map(|i| (i * 31 % 251) as u8).collect();
        assert_eq!(crc32_ieee_variant(&data), table_crc(&data));
        assert_eq!(crc32_ieee_variant(CHECK_INPUT), table_crc(CHECK_INPUT));
    }

    #[test]
    fn test_crc16_detects_every_single_bit_flip() {
        let data: Vec<u8> = (0..64u8).collect();
        let reference = crc16_ccitt(&data);
        for byte in 0..data.len() {
            for bit in 0..8 {
                let mut flipped = data.clone();
                flipped[byte] ^= 1 << bit;
                assert_ne!(crc16_ccitt(&flipped), reference, "byte {byte} bit {bit}");
            }
        }
    }
}
