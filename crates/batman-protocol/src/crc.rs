//! Checksums used on the BMB SPI link.
//!
//! Two unrelated codes protect the link:
//!
//! | Code | Width | Polynomial | Seed | Covers |
//! |------|-------|------------|------|--------|
//! | PEC  | 8     | `0x2F`     | `0x10` | command header bytes (opcode, register id) |
//! | CRC-14 | 14  | `0x025B`   | caller-supplied (`0x0010` on the wire) | configuration write payloads |
//!
//! The CRC-14 runs in two phases: whole bytes through a lookup table, then a
//! residual partial byte (the top `n` bits of one more byte) through a direct
//! shift loop. Both phases mask the register to 14 bits.

/// Seed of the command-header PEC.
pub const PEC_SEED: u8 = 0x10;

/// Generator polynomial of the command-header PEC.
pub const PEC_POLY: u8 = 0x2F;

/// Generator polynomial of the payload CRC-14.
pub const CRC14_POLY: u16 = 0x025B;

/// Mask keeping the CRC-14 register to its 14 significant bits.
pub const CRC14_MASK: u16 = 0x3FFF;

const CRC14_TOP_BIT: u16 = 0x2000;

/// Top-`n`-bits masks used by the residual phase, indexed by `n`.
const TOP_BITS: [u8; 9] = [0x00, 0x80, 0xC0, 0xE0, 0xF0, 0xF8, 0xFC, 0xFE, 0xFF];

/// Byte-wise lookup table for polynomial `0x2F`.
static PEC_TABLE: [u8; 256] = [
    0x00, 0x2F, 0x5E, 0x71, 0xBC, 0x93, 0xE2, 0xCD, 0x57, 0x78, 0x09, 0x26, 0xEB, 0xC4, 0xB5, 0x9A,
    0xAE, 0x81, 0xF0, 0xDF, 0x12, 0x3D, 0x4C, 0x63, 0xF9, 0xD6, 0xA7, 0x88, 0x45, 0x6A, 0x1B, 0x34,
    0x73, 0x5C, 0x2D, 0x02, 0xCF, 0xE0, 0x91, 0xBE, 0x24, 0x0B, 0x7A, 0x55, 0x98, 0xB7, 0xC6, 0xE9,
    0xDD, 0xF2, 0x83, 0xAC, 0x61, 0x4E, 0x3F, 0x10, 0x8A, 0xA5, 0xD4, 0xFB, 0x36, 0x19, 0x68, 0x47,
    0xE6, 0xC9, 0xB8, 0x97, 0x5A, 0x75, 0x04, 0x2B, 0xB1, 0x9E, 0xEF, 0xC0, 0x0D, 0x22, 0x53, 0x7C,
    0x48, 0x67, 0x16, 0x39, 0xF4, 0xDB, 0xAA, 0x85, 0x1F, 0x30, 0x41, 0x6E, 0xA3, 0x8C, 0xFD, 0xD2,
    0x95, 0xBA, 0xCB, 0xE4, 0x29, 0x06, 0x77, 0x58, 0xC2, 0xED, 0x9C, 0xB3, 0x7E, 0x51, 0x20, 0x0F,
    0x3B, 0x14, 0x65, 0x4A, 0x87, 0xA8, 0xD9, 0xF6, 0x6C, 0x43, 0x32, 0x1D, 0xD0, 0xFF, 0x8E, 0xA1,
    0xE3, 0xCC, 0xBD, 0x92, 0x5F, 0x70, 0x01, 0x2E, 0xB4, 0x9B, 0xEA, 0xC5, 0x08, 0x27, 0x56, 0x79,
    0x4D, 0x62, 0x13, 0x3C, 0xF1, 0xDE, 0xAF, 0x80, 0x1A, 0x35, 0x44, 0x6B, 0xA6, 0x89, 0xF8, 0xD7,
    0x90, 0xBF, 0xCE, 0xE1, 0x2C, 0x03, 0x72, 0x5D, 0xC7, 0xE8, 0x99, 0xB6, 0x7B, 0x54, 0x25, 0x0A,
    0x3E, 0x11, 0x60, 0x4F, 0x82, 0xAD, 0xDC, 0xF3, 0x69, 0x46, 0x37, 0x18, 0xD5, 0xFA, 0x8B, 0xA4,
    0x05, 0x2A, 0x5B, 0x74, 0xB9, 0x96, 0xE7, 0xC8, 0x52, 0x7D, 0x0C, 0x23, 0xEE, 0xC1, 0xB0, 0x9F,
    0xAB, 0x84, 0xF5, 0xDA, 0x17, 0x38, 0x49, 0x66, 0xFC, 0xD3, 0xA2, 0x8D, 0x40, 0x6F, 0x1E, 0x31,
    0x76, 0x59, 0x28, 0x07, 0xCA, 0xE5, 0x94, 0xBB, 0x21, 0x0E, 0x7F, 0x50, 0x9D, 0xB2, 0xC3, 0xEC,
    0xD8, 0xF7, 0x86, 0xA9, 0x64, 0x4B, 0x3A, 0x15, 0x8F, 0xA0, 0xD1, 0xFE, 0x33, 0x1C, 0x6D, 0x42,
];

/// Byte-wise lookup table for polynomial `0x025B`, 14-bit register.
static CRC14_TABLE: [u16; 256] = [
    0x0000, 0x025B, 0x04B6, 0x06ED, 0x096C, 0x0B37, 0x0DDA, 0x0F81,
    0x12D8, 0x1083, 0x166E, 0x1435, 0x1BB4, 0x19EF, 0x1F02, 0x1D59,
    0x25B0, 0x27EB, 0x2106, 0x235D, 0x2CDC, 0x2E87, 0x286A, 0x2A31,
    0x3768, 0x3533, 0x33DE, 0x3185, 0x3E04, 0x3C5F, 0x3AB2, 0x38E9,
    0x093B, 0x0B60, 0x0D8D, 0x0FD6, 0x0057, 0x020C, 0x04E1, 0x06BA,
    0x1BE3, 0x19B8, 0x1F55, 0x1D0E, 0x128F, 0x10D4, 0x1639, 0x1462,
    0x2C8B, 0x2ED0, 0x283D, 0x2A66, 0x25E7, 0x27BC, 0x2151, 0x230A,
    0x3E53, 0x3C08, 0x3AE5, 0x38BE, 0x373F, 0x3564, 0x3389, 0x31D2,
    0x1276, 0x102D, 0x16C0, 0x149B, 0x1B1A, 0x1941, 0x1FAC, 0x1DF7,
    0x00AE, 0x02F5, 0x0418, 0x0643, 0x09C2, 0x0B99, 0x0D74, 0x0F2F,
    0x37C6, 0x359D, 0x3370, 0x312B, 0x3EAA, 0x3CF1, 0x3A1C, 0x3847,
    0x251E, 0x2745, 0x21A8, 0x23F3, 0x2C72, 0x2E29, 0x28C4, 0x2A9F,
    0x1B4D, 0x1916, 0x1FFB, 0x1DA0, 0x1221, 0x107A, 0x1697, 0x14CC,
    0x0995, 0x0BCE, 0x0D23, 0x0F78, 0x00F9, 0x02A2, 0x044F, 0x0614,
    0x3EFD, 0x3CA6, 0x3A4B, 0x3810, 0x3791, 0x35CA, 0x3327, 0x317C,
    0x2C25, 0x2E7E, 0x2893, 0x2AC8, 0x2549, 0x2712, 0x21FF, 0x23A4,
    0x24EC, 0x26B7, 0x205A, 0x2201, 0x2D80, 0x2FDB, 0x2936, 0x2B6D,
    0x3634, 0x346F, 0x3282, 0x30D9, 0x3F58, 0x3D03, 0x3BEE, 0x39B5,
    0x015C, 0x0307, 0x05EA, 0x07B1, 0x0830, 0x0A6B, 0x0C86, 0x0EDD,
    0x1384, 0x11DF, 0x1732, 0x1569, 0x1AE8, 0x18B3, 0x1E5E, 0x1C05,
    0x2DD7, 0x2F8C, 0x2961, 0x2B3A, 0x24BB, 0x26E0, 0x200D, 0x2256,
    0x3F0F, 0x3D54, 0x3BB9, 0x39E2, 0x3663, 0x3438, 0x32D5, 0x308E,
    0x0867, 0x0A3C, 0x0CD1, 0x0E8A, 0x010B, 0x0350, 0x05BD, 0x07E6,
    0x1ABF, 0x18E4, 0x1E09, 0x1C52, 0x13D3, 0x1188, 0x1765, 0x153E,
    0x369A, 0x34C1, 0x322C, 0x3077, 0x3FF6, 0x3DAD, 0x3B40, 0x391B,
    0x2442, 0x2619, 0x20F4, 0x22AF, 0x2D2E, 0x2F75, 0x2998, 0x2BC3,
    0x132A, 0x1171, 0x179C, 0x15C7, 0x1A46, 0x181D, 0x1EF0, 0x1CAB,
    0x01F2, 0x03A9, 0x0544, 0x071F, 0x089E, 0x0AC5, 0x0C28, 0x0E73,
    0x3FA1, 0x3DFA, 0x3B17, 0x394C, 0x36CD, 0x3496, 0x327B, 0x3020,
    0x2D79, 0x2F22, 0x29CF, 0x2B94, 0x2415, 0x264E, 0x20A3, 0x22F8,
    0x1A11, 0x184A, 0x1EA7, 0x1CFC, 0x137D, 0x1126, 0x17CB, 0x1590,
    0x08C9, 0x0A92, 0x0C7F, 0x0E24, 0x01A5, 0x03FE, 0x0513, 0x0748,
];

/// A partial byte folded into the CRC-14 after the whole-byte phase.
///
/// Only the top `len` bits of `value` take part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailingBits {
    pub len: u8,
    pub value: u8,
}

impl TrailingBits {
    pub const fn new(len: u8, value: u8) -> Self {
        Self { len, value }
    }
}

/// Compute the 8-bit command-header PEC over `bytes`.
///
/// Empty input returns the seed.
pub fn command_pec(bytes: &[u8]) -> u8 {
    bytes.iter().fold(PEC_SEED, |crc, &byte| {
        PEC_TABLE
            .get(usize::from(crc ^ byte))
            .copied()
            .unwrap_or_default()
    })
}

/// Advance a CRC-14 register over whole bytes.
///
/// Returns `crc` unchanged for empty input.
pub fn crc14_bytes(bytes: &[u8], crc: u16) -> u16 {
    bytes.iter().fold(crc, |crc, &byte| {
        let pos = ((crc >> 6) & 0xFF) as u8 ^ byte;
        let entry = CRC14_TABLE
            .get(usize::from(pos))
            .copied()
            .unwrap_or_default();
        ((crc << 8) & CRC14_MASK) ^ entry
    })
}

/// Fold the top `len_bits` bits of `byte` into a CRC-14 register.
///
/// `len_bits` saturates at 8; `len_bits == 0` leaves the register unchanged
/// apart from 14-bit masking.
pub fn crc14_bits(len_bits: u8, byte: u8, crc: u16) -> u16 {
    let len = len_bits.min(8);
    let masked = byte & TOP_BITS.get(usize::from(len)).copied().unwrap_or(0xFF);
    let mut crc = crc ^ (u16::from(masked) << 6);
    for _ in 0..len {
        crc = if crc & CRC14_TOP_BIT != 0 {
            (crc << 1) ^ CRC14_POLY
        } else {
            crc << 1
        };
    }
    crc & CRC14_MASK
}

/// Full payload CRC-14: the byte phase over `bytes`, then the optional
/// trailing partial byte.
pub fn payload_crc14(bytes: &[u8], initial: u16, trailing: Option<TrailingBits>) -> u16 {
    let crc = crc14_bytes(bytes, initial);
    match trailing {
        Some(bits) => crc14_bits(bits.len, bits.value, crc),
        None => crc & CRC14_MASK,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pec_bitwise(bytes: &[u8]) -> u8 {
        let mut crc = PEC_SEED;
        for &byte in bytes {
            crc ^= byte;
            for _ in 0..8 {
                crc = if crc & 0x80 != 0 {
                    (crc << 1) ^ PEC_POLY
                } else {
                    crc << 1
                };
            }
        }
        crc
    }

    #[test]
    fn test_pec_table_matches_polynomial() {
        for byte in 0..=u8::MAX {
            assert_eq!(
                command_pec(&[byte]),
                pec_bitwise(&[byte]),
                "table entry disagrees for {byte:#04x}"
            );
        }
    }

    #[test]
    fn test_pec_empty_is_seed() {
        assert_eq!(command_pec(&[]), PEC_SEED);
    }

    #[test]
    fn test_pec_longest_payload() {
        assert_eq!(command_pec(&[0xFF; 75]), 0x49);
        assert_eq!(command_pec(&[0xFF; 75]), pec_bitwise(&[0xFF; 75]));
    }

    #[test]
    fn test_pec_read_headers() {
        let expected = [
            (0x47, 0x70),
            (0x48, 0x34),
            (0x49, 0xDD),
            (0x4A, 0xC9),
            (0x4B, 0x20),
            (0x4C, 0xE1),
            (0x4D, 0x08),
            (0x4E, 0x1C),
            (0x4F, 0xF5),
            (0x50, 0x94),
        ];
        for (id, pec) in expected {
            assert_eq!(command_pec(&[id, 0x00]), pec, "register {id:#04x}");
        }
    }

    #[test]
    fn test_crc14_table_matches_polynomial() {
        for byte in 0..=u8::MAX {
            assert_eq!(
                crc14_bytes(&[byte], 0),
                crc14_bits(8, byte, 0),
                "table entry disagrees for {byte:#04x}"
            );
        }
    }

    #[test]
    fn test_crc14_known_vectors() {
        assert_eq!(crc14_bytes(&[], 0x0010), 0x0010);
        assert_eq!(crc14_bytes(&[0x01], 0), CRC14_POLY);
        assert_eq!(crc14_bytes(b"123456789", 0), 0x1E37);
        assert_eq!(crc14_bytes(b"123456789", 0x0010), 0x2682);
        assert_eq!(crc14_bytes(&[0xFF; 75], 0x0010), 0x0803);
    }

    #[test]
    fn test_crc14_bits_zero_length_is_identity() {
        assert_eq!(crc14_bits(0, 0xFF, 0x1234), 0x1234);
    }

    #[test]
    fn test_crc14_bits_only_reads_top_bits() {
        assert_eq!(crc14_bits(2, 0x80, 0x0E37), crc14_bits(2, 0xBF, 0x0E37));
        // Low-order bits are discarded, so the wire trailer 0x02 folds in as zeros.
        assert_eq!(crc14_bits(2, 0x02, 0x0E37), crc14_bits(2, 0x00, 0x0E37));
        assert_eq!(crc14_bits(2, 0x02, 0x0E37), 0x38DC);
    }

    #[test]
    fn test_payload_crc14_config_frames() {
        let tail = Some(TrailingBits::new(2, 2));
        assert_eq!(payload_crc14(&[0xF3, 0x00, 0x00, 0x00], 0x0010, tail), 0x38DC);
        assert_eq!(payload_crc14(&[0xF3, 0x00, 0xAA, 0xAA], 0x0010, tail), 0x3402);
        assert_eq!(payload_crc14(&[0xF3, 0x00, 0x55, 0x55], 0x0010, tail), 0x3EB3);
        assert_eq!(payload_crc14(&[0xF3, 0x00, 0x02, 0x00], 0x0010, tail), 0x269F);
        assert_eq!(payload_crc14(&[0xF3, 0x00, 0x00, 0x40], 0x0010, tail), 0x335F);
    }
}
