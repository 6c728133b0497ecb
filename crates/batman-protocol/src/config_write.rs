//! Configuration write frame (balance command).
//!
//! One frame addresses every chip position at once: the
//! [`Command::WriteConfig`] header, then a three-word record per chip in
//! reverse chain order (chip 7 first). Each record is
//! `[0xF300, (lo << 8) | hi, crc14]`, where `lo`/`hi` are the balance mask
//! bytes after phase masking and `crc14` covers the four payload bytes
//! `[0xF3, 0x00, lo, hi]`.
//!
//! Phase masking alternates between `0xAA` and `0x55` on successive writes,
//! so two neighbouring cells are never discharged in the same write.

use crate::MAX_CHIPS;
use crate::command::Command;
use crate::crc::{TrailingBits, payload_crc14};
use serde::{Deserialize, Serialize};

/// Configuration register addressed by the write.
pub const CONFIG_REGISTER: u8 = 0xF3;

/// Seed of the payload CRC-14.
pub const CONFIG_CRC_SEED: u16 = 0x0010;

/// Residual bits folded in after the payload bytes.
pub const CONFIG_CRC_TRAILER: TrailingBits = TrailingBits::new(2, 0x02);

/// Words per chip record.
pub const CONFIG_RECORD_WORDS: usize = 3;

/// Header plus one record per chip position.
pub const CONFIG_WRITE_WORDS: usize = 1 + MAX_CHIPS * CONFIG_RECORD_WORDS;

/// Which half of the cells a write may discharge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BalancePhase {
    /// First write after power-up; byte mask `0xAA`.
    #[default]
    Even,
    /// Byte mask `0x55`.
    Odd,
}

impl BalancePhase {
    pub const fn byte_mask(self) -> u8 {
        match self {
            BalancePhase::Even => 0xAA,
            BalancePhase::Odd => 0x55,
        }
    }

    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            BalancePhase::Even => BalancePhase::Odd,
            BalancePhase::Odd => BalancePhase::Even,
        }
    }
}

/// The four CRC-covered payload bytes for one chip.
pub fn config_payload(mask: u16, phase: BalancePhase) -> [u8; 4] {
    let [lo, hi] = mask.to_le_bytes();
    let keep = phase.byte_mask();
    [CONFIG_REGISTER, 0x00, lo & keep, hi & keep]
}

/// One chip record: `[0xF300, (lo << 8) | hi, crc14]`.
pub fn config_record(mask: u16, phase: BalancePhase) -> [u16; CONFIG_RECORD_WORDS] {
    let payload = config_payload(mask, phase);
    let [reg, zero, lo, hi] = payload;
    [
        u16::from_be_bytes([reg, zero]),
        u16::from_be_bytes([lo, hi]),
        payload_crc14(&payload, CONFIG_CRC_SEED, Some(CONFIG_CRC_TRAILER)),
    ]
}

/// Encode the full write frame for `masks` (indexed by chip position).
pub fn encode_config_write(
    masks: &[u16; MAX_CHIPS],
    phase: BalancePhase,
) -> [u16; CONFIG_WRITE_WORDS] {
    let mut words = [0u16; CONFIG_WRITE_WORDS];
    let (header, records) = words.split_at_mut(1);
    if let Some(first) = header.first_mut() {
        *first = Command::WriteConfig.word();
    }
    for (record, &mask) in records
        .chunks_exact_mut(CONFIG_RECORD_WORDS)
        .zip(masks.iter().rev())
    {
        record.copy_from_slice(&config_record(mask, phase));
    }
    words
}

/// Recover the phase-masked balance mask a record carries.
pub fn record_mask(record_word: u16) -> u16 {
    let [lo, hi] = record_word.to_be_bytes();
    u16::from_le_bytes([lo, hi])
}
