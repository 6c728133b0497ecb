//! Register map and reply decoders.
//!
//! A register read clocks out a two-word header followed by
//! [`RX_FRAME_WORDS`] padding words. The bytes clocked back in form one
//! [`RxFrame`]: a fixed-stride segment per chip, concatenated in chain order
//! (chip 0 first).
//!
//! | Register | Id | Stride | Payload |
//! |----------|----|--------|---------|
//! | `CellA`..`CellE` | `0x47`..`0x4B` | 9 | three LE cell words, slots `3g..3g+2` |
//! | `ChipTotal` | `0x4C` | 7 | LE chip-total word at offset 2 |
//! | `AuxA` | `0x4D` | 9 | LE temp1, 5 V supply, temp2 |
//! | `AuxB` | `0x4E` | 9 | not decoded |
//! | `Status` | `0x4F` | 9 | not decoded |
//! | `Config` | `0x50` | 7 | two BE config words |
//!
//! A word equal to [`SENTINEL`] means "no answer" and never reaches the store.

use crate::command::read_header;
use crate::error::{ProtocolError, ProtocolResult};
use crate::store::RegisterStore;
use crate::{MAX_CHIPS, SENTINEL};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Padding words clocked per register read.
pub const RX_FRAME_WORDS: usize = 37;

/// Receive buffer length in bytes.
pub const RX_FRAME_LEN: usize = RX_FRAME_WORDS * 2;

/// Reply words clocked after a temperature request.
pub const TEMPERATURE_REPLY_WORDS: usize = 32;

/// Cell words carried per chip by each of the five cell registers.
pub const CELLS_PER_GROUP: usize = 3;

/// Chip positions whose 5 V supply word arrives byte-swapped.
///
/// Observed on one pack; needs confirming on other hardware revisions.
pub const SUPPLY_BYTE_SWAP_CHIPS: [usize; 4] = [0, 3, 5, 7];

pub type RxFrame = [u8; RX_FRAME_LEN];

/// How many words a decode pass stored and how many it threw away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeOutcome {
    pub accepted: usize,
    pub rejected: usize,
}

impl DecodeOutcome {
    fn record(&mut self, stored: bool) {
        if stored {
            self.accepted = self.accepted.saturating_add(1);
        } else {
            self.rejected = self.rejected.saturating_add(1);
        }
    }

    pub fn merge(&mut self, other: DecodeOutcome) {
        self.accepted = self.accepted.saturating_add(other.accepted);
        self.rejected = self.rejected.saturating_add(other.rejected);
    }

    /// At least one chip answered.
    pub fn is_live(&self) -> bool {
        self.accepted > 0
    }
}

/// Per-chip payload layout inside a reply segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    CellGroup { first_slot: usize },
    ChipTotal,
    Aux,
    Config,
    Resync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Register {
    CellA,
    CellB,
    CellC,
    CellD,
    CellE,
    ChipTotal,
    AuxA,
    AuxB,
    Status,
    Config,
}

impl Register {
    pub const ALL: [Register; 10] = [
        Register::CellA,
        Register::CellB,
        Register::CellC,
        Register::CellD,
        Register::CellE,
        Register::ChipTotal,
        Register::AuxA,
        Register::AuxB,
        Register::Status,
        Register::Config,
    ];

    /// The five cell-voltage registers in slot order.
    pub const CELL_GROUPS: [Register; 5] = [
        Register::CellA,
        Register::CellB,
        Register::CellC,
        Register::CellD,
        Register::CellE,
    ];

    pub const fn id(self) -> u8 {
        match self {
            Register::CellA => 0x47,
            Register::CellB => 0x48,
            Register::CellC => 0x49,
            Register::CellD => 0x4A,
            Register::CellE => 0x4B,
            Register::ChipTotal => 0x4C,
            Register::AuxA => 0x4D,
            Register::AuxB => 0x4E,
            Register::Status => 0x4F,
            Register::Config => 0x50,
        }
    }

    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownRegister`] for ids outside `0x47..=0x50`.
    pub fn from_id(id: u8) -> ProtocolResult<Self> {
        Self::ALL
            .into_iter()
            .find(|reg| reg.id() == id)
            .ok_or(ProtocolError::UnknownRegister(id))
    }

    const fn layout(self) -> Layout {
        match self {
            Register::CellA => Layout::CellGroup { first_slot: 0 },
            Register::CellB => Layout::CellGroup { first_slot: 3 },
            Register::CellC => Layout::CellGroup { first_slot: 6 },
            Register::CellD => Layout::CellGroup { first_slot: 9 },
            Register::CellE => Layout::CellGroup { first_slot: 12 },
            Register::ChipTotal => Layout::ChipTotal,
            Register::AuxA => Layout::Aux,
            Register::AuxB | Register::Status => Layout::Resync,
            Register::Config => Layout::Config,
        }
    }

    /// Bytes per chip segment in the reply.
    pub const fn stride(self) -> usize {
        match self.layout() {
            Layout::ChipTotal | Layout::Config => 7,
            Layout::CellGroup { .. } | Layout::Aux | Layout::Resync => 9,
        }
    }

    /// Whether a read of this register updates the store.
    pub const fn is_decoded(self) -> bool {
        !matches!(self.layout(), Layout::Resync)
    }

    /// Two-word read header for this register.
    pub fn header(self) -> [u16; 2] {
        read_header(self.id())
    }

    /// Decode a reply frame into `store`.
    ///
    /// Walks every chip position; positions beyond the end of `frame` count
    /// as rejected. Never fails.
    pub fn decode(self, frame: &[u8], store: &mut RegisterStore) -> DecodeOutcome {
        let stride = self.stride();
        let mut outcome = DecodeOutcome::default();

        for chip in 0..MAX_CHIPS {
            let base = chip * stride;
            match self.layout() {
                Layout::CellGroup { first_slot } => {
                    for i in 0..CELLS_PER_GROUP {
                        let stored = live_word(le_word(frame, base + 2 * i)).is_some_and(|raw| {
                            store
                                .set_cell_mv(chip, first_slot + i, raw_to_millivolts(raw))
                                .is_ok()
                        });
                        outcome.record(stored);
                    }
                }
                Layout::ChipTotal => {
                    let stored = live_word(le_word(frame, base + 2))
                        .is_some_and(|raw| store.set_chip_total_raw(chip, raw).is_ok());
                    outcome.record(stored);
                }
                Layout::Aux => {
                    outcome.merge(decode_aux(frame, base, chip, store));
                }
                Layout::Config => {
                    for index in 0..2 {
                        let stored = live_word(be_word(frame, base + 2 * index))
                            .is_some_and(|word| store.set_config_word(chip, index, word).is_ok());
                        outcome.record(stored);
                    }
                }
                Layout::Resync => {}
            }
        }

        trace!(
            register = ?self,
            accepted = outcome.accepted,
            rejected = outcome.rejected,
            "register decoded"
        );
        outcome
    }
}

fn decode_aux(frame: &[u8], base: usize, chip: usize, store: &mut RegisterStore) -> DecodeOutcome {
    let mut outcome = DecodeOutcome::default();
    let Ok(aux) = store.aux_mut(chip) else {
        outcome.rejected = 3;
        return outcome;
    };

    match live_word(le_word(frame, base)) {
        Some(raw) => {
            aux.temp1 = raw;
            outcome.record(true);
        }
        None => outcome.record(false),
    }
    match live_word(le_word(frame, base + 2)) {
        Some(raw) => {
            aux.supply = if SUPPLY_BYTE_SWAP_CHIPS.contains(&chip) {
                raw.swap_bytes()
            } else {
                raw
            };
            outcome.record(true);
        }
        None => outcome.record(false),
    }
    match live_word(le_word(frame, base + 4)) {
        Some(raw) => {
            aux.temp2 = raw;
            outcome.record(true);
        }
        None => outcome.record(false),
    }
    outcome
}

/// Decode the reply to a temperature request.
///
/// Chip `n` answers in word `1 + 4n`; the other words are ignored.
pub fn decode_temperatures(words: &[u16], store: &mut RegisterStore) -> DecodeOutcome {
    let mut outcome = DecodeOutcome::default();
    for chip in 0..MAX_CHIPS {
        let word = words.get(1 + 4 * chip).copied();
        let stored =
            live_word(word).is_some_and(|raw| store.set_temperature_raw(chip, raw).is_ok());
        outcome.record(stored);
    }
    trace!(
        accepted = outcome.accepted,
        rejected = outcome.rejected,
        "temperatures decoded"
    );
    outcome
}

/// Cell raw code to millivolts: `raw / 12.5`, truncated.
///
/// Computed as `raw * 2 / 25`, which is exact in integers.
pub fn raw_to_millivolts(raw: u16) -> u16 {
    let mv = u32::from(raw) * 2 / 25;
    u16::try_from(mv).unwrap_or(u16::MAX)
}

fn live_word(word: Option<u16>) -> Option<u16> {
    word.filter(|&w| w != SENTINEL)
}

fn le_word(frame: &[u8], offset: usize) -> Option<u16> {
    match frame.get(offset..offset.checked_add(2)?)? {
        &[lo, hi] => Some(u16::from_le_bytes([lo, hi])),
        _ => None,
    }
}

fn be_word(frame: &[u8], offset: usize) -> Option<u16> {
    match frame.get(offset..offset.checked_add(2)?)? {
        &[hi, lo] => Some(u16::from_be_bytes([hi, lo])),
        _ => None,
    }
}
