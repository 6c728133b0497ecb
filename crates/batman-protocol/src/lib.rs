//! Wire protocol for the Tesla Model 3 battery-monitor board (BMB) chain.
//!
//! Each BMB carries two monitor chips. Up to four boards are daisy-chained on
//! one SPI link and addressed together: a command goes to every chip at once
//! and the reply comes back as one segment per chip, in chain order.
//!
//! This crate is I/O-free. It provides:
//!
//! - **`crc`**: the 8-bit command PEC and the 14-bit payload CRC
//! - **`command`**: broadcast command words and register read headers
//! - **`register`**: the register map and reply decoders
//! - **`store`**: last-good raw readings per chip
//! - **`config_write`**: the balance command frame encoder
//!
//! ## Chain geometry
//!
//! | Constant | Value |
//! |----------|-------|
//! | [`MAX_BOARDS`] | 4 |
//! | [`CHIPS_PER_BOARD`] | 2 |
//! | [`MAX_CHIPS`] | 8 |
//! | [`SLOTS_PER_CHIP`] | 15 |
//!
//! A cell slot is populated when its stored value exceeds
//! [`PRESENT_THRESHOLD`] millivolts. Unpopulated slots read near zero.

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]

pub mod command;
pub mod config_write;
pub mod crc;
pub mod error;
pub mod register;
pub mod store;

pub use command::{Command, CommandFrame, read_header};
pub use config_write::{BalancePhase, CONFIG_WRITE_WORDS, encode_config_write};
pub use crc::{TrailingBits, command_pec, crc14_bits, crc14_bytes, payload_crc14};
pub use error::{ProtocolError, ProtocolResult};
pub use register::{
    DecodeOutcome, RX_FRAME_LEN, RX_FRAME_WORDS, Register, RxFrame, TEMPERATURE_REPLY_WORDS,
    decode_temperatures, raw_to_millivolts,
};
pub use store::{AuxWords, RegisterStore};

/// Most boards one chain can carry.
pub const MAX_BOARDS: u8 = 4;

/// Monitor chips per board.
pub const CHIPS_PER_BOARD: usize = 2;

/// Most chips one chain can carry.
pub const MAX_CHIPS: usize = MAX_BOARDS as usize * CHIPS_PER_BOARD;

/// Cell inputs per chip.
pub const SLOTS_PER_CHIP: usize = 15;

/// Word value meaning "no chip answered".
pub const SENTINEL: u16 = 0xFFFF;

/// Stored millivolts a slot must exceed to count as a populated cell.
pub const PRESENT_THRESHOLD: u16 = 10;

/// Chips on a chain of `boards` boards.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidBoardCount`] unless `1 <= boards <= 4`.
pub fn chip_count_for_boards(boards: u8) -> ProtocolResult<usize> {
    if (1..=MAX_BOARDS).contains(&boards) {
        Ok(usize::from(boards) * CHIPS_PER_BOARD)
    } else {
        Err(ProtocolError::InvalidBoardCount(boards))
    }
}
