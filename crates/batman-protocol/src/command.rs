//! Command words sent down the chain.
//!
//! Every single-byte command goes out as one 16-bit word: the opcode in the
//! high byte and its PEC in the low byte. Register reads use a two-word
//! header instead (see [`read_header`]).

use crate::crc::command_pec;
use serde::{Deserialize, Serialize};

/// Filler word clocked out while reading a reply.
pub const READ_PADDING_WORD: u16 = 0x0000;

/// Broadcast commands understood by every chip on the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Bring a sleeping chip out of low-power mode. One frame per chip.
    Wake,
    /// Stop balancing discharge during measurement.
    Mute,
    /// Release the mute.
    Unmute,
    /// Latch a synchronized measurement snapshot in every chip.
    Snapshot,
    /// Ask for the die temperature burst (32 reply words).
    RequestTemperatures,
    /// Header of a configuration write frame.
    WriteConfig,
}

impl Command {
    pub const ALL: [Command; 6] = [
        Command::Wake,
        Command::Mute,
        Command::Unmute,
        Command::Snapshot,
        Command::RequestTemperatures,
        Command::WriteConfig,
    ];

    pub const fn opcode(self) -> u8 {
        match self {
            Command::Wake => 0x2A,
            Command::Mute => 0x20,
            Command::Unmute => 0x21,
            Command::Snapshot => 0x2B,
            Command::RequestTemperatures => 0x0E,
            Command::WriteConfig => 0x11,
        }
    }

    /// `(opcode << 8) | pec(opcode)`.
    pub fn word(self) -> u16 {
        let op = self.opcode();
        u16::from_be_bytes([op, command_pec(&[op])])
    }

    /// The complete frame for this command, as clocked under one chip select.
    ///
    /// Mute and unmute carry a trailing zero word; the others are a single
    /// word. [`Command::WriteConfig`] is only the header here, the payload
    /// comes from [`crate::config_write::encode_config_write`].
    pub fn frame(self) -> CommandFrame {
        let word = self.word();
        match self {
            Command::Mute | Command::Unmute => CommandFrame {
                words: [word, READ_PADDING_WORD],
                len: 2,
            },
            _ => CommandFrame {
                words: [word, READ_PADDING_WORD],
                len: 1,
            },
        }
    }

    /// Look a command up by the first word of a frame.
    pub fn from_word(word: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|cmd| cmd.word() == word)
    }
}

/// Fixed-capacity word list for a broadcast command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    words: [u16; 2],
    len: usize,
}

impl CommandFrame {
    pub fn as_slice(&self) -> &[u16] {
        self.words.get(..self.len).unwrap_or(&self.words)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Two-word header for reading register `id`: `[id << 8, pec(id, 0x00) << 8]`.
pub fn read_header(id: u8) -> [u16; 2] {
    [
        u16::from_be_bytes([id, 0x00]),
        u16::from_be_bytes([command_pec(&[id, 0x00]), 0x00]),
    ]
}
