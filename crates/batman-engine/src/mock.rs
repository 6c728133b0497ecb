//! In-memory model of a BMB chain.
//!
//! [`MockTransport`] answers the same words a real chain would: register
//! reads return per-chip segments encoded the way the hardware lays them out,
//! temperature requests return the 32-word burst, and configuration writes
//! are parsed back into balance masks. Every chip-select frame is recorded.

use crate::transport::SpiTransport;
use batman_protocol::config_write::{
    CONFIG_CRC_SEED, CONFIG_CRC_TRAILER, CONFIG_RECORD_WORDS, CONFIG_REGISTER, record_mask,
};
use batman_protocol::register::SUPPLY_BYTE_SWAP_CHIPS;
use batman_protocol::{
    CONFIG_WRITE_WORDS, Command, MAX_CHIPS, RX_FRAME_LEN, Register, SENTINEL,
    SLOTS_PER_CHIP, payload_crc14,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("injected transport fault on exchange {0}")]
pub struct MockBusError(pub usize);

/// Register contents of one simulated chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockChip {
    /// Raw cell codes (12.5 counts per mV).
    pub cell_raw: [u16; SLOTS_PER_CHIP],
    pub chip_total: u16,
    pub temp1: u16,
    pub supply: u16,
    pub temp2: u16,
    /// Temperature-request word, as sent on the wire.
    pub temperature: u16,
    pub config: [u16; 2],
}

impl Default for MockChip {
    fn default() -> Self {
        Self {
            cell_raw: [0; SLOTS_PER_CHIP],
            chip_total: 0,
            temp1: 0,
            supply: 0,
            temp2: 0,
            temperature: 0,
            config: [0xF300, 0x0000],
        }
    }
}

/// Smallest raw code that decodes to exactly `mv`.
pub fn millivolts_to_raw(mv: u16) -> u16 {
    let raw = (u32::from(mv) * 25).div_ceil(2);
    u16::try_from(raw).unwrap_or(u16::MAX)
}

impl MockChip {
    /// A chip with `cells` populated from slot 0 upward.
    pub fn with_cells_mv(cells: &[u16]) -> Self {
        let mut chip = Self::default();
        for (raw, &mv) in chip.cell_raw.iter_mut().zip(cells) {
            *raw = millivolts_to_raw(mv);
        }
        chip
    }

    pub fn set_cell_mv(&mut self, slot: usize, mv: u16) {
        if let Some(raw) = self.cell_raw.get_mut(slot) {
            *raw = millivolts_to_raw(mv);
        }
    }
}

#[derive(Debug, Default)]
pub struct MockTransport {
    chips: Vec<MockChip>,
    silent: bool,
    cs_active: bool,
    current: Vec<u16>,
    reply: Vec<u8>,
    frames: Vec<Vec<u16>>,
    exchanges: usize,
    fail_after: Option<usize>,
    delay_us_total: u64,
    outside_cs: usize,
    wake_frames: usize,
    balance_writes: Vec<[u16; MAX_CHIPS]>,
    crc_errors: usize,
}

impl MockTransport {
    /// A chain of `chips` blank chips (at most eight answer).
    pub fn new(chips: usize) -> Self {
        Self {
            chips: vec![MockChip::default(); chips.min(MAX_CHIPS)],
            ..Self::default()
        }
    }

    pub fn with_chips(mut chips: Vec<MockChip>) -> Self {
        chips.truncate(MAX_CHIPS);
        Self {
            chips,
            ..Self::default()
        }
    }

    pub fn chip_mut(&mut self, index: usize) -> Option<&mut MockChip> {
        self.chips.get_mut(index)
    }

    pub fn chip(&self, index: usize) -> Option<&MockChip> {
        self.chips.get(index)
    }

    /// Make every chip stop answering (MISO floats high).
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    /// Fail every exchange after the next `count` succeed.
    pub fn fail_after(&mut self, count: usize) {
        self.fail_after = Some(self.exchanges.saturating_add(count));
    }

    /// Clear an injected fault.
    pub fn heal(&mut self) {
        self.fail_after = None;
    }

    pub fn chip_select_active(&self) -> bool {
        self.cs_active
    }

    /// Every completed chip-select frame, oldest first.
    pub fn frames(&self) -> Vec<Vec<u16>> {
        self.frames.clone()
    }

    pub fn take_frames(&mut self) -> Vec<Vec<u16>> {
        std::mem::take(&mut self.frames)
    }

    pub fn exchanges(&self) -> usize {
        self.exchanges
    }

    /// Words clocked while chip select was released.
    pub fn exchanges_outside_chip_select(&self) -> usize {
        self.outside_cs
    }

    pub fn wake_frames(&self) -> usize {
        self.wake_frames
    }

    pub fn total_delay_us(&self) -> u64 {
        self.delay_us_total
    }

    /// Phase-masked balance masks from each configuration write, per chip.
    pub fn balance_writes(&self) -> &[[u16; MAX_CHIPS]] {
        &self.balance_writes
    }

    pub fn last_balance_masks(&self) -> Option<[u16; MAX_CHIPS]> {
        self.balance_writes.last().copied()
    }

    /// Configuration records whose CRC did not check.
    pub fn crc_errors(&self) -> usize {
        self.crc_errors
    }

    fn encode_reply(&self, register: Register) -> Vec<u8> {
        let mut buf = vec![0xFF; RX_FRAME_LEN];
        if self.silent {
            return buf;
        }
        let stride = register.stride();
        let group = Register::CELL_GROUPS.iter().position(|&g| g == register);

        for (index, chip) in self.chips.iter().enumerate() {
            let base = index * stride;
            let Some(segment) = buf.get_mut(base..base + stride) else {
                continue;
            };
            segment.fill(0x00);
            let mut put = |offset: usize, bytes: [u8; 2]| {
                if let Some(dst) = segment.get_mut(offset..offset + 2) {
                    dst.copy_from_slice(&bytes);
                }
            };

            match (register, group) {
                (_, Some(g)) => {
                    for i in 0..3 {
                        let raw = chip.cell_raw.get(g * 3 + i).copied().unwrap_or_default();
                        put(2 * i, raw.to_le_bytes());
                    }
                }
                (Register::ChipTotal, _) => put(2, chip.chip_total.to_le_bytes()),
                (Register::AuxA, _) => {
                    let supply = if SUPPLY_BYTE_SWAP_CHIPS.contains(&index) {
                        chip.supply.swap_bytes()
                    } else {
                        chip.supply
                    };
                    put(0, chip.temp1.to_le_bytes());
                    put(2, supply.to_le_bytes());
                    put(4, chip.temp2.to_le_bytes());
                }
                (Register::Config, _) => {
                    put(0, chip.config[0].to_be_bytes());
                    put(2, chip.config[1].to_be_bytes());
                }
                _ => {}
            }
        }
        buf
    }

    fn temperature_word(&self, position: usize) -> u16 {
        if self.silent {
            return SENTINEL;
        }
        // Reply word `1 + 4n` (after the command word) belongs to chip `n`.
        match position.checked_sub(2) {
            Some(offset) if offset % 4 == 0 => self
                .chips
                .get(offset / 4)
                .map_or(SENTINEL, |chip| chip.temperature),
            _ => 0x0000,
        }
    }

    fn respond(&mut self, position: usize) -> u16 {
        let Some(&first) = self.current.first() else {
            return SENTINEL;
        };
        if first == Command::RequestTemperatures.word() {
            return self.temperature_word(position);
        }
        let [id, low] = first.to_be_bytes();
        if low != 0x00 || Register::from_id(id).is_err() {
            return SENTINEL;
        }
        if position == 1 {
            if let Ok(register) = Register::from_id(id) {
                self.reply = self.encode_reply(register);
            }
            return SENTINEL;
        }
        match position.checked_sub(2) {
            Some(word) => match self.reply.get(word * 2..word * 2 + 2) {
                Some(&[hi, lo]) => u16::from_be_bytes([hi, lo]),
                _ => SENTINEL,
            },
            None => SENTINEL,
        }
    }

    fn close_frame(&mut self) {
        let frame = std::mem::take(&mut self.current);
        self.reply.clear();
        match frame.first() {
            Some(&w) if w == Command::Wake.word() => {
                self.wake_frames = self.wake_frames.saturating_add(1);
            }
            Some(&w) if w == Command::WriteConfig.word() && frame.len() == CONFIG_WRITE_WORDS => {
                self.apply_config_write(&frame);
            }
            _ => {}
        }
        if !frame.is_empty() {
            self.frames.push(frame);
        }
    }

    fn apply_config_write(&mut self, frame: &[u16]) {
        let mut masks = [0u16; MAX_CHIPS];
        let records = frame.get(1..).unwrap_or_default();
        for (h, record) in records.chunks_exact(CONFIG_RECORD_WORDS).enumerate() {
            let &[_, word, crc] = record else {
                continue;
            };
            let chip = MAX_CHIPS - 1 - h;
            let [lo, hi] = word.to_be_bytes();
            let expected = payload_crc14(
                &[CONFIG_REGISTER, 0x00, lo, hi],
                CONFIG_CRC_SEED,
                Some(CONFIG_CRC_TRAILER),
            );
            if crc != expected {
                self.crc_errors = self.crc_errors.saturating_add(1);
                continue;
            }
            let mask = record_mask(word);
            if let Some(slot) = masks.get_mut(chip) {
                *slot = mask;
            }
            if let Some(target) = self.chips.get_mut(chip) {
                target.config = [0xF300, word];
            }
        }
        self.balance_writes.push(masks);
    }
}

impl SpiTransport for MockTransport {
    type Error = MockBusError;

    fn exchange(&mut self, word: u16) -> Result<u16, Self::Error> {
        if self.fail_after.is_some_and(|limit| self.exchanges >= limit) {
            return Err(MockBusError(self.exchanges));
        }
        self.exchanges = self.exchanges.saturating_add(1);
        if !self.cs_active {
            self.outside_cs = self.outside_cs.saturating_add(1);
            return Ok(SENTINEL);
        }
        self.current.push(word);
        let position = self.current.len() - 1;
        Ok(self.respond(position))
    }

    fn set_chip_select(&mut self, active: bool) {
        if self.cs_active && !active {
            self.close_frame();
        }
        self.cs_active = active;
    }

    fn delay_us(&mut self, micros: u32) {
        self.delay_us_total = self.delay_us_total.saturating_add(u64::from(micros));
    }
}
