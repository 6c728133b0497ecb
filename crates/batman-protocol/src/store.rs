//! Raw register values, one slot per chip position.
//!
//! The store holds the last good value of every register word. Decoders only
//! write words that passed the sentinel check, so a chip that stops answering
//! keeps its previous readings until it comes back.

use crate::error::{ProtocolError, ProtocolResult};
use crate::{MAX_CHIPS, SLOTS_PER_CHIP};
use serde::{Deserialize, Serialize};

/// The three words of the AuxA register for one chip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxWords {
    /// First thermistor channel, raw code.
    pub temp1: u16,
    /// 5 V reference rail, raw code (already byte-corrected).
    pub supply: u16,
    /// Second thermistor channel, raw code.
    pub temp2: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterStore {
    cells_mv: [[u16; SLOTS_PER_CHIP]; MAX_CHIPS],
    chip_total: [u16; MAX_CHIPS],
    aux: [AuxWords; MAX_CHIPS],
    temperature: [u16; MAX_CHIPS],
    config: [[u16; 2]; MAX_CHIPS],
}

fn chip_out_of_range(index: usize) -> ProtocolError {
    ProtocolError::ChipOutOfRange {
        index,
        max: MAX_CHIPS,
    }
}

fn slot_out_of_range(index: usize) -> ProtocolError {
    ProtocolError::SlotOutOfRange {
        index,
        max: SLOTS_PER_CHIP,
    }
}

impl RegisterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every stored reading.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Stored cell voltage in millivolts.
    ///
    /// # Errors
    ///
    /// Returns an error if `chip` or `slot` is outside the chain geometry.
    pub fn cell_mv(&self, chip: usize, slot: usize) -> ProtocolResult<u16> {
        self.chip_cells(chip)?
            .get(slot)
            .copied()
            .ok_or_else(|| slot_out_of_range(slot))
    }

    /// # Errors
    ///
    /// Returns an error if `chip` or `slot` is outside the chain geometry.
    pub fn set_cell_mv(&mut self, chip: usize, slot: usize, millivolts: u16) -> ProtocolResult<()> {
        let cell = self
            .cells_mv
            .get_mut(chip)
            .ok_or_else(|| chip_out_of_range(chip))?
            .get_mut(slot)
            .ok_or_else(|| slot_out_of_range(slot))?;
        *cell = millivolts;
        Ok(())
    }

    /// All fifteen slots of one chip.
    ///
    /// # Errors
    ///
    /// Returns an error if `chip` is outside the chain geometry.
    pub fn chip_cells(&self, chip: usize) -> ProtocolResult<&[u16; SLOTS_PER_CHIP]> {
        self.cells_mv.get(chip).ok_or_else(|| chip_out_of_range(chip))
    }

    /// Raw chip-total code (1.28 mV per LSB).
    ///
    /// # Errors
    ///
    /// Returns an error if `chip` is outside the chain geometry.
    pub fn chip_total_raw(&self, chip: usize) -> ProtocolResult<u16> {
        self.chip_total
            .get(chip)
            .copied()
            .ok_or_else(|| chip_out_of_range(chip))
    }

    /// # Errors
    ///
    /// Returns an error if `chip` is outside the chain geometry.
    pub fn set_chip_total_raw(&mut self, chip: usize, raw: u16) -> ProtocolResult<()> {
        let slot = self
            .chip_total
            .get_mut(chip)
            .ok_or_else(|| chip_out_of_range(chip))?;
        *slot = raw;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if `chip` is outside the chain geometry.
    pub fn aux(&self, chip: usize) -> ProtocolResult<AuxWords> {
        self.aux
            .get(chip)
            .copied()
            .ok_or_else(|| chip_out_of_range(chip))
    }

    /// Mutable AuxA words for one chip; decoders update the words one at a time.
    ///
    /// # Errors
    ///
    /// Returns an error if `chip` is outside the chain geometry.
    pub fn aux_mut(&mut self, chip: usize) -> ProtocolResult<&mut AuxWords> {
        self.aux
            .get_mut(chip)
            .ok_or_else(|| chip_out_of_range(chip))
    }

    /// Raw temperature-request word, as received (not yet byte-reversed).
    ///
    /// # Errors
    ///
    /// Returns an error if `chip` is outside the chain geometry.
    pub fn temperature_raw(&self, chip: usize) -> ProtocolResult<u16> {
        self.temperature
            .get(chip)
            .copied()
            .ok_or_else(|| chip_out_of_range(chip))
    }

    /// # Errors
    ///
    /// Returns an error if `chip` is outside the chain geometry.
    pub fn set_temperature_raw(&mut self, chip: usize, raw: u16) -> ProtocolResult<()> {
        let slot = self
            .temperature
            .get_mut(chip)
            .ok_or_else(|| chip_out_of_range(chip))?;
        *slot = raw;
        Ok(())
    }

    /// The two configuration words read back from a chip.
    ///
    /// # Errors
    ///
    /// Returns an error if `chip` is outside the chain geometry.
    pub fn config_words(&self, chip: usize) -> ProtocolResult<[u16; 2]> {
        self.config
            .get(chip)
            .copied()
            .ok_or_else(|| chip_out_of_range(chip))
    }

    /// # Errors
    ///
    /// Returns an error if `chip` or `index` is out of range.
    pub fn set_config_word(&mut self, chip: usize, index: usize, word: u16) -> ProtocolResult<()> {
        let slot = self
            .config
            .get_mut(chip)
            .ok_or_else(|| chip_out_of_range(chip))?
            .get_mut(index)
            .ok_or(ProtocolError::SlotOutOfRange { index, max: 2 })?;
        *slot = word;
        Ok(())
    }
}
