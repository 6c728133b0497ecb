//! Pack-level reduction of raw chip readings.
//!
//! Cells are numbered on demand: scanning chips `0..chip_count` and slots
//! `0..15` in order, the n-th populated slot is cell `n` (1-based). The
//! numbering is a pure function of which slots currently read above the
//! presence threshold, so it shifts if a cell drops out.

use crate::balancing::BalancePolicy;
use batman_protocol::{MAX_CHIPS, PRESENT_THRESHOLD, RegisterStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Volts per LSB of the chip-total register.
pub const CHIP_TOTAL_VOLTS_PER_LSB: f32 = 0.00128;

/// Raw counts per millivolt on the 5 V supply channel.
pub const SUPPLY_COUNTS_PER_MV: f32 = 12.5;

/// Chips whose decoded supply word is byte-reversed again when published.
///
/// Chip 0 is also in the decoder's swap table, so its published value comes
/// from the word as it arrived on the wire.
pub const SUPPLY_PUBLISH_SWAP_CHIPS: [usize; 1] = [0];

/// Die-temperature code at the pivot of the transfer function.
pub const DIE_TEMP_PIVOT: u16 = 1131;

/// Location of a cell on the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellPosition {
    pub chip: usize,
    pub slot: usize,
}

/// One populated slot, with its sequential number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentCell {
    pub number: u16,
    pub position: CellPosition,
    pub millivolts: u16,
}

/// Populated slots in chain order, numbered from 1.
pub fn present_cells(
    store: &RegisterStore,
    chip_count: usize,
) -> impl Iterator<Item = PresentCell> + '_ {
    (0..chip_count.min(MAX_CHIPS))
        .filter_map(move |chip| store.chip_cells(chip).ok().map(|cells| (chip, cells)))
        .flat_map(|(chip, cells)| {
            cells
                .iter()
                .enumerate()
                .filter(|&(_, &mv)| mv > PRESENT_THRESHOLD)
                .map(move |(slot, &mv)| (CellPosition { chip, slot }, mv))
        })
        .zip(1u16..)
        .map(|((position, millivolts), number)| PresentCell {
            number,
            position,
            millivolts,
        })
}

/// Sequential number of the cell at `chip`/`slot`, if that slot is populated.
pub fn cell_number(store: &RegisterStore, chip_count: usize, chip: usize, slot: usize) -> Option<u16> {
    let target = CellPosition { chip, slot };
    present_cells(store, chip_count)
        .find(|cell| cell.position == target)
        .map(|cell| cell.number)
}

/// Inverse of [`cell_number`].
pub fn cell_position(store: &RegisterStore, chip_count: usize, number: u16) -> Option<CellPosition> {
    present_cells(store, chip_count)
        .find(|cell| cell.number == number)
        .map(|cell| cell.position)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellSummary {
    pub max_mv: u16,
    /// Sequential number of the first cell at `max_mv`.
    pub max_cell: Option<u16>,
    pub min_mv: u16,
    /// Sequential number of the first cell at `min_mv`.
    pub min_cell: Option<u16>,
    pub delta_mv: u16,
    pub present: u16,
    pub per_chip: [u8; MAX_CHIPS],
    /// Bit `slot` set for every slot to discharge, per chip.
    pub balance_masks: [u16; MAX_CHIPS],
    /// Sequential numbers of the cells flagged for balancing, ascending.
    pub balancing: Vec<u16>,
}

impl CellSummary {
    pub fn balancing_count(&self) -> usize {
        self.balancing.len()
    }

    pub fn is_balancing(&self) -> bool {
        !self.balancing.is_empty()
    }
}

/// Extremes, counts and balance masks over every populated cell.
///
/// The balance threshold is measured against this pass's minimum.
pub fn reduce_cells(store: &RegisterStore, chip_count: usize, policy: &BalancePolicy) -> CellSummary {
    let mut summary = CellSummary::default();
    let mut min: Option<(u16, u16)> = None;
    let mut max: Option<(u16, u16)> = None;

    for cell in present_cells(store, chip_count) {
        if max.is_none_or(|(mv, _)| cell.millivolts > mv) {
            max = Some((cell.millivolts, cell.number));
        }
        if min.is_none_or(|(mv, _)| cell.millivolts < mv) {
            min = Some((cell.millivolts, cell.number));
        }
        if let Some(count) = summary.per_chip.get_mut(cell.position.chip) {
            *count = count.saturating_add(1);
        }
        summary.present = summary.present.saturating_add(1);
    }

    if let Some((mv, number)) = max {
        summary.max_mv = mv;
        summary.max_cell = Some(number);
    }
    if let Some((mv, number)) = min {
        summary.min_mv = mv;
        summary.min_cell = Some(number);
    }
    summary.delta_mv = summary.max_mv.saturating_sub(summary.min_mv);

    if policy.is_enabled() && summary.present > 0 {
        for cell in present_cells(store, chip_count) {
            if !policy.should_balance(cell.millivolts, summary.min_mv) {
                continue;
            }
            if let Some(mask) = summary.balance_masks.get_mut(cell.position.chip) {
                *mask |= 1 << cell.position.slot;
            }
            summary.balancing.push(cell.number);
        }
    }

    debug!(
        present = summary.present,
        max_mv = summary.max_mv,
        min_mv = summary.min_mv,
        delta_mv = summary.delta_mv,
        balancing = summary.balancing.len(),
        "cell voltages reduced"
    );
    summary
}

/// Die temperature from a temperature-request word (bytes arrive swapped).
pub fn die_temperature_c(word: u16) -> f32 {
    let raw = word.swap_bytes();
    if raw == 0 {
        0.0
    } else if raw >= DIE_TEMP_PIVOT {
        f32::from(raw - DIE_TEMP_PIVOT) / 10.0
    } else {
        f32::from(DIE_TEMP_PIVOT - raw) / 10.0
    }
}

/// AuxA thermistor channel to degrees Celsius.
pub fn thermistor_c(raw: u16) -> f32 {
    f32::from(raw) * 0.01 - 40.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TemperatureSummary {
    pub chip_c: [f32; MAX_CHIPS],
    pub sensor_c: [[f32; 2]; MAX_CHIPS],
    /// Hottest thermistor reading across configured chips.
    pub max_c: f32,
    pub min_c: f32,
}

pub fn reduce_temperatures(store: &RegisterStore, chip_count: usize) -> TemperatureSummary {
    let mut summary = TemperatureSummary::default();
    let mut range: Option<(f32, f32)> = None;

    for chip in 0..chip_count.min(MAX_CHIPS) {
        let (Ok(word), Ok(aux)) = (store.temperature_raw(chip), store.aux(chip)) else {
            continue;
        };
        if let Some(slot) = summary.chip_c.get_mut(chip) {
            *slot = die_temperature_c(word);
        }
        let sensors = [thermistor_c(aux.temp1), thermistor_c(aux.temp2)];
        if let Some(slot) = summary.sensor_c.get_mut(chip) {
            *slot = sensors;
        }
        for reading in sensors {
            range = Some(match range {
                Some((lo, hi)) => (lo.min(reading), hi.max(reading)),
                None => (reading, reading),
            });
        }
    }

    if let Some((lo, hi)) = range {
        summary.min_c = lo;
        summary.max_c = hi;
    }
    summary
}

/// Per-cell limits used for the pack charge/discharge voltages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellLimits {
    pub high_mv: u16,
    pub low_mv: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AuxSummary {
    pub chip_volts: [f32; MAX_CHIPS],
    pub supply_mv: [f32; MAX_CHIPS],
    pub pack_volts: f32,
    pub avg_cell_mv: f32,
    pub charge_limit_v: f32,
    pub discharge_limit_v: f32,
}

/// Pack voltage from the chip totals, plus the derived averages and limits.
///
/// `present` is the populated cell count from [`reduce_cells`].
pub fn reduce_aux(
    store: &RegisterStore,
    chip_count: usize,
    present: u16,
    limits: CellLimits,
) -> AuxSummary {
    let mut summary = AuxSummary::default();

    for chip in 0..chip_count.min(MAX_CHIPS) {
        if let (Ok(raw), Some(slot)) = (store.chip_total_raw(chip), summary.chip_volts.get_mut(chip)) {
            *slot = f32::from(raw) * CHIP_TOTAL_VOLTS_PER_LSB;
            summary.pack_volts += *slot;
        }
        if let (Ok(aux), Some(slot)) = (store.aux(chip), summary.supply_mv.get_mut(chip)) {
            let word = if SUPPLY_PUBLISH_SWAP_CHIPS.contains(&chip) {
                aux.supply.swap_bytes()
            } else {
                aux.supply
            };
            *slot = f32::from(word) / SUPPLY_COUNTS_PER_MV;
        }
    }

    if chip_count == 0 || present == 0 {
        warn!(chip_count, present, "no cells present, pack averages and limits zeroed");
        return summary;
    }

    let cells = f32::from(present);
    summary.avg_cell_mv = summary.pack_volts / cells * 1000.0;
    summary.charge_limit_v = f32::from(limits.high_mv) * 0.001 * cells;
    summary.discharge_limit_v = f32::from(limits.low_mv) * 0.001 * cells;
    summary
}

/// Everything one reduction pass produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackStatistics {
    pub cells: CellSummary,
    pub temperatures: TemperatureSummary,
    pub aux: AuxSummary,
}
