//! Published pack values.

use crate::aggregator::PackStatistics;
use crate::config::ChainConfig;
use crate::sequencer::PollState;
use serde::{Deserialize, Serialize};

/// A point-in-time copy of everything the driver publishes.
///
/// Per-chip vectors hold one entry per configured chip; `cell_voltages_mv`
/// is ordered by sequential cell number (`cell_voltages_mv[0]` is cell 1).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackSnapshot {
    pub cycle_count: u32,
    pub poll_state: u8,
    pub comms_ok: bool,
    pub boards: u8,
    pub chip_count: usize,

    pub cells_present: u16,
    pub cell_v_max_mv: u16,
    pub max_cell: Option<u16>,
    pub cell_v_min_mv: u16,
    pub min_cell: Option<u16>,
    pub cell_delta_mv: u16,
    pub cells_per_chip: Vec<u8>,
    pub cell_voltages_mv: Vec<u16>,

    pub pack_volts: f32,
    pub avg_cell_mv: f32,
    pub charge_limit_v: f32,
    pub discharge_limit_v: f32,
    pub chip_volts: Vec<f32>,
    pub supply_mv: Vec<f32>,

    pub temp_max_c: f32,
    pub temp_min_c: f32,
    pub chip_temps_c: Vec<f32>,
    pub sensor_temps_c: Vec<[f32; 2]>,

    pub balance_enabled: bool,
    pub balancing_cells: Vec<u16>,
    pub balance_masks: Vec<u16>,
}

fn head<U: Copy>(values: &[U], len: usize) -> Vec<U> {
    values.iter().take(len).copied().collect()
}

impl PackSnapshot {
    pub fn capture(
        stats: &PackStatistics,
        chip_count: usize,
        cell_voltages_mv: Vec<u16>,
        cycle_count: u32,
        poll_state: PollState,
        config: &ChainConfig,
        comms_ok: bool,
    ) -> Self {
        let cells = &stats.cells;
        let aux = &stats.aux;
        let temps = &stats.temperatures;
        Self {
            cycle_count,
            poll_state: poll_state.index(),
            comms_ok,
            boards: config.boards,
            chip_count,
            cells_present: cells.present,
            cell_v_max_mv: cells.max_mv,
            max_cell: cells.max_cell,
            cell_v_min_mv: cells.min_mv,
            min_cell: cells.min_cell,
            cell_delta_mv: cells.delta_mv,
            cells_per_chip: head(&cells.per_chip, chip_count),
            cell_voltages_mv,
            pack_volts: aux.pack_volts,
            avg_cell_mv: aux.avg_cell_mv,
            charge_limit_v: aux.charge_limit_v,
            discharge_limit_v: aux.discharge_limit_v,
            chip_volts: head(&aux.chip_volts, chip_count),
            supply_mv: head(&aux.supply_mv, chip_count),
            temp_max_c: temps.max_c,
            temp_min_c: temps.min_c,
            chip_temps_c: head(&temps.chip_c, chip_count),
            sensor_temps_c: head(&temps.sensor_c, chip_count),
            balance_enabled: config.balance_enabled,
            balancing_cells: cells.balancing.clone(),
            balance_masks: head(&cells.balance_masks, chip_count),
        }
    }
}
