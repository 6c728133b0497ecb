//! Chain executor.
//!
//! [`BmbChain`] owns everything one daisy chain needs: the transport, the raw
//! register store, the sequencer, the latest statistics and the balance
//! alternation. Each [`BmbChain::tick`] runs one state's bus operations to
//! completion. Several chains can coexist; nothing is global.

use crate::aggregator::{
    CellLimits, CellPosition, PackStatistics, cell_number, cell_position, present_cells,
    reduce_aux, reduce_cells, reduce_temperatures,
};
use crate::balancing::{BalancePolicy, PhaseAlternator};
use crate::config::ChainConfig;
use crate::error::{ChainError, ChainResult};
use crate::sequencer::{BusOp, PollSequencer, PollState, SETTLE_DELAY_US, TickInput};
use crate::telemetry::PackSnapshot;
use crate::transport::{ChipSelect, SpiTransport};
use batman_protocol::command::READ_PADDING_WORD;
use batman_protocol::{
    Command, DecodeOutcome, MAX_CHIPS, RX_FRAME_LEN, Register, RegisterStore, RxFrame,
    TEMPERATURE_REPLY_WORDS, decode_temperatures, encode_config_write,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// State whose operations ran.
    pub state: PollState,
    pub ops: usize,
    pub outcome: DecodeOutcome,
    /// Frames abandoned on a bus error.
    pub transport_errors: usize,
}

/// Running counters since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCounters {
    pub ticks: u64,
    pub frames: u64,
    pub transport_errors: u64,
    pub wakes: u64,
    pub config_writes: u64,
    pub accepted_words: u64,
    pub rejected_words: u64,
}

/// Cell balancing state as seen by a reporting consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancingSummary {
    pub present: u16,
    pub balancing_count: usize,
    /// Sequential numbers of the balancing cells, ascending.
    pub cells: Vec<u16>,
}

fn accumulate(counter: &mut u64, amount: usize) {
    *counter = counter.saturating_add(u64::try_from(amount).unwrap_or(u64::MAX));
}

/// One BMB daisy chain.
pub struct BmbChain<T: SpiTransport> {
    bus: T,
    config: ChainConfig,
    chip_count: usize,
    policy: BalancePolicy,
    store: RegisterStore,
    sequencer: PollSequencer,
    alternator: PhaseAlternator,
    stats: PackStatistics,
    counters: ChainCounters,
}

impl<T: SpiTransport> std::fmt::Debug for BmbChain<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BmbChain")
            .field("config", &self.config)
            .field("chip_count", &self.chip_count)
            .field("poll_state", &self.sequencer.poll_state())
            .field("cycle_count", &self.sequencer.cycle_count())
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl<T: SpiTransport> BmbChain<T> {
    /// Create a chain driver over `bus`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` does not validate.
    pub fn new(bus: T, config: ChainConfig) -> ChainResult<Self> {
        config.validate()?;
        let chip_count = config.chip_count()?;
        info!(
            boards = config.boards,
            chip_count,
            balance_enabled = config.balance_enabled,
            "BMB chain created"
        );
        Ok(Self {
            bus,
            config,
            chip_count,
            policy: BalancePolicy::new(config.balance_enabled, config.balance_hysteresis_mv),
            store: RegisterStore::new(),
            sequencer: PollSequencer::new(config.comms_timeout()),
            alternator: PhaseAlternator::default(),
            stats: PackStatistics::default(),
            counters: ChainCounters::default(),
        })
    }

    /// Replace the configuration between ticks.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` does not validate; the old one stays.
    pub fn set_config(&mut self, config: ChainConfig) -> ChainResult<()> {
        config.validate()?;
        let chip_count = config.chip_count()?;
        if chip_count != self.chip_count {
            info!(from = self.chip_count, to = chip_count, "chip count changed");
        }
        self.chip_count = chip_count;
        self.policy = BalancePolicy::new(config.balance_enabled, config.balance_hysteresis_mv);
        self.sequencer.set_comms_timeout(config.comms_timeout());
        self.config = config;
        Ok(())
    }

    /// Advance the sequencer one state and run its bus operations.
    ///
    /// Bus errors are logged and counted, never returned.
    pub fn tick(&mut self, elapsed: Duration) -> TickReport {
        let state = self.sequencer.poll_state();
        let was_timed_out = self.sequencer.is_timed_out();
        let ops = self.sequencer.advance(TickInput {
            elapsed,
            balancing_active: self.stats.cells.is_balancing(),
        });

        if state == PollState::CheckWake && !was_timed_out && self.sequencer.is_timed_out() {
            warn!(
                timeout_ms = self.config.comms_timeout_ms,
                "no response from chain within comms timeout"
            );
        }

        let mut report = TickReport {
            state,
            ops: ops.len(),
            ..TickReport::default()
        };

        for op in ops {
            match self.run(op, state) {
                Ok(outcome) => {
                    if outcome.is_live() {
                        self.sequencer.mark_response();
                    }
                    report.outcome.merge(outcome);
                }
                Err(err) => {
                    warn!(?op, state = state.index(), error = %err, "transport error, frame abandoned");
                    report.transport_errors = report.transport_errors.saturating_add(1);
                }
            }
        }

        self.counters.ticks = self.counters.ticks.wrapping_add(1);
        accumulate(&mut self.counters.transport_errors, report.transport_errors);
        accumulate(&mut self.counters.accepted_words, report.outcome.accepted);
        accumulate(&mut self.counters.rejected_words, report.outcome.rejected);

        if state == PollState::Idle && self.sequencer.poll_state() == PollState::CheckWake {
            debug!(
                cycle = self.sequencer.cycle_count(),
                present = self.stats.cells.present,
                max_mv = self.stats.cells.max_mv,
                min_mv = self.stats.cells.min_mv,
                pack_volts = self.stats.aux.pack_volts,
                "poll cycle complete"
            );
        }
        report
    }

    fn run(&mut self, op: BusOp, state: PollState) -> Result<DecodeOutcome, T::Error> {
        match op {
            BusOp::WakeChain => {
                if state == PollState::CheckWake {
                    info!(chip_count = self.chip_count, "waking chain");
                }
                self.wake()?;
            }
            BusOp::Mute => self.send(Command::Mute)?,
            BusOp::Unmute => self.send(Command::Unmute)?,
            BusOp::Snapshot => self.send(Command::Snapshot)?,
            BusOp::Settle => self.bus.delay_us(SETTLE_DELAY_US),
            BusOp::Read(register) => return self.read_register(register),
            BusOp::RequestTemperatures => return self.read_temperatures(),
            BusOp::WriteConfig => self.write_config()?,
            BusOp::Reduce => self.reduce(),
        }
        Ok(DecodeOutcome::default())
    }

    fn wake(&mut self) -> Result<(), T::Error> {
        for _ in 0..self.chip_count {
            self.send(Command::Wake)?;
        }
        self.counters.wakes = self.counters.wakes.wrapping_add(1);
        Ok(())
    }

    fn send(&mut self, command: Command) -> Result<(), T::Error> {
        self.counters.frames = self.counters.frames.wrapping_add(1);
        let mut cs = ChipSelect::assert(&mut self.bus);
        cs.write_all(command.frame().as_slice())
    }

    fn read_register(&mut self, register: Register) -> Result<DecodeOutcome, T::Error> {
        self.counters.frames = self.counters.frames.wrapping_add(1);
        let mut rx: RxFrame = [0; RX_FRAME_LEN];
        {
            let mut cs = ChipSelect::assert(&mut self.bus);
            cs.write_all(&register.header())?;
            for pair in rx.chunks_exact_mut(2) {
                pair.copy_from_slice(&cs.exchange(READ_PADDING_WORD)?.to_be_bytes());
            }
        }
        let outcome = register.decode(&rx, &mut self.store);
        if register.is_decoded() && !outcome.is_live() {
            trace!(?register, "no chip answered");
        }
        Ok(outcome)
    }

    fn read_temperatures(&mut self) -> Result<DecodeOutcome, T::Error> {
        self.counters.frames = self.counters.frames.wrapping_add(1);
        let mut words = [0u16; TEMPERATURE_REPLY_WORDS];
        {
            let mut cs = ChipSelect::assert(&mut self.bus);
            cs.write_all(Command::RequestTemperatures.frame().as_slice())?;
            for word in &mut words {
                *word = cs.exchange(READ_PADDING_WORD)?;
            }
        }
        Ok(decode_temperatures(&words, &mut self.store))
    }

    fn write_config(&mut self) -> Result<(), T::Error> {
        let masks = self.stats.cells.balance_masks;
        let phase = self.alternator.advance();
        let words = encode_config_write(&masks, phase);
        debug!(?phase, ?masks, "writing balance configuration");
        self.counters.frames = self.counters.frames.wrapping_add(1);
        {
            let mut cs = ChipSelect::assert(&mut self.bus);
            cs.write_all(&words)?;
        }
        self.counters.config_writes = self.counters.config_writes.wrapping_add(1);
        Ok(())
    }

    fn reduce(&mut self) {
        let temperatures = reduce_temperatures(&self.store, self.chip_count);
        let cells = reduce_cells(&self.store, self.chip_count, &self.policy);
        let aux = reduce_aux(
            &self.store,
            self.chip_count,
            cells.present,
            CellLimits {
                high_mv: self.config.cell_high_limit_mv,
                low_mv: self.config.cell_low_limit_mv,
            },
        );
        self.stats = PackStatistics {
            cells,
            temperatures,
            aux,
        };
    }

    /// Read AuxA once and report whether any chip answered.
    ///
    /// Runs outside the poll cycle; the sequencer state is untouched apart
    /// from the response timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Transport`] if the bus fails mid-frame.
    pub fn probe(&mut self) -> ChainResult<bool> {
        let outcome = self
            .read_register(Register::AuxA)
            .map_err(|err| ChainError::transport(err.to_string()))?;
        if outcome.is_live() {
            self.sequencer.mark_response();
        }
        debug!(accepted = outcome.accepted, "probe complete");
        Ok(outcome.is_live())
    }

    /// Return to `CheckWake` as if the chain had never answered.
    ///
    /// Stored readings and statistics are kept.
    pub fn reset(&mut self) {
        info!("chain sequencer reset");
        self.sequencer.reset();
    }

    pub fn cell_v_max_mv(&self) -> u16 {
        self.stats.cells.max_mv
    }

    pub fn cell_v_min_mv(&self) -> u16 {
        self.stats.cells.min_mv
    }

    /// Sequential number of the highest cell from the last reduction.
    pub fn max_cell(&self) -> Option<u16> {
        self.stats.cells.max_cell
    }

    pub fn min_cell(&self) -> Option<u16> {
        self.stats.cells.min_cell
    }

    /// Last stored voltage for `chip`/`slot`, in millivolts.
    ///
    /// # Errors
    ///
    /// Returns an error if `chip` or `slot` is out of range.
    pub fn raw_voltage(&self, chip: usize, slot: usize) -> ChainResult<u16> {
        Ok(self.store.cell_mv(chip, slot)?)
    }

    pub fn cell_number(&self, chip: usize, slot: usize) -> Option<u16> {
        cell_number(&self.store, self.chip_count, chip, slot)
    }

    pub fn cell_position(&self, number: u16) -> Option<CellPosition> {
        cell_position(&self.store, self.chip_count, number)
    }

    /// Present cell voltages ordered by sequential number.
    pub fn cell_voltages(&self) -> Vec<u16> {
        present_cells(&self.store, self.chip_count)
            .map(|cell| cell.millivolts)
            .collect()
    }

    pub fn balancing_summary(&self) -> BalancingSummary {
        BalancingSummary {
            present: self.stats.cells.present,
            balancing_count: self.stats.cells.balancing_count(),
            cells: self.stats.cells.balancing.clone(),
        }
    }

    /// Balance masks the next configuration write will send, before phase masking.
    pub fn balance_masks(&self) -> [u16; MAX_CHIPS] {
        self.stats.cells.balance_masks
    }

    pub fn chip_volts(&self, chip: usize) -> Option<f32> {
        self.configured(chip)
            .and_then(|chip| self.stats.aux.chip_volts.get(chip).copied())
    }

    /// 5 V rail of `chip`, in millivolts.
    pub fn supply_mv(&self, chip: usize) -> Option<f32> {
        self.configured(chip)
            .and_then(|chip| self.stats.aux.supply_mv.get(chip).copied())
    }

    pub fn chip_temperature_c(&self, chip: usize) -> Option<f32> {
        self.configured(chip)
            .and_then(|chip| self.stats.temperatures.chip_c.get(chip).copied())
    }

    fn configured(&self, chip: usize) -> Option<usize> {
        (chip < self.chip_count).then_some(chip)
    }

    pub fn cycle_count(&self) -> u32 {
        self.sequencer.cycle_count()
    }

    pub fn poll_state(&self) -> PollState {
        self.sequencer.poll_state()
    }

    /// No decoder has accepted a word within the comms timeout.
    pub fn is_timed_out(&self) -> bool {
        self.sequencer.is_timed_out()
    }

    pub fn statistics(&self) -> &PackStatistics {
        &self.stats
    }

    pub fn counters(&self) -> &ChainCounters {
        &self.counters
    }

    pub fn store(&self) -> &RegisterStore {
        &self.store
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn chip_count(&self) -> usize {
        self.chip_count
    }

    /// Everything a reporting consumer publishes, in one value.
    pub fn snapshot(&self) -> PackSnapshot {
        PackSnapshot::capture(
            &self.stats,
            self.chip_count,
            self.cell_voltages(),
            self.sequencer.cycle_count(),
            self.sequencer.poll_state(),
            &self.config,
            !self.sequencer.is_timed_out(),
        )
    }

    pub fn transport(&self) -> &T {
        &self.bus
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.bus
    }

    pub fn into_transport(self) -> T {
        self.bus
    }
}
