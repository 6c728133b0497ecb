//! Poll sequencer.
//!
//! One poll cycle walks nine states. Each tick runs exactly one state's bus
//! operations, so the host loop decides the pacing:
//!
//! ```text
//! CheckWake -> ReadAuxConfig -> Snapshot1 -> Snapshot2 -> ReadCellsLow
//!     ^                                                        |
//!     |                                                        v
//!   Idle <- Reduce <- WriteBalance <----------------------- ReadCellsHigh
//! ```
//!
//! The state table is a pure function ([`transition`]): it maps the current
//! [`SequencerState`] and a [`TickInput`] to the next state plus the list of
//! [`BusOp`]s to run. Nothing here touches the bus.

use batman_protocol::Register;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pause between consecutive commands within one state.
pub const SETTLE_DELAY_US: u32 = 125;

/// Idle ticks after which a new cycle starts.
pub const IDLE_TICKS_PER_CYCLE: u16 = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PollState {
    /// Re-wake the chain if it has gone quiet.
    #[default]
    CheckWake,
    ReadAuxConfig,
    Snapshot1,
    Snapshot2,
    /// Cell groups A to D.
    ReadCellsLow,
    /// Cell group E, chip totals, aux and temperatures.
    ReadCellsHigh,
    WriteBalance,
    Reduce,
    Idle,
}

impl PollState {
    pub const ALL: [PollState; 9] = [
        PollState::CheckWake,
        PollState::ReadAuxConfig,
        PollState::Snapshot1,
        PollState::Snapshot2,
        PollState::ReadCellsLow,
        PollState::ReadCellsHigh,
        PollState::WriteBalance,
        PollState::Reduce,
        PollState::Idle,
    ];

    /// Numeric state, 0..=8.
    pub fn index(self) -> u8 {
        match self {
            PollState::CheckWake => 0,
            PollState::ReadAuxConfig => 1,
            PollState::Snapshot1 => 2,
            PollState::Snapshot2 => 3,
            PollState::ReadCellsLow => 4,
            PollState::ReadCellsHigh => 5,
            PollState::WriteBalance => 6,
            PollState::Reduce => 7,
            PollState::Idle => 8,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }

    /// The following state; `Idle` wraps to `CheckWake`.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            PollState::CheckWake => PollState::ReadAuxConfig,
            PollState::ReadAuxConfig => PollState::Snapshot1,
            PollState::Snapshot1 => PollState::Snapshot2,
            PollState::Snapshot2 => PollState::ReadCellsLow,
            PollState::ReadCellsLow => PollState::ReadCellsHigh,
            PollState::ReadCellsHigh => PollState::WriteBalance,
            PollState::WriteBalance => PollState::Reduce,
            PollState::Reduce => PollState::Idle,
            PollState::Idle => PollState::CheckWake,
        }
    }
}

/// One bus-level step requested by the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusOp {
    /// One wake frame per expected chip.
    WakeChain,
    Mute,
    Unmute,
    Settle,
    Snapshot,
    Read(Register),
    RequestTemperatures,
    WriteConfig,
    Reduce,
}

/// Inputs that change from tick to tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickInput {
    /// Time since the previous tick.
    pub elapsed: Duration,
    /// Whether any cell is currently flagged for balancing.
    pub balancing_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencerState {
    pub poll_state: PollState,
    pub idle_ticks: u16,
    pub cycle_count: u32,
    /// Time since a decoder last accepted a word; `None` until the first answer.
    pub since_response: Option<Duration>,
    pub comms_timeout: Duration,
}

impl SequencerState {
    pub fn new(comms_timeout: Duration) -> Self {
        Self {
            poll_state: PollState::CheckWake,
            idle_ticks: 0,
            cycle_count: 0,
            since_response: None,
            comms_timeout,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        self.since_response
            .is_none_or(|age| age >= self.comms_timeout)
    }
}

fn quiesce(input: TickInput) -> BusOp {
    if input.balancing_active {
        BusOp::Mute
    } else {
        BusOp::Unmute
    }
}

/// Run one tick of the state table.
///
/// Returns the next state and the operations for the state that was current
/// on entry. Time in `input` is applied before the timeout check.
pub fn transition(state: SequencerState, input: TickInput) -> (SequencerState, Vec<BusOp>) {
    let mut next = state;
    next.since_response = state
        .since_response
        .map(|age| age.saturating_add(input.elapsed));

    let q = quiesce(input);
    let ops = match state.poll_state {
        PollState::CheckWake => {
            if next.is_timed_out() {
                vec![BusOp::WakeChain]
            } else {
                Vec::new()
            }
        }
        PollState::ReadAuxConfig => vec![
            q,
            BusOp::Read(Register::AuxA),
            BusOp::Read(Register::Config),
        ],
        PollState::Snapshot1 | PollState::Snapshot2 => vec![q, BusOp::Settle, BusOp::Snapshot],
        PollState::ReadCellsLow => vec![
            q,
            BusOp::Settle,
            BusOp::Read(Register::Status),
            BusOp::Settle,
            BusOp::Read(Register::Status),
            BusOp::Settle,
            BusOp::Read(Register::CellA),
            BusOp::Settle,
            BusOp::Read(Register::CellB),
            BusOp::Settle,
            BusOp::Read(Register::CellC),
            BusOp::Settle,
            BusOp::Read(Register::CellD),
        ],
        PollState::ReadCellsHigh => vec![
            q,
            BusOp::Settle,
            BusOp::Read(Register::Status),
            BusOp::Settle,
            BusOp::Read(Register::Status),
            BusOp::Settle,
            BusOp::Read(Register::CellE),
            BusOp::Settle,
            BusOp::Read(Register::ChipTotal),
            BusOp::Settle,
            BusOp::Read(Register::AuxA),
            BusOp::Settle,
            BusOp::RequestTemperatures,
        ],
        PollState::WriteBalance => vec![
            BusOp::WakeChain,
            BusOp::Read(Register::Config),
            BusOp::WriteConfig,
            BusOp::Read(Register::Config),
            BusOp::Unmute,
        ],
        PollState::Reduce => vec![BusOp::Reduce],
        PollState::Idle => Vec::new(),
    };

    next.poll_state = if state.poll_state == PollState::Idle {
        next.idle_ticks = state.idle_ticks.saturating_add(1);
        if next.idle_ticks > IDLE_TICKS_PER_CYCLE {
            next.idle_ticks = 0;
            next.cycle_count = state.cycle_count.wrapping_add(1);
            PollState::CheckWake
        } else {
            PollState::Idle
        }
    } else {
        state.poll_state.next()
    };

    (next, ops)
}

/// Owner of the sequencer state.
#[derive(Debug, Clone)]
pub struct PollSequencer {
    state: SequencerState,
}

impl PollSequencer {
    pub fn new(comms_timeout: Duration) -> Self {
        Self {
            state: SequencerState::new(comms_timeout),
        }
    }

    /// Advance one tick and return the operations to run.
    pub fn advance(&mut self, input: TickInput) -> Vec<BusOp> {
        let (next, ops) = transition(self.state, input);
        self.state = next;
        ops
    }

    /// A decoder accepted at least one word.
    pub fn mark_response(&mut self) {
        self.state.since_response = Some(Duration::ZERO);
    }

    pub fn set_comms_timeout(&mut self, timeout: Duration) {
        self.state.comms_timeout = timeout;
    }

    /// Drop back to `CheckWake` as if the chain had never answered.
    pub fn reset(&mut self) {
        self.state = SequencerState::new(self.state.comms_timeout);
    }

    pub fn state(&self) -> &SequencerState {
        &self.state
    }

    pub fn poll_state(&self) -> PollState {
        self.state.poll_state
    }

    pub fn cycle_count(&self) -> u32 {
        self.state.cycle_count
    }

    pub fn is_timed_out(&self) -> bool {
        self.state.is_timed_out()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(2);

    fn tick(state: SequencerState) -> (SequencerState, Vec<BusOp>) {
        transition(
            state,
            TickInput {
                elapsed: Duration::from_millis(10),
                balancing_active: false,
            },
        )
    }

    #[test]
    fn test_index_round_trip() {
        for state in PollState::ALL {
            assert_eq!(PollState::from_index(state.index()), Some(state));
        }
        assert_eq!(PollState::from_index(9), None);
    }

    #[test]
    fn test_fresh_state_wakes() {
        let (next, ops) = tick(SequencerState::new(TIMEOUT));
        assert_eq!(ops, vec![BusOp::WakeChain]);
        assert_eq!(next.poll_state, PollState::ReadAuxConfig);
    }

    #[test]
    fn test_recent_response_skips_wake() {
        let mut state = SequencerState::new(TIMEOUT);
        state.since_response = Some(Duration::from_millis(100));
        let (next, ops) = tick(state);
        assert!(ops.is_empty());
        assert_eq!(next.poll_state, PollState::ReadAuxConfig);
        assert_eq!(next.since_response, Some(Duration::from_millis(110)));
    }

    #[test]
    fn test_timeout_boundary_is_inclusive() {
        let mut state = SequencerState::new(TIMEOUT);
        state.since_response = Some(Duration::from_millis(1990));
        let (_, ops) = tick(state);
        assert_eq!(ops, vec![BusOp::WakeChain]);
    }

    #[test]
    fn test_quiesce_follows_balancing_flag() {
        let mut state = SequencerState::new(TIMEOUT);
        state.poll_state = PollState::Snapshot1;
        let (_, ops) = transition(
            state,
            TickInput {
                elapsed: Duration::ZERO,
                balancing_active: true,
            },
        );
        assert_eq!(ops, vec![BusOp::Mute, BusOp::Settle, BusOp::Snapshot]);
    }

    #[test]
    fn test_cell_reads_are_separated_by_settle() {
        let mut state = SequencerState::new(TIMEOUT);
        state.poll_state = PollState::ReadCellsLow;
        let (_, ops) = tick(state);
        let reads: Vec<_> = ops
            .iter()
            .filter(|op| matches!(op, BusOp::Read(_)))
            .collect();
        assert_eq!(reads.len(), 6);
        for pair in ops.windows(2) {
            if let [BusOp::Read(_), second] = pair {
                assert_eq!(*second, BusOp::Settle);
            }
        }
    }

    #[test]
    fn test_idle_runs_twenty_one_ticks() {
        let mut state = SequencerState::new(TIMEOUT);
        state.poll_state = PollState::Idle;
        for _ in 0..IDLE_TICKS_PER_CYCLE {
            let (next, ops) = tick(state);
            assert!(ops.is_empty());
            assert_eq!(next.poll_state, PollState::Idle);
            state = next;
        }
        let (next, _) = tick(state);
        assert_eq!(next.poll_state, PollState::CheckWake);
        assert_eq!(next.idle_ticks, 0);
        assert_eq!(next.cycle_count, 1);
    }

    #[test]
    fn test_full_cycle_length() {
        let mut seq = PollSequencer::new(TIMEOUT);
        let input = TickInput::default();
        let mut ticks = 0;
        loop {
            seq.advance(input);
            ticks += 1;
            if seq.poll_state() == PollState::CheckWake {
                break;
            }
        }
        // Eight working states plus 21 idle ticks.
        assert_eq!(ticks, 8 + usize::from(IDLE_TICKS_PER_CYCLE) + 1);
        assert_eq!(seq.cycle_count(), 1);
    }

    #[test]
    fn test_mark_response_clears_timeout() {
        let mut seq = PollSequencer::new(TIMEOUT);
        assert!(seq.is_timed_out());
        seq.mark_response();
        assert!(!seq.is_timed_out());
        seq.reset();
        assert!(seq.is_timed_out());
    }
}
