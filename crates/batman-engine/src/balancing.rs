//! Cell-balancing decision.

use batman_protocol::BalancePhase;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancePolicy {
    enabled: bool,
    hysteresis_mv: u16,
}

impl BalancePolicy {
    pub const fn new(enabled: bool, hysteresis_mv: u16) -> Self {
        Self {
            enabled,
            hysteresis_mv,
        }
    }

    pub const fn disabled() -> Self {
        Self::new(false, 0)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn hysteresis_mv(&self) -> u16 {
        self.hysteresis_mv
    }

    /// Balance a cell sitting strictly more than the hysteresis above the
    /// pack minimum.
    pub fn should_balance(&self, cell_mv: u16, pack_min_mv: u16) -> bool {
        self.enabled && u32::from(cell_mv) > u32::from(pack_min_mv) + u32::from(self.hysteresis_mv)
    }
}

/// Even/odd alternation across configuration writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseAlternator {
    phase: BalancePhase,
}

impl PhaseAlternator {
    pub fn current(&self) -> BalancePhase {
        self.phase
    }

    /// Phase for the write about to go out; the next call returns the other.
    pub fn advance(&mut self) -> BalancePhase {
        let phase = self.phase;
        self.phase = phase.toggled();
        phase
    }
}
