//! Chain configuration.

use crate::error::{ChainError, ChainResult};
use batman_protocol::{MAX_BOARDS, chip_count_for_boards};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shortest accepted comms timeout.
pub const MIN_COMMS_TIMEOUT_MS: u32 = 100;

/// Longest accepted comms timeout.
pub const MAX_COMMS_TIMEOUT_MS: u32 = 60_000;

/// Driver configuration for one BMB chain.
///
/// Loading this from storage is the caller's business; the driver only
/// validates what it is handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Boards on the chain (two chips each).
    ///
    /// Default: 1.
    pub boards: u8,

    /// Drive balancing from the aggregation pass.
    ///
    /// Default: off.
    pub balance_enabled: bool,

    /// A cell is balanced when it sits more than this above the pack minimum.
    ///
    /// Default: 20 mV.
    pub balance_hysteresis_mv: u16,

    /// Per-cell voltage used for the pack charge limit.
    ///
    /// Default: 4200 mV.
    pub cell_high_limit_mv: u16,

    /// Per-cell voltage used for the pack discharge limit.
    ///
    /// Default: 3000 mV.
    pub cell_low_limit_mv: u16,

    /// Silence after which the chain is re-woken.
    ///
    /// One poll cycle is 29 ticks, so at a 100 ms tick the gap between the
    /// last read and the next wake check is about 2.4 s.
    ///
    /// Default: 5000 ms.
    pub comms_timeout_ms: u32,
}

impl ChainConfig {
    /// Create a configuration for `boards` boards with default limits.
    ///
    /// # Errors
    ///
    /// Returns an error if `boards` is outside `1..=4`.
    pub fn new(boards: u8) -> ChainResult<Self> {
        let config = Self {
            boards,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> ChainConfigBuilder {
        ChainConfigBuilder::default()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> ChainResult<()> {
        if !(1..=MAX_BOARDS).contains(&self.boards) {
            return Err(ChainError::invalid_configuration(format!(
                "boards must be between 1 and {MAX_BOARDS}"
            )));
        }
        if self.cell_low_limit_mv >= self.cell_high_limit_mv {
            return Err(ChainError::invalid_configuration(
                "cell_low_limit_mv must be below cell_high_limit_mv",
            ));
        }
        if !(MIN_COMMS_TIMEOUT_MS..=MAX_COMMS_TIMEOUT_MS).contains(&self.comms_timeout_ms) {
            return Err(ChainError::invalid_configuration(format!(
                "comms_timeout_ms must be between {MIN_COMMS_TIMEOUT_MS} and {MAX_COMMS_TIMEOUT_MS}"
            )));
        }
        Ok(())
    }

    /// Chips on the chain.
    ///
    /// # Errors
    ///
    /// Returns an error if `boards` is outside `1..=4`.
    pub fn chip_count(&self) -> ChainResult<usize> {
        Ok(chip_count_for_boards(self.boards)?)
    }

    #[must_use]
    pub fn comms_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.comms_timeout_ms))
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            boards: 1,
            balance_enabled: false,
            balance_hysteresis_mv: 20,
            cell_high_limit_mv: 4200,
            cell_low_limit_mv: 3000,
            comms_timeout_ms: 5000,
        }
    }
}

/// Builder for `ChainConfig`.
#[derive(Debug, Default)]
pub struct ChainConfigBuilder {
    config: ChainConfig,
}

impl ChainConfigBuilder {
    #[must_use]
    pub fn boards(mut self, boards: u8) -> Self {
        self.config.boards = boards;
        self
    }

    #[must_use]
    pub fn balance_enabled(mut self, enabled: bool) -> Self {
        self.config.balance_enabled = enabled;
        self
    }

    #[must_use]
    pub fn balance_hysteresis_mv(mut self, mv: u16) -> Self {
        self.config.balance_hysteresis_mv = mv;
        self
    }

    #[must_use]
    pub fn cell_high_limit_mv(mut self, mv: u16) -> Self {
        self.config.cell_high_limit_mv = mv;
        self
    }

    #[must_use]
    pub fn cell_low_limit_mv(mut self, mv: u16) -> Self {
        self.config.cell_low_limit_mv = mv;
        self
    }

    #[must_use]
    pub fn comms_timeout_ms(mut self, ms: u32) -> Self {
        self.config.comms_timeout_ms = ms;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> ChainResult<ChainConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
