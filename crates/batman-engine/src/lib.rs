//! # batman-engine
//!
//! Drives a daisy chain of Tesla Model 3 battery-monitor boards over SPI.
//!
//! The driver is tick-driven and synchronous. Every call to
//! [`BmbChain::tick`] advances the poll sequencer one state and runs that
//! state's SPI traffic to completion:
//!
//! 1. wake the chain if it has gone quiet
//! 2. read aux and configuration registers
//! 3. latch two voltage snapshots
//! 4. read the cell groups, chip totals, aux and temperatures
//! 5. write the balance configuration
//! 6. reduce everything into [`PackStatistics`]
//! 7. idle for twenty ticks
//!
//! Bus access goes through the [`SpiTransport`] trait, so the same code runs
//! against real hardware or the in-memory [`mock::MockTransport`].
//!
//! ## Example
//!
//! ```rust
//! use batman_engine::mock::{MockChip, MockTransport};
//! use batman_engine::prelude::*;
//! use std::time::Duration;
//!
//! let bus = MockTransport::with_chips(vec![
//!     MockChip::with_cells_mv(&[3700, 3712, 3695]),
//!     MockChip::with_cells_mv(&[3701]),
//! ]);
//! let config = ChainConfig::builder().boards(1).balance_enabled(true).build()?;
//! let mut chain = BmbChain::new(bus, config)?;
//!
//! while chain.poll_state() != PollState::Idle {
//!     chain.tick(Duration::from_millis(100));
//! }
//!
//! assert_eq!(chain.cell_v_max_mv(), 3712);
//! assert_eq!(chain.max_cell(), Some(2));
//! assert_eq!(chain.balancing_summary().present, 4);
//! # Ok::<(), batman_engine::ChainError>(())
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]

pub mod aggregator;
pub mod balancing;
pub mod chain;
pub mod config;
pub mod error;
pub mod mock;
pub mod prelude;
pub mod sequencer;
pub mod telemetry;
pub mod transport;

pub use aggregator::{
    AuxSummary, CellLimits, CellPosition, CellSummary, PackStatistics, PresentCell,
    TemperatureSummary,
};
pub use balancing::{BalancePolicy, PhaseAlternator};
pub use chain::{BalancingSummary, BmbChain, ChainCounters, TickReport};
pub use config::{ChainConfig, ChainConfigBuilder};
pub use error::{ChainError, ChainResult};
pub use sequencer::{BusOp, PollSequencer, PollState, SequencerState, TickInput, transition};
pub use telemetry::PackSnapshot;
pub use transport::{ChipSelect, SpiTransport};
