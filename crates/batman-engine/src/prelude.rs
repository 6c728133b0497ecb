//! Prelude for batman-engine.
//!
//! Re-exports what a host loop needs to drive a chain.

pub use crate::aggregator::{CellPosition, PackStatistics};
pub use crate::chain::{BalancingSummary, BmbChain, TickReport};
pub use crate::config::{ChainConfig, ChainConfigBuilder};
pub use crate::error::{ChainError, ChainResult};
pub use crate::sequencer::PollState;
pub use crate::telemetry::PackSnapshot;
pub use crate::transport::SpiTransport;
