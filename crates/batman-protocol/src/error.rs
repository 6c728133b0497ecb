//! BMB protocol error types.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Unknown register id: {0:#04x}")]
    UnknownRegister(u8),

    #[error("Chip index {index} out of range (chain holds at most {max} chips)")]
    ChipOutOfRange { index: usize, max: usize },

    #[error("Cell slot {index} out of range (chip has {max} slots)")]
    SlotOutOfRange { index: usize, max: usize },

    #[error("Invalid board count: {0} (expected 1..={max})", max = crate::MAX_BOARDS)]
    InvalidBoardCount(u8),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
