// Error types for Linkbot bus communication

use super::frame::Opcode;

/// Error types for Linkbot communication
#[derive(Debug, thiserror::Error)]
pub enum LinkbotError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout waiting for reply from module 0x{peer:04X}")]
    Timeout { peer: u16 },

    #[error("Lost contact with module 0x{peer:04X} while moving ({misses} status polls unanswered)")]
    LostContact { peer: u16, misses: u32 },

    #[error("Operation not supported by the module firmware: {operation}")]
    Unsupported { operation: &'static str },

    #[error("Invalid joint {0}, expected 1, 2 or 3")]
    InvalidJoint(u8),

    #[error("Command payload exceeds {capacity} bytes")]
    PayloadOverflow { capacity: usize },

    #[error("Reply to {opcode:?} too short: {len} bytes")]
    ShortReply { opcode: Opcode, len: usize },
}

pub type Result<T> = std::result::Result<T, LinkbotError>;

/// Collapse a result into the integer status surface: `0` success, `-1` failure.
pub fn status_code<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(_) => -1,
    }
}
