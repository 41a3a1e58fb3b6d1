//! Error types for batlink.

use std::io;
use thiserror::Error;

/// Result type for batlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for batlink operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Failure reading or writing the port, or saving a result file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The OS serial layer rejected an open or configuration call.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Frame header did not start with the protocol magic.
    #[error("Bad frame magic: {actual:#06x}")]
    BadMagic {
        /// Magic value actually read.
        actual: u16,
    },

    /// XOR checksum mismatch between header and payload.
    #[error("Checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch {
        /// Checksum declared in the frame header.
        expected: u8,
        /// Checksum computed over the received payload.
        actual: u8,
    },

    /// Command byte outside the protocol's command set.
    #[error("Unknown command byte: {0:#04x}")]
    UnknownCommand(u8),

    /// A valid frame arrived, but not the one this step requires.
    #[error("Unexpected command: expected {expected}, got {actual}")]
    UnexpectedCommand {
        /// Command the current protocol step requires.
        expected: crate::protocol::Command,
        /// Command actually received.
        actual: crate::protocol::Command,
    },

    /// File chunk arrived out of order.
    #[error("Chunk out of order: expected sequence {expected}, got {actual}")]
    SequenceMismatch {
        /// Next sequence number the receiver requires.
        expected: u16,
        /// Sequence number carried by the chunk.
        actual: u16,
    },

    /// Communication timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// No usable device port was found.
    #[error("Device not found")]
    DeviceNotFound,

    /// Port is not open.
    #[error("Port is not open")]
    NotConnected,

    /// A transfer session is already using the link.
    #[error("A transfer session is already active")]
    SessionActive,

    /// Test configuration rejected before any transfer was attempted.
    #[error("Invalid test configuration: {0}")]
    InvalidConfig(String),

    /// Structurally malformed payload or protocol violation.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation cancelled by the user.
    #[error("Operation cancelled")]
    Cancelled,
}
