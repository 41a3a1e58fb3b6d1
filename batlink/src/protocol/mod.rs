//! Wire protocol: framing, checksums, and payload codecs.
//!
//! Everything in this module is pure encode/decode logic with no I/O;
//! the session layer owns reading and writing frames on a port.

pub mod checksum;
pub mod frame;
pub mod payload;

// Re-export common types
pub use checksum::xor_checksum;
pub use frame::{Command, Frame, FrameHeader, HEADER_SIZE, PROTOCOL_MAGIC};
pub use payload::{
    Chunk, FileManifest, FileTransferInfo, HandshakeInfo, MAX_CHUNK_SIZE, NAME_FIELD_SIZE,
    sanitize_filename,
};
