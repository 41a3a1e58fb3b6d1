//! Frame header and command codec.
//!
//! ## Frame Format
//!
//! ```text
//! +----------+-----+----------+----------+-------------+
//! |  Magic   | CMD |  Length  | Checksum |   Payload   |
//! +----------+-----+----------+----------+-------------+
//! | 2 bytes  | 1   | 2 bytes  | 1 byte   |  variable   |
//! +----------+-----+----------+----------+-------------+
//! | 0xAA55   | cmd | payload  | XOR of   | Length      |
//! | (LE)     |     | length   | payload  | bytes       |
//! +----------+-----+----------+----------+-------------+
//! ```
//!
//! Multi-byte integers are little-endian. `Length` counts payload bytes
//! only; the header is always [`HEADER_SIZE`] bytes on the wire. The
//! checksum of an empty payload is 0.

use {
    crate::{
        error::{Error, Result},
        protocol::checksum::xor_checksum,
    },
    byteorder::{LittleEndian, WriteBytesExt},
    std::fmt,
};

/// Frame magic number (appears as `55 AA` on the wire).
pub const PROTOCOL_MAGIC: u16 = 0xAA55;

/// Size of the fixed frame header in bytes.
pub const HEADER_SIZE: usize = 6;

/// Protocol command types.
///
/// FileEnd and ConfigRequest are reserved by the device firmware; they
/// decode successfully but no current flow produces or consumes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Device-initiated greeting carrying version and RTC timestamp.
    Handshake = 0x01,
    /// Manifest of result files the device intends to send.
    FileList = 0x02,
    /// File transfer info or data chunk (direction-dependent).
    FileData = 0x03,
    /// End of file transfer (reserved).
    FileEnd = 0x04,
    /// Positive acknowledgment, empty payload.
    Ack = 0x05,
    /// Negative acknowledgment, empty payload.
    Nack = 0x06,
    /// Configuration request (reserved).
    ConfigRequest = 0x07,
}

impl TryFrom<u8> for Command {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::Handshake),
            0x02 => Ok(Self::FileList),
            0x03 => Ok(Self::FileData),
            0x04 => Ok(Self::FileEnd),
            0x05 => Ok(Self::Ack),
            0x06 => Ok(Self::Nack),
            0x07 => Ok(Self::ConfigRequest),
            other => Err(Error::UnknownCommand(other)),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Handshake => "Handshake",
            Self::FileList => "FileList",
            Self::FileData => "FileData",
            Self::FileEnd => "FileEnd",
            Self::Ack => "Ack",
            Self::Nack => "Nack",
            Self::ConfigRequest => "ConfigRequest",
        };
        f.write_str(name)
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame command.
    pub command: Command,
    /// Payload length in bytes.
    pub length: u16,
    /// Declared XOR checksum of the payload.
    pub checksum: u8,
}

impl FrameHeader {
    /// Parse a header from exactly [`HEADER_SIZE`] bytes.
    ///
    /// Fails with [`Error::BadMagic`] when the magic does not match; the
    /// remaining fields of a mismatched header are meaningless and must
    /// not be interpreted (the stream is desynchronized).
    pub fn parse(bytes: &[u8; HEADER_SIZE]) -> Result<Self> {
        let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
        if magic != PROTOCOL_MAGIC {
            return Err(Error::BadMagic { actual: magic });
        }

        let command = Command::try_from(bytes[2])?;
        let length = u16::from_le_bytes([bytes[3], bytes[4]]);
        let checksum = bytes[5];

        Ok(Self {
            command,
            length,
            checksum,
        })
    }

    /// Verify the declared checksum against a received payload.
    pub fn verify(&self, payload: &[u8]) -> Result<()> {
        let actual = xor_checksum(payload);
        if actual == self.checksum {
            Ok(())
        } else {
            Err(Error::ChecksumMismatch {
                expected: self.checksum,
                actual,
            })
        }
    }
}

/// A complete protocol frame: command plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame command.
    pub command: Command,
    /// Payload bytes (may be empty).
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a frame.
    pub fn new(command: Command, payload: Vec<u8>) -> Self {
        Self { command, payload }
    }

    /// Create an empty-payload Ack frame.
    pub fn ack() -> Self {
        Self::new(Command::Ack, Vec::new())
    }

    /// Create an empty-payload Nack frame.
    pub fn nack() -> Self {
        Self::new(Command::Nack, Vec::new())
    }

    /// Encode the frame to wire bytes.
    #[allow(clippy::cast_possible_truncation)] // payloads never exceed u16 range
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn encode(&self) -> Vec<u8> {
        debug_assert!(self.payload.len() <= usize::from(u16::MAX));

        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buf.write_u16::<LittleEndian>(PROTOCOL_MAGIC).unwrap();
        buf.push(self.command as u8);
        buf.write_u16::<LittleEndian>(self.payload.len() as u16)
            .unwrap();
        buf.push(xor_checksum(&self.payload));
        buf.extend_from_slice(&self.payload);
        buf
    }
}
