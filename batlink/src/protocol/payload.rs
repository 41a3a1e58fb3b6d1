//! Payload layouts for the transfer protocol.
//!
//! Each frame command carries a fixed payload layout. Decoders take the
//! raw payload bytes (already checksum-verified by the frame layer) and
//! tolerate trailing bytes beyond the documented layout; firmware
//! revisions have been seen to append padding.
//!
//! ## Layouts
//!
//! ```text
//! Handshake:   version(1) | timestamp_secs(4 LE)
//! FileList:    count(1)   | count * name[64]
//! FileData as info:
//!              file_index(1) | file_size(4 LE) | filename[64]
//! FileData as chunk:
//!              sequence(2 LE) | size(2 LE) | data[size]
//! ```
//!
//! Name fields are null-padded to 64 bytes; a name occupying all 64
//! bytes has no terminator.

use crate::error::{Error, Result};
use byteorder::{LittleEndian, WriteBytesExt};

/// Size of a null-padded filename field in bytes.
pub const NAME_FIELD_SIZE: usize = 64;

/// Maximum data bytes in one file chunk.
pub const MAX_CHUNK_SIZE: usize = 512;

/// Decode a null-padded name field.
fn decode_name(field: &[u8]) -> String {
    let end = field.iter().position(|&c| c == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).to_string()
}

/// Keep only the final path component of an announced name, falling
/// back to the whole string when stripping would leave nothing.
fn strip_path(name: &str) -> &str {
    name.rsplit(['/', '\\'])
        .find(|part| !part.is_empty())
        .unwrap_or(name)
}

/// Write a name as a null-padded [`NAME_FIELD_SIZE`] field, truncating
/// names that do not fit.
fn encode_name(buf: &mut Vec<u8>, name: &str) {
    let bytes = name.as_bytes();
    let take = bytes.len().min(NAME_FIELD_SIZE);
    buf.extend_from_slice(&bytes[..take]);
    buf.resize(buf.len() + (NAME_FIELD_SIZE - take), 0);
}

/// Strip any directory components from a device-supplied filename.
///
/// Devices are only ever expected to send bare names, but the name field
/// is attacker-controllable data that ends up in a filesystem path, so
/// everything up to the last `/` or `\` is dropped. Names that reduce to
/// nothing or to a relative-path token are rejected.
pub fn sanitize_filename(name: &str) -> Result<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match base {
        "" | "." | ".." => Err(Error::Protocol(format!("unsafe filename {name:?}"))),
        _ => Ok(base.to_string()),
    }
}

/// Handshake payload: firmware version and device RTC time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeInfo {
    /// Device protocol/firmware version.
    pub version: u8,
    /// Device clock as seconds since the Unix epoch.
    pub timestamp_secs: u32,
}

impl HandshakeInfo {
    /// Decode from a Handshake payload (at least 5 bytes).
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < 5 {
            return Err(Error::Protocol(format!(
                "handshake payload too short: {} bytes",
                payload.len()
            )));
        }
        Ok(Self {
            version: payload[0],
            timestamp_secs: u32::from_le_bytes([payload[1], payload[2], payload[3], payload[4]]),
        })
    }
}

/// FileList payload: the names the device intends to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileManifest {
    /// Announced file names, in transfer order.
    pub names: Vec<String>,
}

impl FileManifest {
    /// Decode from a FileList payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.is_empty() {
            return Err(Error::Protocol("empty file list payload".to_string()));
        }
        let count = usize::from(payload[0]);
        let need = 1 + count * NAME_FIELD_SIZE;
        if payload.len() < need {
            return Err(Error::Protocol(format!(
                "file list payload truncated: {} bytes for {count} entries",
                payload.len()
            )));
        }

        let mut names = Vec::with_capacity(count);
        for i in 0..count {
            let start = 1 + i * NAME_FIELD_SIZE;
            let name = decode_name(&payload[start..start + NAME_FIELD_SIZE]);
            names.push(strip_path(&name).to_string());
        }
        Ok(Self { names })
    }

    /// Number of files announced.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when the device has nothing to send.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// FileData payload in its info form: metadata sent before chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTransferInfo {
    /// Zero-based index of the file within the current session.
    pub file_index: u8,
    /// Total file size in bytes.
    pub file_size: u32,
    /// Name of the file, null-trimmed.
    pub filename: String,
}

impl FileTransferInfo {
    /// Byte length of the encoded info layout.
    pub const SIZE: usize = 1 + 4 + NAME_FIELD_SIZE;

    /// Decode from a FileData payload (at least [`Self::SIZE`] bytes).
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < Self::SIZE {
            return Err(Error::Protocol(format!(
                "file info payload too short: {} bytes",
                payload.len()
            )));
        }
        Ok(Self {
            file_index: payload[0],
            file_size: u32::from_le_bytes([payload[1], payload[2], payload[3], payload[4]]),
            filename: decode_name(&payload[5..5 + NAME_FIELD_SIZE]),
        })
    }

    /// Encode to the wire layout.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.push(self.file_index);
        buf.write_u32::<LittleEndian>(self.file_size).unwrap();
        encode_name(&mut buf, &self.filename);
        buf
    }
}

/// FileData payload in its chunk form: one slice of file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Chunk sequence number, starting at 0 for each file.
    pub sequence: u16,
    /// Data bytes carried by this chunk.
    pub data: Vec<u8>,
}

impl Chunk {
    /// Decode from a FileData payload.
    ///
    /// The declared size field governs how many data bytes are read;
    /// bytes past `4 + size` are ignored.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < 4 {
            return Err(Error::Protocol(format!(
                "chunk payload too short: {} bytes",
                payload.len()
            )));
        }
        let sequence = u16::from_le_bytes([payload[0], payload[1]]);
        let size = usize::from(u16::from_le_bytes([payload[2], payload[3]]));
        if size > MAX_CHUNK_SIZE {
            return Err(Error::Protocol(format!(
                "chunk size {size} exceeds maximum {MAX_CHUNK_SIZE}"
            )));
        }
        if payload.len() < 4 + size {
            return Err(Error::Protocol(format!(
                "chunk declares {size} data bytes but carries {}",
                payload.len() - 4
            )));
        }
        Ok(Self {
            sequence,
            data: payload[4..4 + size].to_vec(),
        })
    }

    /// Encode to the wire layout.
    #[allow(clippy::cast_possible_truncation)] // data is capped at MAX_CHUNK_SIZE
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn encode(&self) -> Vec<u8> {
        debug_assert!(self.data.len() <= MAX_CHUNK_SIZE);

        let mut buf = Vec::with_capacity(4 + self.data.len());
        buf.write_u16::<LittleEndian>(self.sequence).unwrap();
        buf.write_u16::<LittleEndian>(self.data.len() as u16).unwrap();
        buf.extend_from_slice(&self.data);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name_field(name: &str) -> Vec<u8> {
        let mut field = name.as_bytes().to_vec();
        field.resize(NAME_FIELD_SIZE, 0);
        field
    }

    #[test]
    fn test_handshake_decode() {
        let info = HandshakeInfo::decode(&[3, 0x78, 0x56, 0x34, 0x12]).unwrap();
        assert_eq!(info.version, 3);
        assert_eq!(info.timestamp_secs, 0x1234_5678);
    }

    #[test]
    fn test_handshake_tolerates_trailing_bytes() {
        let info = HandshakeInfo::decode(&[1, 0, 0, 0, 0, 0xFF, 0xFF]).unwrap();
        assert_eq!(info.version, 1);
        assert_eq!(info.timestamp_secs, 0);
    }

    #[test]
    fn test_handshake_too_short() {
        assert!(HandshakeInfo::decode(&[1, 2, 3, 4]).is_err());
    }

    #[test]
    fn test_manifest_decode() {
        let mut payload = vec![2u8];
        payload.extend_from_slice(&name_field("log_001.csv"));
        payload.extend_from_slice(&name_field("log_002.csv"));

        let manifest = FileManifest::decode(&payload).unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.names, vec!["log_001.csv", "log_002.csv"]);
    }

    #[test]
    fn test_manifest_empty_and_truncated() {
        let manifest = FileManifest::decode(&[0]).unwrap();
        assert!(manifest.is_empty());

        assert!(FileManifest::decode(&[]).is_err());

        // Declares 1 entry but carries half a name field
        let mut payload = vec![1u8];
        payload.extend_from_slice(&[0x61; 32]);
        assert!(FileManifest::decode(&payload).is_err());
    }

    #[test]
    fn test_manifest_names_keep_only_final_component() {
        let mut payload = vec![2u8];
        payload.extend_from_slice(&name_field("/data/logs/run.csv"));
        payload.extend_from_slice(&name_field("data/"));

        let manifest = FileManifest::decode(&payload).unwrap();
        assert_eq!(manifest.names, vec!["run.csv", "data"]);
    }

    #[test]
    fn test_manifest_name_without_terminator_uses_full_field() {
        let mut payload = vec![1u8];
        payload.extend_from_slice(&[b'x'; NAME_FIELD_SIZE]);
        let manifest = FileManifest::decode(&payload).unwrap();
        assert_eq!(manifest.names[0].len(), NAME_FIELD_SIZE);
    }

    #[test]
    fn test_file_info_roundtrip() {
        let info = FileTransferInfo {
            file_index: 2,
            file_size: 1_048_576,
            filename: "log_003.csv".to_string(),
        };
        let payload = info.encode();
        assert_eq!(payload.len(), FileTransferInfo::SIZE);
        assert_eq!(FileTransferInfo::decode(&payload).unwrap(), info);
    }

    #[test]
    fn test_file_info_layout() {
        let info = FileTransferInfo {
            file_index: 1,
            file_size: 0x0000_0200,
            filename: "a.csv".to_string(),
        };
        let payload = info.encode();
        assert_eq!(payload[0], 1);
        assert_eq!(&payload[1..5], &[0x00, 0x02, 0x00, 0x00]);
        assert_eq!(&payload[5..10], b"a.csv");
        assert_eq!(payload[10], 0);
    }

    #[test]
    fn test_file_info_too_short() {
        let err = FileTransferInfo::decode(&[0u8; 68]).unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn test_chunk_roundtrip() {
        let chunk = Chunk {
            sequence: 7,
            data: vec![0xDE; MAX_CHUNK_SIZE],
        };
        let payload = chunk.encode();
        assert_eq!(payload.len(), 4 + MAX_CHUNK_SIZE);
        assert_eq!(Chunk::decode(&payload).unwrap(), chunk);
    }

    #[test]
    fn test_chunk_ignores_trailing_bytes() {
        let mut payload = Chunk {
            sequence: 0,
            data: vec![1, 2, 3],
        }
        .encode();
        payload.extend_from_slice(&[0xEE; 8]);

        let chunk = Chunk::decode(&payload).unwrap();
        assert_eq!(chunk.data, vec![1, 2, 3]);
    }

    #[test]
    fn test_chunk_size_bounds() {
        // Declared size beyond the protocol maximum
        let mut payload = vec![0, 0];
        payload.extend_from_slice(&513u16.to_le_bytes());
        payload.extend_from_slice(&[0; 513]);
        assert!(Chunk::decode(&payload).is_err());

        // Declared size larger than the bytes actually present
        let mut payload = vec![0, 0];
        payload.extend_from_slice(&16u16.to_le_bytes());
        payload.extend_from_slice(&[0; 10]);
        assert!(Chunk::decode(&payload).is_err());

        assert!(Chunk::decode(&[0, 0, 0]).is_err());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("log.csv").unwrap(), "log.csv");
        assert_eq!(sanitize_filename("data/log.csv").unwrap(), "log.csv");
        assert_eq!(sanitize_filename("..\\..\\log.csv").unwrap(), "log.csv");
        assert_eq!(
            sanitize_filename("/var/tmp/../result.csv").unwrap(),
            "result.csv"
        );

        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename("data/").is_err());
        assert!(sanitize_filename(".").is_err());
        assert!(sanitize_filename("results/..").is_err());
    }
}
