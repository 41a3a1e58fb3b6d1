//! Receiving result files from the device.
//!
//! After the handshake the device sends one FileList frame, then each
//! announced file as a FileData info frame followed by ordered data
//! chunks. The host acknowledges every accepted frame. Unlike the
//! handshake wait, this phase is strict: a wrong command, a corrupt
//! frame or an out-of-order chunk fails the whole session.

use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::{Chunk, Command, FileManifest, FileTransferInfo, Frame, sanitize_filename};
use crate::session::link::FrameLink;
use log::{debug, info, trace};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Read a frame that must carry `expected`, sending Nack on anything
/// that fails strict validation.
fn read_expected<P: Port>(
    link: &mut FrameLink<'_, P>,
    expected: Command,
    timeout: Duration,
) -> Result<Frame> {
    let frame = match link.read_frame(timeout) {
        Ok(frame) => frame,
        Err(e @ Error::ChecksumMismatch { .. }) => {
            link.send_nack();
            return Err(e);
        },
        Err(e) => return Err(e),
    };

    if frame.command == expected {
        Ok(frame)
    } else {
        link.send_nack();
        Err(Error::UnexpectedCommand {
            expected,
            actual: frame.command,
        })
    }
}

/// Receive the manifest of files the device intends to send.
pub(crate) fn receive_manifest<P: Port>(
    link: &mut FrameLink<'_, P>,
    timeout: Duration,
) -> Result<FileManifest> {
    debug!("Waiting for file list...");
    let frame = read_expected(link, Command::FileList, timeout)?;

    let manifest = match FileManifest::decode(&frame.payload) {
        Ok(manifest) => manifest,
        Err(e) => {
            link.send_nack();
            return Err(e);
        },
    };

    info!("File list received: {} file(s)", manifest.len());
    for (i, name) in manifest.names.iter().enumerate() {
        debug!("  [{}] {name}", i + 1);
    }

    link.send_ack()?;
    Ok(manifest)
}

/// Receive one file and persist it under `output_dir`.
///
/// Chunks must arrive with contiguous sequence numbers starting at 0;
/// any gap or reordering aborts. The file is written only after every
/// expected byte has arrived, so a failed transfer leaves nothing
/// behind.
pub(crate) fn receive_file<P, F>(
    link: &mut FrameLink<'_, P>,
    timeout: Duration,
    output_dir: &Path,
    progress: &mut F,
) -> Result<PathBuf>
where
    P: Port,
    F: FnMut(&str, usize, usize),
{
    let frame = read_expected(link, Command::FileData, timeout)?;
    let transfer_info = match FileTransferInfo::decode(&frame.payload) {
        Ok(transfer_info) => transfer_info,
        Err(e) => {
            link.send_nack();
            return Err(e);
        },
    };

    let filename = sanitize_filename(&transfer_info.filename)?;
    let total = transfer_info.file_size as usize;
    info!(
        "Receiving {} ({} bytes, index {})",
        filename, total, transfer_info.file_index
    );
    link.send_ack()?;

    let mut data = Vec::new();
    let mut expected_seq: u16 = 0;

    while data.len() < total {
        let frame = read_expected(link, Command::FileData, timeout)?;
        let chunk = match Chunk::decode(&frame.payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                link.send_nack();
                return Err(e);
            },
        };

        if chunk.sequence != expected_seq {
            link.send_nack();
            return Err(Error::SequenceMismatch {
                expected: expected_seq,
                actual: chunk.sequence,
            });
        }

        data.extend_from_slice(&chunk.data);
        expected_seq = expected_seq.wrapping_add(1);
        link.send_ack()?;

        trace!("Chunk {} accepted ({}/{} bytes)", chunk.sequence, data.len(), total);
        progress(&filename, data.len(), total);
    }

    let path = output_dir.join(&filename);
    fs::write(&path, &data)?;
    info!("File saved: {}", path.display());

    Ok(path)
}
