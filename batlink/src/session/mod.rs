//! Transfer session layer.
//!
//! Everything above the raw [`Port`](crate::port::Port) and below the
//! CLI lives here:
//!
//! - [`link`]: framed reads and writes with deadlines and resync.
//! - [`handshake`]: waiting for the device-initiated greeting.
//! - [`download`]: manifest and per-file chunk reception.
//! - [`upload`]: sending a generated configuration file.
//! - [`device`]: [`DeviceSession`], the state machine tying the flows
//!   together.
//! - [`worker`]: running a session on a background thread with progress
//!   events over a channel.
//!
//! All waits are bounded. Reads poll the port in short slices so a
//! cancellation request (see [`crate::set_cancel_hook`]) is observed
//! within tens of milliseconds rather than at the end of a
//! multi-second timeout.

mod device;
mod download;
mod handshake;
mod link;
mod upload;
pub mod worker;

pub use device::{DeviceSession, DownloadOutcome};
pub use link::FrameLink;
pub use worker::SessionEvent;

use std::time::Duration;

/// How long each poll slice of a bounded read blocks.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Wait budgets for the protocol steps.
///
/// The defaults match the device firmware: a long handshake window
/// (the user may still be plugging in the cable), generous per-step
/// reads during download, and shorter acknowledgment waits during
/// upload where the device is known to be alive.
#[derive(Debug, Clone, Copy)]
pub struct SessionTimeouts {
    /// Total window to wait for the device-initiated handshake.
    pub handshake: Duration,
    /// Budget for each protocol read during download.
    pub step: Duration,
    /// Wait for the acknowledgment of an upload file-info frame.
    pub info_ack: Duration,
    /// Wait for the acknowledgment of each uploaded chunk.
    pub chunk_ack: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            handshake: Duration::from_secs(30),
            step: Duration::from_secs(30),
            info_ack: Duration::from_secs(10),
            chunk_ack: Duration::from_secs(5),
        }
    }
}

/// Phase of the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No transfer in flight.
    Idle,
    /// Verifying the link before protocol traffic.
    Connecting,
    /// Listening for the device greeting.
    AwaitingHandshake,
    /// Reading the file manifest.
    ReceivingManifest,
    /// Receiving one of the announced files.
    ReceivingFile,
    /// Sending a configuration file to the device.
    SendingConfig,
    /// Last transfer finished successfully.
    Complete,
    /// Last transfer aborted; the port has been closed.
    Failed,
}

impl SessionPhase {
    /// True while a transfer is in flight and the port is in use.
    #[must_use]
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Idle | Self::Complete | Self::Failed)
    }
}

/// Byte-level bookkeeping for the transfer in flight.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TransferProgress {
    pub bytes_done: usize,
    pub total_bytes: usize,
    pub current_file: usize,
    pub files_expected: usize,
}

/// Integer percentage of `done` against `total`, clamped to 100.
#[allow(clippy::cast_possible_truncation)] // clamped to 100 first
pub(crate) fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        100
    } else {
        ((done as u64 * 100 / total as u64).min(100)) as u8
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted serial port double for session tests.

    use crate::port::Port;
    use crate::protocol::Frame;
    use std::collections::VecDeque;
    use std::io::{self, Read, Write};
    use std::time::Duration;

    /// In-memory port: reads come from a pre-fed script, writes are
    /// captured. An exhausted script reads as a timeout, matching how a
    /// silent device looks through a real serial port.
    pub(crate) struct MockPort {
        read_buf: VecDeque<u8>,
        pub(crate) written: Vec<u8>,
        open: bool,
        timeout: Duration,
    }

    impl MockPort {
        pub(crate) fn new() -> Self {
            Self {
                read_buf: VecDeque::new(),
                written: Vec::new(),
                open: true,
                timeout: Duration::from_millis(50),
            }
        }

        /// Queue raw bytes for the host to read.
        pub(crate) fn feed(&mut self, bytes: &[u8]) {
            self.read_buf.extend(bytes);
        }

        /// Queue an encoded frame for the host to read.
        pub(crate) fn feed_frame(&mut self, frame: &Frame) {
            self.feed(&frame.encode());
        }

        /// Queue a frame with its checksum byte corrupted.
        pub(crate) fn feed_corrupted(&mut self, frame: &Frame) {
            let mut bytes = frame.encode();
            bytes[5] ^= 0xFF;
            self.feed(&bytes);
        }
    }

    impl Read for MockPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.open {
                return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
            }
            if self.read_buf.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
            }
            let n = buf.len().min(self.read_buf.len());
            for b in buf.iter_mut().take(n) {
                *b = self.read_buf.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for MockPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if !self.open {
                return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Port for MockPort {
        fn set_timeout(&mut self, timeout: Duration) -> crate::Result<()> {
            self.timeout = timeout;
            Ok(())
        }

        fn timeout(&self) -> Duration {
            self.timeout
        }

        fn clear_buffers(&mut self) -> crate::Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "mock"
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn close(&mut self) -> crate::Result<()> {
            self.open = false;
            Ok(())
        }
    }
}
