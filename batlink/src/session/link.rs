//! Framed reads and writes over a [`Port`].
//!
//! [`FrameLink`] owns the deadline and resync logic so the flow code
//! above it can think in whole frames. Reads poll in
//! [`POLL_INTERVAL`](super::POLL_INTERVAL) slices; between slices the
//! registered cancel hook is consulted, so cancellation interrupts
//! even a 30-second wait promptly.

use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::{Frame, FrameHeader, HEADER_SIZE};
use crate::session::POLL_INTERVAL;
use log::{debug, trace};
use std::time::{Duration, Instant};

/// Frame-granular view of a serial port.
pub struct FrameLink<'a, P: Port> {
    port: &'a mut P,
}

impl<'a, P: Port> FrameLink<'a, P> {
    /// Wrap a port, switching it to short poll-slice reads.
    pub fn new(port: &'a mut P) -> Result<Self> {
        port.set_timeout(POLL_INTERVAL)?;
        Ok(Self { port })
    }

    /// Fill `buf` completely before `deadline`.
    ///
    /// On timeout the bytes collected so far are discarded; a partial
    /// frame is never handed to a decoder.
    fn read_exact_deadline(&mut self, buf: &mut [u8], deadline: Instant) -> Result<()> {
        let mut filled = 0;

        while filled < buf.len() {
            if crate::cancel_requested() {
                return Err(Error::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout(format!(
                    "read timed out with {filled} of {} bytes",
                    buf.len()
                )));
            }

            match self.port.read(&mut buf[filled..]) {
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {},
                Err(e) => return Err(Error::Io(e)),
            }
        }

        Ok(())
    }

    /// Read one complete frame within `timeout`.
    ///
    /// A header with bad magic starts a resync: the six-byte window
    /// slides one byte at a time until a valid header appears or the
    /// deadline passes. The payload checksum is verified before the
    /// frame is returned; a mismatch leaves the stream aligned on the
    /// next header, so the caller may Nack and keep reading.
    pub fn read_frame(&mut self, timeout: Duration) -> Result<Frame> {
        let deadline = Instant::now() + timeout;

        let mut header_bytes = [0u8; HEADER_SIZE];
        self.read_exact_deadline(&mut header_bytes, deadline)?;

        let mut skipped = 0usize;
        let header = loop {
            match FrameHeader::parse(&header_bytes) {
                Ok(header) => break header,
                Err(Error::BadMagic { .. }) => {
                    header_bytes.copy_within(1.., 0);
                    let mut next = [0u8; 1];
                    self.read_exact_deadline(&mut next, deadline)?;
                    header_bytes[HEADER_SIZE - 1] = next[0];
                    skipped += 1;
                },
                Err(e @ Error::UnknownCommand(_)) => {
                    // Magic matched, so the length field is usable;
                    // drain the payload to keep the stream aligned.
                    let length =
                        usize::from(u16::from_le_bytes([header_bytes[3], header_bytes[4]]));
                    let mut discard = vec![0u8; length];
                    let _ = self.read_exact_deadline(&mut discard, deadline);
                    return Err(e);
                },
                Err(e) => return Err(e),
            }
        };
        if skipped > 0 {
            debug!("Skipped {skipped} bytes before a valid frame header");
        }

        let mut payload = vec![0u8; usize::from(header.length)];
        self.read_exact_deadline(&mut payload, deadline)?;
        header.verify(&payload)?;

        trace!(
            "Received {} frame ({} payload bytes)",
            header.command,
            payload.len()
        );
        Ok(Frame::new(header.command, payload))
    }

    /// Encode and send a frame, flushing before returning.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        trace!(
            "Sending {} frame ({} payload bytes)",
            frame.command,
            frame.payload.len()
        );
        self.port.write_all(&frame.encode())?;
        self.port.flush()?;
        Ok(())
    }

    /// Acknowledge the last received frame.
    pub fn send_ack(&mut self) -> Result<()> {
        self.write_frame(&Frame::ack())
    }

    /// Reject the last received frame.
    ///
    /// The device does not act on Nack beyond logging, so a send
    /// failure here is swallowed; the caller is already on an error
    /// path.
    pub fn send_nack(&mut self) {
        if let Err(e) = self.write_frame(&Frame::nack()) {
            debug!("Failed to send Nack: {e}");
        }
    }
}
