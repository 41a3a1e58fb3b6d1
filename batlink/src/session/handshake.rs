//! Waiting for the device-initiated greeting.
//!
//! The device opens every exchange: after its USB cable is plugged in
//! it announces itself with a Handshake frame and waits for the host
//! to acknowledge. The host side only listens. Noise, foreign frames
//! and corrupt handshakes never abort the wait; the window elapsing
//! does.

use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::{Command, HandshakeInfo};
use crate::session::link::FrameLink;
use log::{debug, info, trace, warn};
use std::time::{Duration, Instant};

/// Listen for a valid Handshake frame within `window`, acknowledge it
/// and return the decoded device info.
pub(crate) fn wait_for_handshake<P: Port>(
    link: &mut FrameLink<'_, P>,
    window: Duration,
) -> Result<HandshakeInfo> {
    info!("Waiting for device handshake...");
    let start = Instant::now();

    loop {
        let remaining = window.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            break;
        }

        match link.read_frame(remaining) {
            Ok(frame) if frame.command == Command::Handshake => {
                match HandshakeInfo::decode(&frame.payload) {
                    Ok(handshake) => {
                        info!(
                            "Handshake received (version: {}, timestamp: {})",
                            handshake.version, handshake.timestamp_secs
                        );
                        link.send_ack()?;
                        return Ok(handshake);
                    },
                    Err(e) => {
                        warn!("Malformed handshake payload: {e}");
                        link.send_nack();
                    },
                }
            },
            Ok(frame) => {
                trace!("Ignoring {} frame while waiting for handshake", frame.command);
            },
            Err(Error::ChecksumMismatch { .. }) => {
                warn!("Handshake checksum mismatch");
                link.send_nack();
            },
            Err(Error::UnknownCommand(byte)) => {
                debug!("Ignoring unknown command {byte:#04x} while waiting for handshake");
            },
            Err(Error::Timeout(_)) => {},
            Err(e) => return Err(e),
        }
    }

    Err(Error::Timeout(format!(
        "No handshake within {} seconds",
        window.as_secs()
    )))
}
