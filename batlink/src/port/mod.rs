//! Serial I/O seam between the session layer and the operating system.
//!
//! Protocol code is written against the [`Port`] trait, so it can be
//! driven by a real serial device in production and by a scripted mock
//! in tests without any conditional plumbing.
//!
//! ## Example
//!
//! ```rust,no_run
//! use batlink::port::Port;
//!
//! fn ack_then_read<P: Port>(port: &mut P) -> std::io::Result<Vec<u8>> {
//!     port.write_all(b"\x55\xAA\x05\x00\x00\x00")?;
//!     let mut buf = [0u8; 64];
//!     let n = port.read(&mut buf)?;
//!     Ok(buf[..n].to_vec())
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;

#[cfg(feature = "native")]
pub use native::NativePort;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// Baud rate the device firmware speaks.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Serial line parameters for one connection.
///
/// Only the port, baud rate and timeout vary. The device firmware
/// fixes the framing at 8 data bits, no parity, one stop bit and no
/// flow control; implementations program those settings on open.
#[derive(Debug, Clone)]
pub struct PortSettings {
    /// OS path of the port, such as `/dev/ttyACM0` or `COM3`.
    pub path: String,
    pub baud: u32,
    /// How long a single read or write may block.
    pub timeout: Duration,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            path: String::new(),
            baud: DEFAULT_BAUD,
            timeout: Duration::from_secs(1),
        }
    }
}

impl PortSettings {
    pub fn new(path: impl Into<String>, baud: u32) -> Self {
        Self {
            path: path.into(),
            baud,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Byte transport the protocol loops run over.
///
/// `read` implementations must return an error of kind
/// [`std::io::ErrorKind::TimedOut`] when no data arrives within the
/// configured timeout, so protocol loops can poll in short slices.
pub trait Port: Read + Write + Send {
    /// Change how long reads and writes may block.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Timeout currently in effect.
    fn timeout(&self) -> Duration;

    /// Discard anything buffered in either direction.
    ///
    /// Called on open so a stale partial frame from a previous session
    /// cannot corrupt the next decode.
    fn clear_buffers(&mut self) -> Result<()>;

    /// OS path this port was opened with.
    fn name(&self) -> &str;

    /// Whether the port is currently open.
    fn is_open(&self) -> bool;

    /// Release the underlying handle.
    ///
    /// Idempotent: closing an already-closed port is a no-op.
    fn close(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_use_device_baud_and_a_short_timeout() {
        let settings = PortSettings::default();
        assert_eq!(settings.baud, DEFAULT_BAUD);
        assert_eq!(settings.timeout, Duration::from_secs(1));
        assert!(settings.path.is_empty());
    }

    #[test]
    fn test_settings_builder_sets_path_baud_and_timeout() {
        let settings =
            PortSettings::new("/dev/ttyUSB0", 230_400).with_timeout(Duration::from_secs(5));
        assert_eq!(settings.path, "/dev/ttyUSB0");
        assert_eq!(settings.baud, 230_400);
        assert_eq!(settings.timeout, Duration::from_secs(5));
    }
}
