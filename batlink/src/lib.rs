//! # batlink
//!
//! A library for exchanging files and configuration with battery test
//! devices over a serial (USB-CDC) link.
//!
//! This crate implements the host side of the device's framed binary
//! protocol, including:
//!
//! - Packet framing with XOR checksums
//! - The device-initiated handshake
//! - Chunked result-file download (device → host)
//! - Chunked test-configuration upload (host → device)
//! - The session state machine that sequences a transfer from connection
//!   to completion or failure
//!
//! The `native` cargo feature (on by default) pulls in the `serialport`
//! backend and the USB port discovery helpers; without it only the
//! codec, session and settings layers build, which is what the
//! mock-driven tests use.
//!
//! ## Example
//!
//! ```rust,no_run
//! # #[cfg(feature = "native")]
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! // Wait for the device and download every result file it offers.
//! let saved = batlink::download_results(
//!     "/dev/ttyACM0",
//!     batlink::port::DEFAULT_BAUD,
//!     std::path::Path::new("./received_files"),
//!     &mut |file, done, total| {
//!         println!("Receiving {file}: {done}/{total} bytes");
//!     },
//! )?;
//! println!("Received {} file(s)", saved.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

#[cfg(feature = "native")]
pub mod discovery;
pub mod error;
pub mod host;
pub mod port;
pub mod protocol;
pub mod session;
pub mod settings;

static CANCEL_HOOK: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Install a process-wide cancellation probe.
///
/// Transfer loops poll the hook between frames and abort cleanly once
/// it returns `true`. A CLI typically wires this to its Ctrl-C flag.
/// Only the first registration wins; later calls are ignored.
pub fn set_cancel_hook<F>(hook: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = CANCEL_HOOK.set(Arc::new(hook));
}

/// True once the registered hook reports a cancellation.
#[must_use]
pub fn cancel_requested() -> bool {
    CANCEL_HOOK.get().is_some_and(|hook| hook())
}

pub use error::{Error, Result};
pub use host::list_result_files;
pub use port::{Port, PortSettings};
pub use protocol::{
    Command, Frame, FrameHeader, HandshakeInfo, MAX_CHUNK_SIZE, PROTOCOL_MAGIC, xor_checksum,
};
pub use session::{
    DeviceSession, DownloadOutcome, SessionEvent, SessionPhase, SessionTimeouts, worker,
};
pub use settings::TestConfig;

#[cfg(feature = "native")]
pub use discovery::{DetectedPort, DeviceKind, auto_detect_port, detect_ports, format_port_list};
#[cfg(feature = "native")]
pub use host::{download_results, upload_settings};
#[cfg(feature = "native")]
pub use port::NativePort;
#[cfg(feature = "native")]
pub use session::worker::{spawn_download, spawn_upload};
