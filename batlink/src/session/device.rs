//! Session state machine over one serial port.
//!
//! [`DeviceSession`] owns the port exclusively for the lifetime of a
//! transfer: it drives handshake, manifest and file flows in order,
//! tracks phase and progress, and guarantees the port is closed when
//! the session ends, successfully or not.
//!
//! ## Example
//!
//! ```rust,no_run
//! # #[cfg(feature = "native")]
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use batlink::{DeviceSession, port::DEFAULT_BAUD};
//! use std::path::Path;
//!
//! let mut session = DeviceSession::open("/dev/ttyACM0", DEFAULT_BAUD)?;
//! let outcome = session.download(Path::new("./received_files"), &mut |file, done, total| {
//!     println!("{file}: {done}/{total} bytes");
//! })?;
//! println!("Saved {} file(s)", outcome.saved_files.len());
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::HandshakeInfo;
use crate::session::download::{receive_file, receive_manifest};
use crate::session::handshake::wait_for_handshake;
use crate::session::link::FrameLink;
use crate::session::upload::send_config;
use crate::session::{SessionPhase, SessionTimeouts, TransferProgress, percent};
use crate::settings::TestConfig;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// What a completed download produced.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    /// Greeting the device opened the session with.
    pub handshake: HandshakeInfo,
    /// Paths of the saved files, in transfer order.
    pub saved_files: Vec<PathBuf>,
}

/// One transfer session with a battery test device.
///
/// Generic over the port type `P` so the protocol can be exercised
/// against any `Port` implementation.
pub struct DeviceSession<P: Port> {
    port: P,
    timeouts: SessionTimeouts,
    connected: bool,
    phase: SessionPhase,
    progress: u8,
    transfer: TransferProgress,
}

impl<P: Port> DeviceSession<P> {
    /// Wrap an already opened port.
    pub fn new(port: P) -> Self {
        Self {
            port,
            timeouts: SessionTimeouts::default(),
            connected: false,
            phase: SessionPhase::Idle,
            progress: 0,
            transfer: TransferProgress::default(),
        }
    }

    /// Replace the default wait budgets.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: SessionTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Get a mutable reference to the underlying port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Consume the session and return the underlying port.
    pub fn into_port(self) -> P {
        self.port
    }

    /// Current phase of the state machine.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Progress of the last or current transfer, 0 to 100.
    pub fn progress_percent(&self) -> u8 {
        self.progress
    }

    /// True while a link to the device is established.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Run a full download session: wait for the device handshake,
    /// read the manifest, then receive and save every announced file
    /// into `output_dir`.
    ///
    /// The port is closed when this returns, successfully or not. On
    /// failure, files persisted from earlier entries of the same
    /// session are left in place but the session as a whole reports
    /// the error.
    pub fn download<F>(&mut self, output_dir: &Path, progress: &mut F) -> Result<DownloadOutcome>
    where
        F: FnMut(&str, usize, usize),
    {
        self.begin()?;
        match self.run_download(output_dir, progress) {
            Ok(outcome) => {
                info!("Download complete: {} file(s)", outcome.saved_files.len());
                self.complete();
                Ok(outcome)
            },
            Err(e) => {
                self.fail(&e);
                Err(e)
            },
        }
    }

    /// Run a full upload session: validate `config`, then send it to
    /// the device as a generated `setting_{plan}.csv`.
    ///
    /// An invalid config is rejected before any port activity and
    /// leaves the session untouched.
    pub fn upload<F>(&mut self, config: &TestConfig, progress: &mut F) -> Result<()>
    where
        F: FnMut(&str, usize, usize),
    {
        config.validate()?;

        self.begin()?;
        match self.run_upload(config, progress) {
            Ok(()) => {
                self.complete();
                Ok(())
            },
            Err(e) => {
                self.fail(&e);
                Err(e)
            },
        }
    }

    /// Close the port and reset the session to idle. Safe to call at
    /// any time, including when already disconnected.
    pub fn disconnect(&mut self) {
        if let Err(e) = self.port.close() {
            debug!("Error closing port: {e}");
        }
        self.connected = false;
        self.progress = 0;
        self.transfer = TransferProgress::default();
        self.phase = SessionPhase::Idle;
    }

    fn begin(&mut self) -> Result<()> {
        if self.phase.is_active() {
            return Err(Error::SessionActive);
        }
        self.phase = SessionPhase::Connecting;
        self.progress = 0;
        self.transfer = TransferProgress::default();
        Ok(())
    }

    fn complete(&mut self) {
        self.progress = 100;
        self.connected = false;
        if let Err(e) = self.port.close() {
            debug!("Error closing port: {e}");
        }
        self.transfer = TransferProgress::default();
        self.phase = SessionPhase::Complete;
    }

    fn fail(&mut self, error: &Error) {
        warn!("Session failed: {error}");
        if let Err(e) = self.port.close() {
            debug!("Error closing port: {e}");
        }
        self.connected = false;
        self.progress = 0;
        self.transfer = TransferProgress::default();
        self.phase = SessionPhase::Failed;
    }

    fn run_download<F>(&mut self, output_dir: &Path, progress: &mut F) -> Result<DownloadOutcome>
    where
        F: FnMut(&str, usize, usize),
    {
        if !self.port.is_open() {
            return Err(Error::NotConnected);
        }
        self.port.clear_buffers()?;
        self.connected = true;
        fs::create_dir_all(output_dir)?;

        let timeouts = self.timeouts;
        let mut link = FrameLink::new(&mut self.port)?;

        self.phase = SessionPhase::AwaitingHandshake;
        let handshake = wait_for_handshake(&mut link, timeouts.handshake)?;

        self.phase = SessionPhase::ReceivingManifest;
        let manifest = receive_manifest(&mut link, timeouts.step)?;
        self.transfer.files_expected = manifest.len();

        let mut saved_files = Vec::with_capacity(manifest.len());
        for index in 0..manifest.len() {
            self.phase = SessionPhase::ReceivingFile;
            self.transfer.current_file = index + 1;

            let transfer = &mut self.transfer;
            let progress_field = &mut self.progress;
            let path = receive_file(&mut link, timeouts.step, output_dir, &mut |name, done, total| {
                transfer.bytes_done = done;
                transfer.total_bytes = total;
                *progress_field = percent(done, total);
                progress(name, done, total);
            })?;
            saved_files.push(path);
        }

        Ok(DownloadOutcome {
            handshake,
            saved_files,
        })
    }

    fn run_upload<F>(&mut self, config: &TestConfig, progress: &mut F) -> Result<()>
    where
        F: FnMut(&str, usize, usize),
    {
        if !self.port.is_open() {
            return Err(Error::NotConnected);
        }
        self.port.clear_buffers()?;
        self.connected = true;

        self.phase = SessionPhase::SendingConfig;
        self.transfer.files_expected = 1;
        self.transfer.current_file = 1;

        let timeouts = self.timeouts;
        let mut link = FrameLink::new(&mut self.port)?;

        let transfer = &mut self.transfer;
        let progress_field = &mut self.progress;
        send_config(&mut link, &timeouts, config, &mut |name, done, total| {
            transfer.bytes_done = done;
            transfer.total_bytes = total;
            *progress_field = percent(done, total);
            progress(name, done, total);
        })
    }
}

#[cfg(feature = "native")]
mod native_impl {
    use super::DeviceSession;
    use crate::error::{Error, Result};
    use crate::port::NativePort;
    use log::{debug, warn};
    use std::thread;
    use std::time::Duration;

    const MAX_OPEN_ATTEMPTS: usize = 3;
    const OPEN_RETRY_DELAY: Duration = Duration::from_millis(500);

    impl DeviceSession<NativePort> {
        /// Open a serial port with the device framing and wrap it in a
        /// session.
        ///
        /// Opening retries a few times; USB serial adapters are often
        /// briefly busy right after enumeration.
        pub fn open(port_name: &str, baud: u32) -> Result<Self> {
            let mut last_error = None;

            for attempt in 1..=MAX_OPEN_ATTEMPTS {
                match NativePort::open_simple(port_name, baud) {
                    Ok(port) => {
                        if attempt > 1 {
                            debug!("Port opened on attempt {attempt}");
                        }
                        return Ok(Self::new(port));
                    },
                    Err(e) => {
                        warn!(
                            "Failed to open port {port_name} (attempt {attempt}/{MAX_OPEN_ATTEMPTS}): {e}"
                        );
                        last_error = Some(e);

                        if attempt < MAX_OPEN_ATTEMPTS {
                            thread::sleep(OPEN_RETRY_DELAY);
                        }
                    },
                }
            }

            Err(last_error.unwrap_or(Error::DeviceNotFound))
        }
    }
}
