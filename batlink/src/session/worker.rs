//! Background execution of transfer sessions.
//!
//! Protocol flows block for up to tens of seconds while waiting on the
//! device, so interactive callers must not run them inline. The
//! functions here move a [`DeviceSession`] onto a dedicated thread and
//! stream [`SessionEvent`]s back over a channel. The caller consumes
//! the receiver at its own pace; the stream always terminates with
//! exactly one [`SessionEvent::Finished`].

use crate::error::Result;
use crate::port::Port;
use crate::session::device::DeviceSession;
use crate::session::percent;
use crate::settings::TestConfig;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::path::{Path, PathBuf};
use std::thread;

/// Progress and lifecycle notifications emitted by a session thread.
#[derive(Debug)]
pub enum SessionEvent {
    /// Human-readable status line for display.
    Status(String),
    /// Link to the device established or torn down.
    Connected(bool),
    /// Bytes moved for the file currently in flight.
    Progress {
        /// Name of the file being transferred.
        file: String,
        /// Completion of the current file, 0 to 100.
        percent: u8,
        /// Bytes transferred so far.
        bytes_done: usize,
        /// Declared size of the file.
        total_bytes: usize,
    },
    /// A downloaded file has been written to disk.
    FileSaved(PathBuf),
    /// The session ended. Always the last event on the channel.
    Finished(Result<()>),
}

fn send(tx: &Sender<SessionEvent>, event: SessionEvent) {
    // The consumer may have hung up; the session keeps running either way
    let _ = tx.send(event);
}

/// Run a download session on its own thread, streaming events back.
///
/// The returned receiver yields `Status`, `Connected` and `Progress`
/// events while the transfer runs, one `FileSaved` per persisted file,
/// and finally `Finished` with the session result.
pub fn drive_download<P>(
    mut session: DeviceSession<P>,
    output_dir: &Path,
) -> Receiver<SessionEvent>
where
    P: Port + Send + 'static,
{
    let (tx, rx) = unbounded();
    let output_dir = output_dir.to_path_buf();

    thread::spawn(move || {
        send(&tx, SessionEvent::Connected(true));
        send(
            &tx,
            SessionEvent::Status("Waiting for device handshake...".to_string()),
        );

        let progress_tx = tx.clone();
        let result = session.download(&output_dir, &mut |file, done, total| {
            send(
                &progress_tx,
                SessionEvent::Progress {
                    file: file.to_string(),
                    percent: percent(done, total),
                    bytes_done: done,
                    total_bytes: total,
                },
            );
        });

        send(&tx, SessionEvent::Connected(false));
        match result {
            Ok(outcome) => {
                for path in &outcome.saved_files {
                    send(&tx, SessionEvent::FileSaved(path.clone()));
                }
                send(
                    &tx,
                    SessionEvent::Status(format!(
                        "Download complete: {} file(s)",
                        outcome.saved_files.len()
                    )),
                );
                send(&tx, SessionEvent::Finished(Ok(())));
            },
            Err(e) => {
                send(&tx, SessionEvent::Status(format!("Download failed: {e}")));
                send(&tx, SessionEvent::Finished(Err(e)));
            },
        }
    });

    rx
}

/// Run an upload session on its own thread, streaming events back.
pub fn drive_upload<P>(mut session: DeviceSession<P>, config: TestConfig) -> Receiver<SessionEvent>
where
    P: Port + Send + 'static,
{
    let (tx, rx) = unbounded();

    thread::spawn(move || {
        send(&tx, SessionEvent::Connected(true));
        send(
            &tx,
            SessionEvent::Status(format!("Sending {}...", config.filename())),
        );

        let progress_tx = tx.clone();
        let result = session.upload(&config, &mut |file, done, total| {
            send(
                &progress_tx,
                SessionEvent::Progress {
                    file: file.to_string(),
                    percent: percent(done, total),
                    bytes_done: done,
                    total_bytes: total,
                },
            );
        });

        send(&tx, SessionEvent::Connected(false));
        match result {
            Ok(()) => {
                send(
                    &tx,
                    SessionEvent::Status(format!("Configuration sent: {}", config.filename())),
                );
                send(&tx, SessionEvent::Finished(Ok(())));
            },
            Err(e) => {
                send(&tx, SessionEvent::Status(format!("Upload failed: {e}")));
                send(&tx, SessionEvent::Finished(Err(e)));
            },
        }
    });

    rx
}

#[cfg(feature = "native")]
mod native_impl {
    use super::{Receiver, SessionEvent, drive_download, drive_upload, send};
    use crate::port::NativePort;
    use crate::session::device::DeviceSession;
    use crate::settings::TestConfig;
    use crossbeam_channel::unbounded;
    use std::path::{Path, PathBuf};
    use std::thread;

    fn with_open_session<F>(port_name: &str, baud: u32, run: F) -> Receiver<SessionEvent>
    where
        F: FnOnce(DeviceSession<NativePort>) -> Receiver<SessionEvent> + Send + 'static,
    {
        let (tx, rx) = unbounded();
        let port_name = port_name.to_string();

        thread::spawn(move || {
            send(
                &tx,
                SessionEvent::Status(format!("Connecting to {port_name}...")),
            );
            match DeviceSession::open(&port_name, baud) {
                Ok(session) => {
                    for event in run(session) {
                        send(&tx, event);
                    }
                },
                Err(e) => {
                    send(&tx, SessionEvent::Status(format!("Connection failed: {e}")));
                    send(&tx, SessionEvent::Finished(Err(e)));
                },
            }
        });

        rx
    }

    /// Open `port_name` and run a download session on a background
    /// thread. Open failures surface as a `Finished(Err(_))` event.
    pub fn spawn_download(port_name: &str, baud: u32, output_dir: &Path) -> Receiver<SessionEvent> {
        let output_dir: PathBuf = output_dir.to_path_buf();
        with_open_session(port_name, baud, move |session| {
            drive_download(session, &output_dir)
        })
    }

    /// Open `port_name` and run an upload session on a background
    /// thread. The config is validated inside the session before any
    /// bytes are written.
    pub fn spawn_upload(port_name: &str, baud: u32, config: TestConfig) -> Receiver<SessionEvent> {
        with_open_session(port_name, baud, move |session| drive_upload(session, config))
    }
}

#[cfg(feature = "native")]
pub use native_impl::{spawn_download, spawn_upload};
