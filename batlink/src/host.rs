//! One-call convenience API over [`DeviceSession`](crate::DeviceSession).
//!
//! These helpers cover the common "open, transfer, close" cycle for
//! callers that do not need phase tracking or background execution.

use crate::error::Result;
use std::path::{Path, PathBuf};

#[cfg(feature = "native")]
use crate::session::DeviceSession;
#[cfg(feature = "native")]
use crate::settings::TestConfig;

/// Wait for the device on `port_name` and download every result file
/// it offers into `output_dir`. Returns the saved paths in transfer
/// order.
#[cfg(feature = "native")]
pub fn download_results<F>(
    port_name: &str,
    baud: u32,
    output_dir: &Path,
    progress: &mut F,
) -> Result<Vec<PathBuf>>
where
    F: FnMut(&str, usize, usize),
{
    let mut session = DeviceSession::open(port_name, baud)?;
    let outcome = session.download(output_dir, progress)?;
    Ok(outcome.saved_files)
}

/// Send a test configuration to the device on `port_name`.
///
/// The record is validated before the port is opened, so an invalid
/// configuration never touches the hardware.
#[cfg(feature = "native")]
pub fn upload_settings<F>(
    port_name: &str,
    baud: u32,
    config: &TestConfig,
    progress: &mut F,
) -> Result<()>
where
    F: FnMut(&str, usize, usize),
{
    config.validate()?;
    let mut session = DeviceSession::open(port_name, baud)?;
    session.upload(config, progress)
}

/// List result files (`*.csv`) under `dir`, sorted by name.
///
/// A missing directory reads as empty rather than an error; it means
/// nothing has been downloaded yet.
pub fn list_result_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if path.is_file() && is_csv {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
