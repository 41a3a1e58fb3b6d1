//! [`Port`] backed by a real serial device via the `serialport` crate.

use crate::error::Result;
use crate::port::{Port, PortSettings};
use log::trace;
use serialport::ClearBuffer;
use std::io::{Read, Write};
use std::time::Duration;

/// An open operating-system serial port.
///
/// `close` drops the handle but keeps the struct usable for name and
/// timeout queries; I/O on a closed port fails with `NotConnected`.
pub struct NativePort {
    port: Option<Box<dyn serialport::SerialPort>>,
    settings: PortSettings,
}

impl NativePort {
    /// Open the port named in `settings` and program the device framing.
    ///
    /// Both directions are flushed right after opening so leftover
    /// bytes from a previous session cannot leak into the first frame
    /// decode.
    pub fn open(settings: &PortSettings) -> Result<Self> {
        // 8N1 with no flow control is fixed by the device firmware
        let mut port = serialport::new(&settings.path, settings.baud)
            .timeout(settings.timeout)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .open()?;
        port.clear(ClearBuffer::All)?;
        trace!("Opened {} at {} baud", settings.path, settings.baud);

        Ok(Self {
            port: Some(port),
            settings: settings.clone(),
        })
    }

    /// Shorthand for [`open`](Self::open) with the default timeout.
    pub fn open_simple(path: &str, baud: u32) -> Result<Self> {
        Self::open(&PortSettings::new(path, baud))
    }

    fn active(&mut self) -> std::io::Result<&mut Box<dyn serialport::SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotConnected, "port closed"))
    }
}

impl Port for NativePort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        if let Some(port) = self.port.as_mut() {
            port.set_timeout(timeout)?;
        }
        self.settings.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.settings.timeout
    }

    fn clear_buffers(&mut self) -> Result<()> {
        if let Some(port) = self.port.as_mut() {
            port.clear(ClearBuffer::All)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.settings.path
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the handle closes the descriptor
        self.port.take();
        Ok(())
    }
}

impl Read for NativePort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.active()?.read(buf)
    }
}

impl Write for NativePort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.active()?.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.active()?.flush()
    }
}
