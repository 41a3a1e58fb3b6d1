//! Serial device discovery and classification.
//!
//! Battery test devices enumerate either as an STM32 virtual COM port
//! (the instrument's own MCU) or behind a USB-UART bridge on older
//! hardware revisions. Discovery never touches the protocol layer; it
//! only reads USB descriptors, so it is safe to run while a transfer
//! is active on another port.

use crate::error::{Error, Result};
use log::{debug, info, trace};

/// USB device kinds a battery tester shows up as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// STM32 virtual COM port, the instrument's native interface.
    Stm32Vcp,
    /// CH340/CH341 USB-to-serial bridge.
    Ch340,
    /// Silicon Labs CP210x USB-to-serial bridge.
    Cp210x,
    /// FTDI FT232-family USB-to-serial bridge.
    Ftdi,
    /// Prolific PL2303 USB-to-serial bridge.
    Prolific,
    /// Unclassified device.
    Unknown,
}

impl DeviceKind {
    /// Classify a USB VID/PID pair.
    #[must_use]
    pub fn from_vid_pid(vid: u16, pid: u16) -> Self {
        match (vid, pid) {
            (0x0483, 0x5740) => Self::Stm32Vcp,
            (0x1A86, 0x7523 | 0x7522 | 0x5523 | 0x5512 | 0x55D4) => Self::Ch340,
            (0x10C4, 0xEA60 | 0xEA70 | 0xEA71 | 0xEA63) => Self::Cp210x,
            (0x0403, 0x6001 | 0x6010 | 0x6011 | 0x6014 | 0x6015) => Self::Ftdi,
            (0x067B, 0x2303 | 0x23A3 | 0x23C3 | 0x23D3) => Self::Prolific,
            _ => Self::Unknown,
        }
    }

    /// Human-readable name for the device kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stm32Vcp => "STM32 VCP",
            Self::Ch340 => "CH340/CH341",
            Self::Cp210x => "CP210x",
            Self::Ftdi => "FTDI",
            Self::Prolific => "PL2303",
            Self::Unknown => "Unknown",
        }
    }

    /// True for device kinds a battery tester plausibly enumerates as.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// One discovered serial endpoint with its USB metadata.
#[derive(Debug, Clone)]
pub struct DetectedPort {
    /// Port name or path, e.g. "/dev/ttyUSB0" or "COM3".
    pub name: String,
    /// Classified device kind.
    pub device: DeviceKind,
    /// USB vendor ID, when the port is USB-backed.
    pub vid: Option<u16>,
    /// USB product ID, when the port is USB-backed.
    pub pid: Option<u16>,
    /// Manufacturer string from the USB descriptor.
    pub manufacturer: Option<String>,
    /// Product string from the USB descriptor.
    pub product: Option<String>,
    /// Serial number from the USB descriptor.
    pub serial: Option<String>,
}

impl DetectedPort {
    /// True when this port plausibly belongs to a battery tester.
    pub fn is_candidate(&self) -> bool {
        self.device.is_known()
    }

    fn from_port_info(info: serialport::SerialPortInfo) -> Self {
        let mut port = Self {
            name: info.port_name,
            device: DeviceKind::Unknown,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial: None,
        };
        if let serialport::SerialPortType::UsbPort(usb) = info.port_type {
            let (vid, pid) = (usb.vid, usb.pid);
            port.device = DeviceKind::from_vid_pid(vid, pid);
            port.vid = Some(vid);
            port.pid = Some(pid);
            port.manufacturer = usb.manufacturer;
            port.product = usb.product;
            port.serial = usb.serial_number;
            trace!(
                "Found USB port: {} (VID: {vid:04X}, PID: {pid:04X}, Device: {:?})",
                port.name, port.device
            );
        }
        port
    }

    fn display_line(&self) -> String {
        let mut line = self.name.clone();
        if self.device.is_known() {
            line.push_str(&format!(" [{}]", self.device.name()));
        } else if let (Some(vid), Some(pid)) = (self.vid, self.pid) {
            line.push_str(&format!(" [VID:{vid:04X} PID:{pid:04X}]"));
        }
        if let Some(product) = &self.product {
            line.push_str(&format!(" - {product}"));
        }
        line
    }
}

/// Enumerate all serial ports with USB metadata attached.
pub fn detect_ports() -> Vec<DetectedPort> {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            debug!("Failed to enumerate serial ports: {e}");
            return Vec::new();
        },
    };
    ports.into_iter().map(DetectedPort::from_port_info).collect()
}

/// Pick the device port without user interaction.
///
/// Selection is deliberately conservative: it succeeds only when
/// exactly one plausible device is attached. With zero or several
/// candidates the caller must ask the user, so plugging in a second
/// adapter never silently redirects a transfer.
pub fn auto_detect_port() -> Result<DetectedPort> {
    let ports = detect_ports();

    if let Some(port) = sole(&ports, |p| p.device == DeviceKind::Stm32Vcp) {
        info!("Auto-detected battery tester: {}", port.name);
        return Ok(port.clone());
    }
    if let Some(port) = sole(&ports, DetectedPort::is_candidate) {
        info!(
            "Auto-detected serial adapter ({}): {}",
            port.device.name(),
            port.name
        );
        return Ok(port.clone());
    }

    debug!(
        "Auto-detection inconclusive: {} candidate(s) among {} port(s)",
        ports.iter().filter(|p| p.is_candidate()).count(),
        ports.len()
    );
    Err(Error::DeviceNotFound)
}

/// The single port matching `pred`, if exactly one does.
fn sole(ports: &[DetectedPort], pred: impl Fn(&DetectedPort) -> bool) -> Option<&DetectedPort> {
    let mut matches = ports.iter().filter(|p| pred(p));
    match (matches.next(), matches.next()) {
        (Some(port), None) => Some(port),
        _ => None,
    }
}

/// Format detected ports for display, one line per port.
pub fn format_port_list(ports: &[DetectedPort]) -> Vec<String> {
    ports.iter().map(DetectedPort::display_line).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str, device: DeviceKind, vid: Option<u16>, pid: Option<u16>) -> DetectedPort {
        DetectedPort {
            name: name.to_string(),
            device,
            vid,
            pid,
            manufacturer: None,
            product: None,
            serial: None,
        }
    }

    #[test]
    fn test_classification_by_vid_pid() {
        let cases = [
            (0x0483, 0x5740, DeviceKind::Stm32Vcp),
            (0x1A86, 0x7523, DeviceKind::Ch340),
            (0x1A86, 0x55D4, DeviceKind::Ch340),
            (0x10C4, 0xEA60, DeviceKind::Cp210x),
            (0x0403, 0x6001, DeviceKind::Ftdi),
            (0x067B, 0x2303, DeviceKind::Prolific),
            (0x1234, 0x5678, DeviceKind::Unknown),
            // same vendor, unlisted product
            (0x0483, 0x0001, DeviceKind::Unknown),
        ];
        for (vid, pid, expected) in cases {
            assert_eq!(
                DeviceKind::from_vid_pid(vid, pid),
                expected,
                "{vid:04X}:{pid:04X}"
            );
        }
    }

    #[test]
    fn test_candidate_classification() {
        let acm = port("/dev/ttyACM0", DeviceKind::Stm32Vcp, Some(0x0483), Some(0x5740));
        let usb = port("/dev/ttyUSB0", DeviceKind::Ch340, Some(0x1A86), Some(0x7523));
        let builtin = port("/dev/ttyS0", DeviceKind::Unknown, None, None);

        assert!(acm.is_candidate());
        assert!(usb.is_candidate());
        assert!(!builtin.is_candidate());
    }

    #[test]
    fn test_sole_requires_exactly_one_match() {
        let ports = vec![
            port("/dev/ttyUSB0", DeviceKind::Ch340, Some(0x1A86), Some(0x7523)),
            port("/dev/ttyUSB1", DeviceKind::Ch340, Some(0x1A86), Some(0x7523)),
            port("/dev/ttyACM0", DeviceKind::Stm32Vcp, Some(0x0483), Some(0x5740)),
        ];

        let vcp = sole(&ports, |p| p.device == DeviceKind::Stm32Vcp).unwrap();
        assert_eq!(vcp.name, "/dev/ttyACM0");

        assert!(sole(&ports, |p| p.device == DeviceKind::Ch340).is_none());
        assert!(sole(&ports, |p| p.device == DeviceKind::Ftdi).is_none());
    }

    #[test]
    fn test_port_display_lines() {
        let mut tester = port("/dev/ttyACM0", DeviceKind::Stm32Vcp, Some(0x0483), Some(0x5740));
        tester.product = Some("Battery Tester".to_string());
        let ports = vec![
            tester,
            port("/dev/ttyUSB1", DeviceKind::Unknown, Some(0x1111), Some(0x2222)),
            port("/dev/ttyS0", DeviceKind::Unknown, None, None),
        ];

        let lines = format_port_list(&ports);
        assert_eq!(lines[0], "/dev/ttyACM0 [STM32 VCP] - Battery Tester");
        assert_eq!(lines[1], "/dev/ttyUSB1 [VID:1111 PID:2222]");
        assert_eq!(lines[2], "/dev/ttyS0");
    }
}
