//! Layered configuration for batlink.
//!
//! Sources, strongest last when merging (command-line arguments and
//! BATLINK_* environment variables are applied by the CLI layer on top
//! of everything loaded here):
//! global `~/.config/batlink/config.toml`, then local `batlink.toml`,
//! then a dedicated ports file (`batlink_ports.toml` or the global
//! `ports.toml`) which replaces the port section wholesale.

use directories::ProjectDirs;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub port: PortConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
}

/// Serial port selection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Devices remembered for automatic selection.
    #[serde(default)]
    pub usb_device: Vec<UsbDevice>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port, e.g. "/dev/ttyACM0" or "COM3".
    pub serial: Option<String>,
    pub baud: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Where downloaded result files are written.
    pub output_dir: Option<PathBuf>,
}

/// A USB vendor/product pair used to recognize a tester.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsbDevice {
    pub vid: u16,
    pub pid: u16,
}

impl UsbDevice {
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vid == vid && self.pid == pid
    }
}

impl Config {
    /// Load and merge every configuration source.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(path) = Self::user_config_file() {
            if let Some(layer) = read_toml::<Self>(&path) {
                debug!("Loaded user config from {}", path.display());
                config.merge(layer);
            }
        }
        if let Some(layer) = read_toml::<Self>(Path::new("batlink.toml")) {
            debug!("Loaded local config from batlink.toml");
            config.merge(layer);
        }
        if let Some(ports) = Self::load_ports_config() {
            config.port = ports;
        }

        config
    }

    /// Load a single file named with --config, defaulting on failure.
    pub fn load_from_path(path: &Path) -> Self {
        match read_toml(path) {
            Some(config) => {
                debug!("Loaded config from {}", path.display());
                config
            },
            None => {
                warn!(
                    "Could not load config from {}, using defaults",
                    path.display()
                );
                Self::default()
            },
        }
    }

    /// First ports file that parses, local before per-user.
    fn load_ports_config() -> Option<PortConfig> {
        let mut candidates = vec![PathBuf::from("batlink_ports.toml")];
        if let Some(dir) = Self::user_config_dir() {
            candidates.push(dir.join("ports.toml"));
        }

        candidates.iter().find_map(|path| {
            let ports = read_toml(path)?;
            debug!("Loaded ports config from {}", path.display());
            Some(ports)
        })
    }

    pub fn user_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "batlink").map(|dirs| dirs.config_dir().to_path_buf())
    }

    pub fn user_config_file() -> Option<PathBuf> {
        Self::user_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Overlay `layer` on top of this config. Set fields win, device
    /// lists accumulate.
    fn merge(&mut self, layer: Self) {
        let conn = &mut self.port.connection;
        conn.serial = layer.port.connection.serial.or(conn.serial.take());
        conn.baud = layer.port.connection.baud.or(conn.baud.take());
        self.port.usb_device.extend(layer.port.usb_device);

        self.transfer.output_dir = layer
            .transfer
            .output_dir
            .or(self.transfer.output_dir.take());
    }

    /// Record a device for automatic selection on later runs.
    pub fn remember_device(&mut self, vid: u16, pid: u16) -> anyhow::Result<()> {
        let device = UsbDevice { vid, pid };
        if self.port.usb_device.contains(&device) {
            return Ok(());
        }
        self.port.usb_device.push(device);

        let path = Self::ports_save_path()?;
        fs::write(&path, toml::to_string_pretty(&self.port)?)?;
        info!("Remembered device {vid:04X}:{pid:04X} in {}", path.display());
        Ok(())
    }

    /// Local ports file when the working directory already carries
    /// config, the per-user directory otherwise.
    fn ports_save_path() -> anyhow::Result<PathBuf> {
        let has_local = ["batlink_ports.toml", "batlink.toml"]
            .iter()
            .any(|name| Path::new(name).exists());
        if !has_local {
            if let Some(dir) = Self::user_config_dir() {
                fs::create_dir_all(&dir)?;
                return Ok(dir.join("ports.toml"));
            }
        }
        Ok(PathBuf::from("batlink_ports.toml"))
    }
}

/// Read and parse a TOML file. Missing files are silent, unreadable or
/// malformed ones log a warning.
fn read_toml<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return None;
        },
    };
    match toml::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Failed to parse config file {}: {}", path.display(), e);
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(vid: u16, pid: u16) -> UsbDevice {
        UsbDevice { vid, pid }
    }

    #[test]
    fn test_default_config_is_empty() {
        let config = Config::default();
        assert!(config.port.connection.serial.is_none());
        assert!(config.port.connection.baud.is_none());
        assert!(config.port.usb_device.is_empty());
        assert!(config.transfer.output_dir.is_none());
    }

    #[test]
    fn test_usb_device_matches_exact_pair_only() {
        let d = device(0x0483, 0x5740);
        assert!(d.matches(0x0483, 0x5740));
        assert!(!d.matches(0x0483, 0x5741));
        assert!(!d.matches(0x10C4, 0x5740));
        assert_eq!(d, device(0x0483, 0x5740));
        assert_ne!(d, device(0x10C4, 0xEA60));
    }

    #[test]
    fn test_merge_set_fields_win() {
        let mut base = Config::default();
        base.port.connection.serial = Some("/dev/ttyACM0".into());
        base.port.connection.baud = Some(115_200);

        let mut layer = Config::default();
        layer.port.connection.baud = Some(230_400);
        layer.transfer.output_dir = Some(PathBuf::from("/data/results"));

        base.merge(layer);

        assert_eq!(base.port.connection.serial.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(base.port.connection.baud, Some(230_400));
        assert_eq!(
            base.transfer.output_dir.as_deref(),
            Some(Path::new("/data/results"))
        );
    }

    #[test]
    fn test_merge_unset_layer_changes_nothing() {
        let mut base = Config::default();
        base.port.connection.serial = Some("/dev/ttyACM0".into());
        base.transfer.output_dir = Some(PathBuf::from("/data/results"));

        base.merge(Config::default());

        assert_eq!(base.port.connection.serial.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(
            base.transfer.output_dir.as_deref(),
            Some(Path::new("/data/results"))
        );
    }

    #[test]
    fn test_merge_accumulates_remembered_devices() {
        let mut base = Config::default();
        base.port.usb_device.push(device(0x0483, 0x5740));

        let mut layer = Config::default();
        layer.port.usb_device.push(device(0x10C4, 0xEA60));

        base.merge(layer);
        assert_eq!(base.port.usb_device.len(), 2);
    }

    #[test]
    fn test_parse_full_toml() {
        let config: Config = toml::from_str(
            r#"
            [port.connection]
            serial = "/dev/ttyACM0"
            baud = 115200

            [[port.usb_device]]
            vid = 1155
            pid = 22336

            [transfer]
            output_dir = "results"
            "#,
        )
        .unwrap();

        assert_eq!(config.port.connection.serial.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.port.connection.baud, Some(115_200));
        assert_eq!(config.port.usb_device, vec![device(1155, 22336)]);
        assert_eq!(
            config.transfer.output_dir.as_deref(),
            Some(Path::new("results"))
        );
    }

    #[test]
    fn test_parse_empty_and_partial_toml() {
        let empty: Config = toml::from_str("").unwrap();
        assert!(empty.port.connection.serial.is_none());
        assert!(empty.port.usb_device.is_empty());

        let partial: Config = toml::from_str("[transfer]\noutput_dir = \"/srv/battery\"").unwrap();
        assert!(partial.port.connection.serial.is_none());
        assert_eq!(
            partial.transfer.output_dir.as_deref(),
            Some(Path::new("/srv/battery"))
        );
    }

    #[test]
    fn test_toml_roundtrip_preserves_fields() {
        let mut config = Config::default();
        config.port.connection.serial = Some("COM3".into());
        config.port.connection.baud = Some(230_400);
        config.port.usb_device.push(device(0x0483, 0x5740));
        config.transfer.output_dir = Some(PathBuf::from("received"));

        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();

        assert_eq!(back.port.connection.serial.as_deref(), Some("COM3"));
        assert_eq!(back.port.connection.baud, Some(230_400));
        assert_eq!(back.port.usb_device, vec![device(0x0483, 0x5740)]);
        assert_eq!(
            back.transfer.output_dir.as_deref(),
            Some(Path::new("received"))
        );
    }

    #[test]
    fn test_load_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(
            &path,
            "[port.connection]\nserial = \"/dev/ttyACM1\"\n[transfer]\noutput_dir = \"archive\"\n",
        )
        .unwrap();

        let config = Config::load_from_path(&path);
        assert_eq!(config.port.connection.serial.as_deref(), Some("/dev/ttyACM1"));
        assert_eq!(
            config.transfer.output_dir.as_deref(),
            Some(Path::new("archive"))
        );
    }

    #[test]
    fn test_load_from_path_missing_file_defaults() {
        let config = Config::load_from_path(Path::new("/nonexistent/path/config.toml"));
        assert!(config.port.connection.serial.is_none());
    }

    #[test]
    fn test_read_toml_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[port.connection\nserial = ").unwrap();
        assert!(read_toml::<Config>(&path).is_none());
    }

    #[test]
    fn test_user_paths_name_the_application() {
        if let Some(dir) = Config::user_config_dir() {
            assert!(dir.to_str().unwrap().contains("batlink"));
        }
        if let Some(path) = Config::user_config_file() {
            assert!(path.to_str().unwrap().ends_with("config.toml"));
        }
    }
}
