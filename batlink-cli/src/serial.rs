//! Serial port selection for transfer commands.
//!
//! Resolution order: an explicitly named port wins, then the configured
//! port, then auto-detection over the USB metadata of the enumerated
//! ports. Prompts only appear on a terminal; non-interactive mode fails
//! instead of blocking.

use anyhow::Result;
use batlink::{DetectedPort, DeviceKind, detect_ports, format_port_list};
use console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Error as DialoguerError, Select};
use log::{debug, error, info};
use std::io::IsTerminal;

use crate::CliError;
use crate::config::Config;

/// Flags steering how the port is chosen.
#[derive(Debug, Clone, Default)]
pub struct SelectOptions {
    /// Port named on the command line, bypassing detection.
    pub port: Option<String>,
    /// Offer every enumerated port, not just recognized devices.
    pub list_all_ports: bool,
    /// Fail instead of prompting.
    pub non_interactive: bool,
    /// Prompt even when a single recognized device was found.
    pub confirm_port: bool,
}

/// Outcome of selection: the port, plus whether it was recognized.
#[derive(Debug)]
pub struct PortChoice {
    pub port: DetectedPort,
    /// Matched a built-in bridge kind or a remembered device.
    pub is_known: bool,
}

impl PortChoice {
    fn new(port: DetectedPort, config: &Config) -> Self {
        let is_known = recognized(&port, config);
        Self { port, is_known }
    }
}

// Selection failures are setup problems, not transfer faults; they map to
// exit code 2 through CliError::Usage.
fn setup_error(message: &str) -> anyhow::Error {
    CliError::Usage(message.to_string()).into()
}

fn prompt_cancelled() -> anyhow::Error {
    CliError::Cancelled("Port selection cancelled".to_string()).into()
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    let DialoguerError::IO(io_err) = err;
    if io_err.kind() == std::io::ErrorKind::Interrupted {
        prompt_cancelled()
    } else {
        CliError::Usage("Port selection prompt failed".to_string()).into()
    }
}

/// Pick the serial port for the next transfer, prompting when needed.
pub fn choose_port(options: &SelectOptions, config: &Config) -> Result<PortChoice> {
    if let Some(name) = options.port.as_deref() {
        return Ok(resolve_named_port(name, config));
    }
    if let Some(name) = config.port.connection.serial.as_deref() {
        debug!("Using port from config: {name}");
        return Ok(resolve_named_port(name, config));
    }

    let all = detect_ports();
    if all.is_empty() {
        return Err(setup_error(
            "No serial ports found. Connect the device and try again",
        ));
    }

    let known: Vec<DetectedPort> = all
        .iter()
        .filter(|p| recognized(p, config))
        .cloned()
        .collect();
    let mut candidates = if options.list_all_ports || known.is_empty() {
        all
    } else {
        known
    };

    if options.non_interactive {
        return pick_headless(candidates, config);
    }

    match candidates.len() {
        0 => Err(setup_error("No serial ports available")),
        1 => {
            let choice = PortChoice::new(candidates.remove(0), config);
            if choice.is_known && !options.confirm_port {
                info!(
                    "Using {} [{}] without prompting",
                    choice.port.name,
                    choice.port.device.name()
                );
                Ok(choice)
            } else {
                require_terminal()?;
                confirm_port_use(choice)
            }
        },
        _ => {
            require_terminal()?;
            prompt_for_port(candidates, config)
        },
    }
}

/// Deterministic selection for scripts: exactly one candidate or nothing.
fn pick_headless(mut candidates: Vec<DetectedPort>, config: &Config) -> Result<PortChoice> {
    match candidates.len() {
        1 => Ok(PortChoice::new(candidates.remove(0), config)),
        0 => Err(setup_error("No serial ports available")),
        _ => Err(setup_error(&format!(
            "Multiple serial ports found; specify one with --port or BATLINK_PORT:\n  {}",
            format_port_list(&candidates).join("\n  ")
        ))),
    }
}

/// Look up a user-named port, falling back to a bare placeholder when the
/// name is not in the detected list. Opening the port reports the real
/// story either way.
fn resolve_named_port(name: &str, config: &Config) -> PortChoice {
    let ports = detect_ports();
    let found = ports
        .iter()
        .find(|p| p.name == name)
        // Windows reports COM names in varying case
        .or_else(|| ports.iter().find(|p| p.name.eq_ignore_ascii_case(name)));

    match found {
        Some(port) => PortChoice::new(port.clone(), config),
        None => {
            debug!("Port {name} not in the detected list, using it as given");
            PortChoice {
                port: DetectedPort {
                    name: name.to_string(),
                    device: DeviceKind::Unknown,
                    vid: None,
                    pid: None,
                    manufacturer: None,
                    product: None,
                    serial: None,
                },
                is_known: false,
            }
        },
    }
}

/// Built-in USB-serial bridge, or a device the user chose to remember.
fn recognized(port: &DetectedPort, config: &Config) -> bool {
    if port.device.is_known() {
        return true;
    }
    match (port.vid, port.pid) {
        (Some(vid), Some(pid)) => config.port.usb_device.iter().any(|d| d.matches(vid, pid)),
        _ => false,
    }
}

fn require_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        return Ok(());
    }
    Err(setup_error(
        "Interactive port selection needs a terminal; pass --port or use --non-interactive",
    ))
}

/// One display line per port: name, bridge kind or raw VID:PID, product.
fn render_label(port: &DetectedPort, known: bool, max_width: usize) -> String {
    let mut label = if known {
        style(&port.name).bold().to_string()
    } else {
        port.name.clone()
    };

    if port.device.is_known() {
        label.push_str(&format!(" [{}]", style(port.device.name()).yellow()));
    } else if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        label.push_str(&format!(" ({vid:04X}:{pid:04X})"));
    }
    if let Some(product) = &port.product {
        label.push_str(&format!(" - {}", style(product).dim()));
    }

    console::truncate_str(&label, max_width, "\u{2026}").into_owned()
}

fn prompt_for_port(mut ports: Vec<DetectedPort>, config: &Config) -> Result<PortChoice> {
    ports.sort_by_key(|p| !recognized(p, config));

    eprintln!("{} Found {} serial ports", style("ℹ").blue(), ports.len());
    eprintln!(
        "{}",
        style("Known USB-serial devices are listed first").dim()
    );

    // Labels must fit the terminal or dialoguer wraps the list
    let width = console::Term::stderr().size().1 as usize;
    let labels: Vec<String> = ports
        .iter()
        .map(|p| render_label(p, recognized(p, config), width.saturating_sub(4)))
        .collect();

    let choice = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select a serial port")
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?
        .ok_or_else(prompt_cancelled)?;

    Ok(PortChoice::new(ports.swap_remove(choice), config))
}

fn confirm_port_use(choice: PortChoice) -> Result<PortChoice> {
    let detail = choice
        .port
        .product
        .as_deref()
        .map(|p| format!(" - {p}"))
        .unwrap_or_default();

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Use port {}{detail}?", choice.port.name))
        .default(true)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        Ok(choice)
    } else {
        Err(prompt_cancelled())
    }
}

/// Offer to remember an unrecognized USB device in the ports config.
pub fn offer_to_remember(port: &DetectedPort, config: &mut Config) -> Result<()> {
    let (Some(vid), Some(pid)) = (port.vid, port.pid) else {
        return Ok(());
    };
    if config.port.usb_device.iter().any(|d| d.matches(vid, pid)) {
        return Ok(());
    }

    let save = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Remember this device for automatic selection next time?")
        .default(false)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if save {
        // A failed save should not fail the transfer that follows
        if let Err(e) = config.remember_device(vid, pid) {
            error!("Failed to save port configuration: {e}");
        }
    }
    Ok(())
}
