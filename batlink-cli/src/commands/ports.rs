//! `list-ports` and `list-files` commands: local inspection helpers.
//!
//! Both support `--json` for scripting; human-readable output goes to
//! stderr, JSON goes to stdout.

use {
    anyhow::{Context, Result},
    batlink::{DetectedPort, auto_detect_port, detect_ports, list_result_files},
    console::style,
    std::path::Path,
};

fn print_json<T: serde::Serialize>(value: &T) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

fn port_json(port: &DetectedPort) -> serde_json::Value {
    serde_json::json!({
        "name": port.name,
        "device": port.device.name(),
        "known": port.device.is_known(),
        "vid": port.vid,
        "pid": port.pid,
        "manufacturer": port.manufacturer,
        "product": port.product,
        "serial": port.serial,
    })
}

/// One colored bullet line for the human port listing.
fn port_line(port: &DetectedPort) -> String {
    let mut line = format!("  {} {}", style("•").green(), style(&port.name).cyan());
    if port.device.is_known() {
        line.push_str(&format!(" [{}]", style(port.device.name()).yellow()));
    }
    if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        line.push_str(&format!(" ({vid:04X}:{pid:04X})"));
    }
    if let Some(product) = port.product.as_deref().filter(|p| !p.is_empty()) {
        line.push_str(&format!(" - {}", style(product).dim()));
    }
    line
}

pub(crate) fn cmd_list_ports(json: bool) {
    let detected = detect_ports();

    if json {
        let ports: Vec<serde_json::Value> = detected.iter().map(port_json).collect();
        print_json(&ports);
        return;
    }

    eprintln!("{}", style("Available serial ports:").bold().underlined());

    if detected.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return;
    }

    for port in &detected {
        eprintln!("{}", port_line(port));
    }

    // Show which port a transfer would pick without an explicit --port
    if let Ok(auto_port) = auto_detect_port() {
        eprintln!(
            "\n{} Would auto-select {}",
            style("→").green().bold(),
            style(&auto_port.name).cyan().bold()
        );
    }
}

fn result_file_json(path: &Path) -> serde_json::Value {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let size = std::fs::metadata(path).map(|m| m.len()).ok();
    serde_json::json!({
        "name": name,
        "path": path.display().to_string(),
        "size": size,
    })
}

/// List downloaded result files in `dir`.
///
/// A missing directory is reported as an empty listing, matching the
/// transfer engine which creates it on first download.
pub(crate) fn cmd_list_files(dir: &Path, json: bool) -> Result<()> {
    let files =
        list_result_files(dir).with_context(|| format!("Failed to scan {}", dir.display()))?;

    if json {
        let entries: Vec<serde_json::Value> = files.iter().map(|p| result_file_json(p)).collect();
        print_json(&entries);
        return Ok(());
    }

    eprintln!(
        "{}",
        style(format!("Result files in {}:", dir.display()))
            .bold()
            .underlined()
    );

    if files.is_empty() {
        eprintln!("  {}", style("No result files found").dim());
    } else {
        for path in &files {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            eprintln!(
                "  {} {} {}",
                style("•").green(),
                style(name).cyan(),
                style(format!("({size} bytes)")).dim()
            );
        }
    }

    Ok(())
}
