//! `download` command: receive result files from a device.

use {
    anyhow::{Context, Result},
    console::style,
    std::path::Path,
};

use crate::{Cli, commands, config::Config};

/// Wait for a device-initiated session and save every offered result file
/// into `output_dir`.
pub(crate) fn cmd_download(cli: &Cli, config: &mut Config, output_dir: &Path) -> Result<()> {
    commands::ensure_not_interrupted()?;

    let port = crate::pick_port(cli, config)?;

    if !cli.quiet {
        eprintln!(
            "🔌 Using port {} at {} baud",
            style(&port).cyan().bold(),
            cli.baud
        );
        eprintln!(
            "📂 Saving result files to {}",
            style(output_dir.display()).bold()
        );
    }

    let pb = commands::transfer_progress_bar(cli);
    let events = batlink::spawn_download(&port, cli.baud, output_dir);
    let (saved, outcome) =
        commands::consume_events(events, &pb, cli.quiet, crate::decorations_enabled());

    let outcome = outcome.context("Transfer worker exited without reporting a result")?;
    outcome.map_err(commands::map_session_error)?;

    if !cli.quiet {
        eprintln!();
        eprintln!(
            "🎉 Download complete: {} file(s) saved to {}",
            style(saved).green().bold(),
            output_dir.display()
        );
    }

    Ok(())
}
