//! `upload` command: send a test configuration to a device.

use {
    anyhow::{Context, Result},
    batlink::TestConfig,
    console::style,
};

use crate::{Cli, CliError, commands, config::Config};

/// Push `settings` to the device that initiates the next session.
///
/// Validation happens before port selection so bad values fail fast with a
/// usage error instead of waiting on hardware.
pub(crate) fn cmd_upload(cli: &Cli, config: &mut Config, settings: TestConfig) -> Result<()> {
    settings
        .validate()
        .map_err(|err| CliError::Usage(err.to_string()))?;

    commands::ensure_not_interrupted()?;

    let port = crate::pick_port(cli, config)?;

    if !cli.quiet {
        eprintln!(
            "🔌 Using port {} at {} baud",
            style(&port).cyan().bold(),
            cli.baud
        );
        eprintln!(
            "📋 Plan {}: {} mA, sample every {} min, {} h, {}..{} °C",
            style(settings.plan_index).bold(),
            settings.current_ma,
            settings.sample_rate_min,
            settings.duration_hours,
            settings.min_temp_c,
            settings.max_temp_c
        );
    }

    let pb = commands::transfer_progress_bar(cli);
    let events = batlink::spawn_upload(&port, cli.baud, settings);
    let (_, outcome) =
        commands::consume_events(events, &pb, cli.quiet, crate::decorations_enabled());

    let outcome = outcome.context("Transfer worker exited without reporting a result")?;
    outcome.map_err(commands::map_session_error)?;

    if !cli.quiet {
        eprintln!();
        eprintln!(
            "🎉 Settings sent: {}",
            style(settings.filename()).green().bold()
        );
    }

    Ok(())
}
