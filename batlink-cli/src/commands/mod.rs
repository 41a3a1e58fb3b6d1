//! Command implementations.
//!
//! Each subcommand is implemented in its own module for clean separation.

pub(crate) mod completions;
pub(crate) mod download;
pub(crate) mod ports;
pub(crate) mod upload;

use {
    anyhow::Result,
    batlink::SessionEvent,
    console::style,
    indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle},
};

/// Bail out early when Ctrl-C was pressed before the transfer started.
pub(crate) fn ensure_not_interrupted() -> Result<()> {
    if crate::was_interrupted() {
        return Err(crate::CliError::Cancelled("Interrupted by user".to_string()).into());
    }
    Ok(())
}

/// Progress bar for transfer commands.
///
/// Hidden in quiet mode and on non-interactive terminals so command output
/// stays machine-parseable.
pub(crate) fn transfer_progress_bar(cli: &crate::Cli) -> ProgressBar {
    if cli.quiet || !crate::decorations_enabled() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(100);
    // A malformed template literal would panic here, not mid-transfer
    #[allow(clippy::unwrap_used)]
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} {bar:36.green/blue} {pos:>3}% {msg} ({elapsed})")
            .unwrap()
            .progress_chars("█▌░"),
    );
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb
}

/// Drain a transfer event stream, rendering progress to the terminal.
///
/// Returns the number of files the worker saved and the final session
/// result. The result is `None` only if the worker hung up without
/// reporting one.
pub(crate) fn consume_events<I>(
    events: I,
    pb: &ProgressBar,
    quiet: bool,
    fancy: bool,
) -> (usize, Option<batlink::Result<()>>)
where
    I: IntoIterator<Item = SessionEvent>,
{
    let mut saved = 0usize;
    let mut outcome = None;

    // Lines must go through the bar while it is drawn, or they get
    // overwritten by the next redraw.
    let emit = |line: String| {
        if fancy {
            pb.println(line);
        } else if !quiet {
            eprintln!("{line}");
        }
    };

    for event in events {
        match event {
            SessionEvent::Status(msg) => {
                if fancy {
                    pb.set_message(msg);
                } else if !quiet {
                    eprintln!("{} {msg}", style("ℹ").blue().bold());
                }
            },
            SessionEvent::Connected(true) => {
                emit(format!("{} Connected to device", style("✓").green().bold()));
            },
            SessionEvent::Connected(false) => {},
            SessionEvent::Progress { file, percent, .. } => {
                pb.set_message(file);
                pb.set_position(u64::from(percent));
            },
            SessionEvent::FileSaved(path) => {
                saved += 1;
                emit(format!(
                    "{} Saved {}",
                    style("✓").green().bold(),
                    path.display()
                ));
            },
            SessionEvent::Finished(result) => {
                if result.is_ok() {
                    pb.finish_with_message("Complete");
                } else {
                    pb.finish_and_clear();
                }
                outcome = Some(result);
            },
        }
    }

    (saved, outcome)
}

/// Map transfer-engine errors to CLI error classes.
///
/// Cancellation keeps its own class so `main` can exit with 130 like other
/// interrupted Unix tools.
pub(crate) fn map_session_error(err: batlink::Error) -> anyhow::Error {
    if matches!(err, batlink::Error::Cancelled) {
        crate::CliError::Cancelled("Transfer cancelled".to_string()).into()
    } else {
        err.into()
    }
}
