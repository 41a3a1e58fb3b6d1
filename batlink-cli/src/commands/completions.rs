//! Shell completion generation and installation.

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::{Shell, generate};
use console::style;
use directories::BaseDirs;
use std::env;
use std::fs;
use std::io;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::Cli;

/// Generate shell completions to stdout.
pub(crate) fn cmd_completions(shell: Shell) {
    generate(shell, &mut Cli::command(), "batlink", &mut io::stdout());
}

/// Install completions into the conventional location for the shell,
/// auto-detecting the shell when none was named.
pub(crate) fn cmd_completions_install(shell_arg: Option<Shell>) -> Result<()> {
    let shell = match shell_arg {
        Some(shell) => shell,
        None => detect_shell().context(
            "Could not detect your shell. Please specify it explicitly:\n  \
             batlink completions --install bash",
        )?,
    };

    let dirs = base_dirs()?;
    let path = install_destination(shell, &dirs)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(&path, render_script(shell))
        .with_context(|| format!("Failed to write completion file: {}", path.display()))?;

    eprintln!(
        "{} Installed {} completions to {}",
        style("✓").green().bold(),
        style(shell.to_string()).cyan(),
        style(path.display()).yellow()
    );
    print_activation_hint(shell, &path, &dirs)
}

/// Render the completion script for `shell` into a buffer.
fn render_script(shell: Shell) -> Vec<u8> {
    let mut buf = Vec::new();
    generate(shell, &mut Cli::command(), "batlink", &mut buf);
    buf
}

/// Detect the user's shell from the environment.
fn detect_shell() -> Option<Shell> {
    match env::var("SHELL") {
        Ok(shell_path) => shell_from_path(&shell_path),
        // Windows has no $SHELL; PowerShell exports PSModulePath
        Err(_) => (cfg!(windows) && env::var_os("PSModulePath").is_some())
            .then_some(Shell::PowerShell),
    }
}

fn shell_from_path(shell_path: &str) -> Option<Shell> {
    match Path::new(shell_path).file_name().and_then(|n| n.to_str()) {
        Some("bash") => Some(Shell::Bash),
        Some("zsh") => Some(Shell::Zsh),
        Some("fish") => Some(Shell::Fish),
        Some("elvish") => Some(Shell::Elvish),
        Some("pwsh" | "powershell") => Some(Shell::PowerShell),
        _ => None,
    }
}

fn base_dirs() -> Result<BaseDirs> {
    BaseDirs::new().context("Could not determine home directory")
}

/// Per-shell location the completion script is loaded from.
fn install_destination(shell: Shell, dirs: &BaseDirs) -> Result<PathBuf> {
    let path = match shell {
        Shell::Bash => dirs.data_dir().join("bash-completion/completions/batlink"),
        Shell::Zsh => dirs.home_dir().join(".zfunc/_batlink"),
        Shell::Fish => dirs.config_dir().join("fish/completions/batlink.fish"),
        Shell::Elvish => dirs.config_dir().join("elvish/lib/batlink.elv"),
        Shell::PowerShell => powershell_destination(dirs),
        _ => anyhow::bail!("No install convention for {shell}"),
    };
    Ok(path)
}

/// Next to $PROFILE when PowerShell exports it, XDG-style fallback
/// otherwise.
fn powershell_destination(dirs: &BaseDirs) -> PathBuf {
    match env::var_os("PROFILE") {
        Some(profile) => PathBuf::from(profile)
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
            .join("batlink.ps1"),
        None => dirs
            .home_dir()
            .join(".config/powershell/completions/batlink.ps1"),
    }
}

fn print_activation_hint(shell: Shell, path: &Path, dirs: &BaseDirs) -> Result<()> {
    eprintln!();
    match shell {
        Shell::Bash => {
            eprintln!("New terminals pick the completions up automatically.");
            eprintln!(
                "For this one, run {}",
                style(format!("source {}", path.display())).cyan()
            );
        },
        Shell::Zsh => {
            ensure_zsh_fpath(&dirs.home_dir().join(".zshrc"))?;
            eprintln!("Open a new shell or run {}", style("exec zsh").cyan());
        },
        Shell::PowerShell => {
            eprintln!("To load on startup, add to your PowerShell profile:");
            eprintln!(
                "  {}",
                style(format!("Import-Module {}", path.display())).cyan()
            );
        },
        _ => eprintln!("New sessions pick the completions up automatically."),
    }
    Ok(())
}

/// Put `~/.zfunc` on the zsh fpath, appending the stanza at most once.
fn ensure_zsh_fpath(zshrc: &Path) -> Result<()> {
    const FPATH_LINE: &str = "fpath=(~/.zfunc $fpath)";

    if fs::read_to_string(zshrc).is_ok_and(|content| content.contains(FPATH_LINE)) {
        return Ok(());
    }

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(zshrc)
        .with_context(|| format!("Failed to update {}", zshrc.display()))?;
    writeln!(file, "\n# batlink completions")?;
    writeln!(file, "{FPATH_LINE}")?;
    writeln!(file, "autoload -Uz compinit && compinit")?;

    eprintln!(
        "{} Added fpath to {}",
        style("✓").green().bold(),
        style(zshrc.display()).yellow()
    );
    Ok(())
}
