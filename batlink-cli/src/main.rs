//! Command-line transfer tool for battery test devices: downloads
//! recorded result files, uploads test plan settings, and manages the
//! serial link the device speaks over.

mod commands;
mod config;
mod serial;

use anyhow::Result;
use batlink::{TestConfig, port::DEFAULT_BAUD};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use std::env;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use config::Config;
use serial::{SelectOptions, choose_port, offer_to_remember};

/// Whether stderr is a terminal, sampled once at startup.
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler, polled by long-running commands.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Emoji and animations are reserved for interactive color terminals.
fn decorations_enabled() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Errors carrying a specific process exit code. Commands wrap these in
/// `anyhow::Error` and `main` downcasts to pick the code; everything
/// else exits 1.
#[derive(Debug, thiserror::Error)]
enum CliError {
    /// Invalid usage or environment setup (exit code 2).
    #[error("{0}")]
    Usage(String),
    /// Cancelled by the user, typically via Ctrl-C (exit code 130).
    #[error("{0}")]
    Cancelled(String),
}

/// Transfer result files and test settings between a host PC and a
/// battery test device over a serial link.
#[derive(Parser)]
#[command(name = "batlink", author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "For more information, visit: https://github.com/batlink-rs/batlink")]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Serial port to open; picked interactively or auto-detected when omitted.
    #[arg(short, long, global = true, env = "BATLINK_PORT")]
    port: Option<String>,

    /// Baud rate for the serial link.
    #[arg(short, long, global = true, default_value_t = DEFAULT_BAUD, env = "BATLINK_BAUD")]
    baud: u32,

    /// Increase log detail (-v debug, -vv trace with timestamps).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only warnings and errors on stderr.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Never prompt; fail where a question would be asked.
    #[arg(long, global = true, env = "BATLINK_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Ask before using a port even when it was auto-detected.
    #[arg(long, global = true)]
    confirm_port: bool,

    /// Offer every serial port during selection, not just known device types.
    #[arg(long, global = true)]
    list_all_ports: bool,

    /// Read configuration from this file instead of the default locations.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn select_options(&self) -> SelectOptions {
        SelectOptions {
            port: self.port.clone(),
            list_all_ports: self.list_all_ports,
            non_interactive: self.non_interactive,
            confirm_port: self.confirm_port,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for the device and download its recorded result files.
    Download {
        /// Directory to save downloaded files into.
        #[arg(short, long, value_name = "DIR", env = "BATLINK_OUTPUT_DIR")]
        output_dir: Option<PathBuf>,
    },

    /// Upload test plan settings to the device.
    Upload {
        /// Plan slot to program (1-4).
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=4))]
        plan: u8,

        /// Discharge current in milliamps (0-500).
        #[arg(long, value_name = "MA")]
        current: u16,

        /// Sampling interval in minutes (0-1000).
        #[arg(long, value_name = "MIN")]
        sample_rate: u16,

        /// Test duration in hours (0-1000).
        #[arg(long, value_name = "HOURS")]
        duration: u16,

        /// Lower temperature limit in degrees Celsius (-40 to 85).
        #[arg(long, value_name = "DEG", allow_negative_numbers = true)]
        min_temp: i16,

        /// Upper temperature limit in degrees Celsius (-40 to 85).
        #[arg(long, value_name = "DEG", allow_negative_numbers = true)]
        max_temp: i16,
    },

    /// List downloaded result files.
    ListFiles {
        /// Directory to scan (defaults to the download directory).
        #[arg(short, long, value_name = "DIR", env = "BATLINK_OUTPUT_DIR")]
        output_dir: Option<PathBuf>,

        /// Output the file list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Show the serial ports visible on this machine.
    ListPorts {
        /// Emit the port list as JSON on stdout.
        #[arg(long)]
        json: bool,
    },

    /// Emit or install shell completion scripts.
    Completions {
        /// Target shell; auto-detected for --install when omitted.
        #[arg(value_enum)]
        shell: Option<Shell>,

        /// Write the script into the shell's completion directory.
        #[arg(long)]
        install: bool,
    },
}

/// Download directory when neither the CLI nor the configuration names
/// one.
const DEFAULT_OUTPUT_DIR: &str = "./received_files";

fn main() {
    if let Err(err) = run() {
        eprintln!("{} {err:#}", style("Error:").red().bold());
        std::process::exit(exit_code_for(&err));
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<CliError>() {
        Some(CliError::Usage(_)) => 2,
        Some(CliError::Cancelled(_)) => 130,
        None => 1,
    }
}

fn run() -> Result<()> {
    init_terminal();
    let cli = Cli::parse();
    init_logging(&cli);
    debug!("batlink v{} starting", env!("CARGO_PKG_VERSION"));

    // Route Ctrl-C through the library's cooperative cancellation hook
    ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed))?;
    batlink::set_cancel_hook(was_interrupted);

    let mut config = match &cli.config_path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };
    dispatch(&cli, &mut config)
}

/// Honor NO_COLOR and strip decoration when stderr is piped.
fn init_terminal() {
    let tty = std::io::stderr().is_terminal();
    STDERR_IS_TTY.store(tty, Ordering::Relaxed);

    // Both console switches follow the same decision so stdout JSON and
    // stderr progress stay equally plain under redirection
    if !tty || env::var_os("NO_COLOR").is_some() {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }
}

fn init_logging(cli: &Cli) {
    let default_level = match (cli.quiet, cli.verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let detailed = cli.verbose >= 2;
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level))
        .format_target(detailed)
        .format_timestamp(detailed.then_some(env_logger::TimestampPrecision::Millis))
        .init();
}

fn dispatch(cli: &Cli, config: &mut Config) -> Result<()> {
    match &cli.command {
        Commands::Download { output_dir } => {
            let dir = resolve_output_dir(output_dir.as_ref(), config);
            commands::download::cmd_download(cli, config, &dir)
        },
        Commands::Upload {
            plan,
            current,
            sample_rate,
            duration,
            min_temp,
            max_temp,
        } => {
            let settings = TestConfig {
                plan_index: *plan,
                current_ma: *current,
                sample_rate_min: *sample_rate,
                duration_hours: *duration,
                min_temp_c: *min_temp,
                max_temp_c: *max_temp,
            };
            commands::upload::cmd_upload(cli, config, settings)
        },
        Commands::ListFiles { output_dir, json } => {
            let dir = resolve_output_dir(output_dir.as_ref(), config);
            commands::ports::cmd_list_files(&dir, *json)
        },
        Commands::ListPorts { json } => {
            commands::ports::cmd_list_ports(*json);
            Ok(())
        },
        Commands::Completions { shell, install } if *install => {
            commands::completions::cmd_completions_install(*shell)
        },
        Commands::Completions {
            shell: Some(shell), ..
        } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
        Commands::Completions { .. } => Err(CliError::Usage(
            "specify a shell type (e.g. `batlink completions bash`) or run \
             `batlink completions --install` to auto-detect"
                .to_string(),
        )
        .into()),
    }
}

/// Pick the serial port for a transfer, remembering newly confirmed
/// devices when running interactively.
fn pick_port(cli: &Cli, config: &mut Config) -> Result<String> {
    let choice = choose_port(&cli.select_options(), config)?;
    if !choice.is_known && !cli.non_interactive {
        offer_to_remember(&choice.port, config)?;
    }
    Ok(choice.port.name)
}

/// CLI flag, then config, then the built-in default.
fn resolve_output_dir(flag: Option<&PathBuf>, config: &Config) -> PathBuf {
    match (flag, &config.transfer.output_dir) {
        (Some(dir), _) | (None, Some(dir)) => dir.clone(),
        (None, None) => PathBuf::from(DEFAULT_OUTPUT_DIR),
    }
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use clap::CommandFactory;
    use std::path::Path;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("arguments parse")
    }

    #[test]
    fn test_clap_definition_is_internally_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_args_reach_the_download_command() {
        let cli = parse(&["batlink", "--port", "/dev/ttyACM0", "--baud", "230400", "download"]);
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(cli.baud, 230_400);
        assert!(matches!(cli.command, Commands::Download { .. }));
    }

    #[test]
    fn test_download_accepts_output_dir() {
        let cli = parse(&["batlink", "download", "--output-dir", "/tmp/results"]);
        let Commands::Download { output_dir } = cli.command else {
            panic!("expected download");
        };
        assert_eq!(output_dir.as_deref(), Some(Path::new("/tmp/results")));
    }

    #[test]
    fn test_upload_parses_every_plan_field() {
        let cli = parse(&[
            "batlink", "upload", "--plan", "2", "--current", "250", "--sample-rate", "10",
            "--duration", "48", "--min-temp", "-20", "--max-temp", "60",
        ]);
        let Commands::Upload {
            plan,
            current,
            sample_rate,
            duration,
            min_temp,
            max_temp,
        } = cli.command
        else {
            panic!("expected upload");
        };
        assert_eq!(
            (plan, current, sample_rate, duration, min_temp, max_temp),
            (2, 250, 10, 48, -20, 60)
        );
    }

    #[test]
    fn test_upload_rejects_plan_outside_one_to_four() {
        for plan in ["0", "5"] {
            let result = Cli::try_parse_from([
                "batlink", "upload", "--plan", plan, "--current", "100", "--sample-rate", "10",
                "--duration", "24", "--min-temp", "0", "--max-temp", "40",
            ]);
            assert!(result.is_err(), "plan {plan} must be rejected");
        }
    }

    #[test]
    fn test_upload_requires_every_value() {
        assert!(Cli::try_parse_from(["batlink", "upload", "--plan", "1"]).is_err());
    }

    #[test]
    fn test_listing_subcommands_accept_json() {
        let cli = parse(&["batlink", "list-files", "--json"]);
        assert!(matches!(cli.command, Commands::ListFiles { json: true, .. }));

        let cli = parse(&["batlink", "list-ports"]);
        assert!(matches!(cli.command, Commands::ListPorts { json: false }));

        let cli = parse(&["batlink", "list-ports", "--json"]);
        assert!(matches!(cli.command, Commands::ListPorts { json: true }));
    }

    #[test]
    fn test_completions_takes_an_optional_shell() {
        let cli = parse(&["batlink", "completions", "bash"]);
        assert!(matches!(
            cli.command,
            Commands::Completions {
                shell: Some(Shell::Bash),
                install: false
            }
        ));
    }

    #[test]
    fn test_defaults_without_flags() {
        let cli = parse(&["batlink", "list-ports"]);
        assert_eq!(cli.baud, 115_200);
        assert_eq!(cli.verbose, 0);
        assert!(cli.port.is_none());
        assert!(cli.config_path.is_none());
        assert!(!(cli.quiet || cli.non_interactive || cli.confirm_port || cli.list_all_ports));
    }

    #[test]
    fn test_every_global_flag_parses() {
        let cli = parse(&[
            "batlink", "--port", "COM3", "--baud", "57600", "-vv", "--quiet",
            "--non-interactive", "--confirm-port", "--list-all-ports",
            "--config", "/tmp/config.toml", "list-ports",
        ]);
        assert_eq!(cli.port.as_deref(), Some("COM3"));
        assert_eq!(cli.baud, 57_600);
        assert_eq!(cli.verbose, 2);
        assert!(cli.quiet && cli.non_interactive && cli.confirm_port && cli.list_all_ports);
        assert_eq!(cli.config_path.as_deref(), Some(Path::new("/tmp/config.toml")));
    }

    #[test]
    fn test_subcommand_is_mandatory() {
        assert!(Cli::try_parse_from(["batlink"]).is_err());
    }

    #[test]
    fn test_select_options_mirror_global_flags() {
        let cli = parse(&["batlink", "--port", "COM7", "--confirm-port", "download"]);
        let options = cli.select_options();
        assert_eq!(options.port.as_deref(), Some("COM7"));
        assert!(options.confirm_port);
        assert!(!options.non_interactive);
        assert!(!options.list_all_ports);
    }

    #[test]
    fn test_output_dir_resolution_order() {
        let mut config = Config::default();
        config.transfer.output_dir = Some(PathBuf::from("/from/config"));
        let flag = PathBuf::from("/from/flag");

        assert_eq!(resolve_output_dir(Some(&flag), &config), flag);
        assert_eq!(
            resolve_output_dir(None, &config),
            PathBuf::from("/from/config")
        );
        assert_eq!(
            resolve_output_dir(None, &Config::default()),
            PathBuf::from(DEFAULT_OUTPUT_DIR)
        );
    }

    #[test]
    fn test_exit_codes_follow_error_class() {
        let usage: anyhow::Error = CliError::Usage("bad".to_string()).into();
        let cancelled: anyhow::Error = CliError::Cancelled("stop".to_string()).into();

        assert_eq!(exit_code_for(&usage), 2);
        assert_eq!(exit_code_for(&cancelled), 130);
        assert_eq!(exit_code_for(&anyhow::anyhow!("boom")), 1);
    }
}
