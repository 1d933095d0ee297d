//! sleepon CLI - Command-line tool for SleepOn wristbands.
//!
//! ## Features
//!
//! - Live SpO2, heart rate and battery monitor with an interactive command prompt
//! - One-shot command writes and firmware version query
//! - Offline frame decoding (no hardware needed)
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use sleepon::CancelToken;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(std::sync::atomic::Ordering::Relaxed) && console::colors_enabled_stderr()
}

mod commands;
mod config;
mod device;

use config::Config;

/// Errors with a dedicated exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Bad arguments or setup; exit code 2.
    #[error("{0}")]
    Usage(String),
    /// Interrupted by the user; exit code 130.
    #[error("{0}")]
    Cancelled(String),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => 2,
            Self::Cancelled(_) => 130,
        }
    }
}

/// sleepon - Read SpO2, heart rate and battery level from SleepOn wristbands.
///
/// Environment variables:
///   SLEEPON_ADDRESS           - Bluetooth address of the wristband
///   SLEEPON_RETRY_DELAY_MS    - Delay between connection attempts (default: 100)
///   SLEEPON_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "sleepon")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Bluetooth address of the wristband (e.g., DE:7A:47:65:08:1F).
    #[arg(
        short,
        long,
        global = true,
        env = "SLEEPON_ADDRESS",
        value_parser = device::parse_address
    )]
    address: Option<String>,

    /// Delay between connection attempts, in milliseconds.
    #[arg(
        long = "retry-delay",
        global = true,
        value_name = "MS",
        env = "SLEEPON_RETRY_DELAY_MS"
    )]
    retry_delay_ms: Option<u64>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (never prompt).
    #[arg(long, global = true, env = "SLEEPON_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Connect and print readings as they arrive.
    ///
    /// Commands can be typed while running: `send <byte>...`, `version`,
    /// `help` and `quit`.
    Monitor,

    /// Connect, write one command and disconnect.
    Send {
        /// Bytes to write (decimal, or with 0x/0o/0b prefix).
        #[arg(required = true, value_parser = parse_byte)]
        bytes: Vec<u8>,
    },

    /// Ask the wristband for its firmware version.
    Version {
        /// Give up after this many seconds without a reply.
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Decode a frame without connecting to a device.
    Decode {
        /// Frame as byte tokens (`0x5b 0x15 0 80`) or one hex string (`5b150050`).
        #[arg(required = true, allow_hyphen_values = true)]
        input: Vec<String>,

        /// Output the decoded message as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Parse one byte, with an optional 0x/0o/0b radix prefix.
///
/// A bare leading zero means octal, so `010` is 8.
fn parse_byte(s: &str) -> Result<u8, String> {
    let s = s.trim();
    let (digits, radix) = if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (rest, 16)
    } else if let Some(rest) = s.strip_prefix("0o").or_else(|| s.strip_prefix("0O")) {
        (rest, 8)
    } else if let Some(rest) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        (rest, 2)
    } else if s.len() > 1 && s.starts_with('0') {
        (&s[1..], 8)
    } else {
        (s, 10)
    };

    if digits.is_empty() {
        return Err(format!("Invalid byte: '{s}'"));
    }
    u8::from_str_radix(digits, radix).map_err(|e| format!("Invalid byte '{s}': {e}"))
}

fn init_logging(cli: &Cli) {
    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

/// Cancel `cancel` on Ctrl-C.
fn install_interrupt_handler(cancel: &CancelToken) {
    let cancel = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        cancel.cancel("interrupted");
    }) {
        debug!("Can't install Ctrl-C handler: {e}");
    }
}

/// Map a failed run to its exit code.
fn exit_code_for(err: &anyhow::Error, cancel: &CancelToken) -> u8 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return cli_err.exit_code();
    }
    let cancelled = err
        .downcast_ref::<sleepon::Error>()
        .is_some_and(sleepon::Error::is_cancelled);
    if cancelled || cancel.is_cancelled() {
        130
    } else {
        1
    }
}

fn run(cli: &Cli, cancel: &CancelToken) -> Result<()> {
    // Load configuration
    let mut config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Monitor => commands::monitor::cmd_monitor(cli, &mut config, cancel),
        Commands::Send { bytes } => commands::send::cmd_send(cli, &mut config, cancel, bytes),
        Commands::Version { timeout } => {
            commands::version::cmd_version(cli, &mut config, cancel, *timeout)
        },
        Commands::Decode { input, json } => commands::decode::cmd_decode(input, *json),
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

fn main() -> ExitCode {
    // --- NO_COLOR and TTY detection (clig.dev best practice) ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, std::sync::atomic::Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        // Disable all color output
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();
    init_logging(&cli);

    debug!(
        "sleepon v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    let cancel = CancelToken::new();
    install_interrupt_handler(&cancel);

    match run(&cli, &cancel) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::from(exit_code_for(&err, &cancel))
        },
    }
}
