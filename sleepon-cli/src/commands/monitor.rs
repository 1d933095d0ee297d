//! Live monitor command implementation.
//!
//! Two threads:
//! - Main thread: notifications → decoded readings on stdout, plus typed
//!   commands → wristband
//! - Input thread: stdin lines → parsed commands; end of input cancels the run
//!
//! Ctrl-C, `quit` and end of input all end the monitor gracefully.

use anyhow::Result;
use console::style;
use crossbeam::channel::{self, Receiver, Sender, select};
use log::{debug, warn};
use sleepon::protocol::frame::hex;
use sleepon::{CancelToken, Command, ConnectionSession, Notifications, Transport};
use std::io::{self, BufRead, Write};
use std::thread;

use super::{close_session, connect_session};
use crate::config::Config;
use crate::{Cli, parse_byte};

const HELP: &str = "\
Commands:
  send <byte> [byte...]   write bytes to the wristband (decimal, 0x, 0o or 0b)
  version                 ask for the firmware version
  help                    show this help
  quit                    disconnect and exit";

/// A line typed into the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
enum MonitorCommand {
    Send(Vec<u8>),
    Version,
    Help,
    Quit,
}

/// What woke the monitor loop.
enum Event {
    Frame(Vec<u8>),
    Command(MonitorCommand),
    Ended,
    Cancelled,
}

/// Parse one input line; `Ok(None)` for a blank line.
fn parse_command(line: &str) -> Result<Option<MonitorCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(None);
    };

    let command = match name.to_ascii_lowercase().as_str() {
        "send" => {
            let bytes = words.map(parse_byte).collect::<Result<Vec<u8>, String>>()?;
            if bytes.is_empty() {
                return Err("send needs at least one byte".to_string());
            }
            MonitorCommand::Send(bytes)
        },
        "version" => MonitorCommand::Version,
        "help" | "?" => MonitorCommand::Help,
        "quit" | "exit" => MonitorCommand::Quit,
        other => return Err(format!("Unknown command '{other}', type 'help'")),
    };
    Ok(Some(command))
}

/// Read commands from `input` until it ends, then cancel the run.
fn read_commands(input: impl BufRead, commands: &Sender<MonitorCommand>, cancel: &CancelToken) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Can't read input: {e}");
                break;
            },
        };
        match parse_command(&line) {
            Ok(Some(command)) => {
                if commands.send(command).is_err() {
                    return;
                }
            },
            Ok(None) => {},
            Err(e) => eprintln!("{} {e}", style("⚠").yellow()),
        }
    }
    debug!("End of input.");
    cancel.cancel("end of input");
}

/// Run the live monitor.
pub(crate) fn cmd_monitor(cli: &Cli, config: &mut Config, cancel: &CancelToken) -> Result<()> {
    let session = connect_session(cli, config, cancel)?;
    let result = monitor(cli, &session, cancel);
    close_session(&session);
    result
}

fn monitor<T: Transport>(
    cli: &Cli,
    session: &ConnectionSession<T>,
    cancel: &CancelToken,
) -> Result<()> {
    let notifications = session.subscribe(cancel).map_err(sleepon::Error::from)?;

    if !cli.quiet {
        eprintln!(
            "{}",
            style("Listening. Type 'help' for commands, Ctrl+C to exit.").dim()
        );
    }

    let (commands_tx, commands_rx) = channel::unbounded();
    let input_cancel = cancel.clone();
    // Not joined: a blocking stdin read can't be interrupted.
    thread::Builder::new()
        .name("sleepon-input".to_string())
        .spawn(move || read_commands(io::stdin().lock(), &commands_tx, &input_cancel))?;

    let result = run_loop(session, &notifications, &commands_rx, cancel, &mut io::stdout());
    notifications.stop();
    result
}

/// Print readings to `out` and run typed commands until the run ends.
fn run_loop<T: Transport>(
    session: &ConnectionSession<T>,
    notifications: &Notifications,
    commands: &Receiver<MonitorCommand>,
    cancel: &CancelToken,
    out: &mut impl Write,
) -> Result<()> {
    loop {
        let event = select! {
            recv(notifications.receiver()) -> frame => match frame {
                Ok(frame) => Event::Frame(frame),
                Err(_) => Event::Ended,
            },
            recv(commands) -> command => match command {
                Ok(command) => Event::Command(command),
                // The input thread cancels before it hangs up.
                Err(_) => Event::Cancelled,
            },
            recv(cancel.done()) -> _ => Event::Cancelled,
        };

        match event {
            Event::Frame(frame) => match sleepon::decode(&frame) {
                Ok(message) => writeln!(out, "{message}")?,
                Err(e) => warn!("Dropping frame {}: {e}", hex(&frame)),
            },
            Event::Command(command) => {
                if !run_command(session, cancel, command) {
                    cancel.cancel("quit");
                }
            },
            Event::Ended => {
                debug!("Notification stream ended.");
                return Ok(());
            },
            Event::Cancelled => {
                debug!(
                    "Monitor stopping: {}",
                    cancel.reason().unwrap_or_default()
                );
                return Ok(());
            },
        }
    }
}

/// Execute a typed command; `false` means quit.
fn run_command<T: Transport>(
    session: &ConnectionSession<T>,
    cancel: &CancelToken,
    command: MonitorCommand,
) -> bool {
    let data = match command {
        MonitorCommand::Send(bytes) => bytes,
        MonitorCommand::Version => Command::VersionRequest.encode(),
        MonitorCommand::Help => {
            eprintln!("{HELP}");
            return true;
        },
        MonitorCommand::Quit => return false,
    };

    match session.send(cancel, &sleepon::encode(&data)) {
        Ok(()) => eprintln!("{} Sent {}", style("→").cyan(), hex(&data)),
        Err(e) => eprintln!("{} {e}", style("⚠").yellow()),
    }
    true
}
