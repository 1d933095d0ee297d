//! Command implementations.
//!
//! Each subcommand is implemented in its own module; the helpers here open
//! and close the wristband session they share.

pub(crate) mod completions;
pub(crate) mod decode;
pub(crate) mod monitor;
pub(crate) mod send;
pub(crate) mod version;

#[cfg(test)]
mod stub;

use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;
use sleepon::{CancelToken, ConnectionSession, DEFAULT_RETRY_DELAY, SessionConfig, Transport};
use std::time::Duration;

use crate::config::Config;
use crate::device::{ask_remember_address, select_address};
use crate::{Cli, use_fancy_output};

#[cfg(feature = "bluez")]
pub(crate) type Backend = sleepon::BluezTransport;

/// Open the BlueZ transport on the system bus.
#[cfg(feature = "bluez")]
fn open_transport() -> Result<Backend> {
    use anyhow::Context;

    sleepon::BluezTransport::system().context("Failed to connect to BlueZ on the system D-Bus")
}

#[cfg(not(feature = "bluez"))]
pub(crate) use unsupported::NoTransport as Backend;

#[cfg(not(feature = "bluez"))]
fn open_transport() -> Result<Backend> {
    Err(sleepon::TransportError::Unsupported(
        "this build has no Bluetooth backend; rebuild with `--features bluez`".to_string(),
    )
    .into())
}

/// Placeholder backend for builds without BlueZ support.
#[cfg(not(feature = "bluez"))]
mod unsupported {
    use sleepon::{EventSource, Transport, TransportError};

    /// Uninhabited: [`super::open_transport`] never returns one.
    pub(crate) enum NoTransport {}

    impl Transport for NoTransport {
        type Peripheral = ();
        type Characteristic = ();

        fn lookup(&self, _address: &str) -> Result<(), TransportError> {
            match *self {}
        }

        fn open(&self, _peripheral: &()) -> Result<(), TransportError> {
            match *self {}
        }

        fn characteristic(&self, _peripheral: &(), _uuid: &str) -> Result<(), TransportError> {
            match *self {}
        }

        fn write_value(&self, _characteristic: &(), _data: &[u8]) -> Result<(), TransportError> {
            match *self {}
        }

        fn register_change_events(&self, _characteristic: &()) -> Result<EventSource, TransportError> {
            match *self {}
        }

        fn start_notify(&self, _characteristic: &()) -> Result<(), TransportError> {
            match *self {}
        }

        fn stop_notify(&self, _characteristic: &()) -> Result<(), TransportError> {
            match *self {}
        }

        fn close(&self, _peripheral: &()) -> Result<(), TransportError> {
            match *self {}
        }
    }
}

/// Effective retry delay: CLI/env first, then config, then the default.
fn retry_delay(cli: &Cli, config: &Config) -> Duration {
    cli.retry_delay_ms
        .map(Duration::from_millis)
        .or_else(|| config.retry_delay())
        .unwrap_or(DEFAULT_RETRY_DELAY)
}

/// Build a session for the selected wristband and connect it.
///
/// Shows a spinner while connection attempts are retried. On success the
/// user may be asked to remember a new address.
pub(crate) fn connect_session(
    cli: &Cli,
    config: &mut Config,
    cancel: &CancelToken,
) -> Result<ConnectionSession<Backend>> {
    let selected = select_address(cli.address.as_deref(), config)?;
    let session_config = SessionConfig::default().with_retry_delay(retry_delay(cli, config));
    let session = ConnectionSession::with_config(open_transport()?, &selected.address, session_config);

    let spinner = if cli.quiet || !use_fancy_output() {
        ProgressBar::hidden()
    } else {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    };
    spinner.set_message(format!("Connecting to {}...", selected.address));

    let connected = session.connect(cancel);
    spinner.finish_and_clear();
    connected.map_err(sleepon::Error::from)?;

    if !cli.quiet {
        eprintln!(
            "{} Connected to {}",
            style("✓").green(),
            style(&selected.address).green()
        );
    }

    if !cli.non_interactive {
        ask_remember_address(&selected, config)?;
    }

    Ok(session)
}

/// Disconnect, logging instead of failing.
pub(crate) fn close_session<T: Transport>(session: &ConnectionSession<T>) {
    if let Err(e) = session.close() {
        warn!("{e}");
    }
}
