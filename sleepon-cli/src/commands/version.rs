//! Firmware version query.

use anyhow::{Result, bail};
use crossbeam::channel::{self, select};
use log::debug;
use sleepon::{CancelToken, Command, DecodedMessage};
use std::time::Duration;

use super::{close_session, connect_session};
use crate::config::Config;
use crate::{Cli, CliError};

/// Ask for the firmware version and print the first reply to stdout.
pub(crate) fn cmd_version(
    cli: &Cli,
    config: &mut Config,
    cancel: &CancelToken,
    timeout: Option<u64>,
) -> Result<()> {
    let session = connect_session(cli, config, cancel)?;
    let result = query_version(&session, cancel, timeout.map(Duration::from_secs));
    close_session(&session);

    println!("{}", result?);
    Ok(())
}

fn query_version<T: sleepon::Transport>(
    session: &sleepon::ConnectionSession<T>,
    cancel: &CancelToken,
    timeout: Option<Duration>,
) -> Result<String> {
    // Subscribe first so the reply can't slip past.
    let notifications = session.subscribe(cancel).map_err(sleepon::Error::from)?;
    if let Err(e) = session.send(cancel, &Command::VersionRequest.encode()) {
        notifications.stop();
        return Err(sleepon::Error::from(e).into());
    }

    let deadline = timeout.map_or_else(channel::never, channel::after);
    let mut timed_out = false;
    let mut reply = None;
    loop {
        let frame = select! {
            recv(notifications.receiver()) -> frame => frame.ok(),
            recv(deadline) -> _ => {
                timed_out = true;
                None
            },
        };
        let Some(frame) = frame else { break };

        match sleepon::decode(&frame) {
            Ok(DecodedMessage::Version { text }) => {
                reply = Some(text);
                break;
            },
            Ok(other) => debug!("Waiting for version, got {other}"),
            Err(e) => debug!("Waiting for version, got bad frame: {e}"),
        }
    }
    notifications.stop();

    if timed_out {
        bail!(
            "No version reply within {}s",
            timeout.map_or(0, |t| t.as_secs())
        );
    }
    match reply {
        Some(text) => Ok(text),
        None if cancel.is_cancelled() => Err(CliError::Cancelled(
            "Interrupted before the version reply arrived".to_string(),
        )
        .into()),
        None => bail!("Notification stream ended before the version reply arrived"),
    }
}
