//! One-shot command write.

use anyhow::Result;
use console::style;
use sleepon::CancelToken;
use sleepon::protocol::frame::hex;

use super::{close_session, connect_session};
use crate::Cli;
use crate::config::Config;

/// Connect, write `bytes` to the wristband and disconnect.
pub(crate) fn cmd_send(
    cli: &Cli,
    config: &mut Config,
    cancel: &CancelToken,
    bytes: &[u8],
) -> Result<()> {
    let session = connect_session(cli, config, cancel)?;

    let sent = session
        .send(cancel, &sleepon::encode(bytes))
        .map_err(sleepon::Error::from);
    close_session(&session);
    sent?;

    if !cli.quiet {
        eprintln!(
            "{} Sent {} bytes: {}",
            style("✓").green(),
            bytes.len(),
            style(hex(bytes)).cyan()
        );
    }

    Ok(())
}
