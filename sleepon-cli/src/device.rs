//! Wristband address selection.
//!
//! The address comes from `--address`/`SLEEPON_ADDRESS` or, failing that, from
//! the config file. An address given on the command line can be remembered
//! for next time.

use {
    crate::{CliError, config::Config},
    anyhow::Result,
    console::style,
    dialoguer::{Confirm, Error as DialoguerError, theme::ColorfulTheme},
    log::{debug, error},
    std::io::IsTerminal,
};

/// Address chosen for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedAddress {
    /// Normalized address, e.g. `DE:7A:47:65:08:1F`.
    pub address: String,
    /// Whether the address already matches the configured one.
    pub is_known: bool,
}

/// Validate a Bluetooth address and normalize it to upper case.
pub fn parse_address(s: &str) -> Result<String, String> {
    let s = s.trim();
    let octets: Vec<&str> = s.split(':').collect();
    let valid = octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
    if valid {
        Ok(s.to_ascii_uppercase())
    } else {
        Err(format!(
            "Invalid Bluetooth address: '{s}'. Expected six hex octets (e.g., 'DE:7A:47:65:08:1F')"
        ))
    }
}

/// Pick the wristband address from the command line or the config.
pub fn select_address(explicit: Option<&str>, config: &Config) -> Result<SelectedAddress> {
    let configured = config.device.address.as_deref().map(parse_address);

    if let Some(address) = explicit {
        let address = parse_address(address).map_err(CliError::Usage)?;
        let is_known = matches!(&configured, Some(Ok(known)) if *known == address);
        debug!("Using address {address} from command line (known: {is_known})");
        return Ok(SelectedAddress { address, is_known });
    }

    let configured = configured
        .transpose()
        .map_err(|e| CliError::Usage(format!("{e} (in config file)")))?;
    match configured {
        Some(address) => {
            debug!("Using address {address} from config");
            Ok(SelectedAddress {
                address,
                is_known: true,
            })
        },
        None => Err(CliError::Usage(
            "No wristband address given. Use --address, SLEEPON_ADDRESS or [device] address \
             in sleepon.toml"
                .to_string(),
        )
        .into()),
    }
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("Prompt cancelled".to_string()).into()
            } else {
                CliError::Usage(format!("Prompt failed: {io_err}")).into()
            }
        },
    }
}

/// Offer to remember a new address as the default.
///
/// Only asks on an interactive terminal.
pub fn ask_remember_address(selected: &SelectedAddress, config: &mut Config) -> Result<()> {
    if selected.is_known || !(std::io::stdin().is_terminal() && std::io::stderr().is_terminal()) {
        return Ok(());
    }

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!(
            "Remember {} as your wristband?",
            style(&selected.address).green()
        ))
        .default(false)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        match config.remember_address(&selected.address) {
            Ok(path) => eprintln!(
                "{} Saved to {}",
                style("✓").green(),
                style(path.display()).yellow()
            ),
            Err(e) => error!("Failed to save device address: {e}"),
        }
    }

    Ok(())
}
