//! Offline frame decoding.

use anyhow::{Context, Result};
use sleepon::protocol::frame::hex;

use crate::{CliError, parse_byte};

/// Turn the command-line input into frame bytes.
///
/// A single argument of at least two hex byte pairs (optionally `0x`-prefixed
/// or `:`-separated) is read as a hex string; anything else is a list of byte
/// tokens.
pub(crate) fn parse_frame(input: &[String]) -> Result<Vec<u8>, String> {
    if let [single] = input {
        let s = single.trim();
        let s = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let digits: String = s.chars().filter(|c| *c != ':').collect();
        if digits.len() >= 4 && digits.chars().all(|c| c.is_ascii_hexdigit()) {
            if digits.len() % 2 != 0 {
                return Err(format!("Odd number of hex digits in '{single}'"));
            }
            return (0..digits.len())
                .step_by(2)
                .map(|i| {
                    u8::from_str_radix(&digits[i..i + 2], 16)
                        .map_err(|e| format!("Invalid hex in '{single}': {e}"))
                })
                .collect();
        }
    }

    input
        .iter()
        .flat_map(|arg| arg.split_whitespace())
        .map(parse_byte)
        .collect()
}

/// Decode a frame given on the command line and print it.
pub(crate) fn cmd_decode(input: &[String], json: bool) -> Result<()> {
    let bytes = parse_frame(input).map_err(CliError::Usage)?;
    let message = sleepon::decode(&bytes)
        .map_err(sleepon::Error::from)
        .with_context(|| format!("Can't decode frame {}", hex(&bytes)))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&message)?);
    } else {
        println!("{message}");
    }

    Ok(())
}
