//! SleepOn frame codec.
//!
//! Every notification from the wristband carries one frame. Frames start
//! with the header byte `0x5B` followed by a tag byte naming the message
//! kind; the remaining layout depends on the tag.
//!
//! ```text
//! Heart rate / SpO2 (tag 0x40), 7 or 8 bytes:
//! +------+------+-----+------+------+---------+----------+-----+
//! | 0x5B | 0x40 |  ?  | SpO2 |  HR  | Wearing | Charging | PI  |
//! +------+------+-----+------+------+---------+----------+-----+
//! |  0   |  1   |  2  |  3   |  4   |    5    |    6     | (7) |
//! +------+------+-----+------+------+---------+----------+-----+
//!
//! Version (tag 0x14):          Battery (tag 0x15):
//! +------+------+-----+------+ +------+------+-----+-------+
//! | 0x5B | 0x14 |  ?  | text | | 0x5B | 0x15 |  ?  | level |
//! +------+------+-----+------+ +------+------+-----+-------+
//! ```
//!
//! Frames with a valid header but an unrecognized tag are not errors; they
//! decode to [`DecodedMessage::Unknown`].

use crate::error::DecodeError;
use std::fmt;

/// Header byte of every inbound frame.
pub const FRAME_HEADER: u8 = 0x5B;

/// Tag of heart rate / SpO2 readings.
pub const TAG_HEART_SPO2: u8 = 0x40;

/// Tag of firmware version replies.
pub const TAG_VERSION: u8 = 0x14;

/// Tag of battery level reports.
pub const TAG_BATTERY: u8 = 0x15;

const HEART_SPO2_MIN_LEN: usize = 7;
const VERSION_MIN_LEN: usize = 4;
const BATTERY_MIN_LEN: usize = 4;

/// Charging state reported alongside heart rate readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Charging {
    /// Running on battery.
    No,
    /// On the charger.
    Yes,
    /// On the charger, battery full.
    Full,
    /// Value not seen so far.
    Other(u8),
}

impl From<u8> for Charging {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::No,
            1 => Self::Yes,
            2 => Self::Full,
            other => Self::Other(other),
        }
    }
}

/// A heart rate / SpO2 reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HeartSpO2 {
    /// Blood oxygen saturation, percent.
    pub spo2: u8,
    /// Heart rate, beats per minute.
    pub heart_rate: u8,
    /// Whether the band is being worn.
    pub wearing: bool,
    /// Raw charging byte, see [`HeartSpO2::charging_state`].
    pub charging: u8,
    /// Perfusion index; 0 when the frame has no PI byte.
    pub pi: u8,
}

impl HeartSpO2 {
    /// Interpret the raw charging byte.
    pub fn charging_state(&self) -> Charging {
        Charging::from(self.charging)
    }
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum DecodedMessage {
    /// Heart rate and SpO2 reading.
    #[cfg_attr(feature = "serde", serde(rename = "heart_spo2"))]
    HeartSpO2(HeartSpO2),
    /// Battery level in percent.
    Battery {
        /// Charge level, percent.
        level: u8,
    },
    /// Firmware version string.
    Version {
        /// Version text as sent by the device.
        text: String,
    },
    /// Well-formed header with an unrecognized tag; holds the whole frame.
    Unknown {
        /// The complete frame.
        bytes: Vec<u8>,
    },
}

impl fmt::Display for DecodedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeartSpO2(r) => {
                write!(
                    f,
                    "SpO2 {}%, heart rate {}/min, {}, charging {:?}",
                    r.spo2,
                    r.heart_rate,
                    if r.wearing { "worn" } else { "not worn" },
                    r.charging_state()
                )?;
                if r.pi != 0 {
                    write!(f, ", PI {}", r.pi)?;
                }
                Ok(())
            },
            Self::Battery { level } => write!(f, "battery {level}%"),
            Self::Version { text } => write!(f, "version {text:?}"),
            Self::Unknown { bytes } => write!(f, "unknown frame {}", hex(bytes)),
        }
    }
}

/// Format bytes as space-separated hex, e.g. `5B 15 00 5A`.
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decode one inbound frame.
pub fn decode(bytes: &[u8]) -> Result<DecodedMessage, DecodeError> {
    if bytes.len() < 2 || bytes[0] != FRAME_HEADER {
        return Err(DecodeError::InvalidHeader { len: bytes.len() });
    }

    let too_short = |kind, want| DecodeError::TooShort {
        kind,
        want,
        len: bytes.len(),
    };

    match bytes[1] {
        TAG_HEART_SPO2 => {
            if bytes.len() < HEART_SPO2_MIN_LEN {
                return Err(too_short("heart/SpO2", HEART_SPO2_MIN_LEN));
            }
            Ok(DecodedMessage::HeartSpO2(HeartSpO2 {
                spo2: bytes[3],
                heart_rate: bytes[4],
                wearing: bytes[5] > 0,
                charging: bytes[6],
                pi: bytes.get(7).copied().unwrap_or(0),
            }))
        },
        TAG_VERSION => {
            if bytes.len() < VERSION_MIN_LEN {
                return Err(too_short("version", VERSION_MIN_LEN));
            }
            Ok(DecodedMessage::Version {
                text: String::from_utf8_lossy(&bytes[3..]).into_owned(),
            })
        },
        TAG_BATTERY => {
            if bytes.len() < BATTERY_MIN_LEN {
                return Err(too_short("battery", BATTERY_MIN_LEN));
            }
            Ok(DecodedMessage::Battery { level: bytes[3] })
        },
        _ => Ok(DecodedMessage::Unknown {
            bytes: bytes.to_vec(),
        }),
    }
}

/// Encode an outbound command.
///
/// Commands are sent as-is; callers supply the exact wire bytes (see
/// [`Command`](super::Command) for the known ones).
pub fn encode(bytes: &[u8]) -> Vec<u8> {
    bytes.to_vec()
}
