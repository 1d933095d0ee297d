//! SleepOn wire protocol.
//!
//! The wristband speaks a small framed protocol over the Nordic UART
//! service: commands are written to the TX characteristic and replies and
//! readings arrive as notifications on the RX characteristic (both named
//! from the client's point of view).

pub mod frame;

pub use frame::{Charging, DecodedMessage, HeartSpO2, decode, encode};

/// Nordic UART TX characteristic (client writes).
pub const UART_TX_CHARACTERISTIC: &str = "6e400002-b5a3-f393-e0a9-e50e24dcca9e";

/// Nordic UART RX characteristic (device notifies).
pub const UART_RX_CHARACTERISTIC: &str = "6e400003-b5a3-f393-e0a9-e50e24dcca9e";

/// Known outbound commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Ask for the firmware version; answered by a version frame.
    VersionRequest,
}

impl Command {
    /// Wire bytes of this command.
    pub fn bytes(self) -> &'static [u8] {
        match self {
            Self::VersionRequest => &[0x5A, 0x14],
        }
    }

    /// Encoded frame, ready for [`ConnectionSession::send`](crate::ConnectionSession::send).
    pub fn encode(self) -> Vec<u8> {
        encode(self.bytes())
    }
}
