//! # sleepon
//!
//! A library for talking to SleepOn wristbands over Bluetooth LE.
//!
//! The wristband exposes a Nordic UART service: commands are written to the
//! TX characteristic and readings arrive as notifications on the RX
//! characteristic. This crate provides:
//!
//! - A connection session with cancellable connect retries
//! - Cached characteristic resolution and command writes
//! - A notification stream that unsubscribes exactly once on teardown
//! - A decoder for the wristband's frame format (SpO2/heart rate, battery,
//!   firmware version)
//!
//! ## Supported Platforms
//!
//! - **Linux** via BlueZ over the system D-Bus (`bluez` feature)
//! - Any other stack by implementing [`Transport`]
//!
//! ## Features
//!
//! - `bluez`: BlueZ transport ([`BluezTransport`](transport::bluez::BluezTransport))
//! - `serde`: Serialization support for decoded messages
//!
//! ## Example
//!
//! ```rust
//! use sleepon::{DecodedMessage, decode};
//!
//! let msg = decode(&[0x5B, 0x15, 0x00, 80]).unwrap();
//! assert_eq!(msg, DecodedMessage::Battery { level: 80 });
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod retry;
pub mod transport;

// Re-exports for convenience
#[cfg(feature = "bluez")]
pub use transport::bluez::BluezTransport;
pub use {
    cancel::CancelToken,
    connection::{ConnectionSession, Messages, Notifications, RawFrame, SessionConfig},
    error::{
        CloseError, ConnectError, DecodeError, Error, ResolveError, Result, SendError,
        SubscribeError, TransportError,
    },
    protocol::{
        Charging, Command, DecodedMessage, HeartSpO2, UART_RX_CHARACTERISTIC,
        UART_TX_CHARACTERISTIC, decode, encode,
    },
    retry::DEFAULT_RETRY_DELAY,
    transport::{EventSource, PropertiesChanged, PropertyValue, Transport},
};
