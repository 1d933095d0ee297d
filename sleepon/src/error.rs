//! Error types for sleepon.

use thiserror::Error;

/// Result type for sleepon operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error reported by a [`Transport`](crate::transport::Transport) call.
///
/// Connect and resolve treat every variant as transient and retry; only the
/// address lookup treats [`TransportError::NotFound`] as final.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The requested peripheral or characteristic is not known (yet).
    #[error("Not found: {0}")]
    NotFound(String),

    /// The transport rejected the operation.
    #[error("Operation failed: {0}")]
    Failed(String),

    /// The transport is not available in this build.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// D-Bus error from the BlueZ backend.
    #[cfg(feature = "bluez")]
    #[error("D-Bus error: {0}")]
    DBus(#[from] zbus::Error),
}

impl TransportError {
    /// Whether this error means the looked-up object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Error from [`ConnectionSession::connect`](crate::ConnectionSession::connect).
#[derive(Debug, Error)]
pub enum ConnectError {
    /// No peripheral with this address is known to the transport.
    #[error("Device {address} not found")]
    NotFound {
        /// The address that was looked up.
        address: String,
        /// Transport error behind the failed lookup.
        #[source]
        source: TransportError,
    },

    /// The caller cancelled while connection attempts were still failing.
    #[error("Connecting to {address} cancelled: {reason}")]
    Cancelled {
        /// The address being connected to.
        address: String,
        /// Reason given to the cancellation signal.
        reason: String,
        /// Last failed attempt, if any.
        #[source]
        last_error: Option<TransportError>,
    },
}

/// Error from resolving a characteristic by UUID.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The caller cancelled before the characteristic showed up.
    #[error("Waiting for characteristic {uuid} cancelled: {reason}")]
    Cancelled {
        /// UUID of the wanted characteristic.
        uuid: String,
        /// Reason given to the cancellation signal.
        reason: String,
        /// Last failed lookup, if any.
        #[source]
        last_error: Option<TransportError>,
    },
}

/// Error from [`ConnectionSession::send`](crate::ConnectionSession::send).
#[derive(Debug, Error)]
pub enum SendError {
    /// The session has no open connection.
    #[error("Not connected")]
    NotConnected,

    /// The write characteristic could not be resolved.
    #[error("Can't get write characteristic: {0}")]
    CharacteristicNotFound(#[source] ResolveError),

    /// The transport rejected the write.
    #[error("Can't write to characteristic {uuid}: {source}")]
    WriteFailed {
        /// UUID of the write characteristic.
        uuid: String,
        /// Transport error from the write.
        #[source]
        source: TransportError,
    },
}

/// Error from [`ConnectionSession::subscribe`](crate::ConnectionSession::subscribe).
#[derive(Debug, Error)]
pub enum SubscribeError {
    /// The session has no open connection.
    #[error("Not connected")]
    NotConnected,

    /// The notify characteristic could not be resolved.
    #[error("Can't get notify characteristic: {0}")]
    CharacteristicNotFound(#[source] ResolveError),

    /// Registering for change events failed.
    #[error("Can't register for changes: {0}")]
    Register(#[source] TransportError),

    /// The transport refused to start notifications.
    #[error("Can't start notifications: {0}")]
    StartNotify(#[source] TransportError),

    /// The forwarding thread could not be spawned.
    #[error("Can't spawn notification thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Error from [`ConnectionSession::close`](crate::ConnectionSession::close).
#[derive(Debug, Error)]
pub enum CloseError {
    /// The transport failed to disconnect.
    #[error("Can't disconnect from {address}: {source}")]
    Disconnect {
        /// The address being disconnected.
        address: String,
        /// Transport error from the disconnect.
        #[source]
        source: TransportError,
    },
}

/// Error from [`decode`](crate::protocol::frame::decode).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Frame shorter than two bytes or not starting with the header byte.
    #[error("Too short or first byte not 0x5b ({len} bytes)")]
    InvalidHeader {
        /// Length of the rejected frame.
        len: usize,
    },

    /// Frame too short for the message kind named by its tag byte.
    #[error("{kind} frame too short: want at least {want} bytes, got {len}")]
    TooShort {
        /// Message kind, e.g. "heart/SpO2".
        kind: &'static str,
        /// Minimum length for this kind.
        want: usize,
        /// Actual frame length.
        len: usize,
    },
}

/// Error type for sleepon operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Connecting failed.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Sending a command failed.
    #[error(transparent)]
    Send(#[from] SendError),

    /// Subscribing to notifications failed.
    #[error(transparent)]
    Subscribe(#[from] SubscribeError),

    /// Disconnecting failed.
    #[error(transparent)]
    Close(#[from] CloseError),

    /// A received frame was malformed.
    #[error("Invalid frame: {0}")]
    Decode(#[from] DecodeError),

    /// A transport call failed outside of a retry loop.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl Error {
    /// Whether the operation ended because the caller cancelled it.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Connect(ConnectError::Cancelled { .. })
            | Self::Send(SendError::CharacteristicNotFound(ResolveError::Cancelled { .. }))
            | Self::Subscribe(SubscribeError::CharacteristicNotFound(
                ResolveError::Cancelled { .. },
            )) => true,
            _ => false,
        }
    }
}
