//! Connection to one SleepOn wristband.
//!
//! [`ConnectionSession`] owns the link to a single peripheral:
//!
//! - [`connect`](ConnectionSession::connect) looks the address up once, then
//!   opens the radio connection, retrying at a fixed interval until it works
//!   or the caller cancels.
//! - [`send`](ConnectionSession::send) writes one command to the UART TX
//!   characteristic, which is resolved once per connection and cached.
//! - [`subscribe`](ConnectionSession::subscribe) resolves the UART RX
//!   characteristic and streams its notifications.
//! - [`close`](ConnectionSession::close) disconnects.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sleepon::{CancelToken, Command, ConnectionSession, Transport, decode};
//!
//! fn run<T: Transport>(transport: T) -> Result<(), Box<dyn std::error::Error>> {
//!     let cancel = CancelToken::new();
//!     let session = ConnectionSession::new(transport, "DE:7A:47:65:08:1F");
//!
//!     session.connect(&cancel)?;
//!     let frames = session.subscribe(&cancel)?;
//!     session.send(&cancel, &Command::VersionRequest.encode())?;
//!
//!     for frame in frames {
//!         println!("{:?}", decode(&frame));
//!     }
//!
//!     session.close()?;
//!     Ok(())
//! }
//! ```

pub mod notify;
pub mod resolve;

pub use notify::{Messages, Notifications, RawFrame};

use crate::cancel::CancelToken;
use crate::error::{CloseError, ConnectError, SendError, SubscribeError};
use crate::protocol::{UART_RX_CHARACTERISTIC, UART_TX_CHARACTERISTIC};
use crate::retry::{DEFAULT_RETRY_DELAY, retry_until_cancelled};
use crate::transport::Transport;
use crossbeam::channel::{self, Receiver, select};
use log::{debug, info};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Delay between two connect or lookup attempts.
    pub retry_delay: Duration,
    /// UUID of the characteristic commands are written to.
    pub write_uuid: String,
    /// UUID of the characteristic frames are notified on.
    pub read_uuid: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
            write_uuid: UART_TX_CHARACTERISTIC.to_string(),
            read_uuid: UART_RX_CHARACTERISTIC.to_string(),
        }
    }
}

impl SessionConfig {
    /// Set the retry delay.
    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Set the write characteristic UUID.
    #[must_use]
    pub fn with_write_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.write_uuid = uuid.into();
        self
    }

    /// Set the notify characteristic UUID.
    #[must_use]
    pub fn with_read_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.read_uuid = uuid.into();
        self
    }
}

#[derive(Debug)]
enum LinkState<P> {
    Disconnected,
    // The receiver disconnects once the attempt has finished.
    Connecting(Receiver<()>),
    Connected(P),
}

/// Connection to one peripheral.
///
/// All methods take `&self`; the session may be shared between the thread
/// that reads notifications and the one that sends commands.
pub struct ConnectionSession<T: Transport> {
    address: String,
    transport: Arc<T>,
    config: SessionConfig,
    // Only held for check-and-set, never across a transport call.
    link: Mutex<LinkState<T::Peripheral>>,
    // Held while resolving, so concurrent sends resolve once.
    write_characteristic: Mutex<Option<T::Characteristic>>,
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Transport> ConnectionSession<T> {
    /// Create a disconnected session with default settings.
    pub fn new(transport: T, address: impl Into<String>) -> Self {
        Self::with_config(transport, address, SessionConfig::default())
    }

    /// Create a disconnected session.
    pub fn with_config(transport: T, address: impl Into<String>, config: SessionConfig) -> Self {
        Self::from_shared(Arc::new(transport), address, config)
    }

    /// Create a disconnected session on a shared transport.
    pub fn from_shared(transport: Arc<T>, address: impl Into<String>, config: SessionConfig) -> Self {
        Self {
            address: address.into(),
            transport,
            config,
            link: Mutex::new(LinkState::Disconnected),
            write_characteristic: Mutex::new(None),
        }
    }

    /// Address of the peripheral.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Session settings.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The transport this session runs on.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Whether the session holds an open connection.
    pub fn is_connected(&self) -> bool {
        matches!(*lock(&self.link), LinkState::Connected(_))
    }

    fn peripheral(&self) -> Option<T::Peripheral> {
        match &*lock(&self.link) {
            LinkState::Connected(peripheral) => Some(peripheral.clone()),
            LinkState::Connecting(_) | LinkState::Disconnected => None,
        }
    }

    /// Connect to the peripheral, retrying until it works or `cancel` fires.
    ///
    /// Does nothing if already connected. An address the transport does not
    /// know fails right away. While one call is connecting, concurrent calls
    /// wait for its outcome instead of opening a second link.
    pub fn connect(&self, cancel: &CancelToken) -> Result<(), ConnectError> {
        let _finished = loop {
            let pending = {
                let mut link = lock(&self.link);
                let pending = match &*link {
                    LinkState::Connected(_) => return Ok(()),
                    LinkState::Connecting(done) => Some(done.clone()),
                    LinkState::Disconnected => None,
                };
                match pending {
                    Some(done) => done,
                    None => {
                        let (finished, done) = channel::bounded(0);
                        *link = LinkState::Connecting(done);
                        break finished;
                    },
                }
            };

            debug!("Waiting for another connect to {}.", self.address);
            let cancelled = select! {
                recv(pending) -> _ => false,
                recv(cancel.done()) -> _ => true,
            };
            if cancelled {
                return Err(ConnectError::Cancelled {
                    address: self.address.clone(),
                    reason: cancel.reason_or_default(),
                    last_error: None,
                });
            }
        };

        // The link lock is not held here; send and subscribe see
        // `Connecting` and fail fast.
        let opened = self.open_link(cancel);

        let mut link = lock(&self.link);
        match opened {
            Ok(peripheral) => {
                // Handles from an earlier connection may be stale.
                lock(&self.write_characteristic).take();
                *link = LinkState::Connected(peripheral);
                info!("Connected to {}.", self.address);
                Ok(())
            },
            Err(e) => {
                *link = LinkState::Disconnected;
                Err(e)
            },
        }
    }

    fn open_link(&self, cancel: &CancelToken) -> Result<T::Peripheral, ConnectError> {
        info!("Connecting to {}.", self.address);
        let peripheral =
            self.transport
                .lookup(&self.address)
                .map_err(|source| ConnectError::NotFound {
                    address: self.address.clone(),
                    source,
                })?;

        let what = format!("Connecting to {}", self.address);
        retry_until_cancelled(cancel, self.config.retry_delay, &what, || {
            self.transport.open(&peripheral)
        })
        .map_err(|interrupted| ConnectError::Cancelled {
            address: self.address.clone(),
            reason: interrupted.reason,
            last_error: interrupted.last_error,
        })?;
        Ok(peripheral)
    }

    /// Write `data` to the write characteristic.
    ///
    /// The write is not retried; a transport error is returned as is.
    pub fn send(&self, cancel: &CancelToken, data: &[u8]) -> Result<(), SendError> {
        let peripheral = self.peripheral().ok_or(SendError::NotConnected)?;

        let characteristic = {
            let mut cached = lock(&self.write_characteristic);
            if let Some(characteristic) = cached.as_ref() {
                characteristic.clone()
            } else {
                let characteristic = resolve::resolve(
                    &*self.transport,
                    &peripheral,
                    &self.config.write_uuid,
                    cancel,
                    self.config.retry_delay,
                )
                .map_err(SendError::CharacteristicNotFound)?;
                *cached = Some(characteristic.clone());
                characteristic
            }
        };

        debug!("Sending {} bytes: {:02X?}", data.len(), data);
        self.transport
            .write_value(&characteristic, data)
            .map_err(|source| SendError::WriteFailed {
                uuid: self.config.write_uuid.clone(),
                source,
            })
    }

    /// Stream notifications of the read characteristic.
    ///
    /// The characteristic is resolved afresh for every subscription.
    pub fn subscribe(&self, cancel: &CancelToken) -> Result<Notifications, SubscribeError> {
        let peripheral = self.peripheral().ok_or(SubscribeError::NotConnected)?;
        let characteristic = resolve::resolve(
            &*self.transport,
            &peripheral,
            &self.config.read_uuid,
            cancel,
            self.config.retry_delay,
        )
        .map_err(SubscribeError::CharacteristicNotFound)?;

        notify::subscribe(&self.transport, characteristic, cancel)
    }

    /// Disconnect from the peripheral.
    ///
    /// The session is disconnected afterwards even if the transport reports
    /// an error. Closing a session that is not connected, or still
    /// connecting, does nothing.
    pub fn close(&self) -> Result<(), CloseError> {
        let peripheral = {
            let mut link = lock(&self.link);
            match std::mem::replace(&mut *link, LinkState::Disconnected) {
                LinkState::Connected(peripheral) => peripheral,
                other => {
                    *link = other;
                    debug!("Not connected to {}, nothing to close.", self.address);
                    return Ok(());
                },
            }
        };
        lock(&self.write_characteristic).take();

        debug!("Disconnecting from {}.", self.address);
        self.transport
            .close(&peripheral)
            .map_err(|source| CloseError::Disconnect {
                address: self.address.clone(),
                source,
            })
    }
}
