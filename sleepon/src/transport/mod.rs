//! BLE transport abstraction.
//!
//! The session logic never talks to a Bluetooth stack directly. It goes
//! through the [`Transport`] trait, which mirrors the handful of BlueZ
//! operations the client needs:
//!
//! ```text
//! +----------------------+
//! |  ConnectionSession   |  connect / send / subscribe / close
//! +----------+-----------+
//!            |
//!            v
//! +----------+-----------+
//! |   Transport trait    |
//! +----------+-----------+
//!            |
//!            v
//! +----------+-----------+
//! |   BluezTransport     |  (feature "bluez", system D-Bus)
//! +----------------------+
//! ```
//!
//! Value changes arrive as generic [`PropertiesChanged`] events, the same
//! shape as the D-Bus `org.freedesktop.DBus.Properties.PropertiesChanged`
//! signal, decoded into a typed struct by the backend.

#[cfg(feature = "bluez")]
pub mod bluez;

#[cfg(test)]
pub(crate) mod mock;

use crate::error::TransportError;
use crossbeam::channel::Receiver;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

/// Interface name of GATT characteristics in change events.
pub const GATT_CHARACTERISTIC_INTERFACE: &str = "org.bluez.GattCharacteristic1";

/// Property holding a characteristic's current value.
pub const VALUE_PROPERTY: &str = "Value";

/// New value of a changed property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    /// Byte array (D-Bus `ay`).
    Bytes(Vec<u8>),
    /// Boolean (D-Bus `b`).
    Bool(bool),
    /// String (D-Bus `s`).
    Text(String),
    /// Anything else, kept as a debug rendering.
    Other(String),
}

/// One property-change event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PropertiesChanged {
    /// Interface whose properties changed.
    pub interface: String,
    /// Changed property name to new value.
    pub changed: HashMap<String, PropertyValue>,
    /// Properties invalidated without a new value.
    pub invalidated: Vec<String>,
}

impl PropertiesChanged {
    /// Event for a characteristic value change.
    pub fn characteristic_value(value: impl Into<Vec<u8>>) -> Self {
        Self {
            interface: GATT_CHARACTERISTIC_INTERFACE.to_string(),
            changed: HashMap::from([(
                VALUE_PROPERTY.to_string(),
                PropertyValue::Bytes(value.into()),
            )]),
            invalidated: Vec::new(),
        }
    }
}

/// Stream of change events for one characteristic.
///
/// The backend closes it (drops the sender) when the underlying signal
/// subscription ends. Dropping the source drops whatever the backend
/// attached with [`EventSource::with_release`], which is how a backend
/// learns that nobody listens any more.
pub struct EventSource {
    events: Receiver<PropertiesChanged>,
    release: Option<Box<dyn Send>>,
}

impl EventSource {
    /// Events with nothing to release.
    pub fn new(events: Receiver<PropertiesChanged>) -> Self {
        Self {
            events,
            release: None,
        }
    }

    /// Events whose producer stops once `release` is dropped.
    pub fn with_release(events: Receiver<PropertiesChanged>, release: impl Send + 'static) -> Self {
        Self {
            events,
            release: Some(Box::new(release)),
        }
    }

    /// Underlying receiver, for use in `crossbeam::channel::select!`.
    pub fn receiver(&self) -> &Receiver<PropertiesChanged> {
        &self.events
    }
}

impl fmt::Debug for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("pending", &self.events.len())
            .field("releases", &self.release.is_some())
            .finish()
    }
}

/// Operations the session needs from a BLE stack.
///
/// Errors are plain [`TransportError`]s; the session decides which ones are
/// retried. Implementations must be shareable across threads because the
/// notification thread calls [`Transport::stop_notify`] on teardown.
pub trait Transport: Send + Sync + 'static {
    /// Handle to a known peripheral.
    type Peripheral: Clone + Debug + Send + Sync + 'static;

    /// Handle to a resolved characteristic.
    type Characteristic: Clone + Debug + Send + Sync + 'static;

    /// Find the peripheral with this address.
    ///
    /// Returns [`TransportError::NotFound`] if the stack does not know it.
    fn lookup(&self, address: &str) -> Result<Self::Peripheral, TransportError>;

    /// Open the radio connection to a peripheral.
    fn open(&self, peripheral: &Self::Peripheral) -> Result<(), TransportError>;

    /// Look up a characteristic of a connected peripheral by UUID.
    fn characteristic(
        &self,
        peripheral: &Self::Peripheral,
        uuid: &str,
    ) -> Result<Self::Characteristic, TransportError>;

    /// Write a value to a characteristic.
    fn write_value(
        &self,
        characteristic: &Self::Characteristic,
        data: &[u8],
    ) -> Result<(), TransportError>;

    /// Subscribe to property-change events of a characteristic.
    fn register_change_events(
        &self,
        characteristic: &Self::Characteristic,
    ) -> Result<EventSource, TransportError>;

    /// Ask the peripheral to start sending notifications.
    fn start_notify(&self, characteristic: &Self::Characteristic) -> Result<(), TransportError>;

    /// Ask the peripheral to stop sending notifications.
    fn stop_notify(&self, characteristic: &Self::Characteristic) -> Result<(), TransportError>;

    /// Disconnect from a peripheral.
    fn close(&self, peripheral: &Self::Peripheral) -> Result<(), TransportError>;
}

impl<T: Transport> Transport for Arc<T> {
    type Peripheral = T::Peripheral;
    type Characteristic = T::Characteristic;

    fn lookup(&self, address: &str) -> Result<Self::Peripheral, TransportError> {
        (**self).lookup(address)
    }

    fn open(&self, peripheral: &Self::Peripheral) -> Result<(), TransportError> {
        (**self).open(peripheral)
    }

    fn characteristic(
        &self,
        peripheral: &Self::Peripheral,
        uuid: &str,
    ) -> Result<Self::Characteristic, TransportError> {
        (**self).characteristic(peripheral, uuid)
    }

    fn write_value(
        &self,
        characteristic: &Self::Characteristic,
        data: &[u8],
    ) -> Result<(), TransportError> {
        (**self).write_value(characteristic, data)
    }

    fn register_change_events(
        &self,
        characteristic: &Self::Characteristic,
    ) -> Result<EventSource, TransportError> {
        (**self).register_change_events(characteristic)
    }

    fn start_notify(&self, characteristic: &Self::Characteristic) -> Result<(), TransportError> {
        (**self).start_notify(characteristic)
    }

    fn stop_notify(&self, characteristic: &Self::Characteristic) -> Result<(), TransportError> {
        (**self).stop_notify(characteristic)
    }

    fn close(&self, peripheral: &Self::Peripheral) -> Result<(), TransportError> {
        (**self).close(peripheral)
    }
}
