//! BlueZ transport over the system D-Bus.
//!
//! Uses the blocking `zbus` API. Objects are found through BlueZ's object
//! manager: devices by their `Address` property, characteristics by their
//! `UUID` below the device path. Value notifications are the standard
//! `PropertiesChanged` signal of the characteristic object; a pump thread
//! turns each signal into a [`PropertiesChanged`] event until the returned
//! [`EventSource`] is dropped.
//!
//! Discovery and pairing are not handled here: the device must already be
//! known to BlueZ (e.g. via `bluetoothctl scan on`).

use crate::error::TransportError;
use crate::transport::{EventSource, PropertiesChanged, PropertyValue, Transport};
use crossbeam::channel::{self, Sender};
use futures::channel::oneshot;
use futures::executor::block_on;
use futures::future::{self, Either};
use futures::{Stream, StreamExt};
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::thread;
use zbus::blocking::fdo::ObjectManagerProxy;
use zbus::blocking::{Connection, Proxy};
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};

const BLUEZ_SERVICE: &str = "org.bluez";
const DEVICE_INTERFACE: &str = "org.bluez.Device1";
const CHARACTERISTIC_INTERFACE: &str = crate::transport::GATT_CHARACTERISTIC_INTERFACE;

/// A BlueZ device object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BluezDevice {
    path: OwnedObjectPath,
    address: String,
}

impl BluezDevice {
    /// D-Bus object path, e.g. `/org/bluez/hci0/dev_DE_7A_47_65_08_1F`.
    pub fn path(&self) -> &str {
        self.path.as_str()
    }
}

/// A BlueZ GATT characteristic object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BluezCharacteristic {
    path: OwnedObjectPath,
    uuid: String,
}

impl BluezCharacteristic {
    /// D-Bus object path of the characteristic.
    pub fn path(&self) -> &str {
        self.path.as_str()
    }
}

/// [`Transport`] backed by BlueZ.
pub struct BluezTransport {
    connection: Connection,
}

fn as_str(value: &OwnedValue) -> Option<&str> {
    match &**value {
        Value::Str(s) => Some(s.as_str()),
        _ => None,
    }
}

fn property_value(value: &Value<'_>) -> PropertyValue {
    match value {
        Value::Bool(b) => PropertyValue::Bool(*b),
        Value::Str(s) => PropertyValue::Text(s.as_str().to_string()),
        Value::Array(_) => value
            .try_clone()
            .ok()
            .and_then(|owned| Vec::<u8>::try_from(owned).ok())
            .map_or_else(|| PropertyValue::Other(format!("{value:?}")), PropertyValue::Bytes),
        other => PropertyValue::Other(format!("{other:?}")),
    }
}

fn event_from_signal(signal: &zbus::fdo::PropertiesChanged) -> Option<PropertiesChanged> {
    let args = match signal.args() {
        Ok(args) => args,
        Err(e) => {
            warn!("Can't get arguments from signal: {e}.");
            return None;
        },
    };
    Some(PropertiesChanged {
        interface: args.interface_name().to_string(),
        changed: args
            .changed_properties()
            .iter()
            .map(|(name, value)| ((*name).to_string(), property_value(value)))
            .collect(),
        invalidated: args
            .invalidated_properties()
            .iter()
            .map(|name| (*name).to_string())
            .collect(),
    })
}

/// Forward signals until the stream ends, the consumer hangs up or the
/// event source is dropped.
///
/// After `StopNotify` BlueZ emits nothing for the object, so the release
/// is what ends the pump and removes its match rule.
async fn pump<S, F>(
    mut signals: S,
    mut released: oneshot::Receiver<()>,
    events: &Sender<PropertiesChanged>,
    convert: F,
) where
    S: Stream + Unpin,
    F: Fn(S::Item) -> Option<PropertiesChanged>,
{
    loop {
        match future::select(signals.next(), &mut released).await {
            Either::Left((Some(signal), _)) => {
                let Some(event) = convert(signal) else {
                    continue;
                };
                if events.send(event).is_err() {
                    break;
                }
            },
            Either::Left((None, _)) => {
                trace!("Signal stream ended.");
                break;
            },
            Either::Right(_) => {
                trace!("Event source released.");
                break;
            },
        }
    }
}

impl BluezTransport {
    /// Connect to the system bus.
    pub fn system() -> Result<Self, TransportError> {
        Ok(Self {
            connection: Connection::system()?,
        })
    }

    /// Use an existing bus connection.
    pub fn with_connection(connection: Connection) -> Self {
        Self { connection }
    }

    /// Find objects implementing `interface` whose `key` property is `want`.
    fn find_object(
        &self,
        interface: &str,
        key: &str,
        want: &str,
        under: Option<&str>,
    ) -> Result<Option<OwnedObjectPath>, TransportError> {
        let manager = ObjectManagerProxy::builder(&self.connection)
            .destination(BLUEZ_SERVICE)?
            .path("/")?
            .build()?;
        let objects = manager
            .get_managed_objects()
            .map_err(zbus::Error::from)?;

        for (path, interfaces) in objects {
            if let Some(prefix) = under {
                if !path.as_str().starts_with(prefix) {
                    continue;
                }
            }
            let Some(properties) = interfaces
                .iter()
                .find(|(name, _)| name.as_str() == interface)
                .map(|(_, properties)| properties)
            else {
                continue;
            };
            let matches = properties
                .get(key)
                .and_then(as_str)
                .is_some_and(|value| value.eq_ignore_ascii_case(want));
            if matches {
                trace!("Found {interface} {want} at {}", path.as_str());
                return Ok(Some(path));
            }
        }

        Ok(None)
    }

    fn proxy<'p>(
        &self,
        path: &'p OwnedObjectPath,
        interface: &'static str,
    ) -> Result<Proxy<'p>, TransportError> {
        Ok(Proxy::new(
            &self.connection,
            BLUEZ_SERVICE,
            path.as_str(),
            interface,
        )?)
    }
}

impl Transport for BluezTransport {
    type Peripheral = BluezDevice;
    type Characteristic = BluezCharacteristic;

    fn lookup(&self, address: &str) -> Result<BluezDevice, TransportError> {
        let path = self
            .find_object(DEVICE_INTERFACE, "Address", address, None)?
            .ok_or_else(|| TransportError::NotFound(format!("device with address {address}")))?;
        Ok(BluezDevice {
            path,
            address: address.to_string(),
        })
    }

    fn open(&self, peripheral: &BluezDevice) -> Result<(), TransportError> {
        debug!("Calling Connect on {}", peripheral.path());
        self.proxy(&peripheral.path, DEVICE_INTERFACE)?
            .call::<_, _, ()>("Connect", &())?;
        Ok(())
    }

    fn characteristic(
        &self,
        peripheral: &BluezDevice,
        uuid: &str,
    ) -> Result<BluezCharacteristic, TransportError> {
        let prefix = format!("{}/", peripheral.path());
        let path = self
            .find_object(CHARACTERISTIC_INTERFACE, "UUID", uuid, Some(&prefix))?
            .ok_or_else(|| {
                TransportError::NotFound(format!(
                    "characteristic {uuid} on {}",
                    peripheral.address
                ))
            })?;
        Ok(BluezCharacteristic {
            path,
            uuid: uuid.to_string(),
        })
    }

    fn write_value(
        &self,
        characteristic: &BluezCharacteristic,
        data: &[u8],
    ) -> Result<(), TransportError> {
        let options: HashMap<&str, Value<'_>> = HashMap::new();
        self.proxy(&characteristic.path, CHARACTERISTIC_INTERFACE)?
            .call::<_, _, ()>("WriteValue", &(data.to_vec(), options))?;
        Ok(())
    }

    fn register_change_events(
        &self,
        characteristic: &BluezCharacteristic,
    ) -> Result<EventSource, TransportError> {
        let connection = self.connection.inner().clone();
        let path = characteristic.path().to_string();
        let (proxy, signals) = block_on(async move {
            let proxy = zbus::fdo::PropertiesProxy::builder(&connection)
                .destination(BLUEZ_SERVICE)?
                .path(path)?
                .build()
                .await?;
            let signals = proxy.receive_properties_changed().await?;
            Ok::<_, zbus::Error>((proxy, signals))
        })?;
        let (tx, rx) = channel::unbounded();
        let (release, released) = oneshot::channel::<()>();
        let uuid = characteristic.uuid.clone();

        thread::Builder::new()
            .name("sleepon-bluez-events".to_string())
            .spawn(move || {
                // Keep the proxy alive as long as its signal stream.
                let _proxy = proxy;
                block_on(pump(Box::pin(signals), released, &tx, |signal| {
                    event_from_signal(&signal)
                }));
                debug!("Event pump for characteristic {uuid} finished.");
            })
            .map_err(|e| TransportError::Failed(format!("can't spawn event thread: {e}")))?;

        Ok(EventSource::with_release(rx, release))
    }

    fn start_notify(&self, characteristic: &BluezCharacteristic) -> Result<(), TransportError> {
        self.proxy(&characteristic.path, CHARACTERISTIC_INTERFACE)?
            .call::<_, _, ()>("StartNotify", &())?;
        Ok(())
    }

    fn stop_notify(&self, characteristic: &BluezCharacteristic) -> Result<(), TransportError> {
        self.proxy(&characteristic.path, CHARACTERISTIC_INTERFACE)?
            .call::<_, _, ()>("StopNotify", &())?;
        Ok(())
    }

    fn close(&self, peripheral: &BluezDevice) -> Result<(), TransportError> {
        self.proxy(&peripheral.path, DEVICE_INTERFACE)?
            .call::<_, _, ()>("Disconnect", &())?;
        Ok(())
    }
}
