//! Scripted transport for unit tests.

use crate::error::TransportError;
use crate::transport::{EventSource, PropertiesChanged, Transport};
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Fails forever when used as a failure budget.
pub(crate) const ALWAYS: usize = usize::MAX;

/// Number of calls per transport operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Calls {
    pub lookup: usize,
    pub open: usize,
    pub characteristic: usize,
    pub write: usize,
    pub register: usize,
    pub start_notify: usize,
    pub stop_notify: usize,
    pub close: usize,
}

/// Characteristic handle; `id` is unique per successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MockCharacteristic {
    pub uuid: String,
    pub id: usize,
}

#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    known_addresses: Vec<String>,
    open_failures: AtomicUsize,
    characteristic_failures: AtomicUsize,
    fail_write: AtomicBool,
    fail_stop_notify: AtomicBool,
    fail_close: AtomicBool,
    next_id: AtomicUsize,
    calls: Mutex<Calls>,
    writes: Mutex<Vec<(MockCharacteristic, Vec<u8>)>>,
    events: Mutex<Option<Sender<PropertiesChanged>>>,
    // Disconnects once the last event source was dropped.
    released: Mutex<Option<Receiver<()>>>,
}

fn failure_budget(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
            0 => None,
            ALWAYS => Some(ALWAYS),
            n => Some(n - 1),
        })
        .is_ok()
}

impl MockTransport {
    pub(crate) fn new(address: &str) -> Self {
        Self {
            known_addresses: vec![address.to_string()],
            ..Self::default()
        }
    }

    /// Make the next `n` opens fail ([`ALWAYS`] for all of them).
    pub(crate) fn with_open_failures(self, n: usize) -> Self {
        self.open_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Make the next `n` characteristic lookups fail.
    pub(crate) fn with_characteristic_failures(self, n: usize) -> Self {
        self.characteristic_failures.store(n, Ordering::SeqCst);
        self
    }

    pub(crate) fn with_failing_write(self) -> Self {
        self.fail_write.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn with_failing_stop_notify(self) -> Self {
        self.fail_stop_notify.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn with_failing_close(self) -> Self {
        self.fail_close.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn calls(&self) -> Calls {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn writes(&self) -> Vec<(MockCharacteristic, Vec<u8>)> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Push an event to the registered event source.
    pub(crate) fn emit(&self, event: PropertiesChanged) {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = events.as_ref().expect("no event source registered");
        sender.send(event).expect("event source dropped");
    }

    /// Close the registered event source.
    pub(crate) fn close_events(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Whether the consumer dropped the registered event source.
    pub(crate) fn events_released(&self) -> bool {
        self.released
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|released| released.try_recv() == Err(TryRecvError::Disconnected))
    }

    fn record(&self, f: impl FnOnce(&mut Calls)) {
        f(&mut self.calls.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

impl Transport for MockTransport {
    type Peripheral = String;
    type Characteristic = MockCharacteristic;

    fn lookup(&self, address: &str) -> Result<String, TransportError> {
        self.record(|c| c.lookup += 1);
        if self.known_addresses.iter().any(|a| a == address) {
            Ok(address.to_string())
        } else {
            Err(TransportError::NotFound(format!("device {address}")))
        }
    }

    fn open(&self, _peripheral: &String) -> Result<(), TransportError> {
        self.record(|c| c.open += 1);
        if failure_budget(&self.open_failures) {
            return Err(TransportError::Failed("le-connection-abort-by-local".into()));
        }
        Ok(())
    }

    fn characteristic(
        &self,
        _peripheral: &String,
        uuid: &str,
    ) -> Result<MockCharacteristic, TransportError> {
        self.record(|c| c.characteristic += 1);
        if failure_budget(&self.characteristic_failures) {
            return Err(TransportError::NotFound(format!("characteristic {uuid}")));
        }
        Ok(MockCharacteristic {
            uuid: uuid.to_string(),
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
        })
    }

    fn write_value(
        &self,
        characteristic: &MockCharacteristic,
        data: &[u8],
    ) -> Result<(), TransportError> {
        self.record(|c| c.write += 1);
        if self.fail_write.load(Ordering::SeqCst) {
            return Err(TransportError::Failed("write rejected".into()));
        }
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((characteristic.clone(), data.to_vec()));
        Ok(())
    }

    fn register_change_events(
        &self,
        _characteristic: &MockCharacteristic,
    ) -> Result<EventSource, TransportError> {
        self.record(|c| c.register += 1);
        let (tx, rx) = channel::unbounded();
        let (release, released) = channel::bounded::<()>(0);
        *self.events.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        *self.released.lock().unwrap_or_else(PoisonError::into_inner) = Some(released);
        Ok(EventSource::with_release(rx, release))
    }

    fn start_notify(&self, _characteristic: &MockCharacteristic) -> Result<(), TransportError> {
        self.record(|c| c.start_notify += 1);
        Ok(())
    }

    fn stop_notify(&self, _characteristic: &MockCharacteristic) -> Result<(), TransportError> {
        self.record(|c| c.stop_notify += 1);
        if self.fail_stop_notify.load(Ordering::SeqCst) {
            return Err(TransportError::Failed("not connected".into()));
        }
        Ok(())
    }

    fn close(&self, _peripheral: &String) -> Result<(), TransportError> {
        self.record(|c| c.close += 1);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(TransportError::Failed("disconnect failed".into()));
        }
        Ok(())
    }
}
