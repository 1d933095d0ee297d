//! In-memory wristband for command tests.

use crossbeam::channel::{self, Sender};
use sleepon::{
    CancelToken, ConnectionSession, EventSource, PropertiesChanged, Transport, TransportError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

pub(crate) const ADDR: &str = "DE:7A:47:65:08:1F";

/// Answers every write with canned frames.
#[derive(Debug, Default)]
pub(crate) struct StubTransport {
    replies: Vec<Vec<u8>>,
    fail_write: bool,
    hang_up_after_write: bool,
    events: Mutex<Option<Sender<PropertiesChanged>>>,
    writes: Mutex<Vec<Vec<u8>>>,
    stop_notify: AtomicUsize,
}

impl StubTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Frames notified after each write.
    pub(crate) fn replying(mut self, replies: &[&[u8]]) -> Self {
        self.replies = replies.iter().map(|r| r.to_vec()).collect();
        self
    }

    pub(crate) fn with_failing_write(mut self) -> Self {
        self.fail_write = true;
        self
    }

    /// Close the event source after each write, like a dropped link.
    pub(crate) fn hanging_up(mut self) -> Self {
        self.hang_up_after_write = true;
        self
    }

    pub(crate) fn emit(&self, frame: &[u8]) {
        if let Some(events) = self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            let _ = events.send(PropertiesChanged::characteristic_value(frame));
        }
    }

    pub(crate) fn close_events(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub(crate) fn writes(&self) -> Vec<Vec<u8>> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn stop_notify_calls(&self) -> usize {
        self.stop_notify.load(Ordering::SeqCst)
    }
}

impl Transport for StubTransport {
    type Peripheral = ();
    type Characteristic = String;

    fn lookup(&self, _address: &str) -> Result<(), TransportError> {
        Ok(())
    }

    fn open(&self, _peripheral: &()) -> Result<(), TransportError> {
        Ok(())
    }

    fn characteristic(&self, _peripheral: &(), uuid: &str) -> Result<String, TransportError> {
        Ok(uuid.to_string())
    }

    fn write_value(&self, _characteristic: &String, data: &[u8]) -> Result<(), TransportError> {
        if self.fail_write {
            return Err(TransportError::Failed("write rejected".into()));
        }
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(data.to_vec());
        for reply in &self.replies {
            self.emit(reply);
        }
        if self.hang_up_after_write {
            self.close_events();
        }
        Ok(())
    }

    fn register_change_events(&self, _characteristic: &String) -> Result<EventSource, TransportError> {
        let (tx, rx) = channel::unbounded();
        *self.events.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        Ok(EventSource::new(rx))
    }

    fn start_notify(&self, _characteristic: &String) -> Result<(), TransportError> {
        Ok(())
    }

    fn stop_notify(&self, _characteristic: &String) -> Result<(), TransportError> {
        self.stop_notify.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self, _peripheral: &()) -> Result<(), TransportError> {
        Ok(())
    }
}

/// A session on `transport` that is already connected.
pub(crate) fn connected(transport: StubTransport) -> ConnectionSession<StubTransport> {
    let session = ConnectionSession::new(transport, ADDR);
    session
        .connect(&CancelToken::new())
        .expect("stub transport always connects");
    session
}
