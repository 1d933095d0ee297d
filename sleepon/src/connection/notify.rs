//! Notification pipeline.
//!
//! [`subscribe`] turns the transport's generic property-change events for one
//! characteristic into a stream of raw frames:
//!
//! ```text
//! EventSource --filter/unwrap--> bounded(1) --> Notifications (consumer)
//!      ^                                              |
//!      |              forwarding thread               |
//!      +-- stop_notify on exit (cancel, close, drop) -+
//! ```
//!
//! The forwarding thread exits when the cancellation token fires, when the
//! event source closes, or when the consumer drops its [`Notifications`].
//! On every exit path it asks the transport to stop notifying exactly once
//! and only then closes the frame channel, so a consumer that has seen the
//! end of the stream knows the unsubscribe already ran.

use crate::cancel::CancelToken;
use crate::error::{DecodeError, SubscribeError};
use crate::protocol::frame::{self, DecodedMessage};
use crate::transport::{
    EventSource, GATT_CHARACTERISTIC_INTERFACE, PropertiesChanged, PropertyValue, Transport,
    VALUE_PROPERTY,
};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use log::{debug, trace, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Bytes of one notification.
pub type RawFrame = Vec<u8>;

/// Frames waiting for the consumer; one pending frame at most.
const FRAME_CHANNEL_CAPACITY: usize = 1;

/// Stream of raw frames from one subscription.
///
/// Single consumer, not restartable. Iterating yields frames in the order the
/// transport emitted them and ends when the subscription stops.
pub struct Notifications {
    frames: Receiver<RawFrame>,
    // Never sent on; dropping it tells the forwarding thread to stop.
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Notifications {
    /// Block until the next frame; `None` once the stream has ended.
    pub fn recv(&self) -> Option<RawFrame> {
        self.frames.recv().ok()
    }

    /// Wait up to `timeout` for the next frame.
    ///
    /// `Ok(None)` means the stream has ended.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<RawFrame>, RecvTimeoutError> {
        match self.frames.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
            Err(e @ RecvTimeoutError::Timeout) => Err(e),
        }
    }

    /// Underlying receiver, for use in `crossbeam::channel::select!`.
    pub fn receiver(&self) -> &Receiver<RawFrame> {
        &self.frames
    }

    /// Decode each frame as it arrives.
    ///
    /// A malformed frame yields an `Err` item; the stream goes on.
    pub fn messages(self) -> Messages {
        Messages { inner: self }
    }

    /// Stop the subscription and wait until the transport was unsubscribed.
    pub fn stop(self) {
        let Self {
            frames,
            stop,
            handle,
        } = self;
        drop(stop);
        drop(frames);
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Notification thread panicked.");
            }
        }
    }
}

impl Iterator for Notifications {
    type Item = RawFrame;

    fn next(&mut self) -> Option<RawFrame> {
        self.recv()
    }
}

/// Decoded view of [`Notifications`].
pub struct Messages {
    inner: Notifications,
}

impl Messages {
    /// Stop the subscription, see [`Notifications::stop`].
    pub fn stop(self) {
        self.inner.stop();
    }
}

impl Iterator for Messages {
    type Item = Result<DecodedMessage, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|bytes| {
            let decoded = frame::decode(&bytes);
            if let Err(ref e) = decoded {
                debug!("Can't decode {} received bytes ({}): {e}", bytes.len(), frame::hex(&bytes));
            }
            decoded
        })
    }
}

/// Stops notifications when dropped.
struct StopNotifyGuard<T: Transport> {
    transport: Arc<T>,
    characteristic: T::Characteristic,
}

impl<T: Transport> Drop for StopNotifyGuard<T> {
    fn drop(&mut self) {
        debug!("Stopping notifications for characteristic {:?}.", self.characteristic);
        if let Err(e) = self.transport.stop_notify(&self.characteristic) {
            warn!("Can't stop notifications: {e}.");
        }
    }
}

/// Extract the new characteristic value from an event.
///
/// Events for other interfaces or properties are not frames and yield `None`.
fn frame_from_event(mut event: PropertiesChanged) -> Option<RawFrame> {
    if event.interface != GATT_CHARACTERISTIC_INTERFACE {
        trace!("Ignoring change event for interface {}.", event.interface);
        return None;
    }

    match event.changed.remove(VALUE_PROPERTY) {
        Some(PropertyValue::Bytes(bytes)) => Some(bytes),
        Some(other) => {
            warn!("Characteristic value is not a byte array but {other:?}.");
            None
        },
        None => {
            trace!(
                "Ignoring change of {:?} (invalidated: {:?}).",
                event.changed.keys().collect::<Vec<_>>(),
                event.invalidated
            );
            None
        },
    }
}

/// Forward frames until cancelled, the source closes or the consumer leaves.
fn forward(
    events: &EventSource,
    frames: &Sender<RawFrame>,
    stop: &Receiver<()>,
    cancel: &CancelToken,
) {
    loop {
        // select! picks randomly among ready operations.
        if cancel.is_cancelled() {
            return;
        }
        let event = channel::select! {
            recv(events.receiver()) -> event => match event {
                Ok(event) => event,
                Err(_) => {
                    debug!("Change event source closed.");
                    return;
                },
            },
            recv(cancel.done()) -> _ => return,
            recv(stop) -> _ => return,
        };

        let Some(bytes) = frame_from_event(event) else {
            continue;
        };
        trace!("Received frame {}.", frame::hex(&bytes));

        channel::select! {
            send(frames, bytes) -> sent => {
                if sent.is_err() {
                    return;
                }
            },
            recv(cancel.done()) -> _ => return,
            recv(stop) -> _ => return,
        }
    }
}

/// Subscribe to value notifications of `characteristic`.
///
/// Registers for change events, starts notifications and spawns the
/// forwarding thread. Failures here are returned; failures to stop
/// notifications later are only logged.
pub fn subscribe<T: Transport>(
    transport: &Arc<T>,
    characteristic: T::Characteristic,
    cancel: &CancelToken,
) -> Result<Notifications, SubscribeError> {
    let events = transport
        .register_change_events(&characteristic)
        .map_err(SubscribeError::Register)?;
    transport
        .start_notify(&characteristic)
        .map_err(SubscribeError::StartNotify)?;
    debug!("Started notifications for characteristic {characteristic:?}.");

    let guard = StopNotifyGuard {
        transport: Arc::clone(transport),
        characteristic,
    };
    let (frames_tx, frames_rx) = channel::bounded(FRAME_CHANNEL_CAPACITY);
    let (stop_tx, stop_rx) = channel::bounded::<()>(0);
    let cancel = cancel.clone();

    // If spawning fails the closure, and with it the guard, is dropped.
    let handle = thread::Builder::new()
        .name("sleepon-notify".to_string())
        .spawn(move || {
            let frames_tx = frames_tx;
            // Dropped before frames_tx: unsubscribe, then end the stream.
            let _guard = guard;
            forward(&events, &frames_tx, &stop_rx, &cancel);
        })
        .map_err(SubscribeError::Spawn)?;

    Ok(Notifications {
        frames: frames_rx,
        stop: stop_tx,
        handle: Some(handle),
    })
}
