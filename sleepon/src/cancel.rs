//! Run-scoped cancellation signal.
//!
//! A [`CancelToken`] is shared by every retry loop and notification thread of
//! one run. Cancelling it is sticky and carries a human-readable reason that
//! ends up in the resulting `Cancelled` errors.
//!
//! The token is backed by a channel that is never written to: cancelling
//! drops the only sender, so [`CancelToken::done`] becomes ready and can be
//! used inside `crossbeam::channel::select!` next to timers and event
//! sources.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

struct Inner {
    reason: Mutex<Option<String>>,
    trigger: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
}

/// Cloneable cancellation signal.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("reason", &self.reason())
            .finish()
    }
}

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        let (trigger, done) = channel::bounded(0);
        Self {
            inner: Arc::new(Inner {
                reason: Mutex::new(None),
                trigger: Mutex::new(Some(trigger)),
                done,
            }),
        }
    }

    /// Cancel the token.
    ///
    /// Returns `true` for the call that actually cancelled; later calls keep
    /// the first reason and return `false`.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        let mut slot = self
            .inner
            .reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(reason.into());
        drop(slot);

        self.inner
            .trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        true
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// The reason passed to the first [`cancel`](Self::cancel) call.
    pub fn reason(&self) -> Option<String> {
        self.inner
            .reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reason for error messages; empty tokens report "cancelled".
    pub(crate) fn reason_or_default(&self) -> String {
        self.reason().unwrap_or_else(|| "cancelled".to_string())
    }

    /// Receiver that becomes ready (disconnected) once the token is cancelled.
    ///
    /// Use with `crossbeam::channel::select!`; it never yields a value.
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.done
    }

    /// Sleep for `timeout`, waking early on cancellation.
    ///
    /// Returns `true` if the token was cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.inner.done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => self.is_cancelled(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        }
    }

    /// Block until the token is cancelled.
    pub fn wait(&self) {
        let _ = self.inner.done.recv();
    }
}
