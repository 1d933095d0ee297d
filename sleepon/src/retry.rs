//! Retry-until-cancelled loop shared by connect and characteristic lookup.
//!
//! Radio and GATT-table timing has no useful upper bound, so attempts are not
//! capped here: the caller's [`CancelToken`] is the only way out of a loop
//! that keeps failing.

use crate::cancel::CancelToken;
use crate::error::TransportError;
use crossbeam::channel;
use log::warn;
use std::time::Duration;

/// Default delay between two attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// A retry loop stopped by cancellation.
#[derive(Debug)]
pub struct Interrupted {
    /// Reason given to the cancellation signal.
    pub reason: String,
    /// Error of the last failed attempt, if any attempt ran.
    pub last_error: Option<TransportError>,
    /// Number of attempts made.
    pub attempts: usize,
}

/// Run `attempt` until it succeeds, waiting `delay` after each failure.
///
/// Every failure is logged at warn level with `what` as the subject. The
/// token is checked before each attempt and raced against the delay, so
/// cancellation is observed within one tick.
pub fn retry_until_cancelled<T, F>(
    cancel: &CancelToken,
    delay: Duration,
    what: &str,
    mut attempt: F,
) -> Result<T, Interrupted>
where
    F: FnMut() -> Result<T, TransportError>,
{
    let mut last_error = None;
    let mut attempts = 0usize;

    loop {
        if cancel.is_cancelled() {
            return Err(Interrupted {
                reason: cancel.reason_or_default(),
                last_error,
                attempts,
            });
        }

        attempts += 1;
        match attempt() {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!("{what} failed (attempt {attempts}): {e}. Will retry.");
                last_error = Some(e);
            },
        }

        channel::select! {
            recv(cancel.done()) -> _ => {
                return Err(Interrupted {
                    reason: cancel.reason_or_default(),
                    last_error,
                    attempts,
                });
            },
            recv(channel::after(delay)) -> _ => {},
        }
    }
}
