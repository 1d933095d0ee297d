//! Characteristic lookup with retry.
//!
//! Right after a connection completes BlueZ may not have enumerated the
//! peripheral's attribute table yet, so a lookup that comes back empty is
//! retried at a fixed interval until it succeeds or the caller cancels.

use crate::cancel::CancelToken;
use crate::error::ResolveError;
use crate::retry::retry_until_cancelled;
use crate::transport::Transport;
use log::debug;
use std::time::Duration;

/// Resolve the characteristic `uuid` of a connected peripheral.
pub fn resolve<T: Transport>(
    transport: &T,
    peripheral: &T::Peripheral,
    uuid: &str,
    cancel: &CancelToken,
    retry_delay: Duration,
) -> Result<T::Characteristic, ResolveError> {
    let what = format!("Looking up characteristic {uuid}");
    let characteristic = retry_until_cancelled(cancel, retry_delay, &what, || {
        transport.characteristic(peripheral, uuid)
    })
    .map_err(|interrupted| ResolveError::Cancelled {
        uuid: uuid.to_string(),
        reason: interrupted.reason,
        last_error: interrupted.last_error,
    })?;

    debug!("Resolved characteristic {uuid}: {characteristic:?}");
    Ok(characteristic)
}
