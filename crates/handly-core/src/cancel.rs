//! Cooperative cancellation.
//!
//! Long-running entry points take a [`CancellationToken`] and check it at
//! iteration boundaries. Cancellation is never preemptive; a cancelled
//! operation returns [`Error::Cancelled`] and leaves element state unchanged.

pub use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Returns `Err(Error::Cancelled)` once `token` has been cancelled.
#[inline]
pub fn check_cancelled(token: &CancellationToken) -> Result<()> {
    if token.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}
