//! Async token acquisition
use std::time::Duration;

use log::debug;
use tokio_util::sync::CancellationToken;

use super::{Limiter, Reservation};
use crate::{Error, Result};

impl Limiter {
    /// Wait until `n` tokens are available, then take them.
    ///
    /// Tokens are deducted in one step under the lock, so dropping this
    /// future at any await point leaves the bucket untouched.
    /// Fails right away if `n` exceeds the capacity.
    pub async fn acquire(&self, n: u32) -> Result<()> {
        loop {
            // Registered before looking at the state so a concurrent
            // `set_limits` between the check and the wait is not missed.
            let changed = self.changed.notified();
            match self.reserve(n)? {
                Reservation::Granted => return Ok(()),
                Reservation::Wait(wait) => {
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = changed => debug!("Limits changed while waiting for {n} tokens"),
                    }
                }
                Reservation::Stalled => {
                    debug!("Bucket does not refill, waiting for new limits");
                    changed.await;
                }
            }
        }
    }

    /// Like [`Limiter::acquire`], giving up with `Error::Cancelled` once
    /// `token` is cancelled. No tokens are taken on cancellation.
    pub async fn acquire_with_cancel(&self, n: u32, token: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(Error::Cancelled),
            res = self.acquire(n) => res,
        }
    }

    /// Like [`Limiter::acquire`], giving up with `Error::Timeout` after `timeout`.
    pub async fn acquire_timeout(&self, n: u32, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.acquire(n))
            .await
            .map_err(|_| Error::Timeout(timeout))?
    }
}
