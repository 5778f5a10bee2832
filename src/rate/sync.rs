//! Blocking token acquisition, for callers outside an async runtime.
use std::time::{Duration, Instant};

use log::debug;

use super::{Limiter, Reservation};
use crate::{Error, Result};

/// How often a thread waiting on a bucket that does not refill checks for new limits.
const STALLED_POLL_INTERVAL: Duration = Duration::from_millis(50);

impl Limiter {
    /// Park the current thread until `n` tokens are available, then take them.
    ///
    /// With `timeout` set, gives up with `Error::Timeout` once it elapses;
    /// nothing is deducted in that case.
    /// Must not be called from within an async task, use [`Limiter::acquire`] there.
    pub fn acquire_blocking(&self, n: u32, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let pause = match self.reserve(n)? {
                Reservation::Granted => return Ok(()),
                Reservation::Wait(wait) => wait,
                Reservation::Stalled => STALLED_POLL_INTERVAL,
            };
            let pause = match deadline {
                None => pause,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        // timeout is Some whenever deadline is
                        return Err(Error::Timeout(timeout.unwrap_or_default()));
                    }
                    pause.min(deadline - now)
                }
            };
            debug!("Blocking {pause:?} for {n} tokens");
            std::thread::sleep(pause);
        }
    }
}
