//! Token bucket rate limiter.
//!
//! A [`Limiter`] holds up to `capacity` tokens and replenishes them at
//! `refill_rate` tokens per second. Refill is computed lazily on every
//! access, so no background task is needed. All accounting happens under a
//! single mutex which is never held across an `.await`.
//!
//! Acquisition comes in three flavours:
//! - [`Limiter::try_acquire`], non-blocking;
//! - [`Limiter::acquire`] and friends (see `wait.rs`), which suspend the task;
//! - [`Limiter::acquire_blocking`] (see `sync.rs`), which parks the thread.
//!
//! [`Limiter::reset`] drains the bucket. It is the penalty applied when the
//! provider reports throttling: whatever the bucket held, the next caller
//! has to wait for a full refill of the tokens it needs.
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, error};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::config::GovernorConfig;
use crate::{err_config, Error, Result};

pub mod sync;
pub mod wait;

/// Longest single wait a reservation asks for before looking at the bucket again.
pub(crate) const MAX_WAIT: Duration = Duration::from_secs(3600);

#[derive(Debug)]
struct LimiterState {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl LimiterState {
    /// Accrue tokens for the time elapsed since the last accounting update.
    fn advance(&mut self, now: Instant) {
        if now > self.last_refill {
            let elapsed = now.duration_since(self.last_refill).as_secs_f64();
            self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
            self.last_refill = now;
        }
    }
}

/// Outcome of a single reservation attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Reservation {
    /// Tokens were deducted.
    Granted,
    /// Not enough tokens; retry after this long at the current rate.
    Wait(Duration),
    /// Not enough tokens and the bucket does not refill.
    Stalled,
}

#[derive(Debug)]
pub struct Limiter {
    state: Mutex<LimiterState>,
    // wakes waiters when the limits change
    changed: Notify,
}

fn check_limits(capacity: f64, refill_rate: f64) -> Result<()> {
    if !capacity.is_finite() || capacity <= 0.0 {
        let e = err_config!("Capacity must be a positive number, got {capacity}");
        error!("{e}");
        return Err(e);
    }
    if !refill_rate.is_finite() || refill_rate < 0.0 {
        let e = err_config!("Refill rate must be a non-negative number, got {refill_rate}");
        error!("{e}");
        return Err(e);
    }
    Ok(())
}

impl Limiter {
    /// Create a full bucket holding `capacity` tokens and refilling
    /// `refill_rate` tokens per second.
    ///
    /// A refill rate of zero freezes the bucket: once drained it only
    /// recovers through [`Limiter::set_limits`].
    pub fn new(capacity: f64, refill_rate: f64) -> Result<Self> {
        check_limits(capacity, refill_rate)?;
        Ok(Self {
            state: Mutex::new(LimiterState {
                capacity,
                refill_rate,
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            changed: Notify::new(),
        })
    }

    pub fn from_config(config: &GovernorConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.capacity, config.refill_rate)
    }

    // The state is a handful of floats that are always left consistent,
    // so a poisoned lock is still safe to use.
    fn state(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take `n` tokens if they are available right now.
    /// Leaves the bucket untouched and returns false otherwise.
    pub fn try_acquire(&self, n: u32) -> bool {
        let mut state = self.state();
        state.advance(Instant::now());
        let n = n as f64;
        if state.tokens >= n {
            state.tokens -= n;
            true
        } else {
            false
        }
    }

    /// One reservation attempt shared by the async and blocking paths.
    pub(crate) fn reserve(&self, n: u32) -> Result<Reservation> {
        if n == 0 {
            return Ok(Reservation::Granted);
        }
        let mut state = self.state();
        let wanted = n as f64;
        if wanted > state.capacity {
            let msg = format!(
                "Requested {n} tokens exceeds the bucket capacity {}",
                state.capacity
            );
            error!("{msg}");
            return Err(Error::Limiter(msg));
        }
        state.advance(Instant::now());
        if state.tokens >= wanted {
            state.tokens -= wanted;
            return Ok(Reservation::Granted);
        }
        if state.refill_rate > 0.0 {
            let deficit = wanted - state.tokens;
            // A tiny rate can overflow `Duration`; cap so waiters re-evaluate.
            let wait = Duration::try_from_secs_f64(deficit / state.refill_rate)
                .map(|w| w.min(MAX_WAIT))
                .unwrap_or(MAX_WAIT);
            debug!(
                "Short of {deficit:.3} tokens, waiting {wait:?} at {} tokens/s",
                state.refill_rate
            );
            Ok(Reservation::Wait(wait))
        } else {
            Ok(Reservation::Stalled)
        }
    }

    /// Drain the bucket.
    ///
    /// Tokens drop to zero whatever they were, and time elapsed before the
    /// reset does not count towards the next refill. Never blocks.
    pub fn reset(&self) {
        let mut state = self.state();
        state.tokens = 0.0;
        state.last_refill = Instant::now();
    }

    /// Change the burst capacity and refill rate.
    ///
    /// Tokens accrued so far are credited at the old rate, then clamped to
    /// the new capacity. Waiting acquisitions re-evaluate against the new limits.
    pub fn set_limits(&self, capacity: f64, refill_rate: f64) -> Result<()> {
        check_limits(capacity, refill_rate)?;
        {
            let mut state = self.state();
            state.advance(Instant::now());
            state.capacity = capacity;
            state.refill_rate = refill_rate;
            state.tokens = state.tokens.min(capacity);
        }
        self.changed.notify_waiters();
        Ok(())
    }

    /// Tokens currently available, after accounting for refill.
    pub fn tokens(&self) -> f64 {
        let mut state = self.state();
        state.advance(Instant::now());
        state.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.state().capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.state().refill_rate
    }
}
