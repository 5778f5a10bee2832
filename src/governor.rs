//! Rate-governed calls against a provider API.
//!
//! A [`Governor`] takes one token from its [`Limiter`] before every call. When
//! the call fails with an error its throttle predicate recognises, the
//! limiter is reset so that every caller sharing it, including the retry the
//! caller is about to schedule, backs off at once.
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use crate::rate::Limiter;
use crate::{Error, Result};

/// Decides whether an error is the provider asking us to slow down.
pub type ThrottlePredicate = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// Error codes AWS services answer with when a caller exceeds its request rate.
pub const DEFAULT_THROTTLE_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "RequestThrottledException",
    "TooManyRequestsException",
    "ProvisionedThroughputExceededException",
    "TransactionInProgressException",
    "RequestLimitExceeded",
    "BandwidthLimitExceeded",
    "LimitExceededException",
    "RequestThrottled",
    "SlowDown",
    "PriorRequestNotComplete",
    "EC2ThrottledException",
];

/// ThrottleCodes is the set of provider error codes that signal throttling.
///
/// Provider adapters use [`ThrottleCodes::classify`] to turn a coded API
/// failure into `Error::Throttle` or `Error::Transport`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleCodes(BTreeSet<String>);

impl Default for ThrottleCodes {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_CODES.iter().copied())
    }
}

impl ThrottleCodes {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(codes.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    /// Map a provider error `code` to the crate's error taxonomy.
    /// The message keeps the code as its prefix, e.g. `Throttling: Rate exceeded`.
    pub fn classify(&self, code: &str, message: &str) -> Error {
        let msg = format!("{code}: {message}");
        if self.contains(code) {
            Error::Throttle(msg)
        } else {
            Error::Transport(msg)
        }
    }

    /// A predicate matching `Error::Throttle`, and transport errors whose
    /// message starts with one of the codes.
    pub fn predicate(&self) -> ThrottlePredicate {
        let codes = self.clone();
        Arc::new(move |e: &Error| match e {
            Error::Throttle(_) => true,
            Error::Transport(msg) => msg
                .split(':')
                .next()
                .map(|code| codes.contains(code.trim()))
                .unwrap_or(false),
            _ => false,
        })
    }
}

/// Governor meters calls through a shared [`Limiter`].
///
/// Cloning is cheap and clones share the same limiter, so one governor per
/// governed API class can be handed to every worker.
#[derive(Clone)]
pub struct Governor {
    limiter: Arc<Limiter>,
    is_throttle: ThrottlePredicate,
    acquire_timeout: Option<Duration>,
}

impl fmt::Debug for Governor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Governor")
            .field("limiter", &self.limiter)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish_non_exhaustive()
    }
}

impl Governor {
    /// Governor treating `Error::Throttle` as the throttle signal.
    pub fn new(limiter: Arc<Limiter>) -> Self {
        Self {
            limiter,
            is_throttle: Arc::new(Error::is_throttle),
            acquire_timeout: None,
        }
    }

    pub fn with_throttle_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Error) -> bool + Send + Sync + 'static,
    {
        self.is_throttle = Arc::new(predicate);
        self
    }

    pub fn with_shared_predicate(mut self, predicate: ThrottlePredicate) -> Self {
        self.is_throttle = predicate;
        self
    }

    /// Bound how long a call may wait for its token.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    pub fn limiter(&self) -> &Arc<Limiter> {
        &self.limiter
    }

    pub fn is_throttle(&self, e: &Error) -> bool {
        (self.is_throttle)(e)
    }

    async fn acquire(&self) -> Result<()> {
        match self.acquire_timeout {
            Some(timeout) => self.limiter.acquire_timeout(1, timeout).await,
            None => self.limiter.acquire(1).await,
        }
    }

    /// Take a token, then run `op`.
    ///
    /// A throttled result resets the limiter before the error is handed back
    /// unchanged. Never retries.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.acquire().await?;
        self.run(op).await
    }

    /// Like [`Governor::call`], abandoning the wait for a token with
    /// `Error::Cancelled` once `token` is cancelled. `op` is not run then.
    pub async fn call_with_cancel<T, F, Fut>(&self, token: &CancellationToken, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = token.cancelled() => return Err(Error::Cancelled),
            res = self.acquire() => res?,
        }
        self.run(op).await
    }

    async fn run<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match op().await {
            Err(e) if self.is_throttle(&e) => {
                warn!("Provider throttled the call, draining the rate limiter: {e}");
                self.limiter.reset();
                Err(e)
            }
            Err(e) => {
                debug!("Governed call failed: {e}");
                Err(e)
            }
            ok => ok,
        }
    }
}
