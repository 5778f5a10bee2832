use std::sync::Arc;
use std::time::Duration;

use log::warn;

use crate::config::GovernorConfig;
use crate::governor::Governor;
use crate::rate::Limiter;
use crate::Result;

/// Builder for a [`Governor`] and the [`Limiter`] it owns.
#[derive(Debug, Clone, Default)]
pub struct GovernorOptions {
    config: GovernorConfig,
}

impl GovernorOptions {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn from_config(config: GovernorConfig) -> Self {
        Self { config }
    }

    pub fn validate(self) -> Result<Self> {
        self.config.validate()?;
        Ok(self)
    }

    /// Maximum burst.
    /// Default to 10 tokens.
    pub fn capacity(mut self, capacity: f64) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Sustained rate in tokens per second.
    /// Default to 5 tokens per second.
    pub fn refill_rate(mut self, rate: f64) -> Self {
        self.config.refill_rate = rate;
        self
    }

    /// Upper bound on the wait for a token, unbounded by default.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        let millis = timeout.as_millis();
        if millis == 0 {
            warn!("Acquire timeout {timeout:?} is below one millisecond");
        }
        self.config.acquire_timeout_ms = Some(millis.min(u64::MAX as u128) as u64);
        self
    }

    /// Provider error codes treated as throttling,
    /// replacing the default AWS list.
    pub fn throttle_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.throttle_codes = Some(codes.into_iter().map(|c| c.as_ref().into()).collect());
        self
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    /// Build a governor over a fresh limiter.
    pub fn build(&self) -> Result<Governor> {
        let limiter = Arc::new(Limiter::from_config(&self.config)?);
        Ok(self.build_with(limiter))
    }

    /// Build a governor over an existing limiter, e.g. one shared with
    /// another governor of the same API class. Only the predicate and
    /// the acquire timeout are taken from these options.
    pub fn build_with(&self, limiter: Arc<Limiter>) -> Governor {
        let governor =
            Governor::new(limiter).with_shared_predicate(self.config.throttle_codes().predicate());
        match self.config.acquire_timeout() {
            Some(timeout) => governor.with_acquire_timeout(timeout),
            None => governor,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Error;

    #[test]
    fn test_build_governor() {
        let governor = GovernorOptions::new()
            .capacity(4.0)
            .refill_rate(2.0)
            .acquire_timeout(Duration::from_secs(3))
            .throttle_codes(["SlowDown"])
            .validate()
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(governor.limiter().capacity(), 4.0);
        assert_eq!(governor.limiter().refill_rate(), 2.0);
        assert!(governor.is_throttle(&Error::Transport("SlowDown: please".into())));
        assert!(!governor.is_throttle(&Error::Transport("Throttling: x".into())));
    }

    #[test]
    fn test_invalid_options() {
        assert!(GovernorOptions::new().capacity(-1.0).validate().is_err());
        assert!(GovernorOptions::new().refill_rate(f64::NAN).build().is_err());
        assert!(GovernorOptions::new()
            .acquire_timeout(Duration::from_micros(10))
            .validate()
            .is_err());
    }

    #[test]
    fn test_shared_limiter() {
        let options = GovernorOptions::new().capacity(2.0).refill_rate(0.0);
        let first = options.build().unwrap();
        let second = options.build_with(Arc::clone(first.limiter()));
        assert!(first.limiter().try_acquire(1));
        assert!(second.limiter().try_acquire(1));
        assert!(!first.limiter().try_acquire(1));
    }
}
