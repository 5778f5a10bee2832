use std::io;
use std::time::Duration;

/// Errors in tagvisor
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network, authorization or any other provider failure that is not a rate limit.
    #[error("Transport: {0}")]
    Transport(String),
    /// The provider rejected the call because the allowed call rate was exceeded.
    #[error("Throttled by provider: {0}")]
    Throttle(String),
    #[error("Configure: {0}")]
    Config(String),
    /// The request can never be satisfied by the limiter as configured.
    #[error("Rate limiter: {0}")]
    Limiter(String),
    #[error("Token acquisition cancelled")]
    Cancelled,
    #[error("Token acquisition timed out after {0:?}")]
    Timeout(Duration),
    #[error("Fail to decode payload: {0}")]
    Decode(String),
    #[error("Filesys I/O: {0}")]
    Io(#[from] io::Error),
    #[error("Reconcile task: {0}")]
    Task(String),
}

impl Error {
    /// Whether this error is the provider telling us to slow down.
    pub fn is_throttle(&self) -> bool {
        matches!(self, Error::Throttle(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Format an error message as a `Config` error
#[macro_export]
macro_rules! err_config {
    ($($fmt_args:tt)*) => {
        $crate::Error::Config(
            format!(
                "{} ({}:{})",
                // Note: the format string needs to be unmodified (e.g. by `concat!()`)
                // for implicit formatting arguments to work
                format_args!($($fmt_args)*),
                module_path!(),
                line!(),
            )
        )
    };
}
