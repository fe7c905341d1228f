//! # Error Types
//!
//! Every failure of the limiter is a plain return value. Nothing in this crate
//! retries internally, panics on bad input, or terminates the process.
//!
//! ```text
//!     create ──► InvalidArgument | ResourceExhausted | ShutDown | Spawn
//!     fetch  ──► InvalidArgument | StaleHandle | ShutDown | Timeout*
//!     return ──► InvalidArgument | StaleHandle
//!     destroy ─► StaleHandle
//!
//!     * only from fetch_timeout
//! ```

use super::registry::LimiterHandle;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by the token-bucket limiter.
#[derive(Debug, Error)]
pub enum LimiterError {
    /// A size, rate or capacity of zero was passed in.
    ///
    /// Detected before any state is touched, so the bucket is unchanged.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Every registry slot is occupied; no bucket was allocated.
    #[error("limiter registry is full ({capacity} slots in use)")]
    ResourceExhausted {
        /// The configured maximum number of live limiters.
        capacity: usize,
    },

    /// The handle refers to a bucket that has already been destroyed.
    #[error("limiter handle {0} is no longer registered")]
    StaleHandle(LimiterHandle),

    /// `fetch_timeout` gave up before a token became available.
    #[error("no token became available within {waited:?}")]
    Timeout {
        /// How long the caller waited.
        waited: Duration,
    },

    /// The limiter has been shut down and accepts no more work.
    #[error("rate limiter has been shut down")]
    ShutDown,

    /// The configuration was rejected at construction time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// The background refiller thread could not be started.
    #[error("failed to spawn refiller thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl LimiterError {
    /// Returns `true` for errors caused by misuse of a handle or argument,
    /// as opposed to the limiter's own state.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::StaleHandle(_))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LimiterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = LimiterError::ResourceExhausted { capacity: 4 };
        assert_eq!(err.to_string(), "limiter registry is full (4 slots in use)");

        let err = LimiterError::InvalidArgument("requested must be greater than 0");
        assert!(err.to_string().contains("requested must be greater than 0"));

        let err = LimiterError::StaleHandle(LimiterHandle::new(1, 3, 7));
        assert_eq!(err.to_string(), "limiter handle #3@7 is no longer registered");
    }

    #[test]
    fn test_caller_error_classification() {
        assert!(LimiterError::InvalidArgument("x").is_caller_error());
        assert!(LimiterError::StaleHandle(LimiterHandle::new(1, 0, 1)).is_caller_error());
        assert!(!LimiterError::ShutDown.is_caller_error());
        assert!(!LimiterError::ResourceExhausted { capacity: 1 }.is_caller_error());
    }

    #[test]
    fn test_spawn_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "no threads left");
        let err: LimiterError = io.into();
        assert!(matches!(err, LimiterError::Spawn(_)));
        assert!(err.to_string().contains("no threads left"));
    }
}
