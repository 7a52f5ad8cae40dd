//! Exponential backoff for the recovery worker
//!
//! Resolution itself is never retried: a failed archive lookup is returned to
//! the caller as-is. Only the background copy of a legacy file goes through
//! [`fetch_with_retry`], which backs off on transient failures.
//!
//! # Example
//!
//! ```no_run
//! use dataset_dl::config::RetryConfig;
//! use dataset_dl::retry::fetch_with_retry;
//! use dataset_dl::Error;
//!
//! # async fn example() -> Result<(), Error> {
//! let config = RetryConfig::default();
//! let body = fetch_with_retry(&config, || async {
//!     Ok::<_, Error>(b"payload".to_vec())
//! })
//! .await?;
//! # let _ = body;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Classifies errors as transient (worth another attempt) or permanent
pub trait IsRetryable {
    /// Returns true if the operation should be attempted again
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            // Server-side trouble or throttling; 4xx means the file is gone
            Error::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Config { .. }
            | Error::Auth(_)
            | Error::Validation(_)
            | Error::Resolve(_)
            | Error::Persistence(_)
            | Error::Database(_)
            | Error::Sqlx(_)
            | Error::ExternalService(_)
            | Error::NotFound(_)
            | Error::ShuttingDown
            | Error::Serialization(_)
            | Error::ApiServerError(_)
            | Error::Other(_) => false,
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or retries run out
///
/// Makes at most `config.max_attempts + 1` calls. Delays start at
/// `initial_delay`, grow by `backoff_multiplier` and are capped at `max_delay`.
pub async fn fetch_with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut retries = 0;
    let mut delay = config.initial_delay;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if retries > 0 {
                    tracing::info!(attempts = retries + 1, "Fetch succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !err.is_retryable() {
            tracing::error!(error = %err, "Fetch failed with permanent error");
            return Err(err);
        }
        if retries >= config.max_attempts {
            tracing::error!(error = %err, attempts = retries + 1, "Fetch failed, retries exhausted");
            return Err(err);
        }

        retries += 1;
        let wait = if config.jitter { add_jitter(delay) } else { delay };
        tracing::warn!(
            error = %err,
            attempt = retries,
            max_attempts = config.max_attempts,
            delay_ms = wait.as_millis() as u64,
            "Fetch failed, retrying"
        );
        tokio::time::sleep(wait).await;

        delay = next_delay(delay, config);
    }
}

fn next_delay(delay: Duration, config: &RetryConfig) -> Duration {
    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier).min(config.max_delay)
}

/// Stretch `delay` by a random factor in `[1.0, 2.0]`
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(1.0..=2.0);
    Duration::from_secs_f64(delay.as_secs_f64() * factor)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    fn upstream(status: u16) -> Error {
        Error::HttpStatus {
            url: "https://legacy.example/file.zip".to_string(),
            status,
        }
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result = fetch_with_retry(&fast_config(3), || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>("body")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "body");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result = fetch_with_retry(&fast_config(3), || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(upstream(503))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result = fetch_with_retry(&fast_config(2), || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(upstream(502))
            }
        })
        .await;

        assert!(matches!(result, Err(Error::HttpStatus { status: 502, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3, "initial call + 2 retries");
    }

    #[tokio::test]
    async fn test_missing_file_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result = fetch_with_retry(&fast_config(5), || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(upstream(404))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backoff_waits_between_attempts() {
        let start = std::time::Instant::now();

        let _ = fetch_with_retry(&fast_config(3), || async { Err::<(), _>(upstream(500)) }).await;

        // 10ms + 20ms + 40ms
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(70), "waited {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(2), "waited {:?}", elapsed);
    }

    #[test]
    fn test_next_delay_is_capped() {
        let config = RetryConfig {
            max_delay: Duration::from_secs(3),
            backoff_multiplier: 10.0,
            ..fast_config(5)
        };

        assert_eq!(
            next_delay(Duration::from_secs(1), &config),
            Duration::from_secs(3)
        );
        assert_eq!(
            next_delay(Duration::from_millis(100), &config),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_jitter_bounds() {
        let delay = Duration::from_millis(50);
        for _ in 0..200 {
            let jittered = add_jitter(delay);
            assert!(jittered >= delay);
            assert!(jittered <= delay * 2);
        }
    }

    #[test]
    fn test_error_classification() {
        use crate::error::{DatabaseError, ResolveError};
        use crate::types::DatasetId;

        assert!(upstream(500).is_retryable());
        assert!(upstream(429).is_retryable());
        assert!(!upstream(404).is_retryable());
        assert!(!upstream(403).is_retryable());

        assert!(Error::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "t")).is_retryable());
        assert!(!Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "n")).is_retryable());

        assert!(!Error::Database(DatabaseError::QueryFailed("q".into())).is_retryable());
        assert!(
            !Error::Resolve(ResolveError::ArchiveMediaMissing {
                dataset_id: DatasetId(1)
            })
            .is_retryable()
        );
        assert!(!Error::ShuttingDown.is_retryable());
    }
}
