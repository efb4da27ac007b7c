//! Retry logic with exponential backoff for transient failures
//!
//! Reachability probes, session opens, and profile queries may fail due to
//! transient network issues or a momentarily busy WinRM service. Those
//! operations retry through this module. Profile deletion never retries: a
//! timed-out delete may have completed remotely, and a second attempt would
//! run against a half-removed profile.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not counting the initial attempt)
    pub max_retries: u32,
    /// Initial delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (typically 2.0)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a configuration with no retries (fail fast)
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_millis(0),
            max_delay: Duration::from_millis(0),
            backoff_multiplier: 1.0,
        }
    }

    /// Short-fuse configuration for reachability probes.
    ///
    /// A probe that needs more than one quick retry is treated as
    /// unreachable; the caller reports that as an outcome, not an error.
    pub fn probe() -> Self {
        Self {
            max_retries: 1,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        }
    }
}

/// Retry an async operation with exponential backoff
///
/// # Arguments
///
/// * `config` - Retry configuration
/// * `operation` - Async closure that returns Result<T, E>
/// * `is_retryable` - Function to determine if an error is worth retrying
///
/// # Example
///
/// ```ignore
/// use profilesweep::utils::retry::{retry_with_backoff, RetryConfig};
///
/// let result = retry_with_backoff(
///     RetryConfig::default(),
///     || async { session.list_profiles().await },
///     |err| is_transient_error(&err.to_string()),
/// ).await;
/// ```
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    config: RetryConfig,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                attempt += 1;

                // If we've exhausted retries or the error is not retryable, fail
                if attempt > config.max_retries || !is_retryable(&err) {
                    return Err(err);
                }

                tracing::debug!(
                    attempt,
                    max = config.max_retries + 1,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "transient failure, retrying"
                );

                sleep(delay).await;

                // Exponential backoff with jitter. Jitter prevents thundering
                // herd when many per-target operations fail simultaneously.
                let next_delay_ms = (delay.as_millis() as f64 * config.backoff_multiplier) as u64;
                let base_delay = Duration::from_millis(next_delay_ms).min(config.max_delay);

                // +-20% random jitter
                let mut rng = rand::thread_rng();
                let jitter_factor = rng.gen_range(0.8..=1.2);
                let jittered_delay_ms = (base_delay.as_millis() as f64 * jitter_factor) as u64;
                delay = Duration::from_millis(jittered_delay_ms);
            }
        }
    }
}

/// Determines if a WinRM/transport error is retryable
///
/// Retryable errors include:
/// - Connection timeouts
/// - Connection refused (WinRM service might be starting)
/// - Network unreachable (transient network issues)
/// - DNS resolution failures (transient)
/// - "WinRM service not responding" (temporary overload)
/// - RPC server unavailable (CIM endpoint restarting)
///
/// Non-retryable errors include:
/// - Authentication failures
/// - Access denied
/// - Server not found in TrustedHosts
/// - Invalid credentials
/// - Profile in use / loaded
pub fn is_transient_error(error_msg: &str) -> bool {
    let lowercase = error_msg.to_lowercase();

    let retryable_patterns = [
        "timeout",
        "timed out",
        "connection refused",
        "network unreachable",
        "no route to host",
        "temporarily unavailable",
        "service not responding",
        "connection reset",
        "broken pipe",
        "host is down",
        "dns",
        "name resolution",
        "could not resolve",
        "rpc server is unavailable",
    ];

    let non_retryable_patterns = [
        "access denied",
        "access is denied",
        "invalid credentials",
        "authentication failed",
        "trustedhosts",
        "logon failure",
        "permission denied",
        "unauthorized",
        "profile is loaded",
        "profile is in use",
    ];

    // Non-retryable patterns win when both match
    for pattern in &non_retryable_patterns {
        if lowercase.contains(pattern) {
            return false;
        }
    }

    for pattern in &retryable_patterns {
        if lowercase.contains(pattern) {
            return true;
        }
    }

    // Default to non-retryable for unknown errors
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.initial_delay, Duration::from_millis(500));
        assert_eq!(config.max_delay, Duration::from_secs(5));
        assert_eq!(config.backoff_multiplier, 2.0);
    }

    #[test]
    fn test_no_retry_config() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn test_probe_config() {
        let config = RetryConfig::probe();
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.initial_delay, Duration::from_millis(200));
    }

    #[test]
    fn test_is_transient_error_retryable() {
        assert!(is_transient_error("Connection timeout"));
        assert!(is_transient_error("Connection timed out"));
        assert!(is_transient_error("Connection refused"));
        assert!(is_transient_error("Network unreachable"));
        assert!(is_transient_error("WinRM service not responding"));
        assert!(is_transient_error("The RPC server is unavailable"));
        assert!(is_transient_error("Could not resolve hostname"));
    }

    #[test]
    fn test_is_transient_error_non_retryable() {
        assert!(!is_transient_error("Access denied"));
        assert!(!is_transient_error("Access is denied"));
        assert!(!is_transient_error("Invalid credentials"));
        assert!(!is_transient_error("Authentication failed"));
        assert!(!is_transient_error("Server not in TrustedHosts"));
        assert!(!is_transient_error("Logon failure"));
        assert!(!is_transient_error("The profile is in use by another process"));
    }

    #[test]
    fn test_is_transient_error_case_insensitive() {
        assert!(is_transient_error("CONNECTION TIMEOUT"));
        assert!(!is_transient_error("ACCESS DENIED"));
    }

    #[test]
    fn test_is_transient_error_unknown() {
        // Unknown errors should not be retried
        assert!(!is_transient_error("Something went wrong"));
        assert!(!is_transient_error("Unknown error"));
    }

    #[test]
    fn test_non_retryable_wins_over_retryable() {
        // "timed out" and "access denied" both present: do not retry
        assert!(!is_transient_error("Access denied after request timed out"));
    }

    #[tokio::test]
    async fn test_retry_succeeds_on_first_attempt() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let call_count = AtomicU32::new(0);
        let result = retry_with_backoff(
            RetryConfig::default(),
            || {
                call_count.fetch_add(1, Ordering::SeqCst);
                async { Ok::<i32, String>(42) }
            },
            |_: &String| true,
        )
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let call_count = AtomicU32::new(0);
        let result = retry_with_backoff(
            RetryConfig::default(),
            || {
                let count = call_count.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if count < 3 {
                        Err("Connection timeout".to_string())
                    } else {
                        Ok::<i32, String>(42)
                    }
                }
            },
            |e: &String| is_transient_error(e),
        )
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_fails_after_max_retries() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let call_count = AtomicU32::new(0);
        let config = RetryConfig {
            max_retries: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            backoff_multiplier: 2.0,
        };

        let result = retry_with_backoff(
            config,
            || {
                call_count.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, String>("Connection timeout".to_string()) }
            },
            |e: &String| is_transient_error(e),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(call_count.load(Ordering::SeqCst), 3); // Initial + 2 retries
    }

    #[tokio::test]
    async fn test_retry_fails_on_non_retryable_error() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let call_count = AtomicU32::new(0);
        let result = retry_with_backoff(
            RetryConfig::default(),
            || {
                call_count.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, String>("Access denied".to_string()) }
            },
            |e: &String| is_transient_error(e),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(call_count.load(Ordering::SeqCst), 1); // No retries for auth errors
    }

    #[tokio::test]
    async fn test_no_retry_config_async() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let call_count = AtomicU32::new(0);
        let result = retry_with_backoff(
            RetryConfig::no_retry(),
            || {
                call_count.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, String>("Connection timeout".to_string()) }
            },
            |e: &String| is_transient_error(e),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(call_count.load(Ordering::SeqCst), 1); // No retries
    }
}
