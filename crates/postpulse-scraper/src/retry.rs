//! Exponential backoff for browser start-up.
//!
//! Chromium launches fail transiently on loaded hosts (profile lock, slow
//! devtools handshake). Launch and protocol errors are retried; everything
//! else is returned on the first failure.

use std::future::Future;
use std::time::Duration;

use crate::error::ScraperError;

fn is_retriable(err: &ScraperError) -> bool {
    matches!(
        err,
        ScraperError::BrowserLaunch(_) | ScraperError::Browser(_)
    )
}

/// Runs `operation`, retrying retriable errors up to `max_retries` extra times.
///
/// The sleep before retry `k` (1-based) is `backoff_base_secs * 2^(k-1)`
/// seconds, so `max_retries = 2` with base 2 waits 2 s then 4 s.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_secs: u64,
    mut operation: F,
) -> Result<T, ScraperError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ScraperError>>,
{
    let mut attempt = 0u32;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !is_retriable(&err) || attempt >= max_retries {
            return Err(err);
        }

        let delay_secs = backoff_base_secs.saturating_mul(1u64 << attempt.min(62));
        tracing::warn!(
            attempt,
            max_retries,
            delay_secs,
            error = %err,
            "browser start failed, retrying after backoff"
        );
        tokio::time::sleep(Duration::from_secs(delay_secs)).await;
        attempt += 1;
    }
}
