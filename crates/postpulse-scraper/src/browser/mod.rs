//! The browser seam.
//!
//! Session handling, scrolling, and navigation talk to a [`BrowserPage`];
//! [`chromium`] drives a real Chromium over CDP and tests swap in a scripted
//! page.

pub mod chromium;

#[cfg(test)]
pub(crate) mod fake;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ScraperError;
use crate::session::StoredCookie;

/// One open tab in a browser the page owns. Closing the page releases the
/// whole browser.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigate and wait for the load to finish.
    async fn goto(&self, url: &str) -> Result<(), ScraperError>;

    async fn current_url(&self) -> Result<String, ScraperError>;

    /// Serialized DOM of the current document.
    async fn content(&self) -> Result<String, ScraperError>;

    /// Number of elements matching a CSS selector.
    async fn count(&self, selector: &str) -> Result<usize, ScraperError>;

    async fn fill(&self, selector: &str, value: &str) -> Result<(), ScraperError>;

    async fn click(&self, selector: &str) -> Result<(), ScraperError>;

    /// Click the first element matching `selector` whose visible text
    /// contains `needle` (case-insensitive). Returns `false` if none matched.
    async fn click_with_text(&self, selector: &str, needle: &str) -> Result<bool, ScraperError>;

    async fn scroll_to_bottom(&self) -> Result<(), ScraperError>;

    async fn scroll_height(&self) -> Result<u64, ScraperError>;

    async fn cookies(&self) -> Result<Vec<StoredCookie>, ScraperError>;

    async fn set_cookies(&self, cookies: &[StoredCookie]) -> Result<(), ScraperError>;

    /// `localStorage` of the current origin.
    async fn local_storage(&self) -> Result<BTreeMap<String, String>, ScraperError>;

    async fn set_local_storage(&self, entries: &BTreeMap<String, String>)
        -> Result<(), ScraperError>;

    /// Release the browser. Calling this more than once is harmless.
    async fn close(&self) -> Result<(), ScraperError>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn BrowserPage>, ScraperError>;
}

/// Match count of the first selector in `selectors` that matches anything.
///
/// Selector errors count as zero matches.
pub async fn count_first_match(page: &dyn BrowserPage, selectors: &[String]) -> usize {
    for selector in selectors {
        match page.count(selector).await {
            Ok(0) => {}
            Ok(n) => return n,
            Err(e) => {
                tracing::debug!(selector = %selector, error = %e, "selector count failed");
            }
        }
    }
    0
}

pub async fn any_present(page: &dyn BrowserPage, selectors: &[String]) -> bool {
    count_first_match(page, selectors).await > 0
}

/// Poll until any of `selectors` is present or `timeout` elapses.
pub async fn wait_for_any(
    page: &dyn BrowserPage,
    selectors: &[String],
    timeout: Duration,
    poll_interval: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if any_present(page, selectors).await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(poll_interval).await;
    }
}
