//! Incremental feed loading by scrolling.

use std::time::Duration;

use crate::browser::{count_first_match, BrowserPage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollPolicy {
    /// Wait after each scroll for lazy-loaded posts to render.
    pub settle: Duration,
    pub max_iterations: usize,
    /// Consecutive scrolls without page-height growth before giving up.
    pub max_stalls: usize,
}

impl Default for ScrollPolicy {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(3),
            max_iterations: 20,
            max_stalls: 3,
        }
    }
}

impl ScrollPolicy {
    #[must_use]
    pub fn with_settle(settle: Duration) -> Self {
        Self {
            settle,
            ..Self::default()
        }
    }
}

/// Scroll until `target` posts are visible, the iteration budget runs out,
/// or the page stops growing. Returns the highest visible count observed.
///
/// A failed browser call inside an iteration counts as a stall rather than
/// aborting the load.
pub async fn load_until(
    page: &dyn BrowserPage,
    container_selectors: &[String],
    target: usize,
    policy: &ScrollPolicy,
) -> usize {
    let mut visible = count_first_match(page, container_selectors).await;
    if visible >= target {
        return visible;
    }

    let mut last_height = page.scroll_height().await.unwrap_or(0);
    let mut stalls = 0usize;

    for iteration in 1..=policy.max_iterations {
        if let Err(e) = page.scroll_to_bottom().await {
            tracing::warn!(iteration, error = %e, "scroll failed");
        }
        tokio::time::sleep(policy.settle).await;

        visible = visible.max(count_first_match(page, container_selectors).await);
        tracing::debug!(iteration, visible, target, "scrolled feed");
        if visible >= target {
            break;
        }

        let height = match page.scroll_height().await {
            Ok(height) => height,
            Err(e) => {
                tracing::warn!(iteration, error = %e, "reading page height failed");
                last_height
            }
        };
        if height > last_height {
            stalls = 0;
            last_height = height;
        } else {
            stalls += 1;
            if stalls >= policy.max_stalls {
                tracing::debug!(iteration, visible, "feed stopped growing");
                break;
            }
        }
    }

    visible
}
