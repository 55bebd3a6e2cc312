//! Profile and hashtag scrapes composed from session, scrolling, and
//! extraction.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use postpulse_core::{canonical_profile_url, dedupe_by_text, normalize_hashtag, Post, SelectorConfig};

use crate::browser::BrowserPage;
use crate::count::parse_count;
use crate::error::ScraperError;
use crate::extract::{extract_posts, CompiledSelectors, RawPost};
use crate::scroll::{load_until, ScrollPolicy};
use crate::session::SessionManager;

#[derive(Debug, Clone, Copy)]
pub struct ScrapeSettings {
    pub scroll: ScrollPolicy,
    /// Pause after navigations and clicks for the page to render.
    pub page_settle: Duration,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            scroll: ScrollPolicy::default(),
            page_settle: Duration::from_secs(4),
        }
    }
}

/// Runs scrapes on a logged-in [`SessionManager`].
///
/// Only authentication failures are returned as errors. Navigation and
/// extraction problems are logged and produce an empty list.
#[derive(Debug, Clone)]
pub struct FeedScraper {
    selectors: Arc<SelectorConfig>,
    compiled: Arc<CompiledSelectors>,
    settings: ScrapeSettings,
}

impl FeedScraper {
    #[must_use]
    pub fn new(selectors: Arc<SelectorConfig>, settings: ScrapeSettings) -> Self {
        let compiled = Arc::new(CompiledSelectors::compile(&selectors));
        Self {
            selectors,
            compiled,
            settings,
        }
    }

    /// Up to `n` distinct posts from a profile's activity feed.
    ///
    /// # Errors
    ///
    /// [`ScraperError::Authentication`] if the session cannot be logged in.
    pub async fn scrape_profile_posts(
        &self,
        session: &mut SessionManager,
        profile_url: &str,
        n: usize,
    ) -> Result<Vec<Post>, ScraperError> {
        let result = self.try_profile(session, profile_url, n).await;
        degrade(result, "profile", profile_url)
    }

    /// Up to `n` distinct posts from a hashtag feed.
    ///
    /// # Errors
    ///
    /// [`ScraperError::Authentication`] if the session cannot be logged in.
    pub async fn scrape_hashtag_posts(
        &self,
        session: &mut SessionManager,
        hashtag: &str,
        n: usize,
    ) -> Result<Vec<Post>, ScraperError> {
        let Some(tag) = normalize_hashtag(hashtag) else {
            tracing::warn!(hashtag, "not a usable hashtag, nothing to scrape");
            return Ok(Vec::new());
        };
        let result = self.try_hashtag(session, &tag, n).await;
        degrade(result, "hashtag", &tag)
    }

    async fn try_profile(
        &self,
        session: &mut SessionManager,
        profile_url: &str,
        n: usize,
    ) -> Result<Vec<Post>, ScraperError> {
        session.ensure_logged_in().await?;
        let page = session.page()?;
        let canonical = canonical_profile_url(profile_url);

        tracing::info!(profile_url = %canonical, n, "scraping profile posts");
        page.goto(&canonical).await?;
        tokio::time::sleep(self.settings.page_settle).await;

        if !self.open_all_posts(page.as_ref()).await {
            tracing::warn!(profile_url = %canonical, "all-posts page not found, scraping the profile page");
        }

        let raw = self.load_and_extract(page.as_ref(), n).await?;
        let scraped_at = Utc::now();
        let posts = raw
            .into_iter()
            .map(|r| {
                let (likes, comments, reposts) = counters(&r);
                Post::from_profile(r.text, likes, comments, reposts, scraped_at, canonical.clone())
            })
            .collect();

        Ok(finalize(posts, n))
    }

    async fn try_hashtag(
        &self,
        session: &mut SessionManager,
        tag: &str,
        n: usize,
    ) -> Result<Vec<Post>, ScraperError> {
        session.ensure_logged_in().await?;
        let page = session.page()?;
        let site = &self.selectors.site;
        let encoded = utf8_percent_encode(tag, NON_ALPHANUMERIC).to_string();

        tracing::info!(hashtag = tag, n, "scraping hashtag posts");
        page.goto(&self.selectors.hashtag_url(&encoded)).await?;
        tokio::time::sleep(self.settings.page_settle).await;

        let landed = page.current_url().await.unwrap_or_default();
        if !landed.contains(&site.hashtag_url_marker) {
            tracing::info!(hashtag = tag, landed = %landed, "hashtag feed unavailable, using content search");
            page.goto(&self.selectors.hashtag_search_url(&encoded)).await?;
            tokio::time::sleep(self.settings.page_settle).await;
        }

        let raw = self.load_and_extract(page.as_ref(), n).await?;
        let scraped_at = Utc::now();
        let posts = raw
            .into_iter()
            .map(|r| {
                let (likes, comments, reposts) = counters(&r);
                Post::from_hashtag(r.text, likes, comments, reposts, scraped_at, tag)
            })
            .collect();

        Ok(finalize(posts, n))
    }

    /// Follow the profile's "show all posts" link. Returns `true` once the
    /// posts sub-page is open.
    async fn open_all_posts(&self, page: &dyn BrowserPage) -> bool {
        let nav = &self.selectors.profile;
        for selector in &nav.posts_link_selectors {
            match page.click_with_text(selector, &nav.posts_link_text).await {
                Ok(true) => {
                    tokio::time::sleep(self.settings.page_settle).await;
                    let url = page.current_url().await.unwrap_or_default();
                    if url.contains(&nav.posts_url_marker) {
                        tracing::debug!(selector = %selector, "opened all-posts page");
                        return true;
                    }
                    tracing::debug!(selector = %selector, url = %url, "link clicked but posts page did not open");
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!(selector = %selector, error = %e, "posts link lookup failed");
                }
            }
        }
        false
    }

    async fn load_and_extract(
        &self,
        page: &dyn BrowserPage,
        n: usize,
    ) -> Result<Vec<RawPost>, ScraperError> {
        let visible = load_until(
            page,
            &self.selectors.post_containers,
            n,
            &self.settings.scroll,
        )
        .await;
        if visible == 0 {
            tracing::info!("no posts visible after scrolling");
            return Ok(Vec::new());
        }

        let html = page.content().await?;
        let raw = extract_posts(&html, &self.compiled, visible.max(n));
        tracing::debug!(visible, extracted = raw.len(), "extracted posts");
        Ok(raw)
    }
}

fn counters(raw: &RawPost) -> (u64, u64, u64) {
    let parse = |text: Option<&str>| text.map_or(0, parse_count);
    (
        parse(raw.likes_text.as_deref()),
        parse(raw.comments_text.as_deref()),
        parse(raw.reposts_text.as_deref()),
    )
}

fn finalize(posts: Vec<Post>, n: usize) -> Vec<Post> {
    let mut posts = dedupe_by_text(posts);
    posts.truncate(n);
    posts
}

fn degrade(
    result: Result<Vec<Post>, ScraperError>,
    kind: &'static str,
    identifier: &str,
) -> Result<Vec<Post>, ScraperError> {
    match result {
        Ok(posts) => {
            tracing::info!(kind, identifier, scraped = posts.len(), "scrape finished");
            Ok(posts)
        }
        Err(e) if e.is_authentication() => Err(e),
        Err(e) => {
            tracing::warn!(kind, identifier, error = %e, "scrape failed, returning no posts");
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;
