//! Pooled scrape entry point used by the HTTP service and the CLI.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use postpulse_core::{AppConfig, Post, SelectorConfig};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::browser::chromium::ChromiumLauncher;
use crate::browser::BrowserLauncher;
use crate::error::ScraperError;
use crate::orchestrator::{FeedScraper, ScrapeSettings};
use crate::scroll::ScrollPolicy;
use crate::session::{Credentials, SessionManager, SessionOptions};

/// Source of freshly scraped posts.
#[async_trait]
pub trait ScrapeBackend: Send + Sync {
    async fn profile_posts(&self, profile_url: &str, n: usize) -> Result<Vec<Post>, ScraperError>;

    async fn hashtag_posts(&self, hashtag: &str, n: usize) -> Result<Vec<Post>, ScraperError>;
}

/// Runs each scrape in its own browser, with at most `max_sessions`
/// browsers alive at once.
pub struct BrowserScrapeService {
    launcher: Arc<dyn BrowserLauncher>,
    selectors: Arc<SelectorConfig>,
    session_options: SessionOptions,
    scraper: FeedScraper,
    permits: Arc<Semaphore>,
}

impl BrowserScrapeService {
    #[must_use]
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        selectors: Arc<SelectorConfig>,
        session_options: SessionOptions,
        settings: ScrapeSettings,
        max_sessions: usize,
    ) -> Self {
        let scraper = FeedScraper::new(Arc::clone(&selectors), settings);
        Self {
            launcher,
            selectors,
            session_options,
            scraper,
            permits: Arc::new(Semaphore::new(max_sessions.max(1))),
        }
    }

    /// Chromium-backed service configured from the environment.
    #[must_use]
    pub fn from_config(config: &AppConfig, selectors: Arc<SelectorConfig>) -> Self {
        let settle = Duration::from_millis(config.scroll_settle_ms);
        let credentials = match (&config.linkedin_email, &config.linkedin_password) {
            (Some(email), Some(password)) => Some(Credentials {
                email: email.clone(),
                password: password.clone(),
            }),
            _ => None,
        };
        let session_options = SessionOptions {
            credentials,
            state_path: Some(config.session_state_path.clone()),
            page_settle: settle,
            manual_verification_timeout: Duration::from_secs(
                config.manual_verification_timeout_secs,
            ),
            ..SessionOptions::default()
        };
        let settings = ScrapeSettings {
            scroll: ScrollPolicy::with_settle(settle),
            page_settle: settle,
        };

        Self::new(
            Arc::new(ChromiumLauncher::from_config(config)),
            selectors,
            session_options,
            settings,
            config.max_browser_sessions,
        )
    }

    async fn checkout(&self) -> Result<(OwnedSemaphorePermit, SessionManager), ScraperError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| ScraperError::BrowserLaunch("browser pool is shut down".to_string()))?;

        let mut session = SessionManager::new(
            Arc::clone(&self.launcher),
            Arc::clone(&self.selectors),
            self.session_options.clone(),
        );
        session.start().await?;
        Ok((permit, session))
    }

    /// Open a browser, log in (forcing a fresh login), and persist the session.
    ///
    /// # Errors
    ///
    /// Launch failures or [`ScraperError::Authentication`].
    pub async fn bootstrap_login(&self) -> Result<(), ScraperError> {
        let (_permit, mut session) = self.checkout().await?;
        let result = session.login(true).await;
        session.close().await;
        result
    }
}

#[async_trait]
impl ScrapeBackend for BrowserScrapeService {
    async fn profile_posts(&self, profile_url: &str, n: usize) -> Result<Vec<Post>, ScraperError> {
        let started = Instant::now();
        let (_permit, mut session) = self.checkout().await?;
        let result = self
            .scraper
            .scrape_profile_posts(&mut session, profile_url, n)
            .await;
        session.close().await;
        tracing::info!(
            profile_url,
            n,
            elapsed_ms = started.elapsed().as_millis(),
            ok = result.is_ok(),
            "profile scrape complete"
        );
        result
    }

    async fn hashtag_posts(&self, hashtag: &str, n: usize) -> Result<Vec<Post>, ScraperError> {
        let started = Instant::now();
        let (_permit, mut session) = self.checkout().await?;
        let result = self
            .scraper
            .scrape_hashtag_posts(&mut session, hashtag, n)
            .await;
        session.close().await;
        tracing::info!(
            hashtag,
            n,
            elapsed_ms = started.elapsed().as_millis(),
            ok = result.is_ok(),
            "hashtag scrape complete"
        );
        result
    }
}
