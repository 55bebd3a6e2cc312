//! Browser session lifecycle: launch, login, liveness checks, release.

mod state_file;

pub use state_file::{load_snapshot, save_snapshot, SessionSnapshot, StoredCookie};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use postpulse_core::SelectorConfig;

use crate::browser::{any_present, wait_for_any, BrowserLauncher, BrowserPage};
use crate::error::ScraperError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unstarted,
    Started,
    LoggedIn,
    LoginFailed,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SessionState::Unstarted => "unstarted",
            SessionState::Started => "started",
            SessionState::LoggedIn => "logged_in",
            SessionState::LoginFailed => "login_failed",
            SessionState::Closed => "closed",
        };
        f.write_str(label)
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[redacted]")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub credentials: Option<Credentials>,
    /// Where the logged-in session is persisted; `None` disables persistence.
    pub state_path: Option<PathBuf>,
    /// Pause after a navigation before inspecting the page.
    pub page_settle: Duration,
    /// How long to wait for the login form and for the post-submit feed.
    pub marker_timeout: Duration,
    /// How long to wait for a human to clear a CAPTCHA/2FA challenge.
    pub manual_verification_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            credentials: None,
            state_path: None,
            page_settle: Duration::from_secs(3),
            marker_timeout: Duration::from_secs(15),
            manual_verification_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Owns one browser and its login state.
///
/// `Unstarted -> Started -> {LoggedIn, LoginFailed} -> Closed`. Dropping a
/// manager that was never closed schedules the close on the current runtime.
pub struct SessionManager {
    launcher: Arc<dyn BrowserLauncher>,
    selectors: Arc<SelectorConfig>,
    options: SessionOptions,
    page: Option<Arc<dyn BrowserPage>>,
    state: SessionState,
    restored: bool,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        selectors: Arc<SelectorConfig>,
        options: SessionOptions,
    ) -> Self {
        Self {
            launcher,
            selectors,
            options,
            page: None,
            state: SessionState::Unstarted,
            restored: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The open page.
    ///
    /// # Errors
    ///
    /// [`ScraperError::NotStarted`] before `start` or after `close`.
    pub fn page(&self) -> Result<Arc<dyn BrowserPage>, ScraperError> {
        self.page.clone().ok_or(ScraperError::NotStarted)
    }

    /// Launch the browser and restore a persisted session if one exists.
    ///
    /// A persisted session that cannot be read is logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns the launch error, or [`ScraperError::NotStarted`] on a closed manager.
    pub async fn start(&mut self) -> Result<(), ScraperError> {
        match self.state {
            SessionState::Unstarted => {}
            SessionState::Closed => return Err(ScraperError::NotStarted),
            _ => return Ok(()),
        }

        let page = self.launcher.launch().await?;
        self.page = Some(Arc::clone(&page));
        self.state = SessionState::Started;

        if let Some(path) = self.options.state_path.clone() {
            match load_snapshot(&path).await {
                Ok(Some(snapshot)) => {
                    self.restore(page.as_ref(), &snapshot).await?;
                    self.restored = true;
                    tracing::info!(path = %path.display(), saved_at = %snapshot.saved_at, "restored persisted session");
                }
                Ok(None) => {
                    tracing::info!(path = %path.display(), "no persisted session, starting fresh");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring unreadable persisted session");
                }
            }
        }

        Ok(())
    }

    async fn restore(
        &self,
        page: &dyn BrowserPage,
        snapshot: &SessionSnapshot,
    ) -> Result<(), ScraperError> {
        let cookies: Vec<StoredCookie> = snapshot.live_cookies(Utc::now()).cloned().collect();
        page.set_cookies(&cookies).await?;
        if !snapshot.local_storage.is_empty() {
            page.goto(&self.selectors.site.feed_url).await?;
            page.set_local_storage(&snapshot.local_storage).await?;
        }
        Ok(())
    }

    /// Log in, reusing the persisted session unless `force` is set.
    ///
    /// With credentials the login form is submitted; a CAPTCHA/2FA challenge
    /// (or no credentials at all) falls back to polling for a manually
    /// completed login.
    ///
    /// # Errors
    ///
    /// [`ScraperError::Authentication`] when no logged-in page appears in time.
    pub async fn login(&mut self, force: bool) -> Result<(), ScraperError> {
        let page = self.page()?;
        let selectors = Arc::clone(&self.selectors);
        let session = &selectors.session;

        if !force && self.restored {
            page.goto(&selectors.site.feed_url).await?;
            tokio::time::sleep(self.options.page_settle).await;
            if any_present(page.as_ref(), &session.liveness_markers).await {
                tracing::info!("persisted session is still logged in");
                self.state = SessionState::LoggedIn;
                return Ok(());
            }
            tracing::info!("persisted session expired, logging in again");
        }

        page.goto(&selectors.site.login_url).await?;

        if let Some(credentials) = self.options.credentials.clone() {
            if let Err(e) = self.submit_credentials(page.as_ref(), &credentials).await {
                self.state = SessionState::LoginFailed;
                return Err(e);
            }
            if wait_for_any(
                page.as_ref(),
                &session.liveness_markers,
                self.options.marker_timeout,
                self.options.poll_interval,
            )
            .await
            {
                return self.logged_in(page.as_ref()).await;
            }
            if !any_present(page.as_ref(), &session.challenge_markers).await {
                return self.fail("login did not reach the feed and no challenge is shown");
            }
            tracing::warn!(
                timeout_secs = self.options.manual_verification_timeout.as_secs(),
                "CAPTCHA or 2FA challenge detected, waiting for manual verification"
            );
        } else {
            tracing::warn!(
                timeout_secs = self.options.manual_verification_timeout.as_secs(),
                "no credentials configured, waiting for a manual login"
            );
        }

        if wait_for_any(
            page.as_ref(),
            &session.liveness_markers,
            self.options.manual_verification_timeout,
            self.options.poll_interval,
        )
        .await
        {
            return self.logged_in(page.as_ref()).await;
        }

        self.fail("manual verification timed out")
    }

    async fn submit_credentials(
        &self,
        page: &dyn BrowserPage,
        credentials: &Credentials,
    ) -> Result<(), ScraperError> {
        let session = &self.selectors.session;
        let form_ready = wait_for_any(
            page,
            std::slice::from_ref(&session.username_input),
            self.options.marker_timeout,
            self.options.poll_interval,
        )
        .await;
        if !form_ready {
            return Err(ScraperError::Authentication(
                "login form did not appear".to_string(),
            ));
        }

        page.fill(&session.username_input, &credentials.email).await?;
        page.fill(&session.password_input, &credentials.password).await?;
        page.click(&session.submit_button).await?;
        tracing::info!("login submitted");
        Ok(())
    }

    async fn logged_in(&mut self, page: &dyn BrowserPage) -> Result<(), ScraperError> {
        self.state = SessionState::LoggedIn;
        tracing::info!("login successful");
        if let Err(e) = self.persist(page).await {
            tracing::warn!(error = %e, "failed to persist session state");
        }
        Ok(())
    }

    fn fail(&mut self, reason: &str) -> Result<(), ScraperError> {
        self.state = SessionState::LoginFailed;
        tracing::error!(reason, "login failed");
        Err(ScraperError::Authentication(reason.to_string()))
    }

    async fn persist(&self, page: &dyn BrowserPage) -> Result<(), ScraperError> {
        let Some(path) = &self.options.state_path else {
            return Ok(());
        };
        let snapshot = SessionSnapshot {
            saved_at: Utc::now(),
            cookies: page.cookies().await?,
            local_storage: page.local_storage().await?,
        };
        save_snapshot(path, &snapshot).await?;
        tracing::info!(path = %path.display(), "session state saved");
        Ok(())
    }

    /// Make sure the page is on the site and logged in, re-authenticating if
    /// the liveness marker is gone.
    ///
    /// # Errors
    ///
    /// Navigation errors, or [`ScraperError::Authentication`] from re-login.
    pub async fn ensure_logged_in(&mut self) -> Result<(), ScraperError> {
        let page = self.page()?;
        let selectors = Arc::clone(&self.selectors);
        let site = &selectors.site;

        let current = page.current_url().await.unwrap_or_default();
        if !on_site(&current, &site.feed_url) {
            page.goto(&site.feed_url).await?;
            tokio::time::sleep(self.options.page_settle).await;
        }

        if any_present(page.as_ref(), &selectors.session.liveness_markers).await {
            self.state = SessionState::LoggedIn;
            return Ok(());
        }

        tracing::info!("session is not logged in, re-authenticating");
        self.login(true).await
    }

    /// Release the browser. Safe to call repeatedly and after a failed start.
    pub async fn close(&mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                tracing::warn!(error = %e, "error while closing browser");
            }
        }
        self.state = SessionState::Closed;
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        let Some(page) = self.page.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = page.close().await {
                        tracing::warn!(error = %e, "error while closing abandoned browser");
                    }
                });
            }
            Err(_) => {
                tracing::warn!("browser session dropped outside a runtime; not closed");
            }
        }
    }
}

/// Whether `current` is on the same host as `site_url`.
fn on_site(current: &str, site_url: &str) -> bool {
    let host = |raw: &str| {
        url::Url::parse(raw)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
    };
    match (host(current), host(site_url)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
