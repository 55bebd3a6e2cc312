//! Chromium over the DevTools protocol.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, TimeSinceEpoch};
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::{BrowserLauncher, BrowserPage};
use crate::error::ScraperError;
use crate::retry::retry_with_backoff;
use crate::session::StoredCookie;

const BROWSER_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-blink-features=AutomationControlled",
    "--disable-features=VizDisplayCompositor",
];

/// Well-known Chrome/Chromium install locations, checked when the default
/// launch fails.
const CHROME_CANDIDATES: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
];
const CHROME_BINARIES: &[&str] = &["google-chrome", "chromium", "chromium-browser", "chrome"];

#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    pub headless: bool,
    pub executable: Option<PathBuf>,
    pub user_agent: String,
    pub launch_retries: u32,
    pub backoff_base_secs: u64,
}

impl ChromiumLauncher {
    #[must_use]
    pub fn from_config(config: &postpulse_core::AppConfig) -> Self {
        Self {
            headless: config.browser_headless,
            executable: config.browser_executable.clone(),
            user_agent: config.browser_user_agent.clone(),
            launch_retries: config.browser_launch_retries,
            backoff_base_secs: config.browser_launch_backoff_base_secs,
        }
    }

    async fn launch_with(&self, executable: Option<&Path>) -> Result<ChromiumPage, ScraperError> {
        let mut builder = BrowserConfig::builder()
            .window_size(1920, 1080)
            .arg(format!("--user-agent={}", self.user_agent));
        for arg in BROWSER_ARGS {
            builder = builder.arg(*arg);
        }
        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(path) = executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(ScraperError::BrowserLaunch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScraperError::BrowserLaunch(e.to_string()))?;
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        match browser.new_page("about:blank").await {
            Ok(page) => Ok(ChromiumPage {
                page,
                browser: Mutex::new(Some(browser)),
                handler_task: std::sync::Mutex::new(Some(handler_task)),
            }),
            Err(e) => {
                handler_task.abort();
                Err(ScraperError::BrowserLaunch(format!("failed to open page: {e}")))
            }
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserPage>, ScraperError> {
        let configured = self.executable.as_deref();
        let first = retry_with_backoff(self.launch_retries, self.backoff_base_secs, || {
            self.launch_with(configured)
        })
        .await;

        let page = match first {
            Ok(page) => page,
            Err(err) if configured.is_none() => {
                let Some(detected) = find_chrome_executable() else {
                    return Err(err);
                };
                tracing::warn!(
                    error = %err,
                    executable = %detected.display(),
                    "default browser launch failed, trying detected Chrome"
                );
                self.launch_with(Some(&detected)).await?
            }
            Err(err) => return Err(err),
        };

        tracing::info!(headless = self.headless, "browser started");
        Ok(Arc::new(page))
    }
}

/// First existing install from [`CHROME_CANDIDATES`], then the first Chrome
/// binary on `PATH`.
#[must_use]
pub fn find_chrome_executable() -> Option<PathBuf> {
    CHROME_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
        .or_else(|| {
            let path_var = std::env::var_os("PATH")?;
            std::env::split_paths(&path_var).find_map(|dir| {
                CHROME_BINARIES
                    .iter()
                    .map(|bin| dir.join(bin))
                    .find(|candidate| candidate.is_file())
            })
        })
}

pub struct ChromiumPage {
    page: Page,
    browser: Mutex<Option<Browser>>,
    handler_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        if let Ok(slot) = self.handler_task.get_mut() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

impl ChromiumPage {
    async fn eval<T: DeserializeOwned>(
        &self,
        context: &'static str,
        script: String,
    ) -> Result<T, ScraperError> {
        self.page
            .evaluate_expression(script)
            .await?
            .into_value::<T>()
            .map_err(|source| ScraperError::Script { context, source })
    }
}

/// Render `value` as a JS string literal.
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// CDP form of a stored cookie. Session cookies (no positive expiry) stay
/// session cookies.
fn cookie_param(cookie: &StoredCookie) -> Result<CookieParam, ScraperError> {
    let mut builder = CookieParam::builder()
        .name(cookie.name.clone())
        .value(cookie.value.clone())
        .domain(cookie.domain.clone())
        .path(cookie.path.clone())
        .http_only(cookie.http_only)
        .secure(cookie.secure);
    if let Some(expires) = cookie.expires.filter(|e| *e > 0.0) {
        builder = builder.expires(TimeSinceEpoch::new(expires));
    }
    builder.build().map_err(|reason| ScraperError::InvalidCookie {
        name: cookie.name.clone(),
        reason,
    })
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn goto(&self, url: &str) -> Result<(), ScraperError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| ScraperError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, ScraperError> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn content(&self) -> Result<String, ScraperError> {
        Ok(self.page.content().await?)
    }

    async fn count(&self, selector: &str) -> Result<usize, ScraperError> {
        let script = format!(
            "document.querySelectorAll({}).length",
            js_string(selector)
        );
        self.eval("count", script).await
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), ScraperError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| ScraperError::ElementNotFound {
                selector: selector.to_string(),
            })?;
        element.click().await?;
        element.type_str(value).await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), ScraperError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| ScraperError::ElementNotFound {
                selector: selector.to_string(),
            })?;
        element.click().await?;
        Ok(())
    }

    async fn click_with_text(&self, selector: &str, needle: &str) -> Result<bool, ScraperError> {
        let script = format!(
            r"(() => {{
                const needle = {needle};
                for (const el of document.querySelectorAll({selector})) {{
                    const text = (el.innerText || el.textContent || '').toLowerCase();
                    if (text.includes(needle)) {{
                        el.scrollIntoView({{ block: 'center' }});
                        el.click();
                        return true;
                    }}
                }}
                return false;
            }})()",
            needle = js_string(&needle.to_lowercase()),
            selector = js_string(selector),
        );
        self.eval("click_with_text", script).await
    }

    async fn scroll_to_bottom(&self) -> Result<(), ScraperError> {
        self.page
            .evaluate_expression("window.scrollTo(0, document.body.scrollHeight)")
            .await?;
        Ok(())
    }

    async fn scroll_height(&self) -> Result<u64, ScraperError> {
        self.eval("scroll_height", "document.body.scrollHeight".to_string())
            .await
    }

    async fn cookies(&self) -> Result<Vec<StoredCookie>, ScraperError> {
        let cookies = self.page.get_cookies().await?;
        Ok(cookies
            .into_iter()
            .map(|c| StoredCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                expires: Some(c.expires),
                http_only: c.http_only,
                secure: c.secure,
            })
            .collect())
    }

    async fn set_cookies(&self, cookies: &[StoredCookie]) -> Result<(), ScraperError> {
        let params = cookies
            .iter()
            .map(cookie_param)
            .collect::<Result<Vec<_>, _>>()?;
        if !params.is_empty() {
            self.page.set_cookies(params).await?;
        }
        Ok(())
    }

    async fn local_storage(&self) -> Result<BTreeMap<String, String>, ScraperError> {
        let raw: String = self
            .eval(
                "local_storage",
                "JSON.stringify(Object.assign({}, window.localStorage))".to_string(),
            )
            .await?;
        serde_json::from_str(&raw).map_err(|source| ScraperError::Script {
            context: "local_storage",
            source,
        })
    }

    async fn set_local_storage(
        &self,
        entries: &BTreeMap<String, String>,
    ) -> Result<(), ScraperError> {
        let payload = serde_json::to_string(entries).map_err(|source| ScraperError::Script {
            context: "set_local_storage",
            source,
        })?;
        let script = format!(
            "(() => {{ for (const [k, v] of Object.entries({payload})) {{ window.localStorage.setItem(k, v); }} return true; }})()"
        );
        let _: bool = self.eval("set_local_storage", script).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), ScraperError> {
        let browser = self.browser.lock().await.take();
        let result = match browser {
            Some(mut browser) => {
                let closed = browser.close().await.map(|_| ());
                if let Err(e) = browser.wait().await {
                    tracing::debug!(error = %e, "waiting for browser exit failed");
                }
                closed.map_err(ScraperError::from)
            }
            None => Ok(()),
        };

        let task = self
            .handler_task
            .lock()
            .map(|mut guard| guard.take())
            .unwrap_or_default();
        if let Some(task) = task {
            task.abort();
        }

        if result.is_ok() {
            tracing::info!("browser closed");
        }
        result
    }
}
