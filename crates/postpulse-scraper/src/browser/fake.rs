//! Scripted in-memory page for unit tests.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{BrowserLauncher, BrowserPage};
use crate::error::ScraperError;
use crate::session::StoredCookie;

type CountUpdates = Vec<(String, usize)>;

#[derive(Debug, Default)]
pub(crate) struct FakeState {
    pub url: String,
    pub html: String,
    pub height: u64,
    pub counts: HashMap<String, usize>,
    /// One step is applied per `scroll_to_bottom`: new height plus count updates.
    pub scroll_steps: VecDeque<(u64, CountUpdates)>,
    /// Requested URL -> URL the page lands on.
    pub redirects: HashMap<String, String>,
    /// Requested URL -> count updates applied after landing.
    pub on_goto: HashMap<String, CountUpdates>,
    pub on_click: HashMap<String, CountUpdates>,
    /// `(selector, link text, destination)`.
    pub links: Vec<(String, String, String)>,
    pub failing_urls: HashSet<String>,
    /// Selector -> `count` calls that still report zero before it shows up.
    pub appears_after: HashMap<String, usize>,
    pub count_calls: HashMap<String, usize>,
    /// `scroll_to_bottom` errors (after counting the attempt) without scrolling.
    pub fail_scrolls: bool,
    pub fail_height_reads: bool,
    pub visits: Vec<String>,
    pub filled: Vec<(String, String)>,
    pub clicks: Vec<String>,
    pub scrolls: usize,
    pub cookies: Vec<StoredCookie>,
    pub local_storage: BTreeMap<String, String>,
    pub close_calls: usize,
}

impl FakeState {
    fn apply(&mut self, updates: &[(String, usize)]) {
        for (selector, n) in updates {
            self.counts.insert(selector.clone(), *n);
        }
    }

    fn require(&self, selector: &str) -> Result<(), ScraperError> {
        if self.counts.get(selector).copied().unwrap_or(0) == 0 {
            return Err(ScraperError::ElementNotFound {
                selector: selector.to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakePage {
    state: Mutex<FakeState>,
}

impl FakePage {
    pub fn new(state: FakeState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
        })
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut guard = self.state.lock().expect("fake page lock");
        f(&mut guard)
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn goto(&self, url: &str) -> Result<(), ScraperError> {
        self.with(|s| {
            s.visits.push(url.to_string());
            if s.failing_urls.contains(url) {
                return Err(ScraperError::Navigation {
                    url: url.to_string(),
                    reason: "net::ERR_CONNECTION_RESET".to_string(),
                });
            }
            s.url = s.redirects.get(url).cloned().unwrap_or_else(|| url.to_string());
            if let Some(updates) = s.on_goto.get(url).cloned() {
                s.apply(&updates);
            }
            Ok(())
        })
    }

    async fn current_url(&self) -> Result<String, ScraperError> {
        Ok(self.with(|s| s.url.clone()))
    }

    async fn content(&self) -> Result<String, ScraperError> {
        Ok(self.with(|s| s.html.clone()))
    }

    async fn count(&self, selector: &str) -> Result<usize, ScraperError> {
        Ok(self.with(|s| {
            *s.count_calls.entry(selector.to_string()).or_default() += 1;
            if let Some(left) = s.appears_after.get_mut(selector) {
                if *left == 0 {
                    s.appears_after.remove(selector);
                    s.counts.insert(selector.to_string(), 1);
                } else {
                    *left -= 1;
                }
            }
            s.counts.get(selector).copied().unwrap_or(0)
        }))
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), ScraperError> {
        self.with(|s| {
            s.require(selector)?;
            s.filled.push((selector.to_string(), value.to_string()));
            Ok(())
        })
    }

    async fn click(&self, selector: &str) -> Result<(), ScraperError> {
        self.with(|s| {
            s.require(selector)?;
            s.clicks.push(selector.to_string());
            if let Some(updates) = s.on_click.get(selector).cloned() {
                s.apply(&updates);
            }
            Ok(())
        })
    }

    async fn click_with_text(&self, selector: &str, needle: &str) -> Result<bool, ScraperError> {
        Ok(self.with(|s| {
            let needle = needle.to_lowercase();
            let target = s
                .links
                .iter()
                .find(|(sel, text, _)| sel == selector && text.to_lowercase().contains(&needle))
                .map(|(_, _, dest)| dest.clone());
            match target {
                Some(dest) => {
                    s.clicks.push(selector.to_string());
                    s.url = dest;
                    true
                }
                None => false,
            }
        }))
    }

    async fn scroll_to_bottom(&self) -> Result<(), ScraperError> {
        self.with(|s| {
            s.scrolls += 1;
            if s.fail_scrolls {
                return Err(body_missing());
            }
            if let Some((height, updates)) = s.scroll_steps.pop_front() {
                s.height = height;
                s.apply(&updates);
            }
            Ok(())
        })
    }

    async fn scroll_height(&self) -> Result<u64, ScraperError> {
        self.with(|s| {
            if s.fail_height_reads {
                return Err(body_missing());
            }
            Ok(s.height)
        })
    }

    async fn cookies(&self) -> Result<Vec<StoredCookie>, ScraperError> {
        Ok(self.with(|s| s.cookies.clone()))
    }

    async fn set_cookies(&self, cookies: &[StoredCookie]) -> Result<(), ScraperError> {
        self.with(|s| s.cookies.extend_from_slice(cookies));
        Ok(())
    }

    async fn local_storage(&self) -> Result<BTreeMap<String, String>, ScraperError> {
        Ok(self.with(|s| s.local_storage.clone()))
    }

    async fn set_local_storage(
        &self,
        entries: &BTreeMap<String, String>,
    ) -> Result<(), ScraperError> {
        self.with(|s| {
            s.local_storage
                .extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), ScraperError> {
        self.with(|s| s.close_calls += 1);
        Ok(())
    }
}

/// Hands out the same scripted page on every launch.
pub(crate) struct FakeLauncher {
    pub page: Arc<FakePage>,
    pub fail: bool,
    pub launches: AtomicUsize,
}

impl FakeLauncher {
    pub fn new(page: Arc<FakePage>) -> Arc<Self> {
        Arc::new(Self {
            page,
            fail: false,
            launches: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            page: FakePage::new(FakeState::default()),
            fail: true,
            launches: AtomicUsize::new(0),
        })
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserPage>, ScraperError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ScraperError::BrowserLaunch("no chrome in test".to_string()));
        }
        Ok(Arc::clone(&self.page) as Arc<dyn BrowserPage>)
    }
}

fn body_missing() -> ScraperError {
    ScraperError::ElementNotFound {
        selector: "body".to_string(),
    }
}
