//! Freshness policy over a [`DocumentStore`]: serve cached posts when a
//! document already holds enough of them, otherwise scrape, merge, and
//! write back.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use postpulse_core::{
    canonical_profile_url, dedupe_by_text, normalize_hashtag, profile_username,
    rank_by_engagement, AppConfig, Post,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;

use crate::store::DocumentStore;
use crate::DbError;

const DEFAULT_HASHTAG_TOP_K: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Posts kept per hashtag document, by engagement.
    pub hashtag_top_k: usize,
    /// Serialize concurrent misses for the same identifier.
    pub single_flight: bool,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            hashtag_top_k: DEFAULT_HASHTAG_TOP_K,
            single_flight: true,
        }
    }
}

impl CachePolicy {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            hashtag_top_k: config.hashtag_top_k,
            single_flight: config.single_flight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPosts {
    pub posts: Vec<Post>,
    pub from_cache: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub profiles_checked: usize,
    pub duplicates_removed: usize,
}

#[derive(Debug, Error)]
pub enum CacheError<E: std::error::Error + 'static> {
    #[error("cannot derive a cache key from {0:?}")]
    InvalidIdentifier(String),
    #[error("document store read failed: {0}")]
    Store(#[source] DbError),
    #[error("scrape failed: {0}")]
    Scrape(#[source] E),
}

/// One async mutex per cache key. Entries nobody holds or waits on are
/// pruned on the next acquisition.
#[derive(Debug, Default)]
struct KeyedLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    async fn acquire(&self, key: String) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(key).or_default())
        };
        lock.lock_owned().await
    }
}

pub struct PostCache {
    store: Arc<dyn DocumentStore>,
    policy: CachePolicy,
    locks: KeyedLocks,
}

impl PostCache {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, policy: CachePolicy) -> Self {
        Self {
            store,
            policy,
            locks: KeyedLocks::default(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    #[must_use]
    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// The `n` most recent cached posts for a profile, or the result of
    /// `scrape` when fewer than `n` are cached.
    ///
    /// Freshly scraped posts are appended to the profile document, which is
    /// then deduplicated by text. A failed write is logged and the scraped
    /// posts are still returned.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidIdentifier`] when no username can be derived
    /// from `profile_url`, [`CacheError::Store`] when the cache cannot be
    /// read, and [`CacheError::Scrape`] when `scrape` fails.
    pub async fn get_or_scrape_profile<F, Fut, E>(
        &self,
        profile_url: &str,
        n: usize,
        scrape: F,
    ) -> Result<CachedPosts, CacheError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Post>, E>>,
        E: std::error::Error + 'static,
    {
        let username = profile_username(profile_url)
            .ok_or_else(|| CacheError::InvalidIdentifier(profile_url.to_string()))?;
        let canonical = canonical_profile_url(profile_url);

        if let Some(posts) = self.cached_profile_posts(&username, n).await? {
            tracing::info!(username, n, "profile cache hit");
            return Ok(CachedPosts {
                posts,
                from_cache: true,
            });
        }

        let guard = self.single_flight(format!("profile:{username}")).await;
        if guard.is_some() {
            if let Some(posts) = self.cached_profile_posts(&username, n).await? {
                tracing::info!(username, n, "profile cache filled by concurrent scrape");
                return Ok(CachedPosts {
                    posts,
                    from_cache: true,
                });
            }
        }

        tracing::info!(username, n, "profile cache miss, scraping");
        let mut scraped = scrape().await.map_err(CacheError::Scrape)?;
        scraped.truncate(n);
        if scraped.is_empty() {
            tracing::info!(username, "scrape returned no posts, cache left unchanged");
            return Ok(CachedPosts {
                posts: scraped,
                from_cache: false,
            });
        }

        if let Err(e) = self.store_profile(&username, &canonical, &scraped).await {
            tracing::warn!(username, error = %e, "failed to cache scraped profile posts");
        }

        Ok(CachedPosts {
            posts: scraped,
            from_cache: false,
        })
    }

    /// The `n` highest-engagement cached posts for a hashtag, or a fresh
    /// scrape merged with what was cached.
    ///
    /// The hashtag document keeps only the top `hashtag_top_k` posts; the
    /// response draws from the full merged set.
    ///
    /// # Errors
    ///
    /// Same as [`get_or_scrape_profile`](Self::get_or_scrape_profile).
    pub async fn get_or_scrape_hashtag<F, Fut, E>(
        &self,
        hashtag: &str,
        n: usize,
        scrape: F,
    ) -> Result<CachedPosts, CacheError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Post>, E>>,
        E: std::error::Error + 'static,
    {
        let tag = normalize_hashtag(hashtag)
            .ok_or_else(|| CacheError::InvalidIdentifier(hashtag.to_string()))?;

        let mut cached = self.cached_hashtag_posts(&tag).await?;
        if cached.len() >= n {
            tracing::info!(hashtag = %tag, n, "hashtag cache hit");
            return Ok(CachedPosts {
                posts: rank_by_engagement(cached, n),
                from_cache: true,
            });
        }

        let guard = self.single_flight(format!("hashtag:{tag}")).await;
        if guard.is_some() {
            cached = self.cached_hashtag_posts(&tag).await?;
            if cached.len() >= n {
                tracing::info!(hashtag = %tag, n, "hashtag cache filled by concurrent scrape");
                return Ok(CachedPosts {
                    posts: rank_by_engagement(cached, n),
                    from_cache: true,
                });
            }
        }

        tracing::info!(hashtag = %tag, n, cached = cached.len(), "hashtag cache miss, scraping");
        let scraped = scrape().await.map_err(CacheError::Scrape)?;
        if scraped.is_empty() {
            tracing::info!(hashtag = %tag, "scrape returned no posts, cache left unchanged");
            return Ok(CachedPosts {
                posts: Vec::new(),
                from_cache: false,
            });
        }

        let keep = self.policy.hashtag_top_k;
        match self.store.merge_hashtag_posts(&tag, &scraped, keep).await {
            Ok(retained) => {
                tracing::debug!(hashtag = %tag, retained = retained.len(), "hashtag document updated");
            }
            Err(e) => {
                tracing::warn!(hashtag = %tag, error = %e, "failed to cache scraped hashtag posts");
            }
        }

        let mut merged = cached;
        merged.extend(scraped);
        let ranked = rank_by_engagement(dedupe_by_text(merged), n);
        Ok(CachedPosts {
            posts: ranked,
            from_cache: false,
        })
    }

    /// Remove text duplicates from one profile document (`username` may be a
    /// bare username or a profile URL), or from every profile when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the store cannot be read or written.
    pub async fn cleanup_duplicates(&self, username: Option<&str>) -> Result<CleanupReport, DbError> {
        let usernames = match username {
            Some(raw) => vec![profile_username(raw).unwrap_or_else(|| raw.trim().to_string())],
            None => self.store.list_profile_usernames().await?,
        };

        let mut report = CleanupReport::default();
        for username in &usernames {
            if let Some(removed) = self.dedupe_profile(username).await? {
                report.profiles_checked += 1;
                report.duplicates_removed += removed;
            }
        }

        tracing::info!(
            profiles_checked = report.profiles_checked,
            duplicates_removed = report.duplicates_removed,
            "duplicate cleanup finished"
        );
        Ok(report)
    }

    async fn single_flight(&self, key: String) -> Option<OwnedMutexGuard<()>> {
        if self.policy.single_flight {
            Some(self.locks.acquire(key).await)
        } else {
            None
        }
    }

    async fn cached_profile_posts<E: std::error::Error + 'static>(
        &self,
        username: &str,
        n: usize,
    ) -> Result<Option<Vec<Post>>, CacheError<E>> {
        let doc = self
            .store
            .get_profile(username)
            .await
            .map_err(CacheError::Store)?;

        Ok(doc.filter(|doc| doc.posts.len() >= n).map(|doc| {
            let mut posts = doc.posts;
            posts.sort_by(|a, b| b.scraped_at.cmp(&a.scraped_at));
            posts.truncate(n);
            posts
        }))
    }

    async fn cached_hashtag_posts<E: std::error::Error + 'static>(
        &self,
        tag: &str,
    ) -> Result<Vec<Post>, CacheError<E>> {
        let doc = self
            .store
            .get_hashtag(tag)
            .await
            .map_err(CacheError::Store)?;
        Ok(doc.map(|doc| doc.posts).unwrap_or_default())
    }

    async fn store_profile(
        &self,
        username: &str,
        profile_url: &str,
        posts: &[Post],
    ) -> Result<(), DbError> {
        self.store
            .append_profile_posts(username, profile_url, posts)
            .await?;
        self.dedupe_profile(username).await?;
        tracing::debug!(username, appended = posts.len(), "profile document updated");
        Ok(())
    }

    /// Returns the number of duplicates removed, or `None` if the profile
    /// has no document.
    async fn dedupe_profile(&self, username: &str) -> Result<Option<usize>, DbError> {
        let removed = self.store.dedupe_profile_posts(username).await?;
        if let Some(removed) = removed.filter(|r| *r > 0) {
            tracing::info!(username, removed, "removed duplicate profile posts");
        }
        Ok(removed)
    }
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod tests;
