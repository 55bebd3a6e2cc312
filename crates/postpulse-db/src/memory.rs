//! In-process [`DocumentStore`] for local runs and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use postpulse_core::{dedupe_by_text, Post};
use tokio::sync::RwLock;

use crate::documents::{HashtagDocument, ProfileDocument};
use crate::store::{merge_ranked, DocumentStore};
use crate::DbError;

#[derive(Debug, Default)]
pub struct MemoryStore {
    profiles: RwLock<HashMap<String, ProfileDocument>>,
    hashtags: RwLock<HashMap<String, HashtagDocument>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), DbError> {
        Ok(())
    }

    async fn get_profile(&self, username: &str) -> Result<Option<ProfileDocument>, DbError> {
        Ok(self.profiles.read().await.get(username).cloned())
    }

    async fn append_profile_posts(
        &self,
        username: &str,
        profile_url: &str,
        posts: &[Post],
    ) -> Result<(), DbError> {
        let now = Utc::now();
        let mut profiles = self.profiles.write().await;
        let doc = profiles
            .entry(username.to_string())
            .or_insert_with(|| ProfileDocument {
                username: username.to_string(),
                profile_url: profile_url.to_string(),
                posts: Vec::new(),
                created_at: now,
                updated_at: now,
            });
        doc.posts.extend_from_slice(posts);
        doc.profile_url = profile_url.to_string();
        doc.updated_at = now;
        Ok(())
    }

    async fn dedupe_profile_posts(&self, username: &str) -> Result<Option<usize>, DbError> {
        let mut profiles = self.profiles.write().await;
        let Some(doc) = profiles.get_mut(username) else {
            return Ok(None);
        };
        let before = doc.posts.len();
        doc.posts = dedupe_by_text(std::mem::take(&mut doc.posts));
        let removed = before - doc.posts.len();
        if removed > 0 {
            doc.updated_at = Utc::now();
        }
        Ok(Some(removed))
    }

    async fn list_profile_usernames(&self) -> Result<Vec<String>, DbError> {
        let mut usernames: Vec<String> = self.profiles.read().await.keys().cloned().collect();
        usernames.sort();
        Ok(usernames)
    }

    async fn get_hashtag(&self, hashtag: &str) -> Result<Option<HashtagDocument>, DbError> {
        Ok(self.hashtags.read().await.get(hashtag).cloned())
    }

    async fn merge_hashtag_posts(
        &self,
        hashtag: &str,
        posts: &[Post],
        keep: usize,
    ) -> Result<Vec<Post>, DbError> {
        let now = Utc::now();
        let mut hashtags = self.hashtags.write().await;
        let doc = hashtags
            .entry(hashtag.to_string())
            .or_insert_with(|| HashtagDocument {
                hashtag: hashtag.to_string(),
                posts: Vec::new(),
                created_at: now,
                updated_at: now,
            });
        doc.posts = merge_ranked(std::mem::take(&mut doc.posts), posts, keep);
        doc.updated_at = now;
        Ok(doc.posts.clone())
    }
}
