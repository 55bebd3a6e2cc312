//! Storage seam for cached post documents.

use async_trait::async_trait;
use postpulse_core::Post;

use crate::documents::{HashtagDocument, ProfileDocument};
use crate::DbError;

/// Persistence for [`ProfileDocument`]s and [`HashtagDocument`]s.
///
/// Every write is a single atomic read-modify-write on one document, so
/// concurrent appends, dedup passes, and hashtag merges never drop each
/// other's posts.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name reported by health checks.
    fn backend(&self) -> &'static str;

    /// # Errors
    ///
    /// Returns [`DbError`] if the backend is unreachable.
    async fn ping(&self) -> Result<(), DbError>;

    /// # Errors
    ///
    /// Returns [`DbError`] on backend or decode failure.
    async fn get_profile(&self, username: &str) -> Result<Option<ProfileDocument>, DbError>;

    /// Append `posts` to the profile document, creating it if missing, and
    /// bump `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on backend failure.
    async fn append_profile_posts(
        &self,
        username: &str,
        profile_url: &str,
        posts: &[Post],
    ) -> Result<(), DbError>;

    /// Collapse text duplicates in the profile document with
    /// [`postpulse_core::dedupe_by_text`]. Returns the number removed, or
    /// `None` when the profile has no document.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on backend or decode failure.
    async fn dedupe_profile_posts(&self, username: &str) -> Result<Option<usize>, DbError>;

    /// # Errors
    ///
    /// Returns [`DbError`] on backend failure.
    async fn list_profile_usernames(&self) -> Result<Vec<String>, DbError>;

    /// # Errors
    ///
    /// Returns [`DbError`] on backend or decode failure.
    async fn get_hashtag(&self, hashtag: &str) -> Result<Option<HashtagDocument>, DbError>;

    /// Merge `posts` into the hashtag document (creating it if missing),
    /// dedupe by text, and keep the `keep` highest-engagement posts. Returns
    /// the retained list.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on backend or decode failure.
    async fn merge_hashtag_posts(
        &self,
        hashtag: &str,
        posts: &[Post],
        keep: usize,
    ) -> Result<Vec<Post>, DbError>;
}

/// Stored posts followed by `fresh`, deduped by text and ranked, top `keep`.
pub(crate) fn merge_ranked(stored: Vec<Post>, fresh: &[Post], keep: usize) -> Vec<Post> {
    let mut merged = stored;
    merged.extend_from_slice(fresh);
    postpulse_core::rank_by_engagement(postpulse_core::dedupe_by_text(merged), keep)
}
