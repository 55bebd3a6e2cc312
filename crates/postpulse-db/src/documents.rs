//! Cached documents, one per profile and one per hashtag.

use chrono::{DateTime, Utc};
use postpulse_core::Post;
use serde::Serialize;

/// Posts scraped from one profile, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileDocument {
    pub username: String,
    /// Last canonical URL this profile was scraped from.
    pub profile_url: String,
    pub posts: Vec<Post>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The highest-engagement posts seen for one hashtag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HashtagDocument {
    pub hashtag: String,
    pub posts: Vec<Post>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
