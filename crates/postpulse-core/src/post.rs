//! The scraped post record shared by the scraper, the cache layer, and the
//! HTTP service.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Posts whose normalized text is this many characters or fewer are UI
/// artifacts, not content.
pub const MIN_TEXT_CHARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostSource {
    Profile,
    Hashtag,
}

impl std::fmt::Display for PostSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PostSource::Profile => write!(f, "profile"),
            PostSource::Hashtag => write!(f, "hashtag"),
        }
    }
}

/// Where a post was scraped from. Carrying the identifier inside the variant
/// makes "exactly one of `profile_url`/`hashtag`" unrepresentable to break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOrigin {
    Profile { profile_url: String },
    Hashtag { hashtag: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PostError {
    #[error("profile post is missing profile_url")]
    MissingProfileUrl,
    #[error("hashtag post is missing hashtag")]
    MissingHashtag,
    #[error("{kind} post must not carry {field}")]
    UnexpectedField {
        kind: PostSource,
        field: &'static str,
    },
}

/// One scraped post.
///
/// `engagement` is derived from the three counters and is recomputed
/// whenever a post is serialized or deserialized; a stored or client-supplied
/// `engagement` value is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PostRecord", into = "PostRecord")]
pub struct Post {
    pub text: String,
    pub likes: u64,
    pub comments: u64,
    pub reposts: u64,
    pub scraped_at: DateTime<Utc>,
    pub origin: PostOrigin,
}

impl Post {
    #[must_use]
    pub fn from_profile(
        text: impl Into<String>,
        likes: u64,
        comments: u64,
        reposts: u64,
        scraped_at: DateTime<Utc>,
        profile_url: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            likes,
            comments,
            reposts,
            scraped_at,
            origin: PostOrigin::Profile {
                profile_url: profile_url.into(),
            },
        }
    }

    #[must_use]
    pub fn from_hashtag(
        text: impl Into<String>,
        likes: u64,
        comments: u64,
        reposts: u64,
        scraped_at: DateTime<Utc>,
        hashtag: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            likes,
            comments,
            reposts,
            scraped_at,
            origin: PostOrigin::Hashtag {
                hashtag: hashtag.into(),
            },
        }
    }

    #[must_use]
    pub fn engagement(&self) -> u64 {
        self.likes
            .saturating_add(self.comments)
            .saturating_add(self.reposts)
    }

    #[must_use]
    pub fn source(&self) -> PostSource {
        match self.origin {
            PostOrigin::Profile { .. } => PostSource::Profile,
            PostOrigin::Hashtag { .. } => PostSource::Hashtag,
        }
    }

    #[must_use]
    pub fn profile_url(&self) -> Option<&str> {
        match &self.origin {
            PostOrigin::Profile { profile_url } => Some(profile_url),
            PostOrigin::Hashtag { .. } => None,
        }
    }

    #[must_use]
    pub fn hashtag(&self) -> Option<&str> {
        match &self.origin {
            PostOrigin::Hashtag { hashtag } => Some(hashtag),
            PostOrigin::Profile { .. } => None,
        }
    }

    /// Case-insensitive, trimmed text used as the deduplication key.
    #[must_use]
    pub fn text_key(&self) -> String {
        text_key(&self.text)
    }
}

/// Wire/storage shape of a [`Post`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PostRecord {
    text: String,
    #[serde(default)]
    likes: u64,
    #[serde(default)]
    comments: u64,
    #[serde(default)]
    reposts: u64,
    #[serde(default)]
    engagement: u64,
    scraped_at: DateTime<Utc>,
    source: PostSource,
    #[serde(default)]
    profile_url: Option<String>,
    #[serde(default)]
    hashtag: Option<String>,
}

impl TryFrom<PostRecord> for Post {
    type Error = PostError;

    fn try_from(record: PostRecord) -> Result<Self, Self::Error> {
        let origin = match record.source {
            PostSource::Profile => {
                if record.hashtag.is_some() {
                    return Err(PostError::UnexpectedField {
                        kind: PostSource::Profile,
                        field: "hashtag",
                    });
                }
                PostOrigin::Profile {
                    profile_url: record.profile_url.ok_or(PostError::MissingProfileUrl)?,
                }
            }
            PostSource::Hashtag => {
                if record.profile_url.is_some() {
                    return Err(PostError::UnexpectedField {
                        kind: PostSource::Hashtag,
                        field: "profile_url",
                    });
                }
                PostOrigin::Hashtag {
                    hashtag: record.hashtag.ok_or(PostError::MissingHashtag)?,
                }
            }
        };

        Ok(Self {
            text: record.text,
            likes: record.likes,
            comments: record.comments,
            reposts: record.reposts,
            scraped_at: record.scraped_at,
            origin,
        })
    }
}

impl From<Post> for PostRecord {
    fn from(post: Post) -> Self {
        let engagement = post.engagement();
        let source = post.source();
        let (profile_url, hashtag) = match post.origin {
            PostOrigin::Profile { profile_url } => (Some(profile_url), None),
            PostOrigin::Hashtag { hashtag } => (None, Some(hashtag)),
        };
        Self {
            text: post.text,
            likes: post.likes,
            comments: post.comments,
            reposts: post.reposts,
            engagement,
            scraped_at: post.scraped_at,
            source,
            profile_url,
            hashtag,
        }
    }
}

/// Case-insensitive, trimmed form of a post text.
#[must_use]
pub fn text_key(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Returns `true` if `text` is long enough to count as post content.
#[must_use]
pub fn is_substantive(text: &str) -> bool {
    text.trim().chars().count() > MIN_TEXT_CHARS
}

/// Collapse posts that share a [`text_key`], keeping one representative per
/// distinct text.
///
/// The surviving entry sits at the position of the first occurrence and holds
/// the most recently scraped copy, so repeated scrapes refresh counters
/// without reordering the list. Running this twice yields the same result as
/// running it once.
#[must_use]
pub fn dedupe_by_text(posts: Vec<Post>) -> Vec<Post> {
    let mut index_by_key: HashMap<String, usize> = HashMap::with_capacity(posts.len());
    let mut kept: Vec<Post> = Vec::with_capacity(posts.len());

    for post in posts {
        let key = post.text_key();
        match index_by_key.get(&key) {
            Some(&idx) => {
                if post.scraped_at > kept[idx].scraped_at {
                    kept[idx] = post;
                }
            }
            None => {
                index_by_key.insert(key, kept.len());
                kept.push(post);
            }
        }
    }

    kept
}

/// Sort by engagement, highest first (ties keep their order), and keep `n`.
#[must_use]
pub fn rank_by_engagement(mut posts: Vec<Post>, n: usize) -> Vec<Post> {
    posts.sort_by(|a, b| b.engagement().cmp(&a.engagement()));
    posts.truncate(n);
    posts
}
