//! Postgres-backed [`DocumentStore`]. Post lists live in JSONB columns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use postpulse_core::{dedupe_by_text, Post};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::documents::{HashtagDocument, ProfileDocument};
use crate::store::{merge_ranked, DocumentStore};
use crate::DbError;

#[derive(Debug, sqlx::FromRow)]
struct ProfileDocumentRow {
    username: String,
    profile_url: String,
    posts: Json<Vec<Post>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProfileDocumentRow> for ProfileDocument {
    fn from(row: ProfileDocumentRow) -> Self {
        Self {
            username: row.username,
            profile_url: row.profile_url,
            posts: row.posts.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct HashtagDocumentRow {
    hashtag: String,
    posts: Json<Vec<Post>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<HashtagDocumentRow> for HashtagDocument {
    fn from(row: HashtagDocumentRow) -> Self {
        Self {
            hashtag: row.hashtag,
            posts: row.posts.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> Result<(), DbError> {
        crate::ping(&self.pool).await?;
        Ok(())
    }

    async fn get_profile(&self, username: &str) -> Result<Option<ProfileDocument>, DbError> {
        let row = sqlx::query_as::<_, ProfileDocumentRow>(
            "SELECT username, profile_url, posts, created_at, updated_at \
             FROM profile_documents \
             WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ProfileDocument::from))
    }

    async fn append_profile_posts(
        &self,
        username: &str,
        profile_url: &str,
        posts: &[Post],
    ) -> Result<(), DbError> {
        // Concatenation runs under the upsert's row lock; concurrent appends both land.
        sqlx::query(
            "INSERT INTO profile_documents (username, profile_url, posts) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (username) DO UPDATE SET \
                 posts = profile_documents.posts || EXCLUDED.posts, \
                 profile_url = EXCLUDED.profile_url, \
                 updated_at = NOW()",
        )
        .bind(username)
        .bind(profile_url)
        .bind(Json(posts))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn dedupe_profile_posts(&self, username: &str) -> Result<Option<usize>, DbError> {
        let mut tx = self.pool.begin().await?;

        // The row lock holds concurrent appends until the deduped list is written.
        let posts = sqlx::query_scalar::<_, Json<Vec<Post>>>(
            "SELECT posts FROM profile_documents WHERE username = $1 FOR UPDATE",
        )
        .bind(username)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(Json(posts)) = posts else {
            return Ok(None);
        };

        let before = posts.len();
        let deduped = dedupe_by_text(posts);
        let removed = before - deduped.len();
        if removed > 0 {
            sqlx::query(
                "UPDATE profile_documents \
                 SET posts = $2, updated_at = NOW() \
                 WHERE username = $1",
            )
            .bind(username)
            .bind(Json(&deduped))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some(removed))
    }

    async fn list_profile_usernames(&self) -> Result<Vec<String>, DbError> {
        let usernames = sqlx::query_scalar::<_, String>(
            "SELECT username FROM profile_documents ORDER BY username",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(usernames)
    }

    async fn get_hashtag(&self, hashtag: &str) -> Result<Option<HashtagDocument>, DbError> {
        let row = sqlx::query_as::<_, HashtagDocumentRow>(
            "SELECT hashtag, posts, created_at, updated_at \
             FROM hashtag_documents \
             WHERE hashtag = $1",
        )
        .bind(hashtag)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(HashtagDocument::from))
    }

    async fn merge_hashtag_posts(
        &self,
        hashtag: &str,
        posts: &[Post],
        keep: usize,
    ) -> Result<Vec<Post>, DbError> {
        let mut tx = self.pool.begin().await?;

        // Create the row first so the merge below always has a row to lock.
        sqlx::query(
            "INSERT INTO hashtag_documents (hashtag) VALUES ($1) \
             ON CONFLICT (hashtag) DO NOTHING",
        )
        .bind(hashtag)
        .execute(&mut *tx)
        .await?;

        let Json(stored) = sqlx::query_scalar::<_, Json<Vec<Post>>>(
            "SELECT posts FROM hashtag_documents WHERE hashtag = $1 FOR UPDATE",
        )
        .bind(hashtag)
        .fetch_one(&mut *tx)
        .await?;

        let retained = merge_ranked(stored, posts, keep);
        sqlx::query(
            "UPDATE hashtag_documents \
             SET posts = $2, updated_at = NOW() \
             WHERE hashtag = $1",
        )
        .bind(hashtag)
        .bind(Json(&retained))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(retained)
    }
}
