//! Cached scrape endpoints.
//!
//! Scrape failures are reported in-band with `success: false` and a 200
//! status so callers always get the same response shape.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use postpulse_core::{normalize_hashtag, profile_username, Post, PostSource};
use postpulse_db::{CacheError, CachedPosts};
use postpulse_scraper::ScraperError;
use serde::{Deserialize, Serialize};
use tokio::task::JoinError;

use super::{normalize_n_posts, AppState};
use crate::export::JsonExporter;
use crate::middleware::RequestId;

const DEFAULT_PROFILE_POSTS: usize = 10;
const DEFAULT_HASHTAG_POSTS: usize = 5;

#[derive(Debug, Deserialize)]
pub(super) struct ProfilePostsQuery {
    pub profile_url: String,
    pub n_posts: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct HashtagPostsQuery {
    pub hashtag: String,
    pub n_posts: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct ScrapeResponse {
    pub success: bool,
    pub message: String,
    pub total_posts: usize,
    pub posts: Vec<Post>,
    pub from_cache: bool,
    pub execution_time_seconds: f64,
}

impl ScrapeResponse {
    fn failed(message: String, started: Instant) -> Self {
        Self {
            success: false,
            message,
            total_posts: 0,
            posts: Vec::new(),
            from_cache: false,
            execution_time_seconds: started.elapsed().as_secs_f64(),
        }
    }
}

type CacheOutcome = Result<CachedPosts, CacheError<ScraperError>>;

/// Where a fresh batch goes once the scrape returns.
struct BatchSink {
    exporter: Option<Arc<JsonExporter>>,
    source: PostSource,
    identifier: String,
    request_id: String,
}

pub(super) async fn profile_posts(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ProfilePostsQuery>,
) -> Json<ScrapeResponse> {
    let started = Instant::now();
    let n = normalize_n_posts(query.n_posts, DEFAULT_PROFILE_POSTS, state.limits.max_posts);
    tracing::info!(request_id = %req_id.0, profile_url = %query.profile_url, n, "profile posts requested");

    let identifier =
        profile_username(&query.profile_url).unwrap_or_else(|| query.profile_url.clone());
    let sink = BatchSink {
        exporter: state.exporter.clone(),
        source: PostSource::Profile,
        identifier: identifier.clone(),
        request_id: req_id.0.clone(),
    };
    let cache = Arc::clone(&state.cache);
    let scraper = Arc::clone(&state.scraper);
    let budget = state.limits.scrape_timeout;
    let profile_url = query.profile_url;

    // Spawned so the cache write-back finishes even if the client goes away.
    let outcome = tokio::spawn(async move {
        cache
            .get_or_scrape_profile(&profile_url, n, || async {
                let scrape = scraper.profile_posts(&profile_url, n);
                fresh_batch(budget, scrape, sink).await
            })
            .await
    })
    .await;

    Json(respond(&req_id, PostSource::Profile, &identifier, outcome, started))
}

pub(super) async fn hashtag_posts(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<HashtagPostsQuery>,
) -> Json<ScrapeResponse> {
    let started = Instant::now();
    let n = normalize_n_posts(query.n_posts, DEFAULT_HASHTAG_POSTS, state.limits.max_posts);
    tracing::info!(request_id = %req_id.0, hashtag = %query.hashtag, n, "hashtag posts requested");

    let identifier = normalize_hashtag(&query.hashtag).unwrap_or_else(|| query.hashtag.clone());
    let sink = BatchSink {
        exporter: state.exporter.clone(),
        source: PostSource::Hashtag,
        identifier: identifier.clone(),
        request_id: req_id.0.clone(),
    };
    let cache = Arc::clone(&state.cache);
    let scraper = Arc::clone(&state.scraper);
    let budget = state.limits.scrape_timeout;
    let hashtag = query.hashtag;

    let outcome = tokio::spawn(async move {
        cache
            .get_or_scrape_hashtag(&hashtag, n, || async {
                let scrape = scraper.hashtag_posts(&hashtag, n);
                fresh_batch(budget, scrape, sink).await
            })
            .await
    })
    .await;

    Json(respond(&req_id, PostSource::Hashtag, &identifier, outcome, started))
}

/// Run the browser scrape within `budget`, then export what it returned.
///
/// Only the scrape is bounded. A scrape cut off by the budget is dropped with
/// its browser session and nothing reaches the cache.
async fn fresh_batch<F>(
    budget: Duration,
    scrape: F,
    sink: BatchSink,
) -> Result<Vec<Post>, ScraperError>
where
    F: Future<Output = Result<Vec<Post>, ScraperError>>,
{
    let posts = tokio::time::timeout(budget, scrape)
        .await
        .map_err(|_| ScraperError::TimedOut(budget))??;

    if let Some(exporter) = sink.exporter.as_deref() {
        if !posts.is_empty() {
            if let Err(e) = exporter.export(sink.source, &sink.identifier, &posts).await {
                tracing::warn!(request_id = %sink.request_id, error = %e, "post export failed");
            }
        }
    }
    Ok(posts)
}

fn respond(
    req_id: &RequestId,
    source: PostSource,
    identifier: &str,
    outcome: Result<CacheOutcome, JoinError>,
    started: Instant,
) -> ScrapeResponse {
    let cached = match outcome {
        Ok(Ok(cached)) => cached,
        Ok(Err(CacheError::Scrape(e))) if e.is_authentication() => {
            tracing::error!(request_id = %req_id.0, %source, identifier, error = %e, "scrape login failed");
            return ScrapeResponse::failed(format!("LinkedIn login failed: {e}"), started);
        }
        Ok(Err(CacheError::Scrape(e @ ScraperError::TimedOut(_)))) => {
            tracing::error!(request_id = %req_id.0, %source, identifier, error = %e, "scrape timed out");
            return ScrapeResponse::failed(e.to_string(), started);
        }
        Ok(Err(e)) => {
            tracing::error!(request_id = %req_id.0, %source, identifier, error = %e, "scrape request failed");
            return ScrapeResponse::failed(e.to_string(), started);
        }
        Err(e) => {
            tracing::error!(request_id = %req_id.0, %source, identifier, error = %e, "scrape task failed");
            return ScrapeResponse::failed("scrape task failed".to_string(), started);
        }
    };

    let message = if cached.from_cache {
        "Posts retrieved from cache".to_string()
    } else if cached.posts.is_empty() {
        "No posts found".to_string()
    } else {
        format!("Scraped {} posts", cached.posts.len())
    };

    tracing::info!(
        request_id = %req_id.0,
        %source,
        identifier,
        total_posts = cached.posts.len(),
        from_cache = cached.from_cache,
        "scrape request served"
    );
    ScrapeResponse {
        success: true,
        message,
        total_posts: cached.posts.len(),
        posts: cached.posts,
        from_cache: cached.from_cache,
        execution_time_seconds: started.elapsed().as_secs_f64(),
    }
}
