use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::Request;
use chrono::Utc;
use postpulse_core::Post;
use postpulse_db::{
    CachePolicy, DbError, DocumentStore, HashtagDocument, MemoryStore, ProfileDocument,
};
use postpulse_scraper::ScraperError;
use serde_json::Value;
use tower::ServiceExt;

use super::*;
use crate::middleware::REQUEST_ID_HEADER;

/// Scripted scrape backend that records every call.
#[derive(Default)]
struct StubScraper {
    profile: Mutex<Vec<Post>>,
    hashtag: Mutex<Vec<Post>>,
    fail_auth: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requested: Mutex<Vec<usize>>,
}

impl StubScraper {
    async fn record(&self, n: usize) -> Result<(), ScraperError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(n);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_auth {
            return Err(ScraperError::Authentication(
                "verification not completed in time".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ScrapeBackend for StubScraper {
    async fn profile_posts(&self, _profile_url: &str, n: usize) -> Result<Vec<Post>, ScraperError> {
        self.record(n).await?;
        Ok(self.profile.lock().unwrap().clone())
    }

    async fn hashtag_posts(&self, _hashtag: &str, n: usize) -> Result<Vec<Post>, ScraperError> {
        self.record(n).await?;
        Ok(self.hashtag.lock().unwrap().clone())
    }
}

fn profile_posts(count: usize) -> Vec<Post> {
    (0..count)
        .map(|i| {
            Post::from_profile(
                format!("Alice shares lesson number {i}"),
                10,
                2,
                1,
                Utc::now(),
                "https://www.linkedin.com/in/alice",
            )
        })
        .collect()
}

struct Harness {
    app: Router,
    store: Arc<MemoryStore>,
    scraper: Arc<StubScraper>,
}

fn harness(scraper: StubScraper, limits: RequestLimits, exporter: Option<JsonExporter>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let scraper = Arc::new(scraper);
    let state = AppState {
        cache: Arc::new(PostCache::new(store.clone(), CachePolicy::default())),
        scraper: scraper.clone(),
        limits,
        exporter: exporter.map(Arc::new),
    };
    Harness {
        app: build_app(state),
        store,
        scraper,
    }
}

fn default_limits() -> RequestLimits {
    RequestLimits {
        scrape_timeout: Duration::from_secs(5),
        max_posts: 50,
    }
}

async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, Value, Option<String>) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    let status = response.status();
    let request_id = response
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json = serde_json::from_slice(&body).expect("json parse");
    (status, json, request_id)
}

const ALICE_QUERY: &str = "/scrape/profile/posts?profile_url=https://www.linkedin.com/in/alice/";

#[test]
fn n_posts_is_defaulted_and_clamped() {
    assert_eq!(normalize_n_posts(None, 10, 50), 10);
    assert_eq!(normalize_n_posts(Some(0), 10, 50), 1);
    assert_eq!(normalize_n_posts(Some(-4), 10, 50), 1);
    assert_eq!(normalize_n_posts(Some(500), 10, 50), 50);
    assert_eq!(normalize_n_posts(Some(7), 10, 50), 7);
}

#[tokio::test]
async fn cold_profile_request_scrapes() {
    let scraper = StubScraper {
        profile: Mutex::new(profile_posts(5)),
        ..StubScraper::default()
    };
    let h = harness(scraper, default_limits(), None);

    let (status, json, request_id) = send(&h.app, "GET", &format!("{ALICE_QUERY}&n_posts=5")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(request_id.is_some());
    assert_eq!(json["success"], true);
    assert_eq!(json["from_cache"], false);
    assert_eq!(json["total_posts"], 5);
    assert_eq!(json["posts"][0]["engagement"], 13);
    assert_eq!(json["posts"][0]["source"], "profile");
    assert!(json["execution_time_seconds"].as_f64().is_some());
    assert_eq!(h.store.get_profile("alice").await.unwrap().unwrap().posts.len(), 5);
}

#[tokio::test]
async fn warm_profile_request_is_served_from_cache() {
    let h = harness(StubScraper::default(), default_limits(), None);
    h.store
        .append_profile_posts("alice", "https://www.linkedin.com/in/alice", &profile_posts(5))
        .await
        .unwrap();

    let (status, json, _) = send(&h.app, "GET", &format!("{ALICE_QUERY}&n_posts=3")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["from_cache"], true);
    assert_eq!(json["total_posts"], 3);
    assert_eq!(h.scraper.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn login_failure_is_reported_in_band() {
    let scraper = StubScraper {
        fail_auth: true,
        ..StubScraper::default()
    };
    let h = harness(scraper, default_limits(), None);

    let (status, json, _) = send(&h.app, "GET", ALICE_QUERY).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], false);
    assert_eq!(json["total_posts"], 0);
    assert_eq!(json["posts"], Value::Array(Vec::new()));
    assert_eq!(json["from_cache"], false);
    assert!(json["message"].as_str().unwrap().contains("login failed"));
}

#[tokio::test]
async fn default_and_clamped_post_counts_reach_the_scraper() {
    let h = harness(
        StubScraper::default(),
        RequestLimits {
            scrape_timeout: Duration::from_secs(5),
            max_posts: 20,
        },
        None,
    );

    send(&h.app, "GET", "/scrape/hashtag/posts?hashtag=rust").await;
    send(&h.app, "GET", "/scrape/hashtag/posts?hashtag=rust&n_posts=999").await;
    send(&h.app, "GET", ALICE_QUERY).await;

    assert_eq!(*h.scraper.requested.lock().unwrap(), vec![5, 20, 10]);
}

#[tokio::test]
async fn empty_scrape_is_success_with_no_posts() {
    let h = harness(StubScraper::default(), default_limits(), None);

    let (_, json, _) = send(&h.app, "GET", "/scrape/hashtag/posts?hashtag=%23Rust").await;

    assert_eq!(json["success"], true);
    assert_eq!(json["total_posts"], 0);
    assert!(h.store.get_hashtag("rust").await.unwrap().is_none());
}

#[tokio::test]
async fn slow_scrape_times_out_in_band() {
    let scraper = StubScraper {
        delay: Some(Duration::from_millis(200)),
        ..StubScraper::default()
    };
    let h = harness(
        scraper,
        RequestLimits {
            scrape_timeout: Duration::from_millis(20),
            max_posts: 50,
        },
        None,
    );

    let (status, json, _) = send(&h.app, "GET", "/scrape/hashtag/posts?hashtag=rust").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], false);
    assert!(json["message"].as_str().unwrap().contains("timed out"));
}

#[tokio::test]
async fn invalid_hashtag_is_reported_in_band() {
    let h = harness(StubScraper::default(), default_limits(), None);

    let (_, json, _) = send(&h.app, "GET", "/scrape/hashtag/posts?hashtag=%23").await;

    assert_eq!(json["success"], false);
    assert_eq!(h.scraper.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn fresh_scrapes_are_exported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let scraper = StubScraper {
        profile: Mutex::new(profile_posts(2)),
        ..StubScraper::default()
    };
    let h = harness(
        scraper,
        default_limits(),
        Some(JsonExporter::new(dir.path().to_path_buf())),
    );

    send(&h.app, "GET", &format!("{ALICE_QUERY}&n_posts=2")).await;

    let exported: Vec<_> = std::fs::read_dir(dir.path())
        .expect("read dir")
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(exported.len(), 1);
    assert!(exported[0].starts_with("profile_alice_"));
}

#[tokio::test]
async fn cleanup_endpoint_reports_counts() {
    let h = harness(StubScraper::default(), default_limits(), None);
    let mut posts = profile_posts(2);
    posts.push(posts[0].clone());
    h.store
        .append_profile_posts("alice", "https://www.linkedin.com/in/alice", &posts)
        .await
        .unwrap();

    let (status, json, _) = send(&h.app, "POST", "/debug/cleanup-duplicates?username=alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["profiles_checked"], 1);
    assert_eq!(json["duplicates_removed"], 1);

    let (_, again, _) = send(&h.app, "POST", "/debug/cleanup-duplicates").await;
    assert_eq!(again["profiles_checked"], 1);
    assert_eq!(again["duplicates_removed"], 0);
}

#[tokio::test]
async fn health_reports_store() {
    let h = harness(StubScraper::default(), default_limits(), None);

    let (status, json, _) = send(&h.app, "GET", "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], SERVICE_NAME);
    assert_eq!(json["store"], "ok");
    assert_eq!(json["store_backend"], "memory");
    assert!(json["timestamp"].as_str().is_some());
}

/// Memory store whose profile appends take `delay` to commit.
struct SlowWriteStore {
    inner: MemoryStore,
    delay: Duration,
}

#[async_trait]
impl DocumentStore for SlowWriteStore {
    fn backend(&self) -> &'static str {
        "slow"
    }
    async fn ping(&self) -> Result<(), DbError> {
        Ok(())
    }
    async fn get_profile(&self, username: &str) -> Result<Option<ProfileDocument>, DbError> {
        self.inner.get_profile(username).await
    }
    async fn append_profile_posts(
        &self,
        username: &str,
        profile_url: &str,
        posts: &[Post],
    ) -> Result<(), DbError> {
        tokio::time::sleep(self.delay).await;
        self.inner.append_profile_posts(username, profile_url, posts).await
    }
    async fn dedupe_profile_posts(&self, username: &str) -> Result<Option<usize>, DbError> {
        self.inner.dedupe_profile_posts(username).await
    }
    async fn list_profile_usernames(&self) -> Result<Vec<String>, DbError> {
        self.inner.list_profile_usernames().await
    }
    async fn get_hashtag(&self, hashtag: &str) -> Result<Option<HashtagDocument>, DbError> {
        self.inner.get_hashtag(hashtag).await
    }
    async fn merge_hashtag_posts(
        &self,
        hashtag: &str,
        posts: &[Post],
        keep: usize,
    ) -> Result<Vec<Post>, DbError> {
        self.inner.merge_hashtag_posts(hashtag, posts, keep).await
    }
}

#[tokio::test]
async fn slow_cache_write_after_fast_scrape_is_not_a_timeout() {
    let store = Arc::new(SlowWriteStore {
        inner: MemoryStore::new(),
        delay: Duration::from_millis(150),
    });
    let mut duplicated = profile_posts(2);
    duplicated.push(duplicated[0].clone());
    let state = AppState {
        cache: Arc::new(PostCache::new(store.clone(), CachePolicy::default())),
        scraper: Arc::new(StubScraper {
            profile: Mutex::new(duplicated),
            ..StubScraper::default()
        }),
        limits: RequestLimits {
            scrape_timeout: Duration::from_millis(30),
            max_posts: 50,
        },
        exporter: None,
    };
    let app = build_app(state);

    let (_, json, _) = send(&app, "GET", &format!("{ALICE_QUERY}&n_posts=3")).await;

    assert_eq!(json["success"], true);
    assert_eq!(json["from_cache"], false);
    let doc = store.get_profile("alice").await.unwrap().unwrap();
    assert_eq!(doc.posts.len(), 2, "write-back and dedupe both completed");
}

#[tokio::test]
async fn hashtag_export_holds_only_the_fresh_batch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fresh = Post::from_hashtag("Fresh hashtag post body", 1, 0, 0, Utc::now(), "rust");
    let h = harness(
        StubScraper {
            hashtag: Mutex::new(vec![fresh]),
            ..StubScraper::default()
        },
        default_limits(),
        Some(JsonExporter::new(dir.path().to_path_buf())),
    );
    let cached = Post::from_hashtag("Cached viral post body", 500, 0, 0, Utc::now(), "rust");
    h.store
        .merge_hashtag_posts("rust", &[cached], usize::MAX)
        .await
        .unwrap();

    let (_, json, _) = send(&h.app, "GET", "/scrape/hashtag/posts?hashtag=rust&n_posts=3").await;
    assert_eq!(json["total_posts"], 2);
    assert_eq!(json["posts"][0]["text"], "Cached viral post body");

    let files: Vec<_> = std::fs::read_dir(dir.path())
        .expect("read dir")
        .filter_map(Result::ok)
        .map(|e| e.path())
        .collect();
    assert_eq!(files.len(), 1);
    let snapshot: Value =
        serde_json::from_slice(&std::fs::read(&files[0]).expect("read")).expect("json");
    assert_eq!(snapshot["total_posts"], 1);
    assert_eq!(snapshot["posts"][0]["text"], "Fresh hashtag post body");
}
