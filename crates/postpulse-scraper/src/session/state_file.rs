//! Persisted browser session (cookies plus `localStorage`).
//!
//! The file holds a live login, so it is written atomically and only ever
//! replaced whole.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScraperError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    /// Seconds since the Unix epoch; `None` or negative for session cookies.
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

impl StoredCookie {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires
            .is_some_and(|expires| expires > 0.0 && expires < now.timestamp() as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub saved_at: DateTime<Utc>,
    pub cookies: Vec<StoredCookie>,
    #[serde(default)]
    pub local_storage: BTreeMap<String, String>,
}

impl SessionSnapshot {
    /// Cookies still valid at `now`.
    pub fn live_cookies(&self, now: DateTime<Utc>) -> impl Iterator<Item = &StoredCookie> {
        self.cookies.iter().filter(move |c| !c.is_expired(now))
    }
}

/// Read a snapshot. A missing file is `Ok(None)`.
///
/// # Errors
///
/// Returns [`ScraperError::SessionStateIo`] or [`ScraperError::SessionStateParse`]
/// when the file exists but cannot be read or decoded.
pub async fn load_snapshot(path: &Path) -> Result<Option<SessionSnapshot>, ScraperError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ScraperError::SessionStateIo {
                path: path.display().to_string(),
                source,
            })
        }
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| ScraperError::SessionStateParse {
            path: path.display().to_string(),
            source,
        })
}

/// Write a snapshot via a sibling temp file and rename.
///
/// # Errors
///
/// Returns [`ScraperError::SessionStateIo`] if any filesystem step fails.
pub async fn save_snapshot(path: &Path, snapshot: &SessionSnapshot) -> Result<(), ScraperError> {
    let io_err = |source: std::io::Error| ScraperError::SessionStateIo {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let body = serde_json::to_vec_pretty(snapshot).map_err(|source| {
        ScraperError::SessionStateParse {
            path: path.display().to_string(),
            source,
        }
    })?;

    let tmp = temp_path(path);
    if let Err(e) = tokio::fs::write(&tmp, body).await {
        tokio::fs::remove_file(&tmp).await.ok();
        return Err(io_err(e));
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        tokio::fs::remove_file(&tmp).await.ok();
        return Err(io_err(e));
    }
    Ok(())
}

/// Sibling temp name, unique per process and per save.
fn temp_path(path: &Path) -> PathBuf {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(format!(
        ".{}.{}.tmp",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    ));
    path.with_file_name(name)
}
