//! Optional JSON snapshots of freshly scraped batches.

use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use postpulse_core::{Post, PostSource};
use serde::Serialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

const MAX_NAME_ATTEMPTS: u32 = 1000;

#[derive(Debug, Serialize)]
struct Snapshot<'a> {
    source: PostSource,
    identifier: &'a str,
    exported_at: DateTime<Utc>,
    total_posts: usize,
    posts: &'a [Post],
}

/// Writes `<dir>/{profile|hashtag}_<identifier>_<YYYYmmdd_HHMMSS>[_k].json`.
#[derive(Debug, Clone)]
pub struct JsonExporter {
    dir: PathBuf,
}

impl JsonExporter {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Write one snapshot and return its path. Snapshots taken within the
    /// same second get a `_1`, `_2`, ... suffix instead of replacing each other.
    pub async fn export(
        &self,
        source: PostSource,
        identifier: &str,
        posts: &[Post],
    ) -> anyhow::Result<PathBuf> {
        let exported_at = Utc::now();
        let stem = format!(
            "{source}_{}_{}",
            file_safe(identifier),
            exported_at.format("%Y%m%d_%H%M%S")
        );

        let body = serde_json::to_vec_pretty(&Snapshot {
            source,
            identifier,
            exported_at,
            total_posts: posts.len(),
            posts,
        })
        .context("serializing post snapshot")?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating export dir {}", self.dir.display()))?;
        let (path, mut file) = self.create_unique(&stem).await?;
        file.write_all(&body)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing {}", path.display()))?;

        tracing::info!(path = %path.display(), total_posts = posts.len(), "exported posts");
        Ok(path)
    }

    async fn create_unique(&self, stem: &str) -> anyhow::Result<(PathBuf, File)> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{stem}.json")
            } else {
                format!("{stem}_{attempt}.json")
            };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("creating {}", path.display()));
                }
            }
        }
        anyhow::bail!("no free export file name for {stem} in {}", self.dir.display())
    }
}

fn file_safe(identifier: &str) -> String {
    identifier
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
