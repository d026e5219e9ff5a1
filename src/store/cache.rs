//! Local snapshot caches for fast cold start.
//!
//! The cached view is disposable: callers log and ignore every failure,
//! and a snapshot written by an incompatible build is treated as absent.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::SnapshotCache;
use crate::domain::ViewModel;
use crate::error::CacheError;

/// Bumped whenever the cached [`ViewModel`] layout changes.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    saved_at: DateTime<Utc>,
    view: serde_json::Value,
}

fn encode(view: &ViewModel) -> Result<Vec<u8>, CacheError> {
    let envelope = Envelope {
        version: SNAPSHOT_FORMAT_VERSION,
        saved_at: Utc::now(),
        view: serde_json::to_value(view)?,
    };
    Ok(serde_json::to_vec(&envelope)?)
}

fn decode(bytes: &[u8]) -> Result<Option<ViewModel>, CacheError> {
    let envelope: Envelope = serde_json::from_slice(bytes)?;
    if envelope.version != SNAPSHOT_FORMAT_VERSION {
        tracing::debug!(
            found = envelope.version,
            expected = SNAPSHOT_FORMAT_VERSION,
            "discarding snapshot from another format version"
        );
        return Ok(None);
    }
    Ok(Some(serde_json::from_value(envelope.view)?))
}

/// One JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileSnapshotCache {
    dir: PathBuf,
}

impl FileSnapshotCache {
    /// Creates a cache rooted at `dir`. The directory is created lazily.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the snapshots.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file}.json"))
    }
}

#[async_trait]
impl SnapshotCache for FileSnapshotCache {
    async fn get(&self, key: &str) -> Result<Option<ViewModel>, CacheError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => decode(&bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn set(&self, key: &str, view: &ViewModel) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        // One temp file per write, so concurrent writers never share one.
        let tmp = path.with_extension(format!("{}.json.tmp", uuid::Uuid::new_v4().simple()));
        let written = match tokio::fs::write(&tmp, encode(view)?).await {
            Ok(()) => tokio::fs::rename(&tmp, &path).await,
            Err(err) => Err(err),
        };
        if written.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        written.map_err(CacheError::from)
    }
}

/// Process-local cache, mostly for tests and demos.
#[derive(Debug, Default)]
pub struct MemorySnapshotCache {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemorySnapshotCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` if nothing is cached.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SnapshotCache for MemorySnapshotCache {
    async fn get(&self, key: &str) -> Result<Option<ViewModel>, CacheError> {
        match self.entries.read().await.get(key) {
            Some(bytes) => decode(bytes),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, view: &ViewModel) -> Result<(), CacheError> {
        let bytes = encode(view)?;
        self.entries.write().await.insert(key.to_string(), bytes);
        Ok(())
    }
}
