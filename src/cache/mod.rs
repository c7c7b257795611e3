//! Client token cache
//!
//! Holds the one opaque session token a client presents on reconnect, the
//! way a browser cookie would. Two implementations:
//! - file-backed (default): survives process restarts
//! - in-memory (moka): fallback when the file store cannot be set up
//!
//! All operations are deliberately infallible. A store that cannot be read
//! or written behaves like an empty cache; auto-login then simply reports
//! a missing token instead of surfacing an I/O error.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Single cache slot key for the in-memory store
const TOKEN_KEY: &str = "session_token";

/// Client-side token cache trait
#[async_trait]
pub trait TokenCache: Send + Sync {
    /// Read the cached token, if any
    async fn get(&self) -> Option<String>;

    /// Replace the cached token
    async fn set(&self, token: &str);

    /// Remove the cached token. A no-op when nothing is cached.
    async fn clear(&self);
}

/// In-memory token cache backed by moka.
///
/// Entries age out after 30 days, matching the longest-lived token kind.
pub struct MemoryTokenCache {
    cache: moka::future::Cache<&'static str, String>,
}

impl MemoryTokenCache {
    pub fn new() -> Self {
        Self {
            cache: moka::future::Cache::builder()
                .max_capacity(1)
                .time_to_live(Duration::from_secs(30 * 24 * 3600))
                .build(),
        }
    }
}

impl Default for MemoryTokenCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenCache for MemoryTokenCache {
    async fn get(&self) -> Option<String> {
        self.cache.get(&TOKEN_KEY).await
    }

    async fn set(&self, token: &str) {
        self.cache.insert(TOKEN_KEY, token.to_string()).await;
    }

    async fn clear(&self) {
        self.cache.invalidate(&TOKEN_KEY).await;
    }
}

/// File-backed token cache.
///
/// Stores the raw token string in a single file. Read and write failures
/// are logged at debug level and reported as an empty cache.
pub struct FileTokenCache {
    path: PathBuf,
}

impl FileTokenCache {
    /// Set up a file-backed cache at `path`, creating the parent directory.
    pub fn new(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(Self { path })
    }
}

#[async_trait]
impl TokenCache for FileTokenCache {
    async fn get(&self) -> Option<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let token = contents.trim();
                if token.is_empty() {
                    None
                } else {
                    Some(token.to_string())
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::debug!("Token cache read failed: {}", e);
                None
            }
        }
    }

    async fn set(&self, token: &str) {
        if let Err(e) = tokio::fs::write(&self.path, token).await {
            tracing::debug!("Token cache write failed: {}", e);
        }
    }

    async fn clear(&self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::debug!("Token cache clear failed: {}", e),
        }
    }
}

/// Create a token cache, preferring the file-backed store.
///
/// Falls back to the in-memory cache when the file store cannot be set up,
/// so a read-only filesystem degrades the cache instead of failing startup.
pub fn create_token_cache(path: Option<&Path>) -> Arc<dyn TokenCache> {
    match path {
        Some(path) => match FileTokenCache::new(path) {
            Ok(cache) => Arc::new(cache),
            Err(e) => {
                tracing::warn!(
                    "Falling back to in-memory token cache, file store unavailable at {:?}: {}",
                    path,
                    e
                );
                Arc::new(MemoryTokenCache::new())
            }
        },
        None => Arc::new(MemoryTokenCache::new()),
    }
}
