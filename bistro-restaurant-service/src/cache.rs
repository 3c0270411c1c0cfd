use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// A single cached value with a freshness window. Cache faults never
/// surface as errors; a miss just means the caller rebuilds.
#[async_trait]
pub trait Cache<T>: Send + Sync {
    async fn get(&self) -> Option<T>;

    async fn put(&self, value: &T);

    async fn invalidate(&self);
}

/// JSON blob on disk, fresh while its mtime is younger than `ttl`.
pub struct FileCache<T> {
    path: PathBuf,
    ttl: Duration,
    _value: PhantomData<fn() -> T>,
}

impl<T> FileCache<T> {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
            _value: PhantomData,
        }
    }

    async fn is_fresh(&self) -> bool {
        let modified = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            Err(_) => return false,
        };
        // An mtime in the future counts as just written.
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default();
        age < self.ttl
    }
}

#[async_trait]
impl<T> Cache<T> for FileCache<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    async fn get(&self) -> Option<T> {
        if !self.is_fresh().await {
            debug!(path = %self.path.display(), "cache miss");
            return None;
        }
        let bytes = tokio::fs::read(&self.path).await.ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "discarding unreadable cache");
                None
            }
        }
    }

    async fn put(&self, value: &T) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "cannot serialize cache value");
                return;
            }
        };
        // Readers only ever see a complete file.
        let staging = self
            .path
            .with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        if let Err(err) = tokio::fs::write(&staging, &bytes).await {
            warn!(path = %staging.display(), error = %err, "cannot write cache");
            return;
        }
        if let Err(err) = tokio::fs::rename(&staging, &self.path).await {
            warn!(path = %self.path.display(), error = %err, "cannot replace cache");
            let _ = tokio::fs::remove_file(&staging).await;
        }
    }

    async fn invalidate(&self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "cache invalidated"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(path = %self.path.display(), error = %err, "cannot invalidate cache"),
        }
    }
}

/// Process-local cache slot.
pub struct MemoryCache<T> {
    ttl: Duration,
    slot: RwLock<Option<(Instant, T)>>,
}

impl<T> MemoryCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::new(None),
        }
    }
}

#[async_trait]
impl<T> Cache<T> for MemoryCache<T>
where
    T: Clone + Send + Sync,
{
    async fn get(&self) -> Option<T> {
        match &*self.slot.read().await {
            Some((stored_at, value)) if stored_at.elapsed() < self.ttl => Some(value.clone()),
            _ => None,
        }
    }

    async fn put(&self, value: &T) {
        *self.slot.write().await = Some((Instant::now(), value.clone()));
    }

    async fn invalidate(&self) {
        *self.slot.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
    struct Doc {
        name: String,
    }

    fn doc(name: &str) -> Doc {
        Doc {
            name: name.to_string(),
        }
    }

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("bistro-cache-{}.json", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_file_cache_round_trip_and_invalidate() {
        let path = temp_path();
        let cache = FileCache::<Doc>::new(&path, Duration::from_secs(60));

        assert_eq!(cache.get().await, None);
        cache.put(&doc("menu")).await;
        assert_eq!(cache.get().await, Some(doc("menu")));

        cache.invalidate().await;
        assert_eq!(cache.get().await, None);
        assert!(!path.exists());

        // Invalidating a missing file is fine.
        cache.invalidate().await;
    }

    #[tokio::test]
    async fn test_file_cache_expires_with_ttl() {
        let path = temp_path();
        let cache = FileCache::<Doc>::new(&path, Duration::ZERO);

        cache.put(&doc("menu")).await;

        assert!(path.exists());
        assert_eq!(cache.get().await, None);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_file_cache_ignores_corrupt_file() {
        let path = temp_path();
        std::fs::write(&path, b"{not json").unwrap();
        let cache = FileCache::<Doc>::new(&path, Duration::from_secs(60));

        assert_eq!(cache.get().await, None);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_memory_cache() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        cache.put(&doc("settings")).await;
        assert_eq!(cache.get().await, Some(doc("settings")));

        cache.invalidate().await;
        assert_eq!(cache.get().await, None);

        let expired = MemoryCache::new(Duration::ZERO);
        expired.put(&doc("settings")).await;
        assert_eq!(expired.get().await, None);
    }
}
