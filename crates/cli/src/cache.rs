use anyhow::{Context, Result};
use async_trait::async_trait;
use atlas_protocol::RepoSummary;
use atlas_vector_store::EmbeddedPoint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::sync::RwLock;

/// SHA-256 over `filepath ∥ excerpt` of every point, in input order, as lowercase hex.
pub fn content_hash(points: &[EmbeddedPoint]) -> String {
    let mut hasher = Sha256::new();
    for point in points {
        hasher.update(point.payload.filepath.as_bytes());
        hasher.update(point.payload.excerpt.as_bytes());
    }
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub repo_id: String,
    pub content_hash: String,
}

impl CacheKey {
    pub fn new(repo_id: impl Into<String>, content_hash: impl Into<String>) -> Self {
        Self {
            repo_id: repo_id.into(),
            content_hash: content_hash.into(),
        }
    }
}

/// Map-like summary store keyed by `(repo_id, content_hash)`.
///
/// Concurrent misses for one key may both compute; the last `put` wins.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<Arc<RepoSummary>>>;

    async fn put(&self, key: CacheKey, summary: Arc<RepoSummary>) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemorySummaryStore {
    entries: RwLock<HashMap<CacheKey, Arc<RepoSummary>>>,
}

impl MemorySummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl SummaryStore for MemorySummaryStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<Arc<RepoSummary>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: CacheKey, summary: Arc<RepoSummary>) -> Result<()> {
        self.entries.write().await.insert(key, summary);
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug)]
struct CacheEnvelope<T> {
    created_ms: u64,
    repo_id: String,
    content_hash: String,
    data: T,
}

/// One JSON envelope per key under `dir`. Unreadable envelopes count as misses.
#[derive(Debug, Clone)]
pub struct FileSummaryStore {
    dir: PathBuf,
}

impl FileSummaryStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        let repo: String = key
            .repo_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("summary_{repo}_{}.json", key.content_hash))
    }
}

#[async_trait]
impl SummaryStore for FileSummaryStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<Arc<RepoSummary>>> {
        let path = self.path_for(key);
        let Ok(bytes) = fs::read(&path).await else {
            return Ok(None);
        };

        let envelope: CacheEnvelope<RepoSummary> = match serde_json::from_slice(&bytes) {
            Ok(val) => val,
            Err(err) => {
                log::warn!("Summary cache corrupted {}: {err}", path.display());
                return Ok(None);
            }
        };

        if envelope.repo_id != key.repo_id || envelope.content_hash != key.content_hash {
            log::warn!("Summary cache key mismatch in {}", path.display());
            return Ok(None);
        }
        Ok(Some(Arc::new(envelope.data)))
    }

    async fn put(&self, key: CacheKey, summary: Arc<RepoSummary>) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Cannot create cache dir {}", self.dir.display()))?;
        let path = self.path_for(&key);
        let bytes = {
            let envelope = CacheEnvelope {
                created_ms: unix_ms_now(),
                repo_id: key.repo_id,
                content_hash: key.content_hash,
                data: summary.as_ref(),
            };
            serde_json::to_vec_pretty(&envelope)?
        };
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &path).await?;
        log::debug!("Cached summary at {}", path.display());
        Ok(())
    }
}

/// A summary and whether it came from the store.
#[derive(Debug, Clone)]
pub struct CachedSummary {
    pub summary: Arc<RepoSummary>,
    pub hit: bool,
}

/// Return the stored summary for this exact point set, or compute and store it.
///
/// `compute` receives the content hash. Every `Ok` result is stored, including
/// ones that carry failed clusters or an `error`. Errors from `compute`
/// propagate and leave the store untouched.
pub async fn get_or_compute<F, Fut>(
    store: &dyn SummaryStore,
    repo_id: &str,
    points: &[EmbeddedPoint],
    compute: F,
) -> Result<CachedSummary>
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<RepoSummary>>,
{
    let key = CacheKey::new(repo_id, content_hash(points));
    if let Some(summary) = store.get(&key).await? {
        log::info!("Summary cache hit for '{repo_id}' ({})", key.content_hash);
        return Ok(CachedSummary { summary, hit: true });
    }

    log::info!("Summary cache miss for '{repo_id}' ({})", key.content_hash);
    let summary = Arc::new(compute(key.content_hash.clone()).await?);
    if !summary.is_complete() {
        log::warn!("Caching incomplete summary for '{repo_id}'");
    }
    store.put(key, Arc::clone(&summary)).await?;
    Ok(CachedSummary {
        summary,
        hit: false,
    })
}

fn unix_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_protocol::ClusterFailure;
    use atlas_vector_store::PointPayload;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn points(excerpt: &str) -> Vec<EmbeddedPoint> {
        vec![
            EmbeddedPoint::new(1u64, vec![1.0, 0.0], PointPayload::new("src/a.rs", "fn a() {}")),
            EmbeddedPoint::new(2u64, vec![0.0, 1.0], PointPayload::new("src/b.rs", excerpt)),
        ]
    }

    fn complete(hash: &str) -> RepoSummary {
        RepoSummary::empty("demo", hash)
    }

    #[test]
    fn hash_is_hex_sha256_and_order_sensitive() {
        let a = content_hash(&points("fn b() {}"));
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));

        let mut reversed = points("fn b() {}");
        reversed.reverse();
        assert_ne!(a, content_hash(&reversed));
        assert_eq!(
            content_hash(&[]),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn second_call_returns_the_stored_object() {
        let store = MemorySummaryStore::new();
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let input = points("fn b() {}");

        let first = get_or_compute(&store, "demo", &input, |hash| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(complete(&hash))
        })
        .await
        .unwrap();
        let second = get_or_compute(&store, "demo", &input, |hash| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(complete(&hash))
        })
        .await
        .unwrap();

        assert!(!first.hit);
        assert!(second.hit);
        assert!(Arc::ptr_eq(&first.summary, &second.summary));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn changed_excerpt_forces_recompute() {
        let store = MemorySummaryStore::new();
        let first = get_or_compute(&store, "demo", &points("fn b() {}"), |hash| async move {
            Ok(complete(&hash))
        })
        .await
        .unwrap();
        let second = get_or_compute(&store, "demo", &points("fn b() { 1 }"), |hash| async move {
            Ok(complete(&hash))
        })
        .await
        .unwrap();

        assert!(!second.hit);
        assert_ne!(first.summary.content_hash, second.summary.content_hash);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn incomplete_summary_is_reused_on_the_next_call() {
        let store = MemorySummaryStore::new();
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let input = points("fn b() {}");
        let with_failure = |hash: String| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut summary = complete(&hash);
            summary.failed_clusters.push(ClusterFailure {
                cluster_id: "2".to_string(),
                error: "ungrounded file references".to_string(),
                raw_output: String::new(),
                attempts: 2,
            });
            Ok(summary)
        };

        let first = get_or_compute(&store, "demo", &input, with_failure).await.unwrap();
        let second = get_or_compute(&store, "demo", &input, with_failure).await.unwrap();

        assert!(!first.hit);
        assert!(second.hit);
        assert_eq!(second.summary.failed_clusters.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn compute_errors_are_not_stored() {
        let store = MemorySummaryStore::new();
        let failed = get_or_compute(&store, "demo", &points("fn b() {}"), |_hash| async move {
            Err(anyhow::anyhow!("vector index unreachable"))
        })
        .await;
        assert!(failed.is_err());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn file_store_round_trips_and_treats_corruption_as_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSummaryStore::new(dir.path().join("cache"));
        let key = CacheKey::new("org/demo", "abc123");

        assert!(store.get(&key).await.unwrap().is_none());
        store
            .put(key.clone(), Arc::new(complete("abc123")))
            .await
            .unwrap();
        let loaded = store.get(&key).await.unwrap().unwrap();
        assert_eq!(loaded.content_hash, "abc123");
        assert!(store.path_for(&key).ends_with("summary_org_demo_abc123.json"));

        std::fs::write(store.path_for(&key), b"{ not json").unwrap();
        assert!(store.get(&key).await.unwrap().is_none());
    }
}
