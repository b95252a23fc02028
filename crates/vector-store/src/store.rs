use crate::error::{Result, VectorStoreError};
use crate::memory::apply_payload;
use crate::source::PointSource;
use crate::types::{decode_points, EmbeddedPoint, PointId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

pub const POINT_COLLECTION_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone)]
enum Layout {
    /// `{dir}/{collection}.json`
    Directory(PathBuf),
    /// Every collection name resolves to the same file.
    SingleFile(PathBuf),
}

/// File-backed collection set. Files hold either a versioned envelope or a bare point array.
#[derive(Debug)]
pub struct JsonCollection {
    layout: Layout,
    write_lock: Mutex<()>,
}

#[derive(Debug, Serialize)]
struct PersistedCollection {
    schema_version: u32,
    points: Vec<EmbeddedPoint>,
}

/// Points stay raw until [`decode_points`] so one bad record is skipped, not fatal.
#[derive(Deserialize)]
struct RawCollection {
    schema_version: u32,
    points: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OnDisk {
    Versioned(RawCollection),
    Bare(Vec<Value>),
}

impl JsonCollection {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            layout: Layout::Directory(dir.as_ref().to_path_buf()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn single_file(path: impl AsRef<Path>) -> Self {
        Self {
            layout: Layout::SingleFile(path.as_ref().to_path_buf()),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path_for(&self, collection: &str) -> PathBuf {
        match &self.layout {
            Layout::Directory(dir) => dir.join(format!("{}.json", safe_component(collection))),
            Layout::SingleFile(path) => path.clone(),
        }
    }

    pub async fn load(&self, collection: &str) -> Result<Vec<EmbeddedPoint>> {
        let path = self.path_for(collection);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(VectorStoreError::CollectionNotFound(collection.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_slice::<OnDisk>(&bytes)? {
            OnDisk::Bare(points) => Ok(decode_points(points)),
            OnDisk::Versioned(persisted) => {
                if persisted.schema_version != POINT_COLLECTION_SCHEMA_VERSION {
                    return Err(VectorStoreError::SchemaVersion {
                        expected: POINT_COLLECTION_SCHEMA_VERSION,
                        actual: persisted.schema_version,
                    });
                }
                Ok(decode_points(persisted.points))
            }
        }
    }

    pub async fn save(&self, collection: &str, points: Vec<EmbeddedPoint>) -> Result<()> {
        let path = self.path_for(collection);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let persisted = PersistedCollection {
            schema_version: POINT_COLLECTION_SCHEMA_VERSION,
            points,
        };
        let bytes = serde_json::to_vec_pretty(&persisted)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        log::debug!("Saved {} points to {}", persisted.points.len(), path.display());
        Ok(())
    }
}

#[async_trait]
impl PointSource for JsonCollection {
    async fn scroll(
        &self,
        collection: &str,
        limit: usize,
        with_vectors: bool,
    ) -> Result<Vec<EmbeddedPoint>> {
        let mut points = self.load(collection).await?;
        points.truncate(limit);
        if !with_vectors {
            for point in &mut points {
                point.vector = None;
            }
        }
        log::info!(
            "Loaded {} points for '{collection}' from {}",
            points.len(),
            self.path_for(collection).display()
        );
        Ok(points)
    }

    async fn set_payload(
        &self,
        collection: &str,
        payload: Map<String, Value>,
        point_ids: &[PointId],
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut points = self.load(collection).await?;
        apply_payload(&mut points, &payload, point_ids)?;
        self.save(collection, points).await
    }
}

fn safe_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        "_".to_string()
    } else {
        out
    }
}
