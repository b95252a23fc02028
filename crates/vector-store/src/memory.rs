use crate::error::{Result, VectorStoreError};
use crate::source::PointSource;
use crate::types::{EmbeddedPoint, PointId};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;

/// In-process collection set, used for tests and for piping pre-fetched points.
#[derive(Debug, Default)]
pub struct MemoryCollection {
    collections: RwLock<BTreeMap<String, Vec<EmbeddedPoint>>>,
}

impl MemoryCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, collection: impl Into<String>, points: Vec<EmbeddedPoint>) {
        self.collections
            .write()
            .await
            .entry(collection.into())
            .or_default()
            .extend(points);
    }

    pub async fn points(&self, collection: &str) -> Option<Vec<EmbeddedPoint>> {
        self.collections.read().await.get(collection).cloned()
    }

    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl PointSource for MemoryCollection {
    async fn scroll(
        &self,
        collection: &str,
        limit: usize,
        with_vectors: bool,
    ) -> Result<Vec<EmbeddedPoint>> {
        let guard = self.collections.read().await;
        let points = guard
            .get(collection)
            .ok_or_else(|| VectorStoreError::CollectionNotFound(collection.to_string()))?;
        Ok(points
            .iter()
            .take(limit)
            .map(|point| {
                let mut point = point.clone();
                if !with_vectors {
                    point.vector = None;
                }
                point
            })
            .collect())
    }

    async fn set_payload(
        &self,
        collection: &str,
        payload: Map<String, Value>,
        point_ids: &[PointId],
    ) -> Result<()> {
        let mut guard = self.collections.write().await;
        let points = guard
            .get_mut(collection)
            .ok_or_else(|| VectorStoreError::CollectionNotFound(collection.to_string()))?;
        apply_payload(points, &payload, point_ids)
    }
}

pub(crate) fn apply_payload(
    points: &mut [EmbeddedPoint],
    payload: &Map<String, Value>,
    point_ids: &[PointId],
) -> Result<()> {
    let wanted: HashSet<&PointId> = point_ids.iter().collect();
    let mut patched = 0usize;
    for point in points.iter_mut().filter(|p| wanted.contains(&p.id)) {
        point.payload.merge(payload)?;
        patched += 1;
    }
    if patched < wanted.len() {
        log::warn!(
            "set_payload: {} of {} point ids were not found",
            wanted.len() - patched,
            wanted.len()
        );
    }
    Ok(())
}
