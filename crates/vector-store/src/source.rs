use crate::error::Result;
use crate::types::{EmbeddedPoint, PointId};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Vector-index capability: a bulk point source plus a payload patcher.
#[async_trait]
pub trait PointSource: Send + Sync {
    /// Return up to `limit` points of `collection`, in index order.
    async fn scroll(
        &self,
        collection: &str,
        limit: usize,
        with_vectors: bool,
    ) -> Result<Vec<EmbeddedPoint>>;

    /// Merge `payload` into the payload of every point in `point_ids`.
    async fn set_payload(
        &self,
        collection: &str,
        payload: Map<String, Value>,
        point_ids: &[PointId],
    ) -> Result<()>;
}
