//! Qdrant-compatible HTTP vector index.

use anyhow::{Context, Result};
use async_trait::async_trait;
use atlas_vector_store::{decode_points, EmbeddedPoint, PointId, PointSource, VectorStoreError};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Largest page requested per scroll call.
pub const SCROLL_PAGE_SIZE: usize = 1000;
const MAX_RETRIES: usize = 3;

#[derive(Clone)]
pub struct QdrantClient {
    client: Client,
    base_url: String,
}

impl QdrantClient {
    pub fn new(base_url: &str, api_key: Option<&str>, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(
            base_url.starts_with("http://") || base_url.starts_with("https://"),
            "Qdrant URL must be an http(s) URL"
        );
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key.map(str::trim).filter(|key| !key.is_empty()) {
            headers.insert(
                "api-key",
                HeaderValue::from_str(key).context("invalid Qdrant API key")?,
            );
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build Qdrant HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, collection: &str, tail: &str) -> String {
        format!("{}/collections/{collection}/points/{tail}", self.base_url)
    }

    async fn post<B: Serialize + Sync>(
        &self,
        collection: &str,
        url: &str,
        body: &B,
    ) -> atlas_vector_store::Result<reqwest::Response> {
        let mut attempt = 0usize;
        loop {
            match self.client.post(url).json(body).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp);
                    }
                    if status == StatusCode::NOT_FOUND {
                        return Err(VectorStoreError::CollectionNotFound(collection.to_string()));
                    }
                    if should_retry(status) && attempt + 1 < MAX_RETRIES {
                        attempt += 1;
                        log::warn!("Qdrant returned {status}, retrying ({attempt}/{MAX_RETRIES})");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    let text = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    return Err(VectorStoreError::Backend(format!(
                        "Qdrant request failed ({status}): {text}"
                    )));
                }
                Err(err) => {
                    if (err.is_connect() || err.is_timeout()) && attempt + 1 < MAX_RETRIES {
                        attempt += 1;
                        log::warn!("Qdrant unreachable ({err}), retrying ({attempt}/{MAX_RETRIES})");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(VectorStoreError::Backend(format!("Qdrant request failed: {err}")));
                }
            }
        }
    }
}

#[async_trait]
impl PointSource for QdrantClient {
    async fn scroll(
        &self,
        collection: &str,
        limit: usize,
        with_vectors: bool,
    ) -> atlas_vector_store::Result<Vec<EmbeddedPoint>> {
        let url = self.url(collection, "scroll");
        let mut points: Vec<EmbeddedPoint> = Vec::new();
        let mut offset: Option<PointId> = None;

        while points.len() < limit {
            let request = ScrollRequest {
                limit: (limit - points.len()).min(SCROLL_PAGE_SIZE),
                with_payload: true,
                with_vector: with_vectors,
                offset: offset.take(),
            };
            let resp = self.post(collection, &url, &request).await?;
            let page: ScrollResponse = resp.json().await.map_err(|err| {
                VectorStoreError::Backend(format!("failed to parse Qdrant scroll response: {err}"))
            })?;
            let fetched = page.result.points.len();
            points.extend(decode_points(page.result.points));
            log::debug!("Scrolled {fetched} points from '{collection}' ({} total)", points.len());

            match page.result.next_page_offset {
                Some(next) if fetched > 0 => offset = Some(next),
                _ => break,
            }
        }

        points.truncate(limit);
        log::info!("Scrolled {} points from Qdrant collection '{collection}'", points.len());
        Ok(points)
    }

    async fn set_payload(
        &self,
        collection: &str,
        payload: Map<String, Value>,
        point_ids: &[PointId],
    ) -> atlas_vector_store::Result<()> {
        if point_ids.is_empty() {
            return Ok(());
        }
        let url = format!("{}?wait=true", self.url(collection, "payload"));
        let request = SetPayloadRequest {
            payload: &payload,
            points: point_ids,
        };
        self.post(collection, &url, &request).await?;
        log::debug!("Patched payload of {} points in '{collection}'", point_ids.len());
        Ok(())
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(250 * (1 << capped))
}

#[derive(Serialize)]
struct ScrollRequest {
    limit: usize,
    with_payload: bool,
    with_vector: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<PointId>,
}

#[derive(Serialize)]
struct SetPayloadRequest<'a> {
    payload: &'a Map<String, Value>,
    points: &'a [PointId],
}

#[derive(Debug, Deserialize)]
struct ScrollResponse {
    result: ScrollResult,
}

#[derive(Debug, Deserialize)]
struct ScrollResult {
    #[serde(default)]
    points: Vec<Value>,
    #[serde(default)]
    next_page_offset: Option<PointId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scroll_page_parses_points_and_cursor() {
        let raw = r#"{"result": {"points": [
            {"id": 7, "payload": {"filepath": "src/a.py", "excerpt": "def a(): ..."}, "vector": [0.1, 0.2]},
            {"id": "5c56c793-69f3-4fbf-87e6-c4bf54c28c26", "payload": {"filepath": "src/b.py"}},
            {"id": 8, "payload": {"filepath": null, "start_line_no": "12"}, "vector": [0.3, 0.4]},
            {"payload": {"filepath": "src/orphan.py"}}
        ], "next_page_offset": 9}, "status": "ok", "time": 0.001}"#;
        let page: ScrollResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(page.result.next_page_offset, Some(PointId::Num(9)));

        let points = decode_points(page.result.points);
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].id, PointId::Num(7));
        assert_eq!(points[1].vector, None);
        assert_eq!(points[2].payload.filepath, "");
        assert_eq!(points[2].payload.start_line, Some(12));
    }

    #[test]
    fn scroll_request_omits_missing_offset() {
        let request = ScrollRequest {
            limit: 10,
            with_payload: true,
            with_vector: true,
            offset: None,
        };
        let raw = serde_json::to_value(&request).unwrap();
        assert!(raw.get("offset").is_none());
        assert_eq!(raw["with_vector"], true);
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(QdrantClient::new("localhost:6333", None, Duration::from_secs(1)).is_err());
        assert!(QdrantClient::new("http://localhost:6333/", None, Duration::from_secs(1)).is_ok());
    }
}
