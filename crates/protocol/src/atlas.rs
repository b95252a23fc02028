use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Node granularity of an atlas graph.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AtlasGranularity {
    Chunk,
    File,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct AtlasNode {
    pub id: String,
    pub label: String,
    pub filepath: String,
    pub dirpath: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<usize>,

    // Chunk-level detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,

    // File-level detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<usize>,

    pub vector: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Semantic,
}

/// Undirected edge, stored once with `source < target`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct AtlasEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
    /// Cosine similarity, in `(0, 1]`.
    pub weight: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, JsonSchema)]
pub struct AtlasStats {
    pub nodes: usize,
    pub edges: usize,
    pub components: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct AtlasPack {
    pub repo_id: String,
    pub granularity: AtlasGranularity,
    pub nodes: Vec<AtlasNode>,
    pub edges: Vec<AtlasEdge>,
    pub stats: AtlasStats,
}
