use crate::error::{GraphError, Result};
use atlas_cluster::{ClusterAssignment, FileNode};
use atlas_protocol::{AtlasGranularity, AtlasNode};
use serde_json::Value;

/// Node set handed to the atlas builder.
#[derive(Debug, Clone)]
pub enum AtlasInput {
    Chunks(Vec<ClusterAssignment>),
    Files(Vec<FileNode>),
}

impl AtlasInput {
    #[must_use]
    pub fn granularity(&self) -> AtlasGranularity {
        match self {
            Self::Chunks(_) => AtlasGranularity::Chunk,
            Self::Files(_) => AtlasGranularity::File,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Chunks(chunks) => chunks.len(),
            Self::Files(files) => files.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parse a JSON node array, detecting file-level input by its aggregation fields.
    pub fn from_json(raw: Value) -> Result<Self> {
        let Value::Array(items) = raw else {
            return Err(GraphError::InvalidInput("expected a JSON array of nodes".into()));
        };
        match detect_granularity(&items) {
            AtlasGranularity::File => {
                let files = serde_json::from_value(Value::Array(items))?;
                Ok(Self::Files(files))
            }
            AtlasGranularity::Chunk => {
                let chunks = serde_json::from_value(Value::Array(items))?;
                Ok(Self::Chunks(chunks))
            }
        }
    }

    pub(crate) fn into_nodes(self) -> Vec<AtlasNode> {
        match self {
            Self::Chunks(chunks) => chunks.into_iter().map(chunk_node).collect(),
            Self::Files(files) => files.into_iter().map(file_node).collect(),
        }
    }
}

/// File-level when the first node carries both `chunk_count` and `vectors`.
#[must_use]
pub fn detect_granularity(items: &[Value]) -> AtlasGranularity {
    match items.first() {
        Some(Value::Object(first))
            if first.contains_key("chunk_count") && first.contains_key("vectors") =>
        {
            AtlasGranularity::File
        }
        _ => AtlasGranularity::Chunk,
    }
}

fn chunk_node(chunk: ClusterAssignment) -> AtlasNode {
    let record = chunk.record;
    let range = |line: Option<usize>| line.map(|l| l.to_string()).unwrap_or_default();
    AtlasNode {
        id: record.id.to_string(),
        label: format!(
            "{}:{}-{}",
            record.filename,
            range(record.payload.start_line),
            range(record.payload.end_line)
        ),
        filepath: record.filepath,
        dirpath: record.dirpath,
        cluster_id: Some(chunk.cluster_id),
        start_line: record.payload.start_line,
        end_line: record.payload.end_line,
        excerpt: Some(record.payload.excerpt),
        chunk_count: None,
        loc: None,
        vector: record.vector,
    }
}

fn file_node(file: FileNode) -> AtlasNode {
    AtlasNode {
        id: file.filepath.clone(),
        label: file.label,
        filepath: file.filepath,
        dirpath: file.dirpath,
        cluster_id: file.cluster_id,
        start_line: None,
        end_line: None,
        excerpt: None,
        chunk_count: Some(file.chunk_count),
        loc: Some(file.total_lines),
        vector: file.mean_vector,
    }
}
