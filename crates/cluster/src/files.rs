use crate::kmeans::ClusterAssignment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// All chunks of one file folded into a single graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileNode {
    pub filepath: String,
    /// Basename of `filepath`.
    pub label: String,
    /// Parent directory, empty for top-level files.
    pub dirpath: String,
    /// Cluster of the first chunk seen for this file.
    pub cluster_id: Option<usize>,
    pub chunk_count: usize,
    #[serde(rename = "loc")]
    pub total_lines: usize,
    /// Arithmetic mean of the chunk vectors, not re-normalized.
    #[serde(rename = "vector")]
    pub mean_vector: Vec<f32>,
    pub vectors: Vec<Vec<f32>>,
    pub excerpts: Vec<String>,
}

impl FileNode {
    fn start(assignment: &ClusterAssignment) -> Self {
        let filepath = assignment.record.filepath.clone();
        let (dirpath, label) = match filepath.rsplit_once('/') {
            Some((dir, name)) => (dir.to_string(), name.to_string()),
            None => (String::new(), filepath.clone()),
        };
        Self {
            filepath,
            label,
            dirpath,
            cluster_id: Some(assignment.cluster_id),
            chunk_count: 0,
            total_lines: 0,
            mean_vector: Vec::new(),
            vectors: Vec::new(),
            excerpts: Vec::new(),
        }
    }

    fn push(&mut self, assignment: &ClusterAssignment) {
        let record = &assignment.record;
        self.chunk_count += 1;
        self.total_lines += record.payload.line_count();
        self.vectors.push(record.vector.clone());
        if !record.payload.excerpt.is_empty() {
            self.excerpts.push(record.payload.excerpt.clone());
        }
    }

    fn finish(mut self) -> Self {
        self.mean_vector = mean_of(&self.vectors);
        self
    }
}

fn mean_of(vectors: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };
    let mut sum = vec![0.0f32; first.len()];
    for vector in vectors {
        for (acc, v) in sum.iter_mut().zip(vector) {
            *acc += v;
        }
    }
    let count = vectors.len() as f32;
    sum.iter_mut().for_each(|v| *v /= count);
    sum
}

/// Group chunk-level assignments by file path, sorted by path.
#[must_use]
pub fn aggregate_to_files(assignments: &[ClusterAssignment]) -> Vec<FileNode> {
    let mut files: BTreeMap<&str, FileNode> = BTreeMap::new();
    for assignment in assignments {
        files
            .entry(assignment.record.filepath.as_str())
            .or_insert_with(|| FileNode::start(assignment))
            .push(assignment);
    }
    let nodes: Vec<FileNode> = files.into_values().map(FileNode::finish).collect();
    log::info!(
        "Aggregated {} chunks into {} file nodes",
        assignments.len(),
        nodes.len()
    );
    nodes
}
