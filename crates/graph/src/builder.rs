use crate::error::{GraphError, Result};
use crate::input::AtlasInput;
use atlas_protocol::{AtlasEdge, AtlasNode, AtlasPack, AtlasStats, EdgeKind};
use petgraph::algo::connected_components;
use petgraph::graph::{NodeIndex, UnGraph};
use std::cmp::Ordering;
use std::collections::HashSet;

pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.8;
pub const DEFAULT_K_SIM: usize = 3;

const SIMILARITY_EPSILON: f32 = 1e-8;

/// Build a cosine k-nearest-neighbour graph over atlas nodes.
#[derive(Debug, Clone, Copy)]
pub struct AtlasBuilder {
    similarity_threshold: f32,
    k_sim: usize,
}

impl Default for AtlasBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_K_SIM)
    }
}

impl AtlasBuilder {
    #[must_use]
    pub fn new(similarity_threshold: f32, k_sim: usize) -> Self {
        Self {
            similarity_threshold,
            k_sim,
        }
    }

    /// Nodes plus deduplicated undirected edges.
    ///
    /// Each node links to at most `k_sim` neighbours with similarity at or above
    /// the threshold. An edge found from both ends is stored once, `source < target`.
    pub fn build(&self, repo_id: &str, input: AtlasInput) -> Result<AtlasPack> {
        let granularity = input.granularity();
        let nodes = input.into_nodes();
        check_dimensions(&nodes)?;

        let mut graph: UnGraph<(), f32> =
            UnGraph::with_capacity(nodes.len(), nodes.len() * self.k_sim);
        let indices: Vec<NodeIndex> = nodes.iter().map(|_| graph.add_node(())).collect();
        let mut edges = Vec::new();

        if nodes.len() >= 2 && self.k_sim > 0 {
            let norms: Vec<f32> = nodes.iter().map(|n| norm(&n.vector)).collect();
            let mut seen: HashSet<(String, String)> = HashSet::new();

            for (i, node) in nodes.iter().enumerate() {
                for (j, weight) in self.neighbours(i, &nodes, &norms) {
                    let other = &nodes[j];
                    if node.id == other.id || graph.find_edge(indices[i], indices[j]).is_some() {
                        continue;
                    }
                    let (source, target) = if node.id <= other.id {
                        (node.id.clone(), other.id.clone())
                    } else {
                        (other.id.clone(), node.id.clone())
                    };
                    if !seen.insert((source.clone(), target.clone())) {
                        continue;
                    }
                    graph.add_edge(indices[i], indices[j], weight);
                    edges.push(AtlasEdge {
                        source,
                        target,
                        kind: EdgeKind::Semantic,
                        weight,
                    });
                }
            }
        }

        let stats = AtlasStats {
            nodes: nodes.len(),
            edges: edges.len(),
            components: connected_components(&graph),
        };
        log::info!(
            "Atlas for '{repo_id}': {} nodes, {} edges, {} components (threshold {}, k_sim {})",
            stats.nodes,
            stats.edges,
            stats.components,
            self.similarity_threshold,
            self.k_sim
        );

        Ok(AtlasPack {
            repo_id: repo_id.to_string(),
            granularity,
            nodes,
            edges,
            stats,
        })
    }

    /// Top `k_sim` other nodes by cosine similarity that pass the threshold.
    fn neighbours(&self, i: usize, nodes: &[AtlasNode], norms: &[f32]) -> Vec<(usize, f32)> {
        let a = &nodes[i].vector;
        let mut scored: Vec<(usize, f32)> = nodes
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != i)
            .map(|(j, other)| {
                let dot: f32 = a.iter().zip(&other.vector).map(|(x, y)| x * y).sum();
                (j, dot / (norms[i] * norms[j] + SIMILARITY_EPSILON))
            })
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored
            .into_iter()
            .take(self.k_sim)
            .filter(|&(_, sim)| sim > 0.0 && sim >= self.similarity_threshold)
            .map(|(j, sim)| (j, sim.min(1.0)))
            .collect()
    }
}

/// Convenience wrapper over [`AtlasBuilder`].
pub fn build_atlas(
    repo_id: &str,
    input: AtlasInput,
    similarity_threshold: f32,
    k_sim: usize,
) -> Result<AtlasPack> {
    AtlasBuilder::new(similarity_threshold, k_sim).build(repo_id, input)
}

fn norm(vector: &[f32]) -> f32 {
    vector.iter().map(|v| v * v).sum::<f32>().sqrt()
}

fn check_dimensions(nodes: &[AtlasNode]) -> Result<()> {
    let Some(first) = nodes.first() else {
        return Ok(());
    };
    let expected = first.vector.len();
    match nodes.iter().find(|n| n.vector.len() != expected) {
        Some(bad) => Err(GraphError::DimensionMismatch {
            id: bad.id.clone(),
            expected,
            actual: bad.vector.len(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_cluster::{l2_normalize, ClusterAssignment, FileNode, NormalizedRecord};
    use atlas_protocol::AtlasGranularity;
    use atlas_vector_store::{PointId, PointPayload};
    use fastrand::Rng;
    use pretty_assertions::assert_eq;

    fn chunk(id: u64, file: &str, vector: Vec<f32>) -> ClusterAssignment {
        ClusterAssignment {
            record: NormalizedRecord {
                id: PointId::Num(id),
                filepath: file.to_string(),
                dirpath: atlas_cluster::dirpath_of(file),
                filename: atlas_cluster::filename_of(file),
                vector,
                payload: PointPayload::new(file, "fn f() {}").lines(3, 9),
            },
            cluster_id: 0,
            distance_to_centroid: 0.0,
        }
    }

    fn random_unit(rng: &mut Rng, dim: usize) -> Vec<f32> {
        let raw: Vec<f32> = (0..dim).map(|_| rng.f32() * 2.0 - 1.0).collect();
        l2_normalize(&raw)
    }

    #[test]
    fn fewer_than_two_nodes_have_no_edges() {
        let pack = build_atlas("r", AtlasInput::Chunks(vec![]), 0.0, 3).unwrap();
        assert!(pack.edges.is_empty());
        assert_eq!(pack.stats.components, 0);

        let single = AtlasInput::Chunks(vec![chunk(1, "a.rs", vec![1.0])]);
        let pack = build_atlas("r", single, 0.0, 3).unwrap();
        assert!(pack.edges.is_empty());
        assert_eq!(pack.stats.nodes, 1);
        assert_eq!(pack.stats.components, 1);
    }

    #[test]
    fn mutual_neighbours_produce_one_edge() {
        let chunks = vec![
            chunk(1, "src/a.rs", vec![1.0, 0.0]),
            chunk(2, "src/b.rs", vec![0.9, 0.1]),
            chunk(3, "src/c.rs", vec![0.0, 1.0]),
        ];
        let pack = build_atlas("demo", AtlasInput::Chunks(chunks), 0.8, 3).unwrap();

        assert_eq!(pack.granularity, AtlasGranularity::Chunk);
        assert_eq!(pack.edges.len(), 1);
        let edge = &pack.edges[0];
        assert_eq!((edge.source.as_str(), edge.target.as_str()), ("1", "2"));
        assert!(edge.weight > 0.99 && edge.weight <= 1.0);
        assert_eq!(pack.stats.components, 2);
        assert_eq!(pack.nodes[0].label, "a.rs:3-9");
    }

    #[test]
    fn never_duplicates_pairs_and_weights_stay_in_range() {
        let mut rng = Rng::with_seed(5);
        // Low-dimensional vectors so plenty of pairs clear a zero threshold.
        let chunks: Vec<_> = (0..30)
            .map(|i| chunk(i, &format!("f{}.rs", i % 4), random_unit(&mut rng, 3)))
            .collect();
        let pack = build_atlas("r", AtlasInput::Chunks(chunks), 0.0, 5).unwrap();
        assert!(!pack.edges.is_empty());

        let mut pairs = HashSet::new();
        for edge in &pack.edges {
            assert!(edge.source < edge.target);
            assert!(edge.weight > 0.0 && edge.weight <= 1.0);
            assert!(pairs.insert((edge.source.clone(), edge.target.clone())));
        }
    }

    #[test]
    fn random_high_dimensional_vectors_are_nearly_unconnected() {
        let mut rng = Rng::with_seed(42);
        let chunks: Vec<_> = (0..20)
            .map(|i| chunk(i, "x.rs", random_unit(&mut rng, 256)))
            .collect();
        let pack = build_atlas("r", AtlasInput::Chunks(chunks), 0.99, 3).unwrap();
        assert!(pack.edges.len() <= 1);
    }

    #[test]
    fn file_nodes_use_path_ids() {
        let files = vec![
            FileNode {
                filepath: "src/a.rs".into(),
                label: "a.rs".into(),
                dirpath: "src".into(),
                cluster_id: Some(0),
                chunk_count: 2,
                total_lines: 20,
                mean_vector: vec![1.0, 0.0],
                vectors: vec![vec![1.0, 0.0]; 2],
                excerpts: vec![],
            },
            FileNode {
                filepath: "src/b.rs".into(),
                label: "b.rs".into(),
                dirpath: "src".into(),
                cluster_id: Some(0),
                chunk_count: 1,
                total_lines: 5,
                mean_vector: vec![2.0, 0.0],
                vectors: vec![vec![2.0, 0.0]],
                excerpts: vec![],
            },
        ];
        let pack = AtlasBuilder::default().build("r", AtlasInput::Files(files)).unwrap();
        assert_eq!(pack.granularity, AtlasGranularity::File);
        assert_eq!(pack.edges.len(), 1);
        assert_eq!(pack.edges[0].source, "src/a.rs");
        assert_eq!(pack.stats.components, 1);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let chunks = vec![chunk(1, "a.rs", vec![1.0, 0.0]), chunk(2, "b.rs", vec![1.0])];
        assert!(matches!(
            build_atlas("r", AtlasInput::Chunks(chunks), 0.5, 3),
            Err(GraphError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn chunk_nodes_roundtrip_through_json() {
        let chunks = vec![chunk(1, "a.rs", vec![1.0, 0.0]), chunk(2, "b.rs", vec![1.0, 0.0])];
        let raw = serde_json::to_value(&chunks).unwrap();
        let input = AtlasInput::from_json(raw).unwrap();
        assert_eq!(input.granularity(), AtlasGranularity::Chunk);
        let pack = AtlasBuilder::default().build("r", input).unwrap();
        assert_eq!(pack.edges.len(), 1);
    }
}
