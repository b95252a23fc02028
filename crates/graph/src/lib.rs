//! # Atlas Graph
//!
//! Similarity graph ("atlas pack") over embedded code for visual exploration.
//!
//! ## Architecture
//!
//! ```text
//! AtlasInput
//!     ├─ Chunks(ClusterAssignment[])   one node per chunk, label file:start-end
//!     └─ Files(FileNode[])             one node per file, mean vector
//!     │
//!     └──> AtlasBuilder
//!            ├─ Cosine similarity against every other node (O(n²))
//!            ├─ Keep top k_sim neighbours above the threshold
//!            ├─ Store each undirected pair once (petgraph)
//!            └─ AtlasPack { nodes, edges, stats }
//! ```
//!
//! The builder is meant for the already-bounded node set (sampled chunks or
//! file aggregates), never a raw corpus.

mod builder;
mod error;
mod input;

pub use builder::{build_atlas, AtlasBuilder, DEFAULT_K_SIM, DEFAULT_SIMILARITY_THRESHOLD};
pub use error::{GraphError, Result};
pub use input::{detect_granularity, AtlasInput};
