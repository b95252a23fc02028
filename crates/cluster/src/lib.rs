//! # Atlas Cluster
//!
//! Bounded, deterministic grouping of embedded code points.
//!
//! ## Architecture
//!
//! ```text
//! EmbeddedPoint[]
//!     │
//!     ├──> Sampler (per-file quota, seeded)
//!     │
//!     ├──> Preprocessor
//!     │      ├─ Drop unusable vectors
//!     │      ├─ L2-normalize rows
//!     │      └─ Derive dirpath / filename
//!     │
//!     ├──> KMeans (k-means++, Lloyd iterations, fixed seed)
//!     │      └─ ClusterAssignment { cluster_id, distance_to_centroid }
//!     │
//!     ├──> Representative Selector
//!     │      ├─ Clustered: nearest-first members of large clusters
//!     │      └─ PooledMisc: members of every small cluster
//!     │
//!     └──> File Aggregator (chunk → file nodes for the atlas)
//! ```

mod error;
mod files;
mod kmeans;
mod metrics;
mod preprocess;
mod representatives;
mod sampler;

pub use error::{ClusterError, Result};
pub use files::{aggregate_to_files, FileNode};
pub use kmeans::{assign_clusters, Cluster, ClusterAssignment, Clustering, KMeans, DEFAULT_SEED};
pub use metrics::{corpus_metrics, TOP_DIRS};
pub use preprocess::{
    dirpath_of, filename_of, l2_normalize, preprocess, NormalizedRecord, Preprocessed, MIN_NORM,
};
pub use representatives::{
    select_representatives, ClusterKey, RepresentativeSet, SetOrigin, MISC_LABEL,
};
pub use sampler::stratified_sample;
