//! # Atlas Vector Store
//!
//! Point records and the vector-index capability the Repo Atlas pipeline reads from.
//!
//! The pipeline never owns persistence: it scrolls embedded points out of an
//! index and patches `cluster_id` back into their payloads. Anything that can do
//! those two things implements [`PointSource`].
//!
//! ## Backends
//!
//! - [`MemoryCollection`] keeps collections in process (tests, piping)
//! - [`JsonCollection`] reads and writes JSON point files
//! - an HTTP client for a Qdrant-compatible index lives in `atlas-cli`
//!
//! ## Example
//!
//! ```no_run
//! use atlas_vector_store::{JsonCollection, PointSource};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = JsonCollection::single_file("points.json");
//!     let points = store.scroll("repo_demo", 3000, true).await?;
//!     for point in &points {
//!         println!("{} {}", point.id, point.payload.filepath);
//!     }
//!     Ok(())
//! }
//! ```

mod error;
mod memory;
mod source;
mod store;
mod types;

pub use error::{Result, VectorStoreError};
pub use memory::MemoryCollection;
pub use source::PointSource;
pub use store::{JsonCollection, POINT_COLLECTION_SCHEMA_VERSION};
pub use types::{decode_points, EmbeddedPoint, PointId, PointPayload};
