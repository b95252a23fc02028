use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClusterError>;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Invalid cluster count: k must be at least 1")]
    InvalidK,

    #[error("Label {label} out of range for {centroids} centroids")]
    LabelOutOfRange { label: usize, centroids: usize },

    #[error("Row count mismatch: {rows} rows, {labels} labels, {records} records")]
    ShapeMismatch {
        rows: usize,
        labels: usize,
        records: usize,
    },

    #[error("{0}")]
    Other(String),
}
