use thiserror::Error;

pub type Result<T> = std::result::Result<T, SummarizerError>;

/// Failures of the generation collaborator itself.
///
/// Bad model output is not an error here; it becomes a failure record.
#[derive(Error, Debug)]
pub enum SummarizerError {
    #[error("Generation request failed: {0}")]
    Generation(String),

    #[error("Generation timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("{0}")]
    Other(String),
}
