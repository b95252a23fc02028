use crate::preprocess::NormalizedRecord;
use atlas_protocol::RepoMetrics;
use std::collections::{HashMap, HashSet};

pub const TOP_DIRS: usize = 5;

/// Corpus-wide counts for the repository prompt and the final summary.
///
/// `top_dirs` holds the most frequent `dirpath` values, ties broken by name.
#[must_use]
pub fn corpus_metrics(records: &[NormalizedRecord], summarized_groups: usize) -> RepoMetrics {
    let files: HashSet<&str> = records.iter().map(|r| r.filepath.as_str()).collect();

    let mut dir_counts: HashMap<&str, usize> = HashMap::new();
    for record in records {
        *dir_counts.entry(record.dirpath.as_str()).or_default() += 1;
    }
    let mut dirs: Vec<(&str, usize)> = dir_counts.into_iter().collect();
    dirs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    RepoMetrics {
        points: records.len(),
        clusters: summarized_groups,
        files: files.len(),
        top_dirs: dirs
            .into_iter()
            .take(TOP_DIRS)
            .map(|(dir, _)| dir.to_string())
            .collect(),
    }
}
