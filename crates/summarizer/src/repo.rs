use crate::engine::GroundedSummarizer;
use crate::error::Result;
use crate::parse::parse_repo_overview;
use crate::prompt::repo_prompt;
use atlas_protocol::RepoSummary;

pub const NO_CLUSTERS_ERROR: &str = "no grounded cluster summaries to aggregate";

impl GroundedSummarizer {
    /// Fill in `repo_summary` with a single generation call.
    ///
    /// `repo_id`, `metrics` and `clusters` are taken from `summary` and never
    /// replaced by generated values. A rejected output leaves the overview
    /// empty and sets `error`/`raw_output`.
    pub async fn summarize_repo(&self, mut summary: RepoSummary) -> Result<RepoSummary> {
        if summary.clusters.is_empty() {
            log::warn!("Repo '{}': {NO_CLUSTERS_ERROR}", summary.repo_id);
            summary.error = Some(NO_CLUSTERS_ERROR.to_string());
            return Ok(summary);
        }

        let prompt = repo_prompt(&summary.repo_id, &summary.clusters, &summary.metrics);
        let raw = self.generate(prompt, self.options().repo_max_tokens).await?;
        match parse_repo_overview(&raw) {
            Ok(overview) => {
                log::info!(
                    "Repo '{}' summarized: {} ({} sections)",
                    summary.repo_id,
                    overview.title,
                    overview.sections.len()
                );
                summary.repo_summary = overview;
                summary.error = None;
                summary.raw_output = None;
            }
            Err(defect) => {
                log::warn!("Repo '{}' summary rejected: {defect}", summary.repo_id);
                summary.error = Some(defect.to_string());
                summary.raw_output = Some(raw);
            }
        }
        Ok(summary)
    }
}
