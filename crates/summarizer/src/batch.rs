use crate::cluster::ClusterOutcome;
use crate::engine::GroundedSummarizer;
use crate::error::{Result, SummarizerError};
use atlas_cluster::{ClusterKey, RepresentativeSet};
use atlas_protocol::{ClusterFailure, ClusterSummary};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Per-cluster results in cluster-key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterBatch {
    pub summaries: Vec<ClusterSummary>,
    pub failures: Vec<ClusterFailure>,
}

impl GroundedSummarizer {
    /// Summarize every set with at most `concurrency` generation calls in flight.
    ///
    /// Results are reduced in [`ClusterKey`] order whatever the completion
    /// order. The first generator failure aborts the remaining work.
    pub async fn summarize_sets(
        &self,
        sets: &BTreeMap<ClusterKey, RepresentativeSet>,
        repo_id: &str,
        concurrency: usize,
    ) -> Result<ClusterBatch> {
        let permits = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut tasks: JoinSet<(ClusterKey, Result<ClusterOutcome>)> = JoinSet::new();

        for (key, set) in sets {
            let summarizer = self.clone();
            let set = set.clone();
            let repo_id = repo_id.to_string();
            let permits = Arc::clone(&permits);
            let key = *key;
            tasks.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            key,
                            Err(SummarizerError::Other("summary permits closed".into())),
                        )
                    }
                };
                (key, summarizer.summarize_cluster(&set, &repo_id).await)
            });
        }

        let mut outcomes: BTreeMap<ClusterKey, ClusterOutcome> = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            let (key, outcome) =
                joined.map_err(|err| SummarizerError::Other(format!("summary task failed: {err}")))?;
            match outcome {
                Ok(outcome) => {
                    outcomes.insert(key, outcome);
                }
                Err(err) => {
                    tasks.abort_all();
                    return Err(err);
                }
            }
        }

        let mut batch = ClusterBatch::default();
        for outcome in outcomes.into_values() {
            match outcome {
                ClusterOutcome::Grounded(summary) => batch.summaries.push(summary),
                ClusterOutcome::Failed(failure) => batch.failures.push(failure),
            }
        }
        log::info!(
            "Summarized {} clusters for '{repo_id}' ({} failed)",
            batch.summaries.len(),
            batch.failures.len()
        );
        Ok(batch)
    }
}
