use crate::engine::GroundedSummarizer;
use crate::error::Result;
use crate::grounding::{strip_tokens, ungrounded_tokens};
use crate::parse::{parse_cluster_summary, GeneratedClusterSummary, OutputDefect};
use crate::prompt::{cluster_prompt, stricter_cluster_prompt};
use atlas_cluster::{ClusterKey, RepresentativeSet};
use atlas_protocol::{ClusterFailure, ClusterSummary};
use std::collections::HashSet;

/// Lifecycle of one cluster's summarization.
///
/// `Pending` issues the first call. A rejected output moves to `Retrying(n)`
/// (n = calls made so far) while calls remain, otherwise to `Failed`.
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryState {
    Pending,
    Retrying(u32),
    Grounded(ClusterSummary),
    Failed(ClusterFailure),
}

impl SummaryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Grounded(_) | Self::Failed(_))
    }

    fn calls_made(&self) -> u32 {
        match self {
            Self::Retrying(n) => *n,
            _ => 0,
        }
    }
}

/// Terminal result for one cluster.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterOutcome {
    Grounded(ClusterSummary),
    Failed(ClusterFailure),
}

/// Last rejected output, carried into the stricter retry prompt.
struct Rejection {
    defect: OutputDefect,
    salvaged_summary: Option<String>,
}

/// Check one raw output against the evidence set.
fn evaluate(
    raw: &str,
    set: &RepresentativeSet,
) -> std::result::Result<ClusterSummary, (OutputDefect, Option<String>)> {
    let generated = parse_cluster_summary(raw).map_err(|defect| (defect, None))?;
    let offending = ungrounded_tokens(&generated.summary, &set.key_files);
    if !offending.is_empty() {
        let salvaged = strip_tokens(&generated.summary, &offending);
        return Err((OutputDefect::Ungrounded { tokens: offending }, Some(salvaged)));
    }
    Ok(authoritative(generated, set.key, &set.key_files))
}

/// Apply the fields the pipeline owns over what was generated.
fn authoritative(
    generated: GeneratedClusterSummary,
    key: ClusterKey,
    allowed: &[String],
) -> ClusterSummary {
    let mut seen = HashSet::new();
    let mut key_files: Vec<String> = generated
        .key_files
        .into_iter()
        .filter(|file| allowed.contains(file) && seen.insert(file.clone()))
        .collect();
    if key_files.is_empty() {
        key_files = allowed.to_vec();
    }
    ClusterSummary {
        cluster_id: key.to_string(),
        title: generated.title.trim().to_string(),
        summary: generated.summary.trim().to_string(),
        key_files,
        notable_symbols: generated.notable_symbols,
    }
}

impl GroundedSummarizer {
    /// Summarize one representative set, retrying with a stricter prompt on bad output.
    ///
    /// Bad output never errors: after `max_attempts` calls the outcome is
    /// `Failed` with the last defect and raw text. Only generator failures
    /// (transport, timeout) return `Err`.
    pub async fn summarize_cluster(
        &self,
        set: &RepresentativeSet,
        repo_id: &str,
    ) -> Result<ClusterOutcome> {
        let max_attempts = self.options().max_attempts.max(1);
        let base_prompt = cluster_prompt(set, repo_id, self.options().max_snippet_chars);
        let mut state = SummaryState::Pending;
        let mut rejection: Option<Rejection> = None;

        loop {
            let attempt = state.calls_made() + 1;
            let prompt = match &rejection {
                None => base_prompt.clone(),
                Some(last) => {
                    let offending: &[String] = match &last.defect {
                        OutputDefect::Ungrounded { tokens } => tokens.as_slice(),
                        _ => &[],
                    };
                    stricter_cluster_prompt(
                        &base_prompt,
                        &last.defect.to_string(),
                        offending,
                        last.salvaged_summary.as_deref(),
                        &set.key_files,
                    )
                }
            };

            let raw = self
                .generate(prompt, self.options().cluster_max_tokens)
                .await?;

            let next = match evaluate(&raw, set) {
                Ok(summary) => {
                    log::info!(
                        "Cluster {} grounded after {attempt} attempt(s): {}",
                        set.key,
                        summary.title
                    );
                    SummaryState::Grounded(summary)
                }
                Err((defect, salvaged_summary)) => {
                    log::warn!(
                        "Cluster {} attempt {attempt}/{max_attempts} rejected: {defect}",
                        set.key
                    );
                    if attempt >= max_attempts {
                        SummaryState::Failed(ClusterFailure {
                            cluster_id: set.key.to_string(),
                            error: defect.to_string(),
                            raw_output: raw,
                            attempts: attempt,
                        })
                    } else {
                        rejection = Some(Rejection {
                            defect,
                            salvaged_summary,
                        });
                        SummaryState::Retrying(attempt)
                    }
                }
            };

            match next {
                SummaryState::Grounded(summary) => return Ok(ClusterOutcome::Grounded(summary)),
                SummaryState::Failed(failure) => return Ok(ClusterOutcome::Failed(failure)),
                pending => state = pending,
            }
        }
    }
}
