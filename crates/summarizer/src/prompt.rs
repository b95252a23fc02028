use atlas_cluster::RepresentativeSet;
use atlas_protocol::{ClusterSummary, RepoMetrics};
use std::fmt::Write;

pub const TRUNCATION_MARKER: &str = "...[truncated]";

const GROUNDING_RULE: &str = "Only use facts present in the excerpts, file paths, and symbols. \
Do not speculate beyond the provided text.";

const CLUSTER_SHAPE: &str = r#"{"cluster_id": "<id>", "title": "<short human label>", "summary": "<2-4 sentences>", "key_files": ["path/a.py"], "notable_symbols": ["ClassX", "function_y"]}"#;

const REPO_SHAPE: &str = r#"{"repo_summary": {"title": "<short repo label>", "overview": "<1-paragraph summary>", "sections": [{"title": "<cluster title>", "summary": "<one-line what it does>"}]}}"#;

/// Cut `text` to at most `max_chars` characters, marking the cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

fn file_list(files: &[String]) -> String {
    if files.is_empty() {
        return "(none)".to_string();
    }
    files.join(", ")
}

pub fn cluster_prompt(set: &RepresentativeSet, repo_id: &str, max_snippet_chars: usize) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Repo: {repo_id}");
    let _ = writeln!(
        prompt,
        "Cluster: {} (label: {}, {} members, {} shown)",
        set.key,
        set.label,
        set.member_count,
        set.representatives.len()
    );
    let _ = writeln!(prompt, "Key files: {}", file_list(&set.key_files));
    prompt.push('\n');

    for (idx, member) in set.representatives.iter().enumerate() {
        let payload = &member.record.payload;
        let range = match (payload.start_line, payload.end_line) {
            (Some(start), Some(end)) => format!("{start}-{end}"),
            _ => "?".to_string(),
        };
        let _ = writeln!(prompt, "[{}] {} (lines {range})", idx + 1, member.record.filepath);
        if !payload.ancestors.is_empty() {
            let _ = writeln!(prompt, "Ancestors: {}", payload.ancestors);
        }
        if !payload.signature.is_empty() {
            let _ = writeln!(prompt, "Signature: {}", payload.signature);
        }
        let _ = writeln!(
            prompt,
            "Excerpt (truncated to {max_snippet_chars} chars):\n{}\n",
            truncate_chars(&payload.excerpt, max_snippet_chars)
        );
    }

    let _ = writeln!(
        prompt,
        "Summarize what this group does (2-4 sentences), its key responsibilities and data, \
and notable entry points."
    );
    let _ = writeln!(prompt, "{GROUNDING_RULE}");
    let _ = writeln!(
        prompt,
        "Only mention files from this list: {}. Do not reference any other files.",
        file_list(&set.key_files)
    );
    let _ = write!(prompt, "Return only strict JSON of this shape: {CLUSTER_SHAPE}");
    prompt
}

/// Base prompt plus the rejection reason of the previous attempt.
pub fn stricter_cluster_prompt(
    base: &str,
    reason: &str,
    offending: &[String],
    previous_summary: Option<&str>,
    key_files: &[String],
) -> String {
    let mut prompt = base.to_string();
    let _ = write!(prompt, "\n\nYour previous answer was rejected ({reason}).");
    if !offending.is_empty() {
        let _ = write!(
            prompt,
            "\nIt referenced files that are not part of this cluster: {}.",
            offending.join(", ")
        );
    }
    if let Some(previous) = previous_summary.filter(|s| !s.trim().is_empty()) {
        let _ = write!(prompt, "\nPrevious summary with those references removed: {previous}");
    }
    let _ = write!(
        prompt,
        "\nThe ONLY file paths you may write are: {}. \
Mention no other path, and return nothing but the JSON object.",
        file_list(key_files)
    );
    prompt
}

pub fn repo_prompt(repo_id: &str, clusters: &[ClusterSummary], metrics: &RepoMetrics) -> String {
    let mut prompt = String::from(
        "You are an expert code summarizer. Given the following clusters and repo metrics, \
produce a concise repo summary and a section per cluster.\n",
    );
    let _ = writeln!(prompt, "{GROUNDING_RULE}\n");
    let _ = writeln!(prompt, "Repo: {repo_id}");
    let _ = writeln!(
        prompt,
        "Metrics: {} points, {} clusters, {} files; top directories: {}\n",
        metrics.points,
        metrics.clusters,
        metrics.files,
        file_list(&metrics.top_dirs)
    );
    let _ = writeln!(prompt, "Clusters:");
    for cluster in clusters {
        let _ = writeln!(
            prompt,
            "- [{}] {}: {}",
            cluster.cluster_id, cluster.title, cluster.summary
        );
        if !cluster.key_files.is_empty() {
            let _ = writeln!(prompt, "  Key files: {}", cluster.key_files.join(", "));
        }
    }
    let _ = write!(prompt, "\nReturn only strict JSON of this shape: {REPO_SHAPE}");
    prompt
}
