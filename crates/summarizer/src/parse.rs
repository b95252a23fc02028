use atlas_protocol::{RepoOverview, RepoSection};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Why a generation output was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputDefect {
    /// Not parseable as a JSON object.
    Malformed(String),
    /// Parsed, but required fields are missing, blank or mistyped.
    Schema(String),
    /// The summary cites files outside the evidence set.
    Ungrounded { tokens: Vec<String> },
}

impl fmt::Display for OutputDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(reason) => write!(f, "malformed output: {reason}"),
            Self::Schema(reason) => write!(f, "schema violation: {reason}"),
            Self::Ungrounded { tokens } => {
                write!(f, "ungrounded file references: {}", tokens.join(", "))
            }
        }
    }
}

/// Cluster summary fields as generated, before authoritative fields are applied.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GeneratedClusterSummary {
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub key_files: Vec<String>,
    #[serde(default)]
    pub notable_symbols: Vec<String>,
}

/// Normalize raw generation text toward a single JSON object.
///
/// Strips code fences, swaps a single-quoted object to double quotes, and
/// cuts surrounding prose down to the outermost `{ .. }` span.
pub fn clean_output(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        let rest = rest
            .strip_prefix("json")
            .or_else(|| rest.strip_prefix("JSON"))
            .unwrap_or(rest);
        text = rest.trim_start();
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest.trim_end();
    }

    let mut text = text.to_string();
    if text.starts_with('{') && text.contains('\'') && !text.contains('"') {
        text = text.replace('\'', "\"");
    }
    if !(text.starts_with('{') && text.ends_with('}')) {
        if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
            if start < end {
                text = text[start..=end].to_string();
            }
        }
    }
    text
}

fn parse_object(raw: &str) -> Result<serde_json::Map<String, Value>, OutputDefect> {
    let cleaned = clean_output(raw);
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(OutputDefect::Schema(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(err) => Err(OutputDefect::Malformed(err.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn require_text(field: &str, value: &str) -> Result<(), OutputDefect> {
    if value.trim().is_empty() {
        return Err(OutputDefect::Schema(format!("`{field}` is blank")));
    }
    Ok(())
}

pub fn parse_cluster_summary(raw: &str) -> Result<GeneratedClusterSummary, OutputDefect> {
    let object = parse_object(raw)?;
    let parsed: GeneratedClusterSummary = serde_json::from_value(Value::Object(object))
        .map_err(|err| OutputDefect::Schema(err.to_string()))?;
    require_text("title", &parsed.title)?;
    require_text("summary", &parsed.summary)?;
    Ok(parsed)
}

#[derive(Deserialize)]
struct GeneratedOverview {
    title: String,
    overview: String,
    #[serde(default)]
    sections: Vec<RepoSection>,
}

/// Accepts either a bare overview object or one nested under `repo_summary`.
pub fn parse_repo_overview(raw: &str) -> Result<RepoOverview, OutputDefect> {
    let mut object = parse_object(raw)?;
    let value = match object.remove("repo_summary") {
        Some(nested @ Value::Object(_)) => nested,
        Some(other) => {
            return Err(OutputDefect::Schema(format!(
                "`repo_summary` must be an object, got {}",
                json_kind(&other)
            )))
        }
        None => Value::Object(object),
    };
    let parsed: GeneratedOverview =
        serde_json::from_value(value).map_err(|err| OutputDefect::Schema(err.to_string()))?;
    require_text("title", &parsed.title)?;
    require_text("overview", &parsed.overview)?;
    Ok(RepoOverview {
        title: parsed.title,
        overview: parsed.overview,
        sections: parsed.sections,
    })
}
