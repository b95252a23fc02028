use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt::{self, Display};

/// Point identifier as issued by the vector index (integer or UUID string).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointId {
    Num(u64),
    Uuid(String),
}

impl Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Uuid(s) => f.write_str(s),
        }
    }
}

impl From<u64> for PointId {
    fn from(value: u64) -> Self {
        Self::Num(value)
    }
}

impl From<&str> for PointId {
    fn from(value: &str) -> Self {
        Self::Uuid(value.to_string())
    }
}

/// Metadata attached to an embedded code fragment by the upstream chunker.
///
/// Unknown keys survive a load/save cycle through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointPayload {
    #[serde(default, deserialize_with = "de_text")]
    pub filepath: String,

    #[serde(
        default,
        alias = "start_line_no",
        deserialize_with = "de_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_line: Option<usize>,

    #[serde(
        default,
        alias = "end_line_no",
        deserialize_with = "de_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_line: Option<usize>,

    #[serde(default, deserialize_with = "de_text")]
    pub excerpt: String,

    /// Enclosing symbol path, e.g. `module > Class > method`.
    #[serde(default, deserialize_with = "de_ancestors")]
    pub ancestors: String,

    #[serde(default, deserialize_with = "de_text")]
    pub signature: String,

    #[serde(default, deserialize_with = "de_count", skip_serializing_if = "Option::is_none")]
    pub line_count: Option<usize>,

    #[serde(default, deserialize_with = "de_count", skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<usize>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PointPayload {
    #[must_use]
    pub fn new(filepath: impl Into<String>, excerpt: impl Into<String>) -> Self {
        Self {
            filepath: filepath.into(),
            excerpt: excerpt.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn lines(mut self, start: usize, end: usize) -> Self {
        self.start_line = Some(start);
        self.end_line = Some(end);
        self
    }

    #[must_use]
    pub fn signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    #[must_use]
    pub fn ancestors(mut self, ancestors: impl Into<String>) -> Self {
        self.ancestors = ancestors.into();
        self
    }

    /// Explicit `line_count`, else the inclusive line range, else 0.
    #[must_use]
    pub fn line_count(&self) -> usize {
        if let Some(count) = self.line_count {
            return count;
        }
        match (self.start_line, self.end_line) {
            (Some(start), Some(end)) if end >= start => end - start + 1,
            _ => 0,
        }
    }

    /// Overlay `patch` onto this payload. Known keys are re-typed, the rest land in `extra`.
    pub fn merge(&mut self, patch: &Map<String, Value>) -> serde_json::Result<()> {
        let mut merged = match serde_json::to_value(&*self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (key, value) in patch {
            merged.insert(key.clone(), value.clone());
        }
        *self = serde_json::from_value(Value::Object(merged))?;
        Ok(())
    }
}

/// One embedded code fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedPoint {
    pub id: PointId,

    /// `None` when the index returned no vector or the stored one was not numeric.
    #[serde(default, deserialize_with = "de_vector")]
    pub vector: Option<Vec<f32>>,

    #[serde(default, deserialize_with = "de_payload")]
    pub payload: PointPayload,
}

impl EmbeddedPoint {
    #[must_use]
    pub fn new(id: impl Into<PointId>, vector: Vec<f32>, payload: PointPayload) -> Self {
        Self {
            id: id.into(),
            vector: Some(vector),
            payload,
        }
    }
}

/// Decode raw index records one by one, skipping (and logging) those without a usable id.
pub fn decode_points(raw: Vec<Value>) -> Vec<EmbeddedPoint> {
    let total = raw.len();
    let points: Vec<EmbeddedPoint> = raw
        .into_iter()
        .enumerate()
        .filter_map(|(idx, value)| match serde_json::from_value(value) {
            Ok(point) => Some(point),
            Err(err) => {
                log::warn!("Skipping malformed point #{idx}: {err}");
                None
            }
        })
        .collect();
    if points.len() < total {
        log::warn!("Skipped {} of {total} malformed points", total - points.len());
    }
    points
}

/// Strings pass through; null or any other type reads as empty.
fn de_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        _ => String::new(),
    })
}

/// Non-negative integers, also when sent as numeric strings; anything else is `None`.
fn de_count<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().and_then(|v| usize::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn de_payload<'de, D>(deserializer: D) -> Result<PointPayload, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        raw @ Value::Object(_) => Ok(serde_json::from_value(raw).unwrap_or_default()),
        _ => Ok(PointPayload::default()),
    }
}

fn de_ancestors<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(match raw {
        Value::String(s) => s,
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str())
            .collect::<Vec<_>>()
            .join(" > "),
        _ => String::new(),
    })
}

fn de_vector<'de, D>(deserializer: D) -> Result<Option<Vec<f32>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    let Some(Value::Array(items)) = raw else {
        return Ok(None);
    };
    let mut vector = Vec::with_capacity(items.len());
    for item in items {
        match item.as_f64() {
            #[allow(clippy::cast_possible_truncation)]
            Some(v) => vector.push(v as f32),
            None => return Ok(None),
        }
    }
    Ok(Some(vector))
}
