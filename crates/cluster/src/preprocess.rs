use atlas_vector_store::{EmbeddedPoint, PointId, PointPayload};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Norms below this are clamped so zero vectors stay zero instead of dividing by zero.
pub const MIN_NORM: f32 = 1e-8;

/// Point after vector normalization and path-metadata derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub id: PointId,
    pub filepath: String,
    pub dirpath: String,
    pub filename: String,
    /// Unit L2 norm, or all zeros when the source norm was negligible.
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

/// Row `i` of `matrix` is `records[i].vector`.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub matrix: Array2<f32>,
    pub records: Vec<NormalizedRecord>,
}

impl Preprocessed {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            matrix: Array2::zeros((0, 0)),
            records: Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.matrix.ncols()
    }
}

/// Validate, L2-normalize and stack point vectors.
///
/// Points without a usable vector are skipped with a warning. The first accepted
/// vector fixes the dimension; later vectors of another length are skipped too.
#[must_use]
pub fn preprocess(points: &[EmbeddedPoint]) -> Preprocessed {
    log::info!("Preprocessing {} points", points.len());
    let mut records: Vec<NormalizedRecord> = Vec::with_capacity(points.len());
    let mut dimension: Option<usize> = None;

    for (idx, point) in points.iter().enumerate() {
        let Some(vector) = point.vector.as_deref() else {
            log::warn!("Skipping point {idx} ({}): missing or non-numeric vector", point.id);
            continue;
        };
        if vector.is_empty() {
            log::warn!("Skipping point {idx} ({}): empty vector", point.id);
            continue;
        }
        if vector.iter().any(|v| !v.is_finite()) {
            log::warn!("Skipping point {idx} ({}): non-finite vector component", point.id);
            continue;
        }
        match dimension {
            None => dimension = Some(vector.len()),
            Some(dim) if dim != vector.len() => {
                log::warn!(
                    "Skipping point {idx} ({}): dimension {} differs from {dim}",
                    point.id,
                    vector.len()
                );
                continue;
            }
            Some(_) => {}
        }

        let filepath = point.payload.filepath.clone();
        records.push(NormalizedRecord {
            id: point.id.clone(),
            dirpath: dirpath_of(&filepath),
            filename: filename_of(&filepath),
            filepath,
            vector: l2_normalize(vector),
            payload: point.payload.clone(),
        });
    }

    let Some(dim) = dimension else {
        log::info!("No usable vectors after preprocessing");
        return Preprocessed::empty();
    };

    let matrix = Array2::from_shape_fn((records.len(), dim), |(row, col)| {
        records[row].vector[col]
    });
    log::info!(
        "Preprocessed {} of {} points (dimension {dim})",
        records.len(),
        points.len()
    );
    Preprocessed { matrix, records }
}

#[must_use]
pub fn l2_normalize(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt().max(MIN_NORM);
    vector.iter().map(|v| v / norm).collect()
}

/// First two path segments, or the sole segment of a shallow path.
#[must_use]
pub fn dirpath_of(filepath: &str) -> String {
    let parts: Vec<&str> = filepath.split('/').collect();
    if parts.len() > 1 {
        parts[..2].join("/")
    } else {
        parts[0].to_string()
    }
}

#[must_use]
pub fn filename_of(filepath: &str) -> String {
    filepath.rsplit('/').next().unwrap_or_default().to_string()
}
