use crate::error::{ClusterError, Result};
use crate::preprocess::{NormalizedRecord, Preprocessed};
use fastrand::Rng;
use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_SEED: u64 = 42;

/// Lloyd's k-means with k-means++ seeding and a fixed RNG seed.
///
/// Runs `n_init` seeded restarts and keeps the lowest-inertia result.
#[derive(Debug, Clone)]
pub struct KMeans {
    k: usize,
    seed: u64,
    n_init: usize,
    max_iter: usize,
    tolerance: f32,
}

/// Labels index into `centroids` rows.
#[derive(Debug, Clone)]
pub struct Clustering {
    pub labels: Vec<usize>,
    pub centroids: Array2<f32>,
    pub iterations: usize,
    pub inertia: f32,
}

impl Clustering {
    fn empty(dimension: usize) -> Self {
        Self {
            labels: Vec::new(),
            centroids: Array2::zeros((0, dimension)),
            iterations: 0,
            inertia: 0.0,
        }
    }

    #[must_use]
    pub fn k(&self) -> usize {
        self.centroids.nrows()
    }
}

impl KMeans {
    #[must_use]
    pub fn new(k: usize) -> Self {
        Self {
            k,
            seed: DEFAULT_SEED,
            n_init: 3,
            max_iter: 300,
            tolerance: 1e-4,
        }
    }

    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init.max(1);
        self
    }

    #[must_use]
    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter.max(1);
        self
    }

    #[must_use]
    pub fn tolerance(mut self, tolerance: f32) -> Self {
        self.tolerance = tolerance.max(0.0);
        self
    }

    /// Partition the rows of `x`. Empty input returns an empty clustering without iterating.
    ///
    /// `k` above the row count is clamped to the row count.
    pub fn fit(&self, x: ArrayView2<'_, f32>) -> Result<Clustering> {
        if self.k == 0 {
            return Err(ClusterError::InvalidK);
        }
        let n = x.nrows();
        if n == 0 || x.ncols() == 0 {
            return Ok(Clustering::empty(x.ncols()));
        }
        let k = if self.k > n {
            log::warn!("k={} exceeds {n} points, clamping to {n}", self.k);
            n
        } else {
            self.k
        };

        let mut seeds = Rng::with_seed(self.seed);
        let mut best: Option<Clustering> = None;
        for _ in 0..self.n_init {
            let mut rng = Rng::with_seed(seeds.u64(..));
            let run = self.lloyd(x, k, &mut rng);
            if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
                best = Some(run);
            }
        }
        let best = best.unwrap_or_else(|| Clustering::empty(x.ncols()));
        log::info!(
            "k-means finished: k={k}, n={n}, iterations={}, inertia={:.4}",
            best.iterations,
            best.inertia
        );
        Ok(best)
    }

    fn lloyd(&self, x: ArrayView2<'_, f32>, k: usize, rng: &mut Rng) -> Clustering {
        let mut centroids = init_plus_plus(x, k, rng);
        let mut labels = vec![0usize; x.nrows()];
        let mut iterations = 0;

        for iter in 0..self.max_iter {
            iterations = iter + 1;
            assign_nearest(x, centroids.view(), &mut labels);
            let updated = update_centroids(x, &labels, centroids.view());
            let shift: f32 = updated
                .rows()
                .into_iter()
                .zip(centroids.rows())
                .map(|(a, b)| squared_distance(a, b))
                .sum();
            centroids = updated;
            if shift <= self.tolerance {
                break;
            }
        }

        // Labels must agree with the centroids actually returned.
        let inertia = assign_nearest(x, centroids.view(), &mut labels);
        Clustering {
            labels,
            centroids,
            iterations,
            inertia,
        }
    }
}

fn init_plus_plus(x: ArrayView2<'_, f32>, k: usize, rng: &mut Rng) -> Array2<f32> {
    let n = x.nrows();
    let mut centroids = Array2::zeros((k, x.ncols()));
    let first = rng.usize(..n);
    centroids.row_mut(0).assign(&x.row(first));

    let mut closest: Vec<f32> = x
        .rows()
        .into_iter()
        .map(|row| squared_distance(row, centroids.row(0)))
        .collect();

    for c in 1..k {
        let total: f32 = closest.iter().sum();
        let pick = if total <= f32::EPSILON {
            rng.usize(..n)
        } else {
            let mut target = rng.f32() * total;
            let mut chosen = n - 1;
            for (idx, d) in closest.iter().enumerate() {
                if target < *d {
                    chosen = idx;
                    break;
                }
                target -= d;
            }
            chosen
        };
        centroids.row_mut(c).assign(&x.row(pick));
        for (idx, row) in x.rows().into_iter().enumerate() {
            let d = squared_distance(row, centroids.row(c));
            if d < closest[idx] {
                closest[idx] = d;
            }
        }
    }
    centroids
}

/// Label every row with its nearest centroid (lowest index on ties); returns the inertia.
fn assign_nearest(
    x: ArrayView2<'_, f32>,
    centroids: ArrayView2<'_, f32>,
    labels: &mut [usize],
) -> f32 {
    let mut inertia = 0.0;
    for (idx, row) in x.rows().into_iter().enumerate() {
        let mut best = 0usize;
        let mut best_d = f32::INFINITY;
        for (c, centroid) in centroids.rows().into_iter().enumerate() {
            let d = squared_distance(row, centroid);
            if d < best_d {
                best_d = d;
                best = c;
            }
        }
        labels[idx] = best;
        inertia += best_d;
    }
    inertia
}

fn update_centroids(
    x: ArrayView2<'_, f32>,
    labels: &[usize],
    previous: ArrayView2<'_, f32>,
) -> Array2<f32> {
    let k = previous.nrows();
    let mut sums = Array2::<f32>::zeros((k, x.ncols()));
    let mut counts = vec![0usize; k];
    for (row, &label) in x.rows().into_iter().zip(labels) {
        let mut target = sums.row_mut(label);
        target += &row;
        counts[label] += 1;
    }

    let mut reseeded: Vec<usize> = Vec::new();
    for c in 0..k {
        if counts[c] > 0 {
            #[allow(clippy::cast_precision_loss)]
            let count = counts[c] as f32;
            sums.row_mut(c).mapv_inplace(|v| v / count);
            continue;
        }
        // Empty cluster: move it onto the point farthest from its own centroid.
        let farthest = x
            .rows()
            .into_iter()
            .enumerate()
            .filter(|(idx, _)| !reseeded.contains(idx))
            .map(|(idx, row)| (idx, squared_distance(row, previous.row(labels[idx]))))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(idx, _)| idx);
        if let Some(idx) = farthest {
            sums.row_mut(c).assign(&x.row(idx));
            reseeded.push(idx);
        } else {
            sums.row_mut(c).assign(&previous.row(c));
        }
    }
    sums
}

pub(crate) fn squared_distance(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Per-point cluster membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    #[serde(flatten)]
    pub record: NormalizedRecord,
    pub cluster_id: usize,
    /// Euclidean distance to the assigned centroid, `>= 0`.
    pub distance_to_centroid: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub id: usize,
    pub centroid: Vec<f32>,
    /// Indices into the assignment list.
    pub member_indices: Vec<usize>,
}

impl Cluster {
    #[must_use]
    pub fn len(&self) -> usize {
        self.member_indices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.member_indices.is_empty()
    }
}

/// Attach labels and centroid distances to preprocessed records.
pub fn assign_clusters(
    data: &Preprocessed,
    clustering: &Clustering,
) -> Result<(Vec<ClusterAssignment>, BTreeMap<usize, Cluster>)> {
    if data.is_empty() || clustering.labels.is_empty() || clustering.k() == 0 {
        return Ok((Vec::new(), BTreeMap::new()));
    }
    if data.matrix.nrows() != clustering.labels.len()
        || data.records.len() != clustering.labels.len()
    {
        return Err(ClusterError::ShapeMismatch {
            rows: data.matrix.nrows(),
            labels: clustering.labels.len(),
            records: data.records.len(),
        });
    }

    let mut assignments = Vec::with_capacity(data.len());
    let mut clusters: BTreeMap<usize, Cluster> = BTreeMap::new();
    for (idx, (record, &label)) in data.records.iter().zip(&clustering.labels).enumerate() {
        if label >= clustering.k() {
            return Err(ClusterError::LabelOutOfRange {
                label,
                centroids: clustering.k(),
            });
        }
        let centroid = clustering.centroids.row(label);
        let distance = squared_distance(data.matrix.row(idx), centroid).sqrt();
        assignments.push(ClusterAssignment {
            record: record.clone(),
            cluster_id: label,
            distance_to_centroid: distance,
        });
        clusters
            .entry(label)
            .or_insert_with(|| Cluster {
                id: label,
                centroid: centroid.to_vec(),
                member_indices: Vec::new(),
            })
            .member_indices
            .push(idx);
    }
    Ok((assignments, clusters))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::preprocess;
    use atlas_vector_store::{EmbeddedPoint, PointPayload};
    use ndarray::array;
    use pretty_assertions::assert_eq;

    fn blobs() -> Array2<f32> {
        array![
            [1.0, 0.0, 0.0],
            [0.98, 0.2, 0.0],
            [0.97, 0.0, 0.24],
            [0.0, 1.0, 0.0],
            [0.2, 0.98, 0.0],
            [0.0, 0.97, 0.24],
            [0.0, 0.0, 1.0],
            [0.24, 0.0, 0.97],
        ]
    }

    #[test]
    fn empty_input_short_circuits() {
        let x = Array2::<f32>::zeros((0, 0));
        let result = KMeans::new(3).fit(x.view()).unwrap();
        assert!(result.labels.is_empty());
        assert_eq!(result.k(), 0);
    }

    #[test]
    fn zero_k_is_rejected() {
        let x = blobs();
        assert!(matches!(KMeans::new(0).fit(x.view()), Err(ClusterError::InvalidK)));
    }

    #[test]
    fn separates_obvious_groups() {
        let x = blobs();
        let result = KMeans::new(3).fit(x.view()).unwrap();
        assert_eq!(result.labels.len(), 8);
        assert_eq!(result.labels[0], result.labels[1]);
        assert_eq!(result.labels[0], result.labels[2]);
        assert_eq!(result.labels[3], result.labels[4]);
        assert_eq!(result.labels[3], result.labels[5]);
        assert_eq!(result.labels[6], result.labels[7]);
        assert_ne!(result.labels[0], result.labels[3]);
        assert_ne!(result.labels[0], result.labels[6]);
    }

    #[test]
    fn same_seed_same_labels() {
        let mut rng = Rng::with_seed(9);
        let x = Array2::from_shape_fn((60, 16), |_| rng.f32() - 0.5);
        let a = KMeans::new(5).seed(11).fit(x.view()).unwrap();
        let b = KMeans::new(5).seed(11).fit(x.view()).unwrap();
        assert_eq!(a.labels, b.labels);
        assert_eq!(a.centroids, b.centroids);
    }

    #[test]
    fn k_larger_than_input_is_clamped() {
        let x = array![[1.0, 0.0], [0.0, 1.0]];
        let result = KMeans::new(10).fit(x.view()).unwrap();
        assert_eq!(result.k(), 2);
        assert_ne!(result.labels[0], result.labels[1]);
    }

    #[test]
    fn labels_point_at_nearest_centroid() {
        let x = blobs();
        let result = KMeans::new(3).fit(x.view()).unwrap();
        for (row, &label) in x.rows().into_iter().zip(&result.labels) {
            let own = squared_distance(row, result.centroids.row(label));
            for centroid in result.centroids.rows() {
                assert!(own <= squared_distance(row, centroid) + 1e-6);
            }
        }
    }

    #[test]
    fn assignment_records_distances_and_members() {
        let points = vec![
            EmbeddedPoint::new(1u64, vec![1.0, 0.0], PointPayload::new("a.py", "")),
            EmbeddedPoint::new(2u64, vec![0.0, 1.0], PointPayload::new("b.py", "")),
        ];
        let data = preprocess(&points);
        let clustering = Clustering {
            labels: vec![0, 1],
            centroids: array![[1.0, 0.0], [0.0, 1.0]],
            iterations: 1,
            inertia: 0.0,
        };
        let (assignments, clusters) = assign_clusters(&data, &clustering).unwrap();
        assert_eq!(assignments.len(), 2);
        assert!(assignments.iter().all(|a| a.distance_to_centroid.abs() < 1e-6));
        assert_eq!(clusters[&0].member_indices, vec![0]);
        assert_eq!(clusters[&1].member_indices, vec![1]);
    }

    #[test]
    fn mismatched_labels_are_rejected() {
        let points = vec![EmbeddedPoint::new(1u64, vec![1.0, 0.0], PointPayload::new("a.py", ""))];
        let data = preprocess(&points);
        let clustering = Clustering {
            labels: vec![0, 0],
            centroids: array![[1.0, 0.0]],
            iterations: 1,
            inertia: 0.0,
        };
        assert!(matches!(
            assign_clusters(&data, &clustering),
            Err(ClusterError::ShapeMismatch { .. })
        ));
    }
}
