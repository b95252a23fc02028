use atlas_cluster::{
    aggregate_to_files, assign_clusters, corpus_metrics, preprocess, select_representatives,
    stratified_sample, ClusterKey, KMeans, DEFAULT_SEED,
};
use atlas_vector_store::{EmbeddedPoint, PointPayload};
use fastrand::Rng;

/// Three tight groups along the axes of a 4-d space, spread across files.
fn corpus() -> Vec<EmbeddedPoint> {
    let mut rng = Rng::with_seed(9);
    let mut points = Vec::new();
    let groups = [("src/api", 0usize), ("src/db", 1), ("web/ui", 2)];
    let mut id = 0u64;
    for (dir, axis) in groups {
        for file in 0..4 {
            for chunk in 0..5 {
                let mut vector = vec![0.0f32; 4];
                vector[axis] = 1.0;
                for v in &mut vector {
                    *v += (rng.f32() - 0.5) * 0.05;
                }
                let path = format!("{dir}/mod{file}.rs");
                let payload = PointPayload::new(&path, format!("fn item_{chunk}() {{}}"))
                    .lines(chunk * 10 + 1, chunk * 10 + 8);
                points.push(EmbeddedPoint::new(id, vector, payload));
                id += 1;
            }
        }
    }
    points
}

#[test]
fn sample_cluster_and_select_end_to_end() {
    let points = corpus();
    let sampled = stratified_sample(points, 48, &mut Rng::with_seed(DEFAULT_SEED));
    assert_eq!(sampled.len(), 48);

    let data = preprocess(&sampled);
    assert_eq!(data.matrix.shape(), &[48, 4]);

    let clustering = KMeans::new(3).fit(data.matrix.view()).unwrap();
    let (assignments, clusters) = assign_clusters(&data, &clustering).unwrap();
    assert_eq!(assignments.len(), 48);
    assert_eq!(clusters.len(), 3);

    // Every cluster is single-directory.
    for cluster in clusters.values() {
        let dirs: std::collections::HashSet<_> = cluster
            .member_indices
            .iter()
            .map(|&i| assignments[i].record.dirpath.as_str())
            .collect();
        assert_eq!(dirs.len(), 1);
    }

    let sets = select_representatives(&assignments, &clusters, 6, 3);
    assert_eq!(sets.len(), 3);
    assert!(!sets.contains_key(&ClusterKey::Misc));
    for set in sets.values() {
        assert_eq!(set.representatives.len(), 6);
        assert_eq!(set.top_dirs.len(), 1);
        assert!(!set.key_files.is_empty());
    }

    let metrics = corpus_metrics(&data.records, sets.len());
    assert_eq!(metrics.points, 48);
    assert_eq!(metrics.files, 12);
    assert_eq!(metrics.top_dirs.len(), 3);

    let files = aggregate_to_files(&assignments);
    assert_eq!(files.len(), 12);
    assert_eq!(files.iter().map(|f| f.chunk_count).sum::<usize>(), 48);
}

#[test]
fn clustering_is_reproducible_across_runs() {
    let data = preprocess(&corpus());
    let a = KMeans::new(5).seed(DEFAULT_SEED).fit(data.matrix.view()).unwrap();
    let b = KMeans::new(5).seed(DEFAULT_SEED).fit(data.matrix.view()).unwrap();
    assert_eq!(a.labels, b.labels);
}
