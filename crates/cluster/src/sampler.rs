use atlas_vector_store::EmbeddedPoint;
use fastrand::Rng;
use std::collections::HashMap;

/// Reduce `points` to at most `n_max`, keeping every file represented when the budget allows.
///
/// Inputs already within budget are returned untouched. Otherwise each file gets
/// `max(1, n_max / file_count)` slots filled by uniform sampling without
/// replacement, and any remaining budget is filled uniformly from the leftovers.
/// When more files than slots exist the per-file pass overshoots and the tail is
/// cut, so late files can be dropped.
pub fn stratified_sample(
    points: Vec<EmbeddedPoint>,
    n_max: usize,
    rng: &mut Rng,
) -> Vec<EmbeddedPoint> {
    if points.len() <= n_max {
        return points;
    }

    // Files in first-appearance order so the result is seed-deterministic.
    let mut file_slots: HashMap<&str, usize> = HashMap::new();
    let mut by_file: Vec<Vec<usize>> = Vec::new();
    for (idx, point) in points.iter().enumerate() {
        let slot = *file_slots
            .entry(point.payload.filepath.as_str())
            .or_insert_with(|| {
                by_file.push(Vec::new());
                by_file.len() - 1
            });
        by_file[slot].push(idx);
    }

    let quota = (n_max / by_file.len()).max(1);
    let mut taken = vec![false; points.len()];
    let mut selected: Vec<usize> = Vec::with_capacity(n_max);

    for members in &mut by_file {
        if members.len() > quota {
            rng.shuffle(members);
        }
        for &idx in members.iter().take(quota) {
            taken[idx] = true;
            selected.push(idx);
        }
    }

    if selected.len() < n_max {
        let mut leftovers: Vec<usize> = (0..points.len()).filter(|&idx| !taken[idx]).collect();
        rng.shuffle(&mut leftovers);
        let missing = n_max - selected.len();
        selected.extend(leftovers.into_iter().take(missing));
    }
    selected.truncate(n_max);

    log::info!(
        "Sampled {} of {} points across {} files (quota {quota})",
        selected.len(),
        points.len(),
        by_file.len()
    );

    let mut slots: Vec<Option<EmbeddedPoint>> = points.into_iter().map(Some).collect();
    selected
        .into_iter()
        .filter_map(|idx| slots[idx].take())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_vector_store::PointPayload;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn point(id: u64, file: &str) -> EmbeddedPoint {
        EmbeddedPoint::new(id, vec![1.0], PointPayload::new(file, format!("chunk {id}")))
    }

    #[test]
    fn within_budget_is_identity() {
        let points = vec![point(1, "a.py"), point(2, "b.py")];
        let mut rng = Rng::with_seed(7);
        let sampled = stratified_sample(points.clone(), 5, &mut rng);
        assert_eq!(sampled, points);
    }

    #[test]
    fn every_file_keeps_a_sample() {
        let points = vec![
            point(1, "a.py"),
            point(2, "a.py"),
            point(3, "b.py"),
            point(4, "b.py"),
            point(5, "c.py"),
        ];
        let mut rng = Rng::with_seed(42);
        let sampled = stratified_sample(points, 3, &mut rng);
        assert_eq!(sampled.len(), 3);
        let files: HashSet<&str> = sampled
            .iter()
            .map(|p| p.payload.filepath.as_str())
            .collect();
        assert!(files.contains("a.py") && files.contains("b.py") && files.contains("c.py"));
    }

    #[test]
    fn fill_step_tops_up_from_leftovers_without_duplicates() {
        // 2 files, n_max 7 => quota 3, one file only has 1 point, fill adds 3 more.
        let mut points = vec![point(0, "small.rs")];
        points.extend((1..=10).map(|i| point(i, "big.rs")));
        let mut rng = Rng::with_seed(1);
        let sampled = stratified_sample(points, 7, &mut rng);
        assert_eq!(sampled.len(), 7);
        let ids: HashSet<String> = sampled.iter().map(|p| p.id.to_string()).collect();
        assert_eq!(ids.len(), 7);
        assert!(ids.contains("0"));
    }

    #[test]
    fn same_seed_same_sample() {
        let points: Vec<_> = (0..50).map(|i| point(i, &format!("f{}.rs", i % 7))).collect();
        let a = stratified_sample(points.clone(), 12, &mut Rng::with_seed(3));
        let b = stratified_sample(points, 12, &mut Rng::with_seed(3));
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn proptest_sample_size_is_min_of_budget_and_input(
            files in proptest::collection::vec(0u8..12, 0..80),
            n_max in 0usize..60,
            seed in any::<u64>(),
        ) {
            let points: Vec<_> = files
                .iter()
                .enumerate()
                .map(|(i, f)| point(i as u64, &format!("dir/f{f}.py")))
                .collect();
            let expected = n_max.min(points.len());
            let sampled = stratified_sample(points, n_max, &mut Rng::with_seed(seed));
            prop_assert_eq!(sampled.len(), expected);
        }
    }
}
