use crate::kmeans::{Cluster, ClusterAssignment};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::{self, Display};
use std::str::FromStr;

pub const MISC_LABEL: &str = "misc";

/// Key of a summarized group: a k-means label or the pooled small-cluster bucket.
///
/// Orders numeric keys first, `Misc` last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClusterKey {
    Cluster(usize),
    Misc,
}

impl Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cluster(id) => write!(f, "{id}"),
            Self::Misc => f.write_str(MISC_LABEL),
        }
    }
}

impl FromStr for ClusterKey {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case(MISC_LABEL) {
            return Ok(Self::Misc);
        }
        raw.parse::<usize>()
            .map(Self::Cluster)
            .map_err(|_| format!("invalid cluster key '{raw}'"))
    }
}

impl Serialize for ClusterKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClusterKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// How a representative set came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetOrigin {
    /// One k-means cluster above the size floor.
    Clustered,
    /// Members of every cluster at or below the size floor.
    PooledMisc,
}

/// Bounded evidence for one summarized group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepresentativeSet {
    pub key: ClusterKey,
    pub origin: SetOrigin,
    /// Nearest-to-centroid first, at most `n_labels` entries.
    pub representatives: Vec<ClusterAssignment>,
    pub label: String,
    pub top_dirs: BTreeSet<String>,
    pub top_files: BTreeSet<String>,
    /// Distinct representative file paths, nearest first. The only files a summary may cite.
    pub key_files: Vec<String>,
    pub member_count: usize,
}

impl RepresentativeSet {
    fn build(
        key: ClusterKey,
        origin: SetOrigin,
        mut members: Vec<&ClusterAssignment>,
        n_labels: usize,
    ) -> Self {
        let member_count = members.len();
        members.sort_by(|a, b| {
            a.distance_to_centroid
                .partial_cmp(&b.distance_to_centroid)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let representatives: Vec<ClusterAssignment> =
            members.into_iter().take(n_labels).cloned().collect();

        let label = match origin {
            SetOrigin::PooledMisc => MISC_LABEL.to_string(),
            SetOrigin::Clustered => representatives
                .first()
                .map(|r| r.record.filename.clone())
                .unwrap_or_default(),
        };

        let mut seen = HashSet::new();
        let key_files = representatives
            .iter()
            .map(|r| r.record.filepath.clone())
            .filter(|path| !path.is_empty() && seen.insert(path.clone()))
            .collect();

        Self {
            key,
            origin,
            top_dirs: representatives.iter().map(|r| r.record.dirpath.clone()).collect(),
            top_files: representatives.iter().map(|r| r.record.filename.clone()).collect(),
            label,
            key_files,
            member_count,
            representatives,
        }
    }
}

/// Pick each cluster's nearest-to-centroid members as its evidence set.
///
/// Clusters with `<= n_min` members are not summarized on their own; their
/// members are pooled into a single [`ClusterKey::Misc`] set built the same way.
#[must_use]
pub fn select_representatives(
    assignments: &[ClusterAssignment],
    clusters: &BTreeMap<usize, Cluster>,
    n_labels: usize,
    n_min: usize,
) -> BTreeMap<ClusterKey, RepresentativeSet> {
    let mut sets = BTreeMap::new();
    let mut pooled: Vec<&ClusterAssignment> = Vec::new();

    for (&id, cluster) in clusters {
        let members: Vec<&ClusterAssignment> = cluster
            .member_indices
            .iter()
            .filter_map(|&idx| assignments.get(idx))
            .collect();
        if members.len() <= n_min {
            pooled.extend(members);
            continue;
        }
        let key = ClusterKey::Cluster(id);
        sets.insert(key, RepresentativeSet::build(key, SetOrigin::Clustered, members, n_labels));
    }

    if !pooled.is_empty() {
        log::info!("Pooling {} members of small clusters into '{MISC_LABEL}'", pooled.len());
        sets.insert(
            ClusterKey::Misc,
            RepresentativeSet::build(ClusterKey::Misc, SetOrigin::PooledMisc, pooled, n_labels),
        );
    }

    log::info!(
        "Selected {} representative sets from {} clusters",
        sets.len(),
        clusters.len()
    );
    sets
}
