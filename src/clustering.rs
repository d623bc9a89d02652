/// Clustering module
///
/// Density-based clustering (DBSCAN) over embedding vectors using cosine
/// distance. Posts that end up in no cluster are reported as noise and
/// summarized together as "disparate posts".

/// Default neighbourhood radius (cosine distance)
pub const DEFAULT_EPS: f32 = 0.4;

/// Default minimum neighbourhood size for a core point, the point included
pub const DEFAULT_MIN_SAMPLES: usize = 2;

/// A group of items sharing a DBSCAN label
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster<T> {
    /// `Some(k)` for cluster `k`, `None` for noise
    pub label: Option<usize>,
    pub items: Vec<T>,
}

/// Cosine distance, `1 - cos(a, b)`. Zero vectors are at distance 1 from everything.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    let similarity = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
    1.0 - similarity
}

/// Run DBSCAN and return one label per point
///
/// Clusters are numbered from 0 in order of discovery, scanning points by
/// index. Border points join the first cluster that reaches them.
pub fn dbscan(points: &[Vec<f32>], eps: f32, min_samples: usize) -> Vec<Option<usize>> {
    let n = points.len();

    let neighbourhoods: Vec<Vec<usize>> = (0..n)
        .map(|i| {
            (0..n)
                .filter(|&j| i == j || cosine_distance(&points[i], &points[j]) <= eps)
                .collect()
        })
        .collect();

    let is_core: Vec<bool> = neighbourhoods
        .iter()
        .map(|neighbours| neighbours.len() >= min_samples)
        .collect();

    let mut labels: Vec<Option<usize>> = vec![None; n];
    let mut next_label = 0;
    let mut stack = Vec::new();

    for start in 0..n {
        if labels[start].is_some() || !is_core[start] {
            continue;
        }

        stack.push(start);
        while let Some(point) = stack.pop() {
            if labels[point].is_some() {
                continue;
            }
            labels[point] = Some(next_label);

            if is_core[point] {
                stack.extend(
                    neighbourhoods[point]
                        .iter()
                        .copied()
                        .filter(|&j| labels[j].is_none()),
                );
            }
        }

        next_label += 1;
    }

    log::debug!(
        "DBSCAN over {} points: {} clusters, {} noise",
        n,
        next_label,
        labels.iter().filter(|l| l.is_none()).count()
    );

    labels
}

/// Group items by label, ordered by each label's first appearance
pub fn group_by_label<T>(items: Vec<T>, labels: &[Option<usize>]) -> Vec<Cluster<T>> {
    let mut clusters: Vec<Cluster<T>> = Vec::new();

    for (item, label) in items.into_iter().zip(labels.iter().copied()) {
        match clusters.iter_mut().find(|c| c.label == label) {
            Some(cluster) => cluster.items.push(item),
            None => clusters.push(Cluster {
                label,
                items: vec![item],
            }),
        }
    }

    clusters
}
