use serde::Serialize;
use std::collections::BTreeMap;

/// Summary of the solute clusters that have at least one attached member.
/// Sizes count the root.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ClusterStatistics {
    pub avg_size: f64,
    pub max_size: usize,
    pub avg_size_sq: f64,
    pub number_of_clusters: usize,
    pub cluster_sizes: Vec<usize>,
}

impl ClusterStatistics {
    /// Builds the summary from a root -> size histogram.
    pub fn from_histogram(histogram: &BTreeMap<usize, usize>) -> Self {
        let cluster_sizes: Vec<usize> = histogram.values().copied().collect();
        let number_of_clusters = cluster_sizes.len();
        if number_of_clusters == 0 {
            return Self::default();
        }

        let n = number_of_clusters as f64;
        let sum: usize = cluster_sizes.iter().sum();
        let sum_sq: usize = cluster_sizes.iter().map(|s| s * s).sum();
        Self {
            avg_size: sum as f64 / n,
            max_size: cluster_sizes.iter().copied().max().unwrap_or(0),
            avg_size_sq: sum_sq as f64 / n,
            number_of_clusters,
            cluster_sizes,
        }
    }
}
