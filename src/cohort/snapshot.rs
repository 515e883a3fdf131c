//! Immutable, versioned cohort snapshot
//!
//! A snapshot holds aggregates only. Lookups resolve a farm's generalized key
//! to the cluster that absorbed it; clusters that could not reach the privacy
//! floors answer `NotAvailable`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::context::{region_bucket, InputPhilosophy};

/// Generalized grouping key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CohortKey {
    pub region: String,
    pub crop_pattern: String,
    pub input_philosophy: InputPhilosophy,
}

/// What a request looks up: its crop pattern and input philosophy
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CohortPattern {
    pub crop_pattern: String,
    pub input_philosophy: InputPhilosophy,
}

/// Aggregates exposed for one cohort
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub cluster_id: usize,
    /// Majority region bucket of the cluster
    pub region: String,
    pub farm_count: usize,
    pub mean_farm_size_ha: f64,
    pub mean_yield_index: f64,
    /// Outcome label → share of farms
    pub outcome_proportions: BTreeMap<String, f64>,
    /// Practice → share of farms that adopted it
    pub practice_proportions: BTreeMap<String, f64>,
    pub snapshot_version: u64,
}

impl AggregateStats {
    /// Most adopted practice and its share
    pub fn top_practice(&self) -> Option<(&str, f64)> {
        self.practice_proportions
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(p, share)| (p.as_str(), *share))
    }

    pub fn distinct_outcomes(&self) -> usize {
        self.outcome_proportions.len()
    }
}

/// One merged group of generalized keys
///
/// `stats` is present only when the cluster meets both the k and l floors;
/// nothing about a sub-floor cluster beyond its keys is retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortCluster {
    pub keys: Vec<CohortKey>,
    pub stats: Option<AggregateStats>,
}

impl CohortCluster {
    pub fn queryable(&self) -> bool {
        self.stats.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CohortLookup {
    Available(AggregateStats),
    NotAvailable { reason: String },
}

impl CohortLookup {
    pub fn stats(&self) -> Option<&AggregateStats> {
        match self {
            CohortLookup::Available(s) => Some(s),
            CohortLookup::NotAvailable { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CohortSnapshot {
    pub version: u64,
    pub built_at: DateTime<Utc>,
    pub k: usize,
    pub l: usize,
    clusters: Vec<CohortCluster>,
    index: FxHashMap<CohortKey, usize>,
}

impl CohortSnapshot {
    /// Stats that miss either floor are dropped here as well as in the builder
    pub fn new(version: u64, k: usize, l: usize, mut clusters: Vec<CohortCluster>) -> Self {
        for cluster in &mut clusters {
            let below_floor =
                cluster.stats.as_ref().map(|s| s.farm_count < k || s.distinct_outcomes() < l).unwrap_or(false);
            if below_floor {
                cluster.stats = None;
            }
        }
        let mut index = FxHashMap::default();
        for (i, cluster) in clusters.iter().enumerate() {
            for key in &cluster.keys {
                index.insert(key.clone(), i);
            }
        }
        Self { version, built_at: Utc::now(), k, l, clusters, index }
    }

    /// Snapshot with no cohorts; every lookup is `NotAvailable`
    pub fn empty(k: usize, l: usize) -> Self {
        Self::new(0, k, l, Vec::new())
    }

    pub fn clusters(&self) -> &[CohortCluster] {
        &self.clusters
    }

    pub fn queryable_count(&self) -> usize {
        self.clusters.iter().filter(|c| c.queryable()).count()
    }

    /// Aggregates for farms like this one, if privacy floors allow
    ///
    /// Exact key first, then the largest queryable cohort with the same region
    /// and crop pattern under any input philosophy.
    pub fn lookup(&self, region_code: &str, pattern: &CohortPattern) -> CohortLookup {
        if self.clusters.is_empty() {
            return CohortLookup::NotAvailable { reason: "no cohort snapshot published".to_string() };
        }

        let key = CohortKey {
            region: region_bucket(region_code),
            crop_pattern: pattern.crop_pattern.clone(),
            input_philosophy: pattern.input_philosophy,
        };

        if let Some(&i) = self.index.get(&key) {
            return match &self.clusters[i].stats {
                Some(stats) => CohortLookup::Available(stats.clone()),
                None => CohortLookup::NotAvailable {
                    reason: format!(
                        "cohort for {} {} is below the privacy floor (k={}, l={})",
                        key.region, key.crop_pattern, self.k, self.l
                    ),
                },
            };
        }

        let relaxed = self
            .index
            .iter()
            .filter(|(k, _)| k.region == key.region && k.crop_pattern == key.crop_pattern)
            .filter_map(|(_, &i)| self.clusters[i].stats.as_ref())
            .max_by(|a, b| a.farm_count.cmp(&b.farm_count).then_with(|| b.cluster_id.cmp(&a.cluster_id)));

        match relaxed {
            Some(stats) => CohortLookup::Available(stats.clone()),
            None => CohortLookup::NotAvailable {
                reason: format!("no comparable cohort for {} {}", key.region, key.crop_pattern),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(id: usize, count: usize) -> AggregateStats {
        AggregateStats {
            cluster_id: id,
            region: "IN-MH".to_string(),
            farm_count: count,
            mean_farm_size_ha: 1.5,
            mean_yield_index: 1.0,
            outcome_proportions: BTreeMap::from([("good".to_string(), 0.7), ("loss".to_string(), 0.3)]),
            practice_proportions: BTreeMap::from([("mulching".to_string(), 0.6), ("drip".to_string(), 0.2)]),
            snapshot_version: 3,
        }
    }

    fn key(pattern: &str, philosophy: InputPhilosophy) -> CohortKey {
        CohortKey { region: "IN-MH".to_string(), crop_pattern: pattern.to_string(), input_philosophy: philosophy }
    }

    fn snapshot() -> CohortSnapshot {
        CohortSnapshot::new(
            3,
            10,
            2,
            vec![
                CohortCluster { keys: vec![key("cotton", InputPhilosophy::Mixed)], stats: Some(stats(0, 14)) },
                CohortCluster { keys: vec![key("rice", InputPhilosophy::Organic)], stats: None },
            ],
        )
    }

    #[test]
    fn test_exact_lookup() {
        let pattern = CohortPattern { crop_pattern: "cotton".to_string(), input_philosophy: InputPhilosophy::Mixed };
        let found = snapshot().lookup("in-mh-pune", &pattern);
        assert_eq!(found.stats().unwrap().farm_count, 14);
        assert_eq!(found.stats().unwrap().top_practice(), Some(("mulching", 0.6)));
    }

    #[test]
    fn test_below_floor_is_not_available() {
        let pattern = CohortPattern { crop_pattern: "rice".to_string(), input_philosophy: InputPhilosophy::Organic };
        assert!(matches!(snapshot().lookup("IN-MH", &pattern), CohortLookup::NotAvailable { .. }));
    }

    #[test]
    fn test_new_strips_stats_below_floor() {
        let snapshot = CohortSnapshot::new(
            1,
            10,
            2,
            vec![CohortCluster { keys: vec![key("rice", InputPhilosophy::Organic)], stats: Some(stats(0, 4)) }],
        );
        assert!(snapshot.clusters()[0].stats.is_none());
        assert_eq!(snapshot.queryable_count(), 0);
    }

    #[test]
    fn test_relaxed_lookup_ignores_philosophy() {
        let pattern = CohortPattern { crop_pattern: "cotton".to_string(), input_philosophy: InputPhilosophy::Organic };
        assert!(snapshot().lookup("IN-MH-NSK", &pattern).stats().is_some());
    }

    #[test]
    fn test_empty_snapshot() {
        let pattern = CohortPattern { crop_pattern: "cotton".to_string(), input_philosophy: InputPhilosophy::Mixed };
        assert!(CohortSnapshot::empty(10, 2).lookup("IN-MH", &pattern).stats().is_none());
    }
}
