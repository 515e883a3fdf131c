//! Privacy-preserving cohort construction
//!
//! Records are grouped by generalized key. Groups below the k (farms) or l
//! (distinct outcomes) floor are merged into their nearest neighbour, smallest
//! violator first, until every group passes or a single catch-all remains.
//! Only aggregates leave this module.

use std::collections::{BTreeMap, BTreeSet};

use ahash::AHashMap;
use tracing::{debug, info};

use super::snapshot::{AggregateStats, CohortCluster, CohortKey, CohortSnapshot};
use super::source::CohortSourceRecord;
use crate::config::CohortConfig;
use crate::context::{crop_pattern, region_bucket, InputPhilosophy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CohortBuilder {
    pub k: usize,
    pub l: usize,
}

/// Working cluster during merging
#[derive(Debug, Clone)]
struct Draft {
    keys: Vec<CohortKey>,
    members: Vec<usize>,
}

/// Context features used for nearest-cluster distance
struct Profile {
    region: String,
    crops: BTreeSet<String>,
    philosophy: InputPhilosophy,
    mean_size: f64,
}

impl CohortBuilder {
    pub fn new(k: usize, l: usize) -> Self {
        Self { k: k.max(1), l: l.max(1) }
    }

    pub fn from_config(config: &CohortConfig) -> Self {
        Self::new(config.k, config.l)
    }

    fn satisfies(&self, draft: &Draft, records: &[CohortSourceRecord]) -> bool {
        draft.members.len() >= self.k && distinct_outcomes(draft, records) >= self.l
    }

    /// Build a snapshot from source records
    pub fn build(&self, records: &[CohortSourceRecord], version: u64) -> CohortSnapshot {
        let mut groups: BTreeMap<CohortKey, Vec<usize>> = BTreeMap::new();
        for (i, r) in records.iter().enumerate() {
            let key = CohortKey {
                region: region_bucket(&r.region_code),
                crop_pattern: crop_pattern(r.crops.iter().map(String::as_str)),
                input_philosophy: r.input_philosophy,
            };
            groups.entry(key).or_default().push(i);
        }

        let mut drafts: Vec<Draft> = groups
            .into_iter()
            .map(|(key, members)| Draft { keys: vec![key], members })
            .collect();
        let initial = drafts.len();
        let mut merges = 0usize;

        while drafts.len() > 1 {
            let violator = drafts
                .iter()
                .enumerate()
                .filter(|(_, d)| !self.satisfies(d, records))
                .min_by(|(ia, a), (ib, b)| a.members.len().cmp(&b.members.len()).then(ia.cmp(ib)))
                .map(|(i, _)| i);
            let Some(v) = violator else { break };

            let source = profile(&drafts[v], records);
            let nearest = drafts
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != v)
                .map(|(i, d)| (i, distance(&source, &profile(d, records))))
                .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
                .map(|(i, _)| i);
            let Some(target) = nearest else { break };

            let absorbed = drafts.remove(v);
            let target = if target > v { target - 1 } else { target };
            drafts[target].keys.extend(absorbed.keys);
            drafts[target].members.extend(absorbed.members);
            merges += 1;
        }

        let clusters: Vec<CohortCluster> = drafts
            .iter()
            .enumerate()
            .map(|(id, d)| {
                let mut keys = d.keys.clone();
                keys.sort();
                let stats = self.satisfies(d, records).then(|| aggregate(id, d, records, version));
                CohortCluster { keys, stats }
            })
            .collect();

        let snapshot = CohortSnapshot::new(version, self.k, self.l, clusters);
        debug!(initial_groups = initial, merges, "cohort merging finished");
        info!(
            version,
            records = records.len(),
            clusters = snapshot.clusters().len(),
            queryable = snapshot.queryable_count(),
            "cohort snapshot built"
        );
        snapshot
    }
}

fn distinct_outcomes(draft: &Draft, records: &[CohortSourceRecord]) -> usize {
    draft
        .members
        .iter()
        .map(|&i| records[i].outcome.as_str())
        .collect::<BTreeSet<_>>()
        .len()
}

fn majority<T: Clone + Ord + std::hash::Hash>(counts: AHashMap<T, usize>) -> Option<T> {
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .map(|(v, _)| v)
}

fn profile(draft: &Draft, records: &[CohortSourceRecord]) -> Profile {
    let mut regions: AHashMap<String, usize> = AHashMap::new();
    let mut philosophies: AHashMap<InputPhilosophy, usize> = AHashMap::new();
    let mut crops = BTreeSet::new();
    let mut size_sum = 0.0;

    for &i in &draft.members {
        let r = &records[i];
        *regions.entry(region_bucket(&r.region_code)).or_insert(0) += 1;
        *philosophies.entry(r.input_philosophy).or_insert(0) += 1;
        crops.extend(r.crops.iter().map(|c| c.trim().to_ascii_lowercase()));
        size_sum += r.farm_size_ha;
    }

    Profile {
        region: majority(regions).unwrap_or_default(),
        crops,
        philosophy: majority(philosophies).unwrap_or(InputPhilosophy::Mixed),
        mean_size: if draft.members.is_empty() { 0.0 } else { size_sum / draft.members.len() as f64 },
    }
}

/// Context-feature distance between two clusters
fn distance(a: &Profile, b: &Profile) -> f64 {
    let region = if a.region == b.region {
        0.0
    } else if a.region.split('-').next() == b.region.split('-').next() {
        0.5
    } else {
        1.0
    };

    let union = a.crops.union(&b.crops).count();
    let crop = if union == 0 { 0.0 } else { 1.0 - a.crops.intersection(&b.crops).count() as f64 / union as f64 };

    let philosophy = if a.philosophy == b.philosophy { 0.0 } else { 0.5 };

    let larger = a.mean_size.max(b.mean_size).max(1.0);
    let size = (a.mean_size - b.mean_size).abs() / larger;

    region + crop + philosophy + size
}

fn proportions(counts: AHashMap<String, usize>, n: usize) -> BTreeMap<String, f64> {
    counts.into_iter().map(|(label, c)| (label, c as f64 / n as f64)).collect()
}

fn aggregate(id: usize, draft: &Draft, records: &[CohortSourceRecord], version: u64) -> AggregateStats {
    let n = draft.members.len().max(1);
    let mut outcomes: AHashMap<String, usize> = AHashMap::new();
    let mut practices: AHashMap<String, usize> = AHashMap::new();
    let mut size_sum = 0.0;
    let mut yield_sum = 0.0;

    for &i in &draft.members {
        let r = &records[i];
        *outcomes.entry(r.outcome.clone()).or_insert(0) += 1;
        let adopted: BTreeSet<&str> = r.practices.iter().map(String::as_str).collect();
        for p in adopted {
            *practices.entry(p.to_string()).or_insert(0) += 1;
        }
        size_sum += r.farm_size_ha;
        yield_sum += r.yield_index;
    }

    AggregateStats {
        cluster_id: id,
        region: profile(draft, records).region,
        farm_count: draft.members.len(),
        mean_farm_size_ha: size_sum / n as f64,
        mean_yield_index: yield_sum / n as f64,
        outcome_proportions: proportions(outcomes, n),
        practice_proportions: proportions(practices, n),
        snapshot_version: version,
    }
}
