//! Cohort anonymizer
//!
//! Builds k-anonymous, l-diverse peer cohorts from farm outcome records and
//! serves their aggregates through a versioned, atomically swapped snapshot.

pub mod builder;
pub mod registry;
pub mod snapshot;
pub mod source;

pub use builder::CohortBuilder;
pub use registry::{CohortRefresher, CohortRegistry};
pub use snapshot::{AggregateStats, CohortCluster, CohortKey, CohortLookup, CohortPattern, CohortSnapshot};
pub use source::{load_csv, load_parquet, records_from_dataframe, CohortSourceRecord};
