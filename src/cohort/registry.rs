//! Current-snapshot holder and background refresher
//!
//! Readers take an `Arc` of the current snapshot and keep it for the whole
//! request. Publishing swaps the pointer under a short write lock; builds
//! happen before the lock is taken.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::builder::CohortBuilder;
use super::snapshot::CohortSnapshot;
use super::source::CohortSourceRecord;
use crate::adapters::CohortSourceStore;

pub struct CohortRegistry {
    /// Either guard is held only long enough to clone or swap the `Arc`;
    /// snapshot builds and drops of the replaced snapshot happen outside it.
    current: RwLock<Arc<CohortSnapshot>>,
    builder: CohortBuilder,
    last_version: AtomicU64,
}

impl CohortRegistry {
    pub fn new(builder: CohortBuilder) -> Self {
        Self {
            current: RwLock::new(Arc::new(CohortSnapshot::empty(builder.k, builder.l))),
            builder,
            last_version: AtomicU64::new(0),
        }
    }

    /// Consistent view for one request
    pub fn snapshot(&self) -> Arc<CohortSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Swap in a snapshot built elsewhere
    pub fn publish(&self, snapshot: CohortSnapshot) {
        let version = snapshot.version;
        self.last_version.fetch_max(version, Ordering::SeqCst);
        let incoming = Arc::new(snapshot);
        let replaced = {
            let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *guard, incoming)
        };
        drop(replaced);
        info!(version, "cohort snapshot published");
    }

    /// Build from records and publish; returns the new version
    pub fn rebuild(&self, records: &[CohortSourceRecord]) -> u64 {
        let version = self.last_version.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = self.builder.build(records, version);
        self.publish(snapshot);
        version
    }

    pub fn rebuild_from(&self, store: &dyn CohortSourceStore) -> Result<u64> {
        let records = store.records().context("Failed to load cohort source records")?;
        Ok(self.rebuild(&records))
    }
}

/// Periodic rebuild off the request path
pub struct CohortRefresher {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CohortRefresher {
    /// Rebuild immediately, then every `interval` until shut down
    pub fn spawn(registry: Arc<CohortRegistry>, store: Arc<dyn CohortSourceStore>, interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("cohort-refresher".to_string())
            .spawn(move || loop {
                if let Err(e) = registry.rebuild_from(store.as_ref()) {
                    warn!(error = %e, "cohort rebuild failed; keeping previous snapshot");
                }
                match rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });

        match handle {
            Ok(handle) => Self { stop: Some(tx), handle: Some(handle) },
            Err(e) => {
                warn!(error = %e, "could not start cohort refresher");
                Self { stop: None, handle: None }
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("cohort refresher thread panicked");
            }
        }
    }
}

impl Drop for CohortRefresher {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
