//! Cached view of the managed units.
//!
//! The registry owns one immutable [`Snapshot`] behind an `Arc`. Readers
//! clone the pointer; a refresh builds a complete new snapshot and swaps it
//! in, so nobody ever observes a half-updated unit list.
//!
//! Refresh is single-flight. A caller that arrives while a refresh is in
//! progress waits for it and shares its result instead of issuing a second
//! `list_units` against the runtime.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::runtime::{ContainerRuntime, RuntimeError, RuntimeUnit};
use crate::types::{Unit, UNCATEGORIZED};

/// Label key carrying a unit's section.
pub const SECTION_LABEL: &str = "section";

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Sorted by name, ordinal comparison.
    pub units: Vec<Unit>,
    /// `None` until the first successful refresh.
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn find(&self, name: &str) -> Option<&Unit> {
        self.units
            .binary_search_by(|u| u.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.units[idx])
    }
}

/// Turn raw runtime entries into sorted units.
pub fn normalize(raw: Vec<RuntimeUnit>) -> Vec<Unit> {
    let mut units: Vec<Unit> = raw
        .into_iter()
        .map(|r| {
            let name = r
                .names
                .first()
                .map(|n| n.strip_prefix('/').unwrap_or(n).to_string())
                .unwrap_or_else(|| r.id.clone());
            let section = r
                .labels
                .get(SECTION_LABEL)
                .cloned()
                .unwrap_or_else(|| UNCATEGORIZED.to_string());
            Unit {
                running: r.status.contains("Up"),
                id: r.id,
                name,
                section,
                status: r.status,
            }
        })
        .collect();
    units.sort_by(|a, b| a.name.cmp(&b.name));
    units
}

// ---------------------------------------------------------------------------
// UnitRegistry
// ---------------------------------------------------------------------------

pub struct UnitRegistry {
    runtime: Arc<dyn ContainerRuntime>,
    current: RwLock<Arc<Snapshot>>,
    /// Completed refreshes. Read before queueing on `last` to detect that
    /// another caller finished a refresh while we waited.
    generation: AtomicU64,
    last: Mutex<Result<(), RuntimeError>>,
}

impl UnitRegistry {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            current: RwLock::new(Arc::new(Snapshot::default())),
            generation: AtomicU64::new(0),
            last: Mutex::new(Ok(())),
        }
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// The last published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Pull the unit list from the runtime and publish a new snapshot.
    /// On failure the previous snapshot stays in place.
    pub async fn refresh(&self) -> Result<(), RuntimeError> {
        let seen = self.generation.load(Ordering::Acquire);
        let mut last = self.last.lock().await;
        if self.generation.load(Ordering::Acquire) != seen {
            debug!("joined in-flight refresh");
            return last.clone();
        }

        let result = match self.runtime.list_units().await {
            Ok(raw) => {
                let snapshot = Snapshot {
                    units: normalize(raw),
                    refreshed_at: Some(Utc::now()),
                };
                debug!(units = snapshot.units.len(), "registry refreshed");
                *self.current.write().unwrap_or_else(PoisonError::into_inner) =
                    Arc::new(snapshot);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "registry refresh failed; keeping previous snapshot");
                Err(e)
            }
        };

        *last = result.clone();
        self.generation.fetch_add(1, Ordering::Release);
        result
    }

    /// Look a unit up in the current snapshot. Never refreshes.
    pub fn lookup(&self, name: &str) -> Option<Unit> {
        self.snapshot().find(name).cloned()
    }

    pub fn running_names(&self) -> BTreeSet<String> {
        self.names_where(true)
    }

    pub fn stopped_names(&self) -> BTreeSet<String> {
        self.names_where(false)
    }

    fn names_where(&self, running: bool) -> BTreeSet<String> {
        self.snapshot()
            .units
            .iter()
            .filter(|u| u.running == running)
            .map(|u| u.name.clone())
            .collect()
    }

    /// Refresh every `interval` until `cancel` fires.
    pub fn spawn_periodic_refresh(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "periodic registry refresh started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        // Failures are already logged by refresh().
                        let _ = registry.refresh().await;
                    }
                }
            }
            debug!("periodic registry refresh stopped");
        })
    }
}
