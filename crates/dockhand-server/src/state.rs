use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dockhand_core::config::Settings;
use dockhand_core::orchestrator::{
    Delay, LifecycleOrchestrator, Outcome, StatusSink, StatusUpdate,
};
use dockhand_core::permissions::PolicyStore;
use dockhand_core::registry::UnitRegistry;
use dockhand_core::runtime::ContainerRuntime;
use dockhand_core::types::{Action, ActorId};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::auth::GatewayAuth;
use crate::metrics::HostMetricsState;

/// Finished runs kept for `GET /api/runs/{id}`.
pub const RUN_RETENTION: usize = 100;

// ---------------------------------------------------------------------------
// Run tracking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Finished,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: String,
    pub actor: ActorId,
    pub action: Action,
    pub unit: String,
    pub status: RunStatus,
    /// Policy version the request was authorized under.
    pub policy_version: u64,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    /// Latest status text: the acknowledgment, then the terminal message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub struct RunHandle {
    pub record: RunRecord,
    pub history: Vec<StatusUpdate>,
    pub tx: broadcast::Sender<StatusUpdate>,
    pub cancel: CancellationToken,
}

/// All known runs, newest last in `order`.
#[derive(Default)]
pub struct RunTable {
    runs: HashMap<String, RunHandle>,
    order: VecDeque<String>,
}

impl RunTable {
    pub fn insert(&mut self, handle: RunHandle) {
        self.order.push_back(handle.record.id.clone());
        self.runs.insert(handle.record.id.clone(), handle);
        self.enforce_retention();
    }

    pub fn get(&self, id: &str) -> Option<&RunHandle> {
        self.runs.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut RunHandle> {
        self.runs.get_mut(id)
    }

    pub fn active(&self) -> usize {
        self.runs
            .values()
            .filter(|h| h.record.status == RunStatus::Running)
            .count()
    }

    /// Drop the oldest finished runs beyond [`RUN_RETENTION`]. Running
    /// flows are never evicted.
    fn enforce_retention(&mut self) {
        let finished = self.runs.len() - self.active();
        let mut excess = finished.saturating_sub(RUN_RETENTION);
        if excess == 0 {
            return;
        }
        let runs = &mut self.runs;
        self.order.retain(|id| {
            if excess == 0 {
                return true;
            }
            let done = runs
                .get(id)
                .is_some_and(|h| h.record.status == RunStatus::Finished);
            if done {
                runs.remove(id);
                excess -= 1;
            }
            !done
        });
    }
}

/// Status sink of one run: records every update on the run and fans it out
/// to SSE subscribers.
pub struct RunSink {
    id: String,
    runs: Arc<Mutex<RunTable>>,
}

impl RunSink {
    pub fn new(id: impl Into<String>, runs: Arc<Mutex<RunTable>>) -> Self {
        Self {
            id: id.into(),
            runs,
        }
    }
}

impl StatusSink for RunSink {
    fn publish(&self, update: StatusUpdate) {
        let mut runs = lock(&self.runs);
        let Some(handle) = runs.get_mut(&self.id) else {
            return;
        };
        // A flow whose task died gets a synthetic Finished; never record two.
        if handle.record.status == RunStatus::Finished {
            return;
        }
        handle.record.message = Some(update.message().to_string());
        if let StatusUpdate::Finished { outcome, .. } = &update {
            handle.record.status = RunStatus::Finished;
            handle.record.completed_at = Some(Utc::now());
            handle.record.outcome = Some(outcome.clone());
        }
        let finished = handle.record.status == RunStatus::Finished;
        handle.history.push(update.clone());
        let _ = handle.tx.send(update);
        if finished {
            runs.enforce_retention();
        }
    }
}

pub fn lock(runs: &Mutex<RunTable>) -> MutexGuard<'_, RunTable> {
    runs.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// Settings file watched for policy changes. `None` disables hot reload.
    pub settings_path: Option<PathBuf>,
    pub policy: Arc<PolicyStore>,
    pub registry: Arc<UnitRegistry>,
    pub orchestrator: Arc<LifecycleOrchestrator>,
    pub runs: Arc<Mutex<RunTable>>,
    pub gateway: Arc<RwLock<GatewayAuth>>,
    /// Token from the environment; wins over the settings file on reload.
    pub token_override: Option<String>,
    /// Host CPU and memory sampling; `None` when `metrics.enabled` is off.
    pub metrics: Option<Arc<HostMetricsState>>,
    /// Cancelled on shutdown; every flow's token is a child of it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        settings: Settings,
        settings_path: Option<PathBuf>,
        runtime: Arc<dyn ContainerRuntime>,
        delay: Arc<dyn Delay>,
        token_override: Option<String>,
    ) -> Self {
        let registry = Arc::new(UnitRegistry::new(runtime));
        let orchestrator = Arc::new(LifecycleOrchestrator::new(
            registry.clone(),
            delay,
            settings.docker.clone(),
        ));
        let token = token_override
            .clone()
            .or_else(|| settings.server.gateway_token.clone());

        let state = Self {
            settings_path,
            policy: Arc::new(PolicyStore::new(settings.policy)),
            registry,
            orchestrator,
            runs: Arc::new(Mutex::new(RunTable::default())),
            gateway: Arc::new(RwLock::new(GatewayAuth { token })),
            token_override,
            metrics: settings
                .metrics
                .enabled
                .then(|| Arc::new(HostMetricsState::new(&settings.metrics))),
            shutdown: CancellationToken::new(),
        };

        // Guard: only spawn if inside a Tokio runtime (skipped in sync unit tests).
        if tokio::runtime::Handle::try_current().is_ok() {
            if settings.docker.refresh_interval > 0 {
                state.registry.spawn_periodic_refresh(
                    Duration::from_secs(settings.docker.refresh_interval),
                    state.shutdown.child_token(),
                );
            }
            if state.settings_path.is_some() {
                state.spawn_settings_watcher();
            }
            if let Some(metrics) = &state.metrics {
                if settings.metrics.interval > 0 {
                    metrics.spawn_sampler(
                        Duration::from_secs(settings.metrics.interval),
                        state.shutdown.child_token(),
                    );
                }
            }
        }

        state
    }

    /// Poll the settings file's mtime and reload the policy when it changes.
    fn spawn_settings_watcher(&self) {
        let app = self.clone();
        tokio::spawn(async move {
            let Some(path) = app.settings_path.clone() else {
                return;
            };
            let mut last_mtime = dockhand_core::io::modified_at(&path);
            loop {
                tokio::select! {
                    _ = app.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_millis(800)) => {}
                }
                let mtime = dockhand_core::io::modified_at(&path);
                if mtime.is_some() && mtime != last_mtime {
                    last_mtime = mtime;
                    let _ = app.reload_settings().await;
                }
            }
        });
    }

    /// Re-read the settings file and publish its policy. On any error the
    /// current policy stays in force. Returns the new policy version.
    pub async fn reload_settings(&self) -> Option<u64> {
        let path = self.settings_path.as_ref()?;
        let settings = match Settings::load(path) {
            Ok(s) => s,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "settings reload failed; keeping current policy");
                return None;
            }
        };
        let token = self
            .token_override
            .clone()
            .or(settings.server.gateway_token.clone());
        self.gateway.write().await.token = token;
        let version = self.policy.replace(settings.policy);
        info!(version, "policy reloaded");
        Some(version)
    }

    /// First registry refresh. Failure is logged; the server still starts
    /// and the next flow or periodic tick retries.
    pub async fn prime(&self) {
        match self.registry.refresh().await {
            Ok(()) => info!(units = self.registry.snapshot().units.len(), "registry primed"),
            Err(e) => warn!(error = %e, "initial registry refresh failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, status: RunStatus) -> RunRecord {
        RunRecord {
            id: id.to_string(),
            actor: 1,
            action: Action::Start,
            unit: "plex".into(),
            status,
            policy_version: 1,
            started_at: Utc::now(),
            completed_at: None,
            outcome: None,
            message: None,
        }
    }

    fn handle(id: &str, status: RunStatus) -> RunHandle {
        let (tx, _) = broadcast::channel(4);
        RunHandle {
            record: record(id, status),
            history: Vec::new(),
            tx,
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn retention_evicts_oldest_finished_only() {
        let mut table = RunTable::default();
        table.insert(handle("running", RunStatus::Running));
        for i in 0..RUN_RETENTION + 5 {
            table.insert(handle(&format!("done-{i}"), RunStatus::Finished));
        }
        assert!(table.get("running").is_some());
        assert!(table.get("done-0").is_none());
        assert!(table.get("done-4").is_none());
        assert!(table.get("done-5").is_some());
        assert_eq!(table.runs.len(), RUN_RETENTION + 1);
    }

    #[test]
    fn sink_records_terminal_update_once() {
        let runs = Arc::new(Mutex::new(RunTable::default()));
        lock(&runs).insert(handle("r1", RunStatus::Running));
        let sink = RunSink {
            id: "r1".into(),
            runs: runs.clone(),
        };

        sink.publish(StatusUpdate::accepted(Action::Start, "plex", 30));
        sink.publish(StatusUpdate::Finished {
            outcome: Outcome::Unauthorized,
            message: "first".into(),
        });
        sink.publish(StatusUpdate::Finished {
            outcome: Outcome::Failed {
                reason: "late".into(),
            },
            message: "second".into(),
        });

        let table = lock(&runs);
        let run = table.get("r1").unwrap();
        assert_eq!(run.record.status, RunStatus::Finished);
        assert_eq!(run.record.outcome, Some(Outcome::Unauthorized));
        assert_eq!(run.record.message.as_deref(), Some("first"));
        assert_eq!(run.history.len(), 2);
        assert!(run.record.completed_at.is_some());
    }
}
