//! Test doubles for the runtime, the status channel and the poll delay.
//!
//! Compiled for this crate's own tests and, with the `test-support` feature,
//! for downstream crates' tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::orchestrator::{Delay, StatusSink, StatusUpdate};
use crate::registry::SECTION_LABEL;
use crate::runtime::{ContainerRuntime, RuntimeError, RuntimeUnit};

// ---------------------------------------------------------------------------
// FakeRuntime
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct FakeUnit {
    id: String,
    name: String,
    running: bool,
    section: Option<String>,
    /// Target state and the number of `list_units` calls left before it shows.
    pending: Option<(bool, u32)>,
}

#[derive(Debug, Default)]
struct FakeState {
    units: Vec<FakeUnit>,
    calls: Vec<String>,
    list_calls: usize,
    fail_list: bool,
    fail_start: bool,
    fail_stop: bool,
    fail_restart: bool,
    /// Accept lifecycle calls but never change state.
    stuck: bool,
    /// `list_units` calls after a mutation before its effect is visible.
    lag: u32,
    list_delay: Option<Duration>,
}

/// In-memory container host. Units are reported with the Engine API's `/`
/// name prefix and id `id-<name>`.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unit(self, name: &str, section: &str, running: bool) -> Self {
        self.push(name, Some(section), running);
        self
    }

    pub fn with_unlabeled_unit(self, name: &str, running: bool) -> Self {
        self.push(name, None, running);
        self
    }

    fn push(&self, name: &str, section: Option<&str>, running: bool) {
        self.lock().units.push(FakeUnit {
            id: Self::id_of(name),
            name: name.to_string(),
            running,
            section: section.map(str::to_string),
            pending: None,
        });
    }

    pub fn id_of(name: &str) -> String {
        format!("id-{name}")
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -- knobs --------------------------------------------------------------

    pub fn fail_list(&self, fail: bool) {
        self.lock().fail_list = fail;
    }

    pub fn fail_start(&self, fail: bool) {
        self.lock().fail_start = fail;
    }

    pub fn fail_stop(&self, fail: bool) {
        self.lock().fail_stop = fail;
    }

    pub fn fail_restart(&self, fail: bool) {
        self.lock().fail_restart = fail;
    }

    pub fn set_stuck(&self, stuck: bool) {
        self.lock().stuck = stuck;
    }

    /// A mutation becomes visible on the `lag`-th `list_units` call after it.
    pub fn set_lag(&self, lag: u32) {
        self.lock().lag = lag;
    }

    pub fn set_list_delay(&self, delay: Duration) {
        self.lock().list_delay = Some(delay);
    }

    /// Change a unit's state behind the registry's back.
    pub fn set_running(&self, name: &str, running: bool) {
        if let Some(unit) = self.lock().units.iter_mut().find(|u| u.name == name) {
            unit.running = running;
            unit.pending = None;
        }
    }

    pub fn set_section(&self, name: &str, section: &str) {
        if let Some(unit) = self.lock().units.iter_mut().find(|u| u.name == name) {
            unit.section = Some(section.to_string());
        }
    }

    // -- observations -------------------------------------------------------

    pub fn is_running(&self, name: &str) -> Option<bool> {
        self.lock()
            .units
            .iter()
            .find(|u| u.name == name)
            .map(|u| u.running)
    }

    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    /// Lifecycle calls in order, formatted as `op:id`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn mutation_calls(&self) -> usize {
        self.lock().calls.len()
    }

    fn mutate(&self, op: &'static str, id: &str, target: Option<bool>) -> Result<(), RuntimeError> {
        let mut state = self.lock();
        state.calls.push(format!("{op}:{id}"));

        let failing = match op {
            "start" => state.fail_start,
            "stop" => state.fail_stop,
            _ => state.fail_restart,
        };
        if failing {
            return Err(RuntimeError::rejected(op, id, "injected failure"));
        }

        let stuck = state.stuck;
        let lag = state.lag;
        let Some(unit) = state.units.iter_mut().find(|u| u.id == id) else {
            return Err(RuntimeError::rejected(op, id, "no such container"));
        };
        if stuck {
            return Ok(());
        }
        match target {
            Some(running) if lag == 0 => unit.running = running,
            Some(running) => unit.pending = Some((running, lag)),
            // Restart: the unit is briefly down, then up again.
            None if lag == 0 => unit.running = true,
            None => {
                unit.running = false;
                unit.pending = Some((true, lag));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_units(&self) -> Result<Vec<RuntimeUnit>, RuntimeError> {
        let delay = {
            let mut state = self.lock();
            state.list_calls += 1;
            state.list_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        if state.fail_list {
            return Err(RuntimeError::Unavailable("injected failure".into()));
        }
        for unit in &mut state.units {
            if let Some((running, left)) = unit.pending {
                if left <= 1 {
                    unit.running = running;
                    unit.pending = None;
                } else {
                    unit.pending = Some((running, left - 1));
                }
            }
        }
        Ok(state
            .units
            .iter()
            .map(|u| RuntimeUnit {
                id: u.id.clone(),
                names: vec![format!("/{}", u.name)],
                status: if u.running {
                    "Up 5 minutes".to_string()
                } else {
                    "Exited (0) 5 minutes ago".to_string()
                },
                labels: u
                    .section
                    .iter()
                    .map(|s| (SECTION_LABEL.to_string(), s.clone()))
                    .collect::<HashMap<_, _>>(),
            })
            .collect())
    }

    async fn start(&self, id: &str) -> Result<(), RuntimeError> {
        self.mutate("start", id, Some(true))
    }

    async fn stop(&self, id: &str) -> Result<(), RuntimeError> {
        self.mutate("stop", id, Some(false))
    }

    async fn restart(&self, id: &str) -> Result<(), RuntimeError> {
        self.mutate("restart", id, None)
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// Status sink that keeps every update it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<StatusUpdate>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StatusSink for RecordingSink {
    fn publish(&self, update: StatusUpdate) {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(update);
    }
}

// ---------------------------------------------------------------------------
// NoDelay
// ---------------------------------------------------------------------------

/// Delay that returns immediately and records what it was asked to wait.
#[derive(Debug, Default)]
pub struct NoDelay {
    waits: Mutex<Vec<Duration>>,
}

impl NoDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.waits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Delay for NoDelay {
    async fn sleep(&self, duration: Duration) {
        self.waits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
        tokio::task::yield_now().await;
    }
}
