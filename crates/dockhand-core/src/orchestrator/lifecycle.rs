use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::delay::Delay;
use super::locks::UnitLocks;
use super::outcome::{DispatchStage, Outcome};
use super::status::{StatusSink, StatusUpdate};
use crate::config::{DockerSettings, RestartStrategy};
use crate::permissions::{authorize, holds_any_grant, Policy};
use crate::registry::UnitRegistry;
use crate::runtime::RuntimeError;
use crate::types::{Action, Request, Unit, UnitTarget};

/// Per-request state. Transitions:
/// `Authorizing → Resolving → Dispatching → Confirming → Terminal`,
/// with any state able to jump straight to `Terminal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Authorizing,
    Resolving,
    Dispatching,
    Confirming,
    Terminal,
}

impl FlowState {
    pub fn as_str(self) -> &'static str {
        match self {
            FlowState::Authorizing => "authorizing",
            FlowState::Resolving => "resolving",
            FlowState::Dispatching => "dispatching",
            FlowState::Confirming => "confirming",
            FlowState::Terminal => "terminal",
        }
    }
}

/// What a single flow runs against: the policy snapshot it was admitted
/// under, where to report progress, and how it gets cancelled.
#[derive(Clone)]
pub struct FlowContext {
    pub policy: Arc<Policy>,
    pub status: Arc<dyn StatusSink>,
    pub cancel: CancellationToken,
}

impl FlowContext {
    pub fn new(policy: Arc<Policy>, status: Arc<dyn StatusSink>) -> Self {
        Self {
            policy,
            status,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

// ---------------------------------------------------------------------------
// LifecycleOrchestrator
// ---------------------------------------------------------------------------

pub struct LifecycleOrchestrator {
    registry: Arc<UnitRegistry>,
    delay: Arc<dyn Delay>,
    settings: DockerSettings,
    locks: UnitLocks,
}

impl LifecycleOrchestrator {
    pub fn new(registry: Arc<UnitRegistry>, delay: Arc<dyn Delay>, settings: DockerSettings) -> Self {
        Self {
            registry,
            delay,
            settings,
            locks: UnitLocks::default(),
        }
    }

    pub fn registry(&self) -> &Arc<UnitRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &DockerSettings {
        &self.settings
    }

    /// Run one request to its terminal outcome. The outcome is also
    /// published to `ctx.status` as `Finished`.
    pub async fn handle_request(&self, request: Request, ctx: &FlowContext) -> Outcome {
        let span = info_span!(
            "flow",
            actor = request.actor,
            action = %request.action,
            unit = %request.unit,
        );
        let outcome = self.run(&request, ctx).instrument(span.clone()).await;
        span.in_scope(|| {
            enter(FlowState::Terminal);
            info!(outcome = outcome.kind(), "flow finished");
        });
        ctx.status.publish(StatusUpdate::Finished {
            message: outcome.render(request.mention.as_deref()),
            outcome: outcome.clone(),
        });
        outcome
    }

    async fn run(&self, request: &Request, ctx: &FlowContext) -> Outcome {
        let action = request.action;
        let name = request.unit.as_str();

        // -- Authorizing: no runtime calls ---------------------------------
        // A hit in the cache can be granted right away. Anything else is
        // only worth a refresh if some grant could still match.
        enter(FlowState::Authorizing);
        let cached = self.registry.lookup(name);
        let target = cached
            .as_ref()
            .map(UnitTarget::from)
            .unwrap_or_else(|| UnitTarget::named(name));
        if !authorize(request.actor, action, &target, &request.groups, &ctx.policy)
            && !holds_any_grant(request.actor, action, &request.groups, &ctx.policy)
        {
            info!("request denied");
            return Outcome::Unauthorized;
        }

        // -- Resolving ------------------------------------------------------
        enter(FlowState::Resolving);
        if name.is_empty() {
            return Outcome::NoTargetSpecified;
        }

        let _guard = if self.settings.unit_locking {
            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return cancelled(action, name),
                guard = self.locks.acquire(name) => Some(guard),
            }
        } else {
            None
        };

        let refreshed = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return cancelled(action, name),
            result = self.registry.refresh() => result,
        };
        if let Err(e) = refreshed {
            return Outcome::RuntimeUnavailable {
                reason: e.reason().to_string(),
            };
        }

        // Grants are decided again on the unit as it is now.
        let unit = self.registry.lookup(name);
        let target = unit
            .as_ref()
            .map(UnitTarget::from)
            .unwrap_or_else(|| UnitTarget::named(name));
        if !authorize(request.actor, action, &target, &request.groups, &ctx.policy) {
            info!("request denied after refresh");
            return Outcome::Unauthorized;
        }
        let Some(unit) = unit else {
            return Outcome::UnitNotFound {
                unit: name.to_string(),
            };
        };
        if action == Action::Start && unit.running {
            return Outcome::AlreadyRunning {
                unit: name.to_string(),
            };
        }

        ctx.status.publish(StatusUpdate::accepted(
            action,
            name,
            self.settings.confirm_budget().as_secs(),
        ));

        // -- Dispatching ----------------------------------------------------
        enter(FlowState::Dispatching);
        if ctx.cancel.is_cancelled() {
            return cancelled(action, name);
        }
        if let Err((stage, e)) = self.dispatch(action, &unit).await {
            warn!(stage = stage.as_str(), error = %e, "dispatch failed");
            return Outcome::DispatchFailed {
                action,
                unit: name.to_string(),
                stage,
                reason: e.reason().to_string(),
            };
        }

        // -- Confirming -----------------------------------------------------
        enter(FlowState::Confirming);
        self.confirm(action, name, ctx).await
    }

    async fn dispatch(&self, action: Action, unit: &Unit) -> Result<(), (DispatchStage, RuntimeError)> {
        let runtime = self.registry.runtime();
        let id = unit.id.as_str();
        match action {
            Action::Start => runtime
                .start(id)
                .await
                .map_err(|e| (DispatchStage::Start, e)),
            Action::Stop => runtime.stop(id).await.map_err(|e| (DispatchStage::Stop, e)),
            Action::Restart => match self.settings.restart_strategy {
                RestartStrategy::Native => runtime
                    .restart(id)
                    .await
                    .map_err(|e| (DispatchStage::Restart, e)),
                RestartStrategy::StopThenStart => {
                    runtime.stop(id).await.map_err(|e| (DispatchStage::Stop, e))?;
                    runtime
                        .start(id)
                        .await
                        .map_err(|e| (DispatchStage::Start, e))
                }
            },
        }
    }

    /// Poll until the unit shows the expected state, `retries` times with a
    /// wait before each poll, then one last check.
    async fn confirm(&self, action: Action, name: &str, ctx: &FlowContext) -> Outcome {
        let delay = self.settings.retry_delay();
        for attempt in 1..=self.settings.retries {
            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return cancelled(action, name),
                _ = self.delay.sleep(delay) => {}
            }
            let refreshed = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return cancelled(action, name),
                result = self.registry.refresh() => result,
            };
            match refreshed {
                Ok(()) if self.confirmed(action, name) => {
                    debug!(attempt, "confirmed");
                    return success(action, name);
                }
                Ok(()) => debug!(attempt, "not confirmed yet"),
                Err(e) => warn!(attempt, error = %e, "refresh failed while confirming"),
            }
        }

        let refreshed = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return cancelled(action, name),
            result = self.registry.refresh() => result,
        };
        match refreshed {
            Ok(()) if self.confirmed(action, name) => success(action, name),
            Ok(()) => Outcome::Timeout {
                action,
                unit: name.to_string(),
            },
            Err(e) => Outcome::RuntimeUnavailable {
                reason: e.reason().to_string(),
            },
        }
    }

    fn confirmed(&self, action: Action, name: &str) -> bool {
        if action.expects_running() {
            self.registry.running_names().contains(name)
        } else {
            self.registry.stopped_names().contains(name)
        }
    }
}

fn enter(state: FlowState) {
    debug!(state = state.as_str(), "flow state");
}

fn success(action: Action, name: &str) -> Outcome {
    Outcome::Success {
        action,
        unit: name.to_string(),
    }
}

fn cancelled(action: Action, name: &str) -> Outcome {
    info!("flow cancelled");
    Outcome::Cancelled {
        action,
        unit: name.to_string(),
    }
}
