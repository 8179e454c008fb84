use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use chrono::Utc;
use dockhand_core::orchestrator::{FlowContext, Outcome, StatusSink, StatusUpdate};
use dockhand_core::types::Request;
use futures::stream::{self, StreamExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{error, info};

use crate::error::AppError;
use crate::state::{lock, AppState, RunHandle, RunRecord, RunSink, RunStatus};

// ---------------------------------------------------------------------------
// Spawning
// ---------------------------------------------------------------------------

/// Start `request` as its own task and register it as a run.
///
/// The returned handle resolves once the run is finished, including when the
/// flow's task panicked: that is logged and recorded as `Failed` without
/// touching any other run.
pub fn spawn_flow(app: &AppState, request: Request) -> (RunRecord, JoinHandle<Outcome>) {
    let snapshot = app.policy.current();
    let id = uuid::Uuid::new_v4().to_string();
    let record = RunRecord {
        id: id.clone(),
        actor: request.actor,
        action: request.action,
        unit: request.unit.clone(),
        status: RunStatus::Running,
        policy_version: snapshot.version,
        started_at: Utc::now(),
        completed_at: None,
        outcome: None,
        message: None,
    };

    let (tx, _) = broadcast::channel::<StatusUpdate>(16);
    let cancel = app.shutdown.child_token();
    lock(&app.runs).insert(RunHandle {
        record: record.clone(),
        history: Vec::new(),
        tx,
        cancel: cancel.clone(),
    });

    let sink = Arc::new(RunSink::new(id.clone(), app.runs.clone()));
    let ctx = FlowContext::new(snapshot.policy, sink.clone()).with_cancel(cancel);
    let orchestrator = app.orchestrator.clone();
    let mention = request.mention.clone();

    info!(run_id = %id, "flow spawned");
    let flow = tokio::spawn(async move { orchestrator.handle_request(request, &ctx).await });

    let supervisor = tokio::spawn(async move {
        match flow.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(run_id = %id, error = %e, "flow task failed");
                let outcome = Outcome::Failed {
                    reason: e.to_string(),
                };
                sink.publish(StatusUpdate::Finished {
                    message: outcome.render(mention.as_deref()),
                    outcome: outcome.clone(),
                });
                outcome
            }
        }
    });

    (record, supervisor)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/runs/{id}
pub async fn get_run(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RunRecord>, AppError> {
    lock(&app.runs)
        .get(&id)
        .map(|h| Json(h.record.clone()))
        .ok_or_else(|| AppError::not_found(format!("no run with id '{id}'")))
}

/// GET /api/runs/{id}/events: SSE stream of the run's status updates.
///
/// Updates published before the subscription are replayed first; the stream
/// ends after the `finished` event.
pub async fn run_events(State(app): State<AppState>, Path(id): Path<String>) -> Response {
    // Snapshot history and subscribe under one lock so nothing falls between.
    let subscription = {
        let runs = lock(&app.runs);
        runs.get(&id).map(|h| {
            let live = (h.record.status == RunStatus::Running).then(|| h.tx.subscribe());
            (h.history.clone(), live)
        })
    };

    let Some((history, live)) = subscription else {
        // AppError is not used here: this fn returns Response directly (SSE vs JSON branch)
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("no run with id '{id}'") })),
        )
            .into_response();
    };

    let live = match live {
        Some(rx) => BroadcastStream::new(rx)
            .filter_map(|msg| async move { msg.ok() })
            .boxed(),
        None => stream::empty().boxed(),
    };

    let events = stream::iter(history)
        .chain(live)
        .scan(false, |done, update| {
            let item = if *done {
                None
            } else {
                *done = update.is_terminal();
                Some(update)
            };
            async move { item }
        })
        .map(|update| Ok::<Event, Infallible>(to_event(&update)));

    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn to_event(update: &StatusUpdate) -> Event {
    let name = match update {
        StatusUpdate::Accepted { .. } => "accepted",
        StatusUpdate::Finished { .. } => "finished",
    };
    let data = serde_json::to_string(update).unwrap_or_default();
    Event::default().event(name).data(data)
}

/// POST /api/runs/{id}/cancel
pub async fn cancel_run(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let runs = lock(&app.runs);
    let Some(handle) = runs.get(&id) else {
        return Err(AppError::not_found(format!("no run with id '{id}'")));
    };
    if handle.record.status == RunStatus::Finished {
        return Err(AppError::conflict(format!("run '{id}' has already finished")));
    }
    handle.cancel.cancel();
    info!(run_id = %id, "run cancellation requested");
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "run_id": id, "status": "cancelling" })),
    ))
}
