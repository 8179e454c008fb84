//! The three steps of the `/docker` conversation: pick a section, pick a
//! unit in it, then act on the unit.

use axum::{extract::State, http::StatusCode, Json};
use dockhand_core::permissions::{authorized_sections, units_in_section};
use dockhand_core::types::{Action, ActorId, Request, RoleId};
use serde::Deserialize;
use tracing::info;

use super::{current_units, UnitView};
use crate::error::AppError;
use crate::routes::runs::spawn_flow;
use crate::state::{lock, AppState};

#[derive(Debug, Deserialize)]
pub struct CommandBody {
    pub actor_id: ActorId,
    #[serde(default)]
    pub groups: Vec<RoleId>,
}

#[derive(Debug, Deserialize)]
pub struct SectionBody {
    pub actor_id: ActorId,
    #[serde(default)]
    pub groups: Vec<RoleId>,
    pub section: String,
}

#[derive(Debug, Deserialize)]
pub struct UnitBody {
    pub actor_id: ActorId,
    #[serde(default)]
    pub groups: Vec<RoleId>,
    pub action: Action,
    pub unit: String,
    /// How to address the actor in the final message.
    #[serde(default)]
    pub mention: Option<String>,
    /// Hold the response until the flow finishes.
    #[serde(default)]
    pub wait: bool,
}

/// POST /api/commands/docker: the sections the actor may pick from.
pub async fn docker_command(
    State(app): State<AppState>,
    Json(body): Json<CommandBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let snapshot = current_units(&app).await?;
    let policy = app.policy.current().policy;
    let sections = authorized_sections(body.actor_id, &body.groups, &policy, &snapshot.units);

    let empty = sections.is_empty();
    let mut response = serde_json::json!({ "sections": sections });
    if empty {
        response["message"] = "You have no access to any sections.".into();
    }
    Ok(Json(response))
}

/// POST /api/commands/docker/section: visible units in the chosen section.
pub async fn section_selected(
    State(app): State<AppState>,
    Json(body): Json<SectionBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let snapshot = current_units(&app).await?;
    let policy = app.policy.current().policy;
    let units: Vec<UnitView> = units_in_section(
        body.actor_id,
        &body.groups,
        &policy,
        &snapshot.units,
        &body.section,
    )
    .iter()
    .map(UnitView::from)
    .collect();

    let empty = units.is_empty();
    let mut response = serde_json::json!({
        "section": body.section,
        "units": units,
    });
    if empty {
        response["message"] = "You have no access to containers in this section.".into();
    }
    Ok(Json(response))
}

/// POST /api/commands/docker/unit: start a lifecycle flow.
///
/// Returns 202 with the run id and acknowledgment text; the outcome arrives
/// on `/api/runs/{id}/events`. With `"wait": true` the response is the
/// finished run record instead.
pub async fn unit_selected(
    State(app): State<AppState>,
    Json(body): Json<UnitBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let mut request = Request::new(body.actor_id, body.action, body.unit.trim())
        .with_groups(body.groups);
    if let Some(mention) = body.mention {
        request = request.with_mention(mention);
    }

    info!(actor = request.actor, action = %request.action, unit = %request.unit, "interaction received");
    let ack = format!(
        "Processing your request to {} `{}`...",
        request.action, request.unit
    );
    let (record, finished) = spawn_flow(&app, request);

    if !body.wait {
        return Ok((
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "run_id": record.id,
                "status": "accepted",
                "message": ack,
            })),
        ));
    }

    finished
        .await
        .map_err(|e| AppError(anyhow::anyhow!("flow supervisor failed: {e}")))?;
    let record = lock(&app.runs)
        .get(&record.id)
        .map(|h| h.record.clone())
        .ok_or_else(|| AppError::not_found(format!("run '{}' was evicted", record.id)))?;
    Ok((StatusCode::OK, Json(serde_json::to_value(record)?)))
}
