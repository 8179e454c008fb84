use axum::{
    extract::{Query, State},
    Json,
};
use dockhand_core::permissions::{group_by_section, list_authorized_units};
use dockhand_core::types::{ActorId, Unit};
use serde::{Deserialize, Serialize};

use super::{current_units, parse_groups, UnitView};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UnitsQuery {
    pub actor_id: ActorId,
    /// Comma-separated role ids.
    #[serde(default)]
    pub groups: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SectionView {
    pub section: String,
    pub units: Vec<UnitView>,
}

/// GET /api/units?actor_id=..&groups=..
///
/// Every unit the actor may start or stop, grouped by section in display
/// order.
pub async fn list_units(
    State(app): State<AppState>,
    Query(query): Query<UnitsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let groups = parse_groups(query.groups.as_deref())?;
    let snapshot = current_units(&app).await?;
    let policy = app.policy.current().policy;

    let visible = list_authorized_units(query.actor_id, &groups, &policy, &snapshot.units);
    let units: Vec<Unit> = snapshot
        .units
        .iter()
        .filter(|u| visible.contains(&u.name))
        .cloned()
        .collect();

    let sections: Vec<SectionView> = group_by_section(&units, &policy.section_order)
        .into_iter()
        .map(|(section, units)| SectionView {
            section,
            units: units.iter().map(UnitView::from).collect(),
        })
        .collect();

    Ok(Json(serde_json::json!({
        "count": units.len(),
        "sections": sections,
    })))
}
