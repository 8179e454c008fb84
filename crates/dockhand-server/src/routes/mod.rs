pub mod health;
pub mod interactions;
pub mod runs;
pub mod units;

use std::sync::Arc;

use dockhand_core::registry::Snapshot;
use dockhand_core::types::{RoleId, Unit};
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

/// Refresh the registry and return the new snapshot. Listings always show
/// the runtime's current view, so a failed refresh is a 503.
async fn current_units(app: &AppState) -> Result<Arc<Snapshot>, AppError> {
    app.registry
        .refresh()
        .await
        .map_err(|e| AppError::unavailable(e.to_string()))?;
    Ok(app.registry.snapshot())
}

/// Parse a comma-separated list of role ids, e.g. `?groups=100,200`.
fn parse_groups(raw: Option<&str>) -> Result<Vec<RoleId>, AppError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<RoleId>()
                .map_err(|_| AppError::bad_request(format!("invalid group id '{s}'")))
        })
        .collect()
}

/// A unit as shown to a chat user.
#[derive(Debug, Serialize)]
pub struct UnitView {
    pub name: String,
    pub running: bool,
    pub status: String,
}

impl From<&Unit> for UnitView {
    fn from(unit: &Unit) -> Self {
        Self {
            name: unit.name.clone(),
            running: unit.running,
            status: unit.status.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_groups_accepts_commas_and_spaces() {
        assert_eq!(parse_groups(Some("1, 2,,3")).unwrap(), vec![1, 2, 3]);
        assert!(parse_groups(None).unwrap().is_empty());
    }

    #[test]
    fn parse_groups_rejects_garbage() {
        assert!(parse_groups(Some("1,admin")).is_err());
    }
}
