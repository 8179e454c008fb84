use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use super::outcome::Outcome;
use crate::types::Action;

/// Progress of one flow as seen by the requester. A flow that gets past
/// resolving publishes `Accepted` then `Finished`; one that stops earlier
/// publishes only `Finished`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusUpdate {
    Accepted {
        action: Action,
        unit: String,
        /// Worst-case confirmation wait, `retries x time_before_retry`.
        budget_secs: u64,
        message: String,
    },
    Finished {
        outcome: Outcome,
        message: String,
    },
}

impl StatusUpdate {
    pub fn accepted(action: Action, unit: &str, budget_secs: u64) -> Self {
        StatusUpdate::Accepted {
            action,
            unit: unit.to_string(),
            budget_secs,
            message: format!("Processing your request to {action} `{unit}`..."),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            StatusUpdate::Accepted { message, .. } | StatusUpdate::Finished { message, .. } => {
                message
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StatusUpdate::Finished { .. })
    }
}

/// Where a flow reports progress. Publishing never blocks and never fails
/// the flow; a requester that went away simply misses the update.
pub trait StatusSink: Send + Sync {
    fn publish(&self, update: StatusUpdate);
}

impl StatusSink for mpsc::UnboundedSender<StatusUpdate> {
    fn publish(&self, update: StatusUpdate) {
        let _ = self.send(update);
    }
}

impl StatusSink for broadcast::Sender<StatusUpdate> {
    fn publish(&self, update: StatusUpdate) {
        let _ = self.send(update);
    }
}

/// Discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl StatusSink for NullSink {
    fn publish(&self, _update: StatusUpdate) {}
}
