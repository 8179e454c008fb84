use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

/// One container as reported by the runtime, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeUnit {
    pub id: String,
    /// Runtime names. The Engine API reports them as `/name`.
    pub names: Vec<String>,
    pub status: String,
    pub labels: HashMap<String, String>,
}

/// Failures surfaced by a [`ContainerRuntime`].
///
/// Payloads are plain strings so a single refresh result can be shared
/// between every flow that waited on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    #[error("runtime rejected {op} of {id}: {reason}")]
    Rejected {
        op: &'static str,
        id: String,
        reason: String,
    },
}

impl RuntimeError {
    pub fn rejected(op: &'static str, id: impl Into<String>, reason: impl Into<String>) -> Self {
        RuntimeError::Rejected {
            op,
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Short human-readable reason without the operation prefix.
    pub fn reason(&self) -> &str {
        match self {
            RuntimeError::Unavailable(reason) => reason,
            RuntimeError::Rejected { reason, .. } => reason,
        }
    }
}

/// The container host. Implementations only need list/start/stop/restart of a
/// single unit by id; all of them are fire-and-forget from the orchestrator's
/// point of view, which confirms the effect by polling `list_units`.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn list_units(&self) -> Result<Vec<RuntimeUnit>, RuntimeError>;

    async fn start(&self, id: &str) -> Result<(), RuntimeError>;

    async fn stop(&self, id: &str) -> Result<(), RuntimeError>;

    async fn restart(&self, id: &str) -> Result<(), RuntimeError>;
}
