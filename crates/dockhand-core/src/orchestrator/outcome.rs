use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Action;

/// Which runtime call a dispatch failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStage {
    Start,
    Stop,
    Restart,
}

impl DispatchStage {
    pub fn as_str(self) -> &'static str {
        match self {
            DispatchStage::Start => "start",
            DispatchStage::Stop => "stop",
            DispatchStage::Restart => "restart",
        }
    }
}

impl fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Terminal result of one lifecycle request. Every variant is user-visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        action: Action,
        unit: String,
    },
    Unauthorized,
    NoTargetSpecified,
    UnitNotFound {
        unit: String,
    },
    AlreadyRunning {
        unit: String,
    },
    RuntimeUnavailable {
        reason: String,
    },
    DispatchFailed {
        action: Action,
        unit: String,
        stage: DispatchStage,
        reason: String,
    },
    /// The runtime accepted the call but the expected state never showed.
    Timeout {
        action: Action,
        unit: String,
    },
    Cancelled {
        action: Action,
        unit: String,
    },
    /// Anything unexpected, e.g. the flow's task panicked.
    Failed {
        reason: String,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Success { .. } => "success",
            Outcome::Unauthorized => "unauthorized",
            Outcome::NoTargetSpecified => "no_target_specified",
            Outcome::UnitNotFound { .. } => "unit_not_found",
            Outcome::AlreadyRunning { .. } => "already_running",
            Outcome::RuntimeUnavailable { .. } => "runtime_unavailable",
            Outcome::DispatchFailed { .. } => "dispatch_failed",
            Outcome::Timeout { .. } => "timeout",
            Outcome::Cancelled { .. } => "cancelled",
            Outcome::Failed { .. } => "failed",
        }
    }

    /// Restart whose stop went through but whose start did not.
    pub fn left_stopped(&self) -> bool {
        matches!(
            self,
            Outcome::DispatchFailed {
                action: Action::Restart,
                stage: DispatchStage::Start,
                ..
            }
        )
    }

    /// The chat message for this outcome. `mention` addresses the actor in
    /// messages about their unit ("<@42> plex has been started").
    pub fn render(&self, mention: Option<&str>) -> String {
        let addressed = |text: String| match mention {
            Some(m) if !m.is_empty() => format!("{m} {text}"),
            _ => text,
        };
        match self {
            Outcome::Success { action, unit } => {
                addressed(format!("{unit} has been {}", action.past_tense()))
            }
            Outcome::Unauthorized => "You are not allowed to use this command".to_string(),
            Outcome::NoTargetSpecified => "No container name has been specified".to_string(),
            Outcome::UnitNotFound { unit } => {
                format!("Container with the name ***{unit}*** doesn't exist")
            }
            Outcome::AlreadyRunning { unit } => format!("{unit} is already running"),
            Outcome::RuntimeUnavailable { reason } => {
                format!("The container host cannot be reached right now ({reason})")
            }
            Outcome::DispatchFailed { unit, .. } if self.left_stopped() => addressed(format!(
                "{unit} could not be restarted: it was stopped but could not be started again"
            )),
            Outcome::DispatchFailed { action, unit, .. } | Outcome::Timeout { action, unit } => {
                addressed(format!("{unit} could not be {}", action.past_tense()))
            }
            Outcome::Cancelled { action, unit } => {
                format!("The request to {action} {unit} was cancelled")
            }
            Outcome::Failed { .. } => {
                "Something went wrong while processing your request".to_string()
            }
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_message_mentions_actor() {
        let outcome = Outcome::Success {
            action: Action::Start,
            unit: "plex".into(),
        };
        assert_eq!(outcome.render(Some("<@42>")), "<@42> plex has been started");
        assert_eq!(outcome.render(None), "plex has been started");
    }

    #[test]
    fn timeout_reads_as_could_not() {
        let outcome = Outcome::Timeout {
            action: Action::Stop,
            unit: "plex".into(),
        };
        assert_eq!(outcome.render(Some("<@42>")), "<@42> plex could not be stopped");
    }

    #[test]
    fn restart_left_stopped_is_called_out() {
        let outcome = Outcome::DispatchFailed {
            action: Action::Restart,
            unit: "plex".into(),
            stage: DispatchStage::Start,
            reason: "boom".into(),
        };
        assert!(outcome.left_stopped());
        assert!(outcome.render(None).contains("stopped but could not be started"));

        let stop_failed = Outcome::DispatchFailed {
            action: Action::Restart,
            unit: "plex".into(),
            stage: DispatchStage::Stop,
            reason: "boom".into(),
        };
        assert!(!stop_failed.left_stopped());
        assert_eq!(stop_failed.render(None), "plex could not be restarted");
    }

    #[test]
    fn fixed_messages() {
        assert_eq!(
            Outcome::Unauthorized.render(Some("<@1>")),
            "You are not allowed to use this command"
        );
        assert_eq!(
            Outcome::UnitNotFound { unit: "nope".into() }.render(None),
            "Container with the name ***nope*** doesn't exist"
        );
        assert_eq!(
            Outcome::AlreadyRunning { unit: "plex".into() }.render(None),
            "plex is already running"
        );
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(Outcome::Timeout {
            action: Action::Start,
            unit: "plex".into(),
        })
        .unwrap();
        assert_eq!(json["kind"], "timeout");
        assert_eq!(json["action"], "start");
        assert_eq!(json["unit"], "plex");
    }
}
