use serde::{Deserialize, Serialize};
use std::fmt;

/// Chat-platform user id (a 64-bit snowflake).
pub type ActorId = u64;

/// Chat-platform role id. Roles are the groups an actor belongs to.
pub type RoleId = u64;

/// Section assigned to units that carry no `section` label.
pub const UNCATEGORIZED: &str = "Uncategorized";

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Start,
    Stop,
    Restart,
}

impl Action {
    pub fn all() -> &'static [Action] {
        &[Action::Start, Action::Stop, Action::Restart]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Restart => "restart",
        }
    }

    /// Past participle used in user-facing messages ("has been started").
    pub fn past_tense(self) -> &'static str {
        match self {
            Action::Start => "started",
            Action::Stop => "stopped",
            Action::Restart => "restarted",
        }
    }

    /// Whether a confirmed action leaves the unit running.
    pub fn expects_running(self) -> bool {
        match self {
            Action::Start | Action::Restart => true,
            Action::Stop => false,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Action::Start),
            "stop" => Ok(Action::Stop),
            "restart" => Ok(Action::Restart),
            _ => Err(crate::error::CoreError::InvalidAction(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit
// ---------------------------------------------------------------------------

/// One managed container as seen in the last registry snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Runtime-assigned id, stable for the container's lifetime.
    pub id: String,
    /// Display name with the runtime's `/` prefix stripped.
    pub name: String,
    pub running: bool,
    pub section: String,
    /// Raw runtime status text, e.g. "Up 3 hours" or "Exited (0) 2 days ago".
    pub status: String,
}

/// What the permission resolver needs to know about a unit: its name and,
/// when the registry knows it, its current section label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitTarget<'a> {
    pub name: &'a str,
    pub section: Option<&'a str>,
}

impl<'a> UnitTarget<'a> {
    pub fn named(name: &'a str) -> Self {
        Self {
            name,
            section: None,
        }
    }
}

impl<'a> From<&'a Unit> for UnitTarget<'a> {
    fn from(unit: &'a Unit) -> Self {
        Self {
            name: &unit.name,
            section: Some(&unit.section),
        }
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A single lifecycle request, consumed once by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub actor: ActorId,
    #[serde(default)]
    pub groups: Vec<RoleId>,
    pub action: Action,
    pub unit: String,
    /// How to address the actor in the terminal message, e.g. `<@1234>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mention: Option<String>,
}

impl Request {
    pub fn new(actor: ActorId, action: Action, unit: impl Into<String>) -> Self {
        Self {
            actor,
            groups: Vec::new(),
            action,
            unit: unit.into(),
            mention: None,
        }
    }

    pub fn with_groups(mut self, groups: impl IntoIterator<Item = RoleId>) -> Self {
        self.groups = groups.into_iter().collect();
        self
    }

    pub fn with_mention(mut self, mention: impl Into<String>) -> Self {
        self.mention = Some(mention.into());
        self
    }
}
