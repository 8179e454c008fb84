//! Wire shapes of the two Docker front ends.

use std::collections::HashMap;

use dockhand_core::registry::SECTION_LABEL;
use dockhand_core::runtime::RuntimeUnit;
use serde::Deserialize;

/// `docker ps` template. Only the section label is extracted: the full
/// `Labels` column joins pairs with commas that label values may contain.
pub const PS_FORMAT: &str = r#"{"ID":{{json .ID}},"Names":{{json .Names}},"Status":{{json .Status}},"Section":{{json (.Label "section")}}}"#;

/// One line of `docker ps --format PS_FORMAT`.
#[derive(Debug, Deserialize)]
pub struct PsLine {
    #[serde(rename = "ID")]
    pub id: String,
    /// Comma-separated, without the leading `/`.
    #[serde(rename = "Names")]
    pub names: String,
    #[serde(rename = "Status")]
    pub status: String,
    /// Empty when the container has no section label.
    #[serde(rename = "Section", default)]
    pub section: String,
}

impl From<PsLine> for RuntimeUnit {
    fn from(line: PsLine) -> Self {
        let mut labels = HashMap::new();
        if !line.section.is_empty() {
            labels.insert(SECTION_LABEL.to_string(), line.section);
        }
        RuntimeUnit {
            id: line.id,
            names: line
                .names
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect(),
            status: line.status,
            labels,
        }
    }
}

/// An entry of `GET /containers/json`.
#[derive(Debug, Deserialize)]
pub struct ApiContainer {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Names", default)]
    pub names: Vec<String>,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "Labels", default)]
    pub labels: Option<HashMap<String, String>>,
}

impl From<ApiContainer> for RuntimeUnit {
    fn from(c: ApiContainer) -> Self {
        RuntimeUnit {
            id: c.id,
            names: c.names,
            status: c.status,
            labels: c.labels.unwrap_or_default(),
        }
    }
}

/// Engine API error body.
#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub message: String,
}
