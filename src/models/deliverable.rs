use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A concrete output owned by exactly one project.
///
/// Deliverables track what a project actually produces — a tool, an agent,
/// documentation — with their own lightweight status. They are deleted with
/// their owning project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deliverable {
    pub id: Uuid,
    pub project_id: String,
    pub name: String,
    pub kind: DeliverableKind,
    pub status: DeliverableStatus,
    /// Where the deliverable lives on disk, once it exists.
    pub file_path: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set when the deliverable reaches `Completed`.
    pub completed_at: Option<DateTime<Utc>>,
}

/// What kind of artifact a deliverable is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliverableKind {
    Tool,
    Agent,
    Documentation,
    Infrastructure,
    Database,
    Workflow,
}

impl DeliverableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Agent => "agent",
            Self::Documentation => "documentation",
            Self::Infrastructure => "infrastructure",
            Self::Database => "database",
            Self::Workflow => "workflow",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "tool" => Some(Self::Tool),
            "agent" => Some(Self::Agent),
            "documentation" => Some(Self::Documentation),
            "infrastructure" => Some(Self::Infrastructure),
            "database" => Some(Self::Database),
            "workflow" => Some(Self::Workflow),
            _ => None,
        }
    }
}

/// Progress state of a deliverable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliverableStatus {
    Planned,
    InProgress,
    Completed,
}

impl DeliverableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "planned" => Some(Self::Planned),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Input for adding a deliverable to a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDeliverableInput {
    pub name: String,
    pub kind: DeliverableKind,
    /// Initial status. Defaults to `Planned` if not specified.
    pub status: Option<DeliverableStatus>,
    pub file_path: Option<String>,
}

/// Partial update for a deliverable. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateDeliverableInput {
    pub name: Option<String>,
    pub kind: Option<DeliverableKind>,
    pub status: Option<DeliverableStatus>,
    pub file_path: Option<String>,
}
