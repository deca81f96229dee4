use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An append-only audit record for a single field change.
///
/// The audit trail is like `git log` for a project — every successful
/// mutation appends one row per field that actually changed, so "what
/// happened to this project and when?" is always answerable. Rows are never
/// mutated or deleted while their project exists; they cascade away only
/// when the project itself is removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectUpdate {
    pub id: Uuid,
    pub project_id: String,
    /// Name of the changed field, e.g. `status` or `effort_hours`.
    /// Deliverable changes use a `deliverable.<name>.<field>` form.
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    /// Operator-supplied justification, if any.
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ProjectUpdate {
    pub fn new(
        project_id: &str,
        field: impl Into<String>,
        old_value: Option<String>,
        new_value: Option<String>,
        reason: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id: project_id.to_string(),
            field: field.into(),
            old_value,
            new_value,
            reason,
            created_at,
        }
    }
}
