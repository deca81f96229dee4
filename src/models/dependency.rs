use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A directed edge between two projects: `project_id` depends on
/// `depends_on_id`.
///
/// At most one edge exists per ordered pair, self-edges are rejected, and
/// the edge set as a whole must stay acyclic — the registry refuses any
/// insert that would close a cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    pub project_id: String,
    pub depends_on_id: String,
    pub kind: DependencyKind,
    pub created_at: DateTime<Utc>,
}

/// How strongly a dependency binds.
///
/// - `Blocks`: the dependent cannot proceed until the prerequisite is done
/// - `Optional`: nice to have first, not required
/// - `Enhances`: the prerequisite improves the dependent's outcome
///
/// All kinds participate in cycle detection and block deletion of the
/// prerequisite.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Blocks,
    Optional,
    Enhances,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blocks => "blocks",
            Self::Optional => "optional",
            Self::Enhances => "enhances",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "blocks" => Some(Self::Blocks),
            "optional" => Some(Self::Optional),
            "enhances" => Some(Self::Enhances),
            _ => None,
        }
    }
}
