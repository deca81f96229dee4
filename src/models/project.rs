use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tracked unit of work.
///
/// Projects are the registry's core entity. Each one carries classification
/// (status, priority, category, tags), estimation figures, lifecycle
/// timestamps, and free-text context. The `id` is a stable external key
/// chosen by the operator — unlike surrogate keys it never changes once the
/// project exists, so it is safe to reference from plans, exports, and other
/// projects' dependency edges.
///
/// # Lifecycle
/// Projects move through states via explicit transitions only:
/// planned → active → completed, with a blocked detour from planned or
/// active, and a terminal archived state reachable from anywhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub status: ProjectStatus,
    pub priority: Priority,
    pub category: Option<String>,
    /// Set semantics: stored deduplicated and sorted.
    pub tags: Vec<String>,
    pub effort_hours: Option<f64>,
    /// Recorded at completion, for estimate variance.
    pub actual_hours: Option<f64>,
    pub impact: Option<Impact>,
    /// Pointer to an external planning document. Existence is not enforced.
    pub plan_path: Option<String>,
    pub external_refs: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set exactly once, on the transition into `active`.
    pub started_at: Option<DateTime<Utc>>,
    /// Set exactly once, on the transition into `completed`.
    pub completed_at: Option<DateTime<Utc>>,
    /// Status held when the project was blocked, restored by `unblock`.
    /// Internal bookkeeping; not part of the export surface.
    #[serde(skip)]
    pub blocked_from: Option<ProjectStatus>,
}

/// The lifecycle state of a project.
///
/// - `Planned`: Accepted into the registry, not yet started
/// - `Active`: Work in progress
/// - `Blocked`: Paused on an external obstacle; unblocking restores the prior state
/// - `Completed`: Work finished
/// - `Archived`: Terminal; no further transitions are accepted
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Planned,
    Active,
    Blocked,
    Completed,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Active => "active",
            Self::Blocked => "blocked",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "planned" => Some(Self::Planned),
            "active" => Some(Self::Active),
            "blocked" => Some(Self::Blocked),
            "completed" => Some(Self::Completed),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// Scheduling priority. `rank` orders tiers for display and topological
/// tie-breaking: critical sorts first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "critical" => Some(Self::Critical),
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }

    pub const ALL: [Priority; 4] = [Self::Critical, Self::High, Self::Medium, Self::Low];
}

/// Expected impact of a project, independent of its scheduling priority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    High,
    Medium,
    Low,
}

impl Impact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

/// A state-machine action applied through `Registry::transition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionAction {
    Start,
    Complete,
    Block,
    Unblock,
    Archive,
}

impl TransitionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Block => "block",
            Self::Unblock => "unblock",
            Self::Archive => "archive",
        }
    }
}

/// Input for registering a new project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateProjectInput {
    /// Stable external key. Immutable once created.
    pub id: String,
    pub name: String,
    /// Initial state. Defaults to `Planned` if not specified.
    pub status: Option<ProjectStatus>,
    /// Defaults to `Medium` if not specified.
    pub priority: Option<Priority>,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub effort_hours: Option<f64>,
    pub impact: Option<Impact>,
    pub plan_path: Option<String>,
    #[serde(default)]
    pub external_refs: Vec<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
}

/// Partial update for an existing project. `None` leaves a field unchanged.
///
/// `id` and `created_at` are immutable, and `status` only moves through
/// `Registry::transition`, so none of them appear here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub priority: Option<Priority>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub effort_hours: Option<f64>,
    pub impact: Option<Impact>,
    pub plan_path: Option<String>,
    pub external_refs: Option<Vec<String>>,
    pub description: Option<String>,
    pub notes: Option<String>,
}

/// Filters for project listings. All fields are optional and combine with AND.
#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
    pub priority: Option<Priority>,
    pub category: Option<String>,
}
