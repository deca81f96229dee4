//! The registry: the sole mutation surface over the store.
//!
//! Every write funnels through here. The registry validates input before
//! any transaction opens, enforces the project state machine, appends one
//! audit row per changed field, and consults the graph engine before
//! persisting a dependency edge. After each successful write it regenerates
//! the exports; an export failure is reported as a warning, never as a
//! rollback of the already-committed mutation.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{RegistryError, Result};
use crate::export::{ExportTargets, ProjectEntry, Snapshot};
use crate::graph::DependencyGraph;
use crate::models::*;

/// Options carried by the `complete` and `block` transitions.
#[derive(Debug, Clone, Default)]
pub struct TransitionOpts {
    pub actual_hours: Option<f64>,
    pub notes: Option<String>,
    pub reason: Option<String>,
}

pub struct Registry {
    db: Database,
    export: Option<ExportTargets>,
}

impl Registry {
    pub fn new(db: Database) -> Self {
        Self { db, export: None }
    }

    pub fn with_export(db: Database, targets: ExportTargets) -> Self {
        Self {
            db,
            export: Some(targets),
        }
    }

    // ============================================================
    // Reads
    // ============================================================

    pub fn get(&self, id: &str) -> Result<Project> {
        self.db.get_project(id)?.ok_or_else(|| not_found(id))
    }

    pub fn exists(&self, id: &str) -> Result<bool> {
        self.db.project_exists(id)
    }

    pub fn list(&self, filter: &ProjectFilter) -> Result<Vec<Project>> {
        self.db.list_projects(filter)
    }

    pub fn updates(&self, id: &str) -> Result<Vec<ProjectUpdate>> {
        self.db.list_updates(id)
    }

    pub fn deliverables(&self, id: &str) -> Result<Vec<Deliverable>> {
        self.db.list_deliverables(id)
    }

    /// Outgoing edges: what `id` depends on.
    pub fn dependencies(&self, id: &str) -> Result<Vec<Dependency>> {
        self.db.list_dependencies(id)
    }

    /// Incoming edges: who depends on `id`.
    pub fn dependents(&self, id: &str) -> Result<Vec<Dependency>> {
        self.db.list_dependents(id)
    }

    pub fn dependency_graph(&self) -> Result<DependencyGraph> {
        let projects = self.db.list_projects(&ProjectFilter::default())?;
        let edges = self.db.list_all_dependencies()?;
        Ok(DependencyGraph::from_rows(&projects, &edges))
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        let projects = self.db.list_projects(&ProjectFilter::default())?;
        let mut entries = Vec::with_capacity(projects.len());
        for project in projects {
            let deliverables = self.db.list_deliverables(&project.id)?;
            let dependencies = self.db.list_dependencies(&project.id)?;
            entries.push(ProjectEntry {
                project,
                deliverables,
                dependencies,
            });
        }
        Ok(Snapshot { projects: entries })
    }

    // ============================================================
    // Project mutations
    // ============================================================

    pub fn add(&self, input: CreateProjectInput) -> Result<Project> {
        let id = input.id.trim().to_string();
        if id.is_empty() {
            return Err(RegistryError::validation("project id must not be empty"));
        }
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(RegistryError::validation("project name must not be empty"));
        }
        validate_hours("effort_hours", input.effort_hours)?;
        if self.db.project_exists(&id)? {
            return Err(RegistryError::validation(format!(
                "duplicate project id '{}'",
                id
            )));
        }

        let now = Utc::now();
        let status = input.status.unwrap_or(ProjectStatus::Planned);
        let project = Project {
            id: id.clone(),
            name,
            description: input.description,
            notes: input.notes,
            status,
            priority: input.priority.unwrap_or(Priority::Medium),
            category: input.category,
            tags: normalize_tags(input.tags),
            effort_hours: input.effort_hours,
            actual_hours: None,
            impact: input.impact,
            plan_path: input.plan_path,
            external_refs: input.external_refs,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            blocked_from: None,
        };

        let audit = ProjectUpdate::new(
            &id,
            "status",
            None,
            Some(status.as_str().to_string()),
            None,
            now,
        );
        self.db.insert_project(&project, &audit)?;
        self.refresh_exports();
        Ok(project)
    }

    /// Apply a partial field change. One audit row is appended per field
    /// whose value actually changed; a patch that changes nothing is a
    /// successful no-op. `id`, `created_at`, and `status` are not
    /// patchable — status moves through [`Registry::transition`].
    pub fn update(&self, id: &str, patch: ProjectPatch, reason: Option<String>) -> Result<Project> {
        let mut project = self.get(id)?;
        validate_hours("effort_hours", patch.effort_hours)?;

        let now = Utc::now();
        let mut audits = Vec::new();
        let mut record = |field: &str, old: Option<String>, new: Option<String>| {
            audits.push(ProjectUpdate::new(id, field, old, new, reason.clone(), now));
        };

        if let Some(name) = patch.name {
            if name != project.name {
                record("name", Some(project.name.clone()), Some(name.clone()));
                project.name = name;
            }
        }
        if let Some(priority) = patch.priority {
            if priority != project.priority {
                record(
                    "priority",
                    Some(project.priority.as_str().to_string()),
                    Some(priority.as_str().to_string()),
                );
                project.priority = priority;
            }
        }
        if let Some(category) = patch.category {
            if Some(&category) != project.category.as_ref() {
                record("category", project.category.clone(), Some(category.clone()));
                project.category = Some(category);
            }
        }
        if let Some(tags) = patch.tags {
            let tags = normalize_tags(tags);
            if tags != project.tags {
                record(
                    "tags",
                    Some(list_repr(&project.tags)),
                    Some(list_repr(&tags)),
                );
                project.tags = tags;
            }
        }
        if let Some(effort) = patch.effort_hours {
            if Some(effort) != project.effort_hours {
                record(
                    "effort_hours",
                    project.effort_hours.map(|h| h.to_string()),
                    Some(effort.to_string()),
                );
                project.effort_hours = Some(effort);
            }
        }
        if let Some(impact) = patch.impact {
            if Some(impact) != project.impact {
                record(
                    "impact",
                    project.impact.map(|i| i.as_str().to_string()),
                    Some(impact.as_str().to_string()),
                );
                project.impact = Some(impact);
            }
        }
        if let Some(plan_path) = patch.plan_path {
            if Some(&plan_path) != project.plan_path.as_ref() {
                record("plan_path", project.plan_path.clone(), Some(plan_path.clone()));
                project.plan_path = Some(plan_path);
            }
        }
        if let Some(refs) = patch.external_refs {
            if refs != project.external_refs {
                record(
                    "external_refs",
                    Some(list_repr(&project.external_refs)),
                    Some(list_repr(&refs)),
                );
                project.external_refs = refs;
            }
        }
        if let Some(description) = patch.description {
            if Some(&description) != project.description.as_ref() {
                record(
                    "description",
                    project.description.clone(),
                    Some(description.clone()),
                );
                project.description = Some(description);
            }
        }
        if let Some(notes) = patch.notes {
            if Some(&notes) != project.notes.as_ref() {
                record("notes", project.notes.clone(), Some(notes.clone()));
                project.notes = Some(notes);
            }
        }

        if audits.is_empty() {
            return Ok(project);
        }

        project.updated_at = monotonic(now, project.updated_at);
        self.db.save_project(&project, &audits)?;
        self.refresh_exports();
        Ok(project)
    }

    // ============================================================
    // State machine
    // ============================================================

    pub fn transition(&self, id: &str, action: TransitionAction) -> Result<Project> {
        self.transition_with(id, action, TransitionOpts::default())
    }

    pub fn start(&self, id: &str) -> Result<Project> {
        self.transition(id, TransitionAction::Start)
    }

    pub fn complete(
        &self,
        id: &str,
        actual_hours: Option<f64>,
        notes: Option<String>,
    ) -> Result<Project> {
        self.transition_with(
            id,
            TransitionAction::Complete,
            TransitionOpts {
                actual_hours,
                notes,
                reason: None,
            },
        )
    }

    pub fn block(&self, id: &str, reason: Option<String>) -> Result<Project> {
        self.transition_with(
            id,
            TransitionAction::Block,
            TransitionOpts {
                reason,
                ..TransitionOpts::default()
            },
        )
    }

    pub fn unblock(&self, id: &str) -> Result<Project> {
        self.transition(id, TransitionAction::Unblock)
    }

    pub fn archive(&self, id: &str) -> Result<Project> {
        self.transition(id, TransitionAction::Archive)
    }

    pub fn transition_with(
        &self,
        id: &str,
        action: TransitionAction,
        opts: TransitionOpts,
    ) -> Result<Project> {
        let mut project = self.get(id)?;
        validate_hours("actual_hours", opts.actual_hours)?;

        let current = project.status;
        let target = match (current, action) {
            (ProjectStatus::Planned, TransitionAction::Start) => ProjectStatus::Active,
            (ProjectStatus::Planned | ProjectStatus::Active, TransitionAction::Complete) => {
                ProjectStatus::Completed
            }
            (ProjectStatus::Planned | ProjectStatus::Active, TransitionAction::Block) => {
                ProjectStatus::Blocked
            }
            (ProjectStatus::Blocked, TransitionAction::Unblock) => {
                project.blocked_from.unwrap_or(ProjectStatus::Planned)
            }
            (status, TransitionAction::Archive) if status != ProjectStatus::Archived => {
                ProjectStatus::Archived
            }
            _ => {
                return Err(RegistryError::State {
                    id: id.to_string(),
                    current: current.as_str().to_string(),
                    requested: action.as_str().to_string(),
                })
            }
        };

        let now = Utc::now();
        let mut audits = vec![ProjectUpdate::new(
            id,
            "status",
            Some(current.as_str().to_string()),
            Some(target.as_str().to_string()),
            opts.reason.clone(),
            now,
        )];

        match action {
            TransitionAction::Start => {
                // started_at is write-once
                if project.started_at.is_some() {
                    return Err(RegistryError::State {
                        id: id.to_string(),
                        current: current.as_str().to_string(),
                        requested: action.as_str().to_string(),
                    });
                }
                project.started_at = Some(now);
                audits.push(ProjectUpdate::new(
                    id,
                    "started_at",
                    None,
                    Some(now.to_rfc3339()),
                    opts.reason.clone(),
                    now,
                ));
            }
            TransitionAction::Complete => {
                project.completed_at = Some(now);
                audits.push(ProjectUpdate::new(
                    id,
                    "completed_at",
                    None,
                    Some(now.to_rfc3339()),
                    opts.reason.clone(),
                    now,
                ));
                if let Some(hours) = opts.actual_hours {
                    audits.push(ProjectUpdate::new(
                        id,
                        "actual_hours",
                        project.actual_hours.map(|h| h.to_string()),
                        Some(hours.to_string()),
                        opts.reason.clone(),
                        now,
                    ));
                    project.actual_hours = Some(hours);
                }
                if let Some(notes) = opts.notes {
                    if Some(&notes) != project.notes.as_ref() {
                        audits.push(ProjectUpdate::new(
                            id,
                            "notes",
                            project.notes.clone(),
                            Some(notes.clone()),
                            opts.reason.clone(),
                            now,
                        ));
                        project.notes = Some(notes);
                    }
                }
            }
            TransitionAction::Block => {
                project.blocked_from = Some(current);
            }
            TransitionAction::Unblock => {
                project.blocked_from = None;
            }
            TransitionAction::Archive => {}
        }

        project.status = target;
        project.updated_at = monotonic(now, project.updated_at);
        self.db.save_project(&project, &audits)?;
        self.refresh_exports();
        Ok(project)
    }

    // ============================================================
    // Deliverables
    // ============================================================

    pub fn add_deliverable(
        &self,
        project_id: &str,
        input: CreateDeliverableInput,
    ) -> Result<Deliverable> {
        if !self.db.project_exists(project_id)? {
            return Err(RegistryError::integrity(format!(
                "project '{}' does not exist",
                project_id
            )));
        }
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(RegistryError::validation("deliverable name must not be empty"));
        }
        if self.db.find_deliverable(project_id, &name)?.is_some() {
            return Err(RegistryError::validation(format!(
                "duplicate deliverable '{}' on project '{}'",
                name, project_id
            )));
        }

        let now = Utc::now();
        let status = input.status.unwrap_or(DeliverableStatus::Planned);
        let deliverable = Deliverable {
            id: Uuid::new_v4(),
            project_id: project_id.to_string(),
            name: name.clone(),
            kind: input.kind,
            status,
            file_path: input.file_path,
            created_at: now,
            completed_at: (status == DeliverableStatus::Completed).then_some(now),
        };

        let audit = ProjectUpdate::new(
            project_id,
            format!("deliverable.{}.status", name),
            None,
            Some(status.as_str().to_string()),
            None,
            now,
        );
        self.db.insert_deliverable(&deliverable, &audit)?;
        self.refresh_exports();
        Ok(deliverable)
    }

    pub fn update_deliverable(
        &self,
        project_id: &str,
        name: &str,
        input: UpdateDeliverableInput,
    ) -> Result<Deliverable> {
        let mut deliverable = self.db.find_deliverable(project_id, name)?.ok_or_else(|| {
            RegistryError::validation(format!(
                "no deliverable '{}' on project '{}'",
                name, project_id
            ))
        })?;

        let now = Utc::now();
        let prefix = format!("deliverable.{}", deliverable.name);
        let mut audits = Vec::new();
        let mut record = |field: String, old: Option<String>, new: Option<String>| {
            audits.push(ProjectUpdate::new(project_id, field, old, new, None, now));
        };

        if let Some(new_name) = input.name {
            if new_name != deliverable.name {
                record(
                    format!("{}.name", prefix),
                    Some(deliverable.name.clone()),
                    Some(new_name.clone()),
                );
                deliverable.name = new_name;
            }
        }
        if let Some(kind) = input.kind {
            if kind != deliverable.kind {
                record(
                    format!("{}.kind", prefix),
                    Some(deliverable.kind.as_str().to_string()),
                    Some(kind.as_str().to_string()),
                );
                deliverable.kind = kind;
            }
        }
        if let Some(status) = input.status {
            if status != deliverable.status {
                record(
                    format!("{}.status", prefix),
                    Some(deliverable.status.as_str().to_string()),
                    Some(status.as_str().to_string()),
                );
                deliverable.status = status;
                if status == DeliverableStatus::Completed && deliverable.completed_at.is_none() {
                    deliverable.completed_at = Some(now);
                }
            }
        }
        if let Some(file_path) = input.file_path {
            if Some(&file_path) != deliverable.file_path.as_ref() {
                record(
                    format!("{}.file_path", prefix),
                    deliverable.file_path.clone(),
                    Some(file_path.clone()),
                );
                deliverable.file_path = Some(file_path);
            }
        }

        if audits.is_empty() {
            return Ok(deliverable);
        }

        self.db.save_deliverable(&deliverable, &audits)?;
        self.refresh_exports();
        Ok(deliverable)
    }

    // ============================================================
    // Dependencies
    // ============================================================

    /// Add the edge `project_id depends on depends_on_id`. The prospective
    /// edge set (existing edges plus this one) is probed for cycles before
    /// anything is persisted; a rejection names the full cycle path.
    pub fn add_dependency(
        &self,
        project_id: &str,
        depends_on_id: &str,
        kind: DependencyKind,
    ) -> Result<Dependency> {
        if project_id == depends_on_id {
            return Err(RegistryError::validation(format!(
                "project '{}' cannot depend on itself",
                project_id
            )));
        }
        for id in [project_id, depends_on_id] {
            if !self.db.project_exists(id)? {
                return Err(RegistryError::integrity(format!(
                    "project '{}' does not exist",
                    id
                )));
            }
        }
        let existing = self.db.list_dependencies(project_id)?;
        if existing.iter().any(|d| d.depends_on_id == depends_on_id) {
            return Err(RegistryError::validation(format!(
                "dependency {} -> {} already exists",
                project_id, depends_on_id
            )));
        }

        let graph = self.dependency_graph()?;
        if let Some(cycle) = graph.cycle_with_edge(project_id, depends_on_id) {
            return Err(RegistryError::integrity(format!(
                "cycle detected: {}",
                cycle.join(" -> ")
            )));
        }

        let dependency = Dependency {
            project_id: project_id.to_string(),
            depends_on_id: depends_on_id.to_string(),
            kind,
            created_at: Utc::now(),
        };
        self.db.insert_dependency(&dependency)?;
        self.refresh_exports();
        Ok(dependency)
    }

    pub fn remove_dependency(&self, project_id: &str, depends_on_id: &str) -> Result<()> {
        if !self.db.delete_dependency(project_id, depends_on_id)? {
            return Err(RegistryError::validation(format!(
                "no dependency {} -> {}",
                project_id, depends_on_id
            )));
        }
        self.refresh_exports();
        Ok(())
    }

    // ============================================================
    // Removal
    // ============================================================

    /// Remove a project. Fails while other projects depend on it unless
    /// `cascade` is set, in which case the incoming edges go with it. All
    /// dependency kinds block deletion. Either way the project's own
    /// edges, deliverables, and audit rows are deleted in one transaction.
    pub fn remove(&self, id: &str, cascade: bool) -> Result<()> {
        if !self.db.project_exists(id)? {
            return Err(not_found(id));
        }
        let dependents = self.db.list_dependents(id)?;
        if !cascade && !dependents.is_empty() {
            let who: Vec<&str> = dependents.iter().map(|d| d.project_id.as_str()).collect();
            return Err(RegistryError::integrity(format!(
                "cannot remove '{}': depended on by {}",
                id,
                who.join(", ")
            )));
        }
        self.db.delete_project(id)?;
        self.refresh_exports();
        Ok(())
    }

    // ============================================================
    // Exports
    // ============================================================

    /// Regenerate the export files after a committed write. Failure here is
    /// a warning: the mutation has already committed and the exports can be
    /// regenerated from the store at any time.
    fn refresh_exports(&self) {
        let Some(targets) = &self.export else {
            return;
        };
        let result = self
            .snapshot()
            .and_then(|snapshot| targets.write(&snapshot, Utc::now()));
        if let Err(err) = result {
            tracing::warn!("export regeneration failed: {}", err);
        }
    }
}

fn not_found(id: &str) -> RegistryError {
    RegistryError::validation(format!("no project with id '{}'", id))
}

fn validate_hours(field: &str, hours: Option<f64>) -> Result<()> {
    if let Some(h) = hours {
        if !h.is_finite() || h < 0.0 {
            return Err(RegistryError::validation(format!(
                "{} must be a non-negative number",
                field
            )));
        }
    }
    Ok(())
}

/// `updated_at` never moves backwards, even across clock adjustments.
fn monotonic(now: DateTime<Utc>, previous: DateTime<Utc>) -> DateTime<Utc> {
    now.max(previous)
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut tags: Vec<String> = tags
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

fn list_repr(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_default()
}
