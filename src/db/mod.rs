mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::error::{RegistryError, Result};
use crate::models::*;

/// Writers that cannot acquire the write lock within this window fail with a
/// retryable "store busy" error instead of hanging.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const PROJECT_COLUMNS: &str = "id, name, description, notes, status, priority, category, tags, \
     effort_hours, actual_hours, impact, plan_path, external_refs, \
     created_at, updated_at, started_at, completed_at, blocked_from";

const DELIVERABLE_COLUMNS: &str =
    "id, project_id, name, kind, status, file_path, created_at, completed_at";

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| RegistryError::store("store path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        configure(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "preg")
            .ok_or_else(|| RegistryError::store("could not determine data directory"))?;
        let db_path = dirs.data_dir().join("registry.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        configure(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Project operations
    // ============================================================

    pub fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?"
        ))?;

        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => Ok(Some(map_project(row)?)),
            None => Ok(None),
        }
    }

    pub fn project_exists(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let count: i32 = conn.query_row(
            "SELECT COUNT(*) FROM projects WHERE id = ?",
            [id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>> {
        let conn = self.conn.lock().expect("database lock poisoned");

        let mut clauses = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            clauses.push("status = ?");
            params.push(Box::new(status.as_str().to_string()));
        }
        if let Some(priority) = filter.priority {
            clauses.push("priority = ?");
            params.push(Box::new(priority.as_str().to_string()));
        }
        if let Some(category) = &filter.category {
            clauses.push("category = ?");
            params.push(Box::new(category.clone()));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects{where_clause} ORDER BY id");

        let mut stmt = conn.prepare(&sql)?;
        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let projects = stmt
            .query_map(params_ref.as_slice(), |row| map_project(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(projects)
    }

    /// Insert a new project row together with its creation audit record,
    /// as one transaction.
    pub fn insert_project(&self, project: &Project, audit: &ProjectUpdate) -> Result<()> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;

        tx.execute(
            &format!(
                "INSERT INTO projects ({PROJECT_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                &project.id,
                &project.name,
                &project.description,
                &project.notes,
                project.status.as_str(),
                project.priority.as_str(),
                &project.category,
                serde_json::to_string(&project.tags)?,
                project.effort_hours,
                project.actual_hours,
                project.impact.map(|i| i.as_str()),
                &project.plan_path,
                serde_json::to_string(&project.external_refs)?,
                project.created_at.to_rfc3339(),
                project.updated_at.to_rfc3339(),
                project.started_at.map(|t| t.to_rfc3339()),
                project.completed_at.map(|t| t.to_rfc3339()),
                project.blocked_from.map(|s| s.as_str()),
            ],
        )?;
        insert_update_row(&tx, audit)?;

        tx.commit()?;
        Ok(())
    }

    /// Persist modified project fields and append the audit rows describing
    /// them, as one transaction.
    pub fn save_project(&self, project: &Project, audits: &[ProjectUpdate]) -> Result<()> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE projects SET name = ?, description = ?, notes = ?, status = ?,
                 priority = ?, category = ?, tags = ?, effort_hours = ?, actual_hours = ?,
                 impact = ?, plan_path = ?, external_refs = ?, updated_at = ?,
                 started_at = ?, completed_at = ?, blocked_from = ?
             WHERE id = ?",
            params![
                &project.name,
                &project.description,
                &project.notes,
                project.status.as_str(),
                project.priority.as_str(),
                &project.category,
                serde_json::to_string(&project.tags)?,
                project.effort_hours,
                project.actual_hours,
                project.impact.map(|i| i.as_str()),
                &project.plan_path,
                serde_json::to_string(&project.external_refs)?,
                project.updated_at.to_rfc3339(),
                project.started_at.map(|t| t.to_rfc3339()),
                project.completed_at.map(|t| t.to_rfc3339()),
                project.blocked_from.map(|s| s.as_str()),
                &project.id,
            ],
        )?;
        for audit in audits {
            insert_update_row(&tx, audit)?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Delete a project and everything that references it — incident
    /// dependency edges, deliverables, audit rows — as one transaction.
    ///
    /// Callers enforce the incoming-edge policy before reaching this point.
    pub fn delete_project(&self, id: &str) -> Result<bool> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM dependencies WHERE project_id = ? OR depends_on_id = ?",
            params![id, id],
        )?;
        tx.execute("DELETE FROM deliverables WHERE project_id = ?", [id])?;
        tx.execute("DELETE FROM project_updates WHERE project_id = ?", [id])?;
        let rows = tx.execute("DELETE FROM projects WHERE id = ?", [id])?;

        tx.commit()?;
        Ok(rows > 0)
    }

    // ============================================================
    // Audit trail operations
    // ============================================================

    pub fn list_updates(&self, project_id: &str) -> Result<Vec<ProjectUpdate>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, project_id, field, old_value, new_value, reason, created_at
             FROM project_updates WHERE project_id = ? ORDER BY created_at, id",
        )?;

        let updates = stmt
            .query_map([project_id], |row| {
                Ok(ProjectUpdate {
                    id: parse_uuid(row.get::<_, String>(0)?),
                    project_id: row.get(1)?,
                    field: row.get(2)?,
                    old_value: row.get(3)?,
                    new_value: row.get(4)?,
                    reason: row.get(5)?,
                    created_at: parse_datetime(row.get::<_, String>(6)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(updates)
    }

    // ============================================================
    // Deliverable operations
    // ============================================================

    pub fn list_deliverables(&self, project_id: &str) -> Result<Vec<Deliverable>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {DELIVERABLE_COLUMNS} FROM deliverables
             WHERE project_id = ? ORDER BY name, id"
        ))?;

        let deliverables = stmt
            .query_map([project_id], |row| map_deliverable(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(deliverables)
    }

    pub fn find_deliverable(&self, project_id: &str, name: &str) -> Result<Option<Deliverable>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {DELIVERABLE_COLUMNS} FROM deliverables
             WHERE project_id = ? AND name = ?"
        ))?;

        let mut rows = stmt.query(params![project_id, name])?;
        match rows.next()? {
            Some(row) => Ok(Some(map_deliverable(row)?)),
            None => Ok(None),
        }
    }

    pub fn insert_deliverable(&self, deliverable: &Deliverable, audit: &ProjectUpdate) -> Result<()> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;

        tx.execute(
            &format!(
                "INSERT INTO deliverables ({DELIVERABLE_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                deliverable.id.to_string(),
                &deliverable.project_id,
                &deliverable.name,
                deliverable.kind.as_str(),
                deliverable.status.as_str(),
                &deliverable.file_path,
                deliverable.created_at.to_rfc3339(),
                deliverable.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        insert_update_row(&tx, audit)?;

        tx.commit()?;
        Ok(())
    }

    pub fn save_deliverable(
        &self,
        deliverable: &Deliverable,
        audits: &[ProjectUpdate],
    ) -> Result<()> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE deliverables SET name = ?, kind = ?, status = ?, file_path = ?, completed_at = ?
             WHERE id = ?",
            params![
                &deliverable.name,
                deliverable.kind.as_str(),
                deliverable.status.as_str(),
                &deliverable.file_path,
                deliverable.completed_at.map(|t| t.to_rfc3339()),
                deliverable.id.to_string(),
            ],
        )?;
        for audit in audits {
            insert_update_row(&tx, audit)?;
        }

        tx.commit()?;
        Ok(())
    }

    // ============================================================
    // Dependency operations
    // ============================================================

    pub fn insert_dependency(&self, dependency: &Dependency) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "INSERT INTO dependencies (project_id, depends_on_id, kind, created_at)
             VALUES (?, ?, ?, ?)",
            params![
                &dependency.project_id,
                &dependency.depends_on_id,
                dependency.kind.as_str(),
                dependency.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn delete_dependency(&self, project_id: &str, depends_on_id: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "DELETE FROM dependencies WHERE project_id = ? AND depends_on_id = ?",
            params![project_id, depends_on_id],
        )?;
        Ok(rows > 0)
    }

    /// Outgoing edges: what `project_id` depends on.
    pub fn list_dependencies(&self, project_id: &str) -> Result<Vec<Dependency>> {
        self.query_dependencies("project_id", project_id)
    }

    /// Incoming edges: who depends on `depends_on_id`.
    pub fn list_dependents(&self, depends_on_id: &str) -> Result<Vec<Dependency>> {
        self.query_dependencies("depends_on_id", depends_on_id)
    }

    fn query_dependencies(&self, column: &str, id: &str) -> Result<Vec<Dependency>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT project_id, depends_on_id, kind, created_at FROM dependencies
             WHERE {column} = ? ORDER BY project_id, depends_on_id"
        ))?;

        let deps = stmt
            .query_map([id], |row| map_dependency(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(deps)
    }

    pub fn list_all_dependencies(&self) -> Result<Vec<Dependency>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT project_id, depends_on_id, kind, created_at FROM dependencies
             ORDER BY project_id, depends_on_id",
        )?;

        let deps = stmt
            .query_map([], |row| map_dependency(row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(deps)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

fn configure(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}

fn insert_update_row(conn: &Connection, update: &ProjectUpdate) -> Result<()> {
    conn.execute(
        "INSERT INTO project_updates (id, project_id, field, old_value, new_value, reason, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
            update.id.to_string(),
            &update.project_id,
            &update.field,
            &update.old_value,
            &update.new_value,
            &update.reason,
            update.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn map_project(row: &Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        notes: row.get(3)?,
        status: ProjectStatus::from_str(&row.get::<_, String>(4)?)
            .unwrap_or(ProjectStatus::Planned),
        priority: Priority::from_str(&row.get::<_, String>(5)?).unwrap_or(Priority::Medium),
        category: row.get(6)?,
        tags: parse_json_list(row.get::<_, String>(7)?),
        effort_hours: row.get(8)?,
        actual_hours: row.get(9)?,
        impact: row
            .get::<_, Option<String>>(10)?
            .as_deref()
            .and_then(Impact::from_str),
        plan_path: row.get(11)?,
        external_refs: parse_json_list(row.get::<_, String>(12)?),
        created_at: parse_datetime(row.get::<_, String>(13)?),
        updated_at: parse_datetime(row.get::<_, String>(14)?),
        started_at: row.get::<_, Option<String>>(15)?.map(parse_datetime),
        completed_at: row.get::<_, Option<String>>(16)?.map(parse_datetime),
        blocked_from: row
            .get::<_, Option<String>>(17)?
            .as_deref()
            .and_then(ProjectStatus::from_str),
    })
}

fn map_deliverable(row: &Row) -> rusqlite::Result<Deliverable> {
    Ok(Deliverable {
        id: parse_uuid(row.get::<_, String>(0)?),
        project_id: row.get(1)?,
        name: row.get(2)?,
        kind: DeliverableKind::from_str(&row.get::<_, String>(3)?)
            .unwrap_or(DeliverableKind::Tool),
        status: DeliverableStatus::from_str(&row.get::<_, String>(4)?)
            .unwrap_or(DeliverableStatus::Planned),
        file_path: row.get(5)?,
        created_at: parse_datetime(row.get::<_, String>(6)?),
        completed_at: row.get::<_, Option<String>>(7)?.map(parse_datetime),
    })
}

fn map_dependency(row: &Row) -> rusqlite::Result<Dependency> {
    Ok(Dependency {
        project_id: row.get(0)?,
        depends_on_id: row.get(1)?,
        kind: DependencyKind::from_str(&row.get::<_, String>(2)?)
            .unwrap_or(DependencyKind::Blocks),
        created_at: parse_datetime(row.get::<_, String>(3)?),
    })
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now())
}

fn parse_json_list(s: String) -> Vec<String> {
    serde_json::from_str(&s).unwrap_or_default()
}
