//! Deterministic export rendering.
//!
//! Pure read path: both renderers take a [`Snapshot`] and a `generated_at`
//! timestamp and return bytes. Given the same snapshot, output is
//! byte-identical regardless of wall-clock time or process ordering — only
//! the explicit `generated_at` header varies. There is no cached state, so
//! concurrent exports are trivially safe. Writes go through a temp path and
//! a rename, so a reader never observes a partially written file.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::models::{Deliverable, Dependency, Priority, Project, ProjectStatus};

/// One project with its owned sub-entities, as read from a store snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectEntry {
    #[serde(flatten)]
    pub project: Project,
    pub deliverables: Vec<Deliverable>,
    pub dependencies: Vec<Dependency>,
}

/// A consistent point-in-time view of the whole registry, ordered by
/// project id.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub projects: Vec<ProjectEntry>,
}

impl Snapshot {
    /// Restrict the snapshot to projects in the given status.
    pub fn retain_status(mut self, status: ProjectStatus) -> Self {
        self.projects.retain(|e| e.project.status == status);
        self
    }
}

#[derive(Serialize)]
struct JsonExport<'a> {
    projects: &'a [ProjectEntry],
    generated_at: String,
}

pub fn render_json(snapshot: &Snapshot, generated_at: DateTime<Utc>) -> Result<String> {
    let doc = JsonExport {
        projects: &snapshot.projects,
        generated_at: generated_at.to_rfc3339(),
    };
    let mut out = serde_json::to_string_pretty(&doc)?;
    out.push('\n');
    Ok(out)
}

pub fn render_markdown(snapshot: &Snapshot, generated_at: DateTime<Utc>) -> String {
    let mut out = String::new();
    out.push_str("# Project Registry\n\n");
    out.push_str(&format!("Generated: {}\n", generated_at.to_rfc3339()));

    for priority in Priority::ALL {
        let mut tier: Vec<&ProjectEntry> = snapshot
            .projects
            .iter()
            .filter(|e| e.project.priority == priority)
            .collect();
        if tier.is_empty() {
            continue;
        }
        tier.sort_by(|a, b| effort_then_id(&a.project, &b.project));

        out.push_str(&format!("\n## {}\n\n", tier_heading(priority)));
        for entry in tier {
            render_project_block(&mut out, &entry.project);
        }
    }

    out
}

fn tier_heading(priority: Priority) -> &'static str {
    match priority {
        Priority::Critical => "Critical",
        Priority::High => "High",
        Priority::Medium => "Medium",
        Priority::Low => "Low",
    }
}

/// Within a tier: effort descending (absent effort last), then id ascending.
fn effort_then_id(a: &Project, b: &Project) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    let by_effort = match (a.effort_hours, b.effort_hours) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_effort.then_with(|| a.id.cmp(&b.id))
}

fn render_project_block(out: &mut String, project: &Project) {
    out.push_str(&format!(
        "- **{}** — {} [{}]\n",
        project.id,
        project.name,
        project.status.as_str()
    ));

    let mut details = Vec::new();
    if let Some(effort) = project.effort_hours {
        details.push(format!("effort: {}", format_hours(effort)));
    }
    if let Some(impact) = project.impact {
        details.push(format!("impact: {}", impact.as_str()));
    }
    if let Some(category) = &project.category {
        details.push(format!("category: {}", category));
    }
    if !details.is_empty() {
        out.push_str(&format!("  - {}\n", details.join(" · ")));
    }
    if let Some(plan) = &project.plan_path {
        out.push_str(&format!("  - plan: {}\n", plan));
    }
}

pub(crate) fn format_hours(hours: f64) -> String {
    if hours.fract() == 0.0 {
        format!("{:.0}h", hours)
    } else {
        format!("{}h", hours)
    }
}

/// Write contents to a sibling temp path, then rename over the target.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp = tmp_path(path);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "export".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// The pair of export files regenerated after every successful write.
#[derive(Debug, Clone)]
pub struct ExportTargets {
    pub markdown: PathBuf,
    pub json: PathBuf,
}

impl ExportTargets {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            markdown: dir.join("registry.md"),
            json: dir.join("registry.json"),
        }
    }

    pub fn write(&self, snapshot: &Snapshot, generated_at: DateTime<Utc>) -> Result<()> {
        write_atomic(&self.markdown, &render_markdown(snapshot, generated_at))?;
        write_atomic(&self.json, &render_json(snapshot, generated_at)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_hours_trims_whole_numbers() {
        assert_eq!(format_hours(10.0), "10h");
        assert_eq!(format_hours(7.5), "7.5h");
    }

    #[test]
    fn test_tmp_path_stays_in_directory() {
        let tmp = tmp_path(Path::new("/data/exports/registry.md"));
        assert_eq!(tmp, Path::new("/data/exports/registry.md.tmp"));
    }
}
