//! Terminal rendering for registry listings.

use std::collections::HashMap;

use crate::export::format_hours;
use crate::models::{Deliverable, Dependency, Priority, Project, ProjectStatus, ProjectUpdate};

const PLANNED: char = '◇';
const ACTIVE: char = '○';
const BLOCKED: char = '⊘';
const COMPLETED: char = '●';
const ARCHIVED: char = '✗';

/// Get the status symbol for a project state.
pub fn status_symbol(status: ProjectStatus) -> char {
    match status {
        ProjectStatus::Planned => PLANNED,
        ProjectStatus::Active => ACTIVE,
        ProjectStatus::Blocked => BLOCKED,
        ProjectStatus::Completed => COMPLETED,
        ProjectStatus::Archived => ARCHIVED,
    }
}

pub fn project_line(project: &Project) -> String {
    format!(
        "{} {:<24} {:<10} {:<9} {}",
        status_symbol(project.status),
        project.id,
        project.status.as_str(),
        project.priority.as_str(),
        project.name
    )
}

pub fn render_list(projects: &[Project]) -> String {
    if projects.is_empty() {
        return "(no projects)\n".to_string();
    }
    let mut out = String::new();
    for project in projects {
        out.push_str(&project_line(project));
        out.push('\n');
    }
    out
}

pub fn render_show(
    project: &Project,
    deliverables: &[Deliverable],
    depends_on: &[Dependency],
    dependents: &[Dependency],
    updates: &[ProjectUpdate],
) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} — {}\n", project.id, project.name));
    out.push_str(&format!(
        "status: {}   priority: {}   category: {}\n",
        project.status.as_str(),
        project.priority.as_str(),
        project.category.as_deref().unwrap_or("-")
    ));
    out.push_str(&format!(
        "effort: {}   actual: {}   impact: {}\n",
        project
            .effort_hours
            .map(format_hours)
            .unwrap_or_else(|| "-".to_string()),
        project
            .actual_hours
            .map(format_hours)
            .unwrap_or_else(|| "-".to_string()),
        project.impact.map(|i| i.as_str()).unwrap_or("-")
    ));
    if !project.tags.is_empty() {
        out.push_str(&format!("tags: {}\n", project.tags.join(", ")));
    }
    if let Some(plan) = &project.plan_path {
        out.push_str(&format!("plan: {}\n", plan));
    }
    for reference in &project.external_refs {
        out.push_str(&format!("ref: {}\n", reference));
    }
    out.push_str(&format!(
        "created: {}   started: {}   completed: {}\n",
        project.created_at.to_rfc3339(),
        project
            .started_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string()),
        project
            .completed_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string())
    ));

    if let Some(description) = &project.description {
        out.push_str(&format!("\n{}\n", description));
    }
    if let Some(notes) = &project.notes {
        out.push_str(&format!("\nnotes: {}\n", notes));
    }

    if !deliverables.is_empty() {
        out.push_str("\ndeliverables:\n");
        for d in deliverables {
            out.push_str(&format!(
                "  [{}] {} ({})\n",
                d.status.as_str(),
                d.name,
                d.kind.as_str()
            ));
        }
    }

    if !depends_on.is_empty() {
        out.push_str("\ndepends on:\n");
        for dep in depends_on {
            out.push_str(&format!("  {} ({})\n", dep.depends_on_id, dep.kind.as_str()));
        }
    }
    if !dependents.is_empty() {
        out.push_str("\ndepended on by:\n");
        for dep in dependents {
            out.push_str(&format!("  {} ({})\n", dep.project_id, dep.kind.as_str()));
        }
    }

    if !updates.is_empty() {
        out.push_str("\nhistory:\n");
        for update in updates {
            out.push_str(&format!(
                "  {} {}: {} -> {}{}\n",
                update.created_at.to_rfc3339(),
                update.field,
                update.old_value.as_deref().unwrap_or("∅"),
                update.new_value.as_deref().unwrap_or("∅"),
                update
                    .reason
                    .as_deref()
                    .map(|r| format!(" ({})", r))
                    .unwrap_or_default()
            ));
        }
    }

    out
}

/// Unfinished work in dependency order: prerequisites first, ties broken by
/// priority then age.
pub fn render_backlog(projects: &[Project], order: &[String]) -> String {
    let by_id: HashMap<&str, &Project> = projects.iter().map(|p| (p.id.as_str(), p)).collect();
    let mut out = String::new();
    for id in order {
        let Some(project) = by_id.get(id.as_str()) else {
            continue;
        };
        if matches!(
            project.status,
            ProjectStatus::Completed | ProjectStatus::Archived
        ) {
            continue;
        }
        out.push_str(&project_line(project));
        out.push('\n');
    }
    if out.is_empty() {
        return "(backlog empty)\n".to_string();
    }
    out
}

pub fn render_graph(
    projects: &[Project],
    order: &[String],
    edges_by_project: &HashMap<String, Vec<Dependency>>,
) -> String {
    let by_id: HashMap<&str, &Project> = projects.iter().map(|p| (p.id.as_str(), p)).collect();
    let mut out = String::new();
    for id in order {
        let Some(project) = by_id.get(id.as_str()) else {
            continue;
        };
        out.push_str(&format!(
            "{} {} — {}\n",
            status_symbol(project.status),
            project.id,
            project.name
        ));
        if let Some(edges) = edges_by_project.get(id) {
            for edge in edges {
                out.push_str(&format!(
                    "    depends on {} ({})\n",
                    edge.depends_on_id,
                    edge.kind.as_str()
                ));
            }
        }
    }
    if out.is_empty() {
        return "(no projects)\n".to_string();
    }
    out
}

pub fn render_stats(projects: &[Project]) -> String {
    let mut out = String::new();
    out.push_str(&format!("projects: {}\n", projects.len()));

    out.push_str("\nby status:\n");
    for status in [
        ProjectStatus::Planned,
        ProjectStatus::Active,
        ProjectStatus::Blocked,
        ProjectStatus::Completed,
        ProjectStatus::Archived,
    ] {
        let count = projects.iter().filter(|p| p.status == status).count();
        if count > 0 {
            out.push_str(&format!("  {:<10} {}\n", status.as_str(), count));
        }
    }

    out.push_str("\nby priority:\n");
    for priority in Priority::ALL {
        let count = projects.iter().filter(|p| p.priority == priority).count();
        if count > 0 {
            out.push_str(&format!("  {:<10} {}\n", priority.as_str(), count));
        }
    }

    let estimated: f64 = projects.iter().filter_map(|p| p.effort_hours).sum();
    let actual: f64 = projects.iter().filter_map(|p| p.actual_hours).sum();
    out.push_str(&format!(
        "\nestimated effort: {}\nrecorded actual:  {}\n",
        format_hours(estimated),
        format_hours(actual)
    ));

    let variances: Vec<f64> = projects
        .iter()
        .filter(|p| p.status == ProjectStatus::Completed)
        .filter_map(|p| Some(p.actual_hours? - p.effort_hours?))
        .collect();
    if !variances.is_empty() {
        let total: f64 = variances.iter().sum();
        out.push_str(&format!(
            "estimate variance over {} completed: {:+}h\n",
            variances.len(),
            total
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_project(id: &str, status: ProjectStatus) -> Project {
        Project {
            id: id.to_string(),
            name: format!("{} name", id),
            description: None,
            notes: None,
            status,
            priority: Priority::Medium,
            category: None,
            tags: Vec::new(),
            effort_hours: None,
            actual_hours: None,
            impact: None,
            plan_path: None,
            external_refs: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            started_at: None,
            completed_at: None,
            blocked_from: None,
        }
    }

    #[test]
    fn test_backlog_hides_finished_projects() {
        let projects = vec![
            make_project("a", ProjectStatus::Planned),
            make_project("b", ProjectStatus::Completed),
            make_project("c", ProjectStatus::Archived),
        ];
        let order = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let out = render_backlog(&projects, &order);
        assert!(out.contains("a"));
        assert!(!out.contains("b name"));
        assert!(!out.contains("c name"));
    }

    #[test]
    fn test_stats_counts_by_status() {
        let projects = vec![
            make_project("a", ProjectStatus::Planned),
            make_project("b", ProjectStatus::Planned),
            make_project("c", ProjectStatus::Active),
        ];
        let out = render_stats(&projects);
        assert!(out.contains("projects: 3"));
        assert!(out.contains("planned"));
        assert!(out.contains("active"));
        assert!(!out.contains("archived"));
    }
}
