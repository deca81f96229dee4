//! Legacy document ingestion.
//!
//! One-shot (but safely repeatable) migration of unstructured planning
//! documents into registry calls. Parsing is structural — headings,
//! `Key: value` lines, status keywords — and fragile by nature, so the
//! heuristics are isolated in a single classification step that produces a
//! tagged variant per recognized document shape. A malformed document
//! becomes a per-document warning in the batch report; it never aborts the
//! batch. Running the same batch twice leaves the store exactly as one run
//! would: already-present ids are skipped, not errors.

use std::path::Path;
use std::time::Duration;

use crate::error::{RegistryError, Result};
use crate::models::{
    CreateDeliverableInput, CreateProjectInput, DeliverableKind, Impact, Priority, ProjectStatus,
};
use crate::registry::Registry;

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(50);

/// One legacy document to be scanned.
#[derive(Debug, Clone)]
pub struct LegacyDocument {
    /// Where the document came from; becomes `plan_path` for plan-shaped docs.
    pub source: String,
    pub content: String,
}

impl LegacyDocument {
    /// Load every `*.md` file directly under `dir`, sorted by path so the
    /// batch order is stable.
    pub fn read_dir(dir: &Path) -> Result<Vec<Self>> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .collect::<std::io::Result<Vec<_>>>()?
            .into_iter()
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "md"))
            .collect();
        paths.sort();

        let mut docs = Vec::with_capacity(paths.len());
        for path in paths {
            let content = std::fs::read_to_string(&path)?;
            docs.push(Self {
                source: path.display().to_string(),
                content,
            });
        }
        Ok(docs)
    }
}

/// The recognized document shapes. Classification happens once, up front;
/// each variant has its own mapping into a canonical project record, which
/// keeps the heuristic fragility at this boundary.
#[derive(Debug)]
enum Classified {
    /// A status-bearing project description.
    Project(ProjectDoc),
    /// A planning document; imports as a project pointing back at the file.
    Plan(ProjectDoc),
    Unrecognized { reason: String },
}

#[derive(Debug, Default)]
struct ProjectDoc {
    id: Option<String>,
    name: String,
    status: Option<ProjectStatus>,
    priority: Option<Priority>,
    category: Option<String>,
    impact: Option<Impact>,
    effort_hours: Option<f64>,
    tags: Vec<String>,
    description: Option<String>,
    deliverables: Vec<(String, DeliverableKind)>,
}

impl ProjectDoc {
    fn project_id(&self) -> String {
        self.id.clone().unwrap_or_else(|| slugify(&self.name))
    }
}

// ============================================================
// Classification
// ============================================================

fn classify(doc: &LegacyDocument) -> Classified {
    let Some(name) = doc
        .content
        .lines()
        .find_map(|line| line.strip_prefix("# ").map(|rest| rest.trim().to_string()))
    else {
        return Classified::Unrecognized {
            reason: "no top-level heading".to_string(),
        };
    };
    if name.is_empty() {
        return Classified::Unrecognized {
            reason: "empty top-level heading".to_string(),
        };
    }

    let mut parsed = ProjectDoc {
        name: name.clone(),
        ..ProjectDoc::default()
    };
    let mut section = String::new();
    let mut description_lines: Vec<&str> = Vec::new();

    for line in doc.content.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("## ") {
            section = rest.trim().to_lowercase();
            continue;
        }
        if trimmed.starts_with('#') {
            continue;
        }

        if section == "deliverables" {
            if let Some(bullet) = trimmed.strip_prefix("- ") {
                parsed.deliverables.push(parse_deliverable_bullet(bullet));
            }
            continue;
        }

        if let Some((key, value)) = key_value(trimmed) {
            match key.as_str() {
                "id" => parsed.id = Some(value),
                "status" => match parse_status_keyword(&value) {
                    Some(status) => parsed.status = Some(status),
                    None => {
                        return Classified::Unrecognized {
                            reason: format!("unrecognized status '{}'", value),
                        }
                    }
                },
                "priority" => match parse_priority_keyword(&value) {
                    Some(priority) => parsed.priority = Some(priority),
                    None => {
                        return Classified::Unrecognized {
                            reason: format!("unrecognized priority '{}'", value),
                        }
                    }
                },
                "impact" => parsed.impact = Impact::from_str(&value.to_lowercase()),
                "category" => parsed.category = Some(value),
                "effort" | "effort hours" | "estimate" => match parse_hours(&value) {
                    Some(hours) => parsed.effort_hours = Some(hours),
                    None => {
                        return Classified::Unrecognized {
                            reason: format!("unparseable effort '{}'", value),
                        }
                    }
                },
                "tags" => {
                    parsed.tags = value
                        .split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect();
                }
                _ => {}
            }
            continue;
        }

        if section.is_empty() && !trimmed.is_empty() && !trimmed.starts_with("- ") {
            description_lines.push(trimmed);
        }
    }

    if !description_lines.is_empty() {
        parsed.description = Some(description_lines.join(" "));
    }

    let plan_shaped =
        name.to_lowercase().contains("plan") || doc.source.to_lowercase().contains("plan");
    if plan_shaped {
        Classified::Plan(parsed)
    } else {
        Classified::Project(parsed)
    }
}

/// Split a `Key: value` line, tolerating `**Key:** value` bold markup.
fn key_value(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim().trim_matches('*').trim().to_lowercase();
    if key.is_empty() || (key.contains(' ') && key != "effort hours") {
        return None;
    }
    let value = value.trim_start_matches('*').trim().to_string();
    if value.is_empty() {
        return None;
    }
    Some((key, value))
}

fn parse_status_keyword(value: &str) -> Option<ProjectStatus> {
    match value.to_lowercase().as_str() {
        "active" | "in progress" | "in-progress" | "ongoing" | "started" => {
            Some(ProjectStatus::Active)
        }
        "completed" | "complete" | "done" | "finished" | "shipped" => {
            Some(ProjectStatus::Completed)
        }
        "blocked" | "on hold" | "on-hold" | "waiting" => Some(ProjectStatus::Blocked),
        "planned" | "todo" | "to do" | "backlog" | "not started" | "proposed" => {
            Some(ProjectStatus::Planned)
        }
        "archived" => Some(ProjectStatus::Archived),
        _ => None,
    }
}

fn parse_priority_keyword(value: &str) -> Option<Priority> {
    match value.to_lowercase().as_str() {
        "critical" | "urgent" | "p0" => Some(Priority::Critical),
        "high" | "p1" => Some(Priority::High),
        "medium" | "normal" | "p2" => Some(Priority::Medium),
        "low" | "p3" => Some(Priority::Low),
        _ => None,
    }
}

fn parse_hours(value: &str) -> Option<f64> {
    let digits: String = value
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let hours: f64 = digits.parse().ok()?;
    (hours.is_finite() && hours >= 0.0).then_some(hours)
}

/// `- Backup script (tool)` → name plus kind; bare bullets default to tool.
fn parse_deliverable_bullet(bullet: &str) -> (String, DeliverableKind) {
    let bullet = bullet.trim();
    if let Some(open) = bullet.rfind(" (") {
        if let Some(inner) = bullet[open + 2..].strip_suffix(')') {
            if let Some(kind) = DeliverableKind::from_str(&inner.trim().to_lowercase()) {
                return (bullet[..open].trim().to_string(), kind);
            }
        }
    }
    (bullet.to_string(), DeliverableKind::Tool)
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

fn to_create_input(doc: &ProjectDoc, plan_path: Option<String>) -> CreateProjectInput {
    CreateProjectInput {
        id: doc.project_id(),
        name: doc.name.clone(),
        status: doc.status,
        priority: doc.priority,
        category: doc.category.clone(),
        tags: doc.tags.clone(),
        effort_hours: doc.effort_hours,
        impact: doc.impact,
        plan_path,
        external_refs: Vec::new(),
        description: doc.description.clone(),
        notes: None,
    }
}

// ============================================================
// Batch reports
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Migrated,
    WouldCreate,
    Skipped,
    WouldSkip,
    ParseError,
}

impl ImportOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Migrated => "migrated",
            Self::WouldCreate => "would_create",
            Self::Skipped => "skipped",
            Self::WouldSkip => "would_skip",
            Self::ParseError => "parse_error",
        }
    }
}

#[derive(Debug)]
pub struct ImportEntry {
    pub source: String,
    pub outcome: ImportOutcome,
    pub detail: Option<String>,
}

/// Per-document outcomes for one batch. The counts always cover the whole
/// batch: `created() + skipped() + errored() == total()`.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub entries: Vec<ImportEntry>,
}

impl ImportReport {
    pub fn created(&self) -> usize {
        self.count(|o| matches!(o, ImportOutcome::Migrated | ImportOutcome::WouldCreate))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ImportOutcome::Skipped | ImportOutcome::WouldSkip))
    }

    pub fn errored(&self) -> usize {
        self.count(|o| matches!(o, ImportOutcome::ParseError))
    }

    pub fn total(&self) -> usize {
        self.entries.len()
    }

    fn count(&self, pred: impl Fn(ImportOutcome) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(e.outcome)).count()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            match &entry.detail {
                Some(detail) => out.push_str(&format!(
                    "{:<12} {} ({})\n",
                    entry.outcome.as_str(),
                    entry.source,
                    detail
                )),
                None => out.push_str(&format!("{:<12} {}\n", entry.outcome.as_str(), entry.source)),
            }
        }
        out.push_str(&format!(
            "migrated={} skipped={} errored={} total={}\n",
            self.created(),
            self.skipped(),
            self.errored(),
            self.total()
        ));
        out
    }
}

// ============================================================
// Batch execution
// ============================================================

/// Parse and validate without writing anything.
pub fn dry_run(docs: &[LegacyDocument], registry: &Registry) -> Result<ImportReport> {
    let mut report = ImportReport::default();
    for doc in docs {
        let entry = match classify(doc) {
            Classified::Unrecognized { reason } => parse_error(doc, reason),
            Classified::Project(parsed) | Classified::Plan(parsed) => {
                let id = parsed.project_id();
                if registry.exists(&id)? {
                    entry(doc, ImportOutcome::WouldSkip, id)
                } else {
                    entry(doc, ImportOutcome::WouldCreate, id)
                }
            }
        };
        report.entries.push(entry);
    }
    Ok(report)
}

/// Ingest the batch. Already-present ids are skipped (not errors), so
/// re-running the same batch is a no-op. Retryable store errors are retried
/// with bounded exponential backoff; fatal store errors abort the batch.
pub fn run(docs: &[LegacyDocument], registry: &Registry) -> Result<ImportReport> {
    let mut report = ImportReport::default();
    for doc in docs {
        let result = match classify(doc) {
            Classified::Unrecognized { reason } => {
                tracing::warn!("import warning for {}: {}", doc.source, reason);
                parse_error(doc, reason)
            }
            Classified::Project(parsed) => import_one(registry, doc, &parsed, None)?,
            Classified::Plan(parsed) => {
                import_one(registry, doc, &parsed, Some(doc.source.clone()))?
            }
        };
        report.entries.push(result);
    }
    Ok(report)
}

fn import_one(
    registry: &Registry,
    doc: &LegacyDocument,
    parsed: &ProjectDoc,
    plan_path: Option<String>,
) -> Result<ImportEntry> {
    let id = parsed.project_id();
    if with_retry(|| registry.exists(&id))? {
        return Ok(entry(doc, ImportOutcome::Skipped, id));
    }

    let input = to_create_input(parsed, plan_path);
    match with_retry(|| registry.add(input.clone())) {
        Ok(_) => {}
        Err(err @ RegistryError::Store { .. }) => return Err(err),
        Err(err) => {
            tracing::warn!("import warning for {}: {}", doc.source, err);
            return Ok(parse_error(doc, err.to_string()));
        }
    }

    for (name, kind) in &parsed.deliverables {
        let deliverable = CreateDeliverableInput {
            name: name.clone(),
            kind: *kind,
            status: None,
            file_path: None,
        };
        match with_retry(|| registry.add_deliverable(&id, deliverable.clone())) {
            Ok(_) => {}
            Err(err @ RegistryError::Store { .. }) => return Err(err),
            Err(err) => tracing::warn!(
                "import warning for {}: deliverable '{}': {}",
                doc.source,
                name,
                err
            ),
        }
    }

    Ok(entry(doc, ImportOutcome::Migrated, id))
}

fn entry(doc: &LegacyDocument, outcome: ImportOutcome, id: String) -> ImportEntry {
    ImportEntry {
        source: doc.source.clone(),
        outcome,
        detail: Some(id),
    }
}

fn parse_error(doc: &LegacyDocument, reason: String) -> ImportEntry {
    ImportEntry {
        source: doc.source.clone(),
        outcome: ImportOutcome::ParseError,
        detail: Some(reason),
    }
}

/// Retry the retryable "store busy" class only; deterministic errors pass
/// straight through.
fn with_retry<T>(mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut delay = RETRY_BASE_DELAY;
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < RETRY_ATTEMPTS => {
                tracing::warn!("store busy, retrying in {:?}: {}", delay, err);
                std::thread::sleep(delay);
                delay *= 2;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(source: &str, content: &str) -> LegacyDocument {
        LegacyDocument {
            source: source.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_classify_project_doc() {
        let parsed = classify(&doc(
            "docs/backup.md",
            "# Backup Overhaul\n\nRotate backups nightly.\n\nID: backup-overhaul\nStatus: In Progress\nPriority: High\nEffort: 40h\nTags: ops, storage\n\n## Deliverables\n\n- Rotation script (tool)\n- Runbook (documentation)\n",
        ));
        let Classified::Project(parsed) = parsed else {
            panic!("expected a project doc");
        };
        assert_eq!(parsed.id.as_deref(), Some("backup-overhaul"));
        assert_eq!(parsed.name, "Backup Overhaul");
        assert_eq!(parsed.status, Some(ProjectStatus::Active));
        assert_eq!(parsed.priority, Some(Priority::High));
        assert_eq!(parsed.effort_hours, Some(40.0));
        assert_eq!(parsed.tags, vec!["ops", "storage"]);
        assert_eq!(parsed.description.as_deref(), Some("Rotate backups nightly."));
        assert_eq!(
            parsed.deliverables,
            vec![
                ("Rotation script".to_string(), DeliverableKind::Tool),
                ("Runbook".to_string(), DeliverableKind::Documentation),
            ]
        );
    }

    #[test]
    fn test_classify_plan_doc_by_filename() {
        let parsed = classify(&doc("docs/dns-plan.md", "# DNS Cutover\nStatus: planned\n"));
        assert!(matches!(parsed, Classified::Plan(_)));
    }

    #[test]
    fn test_classify_rejects_missing_heading() {
        let parsed = classify(&doc("notes.md", "just some text\nStatus: active\n"));
        assert!(matches!(parsed, Classified::Unrecognized { .. }));
    }

    #[test]
    fn test_classify_rejects_unknown_status() {
        let parsed = classify(&doc("x.md", "# X\nStatus: quantum\n"));
        let Classified::Unrecognized { reason } = parsed else {
            panic!("expected parse error");
        };
        assert!(reason.contains("quantum"));
    }

    #[test]
    fn test_bold_key_value_lines() {
        let parsed = classify(&doc("x.md", "# X\n**Status:** done\n**Priority:** low\n"));
        let Classified::Project(parsed) = parsed else {
            panic!("expected a project doc");
        };
        assert_eq!(parsed.status, Some(ProjectStatus::Completed));
        assert_eq!(parsed.priority, Some(Priority::Low));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Backup Overhaul"), "backup-overhaul");
        assert_eq!(slugify("  DNS -- Cutover!  "), "dns-cutover");
    }

    #[test]
    fn test_parse_hours_variants() {
        assert_eq!(parse_hours("40"), Some(40.0));
        assert_eq!(parse_hours("12.5h"), Some(12.5));
        assert_eq!(parse_hours("8 hours"), Some(8.0));
        assert_eq!(parse_hours("soon"), None);
    }
}
