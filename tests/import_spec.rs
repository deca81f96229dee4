use project_registry::db::Database;
use project_registry::import::{self, ImportOutcome, LegacyDocument};
use project_registry::models::*;
use project_registry::registry::Registry;
use speculate2::speculate;

fn test_registry() -> Registry {
    let db = Database::open_memory().expect("Failed to create in-memory database");
    db.migrate().expect("Failed to run migrations");
    Registry::new(db)
}

fn doc(source: &str, content: &str) -> LegacyDocument {
    LegacyDocument {
        source: source.to_string(),
        content: content.to_string(),
    }
}

fn legacy_batch() -> Vec<LegacyDocument> {
    vec![
        doc(
            "docs/backup.md",
            "# Backup Overhaul\n\nNightly rotation with offsite copies.\n\nStatus: In Progress\nPriority: High\nEffort: 40h\n\n## Deliverables\n\n- Rotation script (tool)\n- Runbook (documentation)\n",
        ),
        doc(
            "docs/dns-cutover.md",
            "# DNS Cutover\nStatus: planned\nPriority: critical\nCategory: network\n",
        ),
        doc(
            "docs/monitoring-plan.md",
            "# Monitoring Revamp Plan\nStatus: planned\nEffort: 20\n",
        ),
        doc(
            "docs/retire-legacy.md",
            "# Retire Legacy Fileserver\nStatus: done\nPriority: low\n",
        ),
        doc("docs/scratch.md", "no heading here\njust notes\n"),
    ]
}

speculate! {
    before {
        let registry = test_registry();
    }

    describe "run" {
        it "migrates well-formed documents and reports the malformed one" {
            let report = import::run(&legacy_batch(), &registry).expect("Import failed");

            assert_eq!(report.created(), 4);
            assert_eq!(report.skipped(), 0);
            assert_eq!(report.errored(), 1);
            assert_eq!(report.total(), 5);

            let projects = registry.list(&ProjectFilter::default()).expect("Query failed");
            assert_eq!(projects.len(), 4);
        }

        it "covers every scanned document" {
            let report = import::run(&legacy_batch(), &registry).expect("Import failed");
            assert_eq!(
                report.created() + report.skipped() + report.errored(),
                report.total()
            );
        }

        it "is idempotent: a second run changes nothing" {
            import::run(&legacy_batch(), &registry).expect("Import failed");
            let first: Vec<Project> =
                registry.list(&ProjectFilter::default()).expect("Query failed");

            let report = import::run(&legacy_batch(), &registry).expect("Import failed");
            assert_eq!(report.created(), 0);
            assert_eq!(report.skipped(), 4);
            assert_eq!(report.errored(), 1);

            let second: Vec<Project> =
                registry.list(&ProjectFilter::default()).expect("Query failed");
            assert_eq!(first.len(), second.len());
            for (a, b) in first.iter().zip(second.iter()) {
                assert_eq!(a.id, b.id);
                assert_eq!(a.name, b.name);
                assert_eq!(a.status, b.status);
                assert_eq!(a.updated_at, b.updated_at);
            }
        }

        it "maps status keywords and metadata onto the project" {
            import::run(&legacy_batch(), &registry).expect("Import failed");

            let backup = registry.get("backup-overhaul").expect("Query failed");
            assert_eq!(backup.status, ProjectStatus::Active);
            assert_eq!(backup.priority, Priority::High);
            assert_eq!(backup.effort_hours, Some(40.0));
            assert_eq!(
                backup.description.as_deref(),
                Some("Nightly rotation with offsite copies.")
            );

            let retired = registry.get("retire-legacy-fileserver").expect("Query failed");
            assert_eq!(retired.status, ProjectStatus::Completed);
        }

        it "imports deliverable bullets" {
            import::run(&legacy_batch(), &registry).expect("Import failed");

            let deliverables = registry
                .deliverables("backup-overhaul")
                .expect("Query failed");
            assert_eq!(deliverables.len(), 2);
            let names: Vec<&str> = deliverables.iter().map(|d| d.name.as_str()).collect();
            assert!(names.contains(&"Rotation script"));
            assert!(names.contains(&"Runbook"));
        }

        it "points plan-shaped documents back at their source file" {
            import::run(&legacy_batch(), &registry).expect("Import failed");

            let plan = registry.get("monitoring-revamp-plan").expect("Query failed");
            assert_eq!(plan.plan_path.as_deref(), Some("docs/monitoring-plan.md"));
        }

        it "a malformed document never aborts the batch" {
            let batch = vec![
                doc("bad.md", "no heading\n"),
                doc("good.md", "# Good\nStatus: planned\n"),
            ];
            let report = import::run(&batch, &registry).expect("Import failed");

            assert_eq!(report.errored(), 1);
            assert_eq!(report.created(), 1);
            assert!(registry.exists("good").expect("Query failed"));
        }
    }

    describe "dry_run" {
        it "reports outcomes without writing anything" {
            let report = import::dry_run(&legacy_batch(), &registry).expect("Dry run failed");

            assert_eq!(report.created(), 4);
            assert_eq!(report.errored(), 1);
            assert!(report
                .entries
                .iter()
                .all(|e| e.outcome != ImportOutcome::Migrated));

            let projects = registry.list(&ProjectFilter::default()).expect("Query failed");
            assert!(projects.is_empty());
        }

        it "flags already-present ids as would_skip" {
            import::run(&legacy_batch(), &registry).expect("Import failed");

            let report = import::dry_run(&legacy_batch(), &registry).expect("Dry run failed");
            assert_eq!(report.skipped(), 4);
            assert!(report
                .entries
                .iter()
                .filter(|e| e.outcome != ImportOutcome::ParseError)
                .all(|e| e.outcome == ImportOutcome::WouldSkip));
        }

        it "names the parse failure in the report" {
            let report = import::dry_run(&legacy_batch(), &registry).expect("Dry run failed");
            let errored = report
                .entries
                .iter()
                .find(|e| e.outcome == ImportOutcome::ParseError)
                .expect("one parse error expected");
            assert_eq!(errored.source, "docs/scratch.md");
            assert!(errored.detail.as_deref().unwrap_or("").contains("heading"));
        }
    }

    describe "report rendering" {
        it "prints per-document lines and a summary" {
            let report = import::run(&legacy_batch(), &registry).expect("Import failed");
            let rendered = report.render();

            assert!(rendered.contains("docs/backup.md"));
            assert!(rendered.contains("parse_error"));
            assert!(rendered.contains("migrated=4 skipped=0 errored=1 total=5"));
        }
    }
}
