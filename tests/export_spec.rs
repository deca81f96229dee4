use chrono::{TimeZone, Utc};
use project_registry::db::Database;
use project_registry::export::{self, ExportTargets};
use project_registry::models::*;
use project_registry::registry::Registry;
use speculate2::speculate;

fn test_registry() -> Registry {
    let db = Database::open_memory().expect("Failed to create in-memory database");
    db.migrate().expect("Failed to run migrations");
    Registry::new(db)
}

fn seeded_registry() -> Registry {
    let registry = test_registry();
    registry
        .add(CreateProjectInput {
            id: "backup-overhaul".to_string(),
            name: "Backup Overhaul".to_string(),
            priority: Some(Priority::High),
            category: Some("infrastructure".to_string()),
            effort_hours: Some(40.0),
            impact: Some(Impact::High),
            plan_path: Some("docs/backup-plan.md".to_string()),
            ..CreateProjectInput::default()
        })
        .expect("Failed to add project");
    registry
        .add(CreateProjectInput {
            id: "dns-cutover".to_string(),
            name: "DNS Cutover".to_string(),
            priority: Some(Priority::Critical),
            effort_hours: Some(8.0),
            ..CreateProjectInput::default()
        })
        .expect("Failed to add project");
    registry
        .add(CreateProjectInput {
            id: "runbook-refresh".to_string(),
            name: "Runbook Refresh".to_string(),
            priority: Some(Priority::High),
            effort_hours: Some(12.0),
            ..CreateProjectInput::default()
        })
        .expect("Failed to add project");
    registry
        .add(CreateProjectInput {
            id: "wiki-gardening".to_string(),
            name: "Wiki Gardening".to_string(),
            priority: Some(Priority::High),
            ..CreateProjectInput::default()
        })
        .expect("Failed to add project");
    registry
        .add_dependency("backup-overhaul", "dns-cutover", DependencyKind::Blocks)
        .expect("Failed to add dependency");
    registry
        .add_deliverable(
            "backup-overhaul",
            CreateDeliverableInput {
                name: "Rotation script".to_string(),
                kind: DeliverableKind::Tool,
                status: None,
                file_path: None,
            },
        )
        .expect("Failed to add deliverable");
    registry
}

speculate! {
    describe "determinism" {
        it "renders byte-identical output for the same snapshot and timestamp" {
            let registry = seeded_registry();
            let generated_at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

            let snapshot_a = registry.snapshot().expect("Snapshot failed");
            let snapshot_b = registry.snapshot().expect("Snapshot failed");

            assert_eq!(
                export::render_markdown(&snapshot_a, generated_at),
                export::render_markdown(&snapshot_b, generated_at)
            );
            assert_eq!(
                export::render_json(&snapshot_a, generated_at).expect("Render failed"),
                export::render_json(&snapshot_b, generated_at).expect("Render failed")
            );
        }

        it "only the generated_at header differs across render times" {
            let registry = seeded_registry();
            let snapshot = registry.snapshot().expect("Snapshot failed");

            let t1 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
            let t2 = Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();

            let a = export::render_markdown(&snapshot, t1);
            let b = export::render_markdown(&snapshot, t2);

            let diff: Vec<(&str, &str)> = a
                .lines()
                .zip(b.lines())
                .filter(|(x, y)| x != y)
                .collect();
            assert_eq!(diff.len(), 1);
            assert!(diff[0].0.starts_with("Generated:"));
        }
    }

    describe "markdown" {
        it "groups by priority tier in descending severity" {
            let registry = seeded_registry();
            let snapshot = registry.snapshot().expect("Snapshot failed");
            let out = export::render_markdown(&snapshot, Utc::now());

            let critical = out.find("## Critical").expect("critical tier missing");
            let high = out.find("## High").expect("high tier missing");
            assert!(critical < high);
            assert!(!out.contains("## Low"));

            assert!(out.starts_with("# Project Registry\n"));
        }

        it "sorts a tier by effort descending then id, effortless projects last" {
            let registry = seeded_registry();
            let snapshot = registry.snapshot().expect("Snapshot failed");
            let out = export::render_markdown(&snapshot, Utc::now());

            let backup = out.find("**backup-overhaul**").expect("missing");
            let runbook = out.find("**runbook-refresh**").expect("missing");
            let wiki = out.find("**wiki-gardening**").expect("missing");
            assert!(backup < runbook);
            assert!(runbook < wiki);
        }

        it "includes the plan reference when present" {
            let registry = seeded_registry();
            let snapshot = registry.snapshot().expect("Snapshot failed");
            let out = export::render_markdown(&snapshot, Utc::now());

            assert!(out.contains("plan: docs/backup-plan.md"));
            assert!(out.contains("effort: 40h"));
            assert!(out.contains("impact: high"));
            assert!(out.contains("category: infrastructure"));
        }
    }

    describe "json" {
        it "carries every project field plus nested deliverables and dependencies" {
            let registry = seeded_registry();
            let snapshot = registry.snapshot().expect("Snapshot failed");
            let out = export::render_json(&snapshot, Utc::now()).expect("Render failed");

            let doc: serde_json::Value = serde_json::from_str(&out).expect("Invalid JSON");
            assert!(doc.get("generated_at").is_some());

            let projects = doc["projects"].as_array().expect("projects array missing");
            assert_eq!(projects.len(), 4);

            let backup = projects
                .iter()
                .find(|p| p["id"] == "backup-overhaul")
                .expect("backup project missing");
            assert_eq!(backup["status"], "planned");
            assert_eq!(backup["priority"], "high");
            assert_eq!(backup["effort_hours"], 40.0);
            assert_eq!(backup["impact"], "high");
            assert!(backup.get("created_at").is_some());
            assert!(backup.get("tags").is_some());

            let deliverables = backup["deliverables"].as_array().expect("missing");
            assert_eq!(deliverables.len(), 1);
            assert_eq!(deliverables[0]["name"], "Rotation script");

            let dependencies = backup["dependencies"].as_array().expect("missing");
            assert_eq!(dependencies.len(), 1);
            assert_eq!(dependencies[0]["depends_on_id"], "dns-cutover");
        }

        it "can be filtered by status" {
            let registry = seeded_registry();
            registry.start("dns-cutover").expect("Failed to start");

            let snapshot = registry
                .snapshot()
                .expect("Snapshot failed")
                .retain_status(ProjectStatus::Active);
            let out = export::render_json(&snapshot, Utc::now()).expect("Render failed");
            let doc: serde_json::Value = serde_json::from_str(&out).expect("Invalid JSON");

            let projects = doc["projects"].as_array().expect("projects array missing");
            assert_eq!(projects.len(), 1);
            assert_eq!(projects[0]["id"], "dns-cutover");
        }
    }

    describe "file regeneration" {
        it "writes both export files next to the store after every write" {
            let dir = tempfile::tempdir().expect("Failed to create tempdir");
            let db = Database::open(dir.path().join("registry.db")).expect("Failed to open");
            db.migrate().expect("Failed to migrate");
            let registry = Registry::with_export(db, ExportTargets::in_dir(dir.path()));

            registry
                .add(CreateProjectInput {
                    id: "first".to_string(),
                    name: "First".to_string(),
                    ..CreateProjectInput::default()
                })
                .expect("Failed to add project");

            let markdown = std::fs::read_to_string(dir.path().join("registry.md"))
                .expect("markdown export missing");
            let json = std::fs::read_to_string(dir.path().join("registry.json"))
                .expect("json export missing");
            assert!(markdown.contains("**first**"));
            assert!(json.contains("\"first\""));

            // No temp files left behind
            assert!(!dir.path().join("registry.md.tmp").exists());
            assert!(!dir.path().join("registry.json.tmp").exists());
        }

        it "replaces the previous export on the next write" {
            let dir = tempfile::tempdir().expect("Failed to create tempdir");
            let db = Database::open(dir.path().join("registry.db")).expect("Failed to open");
            db.migrate().expect("Failed to migrate");
            let registry = Registry::with_export(db, ExportTargets::in_dir(dir.path()));

            registry
                .add(CreateProjectInput {
                    id: "first".to_string(),
                    name: "First".to_string(),
                    ..CreateProjectInput::default()
                })
                .expect("Failed to add project");
            registry
                .add(CreateProjectInput {
                    id: "second".to_string(),
                    name: "Second".to_string(),
                    ..CreateProjectInput::default()
                })
                .expect("Failed to add project");

            let markdown = std::fs::read_to_string(dir.path().join("registry.md"))
                .expect("markdown export missing");
            assert!(markdown.contains("**first**"));
            assert!(markdown.contains("**second**"));
        }
    }

    describe "atomic write" {
        it "renames over the destination" {
            let dir = tempfile::tempdir().expect("Failed to create tempdir");
            let path = dir.path().join("out.md");

            export::write_atomic(&path, "one").expect("Write failed");
            export::write_atomic(&path, "two").expect("Write failed");

            assert_eq!(std::fs::read_to_string(&path).expect("Read failed"), "two");
            assert!(!dir.path().join("out.md.tmp").exists());
        }
    }
}
