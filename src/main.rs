use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use project_registry::db::Database;
use project_registry::error::RegistryError;
use project_registry::export::{self, ExportTargets};
use project_registry::import::{self, LegacyDocument};
use project_registry::models::*;
use project_registry::registry::Registry;
use project_registry::render;

#[derive(Parser)]
#[command(name = "preg")]
#[command(about = "Project and work-item registry")]
struct Cli {
    /// Path to the store file (defaults to $PREG_STORE, then the platform data dir)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Directory for the regenerated export files (defaults to the store directory)
    #[arg(long, global = true)]
    export_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new project
    Add {
        id: String,
        name: String,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        effort_hours: Option<f64>,
        #[arg(long)]
        impact: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        plan_path: Option<String>,
        #[arg(long = "ref")]
        external_refs: Vec<String>,
    },
    /// List projects
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    /// Show one project in full, including its audit history
    Show { id: String },
    /// Mark a planned project active
    Start { id: String },
    /// Mark a project completed
    Complete {
        id: String,
        #[arg(long)]
        actual_hours: Option<f64>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Block a project on an external obstacle
    Block {
        id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Return a blocked project to its prior state
    Unblock { id: String },
    /// Archive a project (terminal)
    Archive { id: String },
    /// Apply partial field changes
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        effort_hours: Option<f64>,
        #[arg(long)]
        impact: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        plan_path: Option<String>,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Remove a project
    Remove {
        id: String,
        #[arg(long)]
        cascade: bool,
    },
    /// Unfinished work in dependency order
    Backlog,
    /// Registry-wide counts and effort figures
    Stats,
    /// Print an export to stdout
    Export {
        #[arg(long, default_value = "markdown")]
        format: String,
        #[arg(long)]
        status: Option<String>,
    },
    /// Manage dependency edges
    Depend {
        #[command(subcommand)]
        command: DependCommands,
    },
    /// Manage deliverables
    Deliverable {
        #[command(subcommand)]
        command: DeliverableCommands,
    },
    /// Ingest legacy planning documents
    Import {
        dir: PathBuf,
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum DependCommands {
    /// Add an edge: <id> depends on <depends-on>
    Add {
        id: String,
        depends_on: String,
        #[arg(long)]
        kind: Option<String>,
    },
    /// Remove an edge
    Rm { id: String, depends_on: String },
    /// List both directions for one project
    List { id: String },
    /// Print all projects in dependency order
    Graph,
}

#[derive(Subcommand)]
enum DeliverableCommands {
    /// Add a deliverable to a project
    Add {
        project_id: String,
        name: String,
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        file_path: Option<String>,
    },
    /// Mark a deliverable completed
    Done { project_id: String, name: String },
    /// List a project's deliverables
    List { project_id: String },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "project_registry=info".into()),
    );

    // Log to stderr: stdout carries listings and exports
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            let code = err
                .downcast_ref::<RegistryError>()
                .map(|e| e.exit_code())
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let store_path = resolve_store_path(cli.store)?;
    let db = Database::open(store_path.clone())?;
    db.migrate()?;

    let export_dir = cli.export_dir.unwrap_or_else(|| {
        store_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    });
    let registry = Registry::with_export(db, ExportTargets::in_dir(&export_dir));

    match cli.command {
        Commands::Add {
            id,
            name,
            priority,
            status,
            category,
            effort_hours,
            impact,
            description,
            tags,
            plan_path,
            external_refs,
        } => {
            let project = registry.add(CreateProjectInput {
                id,
                name,
                status: status.as_deref().map(parse_status).transpose()?,
                priority: priority.as_deref().map(parse_priority).transpose()?,
                category,
                tags,
                effort_hours,
                impact: impact.as_deref().map(parse_impact).transpose()?,
                plan_path,
                external_refs,
                description,
                notes: None,
            })?;
            println!("added {}", project.id);
        }
        Commands::List {
            status,
            priority,
            category,
        } => {
            let filter = ProjectFilter {
                status: status.as_deref().map(parse_status).transpose()?,
                priority: priority.as_deref().map(parse_priority).transpose()?,
                category,
            };
            print!("{}", render::render_list(&registry.list(&filter)?));
        }
        Commands::Show { id } => {
            let project = registry.get(&id)?;
            let deliverables = registry.deliverables(&id)?;
            let depends_on = registry.dependencies(&id)?;
            let dependents = registry.dependents(&id)?;
            let updates = registry.updates(&id)?;
            print!(
                "{}",
                render::render_show(&project, &deliverables, &depends_on, &dependents, &updates)
            );
        }
        Commands::Start { id } => {
            let project = registry.start(&id)?;
            println!("{} is now {}", project.id, project.status.as_str());
        }
        Commands::Complete {
            id,
            actual_hours,
            notes,
        } => {
            let project = registry.complete(&id, actual_hours, notes)?;
            println!("{} completed", project.id);
        }
        Commands::Block { id, reason } => {
            let project = registry.block(&id, reason)?;
            println!("{} blocked", project.id);
        }
        Commands::Unblock { id } => {
            let project = registry.unblock(&id)?;
            println!("{} is now {}", project.id, project.status.as_str());
        }
        Commands::Archive { id } => {
            let project = registry.archive(&id)?;
            println!("{} archived", project.id);
        }
        Commands::Update {
            id,
            name,
            priority,
            category,
            effort_hours,
            impact,
            description,
            notes,
            tags,
            plan_path,
            reason,
        } => {
            let patch = ProjectPatch {
                name,
                priority: priority.as_deref().map(parse_priority).transpose()?,
                category,
                tags: if tags.is_empty() { None } else { Some(tags) },
                effort_hours,
                impact: impact.as_deref().map(parse_impact).transpose()?,
                plan_path,
                external_refs: None,
                description,
                notes,
            };
            let project = registry.update(&id, patch, reason)?;
            println!("updated {}", project.id);
        }
        Commands::Remove { id, cascade } => {
            registry.remove(&id, cascade)?;
            println!("removed {}", id);
        }
        Commands::Backlog => {
            let projects = registry.list(&ProjectFilter::default())?;
            let order = registry.dependency_graph()?.topological_order();
            print!("{}", render::render_backlog(&projects, &order));
        }
        Commands::Stats => {
            let projects = registry.list(&ProjectFilter::default())?;
            print!("{}", render::render_stats(&projects));
        }
        Commands::Export { format, status } => {
            let mut snapshot = registry.snapshot()?;
            if let Some(status) = status.as_deref().map(parse_status).transpose()? {
                snapshot = snapshot.retain_status(status);
            }
            match format.as_str() {
                "markdown" => print!("{}", export::render_markdown(&snapshot, Utc::now())),
                "json" => print!("{}", export::render_json(&snapshot, Utc::now())?),
                other => {
                    return Err(RegistryError::validation(format!(
                        "unknown export format '{}' (expected markdown or json)",
                        other
                    ))
                    .into())
                }
            }
        }
        Commands::Depend { command } => run_depend(&registry, command)?,
        Commands::Deliverable { command } => run_deliverable(&registry, command)?,
        Commands::Import { dir, dry_run } => {
            let docs = LegacyDocument::read_dir(&dir)?;
            let report = if dry_run {
                import::dry_run(&docs, &registry)?
            } else {
                import::run(&docs, &registry)?
            };
            print!("{}", report.render());
        }
    }

    Ok(())
}

fn run_depend(registry: &Registry, command: DependCommands) -> anyhow::Result<()> {
    match command {
        DependCommands::Add {
            id,
            depends_on,
            kind,
        } => {
            let kind = kind
                .as_deref()
                .map(parse_dependency_kind)
                .transpose()?
                .unwrap_or(DependencyKind::Blocks);
            let edge = registry.add_dependency(&id, &depends_on, kind)?;
            println!(
                "{} now depends on {} ({})",
                edge.project_id,
                edge.depends_on_id,
                edge.kind.as_str()
            );
        }
        DependCommands::Rm { id, depends_on } => {
            registry.remove_dependency(&id, &depends_on)?;
            println!("removed {} -> {}", id, depends_on);
        }
        DependCommands::List { id } => {
            // Existence check first so an unknown id errors instead of
            // printing an empty listing
            registry.get(&id)?;
            let depends_on = registry.dependencies(&id)?;
            let dependents = registry.dependents(&id)?;
            for dep in &depends_on {
                println!("depends on {} ({})", dep.depends_on_id, dep.kind.as_str());
            }
            for dep in &dependents {
                println!("depended on by {} ({})", dep.project_id, dep.kind.as_str());
            }
            if depends_on.is_empty() && dependents.is_empty() {
                println!("(no dependencies)");
            }
        }
        DependCommands::Graph => {
            let projects = registry.list(&ProjectFilter::default())?;
            let order = registry.dependency_graph()?.topological_order();
            let mut edges_by_project: HashMap<String, Vec<Dependency>> = HashMap::new();
            for project in &projects {
                edges_by_project
                    .insert(project.id.clone(), registry.dependencies(&project.id)?);
            }
            print!("{}", render::render_graph(&projects, &order, &edges_by_project));
        }
    }
    Ok(())
}

fn run_deliverable(registry: &Registry, command: DeliverableCommands) -> anyhow::Result<()> {
    match command {
        DeliverableCommands::Add {
            project_id,
            name,
            kind,
            file_path,
        } => {
            let kind = kind
                .as_deref()
                .map(parse_deliverable_kind)
                .transpose()?
                .unwrap_or(DeliverableKind::Tool);
            let deliverable = registry.add_deliverable(
                &project_id,
                CreateDeliverableInput {
                    name,
                    kind,
                    status: None,
                    file_path,
                },
            )?;
            println!("added deliverable '{}' to {}", deliverable.name, project_id);
        }
        DeliverableCommands::Done { project_id, name } => {
            registry.update_deliverable(
                &project_id,
                &name,
                UpdateDeliverableInput {
                    status: Some(DeliverableStatus::Completed),
                    ..UpdateDeliverableInput::default()
                },
            )?;
            println!("deliverable '{}' completed", name);
        }
        DeliverableCommands::List { project_id } => {
            registry.get(&project_id)?;
            let deliverables = registry.deliverables(&project_id)?;
            if deliverables.is_empty() {
                println!("(no deliverables)");
            }
            for d in &deliverables {
                println!("[{}] {} ({})", d.status.as_str(), d.name, d.kind.as_str());
            }
        }
    }
    Ok(())
}

fn resolve_store_path(flag: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path);
    }
    if let Some(path) = std::env::var_os("PREG_STORE") {
        return Ok(PathBuf::from(path));
    }
    let dirs = directories::ProjectDirs::from("", "", "preg")
        .ok_or_else(|| anyhow::anyhow!("could not determine data directory"))?;
    Ok(dirs.data_dir().join("registry.db"))
}

fn parse_status(s: &str) -> Result<ProjectStatus, RegistryError> {
    ProjectStatus::from_str(s)
        .ok_or_else(|| RegistryError::validation(format!("unknown status '{}'", s)))
}

fn parse_priority(s: &str) -> Result<Priority, RegistryError> {
    Priority::from_str(s)
        .ok_or_else(|| RegistryError::validation(format!("unknown priority '{}'", s)))
}

fn parse_impact(s: &str) -> Result<Impact, RegistryError> {
    Impact::from_str(s).ok_or_else(|| RegistryError::validation(format!("unknown impact '{}'", s)))
}

fn parse_dependency_kind(s: &str) -> Result<DependencyKind, RegistryError> {
    DependencyKind::from_str(s)
        .ok_or_else(|| RegistryError::validation(format!("unknown dependency kind '{}'", s)))
}

fn parse_deliverable_kind(s: &str) -> Result<DeliverableKind, RegistryError> {
    DeliverableKind::from_str(s)
        .ok_or_else(|| RegistryError::validation(format!("unknown deliverable kind '{}'", s)))
}
