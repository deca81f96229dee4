//! Domain models for the project registry.
//!
//! # Core Concepts
//!
//! - [`Project`]: A unit of work, identified by a stable external key.
//!   The single source of truth for its status, priority, and estimation.
//! - [`ProjectUpdate`]: Append-only audit log of field changes (like
//!   `git log` for a project). Cascades away only with its project.
//! - [`Deliverable`]: A concrete output owned by one project.
//! - [`Dependency`]: A directed edge between projects. The edge set is kept
//!   acyclic by the registry at all times.
//!
//! Enums carry `as_str`/`from_str` pairs for their SQLite text
//! representation; serde uses the same snake_case strings for exports.

mod deliverable;
mod dependency;
mod project;
mod update;

pub use deliverable::*;
pub use dependency::*;
pub use project::*;
pub use update::*;
