//! # pyspur-store — domain model and durable persistence
//!
//! This is the lowest-level crate in the workspace: it owns the entity set
//! PySpur is built around — `WorkflowDefinition`/`Node`/`Link`,
//! `Workflow`/`WorkflowVersion`, `Run`, `Task`, `PauseEvent`, `Session` and
//! `Message` — plus the [`TaskStore`](traits::TaskStore) trait that persists
//! them.
//!
//! `pyspur-core` depends on this crate for the domain types it schedules and
//! validates; `pyspur-engine` depends on it for the `TaskStore` trait it
//! implements against SQLite.
//!
//! This crate ships one reference implementation,
//! [`InMemoryTaskStore`](memory::InMemoryTaskStore), intended for unit tests
//! and examples — `pyspur-engine` carries the SQLite-backed implementation
//! for production use.

pub mod domain;
pub mod error;
pub mod memory;
pub mod traits;

pub use domain::{
    CancelReason, ChatMessageContent, Coordinates, Link, Message, Node, PauseEvent, ResumeAction, Run, RunStatus,
    RunType, Session, SpurType, Task, TaskStatus, Workflow, WorkflowDefinition, WorkflowVersion,
};
pub use error::{Result, StoreError};
pub use memory::InMemoryTaskStore;
pub use traits::{Page, TaskStore};
