//! `SQLite` storage layer for the issue engine.
//!
//! This module provides the persistence layer using `SQLite` with:
//! - WAL mode for concurrent reads
//! - Transaction discipline for atomic writes (mutation + cascade + journal)
//! - Tenancy filtering on every query
//! - Scoped per-issue locking with a fail-fast mode
//!
//! # Submodules
//!
//! - [`events`] - Audit journal reads
//! - [`lock`] - Per-issue exclusive locking
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Main `SQLite` storage implementation

pub mod events;
pub mod lock;
pub mod schema;
pub mod sqlite;

pub use lock::WaitPolicy;
pub use sqlite::{EngineStorage, MutationContext};
