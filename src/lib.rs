//! `issue_engine` - Issue lifecycle and aggregation engine
//!
//! Deduplicates evaluation findings into issues, guards their lifecycle
//! transitions, and derives occurrence statistics over a visible commit
//! history. Backed by `SQLite`; every query is tenant-scoped.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`model`] - Data types (Issue, state machine, events, facets)
//! - [`storage`] - `SQLite` database layer, locking, audit journal
//! - [`engine`] - Lifecycle transitions, stats, classification, listing
//! - [`config`] - Window and threshold configuration
//! - [`error`] - Error types and handling
//! - [`util`] - Utility functions (hashing, time)

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod storage;
pub mod util;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use storage::{EngineStorage, WaitPolicy};
