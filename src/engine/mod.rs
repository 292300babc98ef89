//! Issue lifecycle engine.
//!
//! The engine layers domain behavior on top of the storage module:
//!
//! - [`lifecycle`] - Guarded state transitions, merging, and ingestion
//! - [`stats`] - On-demand histogram aggregation over the commit scope
//! - [`classify`] - Facet derivation, status groups, and listing
//! - [`association`] - The append-only result-to-issue log and cascades

pub mod association;
pub mod classify;
pub mod lifecycle;
pub mod stats;

pub use classify::{ListFilters, ListParams, Sort, SortDirection, SortField, StatusGroup};
pub use stats::StatsFilter;
