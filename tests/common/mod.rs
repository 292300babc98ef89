#![allow(dead_code)]

use issue_engine::storage::EngineStorage;
use std::sync::Once;
use tempfile::TempDir;

pub mod fixtures;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        issue_engine::logging::init_test_logging();
    });
}

pub fn test_db() -> EngineStorage {
    init_test_logging();
    EngineStorage::open_memory().expect("Failed to create test database")
}

pub fn test_db_with_dir() -> (EngineStorage, TempDir) {
    init_test_logging();
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = dir.path().join("engine.db");
    let storage = EngineStorage::open(&db_path).expect("Failed to create test database");
    (storage, dir)
}
