//! Engine configuration.
//!
//! Sources and precedence (highest wins):
//! 1. Environment variables (`ISSUE_ENGINE_*`)
//! 2. Config file (JSON)
//! 3. Defaults
//!
//! All time windows live here. The listing/classification layers take the
//! config by reference so the "new issue" window is one value everywhere.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Default trailing window for `recent_count`, in days.
const DEFAULT_RECENT_WINDOW_DAYS: i64 = 7;
/// Default window during which an issue counts as "new", in days.
const DEFAULT_NEW_ISSUE_WINDOW_DAYS: i64 = 7;
/// Default lifetime of the escalation flag before it expires, in days.
const DEFAULT_ESCALATION_EXPIRY_DAYS: i64 = 3;
/// Default recent-occurrence count that flips an issue to escalating.
const DEFAULT_ESCALATION_THRESHOLD: i64 = 5;

/// Tunable windows and thresholds for classification and ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Trailing window (days) for the histogram's `recent_count`.
    pub recent_window_days: i64,
    /// Window (days) during which a created issue is classified as new.
    pub new_issue_window_days: i64,
    /// How long (days) an escalation flag stays live before it expires.
    pub escalation_expiry_days: i64,
    /// Recent occurrences within the recent window that trigger escalation.
    pub escalation_threshold: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            recent_window_days: DEFAULT_RECENT_WINDOW_DAYS,
            new_issue_window_days: DEFAULT_NEW_ISSUE_WINDOW_DAYS,
            escalation_expiry_days: DEFAULT_ESCALATION_EXPIRY_DAYS,
            escalation_threshold: DEFAULT_ESCALATION_THRESHOLD,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file, then apply env overrides.
    ///
    /// A missing file is not an error; defaults are used.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed,
    /// or if a value fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from defaults plus env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if an override fails validation.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        apply_override("ISSUE_ENGINE_RECENT_WINDOW_DAYS", &mut self.recent_window_days);
        apply_override(
            "ISSUE_ENGINE_NEW_ISSUE_WINDOW_DAYS",
            &mut self.new_issue_window_days,
        );
        apply_override(
            "ISSUE_ENGINE_ESCALATION_EXPIRY_DAYS",
            &mut self.escalation_expiry_days,
        );
        apply_override(
            "ISSUE_ENGINE_ESCALATION_THRESHOLD",
            &mut self.escalation_threshold,
        );
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("recent_window_days", self.recent_window_days),
            ("new_issue_window_days", self.new_issue_window_days),
            ("escalation_expiry_days", self.escalation_expiry_days),
            ("escalation_threshold", self.escalation_threshold),
        ] {
            if value <= 0 {
                return Err(EngineError::Config(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        Ok(())
    }
}

fn apply_override(var: &str, slot: &mut i64) {
    if let Ok(value) = env::var(var) {
        if let Ok(parsed) = value.trim().parse() {
            *slot = parsed;
        }
    }
}
