//! Migration phases and run reports.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::change::Change;
use crate::error::{MigrateError, Result};

/// Which part of the plan a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationPhase {
    /// Changes safe to apply before new application code rolls out.
    Pre,
    /// Everything outstanding, deferred foreign keys included.
    Post,
    /// Everything in one pass.
    #[default]
    Full,
}

impl MigrationPhase {
    /// True if this phase executes `change`.
    pub fn includes(&self, change: &Change) -> bool {
        match self {
            MigrationPhase::Pre => !change.post_migrate_only,
            MigrationPhase::Post | MigrationPhase::Full => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationPhase::Pre => "pre",
            MigrationPhase::Post => "post",
            MigrationPhase::Full => "full",
        }
    }
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationPhase {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pre" => Ok(MigrationPhase::Pre),
            "post" => Ok(MigrationPhase::Post),
            "full" => Ok(MigrationPhase::Full),
            other => Err(MigrateError::Config(format!(
                "Unknown migration phase: '{}'. Expected pre, post or full",
                other
            ))),
        }
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Unique run identifier.
    pub run_id: String,

    pub phase: MigrationPhase,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Changes computed by the comparator, after condition evaluation.
    pub changes_planned: usize,

    /// Changes executed.
    pub changes_applied: usize,

    /// Changes left for the post-migrate phase.
    pub changes_deferred: usize,

    /// Executed DDL, in order.
    pub statements: Vec<String>,

    /// True if another instance held the migration lock and this run did nothing.
    pub skipped_locked: bool,
}

impl MigrationReport {
    pub(crate) fn start(run_id: String, phase: MigrationPhase) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            phase,
            started_at: now,
            completed_at: now,
            duration_seconds: 0.0,
            changes_planned: 0,
            changes_applied: 0,
            changes_deferred: 0,
            statements: Vec::new(),
            skipped_locked: false,
        }
    }

    pub(crate) fn finish(mut self) -> Self {
        self.completed_at = Utc::now();
        self.duration_seconds =
            (self.completed_at - self.started_at).num_milliseconds() as f64 / 1000.0;
        self
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
