//! Task status and progress updates.
//!
//! These messages are what a progress sink receives while a match job runs.
//! They serialize to the same JSON shape the task-status view consumes.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of one pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Step has started
    Started,
    /// Step is in progress (per-frame updates)
    Running,
    /// Step finished successfully
    Finished,
    /// Step failed; the update carries the error
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Started => "STARTED",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Finished => "FINISHED",
            TaskStatus::Failed => "FAILED",
        }
    }

    /// Check if this is a terminal state (no more updates expected for the step).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One progress report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProgressUpdate {
    /// Human readable step name ("Sorting videos", "Mixing videos", ...)
    pub step: String,
    /// Step status
    pub status: TaskStatus,
    /// Overall progress (0-100)
    pub percent: u8,
    /// Error message when `status` is `Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressUpdate {
    pub fn new(step: impl Into<String>, status: TaskStatus, percent: u8) -> Self {
        Self {
            step: step.into(),
            status,
            percent: percent.min(100),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(step: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(step, TaskStatus::Failed, 0)
        }
    }
}

/// Map a step-local percentage into an overall `[start, end]` band.
///
/// The mixer reports 0-100 for its own loop; the job reports it as 30-80.
pub fn scale_percent(start: u8, end: u8, step_percent: u8) -> u8 {
    let step_percent = step_percent.min(100) as f64;
    let span = end.saturating_sub(start) as f64;
    (start as f64 + span * step_percent / 100.0).round() as u8
}
