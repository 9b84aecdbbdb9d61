use serde::{Deserialize, Serialize};

use crate::state::RunStatus;

/// Result of one pass of the rename engine over a single file. A naming
/// failure is absorbed into the fallback token and reported in `naming_error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameOutcome {
    pub index: usize,
    pub final_name: String,
    pub naming_error: Option<String>,
}

impl RenameOutcome {
    pub fn is_fallback(&self) -> bool {
        self.naming_error.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Started {
        run_id: String,
        total: usize,
    },
    FileRenamed {
        outcome: RenameOutcome,
        processed: usize,
        total: usize,
        percent: usize,
    },
    Regenerated {
        outcome: RenameOutcome,
    },
    Paused,
    Resumed,
    StopRequested,
    Stopped {
        processed: usize,
        total: usize,
    },
    Completed {
        processed: usize,
        total: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub status: RunStatus,
    pub processed: usize,
    pub total: usize,
    pub fallbacks: usize,
    pub started_at: String,
    pub finished_at: String,
}
