use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Idle,
    Running,
    Paused,
    Stopped,
    Completed,
}

impl RunStatus {
    /// A run loop owns the session in these states.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    pub fn can_start(self) -> bool {
        matches!(self, Self::Idle | Self::Stopped | Self::Completed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Stopped => write!(f, "stopped"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Mutable state scoped to one run. `used` mirrors every value ever placed in
/// `names` since the run started, including names superseded by a regenerate.
#[derive(Debug, Default)]
pub struct RunSession {
    pub run_id: Option<String>,
    pub processed: usize,
    pub total: usize,
    pub names: BTreeMap<usize, String>,
    pub used: HashSet<String>,
}

impl RunSession {
    pub fn reset(&mut self, run_id: String, total: usize) {
        self.run_id = Some(run_id);
        self.processed = 0;
        self.total = total;
        self.names.clear();
        self.used.clear();
    }

    pub fn clear(&mut self, total: usize) {
        self.run_id = None;
        self.processed = 0;
        self.total = total;
        self.names.clear();
        self.used.clear();
    }

    pub fn percent(&self) -> usize {
        phase_percent(self.processed, self.total)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: Option<String>,
    pub status: RunStatus,
    pub processed: usize,
    pub total: usize,
    pub percent: usize,
    pub names: BTreeMap<usize, String>,
}

pub fn phase_percent(processed: usize, total: usize) -> usize {
    if total == 0 {
        return 0;
    }
    ((processed as f64 / total as f64) * 100.0)
        .round()
        .clamp(0.0, 100.0) as usize
}
