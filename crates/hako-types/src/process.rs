//! Process identification and lifecycle types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::result::ExecResult;

/// Unique identifier for a spawned process.
///
/// Pids are positive, monotonically increasing, and never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Pid(pub u64);

impl Pid {
    /// Pid 0 is reserved for the sandbox itself; spawned processes start at 1.
    pub const SANDBOX: Pid = Pid(0);
}

impl std::fmt::Display for Pid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a spawned process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    /// Inserted into the table, worker not yet running.
    Starting,
    /// Worker is evaluating the fragment.
    Running,
    /// Worker finished: result and end time are set.
    Exited,
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessState::Starting => write!(f, "Starting"),
            ProcessState::Running => write!(f, "Running"),
            ProcessState::Exited => write!(f, "Exited"),
        }
    }
}

/// Point-in-time snapshot of one process, as returned by `Status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStatus {
    /// The process identifier.
    pub pid: Pid,
    /// Current lifecycle state.
    pub state: ProcessState,
    /// The result, set exactly once when the process exits.
    pub result: Option<ExecResult>,
    /// When the fragment was submitted.
    pub started_at: DateTime<Utc>,
    /// When the worker finished, None until exited.
    pub finished_at: Option<DateTime<Utc>>,
}
