//! Terminal result of one agent run

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::agent::history::{HistoryEntry, Incident};

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Oracle declared the task finished
    Completed,
    /// Oracle gave up, or the run was cancelled
    Aborted,
    /// Step limit reached without finish or abort
    ExhaustedSteps,
    /// Retry or error limits exhausted, or an unrecoverable failure
    FatalError,
}

impl AgentStatus {
    /// Process exit code; zero only for a completed run
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed => 0,
            Self::FatalError => 1,
            Self::Aborted => 2,
            Self::ExhaustedSteps => 3,
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::ExhaustedSteps => "exhausted steps",
            Self::FatalError => "fatal error",
        };
        f.write_str(name)
    }
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub status: AgentStatus,
    /// Oracle summary, abort reason, or the explanation of the stop
    pub summary: String,
    /// Full step history
    pub history: Vec<HistoryEntry>,
    /// Recoverable events that were not steps
    pub incidents: Vec<Incident>,
    /// Counted cycles
    pub steps_taken: usize,
    /// The oracle's own success flag when it finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    pub duration_ms: u64,
}

impl AgentResult {
    /// Whether the run completed
    pub fn is_success(&self) -> bool {
        self.status == AgentStatus::Completed
    }

    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }

    /// History entries that targeted an element, in step order
    pub fn interacted_elements(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter().filter(|entry| entry.target.is_some())
    }
}
