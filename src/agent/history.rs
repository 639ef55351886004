//! History store
//!
//! Append-only record of every counted step, plus a separate incident log
//! for recoverable events that are not steps (stale handles, rejected
//! decisions, timeouts, failed observations). Nothing is ever mutated or
//! removed once appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::{ActionOutcome, ActionProposal, ElementDescriptor, PilotError};

/// One counted step of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Position in the history; assigned by the store
    pub step_index: usize,
    /// One-line description of the page the decision was made on
    pub snapshot_summary: String,
    /// Action taken; `None` only for the fatal terminal record
    pub proposal: Option<ActionProposal>,
    pub outcome: ActionOutcome,
    /// Oracle's stated reasoning
    pub rationale: String,
    /// Element the action targeted, as it was described at the time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<ElementDescriptor>,
    pub recorded_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Compact line for oracle prompts and reports
    pub fn line(&self) -> String {
        let action = match &self.proposal {
            Some(proposal) => proposal.to_string(),
            None => "fatal".to_string(),
        };
        match &self.target {
            Some(target) => format!(
                "{}. {} on {} -> {}",
                self.step_index + 1,
                action,
                target,
                self.outcome
            ),
            None => format!("{}. {} -> {}", self.step_index + 1, action, self.outcome),
        }
    }
}

/// Category of a recoverable event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    StaleHandle,
    DecisionInvalid,
    Timeout,
    ObservationFailed,
}

impl fmt::Display for IncidentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StaleHandle => "stale handle",
            Self::DecisionInvalid => "invalid decision",
            Self::Timeout => "timeout",
            Self::ObservationFailed => "observation failed",
        };
        f.write_str(name)
    }
}

/// A recoverable event absorbed by the loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub kind: IncidentKind,
    /// Number of steps recorded when the incident happened
    pub after_step: usize,
    pub detail: String,
    pub at: DateTime<Utc>,
}

/// Append-only step history and incident log
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
    incidents: Vec<Incident>,
}

impl History {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step and return its index
    pub fn record(
        &mut self,
        snapshot_summary: impl Into<String>,
        proposal: ActionProposal,
        outcome: ActionOutcome,
        rationale: impl Into<String>,
        target: Option<ElementDescriptor>,
    ) -> usize {
        self.push(HistoryEntry {
            step_index: self.entries.len(),
            snapshot_summary: snapshot_summary.into(),
            proposal: Some(proposal),
            outcome,
            rationale: rationale.into(),
            target,
            recorded_at: Utc::now(),
        })
    }

    /// Append the terminal record of a fatal stop
    pub fn record_fatal(&mut self, snapshot_summary: impl Into<String>, error: &PilotError) -> usize {
        self.push(HistoryEntry {
            step_index: self.entries.len(),
            snapshot_summary: snapshot_summary.into(),
            proposal: None,
            outcome: ActionOutcome::error(error.to_string()),
            rationale: String::new(),
            target: None,
            recorded_at: Utc::now(),
        })
    }

    fn push(&mut self, entry: HistoryEntry) -> usize {
        let index = entry.step_index;
        self.entries.push(entry);
        index
    }

    /// Log a recoverable event
    pub fn incident(&mut self, kind: IncidentKind, detail: impl Into<String>) {
        self.incidents.push(Incident {
            kind,
            after_step: self.entries.len(),
            detail: detail.into(),
            at: Utc::now(),
        });
    }

    /// The last `n` entries, oldest first
    pub fn window(&self, n: usize) -> &[HistoryEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    /// All entries in step order
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// All incidents in the order they happened
    pub fn incidents(&self) -> &[Incident] {
        &self.incidents
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Split into entries and incidents
    pub fn into_parts(self) -> (Vec<HistoryEntry>, Vec<Incident>) {
        (self.entries, self.incidents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ElementHandle, ObservedEffect};

    fn click(n: u32) -> ActionProposal {
        ActionProposal::Click {
            handle: ElementHandle(n),
        }
    }

    #[test]
    fn test_step_index_is_position() {
        let mut history = History::new();
        let ok = ActionOutcome::success(ObservedEffect::DomChanged);

        assert_eq!(history.record("page", click(1), ok.clone(), "first", None), 0);
        assert_eq!(history.record("page", click(2), ok, "second", None), 1);
        let fatal = PilotError::Fatal("too many errors".into());
        assert_eq!(history.record_fatal("page", &fatal), 2);

        let indices: Vec<usize> = history.entries().iter().map(|e| e.step_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(history.entries()[2].proposal.is_none());
        assert_eq!(
            history.entries()[2].outcome.error_detail.as_deref(),
            Some("Fatal error: too many errors")
        );
    }

    #[test]
    fn test_window() {
        let mut history = History::new();
        for i in 0..5 {
            history.record(
                "page",
                click(i),
                ActionOutcome::success(ObservedEffect::NoVisibleChange),
                "",
                None,
            );
        }

        let window = history.window(2);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].step_index, 3);
        assert_eq!(history.window(10).len(), 5);
        assert!(history.window(0).is_empty());
    }

    #[test]
    fn test_incidents_do_not_add_steps() {
        let mut history = History::new();
        history.incident(IncidentKind::StaleHandle, "[3] vanished");
        history.record(
            "page",
            click(0),
            ActionOutcome::success(ObservedEffect::DomChanged),
            "",
            None,
        );
        history.incident(IncidentKind::Timeout, "oracle call timed out after 30s");

        assert_eq!(history.len(), 1);
        assert_eq!(history.incidents().len(), 2);
        assert_eq!(history.incidents()[0].after_step, 0);
        assert_eq!(history.incidents()[1].after_step, 1);
    }

    #[test]
    fn test_entry_line() {
        let mut history = History::new();
        history.record(
            "page",
            click(3),
            ActionOutcome::error("element [3] is disabled"),
            "",
            None,
        );
        assert_eq!(
            history.entries()[0].line(),
            "1. click(3) -> error: element [3] is disabled"
        );
    }
}
