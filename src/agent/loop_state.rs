//! Agent loop state machine
//!
//! Pure bookkeeping for the perceive-decide-act-verify cycle: the current
//! stage, the counters and the limits. Every transition is a plain method
//! call so the rules can be tested without a browser or an oracle.

use crate::agent::result::AgentStatus;
use crate::core::config::AgentConfig;

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Termination {
    pub status: AgentStatus,
    /// Human-readable explanation
    pub reason: String,
}

/// Current stage of the loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStage {
    Observing,
    Deciding,
    Acting,
    Verifying,
    Done(Termination),
}

/// How an executed action turned out, as far as the counters care
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Succeeded,
    Failed,
    Stale,
}

/// Limits enforced by the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopLimits {
    pub max_steps: usize,
    pub max_decision_retries: usize,
    pub max_consecutive_errors: usize,
    pub max_consecutive_stale: usize,
}

impl From<&AgentConfig> for LoopLimits {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_steps: config.max_steps,
            max_decision_retries: config.max_decision_retries,
            max_consecutive_errors: config.max_consecutive_errors,
            max_consecutive_stale: config.max_consecutive_stale,
        }
    }
}

/// Stage and counters of one run
#[derive(Debug, Clone)]
pub struct LoopState {
    stage: LoopStage,
    limits: LoopLimits,
    /// Completed, non-stale cycles
    steps: usize,
    /// Invalid decisions in the current Deciding stage
    decision_failures: usize,
    /// Error outcomes, invalid decisions and failed observations in a row
    consecutive_errors: usize,
    /// Stale handles in a row
    consecutive_stale: usize,
}

impl LoopState {
    /// Start in Observing
    pub fn new(limits: LoopLimits) -> Self {
        let mut state = Self {
            stage: LoopStage::Observing,
            limits,
            steps: 0,
            decision_failures: 0,
            consecutive_errors: 0,
            consecutive_stale: 0,
        };
        if limits.max_steps == 0 {
            state.exhausted();
        }
        state
    }

    pub fn stage(&self) -> &LoopStage {
        &self.stage
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn decision_failures(&self) -> usize {
        self.decision_failures
    }

    pub fn consecutive_errors(&self) -> usize {
        self.consecutive_errors
    }

    pub fn consecutive_stale(&self) -> usize {
        self.consecutive_stale
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.stage, LoopStage::Done(_))
    }

    /// How the run ended, once it has
    pub fn termination(&self) -> Option<&Termination> {
        match &self.stage {
            LoopStage::Done(termination) => Some(termination),
            _ => None,
        }
    }

    /// A fresh snapshot was captured
    pub fn observed(&mut self) -> &LoopStage {
        self.advance(LoopStage::Deciding)
    }

    /// Capturing a snapshot failed; counted as an error, not a step
    pub fn observation_failed(&mut self, detail: &str) -> &LoopStage {
        self.consecutive_errors += 1;
        if self.consecutive_errors >= self.limits.max_consecutive_errors {
            return self.fail(format!(
                "{} consecutive errors, last: {}",
                self.consecutive_errors, detail
            ));
        }
        self.advance(LoopStage::Observing)
    }

    /// The oracle's reply was rejected; retry against the same snapshot
    pub fn decision_rejected(&mut self, detail: &str) -> &LoopStage {
        self.decision_failures += 1;
        self.consecutive_errors += 1;
        if self.decision_failures >= self.limits.max_decision_retries {
            return self.fail(format!(
                "no valid decision after {} attempts, last: {}",
                self.decision_failures, detail
            ));
        }
        if self.consecutive_errors >= self.limits.max_consecutive_errors {
            return self.fail(format!(
                "{} consecutive errors, last: {}",
                self.consecutive_errors, detail
            ));
        }
        self.advance(LoopStage::Deciding)
    }

    /// A valid proposal is ready to execute
    pub fn decision_accepted(&mut self) -> &LoopStage {
        self.decision_failures = 0;
        self.advance(LoopStage::Acting)
    }

    /// The executor returned
    pub fn acted(&mut self) -> &LoopStage {
        self.advance(LoopStage::Verifying)
    }

    /// Account for an executed action and pick the next stage
    pub fn verify(&mut self, verdict: Verdict) -> &LoopStage {
        match verdict {
            Verdict::Stale => {
                self.consecutive_stale += 1;
                if self.consecutive_stale >= self.limits.max_consecutive_stale {
                    return self.fail(format!(
                        "page kept changing: {} stale handles in a row",
                        self.consecutive_stale
                    ));
                }
                return self.advance(LoopStage::Observing);
            }
            Verdict::Succeeded => {
                self.consecutive_errors = 0;
            }
            Verdict::Failed => {
                self.consecutive_errors += 1;
            }
        }

        self.steps += 1;
        self.consecutive_stale = 0;

        if self.consecutive_errors >= self.limits.max_consecutive_errors {
            return self.fail(format!(
                "{} consecutive failed actions",
                self.consecutive_errors
            ));
        }
        if self.steps >= self.limits.max_steps {
            return self.exhausted();
        }
        self.advance(LoopStage::Observing)
    }

    /// The oracle declared the task finished
    pub fn finished(&mut self, summary: impl Into<String>) -> &LoopStage {
        self.steps += 1;
        self.terminate(AgentStatus::Completed, summary.into())
    }

    /// The oracle gave up
    pub fn aborted(&mut self, reason: impl Into<String>) -> &LoopStage {
        self.steps += 1;
        self.terminate(AgentStatus::Aborted, reason.into())
    }

    /// External cancellation
    pub fn cancelled(&mut self) -> &LoopStage {
        self.terminate(AgentStatus::Aborted, "cancelled".to_string())
    }

    /// Unrecoverable failure
    pub fn fail(&mut self, reason: impl Into<String>) -> &LoopStage {
        self.terminate(AgentStatus::FatalError, reason.into())
    }

    fn exhausted(&mut self) -> &LoopStage {
        let reason = format!("step limit of {} reached", self.limits.max_steps);
        self.terminate(AgentStatus::ExhaustedSteps, reason)
    }

    fn terminate(&mut self, status: AgentStatus, reason: String) -> &LoopStage {
        // The first terminal state wins
        if !self.is_terminal() {
            self.stage = LoopStage::Done(Termination { status, reason });
        }
        &self.stage
    }

    fn advance(&mut self, next: LoopStage) -> &LoopStage {
        if !self.is_terminal() {
            self.stage = next;
        }
        &self.stage
    }
}
