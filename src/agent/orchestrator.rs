//! Agent orchestrator
//!
//! Drives the perceive-decide-act-verify loop: one snapshot, one decision,
//! one action, one verification per cycle, until a terminal state. The
//! browser and the decision adapter are injected; the loop owns the history.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::action::{ActionExecutor, Execution};
use crate::agent::history::{History, IncidentKind};
use crate::agent::loop_state::{LoopLimits, LoopStage, LoopState, Termination, Verdict};
use crate::agent::oracle::{
    Decision, DecisionAdapter, DecisionOracle, JsonDecisionAdapter, OracleRequest,
};
use crate::agent::result::{AgentResult, AgentStatus};
use crate::browser::Browser;
use crate::core::{ActionOutcome, Config, ObservedEffect, PilotError, Result, Task};
use crate::perception::{Snapshot, Snapshotter};

/// Autonomous browser agent for one task
pub struct Agent {
    task: Task,
    config: Config,
    browser: Arc<dyn Browser>,
    adapter: Box<dyn DecisionAdapter>,
    snapshotter: Snapshotter,
    executor: ActionExecutor,
    cancel: CancellationToken,
}

/// Builder for [`Agent`]
pub struct AgentBuilder {
    task: Task,
    config: Option<Config>,
    browser: Option<Arc<dyn Browser>>,
    adapter: Option<Box<dyn DecisionAdapter>>,
    cancel: Option<CancellationToken>,
}

impl AgentBuilder {
    /// Use this configuration instead of [`Config::default`]
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Browser session the agent acts on
    pub fn browser(mut self, browser: Arc<dyn Browser>) -> Self {
        self.browser = Some(browser);
        self
    }

    /// Decision adapter
    pub fn adapter(mut self, adapter: impl DecisionAdapter + 'static) -> Self {
        self.adapter = Some(Box::new(adapter));
        self
    }

    /// Oracle answering in the JSON action format
    pub fn oracle(self, oracle: impl DecisionOracle + 'static) -> Self {
        self.adapter(JsonDecisionAdapter::new(oracle))
    }

    /// Token that stops the run between stages
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn build(self) -> Result<Agent> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let browser = self
            .browser
            .ok_or_else(|| PilotError::config("agent requires a browser"))?;
        let adapter = self
            .adapter
            .ok_or_else(|| PilotError::config("agent requires a decision oracle"))?;

        Ok(Agent {
            snapshotter: Snapshotter::new(&config.snapshot),
            executor: ActionExecutor::from_config(&config),
            task: self.task,
            config,
            browser,
            adapter,
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}

/// Per-run scratch state carried between stages
#[derive(Default)]
struct Cycle {
    snapshot: Option<Snapshot>,
    decision: Option<Decision>,
    execution: Option<Execution>,
    feedback: Option<String>,
}

impl Agent {
    /// Start building an agent for a task
    pub fn builder(task: Task) -> AgentBuilder {
        AgentBuilder {
            task,
            config: None,
            browser: None,
            adapter: None,
            cancel: None,
        }
    }

    /// Run the loop to a terminal state
    pub async fn run(self) -> AgentResult {
        let started = Instant::now();
        let call_timeout = Duration::from_secs(self.config.agent.call_timeout_secs);
        let mut state = LoopState::new(LoopLimits::from(&self.config.agent));
        let mut history = History::new();
        let mut cycle = Cycle::default();
        let mut reported_success = None;

        info!(task = %self.task, max_steps = self.config.agent.max_steps, "agent started");

        if let Some(url) = &self.config.browser.start_url {
            self.open_start_url(url, call_timeout, &mut history).await;
        }

        let termination = loop {
            if self.cancel.is_cancelled() {
                state.cancelled();
            }

            match state.stage().clone() {
                LoopStage::Observing => {
                    self.observe(&mut state, &mut history, &mut cycle, call_timeout)
                        .await;
                }
                LoopStage::Deciding => {
                    self.decide(&mut state, &mut history, &mut cycle, call_timeout)
                        .await;
                }
                LoopStage::Acting => {
                    match (&cycle.snapshot, &cycle.decision) {
                        (Some(snapshot), Some(decision)) => {
                            let execution = self
                                .executor
                                .execute(self.browser.as_ref(), &decision.proposal, snapshot)
                                .await;
                            cycle.execution = Some(execution);
                            state.acted();
                        }
                        _ => {
                            state.fail("acting without a decision");
                        }
                    }
                }
                LoopStage::Verifying => {
                    if let Some(success) =
                        Self::verify(&mut state, &mut history, &mut cycle)
                    {
                        reported_success = Some(success);
                    }
                }
                LoopStage::Done(termination) => break termination,
            }
        };

        if termination.status == AgentStatus::FatalError {
            let page = cycle
                .snapshot
                .as_ref()
                .map(Snapshot::summary)
                .unwrap_or_default();
            history.record_fatal(page, &PilotError::Fatal(termination.reason.clone()));
        }

        let final_url = self.final_url(&cycle, call_timeout).await;
        self.finish(
            termination,
            history,
            state.steps(),
            reported_success,
            final_url,
            started,
        )
    }

    async fn open_start_url(&self, url: &str, call_timeout: Duration, history: &mut History) {
        info!(url, "opening start page");
        let detail = match tokio::time::timeout(call_timeout, self.browser.navigate(url)).await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => format!("could not open {}: {}", url, e),
            Err(_) => PilotError::timeout("start navigation", call_timeout.as_secs()).to_string(),
        };
        warn!(%detail, "start page failed, observing current page");
        history.incident(IncidentKind::ObservationFailed, detail);
    }

    async fn observe(
        &self,
        state: &mut LoopState,
        history: &mut History,
        cycle: &mut Cycle,
        call_timeout: Duration,
    ) {
        let capture = self.snapshotter.capture(self.browser.as_ref());
        match tokio::time::timeout(call_timeout, capture).await {
            Ok(Ok(snapshot)) => {
                debug!(page = %snapshot.summary(), step = state.steps(), "observed");
                cycle.snapshot = Some(snapshot);
                cycle.feedback = None;
                state.observed();
            }
            Ok(Err(e)) if !e.is_recoverable() => {
                state.fail(e.to_string());
            }
            Ok(Err(e)) => {
                let detail = e.to_string();
                warn!(%detail, "observation failed");
                history.incident(IncidentKind::ObservationFailed, detail.as_str());
                state.observation_failed(&detail);
            }
            Err(_) => {
                let detail =
                    PilotError::timeout("observation", call_timeout.as_secs()).to_string();
                warn!(%detail, "observation failed");
                history.incident(IncidentKind::Timeout, detail.as_str());
                state.observation_failed(&detail);
            }
        }
    }

    async fn decide(
        &self,
        state: &mut LoopState,
        history: &mut History,
        cycle: &mut Cycle,
        call_timeout: Duration,
    ) {
        let Some(snapshot) = cycle.snapshot.as_ref() else {
            state.fail("deciding without a snapshot");
            return;
        };

        let request = OracleRequest {
            task: &self.task,
            history: history.window(self.config.agent.history_window),
            snapshot,
            feedback: cycle.feedback.as_deref(),
        };
        let outcome = tokio::time::timeout(call_timeout, self.adapter.decide(&request)).await;

        let (kind, detail) = match outcome {
            Ok(Ok(decision)) => {
                info!(
                    step = state.steps() + 1,
                    action = %decision.proposal,
                    rationale = %decision.rationale,
                    "decided"
                );
                cycle.decision = Some(decision);
                state.decision_accepted();
                return;
            }
            Ok(Err(e)) if !e.is_recoverable() => {
                state.fail(e.to_string());
                return;
            }
            Ok(Err(e)) => (IncidentKind::DecisionInvalid, e.to_string()),
            Err(_) => (
                IncidentKind::Timeout,
                PilotError::timeout("oracle call", call_timeout.as_secs()).to_string(),
            ),
        };

        warn!(%detail, attempt = state.decision_failures() + 1, "decision rejected");
        history.incident(kind, detail.as_str());
        state.decision_rejected(&detail);
        cycle.feedback = Some(detail);
    }

    /// Record the executed action; returns the oracle's success flag on finish
    fn verify(state: &mut LoopState, history: &mut History, cycle: &mut Cycle) -> Option<bool> {
        let (Some(execution), Some(decision)) = (cycle.execution.take(), cycle.decision.take())
        else {
            state.fail("verifying without an executed action");
            return None;
        };
        let page = cycle
            .snapshot
            .as_ref()
            .map(Snapshot::summary)
            .unwrap_or_default();

        match execution {
            Execution::Completed(outcome) => {
                let verdict = if outcome.is_error() {
                    warn!(action = %decision.proposal, %outcome, "action failed");
                    Verdict::Failed
                } else {
                    info!(action = %decision.proposal, %outcome, "action completed");
                    Verdict::Succeeded
                };
                history.record(
                    page,
                    decision.proposal,
                    outcome,
                    decision.rationale,
                    decision.target,
                );
                state.verify(verdict);
                None
            }
            Execution::Stale(handle) => {
                let detail = PilotError::StaleHandle(handle).to_string();
                info!(%handle, "stale handle, re-observing");
                history.incident(IncidentKind::StaleHandle, detail);
                state.verify(Verdict::Stale);
                None
            }
            Execution::Finished { success, summary } => {
                info!(success, %summary, "oracle finished");
                history.record(
                    page,
                    decision.proposal,
                    ActionOutcome::success(ObservedEffect::NoVisibleChange),
                    decision.rationale,
                    None,
                );
                state.finished(summary);
                Some(success)
            }
            Execution::Aborted { reason } => {
                info!(%reason, "oracle aborted");
                history.record(
                    page,
                    decision.proposal,
                    ActionOutcome::success(ObservedEffect::NoVisibleChange),
                    decision.rationale,
                    None,
                );
                state.aborted(reason);
                None
            }
        }
    }

    async fn final_url(&self, cycle: &Cycle, call_timeout: Duration) -> Option<String> {
        match tokio::time::timeout(call_timeout, self.browser.page_metadata()).await {
            Ok(Ok(metadata)) if !metadata.url.is_empty() => Some(metadata.url),
            _ => cycle.snapshot.as_ref().map(|s| s.url.clone()),
        }
    }

    fn finish(
        &self,
        termination: Termination,
        history: History,
        steps_taken: usize,
        reported_success: Option<bool>,
        final_url: Option<String>,
        started: Instant,
    ) -> AgentResult {
        let Termination { status, reason } = termination;
        match status {
            AgentStatus::Completed => info!(steps = steps_taken, %reason, "agent completed"),
            _ => warn!(%status, steps = steps_taken, %reason, "agent stopped"),
        }

        let (history, incidents) = history.into_parts();
        AgentResult {
            status,
            summary: reason,
            history,
            incidents,
            steps_taken,
            reported_success,
            final_url,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}
