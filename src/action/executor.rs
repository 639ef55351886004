//! Action executor
//!
//! Runs one validated proposal against the browser and reports what
//! happened. It never reads or writes history; the agent loop does that.

use std::time::Duration;
use tracing::debug;

use crate::browser::{Browser, ElementProbe, PageMetadata};
use crate::core::{
    ActionOutcome, ActionProposal, Config, ElementHandle, ObservedEffect, PilotError, Result,
    ScrollDirection,
};
use crate::perception::{IndexedElement, Snapshot};

/// What executing a proposal produced
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    /// A browser operation ran (successfully or not)
    Completed(ActionOutcome),
    /// The target element no longer matches the snapshot; nothing was done
    Stale(ElementHandle),
    /// Oracle declared the task finished
    Finished { success: bool, summary: String },
    /// Oracle gave up
    Aborted { reason: String },
}

/// Translates proposals into browser operations
#[derive(Debug, Clone)]
pub struct ActionExecutor {
    /// Upper bound for one proposal's browser work
    call_timeout: Duration,
    /// Wait after acting before measuring the effect
    settle: Duration,
}

impl ActionExecutor {
    /// Create an executor
    pub fn new(call_timeout: Duration, settle: Duration) -> Self {
        Self {
            call_timeout,
            settle,
        }
    }

    /// Create an executor from configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Duration::from_secs(config.agent.call_timeout_secs),
            Duration::from_millis(config.browser.settle_ms),
        )
    }

    /// Execute a proposal that was derived from `snapshot`.
    ///
    /// Browser failures and timeouts become error outcomes; they are never
    /// returned as `Err`.
    pub async fn execute(
        &self,
        browser: &dyn Browser,
        proposal: &ActionProposal,
        snapshot: &Snapshot,
    ) -> Execution {
        match proposal {
            ActionProposal::Finish { success, summary } => {
                return Execution::Finished {
                    success: *success,
                    summary: summary.clone(),
                }
            }
            ActionProposal::Abort { reason } => {
                return Execution::Aborted {
                    reason: reason.clone(),
                }
            }
            _ => {}
        }

        let work = self.perform(browser, proposal, snapshot);
        match tokio::time::timeout(self.call_timeout, work).await {
            Ok(Ok(outcome)) => Execution::Completed(outcome),
            Ok(Err(PilotError::StaleHandle(handle))) => Execution::Stale(handle),
            Ok(Err(e)) => Execution::Completed(ActionOutcome::error(e.to_string())),
            Err(_) => Execution::Completed(ActionOutcome::error(
                PilotError::timeout(proposal.name(), self.call_timeout.as_secs()).to_string(),
            )),
        }
    }

    async fn perform(
        &self,
        browser: &dyn Browser,
        proposal: &ActionProposal,
        snapshot: &Snapshot,
    ) -> Result<ActionOutcome> {
        debug!(action = %proposal, "executing");
        match proposal {
            ActionProposal::Click { handle } => self.click(browser, *handle, snapshot).await,
            ActionProposal::Type { handle, text } => {
                self.type_text(browser, *handle, text, snapshot).await
            }
            ActionProposal::Navigate { url } => self.navigate(browser, url).await,
            ActionProposal::Scroll { direction } => self.scroll(browser, *direction).await,
            ActionProposal::Finish { .. } | ActionProposal::Abort { .. } => Err(PilotError::execution(
                "terminal proposals have no browser operation",
            )),
        }
    }

    async fn click(
        &self,
        browser: &dyn Browser,
        handle: ElementHandle,
        snapshot: &Snapshot,
    ) -> Result<ActionOutcome> {
        let (element, _) = self.resolve(browser, handle, snapshot).await?;
        if !element.descriptor.enabled {
            return Ok(ActionOutcome::error(format!(
                "element {} is disabled",
                handle
            )));
        }

        let before = browser.page_metadata().await?;
        browser
            .click(&element.locator)
            .await
            .map_err(|e| PilotError::execution(format!("click {} failed: {}", handle, e)))?;
        self.settle().await;
        let after = browser.page_metadata().await?;

        Ok(classify_effect(&before, &after))
    }

    async fn type_text(
        &self,
        browser: &dyn Browser,
        handle: ElementHandle,
        text: &str,
        snapshot: &Snapshot,
    ) -> Result<ActionOutcome> {
        let (element, probe) = self.resolve(browser, handle, snapshot).await?;
        if !element.descriptor.enabled {
            return Ok(ActionOutcome::error(format!(
                "element {} is disabled",
                handle
            )));
        }

        let before = browser.page_metadata().await?;
        browser
            .type_text(&element.locator, text)
            .await
            .map_err(|e| PilotError::execution(format!("type into {} failed: {}", handle, e)))?;
        self.settle().await;

        let value_after = browser
            .probe(&element.locator)
            .await?
            .and_then(|p| p.value);
        let value_changed = value_after != probe.value;
        let after = browser.page_metadata().await?;

        let mut outcome = classify_effect(&before, &after);
        if value_changed && outcome.observed_effect == ObservedEffect::NoVisibleChange {
            outcome.observed_effect = ObservedEffect::DomChanged;
        }
        Ok(outcome.with_value_changed(value_changed))
    }

    async fn navigate(&self, browser: &dyn Browser, url: &str) -> Result<ActionOutcome> {
        if let Err(e) = browser.navigate(url).await {
            return Ok(ActionOutcome::error(format!(
                "navigation to {} failed: {}",
                url, e
            )));
        }
        let after = browser.page_metadata().await?;
        Ok(ActionOutcome::success(ObservedEffect::Navigated).with_url(after.url))
    }

    async fn scroll(
        &self,
        browser: &dyn Browser,
        direction: ScrollDirection,
    ) -> Result<ActionOutcome> {
        let before = browser.page_metadata().await?;
        browser.scroll(direction).await?;
        self.settle().await;
        let after = browser.page_metadata().await?;

        // At a scroll boundary the viewport simply does not move
        if (after.scroll.y - before.scroll.y).abs() < 1.0 {
            return Ok(ActionOutcome::success(ObservedEffect::NoVisibleChange));
        }
        Ok(ActionOutcome::success(ObservedEffect::DomChanged))
    }

    /// Resolve a handle against its snapshot and confirm the live element
    /// still matches
    async fn resolve<'s>(
        &self,
        browser: &dyn Browser,
        handle: ElementHandle,
        snapshot: &'s Snapshot,
    ) -> Result<(&'s IndexedElement, ElementProbe)> {
        let element = snapshot.element(handle).ok_or_else(|| {
            PilotError::execution(format!("handle {} is not part of the snapshot", handle))
        })?;

        match browser.probe(&element.locator).await? {
            Some(probe) if element.fingerprint.matches(&probe) => Ok((element, probe)),
            _ => Err(PilotError::StaleHandle(handle)),
        }
    }

    async fn settle(&self) {
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }
    }
}

/// Classify an action's effect from page metadata before and after
fn classify_effect(before: &PageMetadata, after: &PageMetadata) -> ActionOutcome {
    if after.url != before.url {
        ActionOutcome::success(ObservedEffect::Navigated).with_url(after.url.clone())
    } else if after.dom_signature != before.dom_signature {
        ActionOutcome::success(ObservedEffect::DomChanged)
    } else {
        ActionOutcome::success(ObservedEffect::NoVisibleChange)
    }
}
