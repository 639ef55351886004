//! Agent loop integration tests against in-memory fakes

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use browser_pilot::agent::{
    Agent, AgentResult, AgentStatus, DecisionOracle, IncidentKind, OracleRequest,
};
use browser_pilot::core::{Config, ElementHandle, ObservedEffect, PilotError, Result, Task};
use common::{click, element, finish, form_page, test_config, type_into, FakeBrowser, ScriptedOracle};
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

const URL: &str = "https://app.test/";

async fn run(browser: &Arc<FakeBrowser>, oracle: ScriptedOracle, config: Config) -> AgentResult {
    let agent = assert_ok!(Agent::builder(Task::new("Submit the form"))
        .browser(browser.clone())
        .oracle(oracle)
        .config(config)
        .build());
    agent.run().await
}

fn fake() -> Arc<FakeBrowser> {
    Arc::new(FakeBrowser::new(URL, form_page()))
}

/// Form page plus a disabled [4] button "Archive"
fn fake_with_disabled() -> Arc<FakeBrowser> {
    let mut elements = form_page();
    let mut archive = element("#archive", "button", "Archive", 170.0);
    archive.disabled = true;
    elements.push(archive);
    Arc::new(FakeBrowser::new(URL, elements))
}

#[tokio::test]
async fn test_click_submit_then_finish() {
    let browser = fake();
    browser.on_click("#submit", |page| {
        page.text.push(browser_pilot::browser::TextBlock {
            text: "Thanks!".to_string(),
            top: 200.0,
        });
        page.signature += 1;
    });
    let oracle = ScriptedOracle::new(vec![click(3), finish("Submitted")]);

    let result = run(&browser, oracle, test_config()).await;

    assert_eq!(result.status, AgentStatus::Completed);
    assert_eq!(result.summary, "Submitted");
    assert_eq!(result.history.len(), 2);
    assert_eq!(result.steps_taken, 2);
    assert_eq!(result.reported_success, Some(true));
    assert_eq!(result.exit_code(), 0);
    assert_eq!(browser.clicks(), vec!["#submit".to_string()]);

    let first = &result.history[0];
    assert_eq!(first.outcome.observed_effect, ObservedEffect::DomChanged);
    assert_eq!(first.target.as_ref().map(|t| t.label.as_str()), Some("Submit"));
    assert_eq!(first.proposal.as_ref().and_then(|p| p.handle()), Some(ElementHandle(3)));
}

#[tokio::test]
async fn test_unknown_handle_three_times_is_fatal() {
    let browser = fake();
    let oracle = ScriptedOracle::new(vec![click(99); 3]);
    let prompts = oracle.prompts();

    let result = run(&browser, oracle, test_config()).await;

    assert_eq!(result.status, AgentStatus::FatalError);
    assert!(result.summary.contains("3 attempts"), "{}", result.summary);
    assert_ne!(result.exit_code(), 0);
    assert!(browser.clicks().is_empty());

    // Only the fatal record
    assert_eq!(result.history.len(), 1);
    assert!(result.history[0].proposal.is_none());

    assert_eq!(result.incidents.len(), 3);
    assert!(result
        .incidents
        .iter()
        .all(|i| i.kind == IncidentKind::DecisionInvalid));

    let prompts = prompts.lock().unwrap();
    assert_eq!(prompts.len(), 3);
    assert!(!prompts[0].contains("rejected"));
    assert!(prompts[1].contains("previous reply was rejected"));
    assert!(prompts[1].contains("[99]"));
}

#[tokio::test]
async fn test_removed_element_is_stale_and_reobserved() {
    let browser = fake();
    browser.remove_before_next_probe("#submit");
    let oracle = ScriptedOracle::new(vec![click(3), finish("Nothing to submit")]);
    let prompts = oracle.prompts();

    let result = run(&browser, oracle, test_config()).await;

    assert_eq!(result.status, AgentStatus::Completed);
    assert!(browser.clicks().is_empty());

    // The stale attempt is not a step
    assert_eq!(result.steps_taken, 1);
    assert_eq!(result.history.len(), 1);
    assert_eq!(result.incidents.len(), 1);
    assert_eq!(result.incidents[0].kind, IncidentKind::StaleHandle);

    let prompts = prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("[3] button \"Submit\""));
    assert!(!prompts[1].contains("[3]"));
}

#[tokio::test]
async fn test_handles_renumber_after_stale() {
    let browser = fake();
    browser.remove_before_next_probe("#cancel");
    let oracle = ScriptedOracle::new(vec![click(2), click(2), finish("Submitted")]);

    let result = run(&browser, oracle, test_config()).await;

    assert_eq!(result.status, AgentStatus::Completed);
    // After re-observing, [2] is the Submit button
    assert_eq!(browser.clicks(), vec!["#submit".to_string()]);
    assert_eq!(result.history.len(), result.steps_taken);
    assert_eq!(result.history.len(), 2);
    assert_eq!(result.incidents.len(), 1);
}

#[tokio::test]
async fn test_step_limit_exhausts_after_exactly_n() {
    let browser = fake();
    let oracle = ScriptedOracle::silent()
        .repeating(r#"{"rationale": "look around", "action": {"type": "scroll", "direction": "down"}}"#);
    let prompts = oracle.prompts();
    let mut config = test_config();
    config.agent.max_steps = 4;

    let result = run(&browser, oracle, config).await;

    assert_eq!(result.status, AgentStatus::ExhaustedSteps);
    assert_eq!(result.steps_taken, 4);
    assert_eq!(result.history.len(), 4);
    assert_eq!(prompts.lock().unwrap().len(), 4);
    assert_ne!(result.exit_code(), 0);
    // 2000px page, 720px viewport: the fourth scroll is at the bottom
    assert_eq!(
        result.history[3].outcome.observed_effect,
        ObservedEffect::NoVisibleChange
    );
}

#[tokio::test]
async fn test_success_resets_consecutive_errors() {
    let browser = fake_with_disabled();
    let mut script = vec![click(4); 4];
    script.push(click(2));
    script.extend(vec![click(4); 4]);
    script.push(finish("Done"));
    let oracle = ScriptedOracle::new(script);

    let result = run(&browser, oracle, test_config()).await;

    assert_eq!(result.status, AgentStatus::Completed);
    assert_eq!(result.history.len(), 10);
    assert_eq!(
        result.history.iter().filter(|e| !e.outcome.succeeded).count(),
        8
    );
}

#[tokio::test]
async fn test_consecutive_errors_are_fatal() {
    let browser = fake_with_disabled();
    let oracle = ScriptedOracle::new(vec![click(4); 5]);

    let result = run(&browser, oracle, test_config()).await;

    assert_eq!(result.status, AgentStatus::FatalError);
    assert_eq!(result.steps_taken, 5);
    assert_eq!(result.history.len(), 6);
    assert!(result.history[5].proposal.is_none());
    assert!(browser.clicks().is_empty());
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let browser = fake();
    let oracle = ScriptedOracle::new(vec![click(3)]);
    let prompts = oracle.prompts();
    let token = CancellationToken::new();
    token.cancel();

    let agent = assert_ok!(Agent::builder(Task::new("Submit the form"))
        .browser(browser.clone())
        .oracle(oracle)
        .config(test_config())
        .cancellation(token)
        .build());
    let result = agent.run().await;

    assert_eq!(result.status, AgentStatus::Aborted);
    assert_eq!(result.summary, "cancelled");
    assert!(result.history.is_empty());
    assert!(prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_is_checked_between_stages() {
    let browser = fake();
    let token = CancellationToken::new();
    let oracle = ScriptedOracle::new(vec![click(3)]).cancelling(token.clone());

    let agent = assert_ok!(Agent::builder(Task::new("Submit the form"))
        .browser(browser.clone())
        .oracle(oracle)
        .config(test_config())
        .cancellation(token)
        .build());
    let result = agent.run().await;

    assert_eq!(result.status, AgentStatus::Aborted);
    assert_eq!(result.summary, "cancelled");
    assert!(browser.clicks().is_empty());
}

#[tokio::test]
async fn test_type_records_value_change() {
    let browser = fake();
    let oracle = ScriptedOracle::new(vec![type_into(1, "Ada"), finish("Name entered")]);

    let result = run(&browser, oracle, test_config()).await;

    assert_eq!(result.status, AgentStatus::Completed);
    assert_eq!(
        browser.typed(),
        vec![("#name".to_string(), "Ada".to_string())]
    );
    let entry = &result.history[0];
    assert_eq!(entry.outcome.value_changed, Some(true));
    assert_eq!(entry.target.as_ref().map(|t| t.label.as_str()), Some("Name"));
    assert_eq!(result.interacted_elements().count(), 1);
}

#[tokio::test]
async fn test_relative_navigation() {
    let browser = fake();
    let oracle = ScriptedOracle::new(vec![
        r#"{"action": {"type": "navigate", "url": "/about"}}"#.to_string(),
        finish("Found it"),
    ]);

    let result = run(&browser, oracle, test_config()).await;

    assert_eq!(browser.navigations(), vec!["https://app.test/about".to_string()]);
    assert_eq!(
        result.history[0].outcome.url.as_deref(),
        Some("https://app.test/about")
    );
    assert_eq!(result.final_url.as_deref(), Some("https://app.test/about"));
}

#[tokio::test]
async fn test_failed_navigation_is_an_error_outcome() {
    let browser = fake();
    let oracle = ScriptedOracle::new(vec![
        r#"{"action": {"type": "navigate", "url": "https://unreachable.test/"}}"#.to_string(),
        finish("Gave up on that site"),
    ]);

    let result = run(&browser, oracle, test_config()).await;

    assert_eq!(result.status, AgentStatus::Completed);
    let outcome = &result.history[0].outcome;
    assert!(!outcome.succeeded);
    assert_eq!(outcome.observed_effect, ObservedEffect::Error);
}

#[tokio::test]
async fn test_start_url_is_opened_first() {
    let browser = fake();
    let oracle = ScriptedOracle::new(vec![finish("Looked")]);
    let mut config = test_config();
    config.browser.start_url = Some("https://app.test/start".to_string());

    let result = run(&browser, oracle, config).await;

    assert_eq!(result.status, AgentStatus::Completed);
    assert_eq!(browser.navigations(), vec!["https://app.test/start".to_string()]);
}

#[tokio::test]
async fn test_observation_failures_are_incidents() {
    let browser = fake();
    browser.fail_metadata(2);
    let oracle = ScriptedOracle::new(vec![finish("Done")]);

    let result = run(&browser, oracle, test_config()).await;

    assert_eq!(result.status, AgentStatus::Completed);
    assert_eq!(result.steps_taken, 1);
    assert_eq!(
        result
            .incidents
            .iter()
            .filter(|i| i.kind == IncidentKind::ObservationFailed)
            .count(),
        2
    );
}

#[tokio::test]
async fn test_observation_failures_hit_error_limit() {
    let browser = fake();
    browser.fail_metadata(5);
    let oracle = ScriptedOracle::new(vec![finish("Done")]);
    let prompts = oracle.prompts();

    let result = run(&browser, oracle, test_config()).await;

    assert_eq!(result.status, AgentStatus::FatalError);
    assert_eq!(result.history.len(), 1);
    assert!(prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_abort() {
    let browser = fake();
    let oracle = ScriptedOracle::new(vec![
        r#"{"rationale": "login wall", "action": {"type": "abort", "reason": "login required"}}"#
            .to_string(),
    ]);

    let result = run(&browser, oracle, test_config()).await;

    assert_eq!(result.status, AgentStatus::Aborted);
    assert_eq!(result.summary, "login required");
    assert_eq!(result.history.len(), 1);
    assert_ne!(result.exit_code(), 0);
}

#[test]
fn test_builder_requires_browser_and_oracle() {
    let missing_browser = Agent::builder(Task::new("x"))
        .oracle(ScriptedOracle::silent())
        .build();
    assert!(matches!(missing_browser, Err(PilotError::Config(_))));

    let missing_oracle = Agent::builder(Task::new("x")).browser(fake()).build();
    assert!(matches!(missing_oracle, Err(PilotError::Config(_))));

    let mut config = test_config();
    config.agent.max_steps = 0;
    let invalid = Agent::builder(Task::new("x"))
        .browser(fake())
        .oracle(ScriptedOracle::silent())
        .config(config)
        .build();
    assert!(matches!(invalid, Err(PilotError::Config(_))));
}

#[tokio::test(start_paused = true)]
async fn test_oracle_timeouts_count_as_rejections() {
    let browser = fake();
    let oracle = ScriptedOracle::silent().hanging();
    let prompts = oracle.prompts();

    let result = run(&browser, oracle, test_config()).await;

    assert_eq!(result.status, AgentStatus::FatalError);
    assert!(result.summary.contains("3 attempts"), "{}", result.summary);
    assert!(result.summary.contains("timed out after 5s"), "{}", result.summary);
    assert_eq!(result.steps_taken, 0);
    assert_eq!(prompts.lock().unwrap().len(), 3);
    assert_eq!(result.incidents.len(), 3);
    assert!(result
        .incidents
        .iter()
        .all(|i| i.kind == IncidentKind::Timeout));
    assert!(browser.clicks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_hanging_click_becomes_error_outcome() {
    let browser = fake();
    browser.hang_clicks();
    let oracle = ScriptedOracle::silent().repeating(&click(3));

    let result = run(&browser, oracle, test_config()).await;

    assert_eq!(result.status, AgentStatus::FatalError);
    assert_eq!(result.steps_taken, 5);
    assert_eq!(result.history.len(), 6);
    for entry in &result.history[..5] {
        assert_eq!(entry.outcome.observed_effect, ObservedEffect::Error);
        let detail = entry.outcome.error_detail.as_deref().unwrap_or_default();
        assert!(detail.contains("timed out"), "{}", detail);
    }
    assert!(result.incidents.is_empty());
    assert!(browser.clicks().is_empty());
}

/// Oracle whose model was removed from the backend
struct UnknownModelOracle;

#[async_trait]
impl DecisionOracle for UnknownModelOracle {
    async fn consult(&self, _request: &OracleRequest<'_>) -> Result<String> {
        Err(PilotError::ModelNotFound("qwen3:8b".to_string()))
    }
}

#[tokio::test]
async fn test_missing_model_is_fatal_without_retries() {
    let browser = fake();
    let agent = assert_ok!(Agent::builder(Task::new("Submit the form"))
        .browser(browser.clone())
        .oracle(UnknownModelOracle)
        .config(test_config())
        .build());

    let result = agent.run().await;

    assert_eq!(result.status, AgentStatus::FatalError);
    assert!(result.summary.contains("qwen3:8b"), "{}", result.summary);
    assert!(result.incidents.is_empty());
    assert_eq!(result.history.len(), 1);
    let detail = result.history[0].outcome.error_detail.as_deref().unwrap_or_default();
    assert!(detail.starts_with("Fatal error: "), "{}", detail);
}
