//! Decision oracle adapter
//!
//! The oracle is an external capability that reads the task, recent history
//! and the current snapshot and answers in text. The adapter is the only
//! place that writes the request or reads the reply: it turns the reply
//! into one [`ActionProposal`] validated against the snapshot, or rejects it
//! with [`PilotError::DecisionInvalid`].

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::agent::history::HistoryEntry;
use crate::core::{
    ActionProposal, ElementDescriptor, ElementHandle, Message, PilotError, Result,
    ScrollDirection, Task,
};
use crate::llm::{GenerateOptions, LLMProvider};
use crate::perception::{IndexedElement, Snapshot};

/// System prompt for model-backed oracles
pub const SYSTEM_PROMPT: &str = r#"You are a browser automation agent. You complete the user's task by choosing ONE action at a time on the current page.

Interactive elements are listed as [index] kind "label" = "value". Indices are only valid for the page shown right now.

Reply with a single JSON object and nothing else:
{"rationale": "<why this action>", "action": <action>}

Actions:
- {"type": "click", "index": 3}
- {"type": "type", "index": 5, "text": "buy milk"}
- {"type": "navigate", "url": "https://example.com"}
- {"type": "scroll", "direction": "down"}
- {"type": "finish", "success": true, "summary": "<what was achieved>"}
- {"type": "abort", "reason": "<why the task cannot be done>"}

Rules:
1. Only use indices from the current element list.
2. Typing replaces the field's contents. To submit, click the submit button or the element that confirms the input.
3. If the element you need is not listed, scroll to reveal it.
4. Finish as soon as the task is done and describe the result, including details the task asked you to report.
5. Abort only when the task is impossible on this site."#;

/// Everything the oracle sees for one decision
#[derive(Debug, Clone, Copy)]
pub struct OracleRequest<'a> {
    pub task: &'a Task,
    /// Most recent steps, oldest first
    pub history: &'a [HistoryEntry],
    pub snapshot: &'a Snapshot,
    /// Why the previous reply for this snapshot was rejected
    pub feedback: Option<&'a str>,
}

impl OracleRequest<'_> {
    /// Render the request as prompt text
    pub fn render(&self) -> String {
        let mut output = format!("Task: {}\n\n", self.task);

        if self.history.is_empty() {
            output.push_str("Previous steps: none yet\n");
        } else {
            output.push_str("Previous steps:\n");
            for entry in self.history {
                output.push_str("  ");
                output.push_str(&entry.line());
                output.push('\n');
            }
        }

        if let Some(feedback) = self.feedback {
            output.push_str(&format!(
                "\nYour previous reply was rejected: {}\nReply again with one valid action.\n",
                feedback
            ));
        }

        output.push_str("\nCurrent page:\n");
        output.push_str(&self.snapshot.format_for_oracle());
        output
    }
}

/// External decision capability: request in, reply text out
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn consult(&self, request: &OracleRequest<'_>) -> Result<String>;
}

/// Oracle backed by a chat model
pub struct LlmOracle {
    provider: Arc<dyn LLMProvider>,
    model: String,
    temperature: f32,
}

impl LlmOracle {
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
        }
    }
}

#[async_trait]
impl DecisionOracle for LlmOracle {
    async fn consult(&self, request: &OracleRequest<'_>) -> Result<String> {
        let messages = [Message::system(SYSTEM_PROMPT), Message::user(request.render())];
        let response = self
            .provider
            .chat(
                &self.model,
                &messages,
                Some(GenerateOptions::json(self.temperature)),
            )
            .await?;

        if let Some(usage) = response.usage {
            debug!(
                provider = self.provider.name(),
                model = %response.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "oracle replied"
            );
        }
        Ok(response.content)
    }
}

/// A validated proposal and the reasoning behind it
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub proposal: ActionProposal,
    pub rationale: String,
    /// Descriptor of the targeted element, for click and type
    pub target: Option<ElementDescriptor>,
}

/// Decide one action given goal, history and snapshot
#[async_trait]
pub trait DecisionAdapter: Send + Sync {
    async fn decide(&self, request: &OracleRequest<'_>) -> Result<Decision>;
}

/// Adapter for oracles that answer with a JSON action object
pub struct JsonDecisionAdapter<O> {
    oracle: O,
}

impl<O: DecisionOracle> JsonDecisionAdapter<O> {
    pub fn new(oracle: O) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl<O: DecisionOracle> DecisionAdapter for JsonDecisionAdapter<O> {
    async fn decide(&self, request: &OracleRequest<'_>) -> Result<Decision> {
        let reply = self.oracle.consult(request).await?;
        parse_decision(&reply, request.snapshot)
    }
}

/// Element reference: one index or several candidates
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HandleRef {
    One(u32),
    Many(Vec<u32>),
}

impl HandleRef {
    fn candidates(self) -> Vec<u32> {
        match self {
            Self::One(n) => vec![n],
            Self::Many(list) => list,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawAction {
    Click {
        #[serde(default, alias = "handle")]
        index: Option<HandleRef>,
        #[serde(default)]
        label: Option<String>,
    },
    Type {
        #[serde(default, alias = "handle")]
        index: Option<HandleRef>,
        #[serde(default)]
        label: Option<String>,
        text: String,
    },
    Navigate {
        url: String,
    },
    Scroll {
        direction: String,
    },
    Finish {
        #[serde(default = "default_success")]
        success: bool,
        summary: String,
    },
    Abort {
        reason: String,
    },
}

fn default_success() -> bool {
    true
}

/// Parse an oracle reply and validate it against the snapshot
pub fn parse_decision(reply: &str, snapshot: &Snapshot) -> Result<Decision> {
    let json = extract_json_object(reply)
        .ok_or_else(|| PilotError::decision("reply does not contain a JSON object"))?;
    let value: Value = serde_json::from_str(json)
        .map_err(|e| PilotError::decision(format!("reply is not valid JSON: {}", e)))?;

    let rationale = ["rationale", "reasoning", "thought"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();

    // Accept both {"action": {...}} and a bare action object
    let action = match value.get("action") {
        Some(action) => action.clone(),
        None if value.get("type").is_some() => value.clone(),
        None => return Err(PilotError::decision("missing field `action`")),
    };
    let raw: RawAction = serde_json::from_value(action)
        .map_err(|e| PilotError::decision(format!("invalid action: {}", e)))?;

    let (proposal, target) = validate(raw, snapshot)?;
    Ok(Decision {
        proposal,
        rationale,
        target,
    })
}

fn validate(
    raw: RawAction,
    snapshot: &Snapshot,
) -> Result<(ActionProposal, Option<ElementDescriptor>)> {
    match raw {
        RawAction::Click { index, label } => {
            let element = resolve_target(index, label.as_deref(), snapshot, false)?;
            Ok((
                ActionProposal::Click {
                    handle: element.handle,
                },
                Some(element.descriptor.clone()),
            ))
        }
        RawAction::Type { index, label, text } => {
            let element = resolve_target(index, label.as_deref(), snapshot, true)?;
            if !element.descriptor.kind.accepts_text() {
                return Err(PilotError::decision(format!(
                    "element {} is a {} and does not accept text",
                    element.handle, element.descriptor.kind
                )));
            }
            Ok((
                ActionProposal::Type {
                    handle: element.handle,
                    text,
                },
                Some(element.descriptor.clone()),
            ))
        }
        RawAction::Navigate { url } => Ok((
            ActionProposal::Navigate {
                url: resolve_url(&url, &snapshot.url)?,
            },
            None,
        )),
        RawAction::Scroll { direction } => {
            let direction = ScrollDirection::parse(&direction).ok_or_else(|| {
                PilotError::decision(format!(
                    "unknown scroll direction '{}', use up or down",
                    direction
                ))
            })?;
            Ok((ActionProposal::Scroll { direction }, None))
        }
        RawAction::Finish { success, summary } => {
            Ok((ActionProposal::Finish { success, summary }, None))
        }
        RawAction::Abort { reason } => Ok((ActionProposal::Abort { reason }, None)),
    }
}

/// Pick the element a proposal refers to. Among several valid candidates
/// the lowest handle wins; typing prefers elements that accept text.
fn resolve_target<'s>(
    index: Option<HandleRef>,
    label: Option<&str>,
    snapshot: &'s Snapshot,
    wants_text: bool,
) -> Result<&'s IndexedElement> {
    let candidates: Vec<&IndexedElement> = match (index, label) {
        (Some(index), _) => {
            let requested = index.candidates();
            let missing: Vec<u32> = requested
                .iter()
                .copied()
                .filter(|n| !snapshot.contains(ElementHandle(*n)))
                .collect();
            if !missing.is_empty() || requested.is_empty() {
                return Err(PilotError::decision(format!(
                    "handle {} is not in the current snapshot ({} elements, indices 0-{})",
                    format_handles(if missing.is_empty() { &requested } else { &missing }),
                    snapshot.element_count(),
                    snapshot.element_count().saturating_sub(1)
                )));
            }
            let mut present: Vec<&IndexedElement> = requested
                .iter()
                .filter_map(|n| snapshot.element(ElementHandle(*n)))
                .collect();
            present.sort_by_key(|el| el.handle);
            present
        }
        (None, Some(label)) => {
            let found = snapshot.find_by_label(label);
            if found.is_empty() {
                return Err(PilotError::decision(format!(
                    "no element labelled \"{}\" in the current snapshot",
                    label
                )));
            }
            found
        }
        (None, None) => return Err(PilotError::decision("missing field `index`")),
    };

    let preferred = wants_text
        .then(|| {
            candidates
                .iter()
                .find(|el| el.descriptor.kind.accepts_text())
                .copied()
        })
        .flatten();
    // Candidates are in handle order, so the first is the lowest
    Ok(preferred.unwrap_or(candidates[0]))
}

fn format_handles(handles: &[u32]) -> String {
    match handles {
        [one] => ElementHandle(*one).to_string(),
        many => format!("{:?}", many),
    }
}

/// Validate a navigation target; relative URLs are joined onto `base`
pub fn resolve_url(raw: &str, base: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(PilotError::decision("navigate requires a non-empty url"));
    }

    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let looks_like_host = !raw.starts_with(&['/', '.', '?', '#'][..])
                && raw.split('/').next().is_some_and(|host| host.contains('.'));
            if looks_like_host {
                Url::parse(&format!("https://{}", raw))
            } else {
                Url::parse(base).and_then(|base| base.join(raw))
            }
            .map_err(|e| PilotError::decision(format!("invalid url '{}': {}", raw, e)))?
        }
        Err(e) => return Err(PilotError::decision(format!("invalid url '{}': {}", raw, e))),
    };

    match url.scheme() {
        "http" | "https" => Ok(url.to_string()),
        scheme => Err(PilotError::decision(format!(
            "unsupported url scheme '{}'",
            scheme
        ))),
    }
}

/// Find the JSON object in a reply, ignoring code fences and prose
fn extract_json_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}
