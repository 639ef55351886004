//! Browser driver - wraps the agent-browser CLI
//!
//! Every capability call becomes one agent-browser invocation against a
//! named session. Page state is read with the scripts in [`super::scripts`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::scripts::{probe_js, PAGE_METADATA_JS, QUERY_ELEMENTS_JS, VISIBLE_TEXT_JS};
use super::{Browser, ElementProbe, PageMetadata, RawElement, TextBlock};
use crate::core::config::BrowserConfig;
use crate::core::{PilotError, Result, ScrollDirection};

/// Browser session driven through the agent-browser CLI
pub struct AgentBrowser {
    /// Session name for isolation
    session_name: String,
    /// Whether to run in headed mode
    headed: bool,
    /// Upper bound for a single command
    command_timeout: Duration,
}

impl AgentBrowser {
    /// Create a new driver for a named session
    pub fn new(session_name: impl Into<String>) -> Self {
        Self {
            session_name: session_name.into(),
            headed: false,
            command_timeout: Duration::from_secs(30),
        }
    }

    /// Create a driver from browser configuration
    pub fn from_config(config: &BrowserConfig) -> Self {
        Self {
            session_name: config.session_name.clone(),
            headed: config.headed,
            command_timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// Check if agent-browser is installed
    pub async fn is_available() -> bool {
        Command::new("agent-browser")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Run an agent-browser command
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("agent-browser");
        cmd.args(["--session", &self.session_name]);

        if self.headed {
            cmd.arg("--headed");
        }

        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        debug!(session = %self.session_name, command = args.first().copied().unwrap_or(""), "agent-browser");

        let output = tokio::time::timeout(self.command_timeout, cmd.output())
            .await
            .map_err(|_| {
                PilotError::timeout(
                    format!("agent-browser {}", args.first().copied().unwrap_or("")),
                    self.command_timeout.as_secs(),
                )
            })?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    PilotError::AgentBrowserNotFound
                } else {
                    PilotError::browser(format!("Failed to run agent-browser: {}", e))
                }
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(PilotError::browser(format!(
                "agent-browser command failed: {}",
                stderr.trim()
            )))
        }
    }

    /// Evaluate a script that returns a JSON string and decode it
    async fn eval_json<T: DeserializeOwned>(&self, script: &str) -> Result<T> {
        let output = self.run_command(&["eval", script, "--json"]).await?;
        let value = parse_eval_output(&output)?;
        serde_json::from_value(value)
            .map_err(|e| PilotError::browser(format!("Unexpected eval result: {}", e)))
    }
}

impl Default for AgentBrowser {
    fn default() -> Self {
        Self::new("browser-pilot")
    }
}

/// Unwrap agent-browser's eval output into the script's JSON value.
///
/// Accepts the `--json` envelope (`{"success":..,"data":{"result":..}}`) as
/// well as bare output, and decodes string results that are themselves JSON.
pub(crate) fn parse_eval_output(output: &str) -> Result<Value> {
    let trimmed = output.trim();
    let mut value: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(_) => Value::String(trimmed.to_string()),
    };

    if let Some(false) = value.get("success").and_then(Value::as_bool) {
        let message = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("eval failed");
        return Err(PilotError::browser(message.to_string()));
    }

    if let Some(data) = value.get("data").cloned() {
        value = data.get("result").cloned().unwrap_or(data);
    }

    if let Value::String(s) = &value {
        if let Ok(inner) = serde_json::from_str::<Value>(s) {
            return Ok(inner);
        }
    }

    Ok(value)
}

#[async_trait]
impl Browser for AgentBrowser {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.run_command(&["open", url]).await?;

        // Best effort: some pages never go network-idle
        if let Err(e) = self.run_command(&["wait", "--load", "networkidle"]).await {
            debug!(error = %e, "networkidle wait skipped");
        }
        Ok(())
    }

    async fn page_metadata(&self) -> Result<PageMetadata> {
        self.eval_json(PAGE_METADATA_JS).await
    }

    async fn query_elements(&self) -> Result<Vec<RawElement>> {
        self.eval_json(QUERY_ELEMENTS_JS).await
    }

    async fn visible_text(&self) -> Result<Vec<TextBlock>> {
        self.eval_json(VISIBLE_TEXT_JS).await
    }

    async fn probe(&self, locator: &str) -> Result<Option<ElementProbe>> {
        self.eval_json(&probe_js(locator)).await
    }

    async fn click(&self, locator: &str) -> Result<()> {
        self.run_command(&["click", locator]).await?;
        Ok(())
    }

    async fn type_text(&self, locator: &str, text: &str) -> Result<()> {
        self.run_command(&["fill", locator, text]).await?;
        Ok(())
    }

    async fn scroll(&self, direction: ScrollDirection) -> Result<()> {
        self.run_command(&["scroll", direction.as_str()]).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.run_command(&["close"]).await?;
        Ok(())
    }
}
