//! Run reports
//!
//! Text rendering for the terminal and JSON persistence for later analysis.

use std::fs;
use std::path::Path;

use crate::agent::{AgentResult, AgentStatus};
use crate::core::{PilotError, Result};

/// Render a result as a plain-text report
pub fn render_report(result: &AgentResult) -> String {
    let mut output = String::new();

    let marker = match result.status {
        AgentStatus::Completed => "✅",
        AgentStatus::Aborted => "⏹️",
        AgentStatus::ExhaustedSteps => "⏱️",
        AgentStatus::FatalError => "❌",
    };
    output.push_str(&format!("{} Status: {}\n", marker, result.status));
    output.push_str(&format!("Summary: {}\n", result.summary));
    if let Some(success) = result.reported_success {
        output.push_str(&format!("Reported success: {}\n", success));
    }
    output.push_str(&format!(
        "Steps: {} in {:.1}s\n",
        result.steps_taken,
        result.duration_ms as f64 / 1000.0
    ));
    if let Some(url) = &result.final_url {
        output.push_str(&format!("Final URL: {}\n", url));
    }

    output.push_str("\nHistory:\n");
    if result.history.is_empty() {
        output.push_str("  (no steps)\n");
    }
    for entry in &result.history {
        output.push_str(&format!("  {}\n", entry.line()));
        if !entry.rationale.is_empty() {
            output.push_str(&format!("     why: {}\n", entry.rationale));
        }
    }

    let interacted: Vec<_> = result.interacted_elements().collect();
    if !interacted.is_empty() {
        output.push_str("\nElements interacted with:\n");
        for entry in interacted {
            if let (Some(target), Some(proposal)) = (&entry.target, &entry.proposal) {
                output.push_str(&format!(
                    "  step {}: {} <{}> {}",
                    entry.step_index + 1,
                    proposal.name(),
                    target.tag,
                    target
                ));
                if let Some(role) = &target.role {
                    output.push_str(&format!(" role={}", role));
                }
                output.push_str(&format!(
                    " at ({:.0}, {:.0}) {:.0}x{:.0}\n",
                    target.bounds.x, target.bounds.y, target.bounds.width, target.bounds.height
                ));
            }
        }
    }

    if !result.incidents.is_empty() {
        output.push_str(&format!("\nIncidents ({}):\n", result.incidents.len()));
        for incident in &result.incidents {
            output.push_str(&format!(
                "  after step {}: {}: {}\n",
                incident.after_step, incident.kind, incident.detail
            ));
        }
    }

    output
}

/// Write a result as pretty JSON, creating parent directories
pub fn save_report(result: &AgentResult, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }

    let json = serde_json::to_string_pretty(result)?;
    fs::write(path, json)
        .map_err(|e| PilotError::Other(format!("Failed to write report {}: {}", path.display(), e)))
}
