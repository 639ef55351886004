//! Agent module - the perceive-decide-act-verify loop
//!
//! The orchestrator drives a pure [`LoopState`] machine, asks a
//! [`DecisionAdapter`] for one action per cycle and records what happened
//! in the [`History`].

pub mod history;
pub mod loop_state;
pub mod oracle;
pub mod orchestrator;
pub mod result;

pub use history::{History, HistoryEntry, Incident, IncidentKind};
pub use loop_state::{LoopLimits, LoopStage, LoopState, Termination, Verdict};
pub use oracle::{
    parse_decision, Decision, DecisionAdapter, DecisionOracle, JsonDecisionAdapter, LlmOracle,
    OracleRequest,
};
pub use orchestrator::{Agent, AgentBuilder};
pub use result::{AgentResult, AgentStatus};
