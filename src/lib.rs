//! browser-pilot - autonomous browser agent
//!
//! Given a natural-language task, the agent repeatedly observes the page,
//! asks a decision oracle for one action, executes it and verifies the
//! effect, until the oracle finishes or gives up or a limit is reached.
//!
//! # Architecture
//!
//! - **Core**: shared types, configuration, and error handling
//! - **Browser**: the browser capability and the agent-browser driver
//! - **Perception**: element indexing and bounded page snapshots
//! - **Action**: executes one proposal and classifies its effect
//! - **LLM**: model providers (Ollama, OpenAI-compatible)
//! - **Agent**: decision oracle adapter, history, and the loop itself
//! - **CLI**: report rendering
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use browser_pilot::agent::{Agent, LlmOracle};
//! use browser_pilot::browser::AgentBrowser;
//! use browser_pilot::core::{Config, Task};
//! use browser_pilot::llm::create_provider;
//!
//! #[tokio::main]
//! async fn main() -> browser_pilot::Result<()> {
//!     let config = Config::load();
//!     let provider = create_provider(&config)?;
//!     let oracle = LlmOracle::new(provider, config.model.name.clone(), config.model.temperature);
//!
//!     let agent = Agent::builder(Task::new("Create a todo named 'buy milk'"))
//!         .browser(Arc::new(AgentBrowser::from_config(&config.browser)))
//!         .oracle(oracle)
//!         .config(config)
//!         .build()?;
//!
//!     let result = agent.run().await;
//!     println!("{}", browser_pilot::cli::render_report(&result));
//!     Ok(())
//! }
//! ```

pub mod action;
pub mod agent;
pub mod browser;
pub mod cli;
pub mod core;
pub mod llm;
pub mod perception;

// Re-export commonly used items
pub use agent::{Agent, AgentResult, AgentStatus};
pub use core::{Config, PilotError, Result};
