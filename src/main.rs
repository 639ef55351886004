//! browser-pilot - autonomous browser agent
//!
//! Main entry point for the CLI application.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use browser_pilot::agent::{Agent, LlmOracle};
use browser_pilot::browser::{AgentBrowser, Browser};
use browser_pilot::cli::{render_report, save_report};
use browser_pilot::core::config::ProviderType;
use browser_pilot::core::{Config, PilotError, Task};
use browser_pilot::llm::create_provider;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Task used when none is given on the command line
const DEFAULT_TASK: &str = "Navigate to https://v0-basic-todo-app.vercel.app/, create a new todo item with the text 'Complete browser-use agent task', and print details about the HTML elements that were interacted with";

/// browser-pilot - drive a browser to complete a task
#[derive(Parser, Debug)]
#[command(name = "browser-pilot")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Task in plain language
    task: Vec<String>,

    /// Model backend: ollama or openai
    #[arg(long, short = 'p')]
    provider: Option<String>,

    /// Model name
    #[arg(long, short = 'm')]
    model: Option<String>,

    /// Page to open before the first observation
    #[arg(long, short = 'u')]
    start_url: Option<String>,

    /// Run in headed browser mode (visible window)
    #[arg(long)]
    headed: bool,

    /// Maximum number of steps
    #[arg(long)]
    max_steps: Option<usize>,

    /// Config file (default: ~/.config/browser-pilot/config.toml)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Write the full run as JSON
    #[arg(long)]
    save_report: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short = 'd')]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = build_config(&args)?;

    // Logs go to stderr so the report on stdout stays clean
    let filter = if config.agent.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let code = run(args, config).await?;
    std::process::exit(code);
}

async fn run(args: Args, config: Config) -> anyhow::Result<i32> {
    if !AgentBrowser::is_available().await {
        return Err(PilotError::AgentBrowserNotFound.into());
    }

    let provider = create_provider(&config)?;
    match provider.is_model_available(&config.model.name).await {
        Ok(true) => {}
        Ok(false) if config.provider == ProviderType::Ollama => {
            return Err(PilotError::ModelNotFound(config.model.name.clone()).into());
        }
        Ok(false) => warn!(model = %config.model.name, "model not listed by provider"),
        Err(e) => warn!(error = %e, "could not list models"),
    }

    let task = if args.task.is_empty() {
        Task::new(DEFAULT_TASK)
    } else {
        Task::new(args.task.join(" "))
    };

    let browser = Arc::new(AgentBrowser::from_config(&config.browser));
    let oracle = LlmOracle::new(provider, config.model.name.clone(), config.model.temperature);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping after the current stage");
            on_interrupt.cancel();
        }
    });

    let agent = Agent::builder(task)
        .browser(browser.clone())
        .oracle(oracle)
        .config(config)
        .cancellation(cancel)
        .build()?;
    let result = agent.run().await;

    if let Err(e) = browser.close().await {
        warn!(error = %e, "failed to close browser session");
    }

    println!("{}", render_report(&result));

    if let Some(path) = &args.save_report {
        save_report(&result, path)
            .with_context(|| format!("saving report to {}", path.display()))?;
        info!(path = %path.display(), "report saved");
    }

    Ok(result.exit_code())
}

/// Config file, then CLI overrides
fn build_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let _ = dotenvy::dotenv();
            Config::load_from(path)?
        }
        None => Config::load(),
    };

    if let Some(provider) = &args.provider {
        let provider: ProviderType = provider.parse()?;
        if provider != config.provider
            && args.model.is_none()
            && std::env::var("PILOT_MODEL").is_err()
        {
            config.model.name = provider.default_model().to_string();
        }
        config.provider = provider;
    }
    if let Some(model) = &args.model {
        config.model.name = model.clone();
    }
    if let Some(url) = &args.start_url {
        config.browser.start_url = Some(url.clone());
    }
    if args.headed {
        config.browser.headed = true;
    }
    if let Some(max_steps) = args.max_steps {
        config.agent.max_steps = max_steps;
    }
    if args.debug {
        config.agent.debug = true;
    }

    if config.model.name.trim().is_empty() {
        bail!("no model configured; pass --model or set PILOT_MODEL");
    }
    config.validate()?;
    Ok(config)
}
