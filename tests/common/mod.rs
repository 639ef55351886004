//! In-memory fakes of the browser and oracle capabilities

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use browser_pilot::agent::{DecisionOracle, OracleRequest};
use browser_pilot::browser::{
    Browser, ElementProbe, PageMetadata, RawElement, ScrollPosition, TextBlock,
};
use browser_pilot::core::{Bounds, Config, PilotError, Result, ScrollDirection};
use tokio_util::sync::CancellationToken;

const VIEWPORT_WIDTH: f64 = 1280.0;
const VIEWPORT_HEIGHT: f64 = 720.0;

type Effect = Box<dyn Fn(&mut Page) + Send + Sync>;

/// Mutable page state behind the fake
pub struct Page {
    pub url: String,
    pub title: String,
    pub elements: Vec<RawElement>,
    pub text: Vec<TextBlock>,
    pub scroll_y: f64,
    pub document_height: f64,
    pub signature: u64,
}

impl Page {
    /// Remove an element and mark the DOM as changed
    pub fn remove(&mut self, locator: &str) {
        self.elements.retain(|el| el.locator != locator);
        self.signature += 1;
    }

    /// Append an element and mark the DOM as changed
    pub fn add(&mut self, element: RawElement) {
        self.elements.push(element);
        self.signature += 1;
    }
}

#[derive(Default)]
struct Log {
    clicks: Vec<String>,
    typed: Vec<(String, String)>,
    navigations: Vec<String>,
}

/// Browser fake with scripted reactions
pub struct FakeBrowser {
    page: Mutex<Page>,
    on_click: Mutex<HashMap<String, Effect>>,
    remove_before_probe: Mutex<Option<String>>,
    metadata_failures: Mutex<usize>,
    hang_clicks: Mutex<bool>,
    log: Mutex<Log>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl FakeBrowser {
    pub fn new(url: &str, elements: Vec<RawElement>) -> Self {
        Self {
            page: Mutex::new(Page {
                url: url.to_string(),
                title: "Fake page".to_string(),
                elements,
                text: vec![TextBlock {
                    text: "Welcome".to_string(),
                    top: 10.0,
                }],
                scroll_y: 0.0,
                document_height: 2000.0,
                signature: 1,
            }),
            on_click: Mutex::new(HashMap::new()),
            remove_before_probe: Mutex::new(None),
            metadata_failures: Mutex::new(0),
            hang_clicks: Mutex::new(false),
            log: Mutex::new(Log::default()),
        }
    }

    /// React to clicks on `locator`
    pub fn on_click(&self, locator: &str, effect: impl Fn(&mut Page) + Send + Sync + 'static) {
        lock(&self.on_click).insert(locator.to_string(), Box::new(effect));
    }

    /// Make the element disappear right before the executor looks for it
    pub fn remove_before_next_probe(&self, locator: &str) {
        *lock(&self.remove_before_probe) = Some(locator.to_string());
    }

    /// Fail the next `n` metadata reads
    pub fn fail_metadata(&self, n: usize) {
        *lock(&self.metadata_failures) = n;
    }

    /// Make every click wait forever
    pub fn hang_clicks(&self) {
        *lock(&self.hang_clicks) = true;
    }

    pub fn with_page<R>(&self, f: impl FnOnce(&mut Page) -> R) -> R {
        f(&mut *lock(&self.page))
    }

    pub fn clicks(&self) -> Vec<String> {
        lock(&self.log).clicks.clone()
    }

    pub fn typed(&self) -> Vec<(String, String)> {
        lock(&self.log).typed.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        lock(&self.log).navigations.clone()
    }

    fn find<'p>(page: &'p mut Page, locator: &str) -> Result<&'p mut RawElement> {
        page.elements
            .iter_mut()
            .find(|el| el.locator == locator)
            .ok_or_else(|| PilotError::browser(format!("no element matches {}", locator)))
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn navigate(&self, url: &str) -> Result<()> {
        if url.contains("unreachable") {
            return Err(PilotError::browser("net::ERR_NAME_NOT_RESOLVED"));
        }
        lock(&self.log).navigations.push(url.to_string());
        let mut page = lock(&self.page);
        page.url = url.to_string();
        page.scroll_y = 0.0;
        page.signature += 1;
        Ok(())
    }

    async fn page_metadata(&self) -> Result<PageMetadata> {
        {
            let mut failures = lock(&self.metadata_failures);
            if *failures > 0 {
                *failures -= 1;
                return Err(PilotError::browser("page is not responding"));
            }
        }
        let page = lock(&self.page);
        Ok(PageMetadata {
            url: page.url.clone(),
            title: page.title.clone(),
            scroll: ScrollPosition {
                y: page.scroll_y,
                viewport_width: VIEWPORT_WIDTH,
                viewport_height: VIEWPORT_HEIGHT,
                document_height: page.document_height,
            },
            dom_signature: page.signature,
        })
    }

    async fn query_elements(&self) -> Result<Vec<RawElement>> {
        Ok(lock(&self.page).elements.clone())
    }

    async fn visible_text(&self) -> Result<Vec<TextBlock>> {
        Ok(lock(&self.page).text.clone())
    }

    async fn probe(&self, locator: &str) -> Result<Option<ElementProbe>> {
        if let Some(doomed) = lock(&self.remove_before_probe).take() {
            lock(&self.page).remove(&doomed);
        }
        let page = lock(&self.page);
        Ok(page
            .elements
            .iter()
            .find(|el| el.locator == locator)
            .map(|el| ElementProbe {
                tag: el.tag.clone(),
                text: el.text.clone(),
                value: el.value.clone(),
            }))
    }

    async fn click(&self, locator: &str) -> Result<()> {
        let hang = *lock(&self.hang_clicks);
        if hang {
            std::future::pending::<()>().await;
        }
        let mut page = lock(&self.page);
        Self::find(&mut *page, locator)?;
        lock(&self.log).clicks.push(locator.to_string());
        if let Some(effect) = lock(&self.on_click).get(locator) {
            effect(&mut *page);
        }
        Ok(())
    }

    async fn type_text(&self, locator: &str, text: &str) -> Result<()> {
        let mut page = lock(&self.page);
        Self::find(&mut *page, locator)?.value = Some(text.to_string());
        page.signature += 1;
        lock(&self.log)
            .typed
            .push((locator.to_string(), text.to_string()));
        Ok(())
    }

    async fn scroll(&self, direction: ScrollDirection) -> Result<()> {
        let mut page = lock(&self.page);
        let max = (page.document_height - VIEWPORT_HEIGHT).max(0.0);
        page.scroll_y = match direction {
            ScrollDirection::Down => (page.scroll_y + 600.0).min(max),
            ScrollDirection::Up => (page.scroll_y - 600.0).max(0.0),
        };
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Oracle that replays canned replies and keeps every prompt it saw
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<String>>,
    fallback: Option<String>,
    prompts: Arc<Mutex<Vec<String>>>,
    cancel_on_call: Option<CancellationToken>,
    hang: bool,
}

impl ScriptedOracle {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            prompts: Arc::new(Mutex::new(Vec::new())),
            cancel_on_call: None,
            hang: false,
        }
    }

    /// Oracle with no script
    pub fn silent() -> Self {
        Self::new(Vec::new())
    }

    /// Answer with `reply` once the script runs out
    pub fn repeating(mut self, reply: &str) -> Self {
        self.fallback = Some(reply.to_string());
        self
    }

    /// Cancel `token` while answering
    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_on_call = Some(token);
        self
    }

    /// Never answer
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Shared view of the prompts, usable after the oracle moves into an agent
    pub fn prompts(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.prompts)
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    async fn consult(&self, request: &OracleRequest<'_>) -> Result<String> {
        lock(&self.prompts).push(request.render());
        if let Some(token) = &self.cancel_on_call {
            token.cancel();
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        lock(&self.replies)
            .pop_front()
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| PilotError::Other("oracle script exhausted".to_string()))
    }
}

/// Visible element at a vertical position
pub fn element(locator: &str, tag: &str, text: &str, y: f64) -> RawElement {
    RawElement {
        locator: locator.to_string(),
        tag: tag.to_string(),
        text: text.to_string(),
        visible: true,
        bounds: Bounds {
            x: 20.0,
            y,
            width: 120.0,
            height: 24.0,
        },
        ..Default::default()
    }
}

/// [0] link "Home", [1] input "Name", [2] button "Cancel", [3] button "Submit"
pub fn form_page() -> Vec<RawElement> {
    let mut home = element("#home", "a", "Home", 10.0);
    home.href = Some("/".to_string());
    let mut name = element("#name", "input", "", 50.0);
    name.placeholder = Some("Name".to_string());
    vec![
        home,
        name,
        element("#cancel", "button", "Cancel", 90.0),
        element("#submit", "button", "Submit", 130.0),
    ]
}

/// Config for fast, deterministic runs
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.browser.settle_ms = 0;
    config.browser.start_url = None;
    config.agent.max_steps = 50;
    config.agent.max_decision_retries = 3;
    config.agent.max_consecutive_errors = 5;
    config.agent.max_consecutive_stale = 5;
    config.agent.history_window = 10;
    config.agent.call_timeout_secs = 5;
    config
}

pub fn click(index: u32) -> String {
    format!(
        r#"{{"rationale": "click {}", "action": {{"type": "click", "index": {}}}}}"#,
        index, index
    )
}

pub fn type_into(index: u32, text: &str) -> String {
    format!(
        r#"{{"rationale": "fill the field", "action": {{"type": "type", "index": {}, "text": "{}"}}}}"#,
        index, text
    )
}

pub fn finish(summary: &str) -> String {
    format!(
        r#"{{"rationale": "done", "action": {{"type": "finish", "success": true, "summary": "{}"}}}}"#,
        summary
    )
}
