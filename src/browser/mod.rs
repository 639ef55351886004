//! Browser capability
//!
//! The agent talks to the browser only through the [`Browser`] trait. The
//! shipped implementation drives the agent-browser CLI; tests use in-memory
//! fakes.

mod driver;
pub(crate) mod scripts;

pub use driver::AgentBrowser;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{Bounds, Result, ScrollDirection};

/// One candidate element as reported by the browser, in document order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawElement {
    /// Opaque locator the driver can resolve again (a CSS path)
    pub locator: String,
    /// Lowercase tag name
    pub tag: String,
    /// ARIA role attribute
    pub role: Option<String>,
    /// Rendered text content
    pub text: String,
    pub aria_label: Option<String>,
    pub placeholder: Option<String>,
    pub title: Option<String>,
    pub alt: Option<String>,
    pub name: Option<String>,
    /// `type` attribute for inputs and buttons
    pub input_type: Option<String>,
    pub href: Option<String>,
    /// Current form value
    pub value: Option<String>,
    pub disabled: bool,
    /// Rendered with non-zero size and not hidden by style
    pub visible: bool,
    /// Another element sits on top of this element's center
    pub obscured: bool,
    /// Has a click handler, tabindex or pointer cursor
    pub clickable: bool,
    /// contenteditable
    pub editable: bool,
    pub bounds: Bounds,
}

/// Scroll offsets and viewport geometry
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScrollPosition {
    /// Pixels scrolled from the top
    pub y: f64,
    pub viewport_width: f64,
    pub viewport_height: f64,
    /// Total scrollable height
    pub document_height: f64,
}

impl ScrollPosition {
    /// Calculate scroll percentage
    pub fn scroll_percentage(&self) -> f64 {
        if self.document_height <= self.viewport_height {
            100.0
        } else {
            let scrollable = self.document_height - self.viewport_height;
            (self.y / scrollable * 100.0).clamp(0.0, 100.0)
        }
    }

    /// Pixels of content below the viewport
    pub fn pixels_below(&self) -> f64 {
        (self.document_height - self.viewport_height - self.y).max(0.0)
    }
}

/// Current page metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageMetadata {
    pub url: String,
    pub title: String,
    pub scroll: ScrollPosition,
    /// Hash of the rendered DOM; changes when the page mutates
    pub dom_signature: u64,
}

/// A run of visible prose with its viewport-relative vertical position
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextBlock {
    pub text: String,
    pub top: f64,
}

/// Live state of one element, used for staleness and value checks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementProbe {
    pub tag: String,
    pub text: String,
    pub value: Option<String>,
}

/// Capability to drive one browser session.
///
/// Implementations are not expected to tolerate concurrent mutation; the
/// agent loop issues one call at a time.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Navigate the session to a URL
    async fn navigate(&self, url: &str) -> Result<()>;

    /// URL, title, scroll position and DOM signature of the current page
    async fn page_metadata(&self) -> Result<PageMetadata>;

    /// Candidate interactive elements with visibility and bounds, document order
    async fn query_elements(&self) -> Result<Vec<RawElement>>;

    /// Visible prose blocks, document order
    async fn visible_text(&self) -> Result<Vec<TextBlock>>;

    /// Look an element up again by locator; `None` when it is gone
    async fn probe(&self, locator: &str) -> Result<Option<ElementProbe>>;

    /// Click the element at a locator
    async fn click(&self, locator: &str) -> Result<()>;

    /// Replace the text of the element at a locator
    async fn type_text(&self, locator: &str, text: &str) -> Result<()>;

    /// Scroll the viewport one page in a direction
    async fn scroll(&self, direction: ScrollDirection) -> Result<()>;

    /// Close the session
    async fn close(&self) -> Result<()>;
}
