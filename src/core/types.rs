//! Shared types used across browser-pilot modules
//!
//! Contains the task, element descriptions, action proposals and outcomes
//! that flow between the perception, decision and action layers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The natural-language goal of one agent run. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Task(String);

impl Task {
    /// Create a task from goal text
    pub fn new(goal: impl Into<String>) -> Self {
        Self(goal.into())
    }

    /// Borrow the goal text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-snapshot integer reference to one interactive element.
///
/// Only meaningful against the snapshot that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementHandle(pub u32);

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0)
    }
}

/// Broad category of an interactive element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Button,
    Link,
    TextInput,
    TextArea,
    Checkbox,
    Radio,
    Select,
    ListOption,
    Editable,
    Other,
}

impl ElementKind {
    /// Whether text can be entered into this kind of element
    pub fn accepts_text(&self) -> bool {
        matches!(self, Self::TextInput | Self::TextArea | Self::Editable)
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Button => "button",
            Self::Link => "link",
            Self::TextInput => "input",
            Self::TextArea => "textarea",
            Self::Checkbox => "checkbox",
            Self::Radio => "radio",
            Self::Select => "select",
            Self::ListOption => "option",
            Self::Editable => "editable",
            Self::Other => "element",
        };
        f.write_str(name)
    }
}

/// Viewport-relative bounding box in CSS pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    /// Whether the box has a non-zero rendered area
    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    /// Whether any part of the box lies inside a viewport of the given size
    pub fn intersects_viewport(&self, viewport_width: f64, viewport_height: f64) -> bool {
        self.x + self.width > 0.0
            && self.y + self.height > 0.0
            && self.x < viewport_width
            && self.y < viewport_height
    }
}

/// Semantic description of one interactive element, enough for the oracle
/// to choose it without seeing markup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDescriptor {
    /// Element category
    pub kind: ElementKind,
    /// Lowercase tag name
    pub tag: String,
    /// ARIA role, if present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Human-readable label
    pub label: String,
    /// Current value for form fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Whether the element accepts interaction
    pub enabled: bool,
    /// Position in the viewport
    pub bounds: Bounds,
}

impl fmt::Display for ElementDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} \"{}\"", self.kind, self.label)?;
        if let Some(value) = &self.value {
            if !value.is_empty() {
                write!(f, " = \"{}\"", value)?;
            }
        }
        if !self.enabled {
            f.write_str(" [disabled]")?;
        }
        Ok(())
    }
}

/// Scroll direction for scroll proposals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollDirection {
    /// Parse a direction name, case-insensitively
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            _ => None,
        }
    }

    /// Name used by the browser driver
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

/// One action chosen by the oracle. Exactly one variant per proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionProposal {
    Click { handle: ElementHandle },
    Type { handle: ElementHandle, text: String },
    Navigate { url: String },
    Scroll { direction: ScrollDirection },
    Finish { success: bool, summary: String },
    Abort { reason: String },
}

impl ActionProposal {
    /// Element targeted by this proposal, if any
    pub fn handle(&self) -> Option<ElementHandle> {
        match self {
            Self::Click { handle } | Self::Type { handle, .. } => Some(*handle),
            _ => None,
        }
    }

    /// Whether this proposal ends the run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish { .. } | Self::Abort { .. })
    }

    /// Short action name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Click { .. } => "click",
            Self::Type { .. } => "type",
            Self::Navigate { .. } => "navigate",
            Self::Scroll { .. } => "scroll",
            Self::Finish { .. } => "finish",
            Self::Abort { .. } => "abort",
        }
    }
}

impl fmt::Display for ActionProposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Click { handle } => write!(f, "click({})", handle.0),
            Self::Type { handle, text } => write!(f, "type({}, \"{}\")", handle.0, text),
            Self::Navigate { url } => write!(f, "navigate({})", url),
            Self::Scroll { direction } => write!(f, "scroll({})", direction.as_str()),
            Self::Finish { success, summary } => write!(f, "finish({}, \"{}\")", success, summary),
            Self::Abort { reason } => write!(f, "abort(\"{}\")", reason),
        }
    }
}

/// Visible effect of an executed action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservedEffect {
    Navigated,
    DomChanged,
    NoVisibleChange,
    Error,
}

/// Result of executing one proposal against the browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Whether the operation succeeded
    pub succeeded: bool,
    /// What changed on the page
    pub observed_effect: ObservedEffect,
    /// Failure detail for error outcomes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// Page URL after a navigation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// For type actions: whether the field value changed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_changed: Option<bool>,
}

impl ActionOutcome {
    /// Create a successful outcome with the given effect
    pub fn success(effect: ObservedEffect) -> Self {
        Self {
            succeeded: true,
            observed_effect: effect,
            error_detail: None,
            url: None,
            value_changed: None,
        }
    }

    /// Create an error outcome
    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            observed_effect: ObservedEffect::Error,
            error_detail: Some(detail.into()),
            url: None,
            value_changed: None,
        }
    }

    /// Attach the post-action URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Attach the value-change flag
    pub fn with_value_changed(mut self, changed: bool) -> Self {
        self.value_changed = Some(changed);
        self
    }

    /// Whether this outcome counts as an error
    pub fn is_error(&self) -> bool {
        !self.succeeded || self.observed_effect == ObservedEffect::Error
    }
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(detail) = &self.error_detail {
            return write!(f, "error: {}", detail);
        }
        let effect = match self.observed_effect {
            ObservedEffect::Navigated => "navigated",
            ObservedEffect::DomChanged => "page changed",
            ObservedEffect::NoVisibleChange => "no visible change",
            ObservedEffect::Error => "error",
        };
        f.write_str(effect)?;
        if let Some(url) = &self.url {
            write!(f, " ({})", url)?;
        }
        if let Some(changed) = self.value_changed {
            write!(f, ", value changed: {}", changed)?;
        }
        Ok(())
    }
}

/// A message in a model conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (user or system)
    pub role: String,
    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}
