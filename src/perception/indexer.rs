//! Element indexer
//!
//! Turns the browser's raw element records into the handle-numbered list the
//! oracle chooses from. Only elements a user could act on right now are kept:
//! rendered, unobscured, inside the viewport. Handles follow document order,
//! so the same DOM always yields the same numbering.

use serde::{Deserialize, Serialize};

use crate::browser::{ElementProbe, RawElement, ScrollPosition};
use crate::core::{ElementDescriptor, ElementHandle, ElementKind};

/// Interactive element tags that are always candidates
const INTERACTIVE_TAGS: &[&str] = &[
    "a", "button", "input", "select", "textarea", "summary", "option",
];

/// ARIA roles that indicate interactivity
const INTERACTIVE_ROLES: &[&str] = &[
    "button",
    "link",
    "checkbox",
    "radio",
    "textbox",
    "combobox",
    "listbox",
    "option",
    "menuitem",
    "tab",
    "switch",
    "slider",
    "spinbutton",
    "searchbox",
];

/// Identity of an element at observation time, compared against a live
/// probe before acting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub tag: String,
    pub text: String,
}

impl Fingerprint {
    /// Whether a live probe still describes the same element
    pub fn matches(&self, probe: &ElementProbe) -> bool {
        self.tag == probe.tag && self.text == normalize_text(&probe.text)
    }
}

/// One element of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedElement {
    pub handle: ElementHandle,
    pub descriptor: ElementDescriptor,
    /// Locator the browser can resolve again
    pub locator: String,
    pub fingerprint: Fingerprint,
}

impl IndexedElement {
    /// One-line rendering used in oracle prompts
    pub fn line(&self) -> String {
        format!("{} {}", self.handle, self.descriptor)
    }
}

/// Assigns handles to the actionable elements of a page
#[derive(Debug, Clone)]
pub struct ElementIndexer {
    /// Maximum characters per label
    max_label_chars: usize,
}

impl Default for ElementIndexer {
    fn default() -> Self {
        Self {
            max_label_chars: 80,
        }
    }
}

impl ElementIndexer {
    /// Create an indexer with a label length cap
    pub fn new(max_label_chars: usize) -> Self {
        Self { max_label_chars }
    }

    /// Index raw elements. Handles are contiguous from 0 in document order.
    pub fn index(&self, raw: &[RawElement], scroll: &ScrollPosition) -> Vec<IndexedElement> {
        raw.iter()
            .filter(|el| Self::is_interactive(el) && Self::is_actionable(el, scroll))
            .enumerate()
            .map(|(i, el)| IndexedElement {
                handle: ElementHandle(i as u32),
                descriptor: self.describe(el),
                locator: el.locator.clone(),
                fingerprint: Fingerprint {
                    tag: el.tag.clone(),
                    text: normalize_text(&el.text),
                },
            })
            .collect()
    }

    /// Check if an element can be clicked, typed into, or followed
    fn is_interactive(el: &RawElement) -> bool {
        if el.tag == "input" && el.input_type.as_deref() == Some("hidden") {
            return false;
        }
        if el.tag == "a" && el.href.is_none() && !el.clickable && el.role.is_none() {
            return false;
        }

        INTERACTIVE_TAGS.contains(&el.tag.as_str())
            || el
                .role
                .as_deref()
                .is_some_and(|role| INTERACTIVE_ROLES.contains(&role))
            || el.clickable
            || el.editable
    }

    /// Rendered, unobscured and at least partly in the viewport
    fn is_actionable(el: &RawElement, scroll: &ScrollPosition) -> bool {
        if !el.visible || el.obscured || !el.bounds.has_area() {
            return false;
        }
        // Unknown viewport geometry: trust the visibility flags alone
        if scroll.viewport_width <= 0.0 || scroll.viewport_height <= 0.0 {
            return true;
        }
        el.bounds
            .intersects_viewport(scroll.viewport_width, scroll.viewport_height)
    }

    fn describe(&self, el: &RawElement) -> ElementDescriptor {
        let kind = classify(el);
        let value = match kind {
            ElementKind::TextInput | ElementKind::TextArea | ElementKind::Select => {
                el.value.clone()
            }
            ElementKind::Editable => Some(normalize_text(&el.text)),
            _ => None,
        };

        ElementDescriptor {
            kind,
            tag: el.tag.clone(),
            role: el.role.clone(),
            label: truncate_chars(&label_for(el, kind), self.max_label_chars),
            value,
            enabled: !el.disabled,
            bounds: el.bounds,
        }
    }
}

/// Categorize an element from its tag, type and role
fn classify(el: &RawElement) -> ElementKind {
    let role = el.role.as_deref().unwrap_or("");
    let input_type = el.input_type.as_deref().unwrap_or("text").to_lowercase();

    match (el.tag.as_str(), role) {
        ("input", _) => match input_type.as_str() {
            "submit" | "button" | "reset" | "image" => ElementKind::Button,
            "checkbox" => ElementKind::Checkbox,
            "radio" => ElementKind::Radio,
            _ => ElementKind::TextInput,
        },
        ("textarea", _) => ElementKind::TextArea,
        ("select", _) => ElementKind::Select,
        ("option", _) | (_, "option") => ElementKind::ListOption,
        ("a", _) | (_, "link") => ElementKind::Link,
        ("button", _) | ("summary", _) | (_, "button") | (_, "menuitem") | (_, "tab") => {
            ElementKind::Button
        }
        (_, "checkbox") | (_, "switch") => ElementKind::Checkbox,
        (_, "radio") => ElementKind::Radio,
        (_, "combobox") | (_, "listbox") => ElementKind::Select,
        (_, "textbox") | (_, "searchbox") | (_, "spinbutton") => ElementKind::TextInput,
        _ if el.editable => ElementKind::Editable,
        _ => ElementKind::Other,
    }
}

/// Pick the most human-meaningful label available
fn label_for(el: &RawElement, kind: ElementKind) -> String {
    let text = normalize_text(&el.text);
    let text = (!text.is_empty() && kind != ElementKind::Editable).then_some(text);

    let button_value = match kind {
        ElementKind::Button => el.value.clone(),
        _ => None,
    };

    [
        el.aria_label.clone(),
        text,
        el.placeholder.clone(),
        el.title.clone(),
        el.alt.clone(),
        el.name.clone(),
        button_value,
        el.href.clone(),
    ]
    .into_iter()
    .flatten()
    .map(|candidate| normalize_text(&candidate))
    .find(|candidate| !candidate.is_empty())
    .unwrap_or_default()
}

/// Collapse runs of whitespace into single spaces
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate on a character boundary, marking the cut
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}
