//! State snapshotter
//!
//! Combines indexed elements with page metadata and condensed visible text
//! into one bounded [`Snapshot`]. Capturing only reads from the browser.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::browser::{Browser, PageMetadata, RawElement, ScrollPosition, TextBlock};
use crate::core::config::SnapshotConfig;
use crate::core::{ElementHandle, Result};
use crate::perception::indexer::{normalize_text, ElementIndexer, IndexedElement};

/// What was cut to keep the snapshot within budget
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Truncation {
    /// Indexed elements beyond the element budget
    pub elements_dropped: usize,
    /// Text blocks that did not fit the text budget
    pub text_blocks_dropped: usize,
}

/// Normalized, bounded view of the page at one instant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub url: String,
    pub title: String,
    /// Indexed elements; `elements[i].handle == i`
    pub elements: Vec<IndexedElement>,
    /// Condensed visible text
    pub text: String,
    pub scroll: ScrollPosition,
    pub captured_at: DateTime<Utc>,
    pub truncation: Truncation,
}

impl Snapshot {
    /// Get an element by handle
    pub fn element(&self, handle: ElementHandle) -> Option<&IndexedElement> {
        self.elements
            .get(handle.0 as usize)
            .filter(|el| el.handle == handle)
    }

    /// Check whether a handle exists in this snapshot
    pub fn contains(&self, handle: ElementHandle) -> bool {
        self.element(handle).is_some()
    }

    /// Number of indexed elements
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Find elements whose label matches `text`.
    ///
    /// Exact (case-insensitive) matches win over substring matches; results
    /// are in handle order.
    pub fn find_by_label(&self, text: &str) -> Vec<&IndexedElement> {
        let wanted = normalize_text(text).to_lowercase();
        if wanted.is_empty() {
            return Vec::new();
        }

        let exact: Vec<&IndexedElement> = self
            .elements
            .iter()
            .filter(|el| el.descriptor.label.to_lowercase() == wanted)
            .collect();
        if !exact.is_empty() {
            return exact;
        }

        self.elements
            .iter()
            .filter(|el| el.descriptor.label.to_lowercase().contains(&wanted))
            .collect()
    }

    /// One-line description for history entries
    pub fn summary(&self) -> String {
        let title = if self.title.is_empty() {
            "untitled"
        } else {
            self.title.as_str()
        };
        format!(
            "{} ({}) - {} elements",
            title,
            self.url,
            self.elements.len()
        )
    }

    /// Format the snapshot for an oracle prompt
    pub fn format_for_oracle(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("URL: {}\n", self.url));
        output.push_str(&format!("Title: {}\n", self.title));
        output.push_str(&format!(
            "Scroll: {:.0}% ({:.0}px below)\n",
            self.scroll.scroll_percentage(),
            self.scroll.pixels_below()
        ));

        output.push_str("\nInteractive elements:\n");
        if self.elements.is_empty() {
            output.push_str("  (none visible)\n");
        }
        for element in &self.elements {
            output.push_str("  ");
            output.push_str(&element.line());
            output.push('\n');
        }
        if self.truncation.elements_dropped > 0 {
            output.push_str(&format!(
                "  ({} more elements not shown)\n",
                self.truncation.elements_dropped
            ));
        }

        if !self.text.is_empty() {
            output.push_str("\nPage text:\n");
            output.push_str(&self.text);
            output.push('\n');
        }

        output
    }
}

/// Captures snapshots within the configured bounds
#[derive(Debug, Clone)]
pub struct Snapshotter {
    indexer: ElementIndexer,
    max_elements: usize,
    max_chars: usize,
    max_text_chars: usize,
}

impl Snapshotter {
    /// Create a snapshotter from config
    pub fn new(config: &SnapshotConfig) -> Self {
        Self {
            indexer: ElementIndexer::new(config.max_label_chars),
            max_elements: config.max_elements,
            max_chars: config.max_chars,
            max_text_chars: config.max_text_chars,
        }
    }

    /// Read the current page state from the browser
    pub async fn capture(&self, browser: &dyn Browser) -> Result<Snapshot> {
        let metadata = browser.page_metadata().await?;
        let raw = browser.query_elements().await?;
        let blocks = browser.visible_text().await?;

        let snapshot = self.assemble(metadata, &raw, &blocks);
        debug!(
            url = %snapshot.url,
            elements = snapshot.elements.len(),
            dropped = snapshot.truncation.elements_dropped,
            "snapshot captured"
        );
        Ok(snapshot)
    }

    /// Build a snapshot from already-fetched page data
    pub fn assemble(
        &self,
        metadata: PageMetadata,
        raw: &[RawElement],
        blocks: &[TextBlock],
    ) -> Snapshot {
        let mut indexed = self.indexer.index(raw, &metadata.scroll);

        // Elements get the budget first; handles stay contiguous because
        // only a suffix is dropped
        let mut used = 0usize;
        let mut keep = 0usize;
        for element in indexed.iter().take(self.max_elements) {
            let cost = element.line().chars().count() + 1;
            if used + cost > self.max_chars {
                break;
            }
            used += cost;
            keep += 1;
        }
        let elements_dropped = indexed.len() - keep;
        indexed.truncate(keep);

        let text_budget = self.max_text_chars.min(self.max_chars.saturating_sub(used));
        let (text, text_blocks_dropped) =
            condense_text(blocks, metadata.scroll.viewport_height, text_budget);

        Snapshot {
            url: metadata.url,
            title: metadata.title,
            elements: indexed,
            text,
            scroll: metadata.scroll,
            captured_at: Utc::now(),
            truncation: Truncation {
                elements_dropped,
                text_blocks_dropped,
            },
        }
    }
}

/// Pick the text blocks nearest the viewport that fit in `budget` chars,
/// then restore document order
fn condense_text(blocks: &[TextBlock], viewport_height: f64, budget: usize) -> (String, usize) {
    let mut ranked: Vec<(usize, f64)> = blocks
        .iter()
        .enumerate()
        .map(|(i, block)| (i, distance_from_viewport(block.top, viewport_height)))
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

    let mut chosen = Vec::new();
    let mut used = 0usize;
    for (i, _) in ranked {
        let text = normalize_text(&blocks[i].text);
        if text.is_empty() {
            continue;
        }
        let cost = text.chars().count() + 1;
        if used + cost > budget {
            continue;
        }
        used += cost;
        chosen.push((i, text));
    }
    chosen.sort_by_key(|(i, _)| *i);

    let dropped = blocks.len() - chosen.len();
    let text = chosen
        .into_iter()
        .map(|(_, text)| text)
        .collect::<Vec<_>>()
        .join("\n");
    (text, dropped)
}

fn distance_from_viewport(top: f64, viewport_height: f64) -> f64 {
    if viewport_height <= 0.0 {
        return top.abs();
    }
    if top < 0.0 {
        -top
    } else if top >= viewport_height {
        top - viewport_height
    } else {
        0.0
    }
}
