use anyhow::Result;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::debug;

use crate::chunking::normalize_whitespace;

/// Plain-text view of a fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    /// The page title
    pub title: String,
    /// All visible text, in document order
    pub text: String,
}

/// Elements whose text is never page content.
const SKIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "template", "head", "svg", "iframe",
];

/// Extract the title and visible text from an HTML document.
///
/// This is the extraction callback handed to the crawler; keeping it a named
/// function makes it testable on its own.
#[inline]
pub fn extract_page(html: &str) -> Result<ExtractedPage> {
    let document = Html::parse_document(html);

    let title = extract_title(&document);
    let text = extract_text(&document);

    debug!(
        "Extracted page: title='{}', {} chars of text",
        title,
        text.len()
    );

    Ok(ExtractedPage { title, text })
}

/// Extract the page title, trying progressively weaker selectors.
fn extract_title(document: &Html) -> String {
    let title_selectors = ["title", "h1", ".page-title", ".title", "#title"];

    for selector_str in &title_selectors {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(element) = document.select(&selector).next() {
                let title = normalize_whitespace(&element.text().collect::<String>());
                if !title.is_empty() {
                    return title;
                }
            }
        }
    }

    "Untitled".to_string()
}

/// Collect all text nodes outside of skipped subtrees, in document order.
fn extract_text(document: &Html) -> String {
    let mut text = String::new();

    for node in document.root_element().descendants() {
        if let Node::Text(fragment) = node.value() {
            let skipped = node
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|element| SKIPPED_ELEMENTS.contains(&element.value().name()));
            if skipped {
                continue;
            }
            text.push_str(fragment);
            // Element boundaries separate words even without whitespace in
            // the markup.
            text.push(' ');
        }
    }

    text
}
