//! Full-page retrieval for a single article URL.

use crate::utils::{collapse_whitespace, truncate_chars};
use log::{debug, warn};
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};

pub const MAX_CONTENT_CHARS: usize = 5000;

/// Subtrees that never contribute readable text.
const EXCLUDED_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "aside",
];

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("valid selector"));
static ARTICLE: Lazy<Selector> = Lazy::new(|| Selector::parse("article").expect("valid selector"));
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("valid selector"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullContent {
    pub title: String,
    pub content: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FullContent {
    fn failed(error: String) -> Self {
        Self {
            title: String::new(),
            content: String::new(),
            success: false,
            error: Some(error),
        }
    }
}

fn is_excluded(element: &ElementRef<'_>) -> bool {
    EXCLUDED_TAGS.contains(&element.value().name())
}

/// Text under `root`, skipping excluded subtrees.
fn readable_text(root: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in root.descendants() {
        let text = match node.value() {
            Node::Text(text) => text,
            _ => continue,
        };
        let hidden = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .take_while(|ancestor| ancestor.id() != root.id())
            .any(|ancestor| is_excluded(&ancestor));
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    out
}

/// Title plus readable text of an HTML document, preferring its first
/// `<article>`, capped at [`MAX_CONTENT_CHARS`].
pub fn extract_readable(html: &str) -> (String, String) {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE)
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .unwrap_or_default();

    let root = document
        .select(&ARTICLE)
        .next()
        .or_else(|| document.select(&BODY).next())
        .unwrap_or_else(|| document.root_element());

    let text = if is_excluded(&root) {
        String::new()
    } else {
        collapse_whitespace(&readable_text(root))
    };
    (title, truncate_chars(&text, MAX_CONTENT_CHARS))
}

/// Never fails; errors are reported in the returned value.
pub async fn fetch_full_content(client: &Client, url: &str) -> FullContent {
    debug!("Fetching full content from {}", url);
    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!("Content fetch failed for {}: {}", url, e);
            return FullContent::failed(format!("Request failed: {}", e));
        }
    };

    let status = response.status();
    if !status.is_success() {
        return FullContent::failed(format!("HTTP {} fetching {}", status, url));
    }

    let html = match response.text().await {
        Ok(html) => html,
        Err(e) => return FullContent::failed(format!("Could not read response body: {}", e)),
    };

    let (title, content) = extract_readable(&html);
    FullContent {
        title,
        content,
        success: true,
        error: None,
    }
}
