use std::time::Duration;

use reqwest::header::USER_AGENT;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::{error, info};

use crate::error::PipelineError;

/// Regions tried in order; the first one with a match wins.
const CONTENT_SELECTORS: &[&str] = &["article", ".article-body", ".story-content", "main", "#content"];
/// Subtrees whose text never counts as article content.
const STRIPPED_TAGS: &[&str] = &["script", "style", "nav", "footer", "header", "aside"];

const MIN_WORDS: usize = 50;
const MAX_CHARS: usize = 5000;
const DEFAULT_TITLE: &str = "Article";

/// Article body and title from one page, as handed to the summarizer.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedContent {
    pub text: String,
    pub title: String,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("request failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("content too short ({0} words)")]
    TooShort(usize),
}

pub struct Extractor {
    client: reqwest::Client,
    user_agent: String,
    timeout: Duration,
}

impl Extractor {
    pub fn new(client: reqwest::Client, user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
            timeout,
        }
    }

    /// Fetch `url` and pull its article text and title.
    pub async fn extract(&self, url: &str) -> Result<ExtractedContent, PipelineError> {
        self.try_extract(url).await.map_err(|e| {
            error!("Error extracting article content from {}: {}", url, e);
            PipelineError::ContentExtractionFailed("Failed to extract article content".into())
        })
    }

    async fn try_extract(&self, url: &str) -> Result<ExtractedContent, ExtractError> {
        let html = self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let content = extract_from_html(&html)?;
        info!(
            "Extracted {} chars from {} (title: {:?})",
            content.text.chars().count(),
            url,
            content.title
        );
        Ok(content)
    }
}

/// Derive article text and title from a full HTML document.
pub fn extract_from_html(html: &str) -> Result<ExtractedContent, ExtractError> {
    let doc = Html::parse_document(html);

    let mut parts: Vec<String> = Vec::new();
    for css in CONTENT_SELECTORS {
        let Ok(sel) = Selector::parse(css) else { continue };
        let matches: Vec<ElementRef> = doc.select(&sel).filter(|el| !is_stripped(el)).collect();
        if !matches.is_empty() {
            parts.extend(matches.iter().map(visible_text));
            break;
        }
    }

    if parts.is_empty() {
        if let Ok(sel) = Selector::parse("p") {
            parts.extend(doc.select(&sel).filter(|el| !is_stripped(el)).map(|el| visible_text(&el)));
        }
    }

    let text = collapse_whitespace(&parts.join(" "));
    let words = text.split_whitespace().count();
    if words < MIN_WORDS {
        return Err(ExtractError::TooShort(words));
    }

    Ok(ExtractedContent {
        text: text.chars().take(MAX_CHARS).collect(),
        title: title_of(&doc),
    })
}

fn title_of(doc: &Html) -> String {
    ["title", "h1"]
        .iter()
        .filter_map(|css| Selector::parse(css).ok())
        .find_map(|sel| {
            let el = doc.select(&sel).next()?;
            let t = collapse_whitespace(&el.text().collect::<String>());
            (!t.is_empty()).then_some(t)
        })
        .unwrap_or_else(|| DEFAULT_TITLE.to_string())
}

fn is_stripped_tag(name: &str) -> bool {
    STRIPPED_TAGS.contains(&name)
}

/// True if the element is, or sits inside, a subtree that gets stripped.
fn is_stripped(el: &ElementRef) -> bool {
    is_stripped_tag(el.value().name())
        || el
            .ancestors()
            .any(|n| n.value().as_element().is_some_and(|e| is_stripped_tag(e.name())))
}

/// Space-joined text under `el`, skipping stripped subtrees.
fn visible_text(el: &ElementRef) -> String {
    el.descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node
                .ancestors()
                .any(|n| n.value().as_element().is_some_and(|e| is_stripped_tag(e.name())));
            if hidden {
                return None;
            }
            let t = text.trim();
            (!t.is_empty()).then_some(t)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Tests ──
