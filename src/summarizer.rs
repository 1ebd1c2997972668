use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::settings::SummarySettings;

/// Sentences at or below this many words are dropped before scoring.
const MIN_SENTENCE_WORDS: usize = 5;
pub const DEFAULT_SENTENCES: usize = 3;

#[derive(Debug, Serialize)]
struct SummaryRequest<'a> {
    inputs: &'a str,
    parameters: GenerationParams,
}

#[derive(Debug, Serialize)]
struct GenerationParams {
    max_length: u32,
    min_length: u32,
    do_sample: bool,
}

#[derive(Debug, Deserialize)]
struct SummaryItem {
    #[serde(default)]
    summary_text: String,
}

/// The service answers either `[{"summary_text": ..}]` or `{"summary_text": ..}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SummaryResponse {
    List(Vec<SummaryItem>),
    Single(SummaryItem),
}

impl SummaryResponse {
    fn into_text(self) -> Option<String> {
        let item = match self {
            Self::List(items) => items.into_iter().next()?,
            Self::Single(item) => item,
        };
        let text = item.summary_text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

#[derive(Debug, Error)]
enum RemoteError {
    #[error("no API key configured")]
    NoCredentials,
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("service returned status {0}")]
    Status(u16),
    #[error("response had no summary text")]
    Empty,
}

/// Remote abstractive summarizer with a local extractive fallback.
pub struct Summarizer {
    client: reqwest::Client,
    settings: SummarySettings,
}

impl Summarizer {
    pub fn new(client: reqwest::Client, settings: SummarySettings) -> Self {
        Self { client, settings }
    }

    /// Never fails: any remote problem falls back to `extractive_summary`.
    pub async fn summarize(&self, text: &str) -> String {
        match self.remote(text).await {
            Ok(summary) => {
                info!("Remote summary: {} words", summary.split_whitespace().count());
                summary
            }
            Err(RemoteError::Transport(e)) => {
                error!("Error in summarization API call: {}", e);
                extractive_summary(text, DEFAULT_SENTENCES)
            }
            Err(e) => {
                warn!("Summarization API failed ({}). Using fallback summarizer.", e);
                extractive_summary(text, DEFAULT_SENTENCES)
            }
        }
    }

    async fn remote(&self, text: &str) -> Result<String, RemoteError> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(RemoteError::NoCredentials)?;

        let body = SummaryRequest {
            inputs: text,
            parameters: GenerationParams {
                max_length: self.settings.max_length,
                min_length: self.settings.min_length,
                do_sample: false,
            },
        };

        let response = self
            .client
            .post(&self.settings.api_url)
            .bearer_auth(api_key)
            .timeout(Duration::from_secs(self.settings.timeout_secs))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(RemoteError::Status(status.as_u16()));
        }

        // A 200 with an unexpected shape counts as no summary.
        let parsed: SummaryResponse = match response.json().await {
            Ok(p) => p,
            Err(e) if e.is_decode() => return Err(RemoteError::Empty),
            Err(e) => return Err(e.into()),
        };
        parsed.into_text().ok_or(RemoteError::Empty)
    }
}

/// Deterministic extractive summary: keep up to `count` sentences, favouring
/// longer and earlier ones, emitted in document order.
pub fn extractive_summary(text: &str, count: usize) -> String {
    let sentences: Vec<&str> = split_sentences(text)
        .into_iter()
        .filter(|s| s.split_whitespace().count() > MIN_SENTENCE_WORDS)
        .collect();

    if sentences.len() <= count {
        return sentences.join(" ");
    }

    let n = sentences.len() as f64;
    let mut scored: Vec<(usize, f64)> = sentences
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let words = s.split_whitespace().count() as f64;
            (i, words * (1.0 - i as f64 / n))
        })
        .collect();

    // Stable sort keeps the earlier sentence first on equal scores.
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    let mut picked: Vec<usize> = scored.into_iter().take(count).map(|(i, _)| i).collect();
    picked.sort_unstable();

    picked
        .into_iter()
        .map(|i| sentences[i])
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split after `.`, `!` or `?` when followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        if !chars.peek().is_some_and(|&(_, next)| next.is_whitespace()) {
            continue;
        }
        let sentence = text[start..i + c.len_utf8()].trim();
        if !sentence.is_empty() {
            out.push(sentence);
        }
        while chars.next_if(|&(_, w)| w.is_whitespace()).is_some() {}
        start = chars.peek().map_or(text.len(), |&(j, _)| j);
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = "The council met on Tuesday to discuss the new bridge. \
        Short one here. \
        Members argued for hours about the cost and the timeline of the whole project! \
        Residents asked whether parking near the entrance would be affected at all? \
        The mayor closed the meeting by thanking everyone who had come to speak tonight. \
        A vote is expected before the end of the month according to the clerk.";

    fn settings(url: &str, key: Option<&str>) -> SummarySettings {
        SummarySettings {
            api_url: url.to_string(),
            api_key: key.map(str::to_string),
            timeout_secs: 5,
            max_length: 150,
            min_length: 40,
        }
    }

    #[test]
    fn split_on_terminal_punctuation() {
        let s = split_sentences("One. Two!  Three?\nFour 3.5 stays. End");
        assert_eq!(s, vec!["One.", "Two!", "Three?", "Four 3.5 stays.", "End"]);
    }

    #[test]
    fn fallback_keeps_document_order() {
        let out = extractive_summary(ARTICLE, 3);
        assert_eq!(
            out,
            "The council met on Tuesday to discuss the new bridge. \
             Members argued for hours about the cost and the timeline of the whole project! \
             Residents asked whether parking near the entrance would be affected at all?"
        );
    }

    #[test]
    fn fallback_is_deterministic() {
        let a = extractive_summary(ARTICLE, 2);
        let b = extractive_summary(ARTICLE, 2);
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn fallback_returns_all_when_few() {
        let text = "This first sentence has plenty of words in it. Tiny. \
                    And the second sentence also has enough words.";
        assert_eq!(
            extractive_summary(text, 3),
            "This first sentence has plenty of words in it. \
             And the second sentence also has enough words."
        );
    }

    #[test]
    fn fallback_prefers_earlier_at_equal_length() {
        let text = "a b c d e one. a b c d e two. a b c d e three. a b c d e four.";
        assert_eq!(extractive_summary(text, 2), "a b c d e one. a b c d e two.");
    }

    #[test]
    fn fallback_on_empty_text() {
        assert_eq!(extractive_summary("", 3), "");
    }

    #[test]
    fn response_shapes() {
        let list: SummaryResponse = serde_json::from_str(r#"[{"summary_text":" hi "}]"#).unwrap();
        assert_eq!(list.into_text().as_deref(), Some("hi"));
        let single: SummaryResponse = serde_json::from_str(r#"{"summary_text":"yo"}"#).unwrap();
        assert_eq!(single.into_text().as_deref(), Some("yo"));
        let empty: SummaryResponse = serde_json::from_str("[]").unwrap();
        assert!(empty.into_text().is_none());
        let blank: SummaryResponse = serde_json::from_str(r#"{"error":"loading"}"#).unwrap();
        assert!(blank.into_text().is_none());
    }

    #[tokio::test]
    async fn remote_summary_is_used() {
        let server = httpmock::MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("POST")
                .path("/model")
                .header("authorization", "Bearer secret")
                .json_body(serde_json::json!({
                    "inputs": ARTICLE,
                    "parameters": {"max_length": 150, "min_length": 40, "do_sample": false}
                }));
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"[{"summary_text":"The council will vote on a bridge."}]"#);
        });

        let s = Summarizer::new(reqwest::Client::new(), settings(&server.url("/model"), Some("secret")));
        assert_eq!(s.summarize(ARTICLE).await, "The council will vote on a bridge.");
        mock.assert();
    }

    #[tokio::test]
    async fn service_unavailable_falls_back() {
        let server = httpmock::MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("POST").path("/model");
            then.status(503).body("loading");
        });

        let s = Summarizer::new(reqwest::Client::new(), settings(&server.url("/model"), Some("k")));
        assert_eq!(s.summarize(ARTICLE).await, extractive_summary(ARTICLE, DEFAULT_SENTENCES));
        mock.assert();
    }

    #[tokio::test]
    async fn malformed_body_falls_back() {
        let server = httpmock::MockServer::start();
        server.mock(|when, then| {
            when.method("POST").path("/model");
            then.status(200).body("not json");
        });

        let s = Summarizer::new(reqwest::Client::new(), settings(&server.url("/model"), Some("k")));
        assert_eq!(s.summarize(ARTICLE).await, extractive_summary(ARTICLE, DEFAULT_SENTENCES));
    }

    #[tokio::test]
    async fn missing_key_skips_remote() {
        let server = httpmock::MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("POST").path("/model");
            then.status(200).body(r#"{"summary_text":"remote"}"#);
        });

        let s = Summarizer::new(reqwest::Client::new(), settings(&server.url("/model"), None));
        assert_eq!(s.summarize(ARTICLE).await, extractive_summary(ARTICLE, DEFAULT_SENTENCES));
        mock.assert_calls(0);
    }

    #[tokio::test]
    async fn slow_service_falls_back() {
        let server = httpmock::MockServer::start();
        server.mock(|when, then| {
            when.method("POST").path("/model");
            then.status(200)
                .delay(std::time::Duration::from_secs(3))
                .body(r#"[{"summary_text":"too late"}]"#);
        });

        let mut cfg = settings(&server.url("/model"), Some("k"));
        cfg.timeout_secs = 1;
        let s = Summarizer::new(reqwest::Client::new(), cfg);
        assert_eq!(s.summarize(ARTICLE).await, extractive_summary(ARTICLE, DEFAULT_SENTENCES));
    }
}
