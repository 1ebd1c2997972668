use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::{cache_key, Cache};
use crate::error::PipelineError;
use crate::extractor::Extractor;
use crate::summarizer::Summarizer;
use crate::validate::is_valid_url;

/// Unit returned to callers and persisted in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub url: String,
    pub title: String,
    pub summary: String,
    /// Words in `summary`.
    pub word_count: usize,
    /// Words in the extracted source text.
    pub original_length: usize,
    pub compression_ratio: f64,
    pub summarized_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub result: SummaryResult,
    pub from_cache: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    ValidatingInput,
    CheckingCache,
    Extracting,
    Summarizing,
    Persisting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ValidatingInput => "validating_input",
            Stage::CheckingCache => "checking_cache",
            Stage::Extracting => "extracting",
            Stage::Summarizing => "summarizing",
            Stage::Persisting => "persisting",
        };
        f.write_str(name)
    }
}

/// `original / summary`, rounded half-to-even to two decimals; 0 for an empty summary.
pub fn compression_ratio(original_length: usize, word_count: usize) -> f64 {
    if word_count == 0 {
        return 0.0;
    }
    let ratio = original_length as f64 / word_count as f64;
    (ratio * 100.0).round_ties_even() / 100.0
}

/// validate → cache read → extract → summarize → cache write.
pub struct Pipeline {
    cache: Cache,
    extractor: Extractor,
    summarizer: Summarizer,
}

impl Pipeline {
    pub fn new(cache: Cache, extractor: Extractor, summarizer: Summarizer) -> Self {
        Self {
            cache,
            extractor,
            summarizer,
        }
    }

    #[cfg(test)]
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub async fn run(&self, url: Option<&str>) -> Result<Outcome, PipelineError> {
        enter(Stage::ValidatingInput);
        let url = url
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| PipelineError::InvalidInput("URL is required".into()))?;
        if !is_valid_url(url) {
            return Err(PipelineError::InvalidInput("Invalid URL format".into()));
        }

        enter(Stage::CheckingCache);
        let key = cache_key(url);
        if let Some(result) = self.cache.get(&key) {
            info!("Returning cached summary for URL: {}", url);
            return Ok(Outcome {
                result,
                from_cache: true,
            });
        }

        enter(Stage::Extracting);
        info!("Fetching fresh content for URL: {}", url);
        let content = self.extractor.extract(url).await?;

        enter(Stage::Summarizing);
        let summary = self.summarizer.summarize(&content.text).await;
        if summary.trim().is_empty() {
            return Err(PipelineError::SummarizationFailed(
                "Failed to generate summary".into(),
            ));
        }

        enter(Stage::Persisting);
        let original_length = content.text.split_whitespace().count();
        let word_count = summary.split_whitespace().count();
        let result = SummaryResult {
            url: url.to_string(),
            title: content.title,
            summary,
            word_count,
            original_length,
            compression_ratio: compression_ratio(original_length, word_count),
            summarized_at: Utc::now(),
        };
        self.cache.put(&key, &result);

        info!("Successfully summarized and cached article from: {}", url);
        Ok(Outcome {
            result,
            from_cache: false,
        })
    }
}

fn enter(stage: Stage) {
    debug!(%stage, "pipeline stage");
}

// ── Tests ──
