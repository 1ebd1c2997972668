use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "summarizer";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const DEFAULT_SUMMARY_URL: &str =
    "https://api-inference.huggingface.co/models/facebook/bart-large-cnn";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: PathBuf,
    pub fetch: FetchSettings,
    pub summary: SummarySettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Clone, Deserialize)]
pub struct SummarySettings {
    pub api_url: String,
    /// Bearer token; only ever supplied by the environment or a config file.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_length: u32,
    pub min_length: u32,
}

// Keep the token out of `{:?}` logs.
impl std::fmt::Debug for SummarySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummarySettings")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("max_length", &self.max_length)
            .field("min_length", &self.min_length)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub addr: String,
}

/// Defaults, then `<file>.toml` if present, then `SUMMARIZER__*` variables
/// (e.g. `SUMMARIZER__SUMMARY__API_KEY`).
pub fn load(file: &str) -> Result<Settings> {
    builder(file)?
        .add_source(
            Environment::with_prefix("SUMMARIZER")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()
        .context("Failed to build settings")?
        .try_deserialize()
        .context("Invalid settings")
}

fn builder(file: &str) -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
    Ok(Config::builder()
        .set_default("db_path", "data/summaries.sqlite")?
        .set_default("fetch.timeout_secs", 10_i64)?
        .set_default("fetch.user_agent", DEFAULT_USER_AGENT)?
        .set_default("summary.api_url", DEFAULT_SUMMARY_URL)?
        .set_default("summary.timeout_secs", 30_i64)?
        .set_default("summary.max_length", 150_i64)?
        .set_default("summary.min_length", 40_i64)?
        .set_default("server.addr", "127.0.0.1:3000")?
        .add_source(File::with_name(file).required(false)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let s: Settings = builder("does-not-exist")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(s.fetch.timeout_secs, 10);
        assert_eq!(s.summary.timeout_secs, 30);
        assert_eq!(s.summary.max_length, 150);
        assert_eq!(s.summary.min_length, 40);
        assert!(s.summary.api_key.is_none());
        assert!(s.fetch.user_agent.starts_with("Mozilla/5.0"));
    }

    #[test]
    fn overrides_apply() {
        let s: Settings = builder("does-not-exist")
            .unwrap()
            .set_override("summary.api_key", "hf_test")
            .unwrap()
            .set_override("server.addr", "0.0.0.0:9000")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(s.summary.api_key.as_deref(), Some("hf_test"));
        assert_eq!(s.server.addr, "0.0.0.0:9000");
    }

    #[test]
    fn debug_redacts_key() {
        let s = SummarySettings {
            api_url: "http://x".into(),
            api_key: Some("hf_secret".into()),
            timeout_secs: 1,
            max_length: 1,
            min_length: 1,
        };
        assert!(!format!("{:?}", s).contains("hf_secret"));
    }
}
