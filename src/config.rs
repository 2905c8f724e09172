use crate::candidate::Language;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

pub const DEFAULT_BASE_URL: &str = "https://turkcealtyazi.org";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub out_dir: PathBuf,
    /// Polite pause between phases, in seconds.
    pub delay_secs: f64,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
    pub accept_language: String,
    pub languages: Vec<Language>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            out_dir: PathBuf::from("./subs"),
            delay_secs: 1.0,
            timeout_secs: 20,
            connect_timeout_secs: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: "tr-TR,tr;q=0.9,en-US;q=0.8,en;q=0.7".to_string(),
            languages: vec![Language::Turkish, Language::English],
        }
    }
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.as_ref().display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let base = self.base_url.trim();
        if base.is_empty() {
            anyhow::bail!("base_url missing");
        }
        if !base.starts_with("http://") && !base.starts_with("https://") {
            anyhow::bail!("base_url must be an http(s) URL: {base}");
        }
        if Duration::try_from_secs_f64(self.delay_secs).is_err() {
            anyhow::bail!("delay must be a non-negative number of seconds: {}", self.delay_secs);
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("timeout must be at least one second");
        }
        if self.languages.is_empty() {
            anyhow::bail!("at least one language is required");
        }
        if self.languages.contains(&Language::Unknown) {
            anyhow::bail!("languages may only contain tr and en");
        }
        Ok(())
    }

    /// Base URL without a trailing slash.
    pub fn base(&self) -> &str {
        self.base_url.trim().trim_end_matches('/')
    }

    /// Zero when `delay_secs` does not fit a `Duration`; `validate` rejects those.
    pub fn delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.delay_secs).unwrap_or_default()
    }
}
