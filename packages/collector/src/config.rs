//! Environment-driven configuration.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

/// Process-wide collector configuration.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// OpenAI-compatible endpoint base URL.
    pub llm_api_url: String,
    pub llm_api_key: String,
    pub llm_model_name: String,

    /// Simultaneous per-source pipelines per batch.
    pub agent_max_concurrency: usize,
    /// Simultaneous LLM calls across the process.
    pub llm_max_concurrency: usize,
    /// LLM round-trip budget per section agent.
    pub agent_max_turns: usize,
    /// Cap on sections identified per source.
    pub max_sections: usize,
    /// Minimum delay between page fetches against one host.
    pub page_min_delay: Duration,
    /// Per page-load timeout.
    pub page_timeout: Duration,
    /// Per LLM-call timeout.
    pub llm_timeout: Duration,
    /// Hard walltime cap per section agent.
    pub section_walltime: Duration,
    /// Optional soft cap per batch; raises the cancel signal at expiry.
    pub batch_soft_timeout: Option<Duration>,

    pub default_time_range_days: u32,
    pub default_max_items: usize,

    /// User-agent presented by the page fetcher.
    pub user_agent: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            llm_api_url: String::new(),
            llm_api_key: String::new(),
            llm_model_name: String::new(),
            agent_max_concurrency: 5,
            llm_max_concurrency: 3,
            agent_max_turns: 15,
            max_sections: 5,
            page_min_delay: Duration::from_secs(2),
            page_timeout: Duration::from_secs(30),
            llm_timeout: Duration::from_secs(60),
            section_walltime: Duration::from_secs(600),
            batch_soft_timeout: None,
            default_time_range_days: 7,
            default_max_items: 30,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36"
                .to_string(),
        }
    }
}

impl CollectorConfig {
    /// Load configuration from environment variables (reading `.env` first).
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();
        let defaults = Self::default();

        Ok(Self {
            llm_api_url: env::var("LLM_API_URL").context("LLM_API_URL must be set")?,
            llm_api_key: env::var("LLM_API_KEY").context("LLM_API_KEY must be set")?,
            llm_model_name: env::var("LLM_MODEL_NAME").context("LLM_MODEL_NAME must be set")?,
            agent_max_concurrency: env_usize("AGENT_MAX_CONCURRENCY", defaults.agent_max_concurrency)?,
            llm_max_concurrency: env_usize("LLM_MAX_CONCURRENCY", defaults.llm_max_concurrency)?,
            agent_max_turns: env_usize("AGENT_MAX_TURNS", defaults.agent_max_turns)?,
            max_sections: env_usize("MAX_SECTIONS", defaults.max_sections)?,
            page_min_delay: Duration::from_secs(env_u64("PAGE_MIN_DELAY_SECS", 2)?),
            page_timeout: Duration::from_secs(env_u64("PAGE_TIMEOUT_SECS", 30)?),
            llm_timeout: Duration::from_secs(env_u64("LLM_TIMEOUT_SECS", 60)?),
            section_walltime: Duration::from_secs(env_u64("SECTION_WALLTIME_SECS", 600)?),
            batch_soft_timeout: match env::var("BATCH_SOFT_TIMEOUT_SECS") {
                Ok(v) => Some(Duration::from_secs(
                    v.parse().context("BATCH_SOFT_TIMEOUT_SECS must be a number")?,
                )),
                Err(_) => None,
            },
            default_time_range_days: env_u64("DEFAULT_TIME_RANGE_DAYS", 7)? as u32,
            default_max_items: env_usize("DEFAULT_MAX_ITEMS", defaults.default_max_items)?,
            user_agent: env::var("USER_AGENT").unwrap_or(defaults.user_agent),
        })
    }
}

fn env_usize(key: &str, default: usize) -> Result<usize> {
    match env::var(key) {
        Ok(v) => v.parse().with_context(|| format!("{key} must be a number")),
        Err(_) => Ok(default),
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(v) => v.parse().with_context(|| format!("{key} must be a number")),
        Err(_) => Ok(default),
    }
}
