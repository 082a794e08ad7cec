//! Policy-intelligence collector.
//!
//! Periodically visits configured government/news sites, discovers newly
//! published articles inside a recency window, summarizes them with an LLM,
//! ranks them by strategic importance and emits a consolidated report.
//!
//! The crate is organized leaves-first:
//!
//! - [`browser`] — page fetching, date extraction, per-host pacing
//! - [`llm`] — the language-model seam over `llm-client`
//! - [`agent`] — the generic tool-calling loop, its tools and prompts
//! - [`orchestrator`] — the per-source four-phase pipeline and reports
//! - [`scheduler`] — batch creation, bounded concurrency, cancellation
//! - [`storage`] — persistence trait with Postgres and in-memory impls

pub mod agent;
pub mod browser;
pub mod config;
pub mod error;
pub mod events;
pub mod llm;
pub mod orchestrator;
pub mod scheduler;
pub mod storage;
pub mod types;

pub use config::CollectorConfig;
pub use error::{CollectError, Result};
pub use events::CollectorEvent;
pub use scheduler::{BatchScheduler, TriggerRequest};
pub use types::{
    canonicalize_url, ArticleItem, ContentKind, CrawlBatch, CrawlTask, MonitorSource, Report,
    TaskStatus, TimeWindow, TriggerKind,
};
