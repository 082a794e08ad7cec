//! Core domain types shared across the collector.

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Category assigned to a collected article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    News,
    Policy,
    Notice,
    File,
}

impl ContentKind {
    /// Parse a kind string, falling back to `News` for anything unknown.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "policy" => ContentKind::Policy,
            "notice" => ContentKind::Notice,
            "file" => ContentKind::File,
            _ => ContentKind::News,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::News => "news",
            ContentKind::Policy => "policy",
            ContentKind::Notice => "notice",
            ContentKind::File => "file",
        }
    }

    /// Human label used in reports.
    pub fn label(&self) -> &'static str {
        match self {
            ContentKind::News => "News",
            ContentKind::Policy => "Policy",
            ContentKind::Notice => "Notice",
            ContentKind::File => "Document",
        }
    }
}

/// What started a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Manual,
    Scheduled,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Manual => "manual",
            TriggerKind::Scheduled => "scheduled",
        }
    }
}

/// Lifecycle of one per-source task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

/// Configuration of one monitored site. Created by users; read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSource {
    pub id: i64,
    pub name: String,
    pub url: String,
    /// Topic keywords guiding section selection.
    #[serde(default)]
    pub focus_areas: Vec<String>,
    pub max_depth: u32,
    /// Which content kinds this source accepts.
    #[serde(default)]
    pub content_kinds: Vec<ContentKind>,
    /// Collect content published within the last N days.
    pub time_range_days: u32,
    /// Cap on items persisted per crawl.
    pub max_items: usize,
    /// Whether links leaving the source's root domain are followed.
    pub allow_cross_domain: bool,
    /// Free-form selection rules injected into prompts.
    pub crawl_rules: Option<String>,
    pub user_id: i64,
    pub is_active: bool,
}

impl MonitorSource {
    /// The recency window this source accepts, anchored at today.
    pub fn time_window(&self) -> TimeWindow {
        TimeWindow::last_days(self.time_range_days)
    }
}

/// Inclusive date range used to accept or reject articles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeWindow {
    /// Window covering the last `days` days up to today (local time).
    pub fn last_days(days: u32) -> Self {
        let end = Local::now().date_naive();
        let start = end - chrono::Duration::days(i64::from(days));
        Self { start, end }
    }

    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// One trigger's unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlBatch {
    pub id: String,
    pub trigger: TriggerKind,
    pub created_at: DateTime<Utc>,
}

impl CrawlBatch {
    /// Create a batch with a fresh opaque id.
    pub fn new(trigger: TriggerKind) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string()[..12].to_string();
        Self {
            id,
            trigger,
            created_at: Utc::now(),
        }
    }
}

/// Work for one source within a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlTask {
    pub id: i64,
    pub batch_id: String,
    pub source_id: i64,
    pub source_name: String,
    pub status: TaskStatus,
    pub trigger: TriggerKind,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub items_found: usize,
    pub error_log: String,
    pub progress_log: String,
}

impl CrawlTask {
    pub fn new(batch_id: &str, source: &MonitorSource, trigger: TriggerKind) -> Self {
        Self {
            id: 0,
            batch_id: batch_id.to_string(),
            source_id: source.id,
            source_name: source.name.clone(),
            status: TaskStatus::Pending,
            trigger,
            started_at: None,
            completed_at: None,
            items_found: 0,
            error_log: String::new(),
            progress_log: String::new(),
        }
    }
}

/// One discovered article.
///
/// Materialized during section crawling; summarization assigns `summary`,
/// `tags` and may normalize `content_kind`; ranking only reorders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleItem {
    pub title: String,
    /// Canonical absolute URL, unique within a task.
    pub url: String,
    pub content_kind: ContentKind,
    pub published_date: Option<NaiveDate>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Consolidated output of one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub batch_id: String,
    pub title: String,
    /// LLM-written narrative header; empty when generation failed.
    pub overview: String,
    pub content_html: String,
    pub content_text: String,
    pub generated_at: DateTime<Utc>,
}

/// Canonicalize a URL for deduplication.
///
/// Lower-cases scheme and host, strips the fragment and drops default ports
/// (the `url` crate performs all three on parse/serialize). Returns `None`
/// for anything that is not an absolute http(s) URL.
pub fn canonicalize_url(raw: &str) -> Option<String> {
    let mut parsed = Url::parse(raw.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.set_fragment(None);
    Some(parsed.to_string())
}
