//! Persistence seam.
//!
//! The orchestrator writes task transitions, items and reports through this
//! trait; sources are read-only. [`MemoryStorage`] backs tests and demos,
//! [`PostgresStorage`] is the production impl.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{ArticleItem, CrawlTask, MonitorSource, Report, TaskStatus};

#[async_trait]
pub trait Storage: Send + Sync {
    /// Active sources, optionally restricted to the given ids.
    async fn list_active_sources(&self, ids: Option<&[i64]>) -> Result<Vec<MonitorSource>>;

    /// Insert a task and return its id.
    async fn create_task(&self, task: &CrawlTask) -> Result<i64>;

    async fn get_task(&self, task_id: i64) -> Result<Option<CrawlTask>>;

    async fn list_tasks(&self, batch_id: &str) -> Result<Vec<CrawlTask>>;

    /// Transition a task's status.
    ///
    /// Sets `started_at` on the move to `Running` and `completed_at` on any
    /// terminal status. Transitions out of a terminal status are ignored.
    async fn update_task_status(
        &self,
        task_id: i64,
        status: TaskStatus,
        items_found: Option<usize>,
        error: Option<&str>,
    ) -> Result<()>;

    /// Append one line to a task's progress log.
    async fn append_progress(&self, task_id: i64, line: &str) -> Result<()>;

    /// All URLs previously persisted for a source, for deduplication.
    async fn existing_urls(&self, source_id: i64) -> Result<Vec<String>>;

    /// Bulk insert a task's items at end-of-task.
    async fn insert_items(
        &self,
        task_id: i64,
        source_id: i64,
        items: &[ArticleItem],
    ) -> Result<()>;

    async fn list_items(&self, task_id: i64) -> Result<Vec<ArticleItem>>;

    async fn insert_report(&self, report: &Report) -> Result<()>;

    async fn latest_report(&self) -> Result<Option<Report>>;
}
