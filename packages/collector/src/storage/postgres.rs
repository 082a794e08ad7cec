//! Postgres storage.
//!
//! Plain hand-written SQL over a shared pool. Writes happen only at task
//! boundaries (status transitions, end-of-task bulk insert), so one pool is
//! the only session factory the process needs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};

use super::Storage;
use crate::types::{
    ArticleItem, ContentKind, CrawlTask, MonitorSource, Report, TaskStatus, TriggerKind,
};

pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the collector tables when they do not exist yet.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS monitor_sources (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL,
                url TEXT NOT NULL,
                focus_areas JSONB NOT NULL DEFAULT '[]',
                max_depth INT NOT NULL DEFAULT 3,
                content_kinds JSONB NOT NULL DEFAULT '[]',
                time_range_days INT NOT NULL DEFAULT 7,
                max_items INT NOT NULL DEFAULT 30,
                allow_cross_domain BOOLEAN NOT NULL DEFAULT FALSE,
                crawl_rules TEXT,
                user_id BIGINT NOT NULL DEFAULT 1,
                is_active BOOLEAN NOT NULL DEFAULT TRUE
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create monitor_sources")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS crawl_tasks (
                id BIGSERIAL PRIMARY KEY,
                batch_id TEXT NOT NULL,
                source_id BIGINT NOT NULL,
                source_name TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'pending',
                trigger_kind TEXT NOT NULL DEFAULT 'manual',
                started_at TIMESTAMPTZ,
                completed_at TIMESTAMPTZ,
                items_found INT NOT NULL DEFAULT 0,
                error_log TEXT NOT NULL DEFAULT '',
                progress_log TEXT NOT NULL DEFAULT ''
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create crawl_tasks")?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_crawl_tasks_batch ON crawl_tasks (batch_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS article_items (
                id BIGSERIAL PRIMARY KEY,
                task_id BIGINT NOT NULL,
                source_id BIGINT NOT NULL,
                title TEXT NOT NULL,
                url TEXT NOT NULL,
                content_kind TEXT NOT NULL DEFAULT 'news',
                published_date DATE,
                summary TEXT NOT NULL DEFAULT '',
                tags JSONB NOT NULL DEFAULT '[]',
                position INT NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create article_items")?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_article_items_source ON article_items (source_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reports (
                id BIGSERIAL PRIMARY KEY,
                batch_id TEXT NOT NULL,
                title TEXT NOT NULL,
                overview TEXT NOT NULL DEFAULT '',
                content_html TEXT NOT NULL DEFAULT '',
                content_text TEXT NOT NULL DEFAULT '',
                generated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create reports")?;

        Ok(())
    }
}

fn parse_trigger(s: &str) -> TriggerKind {
    match s {
        "scheduled" => TriggerKind::Scheduled,
        _ => TriggerKind::Manual,
    }
}

fn parse_status(s: &str) -> TaskStatus {
    match s {
        "running" => TaskStatus::Running,
        "completed" => TaskStatus::Completed,
        "failed" => TaskStatus::Failed,
        "cancelled" => TaskStatus::Cancelled,
        _ => TaskStatus::Pending,
    }
}

fn row_to_task(row: &sqlx::postgres::PgRow) -> Result<CrawlTask> {
    Ok(CrawlTask {
        id: row.try_get("id")?,
        batch_id: row.try_get("batch_id")?,
        source_id: row.try_get("source_id")?,
        source_name: row.try_get("source_name")?,
        status: parse_status(row.try_get::<String, _>("status")?.as_str()),
        trigger: parse_trigger(row.try_get::<String, _>("trigger_kind")?.as_str()),
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        items_found: row.try_get::<i32, _>("items_found")? as usize,
        error_log: row.try_get("error_log")?,
        progress_log: row.try_get("progress_log")?,
    })
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn list_active_sources(&self, ids: Option<&[i64]>) -> Result<Vec<MonitorSource>> {
        let rows = match ids {
            Some(ids) => {
                sqlx::query(
                    "SELECT * FROM monitor_sources WHERE is_active AND id = ANY($1) ORDER BY id",
                )
                .bind(ids)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM monitor_sources WHERE is_active ORDER BY id")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .context("Failed to load sources")?;

        rows.iter()
            .map(|row| {
                Ok(MonitorSource {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    url: row.try_get("url")?,
                    focus_areas: serde_json::from_value(row.try_get("focus_areas")?)?,
                    max_depth: row.try_get::<i32, _>("max_depth")? as u32,
                    content_kinds: serde_json::from_value(row.try_get("content_kinds")?)?,
                    time_range_days: row.try_get::<i32, _>("time_range_days")? as u32,
                    max_items: row.try_get::<i32, _>("max_items")? as usize,
                    allow_cross_domain: row.try_get("allow_cross_domain")?,
                    crawl_rules: row.try_get("crawl_rules")?,
                    user_id: row.try_get("user_id")?,
                    is_active: row.try_get("is_active")?,
                })
            })
            .collect()
    }

    async fn create_task(&self, task: &CrawlTask) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO crawl_tasks (batch_id, source_id, source_name, status, trigger_kind)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&task.batch_id)
        .bind(task.source_id)
        .bind(&task.source_name)
        .bind(task.status.as_str())
        .bind(task.trigger.as_str())
        .fetch_one(&self.pool)
        .await
        .context("Failed to create task")?;
        Ok(row.try_get("id")?)
    }

    async fn get_task(&self, task_id: i64) -> Result<Option<CrawlTask>> {
        let row = sqlx::query("SELECT * FROM crawl_tasks WHERE id = $1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn list_tasks(&self, batch_id: &str) -> Result<Vec<CrawlTask>> {
        let rows = sqlx::query("SELECT * FROM crawl_tasks WHERE batch_id = $1 ORDER BY id")
            .bind(batch_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_task).collect()
    }

    async fn update_task_status(
        &self,
        task_id: i64,
        status: TaskStatus,
        items_found: Option<usize>,
        error: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now();
        // Transitions out of a terminal status are ignored by the WHERE guard.
        sqlx::query(
            r#"
            UPDATE crawl_tasks
            SET status = $2,
                started_at = CASE WHEN $2 = 'running' THEN $3 ELSE started_at END,
                completed_at = CASE WHEN $2 IN ('completed', 'failed', 'cancelled') THEN $3 ELSE completed_at END,
                items_found = COALESCE($4, items_found),
                error_log = COALESCE($5, error_log)
            WHERE id = $1 AND status NOT IN ('completed', 'failed', 'cancelled')
            "#,
        )
        .bind(task_id)
        .bind(status.as_str())
        .bind(now)
        .bind(items_found.map(|n| n as i32))
        .bind(error)
        .execute(&self.pool)
        .await
        .context("Failed to update task status")?;
        Ok(())
    }

    async fn append_progress(&self, task_id: i64, line: &str) -> Result<()> {
        sqlx::query("UPDATE crawl_tasks SET progress_log = progress_log || $2 || E'\n' WHERE id = $1")
            .bind(task_id)
            .bind(line)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn existing_urls(&self, source_id: i64) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT url FROM article_items WHERE source_id = $1")
            .bind(source_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| Ok(row.try_get("url")?))
            .collect()
    }

    async fn insert_items(
        &self,
        task_id: i64,
        source_id: i64,
        items: &[ArticleItem],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (position, item) in items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO article_items
                    (task_id, source_id, title, url, content_kind, published_date, summary, tags, position)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(task_id)
            .bind(source_id)
            .bind(&item.title)
            .bind(&item.url)
            .bind(item.content_kind.as_str())
            .bind(item.published_date)
            .bind(&item.summary)
            .bind(serde_json::to_value(&item.tags)?)
            .bind(position as i32)
            .execute(&mut *tx)
            .await
            .context("Failed to insert item")?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_items(&self, task_id: i64) -> Result<Vec<ArticleItem>> {
        let rows =
            sqlx::query("SELECT * FROM article_items WHERE task_id = $1 ORDER BY position, id")
                .bind(task_id)
                .fetch_all(&self.pool)
                .await?;
        rows.iter()
            .map(|row| {
                Ok(ArticleItem {
                    title: row.try_get("title")?,
                    url: row.try_get("url")?,
                    content_kind: ContentKind::parse(
                        row.try_get::<String, _>("content_kind")?.as_str(),
                    ),
                    published_date: row.try_get("published_date")?,
                    summary: row.try_get("summary")?,
                    tags: serde_json::from_value(row.try_get("tags")?)?,
                })
            })
            .collect()
    }

    async fn insert_report(&self, report: &Report) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reports (batch_id, title, overview, content_html, content_text, generated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&report.batch_id)
        .bind(&report.title)
        .bind(&report.overview)
        .bind(&report.content_html)
        .bind(&report.content_text)
        .bind(report.generated_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert report")?;
        Ok(())
    }

    async fn latest_report(&self) -> Result<Option<Report>> {
        let row = sqlx::query("SELECT * FROM reports ORDER BY generated_at DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok(Report {
                batch_id: row.try_get("batch_id")?,
                title: row.try_get("title")?,
                overview: row.try_get("overview")?,
                content_html: row.try_get("content_html")?,
                content_text: row.try_get("content_text")?,
                generated_at: row.try_get("generated_at")?,
            })
        })
        .transpose()
    }
}
