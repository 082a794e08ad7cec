//! In-memory storage for tests and demos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use super::Storage;
use crate::types::{ArticleItem, CrawlTask, MonitorSource, Report, TaskStatus};

#[derive(Default)]
pub struct MemoryStorage {
    sources: RwLock<Vec<MonitorSource>>,
    tasks: RwLock<HashMap<i64, CrawlTask>>,
    items: RwLock<HashMap<i64, Vec<ArticleItem>>>,
    reports: RwLock<Vec<Report>>,
    next_task_id: AtomicI64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            next_task_id: AtomicI64::new(1),
            ..Default::default()
        }
    }

    pub fn add_source(&self, source: MonitorSource) {
        self.sources.write().unwrap().push(source);
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn list_active_sources(&self, ids: Option<&[i64]>) -> Result<Vec<MonitorSource>> {
        let sources = self.sources.read().unwrap();
        Ok(sources
            .iter()
            .filter(|s| s.is_active)
            .filter(|s| ids.map_or(true, |ids| ids.contains(&s.id)))
            .cloned()
            .collect())
    }

    async fn create_task(&self, task: &CrawlTask) -> Result<i64> {
        let id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
        let mut stored = task.clone();
        stored.id = id;
        self.tasks.write().unwrap().insert(id, stored);
        Ok(id)
    }

    async fn get_task(&self, task_id: i64) -> Result<Option<CrawlTask>> {
        Ok(self.tasks.read().unwrap().get(&task_id).cloned())
    }

    async fn list_tasks(&self, batch_id: &str) -> Result<Vec<CrawlTask>> {
        let mut tasks: Vec<CrawlTask> = self
            .tasks
            .read()
            .unwrap()
            .values()
            .filter(|t| t.batch_id == batch_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.id);
        Ok(tasks)
    }

    async fn update_task_status(
        &self,
        task_id: i64,
        status: TaskStatus,
        items_found: Option<usize>,
        error: Option<&str>,
    ) -> Result<()> {
        let mut tasks = self.tasks.write().unwrap();
        let Some(task) = tasks.get_mut(&task_id) else {
            anyhow::bail!("task {task_id} not found");
        };
        if task.status.is_terminal() {
            warn!(
                task_id,
                from = task.status.as_str(),
                to = status.as_str(),
                "ignoring transition out of a terminal status"
            );
            return Ok(());
        }
        task.status = status;
        match status {
            TaskStatus::Running => task.started_at = Some(Utc::now()),
            s if s.is_terminal() => task.completed_at = Some(Utc::now()),
            _ => {}
        }
        if let Some(count) = items_found {
            task.items_found = count;
        }
        if let Some(error) = error {
            task.error_log = error.to_string();
        }
        Ok(())
    }

    async fn append_progress(&self, task_id: i64, line: &str) -> Result<()> {
        let mut tasks = self.tasks.write().unwrap();
        if let Some(task) = tasks.get_mut(&task_id) {
            task.progress_log.push_str(line);
            task.progress_log.push('\n');
        }
        Ok(())
    }

    async fn existing_urls(&self, source_id: i64) -> Result<Vec<String>> {
        let tasks = self.tasks.read().unwrap();
        let items = self.items.read().unwrap();
        let mut urls = Vec::new();
        for (task_id, task_items) in items.iter() {
            let belongs = tasks
                .get(task_id)
                .map(|t| t.source_id == source_id)
                .unwrap_or(false);
            if belongs {
                urls.extend(task_items.iter().map(|i| i.url.clone()));
            }
        }
        Ok(urls)
    }

    async fn insert_items(
        &self,
        task_id: i64,
        _source_id: i64,
        items: &[ArticleItem],
    ) -> Result<()> {
        self.items
            .write()
            .unwrap()
            .entry(task_id)
            .or_default()
            .extend(items.iter().cloned());
        Ok(())
    }

    async fn list_items(&self, task_id: i64) -> Result<Vec<ArticleItem>> {
        Ok(self
            .items
            .read()
            .unwrap()
            .get(&task_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert_report(&self, report: &Report) -> Result<()> {
        self.reports.write().unwrap().push(report.clone());
        Ok(())
    }

    async fn latest_report(&self) -> Result<Option<Report>> {
        Ok(self.reports.read().unwrap().last().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TriggerKind;

    fn source(id: i64) -> MonitorSource {
        MonitorSource {
            id,
            name: format!("source-{id}"),
            url: "https://example.gov/".into(),
            focus_areas: vec![],
            max_depth: 3,
            content_kinds: vec![],
            time_range_days: 7,
            max_items: 30,
            allow_cross_domain: false,
            crawl_rules: None,
            user_id: 1,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_terminal_status_is_one_way() {
        let storage = MemoryStorage::new();
        storage.add_source(source(1));
        let task = CrawlTask::new("batch1", &source(1), TriggerKind::Manual);
        let id = storage.create_task(&task).await.unwrap();

        storage
            .update_task_status(id, TaskStatus::Running, None, None)
            .await
            .unwrap();
        storage
            .update_task_status(id, TaskStatus::Cancelled, None, None)
            .await
            .unwrap();
        // A late "completed" must not overwrite the terminal state.
        storage
            .update_task_status(id, TaskStatus::Completed, Some(5), None)
            .await
            .unwrap();

        let task = storage.get_task(id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert!(task.completed_at.is_some());
        assert_eq!(task.items_found, 0);
    }

    #[tokio::test]
    async fn test_existing_urls_cross_task_same_source() {
        let storage = MemoryStorage::new();
        let task = CrawlTask::new("b1", &source(7), TriggerKind::Manual);
        let id = storage.create_task(&task).await.unwrap();
        storage
            .insert_items(
                id,
                7,
                &[ArticleItem {
                    title: "t".into(),
                    url: "https://example.gov/a.htm".into(),
                    content_kind: crate::types::ContentKind::News,
                    published_date: None,
                    summary: String::new(),
                    tags: vec![],
                }],
            )
            .await
            .unwrap();

        let urls = storage.existing_urls(7).await.unwrap();
        assert_eq!(urls, vec!["https://example.gov/a.htm".to_string()]);
        assert!(storage.existing_urls(8).await.unwrap().is_empty());
    }
}
