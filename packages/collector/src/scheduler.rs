//! Batch scheduler: turns a trigger into per-source tasks, bounds
//! cross-source concurrency, and owns per-batch cancellation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::browser::PageFetcher;
use crate::config::CollectorConfig;
use crate::error::CollectError;
use crate::events::CollectorEvent;
use crate::llm::LanguageModel;
use crate::orchestrator::Pipeline;
use crate::storage::Storage;
use crate::types::{CrawlBatch, CrawlTask, MonitorSource, TriggerKind};

/// A trigger request: which sources to crawl (`None` = all active) and what
/// started it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub source_ids: Option<Vec<i64>>,
    pub trigger: TriggerKind,
}

/// Process-wide scheduler. Clone-cheap; all state lives behind one `Arc`.
#[derive(Clone)]
pub struct BatchScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    pipeline: Pipeline,
    storage: Arc<dyn Storage>,
    config: CollectorConfig,
    events: broadcast::Sender<CollectorEvent>,
    /// Sources currently being crawled, across all batches.
    running_sources: Mutex<HashSet<i64>>,
    /// Cancel signal per in-flight batch.
    batch_tokens: Mutex<HashMap<String, CancellationToken>>,
}

/// Work assembled by `prepare`, consumed by `execute`.
struct PreparedBatch {
    batch_id: String,
    sources: Vec<MonitorSource>,
    task_ids: Vec<i64>,
    token: CancellationToken,
}

impl BatchScheduler {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        fetcher: Arc<dyn PageFetcher>,
        storage: Arc<dyn Storage>,
        config: CollectorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        let pipeline = Pipeline::new(
            model,
            fetcher,
            storage.clone(),
            config.clone(),
            events.clone(),
        );
        Self {
            inner: Arc::new(Inner {
                pipeline,
                storage,
                config,
                events,
                running_sources: Mutex::new(HashSet::new()),
                batch_tokens: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to live progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<CollectorEvent> {
        self.inner.events.subscribe()
    }

    /// Start a batch in the background and return its id immediately.
    pub async fn trigger(&self, request: TriggerRequest) -> Result<String, CollectError> {
        let prepared = self.prepare(request).await?;
        let batch_id = prepared.batch_id.clone();
        let inner = self.inner.clone();
        tokio::spawn(async move {
            Inner::execute(inner, prepared).await;
        });
        Ok(batch_id)
    }

    /// Run a batch to completion and return its id.
    pub async fn run_batch(&self, request: TriggerRequest) -> Result<String, CollectError> {
        let prepared = self.prepare(request).await?;
        let batch_id = prepared.batch_id.clone();
        Inner::execute(self.inner.clone(), prepared).await;
        Ok(batch_id)
    }

    /// Raise the cancel signal for a batch. Returns false for unknown or
    /// already-finished batches.
    pub fn cancel(&self, batch_id: &str) -> bool {
        let tokens = self.inner.batch_tokens.lock().expect("token map poisoned");
        match tokens.get(batch_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Current task states for a batch.
    pub async fn task_states(&self, batch_id: &str) -> Result<Vec<CrawlTask>, CollectError> {
        self.inner
            .storage
            .list_tasks(batch_id)
            .await
            .map_err(|e| CollectError::Internal(e.to_string()))
    }

    /// Source ids currently being crawled.
    pub fn running_sources(&self) -> HashSet<i64> {
        self.inner
            .running_sources
            .lock()
            .expect("running set poisoned")
            .clone()
    }

    async fn prepare(&self, request: TriggerRequest) -> Result<PreparedBatch, CollectError> {
        let inner = &self.inner;
        let batch = CrawlBatch::new(request.trigger);
        info!(batch_id = %batch.id, trigger = request.trigger.as_str(), "starting batch");

        let sources = inner
            .storage
            .list_active_sources(request.source_ids.as_deref())
            .await
            .map_err(|e| CollectError::Internal(e.to_string()))?;

        // Skip sources that another batch is already crawling.
        let runnable: Vec<MonitorSource> = {
            let mut running = inner.running_sources.lock().expect("running set poisoned");
            sources
                .into_iter()
                .filter(|s| running.insert(s.id))
                .collect()
        };
        if runnable.is_empty() {
            warn!(batch_id = %batch.id, "no runnable sources for batch");
        }

        let mut task_ids = Vec::with_capacity(runnable.len());
        for source in &runnable {
            let task = CrawlTask::new(&batch.id, source, request.trigger);
            let id = inner
                .storage
                .create_task(&task)
                .await
                .map_err(|e| CollectError::Internal(e.to_string()))?;
            task_ids.push(id);
        }

        let token = CancellationToken::new();
        inner
            .batch_tokens
            .lock()
            .expect("token map poisoned")
            .insert(batch.id.clone(), token.clone());

        Ok(PreparedBatch {
            batch_id: batch.id,
            sources: runnable,
            task_ids,
            token,
        })
    }
}

impl Inner {
    async fn execute(inner: Arc<Inner>, prepared: PreparedBatch) {
        let PreparedBatch {
            batch_id,
            sources,
            task_ids,
            token,
        } = prepared;

        // Soft batch cap: raise the cancel signal at expiry.
        let watchdog = inner.config.batch_soft_timeout.map(|cap| {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(cap).await;
                warn!("batch soft timeout expired, cancelling");
                token.cancel();
            })
        });

        let _ = inner.events.send(CollectorEvent::BatchStarted {
            batch_id: batch_id.clone(),
            task_count: sources.len(),
        });

        let semaphore = Arc::new(Semaphore::new(inner.config.agent_max_concurrency));
        let pipelines = sources.iter().zip(task_ids.iter()).map(|(source, &task_id)| {
            let semaphore = semaphore.clone();
            let token = token.clone();
            let inner = &inner;
            let batch_id = &batch_id;
            async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return;
                };
                inner
                    .pipeline
                    .run_source(batch_id, task_id, source, &token)
                    .await;
                inner
                    .running_sources
                    .lock()
                    .expect("running set poisoned")
                    .remove(&source.id);
            }
        });
        futures::future::join_all(pipelines).await;

        // Partial reports are never emitted for cancelled batches.
        if token.is_cancelled() {
            info!(batch_id = %batch_id, "batch cancelled, skipping report");
        } else if let Err(e) = inner.pipeline.generate_batch_report(&batch_id).await {
            warn!(batch_id = %batch_id, error = %e, "report generation failed");
        }

        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }
        inner
            .batch_tokens
            .lock()
            .expect("token map poisoned")
            .remove(&batch_id);
        {
            // A pipeline future dropped early would leak its slot; sweep.
            let mut running = inner.running_sources.lock().expect("running set poisoned");
            for source in &sources {
                running.remove(&source.id);
            }
        }
        let _ = inner.events.send(CollectorEvent::BatchFinished {
            batch_id: batch_id.clone(),
        });
        info!(batch_id = %batch_id, "batch finished");
    }
}
