//! Per-source four-phase pipeline.
//!
//! Phase 1a: homepage navigation (deterministic harvest + one-shot LLM
//! section identification). Phase 1b: sequential per-section tool-calling
//! agents. Phase 2: bounded-parallel summarization. Phase 3: one ranking
//! call. Items are persisted in bulk at end-of-task.

pub mod report;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use llm_client::CompletionOptions;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::agent::runtime::{AgentRunner, AgentSpec, ProgressFn, Termination};
use crate::agent::tools::{crawler_toolset, ItemAccumulator};
use crate::agent::prompts;
use crate::browser::{BrowseOptions, PageFetcher, PageObservation, PageStatus};
use crate::config::CollectorConfig;
use crate::error::CollectError;
use crate::events::CollectorEvent;
use crate::llm::LanguageModel;
use crate::storage::Storage;
use crate::types::{ArticleItem, ContentKind, MonitorSource, Report, TaskStatus, TimeWindow};

/// One section list page identified on a homepage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub url: String,
}

/// How the phases ended for one task.
enum PhaseOutcome {
    Completed {
        items: Vec<ArticleItem>,
        note: Option<String>,
    },
    /// Items collected before the cancel signal still persist.
    Cancelled { items: Vec<ArticleItem> },
    Failed(CollectError),
}

/// Per-batch pipeline controller. All handles are passed in explicitly; the
/// pipeline owns no ambient state.
pub struct Pipeline {
    model: Arc<dyn LanguageModel>,
    fetcher: Arc<dyn PageFetcher>,
    storage: Arc<dyn Storage>,
    config: CollectorConfig,
    events: broadcast::Sender<CollectorEvent>,
}

impl Pipeline {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        fetcher: Arc<dyn PageFetcher>,
        storage: Arc<dyn Storage>,
        config: CollectorConfig,
        events: broadcast::Sender<CollectorEvent>,
    ) -> Self {
        Self {
            model,
            fetcher,
            storage,
            config,
            events,
        }
    }

    /// Run the full pipeline for one source and drive the task to a
    /// terminal status. Never returns an error; failures land in the task
    /// record.
    pub async fn run_source(
        &self,
        batch_id: &str,
        task_id: i64,
        source: &MonitorSource,
        cancel: &CancellationToken,
    ) {
        if let Err(e) = self
            .storage
            .update_task_status(task_id, TaskStatus::Running, None, None)
            .await
        {
            error!(task_id, error = %e, "failed to mark task running");
            return;
        }
        self.emit(CollectorEvent::TaskStarted {
            batch_id: batch_id.to_string(),
            task_id,
            source_name: source.name.clone(),
        });

        // Progress lines go to the event channel immediately and to the
        // task's progress log through a drain task, keeping their order.
        let (log_tx, mut log_rx) = mpsc::unbounded_channel::<String>();
        let log_storage = self.storage.clone();
        let logger = tokio::spawn(async move {
            while let Some(line) = log_rx.recv().await {
                let _ = log_storage.append_progress(task_id, &line).await;
            }
        });

        let events = self.events.clone();
        let batch_owned = batch_id.to_string();
        let progress = move |msg: &str| {
            let _ = events.send(CollectorEvent::TaskProgress {
                batch_id: batch_owned.clone(),
                task_id,
                message: msg.to_string(),
            });
            let _ = log_tx.send(msg.to_string());
        };

        let outcome = self.run_phases(source, cancel, &progress).await;

        drop(progress);
        let _ = logger.await;

        match outcome {
            PhaseOutcome::Completed { items, note } => {
                if let Err(e) = self.storage.insert_items(task_id, source.id, &items).await {
                    error!(task_id, error = %e, "failed to persist items");
                    let _ = self
                        .storage
                        .update_task_status(
                            task_id,
                            TaskStatus::Failed,
                            None,
                            Some(&CollectError::Internal(e.to_string()).log_line()),
                        )
                        .await;
                    self.emit(CollectorEvent::TaskFailed {
                        batch_id: batch_id.to_string(),
                        task_id,
                        error: e.to_string(),
                    });
                    return;
                }
                let _ = self
                    .storage
                    .update_task_status(
                        task_id,
                        TaskStatus::Completed,
                        Some(items.len()),
                        note.as_deref(),
                    )
                    .await;
                info!(task_id, items = items.len(), "task completed");
                self.emit(CollectorEvent::TaskCompleted {
                    batch_id: batch_id.to_string(),
                    task_id,
                    items_found: items.len(),
                });
            }
            PhaseOutcome::Cancelled { items } => {
                let _ = self.storage.insert_items(task_id, source.id, &items).await;
                let _ = self
                    .storage
                    .update_task_status(
                        task_id,
                        TaskStatus::Cancelled,
                        Some(items.len()),
                        Some(&CollectError::Cancelled.log_line()),
                    )
                    .await;
                info!(task_id, items = items.len(), "task cancelled");
                self.emit(CollectorEvent::TaskCancelled {
                    batch_id: batch_id.to_string(),
                    task_id,
                });
            }
            PhaseOutcome::Failed(err) => {
                error!(task_id, error = %err, "task failed");
                let _ = self
                    .storage
                    .update_task_status(task_id, TaskStatus::Failed, None, Some(&err.log_line()))
                    .await;
                self.emit(CollectorEvent::TaskFailed {
                    batch_id: batch_id.to_string(),
                    task_id,
                    error: err.to_string(),
                });
            }
        }
    }

    async fn run_phases(
        &self,
        source: &MonitorSource,
        cancel: &CancellationToken,
        progress: ProgressFn<'_>,
    ) -> PhaseOutcome {
        let window = if source.time_range_days == 0 {
            TimeWindow::last_days(self.config.default_time_range_days)
        } else {
            source.time_window()
        };
        let opts = BrowseOptions {
            allow_cross_domain: source.allow_cross_domain,
        };
        let max_items = if source.max_items == 0 {
            self.config.default_max_items
        } else {
            source.max_items
        };

        // ── Phase 1a: homepage ──
        if cancel.is_cancelled() {
            return PhaseOutcome::Cancelled { items: Vec::new() };
        }
        progress("Phase 1a: browsing homepage");

        let homepage = self.fetcher.browse(&source.url, opts).await;
        match &homepage.status {
            PageStatus::Success => {}
            PageStatus::LoadFailed { reason } => {
                return PhaseOutcome::Failed(CollectError::PageLoad(format!(
                    "{}: {reason}",
                    source.url
                )));
            }
            PageStatus::Timeout => {
                return PhaseOutcome::Failed(CollectError::PageLoad(format!(
                    "{}: load timed out",
                    source.url
                )));
            }
        }

        let existing = match self.storage.existing_urls(source.id).await {
            Ok(urls) => urls,
            Err(e) => return PhaseOutcome::Failed(CollectError::Internal(e.to_string())),
        };
        let existing_set: HashSet<String> = existing
            .iter()
            .filter_map(|u| crate::types::canonicalize_url(u))
            .collect();

        let mut homepage_items = harvest_candidates(&homepage, &window);
        homepage_items.retain(|i| !existing_set.contains(&i.url));
        homepage_items.truncate(max_items);
        progress(&format!(
            "Phase 1a: homepage yielded {} in-window candidates",
            homepage_items.len()
        ));

        let sections = self.discover_sections(source, &homepage, progress).await;

        if cancel.is_cancelled() {
            return PhaseOutcome::Cancelled {
                items: homepage_items,
            };
        }

        // ── Phase 1b: sequential section crawl ──
        let remaining = max_items.saturating_sub(homepage_items.len());
        let mut seed = existing;
        seed.extend(homepage_items.iter().map(|i| i.url.clone()));
        let accumulator = Arc::new(Mutex::new(ItemAccumulator::new(
            seed,
            (!source.allow_cross_domain).then(|| source.url.clone()),
            remaining,
        )));

        let mut section_errors = 0usize;
        let mut note: Option<String> = None;
        let mut cancelled = false;

        if remaining == 0 {
            progress("Phase 1b: homepage filled the quota, skipping section crawl");
        } else {
            for (idx, section) in sections.iter().enumerate() {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                progress(&format!(
                    "Phase 1b: section {}/{}: {}",
                    idx + 1,
                    sections.len(),
                    section.name
                ));

                let (collected_snapshot, quota_left) = {
                    let acc = accumulator.lock().expect("accumulator poisoned");
                    (
                        acc.items().iter().map(|i| i.url.clone()).collect::<Vec<_>>(),
                        remaining.saturating_sub(acc.len()),
                    )
                };
                if quota_left == 0 {
                    break;
                }

                let spec = AgentSpec {
                    system_prompt: prompts::section_agent_system(
                        &section.name,
                        &section.url,
                        &window,
                        &source.content_kinds,
                        quota_left,
                        &collected_snapshot,
                        source.crawl_rules.as_deref(),
                    ),
                    user_message: prompts::section_agent_user(&section.name, &section.url),
                    max_turns: self.config.agent_max_turns,
                    enable_pruning: true,
                };
                let registry = crawler_toolset(self.fetcher.clone(), opts, accumulator.clone());
                let runner = AgentRunner::new(self.model.as_ref(), &registry);

                match tokio::time::timeout(
                    self.config.section_walltime,
                    runner.run(&spec, cancel, progress),
                )
                .await
                {
                    Err(_) => {
                        warn!(section = %section.name, "section agent hit the walltime cap");
                        progress(&format!(
                            "section '{}' exceeded its walltime, moving on",
                            section.name
                        ));
                    }
                    Ok(outcome) => match outcome.termination {
                        Termination::Cancelled => {
                            cancelled = true;
                            break;
                        }
                        Termination::LlmFailed => {
                            section_errors += 1;
                            progress(&format!(
                                "section '{}' failed: {}",
                                section.name,
                                outcome.error.unwrap_or_default()
                            ));
                        }
                        Termination::ExhaustedTurns => {
                            note = Some(format!(
                                "limit_exhausted: section '{}' hit the turn budget",
                                section.name
                            ));
                        }
                        Termination::Finished => {}
                    },
                }
            }
        }

        let section_items = match Arc::try_unwrap(accumulator) {
            Ok(mutex) => mutex.into_inner().expect("accumulator poisoned").into_items(),
            Err(arc) => arc.lock().expect("accumulator poisoned").items().to_vec(),
        };

        let mut items = homepage_items;
        items.extend(section_items);
        // Items that never resolved an in-window date are dropped here,
        // before any summarization effort is spent on them.
        items.retain(|i| i.published_date.map_or(false, |d| window.contains(d)));

        if cancelled {
            return PhaseOutcome::Cancelled { items };
        }

        if !sections.is_empty() && section_errors == sections.len() && items.is_empty() {
            return PhaseOutcome::Failed(CollectError::Internal(
                "every section agent failed and no items were collected".into(),
            ));
        }

        if items.len() > max_items {
            sort_by_date_desc(&mut items);
            items.truncate(max_items);
        }

        // ── Phase 2: summarization ──
        if cancel.is_cancelled() {
            return PhaseOutcome::Cancelled { items };
        }
        self.summarize_items(&mut items, opts, cancel, progress).await;

        // ── Phase 3: ranking ──
        if cancel.is_cancelled() {
            return PhaseOutcome::Cancelled { items };
        }
        let items = if items.len() > 1 {
            self.rank_items(items, progress).await
        } else {
            items
        };

        PhaseOutcome::Completed { items, note }
    }

    /// Phase 1a LLM step: identify section list pages from the homepage
    /// link list. Degrades to the root URL itself.
    async fn discover_sections(
        &self,
        source: &MonitorSource,
        homepage: &PageObservation,
        progress: ProgressFn<'_>,
    ) -> Vec<Section> {
        let fallback = vec![Section {
            name: source.name.clone(),
            url: source.url.clone(),
        }];

        let listing: String = homepage
            .links
            .iter()
            .map(|l| format!("- [{}]({})\n", l.anchor, l.url))
            .collect();
        if listing.is_empty() {
            return fallback;
        }

        let user = prompts::section_discovery_user(source, &listing);
        let response = self
            .model
            .complete_text(
                prompts::SECTION_DISCOVERY_SYSTEM,
                &user,
                CompletionOptions::default().temperature(0.1).max_tokens(2048),
            )
            .await;

        match response {
            Ok(raw) => {
                let sections = parse_sections(&raw, self.config.max_sections);
                if sections.is_empty() {
                    progress("Phase 1a: section extraction failed, degrading to the root URL");
                    fallback
                } else {
                    progress(&format!("Phase 1a: found {} sections", sections.len()));
                    sections
                }
            }
            Err(e) => {
                warn!(source = %source.name, error = %e, "section identification failed");
                progress("Phase 1a: section extraction failed, degrading to the root URL");
                fallback
            }
        }
    }

    /// Phase 2: summarize items lacking a summary. Failures affect only the
    /// individual item.
    async fn summarize_items(
        &self,
        items: &mut [ArticleItem],
        opts: BrowseOptions,
        cancel: &CancellationToken,
        progress: ProgressFn<'_>,
    ) {
        let needs: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.summary.is_empty())
            .map(|(idx, _)| idx)
            .collect();
        if needs.is_empty() {
            return;
        }
        progress(&format!("Phase 2: summarizing {} items", needs.len()));

        let futures: Vec<_> = needs
            .iter()
            .map(|&idx| {
                let item = items[idx].clone();
                async move {
                    if cancel.is_cancelled() {
                        return (idx, None);
                    }
                    (idx, self.summarize_one(&item, opts).await)
                }
            })
            .collect();

        let results = futures::future::join_all(futures).await;

        let mut generated = 0usize;
        for (idx, payload) in results {
            if let Some(payload) = payload {
                let item = &mut items[idx];
                item.summary = payload.summary;
                if !payload.tags.is_empty() {
                    item.tags = payload.tags;
                }
                if let Some(kind) = payload.content_kind {
                    item.content_kind = kind;
                }
                generated += 1;
            }
        }
        progress(&format!(
            "Phase 2: {generated}/{} summaries generated",
            needs.len()
        ));
    }

    async fn summarize_one(
        &self,
        item: &ArticleItem,
        opts: BrowseOptions,
    ) -> Option<SummaryPayload> {
        let page = self.fetcher.browse(&item.url, opts).await;
        if !page.is_success() || page.text.is_empty() {
            return None;
        }

        let user = prompts::summary_user(&item.title, &page.text);
        let first = self
            .model
            .complete_text(
                prompts::SUMMARY_SYSTEM,
                &user,
                CompletionOptions::default().temperature(0.2).max_tokens(512),
            )
            .await;
        if let Ok(raw) = &first {
            if let Some(payload) = parse_summary_payload(raw, &item.title) {
                return Some(payload);
            }
        }

        // One repair attempt with a stricter prompt, then give up and leave
        // the summary empty.
        let strict = prompts::summary_user_strict(&item.title, &page.text);
        let second = self
            .model
            .complete_text(
                prompts::SUMMARY_SYSTEM,
                &strict,
                CompletionOptions::default().temperature(0.3).max_tokens(512),
            )
            .await
            .ok()?;
        parse_summary_payload(&second, &item.title)
    }

    /// Phase 3: one ranking call; date-descending fallback.
    async fn rank_items(
        &self,
        items: Vec<ArticleItem>,
        progress: ProgressFn<'_>,
    ) -> Vec<ArticleItem> {
        progress("Phase 3: ranking by strategic importance");

        let lines = ranking_lines(&items);
        let response = self
            .model
            .complete_text(
                prompts::RANKING_SYSTEM,
                &prompts::ranking_user(&lines, items.len()),
                CompletionOptions::default().temperature(0.1).max_tokens(1024),
            )
            .await;

        match response {
            Ok(raw) => {
                if let Some(order) = parse_ranking(&raw, items.len()) {
                    progress("Phase 3: ranking applied");
                    return apply_permutation(items, &order);
                }
                warn!("ranking reply failed validation, falling back to date sort");
            }
            Err(e) => warn!(error = %e, "ranking call failed, falling back to date sort"),
        }

        progress("Phase 3: ranking failed, falling back to date order");
        let mut items = items;
        sort_by_date_desc(&mut items);
        items
    }

    /// Build and persist the consolidated report for a finished batch.
    /// Returns `None` when no task contributed items.
    pub async fn generate_batch_report(
        &self,
        batch_id: &str,
    ) -> Result<Option<Report>, CollectError> {
        let tasks = self
            .storage
            .list_tasks(batch_id)
            .await
            .map_err(|e| CollectError::Internal(e.to_string()))?;

        let mut by_source = Vec::new();
        for task in tasks.iter().filter(|t| t.status == TaskStatus::Completed) {
            let items = self
                .storage
                .list_items(task.id)
                .await
                .map_err(|e| CollectError::Internal(e.to_string()))?;
            if !items.is_empty() {
                by_source.push((task.source_name.clone(), items));
            }
        }
        if by_source.is_empty() {
            info!(batch_id, "no items collected, skipping report");
            return Ok(None);
        }

        let digest = report::item_digest(&by_source);
        let overview = self
            .model
            .complete_text(
                prompts::OVERVIEW_SYSTEM,
                &prompts::overview_user(&digest),
                CompletionOptions::default().temperature(0.3).max_tokens(1500),
            )
            .await
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        let rendered = report::render_report(batch_id, Utc::now(), &by_source, &overview);
        self.storage
            .insert_report(&rendered)
            .await
            .map_err(|e| CollectError::Internal(e.to_string()))?;

        let item_count = by_source.iter().map(|(_, items)| items.len()).sum();
        self.emit(CollectorEvent::ReportGenerated {
            batch_id: batch_id.to_string(),
            title: rendered.title.clone(),
            item_count,
        });
        Ok(Some(rendered))
    }

    fn emit(&self, event: CollectorEvent) {
        let _ = self.events.send(event);
    }
}

/// Payload of one Phase 2 summarization call.
struct SummaryPayload {
    summary: String,
    tags: Vec<String>,
    content_kind: Option<ContentKind>,
}

/// Harvest in-window items directly from a page observation, no LLM.
fn harvest_candidates(observation: &PageObservation, window: &TimeWindow) -> Vec<ArticleItem> {
    let mut seen = HashSet::new();
    observation
        .candidates
        .iter()
        .filter(|c| c.date_guess.map_or(false, |d| window.contains(d)))
        .filter(|c| seen.insert(c.url.clone()))
        .map(|c| ArticleItem {
            title: crate::agent::tools::clean_title(&c.title),
            url: c.url.clone(),
            content_kind: ContentKind::News,
            published_date: c.date_guess,
            summary: String::new(),
            tags: Vec::new(),
        })
        .collect()
}

/// Parse the Phase 1a section reply: a JSON array of `{name, url}`.
/// Malformed entries are dropped; duplicates (by URL) are removed; the list
/// is capped at `max`.
fn parse_sections(raw: &str, max: usize) -> Vec<Section> {
    let raw = llm_client::strip_code_blocks(raw);
    let Some(json) = extract_json_array(raw) else {
        return Vec::new();
    };
    let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(json) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut sections = Vec::new();
    for (idx, value) in values.iter().enumerate() {
        let Some(url) = value.get("url").and_then(|u| u.as_str()) else {
            continue;
        };
        if url.is_empty() || !seen.insert(url.to_string()) {
            continue;
        }
        let name = value
            .get("name")
            .and_then(|n| n.as_str())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Section {}", idx + 1));
        sections.push(Section {
            name,
            url: url.to_string(),
        });
        if sections.len() >= max {
            break;
        }
    }
    sections
}

/// Parse a Phase 2 reply. Accepts the requested JSON object, or degrades to
/// treating the whole reply as the summary text. Returns `None` when the
/// summary fails validation (empty, equal to the title, or too short).
fn parse_summary_payload(raw: &str, title: &str) -> Option<SummaryPayload> {
    let raw = llm_client::strip_code_blocks(raw);

    let mut payload = SummaryPayload {
        summary: String::new(),
        tags: Vec::new(),
        content_kind: None,
    };

    let object = extract_json_object(raw)
        .and_then(|json| serde_json::from_str::<serde_json::Value>(json).ok());
    match object {
        Some(value) => {
            payload.summary = value
                .get("summary")
                .and_then(|s| s.as_str())
                .unwrap_or_default()
                .trim()
                .to_string();
            payload.tags = value
                .get("tags")
                .and_then(|t| t.as_array())
                .map(|tags| {
                    tags.iter()
                        .filter_map(|t| t.as_str())
                        .map(str::to_string)
                        .take(5)
                        .collect()
                })
                .unwrap_or_default();
            payload.content_kind = value
                .get("content_kind")
                .and_then(|k| k.as_str())
                .map(ContentKind::parse);
        }
        None => payload.summary = raw.trim().to_string(),
    }

    let valid = !payload.summary.is_empty()
        && payload.summary != title.trim()
        && payload.summary.chars().count() > 20;
    valid.then_some(payload)
}

/// Validate and complete a ranking reply into a permutation of `0..n`.
///
/// Non-integer elements, out-of-range indices and duplicates invalidate the
/// reply (`None`); indices the model left out are appended in their original
/// order.
fn parse_ranking(raw: &str, n: usize) -> Option<Vec<usize>> {
    if n == 0 {
        return Some(Vec::new());
    }
    let raw = llm_client::strip_code_blocks(raw);
    let json = extract_json_array(raw)?;
    let values: Vec<serde_json::Value> = serde_json::from_str(json).ok()?;

    let mut seen = vec![false; n];
    let mut order = Vec::with_capacity(n);
    for value in values {
        let idx = usize::try_from(value.as_i64()?).ok()?;
        if idx >= n || seen[idx] {
            return None;
        }
        seen[idx] = true;
        order.push(idx);
    }
    for (idx, taken) in seen.iter().enumerate() {
        if !taken {
            order.push(idx);
        }
    }
    Some(order)
}

fn apply_permutation(items: Vec<ArticleItem>, order: &[usize]) -> Vec<ArticleItem> {
    let mut slots: Vec<Option<ArticleItem>> = items.into_iter().map(Some).collect();
    order
        .iter()
        .filter_map(|&idx| slots.get_mut(idx).and_then(Option::take))
        .collect()
}

/// Compact one-line-per-item listing for the ranking prompt.
fn ranking_lines(items: &[ArticleItem]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let date = item
                .published_date
                .map(|d| d.to_string())
                .unwrap_or_default();
            let mut line = format!("[{i}] [{}] {date} | {}", item.content_kind.as_str(), item.title);
            if !item.summary.is_empty() {
                let snippet: String = item.summary.chars().take(80).collect();
                line.push_str(" — ");
                line.push_str(&snippet);
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn sort_by_date_desc(items: &mut [ArticleItem]) {
    // Option ordering puts None first ascending, so reversing the compare
    // leaves undated items at the end.
    items.sort_by(|a, b| b.published_date.cmp(&a.published_date));
}

fn extract_json_array(raw: &str) -> Option<&str> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    (end > start).then(|| &raw[start..=end])
}

fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::Candidate;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn item(title: &str, d: Option<NaiveDate>) -> ArticleItem {
        ArticleItem {
            title: title.into(),
            url: format!("https://example.gov/{title}"),
            content_kind: ContentKind::News,
            published_date: d,
            summary: String::new(),
            tags: vec![],
        }
    }

    #[test]
    fn test_parse_sections_happy_path() {
        let raw = r#"```json
        [{"name": "Policies", "url": "https://x.gov/pol/"},
         {"name": "Notices", "url": "https://x.gov/not/"},
         {"name": "Dup", "url": "https://x.gov/pol/"},
         {"no_url": true}]
        ```"#;
        let sections = parse_sections(raw, 5);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].name, "Policies");
        assert_eq!(sections[1].url, "https://x.gov/not/");
    }

    #[test]
    fn test_parse_sections_cap_and_garbage() {
        let raw = r#"[{"name":"a","url":"u1"},{"name":"b","url":"u2"},{"name":"c","url":"u3"}]"#;
        assert_eq!(parse_sections(raw, 2).len(), 2);
        assert!(parse_sections("no json here", 5).is_empty());
        assert!(parse_sections("[1, 2,", 5).is_empty());
    }

    #[test]
    fn test_parse_ranking_valid_permutation() {
        assert_eq!(parse_ranking("[2, 0, 1]", 3), Some(vec![2, 0, 1]));
        assert_eq!(
            parse_ranking("```json\n[2, 0, 1]\n```", 3),
            Some(vec![2, 0, 1])
        );
    }

    #[test]
    fn test_parse_ranking_appends_missing_in_original_order() {
        assert_eq!(parse_ranking("[3, 1]", 5), Some(vec![3, 1, 0, 2, 4]));
    }

    #[test]
    fn test_parse_ranking_rejects_corruption() {
        assert_eq!(parse_ranking("[1, 2,", 3), None);
        assert_eq!(parse_ranking("[0, 0, 1]", 3), None); // duplicate
        assert_eq!(parse_ranking("[0, 9]", 3), None); // out of range
        assert_eq!(parse_ranking(r#"[0, "x"]"#, 3), None); // non-int
        assert_eq!(parse_ranking("", 0), Some(vec![]));
    }

    #[test]
    fn test_apply_permutation() {
        let items = vec![
            item("A", None),
            item("B", None),
            item("C", None),
        ];
        let ranked = apply_permutation(items, &[2, 0, 1]);
        let titles: Vec<&str> = ranked.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_sort_by_date_desc_undated_last() {
        let mut items = vec![
            item("old", Some(date(2026, 1, 1))),
            item("undated", None),
            item("new", Some(date(2026, 1, 30))),
        ];
        sort_by_date_desc(&mut items);
        let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["new", "old", "undated"]);
    }

    #[test]
    fn test_harvest_candidates_window_filter_and_dedup() {
        let window = TimeWindow::new(date(2026, 1, 24), date(2026, 1, 31));
        let observation = PageObservation {
            text: String::new(),
            links: vec![],
            candidates: vec![
                Candidate {
                    title: "2026-01-30 In-window item headline".into(),
                    url: "https://x.gov/a".into(),
                    date_guess: Some(date(2026, 1, 30)),
                },
                Candidate {
                    title: "Out of window item headline".into(),
                    url: "https://x.gov/b".into(),
                    date_guess: Some(date(2025, 12, 1)),
                },
                Candidate {
                    title: "Duplicate of the first".into(),
                    url: "https://x.gov/a".into(),
                    date_guess: Some(date(2026, 1, 29)),
                },
            ],
            final_url: "https://x.gov/".into(),
            status: PageStatus::Success,
        };
        let items = harvest_candidates(&observation, &window);
        assert_eq!(items.len(), 1);
        // Leading date prefix stripped from the title.
        assert_eq!(items[0].title, "In-window item headline");
    }

    #[test]
    fn test_parse_summary_payload_json_object() {
        let raw = r#"{"summary": "The plan sets a 2030 capacity target and funds grid upgrades.", "tags": ["grid", "capacity"], "content_kind": "policy"}"#;
        let payload = parse_summary_payload(raw, "Title").unwrap();
        assert!(payload.summary.starts_with("The plan"));
        assert_eq!(payload.tags, vec!["grid", "capacity"]);
        assert_eq!(payload.content_kind, Some(ContentKind::Policy));
    }

    #[test]
    fn test_parse_summary_payload_plain_text_degradation() {
        let raw = "A plain prose summary that is certainly longer than twenty characters.";
        let payload = parse_summary_payload(raw, "Title").unwrap();
        assert_eq!(payload.summary, raw);
        assert!(payload.tags.is_empty());
    }

    #[test]
    fn test_parse_summary_payload_rejects_invalid() {
        assert!(parse_summary_payload("", "Title").is_none());
        assert!(parse_summary_payload("Title", "Title").is_none());
        assert!(parse_summary_payload("too short", "Title").is_none());
        assert!(parse_summary_payload(r#"{"summary": ""}"#, "Title").is_none());
    }

    #[test]
    fn test_ranking_lines_format() {
        let mut a = item("Headline", Some(date(2026, 1, 30)));
        a.summary = "s".repeat(200);
        let lines = ranking_lines(&[a]);
        assert!(lines.starts_with("[0] [news] 2026-01-30 | Headline"));
        // Summary snippet capped at 80 chars.
        assert!(lines.len() < 200);
    }
}
