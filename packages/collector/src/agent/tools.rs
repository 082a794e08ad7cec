//! Tool implementations backing the agent runtime.
//!
//! Tools share one shape: typed args in, JSON out, registered by name. The
//! save tools write into an [`ItemAccumulator`] owned by the orchestrator;
//! agents return data, they never share the item list directly.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use llm_client::{Tool, ToolRegistry};
use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::browser::{dates, domain, BrowseOptions, PageFetcher, PageObservation};
use crate::error::CollectError;
use crate::types::{canonicalize_url, ArticleItem, ContentKind};

pub const BROWSE_PAGE: &str = "browse_page";
pub const SAVE_RESULT: &str = "save_result";
pub const SAVE_RESULTS_BATCH: &str = "save_results_batch";
pub const DOWNLOAD_FILE: &str = "download_file";
pub const FINISH: &str = "finish";

/// Cap on tags kept per item.
const MAX_TAGS: usize = 5;

// Leading date prefix like "2026-02-06 " that list pages glue onto titles.
static LEADING_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}\s*").unwrap());

/// Clean a title: collapse newlines, strip a leading date, trim.
pub fn clean_title(title: &str) -> String {
    let flattened = title.replace(['\n', '\r'], " ");
    LEADING_DATE.replace(&flattened, "").trim().to_string()
}

/// Why a save was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Accepted,
    Duplicate,
    CrossDomain,
    InvalidUrl,
    EmptyTitle,
    QuotaReached,
}

impl SaveOutcome {
    pub fn reason(&self) -> &'static str {
        match self {
            SaveOutcome::Accepted => "accepted",
            SaveOutcome::Duplicate => "duplicate",
            SaveOutcome::CrossDomain => "cross_domain",
            SaveOutcome::InvalidUrl => "invalid_url",
            SaveOutcome::EmptyTitle => "empty_title",
            SaveOutcome::QuotaReached => "quota_reached",
        }
    }
}

/// One item as the model submits it.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SaveItemArgs {
    /// Article title
    pub title: String,
    /// Absolute article URL
    pub url: String,
    /// One of news, policy, notice, file
    #[serde(default)]
    pub content_kind: Option<String>,
    /// Publication date, YYYY-MM-DD
    #[serde(default)]
    pub published_date: Option<String>,
    /// Short summary when already known
    #[serde(default)]
    pub summary: Option<String>,
    /// Short topical tags
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Mutable item list for one task, shared between the save tools and the
/// orchestrator. Dedup is by canonical URL against both previously persisted
/// URLs and items saved earlier in the task.
pub struct ItemAccumulator {
    items: Vec<ArticleItem>,
    seen: HashSet<String>,
    /// When set, cross-domain submissions are rejected.
    source_url: Option<String>,
    max_items: usize,
}

impl ItemAccumulator {
    pub fn new(
        existing_urls: impl IntoIterator<Item = String>,
        source_url: Option<String>,
        max_items: usize,
    ) -> Self {
        let seen = existing_urls
            .into_iter()
            .filter_map(|u| canonicalize_url(&u))
            .collect();
        Self {
            items: Vec::new(),
            seen,
            source_url,
            max_items,
        }
    }

    pub fn save(&mut self, raw: SaveItemArgs) -> SaveOutcome {
        let Some(canonical) = canonicalize_url(&raw.url) else {
            return SaveOutcome::InvalidUrl;
        };
        if let Some(source_url) = &self.source_url {
            if !domain::is_same_domain(&canonical, source_url) {
                return SaveOutcome::CrossDomain;
            }
        }
        if self.seen.contains(&canonical) {
            return SaveOutcome::Duplicate;
        }
        if self.items.len() >= self.max_items {
            return SaveOutcome::QuotaReached;
        }

        let title = clean_title(&raw.title);
        if title.is_empty() {
            return SaveOutcome::EmptyTitle;
        }

        // List pages sometimes echo the title back as the summary; that
        // carries no information, so drop it.
        let summary = raw
            .summary
            .map(|s| s.trim().to_string())
            .filter(|s| s != &title)
            .unwrap_or_default();

        let published_date = raw
            .published_date
            .as_deref()
            .and_then(dates::parse_loose_date)
            .or_else(|| dates::date_from_url(&canonical));

        let mut tags = raw.tags.unwrap_or_default();
        tags.truncate(MAX_TAGS);

        self.seen.insert(canonical.clone());
        self.items.push(ArticleItem {
            title,
            url: canonical,
            content_kind: raw
                .content_kind
                .as_deref()
                .map(ContentKind::parse)
                .unwrap_or(ContentKind::News),
            published_date,
            summary,
            tags,
        });
        SaveOutcome::Accepted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[ArticleItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<ArticleItem> {
        self.items
    }
}

pub type SharedAccumulator = Arc<Mutex<ItemAccumulator>>;

// ---------------------------------------------------------------------------
// browse_page
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BrowseArgs {
    /// The page URL to open
    pub url: String,
}

pub struct BrowsePageTool {
    fetcher: Arc<dyn PageFetcher>,
    opts: BrowseOptions,
}

impl BrowsePageTool {
    pub fn new(fetcher: Arc<dyn PageFetcher>, opts: BrowseOptions) -> Self {
        Self { fetcher, opts }
    }
}

#[async_trait]
impl Tool for BrowsePageTool {
    const NAME: &'static str = BROWSE_PAGE;
    type Args = BrowseArgs;
    type Output = PageObservation;
    type Error = std::convert::Infallible;

    fn description(&self) -> &str {
        "Open a URL and return the page text, its link list and pre-extracted \
         candidate entries (title, url, date_guess). Use the candidates block \
         to batch-save list items."
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        Ok(self.fetcher.browse(&args.url, self.opts).await)
    }
}

// ---------------------------------------------------------------------------
// save_result / save_results_batch
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Items collected so far in this task
    pub total: usize,
}

pub struct SaveResultTool {
    acc: SharedAccumulator,
}

impl SaveResultTool {
    pub fn new(acc: SharedAccumulator) -> Self {
        Self { acc }
    }
}

#[async_trait]
impl Tool for SaveResultTool {
    const NAME: &'static str = SAVE_RESULT;
    type Args = SaveItemArgs;
    type Output = SaveResponse;
    type Error = std::convert::Infallible;

    fn description(&self) -> &str {
        "Save one discovered article. Duplicates (by canonical URL) and \
         cross-domain links are rejected."
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let mut acc = self.acc.lock().expect("accumulator poisoned");
        let outcome = acc.save(args);
        Ok(SaveResponse {
            accepted: outcome == SaveOutcome::Accepted,
            reason: (outcome != SaveOutcome::Accepted).then(|| outcome.reason().to_string()),
            total: acc.len(),
        })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SaveBatchArgs {
    /// The articles to save
    pub items: Vec<SaveItemArgs>,
}

#[derive(Debug, Serialize)]
pub struct SaveBatchResponse {
    /// Newly accepted items
    pub accepted_count: usize,
    /// Rejected items (duplicate, cross-domain, invalid)
    pub skipped_count: usize,
    /// Items collected so far in this task
    pub total: usize,
}

pub struct SaveBatchTool {
    acc: SharedAccumulator,
}

impl SaveBatchTool {
    pub fn new(acc: SharedAccumulator) -> Self {
        Self { acc }
    }
}

#[async_trait]
impl Tool for SaveBatchTool {
    const NAME: &'static str = SAVE_RESULTS_BATCH;
    type Args = SaveBatchArgs;
    type Output = SaveBatchResponse;
    type Error = std::convert::Infallible;

    fn description(&self) -> &str {
        "Save several discovered articles at once. Returns how many were \
         newly accepted after deduplication."
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let mut acc = self.acc.lock().expect("accumulator poisoned");
        let mut accepted = 0;
        let mut skipped = 0;
        for item in args.items {
            match acc.save(item) {
                SaveOutcome::Accepted => accepted += 1,
                _ => skipped += 1,
            }
        }
        debug!(accepted, skipped, total = acc.len(), "batch save");
        Ok(SaveBatchResponse {
            accepted_count: accepted,
            skipped_count: skipped,
            total: acc.len(),
        })
    }
}

// ---------------------------------------------------------------------------
// download_file (optional attachment support)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DownloadArgs {
    /// File URL
    pub url: String,
    /// File name to store under (defaults to the last URL segment)
    #[serde(default)]
    pub target_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub path: String,
    pub bytes: u64,
}

pub struct DownloadFileTool {
    client: reqwest::Client,
    dir: PathBuf,
    max_bytes: u64,
}

impl DownloadFileTool {
    pub fn new(client: reqwest::Client, dir: PathBuf, max_bytes: u64) -> Self {
        Self {
            client,
            dir,
            max_bytes,
        }
    }

    fn sanitize(name: &str) -> String {
        name.chars()
            .map(|c| {
                if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

#[async_trait]
impl Tool for DownloadFileTool {
    const NAME: &'static str = DOWNLOAD_FILE;
    type Args = DownloadArgs;
    type Output = DownloadResponse;
    type Error = CollectError;

    fn description(&self) -> &str {
        "Download an attachment (PDF, DOC, XLSX...) to local storage and \
         return its path and size."
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let parsed = url::Url::parse(&args.url)
            .map_err(|e| CollectError::ToolUsage(format!("invalid download URL: {e}")))?;
        let name = args
            .target_name
            .clone()
            .or_else(|| {
                parsed
                    .path_segments()
                    .and_then(|s| s.last().map(str::to_string))
            })
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "attachment.bin".to_string());
        let name = Self::sanitize(&name);

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| CollectError::PageLoad(e.to_string()))?;
        if !response.status().is_success() {
            return Err(CollectError::PageLoad(format!(
                "HTTP {} downloading {}",
                response.status(),
                args.url
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| CollectError::PageLoad(e.to_string()))?;
        if body.len() as u64 > self.max_bytes {
            return Err(CollectError::ToolUsage(format!(
                "file exceeds the {} byte limit",
                self.max_bytes
            )));
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CollectError::Internal(e.to_string()))?;
        let path = self.dir.join(&name);
        tokio::fs::write(&path, &body)
            .await
            .map_err(|e| CollectError::Internal(e.to_string()))?;

        Ok(DownloadResponse {
            path: path.to_string_lossy().into_owned(),
            bytes: body.len() as u64,
        })
    }
}

// ---------------------------------------------------------------------------
// finish
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FinishArgs {
    /// Short wrap-up of what was collected
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FinishAck {}

pub struct FinishTool;

#[async_trait]
impl Tool for FinishTool {
    const NAME: &'static str = FINISH;
    type Args = FinishArgs;
    type Output = FinishAck;
    type Error = std::convert::Infallible;

    fn description(&self) -> &str {
        "Mark collection for the current section as complete."
    }

    async fn call(&self, _args: Self::Args) -> Result<Self::Output, Self::Error> {
        Ok(FinishAck {})
    }
}

/// Tool set for section crawl agents.
pub fn crawler_toolset(
    fetcher: Arc<dyn PageFetcher>,
    opts: BrowseOptions,
    acc: SharedAccumulator,
) -> ToolRegistry {
    ToolRegistry::new()
        .register(BrowsePageTool::new(fetcher, opts))
        .register(SaveBatchTool::new(acc.clone()))
        .register(SaveResultTool::new(acc))
        .register(FinishTool)
}

/// Crawler tool set extended with attachment downloads, for sources whose
/// articles carry document attachments.
pub fn crawler_toolset_with_downloads(
    fetcher: Arc<dyn PageFetcher>,
    opts: BrowseOptions,
    acc: SharedAccumulator,
    downloads: DownloadFileTool,
) -> ToolRegistry {
    crawler_toolset(fetcher, opts, acc).register(downloads)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accumulator() -> ItemAccumulator {
        ItemAccumulator::new(Vec::new(), Some("https://www.nea.gov.cn/".into()), 30)
    }

    fn item(url: &str) -> SaveItemArgs {
        SaveItemArgs {
            title: "Notice on deepening power market reform".into(),
            url: url.into(),
            content_kind: Some("policy".into()),
            published_date: Some("2026-01-30".into()),
            summary: None,
            tags: None,
        }
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(
            clean_title("2026-02-06 Annual energy work conference held"),
            "Annual energy work conference held"
        );
        assert_eq!(clean_title("line\none"), "line one");
        assert_eq!(clean_title("  padded  "), "padded");
    }

    #[test]
    fn test_save_accepts_and_canonicalizes() {
        let mut acc = accumulator();
        let outcome = acc.save(item("HTTPS://WWW.NEA.GOV.CN/item.htm#frag"));
        assert_eq!(outcome, SaveOutcome::Accepted);
        assert_eq!(acc.items()[0].url, "https://www.nea.gov.cn/item.htm");
        assert_eq!(acc.items()[0].content_kind, ContentKind::Policy);
        assert_eq!(
            acc.items()[0].published_date,
            chrono::NaiveDate::from_ymd_opt(2026, 1, 30)
        );
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut acc = accumulator();
        assert_eq!(
            acc.save(item("https://www.nea.gov.cn/item.htm")),
            SaveOutcome::Accepted
        );
        assert_eq!(
            acc.save(item("https://www.nea.gov.cn/item.htm#other")),
            SaveOutcome::Duplicate
        );
        assert_eq!(acc.len(), 1);
    }

    #[test]
    fn test_existing_urls_seed_dedup() {
        let mut acc = ItemAccumulator::new(
            vec!["https://www.nea.gov.cn/old.htm".to_string()],
            None,
            30,
        );
        assert_eq!(
            acc.save(item("https://www.nea.gov.cn/old.htm")),
            SaveOutcome::Duplicate
        );
    }

    #[test]
    fn test_cross_domain_rejected() {
        let mut acc = accumulator();
        assert_eq!(
            acc.save(item("https://www.xinhuanet.com/elsewhere.htm")),
            SaveOutcome::CrossDomain
        );
        // Subdomains of the source root pass.
        assert_eq!(
            acc.save(item("https://zfxxgk.nea.gov.cn/doc.htm")),
            SaveOutcome::Accepted
        );
    }

    #[test]
    fn test_date_inferred_from_url() {
        let mut acc = accumulator();
        let mut raw = item("https://www.nea.gov.cn/art/2026/2/3/abc.html");
        raw.published_date = None;
        assert_eq!(acc.save(raw), SaveOutcome::Accepted);
        assert_eq!(
            acc.items()[0].published_date,
            chrono::NaiveDate::from_ymd_opt(2026, 2, 3)
        );
    }

    #[test]
    fn test_summary_equal_to_title_dropped() {
        let mut acc = accumulator();
        let mut raw = item("https://www.nea.gov.cn/a.htm");
        raw.summary = Some("Notice on deepening power market reform".into());
        acc.save(raw);
        assert!(acc.items()[0].summary.is_empty());
    }

    #[test]
    fn test_quota_enforced() {
        let mut acc = ItemAccumulator::new(Vec::new(), None, 1);
        assert_eq!(
            acc.save(item("https://www.nea.gov.cn/1.htm")),
            SaveOutcome::Accepted
        );
        assert_eq!(
            acc.save(item("https://www.nea.gov.cn/2.htm")),
            SaveOutcome::QuotaReached
        );
    }

    #[test]
    fn test_tags_capped() {
        let mut acc = accumulator();
        let mut raw = item("https://www.nea.gov.cn/t.htm");
        raw.tags = Some((0..8).map(|i| format!("tag{i}")).collect());
        acc.save(raw);
        assert_eq!(acc.items()[0].tags.len(), 5);
    }

    #[tokio::test]
    async fn test_save_tool_reports_duplicate_reason() {
        let acc: SharedAccumulator = Arc::new(Mutex::new(ItemAccumulator::new(
            Vec::new(),
            None,
            30,
        )));
        let tool = SaveResultTool::new(acc.clone());

        let first = tool.call(item("https://www.nea.gov.cn/x.htm")).await.unwrap();
        assert!(first.accepted);
        assert_eq!(first.total, 1);

        let second = tool.call(item("https://www.nea.gov.cn/x.htm")).await.unwrap();
        assert!(!second.accepted);
        assert_eq!(second.reason.as_deref(), Some("duplicate"));
    }

    #[tokio::test]
    async fn test_download_rejects_invalid_url() {
        let tool = DownloadFileTool::new(reqwest::Client::new(), std::env::temp_dir(), 1024);
        let err = tool
            .call(DownloadArgs {
                url: "not a url".into(),
                target_name: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::ToolUsage(_)));
    }

    #[test]
    fn test_download_name_sanitized() {
        assert_eq!(
            DownloadFileTool::sanitize("../../etc/passwd"),
            ".._.._etc_passwd"
        );
        assert_eq!(DownloadFileTool::sanitize("policy v2.pdf"), "policy_v2.pdf");
    }

    #[tokio::test]
    async fn test_batch_tool_counts() {
        let acc: SharedAccumulator = Arc::new(Mutex::new(ItemAccumulator::new(
            Vec::new(),
            None,
            30,
        )));
        let tool = SaveBatchTool::new(acc);
        let response = tool
            .call(SaveBatchArgs {
                items: vec![
                    item("https://www.nea.gov.cn/1.htm"),
                    item("https://www.nea.gov.cn/1.htm"),
                    item("https://www.nea.gov.cn/2.htm"),
                ],
            })
            .await
            .unwrap();
        assert_eq!(response.accepted_count, 2);
        assert_eq!(response.skipped_count, 1);
        assert_eq!(response.total, 2);
    }
}
