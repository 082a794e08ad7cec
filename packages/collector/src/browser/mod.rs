//! Page fetching and structured page observations.
//!
//! [`BrowserTool`] fetches a URL with reqwest, parses it with `scraper`, and
//! returns a [`PageObservation`]: main text, a link list, and speculative
//! article candidates with date guesses. Failures come back as distinguished
//! observations, never as errors, so agents always receive something they
//! can react to.

pub mod dates;
pub mod domain;
pub mod pacing;

pub use pacing::HostPacer;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::config::CollectorConfig;
use crate::types::canonicalize_url;

/// Upper bound on observation text, in characters.
const MAX_TEXT_CHARS: usize = 15_000;

/// Marker appended when observation text is cut off.
const TRUNCATION_MARKER: &str = "\n...[content truncated]";

/// Upper bound on links per observation.
const MAX_LINKS: usize = 200;

/// Anchors shorter than this are navigation chrome, not article titles.
const MIN_CANDIDATE_TITLE_CHARS: usize = 8;

/// Per-call options, derived from the source being crawled.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowseOptions {
    /// Keep links that leave the source's root domain.
    pub allow_cross_domain: bool,
}

/// Terminal state of one page fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageStatus {
    Success,
    LoadFailed { reason: String },
    Timeout,
}

/// One link found on a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLink {
    pub anchor: String,
    pub url: String,
}

/// A speculative article entry extracted by deterministic heuristics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub title: String,
    pub url: String,
    pub date_guess: Option<NaiveDate>,
}

/// Structured result of rendering one URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageObservation {
    /// Main textual content, capped at [`MAX_TEXT_CHARS`].
    pub text: String,
    pub links: Vec<PageLink>,
    pub candidates: Vec<Candidate>,
    /// URL after redirects.
    pub final_url: String,
    pub status: PageStatus,
}

impl PageObservation {
    pub fn load_failed(url: &str, reason: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            links: Vec::new(),
            candidates: Vec::new(),
            final_url: url.to_string(),
            status: PageStatus::LoadFailed {
                reason: reason.into(),
            },
        }
    }

    pub fn timeout(url: &str) -> Self {
        Self {
            text: String::new(),
            links: Vec::new(),
            candidates: Vec::new(),
            final_url: url.to_string(),
            status: PageStatus::Timeout,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == PageStatus::Success
    }
}

/// Page fetching seam; the production impl is [`BrowserTool`], tests plug in
/// scripted observations.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn browse(&self, url: &str, opts: BrowseOptions) -> PageObservation;
}

/// reqwest + scraper page fetcher with per-host pacing.
pub struct BrowserTool {
    client: reqwest::Client,
    pacer: Arc<HostPacer>,
}

impl BrowserTool {
    pub fn new(config: &CollectorConfig, pacer: Arc<HostPacer>) -> anyhow::Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
                .parse()
                .expect("static header"),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            "zh-CN,zh;q=0.9,en;q=0.5".parse().expect("static header"),
        );

        let client = reqwest::Client::builder()
            .timeout(config.page_timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self { client, pacer })
    }
}

#[async_trait]
impl PageFetcher for BrowserTool {
    async fn browse(&self, url: &str, opts: BrowseOptions) -> PageObservation {
        let parsed = match Url::parse(url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => u,
            _ => return PageObservation::load_failed(url, "not an absolute http(s) URL"),
        };
        let host = parsed.host_str().unwrap_or_default().to_string();

        // Held for the whole fetch: serializes access per host and enforces
        // the minimum inter-call delay.
        let _lease = self.pacer.lease(&host).await;

        debug!(url = %parsed, "fetching page");
        let response = match self.client.get(parsed.clone()).send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                warn!(url = %parsed, "page load timed out");
                return PageObservation::timeout(url);
            }
            Err(e) => {
                warn!(url = %parsed, error = %e, "page load failed");
                return PageObservation::load_failed(url, e.to_string());
            }
        };

        let final_url = response.url().clone();
        let status = response.status();
        if !status.is_success() {
            return PageObservation::load_failed(final_url.as_str(), format!("HTTP {status}"));
        }

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) if e.is_timeout() => return PageObservation::timeout(final_url.as_str()),
            Err(e) => return PageObservation::load_failed(final_url.as_str(), e.to_string()),
        };

        parse_observation(&body, &final_url, opts)
    }
}

/// Parse a fetched document into an observation. Synchronous: `scraper`'s
/// DOM is not `Send`, so nothing here may cross an await point.
pub fn parse_observation(html: &str, final_url: &Url, opts: BrowseOptions) -> PageObservation {
    let document = Html::parse_document(html);

    let text = extract_text(&document);
    let (links, candidates) = extract_links(&document, final_url, opts.allow_cross_domain);

    PageObservation {
        text,
        links,
        candidates,
        final_url: final_url.to_string(),
        status: PageStatus::Success,
    }
}

/// Selector cascade for the main content area, most specific first.
const MAIN_SELECTORS: &[&str] = &[
    "main",
    "article",
    "[role='main']",
    "#content",
    "#main",
    ".content",
    ".main",
];

fn extract_text(document: &Html) -> String {
    let main_html = MAIN_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| document.select(&selector).next().map(|el| el.html()))
        .unwrap_or_else(|| document.html());

    let text = htmd::convert(&main_html)
        .unwrap_or_else(|_| document.root_element().text().collect::<String>());

    truncate_chars(&clean_text(&text), MAX_TEXT_CHARS, TRUNCATION_MARKER)
}

static MULTI_NEWLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").unwrap());

fn clean_text(text: &str) -> String {
    let text = MULTI_NEWLINE.replace_all(text, "\n\n");
    let text = MULTI_SPACE.replace_all(&text, " ");
    text.trim().to_string()
}

fn truncate_chars(s: &str, max_chars: usize, marker: &str) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push_str(marker);
    out
}

fn extract_links(
    document: &Html,
    base_url: &Url,
    allow_cross_domain: bool,
) -> (Vec<PageLink>, Vec<Candidate>) {
    let selector = match Selector::parse("a[href]") {
        Ok(s) => s,
        Err(_) => return (Vec::new(), Vec::new()),
    };

    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();
    let mut candidates = Vec::new();

    for el in document.select(&selector) {
        if links.len() >= MAX_LINKS {
            break;
        }

        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = base_url.join(href) else {
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }

        let Some(canonical) = canonicalize_url(resolved.as_str()) else {
            continue;
        };
        if !seen.insert(canonical.clone()) {
            continue;
        }
        if !allow_cross_domain && !domain::is_same_domain(&canonical, base_url.as_str()) {
            continue;
        }

        let anchor = anchor_text(el);
        if anchor.is_empty() {
            continue;
        }

        // Date from the closest list-row context first, URL path second.
        let date_guess = context_date(el).or_else(|| dates::date_from_url(&canonical));

        if date_guess.is_some() && anchor.chars().count() >= MIN_CANDIDATE_TITLE_CHARS {
            candidates.push(Candidate {
                title: anchor.clone(),
                url: canonical.clone(),
                date_guess,
            });
        }

        links.push(PageLink {
            anchor,
            url: canonical,
        });
    }

    (links, candidates)
}

/// Anchor label: the longer of inner text and the `title` attribute.
/// List pages often ellipsize inner text and keep the full headline in
/// `title`.
fn anchor_text(el: ElementRef) -> String {
    let inner = el.text().collect::<String>().trim().to_string();
    let attr = el
        .value()
        .attr("title")
        .map(|t| t.trim().to_string())
        .unwrap_or_default();
    let chosen = if attr.chars().count() > inner.chars().count() {
        attr
    } else {
        inner
    };
    chosen.chars().take(150).collect::<String>().trim().to_string()
}

/// Walk up from an anchor looking for a date in the enclosing list row.
/// Stops at the nearest `<li>`; a date in a closer wrapper wins.
fn context_date(el: ElementRef) -> Option<NaiveDate> {
    let mut current = el.parent();
    for _ in 0..3 {
        let node = current?;
        if let Some(parent) = ElementRef::wrap(node) {
            let text: String = parent.text().collect();
            if let Some(date) = dates::date_from_text(&text) {
                return Some(date);
            }
            if parent.value().name() == "li" {
                break;
            }
        }
        current = node.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://www.nea.gov.cn/policies/").unwrap()
    }

    #[test]
    fn test_candidate_from_list_row_date() {
        let html = r#"
            <html><body><ul>
              <li><a href="/2026-01/30/content_1.htm">Notice on renewable energy grid integration</a><span>2026-01-30</span></li>
              <li><a href="/about.htm">About</a></li>
            </ul></body></html>
        "#;
        let obs = parse_observation(html, &base(), BrowseOptions::default());

        assert!(obs.is_success());
        assert_eq!(obs.links.len(), 2);
        assert_eq!(obs.candidates.len(), 1);
        let candidate = &obs.candidates[0];
        assert_eq!(
            candidate.date_guess,
            NaiveDate::from_ymd_opt(2026, 1, 30)
        );
        assert!(candidate.url.starts_with("https://www.nea.gov.cn/2026-01/30/"));
    }

    #[test]
    fn test_candidate_date_from_url_only() {
        let html = r#"
            <html><body>
              <a href="https://www.nea.gov.cn/art/2026/2/3/abc.html">Energy administration publishes annual statistics</a>
            </body></html>
        "#;
        let obs = parse_observation(html, &base(), BrowseOptions::default());
        assert_eq!(obs.candidates.len(), 1);
        assert_eq!(
            obs.candidates[0].date_guess,
            NaiveDate::from_ymd_opt(2026, 2, 3)
        );
    }

    #[test]
    fn test_short_anchor_never_becomes_candidate() {
        let html = r#"
            <html><body>
              <li><a href="/2026-01/30/x.htm">More</a> 2026-01-30</li>
            </body></html>
        "#;
        let obs = parse_observation(html, &base(), BrowseOptions::default());
        assert_eq!(obs.links.len(), 1);
        assert!(obs.candidates.is_empty());
    }

    #[test]
    fn test_cross_domain_links_filtered_by_default() {
        let html = r#"
            <html><body>
              <a href="https://www.xinhuanet.com/news/1.html">External news item title</a>
              <a href="https://zfxxgk.nea.gov.cn/doc/2.html">Subdomain document entry title</a>
            </body></html>
        "#;
        let obs = parse_observation(html, &base(), BrowseOptions::default());
        assert_eq!(obs.links.len(), 1);
        assert!(obs.links[0].url.contains("zfxxgk.nea.gov.cn"));

        let open = parse_observation(
            html,
            &base(),
            BrowseOptions {
                allow_cross_domain: true,
            },
        );
        assert_eq!(open.links.len(), 2);
    }

    #[test]
    fn test_links_deduplicated_by_canonical_url() {
        let html = r#"
            <html><body>
              <a href="https://WWW.NEA.GOV.CN/item.htm#a">Duplicate entry variant one</a>
              <a href="https://www.nea.gov.cn/item.htm">Duplicate entry variant two</a>
            </body></html>
        "#;
        let obs = parse_observation(html, &base(), BrowseOptions::default());
        assert_eq!(obs.links.len(), 1);
    }

    #[test]
    fn test_javascript_links_skipped() {
        let html = r#"<html><body><a href="javascript:void(0)">Open menu panel now</a></body></html>"#;
        let obs = parse_observation(html, &base(), BrowseOptions::default());
        assert!(obs.links.is_empty());
    }

    #[test]
    fn test_anchor_prefers_longer_title_attribute() {
        let html = r#"
            <html><body>
              <li><a href="/2026-01/30/y.htm" title="Full headline of the policy announcement">Full headline…</a> 2026-01-30</li>
            </body></html>
        "#;
        let obs = parse_observation(html, &base(), BrowseOptions::default());
        assert_eq!(
            obs.candidates[0].title,
            "Full headline of the policy announcement"
        );
    }

    #[test]
    fn test_text_truncation_marker() {
        let body = "word ".repeat(10_000);
        let html = format!("<html><body><main><p>{body}</p></main></body></html>");
        let obs = parse_observation(&html, &base(), BrowseOptions::default());
        assert!(obs.text.ends_with(TRUNCATION_MARKER));
        assert!(obs.text.chars().count() <= MAX_TEXT_CHARS + TRUNCATION_MARKER.chars().count());
    }

    #[test]
    fn test_failed_observation_shape() {
        let obs = PageObservation::load_failed("https://x.gov/", "DNS failure");
        assert!(!obs.is_success());
        assert_eq!(
            obs.status,
            PageStatus::LoadFailed {
                reason: "DNS failure".into()
            }
        );
        assert!(obs.links.is_empty());
    }
}
