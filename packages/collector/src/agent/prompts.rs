//! Prompt builders for every LLM-facing stage.
//!
//! Role lines are distinct per stage; tests key their scripted models off
//! them, and progress logs quote them, so keep them stable.

use crate::types::{ContentKind, MonitorSource, TimeWindow};

/// System role for Phase 1a section identification.
pub const SECTION_DISCOVERY_SYSTEM: &str =
    "You are a web information architect. From a homepage link list you \
     identify the section list pages (not article pages) worth crawling.";

/// System role for Phase 2 summarization.
pub const SUMMARY_SYSTEM: &str =
    "You are a policy intelligence analyst serving industry advisors at a \
     consulting firm. You write tight, factual summaries of policy and news \
     articles.";

/// System role for Phase 3 ranking.
pub const RANKING_SYSTEM: &str =
    "You are a senior policy consultant who ranks policy intelligence for \
     corporate clients. You are precise about the difference in weight \
     between national and local items.";

/// System role for the report overview.
pub const OVERVIEW_SYSTEM: &str =
    "You are a senior industry advisor writing a short, structured policy \
     briefing for executives and analysts.";

/// Phase 1a user prompt: identify section list pages from the homepage.
pub fn section_discovery_user(source: &MonitorSource, link_listing: &str) -> String {
    let focus = if source.focus_areas.is_empty() {
        "any policy-relevant topic".to_string()
    } else {
        source.focus_areas.join(", ")
    };
    let rules = source
        .crawl_rules
        .as_deref()
        .unwrap_or("Prefer policy, regulation, notice and news sections.");

    format!(
        "Below is the link list of the homepage of {name} ({url}).\n\
         Identify the section list pages worth crawling in depth, guided by \
         these focus areas: {focus}.\n\n\
         ## Selection rules\n{rules}\n\n\
         Requirements:\n\
         - Return a JSON array: [{{\"name\": \"section name\", \"url\": \"full list page URL\"}}]\n\
         - Only section entry pages that lead to article lists (paths like \
           /policies/, /notices/, /news/), never individual article URLs\n\
         - Section URLs are short and dateless; article URLs are long and \
           often carry a date path\n\
         - List every matching section\n\
         - Output the JSON only, nothing else\n\n\
         Link list:\n{links}",
        name = source.name,
        url = source.url,
        focus = focus,
        rules = rules,
        links = link_listing,
    )
}

/// System prompt for one Phase 1b section crawl agent.
pub fn section_agent_system(
    section_name: &str,
    section_url: &str,
    window: &TimeWindow,
    content_kinds: &[ContentKind],
    remaining_quota: usize,
    existing_urls: &[String],
    crawl_rules: Option<&str>,
) -> String {
    let kinds = if content_kinds.is_empty() {
        "news, policy, notice, file".to_string()
    } else {
        content_kinds
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut prompt = format!(
        "You collect newly published items from one section of a monitored \
         website.\n\n\
         Section: {section_name}\n\
         List page: {section_url}\n\
         Date range: {start} to {end}\n\
         Accepted content kinds: {kinds}\n\
         Remaining item quota: {remaining_quota}\n\n\
         Workflow:\n\
         1. browse_page the list page. The observation contains a \
            `candidates` array of entries with title, url and date_guess.\n\
         2. Filter candidates to the date range and accepted kinds, then \
            save them with save_results_batch in one call.\n\
         3. If the page hints at more in-range items (pagination), browse \
            the next page and repeat.\n\
         4. When the range is exhausted or the quota is reached, call \
            finish.\n\n\
         Rules:\n\
         - Only save items published inside the date range.\n\
         - Prefer save_results_batch over repeated save_result calls.\n\
         - Do not fabricate URLs or dates; skip entries without either.\n\
         - Items already collected are rejected automatically; do not retry \
           them.",
        start = window.start,
        end = window.end,
    );

    if let Some(rules) = crawl_rules {
        prompt.push_str("\n\nAdditional selection rules:\n");
        prompt.push_str(rules);
    }

    if !existing_urls.is_empty() {
        prompt.push_str("\n\nAlready collected (skip these URLs):\n");
        for url in existing_urls.iter().take(50) {
            prompt.push_str("- ");
            prompt.push_str(url);
            prompt.push('\n');
        }
    }

    prompt
}

/// Seed user message for a section crawl agent.
pub fn section_agent_user(section_name: &str, section_url: &str) -> String {
    format!("Start collecting the section \"{section_name}\" from its list page: {section_url}")
}

/// Phase 2 user prompt requesting a structured summary object.
pub fn summary_user(title: &str, page_text: &str) -> String {
    format!(
        "Summarize the following article.\n\n\
         Return a JSON object with exactly these fields:\n\
         - \"summary\": 2-3 sentences distilling the core policy points, key \
           figures or main measures. Do not restate the title.\n\
         - \"tags\": up to 5 short noun phrases\n\
         - \"content_kind\": one of \"policy\", \"news\", \"notice\", \"file\"\n\
         Output the JSON only, nothing else.\n\n\
         Title: {title}\n\n\
         Body:\n{body}",
        title = title,
        body = llm_client::truncate_to_char_boundary(page_text, 6_000),
    )
}

/// Stricter Phase 2 retry prompt used after a contract violation.
pub fn summary_user_strict(title: &str, page_text: &str) -> String {
    format!(
        "Your previous reply was not valid JSON. Respond with ONLY a JSON \
         object, no prose, no code fences:\n\
         {{\"summary\": \"...\", \"tags\": [\"...\"], \"content_kind\": \"policy|news|notice|file\"}}\n\n\
         Title: {title}\n\n\
         Body:\n{body}",
        title = title,
        body = llm_client::truncate_to_char_boundary(page_text, 6_000),
    )
}

/// Phase 3 user prompt: permutation of item indices by strategic importance.
pub fn ranking_user(item_lines: &str, count: usize) -> String {
    format!(
        "Order the {count} items below by strategic importance, highest \
         first. Rank strictly by tier; a higher tier always precedes a lower \
         one:\n\n\
         Tier 1: national or global policy — laws, regulations, plans and \
         guiding opinions from the state council or ministries; senior \
         leadership speeches and appointments\n\
         Tier 2: sector policy and regulation — national industry standards, \
         nationwide data releases, major industry milestones\n\
         Tier 3: statistics and reports — ministry notices, industry \
         statistics, policy interpretations\n\
         Tier 4: local notices — provincial and municipal policy documents, \
         local project approvals\n\
         Tier 5: daily operational items — local bureau work updates, visits \
         and routine bulletins\n\n\
         Within one tier, newer items come first.\n\n\
         Reply with ONLY a JSON array of the item indices in the new order, \
         e.g. [3, 0, 7, 1, 5]. No other output.\n\n\
         Items:\n{item_lines}"
    )
}

/// Report overview prompt.
pub fn overview_user(item_digest: &str) -> String {
    format!(
        "Write a structured policy briefing overview (150-300 words) of the \
         collected items below.\n\n\
         Use these markdown sections, omitting any without content:\n\
         ## Key signals\n\
         ## Major policy moves\n\
         ## Industry data and trends\n\
         ## Regulatory and enforcement activity\n\n\
         Formatting:\n\
         - Each section starts with its ## heading on its own line\n\
         - Bold the names of policies and key figures\n\
         - Speak in concrete facts and numbers, no filler judgement\n\
         - Output the briefing directly, no preamble\n\n\
         Collected items:\n{item_digest}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn window() -> TimeWindow {
        TimeWindow::new(
            NaiveDate::from_ymd_opt(2026, 1, 24).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
        )
    }

    #[test]
    fn test_section_agent_system_mentions_window_and_quota() {
        let prompt = section_agent_system(
            "Policies",
            "https://www.nea.gov.cn/policies/",
            &window(),
            &[ContentKind::Policy, ContentKind::Notice],
            12,
            &["https://www.nea.gov.cn/old.htm".to_string()],
            Some("Skip personnel announcements."),
        );
        assert!(prompt.contains("2026-01-24 to 2026-01-31"));
        assert!(prompt.contains("policy, notice"));
        assert!(prompt.contains("Remaining item quota: 12"));
        assert!(prompt.contains("https://www.nea.gov.cn/old.htm"));
        assert!(prompt.contains("Skip personnel announcements."));
    }

    #[test]
    fn test_summary_user_truncates_body() {
        let body = "a".repeat(10_000);
        let prompt = summary_user("Title", &body);
        assert!(prompt.len() < 7_000);
    }
}
