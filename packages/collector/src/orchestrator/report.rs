//! Report rendering: HTML and plaintext bodies grouped by source.

use chrono::{DateTime, Utc};

use crate::types::{ArticleItem, Report};

/// Per-source cap on lines fed to the overview prompt.
const DIGEST_ITEMS_PER_SOURCE: usize = 20;

/// Compact digest of all collected items, used as overview prompt input.
pub fn item_digest(by_source: &[(String, Vec<ArticleItem>)]) -> String {
    let mut parts = Vec::new();
    for (source_name, items) in by_source {
        parts.push(format!("[{source_name}] {} items:", items.len()));
        for item in items.iter().take(DIGEST_ITEMS_PER_SOURCE) {
            let mut line = format!("- [{}] {}", item.content_kind.as_str(), item.title);
            if !item.summary.is_empty() {
                let snippet: String = item.summary.chars().take(150).collect();
                line.push_str(": ");
                line.push_str(&snippet);
            }
            parts.push(line);
        }
    }
    parts.join("\n")
}

/// Render the consolidated report for one batch.
pub fn render_report(
    batch_id: &str,
    generated_at: DateTime<Utc>,
    by_source: &[(String, Vec<ArticleItem>)],
    overview: &str,
) -> Report {
    let date = generated_at.date_naive();
    let source_names: Vec<&str> = by_source.iter().map(|(name, _)| name.as_str()).collect();
    let title = format!("{} update digest {date}", source_names.join(" / "));

    let mut html = vec![format!("<h1>{}</h1>", escape_html(&title))];
    let mut text = vec![title.clone(), "=".repeat(40)];

    if !overview.is_empty() {
        html.push(
            "<div style=\"margin:20px 0;padding:20px;background:#f0f7ff;border-radius:8px;\
             border-left:4px solid #1a56db;\">"
                .to_string(),
        );
        html.push("<h2 style=\"margin:0 0 12px 0;color:#1a56db;\">Overview</h2>".to_string());
        html.push(overview_to_html(overview));
        html.push("</div>".to_string());

        text.push(String::new());
        text.push("[Overview]".to_string());
        text.push(overview.to_string());
        text.push("-".repeat(40));
    }

    for (source_name, items) in by_source {
        html.push(format!(
            "<h2 style=\"border-left:4px solid #1a56db;padding-left:12px;\">{} · {} updates</h2>",
            escape_html(source_name),
            items.len()
        ));
        text.push(String::new());
        text.push(format!("== {source_name} ({} updates) ==", items.len()));
        text.push(String::new());

        for (i, item) in items.iter().enumerate() {
            let label = item.content_kind.label();

            html.push(
                "<div style=\"margin:16px 0;padding:12px;border:1px solid #e5e7eb;\
                 border-radius:8px;\">"
                    .to_string(),
            );
            html.push(format!(
                "<p style=\"margin:0;\"><strong>[{label}] {}</strong></p>",
                escape_html(&item.title)
            ));
            if let Some(date) = item.published_date {
                html.push(format!(
                    "<p style=\"color:#6b7280;font-size:14px;\">Published: {date}</p>"
                ));
            }
            if !item.summary.is_empty() {
                html.push(format!(
                    "<p style=\"margin:8px 0;\">{}</p>",
                    escape_html(&item.summary)
                ));
            }
            if !item.tags.is_empty() {
                html.push(format!(
                    "<p style=\"color:#6b7280;font-size:13px;\">Tags: {}</p>",
                    escape_html(&item.tags.join(", "))
                ));
            }
            html.push(format!(
                "<p><a href=\"{}\" style=\"color:#1a56db;\">Read the original</a></p>",
                escape_html(&item.url)
            ));
            html.push("</div>".to_string());

            text.push(format!("{}. [{label}] {}", i + 1, item.title));
            if let Some(date) = item.published_date {
                text.push(format!("   Date: {date}"));
            }
            if !item.summary.is_empty() {
                let snippet: String = item.summary.chars().take(200).collect();
                text.push(format!("   > {snippet}"));
            }
            text.push(format!("   Link: {}", item.url));
            text.push(String::new());
        }
    }

    html.push("<hr style=\"margin:24px 0;\">".to_string());
    html.push(
        "<p style=\"color:#9ca3af;font-size:12px;\">Generated automatically; AI summaries \
         are informational only.</p>"
            .to_string(),
    );

    Report {
        batch_id: batch_id.to_string(),
        title,
        overview: overview.to_string(),
        content_html: html.join("\n"),
        content_text: text.join("\n"),
        generated_at,
    }
}

/// Convert the markdown-ish overview into simple HTML: `##` headings,
/// `**bold**`, bullet lists, paragraphs.
fn overview_to_html(text: &str) -> String {
    let mut out = Vec::new();
    let mut paragraph: Vec<String> = Vec::new();
    let mut list: Vec<String> = Vec::new();

    fn flush_paragraph(out: &mut Vec<String>, paragraph: &mut Vec<String>) {
        if !paragraph.is_empty() {
            out.push(format!(
                "<p style=\"margin:6px 0 14px 0;line-height:1.8;\">{}</p>",
                paragraph.join(" ")
            ));
            paragraph.clear();
        }
    }

    fn flush_list(out: &mut Vec<String>, list: &mut Vec<String>) {
        if !list.is_empty() {
            let items: String = list
                .iter()
                .map(|i| format!("<li style=\"margin:2px 0;\">{i}</li>"))
                .collect();
            out.push(format!(
                "<ul style=\"margin:6px 0 14px 0;padding-left:20px;\">{items}</ul>"
            ));
            list.clear();
        }
    }

    for line in text.lines() {
        let line = bold_to_strong(escape_html(line.trim()).as_str());
        if line.is_empty() {
            flush_paragraph(&mut out, &mut paragraph);
            flush_list(&mut out, &mut list);
        } else if let Some(heading) = line
            .strip_prefix("### ")
            .or_else(|| line.strip_prefix("## "))
            .or_else(|| line.strip_prefix("# "))
        {
            flush_paragraph(&mut out, &mut paragraph);
            flush_list(&mut out, &mut list);
            out.push(format!(
                "<h3 style=\"margin:16px 0 4px 0;color:#1e40af;\">{heading}</h3>"
            ));
        } else if let Some(item) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
            flush_paragraph(&mut out, &mut paragraph);
            list.push(item.to_string());
        } else {
            flush_list(&mut out, &mut list);
            paragraph.push(line);
        }
    }
    flush_paragraph(&mut out, &mut paragraph);
    flush_list(&mut out, &mut list);

    out.join("\n")
}

fn bold_to_strong(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    let mut open = false;
    while let Some(pos) = rest.find("**") {
        out.push_str(&rest[..pos]);
        out.push_str(if open { "</strong>" } else { "<strong>" });
        open = !open;
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    if open {
        out.push_str("</strong>");
    }
    out
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
