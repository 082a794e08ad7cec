//! Deterministic publication-date extraction from DOM text and URL paths.
//!
//! Government and news sites rarely expose machine-readable dates; list rows
//! carry them as visible text next to the link, or encode them in the
//! article path. All patterns resolve to a validated `NaiveDate`.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

// Visible text: 2026-02-03, 2026/2/3, 2026.02.03, 2026年2月3日
static TEXT_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(20\d{2})[-/.年](\d{1,2})[-/.月](\d{1,2})日?").unwrap()
});

// Standalone 8-digit date like 20260130, not embedded in a longer number
static TEXT_COMPACT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^\d])(20\d{2})(0[1-9]|1[0-2])(0[1-9]|[12]\d|3[01])(?:[^\d]|$)").unwrap()
});

// URL stems, in the order they are tried:
//   /20260130/            plain 8-digit path segment
//   /t20260130_           gov.cn article stems
//   /W20260130            ministry document stems
//   /art/2026/1/30/       art path with unpadded month/day
//   /2026-01/30 (or /2026/01/t30...)  month directory + day prefix
static URL_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/(20\d{2})(0[1-9]|1[0-2])(0[1-9]|[12]\d|3[01])/").unwrap()
});
static URL_T_STEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/t(20\d{2})(0[1-9]|1[0-2])(0[1-9]|[12]\d|3[01])_").unwrap()
});
static URL_W_STEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/W(20\d{2})(0[1-9]|1[0-2])(0[1-9]|[12]\d|3[01])").unwrap()
});
static URL_ART: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/art/(20\d{2})/(\d{1,2})/(\d{1,2})/").unwrap()
});
static URL_MONTH_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/(20\d{2})[-/](0[1-9]|1[0-2])/t?(\d{2})").unwrap()
});

/// Extract the first plausible date from visible text.
pub fn date_from_text(text: &str) -> Option<NaiveDate> {
    if let Some(caps) = TEXT_DATE.captures(text) {
        if let Some(date) = ymd(&caps[1], &caps[2], &caps[3]) {
            return Some(date);
        }
    }
    if let Some(caps) = TEXT_COMPACT.captures(text) {
        return ymd(&caps[1], &caps[2], &caps[3]);
    }
    None
}

/// Extract a date encoded in a URL path.
pub fn date_from_url(url: &str) -> Option<NaiveDate> {
    for pattern in [&*URL_SEGMENT, &*URL_T_STEM, &*URL_W_STEM, &*URL_ART, &*URL_MONTH_DAY] {
        if let Some(caps) = pattern.captures(url) {
            if let Some(date) = ymd(&caps[1], &caps[2], &caps[3]) {
                return Some(date);
            }
        }
    }
    None
}

/// Normalize a loosely formatted date string (e.g. "2026-2-3") to a date.
pub fn parse_loose_date(s: &str) -> Option<NaiveDate> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    date_from_text(trimmed)
}

fn ymd(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    let year: i32 = y.parse().ok()?;
    let month: u32 = m.parse().ok()?;
    let day: u32 = d.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_text_separators() {
        assert_eq!(date_from_text("published 2026-02-03"), Some(date(2026, 2, 3)));
        assert_eq!(date_from_text("2026/2/3 update"), Some(date(2026, 2, 3)));
        assert_eq!(date_from_text("(2026.02.03)"), Some(date(2026, 2, 3)));
        assert_eq!(date_from_text("2026年2月3日发布"), Some(date(2026, 2, 3)));
    }

    #[test]
    fn test_text_compact_digits() {
        assert_eq!(date_from_text("rev 20260130 final"), Some(date(2026, 1, 30)));
        // Embedded in a longer number: not a date.
        assert_eq!(date_from_text("id 120260130999"), None);
    }

    #[test]
    fn test_text_rejects_impossible_dates() {
        assert_eq!(date_from_text("2026-13-40"), None);
        assert_eq!(date_from_text("2026-02-30"), None);
    }

    #[test]
    fn test_url_plain_segment() {
        assert_eq!(
            date_from_url("https://x.gov.cn/news/20260130/item.html"),
            Some(date(2026, 1, 30))
        );
    }

    #[test]
    fn test_url_t_stem() {
        assert_eq!(
            date_from_url("https://x.gov.cn/zcfg/t20260130_12345.html"),
            Some(date(2026, 1, 30))
        );
    }

    #[test]
    fn test_url_w_stem() {
        assert_eq!(
            date_from_url("https://x.gov.cn/doc/W20260130abc.html"),
            Some(date(2026, 1, 30))
        );
    }

    #[test]
    fn test_url_art_path_unpadded() {
        assert_eq!(
            date_from_url("https://x.gov.cn/art/2026/2/3/abc.html"),
            Some(date(2026, 2, 3))
        );
    }

    #[test]
    fn test_url_month_directory() {
        assert_eq!(
            date_from_url("https://x.gov.cn/2026-01/30/content_9.htm"),
            Some(date(2026, 1, 30))
        );
        assert_eq!(
            date_from_url("https://x.gov.cn/2026/01/t30_item.htm"),
            Some(date(2026, 1, 30))
        );
    }

    #[test]
    fn test_url_without_date() {
        assert_eq!(date_from_url("https://x.gov.cn/about/contact.html"), None);
    }

    #[test]
    fn test_parse_loose_date_zero_pads() {
        assert_eq!(parse_loose_date("2026-2-3"), Some(date(2026, 2, 3)));
        assert_eq!(parse_loose_date(" 2026-02-03 "), Some(date(2026, 2, 3)));
        assert_eq!(parse_loose_date(""), None);
        assert_eq!(parse_loose_date("soon"), None);
    }
}
