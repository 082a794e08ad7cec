//! Cross-domain policy: keep links on the source's registrable root domain.

use url::Url;

// Two-level TLD suffixes common on Chinese government and corporate domains;
// the registrable root sits one label above these.
const TWO_LEVEL_SUFFIXES: &[&str] = &[
    ".gov.cn", ".com.cn", ".org.cn", ".edu.cn", ".net.cn", ".ac.cn", ".mil.cn",
];

/// Extract the registrable root domain from a URL.
///
/// ```text
/// www.nea.gov.cn        -> nea.gov.cn
/// zfxxgk.nea.gov.cn     -> nea.gov.cn
/// news.people.com.cn    -> people.com.cn
/// www.xinhuanet.com     -> xinhuanet.com
/// ```
pub fn extract_root_domain(url: &str) -> String {
    let host = match Url::parse(url) {
        Ok(parsed) => match parsed.host_str() {
            Some(h) => h.to_ascii_lowercase(),
            None => return String::new(),
        },
        Err(_) => return String::new(),
    };

    let host = host.strip_prefix("www.").unwrap_or(&host);

    for suffix in TWO_LEVEL_SUFFIXES {
        if let Some(prefix) = host.strip_suffix(suffix) {
            let last = prefix.rsplit('.').next().unwrap_or(prefix);
            return format!("{last}{suffix}");
        }
    }

    let labels: Vec<&str> = host.rsplitn(3, '.').collect();
    if labels.len() >= 2 {
        return format!("{}.{}", labels[1], labels[0]);
    }
    host.to_string()
}

/// Whether two URLs share a registrable root domain.
///
/// Empty inputs are treated as same-domain so items without a URL are kept.
pub fn is_same_domain(item_url: &str, source_url: &str) -> bool {
    if item_url.is_empty() || source_url.is_empty() {
        return true;
    }
    extract_root_domain(item_url) == extract_root_domain(source_url)
}
