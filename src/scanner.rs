use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// Absolute http(s) URL: scheme, a host with at least one dot, optional tail.
const URL_PATTERN: &str =
    r"(?i)\bhttps?://[-a-z0-9@:%._+~#=]{1,256}\.[a-z0-9()]{1,63}\b[-a-z0-9()@:%_+.~#?&/=]*";

static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(URL_PATTERN).expect("valid URL extraction regex"));

/// Pulls candidate hostnames out of free-form text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentScanner;

impl ContentScanner {
    pub fn new() -> Self {
        Self
    }

    /// Hosts of every URL found in `text`, in order of appearance.
    ///
    /// Matches that do not parse as a URL are skipped. Duplicates are kept.
    pub fn extract_hosts(&self, text: &str) -> Vec<String> {
        URL_REGEX
            .find_iter(text)
            .filter_map(|m| Url::parse(m.as_str()).ok())
            .filter_map(|url| url.host_str().map(str::to_string))
            .collect()
    }
}
