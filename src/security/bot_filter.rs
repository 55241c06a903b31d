//! Heuristic user-agent classification.
//!
//! Pure and stateless: a user agent is denied when it is absent, shorter than
//! the configured minimum, or contains a deny-list substring. Health-probe
//! exemption is the pipeline's job and happens before this guard runs, since
//! orchestration probes legitimately use denied-pattern clients.

use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct BotFilterConfig {
    pub enabled: bool,
    /// User agents shorter than this are treated as automated clients.
    pub min_length: usize,
    /// Case-insensitive substrings denoting automated tooling.
    pub deny_patterns: Vec<String>,
}

/// Binary allow/deny user-agent classifier.
#[derive(Clone)]
pub struct BotFilter {
    config: Arc<BotFilterConfig>,
}

impl BotFilter {
    pub fn new(mut config: BotFilterConfig) -> Self {
        // Matching is case-insensitive; normalize once up front.
        for pattern in &mut config.deny_patterns {
            *pattern = pattern.to_lowercase();
        }
        Self {
            config: Arc::new(config),
        }
    }

    /// Classify a declared user agent. `None` means the header was absent.
    pub fn is_blocked(&self, user_agent: Option<&str>) -> bool {
        if !self.config.enabled {
            return false;
        }

        let Some(user_agent) = user_agent.map(str::trim).filter(|ua| !ua.is_empty()) else {
            return true;
        };
        if user_agent.len() < self.config.min_length {
            return true;
        }

        let lowered = user_agent.to_lowercase();
        self.config
            .deny_patterns
            .iter()
            .any(|pattern| lowered.contains(pattern.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BROWSER_UA: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36";

    fn filter() -> BotFilter {
        BotFilter::new(BotFilterConfig {
            enabled: true,
            min_length: 16,
            deny_patterns: vec![
                "bot".to_string(),
                "crawler".to_string(),
                "spider".to_string(),
                "curl".to_string(),
                "python-requests".to_string(),
                "HeadlessChrome".to_string(),
            ],
        })
    }

    #[test]
    fn test_browser_user_agent_allowed() {
        assert!(!filter().is_blocked(Some(BROWSER_UA)));
    }

    #[test]
    fn test_http_client_blocked() {
        assert!(filter().is_blocked(Some("curl/7.68.0")));
        assert!(filter().is_blocked(Some("python-requests/2.31.0 CPython/3.12")));
    }

    #[test]
    fn test_absent_or_empty_blocked() {
        assert!(filter().is_blocked(None));
        assert!(filter().is_blocked(Some("")));
        assert!(filter().is_blocked(Some("   ")));
    }

    #[test]
    fn test_short_user_agent_blocked() {
        assert!(filter().is_blocked(Some("Mozilla/5.0")));
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        assert!(filter().is_blocked(Some("Googlebot/2.1 (+http://www.google.com/bot.html)")));
        assert!(filter().is_blocked(Some(
            "Mozilla/5.0 (X11; Linux x86_64) HeadlessChrome/126.0 Safari/537.36"
        )));
    }

    #[test]
    fn test_disabled_filter_allows_everything() {
        let filter = BotFilter::new(BotFilterConfig {
            enabled: false,
            min_length: 16,
            deny_patterns: vec!["curl".to_string()],
        });
        assert!(!filter.is_blocked(Some("curl/7.68.0")));
        assert!(!filter.is_blocked(None));
    }
}
