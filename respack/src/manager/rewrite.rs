//! Host rewriting for download and repository URLs.
//!
//! A [`HostRewrite`] maps one hostname onto an alternate endpoint, keeping
//! the path and query. Model downloads use a list of them to reach mirrors;
//! plugin clones use one as a repository proxy.

use serde::{Deserialize, Serialize};
use url::{Position, Url};

use crate::pack::RepositoryId;

/// Rewrite rule from a hostname to an alternate endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRewrite {
    /// Hostname to match, compared case-insensitively.
    pub host: String,
    /// Replacement scheme and authority, optionally with a path prefix.
    pub endpoint: String,
}

impl HostRewrite {
    /// Create a rewrite rule.
    pub fn new(host: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            endpoint: endpoint.into(),
        }
    }

    /// Whether this rule applies to `host`.
    pub fn matches_host(&self, host: &str) -> bool {
        self.host.eq_ignore_ascii_case(host)
    }

    /// Rewrite `raw` when its host matches.
    ///
    /// ```
    /// use respack::manager::HostRewrite;
    ///
    /// let rule = HostRewrite::new("huggingface.co", "https://hf-mirror.com/");
    /// assert_eq!(
    ///     rule.apply("https://huggingface.co/org/model/resolve/main/a.bin?download=1").as_deref(),
    ///     Some("https://hf-mirror.com/org/model/resolve/main/a.bin?download=1")
    /// );
    /// assert_eq!(rule.apply("https://example.com/a.bin"), None);
    /// ```
    pub fn apply(&self, raw: &str) -> Option<String> {
        let parsed = Url::parse(raw).ok()?;
        let host = parsed.host_str()?;
        if !self.matches_host(host) {
            return None;
        }
        Some(format!(
            "{}{}",
            self.endpoint.trim_end_matches('/'),
            &parsed[Position::BeforePath..]
        ))
    }

    /// Clone URL for a repository routed through this rule.
    pub fn apply_repository(&self, repository: &RepositoryId) -> Option<String> {
        if !self.matches_host(&repository.host) {
            return None;
        }
        Some(format!(
            "{}/{}/{}",
            self.endpoint.trim_end_matches('/'),
            repository.owner,
            repository.name
        ))
    }
}

/// Apply the first matching rule, or return the URL unchanged.
pub fn rewrite_url(rules: &[HostRewrite], raw: &str) -> String {
    rules
        .iter()
        .find_map(|rule| rule.apply(raw))
        .unwrap_or_else(|| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_matching_rule_wins() {
        let rules = vec![
            HostRewrite::new("example.com", "https://first.local"),
            HostRewrite::new("EXAMPLE.com", "https://second.local"),
        ];
        assert_eq!(
            rewrite_url(&rules, "https://example.com/a/b.bin"),
            "https://first.local/a/b.bin"
        );
    }

    #[test]
    fn test_unmatched_url_unchanged() {
        let rules = vec![HostRewrite::new("example.com", "https://mirror.local")];
        assert_eq!(
            rewrite_url(&rules, "https://other.com/x"),
            "https://other.com/x"
        );
        assert_eq!(rewrite_url(&rules, "not a url"), "not a url");
    }

    #[test]
    fn test_endpoint_path_prefix_kept() {
        let rule = HostRewrite::new("example.com", "http://127.0.0.1:9000/cache");
        assert_eq!(
            rule.apply("https://example.com:8443/m.bin").as_deref(),
            Some("http://127.0.0.1:9000/cache/m.bin")
        );
    }

    #[test]
    fn test_repository_proxy() {
        let rule = HostRewrite::new("github.com", "https://gh.proxy.local/");
        let id = RepositoryId::parse("git@github.com:acme/nodes.git").unwrap();
        assert_eq!(
            rule.apply_repository(&id).as_deref(),
            Some("https://gh.proxy.local/acme/nodes")
        );

        let other = RepositoryId::parse("https://gitlab.com/acme/nodes").unwrap();
        assert!(rule.apply_repository(&other).is_none());
    }
}
