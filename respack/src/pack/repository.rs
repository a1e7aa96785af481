//! Repository URL identity.
//!
//! Plugin repositories are declared in several equivalent spellings. All of
//! these name the same repository:
//!
//! - `https://github.com/acme/nodes`
//! - `https://github.com/acme/nodes.git`
//! - `git@github.com:acme/nodes.git`
//! - `ssh://git@github.com/acme/nodes`
//! - `ssh://git@github.com:22/acme/nodes`
//!
//! [`RepositoryId`] parses any of them into `host/owner/name` so installed
//! plugins can be matched regardless of how they were cloned.

use std::fmt;

/// Normalized identity of a source repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryId {
    /// Host, lowercase. Ports are kept for http(s) and dropped for ssh,
    /// whose port never applies to the https form of the repository.
    pub host: String,
    /// Owner path; may contain `/` for nested groups.
    pub owner: String,
    /// Repository name without a `.git` suffix, original case.
    pub name: String,
}

impl RepositoryId {
    /// Parse a repository URL in short (scp-like) or long form.
    ///
    /// Returns `None` when the input does not contain a host, an owner and a
    /// repository name.
    ///
    /// ```
    /// use respack::pack::RepositoryId;
    ///
    /// let long = RepositoryId::parse("https://github.com/Acme/Nodes.git").unwrap();
    /// let short = RepositoryId::parse("git@github.com:acme/nodes").unwrap();
    ///
    /// assert!(long.same_repository(&short));
    /// assert_eq!(long.identity(), "github.com/acme/nodes");
    /// assert_eq!(long.https_url(), "https://github.com/Acme/Nodes");
    /// ```
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        let ssh = raw
            .find("://")
            .is_some_and(|idx| raw[..idx].to_ascii_lowercase().contains("ssh"));
        let location = if let Some(idx) = raw.find("://") {
            strip_userinfo(&raw[idx + 3..]).to_string()
        } else if let Some((user_host, path)) = raw.split_once(':') {
            // scp-like syntax: [user@]host:owner/repo
            if user_host.contains('/') || path.starts_with('/') {
                return None;
            }
            let host = user_host.rsplit('@').next()?;
            format!("{}/{}", host, path)
        } else {
            raw.to_string()
        };

        let location = location.split(['?', '#']).next().unwrap_or("");
        let location = location.trim_end_matches('/');
        let location = location.strip_suffix(".git").unwrap_or(location);

        let segments: Vec<&str> = location.split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() < 3 {
            return None;
        }

        let host = if ssh {
            strip_port(segments[0])
        } else {
            segments[0]
        };
        let host = host.to_lowercase();
        let name = segments[segments.len() - 1].to_string();
        let owner = segments[1..segments.len() - 1].join("/");

        Some(Self { host, owner, name })
    }

    /// Case-insensitive `host/owner/name` identity used for equivalence.
    pub fn identity(&self) -> String {
        format!("{}/{}/{}", self.host, self.owner, self.name).to_lowercase()
    }

    /// Whether two ids name the same repository.
    pub fn same_repository(&self, other: &RepositoryId) -> bool {
        self.identity() == other.identity()
    }

    /// Canonical long-form URL without a `.git` suffix.
    pub fn https_url(&self) -> String {
        format!("https://{}/{}/{}", self.host, self.owner, self.name)
    }

    /// Directory name used when cloning this repository.
    pub fn dir_name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.host, self.owner, self.name)
    }
}

/// Drop a `user@` prefix that appears before the first path separator.
fn strip_userinfo(location: &str) -> &str {
    let path_start = location.find('/').unwrap_or(location.len());
    match location[..path_start].rfind('@') {
        Some(at) => &location[at + 1..],
        None => location,
    }
}

/// Drop a trailing `:port` from a host, leaving bracketed IPv6 hosts intact.
fn strip_port(host: &str) -> &str {
    match host.rfind(':') {
        Some(colon) if !host[colon..].contains(']') => &host[..colon],
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equivalent_spellings() {
        let spellings = [
            "https://github.com/acme/nodes",
            "https://github.com/acme/nodes.git",
            "https://github.com/acme/nodes/",
            "http://GitHub.com/Acme/Nodes",
            "git@github.com:acme/nodes.git",
            "git@github.com:acme/nodes",
            "ssh://git@github.com/acme/nodes.git",
            "ssh://git@github.com:22/acme/nodes",
            "git+ssh://git@github.com:22/acme/nodes.git",
            "github.com/acme/nodes",
        ];

        let expected = RepositoryId::parse(spellings[0]).unwrap();
        for spelling in spellings {
            let id = RepositoryId::parse(spelling)
                .unwrap_or_else(|| panic!("failed to parse {}", spelling));
            assert!(
                id.same_repository(&expected),
                "{} should match {}",
                spelling,
                expected
            );
        }
    }

    #[test]
    fn test_different_repositories() {
        let a = RepositoryId::parse("https://github.com/acme/nodes").unwrap();
        let b = RepositoryId::parse("https://github.com/acme/nodes-extra").unwrap();
        let c = RepositoryId::parse("https://gitlab.com/acme/nodes").unwrap();
        assert!(!a.same_repository(&b));
        assert!(!a.same_repository(&c));
    }

    #[test]
    fn test_nested_owner() {
        let id = RepositoryId::parse("https://gitlab.com/group/sub/tool.git").unwrap();
        assert_eq!(id.owner, "group/sub");
        assert_eq!(id.name, "tool");
        assert_eq!(id.https_url(), "https://gitlab.com/group/sub/tool");
    }

    #[test]
    fn test_ssh_port_dropped() {
        let id = RepositoryId::parse("ssh://git@git.local:2222/team/repo.git").unwrap();
        assert_eq!(id.host, "git.local");
        assert_eq!(id.dir_name(), "repo");
        assert_eq!(id.https_url(), "https://git.local/team/repo");
    }

    #[test]
    fn test_https_port_kept() {
        let id = RepositoryId::parse("https://git.local:8443/team/repo").unwrap();
        assert_eq!(id.host, "git.local:8443");
        assert_eq!(id.https_url(), "https://git.local:8443/team/repo");
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("github.com:22"), "github.com");
        assert_eq!(strip_port("github.com"), "github.com");
        assert_eq!(strip_port("[::1]:22"), "[::1]");
        assert_eq!(strip_port("[::1]"), "[::1]");
    }

    #[test]
    fn test_query_and_fragment_ignored() {
        let id = RepositoryId::parse("https://github.com/acme/nodes.git?ref=main#readme").unwrap();
        assert_eq!(id.identity(), "github.com/acme/nodes");
    }

    #[test]
    fn test_rejects_incomplete() {
        assert!(RepositoryId::parse("").is_none());
        assert!(RepositoryId::parse("https://github.com/acme").is_none());
        assert!(RepositoryId::parse("nodes").is_none());
        assert!(RepositoryId::parse("git@github.com:/abs/path").is_none());
    }
}
