//! Route matching logic.
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Prefixes match on segment boundaries: `/ts` matches `/ts` and
//!   `/ts/trains` but not `/tsx`
//! - No regex to guarantee O(n) matching

/// Matches and strips a path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPrefixMatcher {
    /// Normalized: leading slash, no trailing slash (except the root).
    prefix: String,
}

impl PathPrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let trimmed = prefix.trim_end_matches('/');
        let prefix = if trimmed.is_empty() {
            "/".to_string()
        } else if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        };
        Self { prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Number of path bytes this prefix covers; longer wins.
    pub fn specificity(&self) -> usize {
        if self.prefix == "/" {
            0
        } else {
            self.prefix.len()
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        if self.prefix == "/" {
            return true;
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Remove the prefix from a matching path, keeping the result absolute.
    pub fn strip<'a>(&self, path: &'a str) -> std::borrow::Cow<'a, str> {
        if self.prefix == "/" {
            return path.into();
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some("") => "/".into(),
            Some(rest) => rest.into(),
            None => path.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_boundary() {
        let matcher = PathPrefixMatcher::new("/ts");
        assert!(matcher.matches("/ts"));
        assert!(matcher.matches("/ts/"));
        assert!(matcher.matches("/ts/trains/7"));
        assert!(!matcher.matches("/tsx"));
        assert!(!matcher.matches("/ls/lobbies"));
    }

    #[test]
    fn test_normalization() {
        assert_eq!(PathPrefixMatcher::new("ls/").prefix(), "/ls");
        assert_eq!(PathPrefixMatcher::new("").prefix(), "/");
        assert!(PathPrefixMatcher::new("/").matches("/anything"));
    }

    #[test]
    fn test_strip() {
        let matcher = PathPrefixMatcher::new("/ts");
        assert_eq!(matcher.strip("/ts/trains"), "/trains");
        assert_eq!(matcher.strip("/ts"), "/");
        assert_eq!(PathPrefixMatcher::new("/").strip("/status"), "/status");
    }
}
