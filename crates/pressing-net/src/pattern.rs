//! URL patterns used to classify requests.

use url::Url;

/// URL pattern for matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPattern {
    /// Pattern type.
    pub pattern_type: PatternType,
    /// Pattern string.
    pub pattern: String,
}

/// Type of URL pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternType {
    /// Exact URL match.
    Exact,
    /// Prefix match on the full URL.
    Prefix,
    /// Suffix match on the path (e.g., an extension).
    PathSuffix,
    /// Substring of the path only; query and host are ignored.
    PathContains,
}

impl UrlPattern {
    /// Create an exact match pattern.
    pub fn exact(url: &str) -> Self {
        Self {
            pattern_type: PatternType::Exact,
            pattern: url.to_string(),
        }
    }

    /// Create a prefix match pattern.
    pub fn prefix(prefix: &str) -> Self {
        Self {
            pattern_type: PatternType::Prefix,
            pattern: prefix.to_string(),
        }
    }

    /// Create a path suffix pattern (e.g., ".png").
    pub fn path_suffix(suffix: &str) -> Self {
        Self {
            pattern_type: PatternType::PathSuffix,
            pattern: suffix.to_string(),
        }
    }

    /// Create a path-contains pattern (e.g., "/api/").
    pub fn path_contains(segment: &str) -> Self {
        Self {
            pattern_type: PatternType::PathContains,
            pattern: segment.to_string(),
        }
    }

    /// Check if a URL matches this pattern.
    pub fn matches(&self, url: &Url) -> bool {
        match self.pattern_type {
            PatternType::Exact => url.as_str() == self.pattern,
            PatternType::Prefix => url.as_str().starts_with(&self.pattern),
            PatternType::PathSuffix => url.path().ends_with(&self.pattern),
            PatternType::PathContains => url.path().contains(&self.pattern),
        }
    }
}
