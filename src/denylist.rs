//! Single-pattern denylist applied to submitted links and provider payloads.

/// Case-insensitive substring rule.
///
/// An empty pattern never matches.
#[derive(Debug, Clone, Default)]
pub struct Denylist {
    pattern: String,
}

impl Denylist {
    /// Create a denylist for `pattern`.
    #[must_use]
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.trim().to_lowercase(),
        }
    }

    /// Returns true when `text` contains the pattern, ignoring case.
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        !self.pattern.is_empty() && text.to_lowercase().contains(&self.pattern)
    }

    /// The normalized pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}
