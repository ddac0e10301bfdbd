//! Resolution result types shared by the client, cache and orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound for any failure reason or raw provider body that is surfaced.
pub const MAX_REASON_CHARS: usize = 200;

/// Lowercase prefixes that mark a payload as an executable script.
const SCRIPT_PREFIXES: &[&str] = &["loadstring(", "game:", "local ", "function ", "return "];

/// How a successful payload is rendered and counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    /// Executable script snippet (a "loadstring")
    ScriptPayload,
    /// Plain destination URL
    DestinationUrl,
}

impl ResultKind {
    /// Classify a payload by its leading script call or keyword.
    #[must_use]
    pub fn classify(payload: &str) -> Self {
        let lower = payload.trim_start().to_lowercase();
        if SCRIPT_PREFIXES.iter().any(|prefix| lower.starts_with(prefix)) {
            Self::ScriptPayload
        } else {
            Self::DestinationUrl
        }
    }

    /// Short label used in logs and statistics
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ScriptPayload => "loadstring",
            Self::DestinationUrl => "url",
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A successful resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedLink {
    /// Script payload or destination URL
    pub kind: ResultKind,
    /// The payload itself, never empty
    pub payload: String,
    /// Provider that produced the payload
    pub provider: String,
}

impl ResolvedLink {
    /// Build a classified result from a provider payload.
    #[must_use]
    pub fn new(payload: String, provider: &str) -> Self {
        Self {
            kind: ResultKind::classify(&payload),
            payload,
            provider: provider.to_string(),
        }
    }
}

/// A terminal failure with a bounded, non-empty reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionFailure {
    reason: String,
    denied_pattern: bool,
}

impl ResolutionFailure {
    /// Generic failure; the reason is truncated to [`MAX_REASON_CHARS`].
    #[must_use]
    pub fn new(reason: &str) -> Self {
        let reason = reason.trim();
        let reason = if reason.is_empty() {
            "unknown error"
        } else {
            reason
        };
        Self {
            reason: truncate_chars(reason, MAX_REASON_CHARS),
            denied_pattern: false,
        }
    }

    /// Failure caused by a denylist match.
    #[must_use]
    pub fn denied(reason: &str) -> Self {
        Self {
            denied_pattern: true,
            ..Self::new(reason)
        }
    }

    /// Human-readable reason, at most [`MAX_REASON_CHARS`] characters
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// True when the failure came from the denylist
    #[must_use]
    pub const fn is_denied_pattern(&self) -> bool {
        self.denied_pattern
    }
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Outcome of resolving one link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A provider produced a usable payload
    Success(ResolvedLink),
    /// Denylisted, or every provider failed
    Failure(ResolutionFailure),
}

impl Resolution {
    /// Returns true for [`Resolution::Success`]
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The successful result, if any
    #[must_use]
    pub const fn as_success(&self) -> Option<&ResolvedLink> {
        match self {
            Self::Success(link) => Some(link),
            Self::Failure(_) => None,
        }
    }

    /// The failure, if any
    #[must_use]
    pub const fn as_failure(&self) -> Option<&ResolutionFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }
}

/// Truncate to at most `max` characters, marking the cut with `...`.
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str("...");
    truncated
}
