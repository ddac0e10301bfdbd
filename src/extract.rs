//! URL extraction from free-form chat text.
//!
//! Best-effort heuristic, not a URL grammar: the first whitespace token that
//! survives wrapper stripping and parses with a dotted host wins.

use url::Url;

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?'];
const QUOTES: &[char] = &['"', '\''];
const EMPHASIS: &[char] = &['*', '_', '~', '`'];

/// Extract the first plausible absolute URL from `text`.
///
/// A markdown link `[label](target)` takes precedence: only its target is
/// searched. Schemeless candidates are promoted to `https://`.
///
/// # Examples
///
/// ```
/// use bypass_relay::extract_url;
///
/// assert_eq!(
///     extract_url("Check this out: <https://example.com/path>.").as_deref(),
///     Some("https://example.com/path")
/// );
/// assert_eq!(
///     extract_url("visit example.com/page now").as_deref(),
///     Some("https://example.com/page")
/// );
/// assert_eq!(extract_url("nothing here"), None);
/// ```
#[must_use]
pub fn extract_url(text: &str) -> Option<String> {
    let search = markdown_link_target(text).unwrap_or(text);

    search
        .split_whitespace()
        .map(strip_wrappers)
        .filter(|token| !token.is_empty())
        .find_map(candidate_url)
}

/// Target of the first complete `[label](target)` construct.
///
/// Parentheses inside the target are balanced, so `(x(1))` keeps the inner
/// pair. `][` sequences are skipped.
fn markdown_link_target(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        // Step over `]` only; the `[` may open the link
        if bytes[i] == b']' && bytes.get(i + 1) == Some(&b'[') {
            i += 1;
            continue;
        }
        if bytes[i] == b'[' {
            i += 1;
            while i < bytes.len() && bytes[i] != b']' {
                i += 1;
            }
            if bytes.get(i + 1) == Some(&b'(') {
                i += 2;
                let start = i;
                let mut depth = 1usize;
                while i < bytes.len() && depth > 0 {
                    match bytes[i] {
                        b'(' => depth += 1,
                        b')' => depth -= 1,
                        _ => {}
                    }
                    i += 1;
                }
                if depth == 0 {
                    return Some(&text[start..i - 1]);
                }
            }
        }
        i += 1;
    }

    None
}

fn trim_trailing_punctuation(token: &str) -> &str {
    token.trim_end_matches(TRAILING_PUNCTUATION)
}

fn is_wrapper_pair(opener: char, closer: char) -> bool {
    matches!((opener, closer), ('<', '>') | ('(', ')') | ('[', ']') | ('{', '}'))
        || (QUOTES.contains(&opener) && QUOTES.contains(&closer))
        || (EMPHASIS.contains(&opener) && EMPHASIS.contains(&closer))
}

/// Trim trailing punctuation, then peel wrapper pairs one layer at a time,
/// re-trimming punctuation after every layer.
fn strip_wrappers(token: &str) -> &str {
    let mut token = trim_trailing_punctuation(token.trim());

    while token.chars().count() > 1 {
        let mut chars = token.chars();
        let (Some(opener), Some(closer)) = (chars.next(), chars.next_back()) else {
            break;
        };
        if !is_wrapper_pair(opener, closer) {
            break;
        }
        let inner = &token[opener.len_utf8()..token.len() - closer.len_utf8()];
        token = trim_trailing_punctuation(inner.trim());
    }

    token
}

fn has_explicit_scheme(token: &str) -> bool {
    let lower = token.get(..8).unwrap_or(token).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn candidate_url(token: &str) -> Option<String> {
    let candidate = if has_explicit_scheme(token) {
        token.to_string()
    } else {
        format!("https://{token}")
    };

    let parsed = Url::parse(&candidate).ok()?;
    let host = parsed.host_str()?;
    (!host.is_empty() && host.contains('.')).then_some(candidate)
}
