//! Plain-text rendering of submission outcomes

use crate::rate_limit::{AdmissionDecision, LimitKind, RateLimits};
use crate::resolution::{Resolution, ResultKind};
use crate::resolver::{ResolutionOutcome, SubmissionOutcome};
use crate::services::is_supported_service;
use std::fmt::Write;

/// Script payloads longer than this are shown as a preview
pub const SCRIPT_PREVIEW_CHARS: usize = 500;
/// Submitted links are echoed up to this many characters
const LINK_ECHO_CHARS: usize = 100;

fn head(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Human-readable duration such as `4h 12m` or `38s`
#[must_use]
pub fn format_wait(secs: u64) -> String {
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

fn render_rate_limited(decision: &AdmissionDecision, limits: &RateLimits) -> String {
    let wait = decision.retry_after_secs();
    match decision {
        AdmissionDecision::Denied {
            limit: LimitKind::ShortTerm,
            ..
        } => format!(
            "You're doing that too fast! Please wait {wait} seconds.\nLimit: {} bypasses per {}",
            limits.short_term_limit,
            format_wait(limits.short_term_window.as_secs())
        ),
        AdmissionDecision::Denied {
            limit: LimitKind::Daily,
            ..
        } => format!(
            "You've reached your daily limit of {} bypasses.\nResets in: {}",
            limits.daily_limit,
            format_wait(wait)
        ),
        AdmissionDecision::Admitted { .. } => String::new(),
    }
}

fn render_resolved(link: &str, outcome: &ResolutionOutcome) -> String {
    let mut out = String::new();
    if !is_supported_service(link) {
        out.push_str("Warning: this link may not be from a supported service, attempted anyway.\n");
    }

    let provenance = if outcome.from_cache {
        "From cache"
    } else {
        "Fresh result"
    };

    match &outcome.result {
        Resolution::Success(resolved) => {
            let _ = writeln!(out, "Original link: {}", head(link, LINK_ECHO_CHARS));
            match resolved.kind {
                ResultKind::ScriptPayload => {
                    let total = resolved.payload.chars().count();
                    if total <= SCRIPT_PREVIEW_CHARS {
                        let _ = writeln!(out, "Loadstring:\n{}", resolved.payload);
                    } else {
                        let _ = writeln!(
                            out,
                            "Loadstring preview:\n{}...\nFull script is {total} characters.",
                            head(&resolved.payload, SCRIPT_PREVIEW_CHARS)
                        );
                    }
                }
                ResultKind::DestinationUrl => {
                    let _ = writeln!(out, "Bypassed link: {}", resolved.payload);
                }
            }
            let _ = write!(out, "Time taken: {:.2}s | {provenance}", outcome.elapsed_secs);
        }
        Resolution::Failure(failure) => {
            let _ = write!(
                out,
                "Bypass failed: {failure}\nTime taken: {:.2}s",
                outcome.elapsed_secs
            );
        }
    }
    out
}

/// Render an outcome for a plain-text transport.
#[must_use]
pub fn render_submission(outcome: &SubmissionOutcome, limits: &RateLimits) -> String {
    match outcome {
        SubmissionOutcome::NoLink => "No valid link found in your message.".to_string(),
        SubmissionOutcome::RateLimited(decision) => render_rate_limited(decision, limits),
        SubmissionOutcome::Resolved { link, outcome } => render_resolved(link, outcome),
        SubmissionOutcome::Cancelled => "Cancelled.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::{ResolutionFailure, ResolvedLink};
    use std::time::Duration;

    fn resolved(payload: &str, from_cache: bool) -> SubmissionOutcome {
        SubmissionOutcome::Resolved {
            link: "https://bit.ly/abc".to_string(),
            outcome: ResolutionOutcome {
                result: Resolution::Success(ResolvedLink::new(payload.to_string(), "ace-bypass")),
                elapsed_secs: 1.5,
                from_cache,
            },
        }
    }

    #[test]
    fn test_long_script_is_previewed() {
        let script = format!("loadstring({})", "x".repeat(600));
        let text = render_submission(&resolved(&script, false), &RateLimits::default());

        assert!(text.contains("Loadstring preview:"));
        assert!(text.contains("Full script is 612 characters."));
        assert!(!text.contains(&script));
        assert!(text.ends_with("Time taken: 1.50s | Fresh result"));
    }

    #[test]
    fn test_destination_shown_in_full() {
        let url = format!("https://dest.example/{}", "p".repeat(700));
        let text = render_submission(&resolved(&url, true), &RateLimits::default());

        assert!(text.contains(&url));
        assert!(text.contains("From cache"));
        assert!(!text.starts_with("Warning"));
    }

    #[test]
    fn test_unsupported_service_warning() {
        let outcome = SubmissionOutcome::Resolved {
            link: "https://example.org/x".to_string(),
            outcome: ResolutionOutcome {
                result: Resolution::Failure(ResolutionFailure::new("TRW.lat: API error 500: boom")),
                elapsed_secs: 0.25,
                from_cache: false,
            },
        };
        let text = render_submission(&outcome, &RateLimits::default());
        assert!(text.starts_with("Warning"));
        assert!(text.contains("Bypass failed: TRW.lat: API error 500: boom"));
    }

    #[test]
    fn test_rate_limit_messages() {
        let limits = RateLimits::default();
        let short = SubmissionOutcome::RateLimited(AdmissionDecision::Denied {
            limit: LimitKind::ShortTerm,
            retry_after: Duration::from_millis(41_200),
        });
        assert_eq!(
            render_submission(&short, &limits),
            "You're doing that too fast! Please wait 42 seconds.\nLimit: 2 bypasses per 5m 0s"
        );

        let daily = SubmissionOutcome::RateLimited(AdmissionDecision::Denied {
            limit: LimitKind::Daily,
            retry_after: Duration::from_secs(3 * 3600 + 120),
        });
        assert!(render_submission(&daily, &limits).ends_with("Resets in: 3h 2m"));
    }

    #[test]
    fn test_format_wait() {
        assert_eq!(format_wait(0), "0s");
        assert_eq!(format_wait(59), "59s");
        assert_eq!(format_wait(61), "1m 1s");
        assert_eq!(format_wait(7200), "2h 0m");
    }
}
