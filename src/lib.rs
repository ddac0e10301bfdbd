#![deny(missing_docs)]
//! Bypass relay core library.
//!
//! Link extraction, the provider fallback client, the result cache and the
//! per-user rate limiter behind the chat bot.

/// Provider fallback client.
pub mod bypass;
/// TTL cache of resolved links.
pub mod cache;
/// Configuration management.
pub mod config;
/// Denylist substring rule.
pub mod denylist;
/// URL extraction from chat text.
pub mod extract;
/// Per-user dual-window rate limiting.
pub mod rate_limit;
/// Plain-text rendering of outcomes.
pub mod render;
/// Resolution result types.
pub mod resolution;
/// Orchestration of a full link resolution.
pub mod resolver;
/// Known shortener services.
pub mod services;
/// Running bypass statistics.
pub mod stats;
/// JSON file persistence.
pub mod storage;

pub use extract::extract_url;
pub use resolver::{LinkResolver, ResolutionOutcome, SubmissionOutcome};
