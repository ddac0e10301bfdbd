//! Resolution orchestrator
//!
//! One long-lived [`LinkResolver`] owns the client, cache, rate limiter and
//! statistics. Handlers share it through an `Arc`.

use crate::bypass::provider::ProviderStatus;
use crate::bypass::BypassClient;
use crate::cache::ResolutionCache;
use crate::config::Settings;
use crate::denylist::Denylist;
use crate::extract::extract_url;
use crate::rate_limit::{AdmissionDecision, RateLimits, UserRateLimiter, UserUsage};
use crate::resolution::{Resolution, ResolutionFailure};
use crate::services::service_name;
use crate::stats::{BypassStats, StatsRecorder};
use crate::storage::JsonFile;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Message returned when a submitted link hits the denylist
pub const DENIED_LINK_MESSAGE: &str = "link matched a blocked pattern";

/// Result of [`LinkResolver::resolve`]
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionOutcome {
    /// Success or failure
    pub result: Resolution,
    /// Wall time in seconds, rounded to two decimals
    pub elapsed_secs: f64,
    /// True when the result came from the cache
    pub from_cache: bool,
}

/// Result of [`LinkResolver::handle_submission`]
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    /// The text contains no usable link
    NoLink,
    /// The user must wait before submitting again
    RateLimited(AdmissionDecision),
    /// The extracted link went through the pipeline
    Resolved {
        /// Link extracted from the text
        link: String,
        /// Resolution details
        outcome: ResolutionOutcome,
    },
    /// The caller cancelled before a result was available
    Cancelled,
}

/// Composes denylist, cache, rate limiter, client and statistics
pub struct LinkResolver {
    client: BypassClient,
    cache: ResolutionCache,
    limiter: UserRateLimiter,
    stats: StatsRecorder,
    denylist: Denylist,
}

fn rounded_secs(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100.0).round() / 100.0
}

impl LinkResolver {
    /// Assemble a resolver from its parts.
    #[must_use]
    pub fn new(
        client: BypassClient,
        cache: ResolutionCache,
        limiter: UserRateLimiter,
        stats: StatsRecorder,
        denylist: Denylist,
    ) -> Self {
        Self {
            client,
            cache,
            limiter,
            stats,
            denylist,
        }
    }

    /// Build a resolver from settings, restoring persisted rate state and
    /// statistics.
    pub async fn from_settings(settings: &Settings) -> Self {
        let rate_store = Arc::new(JsonFile::new(&settings.rate_limit_file));
        let limiter = UserRateLimiter::load(settings.rate_limits(), rate_store).await;
        let stats = StatsRecorder::load(JsonFile::new(&settings.stats_file)).await;

        let client = BypassClient::from_settings(settings);
        info!(
            providers = client.providers().len(),
            cache_ttl_secs = settings.cache_ttl_secs,
            "Link resolver ready"
        );

        Self::new(
            client,
            ResolutionCache::new(settings.cache_ttl()),
            limiter,
            stats,
            Denylist::new(&settings.denylist_pattern),
        )
    }

    /// Resolve `link`, consulting and filling the cache when `use_cache` is set.
    ///
    /// Does not touch rate limits; see [`LinkResolver::handle_submission`].
    #[instrument(skip(self))]
    pub async fn resolve(&self, link: &str, use_cache: bool) -> ResolutionOutcome {
        let start = Instant::now();

        if let Some(outcome) = self.screen(link, use_cache, start).await {
            return outcome;
        }
        self.resolve_fresh(link, use_cache, start).await
    }

    /// Denylist pre-check and cache lookup. `Some` means no provider call is
    /// needed.
    async fn screen(
        &self,
        link: &str,
        use_cache: bool,
        start: Instant,
    ) -> Option<ResolutionOutcome> {
        if self.denylist.matches(link) {
            info!(pattern = self.denylist.pattern(), "Submitted link matched denylist");
            return Some(ResolutionOutcome {
                result: Resolution::Failure(ResolutionFailure::denied(DENIED_LINK_MESSAGE)),
                elapsed_secs: rounded_secs(start.elapsed()),
                from_cache: false,
            });
        }

        if !use_cache {
            return None;
        }
        let hit = self.cache.get(link).await?;
        self.stats.record_cache_hit().await;
        debug!(provider = %hit.provider, "Serving cached resolution");
        Some(ResolutionOutcome {
            result: Resolution::Success(hit),
            elapsed_secs: rounded_secs(start.elapsed()),
            from_cache: true,
        })
    }

    async fn resolve_fresh(
        &self,
        link: &str,
        use_cache: bool,
        start: Instant,
    ) -> ResolutionOutcome {
        let result = self.client.resolve(link).await;

        match &result {
            Resolution::Success(resolved) => {
                if use_cache {
                    self.cache.set(link, resolved.clone()).await;
                }
                self.stats
                    .record_success(resolved.kind, &service_name(link), &resolved.provider)
                    .await;
            }
            Resolution::Failure(_) => self.stats.record_failure().await,
        }

        ResolutionOutcome {
            result,
            elapsed_secs: rounded_secs(start.elapsed()),
            from_cache: false,
        }
    }

    /// Full pipeline for one chat message from `user_id`.
    ///
    /// Cached and denylisted links are answered without an admission check.
    /// Usage is recorded only for a fresh success. Cancelling `cancel` stops
    /// waiting on the providers; counters already updated are kept.
    #[instrument(skip(self, text, cancel))]
    pub async fn handle_submission(
        &self,
        user_id: u64,
        text: &str,
        cancel: &CancellationToken,
    ) -> SubmissionOutcome {
        let start = Instant::now();
        let Some(link) = extract_url(text) else {
            debug!("No link in submission");
            return SubmissionOutcome::NoLink;
        };

        if let Some(outcome) = self.screen(&link, true, start).await {
            return SubmissionOutcome::Resolved { link, outcome };
        }

        let decision = self.limiter.check_admission(user_id).await;
        if !decision.is_admitted() {
            return SubmissionOutcome::RateLimited(decision);
        }

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!("Submission cancelled");
                return SubmissionOutcome::Cancelled;
            }
            outcome = self.resolve_fresh(&link, true, start) => outcome,
        };

        if outcome.result.is_success() {
            self.limiter.record_usage(user_id).await;
        }

        SubmissionOutcome::Resolved { link, outcome }
    }

    /// Configured rate limits
    #[must_use]
    pub const fn limits(&self) -> RateLimits {
        self.limiter.limits()
    }

    /// Decide whether `user_id` may start a bypass now.
    pub async fn check_admission(&self, user_id: u64) -> AdmissionDecision {
        self.limiter.check_admission(user_id).await
    }

    /// Count a successful bypass for `user_id`.
    pub async fn record_usage(&self, user_id: u64) {
        self.limiter.record_usage(user_id).await;
    }

    /// Today's usage for `user_id`.
    pub async fn user_usage(&self, user_id: u64) -> UserUsage {
        self.limiter.user_usage(user_id).await
    }

    /// Readiness of each configured provider
    #[must_use]
    pub fn provider_status(&self) -> Vec<ProviderStatus> {
        self.client.provider_status()
    }

    /// Current statistics
    pub async fn stats(&self) -> BypassStats {
        self.stats.snapshot().await
    }

    /// Drop every cached resolution.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }
}
