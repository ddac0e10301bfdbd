//! Running bypass statistics
//!
//! Counters are kept in memory and flushed to a JSON document after every
//! update. Persistence is best effort: failures are logged and the counters
//! keep going.

use crate::resolution::ResultKind;
use crate::storage::JsonFile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Aggregate counters since the statistics file was created
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BypassStats {
    /// Successful fresh resolutions
    pub total_bypassed: u64,
    /// Successful resolutions that produced a script payload
    pub loadstrings: u64,
    /// Successful resolutions that produced a destination URL
    pub urls: u64,
    /// Resolutions that ended in a failure
    pub failed: u64,
    /// Resolutions served from the cache
    pub cached_hits: u64,
    /// Successes per shortener service
    pub service_stats: BTreeMap<String, u64>,
    /// Successes per provider
    pub provider_stats: BTreeMap<String, u64>,
}

/// Thread-safe statistics with optional persistence
pub struct StatsRecorder {
    stats: Mutex<BypassStats>,
    file: Option<JsonFile>,
}

impl StatsRecorder {
    /// In-memory recorder that never touches disk
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            stats: Mutex::new(BypassStats::default()),
            file: None,
        }
    }

    /// Recorder backed by `file`, starting from its persisted counters.
    ///
    /// A missing or unreadable document starts from zero.
    pub async fn load(file: JsonFile) -> Self {
        let stats = match file.read::<BypassStats>().await {
            Ok(stats) => {
                info!(
                    path = %file.path().display(),
                    total_bypassed = stats.total_bypassed,
                    "Loaded bypass statistics"
                );
                stats
            }
            Err(e) => {
                warn!(
                    path = %file.path().display(),
                    error = %e,
                    "Failed to load bypass statistics, starting from zero"
                );
                BypassStats::default()
            }
        };

        Self {
            stats: Mutex::new(stats),
            file: Some(file),
        }
    }

    /// Count a fresh success
    pub async fn record_success(&self, kind: ResultKind, service: &str, provider: &str) {
        let mut stats = self.stats.lock().await;
        stats.total_bypassed += 1;
        match kind {
            ResultKind::ScriptPayload => stats.loadstrings += 1,
            ResultKind::DestinationUrl => stats.urls += 1,
        }
        *stats.service_stats.entry(service.to_string()).or_default() += 1;
        *stats.provider_stats.entry(provider.to_string()).or_default() += 1;
        self.persist(&stats).await;
    }

    /// Count a failed resolution
    pub async fn record_failure(&self) {
        let mut stats = self.stats.lock().await;
        stats.failed += 1;
        self.persist(&stats).await;
    }

    /// Count a cache hit
    pub async fn record_cache_hit(&self) {
        let mut stats = self.stats.lock().await;
        stats.cached_hits += 1;
        self.persist(&stats).await;
    }

    /// Copy of the current counters
    pub async fn snapshot(&self) -> BypassStats {
        self.stats.lock().await.clone()
    }

    async fn persist(&self, stats: &BypassStats) {
        let Some(file) = &self.file else {
            return;
        };
        if let Err(e) = file.write(stats).await {
            warn!(path = %file.path().display(), error = %e, "Failed to save bypass statistics");
        }
    }
}
