//! Per-user dual-window rate limiting
//!
//! Every user gets a sliding short window (burst control) and a daily quota
//! that resets at UTC midnight. State is persisted after every mutation;
//! when a write fails the in-memory state stays authoritative.

use crate::storage::RateStore;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Rolling counters for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRateState {
    /// Admitted actions inside the short window, oldest first
    #[serde(
        default,
        alias = "short_term",
        deserialize_with = "timestamp::deserialize_many"
    )]
    pub short_term_timestamps: Vec<DateTime<Utc>>,
    /// Actions recorded since the last daily reset
    #[serde(default, alias = "daily_count")]
    pub daily_count: u32,
    /// Next UTC midnight at which the daily counter resets
    #[serde(alias = "daily_reset", deserialize_with = "timestamp::deserialize")]
    pub daily_reset_at: DateTime<Utc>,
}

impl UserRateState {
    /// Fresh state for a user first seen at `now`
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            short_term_timestamps: Vec::new(),
            daily_count: 0,
            daily_reset_at: next_midnight(now),
        }
    }

    /// Prune the short window and apply a due daily reset.
    ///
    /// Returns true if anything changed.
    fn refresh(&mut self, now: DateTime<Utc>, window: TimeDelta) -> bool {
        let before = self.short_term_timestamps.len();
        self.short_term_timestamps.retain(|ts| now - *ts < window);
        let mut changed = before != self.short_term_timestamps.len();

        if now >= self.daily_reset_at {
            self.daily_count = 0;
            self.daily_reset_at = next_midnight(now);
            changed = true;
        }

        changed
    }
}

/// The first UTC midnight strictly after `now`
#[must_use]
pub fn next_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .succ_opt()
        .unwrap_or(NaiveDate::MAX)
        .and_time(NaiveTime::MIN)
        .and_utc()
}

/// Which window rejected an action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    /// Too many actions inside the short window
    ShortTerm,
    /// Daily quota used up
    Daily,
}

/// Result of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// The action may proceed
    Admitted {
        /// Actions left in the current short window
        remaining_short_term: usize,
        /// Actions left today
        remaining_daily: u32,
    },
    /// The action must wait
    Denied {
        /// The window that is exhausted
        limit: LimitKind,
        /// Time until the window admits again
        retry_after: Duration,
    },
}

impl AdmissionDecision {
    /// Returns true for [`AdmissionDecision::Admitted`]
    #[must_use]
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }

    /// Whole seconds to wait, rounded up; zero when admitted
    #[must_use]
    pub fn retry_after_secs(&self) -> u64 {
        match self {
            Self::Admitted { .. } => 0,
            Self::Denied { retry_after, .. } => {
                let secs = retry_after.as_secs();
                if retry_after.subsec_nanos() > 0 {
                    secs + 1
                } else {
                    secs
                }
            }
        }
    }
}

/// Daily usage summary for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserUsage {
    /// Actions recorded today
    pub daily_count: u32,
    /// Configured daily quota
    pub daily_limit: u32,
    /// Actions left today
    pub remaining: u32,
    /// When the daily counter resets, if the user has state
    pub resets_at: Option<DateTime<Utc>>,
}

/// Window sizes and quotas
#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    /// Actions allowed per short window
    pub short_term_limit: usize,
    /// Length of the sliding short window
    pub short_term_window: Duration,
    /// Actions allowed per UTC day
    pub daily_limit: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            short_term_limit: crate::config::DEFAULT_SHORT_TERM_LIMIT,
            short_term_window: Duration::from_secs(crate::config::DEFAULT_SHORT_TERM_WINDOW_SECS),
            daily_limit: crate::config::DEFAULT_DAILY_LIMIT,
        }
    }
}

impl RateLimits {
    fn window(&self) -> TimeDelta {
        TimeDelta::from_std(self.short_term_window).unwrap_or(TimeDelta::MAX)
    }

    /// Short-term denial takes precedence over daily denial.
    fn evaluate(&self, state: &UserRateState, now: DateTime<Utc>) -> AdmissionDecision {
        let short_count = state.short_term_timestamps.len();
        if short_count >= self.short_term_limit {
            // Saturates for huge windows and future-dated entries
            let retry_after = state
                .short_term_timestamps
                .first()
                .map(|oldest| {
                    self.window()
                        .checked_sub(&(now - *oldest))
                        .unwrap_or(TimeDelta::MAX)
                        .max(TimeDelta::zero())
                })
                .unwrap_or_default();
            return AdmissionDecision::Denied {
                limit: LimitKind::ShortTerm,
                retry_after: retry_after.to_std().unwrap_or_default(),
            };
        }

        if state.daily_count >= self.daily_limit {
            let retry_after = state.daily_reset_at - now;
            return AdmissionDecision::Denied {
                limit: LimitKind::Daily,
                retry_after: retry_after.to_std().unwrap_or_default(),
            };
        }

        AdmissionDecision::Admitted {
            remaining_short_term: self.short_term_limit - short_count,
            remaining_daily: self.daily_limit - state.daily_count,
        }
    }
}

/// Per-user admission control backed by a [`RateStore`]
pub struct UserRateLimiter {
    limits: RateLimits,
    store: Arc<dyn RateStore>,
    /// Guards the map and serializes mutate-then-persist
    users: Mutex<HashMap<String, UserRateState>>,
}

impl UserRateLimiter {
    /// Create a limiter, restoring persisted state from `store`.
    ///
    /// A store that cannot be read is logged and treated as empty.
    pub async fn load(limits: RateLimits, store: Arc<dyn RateStore>) -> Self {
        let users = match store.load_rates().await {
            Ok(users) => {
                info!(users = users.len(), "Loaded rate limit state");
                users
            }
            Err(e) => {
                warn!(error = %e, "Failed to load rate limit state, starting empty");
                HashMap::new()
            }
        };

        Self {
            limits,
            store,
            users: Mutex::new(users),
        }
    }

    /// Configured limits
    #[must_use]
    pub const fn limits(&self) -> RateLimits {
        self.limits
    }

    /// Decide whether `user_id` may start a bypass now.
    pub async fn check_admission(&self, user_id: u64) -> AdmissionDecision {
        self.check_admission_at(user_id, Utc::now()).await
    }

    /// Decide whether `user_id` may start a bypass at `now`.
    pub async fn check_admission_at(&self, user_id: u64, now: DateTime<Utc>) -> AdmissionDecision {
        let mut users = self.users.lock().await;
        let key = user_id.to_string();
        let created = !users.contains_key(&key);

        let state = users
            .entry(key)
            .or_insert_with(|| UserRateState::new(now));
        let changed = state.refresh(now, self.limits.window());
        let decision = self.limits.evaluate(state, now);

        if created || changed {
            self.persist(&users).await;
        }

        if let AdmissionDecision::Denied { limit, retry_after } = decision {
            debug!(
                user_id = user_id,
                limit = ?limit,
                retry_after_secs = retry_after.as_secs(),
                "Admission denied"
            );
        }

        decision
    }

    /// Count a successful bypass for `user_id`.
    pub async fn record_usage(&self, user_id: u64) {
        self.record_usage_at(user_id, Utc::now()).await;
    }

    /// Count a successful bypass for `user_id` at `now`.
    pub async fn record_usage_at(&self, user_id: u64, now: DateTime<Utc>) {
        let mut users = self.users.lock().await;
        let state = users
            .entry(user_id.to_string())
            .or_insert_with(|| UserRateState::new(now));
        state.refresh(now, self.limits.window());
        state.short_term_timestamps.push(now);
        state.daily_count += 1;
        debug!(
            user_id = user_id,
            daily_count = state.daily_count,
            "Recorded bypass usage"
        );

        self.persist(&users).await;
    }

    /// Today's usage for `user_id`.
    pub async fn user_usage(&self, user_id: u64) -> UserUsage {
        self.user_usage_at(user_id, Utc::now()).await
    }

    /// Usage for `user_id` as of `now`, applying a due daily reset.
    pub async fn user_usage_at(&self, user_id: u64, now: DateTime<Utc>) -> UserUsage {
        let daily_limit = self.limits.daily_limit;
        let mut users = self.users.lock().await;

        let Some(state) = users.get_mut(&user_id.to_string()) else {
            return UserUsage {
                daily_count: 0,
                daily_limit,
                remaining: daily_limit,
                resets_at: None,
            };
        };

        let changed = state.refresh(now, self.limits.window());
        let usage = UserUsage {
            daily_count: state.daily_count,
            daily_limit,
            remaining: daily_limit.saturating_sub(state.daily_count),
            resets_at: Some(state.daily_reset_at),
        };

        if changed {
            self.persist(&users).await;
        }
        usage
    }

    async fn persist(&self, users: &HashMap<String, UserRateState>) {
        if let Err(e) = self.store.save_rates(users).await {
            warn!(error = %e, "Failed to persist rate limit state");
        }
    }
}

/// Timestamp parsing that also accepts offset-less ISO-8601 values, read as UTC.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    pub(super) fn parse(value: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub(super) fn deserialize_many<'de, D>(deserializer: D) -> Result<Vec<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|raw| {
                parse(raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MockRateStore, StoreError};
    use chrono::TimeZone;

    fn at(hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
        match Utc.with_ymd_and_hms(2026, 3, 1, hour, min, sec).single() {
            Some(ts) => ts,
            None => panic!("valid timestamp"),
        }
    }

    fn store_with(users: HashMap<String, UserRateState>) -> Arc<MockRateStore> {
        let mut store = MockRateStore::new();
        store
            .expect_load_rates()
            .returning(move || Ok(users.clone()));
        store.expect_save_rates().returning(|_| Ok(()));
        Arc::new(store)
    }

    async fn limiter(users: HashMap<String, UserRateState>) -> UserRateLimiter {
        UserRateLimiter::load(RateLimits::default(), store_with(users)).await
    }

    #[tokio::test]
    async fn test_first_check_is_admitted() {
        let limiter = limiter(HashMap::new()).await;
        let decision = limiter.check_admission_at(1, at(12, 0, 0)).await;
        assert_eq!(
            decision,
            AdmissionDecision::Admitted {
                remaining_short_term: 2,
                remaining_daily: 10
            }
        );
    }

    #[tokio::test]
    async fn test_short_term_window_denies_then_readmits() {
        let limiter = limiter(HashMap::new()).await;
        let t0 = at(12, 0, 0);

        limiter.record_usage_at(7, t0).await;
        limiter.record_usage_at(7, at(12, 0, 10)).await;

        let denied = limiter.check_admission_at(7, at(12, 0, 20)).await;
        assert_eq!(
            denied,
            AdmissionDecision::Denied {
                limit: LimitKind::ShortTerm,
                retry_after: Duration::from_secs(280)
            }
        );
        assert_eq!(denied.retry_after_secs(), 280);

        let still_denied = limiter.check_admission_at(7, at(12, 4, 59)).await;
        assert!(!still_denied.is_admitted());

        // Oldest timestamp leaves the window exactly 300s later
        let admitted = limiter.check_admission_at(7, at(12, 5, 0)).await;
        assert_eq!(
            admitted,
            AdmissionDecision::Admitted {
                remaining_short_term: 1,
                remaining_daily: 8
            }
        );
    }

    #[tokio::test]
    async fn test_daily_limit_denies_until_midnight() {
        let now = at(18, 0, 0);
        let mut state = UserRateState::new(now);
        state.daily_count = 10;
        let limiter = limiter(HashMap::from([("5".to_string(), state)])).await;

        let decision = limiter.check_admission_at(5, now).await;
        assert_eq!(
            decision,
            AdmissionDecision::Denied {
                limit: LimitKind::Daily,
                retry_after: Duration::from_secs(6 * 3600)
            }
        );
    }

    #[tokio::test]
    async fn test_daily_reset_boundary() {
        let now = at(9, 30, 0);
        let state = UserRateState {
            short_term_timestamps: Vec::new(),
            daily_count: 10,
            daily_reset_at: at(0, 0, 0),
        };
        let limiter = limiter(HashMap::from([("5".to_string(), state)])).await;

        let decision = limiter.check_admission_at(5, now).await;
        assert_eq!(
            decision,
            AdmissionDecision::Admitted {
                remaining_short_term: 2,
                remaining_daily: 10
            }
        );

        let usage = limiter.user_usage_at(5, now).await;
        assert_eq!(usage.daily_count, 0);
        assert_eq!(usage.resets_at, Some(next_midnight(now)));
        assert_eq!(next_midnight(now) - now, TimeDelta::hours(14) + TimeDelta::minutes(30));
    }

    #[tokio::test]
    async fn test_short_term_denial_takes_precedence() {
        let now = at(15, 0, 0);
        let state = UserRateState {
            short_term_timestamps: vec![at(14, 58, 0), at(14, 59, 0)],
            daily_count: 10,
            daily_reset_at: next_midnight(now),
        };
        let limiter = limiter(HashMap::from([("9".to_string(), state)])).await;

        let decision = limiter.check_admission_at(9, now).await;
        assert!(matches!(
            decision,
            AdmissionDecision::Denied {
                limit: LimitKind::ShortTerm,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_huge_window_with_future_timestamps_does_not_overflow() {
        let now = at(12, 0, 0);
        let future = now + TimeDelta::days(3650);
        let state = UserRateState {
            short_term_timestamps: vec![future, future],
            daily_count: 0,
            daily_reset_at: next_midnight(now),
        };
        let limits = RateLimits {
            short_term_window: Duration::from_secs(u64::MAX),
            ..RateLimits::default()
        };
        let limiter =
            UserRateLimiter::load(limits, store_with(HashMap::from([("6".to_string(), state)])))
                .await;

        let decision = limiter.check_admission_at(6, now).await;
        let AdmissionDecision::Denied { limit, retry_after } = decision else {
            panic!("expected denial, got {decision:?}");
        };
        assert_eq!(limit, LimitKind::ShortTerm);
        assert!(retry_after > Duration::ZERO);
    }

    #[tokio::test]
    async fn test_users_are_independent() {
        let limiter = limiter(HashMap::new()).await;
        let now = at(10, 0, 0);
        limiter.record_usage_at(1, now).await;
        limiter.record_usage_at(1, now).await;

        assert!(!limiter.check_admission_at(1, now).await.is_admitted());
        assert!(limiter.check_admission_at(2, now).await.is_admitted());
    }

    #[tokio::test]
    async fn test_record_persists_every_time() {
        let mut store = MockRateStore::new();
        store.expect_load_rates().returning(|| Ok(HashMap::new()));
        store
            .expect_save_rates()
            .times(2)
            .withf(|users| users.contains_key("3"))
            .returning(|_| Ok(()));

        let limiter = UserRateLimiter::load(RateLimits::default(), Arc::new(store)).await;
        limiter.record_usage_at(3, at(10, 0, 0)).await;
        limiter.record_usage_at(3, at(10, 1, 0)).await;
    }

    #[tokio::test]
    async fn test_failed_writes_keep_memory_authoritative() {
        let mut store = MockRateStore::new();
        store.expect_load_rates().returning(|| {
            Err(StoreError::Io(std::io::Error::other("disk gone")))
        });
        store.expect_save_rates().returning(|_| {
            Err(StoreError::Io(std::io::Error::other("disk full")))
        });

        let limiter = UserRateLimiter::load(RateLimits::default(), Arc::new(store)).await;
        let now = at(10, 0, 0);
        limiter.record_usage_at(4, now).await;

        assert_eq!(
            limiter.check_admission_at(4, now).await,
            AdmissionDecision::Admitted {
                remaining_short_term: 1,
                remaining_daily: 9
            }
        );
    }

    #[tokio::test]
    async fn test_usage_for_unknown_user() {
        let limiter = limiter(HashMap::new()).await;
        let usage = limiter.user_usage_at(77, at(10, 0, 0)).await;
        assert_eq!(usage.remaining, 10);
        assert_eq!(usage.resets_at, None);
    }

    #[test]
    fn test_state_accepts_legacy_layout() -> Result<(), serde_json::Error> {
        let raw = r#"{
            "short_term": ["2026-03-01T11:59:00.123456"],
            "daily_count": 4,
            "daily_reset": "2026-03-02T00:00:00"
        }"#;
        let state: UserRateState = serde_json::from_str(raw)?;
        assert_eq!(state.daily_count, 4);
        assert_eq!(state.daily_reset_at, at(0, 0, 0) + TimeDelta::days(1));
        assert_eq!(state.short_term_timestamps.len(), 1);

        let written = serde_json::to_value(&state)?;
        assert!(written.get("shortTermTimestamps").is_some());
        assert!(written.get("dailyResetAt").is_some());
        Ok(())
    }
}
