//! Per-source circuit breaker.
//!
//! State for every (site, source kind) pair lives in one `backoff.json`
//! document keyed `"<site>_weather_<kind>"`. A pair is closed until
//! `failure_threshold` consecutive failures, then open until its
//! `next_allowed_time`. The first attempt after the window passes is let
//! through; a success closes the breaker and forgets the entry, another
//! failure reopens it with a longer window.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use skyfeed_observation_models::SourceKind;
use skyfeed_source::fetch::FetchFailure;
use skyfeed_state::{StateDoc, StateError, StateStore, load, modify};
use strum::IntoEnumIterator;

/// Reason reported by [`CircuitBreaker::check`] for a skipped fetch.
pub const CIRCUIT_OPEN: &str = "circuit_open";

/// Largest power of two applied to the base backoff.
const MAX_DOUBLINGS: u32 = 20;

/// Breaker tuning. All durations are in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// Backoff after the failure that opens the breaker.
    pub base_backoff: i64,
    /// Ceiling for the exponential part of the backoff.
    pub max_backoff: i64,
    /// Applied on top of the capped backoff for permanent errors.
    pub permanent_multiplier: i64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            base_backoff: 60,
            max_backoff: 3600,
            permanent_multiplier: 3,
        }
    }
}

impl BreakerConfig {
    /// Failures needed to open the breaker. A configured zero means one.
    #[must_use]
    pub const fn threshold(&self) -> u32 {
        if self.failure_threshold == 0 {
            1
        } else {
            self.failure_threshold
        }
    }

    /// Backoff window after the `failure_count`th consecutive failure of
    /// `class`. Zero while the breaker is still closed.
    #[must_use]
    pub fn backoff(&self, failure_count: u32, class: ErrorClass) -> i64 {
        let threshold = self.threshold();
        if failure_count < threshold {
            return 0;
        }
        let doublings = (failure_count - threshold).min(MAX_DOUBLINGS);
        let window = self
            .base_backoff
            .saturating_mul(1_i64 << doublings)
            .min(self.max_backoff);
        match class {
            ErrorClass::Transient => window,
            ErrorClass::Permanent => window.saturating_mul(self.permanent_multiplier.max(2)),
        }
    }
}

/// How likely a failure is to clear up on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorClass {
    /// Timeouts, connection errors, 5xx, throttling.
    Transient,
    /// Bad credentials, unknown station, other 4xx.
    Permanent,
}

impl ErrorClass {
    /// Classifies a failure by its HTTP status. Failures without a status
    /// (network errors, unparseable payloads) are transient.
    #[must_use]
    pub const fn classify(status: Option<u16>) -> Self {
        match status {
            Some(408 | 429) => Self::Transient,
            Some(400..=499) => Self::Permanent,
            _ => Self::Transient,
        }
    }
}

/// Persisted state of one (site, source kind) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerEntry {
    pub failure_count: u32,
    pub next_allowed_time: Option<i64>,
    pub last_failure_reason: Option<String>,
    pub error_class: Option<ErrorClass>,
}

type BreakerState = BTreeMap<String, BreakerEntry>;

/// Outcome of [`CircuitBreaker::check`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerCheck {
    /// Whether the caller must not attempt the fetch.
    pub skip: bool,
    /// Why the fetch is skipped.
    pub reason: Option<&'static str>,
    /// Seconds until the next attempt is allowed.
    pub remaining: i64,
}

impl BreakerCheck {
    const fn closed() -> Self {
        Self {
            skip: false,
            reason: None,
            remaining: 0,
        }
    }

    const fn open(remaining: i64) -> Self {
        Self {
            skip: true,
            reason: Some(CIRCUIT_OPEN),
            remaining,
        }
    }
}

/// Key of a (site, source kind) pair in the backoff document.
#[must_use]
pub fn breaker_key(site: &str, kind: SourceKind) -> String {
    format!("{site}_weather_{kind}")
}

/// Circuit breaker over a [`StateStore`].
pub struct CircuitBreaker<'a> {
    store: &'a dyn StateStore,
    config: BreakerConfig,
}

impl<'a> CircuitBreaker<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn StateStore, config: BreakerConfig) -> Self {
        Self { store, config }
    }

    fn load(&self) -> Result<BreakerState, StateError> {
        Ok(load::<BreakerState>(self.store, &StateDoc::Backoff)?.unwrap_or_default())
    }

    /// Whether `site`'s `kind` source may be fetched at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the backoff document cannot be read.
    pub fn check(&self, site: &str, kind: SourceKind, now: i64) -> Result<BreakerCheck, StateError> {
        let state = self.load()?;
        let Some(entry) = state.get(&breaker_key(site, kind)) else {
            return Ok(BreakerCheck::closed());
        };
        if entry.failure_count < self.config.threshold() {
            return Ok(BreakerCheck::closed());
        }
        match entry.next_allowed_time {
            Some(next) if next > now => Ok(BreakerCheck::open(next - now)),
            _ => Ok(BreakerCheck::closed()),
        }
    }

    /// Counts a failure for `site`'s `kind` source and returns the updated
    /// entry.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the backoff document cannot be written.
    pub fn record_failure(
        &self,
        site: &str,
        kind: SourceKind,
        failure: &FetchFailure,
        now: i64,
    ) -> Result<BreakerEntry, StateError> {
        let key = breaker_key(site, kind);
        let class = ErrorClass::classify(failure.status);

        modify(self.store, &StateDoc::Backoff, |state: Option<BreakerState>| {
            let mut state = state.unwrap_or_default();
            let entry = state.entry(key.clone()).or_default();

            entry.failure_count = entry.failure_count.saturating_add(1);
            entry.last_failure_reason = Some(failure.reason.clone());
            entry.error_class = Some(class);

            let backoff = self.config.backoff(entry.failure_count, class);
            if backoff > 0 {
                entry.next_allowed_time = Some(now + backoff);
                log::warn!(
                    "{key}: circuit open after {} failures ({class}: {}), retry in {backoff}s",
                    entry.failure_count,
                    failure.reason
                );
            } else {
                log::info!(
                    "{key}: failure {}/{} ({})",
                    entry.failure_count,
                    self.config.threshold(),
                    failure.reason
                );
            }

            let entry = entry.clone();
            (Some(state), entry)
        })
    }

    /// Closes the breaker for `site`'s `kind` source. Returns whether there
    /// was failure state to clear.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the backoff document cannot be written.
    pub fn record_success(&self, site: &str, kind: SourceKind) -> Result<bool, StateError> {
        let key = breaker_key(site, kind);
        if !self.load()?.contains_key(&key) {
            return Ok(false);
        }

        modify(self.store, &StateDoc::Backoff, |state: Option<BreakerState>| {
            let mut state = state.unwrap_or_default();
            let cleared = state.remove(&key);
            if let Some(entry) = &cleared {
                log::info!("{key}: recovered after {} failures", entry.failure_count);
            }
            let next = if state.is_empty() { None } else { Some(state) };
            (next, cleared.is_some())
        })
    }

    /// Failure state for every source kind of `site` that has any.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the backoff document cannot be read.
    pub fn entries(&self, site: &str) -> Result<Vec<(SourceKind, BreakerEntry)>, StateError> {
        let mut state = self.load()?;
        Ok(SourceKind::iter()
            .filter_map(|kind| state.remove(&breaker_key(site, kind)).map(|e| (kind, e)))
            .collect())
    }
}
