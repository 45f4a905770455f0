//! Applies fresh observations to a site's persisted cache record.

use chrono::{DateTime, FixedOffset, TimeZone};
use skyfeed_observation_models::{Field, Observation, SourceKind};
use skyfeed_state::{StateDoc, StateError, StateStore, load, modify};
use strum::IntoEnumIterator;

use crate::merge::{is_fresh, merge};
use crate::{CacheRecord, DailyExtremes};

/// Local calendar date (`YYYY-MM-DD`) of `ts` in `tz`.
#[must_use]
pub fn local_date_key<Tz: TimeZone>(ts: i64, tz: &Tz) -> Option<String> {
    DateTime::from_timestamp(ts, 0).map(|utc| utc.with_timezone(tz).date_naive().to_string())
}

/// Writes merged observations into `weather/<site>.json`.
///
/// One writer per site at a time: the read-modify-write happens under the
/// store's exclusive lock, but callers must still not run two cycles for
/// the same site concurrently.
pub struct CacheWriter<'a> {
    store: &'a dyn StateStore,
    max_stale: i64,
    utc_offset: FixedOffset,
}

impl<'a> CacheWriter<'a> {
    /// `max_stale` bounds how long a cached field may stand in for a
    /// missing fresh one; `utc_offset` defines the site's local day for
    /// the daily extremes.
    #[must_use]
    pub const fn new(store: &'a dyn StateStore, max_stale: i64, utc_offset: FixedOffset) -> Self {
        Self {
            store,
            max_stale,
            utc_offset,
        }
    }

    /// The current cache record for `site`. A corrupt record is deleted and
    /// reported as absent.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the store cannot be read.
    pub fn read(&self, site: &str) -> Result<Option<CacheRecord>, StateError> {
        load(self.store, &StateDoc::WeatherCache(site.to_owned()))
    }

    /// Merges `obs` from a `kind` source into `site`'s cache, updates the
    /// daily extremes, persists the result, and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the lock cannot be taken or the record
    /// cannot be written.
    pub fn write(
        &self,
        site: &str,
        kind: SourceKind,
        obs: &Observation,
        now: i64,
    ) -> Result<CacheRecord, StateError> {
        let doc = StateDoc::WeatherCache(site.to_owned());

        modify(self.store, &doc, |cached: Option<CacheRecord>| {
            let mut fresh = CacheRecord::from_observation(obs.clone(), kind, now);
            if let Some(cached) = &cached {
                self.yield_to_preferred(&mut fresh, cached, now);
            }

            // Daily extremes only see what this source actually contributed.
            let contributed = fresh.observation.clone();

            let mut merged = merge(Some(fresh), cached.as_ref(), self.max_stale, now)
                .unwrap_or_else(|| CacheRecord::from_observation(contributed.clone(), kind, now));
            self.track_daily(&mut merged.daily, &contributed, site);

            (Some(merged.clone()), merged)
        })
    }

    /// Drops fresh fields that a higher-priority source (lower
    /// [`SourceKind`]) has itself reported within `max_stale`, so a METAR
    /// reading never overwrites the site's own station. A value the
    /// preferred source only carried forward does not count.
    fn yield_to_preferred(&self, fresh: &mut CacheRecord, cached: &CacheRecord, now: i64) {
        let Some(incoming) = fresh.field_sources.values().next().copied() else {
            return;
        };
        for field in Field::iter() {
            let Some(owner) = cached.field_sources.get(&field).copied() else {
                continue;
            };
            if owner < incoming
                && fresh.observation.has(field)
                && cached.observation.has(field)
                && is_fresh(cached.field_reported_at(field), self.max_stale, now)
            {
                fresh.observation.clear(field);
                fresh.field_sources.remove(&field);
                fresh.field_updated.remove(&field);
            }
        }
    }

    fn track_daily(&self, daily: &mut DailyExtremes, obs: &Observation, site: &str) {
        let Some(day) = local_date_key(obs.obs_time, &self.utc_offset) else {
            return;
        };
        match daily.date.as_deref() {
            Some(current) if current == day => {}
            Some(current) if current > day.as_str() => {
                log::debug!("{site}: observation from {day} predates tracked day {current}");
                return;
            }
            previous => {
                if let Some(previous) = previous {
                    log::info!("{site}: local day rolled over from {previous} to {day}");
                }
                *daily = DailyExtremes::for_date(day);
            }
        }
        daily.record(obs);
    }
}
