//! Merge-with-fallback.
//!
//! A fresh record is often partial: the primary station answered but has
//! no visibility sensor, or the METAR omitted gusts. Missing fields fall
//! back to the cached record, but only while the provenance timestamp
//! governing that field is younger than `max_stale` seconds. A field whose
//! governing timestamp is exactly `max_stale` old is already stale.

use skyfeed_observation_models::{Field, SourceKind};
use strum::IntoEnumIterator;

use crate::CacheRecord;

/// Whether a value stamped `ts` may still be used at `now`.
#[must_use]
pub fn is_fresh(ts: Option<i64>, max_stale: i64, now: i64) -> bool {
    ts.is_some_and(|ts| now - ts < max_stale)
}

/// Merges `fresh` over `cached`.
///
/// - A field present in `fresh` always wins, even if implausible.
/// - A field absent from `fresh` takes the cached value only if the
///   cached record's governing timestamp for it is fresh.
/// - Daily extremes are copied from `cached` unconditionally.
/// - Provenance timestamps and `obs_time` keep the newest value.
///
/// Returns `None` when there is no fresh record, and `fresh` unchanged
/// when there is nothing cached.
#[must_use]
pub fn merge(
    fresh: Option<CacheRecord>,
    cached: Option<&CacheRecord>,
    max_stale: i64,
    now: i64,
) -> Option<CacheRecord> {
    let mut merged = fresh?;
    let Some(cached) = cached else {
        return Some(merged);
    };

    for field in Field::iter() {
        if merged.observation.has(field) {
            continue;
        }
        if !cached.observation.has(field) {
            continue;
        }
        if is_fresh(cached.governing_timestamp(field), max_stale, now) {
            merged.observation.copy_field_from(field, &cached.observation);
            if let Some(kind) = cached.field_sources.get(&field) {
                merged.field_sources.insert(field, *kind);
            }
            if let Some(ts) = cached.field_reported_at(field) {
                merged.field_updated.insert(field, ts);
            }
        } else {
            log::debug!("dropping stale cached {field}");
        }
    }

    merged.daily = cached.daily.clone();
    merged.observation.obs_time = merged.observation.obs_time.max(cached.observation.obs_time);

    for kind in SourceKind::iter() {
        if let Some(ts) = merged.last_updated(kind).max(cached.last_updated(kind)) {
            merged.set_last_updated(kind, ts);
        }
        if let Some(ts) = merged.obs_time(kind).max(cached.obs_time(kind)) {
            merged.set_obs_time(kind, ts);
        }
    }

    Some(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyfeed_observation_models::Observation;

    const NOW: i64 = 1_714_564_800;
    const THREE_HOURS: i64 = 3 * 3600;

    fn cached(primary_age: i64) -> CacheRecord {
        let obs = Observation {
            temperature: Some(14.0),
            wind_speed: Some(9),
            visibility: Some(10.0),
            ..Observation::at(NOW - primary_age)
        };
        let mut record = CacheRecord::from_observation(obs, SourceKind::Primary, NOW - primary_age);
        record.daily.temp_high_today = Some(21.0);
        record.daily.temp_high_ts = Some(NOW - 6 * 3600);
        record
    }

    fn fresh_wind_only() -> CacheRecord {
        let obs = Observation {
            wind_speed: Some(12),
            ..Observation::at(NOW)
        };
        CacheRecord::from_observation(obs, SourceKind::Primary, NOW)
    }

    #[test]
    fn fresh_value_wins() {
        let merged = merge(Some(fresh_wind_only()), Some(&cached(60)), THREE_HOURS, NOW).unwrap();
        assert_eq!(merged.observation.wind_speed, Some(12));
    }

    #[test]
    fn missing_field_falls_back_while_fresh() {
        let merged = merge(Some(fresh_wind_only()), Some(&cached(60)), THREE_HOURS, NOW).unwrap();
        assert_eq!(merged.observation.temperature, Some(14.0));
        assert_eq!(
            merged.field_sources.get(&Field::Temperature),
            Some(&SourceKind::Primary)
        );
        assert_eq!(merged.field_updated.get(&Field::Temperature), Some(&(NOW - 60)));
        assert_eq!(merged.field_updated.get(&Field::WindSpeed), Some(&NOW));
    }

    #[test]
    fn threshold_age_is_stale_one_second_less_is_not() {
        let at_threshold =
            merge(Some(fresh_wind_only()), Some(&cached(THREE_HOURS)), THREE_HOURS, NOW).unwrap();
        assert_eq!(at_threshold.observation.temperature, None);
        assert!(!at_threshold.field_sources.contains_key(&Field::Temperature));

        let just_under = merge(
            Some(fresh_wind_only()),
            Some(&cached(THREE_HOURS - 1)),
            THREE_HOURS,
            NOW,
        )
        .unwrap();
        assert_eq!(just_under.observation.temperature, Some(14.0));
    }

    #[test]
    fn daily_extremes_survive_staleness() {
        let merged = merge(
            Some(fresh_wind_only()),
            Some(&cached(5 * 3600)),
            THREE_HOURS,
            NOW,
        )
        .unwrap();
        assert_eq!(merged.observation.temperature, None);
        assert_eq!(merged.daily.temp_high_today, Some(21.0));
        assert_eq!(merged.daily.temp_high_ts, Some(NOW - 6 * 3600));
    }

    #[test]
    fn one_sources_staleness_does_not_touch_another() {
        // Cached visibility came from a METAR that is still fresh even
        // though the primary station has gone stale.
        let mut cached = cached(5 * 3600);
        cached.last_updated_metar = Some(NOW - 600);
        cached
            .field_sources
            .insert(Field::Visibility, SourceKind::Metar);

        let merged = merge(Some(fresh_wind_only()), Some(&cached), THREE_HOURS, NOW).unwrap();
        assert_eq!(merged.observation.visibility, Some(10.0));
        assert_eq!(merged.observation.temperature, None);
    }

    #[test]
    fn provenance_keeps_newest_per_kind() {
        let mut cached = cached(60);
        cached.last_updated_metar = Some(NOW - 300);
        let merged = merge(Some(fresh_wind_only()), Some(&cached), THREE_HOURS, NOW).unwrap();
        assert_eq!(merged.last_updated_primary, Some(NOW));
        assert_eq!(merged.last_updated_metar, Some(NOW - 300));
    }

    #[test]
    fn degenerate_inputs() {
        assert!(merge(None, Some(&cached(0)), THREE_HOURS, NOW).is_none());
        let fresh = fresh_wind_only();
        assert_eq!(merge(Some(fresh.clone()), None, THREE_HOURS, NOW), Some(fresh));
    }
}
