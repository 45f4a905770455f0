//! The persisted cache document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use skyfeed_observation_models::{Field, FieldGroup, Observation, SourceKind};

/// Running extremes for the site-local calendar day.
///
/// These accumulate across cycles and are never subject to staleness.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyExtremes {
    /// Local date (`YYYY-MM-DD`) the values belong to.
    #[serde(default, rename = "daily_date")]
    pub date: Option<String>,
    pub temp_high_today: Option<f64>,
    pub temp_high_ts: Option<i64>,
    pub temp_low_today: Option<f64>,
    pub temp_low_ts: Option<i64>,
    pub peak_gust_today: Option<i32>,
    pub peak_gust_time: Option<i64>,
}

impl DailyExtremes {
    /// Starts a new day, discarding the previous day's values.
    #[must_use]
    pub fn for_date(date: impl Into<String>) -> Self {
        Self {
            date: Some(date.into()),
            ..Self::default()
        }
    }

    /// Folds one observation into the running extremes.
    pub fn record(&mut self, obs: &Observation) {
        if let Some(t) = obs.temperature {
            if self.temp_high_today.is_none_or(|high| t > high) {
                self.temp_high_today = Some(t);
                self.temp_high_ts = Some(obs.obs_time);
            }
            if self.temp_low_today.is_none_or(|low| t < low) {
                self.temp_low_today = Some(t);
                self.temp_low_ts = Some(obs.obs_time);
            }
        }

        let gust = obs.gust_speed.max(obs.peak_gust);
        if let Some(g) = gust
            && self.peak_gust_today.is_none_or(|peak| g > peak)
        {
            self.peak_gust_today = Some(g);
            self.peak_gust_time = Some(obs.obs_time);
        }
    }
}

/// One site's cache document.
///
/// Serializes flat: observation fields, then `last_updated_<kind>` and
/// `obs_time_<kind>` provenance, then the daily extremes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    #[serde(flatten)]
    pub observation: Observation,

    /// When each source kind last contributed, Unix seconds (fetch time).
    pub last_updated_primary: Option<i64>,
    pub last_updated_backup: Option<i64>,
    pub last_updated_metar: Option<i64>,

    /// Observation time each source kind last reported.
    pub obs_time_primary: Option<i64>,
    pub obs_time_backup: Option<i64>,
    pub obs_time_metar: Option<i64>,

    #[serde(flatten)]
    pub daily: DailyExtremes,

    /// Which source kind supplied each present field.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_sources: BTreeMap<Field, SourceKind>,

    /// When each present field was last reported by its source, as opposed
    /// to carried forward from an earlier record.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_updated: BTreeMap<Field, i64>,
}

impl CacheRecord {
    /// A record holding only `obs`, attributed to `kind` and stamped with
    /// `fetched_at`.
    #[must_use]
    pub fn from_observation(obs: Observation, kind: SourceKind, fetched_at: i64) -> Self {
        use strum::IntoEnumIterator;

        let present: Vec<Field> = Field::iter().filter(|f| obs.has(*f)).collect();
        let field_sources = present.iter().map(|f| (*f, kind)).collect();
        let field_updated = present.iter().map(|f| (*f, fetched_at)).collect();
        let obs_time = obs.obs_time;

        let mut record = Self {
            observation: obs,
            field_sources,
            field_updated,
            ..Self::default()
        };
        record.set_last_updated(kind, fetched_at);
        record.set_obs_time(kind, obs_time);
        record
    }

    /// When `kind` last contributed.
    #[must_use]
    pub const fn last_updated(&self, kind: SourceKind) -> Option<i64> {
        match kind {
            SourceKind::Primary => self.last_updated_primary,
            SourceKind::Backup => self.last_updated_backup,
            SourceKind::Metar => self.last_updated_metar,
        }
    }

    pub const fn set_last_updated(&mut self, kind: SourceKind, ts: i64) {
        match kind {
            SourceKind::Primary => self.last_updated_primary = Some(ts),
            SourceKind::Backup => self.last_updated_backup = Some(ts),
            SourceKind::Metar => self.last_updated_metar = Some(ts),
        }
    }

    /// Observation time `kind` last reported.
    #[must_use]
    pub const fn obs_time(&self, kind: SourceKind) -> Option<i64> {
        match kind {
            SourceKind::Primary => self.obs_time_primary,
            SourceKind::Backup => self.obs_time_backup,
            SourceKind::Metar => self.obs_time_metar,
        }
    }

    pub const fn set_obs_time(&mut self, kind: SourceKind, ts: i64) {
        match kind {
            SourceKind::Primary => self.obs_time_primary = Some(ts),
            SourceKind::Backup => self.obs_time_backup = Some(ts),
            SourceKind::Metar => self.obs_time_metar = Some(ts),
        }
    }

    /// Newest provenance timestamp among the kinds governing `group`.
    #[must_use]
    pub fn group_timestamp(&self, group: FieldGroup) -> Option<i64> {
        group
            .governing_kinds()
            .iter()
            .filter_map(|k| self.last_updated(*k))
            .max()
    }

    /// The timestamp that decides whether `field`'s cached value is still
    /// usable: the supplying kind's, or the field group's when the
    /// supplier is unknown.
    #[must_use]
    pub fn governing_timestamp(&self, field: Field) -> Option<i64> {
        self.field_sources
            .get(&field)
            .and_then(|kind| self.last_updated(*kind))
            .or_else(|| self.group_timestamp(field.group()))
    }

    /// When `field` was last reported rather than carried forward. Records
    /// written before per-field stamps existed fall back to the supplier's
    /// last update.
    #[must_use]
    pub fn field_reported_at(&self, field: Field) -> Option<i64> {
        self.field_updated.get(&field).copied().or_else(|| {
            self.field_sources
                .get(&field)
                .and_then(|kind| self.last_updated(*kind))
        })
    }

    /// How fresh `kind`'s data is: its observation time, falling back to
    /// when it was last fetched.
    #[must_use]
    pub fn freshness(&self, kind: SourceKind) -> Option<i64> {
        self.obs_time(kind).or_else(|| self.last_updated(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_flat_with_provenance() {
        let obs = Observation {
            temperature: Some(12.5),
            wind_speed: Some(8),
            ..Observation::at(1_714_564_800)
        };
        let record = CacheRecord::from_observation(obs, SourceKind::Primary, 1_714_564_830);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["temperature"], 12.5);
        assert_eq!(json["last_updated_primary"], 1_714_564_830);
        assert_eq!(json["obs_time_primary"], 1_714_564_800);
        assert!(json["last_updated_metar"].is_null());
        assert!(json["temp_high_today"].is_null());
        assert_eq!(json["field_sources"]["wind_speed"], "primary");
        assert_eq!(json["field_updated"]["temperature"], 1_714_564_830);

        let back: CacheRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn station_group_uses_newest_of_primary_and_backup() {
        let record = CacheRecord {
            last_updated_primary: Some(100),
            last_updated_backup: Some(200),
            last_updated_metar: Some(900),
            ..CacheRecord::default()
        };
        assert_eq!(record.group_timestamp(FieldGroup::Station), Some(200));
        assert_eq!(record.group_timestamp(FieldGroup::Aviation), Some(900));
    }

    #[test]
    fn attributed_field_is_governed_by_its_supplier() {
        let mut record = CacheRecord {
            last_updated_primary: Some(100),
            last_updated_metar: Some(900),
            ..CacheRecord::default()
        };
        record
            .field_sources
            .insert(Field::Temperature, SourceKind::Metar);
        assert_eq!(record.governing_timestamp(Field::Temperature), Some(900));
        assert_eq!(record.governing_timestamp(Field::WindSpeed), Some(100));
    }

    #[test]
    fn field_report_time_falls_back_to_supplier() {
        let mut record = CacheRecord {
            last_updated_primary: Some(100),
            ..CacheRecord::default()
        };
        record
            .field_sources
            .insert(Field::Temperature, SourceKind::Primary);
        assert_eq!(record.field_reported_at(Field::Temperature), Some(100));

        record.field_updated.insert(Field::Temperature, 40);
        assert_eq!(record.field_reported_at(Field::Temperature), Some(40));
        assert_eq!(record.field_reported_at(Field::WindSpeed), None);
    }

    #[test]
    fn daily_extremes_track_high_low_and_gust() {
        let mut daily = DailyExtremes::for_date("2024-05-01");
        for (t, temp, gust) in [(10, 5.0, Some(12)), (20, 9.0, None), (30, 3.0, Some(20))] {
            daily.record(&Observation {
                temperature: Some(temp),
                gust_speed: gust,
                ..Observation::at(t)
            });
        }
        assert_eq!(daily.temp_high_today, Some(9.0));
        assert_eq!(daily.temp_high_ts, Some(20));
        assert_eq!(daily.temp_low_today, Some(3.0));
        assert_eq!(daily.temp_low_ts, Some(30));
        assert_eq!(daily.peak_gust_today, Some(20));
        assert_eq!(daily.peak_gust_time, Some(30));
    }

    #[test]
    fn freshness_prefers_observation_time() {
        let record = CacheRecord {
            last_updated_metar: Some(500),
            obs_time_metar: Some(450),
            last_updated_primary: Some(300),
            ..CacheRecord::default()
        };
        assert_eq!(record.freshness(SourceKind::Metar), Some(450));
        assert_eq!(record.freshness(SourceKind::Primary), Some(300));
        assert_eq!(record.freshness(SourceKind::Backup), None);
    }
}
