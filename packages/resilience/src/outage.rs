//! Site-wide data outage detection.
//!
//! A site is in outage when the newest timestamp across *all* of its
//! signals is older than its threshold. The persisted `outage/<site>.json`
//! remembers when the outage began so the reported start never drifts,
//! and lingers for a grace period after recovery so one good reading does
//! not make the banner flap.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use skyfeed_observation_models::SourceKind;
use skyfeed_state::{StateDoc, StateError, StateStore, load, modify};

use crate::freshness::{Signal, SourceTimestamps};

/// Outage thresholds, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutageConfig {
    /// Allowed staleness for ordinary sites.
    pub default_threshold: i64,
    /// Allowed staleness for `limited_availability` sites.
    pub limited_threshold: i64,
    /// How long a recovered outage is remembered.
    pub grace_period: i64,
}

impl Default for OutageConfig {
    fn default() -> Self {
        Self {
            default_threshold: 3 * 3600,
            limited_threshold: 30 * 60,
            grace_period: 30 * 60,
        }
    }
}

/// What the detector needs to know about a site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitoredSite {
    pub id: String,
    /// Skip detection entirely.
    pub maintenance: bool,
    /// Intermittently connected; staleness is the main health signal.
    pub limited_availability: bool,
    /// Overrides the configured threshold for this site.
    pub threshold: Option<i64>,
    pub source_kinds: Vec<SourceKind>,
    /// `(webcam id, image path)` pairs.
    pub webcams: Vec<(String, PathBuf)>,
}

/// Persisted outage record.
///
/// `last_checked` only advances while data is still stale, so it marks the
/// end of the outage. Once data is fresh again the record is kept for the
/// grace period, measured from `last_checked`, so a quick relapse resumes the
/// original `outage_start`. `recovered_at` marks a record that is in that
/// grace window. It is omitted while the outage is ongoing, so an active
/// record serializes as `{outage_start, last_checked}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutageState {
    /// Newest signal timestamp when the outage was first detected.
    pub outage_start: i64,
    /// Last check that still saw the outage.
    pub last_checked: i64,
    /// First check that saw fresh data again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovered_at: Option<i64>,
}

/// An ongoing outage as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutageStatus {
    pub site: String,
    pub outage_start: i64,
    pub newest_timestamp: i64,
    /// Seconds since `outage_start`.
    pub duration: i64,
    pub threshold: i64,
    pub signals: Vec<Signal>,
}

/// Outage detector over a [`StateStore`].
pub struct OutageDetector<'a> {
    store: &'a dyn StateStore,
    config: OutageConfig,
}

impl<'a> OutageDetector<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn StateStore, config: OutageConfig) -> Self {
        Self { store, config }
    }

    /// The staleness threshold that applies to `site`.
    #[must_use]
    pub fn threshold(&self, site: &MonitoredSite) -> i64 {
        site.threshold.unwrap_or(if site.limited_availability {
            self.config.limited_threshold
        } else {
            self.config.default_threshold
        })
    }

    /// The persisted outage record for `site`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the record cannot be read.
    pub fn state(&self, site: &str) -> Result<Option<OutageState>, StateError> {
        load(self.store, &StateDoc::Outage(site.to_owned()))
    }

    /// Checks `site` at `now`. Returns the outage if there is one.
    ///
    /// Sites under maintenance and sites that have never reported anything
    /// are never in outage.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if a signal or the outage record cannot be
    /// read or written.
    pub fn evaluate(&self, site: &MonitoredSite, now: i64) -> Result<Option<OutageStatus>, StateError> {
        if site.maintenance {
            log::debug!("{}: under maintenance, skipping outage check", site.id);
            return Ok(None);
        }

        let timestamps =
            SourceTimestamps::read(self.store, &site.id, &site.source_kinds, &site.webcams)?;
        let Some(newest) = timestamps.newest() else {
            log::debug!("{}: no data signals yet", site.id);
            return Ok(None);
        };

        let threshold = self.threshold(site);
        let stale = now - newest > threshold;
        let doc = StateDoc::Outage(site.id.clone());
        let grace = self.config.grace_period;
        let id = site.id.as_str();

        let outage_start = modify(self.store, &doc, |state: Option<OutageState>| {
            if stale {
                let state = match state {
                    Some(mut state) => {
                        if state.recovered_at.take().is_some() {
                            log::warn!("{id}: data went stale again during recovery grace");
                        }
                        state.last_checked = now;
                        state
                    }
                    None => {
                        log::warn!("{id}: outage detected, newest data is {}s old", now - newest);
                        OutageState {
                            outage_start: newest,
                            last_checked: now,
                            recovered_at: None,
                        }
                    }
                };
                let start = state.outage_start;
                return (Some(state), Some(start));
            }

            match state {
                None => (None, None),
                Some(state) if state.last_checked < now - grace => {
                    log::info!("{id}: outage cleared after grace period");
                    (None, None)
                }
                Some(mut state) => {
                    if state.recovered_at.is_none() {
                        log::info!("{id}: fresh data again, holding outage record for grace period");
                        state.recovered_at = Some(now);
                    }
                    (Some(state), None)
                }
            }
        })?;

        Ok(outage_start.map(|outage_start| OutageStatus {
            site: site.id.clone(),
            outage_start,
            newest_timestamp: newest,
            duration: now - outage_start,
            threshold,
            signals: timestamps.signals,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyfeed_cache::CacheRecord;
    use skyfeed_observation_models::Observation;
    use skyfeed_state::{MemoryStateStore, save};

    const NOW: i64 = 1_714_564_800;
    const HOUR: i64 = 3600;

    fn site() -> MonitoredSite {
        MonitoredSite {
            id: "kspb".into(),
            source_kinds: vec![SourceKind::Primary, SourceKind::Metar],
            ..MonitoredSite::default()
        }
    }

    fn cache_at(store: &MemoryStateStore, kind: SourceKind, obs_time: i64) {
        let record = CacheRecord::from_observation(Observation::at(obs_time), kind, obs_time);
        save(store, &StateDoc::WeatherCache("kspb".into()), &record).unwrap();
    }

    #[test]
    fn fresh_site_has_no_outage() {
        let store = MemoryStateStore::new();
        cache_at(&store, SourceKind::Primary, NOW - 600);
        let detector = OutageDetector::new(&store, OutageConfig::default());
        assert!(detector.evaluate(&site(), NOW).unwrap().is_none());
        assert!(detector.state("kspb").unwrap().is_none());
    }

    #[test]
    fn stale_site_reports_outage_from_newest_signal() {
        let store = MemoryStateStore::new();
        cache_at(&store, SourceKind::Primary, NOW - 5 * HOUR);
        let detector = OutageDetector::new(&store, OutageConfig::default());

        let status = detector.evaluate(&site(), NOW).unwrap().unwrap();
        assert_eq!(status.outage_start, NOW - 5 * HOUR);
        assert_eq!(status.duration, 5 * HOUR);
        assert_eq!(status.threshold, 3 * HOUR);
    }

    #[test]
    fn active_record_holds_only_start_and_last_check() {
        let store = MemoryStateStore::new();
        cache_at(&store, SourceKind::Primary, NOW - 5 * HOUR);
        OutageDetector::new(&store, OutageConfig::default())
            .evaluate(&site(), NOW)
            .unwrap();

        let raw = store.read(&StateDoc::Outage("kspb".into())).unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"outage_start": NOW - 5 * HOUR, "last_checked": NOW})
        );
    }

    #[test]
    fn outage_start_never_moves_while_stale() {
        let store = MemoryStateStore::new();
        cache_at(&store, SourceKind::Primary, NOW - 5 * HOUR);
        let detector = OutageDetector::new(&store, OutageConfig::default());
        detector.evaluate(&site(), NOW).unwrap();

        // A later check sees an even older newest timestamp.
        cache_at(&store, SourceKind::Primary, NOW - 8 * HOUR);
        let status = detector.evaluate(&site(), NOW + HOUR).unwrap().unwrap();
        assert_eq!(status.outage_start, NOW - 5 * HOUR);
        assert_eq!(detector.state("kspb").unwrap().unwrap().last_checked, NOW + HOUR);
    }

    #[test]
    fn limited_availability_uses_shorter_threshold() {
        let store = MemoryStateStore::new();
        cache_at(&store, SourceKind::Primary, NOW - HOUR);
        let detector = OutageDetector::new(&store, OutageConfig::default());

        assert!(detector.evaluate(&site(), NOW).unwrap().is_none());
        let limited = MonitoredSite {
            limited_availability: true,
            ..site()
        };
        assert!(detector.evaluate(&limited, NOW).unwrap().is_some());
    }

    #[test]
    fn maintenance_short_circuits() {
        let store = MemoryStateStore::new();
        cache_at(&store, SourceKind::Primary, NOW - 10 * HOUR);
        let detector = OutageDetector::new(&store, OutageConfig::default());
        let down = MonitoredSite {
            maintenance: true,
            ..site()
        };
        assert!(detector.evaluate(&down, NOW).unwrap().is_none());
        assert!(detector.state("kspb").unwrap().is_none());
    }

    #[test]
    fn recovery_holds_record_through_grace_period() {
        let store = MemoryStateStore::new();
        cache_at(&store, SourceKind::Primary, NOW - 5 * HOUR);
        let detector = OutageDetector::new(&store, OutageConfig::default());
        detector.evaluate(&site(), NOW).unwrap();

        let recovered = NOW + 600;
        cache_at(&store, SourceKind::Primary, recovered);
        assert!(detector.evaluate(&site(), recovered).unwrap().is_none());
        let held = detector.state("kspb").unwrap().unwrap();
        assert_eq!(held.last_checked, NOW);
        assert_eq!(held.recovered_at, Some(recovered));

        let later = NOW + 31 * 60;
        cache_at(&store, SourceKind::Primary, later);
        assert!(detector.evaluate(&site(), later).unwrap().is_none());
        assert!(detector.state("kspb").unwrap().is_none());
    }

    #[test]
    fn relapse_during_grace_keeps_original_start() {
        let store = MemoryStateStore::new();
        cache_at(&store, SourceKind::Primary, NOW - 5 * HOUR);
        let detector = OutageDetector::new(&store, OutageConfig::default());
        detector.evaluate(&site(), NOW).unwrap();

        cache_at(&store, SourceKind::Primary, NOW + 60);
        detector.evaluate(&site(), NOW + 60).unwrap();

        let relapse = NOW + 60 + 4 * HOUR;
        let status = detector.evaluate(&site(), relapse).unwrap();
        // The record was still held, so this continues the original outage.
        assert_eq!(status.unwrap().outage_start, NOW - 5 * HOUR);
        assert!(detector.state("kspb").unwrap().unwrap().recovered_at.is_none());
    }

    #[test]
    fn corrupt_record_is_deleted_and_ignored() {
        let store = MemoryStateStore::new();
        cache_at(&store, SourceKind::Primary, NOW - 60);
        store
            .write(&StateDoc::Outage("kspb".into()), "{\"outage_start\": ")
            .unwrap();
        let detector = OutageDetector::new(&store, OutageConfig::default());

        assert!(detector.evaluate(&site(), NOW).unwrap().is_none());
        assert!(store.read(&StateDoc::Outage("kspb".into())).unwrap().is_none());
    }

    #[test]
    fn webcam_only_outage_starts_at_image_mtime() {
        let store = MemoryStateStore::new();
        let image = PathBuf::from("/var/cams/kspb/north.jpg");
        store.touch(StateDoc::External(image.clone()), NOW - 6 * HOUR);
        let detector = OutageDetector::new(&store, OutageConfig::default());
        let cam_site = MonitoredSite {
            webcams: vec![("north".into(), image)],
            ..site()
        };

        let status = detector.evaluate(&cam_site, NOW).unwrap().unwrap();
        assert_eq!(status.outage_start, NOW - 6 * HOUR);
    }

    #[test]
    fn never_reported_is_not_an_outage() {
        let store = MemoryStateStore::new();
        let detector = OutageDetector::new(&store, OutageConfig::default());
        assert!(detector.evaluate(&site(), NOW).unwrap().is_none());
    }
}
