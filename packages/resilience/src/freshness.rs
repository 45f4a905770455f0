//! Source timestamp reader.
//!
//! Collects the newest known timestamp of every data signal a site has:
//! each configured weather source kind (from the cache record's
//! provenance) and each webcam image (from the file's modification time).

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use skyfeed_cache::CacheRecord;
use skyfeed_observation_models::SourceKind;
use skyfeed_state::{StateDoc, StateError, StateStore, load};

/// Where a freshness signal comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "id")]
pub enum SignalSource {
    Weather(SourceKind),
    Webcam(String),
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Weather(kind) => write!(f, "weather:{kind}"),
            Self::Webcam(id) => write!(f, "webcam:{id}"),
        }
    }
}

/// One signal and its newest timestamp, if it has ever reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Signal {
    pub source: SignalSource,
    pub timestamp: Option<i64>,
}

/// Every signal of one site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceTimestamps {
    pub signals: Vec<Signal>,
}

impl SourceTimestamps {
    /// Reads the signals for `site`: one per weather source kind in
    /// `kinds`, one per `(id, image path)` in `webcams`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the cache record or a webcam's metadata
    /// cannot be read.
    pub fn read(
        store: &dyn StateStore,
        site: &str,
        kinds: &[SourceKind],
        webcams: &[(String, PathBuf)],
    ) -> Result<Self, StateError> {
        let record: Option<CacheRecord> = load(store, &StateDoc::WeatherCache(site.to_owned()))?;

        let mut signals: Vec<Signal> = kinds
            .iter()
            .map(|kind| Signal {
                source: SignalSource::Weather(*kind),
                timestamp: record.as_ref().and_then(|r| r.freshness(*kind)),
            })
            .collect();

        for (id, path) in webcams {
            signals.push(Signal {
                source: SignalSource::Webcam(id.clone()),
                timestamp: store.modified(&StateDoc::External(path.clone()))?,
            });
        }

        Ok(Self { signals })
    }

    /// The newest timestamp across every signal.
    #[must_use]
    pub fn newest(&self) -> Option<i64> {
        self.signals.iter().filter_map(|s| s.timestamp).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyfeed_observation_models::Observation;
    use skyfeed_state::{MemoryStateStore, save};

    const NOW: i64 = 1_714_564_800;

    #[test]
    fn reads_weather_and_webcam_signals() {
        let store = MemoryStateStore::new();
        let mut record =
            CacheRecord::from_observation(Observation::at(NOW - 900), SourceKind::Primary, NOW - 840);
        record.last_updated_metar = Some(NOW - 3000);
        save(&store, &StateDoc::WeatherCache("kspb".into()), &record).unwrap();
        store.touch(StateDoc::External(PathBuf::from("/cams/kspb-n.jpg")), NOW - 60);

        let ts = SourceTimestamps::read(
            &store,
            "kspb",
            &[SourceKind::Primary, SourceKind::Metar, SourceKind::Backup],
            &[("north".into(), PathBuf::from("/cams/kspb-n.jpg"))],
        )
        .unwrap();

        let stamps: Vec<_> = ts.signals.iter().map(|s| s.timestamp).collect();
        // Primary reports its observation time, METAR falls back to fetch time.
        assert_eq!(stamps, vec![Some(NOW - 900), Some(NOW - 3000), None, Some(NOW - 60)]);
        assert_eq!(ts.newest(), Some(NOW - 60));
        assert_eq!(ts.signals[3].source.to_string(), "webcam:north");
    }

    #[test]
    fn nothing_known_has_no_newest() {
        let store = MemoryStateStore::new();
        let ts = SourceTimestamps::read(
            &store,
            "kspb",
            &[SourceKind::Primary],
            &[("north".into(), PathBuf::from("/cams/missing.jpg"))],
        )
        .unwrap();
        assert_eq!(ts.signals.len(), 2);
        assert_eq!(ts.newest(), None);
    }
}
