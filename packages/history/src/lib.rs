#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-site observation history.
//!
//! One document per site (`history/<site>.json`) holding merged
//! observations ordered by `obs_time`. Appends are idempotent on
//! `obs_time` and prune anything older than the retention window.

pub mod aggregate;

use std::collections::{BTreeMap, BTreeSet};

use chrono::TimeZone;
use serde::{Deserialize, Serialize};
use skyfeed_observation_models::{Field, Observation, SourceKind};
use skyfeed_state::{StateDoc, StateError, StateStore, load, modify};
use strum::{AsRefStr, Display, EnumString};

pub use aggregate::{DayExtremes, WIND_ROSE_SECTORS};

/// Default retention window.
pub const DEFAULT_RETENTION_HOURS: i64 = 24;

/// One stored observation with optional attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub observation: Observation,
    /// Which source kind supplied each field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_sources: Option<BTreeMap<Field, SourceKind>>,
    /// Every source kind that contributed to this entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<BTreeSet<SourceKind>>,
}

impl HistoryEntry {
    /// Snapshots `obs`. Validation issues are not carried into history.
    #[must_use]
    pub fn new(mut obs: Observation, field_sources: Option<BTreeMap<Field, SourceKind>>) -> Self {
        obs.validation_issues.clear();
        let sources = field_sources
            .as_ref()
            .map(|m| m.values().copied().collect::<BTreeSet<_>>())
            .filter(|s| !s.is_empty());
        Self {
            observation: obs,
            field_sources: field_sources.filter(|m| !m.is_empty()),
            sources,
        }
    }
}

/// The persisted history document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryDocument {
    pub airport_id: String,
    pub updated_at: i64,
    pub retention_hours: i64,
    #[serde(default)]
    pub observations: Vec<HistoryEntry>,
}

/// Query downsampling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Resolution {
    /// Every stored entry.
    #[default]
    Raw,
    /// The latest entry in each clock hour.
    Hourly,
}

/// Result of [`HistoryStore::query`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryQuery {
    pub observations: Vec<HistoryEntry>,
    pub observation_count: usize,
}

/// History reads and writes for every site, backed by a state store.
pub struct HistoryStore<'a> {
    store: &'a dyn StateStore,
    retention_hours: i64,
}

impl<'a> HistoryStore<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn StateStore, retention_hours: i64) -> Self {
        Self {
            store,
            retention_hours,
        }
    }

    fn doc(site: &str) -> StateDoc {
        StateDoc::History(site.to_owned())
    }

    /// Appends `obs` to `site`'s history and prunes expired entries.
    ///
    /// Returns `false` when an entry with the same `obs_time` already
    /// exists; nothing is added in that case, but pruning still runs.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the history document cannot be written.
    pub fn append(
        &self,
        site: &str,
        obs: &Observation,
        field_sources: Option<&BTreeMap<Field, SourceKind>>,
        now: i64,
    ) -> Result<bool, StateError> {
        let cutoff = now - self.retention_hours * 3600;

        modify(self.store, &Self::doc(site), |doc: Option<HistoryDocument>| {
            let mut doc = doc.unwrap_or_else(|| HistoryDocument {
                airport_id: site.to_owned(),
                ..HistoryDocument::default()
            });
            doc.retention_hours = self.retention_hours;
            doc.updated_at = now;

            let before = doc.observations.len();
            doc.observations.retain(|e| e.observation.obs_time >= cutoff);
            let pruned = before - doc.observations.len();
            if pruned > 0 {
                log::debug!("{site}: pruned {pruned} history entries older than {cutoff}");
            }

            let appended = match doc
                .observations
                .binary_search_by_key(&obs.obs_time, |e| e.observation.obs_time)
            {
                Ok(_) => false,
                Err(_) if obs.obs_time < cutoff => false,
                Err(pos) => {
                    let entry = HistoryEntry::new(obs.clone(), field_sources.cloned());
                    doc.observations.insert(pos, entry);
                    true
                }
            };

            (Some(doc), appended)
        })
    }

    /// Every stored entry for `site`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the document cannot be read.
    pub fn entries(&self, site: &str) -> Result<Vec<HistoryEntry>, StateError> {
        let doc: Option<HistoryDocument> = load(self.store, &Self::doc(site))?;
        let mut entries = doc.map(|d| d.observations).unwrap_or_default();
        entries.sort_by_key(|e| e.observation.obs_time);
        Ok(entries)
    }

    /// Entries within the inclusive `[start, end]` range, optionally
    /// downsampled.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the document cannot be read.
    pub fn query(
        &self,
        site: &str,
        start: Option<i64>,
        end: Option<i64>,
        resolution: Resolution,
    ) -> Result<HistoryQuery, StateError> {
        let entries: Vec<HistoryEntry> = self
            .entries(site)?
            .into_iter()
            .filter(|e| start.is_none_or(|s| e.observation.obs_time >= s))
            .filter(|e| end.is_none_or(|t| e.observation.obs_time <= t))
            .collect();

        let observations = match resolution {
            Resolution::Raw => entries,
            Resolution::Hourly => aggregate::downsample_hourly(&entries),
        };

        Ok(HistoryQuery {
            observation_count: observations.len(),
            observations,
        })
    }

    /// Temperature and gust extremes for the local day `date_key`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the document cannot be read.
    pub fn daily_extremes<Tz: TimeZone>(
        &self,
        site: &str,
        date_key: &str,
        tz: &Tz,
    ) -> Result<DayExtremes, StateError> {
        Ok(aggregate::daily_extremes(&self.entries(site)?, date_key, tz))
    }

    /// Average wind speed per compass sector over the hour before `now`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the document cannot be read.
    pub fn last_hour_wind_rose(
        &self,
        site: &str,
        now: i64,
    ) -> Result<Option<[f64; WIND_ROSE_SECTORS]>, StateError> {
        Ok(aggregate::last_hour_wind_rose(&self.entries(site)?, now))
    }
}
