#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Library for running weather ingestion cycles.
//!
//! A cycle visits every configured source of one site: breaker check,
//! fetch, parse, validate, cache merge, history append, breaker update.
//! The outage check runs last.
//!
//! Callers must never run two cycles for the same site at once. The
//! cache merge is a read-modify-write of the site's record and relies on
//! cycles for one site being serialized.

pub mod config;

use std::time::Instant;

use chrono::FixedOffset;
use serde::Serialize;
use skyfeed_cache::CacheWriter;
use skyfeed_history::HistoryStore;
use skyfeed_observation_models::{Provider, SourceKind};
use skyfeed_resilience::{
    BreakerEntry, CircuitBreaker, OutageDetector, OutageState, OutageStatus, SourceTimestamps,
};
use skyfeed_source::fetch::{FetchFailure, RawFetcher};
use skyfeed_source::validation::validate;
use skyfeed_source::{ParseContext, parse_response};
use skyfeed_state::{StateError, StateStore};

use crate::config::{ConfigError, Defaults, IngestConfig, SiteConfig, SourceConfig};

/// Errors that abort one site's cycle.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// What happened to one source during a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SourceOutcome {
    /// The circuit breaker is open.
    Skipped { remaining: i64 },
    /// The fetch failed.
    Failed { reason: String },
    /// The payload arrived but produced no observation.
    Unparseable,
    /// The observation was merged into the cache.
    Updated {
        /// Validation issues recorded on the observation.
        issues: usize,
        /// Whether a new history entry was added.
        appended: bool,
    },
}

/// One source's line in a [`SiteReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub kind: SourceKind,
    pub provider: Provider,
    #[serde(flatten)]
    pub outcome: SourceOutcome,
}

/// Result of one site's cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteReport {
    pub site: String,
    pub sources: Vec<SourceReport>,
    pub outage: Option<OutageStatus>,
}

impl SiteReport {
    /// Number of sources whose data reached the cache.
    #[must_use]
    pub fn updated(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| matches!(s.outcome, SourceOutcome::Updated { .. }))
            .count()
    }
}

struct Cycle<'a> {
    site: &'a SiteConfig,
    breaker: CircuitBreaker<'a>,
    writer: CacheWriter<'a>,
    history: HistoryStore<'a>,
    utc_offset: FixedOffset,
    now: i64,
}

impl Cycle<'_> {
    async fn ingest(
        &self,
        fetcher: &dyn RawFetcher,
        source: &SourceConfig,
    ) -> Result<SourceOutcome, StateError> {
        let site = self.site.id.as_str();
        let kind = source.kind;

        let check = self.breaker.check(site, kind, self.now)?;
        if check.skip {
            log::info!(
                "{site}/{kind}: skipped ({}), {}s remaining",
                check.reason.unwrap_or_default(),
                check.remaining
            );
            return Ok(SourceOutcome::Skipped {
                remaining: check.remaining,
            });
        }

        let raw = match fetcher.fetch(&source.url).await {
            Ok(raw) => raw,
            Err(e) => {
                let failure = FetchFailure::from(&e);
                log::warn!("{site}/{kind}: fetch from {} failed: {e}", source.provider);
                self.breaker.record_failure(site, kind, &failure, self.now)?;
                return Ok(SourceOutcome::Failed {
                    reason: failure.reason,
                });
            }
        };

        let mut ctx = ParseContext::new(self.now).with_offset(self.utc_offset);
        if let Some(station) = &source.station_id {
            ctx = ctx.with_station(station.clone());
        }

        let Some(mut obs) = parse_response(source.provider, Some(&raw), &ctx) else {
            log::warn!("{site}/{kind}: {} returned no usable data", source.provider);
            self.breaker
                .record_failure(site, kind, &FetchFailure::unparseable(), self.now)?;
            return Ok(SourceOutcome::Unparseable);
        };

        let issues = validate(&mut obs, self.site.elevation_ft);
        let record = self.writer.write(site, kind, &obs, self.now)?;

        // History gets the merged picture as of this source's reading.
        let mut snapshot = record.observation.clone();
        snapshot.obs_time = obs.obs_time;
        let appended = self
            .history
            .append(site, &snapshot, Some(&record.field_sources), self.now)?;

        self.breaker.record_success(site, kind)?;
        log::debug!(
            "{site}/{kind}: merged observation from {} at {}",
            source.provider,
            obs.obs_time
        );

        Ok(SourceOutcome::Updated { issues, appended })
    }
}

/// Runs one ingestion cycle for `site` at `now`.
///
/// Source failures are recorded in the circuit breaker and reported, not
/// returned as errors.
///
/// # Errors
///
/// Returns [`CycleError`] if the site's state cannot be read or written,
/// or its configuration is invalid.
pub async fn run_site_cycle(
    store: &dyn StateStore,
    fetcher: &dyn RawFetcher,
    defaults: &Defaults,
    site: &SiteConfig,
    now: i64,
) -> Result<SiteReport, CycleError> {
    let start = Instant::now();
    let utc_offset = site.offset()?;
    let cycle = Cycle {
        site,
        breaker: CircuitBreaker::new(store, defaults.breaker),
        writer: CacheWriter::new(store, site.max_stale(defaults), utc_offset),
        history: HistoryStore::new(store, defaults.history_retention_hours),
        utc_offset,
        now,
    };

    let mut sources = Vec::with_capacity(site.sources.len());
    for source in &site.sources {
        let outcome = cycle.ingest(fetcher, source).await?;
        sources.push(SourceReport {
            kind: source.kind,
            provider: source.provider,
            outcome,
        });
    }

    let outage = OutageDetector::new(store, defaults.outage).evaluate(&site.monitored(), now)?;
    if let Some(outage) = &outage {
        log::warn!(
            "{}: data outage since {} ({}s)",
            site.id,
            outage.outage_start,
            outage.duration
        );
    }

    let report = SiteReport {
        site: site.id.clone(),
        sources,
        outage,
    };
    log::info!(
        "{}: cycle complete, {}/{} source(s) updated in {:.1}s",
        site.id,
        report.updated(),
        report.sources.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(report)
}

/// Runs a cycle for each of `sites` in turn. One site's failure is logged
/// and returned in its slot; the remaining sites still run.
pub async fn run_all(
    store: &dyn StateStore,
    fetcher: &dyn RawFetcher,
    config: &IngestConfig,
    sites: &[&SiteConfig],
    now: i64,
) -> Vec<(String, Result<SiteReport, CycleError>)> {
    let mut results = Vec::with_capacity(sites.len());
    for site in sites {
        let result = run_site_cycle(store, fetcher, &config.defaults, site, now).await;
        if let Err(e) = &result {
            log::error!("Failed to run cycle for {}: {e}", site.id);
        }
        results.push((site.id.clone(), result));
    }
    results
}

/// Persisted health of one site, for the `status` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteStatus {
    pub site: String,
    pub maintenance: bool,
    pub outage: Option<OutageState>,
    pub breakers: Vec<(SourceKind, BreakerEntry)>,
    pub signals: SourceTimestamps,
}

/// Reads `site`'s outage record, breaker entries, and signal timestamps
/// without changing anything.
///
/// # Errors
///
/// Returns [`StateError`] if any state document cannot be read.
pub fn site_status(
    store: &dyn StateStore,
    defaults: &Defaults,
    site: &SiteConfig,
) -> Result<SiteStatus, StateError> {
    let monitored = site.monitored();
    Ok(SiteStatus {
        site: site.id.clone(),
        maintenance: site.maintenance,
        outage: OutageDetector::new(store, defaults.outage).state(&site.id)?,
        breakers: CircuitBreaker::new(store, defaults.breaker).entries(&site.id)?,
        signals: SourceTimestamps::read(
            store,
            &site.id,
            &monitored.source_kinds,
            &monitored.webcams,
        )?,
    })
}
