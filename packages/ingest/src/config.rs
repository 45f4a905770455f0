//! Site configuration.
//!
//! Loaded from a TOML file with a `[defaults]` table and one `[[sites]]`
//! entry per site:
//!
//! ```toml
//! [defaults]
//! max_stale_seconds = 10800
//!
//! [defaults.outage]
//! limited_threshold = 1800
//!
//! [[sites]]
//! id = "kspb"
//! utc_offset = "-08:00"
//! elevation_ft = 59
//!
//! [[sites.sources]]
//! kind = "primary"
//! provider = "tempest"
//! station_id = "4242"
//! url = "https://swd.weatherflow.com/swd/rest/observations/station/4242"
//!
//! [[sites.webcams]]
//! id = "north"
//! image = "/var/cams/kspb/north.jpg"
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::FixedOffset;
use serde::Deserialize;
use skyfeed_observation_models::{Provider, SourceKind};
use skyfeed_resilience::{BreakerConfig, MonitoredSite, OutageConfig};

/// Environment variable holding a comma-separated list of site ids to run.
pub const SITES_ENV: &str = "SKYFEED_SITES";

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    /// Two sites share an id.
    #[error("duplicate site id {0:?}")]
    DuplicateSite(String),

    /// A site configures the same source kind twice.
    #[error("site {site:?} configures more than one {kind} source")]
    DuplicateSourceKind { site: String, kind: SourceKind },

    /// A site's `utc_offset` is not `+HH:MM`/`-HH:MM`.
    #[error("site {site:?} has invalid utc_offset {value:?}")]
    InvalidOffset { site: String, value: String },
}

/// Global settings. All durations are in seconds unless named otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// How long a cached field may stand in for a missing fresh one.
    pub max_stale_seconds: i64,
    /// Per-request HTTP timeout.
    pub fetch_timeout_seconds: u64,
    /// How much history each site keeps.
    pub history_retention_hours: i64,
    pub outage: OutageConfig,
    pub breaker: BreakerConfig,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            max_stale_seconds: 3 * 3600,
            fetch_timeout_seconds: 20,
            history_retention_hours: skyfeed_history::DEFAULT_RETENTION_HOURS,
            outage: OutageConfig::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

/// One upstream feed of a site.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub provider: Provider,
    /// Station or device to pick out of multi-station payloads.
    #[serde(default)]
    pub station_id: Option<String>,
    pub url: String,
}

/// A webcam whose image freshness counts as a data signal.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebcamConfig {
    pub id: String,
    pub image: PathBuf,
}

/// One monitored site.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SiteConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Fixed offset defining the site's local day, e.g. `"-07:00"`.
    #[serde(default = "default_offset")]
    pub utc_offset: String,
    /// Field elevation, enables the derived altitude checks.
    #[serde(default)]
    pub elevation_ft: Option<f64>,
    #[serde(default)]
    pub maintenance: bool,
    #[serde(default)]
    pub limited_availability: bool,
    /// Overrides `defaults.max_stale_seconds`.
    #[serde(default)]
    pub max_stale_seconds: Option<i64>,
    /// Overrides the outage threshold.
    #[serde(default)]
    pub outage_threshold_seconds: Option<i64>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub webcams: Vec<WebcamConfig>,
}

fn default_offset() -> String {
    "+00:00".to_owned()
}

impl SiteConfig {
    /// The site's UTC offset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOffset`] if `utc_offset` does not parse.
    pub fn offset(&self) -> Result<FixedOffset, ConfigError> {
        self.utc_offset
            .trim()
            .parse::<FixedOffset>()
            .map_err(|_| ConfigError::InvalidOffset {
                site: self.id.clone(),
                value: self.utc_offset.clone(),
            })
    }

    /// Staleness bound for merge fallback at this site.
    #[must_use]
    pub fn max_stale(&self, defaults: &Defaults) -> i64 {
        self.max_stale_seconds.unwrap_or(defaults.max_stale_seconds)
    }

    /// The view of this site the outage detector needs.
    #[must_use]
    pub fn monitored(&self) -> MonitoredSite {
        MonitoredSite {
            id: self.id.clone(),
            maintenance: self.maintenance,
            limited_availability: self.limited_availability,
            threshold: self.outage_threshold_seconds,
            source_kinds: self.sources.iter().map(|s| s.kind).collect(),
            webcams: self
                .webcams
                .iter()
                .map(|w| (w.id.clone(), w.image.clone()))
                .collect(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.offset()?;
        let mut kinds = BTreeSet::new();
        for source in &self.sources {
            if !kinds.insert(source.kind) {
                return Err(ConfigError::DuplicateSourceKind {
                    site: self.id.clone(),
                    kind: source.kind,
                });
            }
        }
        Ok(())
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
}

impl IngestConfig {
    /// Parses and validates a configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the TOML is malformed, references an
    /// unknown provider or source kind, or fails validation.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;

        let mut ids = BTreeSet::new();
        for site in &config.sites {
            if !ids.insert(site.id.as_str()) {
                return Err(ConfigError::DuplicateSite(site.id.clone()));
            }
            site.validate()?;
        }

        Ok(config)
    }

    /// Reads and validates the configuration at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&raw)?;
        log::debug!("loaded {} site(s) from {}", config.sites.len(), path.display());
        Ok(config)
    }

    /// Looks up a site by id.
    #[must_use]
    pub fn site(&self, id: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|s| s.id == id)
    }

    /// The sites to run, filtered by `cli_filter` or the [`SITES_ENV`]
    /// environment variable. If neither is set, every site is returned.
    #[must_use]
    pub fn enabled_sites(&self, cli_filter: Option<String>) -> Vec<&SiteConfig> {
        let filter = cli_filter.or_else(|| std::env::var(SITES_ENV).ok());
        self.filter_sites(filter.as_deref())
    }

    fn filter_sites(&self, filter: Option<&str>) -> Vec<&SiteConfig> {
        let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) else {
            return self.sites.iter().collect();
        };

        let ids: Vec<&str> = filter.split(',').map(str::trim).collect();
        let filtered: Vec<&SiteConfig> = self
            .sites
            .iter()
            .filter(|s| ids.contains(&s.id.as_str()))
            .collect();

        if filtered.is_empty() {
            log::warn!(
                "No matching sites found for filter {ids:?}. Available: {}",
                self.sites
                    .iter()
                    .map(|s| s.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        filtered
    }
}
