#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Weather provider adapters and normalization logic.
//!
//! Each upstream provider implements the [`SourceAdapter`] trait to turn a
//! raw response body into the canonical [`Observation`]. Adapters never
//! fail loudly: malformed payloads, provider error envelopes, and empty
//! result sets all produce `None`, which callers treat as "no new data this
//! cycle".

pub mod fetch;
pub mod parsing;
pub mod registry;
pub mod sources;
pub mod validation;

use chrono::FixedOffset;
use skyfeed_observation_models::units::relative_humidity;
use skyfeed_observation_models::{Field, Observation, Provider};

/// Per-call context handed to an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseContext {
    /// Configured station/device identifier, used to pick one entry out of
    /// multi-station payloads.
    pub station_id: Option<String>,
    /// When the payload was fetched, Unix seconds. Used as `obs_time` when
    /// the provider does not report one.
    pub fetched_at: i64,
    /// The site's UTC offset, for pages that print local wall-clock time.
    /// `None` reads such times as UTC.
    pub utc_offset: Option<FixedOffset>,
}

impl ParseContext {
    /// Creates a context with no station filter.
    #[must_use]
    pub const fn new(fetched_at: i64) -> Self {
        Self {
            station_id: None,
            fetched_at,
            utc_offset: None,
        }
    }

    /// Reads offset-less local times at `offset`.
    #[must_use]
    pub const fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = Some(offset);
        self
    }

    /// Restricts multi-station payloads to `station_id`.
    #[must_use]
    pub fn with_station(mut self, station_id: impl Into<String>) -> Self {
        self.station_id = Some(station_id.into());
        self
    }

    /// Whether `candidate` matches the configured station, ignoring case.
    /// Always true when no station is configured.
    #[must_use]
    pub fn matches_station(&self, candidate: Option<&str>) -> bool {
        match (&self.station_id, candidate) {
            (None, _) => true,
            (Some(wanted), Some(found)) => wanted.eq_ignore_ascii_case(found.trim()),
            (Some(_), None) => false,
        }
    }
}

/// Trait that all provider adapters implement.
///
/// Implementors provide [`parse_payload`](Self::parse_payload); callers use
/// [`parse`](Self::parse), which adds the shared rules every provider must
/// follow.
pub trait SourceAdapter: Send + Sync {
    /// The provider this adapter understands.
    fn provider(&self) -> Provider;

    /// Fields the provider's payload schema covers. Absence policy only
    /// applies to these.
    fn measured_fields(&self) -> &'static [Field];

    /// Parses a non-empty, trimmed payload.
    fn parse_payload(&self, raw: &str, ctx: &ParseContext) -> Option<Observation>;

    /// Parses a raw response into a canonical observation.
    ///
    /// Returns `None` for missing or blank input, anything the adapter
    /// rejects, and payloads that yield no readings at all. Fills humidity
    /// from temperature and dewpoint when the provider omits it, then
    /// applies the field absence policy.
    fn parse(&self, raw: Option<&str>, ctx: &ParseContext) -> Option<Observation> {
        let raw = raw.map(str::trim).filter(|r| !r.is_empty())?;
        let mut obs = self.parse_payload(raw, ctx)?;

        if obs.is_empty() {
            log::debug!("{}: payload contained no readings", self.provider());
            return None;
        }

        if obs.humidity.is_none()
            && let (Some(t), Some(d)) = (obs.temperature, obs.dewpoint)
        {
            obs.humidity = relative_humidity(t, d);
        }

        obs.apply_absence_policy(self.measured_fields());
        Some(obs)
    }
}

/// Parses `raw` with the adapter registered for `provider`.
#[must_use]
pub fn parse_response(
    provider: Provider,
    raw: Option<&str>,
    ctx: &ParseContext,
) -> Option<Observation> {
    registry::adapter_for(provider).parse(raw, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_input_is_none_for_every_provider() {
        use strum::IntoEnumIterator;
        let ctx = ParseContext::new(1_700_000_000);
        for provider in Provider::iter() {
            assert!(parse_response(provider, None, &ctx).is_none(), "{provider}");
            assert!(parse_response(provider, Some("   "), &ctx).is_none(), "{provider}");
            assert!(
                parse_response(provider, Some("{not json"), &ctx).is_none(),
                "{provider}"
            );
        }
    }

    #[test]
    fn station_matching_ignores_case() {
        let ctx = ParseContext::new(0).with_station("kspb");
        assert!(ctx.matches_station(Some("KSPB")));
        assert!(!ctx.matches_station(Some("KPDX")));
        assert!(!ctx.matches_station(None));
        assert!(ParseContext::new(0).matches_station(None));
    }
}
