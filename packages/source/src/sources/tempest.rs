//! `WeatherFlow` Tempest station adapter.
//!
//! Reads the `observations/station/{id}` response from the Tempest cloud
//! API. Values are metric: °C, m/s, mb, mm. Timestamps are epoch seconds.

use serde::Deserialize;
use skyfeed_observation_models::units::{mb_to_inhg, mm_to_inches, ms_to_knots, round_knots};
use skyfeed_observation_models::{Field, Observation, Provider};

use crate::parsing::{parse_timestamp, round_degrees};
use crate::{ParseContext, SourceAdapter};

const MEASURED: &[Field] = &[
    Field::Temperature,
    Field::Dewpoint,
    Field::Humidity,
    Field::Pressure,
    Field::WindSpeed,
    Field::WindDirection,
    Field::GustSpeed,
    Field::PrecipAccum,
];

/// Tempest station adapter.
pub struct TempestAdapter;

impl TempestAdapter {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for TempestAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct TempestResponse {
    #[serde(default)]
    status: Option<TempestStatus>,
    #[serde(default)]
    obs: Option<Vec<TempestRecord>>,
}

#[derive(Debug, Deserialize)]
struct TempestStatus {
    #[serde(default)]
    status_code: i64,
    #[serde(default)]
    status_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TempestRecord {
    #[serde(default)]
    timestamp: Option<serde_json::Value>,
    #[serde(default)]
    air_temperature: Option<f64>,
    #[serde(default)]
    dew_point: Option<f64>,
    #[serde(default)]
    relative_humidity: Option<f64>,
    #[serde(default)]
    sea_level_pressure: Option<f64>,
    #[serde(default)]
    wind_avg: Option<f64>,
    #[serde(default)]
    wind_gust: Option<f64>,
    #[serde(default)]
    wind_direction: Option<f64>,
    #[serde(default)]
    precip_accum_local_day: Option<f64>,
}

impl SourceAdapter for TempestAdapter {
    fn provider(&self) -> Provider {
        Provider::Tempest
    }

    fn measured_fields(&self) -> &'static [Field] {
        MEASURED
    }

    fn parse_payload(&self, raw: &str, ctx: &ParseContext) -> Option<Observation> {
        let response: TempestResponse = serde_json::from_str(raw).ok()?;

        if let Some(status) = &response.status
            && status.status_code != 0
        {
            log::debug!(
                "tempest: provider error {}: {}",
                status.status_code,
                status.status_message.as_deref().unwrap_or("unknown")
            );
            return None;
        }

        // Entries are chronological; the last one is the current reading.
        let record = response.obs?.into_iter().next_back()?;

        let obs_time = record
            .timestamp
            .as_ref()
            .and_then(parse_timestamp)
            .unwrap_or(ctx.fetched_at);

        Some(Observation {
            temperature: record.air_temperature,
            dewpoint: record.dew_point,
            humidity: record.relative_humidity,
            pressure: record.sea_level_pressure.map(mb_to_inhg),
            wind_speed: record.wind_avg.map(ms_to_knots).and_then(round_knots),
            wind_direction: record.wind_direction.and_then(round_degrees),
            gust_speed: record.wind_gust.map(ms_to_knots).and_then(round_knots),
            precip_accum: record.precip_accum_local_day.map(mm_to_inches),
            ..Observation::at(obs_time)
        })
    }
}

/// Parses a Tempest station observation response.
#[must_use]
pub fn parse_tempest_response(raw: Option<&str>, ctx: &ParseContext) -> Option<Observation> {
    TempestAdapter.parse(raw, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "station_id": 4242,
        "status": {"status_code": 0, "status_message": "SUCCESS"},
        "obs": [
            {"timestamp": 1714564740, "air_temperature": 11.0},
            {
                "timestamp": 1714564800,
                "air_temperature": 12.4,
                "dew_point": 6.1,
                "relative_humidity": 65,
                "sea_level_pressure": 1013.25,
                "wind_avg": 5.144,
                "wind_gust": 7.7,
                "wind_direction": 271.6,
                "precip_accum_local_day": 12.7
            }
        ]
    }"#;

    fn ctx() -> ParseContext {
        ParseContext::new(1_714_565_000)
    }

    #[test]
    fn converts_metric_units() {
        let obs = parse_tempest_response(Some(SAMPLE), &ctx()).unwrap();
        assert_eq!(obs.obs_time, 1_714_564_800);
        assert_eq!(obs.temperature, Some(12.4));
        assert!((obs.pressure.unwrap() - 29.92).abs() < 0.1);
        assert_eq!(obs.wind_speed, Some(10));
        assert_eq!(obs.gust_speed, Some(15));
        assert_eq!(obs.wind_direction, Some(272));
        assert!((obs.precip_accum.unwrap() - 0.5).abs() < 1e-9);
        assert_eq!(obs.humidity, Some(65.0));
    }

    #[test]
    fn missing_gust_is_not_copied_from_wind() {
        let raw = r#"{"status":{"status_code":0},"obs":[{"timestamp":1714564800,"wind_avg":5.0}]}"#;
        let obs = parse_tempest_response(Some(raw), &ctx()).unwrap();
        assert_eq!(obs.wind_speed, Some(10));
        assert_eq!(obs.gust_speed, None);
        assert_eq!(obs.peak_gust, None);
    }

    #[test]
    fn missing_precip_means_no_rain() {
        let raw = r#"{"status":{"status_code":0},"obs":[{"timestamp":1714564800,"air_temperature":3.0}]}"#;
        let obs = parse_tempest_response(Some(raw), &ctx()).unwrap();
        assert_eq!(obs.precip_accum, Some(0.0));
    }

    #[test]
    fn provider_error_envelope_is_none() {
        let raw = r#"{"status":{"status_code":401,"status_message":"UNAUTHORIZED"}}"#;
        assert!(parse_tempest_response(Some(raw), &ctx()).is_none());
    }

    #[test]
    fn empty_obs_array_is_none() {
        let raw = r#"{"status":{"status_code":0},"obs":[]}"#;
        assert!(parse_tempest_response(Some(raw), &ctx()).is_none());
        let raw = r#"{"status":{"status_code":0},"obs":null}"#;
        assert!(parse_tempest_response(Some(raw), &ctx()).is_none());
    }

    #[test]
    fn record_without_readings_is_none() {
        let raw = r#"{"status":{"status_code":0},"obs":[{"timestamp":1714564800}]}"#;
        assert!(parse_tempest_response(Some(raw), &ctx()).is_none());
    }

    #[test]
    fn falls_back_to_fetch_time() {
        let raw = r#"{"obs":[{"air_temperature":3.0}]}"#;
        let obs = parse_tempest_response(Some(raw), &ctx()).unwrap();
        assert_eq!(obs.obs_time, 1_714_565_000);
    }
}
