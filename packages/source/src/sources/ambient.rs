//! Ambient Weather device adapter.
//!
//! Reads the `/v1/devices` response: an array of devices, each carrying its
//! most recent reading under `lastData`. Values are imperial (°F, mph, inHg,
//! inches) and `dateutc` is epoch milliseconds.

use serde::Deserialize;
use skyfeed_observation_models::units::{f_to_c, mph_to_knots, round_knots};
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
    Field::PeakGust,
    Field::PrecipAccum,
];

/// Ambient Weather adapter.
pub struct AmbientAdapter;

impl AmbientAdapter {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for AmbientAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AmbientDevice {
    #[serde(default)]
    mac_address: Option<String>,
    #[serde(default)]
    last_data: Option<AmbientReading>,
}

#[derive(Debug, Deserialize)]
struct AmbientReading {
    #[serde(default)]
    dateutc: Option<serde_json::Value>,
    #[serde(default)]
    tempf: Option<f64>,
    #[serde(default, rename = "dewPoint")]
    dew_point: Option<f64>,
    #[serde(default)]
    humidity: Option<f64>,
    #[serde(default)]
    baromrelin: Option<f64>,
    #[serde(default)]
    windspeedmph: Option<f64>,
    #[serde(default)]
    windgustmph: Option<f64>,
    #[serde(default)]
    maxdailygust: Option<f64>,
    #[serde(default)]
    winddir: Option<f64>,
    #[serde(default)]
    dailyrainin: Option<f64>,
}

impl SourceAdapter for AmbientAdapter {
    fn provider(&self) -> Provider {
        Provider::Ambient
    }

    fn measured_fields(&self) -> &'static [Field] {
        MEASURED
    }

    fn parse_payload(&self, raw: &str, ctx: &ParseContext) -> Option<Observation> {
        // Error responses are an object ({"error": "..."}) and fail here.
        let devices: Vec<AmbientDevice> = serde_json::from_str(raw).ok()?;

        let reading = devices
            .into_iter()
            .filter(|d| ctx.matches_station(d.mac_address.as_deref()))
            .find_map(|d| d.last_data)?;

        let obs_time = reading
            .dateutc
            .as_ref()
            .and_then(parse_timestamp)
            .unwrap_or(ctx.fetched_at);

        Some(Observation {
            temperature: reading.tempf.map(f_to_c),
            dewpoint: reading.dew_point.map(f_to_c),
            humidity: reading.humidity,
            pressure: reading.baromrelin,
            wind_speed: reading.windspeedmph.map(mph_to_knots).and_then(round_knots),
            wind_direction: reading.winddir.and_then(round_degrees),
            gust_speed: reading.windgustmph.map(mph_to_knots).and_then(round_knots),
            peak_gust: reading.maxdailygust.map(mph_to_knots).and_then(round_knots),
            precip_accum: reading.dailyrainin,
            ..Observation::at(obs_time)
        })
    }
}

/// Parses an Ambient Weather devices response.
#[must_use]
pub fn parse_ambient_response(raw: Option<&str>, ctx: &ParseContext) -> Option<Observation> {
    AmbientAdapter.parse(raw, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {
            "macAddress": "AA:BB:CC:00:00:01",
            "lastData": {"dateutc": 1714564700000, "tempf": 50.0}
        },
        {
            "macAddress": "AA:BB:CC:00:00:02",
            "lastData": {
                "dateutc": 1714564800000,
                "tempf": 32.0,
                "dewPoint": 23.0,
                "baromrelin": 29.92,
                "windspeedmph": 11.5,
                "winddir": 180,
                "dailyrainin": 0.12
            }
        }
    ]"#;

    #[test]
    fn selects_configured_device_and_converts() {
        let ctx = ParseContext::new(0).with_station("aa:bb:cc:00:00:02");
        let obs = parse_ambient_response(Some(SAMPLE), &ctx).unwrap();
        assert_eq!(obs.obs_time, 1_714_564_800);
        assert!(obs.temperature.unwrap().abs() < 0.1);
        assert!((obs.dewpoint.unwrap() - -5.0).abs() < 0.1);
        assert_eq!(obs.pressure, Some(29.92), "inHg passes through unchanged");
        assert_eq!(obs.wind_speed, Some(10));
        assert_eq!(obs.wind_direction, Some(180));
        assert_eq!(obs.precip_accum, Some(0.12));
        assert!(obs.humidity.unwrap() > 50.0, "computed from dewpoint");
    }

    #[test]
    fn no_gust_fields_stay_null() {
        let ctx = ParseContext::new(0).with_station("AA:BB:CC:00:00:02");
        let obs = parse_ambient_response(Some(SAMPLE), &ctx).unwrap();
        assert_eq!(obs.gust_speed, None);
        assert_eq!(obs.peak_gust, None);
    }

    #[test]
    fn first_device_without_filter() {
        let obs = parse_ambient_response(Some(SAMPLE), &ParseContext::new(0)).unwrap();
        assert_eq!(obs.obs_time, 1_714_564_700);
    }

    #[test]
    fn unknown_device_is_none() {
        let ctx = ParseContext::new(0).with_station("FF:FF:FF:FF:FF:FF");
        assert!(parse_ambient_response(Some(SAMPLE), &ctx).is_none());
    }

    #[test]
    fn empty_array_and_error_object_are_none() {
        let ctx = ParseContext::new(0);
        assert!(parse_ambient_response(Some("[]"), &ctx).is_none());
        assert!(parse_ambient_response(Some(r#"{"error":"apiKey-missing"}"#), &ctx).is_none());
    }
}
