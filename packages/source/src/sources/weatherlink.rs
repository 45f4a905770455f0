//! Davis `WeatherLink` v2 adapter.
//!
//! The `/v2/current/{station_id}` response splits readings across sensors
//! (ISS, barometer, ...), each with its own `data` array. Values are
//! imperial and `ts` is epoch seconds. Errors come back as an object with a
//! `code` and `message`.

use serde_json::Value;
use skyfeed_observation_models::units::{f_to_c, mph_to_knots, round_knots};
use skyfeed_observation_models::{Field, Observation, Provider};

use crate::parsing::{number, parse_json, parse_timestamp, round_degrees};
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

/// `WeatherLink` adapter.
pub struct WeatherLinkAdapter;

impl WeatherLinkAdapter {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for WeatherLinkAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// All `data` records across every sensor, in payload order.
fn data_records(root: &Value) -> Vec<&Value> {
    root.get("sensors")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|sensor| sensor.get("data").and_then(Value::as_array))
        .flatten()
        .filter(|record| record.is_object())
        .collect()
}

/// First numeric value for any of `keys` across the sensor records.
fn first_number(records: &[&Value], keys: &[&str]) -> Option<f64> {
    keys.iter()
        .find_map(|key| records.iter().find_map(|r| r.get(*key).and_then(number)))
}

impl SourceAdapter for WeatherLinkAdapter {
    fn provider(&self) -> Provider {
        Provider::Weatherlink
    }

    fn measured_fields(&self) -> &'static [Field] {
        MEASURED
    }

    fn parse_payload(&self, raw: &str, ctx: &ParseContext) -> Option<Observation> {
        let root = parse_json(raw)?;

        if let Some(code) = root.get("code") {
            log::debug!(
                "weatherlink: provider error {code}: {}",
                root.get("message").and_then(Value::as_str).unwrap_or("")
            );
            return None;
        }

        let records = data_records(&root);
        if records.is_empty() {
            return None;
        }

        let obs_time = records
            .iter()
            .filter_map(|r| r.get("ts").and_then(parse_timestamp))
            .max()
            .unwrap_or(ctx.fetched_at);

        let speed = |keys: &[&str]| {
            first_number(&records, keys)
                .map(mph_to_knots)
                .and_then(round_knots)
        };

        Some(Observation {
            temperature: first_number(&records, &["temp", "temp_out"]).map(f_to_c),
            dewpoint: first_number(&records, &["dew_point"]).map(f_to_c),
            humidity: first_number(&records, &["hum", "hum_out"]),
            pressure: first_number(&records, &["bar_sea_level", "bar_absolute"]),
            wind_speed: speed(&["wind_speed_last", "wind_speed_avg_last_1_min"]),
            wind_direction: first_number(&records, &["wind_dir_last", "wind_dir_scalar_avg_last_1_min"])
                .and_then(round_degrees),
            gust_speed: speed(&["wind_speed_hi_last_10_min", "wind_speed_hi_last_2_min"]),
            precip_accum: first_number(&records, &["rainfall_daily_in"]),
            ..Observation::at(obs_time)
        })
    }
}

/// Parses a `WeatherLink` current conditions response.
#[must_use]
pub fn parse_weatherlink_response(raw: Option<&str>, ctx: &ParseContext) -> Option<Observation> {
    WeatherLinkAdapter.parse(raw, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "station_id": 98765,
        "sensors": [
            {
                "lsid": 1,
                "sensor_type": 45,
                "data": [{
                    "ts": 1714564800,
                    "temp": 68.0,
                    "hum": 40.0,
                    "dew_point": 43.0,
                    "wind_speed_last": 5.75,
                    "wind_dir_last": 90,
                    "rainfall_daily_in": 0.0
                }]
            },
            {
                "lsid": 2,
                "sensor_type": 242,
                "data": [{"ts": 1714564790, "bar_sea_level": 30.05}]
            }
        ]
    }"#;

    #[test]
    fn combines_readings_across_sensors() {
        let obs = parse_weatherlink_response(Some(SAMPLE), &ParseContext::new(0)).unwrap();
        assert_eq!(obs.obs_time, 1_714_564_800);
        assert!((obs.temperature.unwrap() - 20.0).abs() < 0.1);
        assert_eq!(obs.humidity, Some(40.0));
        assert_eq!(obs.pressure, Some(30.05));
        assert_eq!(obs.wind_speed, Some(5));
        assert_eq!(obs.wind_direction, Some(90));
        assert_eq!(obs.precip_accum, Some(0.0));
    }

    #[test]
    fn gust_absent_when_high_wind_fields_missing() {
        let obs = parse_weatherlink_response(Some(SAMPLE), &ParseContext::new(0)).unwrap();
        assert_eq!(obs.gust_speed, None);
    }

    #[test]
    fn error_envelope_is_none() {
        let raw = r#"{"code": 401, "message": "Invalid API key"}"#;
        assert!(parse_weatherlink_response(Some(raw), &ParseContext::new(0)).is_none());
    }

    #[test]
    fn sensors_without_data_are_none() {
        let raw = r#"{"sensors": [{"lsid": 1, "data": []}]}"#;
        assert!(parse_weatherlink_response(Some(raw), &ParseContext::new(0)).is_none());
        assert!(parse_weatherlink_response(Some("{}"), &ParseContext::new(0)).is_none());
    }
}
