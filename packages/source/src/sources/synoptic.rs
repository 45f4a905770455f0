//! Synoptic Data mesonet adapter.
//!
//! Reads the `stations/latest` response requested with metric units. Each
//! station carries an `OBSERVATIONS` object of `<variable>_value_<n>`
//! entries, each with its own `value` and ISO-8601 `date_time`. Pressure is
//! in pascals, wind in m/s, precipitation in mm.

use serde_json::{Map, Value};
use skyfeed_observation_models::units::{mm_to_inches, ms_to_knots, pa_to_inhg, round_knots};
use skyfeed_observation_models::{Field, Observation, Provider};

use crate::parsing::{number, parse_json, parse_timestamp, round_degrees};
use crate::{ParseContext, SourceAdapter};

/// `SUMMARY.RESPONSE_CODE` for a successful request.
const RESPONSE_OK: i64 = 1;

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

/// Synoptic Data adapter.
pub struct SynopticAdapter;

impl SynopticAdapter {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for SynopticAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// A variable's value and observation time, picked from the lowest-numbered
/// sensor that reported it (`air_temp_value_1` before `air_temp_value_2`).
fn variable(observations: &Map<String, Value>, name: &str) -> Option<(f64, Option<i64>)> {
    let prefix = format!("{name}_value_");
    let mut keys: Vec<&String> = observations
        .keys()
        .filter(|k| k.starts_with(&prefix))
        .collect();
    keys.sort();

    keys.into_iter().find_map(|key| {
        let entry = observations.get(key)?;
        let value = entry.get("value").and_then(number)?;
        let time = entry.get("date_time").and_then(parse_timestamp);
        Some((value, time))
    })
}

impl SourceAdapter for SynopticAdapter {
    fn provider(&self) -> Provider {
        Provider::Synoptic
    }

    fn measured_fields(&self) -> &'static [Field] {
        MEASURED
    }

    fn parse_payload(&self, raw: &str, ctx: &ParseContext) -> Option<Observation> {
        let root = parse_json(raw)?;

        let code = root
            .pointer("/SUMMARY/RESPONSE_CODE")
            .and_then(Value::as_i64)?;
        if code != RESPONSE_OK {
            log::debug!(
                "synoptic: provider error {code}: {}",
                root.pointer("/SUMMARY/RESPONSE_MESSAGE")
                    .and_then(Value::as_str)
                    .unwrap_or("")
            );
            return None;
        }

        let observations = root
            .get("STATION")
            .and_then(Value::as_array)?
            .iter()
            .filter(|s| ctx.matches_station(s.get("STID").and_then(Value::as_str)))
            .filter_map(|s| s.get("OBSERVATIONS").and_then(Value::as_object))
            .find(|o| !o.is_empty())?;

        let mut newest: Option<i64> = None;
        let mut read = |name: &str| {
            variable(observations, name).map(|(value, time)| {
                newest = newest.max(time);
                value
            })
        };

        let temperature = read("air_temp");
        let dewpoint = read("dew_point_temperature");
        let humidity = read("relative_humidity");
        let pressure = read("altimeter").map(pa_to_inhg);
        let wind_speed = read("wind_speed").map(ms_to_knots).and_then(round_knots);
        let wind_direction = read("wind_direction").and_then(round_degrees);
        let gust_speed = read("wind_gust").map(ms_to_knots).and_then(round_knots);
        let precip_accum = read("precip_accum_since_local_midnight").map(mm_to_inches);

        Some(Observation {
            temperature,
            dewpoint,
            humidity,
            pressure,
            wind_speed,
            wind_direction,
            gust_speed,
            precip_accum,
            ..Observation::at(newest.unwrap_or(ctx.fetched_at))
        })
    }
}

/// Parses a Synoptic Data latest-observation response.
#[must_use]
pub fn parse_synoptic_response(raw: Option<&str>, ctx: &ParseContext) -> Option<Observation> {
    SynopticAdapter.parse(raw, ctx)
}
