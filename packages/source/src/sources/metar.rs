//! aviationweather.gov METAR adapter.
//!
//! Reads the JSON form of `/api/data/metar`: an array of reports with
//! temperature in °C, wind in knots, altimeter in hPa, visibility as a
//! number or string (`"10+"`), and a list of cloud layers.

use serde::Deserialize;
use serde_json::Value;
use skyfeed_observation_models::units::{mb_to_inhg, round_knots};
use skyfeed_observation_models::{CloudCover, CloudLayer, Field, Observation, Provider, select_ceiling};

use crate::parsing::{number, parse_timestamp, parse_visibility, round_degrees};
use crate::{ParseContext, SourceAdapter};

/// Altimeter values below this are already inHg (older feeds) and are not
/// converted again.
const INHG_UPPER_BOUND: f64 = 100.0;

const MEASURED: &[Field] = &[
    Field::Temperature,
    Field::Dewpoint,
    Field::Pressure,
    Field::WindSpeed,
    Field::WindDirection,
    Field::GustSpeed,
    Field::Visibility,
    Field::Ceiling,
    Field::CloudCover,
];

/// METAR adapter.
pub struct MetarAdapter;

impl MetarAdapter {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for MetarAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetarReport {
    #[serde(default)]
    icao_id: Option<String>,
    #[serde(default)]
    obs_time: Option<Value>,
    #[serde(default)]
    report_time: Option<Value>,
    #[serde(default)]
    temp: Option<f64>,
    #[serde(default)]
    dewp: Option<f64>,
    #[serde(default)]
    wdir: Option<Value>,
    #[serde(default)]
    wspd: Option<f64>,
    #[serde(default)]
    wgst: Option<f64>,
    #[serde(default)]
    visib: Option<Value>,
    #[serde(default)]
    altim: Option<f64>,
    #[serde(default)]
    clouds: Option<Vec<MetarCloud>>,
}

#[derive(Debug, Deserialize)]
struct MetarCloud {
    #[serde(default)]
    cover: Option<String>,
    #[serde(default)]
    base: Option<f64>,
}

#[allow(clippy::cast_possible_truncation)]
fn cloud_layers(clouds: &[MetarCloud]) -> Vec<CloudLayer> {
    clouds
        .iter()
        .filter_map(|c| {
            let cover = CloudCover::from_token(c.cover.as_deref()?)?;
            Some(CloudLayer {
                cover,
                base_ft: c.base.filter(|b| b.is_finite()).map(|b| b.round() as i32),
            })
        })
        .collect()
}

/// `"VRB"` and other non-numeric directions are unreported, not north.
fn wind_direction(value: &Value) -> Option<i32> {
    number(value).and_then(round_degrees)
}

fn visibility(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => parse_visibility(s),
        other => number(other),
    }
}

fn altimeter_inhg(altim: f64) -> f64 {
    if altim < INHG_UPPER_BOUND {
        altim
    } else {
        mb_to_inhg(altim)
    }
}

impl SourceAdapter for MetarAdapter {
    fn provider(&self) -> Provider {
        Provider::Metar
    }

    fn measured_fields(&self) -> &'static [Field] {
        MEASURED
    }

    fn parse_payload(&self, raw: &str, ctx: &ParseContext) -> Option<Observation> {
        let reports: Vec<MetarReport> = serde_json::from_str(raw).ok()?;
        let report = reports
            .into_iter()
            .find(|r| ctx.matches_station(r.icao_id.as_deref()))?;

        let obs_time = report
            .obs_time
            .as_ref()
            .or(report.report_time.as_ref())
            .and_then(parse_timestamp)
            .unwrap_or(ctx.fetched_at);

        let (ceiling, cloud_cover) = report
            .clouds
            .as_deref()
            .map_or((None, None), |c| select_ceiling(&cloud_layers(c)));

        Some(Observation {
            temperature: report.temp,
            dewpoint: report.dewp,
            pressure: report.altim.map(altimeter_inhg),
            wind_speed: report.wspd.and_then(round_knots),
            wind_direction: report.wdir.as_ref().and_then(wind_direction),
            gust_speed: report.wgst.and_then(round_knots),
            visibility: report.visib.as_ref().and_then(visibility),
            ceiling,
            cloud_cover,
            ..Observation::at(obs_time)
        })
    }
}

/// Parses an aviationweather.gov METAR JSON response.
#[must_use]
pub fn parse_metar_response(raw: Option<&str>, ctx: &ParseContext) -> Option<Observation> {
    MetarAdapter.parse(raw, ctx)
}
