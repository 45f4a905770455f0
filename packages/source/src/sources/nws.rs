//! api.weather.gov latest-observation adapter.
//!
//! Every value arrives as a measurement tagged with a WMO unit code
//! (`wmoUnit:degC`, `wmoUnit:km_h-1`, `wmoUnit:Pa`, ...). Conversion is
//! driven by the unit code rather than assumed per field, so a station that
//! reports in an unusual unit still normalizes correctly.

use serde::Deserialize;
use skyfeed_observation_models::units::{
    f_to_c, kmh_to_knots, mb_to_inhg, meters_to_feet, meters_to_statute_miles, mph_to_knots,
    ms_to_knots, pa_to_inhg, round_knots,
};
use skyfeed_observation_models::{CloudCover, CloudLayer, Field, Observation, Provider, select_ceiling};

use crate::parsing::{parse_iso_time, round_degrees};
use crate::{ParseContext, SourceAdapter};

/// Quality-control flag for values that failed the provider's own checks.
const QC_REJECTED: &str = "X";

const MEASURED: &[Field] = &[
    Field::Temperature,
    Field::Dewpoint,
    Field::Humidity,
    Field::Pressure,
    Field::WindSpeed,
    Field::WindDirection,
    Field::GustSpeed,
    Field::Visibility,
    Field::Ceiling,
    Field::CloudCover,
];

/// api.weather.gov adapter.
pub struct NwsAdapter;

impl NwsAdapter {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for NwsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct NwsObservation {
    properties: NwsProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NwsProperties {
    #[serde(default)]
    station: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    temperature: Option<Measurement>,
    #[serde(default)]
    dewpoint: Option<Measurement>,
    #[serde(default)]
    relative_humidity: Option<Measurement>,
    #[serde(default)]
    barometric_pressure: Option<Measurement>,
    #[serde(default)]
    sea_level_pressure: Option<Measurement>,
    #[serde(default)]
    wind_speed: Option<Measurement>,
    #[serde(default)]
    wind_gust: Option<Measurement>,
    #[serde(default)]
    wind_direction: Option<Measurement>,
    #[serde(default)]
    visibility: Option<Measurement>,
    #[serde(default)]
    cloud_layers: Option<Vec<NwsCloudLayer>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Measurement {
    #[serde(default)]
    unit_code: Option<String>,
    #[serde(default)]
    value: Option<f64>,
    #[serde(default)]
    quality_control: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NwsCloudLayer {
    #[serde(default)]
    base: Option<Measurement>,
    #[serde(default)]
    amount: Option<String>,
}

impl Measurement {
    /// The value and its bare unit (`degC` from `wmoUnit:degC`), unless the
    /// value is missing or failed quality control.
    fn reading(&self) -> Option<(f64, &str)> {
        if self.quality_control.as_deref() == Some(QC_REJECTED) {
            return None;
        }
        let value = self.value.filter(|v| v.is_finite())?;
        let unit = self
            .unit_code
            .as_deref()
            .map_or("", |u| u.rsplit(':').next().unwrap_or(u));
        Some((value, unit))
    }
}

fn celsius(m: Option<&Measurement>) -> Option<f64> {
    let (value, unit) = m?.reading()?;
    match unit {
        "degC" => Some(value),
        "degF" => Some(f_to_c(value)),
        "K" => Some(value - 273.15),
        _ => None,
    }
}

fn knots(m: Option<&Measurement>) -> Option<i32> {
    let (value, unit) = m?.reading()?;
    let kt = match unit {
        "km_h-1" => kmh_to_knots(value),
        "m_s-1" => ms_to_knots(value),
        "[mi_i]_h-1" | "mi_h-1" => mph_to_knots(value),
        "kt" | "[kn_i]" => value,
        _ => return None,
    };
    round_knots(kt)
}

fn inhg(m: Option<&Measurement>) -> Option<f64> {
    let (value, unit) = m?.reading()?;
    match unit {
        "Pa" => Some(pa_to_inhg(value)),
        "hPa" | "mbar" => Some(mb_to_inhg(value)),
        "[in_i'Hg]" | "inHg" => Some(value),
        _ => None,
    }
}

fn metres(m: Option<&Measurement>) -> Option<f64> {
    let (value, unit) = m?.reading()?;
    match unit {
        "m" => Some(value),
        "km" => Some(value * 1000.0),
        "[ft_i]" | "ft" => Some(value / 3.280_84),
        "mm" => Some(value / 1000.0),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn cloud_layers(layers: &[NwsCloudLayer]) -> Vec<CloudLayer> {
    layers
        .iter()
        .filter_map(|l| {
            let cover = CloudCover::from_token(l.amount.as_deref()?)?;
            let base_ft = metres(l.base.as_ref()).map(|m| meters_to_feet(m).round() as i32);
            Some(CloudLayer { cover, base_ft })
        })
        .collect()
}

impl SourceAdapter for NwsAdapter {
    fn provider(&self) -> Provider {
        Provider::Nws
    }

    fn measured_fields(&self) -> &'static [Field] {
        MEASURED
    }

    fn parse_payload(&self, raw: &str, ctx: &ParseContext) -> Option<Observation> {
        let NwsObservation { properties: p } = serde_json::from_str(raw).ok()?;

        // `station` is a URL ending in the station identifier.
        let station = p.station.as_deref().and_then(|s| s.rsplit('/').next());
        if !ctx.matches_station(station) && p.station.is_some() {
            return None;
        }

        let obs_time = p
            .timestamp
            .as_deref()
            .and_then(parse_iso_time)
            .unwrap_or(ctx.fetched_at);

        let humidity = p
            .relative_humidity
            .as_ref()
            .and_then(Measurement::reading)
            .map(|(v, _)| v);

        let direction = p
            .wind_direction
            .as_ref()
            .and_then(Measurement::reading)
            .and_then(|(v, _)| round_degrees(v));

        let (ceiling, cloud_cover) = p
            .cloud_layers
            .as_deref()
            .map_or((None, None), |l| select_ceiling(&cloud_layers(l)));

        Some(Observation {
            temperature: celsius(p.temperature.as_ref()),
            dewpoint: celsius(p.dewpoint.as_ref()),
            humidity,
            pressure: inhg(p.barometric_pressure.as_ref())
                .or_else(|| inhg(p.sea_level_pressure.as_ref())),
            wind_speed: knots(p.wind_speed.as_ref()),
            wind_direction: direction,
            gust_speed: knots(p.wind_gust.as_ref()),
            visibility: metres(p.visibility.as_ref()).map(meters_to_statute_miles),
            ceiling,
            cloud_cover,
            ..Observation::at(obs_time)
        })
    }
}

/// Parses an api.weather.gov latest-observation response.
#[must_use]
pub fn parse_nws_response(raw: Option<&str>, ctx: &ParseContext) -> Option<Observation> {
    NwsAdapter.parse(raw, ctx)
}
