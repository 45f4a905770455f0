//! Scraped "current conditions" page adapter.
//!
//! Many stations only publish a web page with a table of label/value rows
//! (`Temperature | 54.3 °F`). Each row's label picks the field and the
//! value's unit suffix picks the conversion. Cells made of slashes or dashes
//! (`///`, `---`) are the station's way of saying "no data".

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use skyfeed_observation_models::units::{
    f_to_c, kmh_to_knots, mb_to_inhg, mm_to_inches, mph_to_knots, ms_to_knots, round_knots,
};
use skyfeed_observation_models::{Field, Observation, Provider};

use crate::parsing::{
    is_sentinel, parse_iso_time, parse_local_time, parse_visibility, round_degrees,
};
use crate::{ParseContext, SourceAdapter};

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("valid regex"));

static ROW_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr").expect("valid selector"));

static CELL_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th, td").expect("valid selector"));

const COMPASS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

const MEASURED: &[Field] = &[
    Field::Temperature,
    Field::Dewpoint,
    Field::Humidity,
    Field::Pressure,
    Field::WindSpeed,
    Field::WindDirection,
    Field::GustSpeed,
    Field::Visibility,
    Field::PrecipAccum,
];

/// Scraped HTML table adapter.
pub struct HtmlTableAdapter;

impl HtmlTableAdapter {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for HtmlTableAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// What a row label refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Row {
    Reading(Field),
    Updated,
}

/// Label fragments in match order: "dew point" must win over "temp" and
/// "wind gust" over "wind".
const LABELS: &[(&str, Row)] = &[
    ("dew", Row::Reading(Field::Dewpoint)),
    ("temp", Row::Reading(Field::Temperature)),
    ("humid", Row::Reading(Field::Humidity)),
    ("pressure", Row::Reading(Field::Pressure)),
    ("barometer", Row::Reading(Field::Pressure)),
    ("gust", Row::Reading(Field::GustSpeed)),
    ("direction", Row::Reading(Field::WindDirection)),
    ("wind", Row::Reading(Field::WindSpeed)),
    ("visib", Row::Reading(Field::Visibility)),
    ("rain", Row::Reading(Field::PrecipAccum)),
    ("precip", Row::Reading(Field::PrecipAccum)),
    ("updated", Row::Updated),
    ("observed", Row::Updated),
    ("time", Row::Updated),
];

fn classify(label: &str) -> Option<Row> {
    let label = label.to_ascii_lowercase();
    LABELS
        .iter()
        .find(|(needle, _)| label.contains(needle))
        .map(|(_, row)| *row)
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<Vec<_>>().join(" ").trim().to_owned()
}

fn leading_number(value: &str) -> Option<f64> {
    NUMBER_RE
        .find(value)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|n| n.is_finite())
}

/// The leading number, converted when the value's unit contains any of
/// `units` (case-insensitive).
fn converted(value: &str, units: &[&str], convert: fn(f64) -> f64) -> Option<f64> {
    let n = leading_number(value)?;
    let lower = value.to_ascii_lowercase();
    Some(if units.iter().any(|u| lower.contains(u)) {
        convert(n)
    } else {
        n
    })
}

fn temperature(value: &str) -> Option<f64> {
    let fahrenheit = value.trim_end().to_ascii_uppercase().ends_with('F');
    leading_number(value).map(|n| if fahrenheit { f_to_c(n) } else { n })
}

fn speed(value: &str) -> Option<i32> {
    let unit = value.to_ascii_lowercase();
    if unit.contains("calm") {
        return Some(0);
    }
    let n = leading_number(value)?;
    let kt = if unit.contains("mph") {
        mph_to_knots(n)
    } else if unit.contains("km/h") || unit.contains("kph") {
        kmh_to_knots(n)
    } else if unit.contains("m/s") {
        ms_to_knots(n)
    } else {
        n
    };
    round_knots(kt)
}

/// Degrees (`"315°"`) or a compass point (`"NW"`).
#[allow(clippy::cast_precision_loss)]
fn direction(value: &str) -> Option<i32> {
    if let Some(n) = leading_number(value) {
        return round_degrees(n);
    }
    let token = value.trim().to_ascii_uppercase();
    COMPASS
        .iter()
        .position(|p| *p == token)
        .and_then(|i| round_degrees(i as f64 * 22.5))
}

fn visibility(value: &str) -> Option<f64> {
    let lower = value.to_ascii_lowercase();
    let stripped = lower
        .trim_end_matches("miles")
        .trim_end_matches("mi")
        .trim();
    if lower.contains("km") {
        return leading_number(value).map(|km| km / 1.609_344);
    }
    parse_visibility(&stripped.to_ascii_uppercase()).or_else(|| leading_number(value))
}

fn apply(obs: &mut Observation, field: Field, value: &str) {
    match field {
        Field::Temperature => obs.temperature = temperature(value),
        Field::Dewpoint => obs.dewpoint = temperature(value),
        Field::Humidity => obs.humidity = leading_number(value),
        Field::Pressure => obs.pressure = converted(value, &["mb", "hpa"], mb_to_inhg),
        Field::WindSpeed => obs.wind_speed = speed(value),
        Field::WindDirection => obs.wind_direction = direction(value),
        Field::GustSpeed => obs.gust_speed = speed(value),
        Field::Visibility => obs.visibility = visibility(value),
        Field::PrecipAccum => obs.precip_accum = converted(value, &["mm"], mm_to_inches),
        Field::PeakGust | Field::Ceiling | Field::CloudCover => {}
    }
}

impl SourceAdapter for HtmlTableAdapter {
    fn provider(&self) -> Provider {
        Provider::Html
    }

    fn measured_fields(&self) -> &'static [Field] {
        MEASURED
    }

    fn parse_payload(&self, raw: &str, ctx: &ParseContext) -> Option<Observation> {
        let document = Html::parse_document(raw);
        let mut obs = Observation::at(ctx.fetched_at);
        let mut readings = 0_usize;
        let mut sentinels = 0_usize;

        for row in document.select(&ROW_SELECTOR) {
            let cells: Vec<String> = row.select(&CELL_SELECTOR).map(cell_text).collect();
            let [label, value, ..] = cells.as_slice() else {
                continue;
            };
            let Some(kind) = classify(label) else {
                continue;
            };

            match kind {
                Row::Updated => {
                    let ts = match &ctx.utc_offset {
                        Some(offset) => parse_local_time(value, offset),
                        None => parse_iso_time(value),
                    };
                    if let Some(ts) = ts {
                        obs.obs_time = ts;
                    }
                }
                Row::Reading(field) => {
                    readings += 1;
                    if is_sentinel(value) {
                        sentinels += 1;
                    } else {
                        apply(&mut obs, field, value);
                    }
                }
            }
        }

        if readings > 0 && readings == sentinels {
            log::debug!("html: every reading on the page is a no-data marker");
            return None;
        }

        Some(obs)
    }
}

/// Parses a scraped current-conditions HTML page.
#[must_use]
pub fn parse_html_response(raw: Option<&str>, ctx: &ParseContext) -> Option<Observation> {
    HtmlTableAdapter.parse(raw, ctx)
}
