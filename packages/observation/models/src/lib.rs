#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Canonical weather observation schema.
//!
//! Every provider adapter produces an [`Observation`] in the units listed
//! below, regardless of what the upstream wire format used:
//!
//! | Field | Unit |
//! |-------|------|
//! | `temperature`, `dewpoint` | °C |
//! | `humidity` | % (0-100) |
//! | `pressure` | inHg |
//! | `wind_speed`, `gust_speed`, `peak_gust` | knots (integer) |
//! | `wind_direction` | degrees (0-360) |
//! | `visibility` | statute miles |
//! | `ceiling` | feet AGL, `None` = unlimited |
//! | `precip_accum` | inches |
//! | `obs_time` | Unix seconds |
//!
//! The [`Field`] table is the single source of truth for which source kind
//! governs a field's staleness and what an absent value means.

pub mod units;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// The role a configured source plays for a site.
///
/// Provenance timestamps in the cache record are keyed by this value
/// (`last_updated_primary`, `obs_time_metar`, ...).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceKind {
    /// The site's own weather station.
    Primary,
    /// A secondary station used when the primary is down.
    Backup,
    /// The nearest aviation weather report.
    Metar,
}

/// The upstream provider a source fetches from. Selects the adapter.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Provider {
    /// `WeatherFlow` Tempest station cloud.
    Tempest,
    /// Ambient Weather device API.
    Ambient,
    /// Davis `WeatherLink` v2.
    Weatherlink,
    /// Synoptic Data mesonet API.
    Synoptic,
    /// aviationweather.gov METAR JSON.
    Metar,
    /// api.weather.gov latest station observation.
    Nws,
    /// Scraped station "current conditions" HTML page.
    Html,
}

/// Sky cover token for the reported cloud layers.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum CloudCover {
    /// Clear (also covers SKC, NSC, CAVOK).
    Clr,
    /// Few, 1-2 oktas.
    Few,
    /// Scattered, 3-4 oktas.
    Sct,
    /// Broken, 5-7 oktas.
    Bkn,
    /// Overcast, 8 oktas.
    Ovc,
}

impl CloudCover {
    /// Parses a provider cover token, accepting the clear-sky synonyms.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_uppercase().as_str() {
            "CLR" | "SKC" | "NSC" | "NCD" | "CAVOK" => Some(Self::Clr),
            "FEW" => Some(Self::Few),
            "SCT" => Some(Self::Sct),
            "BKN" => Some(Self::Bkn),
            "OVC" | "OVX" | "VV" => Some(Self::Ovc),
            _ => None,
        }
    }

    /// Whether a layer with this cover constitutes a ceiling.
    #[must_use]
    pub const fn is_ceiling(self) -> bool {
        matches!(self, Self::Bkn | Self::Ovc)
    }
}

/// One reported cloud layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloudLayer {
    /// Cover type of the layer.
    pub cover: CloudCover,
    /// Base of the layer in feet AGL, if reported.
    pub base_ft: Option<i32>,
}

/// Selects `(ceiling, cloud_cover)` from a list of cloud layers.
///
/// The ceiling is the base of the lowest BKN/OVC layer. FEW/SCT layers never
/// set a ceiling, and an empty list means unlimited. The cover token is the
/// ceiling layer's cover when one exists, otherwise the densest layer.
#[must_use]
pub fn select_ceiling(layers: &[CloudLayer]) -> (Option<i32>, Option<CloudCover>) {
    let ceiling_layer = layers
        .iter()
        .filter(|l| l.cover.is_ceiling())
        .filter_map(|l| l.base_ft.map(|base| (base, l.cover)))
        .min_by_key(|(base, _)| *base);

    if let Some((base, cover)) = ceiling_layer {
        return (Some(base), Some(cover));
    }

    (None, layers.iter().map(|l| l.cover).max())
}

// ── Field policy table ──────────────────────────────────────────────────

/// Which family of sources governs a field's staleness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldGroup {
    /// Readings from on-site stations (primary or backup).
    Station,
    /// Readings from the aviation report.
    Aviation,
}

impl FieldGroup {
    /// Source kinds whose provenance timestamps govern this group. The
    /// newest of them is the governing timestamp.
    #[must_use]
    pub const fn governing_kinds(self) -> &'static [SourceKind] {
        match self {
            Self::Station => &[SourceKind::Primary, SourceKind::Backup],
            Self::Aviation => &[SourceKind::Metar],
        }
    }
}

/// What it means when a provider that measures a field leaves it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Absence {
    /// Absent stays `None`; silence is not evidence of anything.
    Unknown,
    /// Absent means zero (e.g. a rain gauge reporting nothing means no rain).
    Zero,
}

/// Every observation field, with its policy row.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Field {
    Temperature,
    Dewpoint,
    Humidity,
    Pressure,
    WindSpeed,
    WindDirection,
    GustSpeed,
    PeakGust,
    Visibility,
    Ceiling,
    CloudCover,
    PrecipAccum,
}

impl Field {
    /// The group whose provenance governs this field.
    #[must_use]
    pub const fn group(self) -> FieldGroup {
        match self {
            Self::Visibility | Self::Ceiling | Self::CloudCover => FieldGroup::Aviation,
            Self::Temperature
            | Self::Dewpoint
            | Self::Humidity
            | Self::Pressure
            | Self::WindSpeed
            | Self::WindDirection
            | Self::GustSpeed
            | Self::PeakGust
            | Self::PrecipAccum => FieldGroup::Station,
        }
    }

    /// What an absent value means for this field.
    #[must_use]
    pub const fn absence(self) -> Absence {
        match self {
            Self::PrecipAccum => Absence::Zero,
            _ => Absence::Unknown,
        }
    }
}

// ── Validation issues ───────────────────────────────────────────────────

/// How far outside its bounds a value was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IssueSeverity {
    /// Physically possible but outside the normal range. Value kept.
    Extreme,
    /// Physically impossible (usually a unit error). Value nulled.
    Rejected,
}

/// A problem found with a value during validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Name of the checked quantity (a field name or a derived value).
    pub field: String,
    /// The offending value as reported.
    pub value: f64,
    /// Whether the value was kept or nulled.
    pub severity: IssueSeverity,
    /// Human-readable explanation.
    pub message: String,
}

// ── Observation ─────────────────────────────────────────────────────────

/// One normalized reading from a single source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Air temperature, °C.
    pub temperature: Option<f64>,
    /// Dewpoint, °C.
    pub dewpoint: Option<f64>,
    /// Relative humidity, percent.
    pub humidity: Option<f64>,
    /// Altimeter / sea-level pressure, inHg.
    pub pressure: Option<f64>,
    /// Sustained wind speed, knots.
    pub wind_speed: Option<i32>,
    /// Wind direction, degrees. `None` for variable or unreported.
    pub wind_direction: Option<i32>,
    /// Gust speed, knots. Never defaulted from `wind_speed`.
    pub gust_speed: Option<i32>,
    /// Peak gust reported by the provider, knots.
    #[serde(default)]
    pub peak_gust: Option<i32>,
    /// Visibility, statute miles.
    pub visibility: Option<f64>,
    /// Ceiling, feet AGL. `None` means unlimited.
    pub ceiling: Option<i32>,
    /// Sky cover token.
    pub cloud_cover: Option<CloudCover>,
    /// Precipitation accumulation since local midnight, inches.
    pub precip_accum: Option<f64>,
    /// Source-reported observation time, Unix seconds.
    pub obs_time: i64,
    /// Problems found by validation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_issues: Vec<ValidationIssue>,
}

impl Observation {
    /// Creates an empty observation taken at `obs_time`.
    #[must_use]
    pub fn at(obs_time: i64) -> Self {
        Self {
            obs_time,
            ..Self::default()
        }
    }

    /// Whether `field` carries a value.
    #[must_use]
    pub const fn has(&self, field: Field) -> bool {
        match field {
            Field::Temperature => self.temperature.is_some(),
            Field::Dewpoint => self.dewpoint.is_some(),
            Field::Humidity => self.humidity.is_some(),
            Field::Pressure => self.pressure.is_some(),
            Field::WindSpeed => self.wind_speed.is_some(),
            Field::WindDirection => self.wind_direction.is_some(),
            Field::GustSpeed => self.gust_speed.is_some(),
            Field::PeakGust => self.peak_gust.is_some(),
            Field::Visibility => self.visibility.is_some(),
            Field::Ceiling => self.ceiling.is_some(),
            Field::CloudCover => self.cloud_cover.is_some(),
            Field::PrecipAccum => self.precip_accum.is_some(),
        }
    }

    /// Numeric value of `field`, if it has one. `CloudCover` has none.
    #[must_use]
    pub fn numeric(&self, field: Field) -> Option<f64> {
        match field {
            Field::Temperature => self.temperature,
            Field::Dewpoint => self.dewpoint,
            Field::Humidity => self.humidity,
            Field::Pressure => self.pressure,
            Field::WindSpeed => self.wind_speed.map(f64::from),
            Field::WindDirection => self.wind_direction.map(f64::from),
            Field::GustSpeed => self.gust_speed.map(f64::from),
            Field::PeakGust => self.peak_gust.map(f64::from),
            Field::Visibility => self.visibility,
            Field::Ceiling => self.ceiling.map(f64::from),
            Field::PrecipAccum => self.precip_accum,
            Field::CloudCover => None,
        }
    }

    /// Copies `field` from `other` into `self`, overwriting.
    pub fn copy_field_from(&mut self, field: Field, other: &Self) {
        match field {
            Field::Temperature => self.temperature = other.temperature,
            Field::Dewpoint => self.dewpoint = other.dewpoint,
            Field::Humidity => self.humidity = other.humidity,
            Field::Pressure => self.pressure = other.pressure,
            Field::WindSpeed => self.wind_speed = other.wind_speed,
            Field::WindDirection => self.wind_direction = other.wind_direction,
            Field::GustSpeed => self.gust_speed = other.gust_speed,
            Field::PeakGust => self.peak_gust = other.peak_gust,
            Field::Visibility => self.visibility = other.visibility,
            Field::Ceiling => self.ceiling = other.ceiling,
            Field::CloudCover => self.cloud_cover = other.cloud_cover,
            Field::PrecipAccum => self.precip_accum = other.precip_accum,
        }
    }

    /// Sets `field` to `None`.
    pub fn clear(&mut self, field: Field) {
        match field {
            Field::Temperature => self.temperature = None,
            Field::Dewpoint => self.dewpoint = None,
            Field::Humidity => self.humidity = None,
            Field::Pressure => self.pressure = None,
            Field::WindSpeed => self.wind_speed = None,
            Field::WindDirection => self.wind_direction = None,
            Field::GustSpeed => self.gust_speed = None,
            Field::PeakGust => self.peak_gust = None,
            Field::Visibility => self.visibility = None,
            Field::Ceiling => self.ceiling = None,
            Field::CloudCover => self.cloud_cover = None,
            Field::PrecipAccum => self.precip_accum = None,
        }
    }

    /// Applies the [`Absence::Zero`] policy to every absent field in
    /// `measured`. Fields the provider does not measure are left alone.
    pub fn apply_absence_policy(&mut self, measured: &[Field]) {
        for &field in measured {
            if field.absence() == Absence::Zero && !self.has(field) {
                self.set_zero(field);
            }
        }
    }

    fn set_zero(&mut self, field: Field) {
        match field {
            Field::Temperature => self.temperature = Some(0.0),
            Field::Dewpoint => self.dewpoint = Some(0.0),
            Field::Humidity => self.humidity = Some(0.0),
            Field::Pressure => self.pressure = Some(0.0),
            Field::WindSpeed => self.wind_speed = Some(0),
            Field::WindDirection => self.wind_direction = Some(0),
            Field::GustSpeed => self.gust_speed = Some(0),
            Field::PeakGust => self.peak_gust = Some(0),
            Field::Visibility => self.visibility = Some(0.0),
            Field::Ceiling => self.ceiling = Some(0),
            Field::PrecipAccum => self.precip_accum = Some(0.0),
            Field::CloudCover => {}
        }
    }

    /// Whether no reading field carries a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        <Field as strum::IntoEnumIterator>::iter().all(|f| !self.has(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(cover: CloudCover, base: i32) -> CloudLayer {
        CloudLayer {
            cover,
            base_ft: Some(base),
        }
    }

    #[test]
    fn few_layer_sets_no_ceiling() {
        let (ceiling, cover) = select_ceiling(&[layer(CloudCover::Few, 200)]);
        assert_eq!(ceiling, None);
        assert_eq!(cover, Some(CloudCover::Few));
    }

    #[test]
    fn broken_layer_sets_ceiling() {
        let (ceiling, cover) = select_ceiling(&[layer(CloudCover::Bkn, 1200)]);
        assert_eq!(ceiling, Some(1200));
        assert_eq!(cover, Some(CloudCover::Bkn));
    }

    #[test]
    fn lowest_broken_or_overcast_layer_wins() {
        let (ceiling, cover) = select_ceiling(&[
            layer(CloudCover::Sct, 800),
            layer(CloudCover::Ovc, 4500),
            layer(CloudCover::Bkn, 2500),
        ]);
        assert_eq!(ceiling, Some(2500));
        assert_eq!(cover, Some(CloudCover::Bkn));
    }

    #[test]
    fn empty_cloud_list_is_unlimited() {
        assert_eq!(select_ceiling(&[]), (None, None));
    }

    #[test]
    fn cover_tokens_accept_clear_synonyms() {
        assert_eq!(CloudCover::from_token("skc"), Some(CloudCover::Clr));
        assert_eq!(CloudCover::from_token("CAVOK"), Some(CloudCover::Clr));
        assert_eq!(CloudCover::from_token("VV"), Some(CloudCover::Ovc));
        assert_eq!(CloudCover::from_token("TCU"), None);
    }

    #[test]
    fn field_groups_partition_station_and_aviation() {
        assert_eq!(Field::WindSpeed.group(), FieldGroup::Station);
        assert_eq!(Field::Temperature.group(), FieldGroup::Station);
        assert_eq!(Field::Visibility.group(), FieldGroup::Aviation);
        assert_eq!(Field::Ceiling.group(), FieldGroup::Aviation);
    }

    #[test]
    fn absence_policy_only_zeroes_measured_precip() {
        let mut obs = Observation::at(1_700_000_000);
        obs.apply_absence_policy(&[Field::Temperature, Field::WindSpeed]);
        assert_eq!(obs.precip_accum, None);
        assert_eq!(obs.wind_speed, None);

        obs.apply_absence_policy(&[Field::PrecipAccum, Field::WindSpeed]);
        assert_eq!(obs.precip_accum, Some(0.0));
        assert_eq!(obs.wind_speed, None, "silence on wind is not calm");
    }

    #[test]
    fn copy_and_clear_fields() {
        let mut source = Observation::at(10);
        source.visibility = Some(7.0);
        let mut target = Observation::at(20);
        target.copy_field_from(Field::Visibility, &source);
        assert_eq!(target.visibility, Some(7.0));
        assert!(!target.is_empty());
        target.clear(Field::Visibility);
        assert!(target.is_empty());
    }

    #[test]
    fn serializes_canonical_field_names() {
        let mut obs = Observation::at(1_700_000_000);
        obs.cloud_cover = Some(CloudCover::Ovc);
        obs.gust_speed = Some(22);
        let json = serde_json::to_value(&obs).unwrap();
        assert_eq!(json["cloud_cover"], "OVC");
        assert_eq!(json["gust_speed"], 22);
        assert!(json["ceiling"].is_null());
        assert!(json.get("validation_issues").is_none());
    }
}
