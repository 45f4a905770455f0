//! Range and unit sanity checks for parsed observations.
//!
//! Each quantity has two ranges. Outside the *normal* range a value is
//! physically possible but unusual: it is kept and an
//! [`IssueSeverity::Extreme`] issue is recorded. Outside the *possible*
//! range the value is almost certainly a unit error (pressure reported in
//! hundredths of inHg, temperature in °F labelled °C) and is nulled with an
//! [`IssueSeverity::Rejected`] issue, so it never reaches pressure/density
//! altitude calculations.

use skyfeed_observation_models::{Field, IssueSeverity, Observation, ValidationIssue};

/// Normal and physically possible ranges for one quantity, inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub normal: (f64, f64),
    pub possible: (f64, f64),
}

impl Bounds {
    const fn new(normal: (f64, f64), possible: (f64, f64)) -> Self {
        Self { normal, possible }
    }

    /// Classifies `value`; `None` when it is inside the normal range.
    #[must_use]
    pub fn classify(&self, value: f64) -> Option<IssueSeverity> {
        let inside = |(lo, hi): (f64, f64)| value.is_finite() && (lo..=hi).contains(&value);
        if !inside(self.possible) {
            Some(IssueSeverity::Rejected)
        } else if !inside(self.normal) {
            Some(IssueSeverity::Extreme)
        } else {
            None
        }
    }
}

/// Bounds for a reading field. `CloudCover` is a token and has none.
#[must_use]
pub const fn field_bounds(field: Field) -> Option<Bounds> {
    let bounds = match field {
        Field::Temperature => Bounds::new((-60.0, 55.0), (-95.0, 65.0)),
        Field::Dewpoint => Bounds::new((-70.0, 35.0), (-100.0, 45.0)),
        Field::Humidity => Bounds::new((0.0, 100.0), (0.0, 105.0)),
        Field::Pressure => Bounds::new((27.5, 31.5), (20.0, 40.0)),
        Field::WindSpeed => Bounds::new((0.0, 120.0), (0.0, 250.0)),
        Field::GustSpeed | Field::PeakGust => Bounds::new((0.0, 150.0), (0.0, 280.0)),
        Field::WindDirection => Bounds::new((0.0, 360.0), (0.0, 360.0)),
        Field::Visibility => Bounds::new((0.0, 100.0), (0.0, 300.0)),
        Field::Ceiling => Bounds::new((0.0, 40_000.0), (0.0, 100_000.0)),
        Field::PrecipAccum => Bounds::new((0.0, 15.0), (0.0, 75.0)),
        Field::CloudCover => return None,
    };
    Some(bounds)
}

/// Pressure altitude bounds, feet.
pub const PRESSURE_ALTITUDE: Bounds = Bounds::new((-2_000.0, 18_000.0), (-5_000.0, 40_000.0));

/// Density altitude bounds, feet.
pub const DENSITY_ALTITUDE: Bounds = Bounds::new((-5_000.0, 20_000.0), (-15_000.0, 45_000.0));

/// Standard sea-level altimeter setting, inHg.
const STANDARD_ALTIMETER: f64 = 29.92;

/// Pressure altitude in feet for a field at `elevation_ft` with the given
/// altimeter setting.
#[must_use]
pub fn pressure_altitude(elevation_ft: f64, altimeter_inhg: f64) -> f64 {
    elevation_ft + (STANDARD_ALTIMETER - altimeter_inhg) * 1000.0
}

/// Density altitude in feet (the 120 ft/°C rule of thumb).
#[must_use]
pub fn density_altitude(pressure_altitude_ft: f64, temp_c: f64) -> f64 {
    let isa_temp = 15.0 - 2.0 * pressure_altitude_ft / 1000.0;
    pressure_altitude_ft + 120.0 * (temp_c - isa_temp)
}

fn issue(name: &str, value: f64, severity: IssueSeverity, detail: &str) -> ValidationIssue {
    let action = match severity {
        IssueSeverity::Extreme => "kept",
        IssueSeverity::Rejected => "discarded",
    };
    ValidationIssue {
        field: name.to_owned(),
        value,
        severity,
        message: format!("{name} {value} {detail}; {action}"),
    }
}

/// Checks every field of `obs` against its bounds, nulling rejected values
/// and appending issues to `obs.validation_issues`.
///
/// When `elevation_ft` is known, pressure and density altitude are derived
/// from the surviving values and checked too. A rejected derived altitude
/// nulls the pressure reading it was computed from.
///
/// Returns the number of issues recorded by this call.
pub fn validate(obs: &mut Observation, elevation_ft: Option<f64>) -> usize {
    use strum::IntoEnumIterator;

    let before = obs.validation_issues.len();

    for field in Field::iter() {
        let (Some(bounds), Some(value)) = (field_bounds(field), obs.numeric(field)) else {
            continue;
        };
        let Some(severity) = bounds.classify(value) else {
            continue;
        };
        let name = field.as_ref();
        match severity {
            IssueSeverity::Rejected => {
                log::warn!("rejecting {name}={value}: outside physically possible range");
                obs.clear(field);
                obs.validation_issues.push(issue(
                    name,
                    value,
                    severity,
                    "is outside the physically possible range",
                ));
            }
            IssueSeverity::Extreme => {
                log::info!("flagging {name}={value}: outside normal range");
                obs.validation_issues.push(issue(
                    name,
                    value,
                    severity,
                    "is outside the normal range",
                ));
            }
        }
    }

    if let (Some(t), Some(d)) = (obs.temperature, obs.dewpoint)
        && d > t + 1.0
    {
        obs.validation_issues.push(ValidationIssue {
            field: Field::Dewpoint.as_ref().to_owned(),
            value: d,
            severity: IssueSeverity::Extreme,
            message: format!("dewpoint {d} exceeds temperature {t}; kept"),
        });
    }

    if let (Some(elevation), Some(altimeter)) = (elevation_ft, obs.pressure) {
        check_altitudes(obs, elevation, altimeter);
    }

    obs.validation_issues.len() - before
}

fn check_altitudes(obs: &mut Observation, elevation: f64, altimeter: f64) {
    let pa = pressure_altitude(elevation, altimeter);
    let mut derived = vec![("pressure_altitude", pa, PRESSURE_ALTITUDE)];
    if let Some(t) = obs.temperature {
        derived.push(("density_altitude", density_altitude(pa, t), DENSITY_ALTITUDE));
    }

    for (name, value, bounds) in derived {
        let Some(severity) = bounds.classify(value) else {
            continue;
        };
        if severity == IssueSeverity::Rejected {
            log::warn!("rejecting pressure: derived {name} {value:.0} ft is impossible");
            obs.pressure = None;
        }
        obs.validation_issues.push(issue(
            name,
            value.round(),
            severity,
            "ft is outside the expected range",
        ));
    }
}
