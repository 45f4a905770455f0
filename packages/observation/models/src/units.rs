//! Unit conversion primitives.
//!
//! Pure functions with no state. Every adapter converts into the canonical
//! units through these so a given wire unit is always converted the same way.

/// Millibars (hPa) per inch of mercury.
pub const MB_PER_INHG: f64 = 33.8639;

/// Knots per metre/second.
const KNOTS_PER_MS: f64 = 1.943_844;

/// Knots per statute mile/hour.
const KNOTS_PER_MPH: f64 = 0.868_976;

/// Knots per kilometre/hour.
const KNOTS_PER_KMH: f64 = 0.539_957;

const FEET_PER_METER: f64 = 3.280_84;
const METERS_PER_STATUTE_MILE: f64 = 1_609.344;
const MM_PER_INCH: f64 = 25.4;

/// Magnus coefficients (Alduchov & Eskridge).
const MAGNUS_A: f64 = 17.625;
const MAGNUS_B: f64 = 243.04;

#[must_use]
pub fn f_to_c(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

#[must_use]
pub fn c_to_f(c: f64) -> f64 {
    c.mul_add(9.0 / 5.0, 32.0)
}

#[must_use]
pub fn ms_to_knots(ms: f64) -> f64 {
    ms * KNOTS_PER_MS
}

#[must_use]
pub fn knots_to_ms(knots: f64) -> f64 {
    knots / KNOTS_PER_MS
}

#[must_use]
pub fn mph_to_knots(mph: f64) -> f64 {
    mph * KNOTS_PER_MPH
}

#[must_use]
pub fn kmh_to_knots(kmh: f64) -> f64 {
    kmh * KNOTS_PER_KMH
}

#[must_use]
pub fn mb_to_inhg(mb: f64) -> f64 {
    mb / MB_PER_INHG
}

#[must_use]
pub fn inhg_to_mb(inhg: f64) -> f64 {
    inhg * MB_PER_INHG
}

#[must_use]
pub fn pa_to_inhg(pa: f64) -> f64 {
    mb_to_inhg(pa / 100.0)
}

#[must_use]
pub fn mm_to_inches(mm: f64) -> f64 {
    mm / MM_PER_INCH
}

#[must_use]
pub fn inches_to_mm(inches: f64) -> f64 {
    inches * MM_PER_INCH
}

#[must_use]
pub fn meters_to_feet(m: f64) -> f64 {
    m * FEET_PER_METER
}

#[must_use]
pub fn meters_to_statute_miles(m: f64) -> f64 {
    m / METERS_PER_STATUTE_MILE
}

/// Rounds a knot value to the integer the canonical schema stores.
///
/// Returns `None` for non-finite input so a NaN never becomes a reading.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn round_knots(knots: f64) -> Option<i32> {
    if !knots.is_finite() {
        return None;
    }
    Some(knots.round().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32)
}

/// Relative humidity (%) from temperature and dewpoint (°C) using the
/// Magnus approximation. Clamped to 0-100; temp == dewpoint gives 100.
#[must_use]
pub fn relative_humidity(temp_c: f64, dewpoint_c: f64) -> Option<f64> {
    if !temp_c.is_finite() || !dewpoint_c.is_finite() {
        return None;
    }
    let gamma = |t: f64| (MAGNUS_A * t) / (MAGNUS_B + t);
    let rh = 100.0 * (gamma(dewpoint_c) - gamma(temp_c)).exp();
    Some(rh.clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_pressure_in_inhg() {
        assert!((mb_to_inhg(1013.25) - 29.92).abs() < 0.1);
        assert!((pa_to_inhg(101_325.0) - 29.92).abs() < 0.1);
        assert!((inhg_to_mb(29.92) - 1013.2).abs() < 0.1);
    }

    #[test]
    fn ten_knots_from_metres_per_second() {
        assert_eq!(round_knots(ms_to_knots(5.144)), Some(10));
        assert!((knots_to_ms(10.0) - 5.144).abs() < 0.01);
    }

    #[test]
    fn freezing_point() {
        assert!(f_to_c(32.0).abs() < 0.1);
        assert!((c_to_f(100.0) - 212.0).abs() < 1e-9);
    }

    #[test]
    fn mph_and_kmh_to_knots() {
        assert_eq!(round_knots(mph_to_knots(23.0)), Some(20));
        assert_eq!(round_knots(kmh_to_knots(18.52)), Some(10));
    }

    #[test]
    fn length_conversions() {
        assert!((mm_to_inches(25.4) - 1.0).abs() < 1e-9);
        assert!((inches_to_mm(1.0) - 25.4).abs() < 1e-9);
        assert!((meters_to_feet(304.8) - 1000.0).abs() < 0.01);
        assert!((meters_to_statute_miles(16_093.44) - 10.0).abs() < 1e-6);
    }

    #[test]
    fn saturated_air_is_full_humidity() {
        let rh = relative_humidity(15.0, 15.0).unwrap();
        assert!((rh - 100.0).abs() < 0.01);
    }

    #[test]
    fn dry_air_humidity() {
        // 20°C with 10°C dewpoint is roughly 52%.
        let rh = relative_humidity(20.0, 10.0).unwrap();
        assert!((rh - 52.5).abs() < 1.5, "got {rh}");
    }

    #[test]
    fn non_finite_inputs() {
        assert_eq!(round_knots(f64::NAN), None);
        assert_eq!(relative_humidity(f64::NAN, 1.0), None);
    }
}
