//! Derived views over history entries: hourly downsampling, daily
//! extremes, and the last-hour wind rose.

use std::collections::BTreeMap;

use chrono::{NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use crate::HistoryEntry;

/// Number of compass sectors in a wind rose.
pub const WIND_ROSE_SECTORS: usize = 16;

/// Width of one wind rose sector in degrees.
pub const SECTOR_DEGREES: f64 = 22.5;

/// Keeps the latest entry in each clock hour. Input must be sorted by
/// `obs_time`; output is too.
#[must_use]
pub fn downsample_hourly(entries: &[HistoryEntry]) -> Vec<HistoryEntry> {
    let mut buckets: BTreeMap<i64, &HistoryEntry> = BTreeMap::new();
    for entry in entries {
        buckets.insert(entry.observation.obs_time.div_euclid(3600), entry);
    }
    buckets.into_values().cloned().collect()
}

/// Temperature and gust extremes for one local day. Every field is `None`
/// when the day has no observations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayExtremes {
    pub temp_high: Option<f64>,
    pub temp_high_ts: Option<i64>,
    pub temp_low: Option<f64>,
    pub temp_low_ts: Option<i64>,
    pub peak_gust: Option<i32>,
    pub peak_gust_ts: Option<i64>,
}

/// `[start, end)` in Unix seconds for `date` in `tz`.
#[must_use]
pub fn local_day_bounds<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> Option<(i64, i64)> {
    let start = tz
        .from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
        .earliest()?;
    let next = date.succ_opt()?;
    let end = tz
        .from_local_datetime(&next.and_hms_opt(0, 0, 0)?)
        .earliest()?;
    Some((start.timestamp(), end.timestamp()))
}

/// Scans the entries falling on `date_key` (`YYYY-MM-DD`, local to `tz`).
/// An unparseable date yields all-`None`.
#[must_use]
pub fn daily_extremes<Tz: TimeZone>(entries: &[HistoryEntry], date_key: &str, tz: &Tz) -> DayExtremes {
    let Some((start, end)) = NaiveDate::parse_from_str(date_key, "%Y-%m-%d")
        .ok()
        .and_then(|date| local_day_bounds(date, tz))
    else {
        log::debug!("invalid date key {date_key:?}");
        return DayExtremes::default();
    };

    let mut out = DayExtremes::default();
    for entry in entries {
        let obs = &entry.observation;
        if obs.obs_time < start || obs.obs_time >= end {
            continue;
        }
        if let Some(t) = obs.temperature {
            if out.temp_high.is_none_or(|h| t > h) {
                out.temp_high = Some(t);
                out.temp_high_ts = Some(obs.obs_time);
            }
            if out.temp_low.is_none_or(|l| t < l) {
                out.temp_low = Some(t);
                out.temp_low_ts = Some(obs.obs_time);
            }
        }
        if let Some(g) = obs.gust_speed.max(obs.peak_gust)
            && out.peak_gust.is_none_or(|p| g > p)
        {
            out.peak_gust = Some(g);
            out.peak_gust_ts = Some(obs.obs_time);
        }
    }
    out
}

/// Sector index (0 = N, 4 = E, ...) for a direction in degrees.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
pub fn sector(direction: i32) -> usize {
    let shifted = (f64::from(direction) + SECTOR_DEGREES / 2.0) / SECTOR_DEGREES;
    (shifted.floor() as i64).rem_euclid(WIND_ROSE_SECTORS as i64) as usize
}

/// Average wind speed per sector over `[now - 3600, now]`, or `None` when
/// no entry in the window has both speed and direction.
#[must_use]
pub fn last_hour_wind_rose(entries: &[HistoryEntry], now: i64) -> Option<[f64; WIND_ROSE_SECTORS]> {
    let mut sums = [0.0_f64; WIND_ROSE_SECTORS];
    let mut counts = [0_u32; WIND_ROSE_SECTORS];

    for entry in entries {
        let obs = &entry.observation;
        if obs.obs_time < now - 3600 || obs.obs_time > now {
            continue;
        }
        let (Some(speed), Some(direction)) = (obs.wind_speed, obs.wind_direction) else {
            continue;
        };
        let i = sector(direction);
        sums[i] += f64::from(speed);
        counts[i] += 1;
    }

    if counts.iter().all(|c| *c == 0) {
        return None;
    }

    let mut rose = [0.0; WIND_ROSE_SECTORS];
    for ((avg, sum), count) in rose.iter_mut().zip(sums).zip(counts) {
        if count > 0 {
            *avg = sum / f64::from(count);
        }
    }
    Some(rose)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use skyfeed_observation_models::Observation;

    const NOON: i64 = 1_714_564_800; // 2024-05-01T12:00:00Z

    fn entry(obs: Observation) -> HistoryEntry {
        HistoryEntry::new(obs, None)
    }

    fn wind(at: i64, speed: i32, direction: i32) -> HistoryEntry {
        entry(Observation {
            wind_speed: Some(speed),
            wind_direction: Some(direction),
            ..Observation::at(at)
        })
    }

    #[test]
    fn hourly_keeps_latest_per_hour() {
        let entries: Vec<_> = [NOON, NOON + 600, NOON + 3599, NOON + 3600]
            .into_iter()
            .map(|t| entry(Observation::at(t)))
            .collect();
        let hourly = downsample_hourly(&entries);
        let times: Vec<i64> = hourly.iter().map(|e| e.observation.obs_time).collect();
        assert_eq!(times, vec![NOON + 3599, NOON + 3600]);
    }

    #[test]
    fn sectors_wrap_at_north() {
        assert_eq!(sector(0), 0);
        assert_eq!(sector(11), 0);
        assert_eq!(sector(12), 1);
        assert_eq!(sector(90), 4);
        assert_eq!(sector(350), 0);
        assert_eq!(sector(360), 0);
        assert_eq!(sector(337), 15);
    }

    #[test]
    fn wind_rose_averages_within_last_hour() {
        let entries = vec![
            wind(NOON - 4000, 40, 90),
            wind(NOON - 1800, 10, 90),
            wind(NOON - 600, 20, 95),
            wind(NOON - 300, 5, 270),
        ];
        let rose = last_hour_wind_rose(&entries, NOON).unwrap();
        assert!((rose[4] - 15.0).abs() < 1e-9);
        assert!((rose[12] - 5.0).abs() < 1e-9);
        assert!(rose[0].abs() < 1e-9);
    }

    #[test]
    fn wind_rose_without_recent_wind_is_none() {
        let entries = vec![wind(NOON - 7200, 10, 90), entry(Observation::at(NOON))];
        assert!(last_hour_wind_rose(&entries, NOON).is_none());
    }

    #[test]
    fn daily_extremes_use_local_day_boundaries() {
        let pacific = FixedOffset::west_opt(7 * 3600).unwrap();
        // 2024-05-01 local runs 07:00Z May 1 to 07:00Z May 2.
        let temps = [
            (NOON - 6 * 3600, 30.0), // 23:00 local on Apr 30
            (NOON, 10.0),
            (NOON + 3 * 3600, 16.0),
            (NOON + 18 * 3600, 4.0), // 23:00 local May 1
        ];
        let mut entries: Vec<_> = temps
            .iter()
            .map(|(t, c)| {
                entry(Observation {
                    temperature: Some(*c),
                    ..Observation::at(*t)
                })
            })
            .collect();
        entries.push(entry(Observation {
            gust_speed: Some(22),
            ..Observation::at(NOON + 3600)
        }));

        let out = daily_extremes(&entries, "2024-05-01", &pacific);
        assert_eq!(out.temp_high, Some(16.0));
        assert_eq!(out.temp_high_ts, Some(NOON + 3 * 3600));
        assert_eq!(out.temp_low, Some(4.0));
        assert_eq!(out.peak_gust, Some(22));
        assert_eq!(out.peak_gust_ts, Some(NOON + 3600));
    }

    #[test]
    fn empty_day_is_all_none() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let entries = vec![entry(Observation {
            temperature: Some(1.0),
            ..Observation::at(NOON)
        })];
        assert_eq!(daily_extremes(&entries, "2024-05-03", &utc), DayExtremes::default());
        assert_eq!(daily_extremes(&entries, "not-a-date", &utc), DayExtremes::default());
    }
}
