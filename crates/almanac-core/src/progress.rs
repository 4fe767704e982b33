//! Elapsed-time fractions for the year and its months.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveDateTime};

use crate::datetime;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressMetric {
    pub year_fraction: f64,
    /// Empty when `now` lies outside the target year.
    pub per_month_fraction: BTreeMap<u32, f64>,
}

/// Percentage of `year` elapsed between Jan 1 00:00:00 and Dec 31 23:59:59.
///
/// Not clamped: instants before or after the year give values below 0 or
/// above 100. Use [`clamp_percent`] for display.
pub fn year_fraction(now: NaiveDateTime, year: i32) -> CoreResult<f64> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| CoreError::invalid_date(format!("year out of range: {year}")))?;
    let end = NaiveDate::from_ymd_opt(year, 12, 31)
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .ok_or_else(|| CoreError::invalid_date(format!("year out of range: {year}")))?;

    let span = (end - start).num_milliseconds() as f64;
    let elapsed = (now - start).num_milliseconds() as f64;
    Ok(elapsed / span * 100.0)
}

/// Percentage of `year-month` elapsed as of `now`, by whole days.
///
/// `None` when `now` is in a different year. Past months are 100, future
/// months 0, and the current month is `day / days_in_month`, rounded to
/// one decimal place.
pub fn month_fraction(now: NaiveDateTime, year: i32, month: u32) -> CoreResult<Option<f64>> {
    let days = datetime::days_in_month(year, month)?;

    if now.year() != year {
        return Ok(None);
    }

    let fraction = match month.cmp(&now.month()) {
        std::cmp::Ordering::Less => 100.0,
        std::cmp::Ordering::Greater => 0.0,
        std::cmp::Ordering::Equal => round_one_decimal(f64::from(now.day()) / f64::from(days) * 100.0),
    };
    Ok(Some(fraction))
}

#[tracing::instrument(skip(now))]
pub fn progress_metric(now: NaiveDateTime, year: i32) -> CoreResult<ProgressMetric> {
    let year_fraction = year_fraction(now, year)?;
    let mut per_month_fraction = BTreeMap::new();
    for month in 1..=12 {
        if let Some(fraction) = month_fraction(now, year, month)? {
            per_month_fraction.insert(month, fraction);
        }
    }

    Ok(ProgressMetric {
        year_fraction,
        per_month_fraction,
    })
}

pub fn clamp_percent(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
