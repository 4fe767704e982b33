//! Day classification relative to a reference instant.
//!
//! Every function here is a pure function of its two dates. The caller
//! supplies `now` in the client-local zone.

use std::cmp::Ordering;

use chrono::{Datelike, NaiveDate, NaiveDateTime};

/// Where a day sits relative to today. Exactly one variant holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayTense {
    Past,
    Today,
    Future,
}

impl DayTense {
    pub fn of(day: NaiveDate, now: NaiveDateTime) -> Self {
        match civil_key(day).cmp(&civil_key(now.date())) {
            Ordering::Less => DayTense::Past,
            Ordering::Equal => DayTense::Today,
            Ordering::Greater => DayTense::Future,
        }
    }
}

fn civil_key(date: NaiveDate) -> (i32, u32, u32) {
    (date.year(), date.month(), date.day())
}

pub fn is_today(day: NaiveDate, now: NaiveDateTime) -> bool {
    DayTense::of(day, now) == DayTense::Today
}

pub fn is_past(day: NaiveDate, now: NaiveDateTime) -> bool {
    DayTense::of(day, now) == DayTense::Past
}

pub fn is_future(day: NaiveDate, now: NaiveDateTime) -> bool {
    DayTense::of(day, now) == DayTense::Future
}

/// Whether `day` belongs to the month being rendered rather than a
/// neighbouring month shown for alignment.
pub fn is_current_month(day: NaiveDate, year: i32, month: u32) -> bool {
    day.year() == year && day.month() == month
}
