//! Month grid construction.
//!
//! A [`MonthGrid`] is a row-major sequence of cells, seven per week with
//! Sunday in column 0. Day 1 is preceded by one empty cell per weekday
//! before it, and the last week is padded with empty cells.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use tracing::{debug, instrument};

use crate::calendar::DayRecord;
use crate::classify::{self, DayTense};
use crate::datetime;
use crate::error::{CoreError, CoreResult};

pub const DAYS_PER_WEEK: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayCell {
    pub date: NaiveDate,
    pub is_current_month: bool,
    pub tense: DayTense,
    pub events: Vec<String>,
    pub notes: Vec<String>,
}

impl DayCell {
    pub fn day(&self) -> u32 {
        self.date.day()
    }

    pub fn is_today(&self) -> bool {
        self.tense == DayTense::Today
    }

    pub fn is_past(&self) -> bool {
        self.tense == DayTense::Past
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn has_notes(&self) -> bool {
        !self.notes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridCell {
    Empty,
    Day(DayCell),
}

impl GridCell {
    pub fn as_day(&self) -> Option<&DayCell> {
        match self {
            GridCell::Day(cell) => Some(cell),
            GridCell::Empty => None,
        }
    }

    /// Only days of the rendered month can be picked; padding never can.
    pub fn is_selectable(&self) -> bool {
        self.as_day().is_some_and(|cell| cell.is_current_month)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthGrid {
    pub year: i32,
    pub month: u32,
    pub cells: Vec<GridCell>,
}

impl MonthGrid {
    pub fn weeks_in_grid(&self) -> usize {
        self.cells.len() / DAYS_PER_WEEK
    }

    pub fn weeks(&self) -> impl Iterator<Item = &[GridCell]> {
        self.cells.chunks(DAYS_PER_WEEK)
    }

    pub fn leading_padding(&self) -> usize {
        self.cells
            .iter()
            .take_while(|cell| matches!(cell, GridCell::Empty))
            .count()
    }

    pub fn trailing_padding(&self) -> usize {
        self.cells
            .iter()
            .rev()
            .take_while(|cell| matches!(cell, GridCell::Empty))
            .count()
    }

    pub fn days(&self) -> impl Iterator<Item = &DayCell> {
        self.cells.iter().filter_map(GridCell::as_day)
    }

    pub fn day(&self, day: u32) -> Option<&DayCell> {
        self.days().find(|cell| cell.day() == day)
    }
}

/// Build the grid for `year-month` from the backend's day records.
///
/// Empty markers in the input are ignored since padding is derived from
/// the calendar itself. The remaining records must be exactly days
/// `1..=N` in order, each in its true weekday column; anything else is
/// rejected rather than rendered as a partial grid.
#[instrument(skip(records, now), fields(records = records.len()))]
pub fn build_month_grid(
    month: u32,
    year: i32,
    records: &[DayRecord],
    now: NaiveDateTime,
) -> CoreResult<MonthGrid> {
    let days_in_month = datetime::days_in_month(year, month)?;
    let offset = datetime::first_weekday_offset(year, month)? as usize;

    if records.is_empty() {
        return Err(CoreError::malformed(format!(
            "no day records for {year}-{month:02}"
        )));
    }

    let days: Vec<&DayRecord> = records.iter().filter(|r| !r.is_empty_marker()).collect();
    if days.len() != days_in_month as usize {
        return Err(CoreError::malformed(format!(
            "{year}-{month:02} has {days_in_month} days, got {} records",
            days.len()
        )));
    }

    let total = (offset + days.len()).div_ceil(DAYS_PER_WEEK) * DAYS_PER_WEEK;
    let mut cells = Vec::with_capacity(total);
    cells.extend(std::iter::repeat_n(GridCell::Empty, offset));

    for (idx, record) in days.into_iter().enumerate() {
        let expected = idx as u32 + 1;
        let day = record.day.unwrap_or_default();
        if day != expected {
            return Err(CoreError::malformed(format!(
                "{year}-{month:02}: expected day {expected}, got {day}"
            )));
        }

        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
            CoreError::malformed(format!("{year}-{month:02}-{day:02} is not a date"))
        })?;
        let column = date.weekday().num_days_from_sunday();
        if record.weekday != column {
            return Err(CoreError::malformed(format!(
                "{date} is in column {column}, record says {}",
                record.weekday
            )));
        }

        cells.push(GridCell::Day(DayCell {
            date,
            is_current_month: classify::is_current_month(date, year, month),
            tense: DayTense::of(date, now),
            events: record.events.clone(),
            notes: record.notes.clone(),
        }));
    }

    cells.resize(total, GridCell::Empty);

    debug!(
        year,
        month,
        leading = offset,
        cells = cells.len(),
        "built month grid"
    );

    Ok(MonthGrid { year, month, cells })
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, NaiveDate, NaiveDateTime};

    use super::*;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(10, 30, 0))
            .expect("valid instant")
    }

    fn records_for(year: i32, month: u32) -> Vec<DayRecord> {
        let days = datetime::days_in_month(year, month).expect("month length");
        (1..=days)
            .map(|day| {
                let date = NaiveDate::from_ymd_opt(year, month, day).expect("valid day");
                DayRecord::new(day, date.weekday().num_days_from_sunday())
            })
            .collect()
    }

    #[test]
    fn february_2025_has_six_leading_blanks_and_five_weeks() {
        let grid = build_month_grid(2, 2025, &records_for(2025, 2), at(2025, 6, 15))
            .expect("grid");

        assert_eq!(grid.leading_padding(), 6);
        assert_eq!(grid.days().count(), 28);
        assert_eq!(grid.cells.len(), 35);
        assert_eq!(grid.weeks_in_grid(), 5);
        assert_eq!(grid.trailing_padding(), 1);
    }

    #[test]
    fn every_month_fills_whole_weeks() {
        for year in [2024, 2025, 2026] {
            for month in 1..=12 {
                let grid = build_month_grid(month, year, &records_for(year, month), at(2025, 1, 1))
                    .expect("grid");
                let offset = datetime::first_weekday_offset(year, month).expect("offset") as usize;
                let days = datetime::days_in_month(year, month).expect("days") as usize;

                assert_eq!(grid.cells.len() % DAYS_PER_WEEK, 0);
                assert_eq!(grid.weeks_in_grid(), (offset + days).div_ceil(DAYS_PER_WEEK));
                assert_eq!(
                    DAYS_PER_WEEK * grid.weeks_in_grid(),
                    offset + days + grid.trailing_padding()
                );
                assert!(grid.trailing_padding() < DAYS_PER_WEEK);
            }
        }
    }

    #[test]
    fn classifies_cells_against_now() {
        let mut records = records_for(2025, 6);
        records[0].events.push("Children's Day".to_string());
        records[16].notes.push("dentist".to_string());

        let grid = build_month_grid(6, 2025, &records, at(2025, 6, 15)).expect("grid");

        let first = grid.day(1).expect("day 1");
        assert!(first.is_past());
        assert!(first.has_events());
        assert!(!first.has_notes());

        let today = grid.day(15).expect("day 15");
        assert!(today.is_today());
        assert!(!today.is_past());

        let later = grid.day(17).expect("day 17");
        assert_eq!(later.tense, DayTense::Future);
        assert!(later.has_notes());
        assert!(grid.days().all(|cell| cell.is_current_month));
    }

    #[test]
    fn keeps_record_order_and_skips_input_padding() {
        let mut records = vec![DayRecord::empty(0), DayRecord::empty(1)];
        records.extend(records_for(2025, 4));
        records.push(DayRecord::empty(5));

        let grid = build_month_grid(4, 2025, &records, at(2025, 4, 1)).expect("grid");
        let days: Vec<u32> = grid.days().map(DayCell::day).collect();
        assert_eq!(days, (1..=30).collect::<Vec<_>>());
        // 2025-04-01 is a Tuesday.
        assert_eq!(grid.leading_padding(), 2);
    }

    #[test]
    fn empty_cells_are_not_selectable() {
        let grid = build_month_grid(2, 2025, &records_for(2025, 2), at(2025, 2, 1)).expect("grid");
        assert!(!grid.cells[0].is_selectable());
        assert!(grid.cells[6].is_selectable());
    }

    #[test]
    fn empty_input_is_malformed() {
        assert!(matches!(
            build_month_grid(2, 2025, &[], at(2025, 2, 1)),
            Err(CoreError::MalformedCalendarData(_))
        ));
        assert!(matches!(
            build_month_grid(2, 2025, &[DayRecord::empty(0)], at(2025, 2, 1)),
            Err(CoreError::MalformedCalendarData(_))
        ));
    }

    #[test]
    fn refuses_partial_or_garbled_months() {
        let now = at(2025, 3, 1);

        let mut missing = records_for(2025, 3);
        missing.pop();
        assert!(matches!(
            build_month_grid(3, 2025, &missing, now),
            Err(CoreError::MalformedCalendarData(_))
        ));

        let mut swapped = records_for(2025, 3);
        swapped.swap(3, 4);
        assert!(matches!(
            build_month_grid(3, 2025, &swapped, now),
            Err(CoreError::MalformedCalendarData(_))
        ));

        let mut shifted = records_for(2025, 3);
        shifted[0].weekday = (shifted[0].weekday + 1) % 7;
        assert!(matches!(
            build_month_grid(3, 2025, &shifted, now),
            Err(CoreError::MalformedCalendarData(_))
        ));
    }

    #[test]
    fn out_of_range_month_is_invalid_input() {
        assert!(matches!(
            build_month_grid(13, 2025, &records_for(2025, 1), at(2025, 1, 1)),
            Err(CoreError::InvalidDateInput(_))
        ));
    }
}
