//! Year view state: per-month grids, fetch bookkeeping and day selection.
//!
//! Month fetches are independent and run concurrently. Every response is
//! tagged with the generation of the displayed set it was issued for, and
//! responses from an older generation are dropped instead of overwriting
//! newer data.

use std::collections::BTreeMap;
use std::thread;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use tracing::{debug, info, instrument, warn};

use crate::calendar::{CalendarSource, DayRecord, MonthPayload, fetch_month};
use crate::countdown::{CountdownFormatter, CountdownResult};
use crate::datetime::Moment;
use crate::error::{CoreError, CoreResult};
use crate::grid::{GridCell, MonthGrid, build_month_grid};
use crate::progress::{ProgressMetric, progress_metric};

#[derive(Debug, Clone, PartialEq)]
pub enum MonthState {
    Loaded {
        records: Vec<DayRecord>,
        grid: MonthGrid,
    },
    Failed(CoreError),
}

impl MonthState {
    pub fn grid(&self) -> Option<&MonthGrid> {
        match self {
            MonthState::Loaded { grid, .. } => Some(grid),
            MonthState::Failed(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthResponse {
    pub year: i32,
    pub month: u32,
    pub generation: u64,
    pub result: CoreResult<MonthPayload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormTab {
    #[default]
    Events,
    Memo,
}

/// Prefill state of the event and note forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormState {
    pub event_date: Option<NaiveDate>,
    pub memo_date: Option<NaiveDate>,
    pub active_tab: FormTab,
}

impl FormState {
    /// Picking a day prefills both forms and switches to the memo tab.
    pub fn select(self, date: NaiveDate) -> Self {
        Self {
            event_date: Some(date),
            memo_date: Some(date),
            active_tab: FormTab::Memo,
        }
    }

    /// Forms are blanked after a successful submit; the tab stays put.
    pub fn submitted(self) -> Self {
        Self {
            event_date: None,
            memo_date: None,
            active_tab: self.active_tab,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CalendarView {
    year: i32,
    generation: u64,
    months: BTreeMap<u32, MonthState>,
    countdown: CountdownFormatter,
}

impl CalendarView {
    pub fn new(year: i32, countdown: CountdownFormatter) -> Self {
        Self {
            year,
            generation: 0,
            months: BTreeMap::new(),
            countdown,
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn countdown_formatter(&self) -> &CountdownFormatter {
        &self.countdown
    }

    pub fn month(&self, month: u32) -> Option<&MonthState> {
        self.months.get(&month)
    }

    pub fn months(&self) -> impl Iterator<Item = (u32, &MonthState)> {
        self.months.iter().map(|(month, state)| (*month, state))
    }

    /// Switch the displayed year. Anything in flight for the old year
    /// becomes stale.
    #[instrument(skip(self))]
    pub fn navigate(&mut self, year: i32) {
        self.year = year;
        self.generation += 1;
        self.months.clear();
        debug!(generation = self.generation, "navigated");
    }

    /// Issue one request per month of the displayed year, concurrently.
    #[instrument(skip(self, source), fields(year = self.year, generation = self.generation))]
    pub fn fetch_all<S>(&self, source: &S) -> Vec<MonthResponse>
    where
        S: CalendarSource + Sync + ?Sized,
    {
        let year = self.year;
        let generation = self.generation;

        thread::scope(|scope| {
            let handles: Vec<_> = (1..=12_u32)
                .map(|month| (month, scope.spawn(move || fetch_month(source, year, month))))
                .collect();

            handles
                .into_iter()
                .map(|(month, handle)| {
                    let result = handle.join().unwrap_or_else(|_| {
                        Err(CoreError::network(format!(
                            "fetch worker for {year}-{month:02} panicked"
                        )))
                    });
                    MonthResponse {
                        year,
                        month,
                        generation,
                        result,
                    }
                })
                .collect()
        })
    }

    /// Apply one response. Returns `false` when it was stale and dropped.
    #[instrument(skip(self, response, now), fields(year = response.year, month = response.month))]
    pub fn apply(&mut self, response: MonthResponse, now: NaiveDateTime) -> bool {
        if response.generation != self.generation || response.year != self.year {
            debug!(
                response_generation = response.generation,
                current_generation = self.generation,
                "dropping stale month response"
            );
            return false;
        }

        let month = response.month;
        let state = match response
            .result
            .and_then(|payload| self.grid_state(month, payload.days, now))
        {
            Ok(state) => state,
            Err(err) => {
                warn!(error = %err, "month failed to load");
                MonthState::Failed(err)
            }
        };
        self.months.insert(month, state);
        true
    }

    /// Fetch and apply every month. Returns how many months loaded cleanly.
    #[instrument(skip(self, source, now))]
    pub fn refresh<S>(&mut self, source: &S, now: NaiveDateTime) -> usize
    where
        S: CalendarSource + Sync + ?Sized,
    {
        for response in self.fetch_all(source) {
            self.apply(response, now);
        }
        let loaded = self
            .months
            .values()
            .filter(|state| matches!(state, MonthState::Loaded { .. }))
            .count();
        info!(year = self.year, loaded, "refreshed calendar view");
        loaded
    }

    /// Re-classify cached records against a new `now` without refetching.
    pub fn reclassify(&mut self, now: NaiveDateTime) {
        let year = self.year;
        for (month, state) in self.months.iter_mut() {
            let MonthState::Loaded { records, .. } = state else {
                continue;
            };
            match build_month_grid(*month, year, records, now) {
                Ok(rebuilt) => {
                    if let MonthState::Loaded { grid, .. } = state {
                        *grid = rebuilt;
                    }
                }
                Err(err) => *state = MonthState::Failed(err),
            }
        }
    }

    pub fn progress(&self, now: NaiveDateTime) -> CoreResult<ProgressMetric> {
        progress_metric(now, self.year)
    }

    /// Countdowns for `events` falling in the displayed year, in date order.
    pub fn countdowns<'e, I>(&self, events: I, now: NaiveDateTime) -> Vec<(NaiveDate, &'e str, CountdownResult)>
    where
        I: IntoIterator<Item = (&'e NaiveDate, &'e String)>,
    {
        let mut out: Vec<_> = events
            .into_iter()
            .filter(|(date, _)| date.year() == self.year)
            .map(|(date, description)| {
                (
                    *date,
                    description.as_str(),
                    self.countdown.format(Moment::Date(*date), now),
                )
            })
            .collect();
        out.sort_by_key(|(date, _, _)| *date);
        out
    }

    /// Select a day in a loaded month. Padding and unloaded months cannot
    /// be selected.
    pub fn select(&self, form: FormState, date: NaiveDate) -> CoreResult<FormState> {
        if date.year() != self.year {
            return Err(CoreError::invalid_date(format!(
                "{date} is outside the displayed year {}",
                self.year
            )));
        }

        let state = self
            .months
            .get(&date.month())
            .ok_or_else(|| CoreError::invalid_date(format!("{date}: month not loaded")))?;
        let grid = match state {
            MonthState::Loaded { grid, .. } => grid,
            MonthState::Failed(err) => return Err(err.clone()),
        };

        let selectable = grid
            .cells
            .iter()
            .filter(|cell| cell.is_selectable())
            .filter_map(GridCell::as_day)
            .any(|cell| cell.date == date);
        if !selectable {
            return Err(CoreError::invalid_date(format!("{date} is not selectable")));
        }
        Ok(form.select(date))
    }

    fn grid_state(&self, month: u32, days: Vec<DayRecord>, now: NaiveDateTime) -> CoreResult<MonthState> {
        let grid = build_month_grid(month, self.year, &days, now)?;
        Ok(MonthState::Loaded {
            records: days,
            grid,
        })
    }
}
