//! In-process calendar endpoint over the local events and notes stores.
//!
//! Produces the same JSON shape a remote calendar service answers with, so
//! the view consumes local and remote data through one validation path.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::calendar::{CalendarSource, MonthInfo};
use crate::datastore::DataStore;
use crate::datetime;
use crate::error::{CoreError, CoreResult};
use crate::grid::DAYS_PER_WEEK;
use crate::locale::Locale;

struct Holiday {
    month: u32,
    day: u32,
    en: &'static str,
    zh: &'static str,
}

const HOLIDAYS_YEAR: i32 = 2025;

const HOLIDAYS_2025: [Holiday; 9] = [
    Holiday { month: 1, day: 1, en: "New Year's Day", zh: "元旦" },
    Holiday { month: 1, day: 29, en: "Spring Festival", zh: "春节" },
    Holiday { month: 2, day: 14, en: "Valentine's Day", zh: "情人节" },
    Holiday { month: 4, day: 5, en: "Qingming Festival", zh: "清明节" },
    Holiday { month: 5, day: 1, en: "Labour Day", zh: "劳动节" },
    Holiday { month: 6, day: 22, en: "Dragon Boat Festival", zh: "端午节" },
    Holiday { month: 9, day: 29, en: "Mid-Autumn Festival", zh: "中秋节" },
    Holiday { month: 10, day: 1, en: "National Day", zh: "国庆节" },
    Holiday { month: 12, day: 25, en: "Christmas", zh: "圣诞节" },
];

/// Built-in holidays for `year`. Only the 2025 table exists.
pub fn default_events(year: i32, locale: Locale) -> BTreeMap<NaiveDate, String> {
    if year != HOLIDAYS_YEAR {
        return BTreeMap::new();
    }
    HOLIDAYS_2025
        .iter()
        .filter_map(|h| {
            let date = NaiveDate::from_ymd_opt(year, h.month, h.day)?;
            let name = match locale {
                Locale::En => h.en,
                Locale::Zh => h.zh,
            };
            Some((date, name.to_string()))
        })
        .collect()
}

pub struct LocalBackend<'a> {
    store: &'a DataStore,
    holidays: bool,
    locale: Locale,
    today: NaiveDate,
}

impl<'a> LocalBackend<'a> {
    pub fn new(store: &'a DataStore, holidays: bool, locale: Locale, today: NaiveDate) -> Self {
        Self {
            store,
            holidays,
            locale,
            today,
        }
    }

    /// User events layered over the built-in holidays for `year`.
    pub fn merged_events(&self, year: i32) -> CoreResult<BTreeMap<NaiveDate, String>> {
        let mut all = if self.holidays {
            default_events(year, self.locale)
        } else {
            BTreeMap::new()
        };
        let user = self
            .store
            .list_events()
            .map_err(|err| CoreError::network(format!("{err:#}")))?;
        all.extend(user);
        Ok(all)
    }
}

impl CalendarSource for LocalBackend<'_> {
    #[instrument(skip(self))]
    fn calendar(&self, year: i32, month: u32) -> CoreResult<Value> {
        let days = datetime::days_in_month(year, month)?;
        let offset = datetime::first_weekday_offset(year, month)? as usize;

        let events = self.merged_events(year)?;
        let notes = self
            .store
            .list_notes()
            .map_err(|err| CoreError::network(format!("{err:#}")))?;

        let mut slots: Vec<Value> = Vec::new();
        slots.extend((0..offset).map(|_| empty_slot()));
        for day in 1..=days {
            let date = datetime::first_day_of_month(year, month)?.with_day(day).ok_or_else(|| {
                CoreError::invalid_date(format!("{year}-{month:02}-{day:02}"))
            })?;
            let day_events: Vec<&str> = events.get(&date).map(String::as_str).into_iter().collect();
            let day_notes: Vec<&str> = notes
                .iter()
                .filter(|note| note.date == date)
                .map(|note| note.content.as_str())
                .collect();
            slots.push(json!({
                "day": day,
                "events": day_events,
                "notes": day_notes,
                "is_today": date == self.today,
            }));
        }
        while slots.len() % DAYS_PER_WEEK != 0 {
            slots.push(empty_slot());
        }

        let weeks: Vec<Value> = slots
            .chunks(DAYS_PER_WEEK)
            .map(|week| Value::Array(week.to_vec()))
            .collect();

        let info = MonthInfo {
            year,
            month,
            month_name: datetime::month_name(month)?.to_string(),
            prev_month: datetime::previous_month(year, month),
            next_month: datetime::next_month(year, month),
        };

        debug!(weeks = weeks.len(), "served calendar month");
        Ok(json!({
            "calendar": weeks,
            "month_info": info,
        }))
    }
}

fn empty_slot() -> Value {
    json!({
        "day": "",
        "events": [],
        "notes": [],
        "is_today": false,
    })
}
