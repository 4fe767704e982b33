//! Remaining time until a target, bucketed into display tiers.
//!
//! Two granularity policies exist and a formatter holds exactly one of
//! them for its lifetime:
//!
//! * [`CountdownPolicy::WholeDays`] counts remaining days rounded up. A
//!   zero count is `today`, at most three is `upcoming`, more is `normal`.
//! * [`CountdownPolicy::Cascade`] counts whole days rounded down and falls
//!   through to hours (`soon`) and then minutes (`imminent`) once less
//!   than a day remains.
//!
//! Whole-day targets are measured from the start of `now`'s day, so a date
//! target equal to today's date is `today` for the whole day.

use std::str::FromStr;

use anyhow::anyhow;
use chrono::{NaiveDateTime, NaiveTime};

use crate::datetime::Moment;
use crate::locale::Locale;

const MS_PER_MINUTE: i64 = 60_000;
const MS_PER_HOUR: i64 = 3_600_000;
const MS_PER_DAY: i64 = 86_400_000;

/// Day counts at or below this are `upcoming`.
pub const UPCOMING_DAYS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CountdownTier {
    Expired,
    Today,
    Imminent,
    Soon,
    Upcoming,
    Normal,
}

impl CountdownTier {
    pub fn as_str(self) -> &'static str {
        match self {
            CountdownTier::Expired => "expired",
            CountdownTier::Today => "today",
            CountdownTier::Imminent => "imminent",
            CountdownTier::Soon => "soon",
            CountdownTier::Upcoming => "upcoming",
            CountdownTier::Normal => "normal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountdownPolicy {
    #[default]
    WholeDays,
    Cascade,
}

impl FromStr for CountdownPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "days" | "whole-days" | "day" => Ok(CountdownPolicy::WholeDays),
            "cascade" | "dhm" => Ok(CountdownPolicy::Cascade),
            other => Err(anyhow!(
                "invalid countdown.policy: {other} (expected days or cascade)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownResult {
    pub label: String,
    pub tier: CountdownTier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CountdownFormatter {
    policy: CountdownPolicy,
    locale: Locale,
}

impl CountdownFormatter {
    pub fn new(policy: CountdownPolicy, locale: Locale) -> Self {
        Self { policy, locale }
    }

    pub fn policy(&self) -> CountdownPolicy {
        self.policy
    }

    pub fn format(&self, target: Moment, now: NaiveDateTime) -> CountdownResult {
        format_countdown(target, now, self.policy, self.locale)
    }
}

pub fn format_countdown(
    target: Moment,
    now: NaiveDateTime,
    policy: CountdownPolicy,
    locale: Locale,
) -> CountdownResult {
    let reference = match target {
        Moment::Date(_) => now.date().and_time(NaiveTime::MIN),
        Moment::At(_) => now,
    };
    let diff = (target.instant() - reference).num_milliseconds();

    if diff < 0 {
        return CountdownResult {
            label: locale.expired().to_string(),
            tier: CountdownTier::Expired,
        };
    }

    match policy {
        CountdownPolicy::WholeDays => whole_days(diff, locale),
        CountdownPolicy::Cascade => cascade(diff, locale),
    }
}

fn whole_days(diff: i64, locale: Locale) -> CountdownResult {
    let days = ceil_div(diff, MS_PER_DAY);
    if days == 0 {
        return CountdownResult {
            label: locale.today().to_string(),
            tier: CountdownTier::Today,
        };
    }

    CountdownResult {
        label: locale.days(days),
        tier: day_tier(days),
    }
}

fn cascade(diff: i64, locale: Locale) -> CountdownResult {
    if diff == 0 {
        return CountdownResult {
            label: locale.today().to_string(),
            tier: CountdownTier::Today,
        };
    }

    let days = diff / MS_PER_DAY;
    let hours = (diff % MS_PER_DAY) / MS_PER_HOUR;

    if days > 0 {
        let label = if hours == 0 {
            locale.days(days)
        } else {
            locale.days_hours(days, hours)
        };
        return CountdownResult {
            label,
            tier: day_tier(days),
        };
    }

    if hours > 0 {
        let minutes = (diff % MS_PER_HOUR) / MS_PER_MINUTE;
        return CountdownResult {
            label: locale.hours_minutes(hours, minutes),
            tier: CountdownTier::Soon,
        };
    }

    // Minutes round up, so a remainder just under the hour reads as one hour.
    let minutes = ceil_div(diff, MS_PER_MINUTE);
    if minutes >= 60 {
        return CountdownResult {
            label: locale.hours_minutes(1, 0),
            tier: CountdownTier::Soon,
        };
    }

    CountdownResult {
        label: locale.minutes(minutes),
        tier: CountdownTier::Imminent,
    }
}

// Both operands are non-negative here.
fn ceil_div(value: i64, unit: i64) -> i64 {
    (value + unit - 1) / unit
}

fn day_tier(days: i64) -> CountdownTier {
    if days <= UPCOMING_DAYS {
        CountdownTier::Upcoming
    } else {
        CountdownTier::Normal
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        date(y, m, d).and_hms_opt(h, min, 0).expect("valid instant")
    }

    fn days_formatter() -> CountdownFormatter {
        CountdownFormatter::new(CountdownPolicy::WholeDays, Locale::En)
    }

    fn cascade_formatter() -> CountdownFormatter {
        CountdownFormatter::new(CountdownPolicy::Cascade, Locale::En)
    }

    #[test]
    fn same_date_is_today() {
        let now = at(2025, 6, 15, 0, 0);
        let result = days_formatter().format(Moment::Date(date(2025, 6, 15)), now);
        assert_eq!(result.tier, CountdownTier::Today);
        assert_eq!(result.label, "today");

        let afternoon = at(2025, 6, 15, 16, 45);
        let result = days_formatter().format(Moment::Date(date(2025, 6, 15)), afternoon);
        assert_eq!(result.tier, CountdownTier::Today);
    }

    #[test]
    fn two_days_out_is_upcoming() {
        let now = at(2025, 6, 15, 0, 0);
        let result = days_formatter().format(Moment::Date(date(2025, 6, 17)), now);
        assert_eq!(result.tier, CountdownTier::Upcoming);
        assert_eq!(result.label, "2 days");
    }

    #[test]
    fn past_date_is_expired() {
        let now = at(2025, 6, 15, 0, 0);
        let result = days_formatter().format(Moment::Date(date(2025, 6, 1)), now);
        assert_eq!(result.tier, CountdownTier::Expired);
        assert_eq!(result.label, "expired");
    }

    #[test]
    fn whole_days_round_up() {
        let now = at(2025, 6, 15, 0, 0);
        let f = days_formatter();
        assert_eq!(f.format(Moment::Date(date(2025, 6, 18)), now).tier, CountdownTier::Upcoming);
        let four = f.format(Moment::Date(date(2025, 6, 19)), now);
        assert_eq!(four.tier, CountdownTier::Normal);
        assert_eq!(four.label, "4 days");

        // One minute left still counts as a day.
        let almost = f.format(Moment::At(at(2025, 6, 15, 0, 1)), now);
        assert_eq!(almost.label, "1 day");
        assert_eq!(almost.tier, CountdownTier::Upcoming);
    }

    #[test]
    fn cascade_splits_sub_day_remainders() {
        let now = at(2025, 6, 15, 9, 0);
        let f = cascade_formatter();

        let soon = f.format(Moment::At(at(2025, 6, 15, 12, 20)), now);
        assert_eq!(soon.tier, CountdownTier::Soon);
        assert_eq!(soon.label, "3h 20m");

        let imminent = f.format(Moment::At(at(2025, 6, 15, 9, 45)), now);
        assert_eq!(imminent.tier, CountdownTier::Imminent);
        assert_eq!(imminent.label, "45m");

        let later = f.format(Moment::At(at(2025, 6, 17, 11, 0)), now);
        assert_eq!(later.tier, CountdownTier::Upcoming);
        assert_eq!(later.label, "2d 2h");

        let expired = f.format(Moment::At(at(2025, 6, 15, 8, 59)), now);
        assert_eq!(expired.tier, CountdownTier::Expired);
    }

    #[test]
    fn cascade_label_and_tier_agree_just_under_an_hour() {
        let now = at(2025, 6, 15, 9, 0);
        let f = cascade_formatter();

        let target = now + chrono::Duration::seconds(59 * 60 + 30);
        let result = f.format(Moment::At(target), now);
        assert_eq!(result.tier, CountdownTier::Soon);
        assert_eq!(result.label, "1h 0m");

        let target = now + chrono::Duration::seconds(58 * 60 + 30);
        let result = f.format(Moment::At(target), now);
        assert_eq!(result.tier, CountdownTier::Imminent);
        assert_eq!(result.label, "59m");

        let target = now + chrono::Duration::seconds(20);
        assert_eq!(f.format(Moment::At(target), now).label, "1m");
    }

    #[test]
    fn cascade_keeps_date_scenarios() {
        let now = at(2025, 6, 15, 0, 0);
        let f = cascade_formatter();
        assert_eq!(f.format(Moment::Date(date(2025, 6, 15)), now).tier, CountdownTier::Today);
        assert_eq!(f.format(Moment::Date(date(2025, 6, 17)), now).tier, CountdownTier::Upcoming);
        assert_eq!(f.format(Moment::Date(date(2025, 6, 1)), now).tier, CountdownTier::Expired);
    }

    #[test]
    fn formatting_is_idempotent() {
        let now = at(2025, 6, 15, 9, 0);
        for f in [days_formatter(), cascade_formatter()] {
            for target in [
                Moment::Date(date(2025, 6, 20)),
                Moment::At(at(2025, 6, 15, 9, 30)),
                Moment::Date(date(2025, 1, 1)),
            ] {
                assert_eq!(f.format(target, now), f.format(target, now));
            }
        }
    }

    #[test]
    fn labels_follow_locale() {
        let now = at(2025, 6, 15, 0, 0);
        let f = CountdownFormatter::new(CountdownPolicy::WholeDays, Locale::Zh);
        assert_eq!(f.format(Moment::Date(date(2025, 6, 17)), now).label, "2天");
        assert_eq!(f.format(Moment::Date(date(2025, 6, 15)), now).label, "今天");
        assert_eq!(f.format(Moment::Date(date(2025, 6, 1)), now).label, "已过期");
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!("days".parse::<CountdownPolicy>().expect("days"), CountdownPolicy::WholeDays);
        assert_eq!("Cascade".parse::<CountdownPolicy>().expect("cascade"), CountdownPolicy::Cascade);
        assert!("hourly".parse::<CountdownPolicy>().is_err());
    }
}
