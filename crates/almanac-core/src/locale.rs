use std::str::FromStr;

use anyhow::anyhow;
use chrono::{Datelike, NaiveDate};

use crate::datetime::MONTH_NAMES;

const EN_WEEKDAYS: [&str; 7] = ["Su", "Mo", "Tu", "We", "Th", "Fr", "Sa"];
const EN_WEEKDAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];
const ZH_WEEKDAYS: [&str; 7] = ["日", "一", "二", "三", "四", "五", "六"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    Zh,
}

impl FromStr for Locale {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "en-us" | "english" => Ok(Locale::En),
            "zh" | "zh-cn" | "chinese" => Ok(Locale::Zh),
            other => Err(anyhow!("unsupported locale: {other}")),
        }
    }
}

impl Locale {
    /// Column headers, Sunday first.
    pub fn weekday_headers(self) -> [&'static str; 7] {
        match self {
            Locale::En => EN_WEEKDAYS,
            Locale::Zh => ZH_WEEKDAYS,
        }
    }

    pub fn month_title(self, month: u32) -> String {
        match self {
            Locale::En => month
                .checked_sub(1)
                .and_then(|idx| MONTH_NAMES.get(idx as usize))
                .map(|name| name.to_string())
                .unwrap_or_else(|| month.to_string()),
            Locale::Zh => format!("{month}月"),
        }
    }

    /// Clock-line date, e.g. `Sunday, June 15, 2025` or `2025年6月15日 星期日`.
    pub fn long_date(self, date: NaiveDate) -> String {
        let weekday = date.weekday().num_days_from_sunday() as usize;
        match self {
            Locale::En => format!(
                "{}, {} {}, {}",
                EN_WEEKDAY_NAMES[weekday],
                self.month_title(date.month()),
                date.day(),
                date.year()
            ),
            Locale::Zh => format!(
                "{}年{}月{}日 星期{}",
                date.year(),
                date.month(),
                date.day(),
                ZH_WEEKDAYS[weekday]
            ),
        }
    }

    pub fn expired(self) -> &'static str {
        match self {
            Locale::En => "expired",
            Locale::Zh => "已过期",
        }
    }

    pub fn today(self) -> &'static str {
        match self {
            Locale::En => "today",
            Locale::Zh => "今天",
        }
    }

    pub fn days(self, days: i64) -> String {
        match self {
            Locale::En if days == 1 => "1 day".to_string(),
            Locale::En => format!("{days} days"),
            Locale::Zh => format!("{days}天"),
        }
    }

    pub fn days_hours(self, days: i64, hours: i64) -> String {
        match self {
            Locale::En => format!("{days}d {hours}h"),
            Locale::Zh => format!("{days}天{hours}小时"),
        }
    }

    pub fn hours_minutes(self, hours: i64, minutes: i64) -> String {
        match self {
            Locale::En => format!("{hours}h {minutes}m"),
            Locale::Zh => format!("{hours}小时{minutes}分钟"),
        }
    }

    pub fn minutes(self, minutes: i64) -> String {
        match self {
            Locale::En => format!("{minutes}m"),
            Locale::Zh => format!("{minutes}分钟"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_date_matches_clock_line_formats() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 15).expect("valid date");
        assert_eq!(Locale::Zh.long_date(date), "2025年6月15日 星期日");
        assert_eq!(Locale::En.long_date(date), "Sunday, June 15, 2025");
    }

    #[test]
    fn parses_locale_names() {
        assert_eq!("zh".parse::<Locale>().expect("zh"), Locale::Zh);
        assert_eq!(" EN ".parse::<Locale>().expect("en"), Locale::En);
        assert!("fr".parse::<Locale>().is_err());
    }
}
