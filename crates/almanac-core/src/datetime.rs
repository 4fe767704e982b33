use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::sync::OnceLock;

use chrono::{
  DateTime,
  Datelike,
  Duration,
  Local,
  NaiveDate,
  NaiveDateTime,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

use crate::error::{
  CoreError,
  CoreResult
};

const TIMEZONE_CONFIG_FILE: &str =
  "almanac-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "ALMANAC_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "ALMANAC_TIME_CONFIG";

pub const MONTH_NAMES: [&str; 12] = [
  "January",
  "February",
  "March",
  "April",
  "May",
  "June",
  "July",
  "August",
  "September",
  "October",
  "November",
  "December"
];

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// A point in time as the user wrote
/// it: either a whole calendar day or
/// a wall-clock instant.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum Moment {
  Date(NaiveDate),
  At(NaiveDateTime)
}

impl Moment {
  #[must_use]
  pub fn date(&self) -> NaiveDate {
    match self {
      | Moment::Date(date) => *date,
      | Moment::At(at) => at.date()
    }
  }

  /// Midnight for whole days, the
  /// exact instant otherwise.
  #[must_use]
  pub fn instant(
    &self
  ) -> NaiveDateTime {
    match self {
      | Moment::Date(date) => {
        date.and_time(
          chrono::NaiveTime::MIN
        )
      }
      | Moment::At(at) => *at
    }
  }
}

/// Timezone pinned through
/// `ALMANAC_TIMEZONE` or
/// `almanac-time.toml`. `None` means
/// the system local zone.
pub fn configured_timezone()
-> Option<&'static Tz> {
  static CONFIGURED_TZ: OnceLock<
    Option<Tz>
  > = OnceLock::new();
  CONFIGURED_TZ
    .get_or_init(resolve_timezone)
    .as_ref()
}

/// Wall-clock "now" in the client zone.
#[must_use]
pub fn local_now() -> NaiveDateTime {
  to_local(Utc::now())
}

#[must_use]
pub fn to_local(
  dt: DateTime<Utc>
) -> NaiveDateTime {
  match configured_timezone() {
    | Some(tz) => {
      dt.with_timezone(tz).naive_local()
    }
    | None => {
      dt.with_timezone(&Local)
        .naive_local()
    }
  }
}

fn resolve_timezone() -> Option<Tz> {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(&raw, TIMEZONE_ENV_VAR)
  {
    return Some(tz);
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return Some(tz);
  }

  tracing::debug!(
    "no timezone configured; using \
     system local zone"
  );
  None
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &Path
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured client timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

pub fn first_day_of_month(
  year: i32,
  month: u32
) -> CoreResult<NaiveDate> {
  NaiveDate::from_ymd_opt(
    year, month, 1
  )
  .ok_or_else(|| {
    CoreError::invalid_date(format!(
      "no such month: {year}-{month:02}"
    ))
  })
}

pub fn days_in_month(
  year: i32,
  month: u32
) -> CoreResult<u32> {
  let (next_year, next_month) =
    next_month(year, month);
  let first =
    first_day_of_month(year, month)?;
  let next = first_day_of_month(
    next_year, next_month
  )?;
  Ok(
    next.signed_duration_since(first)
      .num_days() as u32
  )
}

/// Column of day 1 in a Sunday-first
/// week.
pub fn first_weekday_offset(
  year: i32,
  month: u32
) -> CoreResult<u32> {
  Ok(
    first_day_of_month(year, month)?
      .weekday()
      .num_days_from_sunday()
  )
}

#[must_use]
pub fn previous_month(
  year: i32,
  month: u32
) -> (i32, u32) {
  if month <= 1 {
    (year.saturating_sub(1), 12)
  } else {
    (year, month - 1)
  }
}

#[must_use]
pub fn next_month(
  year: i32,
  month: u32
) -> (i32, u32) {
  if month >= 12 {
    (year.saturating_add(1), 1)
  } else {
    (year, month + 1)
  }
}

pub fn month_name(
  month: u32
) -> CoreResult<&'static str> {
  month
    .checked_sub(1)
    .and_then(|idx| {
      MONTH_NAMES.get(idx as usize)
    })
    .copied()
    .ok_or_else(|| {
      CoreError::invalid_date(format!(
        "month out of range: {month}"
      ))
    })
}

/// Strict `YYYY-MM-DD`, the key format
/// of the events and notes stores.
pub fn parse_calendar_date(
  input: &str
) -> CoreResult<NaiveDate> {
  NaiveDate::parse_from_str(
    input.trim(),
    "%Y-%m-%d"
  )
  .map_err(|err| {
    CoreError::invalid_date(format!(
      "{input:?}: {err}"
    ))
  })
}

#[tracing::instrument(skip(now), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  now: NaiveDateTime
) -> CoreResult<Moment> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();
  let today = now.date();

  match lower.as_str() {
    | "now" => return Ok(Moment::At(now)),
    | "today" => {
      return Ok(Moment::Date(today));
    }
    | "tomorrow" => {
      return Ok(Moment::Date(
        add_days(today, 1)?
      ));
    }
    | "yesterday" => {
      return Ok(Moment::Date(
        add_days(today, -1)?
      ));
    }
    | _ => {}
  }

  if let Some(target_weekday) =
    parse_weekday_name(&lower)
  {
    return Ok(Moment::Date(
      next_weekday_date(
        today,
        target_weekday
      )?
    ));
  }

  let rel_re = Regex::new(
    r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dhm])$"
  )
  .map_err(|e| {
    CoreError::invalid_date(format!(
      "internal regex compile failure: {e}"
    ))
  })?;

  if let Some(caps) =
    rel_re.captures(token)
  {
    let negative = caps
      .name("sign")
      .is_some_and(|m| m.as_str() == "-");
    let num: i64 = caps
      .name("num")
      .map(|m| m.as_str())
      .unwrap_or_default()
      .parse()
      .map_err(|_| {
        CoreError::invalid_date(format!(
          "relative amount out of range: {input}"
        ))
      })?;
    let num =
      if negative { -num } else { num };

    return match caps
      .name("unit")
      .map(|m| m.as_str())
    {
      | Some("d") => {
        Ok(Moment::Date(add_days(
          today, num
        )?))
      }
      | Some("h") => {
        shift_instant(
          now,
          Duration::try_hours(num),
          input
        )
      }
      | Some("m") => {
        shift_instant(
          now,
          Duration::try_minutes(num),
          input
        )
      }
      | _ => {
        Err(CoreError::invalid_date(
          format!(
            "unknown relative unit: {input}"
          )
        ))
      }
    };
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(Moment::At(to_local(
      dt.with_timezone(&Utc)
    )));
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return Ok(Moment::Date(date));
  }

  for fmt in [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M"
  ] {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return Ok(Moment::At(ndt));
    }
  }

  Err(CoreError::invalid_date(format!(
    "unrecognized date expression \
     {input:?} (supported: \
     now/today/tomorrow/yesterday, \
     weekday names, +Nd/+Nh/+Nm, \
     RFC3339, YYYY-MM-DD, \
     YYYY-MM-DD HH:MM[:SS])"
  )))
}

fn add_days(
  date: NaiveDate,
  days: i64
) -> CoreResult<NaiveDate> {
  Duration::try_days(days)
    .and_then(|delta| {
      date.checked_add_signed(delta)
    })
    .ok_or_else(|| {
      CoreError::invalid_date(format!(
        "{date} {days:+} days is out of range"
      ))
    })
}

fn shift_instant(
  now: NaiveDateTime,
  delta: Option<Duration>,
  input: &str
) -> CoreResult<Moment> {
  delta
    .and_then(|delta| {
      now.checked_add_signed(delta)
    })
    .map(Moment::At)
    .ok_or_else(|| {
      CoreError::invalid_date(format!(
        "relative offset out of range: {input}"
      ))
    })
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> CoreResult<NaiveDate> {
  let from_idx = from
    .weekday()
    .num_days_from_sunday()
    as i64;
  let target_idx =
    target.num_days_from_sunday()
      as i64;
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  add_days(from, delta)
}
