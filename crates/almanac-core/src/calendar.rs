//! Wire shape of the calendar endpoint and its validation.
//!
//! The endpoint answers `calendar(year, month)` with either
//! `{"calendar": [...], "month_info": {...}}` or `{"error": "..."}`. The
//! `calendar` field is accepted as a list of weeks (each a list of up to
//! seven day objects, Sunday first) or as a flat list of day objects that
//! carry their own `weekday`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};

/// One calendar day as supplied by the backend. `day == None` is an empty
/// padding slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayRecord {
    pub day: Option<u32>,
    /// 0 = Sunday .. 6 = Saturday.
    pub weekday: u32,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl DayRecord {
    pub fn new(day: u32, weekday: u32) -> Self {
        Self {
            day: Some(day),
            weekday,
            events: vec![],
            notes: vec![],
        }
    }

    pub fn empty(weekday: u32) -> Self {
        Self {
            day: None,
            weekday,
            events: vec![],
            notes: vec![],
        }
    }

    pub fn is_empty_marker(&self) -> bool {
        self.day.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthInfo {
    pub year: i32,
    pub month: u32,
    pub month_name: String,
    pub prev_month: (i32, u32),
    pub next_month: (i32, u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthPayload {
    pub info: Option<MonthInfo>,
    pub days: Vec<DayRecord>,
}

/// Source of per-month calendar payloads. Implementations may be remote;
/// transport problems surface as [`CoreError::NetworkFailure`].
pub trait CalendarSource {
    fn calendar(&self, year: i32, month: u32) -> CoreResult<Value>;
}

/// Fetch and validate one month.
#[tracing::instrument(skip(source))]
pub fn fetch_month<S>(source: &S, year: i32, month: u32) -> CoreResult<MonthPayload>
where
    S: CalendarSource + ?Sized,
{
    let raw = source.calendar(year, month)?;
    let payload = parse_calendar_payload(&raw)?;

    if let Some(info) = &payload.info
        && (info.year != year || info.month != month)
    {
        return Err(CoreError::malformed(format!(
            "asked for {year}-{month:02}, backend answered {}-{:02}",
            info.year, info.month
        )));
    }

    Ok(payload)
}

#[tracing::instrument(skip(value))]
pub fn parse_calendar_payload(value: &Value) -> CoreResult<MonthPayload> {
    let Some(obj) = value.as_object() else {
        return Err(CoreError::malformed("payload is not an object"));
    };

    if let Some(err) = obj.get("error") {
        let msg = err
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        warn!(error = %msg, "backend returned an error payload");
        return Err(CoreError::network(msg));
    }

    let calendar = obj
        .get("calendar")
        .ok_or_else(|| CoreError::malformed("missing calendar field"))?;
    let entries = calendar
        .as_array()
        .ok_or_else(|| CoreError::malformed("calendar is not an array"))?;
    if entries.is_empty() {
        return Err(CoreError::malformed("calendar is empty"));
    }

    let days = if entries.iter().all(Value::is_array) {
        parse_weeks(entries)?
    } else if entries.iter().all(Value::is_object) {
        parse_flat(entries)?
    } else {
        return Err(CoreError::malformed(
            "calendar mixes weeks and day objects",
        ));
    };

    let info = match obj.get("month_info") {
        Some(Value::Null) | None => None,
        Some(raw) => Some(
            serde_json::from_value::<MonthInfo>(raw.clone())
                .map_err(|err| CoreError::malformed(format!("month_info: {err}")))?,
        ),
    };

    debug!(records = days.len(), "parsed calendar payload");
    Ok(MonthPayload { info, days })
}

fn parse_weeks(weeks: &[Value]) -> CoreResult<Vec<DayRecord>> {
    let mut out = Vec::with_capacity(weeks.len() * 7);
    for (week_idx, week) in weeks.iter().enumerate() {
        let slots = week.as_array().map(Vec::as_slice).unwrap_or_default();
        if slots.len() > 7 {
            return Err(CoreError::malformed(format!(
                "week {} has {} slots",
                week_idx + 1,
                slots.len()
            )));
        }
        for (weekday, slot) in slots.iter().enumerate() {
            out.push(parse_day(slot, Some(weekday as u32))?);
        }
    }
    Ok(out)
}

fn parse_flat(days: &[Value]) -> CoreResult<Vec<DayRecord>> {
    days.iter().map(|slot| parse_day(slot, None)).collect()
}

fn parse_day(slot: &Value, position: Option<u32>) -> CoreResult<DayRecord> {
    let obj = slot
        .as_object()
        .ok_or_else(|| CoreError::malformed(format!("day slot is not an object: {slot}")))?;

    let day = match obj.get("day") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::Number(n)) => Some(
            n.as_u64()
                .filter(|d| (1..=31).contains(d))
                .ok_or_else(|| CoreError::malformed(format!("day out of range: {n}")))?
                as u32,
        ),
        Some(other) => {
            return Err(CoreError::malformed(format!("unexpected day value: {other}")));
        }
    };

    let weekday = match (position, obj.get("weekday").and_then(Value::as_u64)) {
        (Some(pos), Some(field)) if u64::from(pos) != field => {
            return Err(CoreError::malformed(format!(
                "weekday field {field} disagrees with column {pos}"
            )));
        }
        (Some(pos), _) => pos,
        (None, Some(field)) if field <= 6 => field as u32,
        (None, Some(field)) => {
            return Err(CoreError::malformed(format!("weekday out of range: {field}")));
        }
        (None, None) => {
            return Err(CoreError::malformed("flat day record is missing weekday"));
        }
    };

    Ok(DayRecord {
        day,
        weekday,
        events: parse_strings(obj.get("events"), "events")?,
        notes: parse_strings(obj.get("notes"), "notes")?,
    })
}

// A bare string is a single annotation.
fn parse_strings(value: Option<&Value>, field: &str) -> CoreResult<Vec<String>> {
    match value {
        None | Some(Value::Null) => Ok(vec![]),
        Some(Value::String(s)) if s.is_empty() => Ok(vec![]),
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    CoreError::malformed(format!("{field} entry is not a string: {item}"))
                })
            })
            .collect(),
        Some(other) => Err(CoreError::malformed(format!(
            "{field} is not a list: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_nested_weeks_with_empty_markers() {
        let payload = json!({
            "calendar": [[
                {"day": "", "events": [], "notes": []},
                {"day": 1, "events": ["New Year"], "notes": ["call mom"], "is_today": false},
                {"day": 2, "events": [], "notes": []}
            ]],
            "month_info": {
                "year": 2025, "month": 1, "month_name": "January",
                "prev_month": [2024, 12], "next_month": [2025, 2]
            }
        });

        let parsed = parse_calendar_payload(&payload).expect("valid payload");
        assert_eq!(parsed.days.len(), 3);
        assert!(parsed.days[0].is_empty_marker());
        assert_eq!(parsed.days[1].day, Some(1));
        assert_eq!(parsed.days[1].weekday, 1);
        assert_eq!(parsed.days[1].events, vec!["New Year".to_string()]);
        assert_eq!(parsed.days[2].weekday, 2);

        let info = parsed.info.expect("month info");
        assert_eq!(info.prev_month, (2024, 12));
        assert_eq!(info.next_month, (2025, 2));
    }

    #[test]
    fn flat_records_need_a_weekday() {
        let ok = json!({"calendar": [{"day": 1, "weekday": 3}]});
        let parsed = parse_calendar_payload(&ok).expect("flat payload");
        assert_eq!(parsed.days[0].weekday, 3);

        let missing = json!({"calendar": [{"day": 1}]});
        assert!(matches!(
            parse_calendar_payload(&missing),
            Err(CoreError::MalformedCalendarData(_))
        ));
    }

    #[test]
    fn rejects_non_array_and_empty_calendars() {
        for payload in [
            json!({}),
            json!({"calendar": "nope"}),
            json!({"calendar": {}}),
            json!({"calendar": []}),
            json!([1, 2, 3]),
        ] {
            assert!(
                matches!(
                    parse_calendar_payload(&payload),
                    Err(CoreError::MalformedCalendarData(_))
                ),
                "{payload} should be malformed"
            );
        }
    }

    #[test]
    fn error_payload_is_a_network_failure() {
        let payload = json!({"error": "Unauthorized"});
        assert_eq!(
            parse_calendar_payload(&payload),
            Err(CoreError::NetworkFailure("Unauthorized".to_string()))
        );
    }

    #[test]
    fn single_note_string_becomes_one_annotation() {
        let payload = json!({"calendar": [[{"day": 1, "notes": "buy milk"}]]});
        let parsed = parse_calendar_payload(&payload).expect("valid");
        assert_eq!(parsed.days[0].notes, vec!["buy milk".to_string()]);
    }

    #[test]
    fn rejects_non_string_annotations() {
        let payload = json!({"calendar": [[{"day": 1, "events": [42]}]]});
        assert!(matches!(
            parse_calendar_payload(&payload),
            Err(CoreError::MalformedCalendarData(_))
        ));
    }

    struct Canned(Value);

    impl CalendarSource for Canned {
        fn calendar(&self, _year: i32, _month: u32) -> CoreResult<Value> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn fetch_month_rejects_answers_for_another_month() {
        let source = Canned(json!({
            "calendar": [[{"day": 1}]],
            "month_info": {
                "year": 2025, "month": 3, "month_name": "March",
                "prev_month": [2025, 2], "next_month": [2025, 4]
            }
        }));
        assert!(matches!(
            fetch_month(&source, 2025, 4),
            Err(CoreError::MalformedCalendarData(_))
        ));
        assert!(fetch_month(&source, 2025, 3).is_ok());
    }
}
