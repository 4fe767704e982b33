use std::collections::BTreeMap;
use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{NaiveDate, NaiveDateTime};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::countdown::{CountdownResult, CountdownTier};
use crate::datastore::Note;
use crate::grid::{GridCell, MonthGrid};
use crate::locale::Locale;
use crate::progress::{ProgressMetric, clamp_percent};
use crate::view::{CalendarView, FormState, FormTab, MonthState};

const MONTHS_PER_ROW: usize = 3;
const CELL_WIDTH: usize = 4;
const MONTH_WIDTH: usize = CELL_WIDTH * 7;
const BAR_WIDTH: usize = 30;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    locale: Locale,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };
        let locale = cfg.locale()?;

        Ok(Self { color, locale })
    }

    /// `HH:MM:SS` followed by the localized long date.
    pub fn clock_line(&self, now: NaiveDateTime) -> String {
        format!(
            "{}  {}",
            now.format("%H:%M:%S"),
            self.locale.long_date(now.date())
        )
    }

    pub fn print_clock(&mut self, now: NaiveDateTime) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", self.clock_line(now))?;
        Ok(())
    }

    #[tracing::instrument(skip(self, view, progress))]
    pub fn print_year(
        &mut self,
        view: &CalendarView,
        progress: Option<&ProgressMetric>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", view.year())?;
        writeln!(out)?;

        let blocks: Vec<Vec<String>> = (1..=12_u32)
            .map(|month| self.month_lines(view, month, progress))
            .collect();

        for row in blocks.chunks(MONTHS_PER_ROW) {
            let height = row.iter().map(Vec::len).max().unwrap_or(0);
            for line_idx in 0..height {
                let line = row
                    .iter()
                    .map(|block| {
                        let cell = block.get(line_idx).map(String::as_str).unwrap_or("");
                        pad_visible(cell, MONTH_WIDTH)
                    })
                    .collect::<Vec<_>>()
                    .join("  ");
                writeln!(out, "{}", line.trim_end())?;
            }
            writeln!(out)?;
        }

        Ok(())
    }

    pub fn print_month(
        &mut self,
        view: &CalendarView,
        month: u32,
        progress: Option<&ProgressMetric>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        for line in self.month_lines(view, month, progress) {
            writeln!(out, "{}", line.trim_end())?;
        }
        Ok(())
    }

    /// One month block: title, weekday header, then one line per week. A
    /// month that failed to load shows its error instead of a grid.
    pub fn month_lines(
        &self,
        view: &CalendarView,
        month: u32,
        progress: Option<&ProgressMetric>,
    ) -> Vec<String> {
        let mut title = self.locale.month_title(month);
        if let Some(fraction) = progress.and_then(|p| p.per_month_fraction.get(&month)) {
            title = format!("{title} {fraction:.1}%");
        }

        let mut lines = vec![center(&title, MONTH_WIDTH)];
        match view.month(month) {
            Some(MonthState::Loaded { grid, .. }) => {
                lines.push(
                    self.locale
                        .weekday_headers()
                        .iter()
                        .map(|h| pad_visible(h, CELL_WIDTH))
                        .collect::<String>(),
                );
                lines.extend(self.week_lines(grid));
            }
            Some(MonthState::Failed(err)) => {
                lines.push(self.paint(&format!("error: {err}"), "31"));
            }
            None => lines.push(self.paint("not loaded", "2")),
        }
        lines
    }

    fn week_lines(&self, grid: &MonthGrid) -> Vec<String> {
        grid.weeks()
            .map(|week| week.iter().map(|cell| self.cell_text(cell)).collect::<String>())
            .collect()
    }

    fn cell_text(&self, cell: &GridCell) -> String {
        let Some(day) = cell.as_day() else {
            return " ".repeat(CELL_WIDTH);
        };

        let number = format!("{:>2}", day.day());
        let number = if day.is_today() {
            self.paint(&number, "7")
        } else if day.is_past() {
            self.paint(&number, "2")
        } else {
            number
        };

        let event_mark = if day.has_events() {
            self.paint("*", "33")
        } else {
            " ".to_string()
        };
        let note_mark = if day.has_notes() {
            self.paint("+", "36")
        } else {
            " ".to_string()
        };

        format!("{number}{event_mark}{note_mark}")
    }

    pub fn print_progress(&mut self, metric: &ProgressMetric, year: i32) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(
            out,
            "{year} {} {:.1}%",
            progress_bar(metric.year_fraction, BAR_WIDTH),
            clamp_percent(metric.year_fraction)
        )?;

        if metric.per_month_fraction.is_empty() {
            return Ok(());
        }

        let headers = vec!["Month".to_string(), "Progress".to_string(), "%".to_string()];
        let rows = metric
            .per_month_fraction
            .iter()
            .map(|(month, fraction)| {
                vec![
                    self.locale.month_title(*month),
                    progress_bar(*fraction, BAR_WIDTH / 2),
                    format!("{fraction:.1}"),
                ]
            })
            .collect();
        writeln!(out)?;
        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    pub fn print_countdown(&mut self, label: &str, result: &CountdownResult) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(
            out,
            "{label}: {} ({})",
            self.paint_tier(&result.label, result.tier),
            result.tier.as_str()
        )?;
        Ok(())
    }

    #[tracing::instrument(skip(self, rows))]
    pub fn print_countdown_table(
        &mut self,
        rows: &[(NaiveDate, &str, CountdownResult)],
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = vec![
            "Date".to_string(),
            "Event".to_string(),
            "Countdown".to_string(),
        ];
        let rows = rows
            .iter()
            .map(|(date, description, result)| {
                vec![
                    date.format("%Y-%m-%d").to_string(),
                    description.to_string(),
                    self.paint_tier(&result.label, result.tier),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    pub fn print_events(
        &mut self,
        events: &BTreeMap<NaiveDate, String>,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = vec!["Date".to_string(), "Event".to_string()];
        let rows = events
            .iter()
            .map(|(date, description)| {
                let date_text = date.format("%Y-%m-%d").to_string();
                let date_text = if *date < today {
                    self.paint(&date_text, "2")
                } else {
                    date_text
                };
                vec![date_text, description.clone()]
            })
            .collect();
        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    /// Notes newest first.
    pub fn print_notes(&mut self, notes: &[Note]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = vec!["Date".to_string(), "Note".to_string(), "ID".to_string()];
        let rows = notes
            .iter()
            .rev()
            .map(|note| {
                vec![
                    note.date.format("%Y-%m-%d").to_string(),
                    note.content.clone(),
                    self.paint(&note.id.to_string(), "33"),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    pub fn print_selection(
        &mut self,
        date: NaiveDate,
        form: &FormState,
        event: Option<&str>,
        note: Option<&Note>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "selected  {}", self.locale.long_date(date))?;
        writeln!(out, "event     {}", event.unwrap_or("-"))?;
        writeln!(
            out,
            "note      {}",
            note.map(|n| n.content.as_str()).unwrap_or("-")
        )?;
        let tab = match form.active_tab {
            FormTab::Events => "events",
            FormTab::Memo => "memo",
        };
        writeln!(out, "form      {tab}")?;
        Ok(())
    }

    fn paint_tier(&self, text: &str, tier: CountdownTier) -> String {
        let code = match tier {
            CountdownTier::Expired => "2",
            CountdownTier::Today => "1;32",
            CountdownTier::Imminent => "1;31",
            CountdownTier::Soon => "31",
            CountdownTier::Upcoming => "33",
            CountdownTier::Normal => return text.to_string(),
        };
        self.paint(text, code)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

/// Fixed-width bar for a percentage; out-of-range values are clamped.
pub fn progress_bar(percent: f64, width: usize) -> String {
    let filled = ((clamp_percent(percent) / 100.0) * width as f64).round() as usize;
    let filled = filled.min(width);
    format!("[{}{}]", "#".repeat(filled), ".".repeat(width - filled))
}

fn center(text: &str, width: usize) -> String {
    let visible = UnicodeWidthStr::width(strip_ansi(text).as_str());
    let left = width.saturating_sub(visible) / 2;
    pad_visible(&format!("{}{text}", " ".repeat(left)), width)
}

fn pad_visible(text: &str, width: usize) -> String {
    let visible = UnicodeWidthStr::width(strip_ansi(text).as_str());
    format!("{text}{}", " ".repeat(width.saturating_sub(visible)))
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{} ", pad_visible(&headers[idx], widths[idx]))?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            write!(writer, "{} ", pad_visible(cell, widths[idx]))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::{Value, json};

    use super::*;
    use crate::calendar::CalendarSource;
    use crate::countdown::CountdownFormatter;
    use crate::error::{CoreError, CoreResult};

    struct OneMonth;

    impl CalendarSource for OneMonth {
        fn calendar(&self, _year: i32, month: u32) -> CoreResult<Value> {
            if month != 2 {
                return Err(CoreError::network("offline"));
            }
            let mut slots: Vec<Value> = (0..6).map(|_| json!({"day": ""})).collect();
            for day in 1..=28 {
                let events: Vec<&str> = if day == 14 { vec!["Valentine's Day"] } else { vec![] };
                let notes: Vec<&str> = match day {
                    14 => vec!["buy roses"],
                    20 => vec!["call home"],
                    _ => vec![],
                };
                slots.push(json!({"day": day, "events": events, "notes": notes}));
            }
            slots.push(json!({"day": ""}));
            let weeks: Vec<Value> = slots.chunks(7).map(|w| Value::Array(w.to_vec())).collect();
            Ok(json!({ "calendar": weeks }))
        }
    }

    fn plain(locale: Locale) -> Renderer {
        Renderer {
            color: false,
            locale,
        }
    }

    fn loaded_view() -> CalendarView {
        let now = NaiveDate::from_ymd_opt(2025, 2, 10)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .expect("valid now");
        let mut view = CalendarView::new(2025, CountdownFormatter::default());
        view.refresh(&OneMonth, now);
        view
    }

    #[test]
    fn month_block_lays_out_sunday_first_weeks() {
        let view = loaded_view();
        let lines = plain(Locale::En).month_lines(&view, 2, None);
        assert_eq!(lines[0].trim(), "February");
        assert_eq!(lines[1].trim_end(), "Su  Mo  Tu  We  Th  Fr  Sa");
        assert_eq!(lines.len(), 2 + 5);
        assert_eq!(lines[2].trim(), "1");
        assert!(lines[3].starts_with(" 2   3  "));
    }

    #[test]
    fn event_and_note_markers_render_together() {
        let view = loaded_view();
        let lines = plain(Locale::En).month_lines(&view, 2, None);
        assert!(lines[4].contains("13  14*+15  "), "week line: {:?}", lines[4]);
        assert!(lines[5].contains("20 +"), "week line: {:?}", lines[5]);
        assert!(!lines[5].contains('*'));
    }

    #[test]
    fn failed_month_shows_its_error() {
        let view = loaded_view();
        let lines = plain(Locale::Zh).month_lines(&view, 3, None);
        assert_eq!(lines[0].trim(), "3月");
        assert_eq!(lines[1], "error: network failure: offline");
    }

    #[test]
    fn progress_bar_clamps() {
        assert_eq!(progress_bar(50.0, 10), "[#####.....]");
        assert_eq!(progress_bar(-5.0, 4), "[....]");
        assert_eq!(progress_bar(140.0, 4), "[####]");
    }

    #[test]
    fn table_alignment_ignores_ansi_and_wide_glyphs() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["A".to_string(), "B".to_string()],
            vec![
                vec!["\x1b[33m国庆\x1b[0m".to_string(), "x".to_string()],
                vec!["abcd".to_string(), "y".to_string()],
            ],
        )
        .expect("write table");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "A    B ");
        assert_eq!(strip_ansi(lines[2]), "国庆 x ");
        assert_eq!(lines[3], "abcd y ");
    }

    #[test]
    fn clock_line_is_localized() {
        let now = NaiveDate::from_ymd_opt(2025, 6, 15)
            .and_then(|d| d.and_hms_opt(9, 5, 7))
            .expect("valid now");
        assert_eq!(
            plain(Locale::Zh).clock_line(now),
            "09:05:07  2025年6月15日 星期日"
        );
    }
}
