use std::collections::BTreeMap;
use std::time::Instant;

use anyhow::{Context, anyhow};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use tracing::{debug, info, instrument};

use crate::backend::LocalBackend;
use crate::cli::Invocation;
use crate::config::Config;
use crate::countdown::{CountdownFormatter, CountdownResult, CountdownTier};
use crate::datastore::{DataStore, EventKey, NoteKey};
use crate::datetime::{local_now, parse_date_expr};
use crate::progress::ProgressMetric;
use crate::render::Renderer;
use crate::view::{CalendarView, FormState};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "year",
        "month",
        "progress",
        "countdown",
        "upcoming",
        "event",
        "note",
        "select",
        "watch",
        "_commands",
        "_show",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, cfg, renderer, inv))]
pub fn dispatch(
    store: &DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let now = local_now();
    let command = inv.command.as_str();

    debug!(command, args = ?inv.args, %now, "dispatching command");

    match command {
        "year" => cmd_year(store, cfg, renderer, &inv.args, now),
        "month" => cmd_month(store, cfg, renderer, &inv.args, now),
        "progress" => cmd_progress(cfg, renderer, &inv.args, now),
        "countdown" => cmd_countdown(cfg, renderer, &inv.args, now),
        "upcoming" => cmd_upcoming(store, cfg, renderer, now),
        "event" => cmd_event(store, renderer, &inv.args, now),
        "note" => cmd_note(store, renderer, &inv.args, now),
        "select" => cmd_select(store, cfg, renderer, &inv.args, now),
        "watch" => cmd_watch(store, cfg, renderer, &inv.args),
        "_commands" => cmd_commands(),
        "_show" => cmd_show(cfg),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

fn formatter(cfg: &Config) -> anyhow::Result<CountdownFormatter> {
    Ok(CountdownFormatter::new(cfg.countdown_policy()?, cfg.locale()?))
}

fn open_backend<'s>(
    store: &'s DataStore,
    cfg: &Config,
    now: NaiveDateTime,
) -> anyhow::Result<LocalBackend<'s>> {
    Ok(LocalBackend::new(store, cfg.holidays(), cfg.locale()?, now.date()))
}

/// Load every month of `year` through `backend`.
#[instrument(skip(backend, cfg, now))]
fn load_view(
    backend: &LocalBackend<'_>,
    cfg: &Config,
    year: i32,
    now: NaiveDateTime,
) -> anyhow::Result<CalendarView> {
    let mut view = CalendarView::new(year, formatter(cfg)?);
    let loaded = view.refresh(backend, now);
    debug!(year, loaded, "calendar view loaded");
    Ok(view)
}

fn parse_year_arg(cfg: &Config, args: &[String]) -> anyhow::Result<i32> {
    match args.first() {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid year: {raw}")),
        None => cfg.target_year(),
    }
}

#[instrument(skip(store, cfg, renderer, args, now))]
fn cmd_year(
    store: &DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!("command year");

    let year = parse_year_arg(cfg, args)?;
    let backend = open_backend(store, cfg, now)?;
    let view = load_view(&backend, cfg, year, now)?;
    let progress = view.progress(now)?;

    renderer.print_clock(now)?;
    println!();
    renderer.print_year(&view, Some(&progress))?;
    renderer.print_progress(&progress, year)?;

    let events = backend.merged_events(year)?;
    let upcoming = upcoming_rows(&view, &events, now);
    if !upcoming.is_empty() {
        println!();
        renderer.print_countdown_table(&upcoming)?;
    }
    Ok(())
}

#[instrument(skip(store, cfg, renderer, args, now))]
fn cmd_month(
    store: &DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!("command month");

    let month = match args.first() {
        Some(raw) => raw
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|m| (1..=12).contains(m))
            .ok_or_else(|| anyhow!("month must be 1-12, got: {raw}"))?,
        None => now.month(),
    };
    let year = parse_year_arg(cfg, args.get(1..).unwrap_or_default())?;

    let backend = open_backend(store, cfg, now)?;
    let view = load_view(&backend, cfg, year, now)?;
    let progress = view.progress(now)?;
    renderer.print_month(&view, month, Some(&progress))?;
    Ok(())
}

#[instrument(skip(cfg, renderer, args, now))]
fn cmd_progress(
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!("command progress");

    let year = parse_year_arg(cfg, args)?;
    let view = CalendarView::new(year, formatter(cfg)?);
    let metric = view.progress(now)?;
    renderer.print_progress(&metric, year)?;
    Ok(())
}

#[instrument(skip(cfg, renderer, args, now))]
fn cmd_countdown(
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!("command countdown");

    if args.is_empty() {
        return Err(anyhow!("countdown requires a target date"));
    }
    let expr = args.join(" ");
    let target = parse_date_expr(&expr, now)?;
    let result = formatter(cfg)?.format(target, now);
    renderer.print_countdown(&expr, &result)?;
    Ok(())
}

/// Countdowns for the view's year that have not expired yet.
fn upcoming_rows<'e>(
    view: &CalendarView,
    events: &'e BTreeMap<NaiveDate, String>,
    now: NaiveDateTime,
) -> Vec<(NaiveDate, &'e str, CountdownResult)> {
    view.countdowns(events, now)
        .into_iter()
        .filter(|(_, _, result)| result.tier != CountdownTier::Expired)
        .collect()
}

#[instrument(skip(store, cfg, renderer, now))]
fn cmd_upcoming(
    store: &DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!("command upcoming");

    let year = cfg.target_year()?;
    let events = open_backend(store, cfg, now)?.merged_events(year)?;
    let view = CalendarView::new(year, formatter(cfg)?);

    let rows = upcoming_rows(&view, &events, now);

    if rows.is_empty() {
        println!("No upcoming events in {year}.");
        return Ok(());
    }
    renderer.print_countdown_table(&rows)?;
    Ok(())
}

#[instrument(skip(store, renderer, args, now))]
fn cmd_event(
    store: &DataStore,
    renderer: &mut Renderer,
    args: &[String],
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    let (action, rest) = args.split_first().map_or(("list", &[][..]), |(a, r)| (a.as_str(), r));
    info!(action, "command event");

    match action {
        "list" => {
            let events = store.list_events()?;
            if events.is_empty() {
                println!("No events.");
                return Ok(());
            }
            renderer.print_events(&events, now.date())
        }
        "add" => {
            let (date, description) = date_and_text(rest, now, "event add <date> <description>")?;
            store.create_event(date, &description)?;
            println!("Saved event on {date}.");
            Ok(())
        }
        "delete" | "del" | "rm" => {
            if rest.is_empty() {
                return Err(anyhow!("usage: event delete <date|description>"));
            }
            let key = EventKey::parse(&rest.join(" "));
            let date = store.delete_event(&key)?;
            println!("Deleted event on {date}.");
            Ok(())
        }
        other => Err(anyhow!("unknown event action: {other}")),
    }
}

#[instrument(skip(store, renderer, args, now))]
fn cmd_note(
    store: &DataStore,
    renderer: &mut Renderer,
    args: &[String],
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    let (action, rest) = args.split_first().map_or(("list", &[][..]), |(a, r)| (a.as_str(), r));
    info!(action, "command note");

    match action {
        "list" => {
            let notes = store.list_notes()?;
            if notes.is_empty() {
                println!("No notes.");
                return Ok(());
            }
            renderer.print_notes(&notes)
        }
        "add" => {
            let (date, content) = date_and_text(rest, now, "note add <date> <content>")?;
            let note = store.create_note(date, &content)?;
            println!("Saved note {} on {date}.", note.id);
            Ok(())
        }
        "update" => {
            let (date, content) = date_and_text(rest, now, "note update <date> <content>")?;
            let note = store.update_note(date, &content)?;
            println!("Updated note {} on {date}.", note.id);
            Ok(())
        }
        "delete" | "del" | "rm" => {
            let raw = rest
                .first()
                .ok_or_else(|| anyhow!("usage: note delete <id|date>"))?;
            let removed = store.delete_note(&NoteKey::parse(raw)?)?;
            println!("Deleted note {} on {}.", removed.id, removed.date);
            Ok(())
        }
        other => Err(anyhow!("unknown note action: {other}")),
    }
}

/// Split `<date-expr> <text...>`. The first token is the date.
fn date_and_text(
    args: &[String],
    now: NaiveDateTime,
    usage: &str,
) -> anyhow::Result<(NaiveDate, String)> {
    let (raw_date, text) = args
        .split_first()
        .ok_or_else(|| anyhow!("usage: {usage}"))?;
    let date = parse_date_expr(raw_date, now)?.date();
    let text = text.join(" ");
    if text.trim().is_empty() {
        return Err(anyhow!("usage: {usage}"));
    }
    Ok((date, text))
}

#[instrument(skip(store, cfg, renderer, args, now))]
fn cmd_select(
    store: &DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!("command select");

    let raw = args
        .first()
        .ok_or_else(|| anyhow!("usage: select <date>"))?;
    let date = parse_date_expr(raw, now)?.date();

    let backend = open_backend(store, cfg, now)?;
    let view = load_view(&backend, cfg, date.year(), now)?;
    let form = view.select(FormState::default(), date)?;

    let cell = view
        .month(date.month())
        .and_then(|state| state.grid())
        .and_then(|grid| grid.day(date.day()));
    let event = cell.and_then(|c| c.events.first()).map(String::as_str);
    let note = store.list_notes()?.into_iter().find(|n| n.date == date);

    renderer.print_selection(date, &form, event, note.as_ref())?;
    Ok(())
}

fn parse_ticks(args: &[String]) -> anyhow::Result<Option<u64>> {
    let mut iter = args.iter();
    let mut ticks = None;
    while let Some(arg) = iter.next() {
        let value = if let Some(inline) = arg.strip_prefix("--ticks=") {
            inline.to_string()
        } else if arg == "--ticks" {
            iter.next()
                .cloned()
                .ok_or_else(|| anyhow!("--ticks requires a value"))?
        } else {
            return Err(anyhow!("unexpected watch argument: {arg}"));
        };
        let parsed = value
            .parse::<u64>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| anyhow!("--ticks must be a positive integer, got: {value}"))?;
        ticks = Some(parsed);
    }
    Ok(ticks)
}

/// What one watch tick has to show.
#[derive(Debug)]
struct WatchTick<'e> {
    rolled_over: bool,
    countdowns: Vec<(NaiveDate, &'e str, CountdownResult)>,
    progress: Option<ProgressMetric>,
}

/// Advance the watch state to `now`. Countdowns are recomputed on every
/// tick; a date rollover reclassifies the grid and forces a progress update.
fn watch_tick<'e>(
    view: &mut CalendarView,
    today: &mut NaiveDate,
    events: &'e BTreeMap<NaiveDate, String>,
    now: NaiveDateTime,
    progress_due: bool,
) -> anyhow::Result<WatchTick<'e>> {
    let rolled_over = now.date() != *today;
    if rolled_over {
        info!(from = %today, to = %now.date(), "date rolled over, reclassifying");
        *today = now.date();
        view.reclassify(now);
    }

    let progress = if progress_due || rolled_over {
        Some(view.progress(now)?)
    } else {
        None
    };

    Ok(WatchTick {
        rolled_over,
        countdowns: upcoming_rows(view, events, now),
        progress,
    })
}

/// Clock and countdowns every clock interval, progress on its own slower
/// interval, and a redrawn grid when the date rolls over.
#[instrument(skip(store, cfg, renderer, args))]
fn cmd_watch(
    store: &DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command watch");

    let ticks = parse_ticks(args)?;
    let clock_every = cfg.clock_interval()?;
    let progress_every = cfg.progress_interval()?;

    let mut now = local_now();
    let year = cfg.target_year()?;
    let backend = open_backend(store, cfg, now)?;
    let mut view = load_view(&backend, cfg, year, now)?;
    let events = backend.merged_events(year)?;
    let mut today = now.date();
    let mut last_progress: Option<Instant> = None;
    let mut tick = 0_u64;

    renderer.print_year(&view, Some(&view.progress(now)?))?;

    loop {
        let progress_due = last_progress.is_none_or(|at| at.elapsed() >= progress_every);
        let frame = watch_tick(&mut view, &mut today, &events, now, progress_due)?;

        renderer.print_clock(now)?;
        if frame.rolled_over {
            renderer.print_year(&view, frame.progress.as_ref())?;
        }
        if !frame.countdowns.is_empty() {
            renderer.print_countdown_table(&frame.countdowns)?;
        }
        if let Some(metric) = &frame.progress {
            renderer.print_progress(metric, view.year())?;
            last_progress = Some(Instant::now());
        }

        tick += 1;
        if ticks.is_some_and(|limit| tick >= limit) {
            debug!(tick, "tick limit reached");
            return Ok(());
        }

        std::thread::sleep(clock_every);
        now = local_now();
    }
}

fn cmd_commands() -> anyhow::Result<()> {
    for command in known_command_names() {
        println!("{command}");
    }
    Ok(())
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    for (k, v) in cfg.iter() {
        println!("{k}={v}");
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "Commands: year [YYYY], month <1-12> [YYYY], progress [YYYY], countdown <date>, upcoming, \
         event list|add|delete, note list|add|update|delete, select <date>, watch [--ticks N]"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn abbreviations_must_be_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("up", &known), Some("upcoming"));
        assert_eq!(expand_command_abbrev("w", &known), Some("watch"));
        assert_eq!(expand_command_abbrev("year", &known), Some("year"));
        assert_eq!(expand_command_abbrev("e", &known), Some("event"));
        assert_eq!(expand_command_abbrev("_", &known), None);
    }

    #[test]
    fn watch_ticks_parse() {
        assert_eq!(parse_ticks(&[]).expect("no ticks"), None);
        assert_eq!(parse_ticks(&strings(&["--ticks", "3"])).expect("ticks"), Some(3));
        assert_eq!(parse_ticks(&strings(&["--ticks=2"])).expect("ticks"), Some(2));
        assert!(parse_ticks(&strings(&["--ticks", "0"])).is_err());
        assert!(parse_ticks(&strings(&["--ticks"])).is_err());
        assert!(parse_ticks(&strings(&["fast"])).is_err());
    }

    #[test]
    fn watch_ticks_recompute_countdowns_across_midnight() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");
        store
            .create_event(NaiveDate::from_ymd_opt(2025, 6, 17).expect("date"), "Launch")
            .expect("create event");

        let cfg = Config::default();
        let before = NaiveDate::from_ymd_opt(2025, 6, 15)
            .and_then(|d| d.and_hms_opt(23, 59, 50))
            .expect("valid now");
        let after = NaiveDate::from_ymd_opt(2025, 6, 16)
            .and_then(|d| d.and_hms_opt(0, 0, 10))
            .expect("valid now");

        let backend = open_backend(&store, &cfg, before).expect("backend");
        let mut view = load_view(&backend, &cfg, 2025, before).expect("view");
        let events = backend.merged_events(2025).expect("events");
        let mut today = before.date();

        let first = watch_tick(&mut view, &mut today, &events, before, false).expect("tick");
        assert!(!first.rolled_over);
        assert!(first.progress.is_none());
        let launch = |tick: &WatchTick<'_>| {
            tick.countdowns
                .iter()
                .find(|(_, name, _)| *name == "Launch")
                .map(|(_, _, result)| result.label.clone())
        };
        assert_eq!(launch(&first).as_deref(), Some("2 days"));

        let second = watch_tick(&mut view, &mut today, &events, after, false).expect("tick");
        assert!(second.rolled_over);
        assert!(second.progress.is_some());
        assert_eq!(launch(&second).as_deref(), Some("1 day"));
        assert_eq!(today, after.date());

        let june = view.month(6).and_then(|state| state.grid()).expect("june");
        assert!(june.day(16).expect("day 16").is_today());
        assert!(june.day(15).expect("day 15").is_past());
    }

    #[test]
    fn date_and_text_resolves_relative_dates() {
        let now = NaiveDate::from_ymd_opt(2025, 6, 15)
            .and_then(|d| d.and_hms_opt(10, 0, 0))
            .expect("valid now");
        let (date, text) =
            date_and_text(&strings(&["tomorrow", "dentist", "at", "9"]), now, "usage")
                .expect("parsed");
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 6, 16).expect("date"));
        assert_eq!(text, "dentist at 9");

        assert!(date_and_text(&strings(&["2025-06-01"]), now, "usage").is_err());
        assert!(date_and_text(&strings(&["someday", "x"]), now, "usage").is_err());
    }
}
