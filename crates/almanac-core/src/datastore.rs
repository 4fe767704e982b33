use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

use crate::datetime::parse_calendar_date;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub date: NaiveDate,
    pub content: String,
}

/// How an event is addressed for deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKey {
    Date(NaiveDate),
    Description(String),
}

impl EventKey {
    /// A `YYYY-MM-DD` token is a date; anything else is a description.
    pub fn parse(raw: &str) -> Self {
        match parse_calendar_date(raw) {
            Ok(date) => EventKey::Date(date),
            Err(_) => EventKey::Description(raw.trim().to_string()),
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKey::Date(date) => write!(f, "{date}"),
            EventKey::Description(text) => write!(f, "{text:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteKey {
    Id(Uuid),
    Date(NaiveDate),
}

impl NoteKey {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        if let Ok(id) = Uuid::parse_str(raw.trim()) {
            return Ok(NoteKey::Id(id));
        }
        let date = parse_calendar_date(raw)
            .map_err(|err| anyhow!("expected a note id or YYYY-MM-DD: {err}"))?;
        Ok(NoteKey::Date(date))
    }
}

impl fmt::Display for NoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteKey::Id(id) => write!(f, "{id}"),
            NoteKey::Date(date) => write!(f, "{date}"),
        }
    }
}

/// File-backed events and notes stores.
///
/// Events map one description to each date. Notes carry a stable id and are
/// also unique per date; creating a note on a date that already has one
/// replaces its content.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub events_path: PathBuf,
    pub notes_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let events_path = data_dir.join("events.json");
        let notes_path = data_dir.join("notes.json");

        if !events_path.exists() {
            fs::write(&events_path, "{}")?;
        }
        if !notes_path.exists() {
            fs::write(&notes_path, "[]")?;
        }

        info!(
            data_dir = %data_dir.display(),
            events = %events_path.display(),
            notes = %notes_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            events_path,
            notes_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn list_events(&self) -> anyhow::Result<BTreeMap<NaiveDate, String>> {
        load_json(&self.events_path).context("failed to load events.json")
    }

    /// Create or replace the event on `date`.
    #[tracing::instrument(skip(self, description))]
    pub fn create_event(&self, date: NaiveDate, description: &str) -> anyhow::Result<()> {
        let description = description.trim();
        if description.is_empty() {
            return Err(anyhow!("event description cannot be empty"));
        }

        let mut events = self.list_events()?;
        if let Some(previous) = events.insert(date, description.to_string()) {
            debug!(%date, previous = %previous, "replacing existing event");
        }
        save_json_atomic(&self.events_path, &events).context("failed to save events.json")
    }

    #[tracing::instrument(skip(self), fields(key = %key))]
    pub fn delete_event(&self, key: &EventKey) -> anyhow::Result<NaiveDate> {
        let mut events = self.list_events()?;
        let date = match key {
            EventKey::Date(date) => events.contains_key(date).then_some(*date),
            EventKey::Description(text) => events
                .iter()
                .find(|(_, description)| description.as_str() == text)
                .map(|(date, _)| *date),
        }
        .ok_or_else(|| anyhow!("event not found: {key}"))?;

        events.remove(&date);
        save_json_atomic(&self.events_path, &events).context("failed to save events.json")?;
        Ok(date)
    }

    /// Notes in ascending date order.
    #[tracing::instrument(skip(self))]
    pub fn list_notes(&self) -> anyhow::Result<Vec<Note>> {
        let mut notes: Vec<Note> = load_json(&self.notes_path).context("failed to load notes.json")?;
        notes.sort_by_key(|note| note.date);
        Ok(notes)
    }

    #[tracing::instrument(skip(self, content))]
    pub fn create_note(&self, date: NaiveDate, content: &str) -> anyhow::Result<Note> {
        let content = require_content(content)?;
        let mut notes = self.list_notes()?;

        let note = match notes.iter_mut().find(|note| note.date == date) {
            Some(existing) => {
                debug!(%date, id = %existing.id, "replacing note content");
                existing.content = content;
                existing.clone()
            }
            None => {
                let note = Note {
                    id: Uuid::new_v4(),
                    date,
                    content,
                };
                notes.push(note.clone());
                note
            }
        };

        self.save_notes(notes)?;
        Ok(note)
    }

    #[tracing::instrument(skip(self, content))]
    pub fn update_note(&self, date: NaiveDate, content: &str) -> anyhow::Result<Note> {
        let content = require_content(content)?;
        let mut notes = self.list_notes()?;

        let note = notes
            .iter_mut()
            .find(|note| note.date == date)
            .ok_or_else(|| anyhow!("note not found: {date}"))?;
        note.content = content;
        let updated = note.clone();

        self.save_notes(notes)?;
        Ok(updated)
    }

    #[tracing::instrument(skip(self), fields(key = %key))]
    pub fn delete_note(&self, key: &NoteKey) -> anyhow::Result<Note> {
        let mut notes = self.list_notes()?;
        let idx = notes
            .iter()
            .position(|note| match key {
                NoteKey::Id(id) => note.id == *id,
                NoteKey::Date(date) => note.date == *date,
            })
            .ok_or_else(|| anyhow!("note not found: {key}"))?;

        let removed = notes.remove(idx);
        self.save_notes(notes)?;
        Ok(removed)
    }

    fn save_notes(&self, mut notes: Vec<Note>) -> anyhow::Result<()> {
        notes.sort_by_key(|note| note.date);
        save_json_atomic(&self.notes_path, &notes).context("failed to save notes.json")
    }
}

fn require_content(content: &str) -> anyhow::Result<String> {
    let content = content.trim();
    if content.is_empty() {
        return Err(anyhow!("note content cannot be empty"));
    }
    Ok(content.to_string())
}

#[tracing::instrument(skip(path))]
fn load_json<T>(path: &Path) -> anyhow::Result<T>
where
    T: DeserializeOwned + Default,
{
    debug!(file = %path.display(), "loading json");
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&raw).with_context(|| format!("failed parsing {}", path.display()))
}

#[tracing::instrument(skip(path, value))]
fn save_json_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    debug!(file = %path.display(), "saving json atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut temp, value)?;
    writeln!(temp)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
