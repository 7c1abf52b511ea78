//! Calendar store: dated reminders and events persisted as a JSON array.

use anyhow::Result;
use chrono::NaiveDateTime;
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::slots::SlotFiller;
use crate::store::{next_id, Identified, JsonFile};

/// What kind of calendar entry was recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Reminder,
    Event,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntryKind::Reminder => "reminder",
            EntryKind::Event => "event",
        })
    }
}

/// One reminder or event; `when` is always a full date and time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEntry {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub text: String,
    #[serde(rename = "datetime")]
    pub when: NaiveDateTime,
}

impl Identified for CalendarEntry {
    fn id(&self) -> u64 {
        self.id
    }
}

/// Spoken form of an entry time, e.g. "Thursday, January 11 at 03:00 PM".
pub fn describe_when(when: &NaiveDateTime) -> String {
    when.format("%A, %B %d at %I:%M %p").to_string()
}

/// Sole writer of the calendar file.
pub struct CalendarStore {
    file: JsonFile<CalendarEntry>,
}

impl CalendarStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path, "calendar"),
        }
    }

    /// Appends an entry and returns it with its assigned id.
    ///
    /// # Errors
    /// Returns an error if the file cannot be rewritten.
    pub fn add(&mut self, kind: EntryKind, text: &str, when: NaiveDateTime) -> Result<CalendarEntry> {
        let mut entries = self.file.load();
        let entry = CalendarEntry {
            id: next_id(&entries),
            kind,
            text: text.trim().to_string(),
            when,
        };
        entries.push(entry.clone());
        self.file.save(&entries)?;
        info!(
            "event=calendar_add id={} kind={} when={}",
            entry.id, entry.kind, entry.when
        );
        Ok(entry)
    }

    /// Every entry in file order.
    pub fn all(&mut self) -> Vec<CalendarEntry> {
        self.file.load()
    }

    /// Entries at or after `now`, earliest first.
    pub fn list_upcoming(&mut self, now: NaiveDateTime) -> Vec<CalendarEntry> {
        let mut upcoming: Vec<CalendarEntry> = self
            .file
            .load()
            .into_iter()
            .filter(|entry| entry.when >= now)
            .collect();
        upcoming.sort_by_key(|entry| entry.when);
        upcoming
    }

    /// Removes the entry with `id`; the file is untouched when it does not exist.
    ///
    /// # Errors
    /// Returns an error if the file cannot be rewritten.
    pub fn delete_by_id(&mut self, id: u64) -> Result<bool> {
        let mut entries = self.file.load();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        if entries.len() == before {
            return Ok(false);
        }
        self.file.save(&entries)?;
        info!("event=calendar_delete id={}", id);
        Ok(true)
    }

    /// Empties the store after an explicit confirmation.
    ///
    /// # Errors
    /// Returns an error if the file cannot be rewritten.
    pub fn clear_all(&mut self, slots: &mut SlotFiller) -> Result<bool> {
        if !slots.confirm(
            "Are you sure you want me to clear all your reminders and events? This action cannot be undone.",
        ) {
            return Ok(false);
        }
        self.file.save(&[])?;
        info!("event=calendar_clear");
        Ok(true)
    }

    /// Drains the corruption warnings raised by loads since the last call.
    pub fn take_warnings(&mut self) -> Vec<String> {
        self.file.take_warnings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListenSettings;
    use crate::datetime::resolve;
    use crate::speech::{ScriptedInput, TranscriptOutput};
    use chrono::NaiveDate;
    use std::time::Duration;

    fn slots(replies: &[&str]) -> SlotFiller {
        SlotFiller::new(
            Box::new(ScriptedInput::new(replies.iter().copied())),
            Box::new(TranscriptOutput::new()),
            ListenSettings {
                timeout: Duration::from_millis(1),
                phrase_limit: Duration::from_millis(1),
            },
        )
    }

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn upcoming_is_filtered_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let mut calendar = CalendarStore::new(dir.path().join("calendar.json"));
        calendar.add(EntryKind::Event, "late", at(20, 9)).unwrap();
        calendar.add(EntryKind::Reminder, "past", at(5, 9)).unwrap();
        calendar.add(EntryKind::Reminder, "now", at(10, 12)).unwrap();
        calendar.add(EntryKind::Event, "soon", at(11, 15)).unwrap();

        let upcoming: Vec<String> = calendar
            .list_upcoming(at(10, 12))
            .into_iter()
            .map(|e| e.text)
            .collect();
        assert_eq!(upcoming, vec!["now", "soon", "late"]);
        assert_eq!(calendar.all().len(), 4);
    }

    #[test]
    fn persisted_shape_and_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calendar.json");
        let mut calendar = CalendarStore::new(&path);
        let when = resolve("tomorrow at 3 pm", at(10, 0));
        let added = calendar.add(EntryKind::Reminder, "call the bank", when).unwrap();
        assert_eq!(added.id, 1);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[0]["type"], "reminder");
        assert_eq!(raw[0]["datetime"], "2024-01-11T15:00:00");

        let mut reopened = CalendarStore::new(&path);
        assert_eq!(reopened.all(), vec![added]);
    }

    #[test]
    fn delete_missing_id_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calendar.json");
        let mut calendar = CalendarStore::new(&path);
        calendar.add(EntryKind::Event, "standup", at(12, 9)).unwrap();
        let before = std::fs::read(&path).unwrap();
        assert!(!calendar.delete_by_id(7).unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert!(calendar.delete_by_id(1).unwrap());
        assert!(calendar.all().is_empty());
    }

    #[test]
    fn describe_when_reads_naturally() {
        assert_eq!(describe_when(&at(11, 15)), "Thursday, January 11 at 03:00 PM");
    }

    #[test]
    fn clear_requires_an_explicit_yes() {
        let dir = tempfile::tempdir().unwrap();
        let mut calendar = CalendarStore::new(dir.path().join("calendar.json"));
        calendar.add(EntryKind::Reminder, "pay rent", at(12, 9)).unwrap();
        calendar.add(EntryKind::Event, "dinner", at(13, 19)).unwrap();

        assert!(!calendar.clear_all(&mut slots(&[])).unwrap());
        assert!(!calendar.clear_all(&mut slots(&["no thanks"])).unwrap());
        assert_eq!(calendar.all().len(), 2);

        assert!(calendar.clear_all(&mut slots(&["yes"])).unwrap());
        assert!(calendar.all().is_empty());
        assert_eq!(calendar.add(EntryKind::Event, "again", at(14, 9)).unwrap().id, 1);
    }
}
