//! Note store: categorized, timestamped notes persisted as a JSON array.

use anyhow::Result;
use chrono::{Local, NaiveDateTime, Timelike};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::ai::AiQuery;
use crate::matcher::partial_ratio;
use crate::slots::{parse_number, SlotFiller};
use crate::store::{next_id, Identified, JsonFile};

/// Category given to notes saved without one.
pub const UNCATEGORIZED: &str = "uncategorized";

fn uncategorized() -> String {
    UNCATEGORIZED.to_string()
}

/// One remembered note.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEntry {
    pub id: u64,
    pub timestamp: NaiveDateTime,
    #[serde(rename = "note")]
    pub text: String,
    #[serde(default = "uncategorized")]
    pub category: String,
}

impl Identified for NoteEntry {
    fn id(&self) -> u64 {
        self.id
    }
}

/// Result of a keyword deletion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeywordDeletion {
    /// No note scored above the keyword threshold.
    NotFound,
    /// Exactly this note was removed.
    Deleted(NoteEntry),
    /// Several notes matched and no valid clarifying id was given.
    Cancelled,
}

/// Sole writer of the notes file.
pub struct NoteStore {
    file: JsonFile<NoteEntry>,
    keyword_threshold: u8,
}

impl NoteStore {
    /// Opens the store lazily; the file is read on each operation.
    ///
    /// # Arguments
    /// * `path` - The JSON array file; missing means empty.
    /// * `keyword_threshold` - Exclusive partial-ratio score a note must beat
    ///   to match a keyword deletion.
    pub fn new(path: impl Into<PathBuf>, keyword_threshold: u8) -> Self {
        Self {
            file: JsonFile::new(path, "memory"),
            keyword_threshold,
        }
    }

    /// Appends a note, defaulting the category to `uncategorized`.
    ///
    /// # Arguments
    /// * `text` - Note body; surrounding whitespace is dropped.
    /// * `category` - Stored as given apart from trimming; blank means none.
    ///
    /// # Returns
    /// The stored entry with its assigned id and second-precision timestamp.
    ///
    /// # Errors
    /// Returns an error if the file cannot be rewritten.
    pub fn add(&mut self, text: &str, category: Option<&str>) -> Result<NoteEntry> {
        let mut entries = self.file.load();
        let category = category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(uncategorized);
        let now = Local::now().naive_local();
        let entry = NoteEntry {
            id: next_id(&entries),
            timestamp: now.with_nanosecond(0).unwrap_or(now),
            text: text.trim().to_string(),
            category,
        };
        entries.push(entry.clone());
        self.file.save(&entries)?;
        info!(
            "event=note_add id={} category=\"{}\"",
            entry.id, entry.category
        );
        Ok(entry)
    }

    /// Every note in insertion order.
    pub fn read_all(&mut self) -> Vec<NoteEntry> {
        self.file.load()
    }

    /// Notes whose category equals `category`, ignoring case.
    pub fn read_by_category(&mut self, category: &str) -> Vec<NoteEntry> {
        let wanted = category.trim().to_lowercase();
        self.file
            .load()
            .into_iter()
            .filter(|entry| entry.category.to_lowercase() == wanted)
            .collect()
    }

    /// Removes the note with `id`; the file is untouched when it does not exist.
    ///
    /// # Errors
    /// Returns an error if the file cannot be rewritten.
    pub fn delete_by_id(&mut self, id: u64) -> Result<bool> {
        Ok(self.remove(id)?.is_some())
    }

    fn remove(&mut self, id: u64) -> Result<Option<NoteEntry>> {
        let mut entries = self.file.load();
        let Some(index) = entries.iter().position(|entry| entry.id == id) else {
            return Ok(None);
        };
        let removed = entries.remove(index);
        self.file.save(&entries)?;
        info!("event=note_delete id={}", id);
        Ok(Some(removed))
    }

    /// Notes whose text contains something close to `keyword`.
    pub fn keyword_matches(&mut self, keyword: &str) -> Vec<NoteEntry> {
        let threshold = self.keyword_threshold;
        self.file
            .load()
            .into_iter()
            .filter(|entry| partial_ratio(keyword, &entry.text) > threshold)
            .collect()
    }

    /// Deletes the note matching `keyword`, asking for an id when several match.
    ///
    /// # Details
    /// The clarifying id must belong to one of the listed candidates; anything
    /// else leaves the store unchanged.
    ///
    /// # Errors
    /// Returns an error if the file cannot be rewritten.
    pub fn delete_by_keyword(
        &mut self,
        keyword: &str,
        slots: &mut SlotFiller,
    ) -> Result<KeywordDeletion> {
        let candidates = self.keyword_matches(keyword);
        let chosen = match candidates.as_slice() {
            [] => return Ok(KeywordDeletion::NotFound),
            [only] => only.id,
            many => {
                slots.say(&format!(
                    "I found multiple notes containing '{keyword}'. Please tell me the ID of the one to forget."
                ));
                for (index, entry) in many.iter().enumerate() {
                    slots.say(&format!("Note {}: ID {}, '{}'", index + 1, entry.id, entry.text));
                }
                let picked = slots.fill("Which ID should I forget?", |reply| {
                    parse_number(reply)
                        .map(u64::from)
                        .filter(|id| many.iter().any(|entry| entry.id == *id))
                });
                match picked {
                    Ok(id) => id,
                    Err(_) => return Ok(KeywordDeletion::Cancelled),
                }
            }
        };
        Ok(match self.remove(chosen)? {
            Some(entry) => KeywordDeletion::Deleted(entry),
            None => KeywordDeletion::NotFound,
        })
    }

    /// Empties the store after an explicit confirmation.
    ///
    /// # Errors
    /// Returns an error if the file cannot be rewritten.
    pub fn clear_all(&mut self, slots: &mut SlotFiller) -> Result<bool> {
        if !slots.confirm(
            "Are you sure you want me to clear all your notes? This action cannot be undone.",
        ) {
            return Ok(false);
        }
        self.file.save(&[])?;
        info!("event=note_clear");
        Ok(true)
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        self.file.take_warnings()
    }
}

/// One line per note, suitable for display.
pub fn format_entries(entries: &[NoteEntry]) -> String {
    entries
        .iter()
        .map(|entry| {
            format!(
                "ID {} | [{}] | {}: {}",
                entry.id,
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.category,
                entry.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Summarizes notes: several go through the AI collaborator, one is read verbatim.
///
/// # Errors
/// Propagates AI collaborator failures.
pub fn summarize(entries: &[NoteEntry], ai: &mut dyn AiQuery) -> Result<String> {
    match entries {
        [] => Ok(String::new()),
        [only] => Ok(only.text.clone()),
        many => ai.ask_open_ended(&format!(
            "Please summarize the following notes concisely, highlighting key \
             information and actionable items:\n\n{}",
            format_entries(many)
        )),
    }
}
