/*
 * @file commands.rs
 * @brief Command registry: trigger phrases mapped to typed actions
 * @author Kevin Thomas
 * @date 2025
 *
 * MIT License
 *
 * Copyright (c) 2025 Kevin Thomas
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */

//! Command registry mapping canonical trigger phrases to typed actions.

use anyhow::{bail, Context, Result};
use log::warn;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::matcher::normalize_utterance;

/// Meta-commands aimed at the assistant itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistantTarget {
    Greet,
    Status,
    Exit,
}

/// Facts the assistant can report without any follow-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfoTarget {
    Time,
    Date,
    Day,
    Weather,
}

/// Web search providers reachable through a query URL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchEngine {
    Google,
    Youtube,
    Github,
}

impl SearchEngine {
    /// Spoken name of the provider.
    pub fn label(self) -> &'static str {
        match self {
            SearchEngine::Google => "Google",
            SearchEngine::Youtube => "YouTube",
            SearchEngine::Github => "GitHub",
        }
    }

    /// Builds the results URL for `query`.
    ///
    /// # Arguments
    /// * `query` - Free search text; it is form-encoded into the query string.
    ///
    /// # Errors
    /// Returns an error if the URL cannot be assembled.
    pub fn search_url(self, query: &str) -> Result<String> {
        let (base, key) = match self {
            SearchEngine::Google => ("https://www.google.com/search", "q"),
            SearchEngine::Youtube => ("https://www.youtube.com/results", "search_query"),
            SearchEngine::Github => ("https://github.com/search", "q"),
        };
        let url = Url::parse_with_params(base, &[(key, query.trim())])
            .with_context(|| format!("Failed to build the {} search URL", self.label()))?;
        Ok(url.into())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeAction {
    Set,
    Increase,
    Decrease,
    Mute,
    Unmute,
}

/// Transport controls forwarded to the system media player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaAction {
    Play,
    Pause,
    Next,
    Previous,
}

/// Local music library playback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MusicAction {
    PlayLocal,
    PlaySong,
    Stop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteAction {
    Add,
    ReadAll,
    ReadCategory,
    Summarize,
    Delete,
    ClearAll,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarAction {
    AddReminder,
    AddEvent,
    ShowUpcoming,
    Delete,
    ClearAll,
}

/// Smart-home operations relayed to the bridge device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmartHomeAction {
    LightsOn,
    LightsOff,
    Brightness,
    Color,
    Thermostat,
    LockDoors,
    UnlockDoors,
    Status,
}

/// Closed set of action kinds, each carrying only the parameters it needs.
///
/// # Details
/// Serialized with an internal `type` tag so `commands.json` entries read as
/// `{"type": "open_url", "url": "...", "feedback": "..."}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    Assistant {
        target: AssistantTarget,
    },
    OpenUrl {
        url: String,
        feedback: String,
    },
    OpenApp {
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fallback: Option<String>,
        feedback: String,
    },
    CloseApp {
        process: String,
        feedback: String,
    },
    CloseActiveWindow,
    Info {
        target: InfoTarget,
    },
    Search {
        engine: SearchEngine,
    },
    AiQuery,
    Analyze,
    SummarizeText,
    Note {
        action: NoteAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category_hint: Option<String>,
    },
    Calendar {
        action: CalendarAction,
    },
    Volume {
        action: VolumeAction,
    },
    Media {
        action: MediaAction,
    },
    Music {
        action: MusicAction,
    },
    SmartHome {
        action: SmartHomeAction,
        #[serde(default)]
        all: bool,
    },
    Hotword {
        enable: bool,
    },
}

impl ActionKind {
    /// Rejects parameter combinations that cannot be dispatched.
    pub fn validate(&self) -> Result<()> {
        match self {
            ActionKind::OpenUrl { url, feedback } => {
                let parsed = Url::parse(url)
                    .with_context(|| format!("open_url target `{url}` is not a valid URL"))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    bail!("open_url target must be an http(s) URL, got `{url}`");
                }
                require_text("feedback", feedback)
            }
            ActionKind::OpenApp {
                target,
                fallback,
                feedback,
            } => {
                require_text("target", target)?;
                if let Some(fallback) = fallback {
                    require_text("fallback", fallback)?;
                }
                require_text("feedback", feedback)
            }
            ActionKind::CloseApp { process, feedback } => {
                require_text("process", process)?;
                require_text("feedback", feedback)
            }
            ActionKind::Note {
                action,
                category_hint: Some(hint),
            } => {
                if *action != NoteAction::ReadCategory {
                    bail!("category_hint is only valid for read_category");
                }
                require_text("category_hint", hint)
            }
            ActionKind::SmartHome { action, all: true } => match action {
                SmartHomeAction::LightsOn | SmartHomeAction::LightsOff => Ok(()),
                other => bail!("`all` is only valid for light switching, not {other:?}"),
            },
            _ => Ok(()),
        }
    }
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("`{field}` must not be empty");
    }
    Ok(())
}

/// A single canonical trigger phrase and the action it stands for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEntry {
    pub phrase: String,
    pub action: ActionKind,
}

impl CommandEntry {
    /// Normalizes the phrase and validates the action.
    ///
    /// # Errors
    /// Returns an error when the phrase is blank or the action parameters are invalid.
    pub fn new(phrase: &str, action: ActionKind) -> Result<Self> {
        let phrase = normalize_utterance(phrase);
        if phrase.is_empty() {
            bail!("command phrase must not be empty");
        }
        action
            .validate()
            .with_context(|| format!("invalid action for phrase `{phrase}`"))?;
        Ok(Self { phrase, action })
    }
}

/// On-disk shape of `commands.json`.
#[derive(Debug, Deserialize)]
struct CommandsFile {
    commands: Vec<CommandEntry>,
}

/// Immutable phrase → action table, ordered lexicographically by phrase.
#[derive(Clone, Debug)]
pub struct CommandRegistry {
    entries: BTreeMap<String, ActionKind>,
}

impl CommandRegistry {
    /// Builds a registry from validated entries.
    ///
    /// # Errors
    /// Returns an error if an entry is invalid or two entries share a phrase.
    pub fn new(entries: impl IntoIterator<Item = CommandEntry>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for entry in entries {
            let entry = CommandEntry::new(&entry.phrase, entry.action)?;
            if map.contains_key(&entry.phrase) {
                bail!("duplicate command phrase `{}`", entry.phrase);
            }
            map.insert(entry.phrase, entry.action);
        }
        if map.is_empty() {
            bail!("command registry must contain at least one phrase");
        }
        Ok(Self { entries: map })
    }

    /// Loads the registry from `path`, falling back to the built-in table.
    ///
    /// # Details
    /// A missing file silently selects the defaults; an unreadable or invalid
    /// file is logged and also selects the defaults.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::builtin();
        }
        Self::from_file(path).unwrap_or_else(|err| {
            warn!(
                "event=registry_load status=fallback path={} error={:#}",
                path.display(),
                err
            );
            Self::builtin()
        })
    }

    /// Reads and validates a `commands.json` file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let parsed: CommandsFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Self::new(parsed.commands)
    }

    /// The default command table.
    pub fn builtin() -> Self {
        Self {
            entries: default_entries()
                .into_iter()
                .map(|(phrase, action)| (phrase.to_string(), action))
                .collect(),
        }
    }

    /// Looks up the entry for an exact canonical phrase.
    pub fn get(&self, phrase: &str) -> Option<CommandEntry> {
        self.entries.get(phrase).map(|action| CommandEntry {
            phrase: phrase.to_string(),
            action: action.clone(),
        })
    }

    /// Iterates phrases and actions in lexicographic phrase order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ActionKind)> {
        self.entries
            .iter()
            .map(|(phrase, action)| (phrase.as_str(), action))
    }

    /// Every phrase that triggers exactly `action`.
    pub fn phrases_for(&self, action: &ActionKind) -> Vec<&str> {
        self.iter()
            .filter(|(_, candidate)| *candidate == action)
            .map(|(phrase, _)| phrase)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn open_url(url: &str, feedback: &str) -> ActionKind {
    ActionKind::OpenUrl {
        url: url.to_string(),
        feedback: feedback.to_string(),
    }
}

fn open_app(target: &str, fallback: &str, feedback: &str) -> ActionKind {
    ActionKind::OpenApp {
        target: target.to_string(),
        fallback: Some(fallback.to_string()),
        feedback: feedback.to_string(),
    }
}

fn close_app(process: &str, feedback: &str) -> ActionKind {
    ActionKind::CloseApp {
        process: process.to_string(),
        feedback: feedback.to_string(),
    }
}

fn note(action: NoteAction) -> ActionKind {
    ActionKind::Note {
        action,
        category_hint: None,
    }
}

fn note_category(hint: &str) -> ActionKind {
    ActionKind::Note {
        action: NoteAction::ReadCategory,
        category_hint: Some(hint.to_string()),
    }
}

fn smart_home(action: SmartHomeAction, all: bool) -> ActionKind {
    ActionKind::SmartHome { action, all }
}

/// Built-in phrase table.
fn default_entries() -> Vec<(&'static str, ActionKind)> {
    use ActionKind::*;
    vec![
        ("hello jarvis", Assistant { target: AssistantTarget::Greet }),
        ("how are you", Assistant { target: AssistantTarget::Status }),
        ("exit", Assistant { target: AssistantTarget::Exit }),
        ("quit", Assistant { target: AssistantTarget::Exit }),
        ("goodbye", Assistant { target: AssistantTarget::Exit }),
        ("open google", open_url("https://www.google.com", "Google")),
        ("open youtube", open_url("https://www.youtube.com", "YouTube")),
        ("open github", open_url("https://github.com", "GitHub")),
        ("open linkedin", open_url("https://www.linkedin.com", "LinkedIn")),
        ("open chrome", open_app("chrome.exe", "google-chrome", "Chrome")),
        ("open firefox", open_app("firefox.exe", "firefox", "Firefox")),
        ("open edge", open_app("msedge.exe", "microsoft-edge", "Edge")),
        ("open spotify", open_app("Spotify.exe", "spotify", "Spotify")),
        ("open calculator", open_app("Calculator.exe", "gnome-calculator", "Calculator")),
        ("open notepad", open_app("notepad.exe", "gedit", "Notepad")),
        ("open vlc", open_app("vlc.exe", "vlc", "VLC Media Player")),
        ("open discord", open_app("Discord.exe", "discord", "Discord")),
        ("open vs code", open_app("Code.exe", "code", "VS Code")),
        ("open music player", open_app("wmplayer.exe", "rhythmbox", "the music player")),
        ("close chrome", close_app("chrome", "Chrome")),
        ("close firefox", close_app("firefox", "Firefox")),
        ("close edge", close_app("msedge", "Edge")),
        ("close spotify", close_app("spotify", "Spotify")),
        ("close calculator", close_app("calculator", "Calculator")),
        ("close notepad", close_app("notepad", "Notepad")),
        ("close vlc", close_app("vlc", "VLC Media Player")),
        ("close discord", close_app("discord", "Discord")),
        ("close vs code", close_app("code", "VS Code")),
        ("close active window", CloseActiveWindow),
        ("set volume to", Volume { action: VolumeAction::Set }),
        ("increase volume", Volume { action: VolumeAction::Increase }),
        ("decrease volume", Volume { action: VolumeAction::Decrease }),
        ("mute volume", Volume { action: VolumeAction::Mute }),
        ("unmute volume", Volume { action: VolumeAction::Unmute }),
        ("time", Info { target: InfoTarget::Time }),
        ("date", Info { target: InfoTarget::Date }),
        ("day", Info { target: InfoTarget::Day }),
        ("weather", Info { target: InfoTarget::Weather }),
        ("search google for", Search { engine: SearchEngine::Google }),
        ("find on google", Search { engine: SearchEngine::Google }),
        ("search youtube for", Search { engine: SearchEngine::Youtube }),
        ("find on youtube", Search { engine: SearchEngine::Youtube }),
        ("search github for", Search { engine: SearchEngine::Github }),
        ("what is", AiQuery),
        ("who is", AiQuery),
        ("tell me about", AiQuery),
        ("ask jarvis", AiQuery),
        ("when is", AiQuery),
        ("where is", AiQuery),
        ("why is", AiQuery),
        ("how to", AiQuery),
        ("explain", AiQuery),
        ("analyze text", Analyze),
        ("what is the sentiment of this", Analyze),
        ("summarize document", SummarizeText),
        ("summarize this text", SummarizeText),
        ("remember this", note(NoteAction::Add)),
        ("take a note", note(NoteAction::Add)),
        ("store this", note(NoteAction::Add)),
        ("what do you remember", note(NoteAction::ReadAll)),
        ("read my notes", note(NoteAction::ReadAll)),
        ("show my notes", note(NoteAction::ReadAll)),
        ("show me my notes", note(NoteAction::ReadAll)),
        ("list my memories", note(NoteAction::ReadAll)),
        ("summarize my memories", note(NoteAction::Summarize)),
        ("forget note", note(NoteAction::Delete)),
        ("delete note", note(NoteAction::Delete)),
        ("clear all notes", note(NoteAction::ClearAll)),
        ("show notes in category", note(NoteAction::ReadCategory)),
        ("what are my ideas", note_category("idea")),
        ("what are my tasks", note_category("task")),
        ("what is on my shopping list", note_category("shopping list")),
        ("add reminder", Calendar { action: CalendarAction::AddReminder }),
        ("set reminder", Calendar { action: CalendarAction::AddReminder }),
        ("add event", Calendar { action: CalendarAction::AddEvent }),
        ("show reminders", Calendar { action: CalendarAction::ShowUpcoming }),
        ("what are my appointments", Calendar { action: CalendarAction::ShowUpcoming }),
        ("delete reminder", Calendar { action: CalendarAction::Delete }),
        ("clear all reminders", Calendar { action: CalendarAction::ClearAll }),
        ("play music", Media { action: MediaAction::Play }),
        ("resume music", Media { action: MediaAction::Play }),
        ("pause music", Media { action: MediaAction::Pause }),
        ("next song", Media { action: MediaAction::Next }),
        ("skip song", Media { action: MediaAction::Next }),
        ("previous song", Media { action: MediaAction::Previous }),
        ("play local music", Music { action: MusicAction::PlayLocal }),
        ("play song", Music { action: MusicAction::PlaySong }),
        ("stop music", Music { action: MusicAction::Stop }),
        ("start listening", Hotword { enable: true }),
        ("enable hotword", Hotword { enable: true }),
        ("stop listening", Hotword { enable: false }),
        ("disable hotword", Hotword { enable: false }),
        ("turn on lights", smart_home(SmartHomeAction::LightsOn, true)),
        ("turn on all lights", smart_home(SmartHomeAction::LightsOn, true)),
        ("turn off lights", smart_home(SmartHomeAction::LightsOff, true)),
        ("turn off all lights", smart_home(SmartHomeAction::LightsOff, true)),
        ("turn on the", smart_home(SmartHomeAction::LightsOn, false)),
        ("turn off the", smart_home(SmartHomeAction::LightsOff, false)),
        ("set light brightness to", smart_home(SmartHomeAction::Brightness, false)),
        ("set light color to", smart_home(SmartHomeAction::Color, false)),
        ("set thermostat to", smart_home(SmartHomeAction::Thermostat, false)),
        ("lock doors", smart_home(SmartHomeAction::LockDoors, false)),
        ("unlock doors", smart_home(SmartHomeAction::UnlockDoors, false)),
        ("what are the lights doing", smart_home(SmartHomeAction::Status, false)),
    ]
}
