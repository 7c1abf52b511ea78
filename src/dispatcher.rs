/*
 * @file dispatcher.rs
 * @brief Routes matched commands to their handlers
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

//! Action dispatch: turns a matched command and the raw utterance into an
//! [`Outcome`], filling missing parameters through the slot filler.
//!
//! Every action declares its slots in [`required_slots`]; they are filled in
//! that order before the handler runs. Text following the longest trigger
//! phrase of the same action ("search google for rust borrow checker")
//! fills the action's inline slot without a prompt. Unmatched utterances go
//! to the AI collaborator.

use anyhow::Context;
use log::{debug, info, warn};

use crate::ai::{sentiment_prompt, summary_prompt};
use crate::calendar::{describe_when, EntryKind};
use crate::commands::{
    ActionKind, AssistantTarget, CalendarAction, CommandEntry, InfoTarget, MediaAction,
    MusicAction, NoteAction, SearchEngine, SmartHomeAction, VolumeAction,
};
use crate::datetime::resolve;
use crate::devices::DeviceCommand;
use crate::notes::{self, KeywordDeletion, NoteEntry};
use crate::session::Session;
use crate::slots::{parse_number, Aborted, Slot};
use crate::system::VolumeChange;

/// Normalized result of handling one utterance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// The action was abandoned; the reason has already been spoken.
    Failure(String),
    /// The user asked to end the session.
    Terminate,
}

/// Spoken when a required slot is met with silence or an invalid reply.
pub const ABORT_MESSAGE: &str = "No information provided, aborting.";

const AI_APOLOGY: &str = "Sorry, I couldn't get an answer for that right now.";

const NO_BRIDGE: &str = "No smart-home bridge is configured.";

pub const SEARCH_QUERY: Slot = Slot {
    name: "query",
    prompt: "What exactly do you want me to search for?",
};
pub const QUESTION: Slot = Slot {
    name: "question",
    prompt: "What would you like to ask?",
};
pub const ANALYSIS_TEXT: Slot = Slot {
    name: "text",
    prompt: "What text would you like me to analyze?",
};
pub const SUMMARY_TEXT: Slot = Slot {
    name: "text",
    prompt: "What document or text should I summarize?",
};
pub const NOTE_TEXT: Slot = Slot {
    name: "note",
    prompt: "What do you want me to remember?",
};
pub const NOTE_CATEGORY: Slot = Slot {
    name: "category",
    prompt: "What category should this note go under? For example idea, task or shopping list.",
};
pub const CATEGORY_QUERY: Slot = Slot {
    name: "category",
    prompt: "Which category of notes would you like me to read?",
};
pub const NOTE_TARGET: Slot = Slot {
    name: "target",
    prompt: "Which note should I forget? Tell me its ID or a keyword from it.",
};
pub const EVENT_TEXT: Slot = Slot {
    name: "text",
    prompt: "What is the reminder or event for?",
};
pub const EVENT_WHEN: Slot = Slot {
    name: "when",
    prompt: "When should I add this? For example, 'tomorrow at 3 PM', 'next Monday', or 'today'.",
};
pub const EVENT_ID: Slot = Slot {
    name: "id",
    prompt: "Which reminder or event would you like to delete? Please tell me the ID number.",
};
pub const VOLUME_LEVEL: Slot = Slot {
    name: "level",
    prompt: "To what percentage would you like to set the volume?",
};
pub const VOLUME_STEP: Slot = Slot {
    name: "amount",
    prompt: "By how much? For example, by 10 or 20 percent.",
};
pub const SONG: Slot = Slot {
    name: "song",
    prompt: "What song would you like me to play?",
};
pub const LIGHT: Slot = Slot {
    name: "light",
    prompt: "Which light?",
};
pub const BRIGHTNESS: Slot = Slot {
    name: "brightness",
    prompt: "To what percentage brightness?",
};
pub const COLOR: Slot = Slot {
    name: "color",
    prompt: "To what color?",
};
pub const TEMPERATURE: Slot = Slot {
    name: "temperature",
    prompt: "What temperature should I set the thermostat to?",
};

/// Replies that decline to name a note category.
const DECLINE: [&str; 5] = ["no", "none", "skip", "nothing", "no category"];

/// The slots an action asks for, in the order they are asked.
///
/// # Details
/// A slot already supplied inline is skipped, but the order of the remaining
/// prompts never changes. `NOTE_CATEGORY` is optional: silence on every
/// attempt leaves it unset instead of aborting.
pub fn required_slots(action: &ActionKind) -> &'static [Slot] {
    match action {
        ActionKind::Search { .. } => &[SEARCH_QUERY],
        ActionKind::AiQuery => &[QUESTION],
        ActionKind::Analyze => &[ANALYSIS_TEXT],
        ActionKind::SummarizeText => &[SUMMARY_TEXT],
        ActionKind::Note { action, category_hint } => match action {
            NoteAction::Add => &[NOTE_TEXT, NOTE_CATEGORY],
            NoteAction::ReadCategory if category_hint.is_none() => &[CATEGORY_QUERY],
            NoteAction::Delete => &[NOTE_TARGET],
            _ => &[],
        },
        ActionKind::Calendar { action } => match action {
            CalendarAction::AddReminder | CalendarAction::AddEvent => &[EVENT_TEXT, EVENT_WHEN],
            CalendarAction::Delete => &[EVENT_ID],
            _ => &[],
        },
        ActionKind::Volume { action } => match action {
            VolumeAction::Set => &[VOLUME_LEVEL],
            VolumeAction::Increase | VolumeAction::Decrease => &[VOLUME_STEP],
            _ => &[],
        },
        ActionKind::Music {
            action: MusicAction::PlaySong,
        } => &[SONG],
        ActionKind::SmartHome { action, all } => match action {
            SmartHomeAction::LightsOn | SmartHomeAction::LightsOff if !*all => &[LIGHT],
            SmartHomeAction::Brightness => &[LIGHT, BRIGHTNESS],
            SmartHomeAction::Color => &[LIGHT, COLOR],
            SmartHomeAction::Thermostat => &[TEMPERATURE],
            _ => &[],
        },
        _ => &[],
    }
}

/// The declared slot that text spoken after the trigger phrase fills.
///
/// # Details
/// Adds take their subject inline ("remember this buy milk"); every other
/// action takes its last declared slot ("set light brightness to 40").
pub fn inline_slot(action: &ActionKind) -> Option<Slot> {
    match action {
        ActionKind::Note {
            action: NoteAction::Add,
            ..
        } => Some(NOTE_TEXT),
        ActionKind::Calendar {
            action: CalendarAction::AddReminder | CalendarAction::AddEvent,
        } => Some(EVENT_TEXT),
        _ => required_slots(action).last().copied(),
    }
}

/// Text after the longest of `prefixes` found in `raw`, or empty when none occurs.
///
/// # Arguments
/// * `raw` - The normalized utterance.
/// * `prefixes` - Every trigger phrase of the matched action.
///
/// # Returns
/// The trimmed remainder, which may be empty.
pub fn extract_inline(raw: &str, prefixes: &[&str]) -> String {
    prefixes
        .iter()
        .filter(|prefix| !prefix.is_empty())
        .filter_map(|prefix| raw.find(prefix).map(|at| (prefix.len(), at + prefix.len())))
        .max_by_key(|(len, _)| *len)
        .map(|(_, end)| raw[end..].trim().to_string())
        .unwrap_or_default()
}

/// Validates one reply for `slot`, returning the value to keep.
///
/// # Details
/// Percentages must be at most 100; ids and temperatures only need a number;
/// free-text slots accept any non-blank reply.
fn accept(slot: &Slot, reply: &str) -> Option<String> {
    match slot.name {
        "level" | "amount" | "brightness" => parse_number(reply)
            .filter(|value| *value <= 100)
            .map(|value| value.to_string()),
        "id" | "temperature" => parse_number(reply).map(|value| value.to_string()),
        _ => {
            let text = reply.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
    }
}

/// Values gathered for an action's declared slots.
#[derive(Debug, Default)]
struct SlotValues(Vec<(Slot, String)>);

impl SlotValues {
    fn insert(&mut self, slot: Slot, value: String) {
        self.0.push((slot, value));
    }

    fn get(&self, slot: &Slot) -> Option<&str> {
        self.0
            .iter()
            .find(|(filled, _)| filled == slot)
            .map(|(_, value)| value.as_str())
    }

    /// A filled free-text slot; empty only for slots the action never declared.
    fn text(&self, slot: &Slot) -> String {
        self.get(slot).unwrap_or_default().to_string()
    }

    /// A filled numeric slot; `accept` guarantees it parses.
    fn number(&self, slot: &Slot) -> u32 {
        self.get(slot).and_then(parse_number).unwrap_or_default()
    }
}

/// Why a handler stopped before producing an outcome.
enum Interrupt {
    Aborted,
    Failed(anyhow::Error),
}

impl From<Aborted> for Interrupt {
    fn from(_: Aborted) -> Self {
        Interrupt::Aborted
    }
}

impl From<anyhow::Error> for Interrupt {
    fn from(err: anyhow::Error) -> Self {
        Interrupt::Failed(err)
    }
}

type Handled = Result<Outcome, Interrupt>;

impl Session {
    /// Runs the handler for a matched command.
    ///
    /// # Arguments
    /// * `entry` - The registry entry the matcher picked.
    /// * `raw` - The normalized utterance, used for inline parameters.
    ///
    /// # Details
    /// Failures are spoken before returning; store corruption warnings raised
    /// while handling are announced afterwards.
    pub fn dispatch(&mut self, entry: &CommandEntry, raw: &str) -> Outcome {
        info!(
            "event=dispatch phrase=\"{}\" action={:?}",
            entry.phrase, entry.action
        );
        let inline = self.inline_text(entry, raw);
        let handled = self.run_action(&entry.action, inline);
        self.finish(&entry.phrase, handled)
    }

    /// Default case for utterances that matched no command.
    pub fn dispatch_unmatched(&mut self, raw: &str) -> Outcome {
        info!("event=dispatch status=unmatched text=\"{}\"", raw);
        self.slots.say(&format!(
            "I didn't recognize '{raw}' specifically. Let me think about that."
        ));
        let handled = self.answer(raw);
        self.finish("<ai fallback>", handled)
    }

    fn finish(&mut self, label: &str, handled: Handled) -> Outcome {
        let outcome = match handled {
            Ok(outcome) => outcome,
            Err(Interrupt::Aborted) => {
                info!("event=dispatch phrase=\"{}\" status=aborted", label);
                Outcome::Failure(ABORT_MESSAGE.to_string())
            }
            Err(Interrupt::Failed(err)) => {
                warn!(
                    "event=dispatch phrase=\"{}\" status=error error={:#}",
                    label, err
                );
                Outcome::Failure(err.to_string())
            }
        };
        if let Outcome::Failure(reason) = &outcome {
            self.slots.say(reason);
        }
        self.announce_store_warnings();
        outcome
    }

    fn announce_store_warnings(&mut self) {
        let warnings: Vec<String> = self
            .notes
            .take_warnings()
            .into_iter()
            .chain(self.calendar.take_warnings())
            .collect();
        for warning in warnings {
            self.slots.say(&warning);
        }
    }

    fn inline_text(&self, entry: &CommandEntry, raw: &str) -> String {
        let mut prefixes = self.registry.phrases_for(&entry.action);
        if !prefixes.contains(&entry.phrase.as_str()) {
            prefixes.push(&entry.phrase);
        }
        let inline = extract_inline(raw, &prefixes);
        if !inline.is_empty() {
            debug!("event=dispatch inline=\"{}\"", inline);
        }
        inline
    }

    /// Fills every declared slot of `action` in order.
    ///
    /// # Returns
    /// * `Ok(values)` - Every required slot holds a validated value.
    /// * `Err(Aborted)` - A required slot met silence or an invalid reply.
    fn fill_required(&mut self, action: &ActionKind, inline: &str) -> Result<SlotValues, Aborted> {
        let inline_target = inline_slot(action);
        let mut values = SlotValues::default();
        for slot in required_slots(action) {
            if inline_target.as_ref() == Some(slot) {
                if let Some(value) = accept(slot, inline) {
                    values.insert(*slot, value);
                    continue;
                }
            }
            if *slot == NOTE_CATEGORY {
                let attempts = self.config.category_attempts;
                let category = self
                    .slots
                    .fill_or_default(slot, attempts, None, |reply| Some(named_category(reply)))?;
                if let Some(category) = category {
                    values.insert(*slot, category);
                }
                continue;
            }
            let value = self.slots.fill_slot(slot, |reply| accept(slot, reply))?;
            values.insert(*slot, value);
        }
        Ok(values)
    }

    fn run_action(&mut self, action: &ActionKind, inline: String) -> Handled {
        if matches!(action, ActionKind::SmartHome { .. }) && self.home.is_none() {
            return Ok(Outcome::Failure(NO_BRIDGE.to_string()));
        }
        let values = self.fill_required(action, &inline)?;
        match action {
            ActionKind::Assistant { target } => Ok(self.assistant(*target)),
            ActionKind::OpenUrl { url, feedback } => {
                self.slots.say(&format!("Opening {feedback} for you."));
                self.system
                    .open_url(url)
                    .with_context(|| format!("I'm sorry, I couldn't open {feedback}."))?;
                Ok(Outcome::Success)
            }
            ActionKind::OpenApp {
                target,
                fallback,
                feedback,
            } => {
                self.slots.say(&format!("Opening {feedback}..."));
                self.system
                    .open_app(target, fallback.as_deref())
                    .with_context(|| format!("I'm sorry, I couldn't open {feedback}."))?;
                self.slots.say(&format!("{feedback} opened."));
                Ok(Outcome::Success)
            }
            ActionKind::CloseApp { process, feedback } => {
                let closed = self
                    .system
                    .close_app(process)
                    .with_context(|| format!("I'm sorry, I couldn't close {feedback}."))?;
                if !closed {
                    return Ok(Outcome::Failure(format!(
                        "I could not find any running instances of {feedback} to close."
                    )));
                }
                self.slots.say(&format!("{feedback} closed."));
                Ok(Outcome::Success)
            }
            ActionKind::CloseActiveWindow => {
                self.system
                    .close_active_window()
                    .context("I couldn't close the active window.")?;
                self.slots.say("Active window closed.");
                Ok(Outcome::Success)
            }
            ActionKind::Info { target } => self.info(*target),
            ActionKind::Search { engine } => self.search(*engine, &values.text(&SEARCH_QUERY)),
            ActionKind::AiQuery => self.answer(&values.text(&QUESTION)),
            ActionKind::Analyze => {
                let prompt = sentiment_prompt(&values.text(&ANALYSIS_TEXT));
                let verdict = self.ai.ask_open_ended(&prompt).context(AI_APOLOGY)?;
                self.slots.say(&format!("Sentiment analysis: {verdict}"));
                Ok(Outcome::Success)
            }
            ActionKind::SummarizeText => {
                let prompt = summary_prompt(&values.text(&SUMMARY_TEXT));
                self.slots.say("Summarizing that for you.");
                let summary = self.ai.ask_open_ended(&prompt).context(AI_APOLOGY)?;
                self.slots.say(&summary);
                Ok(Outcome::Success)
            }
            ActionKind::Note {
                action,
                category_hint,
            } => self.note(*action, category_hint.as_deref(), &values),
            ActionKind::Calendar { action } => self.calendar_action(*action, &values),
            ActionKind::Volume { action } => self.volume(*action, &values),
            ActionKind::Media { action } => {
                self.system
                    .media(*action)
                    .context("I couldn't reach the media player.")?;
                self.slots.say(match action {
                    MediaAction::Play => "Playing music.",
                    MediaAction::Pause => "Music paused.",
                    MediaAction::Next => "Skipping to the next song.",
                    MediaAction::Previous => "Going back to the previous song.",
                });
                Ok(Outcome::Success)
            }
            ActionKind::Music { action } => self.music_action(*action, &values),
            ActionKind::SmartHome { action, all } => {
                self.smart_home(*action, *all, &values, inline)
            }
            ActionKind::Hotword { enable } => {
                self.hotword_enabled = *enable;
                info!("event=hotword enabled={}", enable);
                if *enable {
                    let hotword = self.config.hotword.clone();
                    self.slots.say(&format!(
                        "Hotword listening enabled. Say '{hotword}' to get my attention."
                    ));
                } else {
                    self.slots
                        .say("Hotword listening disabled. I'm listening for commands directly.");
                }
                Ok(Outcome::Success)
            }
        }
    }

    fn assistant(&mut self, target: AssistantTarget) -> Outcome {
        let name = self.config.assistant_name.clone();
        match target {
            AssistantTarget::Greet => {
                self.slots
                    .say(&format!("Hello. How can {name} assist you today?"));
                Outcome::Success
            }
            AssistantTarget::Status => {
                self.slots
                    .say(&format!("I am fine, thank you. {name} is ready to assist."));
                Outcome::Success
            }
            AssistantTarget::Exit => {
                self.slots
                    .say(&format!("Goodbye! Have a great day from {name}!"));
                Outcome::Terminate
            }
        }
    }

    fn info(&mut self, target: InfoTarget) -> Handled {
        let now = self.now();
        let report = match target {
            InfoTarget::Time => format!("The current time is {}.", now.format("%I:%M %p")),
            InfoTarget::Date => format!("Today's date is {}.", now.format("%A, %B %d, %Y")),
            InfoTarget::Day => format!("Today is {}.", now.format("%A")),
            InfoTarget::Weather => {
                let city = self.config.city.clone();
                self.system.weather(&city)?
            }
        };
        self.slots.say(&report);
        Ok(Outcome::Success)
    }

    fn search(&mut self, engine: SearchEngine, query: &str) -> Handled {
        let url = engine.search_url(query)?;
        self.slots
            .say(&format!("Searching {} for {query}.", engine.label()));
        self.system
            .open_url(&url)
            .context("I'm sorry, I couldn't open the search page.")?;
        Ok(Outcome::Success)
    }

    fn answer(&mut self, question: &str) -> Handled {
        let answer = self.ai.ask_open_ended(question).context(AI_APOLOGY)?;
        self.slots.say(&answer);
        Ok(Outcome::Success)
    }

    fn read_out(&mut self, entries: &[NoteEntry], empty: &str) {
        if entries.is_empty() {
            self.slots.say(empty);
            return;
        }
        self.slots.say("Here is what I remember:");
        for entry in entries {
            self.slots.say(&format!(
                "Note {}, {}: {}",
                entry.id, entry.category, entry.text
            ));
        }
    }

    fn note(&mut self, action: NoteAction, hint: Option<&str>, values: &SlotValues) -> Handled {
        match action {
            NoteAction::Add => {
                let entry = self
                    .notes
                    .add(&values.text(&NOTE_TEXT), values.get(&NOTE_CATEGORY))
                    .context("I couldn't save that note.")?;
                self.slots.say(&format!(
                    "Okay, I've remembered '{}' under {}.",
                    entry.text, entry.category
                ));
                Ok(Outcome::Success)
            }
            NoteAction::ReadAll => {
                let entries = self.notes.read_all();
                self.read_out(&entries, "I don't have anything in my memory yet.");
                Ok(Outcome::Success)
            }
            NoteAction::ReadCategory => {
                let category = match hint {
                    Some(hint) => hint.to_string(),
                    None => values.text(&CATEGORY_QUERY),
                };
                let entries = self.notes.read_by_category(&category);
                self.read_out(
                    &entries,
                    &format!("I don't have any notes in the {category} category."),
                );
                Ok(Outcome::Success)
            }
            NoteAction::Summarize => {
                let entries = self.notes.read_all();
                if entries.is_empty() {
                    self.slots.say("I don't have anything in my memory yet.");
                    return Ok(Outcome::Success);
                }
                let summary =
                    notes::summarize(&entries, self.ai.as_mut()).context(AI_APOLOGY)?;
                self.slots
                    .say(&format!("Here's a summary of your notes: {summary}"));
                Ok(Outcome::Success)
            }
            NoteAction::Delete => {
                let target = values.text(&NOTE_TARGET);
                match explicit_id(&target) {
                    Some(id) => self.forget_id(id),
                    None => self.forget_keyword(&target),
                }
            }
            NoteAction::ClearAll => {
                let cleared = self
                    .notes
                    .clear_all(&mut self.slots)
                    .context("I couldn't clear your notes.")?;
                if cleared {
                    self.slots.say("All notes have been cleared.");
                } else {
                    self.slots.say("Understood. I will keep your notes intact.");
                }
                Ok(Outcome::Success)
            }
        }
    }

    fn forget_id(&mut self, id: u64) -> Handled {
        let removed = self
            .notes
            .delete_by_id(id)
            .context("I couldn't update my memory.")?;
        if !removed {
            return Ok(Outcome::Failure(format!(
                "I couldn't find a note with ID {id}."
            )));
        }
        self.slots.say(&format!("Okay, I've forgotten note {id}."));
        Ok(Outcome::Success)
    }

    fn forget_keyword(&mut self, keyword: &str) -> Handled {
        let deletion = self
            .notes
            .delete_by_keyword(keyword, &mut self.slots)
            .context("I couldn't update my memory.")?;
        match deletion {
            KeywordDeletion::NotFound => Ok(Outcome::Failure(format!(
                "I couldn't find any notes matching '{keyword}'."
            ))),
            KeywordDeletion::Cancelled => Ok(Outcome::Failure(
                "No valid ID was given, so I haven't deleted anything.".to_string(),
            )),
            KeywordDeletion::Deleted(entry) => {
                self.slots
                    .say(&format!("Okay, I've forgotten the note: '{}'.", entry.text));
                Ok(Outcome::Success)
            }
        }
    }

    fn calendar_action(&mut self, action: CalendarAction, values: &SlotValues) -> Handled {
        match action {
            CalendarAction::AddReminder | CalendarAction::AddEvent => {
                let kind = if action == CalendarAction::AddReminder {
                    EntryKind::Reminder
                } else {
                    EntryKind::Event
                };
                let when = resolve(&values.text(&EVENT_WHEN), self.now());
                let entry = self
                    .calendar
                    .add(kind, &values.text(&EVENT_TEXT), when)
                    .context("I couldn't save that to your calendar.")?;
                self.slots.say(&format!(
                    "Okay, I've added your {} for '{}' on {}.",
                    entry.kind,
                    entry.text,
                    describe_when(&entry.when)
                ));
                Ok(Outcome::Success)
            }
            CalendarAction::ShowUpcoming => {
                let now = self.now();
                let upcoming = self.calendar.list_upcoming(now);
                if upcoming.is_empty() {
                    self.slots
                        .say("You have no upcoming reminders or appointments.");
                    return Ok(Outcome::Success);
                }
                self.slots
                    .say("Here are your upcoming reminders and appointments:");
                for entry in &upcoming {
                    self.slots.say(&format!(
                        "ID {}: {} on {}.",
                        entry.id,
                        entry.text,
                        describe_when(&entry.when)
                    ));
                }
                Ok(Outcome::Success)
            }
            CalendarAction::Delete => {
                let id = u64::from(values.number(&EVENT_ID));
                let removed = self
                    .calendar
                    .delete_by_id(id)
                    .context("I couldn't update your calendar.")?;
                if !removed {
                    return Ok(Outcome::Failure(format!(
                        "I could not find a reminder or event with ID {id}."
                    )));
                }
                self.slots.say(&format!(
                    "Reminder or event with ID {id} has been deleted."
                ));
                Ok(Outcome::Success)
            }
            CalendarAction::ClearAll => {
                let cleared = self
                    .calendar
                    .clear_all(&mut self.slots)
                    .context("I couldn't clear your calendar.")?;
                if cleared {
                    self.slots
                        .say("All reminders and events have been cleared.");
                } else {
                    self.slots
                        .say("Understood. I will keep your reminders intact.");
                }
                Ok(Outcome::Success)
            }
        }
    }

    fn volume(&mut self, action: VolumeAction, values: &SlotValues) -> Handled {
        let change = match action {
            VolumeAction::Set => VolumeChange::Set(values.number(&VOLUME_LEVEL).min(100) as u8),
            VolumeAction::Increase | VolumeAction::Decrease => {
                let step = values.number(&VOLUME_STEP).min(100) as i32;
                VolumeChange::By(if action == VolumeAction::Increase {
                    step
                } else {
                    -step
                })
            }
            VolumeAction::Mute => VolumeChange::Mute,
            VolumeAction::Unmute => VolumeChange::Unmute,
        };
        let level = self
            .system
            .set_volume(change)
            .context("I couldn't change the volume.")?;
        let report = match (change, level) {
            (VolumeChange::Mute, _) => "Volume muted.".to_string(),
            (VolumeChange::Unmute, _) => "Volume unmuted.".to_string(),
            (VolumeChange::Set(set), None) => format!("Volume set to {set} percent."),
            (_, Some(level)) => format!("Volume is now {level} percent."),
            (VolumeChange::By(_), None) => "Volume adjusted.".to_string(),
        };
        self.slots.say(&report);
        Ok(Outcome::Success)
    }

    fn music_action(&mut self, action: MusicAction, values: &SlotValues) -> Handled {
        match action {
            MusicAction::PlayLocal => {
                let track = self.music.play_first()?;
                self.slots.say(&format!(
                    "Playing '{}' from your local library.",
                    track_name(&track)
                ));
                Ok(Outcome::Success)
            }
            MusicAction::PlaySong => {
                let song = values.text(&SONG);
                match self.music.play_named(&song)? {
                    Some(track) => {
                        self.slots.say(&format!(
                            "Playing '{}' from your local library.",
                            track_name(&track)
                        ));
                        Ok(Outcome::Success)
                    }
                    None => Ok(Outcome::Failure(format!(
                        "Sorry, I could not find a song named '{song}' in your music directory."
                    ))),
                }
            }
            MusicAction::Stop => {
                if self.music.stop() {
                    self.slots.say("Music stopped.");
                } else {
                    self.slots.say("Nothing is playing right now.");
                }
                Ok(Outcome::Success)
            }
        }
    }

    fn smart_home(
        &mut self,
        action: SmartHomeAction,
        all: bool,
        values: &SlotValues,
        inline: String,
    ) -> Handled {
        let command = match action {
            SmartHomeAction::LightsOn | SmartHomeAction::LightsOff => DeviceCommand::Lights {
                on: action == SmartHomeAction::LightsOn,
                light: (!all).then(|| values.text(&LIGHT)),
            },
            SmartHomeAction::Brightness => DeviceCommand::Brightness {
                light: values.text(&LIGHT),
                percent: values.number(&BRIGHTNESS).min(100) as u8,
            },
            SmartHomeAction::Color => DeviceCommand::Color {
                light: values.text(&LIGHT),
                color: values.text(&COLOR),
            },
            SmartHomeAction::Thermostat => DeviceCommand::Thermostat {
                degrees: values.number(&TEMPERATURE),
            },
            SmartHomeAction::LockDoors => DeviceCommand::Locks { locked: true },
            SmartHomeAction::UnlockDoors => DeviceCommand::Locks { locked: false },
            SmartHomeAction::Status => DeviceCommand::Status {
                light: (!inline.is_empty()).then_some(inline),
            },
        };
        let Some(home) = self.home.as_mut() else {
            return Ok(Outcome::Failure(NO_BRIDGE.to_string()));
        };
        let reply = home
            .send(&command)
            .context("I couldn't reach the smart-home bridge.")?;
        self.slots.say(&confirmation(&command));
        if !reply.is_empty() {
            self.slots.say(&reply);
        }
        Ok(Outcome::Success)
    }
}

/// A category reply, or `None` when the user declined to give one.
fn named_category(reply: &str) -> Option<String> {
    let reply = reply.trim();
    if DECLINE.contains(&reply) {
        None
    } else {
        Some(reply.to_string())
    }
}

/// Reads "3", "id 3", "number 3" or "note 3" as an explicit note id.
fn explicit_id(reply: &str) -> Option<u64> {
    let words: Vec<&str> = reply.split_whitespace().collect();
    match words.as_slice() {
        [id] | ["id", id] | ["number", id] | ["note", id] => id.parse().ok(),
        _ => None,
    }
}

fn track_name(track: &std::path::Path) -> String {
    track
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| track.display().to_string())
}

fn confirmation(command: &DeviceCommand) -> String {
    let switch = |on: bool| if on { "on" } else { "off" };
    match command {
        DeviceCommand::Lights { on, light: None } => format!("Turning {} all lights.", switch(*on)),
        DeviceCommand::Lights {
            on,
            light: Some(light),
        } => format!("Turning {} the {light}.", switch(*on)),
        DeviceCommand::Brightness { light, percent } => {
            format!("Setting the {light} to {percent} percent brightness.")
        }
        DeviceCommand::Color { light, color } => format!("Setting the {light} to {color}."),
        DeviceCommand::Thermostat { degrees } => {
            format!("Setting the thermostat to {degrees} degrees.")
        }
        DeviceCommand::Locks { locked: true } => "Locking the doors.".to_string(),
        DeviceCommand::Locks { locked: false } => "Unlocking the doors.".to_string(),
        DeviceCommand::Status { .. } => "Checking the lights.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_text_uses_longest_prefix() {
        let prefixes = ["search google for", "search google"];
        assert_eq!(
            extract_inline("please search google for rust lifetimes", &prefixes),
            "rust lifetimes"
        );
        assert_eq!(extract_inline("search google for", &prefixes), "");
        assert_eq!(extract_inline("look it up", &prefixes), "");
    }

    #[test]
    fn slot_declarations_follow_action_needs() {
        let add = ActionKind::Note {
            action: NoteAction::Add,
            category_hint: None,
        };
        assert_eq!(required_slots(&add), &[NOTE_TEXT, NOTE_CATEGORY]);
        let hinted = ActionKind::Note {
            action: NoteAction::ReadCategory,
            category_hint: Some("idea".to_string()),
        };
        assert!(required_slots(&hinted).is_empty());
        let all_lights = ActionKind::SmartHome {
            action: SmartHomeAction::LightsOn,
            all: true,
        };
        assert!(required_slots(&all_lights).is_empty());
        let event = ActionKind::Calendar {
            action: CalendarAction::AddEvent,
        };
        assert_eq!(
            required_slots(&event).iter().map(|s| s.name).collect::<Vec<_>>(),
            vec!["text", "when"]
        );
    }

    #[test]
    fn inline_text_fills_the_subject_or_the_last_slot() {
        let add = ActionKind::Note {
            action: NoteAction::Add,
            category_hint: None,
        };
        assert_eq!(inline_slot(&add), Some(NOTE_TEXT));
        let brightness = ActionKind::SmartHome {
            action: SmartHomeAction::Brightness,
            all: false,
        };
        assert_eq!(inline_slot(&brightness), Some(BRIGHTNESS));
        assert_eq!(inline_slot(&ActionKind::CloseActiveWindow), None);
    }

    #[test]
    fn replies_are_validated_per_slot() {
        assert_eq!(accept(&VOLUME_LEVEL, "40 percent"), Some("40".to_string()));
        assert_eq!(accept(&VOLUME_LEVEL, "140"), None);
        assert_eq!(accept(&TEMPERATURE, "about 140"), Some("140".to_string()));
        assert_eq!(accept(&SONG, "  blue monday "), Some("blue monday".to_string()));
        assert_eq!(accept(&SONG, "   "), None);
    }

    #[test]
    fn explicit_ids_and_declined_categories() {
        assert_eq!(explicit_id("12"), Some(12));
        assert_eq!(explicit_id("id 4"), Some(4));
        assert_eq!(explicit_id("meeting at 3"), None);
        assert_eq!(named_category("none"), None);
        assert_eq!(named_category("groceries"), Some("groceries".to_string()));
    }

    #[test]
    fn device_confirmations() {
        let lamp = DeviceCommand::Lights {
            on: false,
            light: Some("desk lamp".to_string()),
        };
        assert_eq!(confirmation(&lamp), "Turning off the desk lamp.");
    }
}
