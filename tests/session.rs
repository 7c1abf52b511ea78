//! End-to-end scenarios driven through `Session` with scripted speech and
//! recording fakes for the external collaborators.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{anyhow, Result};
use chrono::{NaiveDate, NaiveDateTime};
use tempfile::TempDir;

use jarvis::ai::{summary_prompt, AiQuery};
use jarvis::calendar::CalendarStore;
use jarvis::commands::{
    ActionKind, CalendarAction, CommandRegistry, MediaAction, NoteAction, SmartHomeAction,
};
use jarvis::config::AppConfig;
use jarvis::devices::{DeviceCommand, SmartHome};
use jarvis::dispatcher::{required_slots, Outcome, ABORT_MESSAGE};
use jarvis::notes::NoteStore;
use jarvis::session::{Collaborators, Session};
use jarvis::speech::{ScriptedInput, TranscriptOutput};
use jarvis::system::{SystemControl, VolumeChange};

type Log = Rc<RefCell<Vec<String>>>;

struct FakeAi {
    prompts: Log,
    reply: Option<String>,
}

impl AiQuery for FakeAi {
    fn ask_open_ended(&mut self, prompt: &str) -> Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        self.reply.clone().ok_or_else(|| anyhow!("model offline"))
    }
}

struct FakeSystem {
    calls: Log,
}

impl SystemControl for FakeSystem {
    fn open_url(&mut self, url: &str) -> Result<()> {
        self.calls.borrow_mut().push(format!("open_url {url}"));
        Ok(())
    }

    fn open_app(&mut self, target: &str, _fallback: Option<&str>) -> Result<()> {
        self.calls.borrow_mut().push(format!("open_app {target}"));
        Ok(())
    }

    fn close_app(&mut self, process: &str) -> Result<bool> {
        self.calls.borrow_mut().push(format!("close_app {process}"));
        Ok(false)
    }

    fn close_active_window(&mut self) -> Result<()> {
        self.calls.borrow_mut().push("close_active_window".to_string());
        Ok(())
    }

    fn set_volume(&mut self, change: VolumeChange) -> Result<Option<u8>> {
        self.calls.borrow_mut().push(format!("volume {change:?}"));
        Ok(match change {
            VolumeChange::Set(level) => Some(level),
            VolumeChange::By(delta) => Some((50 + delta).clamp(0, 100) as u8),
            _ => None,
        })
    }

    fn media(&mut self, action: MediaAction) -> Result<()> {
        self.calls.borrow_mut().push(format!("media {action:?}"));
        Ok(())
    }

    fn weather(&mut self, city: &str) -> Result<String> {
        Ok(format!("It is sunny in {city}."))
    }
}

struct FakeHome {
    sent: Log,
}

impl SmartHome for FakeHome {
    fn send(&mut self, command: &DeviceCommand) -> Result<String> {
        self.sent.borrow_mut().push(command.render());
        Ok(String::new())
    }
}

struct Harness {
    session: Session,
    transcript: TranscriptOutput,
    prompts: Log,
    calls: Log,
    sent: Log,
    notes_path: PathBuf,
    calendar_path: PathBuf,
    _dir: TempDir,
}

fn fixed_now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 10)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn harness_with(replies: &[&str], ai_reply: Option<&str>, with_home: bool) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.notes_path = dir.path().join("memory.json");
    config.calendar_path = dir.path().join("calendar.json");
    config.commands_path = dir.path().join("commands.json");
    let notes_path = config.notes_path.clone();
    let calendar_path = config.calendar_path.clone();

    let transcript = TranscriptOutput::new();
    let prompts = Log::default();
    let calls = Log::default();
    let sent = Log::default();
    let home: Option<Box<dyn SmartHome>> = if with_home {
        Some(Box::new(FakeHome { sent: sent.clone() }))
    } else {
        None
    };
    let parts = Collaborators {
        input: Box::new(ScriptedInput::new(replies.iter().copied())),
        output: Box::new(transcript.clone()),
        ai: Box::new(FakeAi {
            prompts: prompts.clone(),
            reply: ai_reply.map(str::to_string),
        }),
        system: Box::new(FakeSystem {
            calls: calls.clone(),
        }),
        home,
    };
    let session =
        Session::new(config, CommandRegistry::builtin(), parts).with_clock(fixed_now);
    Harness {
        session,
        transcript,
        prompts,
        calls,
        sent,
        notes_path,
        calendar_path,
        _dir: dir,
    }
}

fn harness(replies: &[&str]) -> Harness {
    harness_with(replies, Some("Forty-two."), true)
}

/// Asserts the declared prompts of `action` appear in the transcript in order.
fn assert_prompted_in_order(h: &Harness, action: &ActionKind, skipped: usize) {
    let lines = h.transcript.lines();
    let slots = required_slots(action);
    let positions: Vec<usize> = slots[..slots.len() - skipped]
        .iter()
        .map(|slot| {
            lines
                .iter()
                .position(|line| line == slot.prompt)
                .unwrap_or_else(|| panic!("never asked for {}", slot.name))
        })
        .collect();
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]), "{lines:?}");
    for slot in &slots[slots.len() - skipped..] {
        assert!(!lines.iter().any(|line| line == slot.prompt));
    }
}

#[test]
fn filler_words_still_open_google() {
    let mut h = harness(&[]);
    assert_eq!(
        h.session.handle_utterance("can you open google for me"),
        Outcome::Success
    );
    assert_eq!(
        h.calls.borrow().as_slice(),
        ["open_url https://www.google.com"]
    );
    assert!(h.transcript.mentions("Opening Google"));
}

#[test]
fn remember_this_asks_for_text_then_category() {
    let mut h = harness(&["buy milk", "groceries"]);
    assert_eq!(h.session.handle_utterance("remember this"), Outcome::Success);

    let mut store = NoteStore::new(&h.notes_path, 70);
    let notes = store.read_all();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].id, 1);
    assert_eq!(notes[0].text, "buy milk");
    assert_eq!(notes[0].category, "groceries");
    assert!(h.transcript.mentions("What do you want me to remember?"));
}

#[test]
fn note_prompts_follow_declared_order() {
    let mut h = harness(&["Pick up Dry Cleaning", "Errands"]);
    assert_eq!(h.session.handle_utterance("remember this"), Outcome::Success);
    let add = ActionKind::Note {
        action: NoteAction::Add,
        category_hint: None,
    };
    assert_prompted_in_order(&h, &add, 0);
}

#[test]
fn silent_category_falls_back_to_uncategorized() {
    let mut h = harness(&["call mom", ""]);
    assert_eq!(h.session.handle_utterance("take a note"), Outcome::Success);
    let notes = NoteStore::new(&h.notes_path, 70).read_all();
    assert_eq!(notes[0].category, "uncategorized");
}

#[test]
fn silence_for_a_required_slot_aborts() {
    let mut h = harness(&[""]);
    assert_eq!(
        h.session.handle_utterance("search google for"),
        Outcome::Failure(ABORT_MESSAGE.to_string())
    );
    assert!(h.calls.borrow().is_empty());
    assert!(h.transcript.mentions(ABORT_MESSAGE));
}

#[test]
fn inline_search_text_skips_the_prompt() {
    let mut h = harness(&[]);
    assert_eq!(
        h.session.handle_utterance("search google for rust lifetimes"),
        Outcome::Success
    );
    assert_eq!(
        h.calls.borrow().as_slice(),
        ["open_url https://www.google.com/search?q=rust+lifetimes"]
    );
    assert!(!h.transcript.mentions("What exactly do you want me to search for?"));
}

#[test]
fn forgetting_an_unknown_id_leaves_the_file_untouched() {
    let mut h = harness(&["42"]);
    NoteStore::new(&h.notes_path, 70)
        .add("water the plants", Some("task"))
        .unwrap();
    let before = std::fs::read(&h.notes_path).unwrap();

    let outcome = h.session.handle_utterance("forget note");
    assert!(matches!(outcome, Outcome::Failure(reason) if reason.contains("42")));
    assert_eq!(std::fs::read(&h.notes_path).unwrap(), before);
}

#[test]
fn keyword_deletion_asks_which_note_when_several_match() {
    let mut h = harness(&["milk", "2"]);
    let mut store = NoteStore::new(&h.notes_path, 70);
    store.add("buy milk", Some("shopping list")).unwrap();
    store.add("milk the goats", None).unwrap();
    store.add("renew passport", Some("task")).unwrap();

    assert_eq!(h.session.handle_utterance("forget note"), Outcome::Success);
    let remaining: Vec<u64> = store.read_all().iter().map(|n| n.id).collect();
    assert_eq!(remaining, vec![1, 3]);
    assert!(h.transcript.mentions("Note 2: ID 2, 'milk the goats'"));
}

#[test]
fn reminders_resolve_spoken_times() {
    let mut h = harness(&["call the bank", "tomorrow at 3 pm"]);
    assert_eq!(h.session.handle_utterance("add reminder"), Outcome::Success);

    let entries = CalendarStore::new(&h.calendar_path).all();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].when,
        NaiveDate::from_ymd_opt(2024, 1, 11)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap()
    );

    assert_eq!(h.session.handle_utterance("show reminders"), Outcome::Success);
    assert!(h
        .transcript
        .mentions("ID 1: call the bank on Thursday, January 11 at 03:00 PM."));
}

#[test]
fn event_prompts_follow_declared_order() {
    let mut h = harness(&["dentist", "next monday"]);
    assert_eq!(h.session.handle_utterance("add event"), Outcome::Success);
    let event = ActionKind::Calendar {
        action: CalendarAction::AddEvent,
    };
    assert_prompted_in_order(&h, &event, 0);
    let entries = CalendarStore::new(&h.calendar_path).all();
    assert_eq!(entries[0].text, "dentist");
    assert_eq!(entries[0].when.date(), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
}

#[test]
fn inline_event_text_only_asks_when() {
    let mut h = harness(&["today"]);
    assert_eq!(
        h.session.handle_utterance("add reminder water the plants"),
        Outcome::Success
    );
    let entries = CalendarStore::new(&h.calendar_path).all();
    assert_eq!(entries[0].text, "water the plants");
    assert!(!h.transcript.mentions("What is the reminder or event for?"));
}

#[test]
fn brightness_asks_light_then_level() {
    let mut h = harness(&["kitchen lamp", "50"]);
    assert_eq!(
        h.session.handle_utterance("set light brightness to"),
        Outcome::Success
    );
    let brightness = ActionKind::SmartHome {
        action: SmartHomeAction::Brightness,
        all: false,
    };
    assert_prompted_in_order(&h, &brightness, 0);
    assert_eq!(h.sent.borrow().as_slice(), ["BRIGHTNESS 50 kitchen lamp"]);
}

#[test]
fn inline_brightness_only_asks_for_the_light() {
    let mut h = harness(&["kitchen lamp"]);
    assert_eq!(
        h.session.handle_utterance("set light brightness to 30"),
        Outcome::Success
    );
    let brightness = ActionKind::SmartHome {
        action: SmartHomeAction::Brightness,
        all: false,
    };
    assert_prompted_in_order(&h, &brightness, 1);
    assert_eq!(h.sent.borrow().as_slice(), ["BRIGHTNESS 30 kitchen lamp"]);
}

#[test]
fn color_asks_light_then_color() {
    let mut h = harness(&["desk lamp", "red"]);
    assert_eq!(h.session.handle_utterance("set light color to"), Outcome::Success);
    let color = ActionKind::SmartHome {
        action: SmartHomeAction::Color,
        all: false,
    };
    assert_prompted_in_order(&h, &color, 0);
    assert_eq!(h.sent.borrow().as_slice(), ["COLOR red desk lamp"]);
}

#[test]
fn summarize_document_sends_the_text_to_the_ai() {
    let mut h = harness(&["the quarterly report is late and over budget"]);
    assert_eq!(
        h.session.handle_utterance("summarize document"),
        Outcome::Success
    );
    assert!(h.transcript.mentions("What document or text should I summarize?"));
    assert_eq!(
        h.prompts.borrow().as_slice(),
        [summary_prompt("the quarterly report is late and over budget")]
    );
    assert!(h.transcript.mentions("Forty-two."));
}

#[test]
fn ai_questions_drop_the_trigger_phrase() {
    let mut h = harness(&[]);
    assert_eq!(h.session.handle_utterance("what is rust"), Outcome::Success);
    assert_eq!(h.prompts.borrow().as_slice(), ["rust"]);
    assert!(!h.transcript.mentions("What would you like to ask?"));
}

#[test]
fn unmatched_speech_goes_to_the_ai() {
    let mut h = harness(&[]);
    assert_eq!(
        h.session.handle_utterance("xylophone quokka"),
        Outcome::Success
    );
    assert_eq!(h.prompts.borrow().as_slice(), ["xylophone quokka"]);
    assert!(h.transcript.mentions("Forty-two."));
}

#[test]
fn ai_failure_becomes_an_apology() {
    let mut h = harness_with(&[], None, true);
    let outcome = h.session.handle_utterance("xylophone quokka");
    assert!(matches!(outcome, Outcome::Failure(reason) if reason.starts_with("Sorry")));
}

#[test]
fn volume_level_is_read_inline() {
    let mut h = harness(&[]);
    assert_eq!(h.session.handle_utterance("set volume to 40"), Outcome::Success);
    assert_eq!(h.calls.borrow().as_slice(), ["volume Set(40)"]);
    assert!(h.transcript.mentions("40 percent"));
}

#[test]
fn named_light_is_asked_for() {
    let mut h = harness(&["kitchen lamp"]);
    assert_eq!(h.session.handle_utterance("turn on the"), Outcome::Success);
    assert_eq!(h.sent.borrow().as_slice(), ["LIGHT ON kitchen lamp"]);
}

#[test]
fn smart_home_without_a_bridge_fails_politely() {
    let mut h = harness_with(&[], Some("ok"), false);
    let outcome = h.session.handle_utterance("lock doors");
    assert!(matches!(outcome, Outcome::Failure(reason) if reason.contains("smart-home")));
}

#[test]
fn corrupted_notes_are_reported_and_replaced() {
    let mut h = harness(&[]);
    std::fs::write(&h.notes_path, "{ not json").unwrap();
    assert_eq!(h.session.handle_utterance("read my notes"), Outcome::Success);
    assert!(h.transcript.mentions("memory file seems corrupted"));
}

#[test]
fn goodbye_terminates() {
    let mut h = harness(&[]);
    assert_eq!(h.session.handle_utterance("goodbye"), Outcome::Terminate);
    assert!(h.transcript.mentions("Goodbye!"));
}

#[test]
fn run_stops_on_exit_and_skips_silence() {
    let mut h = harness(&["", "time", "exit", "hello jarvis"]);
    h.session.run();
    assert!(h.transcript.mentions("The current time is 12:00 AM."));
    assert!(h.transcript.mentions("Goodbye!"));
    assert!(!h.transcript.mentions("How can Jarvis assist you today?"));
}

#[test]
fn run_ends_when_input_closes() {
    let mut h = harness(&["day"]);
    h.session.run();
    assert!(h.transcript.mentions("Today is Wednesday."));
}

#[test]
fn hotword_gates_commands() {
    let mut h = harness(&["enable hotword", "open google", "hey jarvis", "open google"]);
    h.session.run();
    assert!(h.session.hotword_enabled());
    assert_eq!(
        h.calls.borrow().as_slice(),
        ["open_url https://www.google.com"]
    );
    assert!(h.transcript.mentions("Yes?"));
}
