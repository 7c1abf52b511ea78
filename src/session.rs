/*
 * @file session.rs
 * @brief Assistant session and the listen, match, dispatch loop
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

//! Assistant session: owns every store and collaborator and runs the
//! listen, match, dispatch loop.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use log::{debug, info, warn};

use crate::ai::{AiQuery, OllamaClient};
use crate::calendar::CalendarStore;
use crate::commands::CommandRegistry;
use crate::config::AppConfig;
use crate::devices::{MusicPlayer, SerialBridge, SmartHome};
use crate::dispatcher::Outcome;
use crate::matcher::{normalize_utterance, FuzzyMatcher};
use crate::notes::NoteStore;
use crate::slots::SlotFiller;
use crate::speech::{ConsoleInput, SpeechInput, SpeechOutput, SpokenOutput};
use crate::system::{DesktopSystem, SystemControl};

/// External collaborators injected into a [`Session`].
pub struct Collaborators {
    pub input: Box<dyn SpeechInput>,
    pub output: Box<dyn SpeechOutput>,
    pub ai: Box<dyn AiQuery>,
    pub system: Box<dyn SystemControl>,
    pub home: Option<Box<dyn SmartHome>>,
}

/// One running assistant.
///
/// # Details
/// The session is the only writer of the note and calendar files and the
/// only owner of the speech channels, so handlers run strictly one at a time.
pub struct Session {
    pub(crate) config: AppConfig,
    pub(crate) registry: CommandRegistry,
    pub(crate) notes: NoteStore,
    pub(crate) calendar: CalendarStore,
    pub(crate) slots: SlotFiller,
    pub(crate) ai: Box<dyn AiQuery>,
    pub(crate) system: Box<dyn SystemControl>,
    pub(crate) home: Option<Box<dyn SmartHome>>,
    pub(crate) music: MusicPlayer,
    pub(crate) hotword_enabled: bool,
    clock: fn() -> NaiveDateTime,
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

impl Session {
    /// Builds a session from explicit collaborators.
    pub fn new(config: AppConfig, registry: CommandRegistry, parts: Collaborators) -> Self {
        let slots = SlotFiller::new(parts.input, parts.output, config.command_listen());
        let music = MusicPlayer::new(
            config.music_directory.clone(),
            config.music_player.as_deref(),
        );
        Self {
            notes: NoteStore::new(&config.notes_path, config.keyword_threshold),
            calendar: CalendarStore::new(&config.calendar_path),
            hotword_enabled: config.hotword_enabled,
            slots,
            ai: parts.ai,
            system: parts.system,
            home: parts.home,
            music,
            registry,
            config,
            clock: local_now,
        }
    }

    /// Replaces the wall clock used for dates, times and upcoming entries.
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    /// Production wiring: console input, spoken output, Ollama, desktop tools
    /// and the serial bridge when a port is configured.
    ///
    /// # Errors
    /// Returns an error if an HTTP client cannot be built.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let registry = CommandRegistry::load(&config.commands_path);
        let ai = OllamaClient::new(
            &config.ollama_url,
            &config.ollama_model,
            &config.assistant_name,
        )
        .with_context(|| "Failed to set up the AI client")?;
        let system = DesktopSystem::new(config.openweathermap_api_key.clone())
            .with_context(|| "Failed to set up desktop control")?;
        let home = config.serial_port.as_deref().map(|path| {
            info!("event=smart_home port={} baud={}", path, config.serial_baud);
            Box::new(SerialBridge::new(path, config.serial_baud)) as Box<dyn SmartHome>
        });
        let parts = Collaborators {
            input: Box::new(ConsoleInput::new()),
            output: Box::new(SpokenOutput::new(
                &config.assistant_name,
                config.tts_command.clone(),
            )),
            ai: Box::new(ai),
            system: Box::new(system),
            home,
        };
        Ok(Self::new(config, registry, parts))
    }

    pub(crate) fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }

    /// Whether the loop waits for the hotword before each command.
    pub fn hotword_enabled(&self) -> bool {
        self.hotword_enabled
    }

    /// Matches one utterance against the registry and handles it.
    ///
    /// # Returns
    /// * `Outcome::Success` for empty input, which is ignored.
    /// * The handler's outcome otherwise; unmatched input goes to the AI.
    pub fn handle_utterance(&mut self, raw: &str) -> Outcome {
        let utterance = normalize_utterance(raw);
        if utterance.is_empty() {
            return Outcome::Success;
        }
        let matched = FuzzyMatcher::new(&self.registry, self.config.match_threshold)
            .best_match(&utterance)
            .and_then(|found| {
                debug!(
                    "event=match phrase=\"{}\" score={}",
                    found.phrase, found.score
                );
                self.registry.get(&found.phrase)
            });
        match matched {
            Some(entry) => self.dispatch(&entry, &utterance),
            None => self.dispatch_unmatched(&utterance),
        }
    }

    /// Opening announcement.
    pub fn greet(&mut self) {
        let name = self.config.assistant_name.clone();
        self.slots
            .say(&format!("{name} is online. How can I help you today?"));
    }

    /// Runs until the user exits or the input source closes.
    pub fn run(&mut self) {
        info!(
            "event=session_start commands={} hotword_enabled={}",
            self.registry.len(),
            self.hotword_enabled
        );
        while self.process_iteration() {}
        self.music.stop();
        info!("event=session_end");
    }

    /// One listen, match, dispatch step; `false` ends the loop.
    fn process_iteration(&mut self) -> bool {
        let utterance = if self.hotword_enabled {
            self.await_hotword()
        } else {
            self.slots.hear("Listening for a command...")
        };
        if self.slots.input_closed() && utterance.is_empty() {
            warn!("event=session status=input_closed");
            return false;
        }
        if utterance.is_empty() {
            return true;
        }
        self.handle_utterance(&utterance) != Outcome::Terminate
    }

    /// Waits for the hotword, then for the command that follows it.
    ///
    /// # Details
    /// Anything spoken after the hotword in the same utterance is used as the
    /// command directly.
    fn await_hotword(&mut self) -> String {
        let settings = self.config.hotword_listen();
        let heard = self.slots.hear_with("Waiting for the hotword...", settings);
        let hotword = normalize_utterance(&self.config.hotword);
        let Some(at) = heard.find(&hotword) else {
            return String::new();
        };
        let rest = heard[at + hotword.len()..].trim().to_string();
        if !rest.is_empty() {
            return rest;
        }
        info!("event=hotword status=heard");
        self.slots.say("Yes?");
        self.slots.hear("Listening for a command...")
    }
}
