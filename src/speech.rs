//! Speech input and output collaborators.
//!
//! The interpreter only ever sees lower-cased transcripts and fire-and-forget
//! announcements; how audio is captured or synthesized lives behind these
//! two traits.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::BufRead;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::{debug, warn};

use crate::matcher::normalize_utterance;

/// Source of user utterances.
pub trait SpeechInput {
    /// Waits for one utterance and returns it lower-cased.
    ///
    /// Returns the empty string on timeout, unintelligible input, or any
    /// failure of the underlying service.
    fn listen(&mut self, prompt: &str, timeout: Duration, phrase_limit: Duration) -> String;

    /// Whether the source can never produce another utterance.
    fn is_closed(&self) -> bool {
        false
    }
}

/// Sink for assistant replies.
pub trait SpeechOutput {
    fn announce(&mut self, text: &str);
}

/// Line-based input read from stdin on a background reader.
///
/// # Details
/// Each line is one utterance. The reader thread only forwards lines so that
/// `listen` can honour its timeout; the phrase limit does not apply to typed
/// input.
pub struct ConsoleInput {
    lines: Receiver<String>,
    closed: bool,
}

impl ConsoleInput {
    pub fn new() -> Self {
        let (sender, lines) = mpsc::channel();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if sender.send(line).is_err() {
                    break;
                }
            }
        });
        Self {
            lines,
            closed: false,
        }
    }
}

impl Default for ConsoleInput {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechInput for ConsoleInput {
    fn listen(&mut self, prompt: &str, timeout: Duration, _phrase_limit: Duration) -> String {
        println!("{prompt}");
        match self.lines.recv_timeout(timeout) {
            Ok(line) => {
                let heard = normalize_utterance(&line);
                debug!("event=listen status=heard text=\"{}\"", heard);
                heard
            }
            Err(RecvTimeoutError::Timeout) => {
                debug!("event=listen status=timeout");
                String::new()
            }
            Err(RecvTimeoutError::Disconnected) => {
                if !self.closed {
                    warn!("event=listen status=closed");
                    self.closed = true;
                }
                String::new()
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Prints replies and optionally voices them through a text-to-speech command.
pub struct SpokenOutput {
    name: String,
    tts_command: Option<String>,
}

impl SpokenOutput {
    pub fn new(name: &str, tts_command: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            tts_command,
        }
    }
}

impl SpeechOutput for SpokenOutput {
    fn announce(&mut self, text: &str) {
        println!("[{}]: {}", self.name, text);
        if let Some(command) = &self.tts_command {
            if let Err(err) = speak(command, text) {
                warn!("event=tts status=error error={:#}", err);
            }
        }
    }
}

/// Speaks the given text with an external TTS program such as `say` or `espeak`.
///
/// # Errors
/// Returns an error for empty text or when the program cannot be run.
pub fn speak(command: &str, text: &str) -> Result<()> {
    if text.trim().is_empty() {
        bail!("Cannot speak empty text");
    }
    let status = std::process::Command::new(command)
        .arg(text)
        .status()
        .with_context(|| format!("Failed to run {command}"))?;
    if !status.success() {
        bail!("{command} exited with {status}");
    }
    Ok(())
}

/// Input that replays a fixed list of replies, then goes silent.
#[derive(Default)]
pub struct ScriptedInput {
    replies: VecDeque<String>,
}

impl ScriptedInput {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: replies.into_iter().map(Into::into).collect(),
        }
    }
}

impl SpeechInput for ScriptedInput {
    fn listen(&mut self, _prompt: &str, _timeout: Duration, _phrase_limit: Duration) -> String {
        self.replies
            .pop_front()
            .map(|reply| normalize_utterance(&reply))
            .unwrap_or_default()
    }

    fn is_closed(&self) -> bool {
        self.replies.is_empty()
    }
}

/// Output that records every announcement; clones share the same transcript.
#[derive(Clone, Default)]
pub struct TranscriptOutput {
    lines: Rc<RefCell<Vec<String>>>,
}

impl TranscriptOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }

    /// Whether any announcement contains `needle`, ignoring case.
    pub fn mentions(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.lines
            .borrow()
            .iter()
            .any(|line| line.to_lowercase().contains(&needle))
    }
}

impl SpeechOutput for TranscriptOutput {
    fn announce(&mut self, text: &str) {
        self.lines.borrow_mut().push(text.to_string());
    }
}
