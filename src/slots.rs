//! Slot filling: asking the user for a missing piece of an action.
//!
//! A slot fill speaks one prompt, waits for exactly one reply and validates
//! it. Silence or an invalid reply aborts the slot, and the calling handler
//! must then abandon the whole action.

use log::{debug, info};

use crate::config::ListenSettings;
use crate::speech::{SpeechInput, SpeechOutput};

/// Marker returned when a slot could not be filled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Aborted;

/// A named piece of information an action may need to ask for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slot {
    pub name: &'static str,
    pub prompt: &'static str,
}

/// Words accepted as an explicit confirmation.
const AFFIRMATIVE: [&str; 4] = ["yes", "yeah", "yep", "confirm"];

/// Owns the speech collaborators and runs prompt/reply exchanges.
pub struct SlotFiller {
    input: Box<dyn SpeechInput>,
    output: Box<dyn SpeechOutput>,
    listen: ListenSettings,
}

impl SlotFiller {
    /// # Arguments
    /// * `input` - Source of replies; an empty string means silence.
    /// * `output` - Where prompts and announcements go.
    /// * `listen` - Timeouts for every reply this filler waits on.
    pub fn new(
        input: Box<dyn SpeechInput>,
        output: Box<dyn SpeechOutput>,
        listen: ListenSettings,
    ) -> Self {
        Self {
            input,
            output,
            listen,
        }
    }

    /// Fire-and-forget announcement.
    pub fn say(&mut self, text: &str) {
        self.output.announce(text);
    }

    /// Waits for one utterance with the command timeouts.
    pub fn hear(&mut self, prompt: &str) -> String {
        let settings = self.listen;
        self.hear_with(prompt, settings)
    }

    /// Waits for one utterance with explicit timeouts.
    pub fn hear_with(&mut self, prompt: &str, settings: ListenSettings) -> String {
        self.input
            .listen(prompt, settings.timeout, settings.phrase_limit)
    }

    /// Whether the input source has shut down for good.
    pub fn input_closed(&self) -> bool {
        self.input.is_closed()
    }

    /// Speaks `prompt`, takes one reply and validates it.
    ///
    /// # Returns
    /// * `Ok(value)` - The reply passed validation.
    /// * `Err(Aborted)` - The reply was empty or failed validation.
    pub fn fill<T>(
        &mut self,
        prompt: &str,
        mut validate: impl FnMut(&str) -> Option<T>,
    ) -> Result<T, Aborted> {
        self.say(prompt);
        let reply = self.hear("Listening...");
        if reply.is_empty() {
            info!("event=slot_fill status=silent");
            return Err(Aborted);
        }
        match validate(&reply) {
            Some(value) => {
                debug!("event=slot_fill status=filled reply=\"{}\"", reply);
                Ok(value)
            }
            None => {
                info!("event=slot_fill status=invalid reply=\"{}\"", reply);
                Err(Aborted)
            }
        }
    }

    /// Fills a declared slot with its own prompt.
    ///
    /// # Returns
    /// The validated value, or `Err(Aborted)` on silence or a rejected reply.
    pub fn fill_slot<T>(
        &mut self,
        slot: &Slot,
        validate: impl FnMut(&str) -> Option<T>,
    ) -> Result<T, Aborted> {
        debug!("event=slot_fill slot={}", slot.name);
        self.fill(slot.prompt, validate)
    }

    /// Fills an optional slot, using `default` when every attempt is met with silence.
    ///
    /// # Details
    /// A non-empty reply that fails validation still aborts; only silence
    /// falls through to the default.
    pub fn fill_or_default<T>(
        &mut self,
        slot: &Slot,
        attempts: u32,
        default: T,
        mut validate: impl FnMut(&str) -> Option<T>,
    ) -> Result<T, Aborted> {
        for attempt in 1..=attempts.max(1) {
            self.say(slot.prompt);
            let reply = self.hear("Listening...");
            if reply.is_empty() {
                debug!(
                    "event=slot_fill slot={} status=silent attempt={}",
                    slot.name, attempt
                );
                continue;
            }
            return validate(&reply).ok_or(Aborted);
        }
        info!("event=slot_fill slot={} status=defaulted", slot.name);
        Ok(default)
    }

    /// Asks a yes/no question; only an explicit affirmative counts.
    pub fn confirm(&mut self, prompt: &str) -> bool {
        self.say(prompt);
        let reply = self.hear("Say 'yes' to confirm or 'no' to cancel.");
        is_affirmative(&reply)
    }
}

/// Whether the reply contains an affirmative word.
pub fn is_affirmative(reply: &str) -> bool {
    reply
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| AFFIRMATIVE.contains(&word))
}

/// Parses the first run of digits in a reply, e.g. "40 percent" → 40.
pub fn parse_number(reply: &str) -> Option<u32> {
    let digits: String = reply
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::{ScriptedInput, TranscriptOutput};
    use std::time::Duration;

    const NOTE: Slot = Slot {
        name: "note",
        prompt: "What should I remember?",
    };

    fn filler(replies: &[&str]) -> (SlotFiller, TranscriptOutput) {
        let transcript = TranscriptOutput::new();
        let filler = SlotFiller::new(
            Box::new(ScriptedInput::new(replies.iter().copied())),
            Box::new(transcript.clone()),
            ListenSettings {
                timeout: Duration::from_millis(1),
                phrase_limit: Duration::from_millis(1),
            },
        );
        (filler, transcript)
    }

    #[test]
    fn fill_returns_validated_reply() {
        let (mut slots, transcript) = filler(&["Buy Milk"]);
        let reply = slots.fill_slot(&NOTE, |r| Some(r.trim().to_string()));
        assert_eq!(reply, Ok("buy milk".to_string()));
        assert_eq!(transcript.lines(), vec!["What should I remember?"]);
    }

    #[test]
    fn silence_aborts() {
        let (mut slots, _) = filler(&[]);
        assert_eq!(slots.fill_slot(&NOTE, |r| Some(r.to_string())), Err(Aborted));
    }

    #[test]
    fn invalid_reply_aborts() {
        let (mut slots, _) = filler(&["soon"]);
        assert_eq!(slots.fill("Which id?", parse_number), Err(Aborted));
    }

    #[test]
    fn default_used_only_after_silence() {
        let (mut slots, _) = filler(&[]);
        let value = slots.fill_or_default(&NOTE, 1, "uncategorized".to_string(), |r| {
            Some(r.to_string())
        });
        assert_eq!(value, Ok("uncategorized".to_string()));

        let (mut slots, _) = filler(&["", "groceries"]);
        let value = slots.fill_or_default(&NOTE, 2, "uncategorized".to_string(), |r| {
            Some(r.to_string())
        });
        assert_eq!(value, Ok("groceries".to_string()));
    }

    #[test]
    fn confirmation_needs_explicit_yes() {
        assert!(is_affirmative("yes please"));
        assert!(!is_affirmative("yesterday"));
        assert!(!is_affirmative(""));
        let (mut slots, _) = filler(&["no"]);
        assert!(!slots.confirm("Clear everything?"));
    }

    #[test]
    fn numbers_are_pulled_from_replies() {
        assert_eq!(parse_number("set it to 40 percent"), Some(40));
        assert_eq!(parse_number("forty"), None);
    }
}
