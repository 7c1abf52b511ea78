//! Open-ended AI query collaborator.
//!
//! Utterances that match no command, note summaries and text analysis are all
//! handed to a local Ollama chat endpoint.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Number of past messages replayed to the model for conversational context.
const MAX_HISTORY: usize = 10;

/// HTTP timeout for a single chat completion.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Anything that can answer a free-form question.
pub trait AiQuery {
    /// Sends `prompt` and returns the model's answer.
    ///
    /// # Errors
    /// Network, service or credential failures; callers apologize and move on.
    fn ask_open_ended(&mut self, prompt: &str) -> Result<String>;
}

/// Chat message structure for the Ollama API.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

/// Request structure for the Ollama API.
#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

/// Response structure for the Ollama API.
#[derive(Deserialize)]
struct OllamaResponse {
    message: ChatMessage,
}

/// Blocking Ollama chat client with a short rolling history.
///
/// # Details
/// Only successful exchanges are remembered; the system prompt is rebuilt
/// for every request and never stored.
pub struct OllamaClient {
    client: reqwest::blocking::Client,
    url: String,
    model: String,
    system_prompt: String,
    history: Vec<ChatMessage>,
}

impl OllamaClient {
    /// Creates a client for `model` at the chat endpoint `url`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: &str, model: &str, assistant_name: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .with_context(|| "Failed to build HTTP client for Ollama")?;
        Ok(Self {
            client,
            url: url.to_string(),
            model: model.to_string(),
            system_prompt: system_prompt(assistant_name),
            history: Vec::new(),
        })
    }

    fn request_messages(&self, prompt: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(ChatMessage::new("system", &self.system_prompt));
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::new("user", prompt));
        messages
    }

    fn remember(&mut self, prompt: &str, answer: &str) {
        self.history.push(ChatMessage::new("user", prompt));
        self.history.push(ChatMessage::new("assistant", answer));
        let overflow = self.history.len().saturating_sub(MAX_HISTORY);
        self.history.drain(..overflow);
    }
}

impl AiQuery for OllamaClient {
    fn ask_open_ended(&mut self, prompt: &str) -> Result<String> {
        let request = OllamaRequest {
            model: &self.model,
            messages: self.request_messages(prompt),
            stream: false,
        };
        debug!(
            "event=ai_request model={} history={}",
            self.model,
            self.history.len()
        );
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .with_context(|| "Failed to send request to Ollama")?
            .error_for_status()
            .with_context(|| "Ollama rejected the request")?;
        let parsed: OllamaResponse = response
            .json()
            .with_context(|| "Failed to parse Ollama response")?;
        let answer = parsed.message.content.trim().to_string();
        if answer.is_empty() {
            warn!("event=ai_response status=empty");
            bail!("Ollama returned an empty answer");
        }
        self.remember(prompt, &answer);
        Ok(answer)
    }
}

fn system_prompt(assistant_name: &str) -> String {
    format!(
        "You are {assistant_name}, a voice assistant running on the user's desktop. \
         Your replies are read aloud, so keep them short, plain and conversational, \
         without markdown or lists."
    )
}

/// Prompt asking for a one-word sentiment label and a short reason.
pub fn sentiment_prompt(text: &str) -> String {
    format!(
        "Classify the sentiment of the following text as positive, negative or neutral. \
         Answer with the label first, then one short sentence explaining why.\n\nText: {text}"
    )
}

/// Prompt asking for a short spoken summary of arbitrary text.
pub fn summary_prompt(text: &str) -> String {
    format!("Please summarize the following text concisely:\n\n{text}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OllamaClient {
        OllamaClient::new("http://127.0.0.1:9/api/chat", "test-model", "Jarvis").unwrap()
    }

    #[test]
    fn request_starts_with_system_prompt_and_ends_with_user() {
        let mut ai = client();
        ai.remember("hi", "hello there");
        let messages = ai.request_messages("what is rust");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("Jarvis"));
        assert_eq!(messages[3].role, "user");
        assert_eq!(messages[3].content, "what is rust");
    }

    #[test]
    fn history_is_bounded() {
        let mut ai = client();
        for turn in 0..20 {
            ai.remember(&format!("q{turn}"), &format!("a{turn}"));
        }
        assert_eq!(ai.history.len(), MAX_HISTORY);
        assert_eq!(ai.history.last().unwrap().content, "a19");
    }

    #[test]
    fn prompts_embed_the_text() {
        assert!(summary_prompt("a long memo").ends_with("\n\na long memo"));
        assert!(sentiment_prompt("great day").contains("Text: great day"));
    }

    #[test]
    fn unreachable_service_is_an_error() {
        let mut ai = client();
        assert!(ai.ask_open_ended("hello").is_err());
        assert!(ai.history.is_empty());
    }
}
