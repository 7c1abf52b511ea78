/*
 * @file config.rs
 * @brief Runtime configuration loaded from config.json and the environment
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

//! Strongly typed representation of `config.json` with environment overrides.

use log::warn;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::matcher::DEFAULT_THRESHOLD;

/// Path to the JSON configuration file that holds runtime defaults.
pub const CONFIG_PATH: &str = "config.json";

/// Default Ollama chat endpoint for local LLM inference.
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434/api/chat";

/// Default baud rate for the smart-home bridge.
const DEFAULT_SERIAL_BAUD: u32 = 115_200;

/// Partial-substring score a note must exceed to match a deletion keyword.
pub const DEFAULT_KEYWORD_THRESHOLD: u8 = 80;

/// Application settings.
///
/// # Details
/// Every field carries a serde default so a partial `config.json` only
/// overrides what it names.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub assistant_name: String,
    pub match_threshold: u8,
    pub keyword_threshold: u8,
    pub notes_path: PathBuf,
    pub calendar_path: PathBuf,
    pub commands_path: PathBuf,
    pub city: String,
    pub hotword: String,
    pub hotword_enabled: bool,
    pub listen_timeout_secs: u64,
    pub phrase_limit_secs: u64,
    pub hotword_timeout_secs: u64,
    pub hotword_phrase_limit_secs: u64,
    pub category_attempts: u32,
    pub ollama_url: String,
    pub ollama_model: String,
    pub openweathermap_api_key: Option<String>,
    pub serial_port: Option<String>,
    pub serial_baud: u32,
    pub music_directory: Option<PathBuf>,
    pub music_player: Option<String>,
    pub tts_command: Option<String>,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            assistant_name: "Jarvis".to_string(),
            match_threshold: DEFAULT_THRESHOLD,
            keyword_threshold: DEFAULT_KEYWORD_THRESHOLD,
            notes_path: PathBuf::from("jarvis_memory.json"),
            calendar_path: PathBuf::from("jarvis_calendar.json"),
            commands_path: PathBuf::from("commands.json"),
            city: "Sydney".to_string(),
            hotword: "hey jarvis".to_string(),
            hotword_enabled: false,
            listen_timeout_secs: 5,
            phrase_limit_secs: 5,
            hotword_timeout_secs: 3,
            hotword_phrase_limit_secs: 2,
            category_attempts: 1,
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            ollama_model: "llama3.2:3b".to_string(),
            openweathermap_api_key: None,
            serial_port: None,
            serial_baud: DEFAULT_SERIAL_BAUD,
            music_directory: None,
            music_player: None,
            tts_command: None,
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

/// Timeouts handed to the speech input collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListenSettings {
    pub timeout: Duration,
    pub phrase_limit: Duration,
}

impl AppConfig {
    /// Loads `config.json` (or `$JARVIS_CONFIG`) and applies environment overrides.
    pub fn load() -> Self {
        let path = env::var("JARVIS_CONFIG").unwrap_or_else(|_| CONFIG_PATH.to_string());
        let mut config = Self::from_file(Path::new(&path));
        config.apply_env(|key| env::var(key).ok());
        config
    }

    /// Reads settings from `path`, falling back to defaults when missing or invalid.
    pub fn from_file(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(cfg) => cfg,
                Err(err) => {
                    warn!(
                        "event=config_load status=parse_error path={} error={}",
                        path.display(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                warn!(
                    "event=config_load status=missing path={} error={}",
                    path.display(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Overrides fields from environment-style lookups; unparsable values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(name) = lookup("JARVIS_NAME") {
            self.assistant_name = name;
        }
        if let Some(threshold) = lookup("JARVIS_THRESHOLD").and_then(|v| v.parse().ok()) {
            self.match_threshold = threshold;
        }
        if let Some(url) = lookup("OLLAMA_URL") {
            self.ollama_url = url;
        }
        if let Some(model) = lookup("OLLAMA_MODEL") {
            self.ollama_model = model;
        }
        if let Some(key) = lookup("OPENWEATHERMAP_API_KEY") {
            self.openweathermap_api_key = Some(key);
        }
        if let Some(port) = lookup("JARVIS_SERIAL_PORT") {
            self.serial_port = Some(port);
        }
        if let Some(baud) = lookup("JARVIS_SERIAL_BAUD").and_then(|v| v.parse().ok()) {
            self.serial_baud = baud;
        }
        if let Some(level) = lookup("JARVIS_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    pub fn command_listen(&self) -> ListenSettings {
        ListenSettings {
            timeout: Duration::from_secs(self.listen_timeout_secs),
            phrase_limit: Duration::from_secs(self.phrase_limit_secs),
        }
    }

    pub fn hotword_listen(&self) -> ListenSettings {
        ListenSettings {
            timeout: Duration::from_secs(self.hotword_timeout_secs),
            phrase_limit: Duration::from_secs(self.hotword_phrase_limit_secs),
        }
    }
}
