/*
 * @file lib.rs
 * @brief Jarvis library root
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

//! Jarvis - a voice-driven command interpreter.
//!
//! Each utterance is fuzzy-matched against a registry of trigger phrases and
//! dispatched to a handler. Handlers ask for missing details one prompt at a
//! time, keep notes and a calendar in local JSON files, and hand anything
//! unrecognized to a local AI model.
//!
//! # Example
//! ```no_run
//! use anyhow::Result;
//! use jarvis::{config::AppConfig, session::Session};
//!
//! fn main() -> Result<()> {
//!     let mut session = Session::from_config(AppConfig::load())?;
//!     session.greet();
//!     session.run();
//!     Ok(())
//! }
//! ```

pub mod ai;
pub mod calendar;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod devices;
pub mod dispatcher;
pub mod logging;
pub mod matcher;
pub mod notes;
pub mod session;
pub mod slots;
pub mod speech;
pub mod store;
pub mod system;
