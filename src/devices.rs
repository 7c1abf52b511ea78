/*
 * @file devices.rs
 * @brief Smart-home serial bridge and local music worker
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

//! External devices driven by the assistant: a serial-attached smart-home
//! bridge and a detached local music player.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use serialport::SerialPort;

/// Serial read/write timeout so a silent bridge never stalls the listen loop.
const SERIAL_TIMEOUT: Duration = Duration::from_millis(100);

/// Time to let the bridge reboot after the port is opened (DTR toggle).
const SERIAL_BOOT_DELAY: Duration = Duration::from_millis(150);

/// Minimum spacing between consecutive bridge commands.
const SERIAL_COMMAND_DELAY: Duration = Duration::from_millis(30);

/// Longest status reply read back from the bridge.
const MAX_REPLY_BYTES: usize = 256;

/// How often the music worker checks whether playback has ended.
const PLAYER_POLL: Duration = Duration::from_millis(250);

/// Audio file extensions the music player will pick up.
const AUDIO_EXTENSIONS: [&str; 3] = ["mp3", "wav", "ogg"];

/// One smart-home instruction, rendered as a single text line for the bridge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Switches one named light, or every light when `light` is `None`.
    Lights { on: bool, light: Option<String> },
    Brightness { light: String, percent: u8 },
    Color { light: String, color: String },
    Thermostat { degrees: u32 },
    Locks { locked: bool },
    Status { light: Option<String> },
}

impl DeviceCommand {
    /// Wire form, e.g. `LIGHT ON kitchen lamp` or `THERMOSTAT 21`.
    pub fn render(&self) -> String {
        match self {
            DeviceCommand::Lights { on, light } => format!(
                "LIGHT {} {}",
                if *on { "ON" } else { "OFF" },
                light.as_deref().unwrap_or("ALL")
            ),
            DeviceCommand::Brightness { light, percent } => {
                format!("BRIGHTNESS {} {}", (*percent).min(100), light)
            }
            DeviceCommand::Color { light, color } => format!("COLOR {color} {light}"),
            DeviceCommand::Thermostat { degrees } => format!("THERMOSTAT {degrees}"),
            DeviceCommand::Locks { locked: true } => "LOCK ALL".to_string(),
            DeviceCommand::Locks { locked: false } => "UNLOCK ALL".to_string(),
            DeviceCommand::Status { light } => {
                format!("STATUS {}", light.as_deref().unwrap_or("ALL"))
            }
        }
    }
}

/// Anything that can carry smart-home commands to the house.
pub trait SmartHome {
    /// Sends one command and returns whatever the device answered (possibly empty).
    fn send(&mut self, command: &DeviceCommand) -> Result<String>;
}

/// UART link to a microcontroller that owns the actual lights, locks and thermostat.
///
/// # Details
/// The port is opened lazily on the first command. A write failure drops the
/// handle so the next command reopens it.
pub struct SerialBridge {
    path: String,
    baud: u32,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialBridge {
    pub fn new(path: &str, baud: u32) -> Self {
        Self {
            path: path.to_string(),
            baud,
            port: None,
        }
    }

    /// Opens the serial port if not already connected, trying the callout variant on failure.
    fn ensure_port(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        if self.port.is_none() {
            let mut port = self.open_with_fallback()?;
            configure_port_signals(&mut port);
            self.port = Some(port);
        }
        self.port
            .as_mut()
            .context("Serial port missing after initialization")
    }

    fn open_with_fallback(&mut self) -> Result<Box<dyn SerialPort>> {
        let primary_err = match open_serial_port(&self.path, self.baud) {
            Ok(port) => return Ok(port),
            Err(err) => err,
        };
        let Some(callout) = callout_variant(&self.path) else {
            return Err(primary_err);
        };
        match open_serial_port(&callout, self.baud) {
            Ok(port) => {
                info!(
                    "event=serial_open status=fallback from={} to={}",
                    self.path, callout
                );
                self.path = callout;
                Ok(port)
            }
            Err(_) => Err(primary_err),
        }
    }
}

impl SmartHome for SerialBridge {
    fn send(&mut self, command: &DeviceCommand) -> Result<String> {
        let line = command.render();
        let path = self.path.clone();
        let port = self.ensure_port()?;
        let written = port
            .write_all(format!("{line}\n").as_bytes())
            .and_then(|()| port.flush());
        if let Err(err) = written {
            self.port = None;
            return Err(err).with_context(|| format!("Failed to write `{line}` to {path}"));
        }
        info!("event=serial_send path={} command=\"{}\"", path, line);
        std::thread::sleep(SERIAL_COMMAND_DELAY);
        Ok(read_reply(port.as_mut()))
    }
}

/// Reads one reply line, stopping at newline, timeout or the size cap.
fn read_reply(port: &mut dyn SerialPort) -> String {
    let mut reply = Vec::new();
    let mut byte = [0u8; 1];
    while reply.len() < MAX_REPLY_BYTES {
        match port.read(&mut byte) {
            Ok(1) if byte[0] == b'\n' => break,
            Ok(1) => reply.push(byte[0]),
            Ok(_) => break,
            Err(err) if err.kind() == std::io::ErrorKind::TimedOut => break,
            Err(err) => {
                debug!("event=serial_read status=error error={}", err);
                break;
            }
        }
    }
    String::from_utf8_lossy(&reply).trim().to_string()
}

fn open_serial_port(path: &str, baud: u32) -> Result<Box<dyn SerialPort>> {
    serialport::new(path, baud)
        .timeout(SERIAL_TIMEOUT)
        .open()
        .with_context(|| format!("Failed to open {path}"))
}

/// Raises DTR and RTS, then waits for the bridge to boot.
fn configure_port_signals(port: &mut Box<dyn SerialPort>) {
    if let Err(err) = port.write_data_terminal_ready(true) {
        debug!("event=serial_signal signal=dtr error={}", err);
    }
    if let Err(err) = port.write_request_to_send(true) {
        debug!("event=serial_signal signal=rts error={}", err);
    }
    std::thread::sleep(SERIAL_BOOT_DELAY);
}

/// macOS exposes each device as `/dev/tty.*` and `/dev/cu.*`; maps the former to the latter.
fn callout_variant(path: &str) -> Option<String> {
    let suffix = path.strip_prefix("/dev/tty.")?;
    Some(format!("/dev/cu.{suffix}"))
}

/// Plays local audio files on a detached worker.
///
/// # Details
/// Playback is delegated to an external player process. The worker only
/// waits for it to finish; `stop` kills the process if it is still tracked,
/// which is best effort: a player that forks or detaches cannot be stopped.
pub struct MusicPlayer {
    directory: Option<PathBuf>,
    player: Vec<String>,
    current: Arc<Mutex<Option<Child>>>,
}

impl MusicPlayer {
    /// `player` is a command line such as `afplay` or `ffplay -nodisp -autoexit`;
    /// `None` picks a platform default.
    pub fn new(directory: Option<PathBuf>, player: Option<&str>) -> Self {
        let player = player
            .map(str::to_string)
            .or_else(default_player)
            .map(|cmd| cmd.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        Self {
            directory,
            player,
            current: Arc::new(Mutex::new(None)),
        }
    }

    fn directory(&self) -> Result<&Path> {
        match &self.directory {
            Some(dir) if dir.is_dir() => Ok(dir),
            Some(dir) => bail!("My music directory {} was not found.", dir.display()),
            None => bail!("No music directory is configured."),
        }
    }

    /// Plays the first audio file in the music directory.
    ///
    /// # Errors
    /// Returns an error if the directory is missing, empty, or the player cannot start.
    pub fn play_first(&mut self) -> Result<PathBuf> {
        let dir = self.directory()?;
        let Some(track) = audio_files(dir)?.into_iter().next() else {
            bail!("No music files were found in {}.", dir.display());
        };
        self.start(&track)?;
        Ok(track)
    }

    /// Plays the first file whose name contains `song`, searching subdirectories.
    ///
    /// # Returns
    /// * `Ok(Some(path))` - Playback started.
    /// * `Ok(None)` - No file matched.
    pub fn play_named(&mut self, song: &str) -> Result<Option<PathBuf>> {
        let dir = self.directory()?;
        let Some(track) = find_song(dir, song)? else {
            return Ok(None);
        };
        self.start(&track)?;
        Ok(Some(track))
    }

    /// Stops the tracked player process; `false` when nothing was playing.
    pub fn stop(&mut self) -> bool {
        let Ok(mut current) = self.current.lock() else {
            warn!("event=music_stop status=poisoned");
            return false;
        };
        match current.take() {
            Some(mut child) => {
                if let Err(err) = child.kill() {
                    debug!("event=music_stop status=already_finished error={}", err);
                }
                let _ = child.wait();
                info!("event=music_stop status=stopped");
                true
            }
            None => false,
        }
    }

    fn start(&mut self, track: &Path) -> Result<()> {
        self.stop();
        let Some((program, args)) = self.player.split_first() else {
            bail!("No music player is configured for this system.");
        };
        let child = Command::new(program)
            .args(args)
            .arg(track)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to start music player {program}"))?;
        info!("event=music_play track={}", track.display());
        if let Ok(mut current) = self.current.lock() {
            *current = Some(child);
        }
        let current = Arc::clone(&self.current);
        std::thread::spawn(move || watch_player(current));
        Ok(())
    }
}

/// Clears the tracked process once playback ends on its own.
fn watch_player(current: Arc<Mutex<Option<Child>>>) {
    loop {
        std::thread::sleep(PLAYER_POLL);
        let Ok(mut guard) = current.lock() else {
            return;
        };
        let finished = match guard.as_mut() {
            Some(child) => !matches!(child.try_wait(), Ok(None)),
            None => return,
        };
        if finished {
            guard.take();
            debug!("event=music_play status=finished");
            return;
        }
    }
}

fn default_player() -> Option<String> {
    match std::env::consts::OS {
        "macos" => Some("afplay".to_string()),
        "linux" => Some("ffplay -nodisp -autoexit -loglevel quiet".to_string()),
        _ => None,
    }
}

fn is_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Audio files directly inside `dir`, sorted by name.
fn audio_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_audio(path))
        .collect();
    files.sort();
    Ok(files)
}

fn find_song(dir: &Path, song: &str) -> Result<Option<PathBuf>> {
    let wanted = song.trim().to_lowercase();
    if wanted.is_empty() {
        return Ok(None);
    }
    if let Some(hit) = audio_files(dir)?.into_iter().find(|path| {
        path.file_name()
            .map(|name| name.to_string_lossy().to_lowercase().contains(&wanted))
            .unwrap_or(false)
    }) {
        return Ok(Some(hit));
    }
    let mut subdirs: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    subdirs.sort();
    for sub in subdirs {
        if let Some(hit) = find_song(&sub, &wanted)? {
            return Ok(Some(hit));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callout_variant_rewrites_tty_paths_only() {
        assert_eq!(
            callout_variant("/dev/tty.usbmodem1"),
            Some("/dev/cu.usbmodem1".to_string())
        );
        assert_eq!(callout_variant("/dev/ttyACM0"), None);
    }

    #[test]
    fn commands_render_as_single_lines() {
        let all_on = DeviceCommand::Lights { on: true, light: None };
        assert_eq!(all_on.render(), "LIGHT ON ALL");
        let dim = DeviceCommand::Brightness {
            light: "kitchen lamp".to_string(),
            percent: 140,
        };
        assert_eq!(dim.render(), "BRIGHTNESS 100 kitchen lamp");
        assert_eq!(DeviceCommand::Locks { locked: false }.render(), "UNLOCK ALL");
        assert_eq!(DeviceCommand::Thermostat { degrees: 21 }.render(), "THERMOSTAT 21");
    }

    #[test]
    fn opening_a_missing_port_fails() {
        let mut bridge = SerialBridge::new("/dev/jarvis-no-such-port", 115_200);
        assert!(bridge.send(&DeviceCommand::Status { light: None }).is_err());
        assert_eq!(bridge.path, "/dev/jarvis-no-such-port");
    }

    #[test]
    fn songs_are_found_recursively_and_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b-side.mp3"), b"").unwrap();
        std::fs::write(dir.path().join("a-notes.txt"), b"").unwrap();
        std::fs::create_dir(dir.path().join("albums")).unwrap();
        std::fs::write(dir.path().join("albums").join("Blue Monday.OGG"), b"").unwrap();

        let first = audio_files(dir.path()).unwrap();
        assert_eq!(first, vec![dir.path().join("b-side.mp3")]);
        let found = find_song(dir.path(), "blue monday").unwrap().unwrap();
        assert!(found.ends_with("Blue Monday.OGG"));
        assert!(find_song(dir.path(), "yesterday").unwrap().is_none());
    }

    #[test]
    fn missing_directory_and_player_are_errors() {
        let mut unset = MusicPlayer::new(None, Some("true"));
        assert!(unset.play_first().is_err());

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("song.wav"), b"").unwrap();
        let mut silent =
            MusicPlayer::new(Some(dir.path().to_path_buf()), Some("jarvis-no-such-player"));
        assert!(silent.play_first().is_err());
        assert!(!silent.stop());
    }
}
