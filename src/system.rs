//! Operating-system and web collaborators: browser, applications, volume,
//! media keys and weather.
//!
//! Each operation shells out to the platform's stock tooling (`open`,
//! `xdg-open`, `pactl`, `osascript`, `playerctl`, `taskkill`). Results are
//! only success or failure; the dispatcher turns failures into apologies.

use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::{debug, info};
use serde::Deserialize;

use crate::commands::MediaAction;

const WEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

/// Requested change to the output volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VolumeChange {
    Set(u8),
    By(i32),
    Mute,
    Unmute,
}

/// Opaque desktop actions invoked with parameters from the command registry.
pub trait SystemControl {
    fn open_url(&mut self, url: &str) -> Result<()>;

    /// Launches `target`, retrying through the platform launcher with `fallback`.
    fn open_app(&mut self, target: &str, fallback: Option<&str>) -> Result<()>;

    /// Terminates processes named `process`; `Ok(false)` when none were running.
    fn close_app(&mut self, process: &str) -> Result<bool>;

    fn close_active_window(&mut self) -> Result<()>;

    /// Applies `change` and returns the resulting level when it is known.
    fn set_volume(&mut self, change: VolumeChange) -> Result<Option<u8>>;

    fn media(&mut self, action: MediaAction) -> Result<()>;

    /// A spoken summary of the current weather in `city`.
    fn weather(&mut self, city: &str) -> Result<String>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Platform {
    MacOs,
    Linux,
    Windows,
    Other,
}

impl Platform {
    fn current() -> Self {
        match std::env::consts::OS {
            "macos" => Platform::MacOs,
            "linux" => Platform::Linux,
            "windows" => Platform::Windows,
            _ => Platform::Other,
        }
    }
}

#[derive(Deserialize)]
struct WeatherResponse {
    main: WeatherMain,
    weather: Vec<WeatherDescription>,
}

#[derive(Deserialize)]
struct WeatherMain {
    temp: f64,
    humidity: f64,
}

#[derive(Deserialize)]
struct WeatherDescription {
    description: String,
}

/// Desktop implementation backed by platform commands and OpenWeatherMap.
pub struct DesktopSystem {
    platform: Platform,
    http: reqwest::blocking::Client,
    weather_key: Option<String>,
}

impl DesktopSystem {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(weather_key: Option<String>) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .with_context(|| "Failed to build HTTP client for weather")?;
        Ok(Self {
            platform: Platform::current(),
            http,
            weather_key: weather_key.filter(|key| !key.trim().is_empty()),
        })
    }

    fn unsupported(&self, what: &str) -> anyhow::Error {
        anyhow::anyhow!("{what} is not supported on {}", std::env::consts::OS)
    }

    fn current_volume(&self) -> Result<u8> {
        let output = match self.platform {
            Platform::MacOs => capture("osascript", &["-e", "output volume of (get volume settings)"])?,
            Platform::Linux => capture("pactl", &["get-sink-volume", "@DEFAULT_SINK@"])?,
            _ => return Err(self.unsupported("Reading the volume")),
        };
        parse_volume(&output).with_context(|| format!("Unrecognized volume output `{}`", output.trim()))
    }

    fn apply_volume(&self, level: u8) -> Result<()> {
        match self.platform {
            Platform::MacOs => run("osascript", &["-e", &format!("set volume output volume {level}")]),
            Platform::Linux => run("pactl", &["set-sink-volume", "@DEFAULT_SINK@", &format!("{level}%")]),
            _ => Err(self.unsupported("Volume control")),
        }
    }

    fn apply_mute(&self, mute: bool) -> Result<()> {
        match (self.platform, mute) {
            (Platform::MacOs, true) => run("osascript", &["-e", "set volume with output muted"]),
            (Platform::MacOs, false) => run("osascript", &["-e", "set volume without output muted"]),
            (Platform::Linux, mute) => run(
                "pactl",
                &["set-sink-mute", "@DEFAULT_SINK@", if mute { "1" } else { "0" }],
            ),
            _ => Err(self.unsupported("Muting")),
        }
    }
}

impl SystemControl for DesktopSystem {
    fn open_url(&mut self, url: &str) -> Result<()> {
        info!("event=open_url url={}", url);
        match self.platform {
            Platform::MacOs => spawn("open", &[url]),
            Platform::Windows => spawn("cmd", &["/C", "start", "", url]),
            _ => spawn("xdg-open", &[url]),
        }
    }

    fn open_app(&mut self, target: &str, fallback: Option<&str>) -> Result<()> {
        info!("event=open_app target={}", target);
        let direct = spawn(target, &[]);
        let Err(err) = direct else {
            return Ok(());
        };
        let Some(fallback) = fallback else {
            return Err(err);
        };
        debug!("event=open_app status=fallback target={} error={:#}", fallback, err);
        match self.platform {
            Platform::MacOs => spawn("open", &["-a", fallback]),
            Platform::Windows => spawn("cmd", &["/C", "start", "", fallback]),
            _ => spawn("xdg-open", &[fallback]),
        }
    }

    fn close_app(&mut self, process: &str) -> Result<bool> {
        info!("event=close_app process={}", process);
        let status = match self.platform {
            Platform::Windows => Command::new("taskkill").args(["/IM", process, "/F"]).status(),
            _ => Command::new("pkill").args(["-x", process]).status(),
        }
        .with_context(|| format!("Failed to run the process killer for {process}"))?;
        Ok(status.success())
    }

    fn close_active_window(&mut self) -> Result<()> {
        match self.platform {
            Platform::MacOs => run(
                "osascript",
                &["-e", "tell application \"System Events\" to keystroke \"w\" using command down"],
            ),
            Platform::Linux => run("xdotool", &["getactivewindow", "windowclose"]),
            _ => Err(self.unsupported("Closing the active window")),
        }
    }

    fn set_volume(&mut self, change: VolumeChange) -> Result<Option<u8>> {
        info!("event=volume change={:?}", change);
        match change {
            VolumeChange::Mute => self.apply_mute(true).map(|()| None),
            VolumeChange::Unmute => self.apply_mute(false).map(|()| None),
            VolumeChange::Set(level) => {
                let level = level.min(100);
                self.apply_volume(level)?;
                Ok(Some(level))
            }
            VolumeChange::By(delta) => {
                let level = adjust_level(self.current_volume()?, delta);
                self.apply_volume(level)?;
                Ok(Some(level))
            }
        }
    }

    fn media(&mut self, action: MediaAction) -> Result<()> {
        info!("event=media action={:?}", action);
        match self.platform {
            Platform::MacOs => {
                let verb = match action {
                    MediaAction::Play => "play",
                    MediaAction::Pause => "pause",
                    MediaAction::Next => "next track",
                    MediaAction::Previous => "previous track",
                };
                run("osascript", &["-e", &format!("tell application \"Music\" to {verb}")])
            }
            Platform::Linux => {
                let verb = match action {
                    MediaAction::Play => "play",
                    MediaAction::Pause => "pause",
                    MediaAction::Next => "next",
                    MediaAction::Previous => "previous",
                };
                run("playerctl", &[verb])
            }
            _ => Err(self.unsupported("Media control")),
        }
    }

    fn weather(&mut self, city: &str) -> Result<String> {
        let Some(key) = self.weather_key.as_deref() else {
            bail!("My OpenWeatherMap API key is not configured.");
        };
        let response = self
            .http
            .get(WEATHER_URL)
            .query(&[("q", city), ("appid", key), ("units", "metric")])
            .send()
            .with_context(|| "I cannot connect to the weather service right now.")?;
        match response.status().as_u16() {
            401 => bail!("It seems my OpenWeatherMap API key is invalid."),
            404 => bail!("I could not find weather information for {city}."),
            code if code >= 400 => bail!("The weather service answered with status {code}."),
            _ => {}
        }
        let body: WeatherResponse = response
            .json()
            .with_context(|| "I received an unreadable response from the weather service.")?;
        Ok(describe_weather(city, &body))
    }
}

fn describe_weather(city: &str, body: &WeatherResponse) -> String {
    let description = body
        .weather
        .first()
        .map(|w| w.description.as_str())
        .unwrap_or("unsettled");
    format!(
        "The weather in {city} is currently {description}, with a temperature of {:.1} degrees Celsius and humidity of {:.0} percent.",
        body.main.temp, body.main.humidity
    )
}

/// Picks the first `NN%` (Linux) or bare number (macOS) out of a volume report.
fn parse_volume(output: &str) -> Option<u8> {
    let token = output
        .split(|c: char| c.is_whitespace() || c == '/')
        .find(|t| t.ends_with('%'))
        .map(|t| t.trim_end_matches('%'))
        .unwrap_or_else(|| output.trim());
    token.parse::<u16>().ok().map(|v| v.min(100) as u8)
}

fn adjust_level(current: u8, delta: i32) -> u8 {
    (i32::from(current) + delta).clamp(0, 100) as u8
}

fn spawn(program: &str, args: &[&str]) -> Result<()> {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("Failed to start {program}"))?;
    Ok(())
}

fn run(program: &str, args: &[&str]) -> Result<()> {
    let status = Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("Failed to run {program}"))?;
    if !status.success() {
        bail!("{program} exited with {status}");
    }
    Ok(())
}

fn capture(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("Failed to run {program}"))?;
    if !output.status.success() {
        bail!("{program} exited with {}", output.status);
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_reports_parse_on_both_platforms() {
        let pactl = "Volume: front-left: 32768 /  50% / -18.06 dB,   front-right: 32768 /  50% / -18.06 dB";
        assert_eq!(parse_volume(pactl), Some(50));
        assert_eq!(parse_volume("73\n"), Some(73));
        assert_eq!(parse_volume("muted"), None);
    }

    #[test]
    fn relative_changes_clamp() {
        assert_eq!(adjust_level(95, 10), 100);
        assert_eq!(adjust_level(5, -10), 0);
        assert_eq!(adjust_level(40, 20), 60);
    }

    #[test]
    fn weather_requires_a_key() {
        let mut system = DesktopSystem::new(Some("  ".to_string())).unwrap();
        let err = system.weather("Sydney").unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }

    #[test]
    fn weather_sentence() {
        let body: WeatherResponse = serde_json::from_str(
            r#"{"main": {"temp": 21.44, "humidity": 60}, "weather": [{"description": "light rain"}]}"#,
        )
        .unwrap();
        assert_eq!(
            describe_weather("Sydney", &body),
            "The weather in Sydney is currently light rain, with a temperature of 21.4 degrees Celsius and humidity of 60 percent."
        );
    }

    #[test]
    fn missing_program_is_an_error() {
        assert!(run("jarvis-no-such-program", &[]).is_err());
        assert!(spawn("jarvis-no-such-program", &[]).is_err());
    }
}
