use std::collections::BTreeMap;
use std::fs;
use std::num::NonZeroU32;
use std::path::Path;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::timer::delay::TimeDisplayMode;

pub const DEFAULT_DEVICE_TIMER_INTERVAL_MINUTES: u32 = 60;
pub const DEFAULT_UI_TIME_STEP_MINUTES: u32 = 15;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read widget config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON at line {line}, column {column}: {message}")]
    Json {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("unknown config key(s): {0}")]
    UnknownKeys(String),
    #[error("widget config is missing; expected a JSON object")]
    MissingObject,
    #[error("invalid mode '{0}'; expected 'start' or 'end'")]
    InvalidMode(String),
    #[error("{field} must be a positive whole number of minutes, got {value}")]
    InvalidMinutes { field: &'static str, value: i64 },
    #[error("invalid default_time '{0}', expected HH:MM")]
    InvalidDefaultTime(String),
    #[error("invalid time_format '{0}'; expected '24h' or '12h'")]
    InvalidTimeFormat(String),
    #[error("mode 'end' requires a non-empty programs list")]
    ProgramsRequired,
    #[error("program at position {0} must have a name")]
    UnnamedProgram(usize),
    #[error("program '{name}' must have a positive duration, got {duration}")]
    InvalidProgramDuration { name: String, duration: i64 },
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Start,
    End,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Start => "start",
            Mode::End => "end",
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Program {
    pub name: String,
    pub duration_minutes: u32,
    pub offset_minutes: i64,
}

impl Program {
    /// Minutes between the programmed start and the moment the target refers to.
    /// Negative when the offset exceeds the duration.
    pub fn run_minutes(&self) -> i64 {
        i64::from(self.duration_minutes) - self.offset_minutes
    }
}

#[derive(Debug, Clone)]
pub struct WidgetConfig {
    pub mode: Mode,
    pub device_timer_interval_minutes: NonZeroU32,
    pub ui_time_step_minutes: NonZeroU32,
    pub default_time: Option<NaiveTime>,
    pub price_entity: Option<String>,
    pub programs: Vec<Program>,
    pub title: Option<String>,
    pub time_format: TimeDisplayMode,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Start,
            device_timer_interval_minutes: NonZeroU32::new(DEFAULT_DEVICE_TIMER_INTERVAL_MINUTES)
                .unwrap_or(NonZeroU32::MIN),
            ui_time_step_minutes: NonZeroU32::new(DEFAULT_UI_TIME_STEP_MINUTES)
                .unwrap_or(NonZeroU32::MIN),
            default_time: None,
            price_entity: None,
            programs: Vec::new(),
            title: None,
            time_format: TimeDisplayMode::Hour24,
        }
    }
}

impl WidgetConfig {
    pub fn price_configured(&self) -> bool {
        self.price_entity.is_some()
    }

    pub fn program(&self, index: usize) -> Option<&Program> {
        self.programs.get(index)
    }
}

pub fn load_widget_config(path: &Path) -> Result<WidgetConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let config = parse_widget_config_text(&content)?;
    debug!(
        path = %path.display(),
        mode = config.mode.as_str(),
        programs = config.programs.len(),
        "widget config loaded"
    );
    Ok(config)
}

pub fn parse_widget_config_text(content: &str) -> Result<WidgetConfig, ConfigError> {
    let raw = serde_json::from_str::<Option<WidgetConfigFile>>(content)
        .map_err(|err| ConfigError::Json {
            line: err.line(),
            column: err.column(),
            message: err.to_string(),
        })?
        .ok_or(ConfigError::MissingObject)?;

    let unknown: Vec<&str> = raw
        .extra
        .keys()
        .map(String::as_str)
        .filter(|key| !HOST_KEYS.contains(key))
        .collect();
    if !unknown.is_empty() {
        return Err(ConfigError::UnknownKeys(unknown.join(", ")));
    }

    let mode = match raw.mode.as_deref() {
        None | Some("start") => Mode::Start,
        Some("end") => Mode::End,
        Some(value) => return Err(ConfigError::InvalidMode(value.to_string())),
    };

    let device_timer_interval_minutes = positive_minutes(
        "device_timer_interval",
        raw.device_timer_interval,
        DEFAULT_DEVICE_TIMER_INTERVAL_MINUTES,
    )?;
    let ui_time_step_minutes = positive_minutes(
        "ui_time_step",
        raw.ui_time_step,
        DEFAULT_UI_TIME_STEP_MINUTES,
    )?;
    if 60 % ui_time_step_minutes.get() != 0 {
        warn!(
            ui_time_step = ui_time_step_minutes.get(),
            "ui_time_step does not divide an hour evenly; minute steps will not line up"
        );
    }

    let default_time = raw
        .default_time
        .as_deref()
        .map(parse_default_time)
        .transpose()?;

    let time_format = match raw.time_format.as_deref().map(str::trim) {
        None | Some("24h") => TimeDisplayMode::Hour24,
        Some("12h") => TimeDisplayMode::Hour12,
        Some(other) => return Err(ConfigError::InvalidTimeFormat(other.to_string())),
    };

    let price_entity = raw
        .price_entity
        .map(|entity| entity.trim().to_string())
        .filter(|entity| !entity.is_empty());

    let programs_given = raw.programs.is_some();
    let mut programs = Vec::new();
    for (position, program) in raw.programs.unwrap_or_default().into_iter().enumerate() {
        let name = program.name.trim().to_string();
        if name.is_empty() {
            return Err(ConfigError::UnnamedProgram(position));
        }
        let duration_minutes = u32::try_from(program.duration)
            .ok()
            .filter(|minutes| *minutes > 0)
            .ok_or_else(|| ConfigError::InvalidProgramDuration {
                name: name.clone(),
                duration: program.duration,
            })?;
        programs.push(Program {
            name,
            duration_minutes,
            offset_minutes: program.offset,
        });
    }

    if mode == Mode::End && (!programs_given || programs.is_empty()) {
        return Err(ConfigError::ProgramsRequired);
    }

    Ok(WidgetConfig {
        mode,
        device_timer_interval_minutes,
        ui_time_step_minutes,
        default_time,
        price_entity,
        programs,
        title: raw.title.filter(|title| !title.trim().is_empty()),
        time_format,
    })
}

fn positive_minutes(
    field: &'static str,
    value: Option<i64>,
    default: u32,
) -> Result<NonZeroU32, ConfigError> {
    let value = value.unwrap_or(i64::from(default));
    u32::try_from(value)
        .ok()
        .and_then(NonZeroU32::new)
        .ok_or(ConfigError::InvalidMinutes { field, value })
}

fn parse_default_time(input: &str) -> Result<NaiveTime, ConfigError> {
    let trimmed = input.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|_| ConfigError::InvalidDefaultTime(input.to_string()))
}

/// Keys the dashboard host writes into every card config.
const HOST_KEYS: &[&str] = &["type"];

#[derive(Debug, Deserialize)]
struct WidgetConfigFile {
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    device_timer_interval: Option<i64>,
    #[serde(default)]
    ui_time_step: Option<i64>,
    #[serde(default)]
    default_time: Option<String>,
    #[serde(default)]
    price_entity: Option<String>,
    #[serde(default)]
    programs: Option<Vec<ProgramFile>>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    time_format: Option<String>,
    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ProgramFile {
    name: String,
    duration: i64,
    #[serde(default)]
    offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_widget_config() {
        let json = r#"
{
  "type": "custom:delay-start-card",
  "title": "Dishwasher",
  "mode": "end",
  "device_timer_interval": 30,
  "ui_time_step": 10,
  "default_time": "06:30",
  "price_entity": "sensor.cheapest_price_in",
  "time_format": "12h",
  "programs": [
    { "name": "Eco", "duration": 225, "offset": 15 },
    { "name": "Quick", "duration": 45 }
  ]
}
"#;

        let config = parse_widget_config_text(json).expect("valid config");
        assert_eq!(config.mode, Mode::End);
        assert_eq!(config.device_timer_interval_minutes.get(), 30);
        assert_eq!(config.ui_time_step_minutes.get(), 10);
        assert_eq!(
            config.default_time,
            Some(NaiveTime::from_hms_opt(6, 30, 0).expect("valid time"))
        );
        assert_eq!(
            config.price_entity.as_deref(),
            Some("sensor.cheapest_price_in")
        );
        assert_eq!(config.title.as_deref(), Some("Dishwasher"));
        assert_eq!(config.time_format, TimeDisplayMode::Hour12);
        assert_eq!(config.programs.len(), 2);
        assert_eq!(config.programs[0].run_minutes(), 210);
        assert_eq!(config.programs[1].offset_minutes, 0);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let config = parse_widget_config_text("{}").expect("valid config");
        assert_eq!(config.mode, Mode::Start);
        assert_eq!(config.device_timer_interval_minutes.get(), 60);
        assert_eq!(config.ui_time_step_minutes.get(), 15);
        assert!(config.default_time.is_none());
        assert!(!config.price_configured());
        assert!(config.programs.is_empty());
        assert_eq!(config.time_format, TimeDisplayMode::Hour24);
    }

    #[test]
    fn null_document_is_a_missing_config() {
        let err = parse_widget_config_text("null").expect_err("null should fail");
        assert!(matches!(err, ConfigError::MissingObject));
    }

    #[test]
    fn malformed_json_reports_position() {
        let err = parse_widget_config_text("{ \"mode\": ").expect_err("truncated json");
        assert!(err.to_string().contains("invalid JSON at line 1"));
    }

    #[test]
    fn rejects_unknown_mode() {
        let err = parse_widget_config_text(r#"{ "mode": "finish" }"#).expect_err("bad mode");
        assert!(matches!(err, ConfigError::InvalidMode(ref mode) if mode == "finish"));
    }

    #[test]
    fn mode_is_case_sensitive() {
        for mode in ["END", "Start", " end"] {
            let json = format!(r#"{{ "mode": "{mode}" }}"#);
            let err = parse_widget_config_text(&json).expect_err("mode must match exactly");
            assert!(matches!(err, ConfigError::InvalidMode(ref got) if got == mode));
        }
    }

    #[test]
    fn misspelled_keys_are_rejected() {
        let err = parse_widget_config_text(r#"{ "device_timer_intervall": 0 }"#)
            .expect_err("typo must not fall back to the default interval");
        assert!(matches!(err, ConfigError::UnknownKeys(ref keys) if keys == "device_timer_intervall"));

        let err = parse_widget_config_text(
            r#"{ "type": "custom:delay-start-card", "ui_step": 5, "device_timer_interval_minutes": 30 }"#,
        )
        .expect_err("unknown keys");
        assert_eq!(
            err.to_string(),
            "unknown config key(s): device_timer_interval_minutes, ui_step"
        );
    }

    #[test]
    fn end_mode_requires_programs() {
        let err = parse_widget_config_text(r#"{ "mode": "end" }"#).expect_err("no programs");
        assert!(matches!(err, ConfigError::ProgramsRequired));

        let err = parse_widget_config_text(r#"{ "mode": "end", "programs": [] }"#)
            .expect_err("empty programs");
        assert!(matches!(err, ConfigError::ProgramsRequired));
    }

    #[test]
    fn rejects_non_positive_intervals() {
        let err = parse_widget_config_text(r#"{ "device_timer_interval": 0 }"#)
            .expect_err("zero interval");
        assert!(err.to_string().contains("device_timer_interval"));

        let err =
            parse_widget_config_text(r#"{ "ui_time_step": -15 }"#).expect_err("negative step");
        assert!(matches!(
            err,
            ConfigError::InvalidMinutes {
                field: "ui_time_step",
                value: -15
            }
        ));
    }

    #[test]
    fn rejects_invalid_default_time() {
        let err = parse_widget_config_text(r#"{ "default_time": "25:00" }"#)
            .expect_err("bad default time");
        assert!(err.to_string().contains("invalid default_time"));
    }

    #[test]
    fn rejects_program_without_duration() {
        let json = r#"{ "programs": [ { "name": "Eco", "duration": 0 } ] }"#;
        let err = parse_widget_config_text(json).expect_err("zero duration");
        assert!(err.to_string().contains("program 'Eco'"));
    }

    #[test]
    fn blank_price_entity_counts_as_unconfigured() {
        let config =
            parse_widget_config_text(r#"{ "price_entity": "  " }"#).expect("valid config");
        assert!(!config.price_configured());
    }
}
