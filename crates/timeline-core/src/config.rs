//! Environment-backed pipeline configuration.

use std::env;

use thiserror::Error;

use crate::types::TimelineMode;

pub const DEFAULT_INITIAL_CHUNK_SIZE: usize = 50;
pub const DEFAULT_INPUT_BUFFER: usize = 128;
pub const DEFAULT_SIGNAL_BUFFER: usize = 64;

/// Tuning for one timeline pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Which slice of the room the pipeline tracks.
    pub mode: TimelineMode,
    /// Items per chunk when posting the initial cached list.
    pub initial_chunk_size: usize,
    /// Capacity of the input queue.
    pub input_buffer: usize,
    /// Capacity of the signal broadcast.
    pub signal_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: TimelineMode::Live,
            initial_chunk_size: DEFAULT_INITIAL_CHUNK_SIZE,
            input_buffer: DEFAULT_INPUT_BUFFER,
            signal_buffer: DEFAULT_SIGNAL_BUFFER,
        }
    }
}

impl PipelineConfig {
    /// Default configuration for a timeline in `mode`.
    pub fn for_mode(mode: TimelineMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Parse configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mode = match optional_trimmed_env("TIMELINE_MODE", &mut lookup) {
            None => TimelineMode::Live,
            Some(value) => parse_mode(&value).ok_or_else(|| ConfigError::InvalidValue {
                key: "TIMELINE_MODE",
                value,
                reason: "expected one of live, focused, pinned".to_owned(),
            })?,
        };

        let initial_chunk_size = parse_positive_usize(
            "TIMELINE_INITIAL_CHUNK_SIZE",
            DEFAULT_INITIAL_CHUNK_SIZE,
            &mut lookup,
        )?;
        let input_buffer =
            parse_positive_usize("TIMELINE_INPUT_BUFFER", DEFAULT_INPUT_BUFFER, &mut lookup)?;
        let signal_buffer =
            parse_positive_usize("TIMELINE_SIGNAL_BUFFER", DEFAULT_SIGNAL_BUFFER, &mut lookup)?;

        Ok(Self {
            mode,
            initial_chunk_size,
            input_buffer,
            signal_buffer,
        })
    }
}

/// Errors produced while parsing pipeline configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    #[error("invalid {key}='{value}': {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

fn parse_mode(value: &str) -> Option<TimelineMode> {
    match value.to_ascii_lowercase().as_str() {
        "live" => Some(TimelineMode::Live),
        "focused" | "focused_on_event" => Some(TimelineMode::FocusedOnEvent),
        "pinned" | "pinned_events" => Some(TimelineMode::PinnedEvents),
        _ => None,
    }
}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_positive_usize<F>(
    key: &'static str,
    default: usize,
    lookup: &mut F,
) -> Result<usize, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(default);
    };
    let parsed = value
        .parse::<usize>()
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value: value.clone(),
            reason: err.to_string(),
        })?;
    if parsed == 0 {
        return Err(ConfigError::InvalidValue {
            key,
            value,
            reason: "must be at least 1".to_owned(),
        });
    }
    Ok(parsed)
}
