//! Replay script format.

use std::{fs, io, path::Path};

use serde::Deserialize;
use thiserror::Error;
use timeline_core::{PipelineInput, RoomContext, TimelineMode};

/// A recorded sequence of pipeline inputs.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ReplayScript {
    /// Overrides `TIMELINE_MODE` when present.
    #[serde(default)]
    pub mode: Option<TimelineMode>,
    #[serde(default)]
    pub room: RoomContext,
    /// Pins the marker clock so replays are reproducible.
    #[serde(default)]
    pub now_ms: Option<u64>,
    pub steps: Vec<PipelineInput>,
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("cannot read script '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid script '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ReplayScript {
    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let raw = fs::read_to_string(path).map_err(|source| ScriptError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ScriptError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}
