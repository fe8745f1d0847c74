use std::env;

use thiserror::Error;
use tracing::warn;

pub mod host;
pub mod look;
pub mod model;
pub mod playback;
pub mod recorder;
pub mod runtime;
pub mod sim;

pub use host::{
    ActorAppearance, CutsceneHost, EntityHost, EntityId, EntityKind, GameMode, RigTraits,
    SpawnRequest, TaskHandle, TaskHost, ViewerHost, ViewerId, WorldHost, CAMERA_RIG_TRAITS,
};
pub use look::{LookCorrection, LookInputSuppressor, LookPacket, LookVerdict, WantedLookHandle};
pub use model::{
    ActorTemplate, CameraPoint, Look, RecordTarget, Scene, SceneError, Tick, Timeline, Transform,
};
pub use recorder::{FinishedRecording, Recorder, RecorderEvent, RecorderPhase, RecordingRequest};
pub use runtime::{
    CutsceneRuntime, PlaybackPhase, SessionView, StartError, StopReason, StopRecord, TickOutcome,
    STOP_HISTORY_CAPACITY,
};

pub const DEBUG_ENV_VAR: &str = "CUTSCENE_DEBUG";
pub const ZOOM_LEVEL_ENV_VAR: &str = "CUTSCENE_ZOOM_LEVEL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutsceneConfig {
    /// Enables per-tick playback traces.
    pub debug: bool,
    /// Amplifier of the zoom effect applied while a session runs.
    pub zoom_level: u32,
    pub ticks_per_second: u32,
    pub countdown_seconds: u32,
}

impl Default for CutsceneConfig {
    fn default() -> Self {
        Self {
            debug: false,
            zoom_level: 2,
            ticks_per_second: 20,
            countdown_seconds: 3,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("{var} must be one of 1/0/true/false/yes/no/on/off, got '{value}'")]
    InvalidFlag { var: &'static str, value: String },
    #[error("{var} must be a non-negative integer, got '{value}'")]
    InvalidLevel { var: &'static str, value: String },
}

impl CutsceneConfig {
    pub fn try_from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let debug = match read_env(DEBUG_ENV_VAR)? {
            Some(value) => parse_flag(&value).ok_or(ConfigError::InvalidFlag {
                var: DEBUG_ENV_VAR,
                value,
            })?,
            None => defaults.debug,
        };
        let zoom_level = match read_env(ZOOM_LEVEL_ENV_VAR)? {
            Some(value) => value
                .trim()
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidLevel {
                    var: ZOOM_LEVEL_ENV_VAR,
                    value: value.clone(),
                })?,
            None => defaults.zoom_level,
        };
        Ok(Self {
            debug,
            zoom_level,
            ..defaults
        })
    }

    /// Like [`Self::try_from_env`], but falls back to defaults with a warning.
    pub fn from_env() -> Self {
        Self::try_from_env().unwrap_or_else(|error| {
            warn!(error = %error, "invalid cutscene config; falling back to defaults");
            Self::default()
        })
    }
}

fn read_env(var: &'static str) -> Result<Option<String>, ConfigError> {
    match env::var(var) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(source) => Err(ConfigError::EnvVar { var, source }),
    }
}

pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
