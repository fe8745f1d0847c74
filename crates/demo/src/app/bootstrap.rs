use std::path::PathBuf;
use std::time::Duration;

use cutscene_engine::{parse_flag, CutsceneConfig, DEBUG_ENV_VAR};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SCENE_ENV_VAR: &str = "CUTSCENE_SCENE";
const TPS_ENV_VAR: &str = "CUTSCENE_TPS";
const RECORD_OUT_ENV_VAR: &str = "CUTSCENE_RECORD_OUT";
const DEFAULT_MAX_FRAME_DELTA: Duration = Duration::from_millis(250);
const DEFAULT_MAX_TICKS_PER_FRAME: u32 = 5;

pub(crate) struct AppWiring {
    pub(crate) cutscene: CutsceneConfig,
    pub(crate) demo: DemoConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DemoConfig {
    /// Scene JSON to play; the built-in flyover when unset.
    pub(crate) scene_path: Option<PathBuf>,
    /// Where the scene is written back after the scripted recording.
    pub(crate) record_out: Option<PathBuf>,
    pub(crate) max_frame_delta: Duration,
    pub(crate) max_ticks_per_frame: u32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            scene_path: None,
            record_out: None,
            max_frame_delta: DEFAULT_MAX_FRAME_DELTA,
            max_ticks_per_frame: DEFAULT_MAX_TICKS_PER_FRAME,
        }
    }
}

pub(crate) fn build_app() -> AppWiring {
    let debug = std::env::var(DEBUG_ENV_VAR)
        .ok()
        .as_deref()
        .and_then(parse_flag)
        .unwrap_or(false);
    init_tracing(debug);
    info!("=== Cutscene Demo Startup ===");

    let mut cutscene = CutsceneConfig::from_env();
    cutscene.ticks_per_second = parse_tps(
        std::env::var(TPS_ENV_VAR).ok().as_deref(),
        cutscene.ticks_per_second,
    );
    let demo = DemoConfig {
        scene_path: parse_path(std::env::var(SCENE_ENV_VAR).ok().as_deref()),
        record_out: parse_path(std::env::var(RECORD_OUT_ENV_VAR).ok().as_deref()),
        ..DemoConfig::default()
    };
    info!(
        debug = cutscene.debug,
        zoom_level = cutscene.zoom_level,
        ticks_per_second = cutscene.ticks_per_second,
        scene_path = ?demo.scene_path,
        record_out = ?demo.record_out,
        "demo_config"
    );

    AppWiring { cutscene, demo }
}

fn init_tracing(debug: bool) {
    let default_directive = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn parse_tps(raw: Option<&str>, fallback: u32) -> u32 {
    let Some(value) = raw else {
        return fallback;
    };
    match value.trim().parse::<u32>() {
        Ok(parsed) if parsed > 0 => parsed,
        _ => {
            warn!(value, fallback_tps = fallback, "cutscene_invalid_tps_using_default");
            fallback
        }
    }
}

fn parse_path(raw: Option<&str>) -> Option<PathBuf> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
