use std::io;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cutscene_engine::sim::{SimServer, StepReport};
use cutscene_engine::{
    CutsceneConfig, FinishedRecording, Look, LookInputSuppressor, LookPacket, LookVerdict,
    RecordTarget, RecordingRequest, Scene, SceneError, StartError, StopReason, ViewerHost,
    ViewerId,
};
use thiserror::Error;
use tracing::{error, info, warn};

use super::bootstrap::{AppWiring, DemoConfig};
use super::demo_scene;
use super::scene_file::{self, SceneFileError};

const DEMO_VIEWER: ViewerId = ViewerId(1);
const LOOK_INPUT_INTERVAL: Duration = Duration::from_millis(150);
const LOOK_INPUT_THREAD_NAME: &str = "look-input";

#[derive(Debug, Error)]
pub(crate) enum DemoError {
    #[error(transparent)]
    SceneFile(#[from] SceneFileError),
    #[error("failed to start playback: {0}")]
    Start(#[from] StartError),
    #[error("failed to spawn look input thread: {0}")]
    LookInputThread(#[source] io::Error),
    #[error("recording ended without a captured timeline")]
    RecordingMissing,
    #[error("recorded scene is invalid: {0}")]
    InvalidRecording(#[from] SceneError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LoopPacing {
    fixed_dt: Duration,
    max_frame_delta: Duration,
    max_ticks_per_frame: u32,
}

impl LoopPacing {
    fn new(cutscene: &CutsceneConfig, demo: &DemoConfig) -> Self {
        let fixed_dt = fixed_dt_for_tps(cutscene.ticks_per_second);
        Self {
            fixed_dt,
            max_frame_delta: normalize_non_zero_duration(demo.max_frame_delta, fixed_dt),
            max_ticks_per_frame: demo.max_ticks_per_frame.max(1),
        }
    }
}

#[derive(Debug, Default)]
struct LoopStats {
    ticks: u64,
    dropped_backlog_frames: u32,
    corrections_applied: usize,
    stopped: Vec<(ViewerId, StopReason)>,
    finished: Vec<FinishedRecording>,
}

impl LoopStats {
    fn absorb(&mut self, report: StepReport) {
        self.ticks += 1;
        self.corrections_applied += report.corrections_applied;
        self.stopped.extend(report.stopped);
        self.finished.extend(report.finished);
    }
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    if let Err(err) = run_demo(&app) {
        error!(error = %err, "startup_failed");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn run_demo(app: &AppWiring) -> Result<(), DemoError> {
    let scene = match &app.demo.scene_path {
        Some(path) => scene_file::load_scene(path)?,
        None => demo_scene::harbor_flyover(),
    };
    info!(
        scene = %scene.name,
        duration_ticks = scene.duration_ticks,
        camera_keyframes = scene.camera.len(),
        actor_count = scene.actors.len(),
        "scene_loaded"
    );

    let mut server = SimServer::new(app.cutscene.clone());
    for world in demo_scene::worlds_in(&scene) {
        server.host.add_world(world);
    }
    server.join_viewer(DEMO_VIEWER, demo_scene::viewer_spawn(&scene));
    let pacing = LoopPacing::new(&app.cutscene, &app.demo);
    info!(
        fixed_dt_ms = pacing.fixed_dt.as_millis() as u64,
        max_frame_delta_ms = pacing.max_frame_delta.as_millis() as u64,
        max_ticks_per_frame = pacing.max_ticks_per_frame,
        "loop_config"
    );

    server.play(DEMO_VIEWER, Arc::new(scene.clone()))?;
    let look_input = LookInputFeed::spawn(server.suppressor(), DEMO_VIEWER)?;
    let playback = run_paced(&mut server, &pacing, |_| {});
    let suppressed = look_input.finish();
    info!(
        ticks = playback.ticks,
        suppressed_look_packets = suppressed,
        corrections_applied = playback.corrections_applied,
        dropped_backlog_frames = playback.dropped_backlog_frames,
        stopped = ?playback.stopped,
        "playback_finished"
    );

    if let Some(path) = &app.demo.record_out {
        let mut scene = scene;
        record_stand_in(&mut server, &pacing, &mut scene)?;
        scene_file::save_scene(path, &scene)?;
        info!(path = %path.display(), scene = %scene.name, "scene_saved");
    }

    server.shutdown();
    Ok(())
}

/// Walks the viewer along a scripted path while the recorder captures it,
/// then writes the take into `scene` as the stand-in actor's timeline.
fn record_stand_in(
    server: &mut SimServer,
    pacing: &LoopPacing,
    scene: &mut Scene,
) -> Result<(), DemoError> {
    let origin = demo_scene::viewer_spawn(scene);
    server.record(
        DEMO_VIEWER,
        RecordingRequest {
            target: RecordTarget::Actor(demo_scene::STAND_IN_ACTOR.to_string()),
            duration_ticks: demo_scene::RECORDING_TICKS,
        },
    );

    let mut walked = 0u64;
    let stats = run_paced(server, pacing, |server| {
        server
            .host
            .teleport(DEMO_VIEWER, &demo_scene::scripted_walk(&origin, walked));
        walked += 1;
    });

    let take = stats
        .finished
        .into_iter()
        .find(|finished| finished.viewer == DEMO_VIEWER)
        .ok_or(DemoError::RecordingMissing)?;
    scene.replace_timeline(&take.target, take.timeline);
    scene.validate()?;
    info!(
        target = ?take.target,
        ticks = stats.ticks,
        duration_ticks = scene.duration_ticks,
        "recording_applied"
    );
    Ok(())
}

/// Steps `server` at the fixed rate until nothing is playing or recording.
fn run_paced(
    server: &mut SimServer,
    pacing: &LoopPacing,
    mut before_step: impl FnMut(&mut SimServer),
) -> LoopStats {
    let mut stats = LoopStats::default();
    let mut accumulator = Duration::ZERO;
    let mut last_frame_instant = Instant::now();

    while !server.is_idle() {
        let frame_start = Instant::now();
        let frame_dt = clamp_frame_delta(
            frame_start.duration_since(last_frame_instant),
            pacing.max_frame_delta,
        );
        last_frame_instant = frame_start;
        accumulator = accumulator.saturating_add(frame_dt);

        let plan = plan_sim_steps(accumulator, pacing.fixed_dt, pacing.max_ticks_per_frame);
        accumulator = plan.remaining_accumulator;
        if plan.dropped_backlog > Duration::ZERO {
            stats.dropped_backlog_frames += 1;
            warn!(
                dropped_backlog_ms = plan.dropped_backlog.as_millis() as u64,
                ticks_run = plan.ticks_to_run,
                "sim_backlog_dropped"
            );
        }

        for _ in 0..plan.ticks_to_run {
            if server.is_idle() {
                break;
            }
            before_step(server);
            stats.absorb(server.step());
        }

        thread::sleep(pacing.fixed_dt.saturating_sub(frame_start.elapsed()));
    }
    stats
}

/// Stand-in for client look input arriving on a network thread while the
/// viewer tries to look around.
struct LookInputFeed {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<usize>,
}

impl LookInputFeed {
    fn spawn(suppressor: LookInputSuppressor, viewer: ViewerId) -> Result<Self, DemoError> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name(LOOK_INPUT_THREAD_NAME.to_string())
            .spawn(move || {
                let mut suppressed = 0usize;
                let mut sent = 0u64;
                while !thread_stop.load(Ordering::Relaxed) {
                    let mut packet = LookPacket::new(viewer, scripted_look(sent));
                    if suppressor.on_look_packet(&mut packet) == LookVerdict::Suppressed {
                        suppressed += 1;
                    }
                    sent = sent.wrapping_add(1);
                    thread::sleep(LOOK_INPUT_INTERVAL);
                }
                suppressed
            })
            .map_err(DemoError::LookInputThread)?;
        Ok(Self { stop, handle })
    }

    fn finish(self) -> usize {
        self.stop.store(true, Ordering::Relaxed);
        match self.handle.join() {
            Ok(suppressed) => suppressed,
            Err(_) => {
                warn!("look_input_thread_panicked");
                0
            }
        }
    }
}

/// Look the input thread sends with its `sent`-th packet; sweeps in 37 degree
/// steps.
fn scripted_look(sent: u64) -> Look {
    Look {
        yaw: (sent % 360 * 37 % 360) as f32,
        pitch: 0.0,
    }
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn fixed_dt_for_tps(ticks_per_second: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(ticks_per_second.max(1)))
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}
