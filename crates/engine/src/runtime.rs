use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::host::{CutsceneHost, EntityId, GameMode, TaskHandle, ViewerId};
use crate::look::{correction_channel, LookCorrection, LookInputSuppressor, WantedLookHandle};
use crate::model::{Scene, Tick, Transform};
use crate::playback::{self, ActorIds, LockStatus};
use crate::CutsceneConfig;

pub const STOP_HISTORY_CAPACITY: usize = 64;
const TICK_TASK_DELAY: u32 = 0;
const TICK_TASK_PERIOD: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    Restart,
    ViewerMissing,
    RigOrWorldMissing,
    LockMismatch,
    End,
    Quit,
    WorldChange,
    Requested,
    Shutdown,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Restart => "restart",
            Self::ViewerMissing => "viewer missing",
            Self::RigOrWorldMissing => "rig or world missing",
            Self::LockMismatch => "lock mismatch",
            Self::End => "end",
            Self::Quit => "quit",
            Self::WorldChange => "world change",
            Self::Requested => "stopped",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("scene '{scene}' has no camera pose at tick 0")]
    NoStartPose { scene: String },
    #[error("world '{world}' for scene '{scene}' is not loaded")]
    WorldMissing { scene: String, world: String },
    #[error("camera rig could not be spawned for scene '{scene}'")]
    RigSpawnFailed { scene: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlaybackPhase {
    #[default]
    Idle,
    /// Set up and scheduled; the first tick has not run yet.
    Starting,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    NoSession,
    Continued,
    Stopped(StopReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopRecord {
    pub viewer: ViewerId,
    pub scene: String,
    pub tick: Tick,
    pub reason: StopReason,
}

#[derive(Debug)]
struct CutsceneSession {
    scene: Arc<Scene>,
    rig: EntityId,
    task: TaskHandle,
    restore_location: Option<Transform>,
    restore_mode: Option<GameMode>,
    tick: Tick,
    actors: ActorIds,
    phase: PlaybackPhase,
}

/// Read-only view of a live session.
#[derive(Debug, Clone, Copy)]
pub struct SessionView<'a> {
    pub scene: &'a Scene,
    pub rig: EntityId,
    pub task: TaskHandle,
    pub tick: Tick,
    pub actors: &'a ActorIds,
    pub phase: PlaybackPhase,
}

/// Owns every viewer's playback session and drives them one tick at a time.
/// All methods run on the host's tick thread; only the
/// [`LookInputSuppressor`] it hands out is used elsewhere.
pub struct CutsceneRuntime {
    config: CutsceneConfig,
    sessions: HashMap<ViewerId, CutsceneSession>,
    wanted_look: WantedLookHandle,
    correction_tx: Sender<LookCorrection>,
    correction_rx: Receiver<LookCorrection>,
    stop_history: VecDeque<StopRecord>,
}

impl CutsceneRuntime {
    pub fn new(config: CutsceneConfig) -> Self {
        let (correction_tx, correction_rx) = correction_channel();
        Self {
            config,
            sessions: HashMap::new(),
            wanted_look: WantedLookHandle::default(),
            correction_tx,
            correction_rx,
            stop_history: VecDeque::with_capacity(STOP_HISTORY_CAPACITY),
        }
    }

    pub fn config(&self) -> &CutsceneConfig {
        &self.config
    }

    pub fn suppressor(&self) -> LookInputSuppressor {
        LookInputSuppressor::new(self.wanted_look.clone(), self.correction_tx.clone())
    }

    pub fn wanted_look(&self) -> &WantedLookHandle {
        &self.wanted_look
    }

    pub fn phase(&self, viewer: ViewerId) -> PlaybackPhase {
        self.sessions
            .get(&viewer)
            .map_or(PlaybackPhase::Idle, |session| session.phase)
    }

    pub fn session(&self, viewer: ViewerId) -> Option<SessionView<'_>> {
        self.sessions.get(&viewer).map(|session| SessionView {
            scene: &session.scene,
            rig: session.rig,
            task: session.task,
            tick: session.tick,
            actors: &session.actors,
            phase: session.phase,
        })
    }

    pub fn active_viewers(&self) -> Vec<ViewerId> {
        let mut viewers: Vec<ViewerId> = self.sessions.keys().copied().collect();
        viewers.sort();
        viewers
    }

    pub fn recent_stops(&self) -> impl Iterator<Item = &StopRecord> {
        self.stop_history.iter()
    }

    /// The viewer whose session is driven by `handle`, if any.
    pub fn task_owner(&self, handle: TaskHandle) -> Option<ViewerId> {
        self.sessions
            .iter()
            .find(|(_, session)| session.task == handle)
            .map(|(viewer, _)| *viewer)
    }

    /// Puts `viewer` into `scene`. A session already running for the viewer
    /// is stopped first. On error nothing is left behind.
    pub fn start<H: CutsceneHost>(
        &mut self,
        host: &mut H,
        viewer: ViewerId,
        scene: Arc<Scene>,
    ) -> Result<(), StartError> {
        self.stop(host, viewer, StopReason::Restart);

        let start_pose =
            scene
                .camera
                .pose_at(0)
                .cloned()
                .ok_or_else(|| StartError::NoStartPose {
                    scene: scene.name.clone(),
                })?;
        if !host.world_exists(&start_pose.world) {
            return Err(StartError::WorldMissing {
                scene: scene.name.clone(),
                world: start_pose.world.clone(),
            });
        }
        let rig = playback::spawn_rig(host, &start_pose).ok_or_else(|| {
            StartError::RigSpawnFailed {
                scene: scene.name.clone(),
            }
        })?;

        let restore_location = host.viewer_location(viewer);
        let restore_mode = host.game_mode(viewer);
        host.set_game_mode(viewer, GameMode::Spectator);
        host.teleport(viewer, &start_pose);
        playback::lock(host, viewer, rig);
        host.apply_zoom(viewer, self.config.zoom_level);
        let actors = playback::spawn_actors(host, viewer, &scene.actors, &start_pose);
        let task = host.schedule_repeating(TICK_TASK_DELAY, TICK_TASK_PERIOD);
        self.wanted_look.set(viewer, start_pose.look());

        info!(
            viewer = viewer.0,
            scene = %scene.name,
            duration_ticks = scene.duration_ticks,
            rig = rig.0,
            actor_count = actors.len(),
            "cutscene_started"
        );
        self.sessions.insert(
            viewer,
            CutsceneSession {
                scene,
                rig,
                task,
                restore_location,
                restore_mode,
                tick: 0,
                actors,
                phase: PlaybackPhase::Starting,
            },
        );
        Ok(())
    }

    /// Dispatches a fired task handle. `None` when the handle is not one of
    /// this runtime's session tasks.
    pub fn run_task<H: CutsceneHost>(
        &mut self,
        host: &mut H,
        handle: TaskHandle,
    ) -> Option<TickOutcome> {
        let viewer = self.task_owner(handle)?;
        Some(self.tick(host, viewer))
    }

    pub fn tick<H: CutsceneHost>(&mut self, host: &mut H, viewer: ViewerId) -> TickOutcome {
        let advanced = {
            let Some(session) = self.sessions.get_mut(&viewer) else {
                return TickOutcome::NoSession;
            };
            advance_session(
                host,
                viewer,
                session,
                &self.wanted_look,
                self.config.debug,
            )
        };
        match advanced {
            Ok(()) => TickOutcome::Continued,
            Err(reason) => {
                self.stop(host, viewer, reason);
                TickOutcome::Stopped(reason)
            }
        }
    }

    /// The single teardown path. No-op without a session.
    pub fn stop<H: CutsceneHost>(
        &mut self,
        host: &mut H,
        viewer: ViewerId,
        reason: StopReason,
    ) -> bool {
        let Some(session) = self.sessions.remove(&viewer) else {
            return false;
        };

        host.cancel_task(session.task);
        host.set_camera_target(viewer, None);
        host.set_game_mode(viewer, session.restore_mode.unwrap_or_default());
        if let Some(location) = &session.restore_location {
            host.teleport(viewer, location);
        }
        host.clear_zoom(viewer);
        self.wanted_look.remove(viewer);
        let actors_removed = playback::teardown_actors(host, &session.actors);
        playback::destroy_rig(host, session.rig);

        info!(
            viewer = viewer.0,
            scene = %session.scene.name,
            tick = session.tick,
            reason = %reason,
            actors_removed,
            "cutscene_stopped"
        );
        if self.stop_history.len() == STOP_HISTORY_CAPACITY {
            self.stop_history.pop_front();
        }
        self.stop_history.push_back(StopRecord {
            viewer,
            scene: session.scene.name.clone(),
            tick: session.tick,
            reason,
        });
        true
    }

    pub fn stop_all<H: CutsceneHost>(&mut self, host: &mut H, reason: StopReason) -> usize {
        self.active_viewers()
            .into_iter()
            .filter(|viewer| self.stop(host, *viewer, reason))
            .count()
    }

    pub fn on_viewer_quit<H: CutsceneHost>(&mut self, host: &mut H, viewer: ViewerId) -> bool {
        self.stop(host, viewer, StopReason::Quit)
    }

    pub fn on_viewer_changed_world<H: CutsceneHost>(
        &mut self,
        host: &mut H,
        viewer: ViewerId,
    ) -> bool {
        self.stop(host, viewer, StopReason::WorldChange)
    }

    /// Hides every live proxy from a newly joined viewer. Returns the number
    /// of proxies hidden.
    pub fn on_viewer_join<H: CutsceneHost>(&mut self, host: &mut H, viewer: ViewerId) -> usize {
        let mut hidden = 0;
        for (owner, session) in &self.sessions {
            if *owner == viewer {
                continue;
            }
            playback::hide_actors_from(host, viewer, &session.actors);
            hidden += session.actors.len();
        }
        hidden
    }

    /// Re-applies the wanted look for every suppressed look packet received
    /// since the last call, keeping the viewer's position.
    pub fn apply_look_corrections<H: CutsceneHost>(&mut self, host: &mut H) -> usize {
        let mut applied = 0;
        while let Ok(correction) = self.correction_rx.try_recv() {
            let Some(look) = self.wanted_look.get(correction.viewer) else {
                continue;
            };
            let Some(location) = host.viewer_location(correction.viewer) else {
                continue;
            };
            if host.teleport(correction.viewer, &location.with_look(look)) {
                applied += 1;
            }
        }
        if applied > 0 && self.config.debug {
            debug!(applied, "look_corrections_applied");
        }
        applied
    }
}

fn advance_session<H: CutsceneHost>(
    host: &mut H,
    viewer: ViewerId,
    session: &mut CutsceneSession,
    wanted_look: &WantedLookHandle,
    debug_enabled: bool,
) -> Result<(), StopReason> {
    if !host.is_online(viewer) {
        return Err(StopReason::ViewerMissing);
    }
    session.phase = PlaybackPhase::Running;

    let pose = match session.scene.camera.pose_at(i64::from(session.tick)) {
        Some(pose) if host.world_exists(&pose.world) => pose,
        _ => return Err(StopReason::RigOrWorldMissing),
    };
    if !playback::move_rig(host, session.rig, pose) {
        return Err(StopReason::RigOrWorldMissing);
    }
    wanted_look.set(viewer, pose.look());
    host.teleport(viewer, pose);

    let moved = playback::advance_actors(host, &session.actors, &session.scene.actors, session.tick);

    match playback::enforce_lock(host, viewer, session.rig) {
        Ok(LockStatus::Held) => {}
        Ok(LockStatus::Repaired) => {
            debug!(viewer = viewer.0, rig = session.rig.0, "lock_repaired");
        }
        Err(error) => {
            warn!(viewer = viewer.0, error = %error, "lock_lost");
            return Err(StopReason::LockMismatch);
        }
    }

    if debug_enabled {
        debug!(
            viewer = viewer.0,
            scene = %session.scene.name,
            tick = session.tick,
            actors_moved = moved,
            "cutscene_tick"
        );
    }
    let finished = session.tick >= session.scene.duration_ticks;
    session.tick = session.tick.saturating_add(1);
    if finished {
        return Err(StopReason::End);
    }
    Ok(())
}
