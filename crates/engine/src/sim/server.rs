use std::sync::Arc;

use crate::host::{TaskHandle, ViewerId};
use crate::look::LookInputSuppressor;
use crate::model::{Scene, Transform};
use crate::recorder::{FinishedRecording, Recorder, RecorderEvent, RecordingRequest};
use crate::runtime::{CutsceneRuntime, StartError, StopReason, TickOutcome};
use crate::{CutsceneConfig, ViewerHost};

use super::host::SimHost;

#[derive(Debug, Default, PartialEq)]
pub struct StepReport {
    pub tick: u64,
    pub corrections_applied: usize,
    pub tasks_run: usize,
    pub stopped: Vec<(ViewerId, StopReason)>,
    pub finished: Vec<FinishedRecording>,
}

/// One simulated server: platform, playback runtime and recorder wired to a
/// single tick thread. Each `step` is one host tick: marshalled look
/// corrections first, then every task due on that tick.
pub struct SimServer {
    pub host: SimHost,
    pub runtime: CutsceneRuntime,
    pub recorder: Recorder,
}

impl SimServer {
    pub fn new(config: CutsceneConfig) -> Self {
        let recorder = Recorder::new(&config);
        Self {
            host: SimHost::new(),
            runtime: CutsceneRuntime::new(config),
            recorder,
        }
    }

    pub fn suppressor(&self) -> LookInputSuppressor {
        self.runtime.suppressor()
    }

    pub fn play(&mut self, viewer: ViewerId, scene: Arc<Scene>) -> Result<(), StartError> {
        self.runtime.start(&mut self.host, viewer, scene)
    }

    pub fn record(&mut self, viewer: ViewerId, request: RecordingRequest) -> TaskHandle {
        self.recorder.start_recording(&mut self.host, viewer, request)
    }

    /// Returns how many live proxies were hidden from the newcomer.
    pub fn join_viewer(&mut self, viewer: ViewerId, location: Transform) -> usize {
        self.host.join_viewer(viewer, location);
        self.runtime.on_viewer_join(&mut self.host, viewer)
    }

    /// Quit is delivered while the viewer is still online, so the session
    /// teardown can still move them back.
    pub fn quit_viewer(&mut self, viewer: ViewerId) {
        self.runtime.on_viewer_quit(&mut self.host, viewer);
        self.recorder.on_viewer_quit(&mut self.host, viewer);
        self.host.set_offline(viewer);
    }

    pub fn change_world(&mut self, viewer: ViewerId, destination: &Transform) -> bool {
        self.runtime.on_viewer_changed_world(&mut self.host, viewer);
        self.host.teleport(viewer, destination)
    }

    pub fn is_idle(&self) -> bool {
        self.runtime.active_viewers().is_empty() && self.recorder.active_count() == 0
    }

    pub fn step(&mut self) -> StepReport {
        let corrections_applied = self.runtime.apply_look_corrections(&mut self.host);
        let due = self.host.advance_clock();
        let mut report = StepReport {
            tick: self.host.now(),
            corrections_applied,
            ..StepReport::default()
        };

        for handle in due {
            // An earlier task this tick may have cancelled this one.
            if !self.host.is_task_scheduled(handle) {
                continue;
            }
            report.tasks_run += 1;
            if let Some(viewer) = self.runtime.task_owner(handle) {
                if let TickOutcome::Stopped(reason) = self.runtime.tick(&mut self.host, viewer) {
                    report.stopped.push((viewer, reason));
                }
                continue;
            }
            if let Some(RecorderEvent::Completed(finished)) =
                self.recorder.run_task(&mut self.host, handle)
            {
                report.finished.push(finished);
            }
        }
        report
    }

    /// Steps until nothing is playing or recording, or `max_ticks` elapse.
    pub fn run_until_idle(&mut self, max_ticks: u64) -> Vec<StepReport> {
        let mut reports = Vec::new();
        for _ in 0..max_ticks {
            if self.is_idle() {
                break;
            }
            reports.push(self.step());
        }
        reports
    }

    /// Cancels every recording and stops every session. Returns the number
    /// of sessions stopped.
    pub fn shutdown(&mut self) -> usize {
        self.recorder.stop_all(&mut self.host);
        self.runtime.stop_all(&mut self.host, StopReason::Shutdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{EntityHost, GameMode};
    use crate::look::LookPacket;
    use crate::model::{ActorTemplate, Look, RecordTarget};

    const VIEWER: ViewerId = ViewerId(10);
    const LATECOMER: ViewerId = ViewerId(11);

    fn pose(x: f64, yaw: f32) -> Transform {
        Transform::new("world", x, 70.0, 0.0, yaw, 5.0)
    }

    fn server() -> SimServer {
        let mut server = SimServer::new(CutsceneConfig::default());
        server.host.add_world("world");
        server.host.add_world("nether");
        server.join_viewer(VIEWER, pose(-10.0, 0.0));
        server
    }

    fn scene(duration_ticks: u32) -> Arc<Scene> {
        let mut scene = Scene::new("tour", duration_ticks);
        scene.camera = (0..=duration_ticks)
            .step_by(5)
            .map(|tick| (tick, pose(f64::from(tick), tick as f32)))
            .collect();
        let mut guide = ActorTemplate::new("guide");
        guide.timeline.insert(0, pose(2.0, 0.0));
        scene.actors.insert("guide".to_string(), guide);
        Arc::new(scene)
    }

    #[test]
    fn scheduled_playback_runs_to_completion() {
        let mut server = server();
        server.play(VIEWER, scene(30)).expect("play");

        let reports = server.run_until_idle(1_000);

        assert_eq!(reports.len(), 31);
        assert_eq!(
            reports.last().expect("last").stopped,
            vec![(VIEWER, StopReason::End)]
        );
        assert!(server.is_idle());
        assert_eq!(server.host.entity_count(), 0);
        assert_eq!(server.host.scheduled_task_count(), 0);
        let viewer = server.host.viewer(VIEWER).expect("viewer");
        assert_eq!(viewer.game_mode, GameMode::Survival);
        assert_eq!(viewer.location, pose(-10.0, 0.0));
    }

    #[test]
    fn tick_enforcement_wins_over_queued_correction() {
        let mut server = server();
        let mut sweep = Scene::new("sweep", 30);
        sweep.camera = (0..=30).map(|tick| (tick, pose(0.0, tick as f32))).collect();
        server.play(VIEWER, Arc::new(sweep)).expect("play");
        for _ in 0..6 {
            server.step();
        }
        let mut packet = LookPacket::new(VIEWER, Look { yaw: 123.0, pitch: 0.0 });
        server.suppressor().on_look_packet(&mut packet);
        assert!(packet.is_cancelled());

        let report = server.step();

        // Correction re-applies tick 5's look first, then tick 6 overrides it.
        assert_eq!(report.corrections_applied, 1);
        let viewer = server.host.viewer(VIEWER).expect("viewer");
        assert_eq!(viewer.location.look(), Look { yaw: 6.0, pitch: 5.0 });
        assert_eq!(
            server.runtime.wanted_look().get(VIEWER),
            Some(viewer.location.look())
        );
    }

    #[test]
    fn look_packets_pass_through_once_playback_ends() {
        let mut server = server();
        server.play(VIEWER, scene(10)).expect("play");
        server.run_until_idle(100);

        let mut packet = LookPacket::new(VIEWER, Look { yaw: 1.0, pitch: 1.0 });
        server.suppressor().on_look_packet(&mut packet);

        assert!(!packet.is_cancelled());
    }

    #[test]
    fn quit_mid_scene_releases_everything() {
        let mut server = server();
        server.play(VIEWER, scene(100)).expect("play");
        server.step();

        server.quit_viewer(VIEWER);

        assert!(server.is_idle());
        assert_eq!(server.host.entity_count(), 0);
        assert_eq!(server.step().tasks_run, 0);
        let viewer = server.host.viewer(VIEWER).expect("viewer");
        assert!(!viewer.online);
        assert_eq!(viewer.location, pose(-10.0, 0.0));
        assert_eq!(viewer.game_mode, GameMode::Survival);
    }

    #[test]
    fn world_change_mid_scene_stops_playback() {
        let mut server = server();
        server.play(VIEWER, scene(100)).expect("play");
        server.step();

        let destination = Transform::new("nether", 0.0, 0.0, 0.0, 0.0, 0.0);
        assert!(server.change_world(VIEWER, &destination));

        let last = server.runtime.recent_stops().last().expect("stop");
        assert_eq!(last.reason, StopReason::WorldChange);
        assert_eq!(server.host.entity_count(), 0);
    }

    #[test]
    fn latecomer_does_not_see_running_proxies() {
        let mut server = server();
        server.play(VIEWER, scene(100)).expect("play");
        server.step();

        assert_eq!(server.join_viewer(LATECOMER, pose(0.0, 0.0)), 1);

        let guide = server.runtime.session(VIEWER).expect("session").actors["guide"];
        assert!(server.host.entity_exists(guide));
        assert!(!server.host.is_visible_to(LATECOMER, guide));
    }

    #[test]
    fn recording_feeds_back_into_a_playable_scene() {
        let mut server = server();
        server.record(
            VIEWER,
            RecordingRequest {
                target: RecordTarget::Camera,
                duration_ticks: 20,
            },
        );

        let finished: Vec<FinishedRecording> = server
            .run_until_idle(500)
            .into_iter()
            .flat_map(|report| report.finished)
            .collect();
        assert_eq!(finished.len(), 1);

        let mut recorded = Scene::new("recorded", 0);
        let take = finished.into_iter().next().expect("take");
        recorded.replace_timeline(&take.target, take.timeline);
        assert_eq!(recorded.duration_ticks, 19);
        server.play(VIEWER, Arc::new(recorded)).expect("play recorded");
        let reports = server.run_until_idle(100);
        assert_eq!(reports.len(), 20);
    }

    #[test]
    fn shutdown_stops_sessions_and_recordings() {
        let mut server = server();
        server.join_viewer(LATECOMER, pose(0.0, 0.0));
        server.play(VIEWER, scene(100)).expect("play");
        server.record(
            LATECOMER,
            RecordingRequest {
                target: RecordTarget::Actor("double".to_string()),
                duration_ticks: 10,
            },
        );

        assert_eq!(server.shutdown(), 1);
        assert!(server.is_idle());
        assert_eq!(server.host.scheduled_task_count(), 0);
    }

    #[test]
    fn shutdown_cancels_recordings_of_vanished_viewers() {
        let mut server = server();
        server.record(
            VIEWER,
            RecordingRequest {
                target: RecordTarget::Camera,
                duration_ticks: 10,
            },
        );
        server.host.set_offline(VIEWER);

        server.shutdown();

        assert!(!server.recorder.is_recording(VIEWER));
        assert_eq!(server.host.scheduled_task_count(), 0);
    }
}
