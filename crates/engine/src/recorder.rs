use std::collections::HashMap;

use tracing::{debug, info};

use crate::host::{TaskHandle, TaskHost, ViewerHost, ViewerId};
use crate::model::{RecordTarget, Tick, Timeline};
use crate::CutsceneConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingRequest {
    pub target: RecordTarget,
    pub duration_ticks: Tick,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinishedRecording {
    pub viewer: ViewerId,
    pub target: RecordTarget,
    pub timeline: Timeline,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecorderPhase {
    #[default]
    Idle,
    /// Seconds left before capture begins.
    Countdown(u32),
    /// Next tick to be captured.
    Capturing(Tick),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecorderEvent {
    Countdown(u32),
    Started,
    Captured(Tick),
    Completed(FinishedRecording),
    Cancelled,
}

#[derive(Debug)]
struct RecordingTask {
    handle: TaskHandle,
    request: RecordingRequest,
    phase: RecorderPhase,
    timeline: Timeline,
}

/// Captures a viewer's live pose once per tick after a short countdown.
/// At most one recording runs per viewer.
#[derive(Debug)]
pub struct Recorder {
    ticks_per_second: u32,
    countdown_seconds: u32,
    tasks: HashMap<ViewerId, RecordingTask>,
}

impl Recorder {
    pub fn new(config: &CutsceneConfig) -> Self {
        Self {
            ticks_per_second: config.ticks_per_second.max(1),
            countdown_seconds: config.countdown_seconds,
            tasks: HashMap::new(),
        }
    }

    pub fn phase(&self, viewer: ViewerId) -> RecorderPhase {
        self.tasks
            .get(&viewer)
            .map_or(RecorderPhase::Idle, |task| task.phase)
    }

    pub fn is_recording(&self, viewer: ViewerId) -> bool {
        self.tasks.contains_key(&viewer)
    }

    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    /// Replaces any recording already running for `viewer`.
    pub fn start_recording<H: TaskHost + ViewerHost>(
        &mut self,
        host: &mut H,
        viewer: ViewerId,
        request: RecordingRequest,
    ) -> TaskHandle {
        self.stop_recording(host, viewer);
        let handle = host.schedule_repeating(0, self.ticks_per_second);
        info!(
            viewer = viewer.0,
            target = ?request.target,
            duration_ticks = request.duration_ticks,
            "recording_scheduled"
        );
        self.tasks.insert(
            viewer,
            RecordingTask {
                handle,
                request,
                phase: RecorderPhase::Countdown(self.countdown_seconds),
                timeline: Timeline::new(),
            },
        );
        handle
    }

    /// Idempotent; safe without an active recording.
    pub fn stop_recording<H: TaskHost>(&mut self, host: &mut H, viewer: ViewerId) -> bool {
        let Some(task) = self.tasks.remove(&viewer) else {
            return false;
        };
        host.cancel_task(task.handle);
        debug!(viewer = viewer.0, phase = ?task.phase, "recording_stopped");
        true
    }

    /// Cancels every recording, online viewer or not. Returns how many were
    /// running.
    pub fn stop_all<H: TaskHost>(&mut self, host: &mut H) -> usize {
        let viewers: Vec<ViewerId> = self.tasks.keys().copied().collect();
        viewers
            .into_iter()
            .filter(|viewer| self.stop_recording(host, *viewer))
            .count()
    }

    pub fn on_viewer_quit<H: TaskHost>(&mut self, host: &mut H, viewer: ViewerId) -> bool {
        self.stop_recording(host, viewer)
    }

    /// Dispatches a fired task handle. `None` when the handle is not one of
    /// this recorder's tasks.
    pub fn run_task<H: TaskHost + ViewerHost>(
        &mut self,
        host: &mut H,
        handle: TaskHandle,
    ) -> Option<RecorderEvent> {
        let viewer = self
            .tasks
            .iter()
            .find(|(_, task)| task.handle == handle)
            .map(|(viewer, _)| *viewer)?;

        if !host.is_online(viewer) {
            self.stop_recording(host, viewer);
            info!(viewer = viewer.0, "recording_cancelled_viewer_offline");
            return Some(RecorderEvent::Cancelled);
        }

        let phase = self.tasks.get(&viewer)?.phase;
        let event = match phase {
            RecorderPhase::Idle => return None,
            RecorderPhase::Countdown(remaining) if remaining > 0 => {
                host.send_status(viewer, &format!("Recording in {remaining}..."));
                self.set_phase(viewer, RecorderPhase::Countdown(remaining - 1));
                RecorderEvent::Countdown(remaining)
            }
            RecorderPhase::Countdown(_) => {
                host.cancel_task(handle);
                let capture = host.schedule_repeating(0, 1);
                if let Some(task) = self.tasks.get_mut(&viewer) {
                    task.handle = capture;
                    task.phase = RecorderPhase::Capturing(0);
                    task.timeline.clear();
                }
                host.send_status(viewer, "Recording...");
                RecorderEvent::Started
            }
            RecorderPhase::Capturing(tick) => self.capture(host, viewer, tick),
        };
        Some(event)
    }

    fn capture<H: TaskHost + ViewerHost>(
        &mut self,
        host: &mut H,
        viewer: ViewerId,
        tick: Tick,
    ) -> RecorderEvent {
        let Some(task) = self.tasks.get_mut(&viewer) else {
            return RecorderEvent::Cancelled;
        };
        let duration = task.request.duration_ticks;
        if tick < duration {
            let Some(location) = host.viewer_location(viewer) else {
                self.stop_recording(host, viewer);
                return RecorderEvent::Cancelled;
            };
            task.timeline.insert(tick, location);
            task.phase = RecorderPhase::Capturing(tick + 1);
            host.send_status(viewer, &format!("Recording {}/{}", tick + 1, duration));
            if tick + 1 < duration {
                return RecorderEvent::Captured(tick);
            }
        }
        self.finish(host, viewer)
    }

    fn finish<H: TaskHost + ViewerHost>(&mut self, host: &mut H, viewer: ViewerId) -> RecorderEvent {
        let Some(task) = self.tasks.remove(&viewer) else {
            return RecorderEvent::Cancelled;
        };
        host.cancel_task(task.handle);
        let frames = task.timeline.len();
        host.send_status(viewer, &format!("Recording complete ({frames} ticks)"));
        info!(
            viewer = viewer.0,
            target = ?task.request.target,
            frames,
            "recording_completed"
        );
        RecorderEvent::Completed(FinishedRecording {
            viewer,
            target: task.request.target,
            timeline: task.timeline,
        })
    }

    fn set_phase(&mut self, viewer: ViewerId, phase: RecorderPhase) {
        if let Some(task) = self.tasks.get_mut(&viewer) {
            task.phase = phase;
        }
    }
}
