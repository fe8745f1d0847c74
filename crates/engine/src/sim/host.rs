use std::collections::{BTreeMap, HashMap, HashSet};

use crate::host::{
    EntityHost, EntityId, EntityKind, GameMode, SpawnRequest, TaskHandle, TaskHost, ViewerHost,
    ViewerId, WorldHost,
};
use crate::model::Transform;

use super::scheduler::TickScheduler;

#[derive(Debug, Default)]
pub struct EntityIdAllocator {
    next: u64,
}

impl EntityIdAllocator {
    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimViewer {
    pub online: bool,
    pub location: Transform,
    pub game_mode: GameMode,
    /// Hosts may not report a mode for a viewer (e.g. mid-login).
    pub game_mode_known: bool,
    pub camera_target: Option<EntityId>,
    pub zoom_level: Option<u32>,
    pub status_messages: Vec<String>,
    pub teleport_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimEntity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub pose: Transform,
    hidden_from: HashSet<ViewerId>,
}

/// Deterministic in-memory platform: loaded worlds, viewers, entities with
/// per-observer visibility and a tick scheduler.
#[derive(Debug, Default)]
pub struct SimHost {
    worlds: HashSet<String>,
    viewers: BTreeMap<ViewerId, SimViewer>,
    entities: BTreeMap<EntityId, SimEntity>,
    allocator: EntityIdAllocator,
    move_counts: HashMap<EntityId, u32>,
    scheduler: TickScheduler,
}

impl SimHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_world(&mut self, name: impl Into<String>) {
        self.worlds.insert(name.into());
    }

    pub fn remove_world(&mut self, name: &str) -> bool {
        self.worlds.remove(name)
    }

    /// Brings a viewer online in survival at `location`.
    pub fn join_viewer(&mut self, viewer: ViewerId, location: Transform) {
        self.viewers.insert(
            viewer,
            SimViewer {
                online: true,
                location,
                game_mode: GameMode::Survival,
                game_mode_known: true,
                camera_target: None,
                zoom_level: None,
                status_messages: Vec::new(),
                teleport_count: 0,
            },
        );
    }

    pub fn set_offline(&mut self, viewer: ViewerId) {
        if let Some(state) = self.viewers.get_mut(&viewer) {
            state.online = false;
            state.camera_target = None;
        }
    }

    pub fn forget_game_mode(&mut self, viewer: ViewerId) {
        if let Some(state) = self.viewers.get_mut(&viewer) {
            state.game_mode_known = false;
        }
    }

    pub fn viewer(&self, viewer: ViewerId) -> Option<&SimViewer> {
        self.viewers.get(&viewer)
    }

    pub fn entity(&self, id: EntityId) -> Option<&SimEntity> {
        self.entities.get(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &SimEntity> {
        self.entities.values()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn is_visible_to(&self, observer: ViewerId, id: EntityId) -> bool {
        self.entities
            .get(&id)
            .is_some_and(|entity| !entity.hidden_from.contains(&observer))
    }

    /// Moves applied to `id`, including ones made before it was destroyed.
    pub fn move_count(&self, id: EntityId) -> u32 {
        self.move_counts.get(&id).copied().unwrap_or(0)
    }

    pub fn now(&self) -> u64 {
        self.scheduler.now()
    }

    pub fn advance_clock(&mut self) -> Vec<TaskHandle> {
        self.scheduler.advance()
    }

    pub fn is_task_scheduled(&self, handle: TaskHandle) -> bool {
        self.scheduler.is_scheduled(handle)
    }

    pub fn scheduled_task_count(&self) -> usize {
        self.scheduler.len()
    }

    fn online_viewer_mut(&mut self, viewer: ViewerId) -> Option<&mut SimViewer> {
        self.viewers.get_mut(&viewer).filter(|state| state.online)
    }
}

impl WorldHost for SimHost {
    fn world_exists(&self, world: &str) -> bool {
        self.worlds.contains(world)
    }
}

impl EntityHost for SimHost {
    fn spawn_entity(&mut self, request: SpawnRequest) -> Option<EntityId> {
        if !self.world_exists(&request.pose.world) {
            return None;
        }
        let id = self.allocator.allocate();
        self.entities.insert(
            id,
            SimEntity {
                id,
                kind: request.kind,
                pose: request.pose,
                hidden_from: HashSet::new(),
            },
        );
        Some(id)
    }

    fn entity_exists(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    fn move_entity(&mut self, id: EntityId, pose: &Transform) -> bool {
        if !self.worlds.contains(&pose.world) {
            return false;
        }
        let Some(entity) = self.entities.get_mut(&id) else {
            return false;
        };
        entity.pose = pose.clone();
        *self.move_counts.entry(id).or_insert(0) += 1;
        true
    }

    fn destroy_entity(&mut self, id: EntityId) -> bool {
        let removed = self.entities.remove(&id).is_some();
        if removed {
            for state in self.viewers.values_mut() {
                if state.camera_target == Some(id) {
                    state.camera_target = None;
                }
            }
        }
        removed
    }

    fn set_entity_visible(&mut self, observer: ViewerId, id: EntityId, visible: bool) {
        if let Some(entity) = self.entities.get_mut(&id) {
            if visible {
                entity.hidden_from.remove(&observer);
            } else {
                entity.hidden_from.insert(observer);
            }
        }
    }
}

impl ViewerHost for SimHost {
    fn is_online(&self, viewer: ViewerId) -> bool {
        self.viewers.get(&viewer).is_some_and(|state| state.online)
    }

    fn online_viewers(&self) -> Vec<ViewerId> {
        self.viewers
            .iter()
            .filter(|(_, state)| state.online)
            .map(|(viewer, _)| *viewer)
            .collect()
    }

    fn viewer_location(&self, viewer: ViewerId) -> Option<Transform> {
        self.viewers
            .get(&viewer)
            .filter(|state| state.online)
            .map(|state| state.location.clone())
    }

    fn game_mode(&self, viewer: ViewerId) -> Option<GameMode> {
        self.viewers
            .get(&viewer)
            .filter(|state| state.game_mode_known)
            .map(|state| state.game_mode)
    }

    fn set_game_mode(&mut self, viewer: ViewerId, mode: GameMode) {
        if let Some(state) = self.viewers.get_mut(&viewer) {
            state.game_mode = mode;
            state.game_mode_known = true;
            if mode != GameMode::Spectator {
                state.camera_target = None;
            }
        }
    }

    fn teleport(&mut self, viewer: ViewerId, pose: &Transform) -> bool {
        if !self.worlds.contains(&pose.world) {
            return false;
        }
        let Some(state) = self.online_viewer_mut(viewer) else {
            return false;
        };
        state.location = pose.clone();
        state.teleport_count += 1;
        true
    }

    fn camera_target(&self, viewer: ViewerId) -> Option<EntityId> {
        self.viewers.get(&viewer).and_then(|state| state.camera_target)
    }

    /// Binding only sticks for spectators and live entities; clearing always
    /// works.
    fn set_camera_target(&mut self, viewer: ViewerId, target: Option<EntityId>) {
        let target_alive = target.map_or(true, |id| self.entities.contains_key(&id));
        let Some(state) = self.viewers.get_mut(&viewer) else {
            return;
        };
        match target {
            None => state.camera_target = None,
            Some(id) if target_alive && state.game_mode == GameMode::Spectator => {
                state.camera_target = Some(id);
            }
            Some(_) => {}
        }
    }

    fn apply_zoom(&mut self, viewer: ViewerId, level: u32) {
        if let Some(state) = self.online_viewer_mut(viewer) {
            state.zoom_level = Some(level);
        }
    }

    fn clear_zoom(&mut self, viewer: ViewerId) {
        if let Some(state) = self.viewers.get_mut(&viewer) {
            state.zoom_level = None;
        }
    }

    fn send_status(&mut self, viewer: ViewerId, message: &str) {
        if let Some(state) = self.online_viewer_mut(viewer) {
            state.status_messages.push(message.to_string());
        }
    }
}

impl TaskHost for SimHost {
    fn schedule_repeating(&mut self, delay_ticks: u32, period_ticks: u32) -> TaskHandle {
        self.scheduler.schedule_repeating(delay_ticks, period_ticks)
    }

    fn cancel_task(&mut self, handle: TaskHandle) -> bool {
        self.scheduler.cancel(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::CAMERA_RIG_TRAITS;

    const VIEWER: ViewerId = ViewerId(1);

    fn pose(world: &str) -> Transform {
        Transform::new(world, 1.0, 2.0, 3.0, 0.0, 0.0)
    }

    fn rig_request(world: &str) -> SpawnRequest {
        SpawnRequest {
            kind: EntityKind::CameraRig(CAMERA_RIG_TRAITS),
            pose: pose(world),
        }
    }

    #[test]
    fn allocator_never_reuses_ids() {
        let mut host = SimHost::new();
        host.add_world("world");
        let first = host.spawn_entity(rig_request("world")).expect("first");
        assert!(host.destroy_entity(first));
        let second = host.spawn_entity(rig_request("world")).expect("second");
        assert_ne!(first, second);
    }

    #[test]
    fn duplicate_destroy_is_safe() {
        let mut host = SimHost::new();
        host.add_world("world");
        let id = host.spawn_entity(rig_request("world")).expect("rig");
        assert!(host.destroy_entity(id));
        assert!(!host.destroy_entity(id));
        assert_eq!(host.entity_count(), 0);
    }

    #[test]
    fn spawn_and_teleport_require_loaded_world() {
        let mut host = SimHost::new();
        host.add_world("world");
        host.join_viewer(VIEWER, pose("world"));

        assert!(host.spawn_entity(rig_request("nether")).is_none());
        assert!(!host.teleport(VIEWER, &pose("nether")));
        assert!(host.teleport(VIEWER, &pose("world")));
    }

    #[test]
    fn camera_target_only_binds_spectators() {
        let mut host = SimHost::new();
        host.add_world("world");
        host.join_viewer(VIEWER, pose("world"));
        let rig = host.spawn_entity(rig_request("world")).expect("rig");

        host.set_camera_target(VIEWER, Some(rig));
        assert_eq!(host.camera_target(VIEWER), None);

        host.set_game_mode(VIEWER, GameMode::Spectator);
        host.set_camera_target(VIEWER, Some(rig));
        assert_eq!(host.camera_target(VIEWER), Some(rig));

        host.destroy_entity(rig);
        assert_eq!(host.camera_target(VIEWER), None);
    }

    #[test]
    fn offline_viewers_report_no_location() {
        let mut host = SimHost::new();
        host.add_world("world");
        host.join_viewer(VIEWER, pose("world"));
        host.set_offline(VIEWER);

        assert!(!host.is_online(VIEWER));
        assert!(host.viewer_location(VIEWER).is_none());
        assert!(host.online_viewers().is_empty());
    }
}
