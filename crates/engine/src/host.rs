//! Capability interfaces over the game platform. The runtime only ever talks
//! to the platform through these traits; identities are opaque handles with
//! identity-based equality.

use crate::model::Transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskHandle(pub u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum GameMode {
    #[default]
    Survival,
    Creative,
    Adventure,
    Spectator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RigTraits {
    pub collidable: bool,
    pub invulnerable: bool,
    pub visible: bool,
    pub marker: bool,
}

pub const CAMERA_RIG_TRAITS: RigTraits = RigTraits {
    collidable: false,
    invulnerable: true,
    visible: false,
    marker: true,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ActorAppearance {
    pub name: String,
    pub skin: Option<String>,
    pub scale: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    CameraRig(RigTraits),
    Actor(ActorAppearance),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    pub kind: EntityKind,
    pub pose: Transform,
}

pub trait WorldHost {
    fn world_exists(&self, world: &str) -> bool;
}

pub trait EntityHost {
    /// `None` when the pose's world cannot be resolved.
    fn spawn_entity(&mut self, request: SpawnRequest) -> Option<EntityId>;
    /// Resolves across every loaded world.
    fn entity_exists(&self, id: EntityId) -> bool;
    fn move_entity(&mut self, id: EntityId, pose: &Transform) -> bool;
    /// Returns false when the entity was already gone.
    fn destroy_entity(&mut self, id: EntityId) -> bool;
    fn set_entity_visible(&mut self, observer: ViewerId, id: EntityId, visible: bool);
}

pub trait ViewerHost {
    fn is_online(&self, viewer: ViewerId) -> bool;
    fn online_viewers(&self) -> Vec<ViewerId>;
    fn viewer_location(&self, viewer: ViewerId) -> Option<Transform>;
    fn game_mode(&self, viewer: ViewerId) -> Option<GameMode>;
    fn set_game_mode(&mut self, viewer: ViewerId, mode: GameMode);
    fn teleport(&mut self, viewer: ViewerId, pose: &Transform) -> bool;
    fn camera_target(&self, viewer: ViewerId) -> Option<EntityId>;
    fn set_camera_target(&mut self, viewer: ViewerId, target: Option<EntityId>);
    /// Zoom is rendered as a slowness-style effect with `level` as amplifier.
    fn apply_zoom(&mut self, viewer: ViewerId, level: u32);
    fn clear_zoom(&mut self, viewer: ViewerId);
    fn send_status(&mut self, viewer: ViewerId, message: &str);
}

pub trait TaskHost {
    /// First run happens after `delay_ticks` (at least one tick), then every
    /// `period_ticks`.
    fn schedule_repeating(&mut self, delay_ticks: u32, period_ticks: u32) -> TaskHandle;
    fn cancel_task(&mut self, handle: TaskHandle) -> bool;
}

pub trait CutsceneHost: WorldHost + EntityHost + ViewerHost + TaskHost {}

impl<T: WorldHost + EntityHost + ViewerHost + TaskHost> CutsceneHost for T {}
