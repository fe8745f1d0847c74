mod actors;
mod camera;

pub use actors::{advance_actors, hide_actors_from, spawn_actors, teardown_actors, ActorIds};
pub use camera::{destroy_rig, enforce_lock, lock, move_rig, spawn_rig, LockError, LockStatus};
