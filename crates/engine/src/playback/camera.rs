use thiserror::Error;
use tracing::debug;

use crate::host::{
    EntityHost, EntityId, EntityKind, SpawnRequest, ViewerHost, ViewerId, WorldHost,
    CAMERA_RIG_TRAITS,
};
use crate::model::Transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Held,
    Repaired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("camera rig {0:?} no longer exists")]
    RigLost(EntityId),
    #[error("viewer {viewer:?} refused camera rig {rig:?}")]
    RebindRejected { viewer: ViewerId, rig: EntityId },
}

/// Spawns the invisible anchor the viewer's camera rides on.
pub fn spawn_rig<H: WorldHost + EntityHost>(host: &mut H, pose: &Transform) -> Option<EntityId> {
    if !host.world_exists(&pose.world) {
        debug!(world = %pose.world, "rig_world_missing");
        return None;
    }
    host.spawn_entity(SpawnRequest {
        kind: EntityKind::CameraRig(CAMERA_RIG_TRAITS),
        pose: pose.clone(),
    })
}

pub fn move_rig<H: EntityHost>(host: &mut H, rig: EntityId, pose: &Transform) -> bool {
    host.entity_exists(rig) && host.move_entity(rig, pose)
}

pub fn lock<H: ViewerHost>(host: &mut H, viewer: ViewerId, rig: EntityId) {
    host.set_camera_target(viewer, Some(rig));
}

/// Checks the viewer is still riding `rig` and re-binds when the host dropped
/// or swapped the target between ticks. A vanished rig is an error, and so is
/// a host that refuses the re-bind (e.g. the viewer left spectator mode): a
/// viewer that cannot be re-attached would otherwise play on with a free
/// camera. During a session tick the rig was just moved, so a missing rig
/// already stops playback as "rig or world missing" and only the refusal
/// surfaces here.
pub fn enforce_lock<H: ViewerHost + EntityHost>(
    host: &mut H,
    viewer: ViewerId,
    rig: EntityId,
) -> Result<LockStatus, LockError> {
    if host.camera_target(viewer) == Some(rig) {
        return Ok(LockStatus::Held);
    }
    if !host.entity_exists(rig) {
        return Err(LockError::RigLost(rig));
    }
    lock(host, viewer, rig);
    if host.camera_target(viewer) != Some(rig) {
        return Err(LockError::RebindRejected { viewer, rig });
    }
    Ok(LockStatus::Repaired)
}

pub fn destroy_rig<H: EntityHost>(host: &mut H, rig: EntityId) {
    if !host.destroy_entity(rig) {
        debug!(rig = rig.0, "rig_already_removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::GameMode;
    use crate::sim::SimHost;

    const VIEWER: ViewerId = ViewerId(1);

    fn host_with_viewer() -> SimHost {
        let mut host = SimHost::new();
        host.add_world("world");
        host.join_viewer(VIEWER, Transform::new("world", 0.0, 64.0, 0.0, 0.0, 0.0));
        host.set_game_mode(VIEWER, GameMode::Spectator);
        host
    }

    fn pose() -> Transform {
        Transform::new("world", 4.0, 70.0, -2.0, 45.0, 15.0)
    }

    #[test]
    fn spawn_rig_creates_invisible_marker_anchor() {
        let mut host = host_with_viewer();
        let rig = spawn_rig(&mut host, &pose()).expect("rig");
        let entity = host.entity(rig).expect("rig entity");
        assert_eq!(entity.kind, EntityKind::CameraRig(CAMERA_RIG_TRAITS));
        assert_eq!(entity.pose, pose());
    }

    #[test]
    fn spawn_rig_fails_for_unknown_world() {
        let mut host = host_with_viewer();
        let mut nether = pose();
        nether.world = "nether".to_string();
        assert!(spawn_rig(&mut host, &nether).is_none());
        assert_eq!(host.entity_count(), 0);
    }

    #[test]
    fn enforce_lock_holds_when_target_matches() {
        let mut host = host_with_viewer();
        let rig = spawn_rig(&mut host, &pose()).expect("rig");
        lock(&mut host, VIEWER, rig);
        assert_eq!(enforce_lock(&mut host, VIEWER, rig), Ok(LockStatus::Held));
    }

    #[test]
    fn enforce_lock_rebinds_cleared_target() {
        let mut host = host_with_viewer();
        let rig = spawn_rig(&mut host, &pose()).expect("rig");
        lock(&mut host, VIEWER, rig);
        host.set_camera_target(VIEWER, None);

        assert_eq!(enforce_lock(&mut host, VIEWER, rig), Ok(LockStatus::Repaired));
        assert_eq!(host.camera_target(VIEWER), Some(rig));
    }

    #[test]
    fn enforce_lock_rebinds_foreign_target() {
        let mut host = host_with_viewer();
        let rig = spawn_rig(&mut host, &pose()).expect("rig");
        let other = spawn_rig(&mut host, &pose()).expect("other");
        lock(&mut host, VIEWER, other);

        assert_eq!(enforce_lock(&mut host, VIEWER, rig), Ok(LockStatus::Repaired));
        assert_eq!(host.camera_target(VIEWER), Some(rig));
    }

    #[test]
    fn enforce_lock_fails_when_rig_is_gone() {
        let mut host = host_with_viewer();
        let rig = spawn_rig(&mut host, &pose()).expect("rig");
        lock(&mut host, VIEWER, rig);
        host.destroy_entity(rig);

        assert_eq!(
            enforce_lock(&mut host, VIEWER, rig),
            Err(LockError::RigLost(rig))
        );
    }

    #[test]
    fn enforce_lock_fails_when_host_refuses_rebind() {
        let mut host = host_with_viewer();
        let rig = spawn_rig(&mut host, &pose()).expect("rig");
        lock(&mut host, VIEWER, rig);
        host.set_game_mode(VIEWER, GameMode::Survival);

        assert_eq!(
            enforce_lock(&mut host, VIEWER, rig),
            Err(LockError::RebindRejected { viewer: VIEWER, rig })
        );
    }

    #[test]
    fn move_rig_reports_missing_rig() {
        let mut host = host_with_viewer();
        let rig = spawn_rig(&mut host, &pose()).expect("rig");
        assert!(move_rig(&mut host, rig, &pose()));
        destroy_rig(&mut host, rig);
        assert!(!move_rig(&mut host, rig, &pose()));
        destroy_rig(&mut host, rig);
    }
}
