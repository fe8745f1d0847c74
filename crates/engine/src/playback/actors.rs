use std::collections::BTreeMap;

use tracing::debug;

use crate::host::{
    ActorAppearance, EntityHost, EntityId, EntityKind, SpawnRequest, ViewerHost, ViewerId,
    WorldHost,
};
use crate::model::{ActorTemplate, Tick, Transform};

/// Template id -> spawned proxy.
pub type ActorIds = BTreeMap<String, EntityId>;

/// Spawns one proxy per template at its earliest keyframe, or at `fallback`
/// when the template has none. Proxies are shown only to `viewer`.
pub fn spawn_actors<H>(
    host: &mut H,
    viewer: ViewerId,
    templates: &BTreeMap<String, ActorTemplate>,
    fallback: &Transform,
) -> ActorIds
where
    H: WorldHost + EntityHost + ViewerHost,
{
    let observers: Vec<ViewerId> = host
        .online_viewers()
        .into_iter()
        .filter(|observer| *observer != viewer)
        .collect();
    let mut ids = ActorIds::new();

    for (actor_id, template) in templates {
        let pose = template
            .timeline
            .first()
            .map_or(fallback, |(_, pose)| pose);
        if !host.world_exists(&pose.world) {
            debug!(actor = %actor_id, world = %pose.world, "actor_world_missing");
            continue;
        }
        let request = SpawnRequest {
            kind: EntityKind::Actor(ActorAppearance {
                name: template.id.clone(),
                skin: template.skin.clone(),
                scale: template.scale,
            }),
            pose: pose.clone(),
        };
        let Some(entity) = host.spawn_entity(request) else {
            debug!(actor = %actor_id, "actor_spawn_failed");
            continue;
        };
        for observer in &observers {
            host.set_entity_visible(*observer, entity, false);
        }
        host.set_entity_visible(viewer, entity, true);
        ids.insert(actor_id.clone(), entity);
    }

    ids
}

/// Moves every tracked proxy to its held pose at `tick`. Missing templates,
/// entities or samples are skipped. Returns how many proxies moved.
pub fn advance_actors<H: EntityHost>(
    host: &mut H,
    ids: &ActorIds,
    templates: &BTreeMap<String, ActorTemplate>,
    tick: Tick,
) -> usize {
    let mut moved = 0;
    for (actor_id, entity) in ids {
        let Some(pose) = templates
            .get(actor_id)
            .and_then(|template| template.timeline.pose_at(i64::from(tick)))
        else {
            continue;
        };
        if host.entity_exists(*entity) && host.move_entity(*entity, pose) {
            moved += 1;
        }
    }
    moved
}

/// Destroys every tracked proxy, tolerating ones already removed.
/// Returns how many were still alive.
pub fn teardown_actors<H: EntityHost>(host: &mut H, ids: &ActorIds) -> usize {
    ids.values()
        .filter(|entity| host.destroy_entity(**entity))
        .count()
}

pub fn hide_actors_from<H: EntityHost>(host: &mut H, observer: ViewerId, ids: &ActorIds) {
    for entity in ids.values() {
        host.set_entity_visible(observer, *entity, false);
    }
}
