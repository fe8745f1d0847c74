use std::collections::BTreeSet;

use cutscene_engine::{ActorTemplate, Scene, Tick, Transform};

pub(crate) const DEMO_WORLD: &str = "overworld";
pub(crate) const STAND_IN_ACTOR: &str = "stand_in";
pub(crate) const RECORDING_TICKS: Tick = 60;
const WALK_STEP_BLOCKS: f64 = 0.2;

/// Built-in scene: a slow pan across the harbor with a ferry and a circling
/// gull.
pub(crate) fn harbor_flyover() -> Scene {
    let mut scene = Scene::new("harbor_flyover", 160);
    scene.camera = [
        (0, Transform::new(DEMO_WORLD, 0.0, 90.0, 0.0, 0.0, 20.0)),
        (40, Transform::new(DEMO_WORLD, 40.0, 85.0, 10.0, 30.0, 15.0)),
        (80, Transform::new(DEMO_WORLD, 80.0, 75.0, 30.0, 60.0, 10.0)),
        (120, Transform::new(DEMO_WORLD, 100.0, 70.0, 60.0, 90.0, 5.0)),
        (160, Transform::new(DEMO_WORLD, 100.0, 70.0, 60.0, 135.0, 0.0)),
    ]
    .into_iter()
    .collect();

    let mut ferryman = ActorTemplate::new("ferryman");
    ferryman.skin = Some("ferryman".to_string());
    ferryman.timeline = (0..=160)
        .step_by(20)
        .map(|tick: Tick| {
            let x = 60.0 + f64::from(tick) * 0.25;
            (tick, Transform::new(DEMO_WORLD, x, 63.0, 40.0, 90.0, 0.0))
        })
        .collect();

    let mut gull = ActorTemplate::new("gull");
    gull.scale = 0.5;
    gull.timeline = (0..=160)
        .step_by(10)
        .map(|tick: Tick| {
            let angle = f64::from(tick) / 160.0 * std::f64::consts::TAU;
            let pose = Transform::new(
                DEMO_WORLD,
                80.0 + 12.0 * angle.cos(),
                78.0,
                40.0 + 12.0 * angle.sin(),
                (angle.to_degrees() + 90.0) as f32,
                0.0,
            );
            (tick, pose)
        })
        .collect();

    scene.actors.insert(ferryman.id.clone(), ferryman);
    scene.actors.insert(gull.id.clone(), gull);
    scene
}

/// Every world a scene's camera or actors reference.
pub(crate) fn worlds_in(scene: &Scene) -> BTreeSet<String> {
    scene
        .camera
        .iter()
        .chain(
            scene
                .actors
                .values()
                .flat_map(|template| template.timeline.iter()),
        )
        .map(|(_, pose)| pose.world.clone())
        .collect()
}

pub(crate) fn viewer_spawn(scene: &Scene) -> Transform {
    let world = scene
        .camera
        .first()
        .map_or(DEMO_WORLD, |(_, pose)| pose.world.as_str());
    Transform::new(world, 0.0, 64.0, 0.0, 0.0, 0.0)
}

/// Where the scripted stand-in stands `step` ticks into its walk from
/// `origin`: straight along +x, turning slowly.
pub(crate) fn scripted_walk(origin: &Transform, step: u64) -> Transform {
    let distance = step as f64 * WALK_STEP_BLOCKS;
    Transform {
        x: origin.x + distance,
        yaw: origin.yaw + (step % 360) as f32,
        ..origin.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_scene_is_valid_and_playable() {
        let scene = harbor_flyover();
        assert!(scene.validate().is_ok());
        assert!(scene.camera.pose_at(0).is_some());
        assert_eq!(scene.camera.last_tick(), Some(scene.duration_ticks));
        assert_eq!(scene.actors.len(), 2);
    }

    #[test]
    fn worlds_cover_camera_and_actors() {
        let mut scene = harbor_flyover();
        let mut diver = ActorTemplate::new("diver");
        diver
            .timeline
            .insert(0, Transform::new("ocean_floor", 0.0, 10.0, 0.0, 0.0, 0.0));
        scene.actors.insert("diver".to_string(), diver);

        let worlds: Vec<String> = worlds_in(&scene).into_iter().collect();

        assert_eq!(worlds, vec!["ocean_floor".to_string(), DEMO_WORLD.to_string()]);
    }

    #[test]
    fn viewer_spawns_in_camera_world() {
        let mut scene = Scene::new("nether_tour", 10);
        scene
            .camera
            .insert(0, Transform::new("nether", 5.0, 40.0, 5.0, 0.0, 0.0));
        assert_eq!(viewer_spawn(&scene).world, "nether");
        assert_eq!(viewer_spawn(&Scene::new("empty", 0)).world, DEMO_WORLD);
    }

    #[test]
    fn scripted_walk_advances_along_x() {
        let origin = Transform::new(DEMO_WORLD, 10.0, 64.0, 0.0, 0.0, 0.0);
        assert_eq!(scripted_walk(&origin, 0), origin);
        let later = scripted_walk(&origin, 10);
        assert!((later.x - 12.0).abs() < 1e-9);
        assert_eq!(later.z, origin.z);
    }
}
