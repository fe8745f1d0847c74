use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Tick = u32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Look {
    pub yaw: f32,
    pub pitch: f32,
}

/// One sampled pose. Camera points and actor poses share this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
}

pub type CameraPoint = Transform;

impl Transform {
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64, yaw: f32, pitch: f32) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
            yaw,
            pitch,
        }
    }

    pub fn look(&self) -> Look {
        Look {
            yaw: self.yaw,
            pitch: self.pitch,
        }
    }

    /// Same position, new orientation.
    pub fn with_look(&self, look: Look) -> Self {
        Self {
            yaw: look.yaw,
            pitch: look.pitch,
            ..self.clone()
        }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.z.is_finite()
            && self.yaw.is_finite()
            && self.pitch.is_finite()
    }
}

/// Sparse tick -> pose mapping. Lookups hold the last known pose.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timeline {
    frames: BTreeMap<Tick, Transform>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tick: Tick, pose: Transform) -> Option<Transform> {
        self.frames.insert(tick, pose)
    }

    /// Exact key if present, otherwise the greatest key below `tick`.
    /// Never interpolates and never looks ahead.
    pub fn pose_at(&self, tick: i64) -> Option<&Transform> {
        let tick = Tick::try_from(tick).ok()?;
        self.frames
            .range(..=tick)
            .next_back()
            .map(|(_, pose)| pose)
    }

    pub fn first(&self) -> Option<(Tick, &Transform)> {
        self.frames
            .first_key_value()
            .map(|(tick, pose)| (*tick, pose))
    }

    pub fn last_tick(&self) -> Option<Tick> {
        self.frames.last_key_value().map(|(tick, _)| *tick)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tick, &Transform)> {
        self.frames.iter().map(|(tick, pose)| (*tick, pose))
    }
}

impl FromIterator<(Tick, Transform)> for Timeline {
    fn from_iter<I: IntoIterator<Item = (Tick, Transform)>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().collect(),
        }
    }
}

fn default_scale() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorTemplate {
    pub id: String,
    #[serde(default)]
    pub skin: Option<String>,
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default)]
    pub timeline: Timeline,
}

impl ActorTemplate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            skin: None,
            scale: default_scale(),
            timeline: Timeline::new(),
        }
    }
}

/// What a recording writes into once it completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordTarget {
    Camera,
    Actor(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub name: String,
    pub duration_ticks: Tick,
    #[serde(default)]
    pub camera: Timeline,
    #[serde(default)]
    pub actors: BTreeMap<String, ActorTemplate>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneError {
    #[error("scene name must not be empty")]
    EmptyName,
    #[error("actor entry '{key}' holds template with id '{template_id}'")]
    ActorIdMismatch { key: String, template_id: String },
    #[error("non-finite pose at tick {tick} in {path}")]
    NonFinitePose { path: String, tick: Tick },
    #[error("actor '{actor}' has non-positive scale {scale}")]
    InvalidScale { actor: String, scale: f32 },
}

impl Scene {
    pub fn new(name: impl Into<String>, duration_ticks: Tick) -> Self {
        Self {
            name: name.into(),
            duration_ticks,
            camera: Timeline::new(),
            actors: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> Result<(), SceneError> {
        if self.name.trim().is_empty() {
            return Err(SceneError::EmptyName);
        }
        check_finite(&self.camera, "camera")?;
        for (key, template) in &self.actors {
            if *key != template.id {
                return Err(SceneError::ActorIdMismatch {
                    key: key.clone(),
                    template_id: template.id.clone(),
                });
            }
            if !(template.scale.is_finite() && template.scale > 0.0) {
                return Err(SceneError::InvalidScale {
                    actor: key.clone(),
                    scale: template.scale,
                });
            }
            check_finite(&template.timeline, &format!("actors.{key}"))?;
        }
        Ok(())
    }

    /// Replaces the targeted timeline. Missing actors are created with default
    /// appearance, and the duration grows to cover the new samples.
    pub fn replace_timeline(&mut self, target: &RecordTarget, timeline: Timeline) {
        if let Some(last_tick) = timeline.last_tick() {
            self.duration_ticks = self.duration_ticks.max(last_tick);
        }
        match target {
            RecordTarget::Camera => self.camera = timeline,
            RecordTarget::Actor(actor_id) => {
                self.actors
                    .entry(actor_id.clone())
                    .or_insert_with(|| ActorTemplate::new(actor_id.clone()))
                    .timeline = timeline;
            }
        }
    }
}

fn check_finite(timeline: &Timeline, path: &str) -> Result<(), SceneError> {
    match timeline.iter().find(|(_, pose)| !pose.is_finite()) {
        Some((tick, _)) => Err(SceneError::NonFinitePose {
            path: path.to_string(),
            tick,
        }),
        None => Ok(()),
    }
}
