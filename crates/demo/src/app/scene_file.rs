use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use cutscene_engine::{Scene, SceneError};
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum SceneFileError {
    #[error("failed to read scene file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse scene file {} at {location}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        location: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("scene file {} is invalid: {source}", .path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: SceneError,
    },
    #[error("failed to encode scene '{scene}': {source}")]
    Encode {
        scene: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write scene file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub(crate) fn load_scene(path: &Path) -> Result<Scene, SceneFileError> {
    let raw = fs::read_to_string(path).map_err(|source| SceneFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let scene = parse_scene_json(&raw, path)?;
    scene.validate().map_err(|source| SceneFileError::Invalid {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(scene)
}

/// Writes pretty JSON through a sibling temp file so readers never observe a
/// half-written scene.
pub(crate) fn save_scene(path: &Path, scene: &Scene) -> Result<(), SceneFileError> {
    let text = serde_json::to_string_pretty(scene).map_err(|source| SceneFileError::Encode {
        scene: scene.name.clone(),
        source,
    })?;
    write_text_atomic(path, &text).map_err(|source| SceneFileError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_scene_json(raw: &str, path: &Path) -> Result<Scene, SceneFileError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, Scene>(&mut deserializer).map_err(|error| {
        let location = error.path().to_string();
        let location = if location.is_empty() || location == "." {
            "<root>".to_string()
        } else {
            location
        };
        SceneFileError::Parse {
            path: path.to_path_buf(),
            location,
            source: error.into_inner(),
        }
    })
}

fn write_text_atomic(path: &Path, text: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_path_for(path);
    fs::write(&tmp_path, text.as_bytes())?;
    if let Err(error) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("scene.json");
    let tmp_name = format!("{file_name}.tmp");
    match path.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}
