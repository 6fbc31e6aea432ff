//! JSON sidecar files for voxel volumes and surface meshes.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::core::region::{SurfaceMesh, Volume};

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

/// Serialize `value` to pretty-printed JSON with trailing newline.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut payload = serde_json::to_string_pretty(value).context("serialize json")?;
    payload.push('\n');
    fs::write(path, payload).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Read and validate a voxel volume.
pub fn load_volume(path: &Path) -> Result<Volume> {
    let volume: Volume = read_json(path)?;
    volume
        .validate()
        .with_context(|| format!("invalid volume {}", path.display()))?;
    Ok(volume)
}

/// Read and validate a triangle mesh.
pub fn load_mesh(path: &Path) -> Result<SurfaceMesh> {
    let mesh: SurfaceMesh = read_json(path)?;
    mesh.validate()
        .with_context(|| format!("invalid mesh {}", path.display()))?;
    Ok(mesh)
}

/// Sidecars already read while building one pathway, keyed by path.
#[derive(Debug, Default)]
pub struct SidecarCache {
    volumes: HashMap<PathBuf, Arc<Volume>>,
    meshes: HashMap<PathBuf, Arc<SurfaceMesh>>,
}

impl SidecarCache {
    pub fn volume(&mut self, path: &Path) -> Result<Arc<Volume>> {
        if let Some(volume) = self.volumes.get(path) {
            return Ok(volume.clone());
        }
        let volume = Arc::new(load_volume(path)?);
        debug!(path = %path.display(), dims = ?volume.dims, "volume loaded");
        self.volumes.insert(path.to_path_buf(), volume.clone());
        Ok(volume)
    }

    pub fn mesh(&mut self, path: &Path) -> Result<Arc<SurfaceMesh>> {
        if let Some(mesh) = self.meshes.get(path) {
            return Ok(mesh.clone());
        }
        let mesh = Arc::new(load_mesh(path)?);
        debug!(
            path = %path.display(),
            triangles = mesh.triangles.len(),
            "mesh loaded"
        );
        self.meshes.insert(path.to_path_buf(), mesh.clone());
        Ok(mesh)
    }

    pub fn len(&self) -> usize {
        self.volumes.len() + self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
