//! Scene documents for the monet renderer.
//!
//! A scene file names its meshes and shaders and lists layers of instanced
//! batches. Instantiating it registers everything in a [`Registry`] and
//! yields layers ready for a frame.
//!
//! [`Registry`]: monet_common::Registry

pub mod primitives;
mod scene;

pub use scene::{
    BatchSpec, CameraSpec, InstanceSpec, LayerSpec, MeshSpec, Primitive, Scene, SceneDocument,
    ShaderSpec,
};

/// Errors from loading or instantiating a scene.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported scene format: {0} (expected .yaml, .yml or .json)")]
    UnsupportedFormat(String),
    #[error("layer {layer} references unknown mesh `{name}`")]
    UnknownMesh { layer: usize, name: String },
    #[error("layer {layer} references unknown shader `{name}`")]
    UnknownShader { layer: usize, name: String },
    #[error("layer {layer} batch {batch} gives both `instances` and `raw`")]
    AmbiguousInstances { layer: usize, batch: usize },
    #[error("mesh `{name}` is invalid: {reason}")]
    InvalidMesh { name: String, reason: String },
}

pub fn crate_info() -> &'static str {
    "monet-assets v0.1.0"
}
