use crate::shader::ShaderError;
use monet_common::{InstanceBlockId, ResourceId, ShaderId};

/// Setup failures. These block rendering entirely; the host should show a
/// diagnostic instead of a surface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    #[error("graphics device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("instanced drawing is not supported by this device")]
    InstancingUnsupported,
}

/// Which cached program a shader error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKey {
    /// The built-in solid-color shader.
    SolidColor,
    Registered(ShaderId),
}

/// Per-frame problems. Recorded on the renderer for the host to display;
/// never returned from a frame and never fatal to it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("shader {shader:?} unusable: {source}")]
    Shader {
        shader: ShaderKey,
        source: ShaderError,
    },
    #[error("instance block {block:?} has {len} floats, not a multiple of 8; batch discarded")]
    MalformedInstances { block: InstanceBlockId, len: usize },
    #[error("{0:?} is not registered; batch skipped")]
    UnknownResource(ResourceId),
}

impl RenderError {
    pub fn shader_error(&self) -> Option<&ShaderError> {
        match self {
            Self::Shader { source, .. } => Some(source),
            _ => None,
        }
    }
}
