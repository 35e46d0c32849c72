//! Frame renderer: ordered layers of instanced batches over a device trait.
//!
//! # Invariants
//! - Each registered object is uploaded or compiled at most once while cached.
//! - Programs are switched, and uniforms re-sent, only when the program changes.
//! - Decal layers draw with depth writes off and an always-pass comparison.
//! - Per-batch and per-shader problems are recorded, never raised.
//!
//! [`RecordingDevice`] stands in for a GPU in tests and tooling.

pub mod builtin;
mod cache;
mod device;
mod error;
pub mod recording;
mod renderer;
mod shader;

pub use cache::ResourceCache;
pub use device::{
    AttribPointer, BufferTarget, BufferUsage, ClearMask, CompareFunction, DrawIndexedInstanced,
    GraphicsDevice, IndexFormat, ShaderStage, ShadingLanguage, Topology,
};
pub use error::{InitError, RenderError, ShaderKey};
pub use recording::RecordingDevice;
pub use renderer::{
    CacheStats, FrameRenderer, FrameStats, LoadedMesh, RendererConfig, ShaderFailurePolicy,
};
pub use shader::{
    INSTANCE_COLOR_ATTRIB, INSTANCE_DIRECTION_ATTRIB, INSTANCE_POSITION_ATTRIB, Locations,
    PERSPECTIVE_UNIFORM, POSITION_ATTRIB, ShaderError, ShaderProgram, VIEW_UNIFORM,
    compile_program,
};

pub fn crate_info() -> &'static str {
    "monet-render v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("render"));
    }
}
