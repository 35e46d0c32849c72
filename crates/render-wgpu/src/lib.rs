//! wgpu device for the monet renderer.
//!
//! [`WgpuDevice`] implements [`monet_render::GraphicsDevice`] on top of wgpu:
//! WGSL stages are validated and reflected with naga, GL-style bind state is
//! turned into cached render pipelines, and each `flush` submits one pass.
//!
//! # Invariants
//! - Shader problems surface as compile/link logs, never as panics.
//! - A pipeline is built once per program, depth state and vertex layout.
//! - Camera motion lives with the host; the device only sees matrices.

mod camera;
mod gpu;
mod pipeline;
mod reflect;

pub use camera::OrbitCamera;
pub use gpu::{BufferHandle, ProgramHandle, StageModule, UniformHandle, WgpuDevice};
