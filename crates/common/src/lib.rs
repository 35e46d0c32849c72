//! Shared data model for the monet renderer.
//!
//! CPU-side objects (meshes, instance blocks, shader sources) live in a
//! [`Registry`] and are referred to by opaque ids. Renderers key their GPU
//! caches on those ids, so identity is the id, never the content.
//!
//! # Invariants
//! - Registered objects are immutable; new data means a new id.
//! - A removed id is never handed out again (generational keys).
//! - Layers are drawn in caller order; [`sort_layers`] is a caller-side helper.

mod frame;
mod geometry;
mod layer;
mod registry;

pub use frame::FrameParams;
pub use geometry::{Instance, InstanceBlock, Mesh, ShaderSource};
pub use layer::{Batch, Layer, ShaderChoice, sort_layers};
pub use registry::{InstanceBlockId, MeshId, Registry, RegistryError, ResourceId, ShaderId};
