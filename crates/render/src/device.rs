use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a bound buffer is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Vertex attribute data.
    Array,
    /// Index data.
    ElementArray,
}

/// Upload frequency hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferUsage {
    #[default]
    StreamDraw,
    StaticDraw,
    DynamicDraw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
        })
    }
}

/// Source language a device compiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShadingLanguage {
    /// GLSL ES 1.00 (`attribute`/`varying`, `gl_FragColor`).
    Glsl,
    /// WGSL with `@location` vertex inputs and `@group(0)` uniforms.
    Wgsl,
}

/// Depth comparison function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClearMask {
    pub color: bool,
    pub depth: bool,
}

impl ClearMask {
    pub const COLOR_AND_DEPTH: Self = Self {
        color: true,
        depth: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    TriangleList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    pub fn size(self) -> u32 {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

/// Float attribute layout inside the currently bound array buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttribPointer {
    /// Floats per element (1..=4).
    pub components: u32,
    /// Bytes between elements; 0 means tightly packed.
    pub stride: u32,
    /// Byte offset of the first element.
    pub offset: u32,
}

impl AttribPointer {
    pub const fn floats(components: u32, stride: u32, offset: u32) -> Self {
        Self {
            components,
            stride,
            offset,
        }
    }

    /// Stride with the tightly packed case resolved.
    pub fn effective_stride(&self) -> u32 {
        if self.stride == 0 {
            self.components * 4
        } else {
            self.stride
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawIndexedInstanced {
    pub topology: Topology,
    pub index_count: u32,
    pub index_format: IndexFormat,
    /// Byte offset into the bound index buffer.
    pub offset: u32,
    pub instance_count: u32,
}

/// Rasterization device with GL-style bind state.
///
/// The renderer is the only writer of this state while a frame is drawn and
/// makes no promises about what stays bound afterwards. Handles are owned by
/// whoever created them and must be returned through the matching `delete_*`.
pub trait GraphicsDevice {
    type Buffer: Clone + PartialEq + fmt::Debug;
    type Shader: fmt::Debug;
    type Program: Clone + PartialEq + fmt::Debug;
    type UniformLocation: Clone + fmt::Debug;

    /// Whether instanced draws and attribute divisors are available.
    fn supports_instancing(&self) -> bool;

    fn shading_language(&self) -> ShadingLanguage;

    /// `None` when the device cannot allocate (e.g. a lost context).
    fn create_buffer(&mut self) -> Option<Self::Buffer>;
    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<&Self::Buffer>);
    /// Replaces the contents of the buffer bound to `target`.
    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage);
    fn delete_buffer(&mut self, buffer: Self::Buffer);

    /// Compiles one stage; on failure returns the compiler log.
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<Self::Shader, String>;
    fn delete_shader(&mut self, shader: Self::Shader);
    /// Links both stages into a program; on failure returns the linker log.
    fn link_program(
        &mut self,
        vertex: &Self::Shader,
        fragment: &Self::Shader,
    ) -> Result<Self::Program, String>;
    fn delete_program(&mut self, program: Self::Program);

    fn uniform_location(&mut self, program: &Self::Program, name: &str) -> Option<Self::UniformLocation>;
    fn attrib_location(&mut self, program: &Self::Program, name: &str) -> Option<u32>;

    fn use_program(&mut self, program: Option<&Self::Program>);
    /// Uploads a column-major 4x4 matrix to the active program.
    fn uniform_matrix4(&mut self, location: &Self::UniformLocation, matrix: &[f32; 16]);

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32);
    fn clear_color(&mut self, rgba: [f32; 4]);
    fn clear_depth(&mut self, depth: f32);
    fn set_depth_test(&mut self, enabled: bool);
    fn depth_func(&mut self, func: CompareFunction);
    fn depth_mask(&mut self, write: bool);
    fn clear(&mut self, mask: ClearMask);

    /// Points `location` at the buffer currently bound to [`BufferTarget::Array`].
    fn vertex_attrib_pointer(&mut self, location: u32, pointer: AttribPointer);
    fn enable_vertex_attrib_array(&mut self, location: u32);
    /// 0 advances per vertex, N advances once every N instances.
    fn vertex_attrib_divisor(&mut self, location: u32, divisor: u32);

    fn draw_elements_instanced(&mut self, draw: DrawIndexedInstanced);

    /// Submits recorded work. Devices that execute immediately keep the default.
    fn flush(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tightly_packed_stride() {
        assert_eq!(AttribPointer::floats(3, 0, 0).effective_stride(), 12);
        assert_eq!(AttribPointer::floats(2, 32, 12).effective_stride(), 32);
    }

    #[test]
    fn stage_names() {
        assert_eq!(ShaderStage::Vertex.to_string(), "vertex");
        assert_eq!(ShaderStage::Fragment.to_string(), "fragment");
    }
}
