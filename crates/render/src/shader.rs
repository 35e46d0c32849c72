use crate::device::{GraphicsDevice, ShaderStage};
use monet_common::ShaderSource;

/// Names the renderer binds by.
pub const VIEW_UNIFORM: &str = "view";
pub const PERSPECTIVE_UNIFORM: &str = "perspective";
pub const POSITION_ATTRIB: &str = "position";
pub const INSTANCE_POSITION_ATTRIB: &str = "instance_position";
pub const INSTANCE_DIRECTION_ATTRIB: &str = "instance_direction";
pub const INSTANCE_COLOR_ATTRIB: &str = "instance_color";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShaderError {
    #[error("error compiling {stage} shader: {log}")]
    Compile { stage: ShaderStage, log: String },
    #[error("could not link shader program: {log}")]
    Link { log: String },
}

impl ShaderError {
    /// Stage that failed, `None` for link failures.
    pub fn stage(&self) -> Option<ShaderStage> {
        match self {
            Self::Compile { stage, .. } => Some(*stage),
            Self::Link { .. } => None,
        }
    }
}

/// Resolved uniform and attribute locations. `None` marks a name the program
/// does not use; binding code must skip it.
#[derive(Debug, Clone, PartialEq)]
pub struct Locations<U> {
    pub view: Option<U>,
    pub perspective: Option<U>,
    pub position: Option<u32>,
    pub instance_position: Option<u32>,
    pub instance_direction: Option<u32>,
    pub instance_color: Option<u32>,
}

/// A linked program plus its location table.
pub struct ShaderProgram<D: GraphicsDevice> {
    pub program: D::Program,
    pub locations: Locations<D::UniformLocation>,
}

impl<D: GraphicsDevice> Clone for ShaderProgram<D> {
    fn clone(&self) -> Self {
        Self {
            program: self.program.clone(),
            locations: self.locations.clone(),
        }
    }
}

impl<D: GraphicsDevice> std::fmt::Debug for ShaderProgram<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderProgram")
            .field("program", &self.program)
            .field("locations", &self.locations)
            .finish()
    }
}

/// Compiles and links `source`, resolving the renderer's binding names.
///
/// Stage objects are released on every path; only the program survives.
pub fn compile_program<D: GraphicsDevice>(
    device: &mut D,
    source: &ShaderSource,
) -> Result<ShaderProgram<D>, ShaderError> {
    let vertex = device
        .compile_shader(ShaderStage::Vertex, &source.vertex)
        .map_err(|log| ShaderError::Compile {
            stage: ShaderStage::Vertex,
            log,
        })?;

    let fragment = match device.compile_shader(ShaderStage::Fragment, &source.fragment) {
        Ok(fragment) => fragment,
        Err(log) => {
            device.delete_shader(vertex);
            return Err(ShaderError::Compile {
                stage: ShaderStage::Fragment,
                log,
            });
        }
    };

    let linked = device.link_program(&vertex, &fragment);
    device.delete_shader(vertex);
    device.delete_shader(fragment);
    let program = linked.map_err(|log| ShaderError::Link { log })?;

    let locations = Locations {
        view: device.uniform_location(&program, VIEW_UNIFORM),
        perspective: device.uniform_location(&program, PERSPECTIVE_UNIFORM),
        position: device.attrib_location(&program, POSITION_ATTRIB),
        instance_position: device.attrib_location(&program, INSTANCE_POSITION_ATTRIB),
        instance_direction: device.attrib_location(&program, INSTANCE_DIRECTION_ATTRIB),
        instance_color: device.attrib_location(&program, INSTANCE_COLOR_ATTRIB),
    };
    tracing::debug!(?program, ?locations, "shader program linked");

    Ok(ShaderProgram { program, locations })
}
