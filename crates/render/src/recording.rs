//! A [`GraphicsDevice`] that executes nothing and records everything.
//!
//! Every call lands in a trace of [`Call`] values, so frame sequencing can be
//! asserted on (or printed) without a GPU. Stage "compilation" is a light
//! GLSL check: non-empty text, balanced brackets and a `main` function.
//! Locations are assigned in declaration order of `uniform` and `attribute`.

use crate::device::{
    AttribPointer, BufferTarget, BufferUsage, ClearMask, CompareFunction, DrawIndexedInstanced,
    GraphicsDevice, ShaderStage, ShadingLanguage,
};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformId {
    pub program: ProgramId,
    pub slot: u32,
}

/// A compiled stage with the names it declares.
#[derive(Debug)]
pub struct StageObject {
    stage: ShaderStage,
    uniforms: Vec<String>,
    attributes: Vec<String>,
}

#[derive(Debug)]
struct ProgramInfo {
    uniforms: Vec<String>,
    attributes: Vec<String>,
}

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateBuffer(BufferId),
    BindBuffer {
        target: BufferTarget,
        buffer: Option<BufferId>,
    },
    BufferData {
        target: BufferTarget,
        bytes: usize,
        usage: BufferUsage,
    },
    DeleteBuffer(BufferId),
    CompileShader {
        stage: ShaderStage,
        ok: bool,
    },
    DeleteShader(ShaderStage),
    LinkProgram(Option<ProgramId>),
    DeleteProgram(ProgramId),
    UseProgram(Option<ProgramId>),
    UniformMatrix4 {
        location: UniformId,
        matrix: [f32; 16],
    },
    Viewport {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
    ClearColor([f32; 4]),
    ClearDepth(f32),
    DepthTest(bool),
    DepthFunc(CompareFunction),
    DepthMask(bool),
    Clear(ClearMask),
    VertexAttribPointer {
        location: u32,
        pointer: AttribPointer,
        buffer: Option<BufferId>,
    },
    EnableVertexAttribArray(u32),
    VertexAttribDivisor {
        location: u32,
        divisor: u32,
    },
    DrawElementsInstanced {
        program: Option<ProgramId>,
        draw: DrawIndexedInstanced,
    },
    Flush,
}

fn target_name(target: BufferTarget) -> &'static str {
    match target {
        BufferTarget::Array => "ARRAY_BUFFER",
        BufferTarget::ElementArray => "ELEMENT_ARRAY_BUFFER",
    }
}

fn opt<T: fmt::Debug>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map_or_else(|| "null".to_string(), |v| format!("{v:?}"))
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateBuffer(id) => write!(f, "createBuffer() -> {}", id.0),
            Self::BindBuffer { target, buffer } => write!(
                f,
                "bindBuffer({}, {})",
                target_name(*target),
                opt(&buffer.map(|b| b.0))
            ),
            Self::BufferData {
                target,
                bytes,
                usage,
            } => write!(f, "bufferData({}, {bytes} bytes, {usage:?})", target_name(*target)),
            Self::DeleteBuffer(id) => write!(f, "deleteBuffer({})", id.0),
            Self::CompileShader { stage, ok } => write!(f, "compileShader({stage}) -> {ok}"),
            Self::DeleteShader(stage) => write!(f, "deleteShader({stage})"),
            Self::LinkProgram(program) => write!(f, "linkProgram() -> {}", opt(&program.map(|p| p.0))),
            Self::DeleteProgram(program) => write!(f, "deleteProgram({})", program.0),
            Self::UseProgram(program) => write!(f, "useProgram({})", opt(&program.map(|p| p.0))),
            Self::UniformMatrix4 { location, .. } => write!(
                f,
                "uniformMatrix4fv(program {}, slot {})",
                location.program.0, location.slot
            ),
            Self::Viewport {
                x,
                y,
                width,
                height,
            } => write!(f, "viewport({x}, {y}, {width}, {height})"),
            Self::ClearColor([r, g, b, a]) => write!(f, "clearColor({r}, {g}, {b}, {a})"),
            Self::ClearDepth(depth) => write!(f, "clearDepth({depth})"),
            Self::DepthTest(enabled) => {
                write!(f, "{}(DEPTH_TEST)", if *enabled { "enable" } else { "disable" })
            }
            Self::DepthFunc(func) => write!(f, "depthFunc({func:?})"),
            Self::DepthMask(write) => write!(f, "depthMask({write})"),
            Self::Clear(mask) => write!(f, "clear(color: {}, depth: {})", mask.color, mask.depth),
            Self::VertexAttribPointer {
                location,
                pointer,
                buffer,
            } => write!(
                f,
                "vertexAttribPointer({location}, {} floats, stride {}, offset {}) <- buffer {}",
                pointer.components,
                pointer.stride,
                pointer.offset,
                opt(&buffer.map(|b| b.0))
            ),
            Self::EnableVertexAttribArray(location) => {
                write!(f, "enableVertexAttribArray({location})")
            }
            Self::VertexAttribDivisor { location, divisor } => {
                write!(f, "vertexAttribDivisor({location}, {divisor})")
            }
            Self::DrawElementsInstanced { program, draw } => write!(
                f,
                "drawElementsInstanced({:?}, {} indices, {:?}, offset {}, {} instances) with program {}",
                draw.topology,
                draw.index_count,
                draw.index_format,
                draw.offset,
                draw.instance_count,
                opt(&program.map(|p| p.0))
            ),
            Self::Flush => f.write_str("flush()"),
        }
    }
}

/// Recording mock device.
#[derive(Debug)]
pub struct RecordingDevice {
    calls: Vec<Call>,
    instancing: bool,
    next_id: u32,
    buffers: HashMap<BufferId, Vec<u8>>,
    programs: HashMap<ProgramId, ProgramInfo>,
    live_shaders: usize,
    array_buffer: Option<BufferId>,
    element_buffer: Option<BufferId>,
    current_program: Option<ProgramId>,
    fail_link: Option<String>,
    out_of_memory: bool,
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            instancing: true,
            next_id: 1,
            buffers: HashMap::new(),
            programs: HashMap::new(),
            live_shaders: 0,
            array_buffer: None,
            element_buffer: None,
            current_program: None,
            fail_link: None,
            out_of_memory: false,
        }
    }

    /// A device lacking instanced drawing.
    pub fn without_instancing() -> Self {
        Self {
            instancing: false,
            ..Self::new()
        }
    }

    /// Makes the next link fail with `log`.
    pub fn fail_next_link(&mut self, log: impl Into<String>) {
        self.fail_link = Some(log.into());
    }

    /// While set, `create_buffer` returns `None`, as a lost context would.
    pub fn set_out_of_memory(&mut self, out_of_memory: bool) {
        self.out_of_memory = out_of_memory;
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }

    pub fn draws(&self) -> Vec<(Option<ProgramId>, DrawIndexedInstanced)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::DrawElementsInstanced { program, draw } => Some((*program, *draw)),
                _ => None,
            })
            .collect()
    }

    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_shaders(&self) -> usize {
        self.live_shaders
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    fn next(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn bound(&self, target: BufferTarget) -> Option<BufferId> {
        match target {
            BufferTarget::Array => self.array_buffer,
            BufferTarget::ElementArray => self.element_buffer,
        }
    }
}

fn brackets_balance(source: &str) -> bool {
    let mut stack = Vec::new();
    for c in source.chars() {
        match c {
            '(' | '{' | '[' => stack.push(c),
            ')' | '}' | ']' => {
                let open = match c {
                    ')' => '(',
                    '}' => '{',
                    _ => '[',
                };
                if stack.pop() != Some(open) {
                    return false;
                }
            }
            _ => {}
        }
    }
    stack.is_empty()
}

fn check_glsl(source: &str) -> Result<(), String> {
    if source.trim().is_empty() {
        return Err("ERROR: 0:1: empty shader source".into());
    }
    if !brackets_balance(source) {
        return Err("ERROR: 0:1: syntax error: unbalanced brackets".into());
    }
    if !source.contains("main") {
        return Err("ERROR: 0:1: missing main function".into());
    }
    Ok(())
}

/// Names declared with `qualifier` (`uniform` or `attribute`), in order.
fn declared(source: &str, qualifier: &str) -> Vec<String> {
    let mut names = Vec::new();
    for statement in source.split(';') {
        let statement = statement.rsplit(['{', '}']).next().unwrap_or(statement);
        let tokens: Vec<&str> = statement.split_whitespace().collect();
        if tokens.first() != Some(&qualifier) || tokens.len() < 3 {
            continue;
        }
        if let Some(last) = tokens.last() {
            let name = last.split('[').next().unwrap_or(last).to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

impl GraphicsDevice for RecordingDevice {
    type Buffer = BufferId;
    type Shader = StageObject;
    type Program = ProgramId;
    type UniformLocation = UniformId;

    fn supports_instancing(&self) -> bool {
        self.instancing
    }

    fn shading_language(&self) -> ShadingLanguage {
        ShadingLanguage::Glsl
    }

    fn create_buffer(&mut self) -> Option<BufferId> {
        if self.out_of_memory {
            return None;
        }
        let id = BufferId(self.next());
        self.buffers.insert(id, Vec::new());
        self.calls.push(Call::CreateBuffer(id));
        Some(id)
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<&BufferId>) {
        let buffer = buffer.copied();
        match target {
            BufferTarget::Array => self.array_buffer = buffer,
            BufferTarget::ElementArray => self.element_buffer = buffer,
        }
        self.calls.push(Call::BindBuffer { target, buffer });
    }

    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        if let Some(contents) = self.bound(target).and_then(|id| self.buffers.get_mut(&id)) {
            *contents = data.to_vec();
        }
        self.calls.push(Call::BufferData {
            target,
            bytes: data.len(),
            usage,
        });
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
        if self.array_buffer == Some(buffer) {
            self.array_buffer = None;
        }
        if self.element_buffer == Some(buffer) {
            self.element_buffer = None;
        }
        self.calls.push(Call::DeleteBuffer(buffer));
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<StageObject, String> {
        let result = check_glsl(source);
        self.calls.push(Call::CompileShader {
            stage,
            ok: result.is_ok(),
        });
        result?;
        self.live_shaders += 1;
        Ok(StageObject {
            stage,
            uniforms: declared(source, "uniform"),
            attributes: declared(source, "attribute"),
        })
    }

    fn delete_shader(&mut self, shader: StageObject) {
        self.live_shaders = self.live_shaders.saturating_sub(1);
        self.calls.push(Call::DeleteShader(shader.stage));
    }

    fn link_program(
        &mut self,
        vertex: &StageObject,
        fragment: &StageObject,
    ) -> Result<ProgramId, String> {
        let failure = self.fail_link.take().or_else(|| {
            (vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment)
                .then(|| "stages attached in the wrong order".to_string())
        });
        if let Some(log) = failure {
            self.calls.push(Call::LinkProgram(None));
            return Err(log);
        }

        let mut uniforms = vertex.uniforms.clone();
        for name in &fragment.uniforms {
            if !uniforms.contains(name) {
                uniforms.push(name.clone());
            }
        }
        let id = ProgramId(self.next());
        self.programs.insert(
            id,
            ProgramInfo {
                uniforms,
                attributes: vertex.attributes.clone(),
            },
        );
        self.calls.push(Call::LinkProgram(Some(id)));
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
        self.calls.push(Call::DeleteProgram(program));
    }

    fn uniform_location(&mut self, program: &ProgramId, name: &str) -> Option<UniformId> {
        let info = self.programs.get(program)?;
        let slot = info.uniforms.iter().position(|u| u == name)?;
        Some(UniformId {
            program: *program,
            slot: slot as u32,
        })
    }

    fn attrib_location(&mut self, program: &ProgramId, name: &str) -> Option<u32> {
        let info = self.programs.get(program)?;
        info.attributes
            .iter()
            .position(|a| a == name)
            .map(|slot| slot as u32)
    }

    fn use_program(&mut self, program: Option<&ProgramId>) {
        self.current_program = program.copied();
        self.calls.push(Call::UseProgram(self.current_program));
    }

    fn uniform_matrix4(&mut self, location: &UniformId, matrix: &[f32; 16]) {
        self.calls.push(Call::UniformMatrix4 {
            location: *location,
            matrix: *matrix,
        });
    }

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.calls.push(Call::Viewport {
            x,
            y,
            width,
            height,
        });
    }

    fn clear_color(&mut self, rgba: [f32; 4]) {
        self.calls.push(Call::ClearColor(rgba));
    }

    fn clear_depth(&mut self, depth: f32) {
        self.calls.push(Call::ClearDepth(depth));
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.calls.push(Call::DepthTest(enabled));
    }

    fn depth_func(&mut self, func: CompareFunction) {
        self.calls.push(Call::DepthFunc(func));
    }

    fn depth_mask(&mut self, write: bool) {
        self.calls.push(Call::DepthMask(write));
    }

    fn clear(&mut self, mask: ClearMask) {
        self.calls.push(Call::Clear(mask));
    }

    fn vertex_attrib_pointer(&mut self, location: u32, pointer: AttribPointer) {
        self.calls.push(Call::VertexAttribPointer {
            location,
            pointer,
            buffer: self.array_buffer,
        });
    }

    fn enable_vertex_attrib_array(&mut self, location: u32) {
        self.calls.push(Call::EnableVertexAttribArray(location));
    }

    fn vertex_attrib_divisor(&mut self, location: u32, divisor: u32) {
        self.calls.push(Call::VertexAttribDivisor { location, divisor });
    }

    fn draw_elements_instanced(&mut self, draw: DrawIndexedInstanced) {
        self.calls.push(Call::DrawElementsInstanced {
            program: self.current_program,
            draw,
        });
    }

    fn flush(&mut self) {
        self.calls.push(Call::Flush);
    }
}
