use crate::pipeline::{self, AttributeState, PipelineKey, VertexSlot};
use crate::reflect::{self, StageIr};
use monet_render::{
    AttribPointer, BufferTarget, BufferUsage, ClearMask, CompareFunction, DrawIndexedInstanced,
    GraphicsDevice, IndexFormat, ShaderStage, ShadingLanguage,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use wgpu::util::DeviceExt;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformHandle {
    program: ProgramHandle,
    binding: u32,
}

/// A compiled WGSL stage.
#[derive(Debug)]
pub struct StageModule {
    stage: ShaderStage,
    ir: StageIr,
    module: Arc<wgpu::ShaderModule>,
}

impl StageModule {
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn entry_point(&self) -> &str {
        &self.ir.entry_point
    }
}

struct UniformSlot {
    name: String,
    binding: u32,
    size: u64,
    buffer: wgpu::Buffer,
}

struct Program {
    vertex: Arc<wgpu::ShaderModule>,
    vertex_entry: String,
    fragment: Arc<wgpu::ShaderModule>,
    fragment_entry: String,
    /// Vertex inputs, sorted by location.
    attributes: Vec<(String, u32)>,
    uniforms: Vec<UniformSlot>,
    layout: wgpu::PipelineLayout,
    bind_group: Option<wgpu::BindGroup>,
}

struct Target {
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
}

struct DepthBuffer {
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

/// GL viewport rectangle, origin bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Viewport {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
}

impl Viewport {
    /// Flips to wgpu's top-left origin and clips to the target.
    /// `None` when nothing of the rectangle is visible.
    fn resolve(self, target_width: u32, target_height: u32) -> Option<[f32; 4]> {
        let (tw, th) = (target_width as i64, target_height as i64);
        let left = i64::from(self.x).clamp(0, tw);
        let right = (i64::from(self.x) + i64::from(self.width)).clamp(0, tw);
        let top = (th - i64::from(self.y) - i64::from(self.height)).clamp(0, th);
        let bottom = (th - i64::from(self.y)).clamp(0, th);
        if right <= left || bottom <= top {
            return None;
        }
        Some([
            left as f32,
            top as f32,
            (right - left) as f32,
            (bottom - top) as f32,
        ])
    }
}

struct DrawCommand {
    pipeline: PipelineKey,
    program: ProgramHandle,
    slots: Vec<(BufferHandle, u64)>,
    index_buffer: BufferHandle,
    index_format: wgpu::IndexFormat,
    first_index: u32,
    index_count: u32,
    instance_count: u32,
    viewport: Viewport,
}

#[derive(Default)]
struct PendingFrame {
    clear_color: Option<wgpu::Color>,
    clear_depth: Option<f32>,
    draws: Vec<DrawCommand>,
}

/// [`GraphicsDevice`] over wgpu.
///
/// GL-style state is tracked on the CPU. Each draw captures the pipeline its
/// state implies; `flush` replays the captured draws in one render pass into
/// the view given to [`WgpuDevice::set_target`].
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    next_handle: u64,
    buffers: HashMap<BufferHandle, Option<wgpu::Buffer>>,
    programs: HashMap<ProgramHandle, Program>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,

    array_buffer: Option<BufferHandle>,
    element_buffer: Option<BufferHandle>,
    current_program: Option<ProgramHandle>,
    attributes: BTreeMap<u32, AttributeState>,
    viewport: Viewport,
    clear_color: [f32; 4],
    clear_depth: f32,
    depth_test: bool,
    depth_func: CompareFunction,
    depth_write: bool,

    target: Option<Target>,
    depth: Option<DepthBuffer>,
    pending: PendingFrame,
}

impl WgpuDevice {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        device.on_uncaptured_error(Box::new(|error| {
            tracing::error!(%error, "wgpu validation error");
        }));
        Self {
            device,
            queue,
            next_handle: 1,
            buffers: HashMap::new(),
            programs: HashMap::new(),
            pipelines: HashMap::new(),
            array_buffer: None,
            element_buffer: None,
            current_program: None,
            attributes: BTreeMap::new(),
            viewport: Viewport::default(),
            clear_color: [0.0, 0.0, 0.0, 0.0],
            clear_depth: 1.0,
            depth_test: false,
            depth_func: CompareFunction::Less,
            depth_write: true,
            target: None,
            depth: None,
            pending: PendingFrame::default(),
        }
    }

    pub fn gpu(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Where the next `flush` draws. Consumed by the flush, so set it every
    /// frame before rendering.
    pub fn set_target(
        &mut self,
        view: wgpu::TextureView,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) {
        self.target = Some(Target {
            view,
            format,
            width: width.max(1),
            height: height.max(1),
        });
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_handle;
        self.next_handle += 1;
        id
    }

    fn raw_buffer(&self, handle: BufferHandle) -> Option<&wgpu::Buffer> {
        self.buffers.get(&handle).and_then(Option::as_ref)
    }

    fn create_depth_buffer(device: &wgpu::Device, width: u32, height: u32) -> DepthBuffer {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("monet_depth"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        DepthBuffer {
            view: texture.create_view(&Default::default()),
            width,
            height,
        }
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    key: &PipelineKey,
    program: &Program,
) -> wgpu::RenderPipeline {
    let attributes: Vec<Vec<wgpu::VertexAttribute>> = key
        .layouts
        .iter()
        .map(|layout| {
            layout
                .attributes
                .iter()
                .map(|attr| wgpu::VertexAttribute {
                    format: pipeline::vertex_format(attr.components),
                    offset: u64::from(attr.offset),
                    shader_location: attr.location,
                })
                .collect()
        })
        .collect();
    let buffers: Vec<wgpu::VertexBufferLayout> = key
        .layouts
        .iter()
        .zip(&attributes)
        .map(|(layout, attributes)| wgpu::VertexBufferLayout {
            array_stride: u64::from(layout.stride),
            step_mode: if layout.per_instance {
                wgpu::VertexStepMode::Instance
            } else {
                wgpu::VertexStepMode::Vertex
            },
            attributes,
        })
        .collect();

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("monet_pipeline"),
        layout: Some(&program.layout),
        vertex: wgpu::VertexState {
            module: &program.vertex,
            entry_point: Some(&program.vertex_entry),
            compilation_options: Default::default(),
            buffers: &buffers,
        },
        fragment: Some(wgpu::FragmentState {
            module: &program.fragment,
            entry_point: Some(&program.fragment_entry),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: key.format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: key.depth_write,
            depth_compare: pipeline::compare_function(key.depth_compare),
            stencil: Default::default(),
            bias: Default::default(),
        }),
        multisample: Default::default(),
        multiview: None,
        cache: None,
    })
}

impl GraphicsDevice for WgpuDevice {
    type Buffer = BufferHandle;
    type Shader = StageModule;
    type Program = ProgramHandle;
    type UniformLocation = UniformHandle;

    fn supports_instancing(&self) -> bool {
        true
    }

    fn shading_language(&self) -> ShadingLanguage {
        ShadingLanguage::Wgsl
    }

    fn create_buffer(&mut self) -> Option<BufferHandle> {
        let handle = BufferHandle(self.next_id());
        self.buffers.insert(handle, None);
        Some(handle)
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<&BufferHandle>) {
        let slot = match target {
            BufferTarget::Array => &mut self.array_buffer,
            BufferTarget::ElementArray => &mut self.element_buffer,
        };
        *slot = buffer.copied();
    }

    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        let bound = match target {
            BufferTarget::Array => self.array_buffer,
            BufferTarget::ElementArray => self.element_buffer,
        };
        let Some(handle) = bound else {
            tracing::warn!(?target, "buffer_data with nothing bound; ignored");
            return;
        };
        let Some(entry) = self.buffers.get_mut(&handle) else {
            tracing::warn!(?handle, "buffer_data on a deleted buffer; ignored");
            return;
        };
        // wgpu has no usage hints; every upload gets a fresh allocation.
        tracing::trace!(?handle, bytes = data.len(), ?usage, "buffer upload");
        *entry = Some(
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("monet_buffer"),
                    contents: data,
                    usage: wgpu::BufferUsages::VERTEX
                        | wgpu::BufferUsages::INDEX
                        | wgpu::BufferUsages::COPY_DST,
                }),
        );
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        if let Some(Some(raw)) = self.buffers.remove(&buffer) {
            raw.destroy();
        }
        for bound in [&mut self.array_buffer, &mut self.element_buffer] {
            if *bound == Some(buffer) {
                *bound = None;
            }
        }
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<StageModule, String> {
        let ir = reflect::parse_stage(stage, source)?;
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(match stage {
                    ShaderStage::Vertex => "monet_vertex",
                    ShaderStage::Fragment => "monet_fragment",
                }),
                source: wgpu::ShaderSource::Wgsl(source.to_owned().into()),
            });
        Ok(StageModule {
            stage,
            ir,
            module: Arc::new(module),
        })
    }

    fn delete_shader(&mut self, shader: StageModule) {
        drop(shader);
    }

    fn link_program(
        &mut self,
        vertex: &StageModule,
        fragment: &StageModule,
    ) -> Result<ProgramHandle, String> {
        if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
            return Err(format!(
                "expected vertex and fragment stages, got {} and {}",
                vertex.stage, fragment.stage
            ));
        }
        let decls = reflect::link(&vertex.ir, &fragment.ir)?;

        let uniforms: Vec<UniformSlot> = decls
            .into_iter()
            .map(|decl| {
                let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&decl.name),
                    size: decl.size.max(16).next_multiple_of(16),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                UniformSlot {
                    name: decl.name,
                    binding: decl.binding,
                    size: decl.size,
                    buffer,
                }
            })
            .collect();

        let layout_entries: Vec<wgpu::BindGroupLayoutEntry> = uniforms
            .iter()
            .map(|slot| wgpu::BindGroupLayoutEntry {
                binding: slot.binding,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();
        let bind_group_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("monet_uniform_layout"),
                entries: &layout_entries,
            });
        let bind_group = (!uniforms.is_empty()).then(|| {
            let entries: Vec<wgpu::BindGroupEntry> = uniforms
                .iter()
                .map(|slot| wgpu::BindGroupEntry {
                    binding: slot.binding,
                    resource: slot.buffer.as_entire_binding(),
                })
                .collect();
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("monet_uniforms"),
                layout: &bind_group_layout,
                entries: &entries,
            })
        });
        let layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("monet_pipeline_layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let mut attributes = reflect::inputs(&vertex.ir);
        attributes.sort_by_key(|(_, location)| *location);

        let handle = ProgramHandle(self.next_id());
        self.programs.insert(
            handle,
            Program {
                vertex: Arc::clone(&vertex.module),
                vertex_entry: vertex.ir.entry_point.clone(),
                fragment: Arc::clone(&fragment.module),
                fragment_entry: fragment.ir.entry_point.clone(),
                attributes,
                uniforms,
                layout,
                bind_group,
            },
        );
        tracing::debug!(?handle, "linked program");
        Ok(handle)
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
        self.pipelines.retain(|key, _| key.program != program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn uniform_location(&mut self, program: &ProgramHandle, name: &str) -> Option<UniformHandle> {
        let slot = self
            .programs
            .get(program)?
            .uniforms
            .iter()
            .find(|slot| slot.name == name)?;
        Some(UniformHandle {
            program: *program,
            binding: slot.binding,
        })
    }

    fn attrib_location(&mut self, program: &ProgramHandle, name: &str) -> Option<u32> {
        self.programs
            .get(program)?
            .attributes
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, location)| *location)
    }

    fn use_program(&mut self, program: Option<&ProgramHandle>) {
        self.current_program = program.copied();
    }

    fn uniform_matrix4(&mut self, location: &UniformHandle, matrix: &[f32; 16]) {
        let Some(slot) = self
            .programs
            .get(&location.program)
            .and_then(|p| p.uniforms.iter().find(|s| s.binding == location.binding))
        else {
            tracing::warn!(?location, "uniform upload to a deleted program; ignored");
            return;
        };
        if slot.size < 64 {
            tracing::warn!(name = %slot.name, size = slot.size, "uniform too small for a mat4x4; ignored");
            return;
        }
        self.queue
            .write_buffer(&slot.buffer, 0, bytemuck::bytes_of(matrix));
    }

    fn viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.viewport = Viewport {
            x,
            y,
            width,
            height,
        };
    }

    fn clear_color(&mut self, rgba: [f32; 4]) {
        self.clear_color = rgba;
    }

    fn clear_depth(&mut self, depth: f32) {
        self.clear_depth = depth;
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.depth_test = enabled;
    }

    fn depth_func(&mut self, func: CompareFunction) {
        self.depth_func = func;
    }

    fn depth_mask(&mut self, write: bool) {
        self.depth_write = write;
    }

    fn clear(&mut self, mask: ClearMask) {
        if !self.pending.draws.is_empty() {
            // A full clear paints over them anyway.
            tracing::debug!(dropped = self.pending.draws.len(), "clear after draws");
            self.pending.draws.clear();
        }
        if mask.color {
            let [r, g, b, a] = self.clear_color.map(f64::from);
            self.pending.clear_color = Some(wgpu::Color { r, g, b, a });
        }
        if mask.depth {
            self.pending.clear_depth = Some(self.clear_depth);
        }
    }

    fn vertex_attrib_pointer(&mut self, location: u32, pointer: AttribPointer) {
        let Some(buffer) = self.array_buffer else {
            tracing::warn!(location, "vertex_attrib_pointer with no array buffer bound");
            return;
        };
        self.attributes.entry(location).or_default().pointer = Some((buffer, pointer));
    }

    fn enable_vertex_attrib_array(&mut self, location: u32) {
        self.attributes.entry(location).or_default().enabled = true;
    }

    fn vertex_attrib_divisor(&mut self, location: u32, divisor: u32) {
        self.attributes.entry(location).or_default().divisor = divisor;
    }

    fn draw_elements_instanced(&mut self, draw: DrawIndexedInstanced) {
        let Some(program_handle) = self.current_program else {
            tracing::warn!("draw with no program in use; skipped");
            return;
        };
        let Some(program) = self.programs.get(&program_handle) else {
            tracing::warn!(?program_handle, "draw with a deleted program; skipped");
            return;
        };
        let Some(format) = self.target.as_ref().map(|t| t.format) else {
            tracing::warn!("draw before set_target; skipped");
            return;
        };
        let Some(index_buffer) = self.element_buffer else {
            tracing::warn!("draw with no element buffer bound; skipped");
            return;
        };

        let locations: Vec<u32> = program.attributes.iter().map(|(_, loc)| *loc).collect();
        let slots = match pipeline::vertex_slots(&self.attributes, &locations) {
            Ok(slots) => slots,
            Err(reason) => {
                tracing::warn!(%reason, "draw skipped");
                return;
            }
        };

        let (depth_write, depth_compare) =
            pipeline::depth_state(self.depth_test, self.depth_func, self.depth_write);
        let key = PipelineKey {
            program: program_handle,
            format,
            depth_write,
            depth_compare,
            layouts: slots.iter().map(|slot| slot.layout.clone()).collect(),
        };
        if !self.pipelines.contains_key(&key) {
            let created = create_pipeline(&self.device, &key, program);
            tracing::debug!(?program_handle, ?depth_compare, depth_write, "pipeline created");
            self.pipelines.insert(key.clone(), created);
        }

        let index_format = match draw.index_format {
            IndexFormat::U16 => wgpu::IndexFormat::Uint16,
            IndexFormat::U32 => wgpu::IndexFormat::Uint32,
        };
        self.pending.draws.push(DrawCommand {
            pipeline: key,
            program: program_handle,
            slots: slots
                .into_iter()
                .map(|VertexSlot { buffer, base, .. }| (buffer, base))
                .collect(),
            index_buffer,
            index_format,
            first_index: draw.offset / draw.index_format.size(),
            index_count: draw.index_count,
            instance_count: draw.instance_count,
            viewport: self.viewport,
        });
    }

    fn flush(&mut self) {
        let frame = std::mem::take(&mut self.pending);
        let Some(target) = self.target.take() else {
            if !frame.draws.is_empty() {
                tracing::warn!(draws = frame.draws.len(), "flush with no target; draws dropped");
            }
            return;
        };

        if self
            .depth
            .as_ref()
            .is_none_or(|d| d.width != target.width || d.height != target.height)
        {
            self.depth = Some(Self::create_depth_buffer(
                &self.device,
                target.width,
                target.height,
            ));
        }
        let Some(depth) = &self.depth else {
            return;
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("monet_encoder"),
            });
        let mut skipped = 0usize;
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("monet_frame_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: frame
                            .clear_color
                            .map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: frame
                            .clear_depth
                            .map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            for draw in &frame.draws {
                let (Some(pipeline), Some(program)) = (
                    self.pipelines.get(&draw.pipeline),
                    self.programs.get(&draw.program),
                ) else {
                    skipped += 1;
                    continue;
                };
                let vertex_buffers: Option<Vec<(&wgpu::Buffer, u64)>> = draw
                    .slots
                    .iter()
                    .map(|(handle, base)| {
                        self.raw_buffer(*handle)
                            .filter(|raw| raw.size() > *base)
                            .map(|raw| (raw, *base))
                    })
                    .collect();
                let index_buffer = self
                    .raw_buffer(draw.index_buffer)
                    .filter(|raw| raw.size() > 0);
                let viewport = draw.viewport.resolve(target.width, target.height);
                let (Some(vertex_buffers), Some(index_buffer), Some([x, y, w, h])) =
                    (vertex_buffers, index_buffer, viewport)
                else {
                    skipped += 1;
                    continue;
                };

                pass.set_viewport(x, y, w, h, 0.0, 1.0);
                pass.set_pipeline(pipeline);
                if let Some(bind_group) = &program.bind_group {
                    pass.set_bind_group(0, bind_group, &[]);
                }
                for (slot, (buffer, base)) in vertex_buffers.into_iter().enumerate() {
                    pass.set_vertex_buffer(slot as u32, buffer.slice(base..));
                }
                pass.set_index_buffer(index_buffer.slice(..), draw.index_format);
                pass.draw_indexed(
                    draw.first_index..draw.first_index + draw.index_count,
                    0,
                    0..draw.instance_count,
                );
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        if skipped > 0 {
            tracing::warn!(skipped, "draws referenced deleted or empty buffers");
        }
        tracing::trace!(draws = frame.draws.len(), "frame submitted");
    }
}
