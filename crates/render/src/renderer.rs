use crate::builtin;
use crate::cache::ResourceCache;
use crate::device::{
    AttribPointer, BufferTarget, BufferUsage, ClearMask, CompareFunction, DrawIndexedInstanced,
    GraphicsDevice, IndexFormat, Topology,
};
use crate::error::{InitError, RenderError, ShaderKey};
use crate::shader::{ShaderError, ShaderProgram, compile_program};
use monet_common::{
    Batch, FrameParams, Instance, InstanceBlockId, Layer, Mesh, MeshId, Registry, ResourceId,
    ShaderChoice, ShaderSource,
};
use serde::{Deserialize, Serialize};

/// What happens to a shader that failed to compile or link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaderFailurePolicy {
    /// Nothing is cached; every frame compiles again and reports again.
    #[default]
    Retry,
    /// The failure is cached until the shader id is released.
    Remember,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub shader_failure_policy: ShaderFailurePolicy,
    pub buffer_usage: BufferUsage,
}

/// GPU buffers for one mesh. A `None` buffer means allocation failed; the
/// mesh is then skipped rather than drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedMesh<B> {
    pub vertices: Option<B>,
    pub indices: Option<B>,
    pub index_count: u32,
}

enum ShaderSlot<D: GraphicsDevice> {
    Ready(ShaderProgram<D>),
    Failed(ShaderError),
}

/// Counters for one `render_frame` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    pub draw_calls: u32,
    pub program_switches: u32,
    pub skipped_batches: u32,
    pub instances: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub meshes: usize,
    pub instance_blocks: usize,
    pub shaders: usize,
    pub uploads: u64,
}

/// Draws ordered layers of instanced batches, uploading each registered
/// object at most once and reusing its GPU counterpart across frames.
///
/// Owns the device: all GPU state goes through it, one frame at a time.
pub struct FrameRenderer<D: GraphicsDevice> {
    device: D,
    config: RendererConfig,
    solid_color: ShaderSource,
    meshes: ResourceCache<MeshId, LoadedMesh<D::Buffer>>,
    instances: ResourceCache<InstanceBlockId, Option<D::Buffer>>,
    shaders: ResourceCache<ShaderKey, ShaderSlot<D>>,
    errors: Vec<RenderError>,
    frames: u64,
}

fn record(errors: &mut Vec<RenderError>, error: RenderError) {
    tracing::warn!("{error}");
    errors.push(error);
}

fn upload_buffer<D: GraphicsDevice>(
    device: &mut D,
    target: BufferTarget,
    data: &[u8],
    usage: BufferUsage,
) -> Option<D::Buffer> {
    let buffer = device.create_buffer()?;
    device.bind_buffer(target, Some(&buffer));
    device.buffer_data(target, data, usage);
    Some(buffer)
}

fn upload_mesh<D: GraphicsDevice>(
    device: &mut D,
    mesh: &Mesh,
    usage: BufferUsage,
) -> LoadedMesh<D::Buffer> {
    let vertices = upload_buffer(device, BufferTarget::Array, mesh.vertex_bytes(), usage);
    let indices = upload_buffer(device, BufferTarget::ElementArray, mesh.index_bytes(), usage);
    tracing::debug!(
        vertices = mesh.vertex_count(),
        indices = mesh.index_count(),
        "mesh uploaded"
    );
    LoadedMesh {
        vertices,
        indices,
        index_count: mesh.index_count(),
    }
}

/// Configures one float attribute from the bound array buffer. Names the
/// program does not use are skipped.
fn bind_attribute<D: GraphicsDevice>(
    device: &mut D,
    location: Option<u32>,
    pointer: AttribPointer,
    divisor: u32,
    name: &str,
) {
    let Some(location) = location else {
        tracing::trace!(name, "attribute not used by program");
        return;
    };
    device.vertex_attrib_pointer(location, pointer);
    device.enable_vertex_attrib_array(location);
    device.vertex_attrib_divisor(location, divisor);
}

impl<D: GraphicsDevice> FrameRenderer<D> {
    /// Takes ownership of an acquired device. Fails when the device cannot
    /// draw instanced geometry.
    pub fn initialize(device: D, config: RendererConfig) -> Result<Self, InitError> {
        if !device.supports_instancing() {
            return Err(InitError::InstancingUnsupported);
        }
        let language = device.shading_language();
        tracing::info!(?language, ?config, "frame renderer initialized");

        Ok(Self {
            solid_color: builtin::solid_color(language),
            device,
            config,
            meshes: ResourceCache::new(),
            instances: ResourceCache::new(),
            shaders: ResourceCache::new(),
            errors: Vec::new(),
            frames: 0,
        })
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Problems recorded during the most recent frame.
    pub fn errors(&self) -> &[RenderError] {
        &self.errors
    }

    pub fn take_errors(&mut self) -> Vec<RenderError> {
        std::mem::take(&mut self.errors)
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            meshes: self.meshes.len(),
            instance_blocks: self.instances.len(),
            shaders: self.shaders.len(),
            uploads: self.meshes.upload_count()
                + self.instances.upload_count()
                + self.shaders.upload_count(),
        }
    }

    /// Draws one frame. Layers are drawn in the order given.
    ///
    /// Shader failures, malformed instance blocks and dangling ids skip the
    /// affected layer or batch and are recorded in [`FrameRenderer::errors`].
    pub fn render_frame(
        &mut self,
        registry: &Registry,
        params: &FrameParams,
        layers: &[Layer],
    ) -> FrameStats {
        self.errors.clear();
        self.frames += 1;
        let mut stats = FrameStats::default();

        let (width, height) = params.physical_size();
        self.device.viewport(0, 0, width, height);
        self.device.clear_color(params.clear_color);
        self.device.clear_depth(1.0);
        self.device.set_depth_test(true);
        self.device.depth_func(CompareFunction::LessEqual);
        self.device.clear(ClearMask::COLOR_AND_DEPTH);

        let view = params.view.to_cols_array();
        let perspective = params.perspective.to_cols_array();
        let mut previous: Option<D::Program> = None;

        for layer in layers {
            let Some(program) = self.resolve_shader(registry, layer.shader) else {
                stats.skipped_batches += layer.batches.len() as u32;
                continue;
            };

            if previous.as_ref() != Some(&program.program) {
                self.device.use_program(Some(&program.program));
                if let Some(location) = &program.locations.view {
                    self.device.uniform_matrix4(location, &view);
                }
                if let Some(location) = &program.locations.perspective {
                    self.device.uniform_matrix4(location, &perspective);
                }
                previous = Some(program.program.clone());
                stats.program_switches += 1;
            }

            if layer.decal {
                self.device.depth_mask(false);
                self.device.depth_func(CompareFunction::Always);
            } else {
                self.device.depth_mask(true);
                self.device.depth_func(CompareFunction::Less);
            }

            for batch in &layer.batches {
                if !self.draw_batch(registry, &program, batch, &mut stats) {
                    stats.skipped_batches += 1;
                }
            }
        }

        self.device.flush();
        tracing::trace!(frame = self.frames, ?stats, "frame rendered");
        stats
    }

    fn resolve_shader(
        &mut self,
        registry: &Registry,
        choice: ShaderChoice,
    ) -> Option<ShaderProgram<D>> {
        let (key, source) = match choice {
            ShaderChoice::Default => (ShaderKey::SolidColor, &self.solid_color),
            ShaderChoice::Explicit(id) => match registry.shader(id) {
                Some(source) => (ShaderKey::Registered(id), source),
                None => {
                    record(&mut self.errors, RenderError::UnknownResource(id.into()));
                    return None;
                }
            },
        };

        let device = &mut self.device;
        let slot = match self.config.shader_failure_policy {
            ShaderFailurePolicy::Retry => self.shaders.try_resolve_with(key, || {
                compile_program(device, source).map(ShaderSlot::Ready)
            }),
            ShaderFailurePolicy::Remember => Ok(self.shaders.resolve_with(key, || {
                match compile_program(device, source) {
                    Ok(program) => ShaderSlot::Ready(program),
                    Err(error) => ShaderSlot::Failed(error),
                }
            })),
        };

        let error = match slot {
            Ok(ShaderSlot::Ready(program)) => return Some(program.clone()),
            Ok(ShaderSlot::Failed(error)) => error.clone(),
            Err(error) => error,
        };
        record(
            &mut self.errors,
            RenderError::Shader {
                shader: key,
                source: error,
            },
        );
        None
    }

    /// Issues one instanced draw for `batch`. Returns `false` when skipped.
    fn draw_batch(
        &mut self,
        registry: &Registry,
        program: &ShaderProgram<D>,
        batch: &Batch,
        stats: &mut FrameStats,
    ) -> bool {
        let Some(mesh_id) = batch.mesh else {
            return false;
        };
        let Some(block) = registry.instances(batch.instances) else {
            record(&mut self.errors, RenderError::UnknownResource(batch.instances.into()));
            return false;
        };
        if block.is_empty() {
            return false;
        }
        let Some(instance_count) = block.instance_count() else {
            record(
                &mut self.errors,
                RenderError::MalformedInstances {
                    block: batch.instances,
                    len: block.len(),
                },
            );
            return false;
        };
        let Some(mesh) = registry.mesh(mesh_id) else {
            record(&mut self.errors, RenderError::UnknownResource(mesh_id.into()));
            return false;
        };

        let usage = self.config.buffer_usage;
        let loaded = self
            .meshes
            .resolve_with(mesh_id, || upload_mesh(&mut self.device, mesh, usage));
        let (Some(vertices), Some(indices)) = (loaded.vertices.clone(), loaded.indices.clone())
        else {
            return false;
        };
        let index_count = loaded.index_count;

        let instance_buffer = self.instances.resolve_with(batch.instances, || {
            upload_buffer(&mut self.device, BufferTarget::Array, block.as_bytes(), usage)
        });
        let Some(instance_buffer) = instance_buffer.clone() else {
            return false;
        };

        let device = &mut self.device;
        let locations = &program.locations;

        device.bind_buffer(BufferTarget::Array, Some(&vertices));
        bind_attribute(
            device,
            locations.position,
            AttribPointer::floats(3, 0, 0),
            0,
            "position",
        );
        device.bind_buffer(BufferTarget::ElementArray, Some(&indices));

        device.bind_buffer(BufferTarget::Array, Some(&instance_buffer));
        bind_attribute(
            device,
            locations.instance_position,
            AttribPointer::floats(3, Instance::STRIDE, Instance::POSITION_OFFSET),
            1,
            "instance_position",
        );
        bind_attribute(
            device,
            locations.instance_direction,
            AttribPointer::floats(2, Instance::STRIDE, Instance::DIRECTION_OFFSET),
            1,
            "instance_direction",
        );
        bind_attribute(
            device,
            locations.instance_color,
            AttribPointer::floats(3, Instance::STRIDE, Instance::COLOR_OFFSET),
            1,
            "instance_color",
        );

        device.draw_elements_instanced(DrawIndexedInstanced {
            topology: Topology::TriangleList,
            index_count,
            index_format: IndexFormat::U32,
            offset: 0,
            instance_count,
        });
        stats.draw_calls += 1;
        stats.instances += u64::from(instance_count);
        true
    }

    /// Evicts the cache entry for `id` and deletes its GPU objects. Returns
    /// whether anything was cached. Call alongside removing `id` from the
    /// registry; nothing is freed implicitly.
    pub fn release(&mut self, id: ResourceId) -> bool {
        match id {
            ResourceId::Mesh(id) => match self.meshes.remove(id) {
                Some(mesh) => {
                    self.delete_mesh(mesh);
                    true
                }
                None => false,
            },
            ResourceId::Instances(id) => match self.instances.remove(id) {
                Some(buffer) => {
                    if let Some(buffer) = buffer {
                        self.device.delete_buffer(buffer);
                    }
                    true
                }
                None => false,
            },
            ResourceId::Shader(id) => match self.shaders.remove(ShaderKey::Registered(id)) {
                Some(slot) => {
                    if let ShaderSlot::Ready(program) = slot {
                        self.device.delete_program(program.program);
                    }
                    true
                }
                None => false,
            },
        }
    }

    fn delete_mesh(&mut self, mesh: LoadedMesh<D::Buffer>) {
        if let Some(buffer) = mesh.vertices {
            self.device.delete_buffer(buffer);
        }
        if let Some(buffer) = mesh.indices {
            self.device.delete_buffer(buffer);
        }
    }

    /// Deletes every cached GPU object and hands the device back.
    pub fn shutdown(mut self) -> D {
        let meshes: Vec<_> = self.meshes.drain().map(|(_, mesh)| mesh).collect();
        for mesh in meshes {
            self.delete_mesh(mesh);
        }
        for (_, buffer) in self.instances.drain() {
            if let Some(buffer) = buffer {
                self.device.delete_buffer(buffer);
            }
        }
        for (_, slot) in self.shaders.drain() {
            if let ShaderSlot::Ready(program) = slot {
                self.device.delete_program(program.program);
            }
        }
        tracing::info!(frames = self.frames, "frame renderer shut down");
        self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ShaderStage;
    use crate::recording::{Call, RecordingDevice};
    use monet_common::{InstanceBlock, ShaderSource};

    fn unit_quad() -> Mesh {
        Mesh::from_positions(
            &[
                [-0.5, -0.5, 0.0],
                [0.5, -0.5, 0.0],
                [0.5, 0.5, 0.0],
                [-0.5, 0.5, 0.0],
            ],
            vec![0, 1, 2, 2, 3, 0],
        )
    }

    fn one_white_instance() -> InstanceBlock {
        InstanceBlock::from_instances(&[Instance::new([0.0; 3], [1.0, 0.0], [1.0; 3])])
    }

    fn renderer() -> FrameRenderer<RecordingDevice> {
        FrameRenderer::initialize(RecordingDevice::new(), RendererConfig::default()).unwrap()
    }

    fn render(
        renderer: &mut FrameRenderer<RecordingDevice>,
        registry: &Registry,
        layers: &[Layer],
    ) -> (FrameStats, Vec<Call>) {
        renderer.device_mut().take_calls();
        let stats = renderer.render_frame(registry, &FrameParams::default(), layers);
        (stats, renderer.device_mut().take_calls())
    }

    fn count(calls: &[Call], pred: impl Fn(&Call) -> bool) -> usize {
        calls.iter().filter(|c| pred(c)).count()
    }

    #[test]
    fn initialize_requires_instancing() {
        let result =
            FrameRenderer::initialize(RecordingDevice::without_instancing(), RendererConfig::default());
        assert!(matches!(result, Err(InitError::InstancingUnsupported)));
    }

    #[test]
    fn basic_frame_draws_once_with_default_program() {
        let mut registry = Registry::new();
        let mesh = registry.insert_mesh(unit_quad());
        let block = registry.insert_instances(one_white_instance());
        let layers = [Layer::new().with_batch(Batch::new(mesh, block))];

        let mut renderer = renderer();
        let (stats, calls) = render(&mut renderer, &registry, &layers);

        let draws: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                Call::DrawElementsInstanced { program, draw } => Some((*program, *draw)),
                _ => None,
            })
            .collect();
        assert_eq!(draws.len(), 1);
        let (program, draw) = draws[0];
        assert_eq!(draw.index_count, 6);
        assert_eq!(draw.instance_count, 1);
        assert_eq!(draw.topology, Topology::TriangleList);
        assert_eq!(draw.index_format, IndexFormat::U32);

        let linked = calls.iter().find_map(|c| match c {
            Call::LinkProgram(Some(id)) => Some(*id),
            _ => None,
        });
        assert_eq!(program, linked);
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(stats.program_switches, 1);
        assert!(renderer.errors().is_empty());
    }

    #[test]
    fn frame_preamble_order() {
        let registry = Registry::new();
        let mut renderer = renderer();
        let params = FrameParams {
            width: 320.0,
            height: 200.0,
            pixel_ratio: 2.0,
            clear_color: [0.1, 0.2, 0.3, 1.0],
            ..FrameParams::default()
        };
        renderer.render_frame(&registry, &params, &[]);

        assert_eq!(
            renderer.device().calls(),
            &[
                Call::Viewport {
                    x: 0,
                    y: 0,
                    width: 640,
                    height: 400
                },
                Call::ClearColor([0.1, 0.2, 0.3, 1.0]),
                Call::ClearDepth(1.0),
                Call::DepthTest(true),
                Call::DepthFunc(CompareFunction::LessEqual),
                Call::Clear(ClearMask::COLOR_AND_DEPTH),
                Call::Flush,
            ]
        );
    }

    #[test]
    fn mesh_uploaded_once_across_frames() {
        let mut registry = Registry::new();
        let mesh = registry.insert_mesh(unit_quad());
        let block = registry.insert_instances(one_white_instance());
        let layers = [Layer::new().with_batch(Batch::new(mesh, block))];

        let mut renderer = renderer();
        let (_, first) = render(&mut renderer, &registry, &layers);
        let buffer_data = |calls: &[Call]| count(calls, |c| matches!(c, Call::BufferData { .. }));
        assert_eq!(buffer_data(&first), 3);

        for _ in 0..4 {
            let (stats, calls) = render(&mut renderer, &registry, &layers);
            assert_eq!(buffer_data(&calls), 0);
            assert_eq!(count(&calls, |c| matches!(c, Call::CreateBuffer(_))), 0);
            assert_eq!(count(&calls, |c| matches!(c, Call::LinkProgram(_))), 0);
            assert_eq!(stats.draw_calls, 1);
        }
        assert_eq!(
            renderer.cache_stats(),
            CacheStats {
                meshes: 1,
                instance_blocks: 1,
                shaders: 1,
                uploads: 3,
            }
        );
    }

    #[test]
    fn identical_meshes_are_cached_separately() {
        let mut registry = Registry::new();
        let a = registry.insert_mesh(unit_quad());
        let b = registry.insert_mesh(unit_quad());
        let block = registry.insert_instances(one_white_instance());
        let layers = [Layer::new()
            .with_batch(Batch::new(a, block))
            .with_batch(Batch::new(b, block))];

        let mut renderer = renderer();
        let (stats, calls) = render(&mut renderer, &registry, &layers);

        // two meshes x (vertices + indices) + one shared instance block
        assert_eq!(count(&calls, |c| matches!(c, Call::CreateBuffer(_))), 5);
        assert_eq!(renderer.cache_stats().meshes, 2);
        assert_eq!(renderer.cache_stats().instance_blocks, 1);
        assert_eq!(stats.draw_calls, 2);
    }

    #[test]
    fn shared_program_switches_once() {
        let mut registry = Registry::new();
        let mesh = registry.insert_mesh(unit_quad());
        let block = registry.insert_instances(one_white_instance());
        let layers: Vec<Layer> = (0..4)
            .map(|i| {
                Layer::new()
                    .decal(i % 2 == 0)
                    .with_batch(Batch::new(mesh, block))
            })
            .collect();

        let mut renderer = renderer();
        let (stats, calls) = render(&mut renderer, &registry, &layers);

        assert_eq!(count(&calls, |c| matches!(c, Call::UseProgram(_))), 1);
        assert_eq!(count(&calls, |c| matches!(c, Call::UniformMatrix4 { .. })), 2);
        assert_eq!(stats.program_switches, 1);
        assert_eq!(stats.draw_calls, 4);
    }

    #[test]
    fn program_change_reuploads_uniforms() {
        let mut registry = Registry::new();
        let mesh = registry.insert_mesh(unit_quad());
        let block = registry.insert_instances(one_white_instance());
        let custom = registry.insert_shader(builtin::solid_color(crate::ShadingLanguage::Glsl));
        let layers = [
            Layer::new().with_batch(Batch::new(mesh, block)),
            Layer::new().with_shader(custom).with_batch(Batch::new(mesh, block)),
            Layer::new().with_shader(custom).with_batch(Batch::new(mesh, block)),
            Layer::new().with_batch(Batch::new(mesh, block)),
        ];

        let mut renderer = renderer();
        let view = glam::Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        let params = FrameParams {
            view,
            ..FrameParams::default()
        };
        renderer.render_frame(&registry, &params, &layers);
        let calls = renderer.device().calls();

        assert_eq!(count(calls, |c| matches!(c, Call::UseProgram(_))), 3);
        assert_eq!(count(calls, |c| matches!(c, Call::UniformMatrix4 { .. })), 6);
        assert!(calls.iter().any(|c| matches!(
            c,
            Call::UniformMatrix4 { matrix, .. } if *matrix == view.to_cols_array()
        )));
    }

    #[test]
    fn decal_then_opaque_depth_policy() {
        let mut registry = Registry::new();
        let mesh = registry.insert_mesh(unit_quad());
        let block = registry.insert_instances(one_white_instance());
        let layers = [
            Layer::new().decal(true).with_batch(Batch::new(mesh, block)),
            Layer::new().with_batch(Batch::new(mesh, block)),
        ];

        let mut renderer = renderer();
        let (_, calls) = render(&mut renderer, &registry, &layers);

        let policy: Vec<&Call> = calls
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    Call::DepthMask(_) | Call::DepthFunc(_) | Call::DrawElementsInstanced { .. }
                )
            })
            .collect();
        assert!(matches!(
            policy.as_slice(),
            [
                Call::DepthFunc(CompareFunction::LessEqual),
                Call::DepthMask(false),
                Call::DepthFunc(CompareFunction::Always),
                Call::DrawElementsInstanced { .. },
                Call::DepthMask(true),
                Call::DepthFunc(CompareFunction::Less),
                Call::DrawElementsInstanced { .. },
            ]
        ));
    }

    #[test]
    fn skip_conditions_issue_no_draws() {
        let mut registry = Registry::new();
        let mesh = registry.insert_mesh(unit_quad());
        let empty = registry.insert_instances(InstanceBlock::default());
        let full = registry.insert_instances(one_white_instance());
        let layers = [Layer::new()
            .with_batch(Batch {
                mesh: None,
                instances: full,
            })
            .with_batch(Batch::new(mesh, empty))];

        let mut renderer = renderer();
        let (stats, calls) = render(&mut renderer, &registry, &layers);

        assert_eq!(count(&calls, |c| matches!(c, Call::DrawElementsInstanced { .. })), 0);
        assert_eq!(count(&calls, |c| matches!(c, Call::CreateBuffer(_))), 0);
        assert_eq!(stats.skipped_batches, 2);
        assert!(renderer.errors().is_empty());
    }

    #[test]
    fn instance_count_from_block_length() {
        let mut registry = Registry::new();
        let mesh = registry.insert_mesh(unit_quad());
        let block = registry.insert_instances(InstanceBlock::from_raw(vec![0.5; 40]));
        let layers = [Layer::new().with_batch(Batch::new(mesh, block))];

        let mut renderer = renderer();
        let stats = renderer.render_frame(&registry, &FrameParams::default(), &layers);

        assert_eq!(stats.instances, 5);
        let draws = renderer.device().draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].1.instance_count, 5);
    }

    #[test]
    fn malformed_block_is_discarded_with_diagnostic() {
        let mut registry = Registry::new();
        let mesh = registry.insert_mesh(unit_quad());
        let block = registry.insert_instances(InstanceBlock::from_raw(vec![0.0; 12]));
        let layers = [Layer::new().with_batch(Batch::new(mesh, block))];

        let mut renderer = renderer();
        let (stats, calls) = render(&mut renderer, &registry, &layers);

        assert_eq!(count(&calls, |c| matches!(c, Call::DrawElementsInstanced { .. })), 0);
        assert_eq!(stats.skipped_batches, 1);
        assert_eq!(
            renderer.errors(),
            &[RenderError::MalformedInstances { block, len: 12 }]
        );
    }

    #[test]
    fn attribute_layout_and_divisors() {
        let mut registry = Registry::new();
        let mesh = registry.insert_mesh(unit_quad());
        let block = registry.insert_instances(one_white_instance());
        let layers = [Layer::new().with_batch(Batch::new(mesh, block))];

        let mut renderer = renderer();
        let (_, calls) = render(&mut renderer, &registry, &layers);

        let pointers: Vec<AttribPointer> = calls
            .iter()
            .filter_map(|c| match c {
                Call::VertexAttribPointer { pointer, .. } => Some(*pointer),
                _ => None,
            })
            .collect();
        assert_eq!(
            pointers,
            vec![
                AttribPointer::floats(3, 0, 0),
                AttribPointer::floats(3, 32, 0),
                AttribPointer::floats(2, 32, 12),
                AttribPointer::floats(3, 32, 20),
            ]
        );

        let divisors: Vec<u32> = calls
            .iter()
            .filter_map(|c| match c {
                Call::VertexAttribDivisor { divisor, .. } => Some(*divisor),
                _ => None,
            })
            .collect();
        assert_eq!(divisors, vec![0, 1, 1, 1]);

        // position reads the vertex buffer, instance attributes the instance buffer
        let sources: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                Call::VertexAttribPointer { buffer, .. } => *buffer,
                _ => None,
            })
            .collect();
        assert_ne!(sources[0], sources[1]);
        assert!(sources[1..].iter().all(|b| *b == sources[1]));
    }

    #[test]
    fn vertex_compile_failure_skips_layer_and_retries() {
        let mut registry = Registry::new();
        let mesh = registry.insert_mesh(unit_quad());
        let block = registry.insert_instances(one_white_instance());
        let broken = registry.insert_shader(ShaderSource::new(
            "void main( {",
            builtin::SOLID_COLOR_GLSL_FRAGMENT,
        ));
        let layers = [Layer::new()
            .with_shader(broken)
            .with_batch(Batch::new(mesh, block))];

        let mut renderer = renderer();
        for _ in 0..2 {
            let (stats, calls) = render(&mut renderer, &registry, &layers);
            assert_eq!(stats.draw_calls, 0);
            assert_eq!(stats.skipped_batches, 1);
            assert_eq!(
                count(&calls, |c| matches!(c, Call::CompileShader { stage: ShaderStage::Vertex, .. })),
                1
            );
            let errors = renderer.errors();
            assert_eq!(errors.len(), 1);
            let shader_error = errors[0].shader_error().unwrap();
            assert_eq!(shader_error.stage(), Some(ShaderStage::Vertex));
        }
    }

    #[test]
    fn remember_policy_compiles_failed_shader_once() {
        let mut registry = Registry::new();
        let mesh = registry.insert_mesh(unit_quad());
        let block = registry.insert_instances(one_white_instance());
        let broken = registry.insert_shader(ShaderSource::new("", ""));
        let layers = [Layer::new()
            .with_shader(broken)
            .with_batch(Batch::new(mesh, block))];

        let config = RendererConfig {
            shader_failure_policy: ShaderFailurePolicy::Remember,
            ..RendererConfig::default()
        };
        let mut renderer = FrameRenderer::initialize(RecordingDevice::new(), config).unwrap();
        let (_, first) = render(&mut renderer, &registry, &layers);
        let (_, second) = render(&mut renderer, &registry, &layers);

        let compiles = |calls: &[Call]| count(calls, |c| matches!(c, Call::CompileShader { .. }));
        assert_eq!(compiles(&first), 1);
        assert_eq!(compiles(&second), 0);
        assert_eq!(renderer.errors().len(), 1);

        // releasing the id forgets the failure
        assert!(renderer.release(broken.into()));
        let (_, third) = render(&mut renderer, &registry, &layers);
        assert_eq!(compiles(&third), 1);
    }

    #[test]
    fn failed_layer_does_not_disturb_following_layers() {
        let mut registry = Registry::new();
        let mesh = registry.insert_mesh(unit_quad());
        let block = registry.insert_instances(one_white_instance());
        let broken = registry.insert_shader(ShaderSource::new("void main() {}", "oops {"));
        let layers = [
            Layer::new().with_batch(Batch::new(mesh, block)),
            Layer::new().with_shader(broken).with_batch(Batch::new(mesh, block)),
            Layer::new().with_batch(Batch::new(mesh, block)),
        ];

        let mut renderer = renderer();
        let (stats, _) = render(&mut renderer, &registry, &layers);

        assert_eq!(stats.draw_calls, 2);
        assert_eq!(stats.program_switches, 1);
        assert_eq!(
            renderer.errors()[0].shader_error().and_then(ShaderError::stage),
            Some(ShaderStage::Fragment)
        );
    }

    #[test]
    fn missing_buffers_skip_without_error() {
        let mut registry = Registry::new();
        let mesh = registry.insert_mesh(unit_quad());
        let block = registry.insert_instances(one_white_instance());
        let layers = [Layer::new().with_batch(Batch::new(mesh, block))];

        let mut renderer = renderer();
        renderer.device_mut().set_out_of_memory(true);
        let (stats, calls) = render(&mut renderer, &registry, &layers);

        assert_eq!(count(&calls, |c| matches!(c, Call::DrawElementsInstanced { .. })), 0);
        assert_eq!(stats.skipped_batches, 1);
        assert!(renderer.errors().is_empty());
    }

    #[test]
    fn missing_attribute_is_not_bound() {
        let mut registry = Registry::new();
        let mesh = registry.insert_mesh(unit_quad());
        let block = registry.insert_instances(one_white_instance());
        let flat = registry.insert_shader(ShaderSource::new(
            "uniform mat4 view;\nuniform mat4 perspective;\nattribute vec3 position;\nattribute vec3 instance_position;\nvoid main() { gl_Position = perspective * view * vec4(position + instance_position, 1.0); }",
            "void main() { gl_FragColor = vec4(1.0); }",
        ));
        let layers = [Layer::new()
            .with_shader(flat)
            .with_batch(Batch::new(mesh, block))];

        let mut renderer = renderer();
        let (stats, calls) = render(&mut renderer, &registry, &layers);

        assert_eq!(stats.draw_calls, 1);
        assert_eq!(count(&calls, |c| matches!(c, Call::VertexAttribPointer { .. })), 2);
    }

    #[test]
    fn dangling_ids_are_reported() {
        let mut registry = Registry::new();
        let mesh = registry.insert_mesh(unit_quad());
        let block = registry.insert_instances(one_white_instance());
        let shader = registry.insert_shader(ShaderSource::new("void main() {}", "void main() {}"));
        registry.remove_mesh(mesh).unwrap();
        registry.remove_shader(shader).unwrap();
        let layers = [
            Layer::new().with_batch(Batch::new(mesh, block)),
            Layer::new().with_shader(shader).with_batch(Batch::new(mesh, block)),
        ];

        let mut renderer = renderer();
        let (stats, _) = render(&mut renderer, &registry, &layers);

        assert_eq!(stats.draw_calls, 0);
        assert_eq!(
            renderer.errors(),
            &[
                RenderError::UnknownResource(ResourceId::Mesh(mesh)),
                RenderError::UnknownResource(ResourceId::Shader(shader)),
            ]
        );
    }

    #[test]
    fn release_frees_gpu_objects_and_reuploads() {
        let mut registry = Registry::new();
        let mesh = registry.insert_mesh(unit_quad());
        let block = registry.insert_instances(one_white_instance());
        let layers = [Layer::new().with_batch(Batch::new(mesh, block))];

        let mut renderer = renderer();
        render(&mut renderer, &registry, &layers);
        assert_eq!(renderer.device().live_buffers(), 3);

        assert!(renderer.release(mesh.into()));
        assert!(!renderer.release(mesh.into()));
        assert_eq!(renderer.device().live_buffers(), 1);

        let (_, calls) = render(&mut renderer, &registry, &layers);
        assert_eq!(count(&calls, |c| matches!(c, Call::CreateBuffer(_))), 2);
    }

    #[test]
    fn shutdown_deletes_everything() {
        let mut registry = Registry::new();
        let mesh = registry.insert_mesh(unit_quad());
        let block = registry.insert_instances(one_white_instance());
        let layers = [Layer::new().with_batch(Batch::new(mesh, block))];

        let mut renderer = renderer();
        render(&mut renderer, &registry, &layers);
        let device = renderer.shutdown();

        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.live_programs(), 0);
        assert_eq!(device.live_shaders(), 0);
    }
}
