use anyhow::{Context, Result};
use clap::Parser;
use egui::Context as EguiContext;
use glam::Vec3;
use monet_assets::{Scene, SceneDocument};
use monet_common::Registry;
use monet_render::{
    CacheStats, FrameRenderer, FrameStats, RenderError, RendererConfig, ShaderFailurePolicy,
};
use monet_render_wgpu::{OrbitCamera, WgpuDevice};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

#[derive(Parser)]
#[command(name = "monet-desktop", about = "Monet scene viewer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Scene file (.yaml, .yml or .json); the built-in demo when omitted
    #[arg(long)]
    scene: Option<PathBuf>,

    /// Cache failed shaders instead of recompiling them every frame
    #[arg(long)]
    retain_failed_shaders: bool,
}

/// The loaded scene and the camera looking at it.
struct SceneState {
    path: Option<PathBuf>,
    registry: Registry,
    scene: Option<Scene>,
    camera: OrbitCamera,
    load_error: Option<String>,
}

impl SceneState {
    fn new(path: Option<PathBuf>) -> Self {
        let mut state = Self {
            path,
            registry: Registry::new(),
            scene: None,
            camera: OrbitCamera::default(),
            load_error: None,
        };
        state.load();
        state
    }

    fn load(&mut self) {
        let doc = match &self.path {
            Some(path) => SceneDocument::load(path),
            None => Ok(SceneDocument::demo()),
        };
        match doc.and_then(|doc| doc.instantiate(&mut self.registry)) {
            Ok(scene) => {
                if let Some(camera) = scene.camera {
                    self.camera = OrbitCamera::looking_at(
                        Vec3::from(camera.eye),
                        Vec3::from(camera.target),
                        camera.fov_degrees,
                    );
                }
                tracing::info!(
                    layers = scene.layers.len(),
                    batches = scene.batch_count(),
                    "scene ready"
                );
                self.scene = Some(scene);
                self.load_error = None;
            }
            Err(e) => {
                tracing::error!("failed to load scene: {e}");
                self.load_error = Some(e.to_string());
            }
        }
    }

    /// Drops the current scene from the registry and the renderer's caches,
    /// then loads the file again.
    fn reload(&mut self, mut renderer: Option<&mut FrameRenderer<WgpuDevice>>) {
        if let Some(scene) = self.scene.take() {
            for id in scene.resource_ids() {
                if let Err(e) = self.registry.remove(id) {
                    tracing::warn!("{e}");
                }
                if let Some(renderer) = renderer.as_mut() {
                    renderer.release(id);
                }
            }
        }
        self.load();
    }
}

#[derive(Default)]
struct Overlay {
    visible: bool,
    stats: FrameStats,
    cache: CacheStats,
    frames: u64,
    errors: Vec<String>,
}

impl Overlay {
    fn record(&mut self, stats: FrameStats, cache: CacheStats, frames: u64, errors: &[RenderError]) {
        self.stats = stats;
        self.cache = cache;
        self.frames = frames;
        self.errors = errors.iter().map(ToString::to_string).collect();
    }
}

/// Application state.
struct AppState {
    scene: SceneState,
    overlay: Overlay,
    init_error: Option<String>,
    dragging: bool,
}

impl AppState {
    /// Returns true when a scene reload was requested.
    fn draw_ui(&mut self, ctx: &EguiContext) -> bool {
        let mut reload = false;
        let error_color = egui::Color32::from_rgb(255, 96, 96);

        if let Some(error) = &self.init_error {
            egui::CentralPanel::default().show(ctx, |ui| {
                ui.heading("Monet");
                ui.colored_label(error_color, format!("renderer unavailable: {error}"));
            });
            return false;
        }
        if !self.overlay.visible {
            return false;
        }

        egui::Window::new("Monet")
            .default_width(300.0)
            .show(ctx, |ui| {
                if let Some(error) = &self.scene.load_error {
                    ui.colored_label(error_color, format!("scene error: {error}"));
                    ui.separator();
                }

                let stats = &self.overlay.stats;
                ui.label(format!("Frame: {}", self.overlay.frames));
                ui.label(format!(
                    "Draws: {}  Program switches: {}",
                    stats.draw_calls, stats.program_switches
                ));
                ui.label(format!(
                    "Instances: {}  Skipped batches: {}",
                    stats.instances, stats.skipped_batches
                ));
                let cache = &self.overlay.cache;
                ui.label(format!(
                    "Cached: {} meshes, {} blocks, {} shaders ({} uploads)",
                    cache.meshes, cache.instance_blocks, cache.shaders, cache.uploads
                ));
                let camera = &self.scene.camera;
                ui.label(format!(
                    "Camera: distance {:.1}, yaw {:.0}°, pitch {:.0}°",
                    camera.distance,
                    camera.yaw.to_degrees(),
                    camera.pitch.to_degrees()
                ));

                if !self.overlay.errors.is_empty() {
                    ui.separator();
                    for error in &self.overlay.errors {
                        ui.colored_label(error_color, format!("render error: {error}"));
                    }
                }

                ui.separator();
                if ui.button("Reload scene (R)").clicked() {
                    reload = true;
                }
                ui.small("F1: Toggle overlay | LMB drag: Orbit | Wheel: Zoom");
            });
        reload
    }
}

/// The frame renderer, or the bare device kept for the overlay when the
/// renderer could not start.
enum Backend {
    Ready(FrameRenderer<WgpuDevice>),
    Failed {
        device: wgpu::Device,
        queue: wgpu::Queue,
    },
}

impl Backend {
    fn device(&self) -> &wgpu::Device {
        match self {
            Self::Ready(renderer) => renderer.device().gpu(),
            Self::Failed { device, .. } => device,
        }
    }

    fn queue(&self) -> &wgpu::Queue {
        match self {
            Self::Ready(renderer) => renderer.device().queue(),
            Self::Failed { queue, .. } => queue,
        }
    }

    fn renderer_mut(&mut self) -> Option<&mut FrameRenderer<WgpuDevice>> {
        match self {
            Self::Ready(renderer) => Some(renderer),
            Self::Failed { .. } => None,
        }
    }
}

struct Gpu {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    backend: Backend,
    egui_winit: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
}

struct GpuApp {
    state: AppState,
    renderer_config: RendererConfig,
    gpu: Option<Gpu>,
    egui_ctx: EguiContext,
}

fn request_device(adapter: &wgpu::Adapter) -> Result<(wgpu::Device, wgpu::Queue)> {
    let device = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("monet_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
        },
        None,
    ))?;
    Ok(device)
}

impl GpuApp {
    fn new(scene: Option<PathBuf>, renderer_config: RendererConfig) -> Self {
        Self {
            state: AppState {
                scene: SceneState::new(scene),
                overlay: Overlay {
                    visible: true,
                    ..Overlay::default()
                },
                init_error: None,
                dragging: false,
            },
            renderer_config,
            gpu: None,
            egui_ctx: EguiContext::default(),
        }
    }

    fn init_gpu(&mut self, event_loop: &ActiveEventLoop) -> Result<Gpu> {
        let attrs = Window::default_attributes()
            .with_title("Monet")
            .with_inner_size(PhysicalSize::new(1280u32, 720));
        let window = Arc::new(event_loop.create_window(attrs)?);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(window.clone())?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("no suitable GPU adapter")?;
        let (device, queue) = request_device(&adapter)?;

        // The built-in shader gamma-encodes, so the surface must not.
        let size = window.inner_size();
        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .context("surface reports no formats")?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let backend =
            match FrameRenderer::initialize(WgpuDevice::new(device, queue), self.renderer_config) {
                Ok(renderer) => Backend::Ready(renderer),
                Err(error) => {
                    tracing::error!("renderer unavailable: {error}");
                    self.state.init_error = Some(error.to_string());
                    let (device, queue) = request_device(&adapter)?;
                    surface.configure(&device, &config);
                    Backend::Failed { device, queue }
                }
            };

        let egui_winit = egui_winit::State::new(
            self.egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        let egui_renderer = egui_wgpu::Renderer::new(backend.device(), format, None, 1, false);

        tracing::info!(
            "GPU initialized with {} backend, surface format {format:?}",
            adapter.get_info().backend.to_str()
        );

        Ok(Gpu {
            window,
            surface,
            config,
            backend,
            egui_winit,
            egui_renderer,
        })
    }

    fn reload_scene(&mut self) {
        let renderer = self.gpu.as_mut().and_then(|gpu| gpu.backend.renderer_mut());
        self.state.scene.reload(renderer);
    }

    fn redraw(&mut self) {
        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };

        let output = match gpu.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                gpu.surface.configure(gpu.backend.device(), &gpu.config);
                return;
            }
            Err(e) => {
                tracing::error!("surface error: {e}");
                return;
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let (width, height) = (gpu.config.width, gpu.config.height);

        let mut scene_drawn = false;
        if let (Backend::Ready(renderer), Some(scene)) =
            (&mut gpu.backend, &self.state.scene.scene)
        {
            let scale = gpu.window.scale_factor() as f32;
            let params = self.state.scene.camera.frame_params(
                width as f32 / scale,
                height as f32 / scale,
                scale,
                scene.clear_color,
            );
            renderer.device_mut().set_target(
                output
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default()),
                gpu.config.format,
                width,
                height,
            );
            let stats = renderer.render_frame(&self.state.scene.registry, &params, &scene.layers);
            self.state.overlay.record(
                stats,
                renderer.cache_stats(),
                renderer.frames_rendered(),
                renderer.errors(),
            );
            scene_drawn = true;
        }

        let raw_input = gpu.egui_winit.take_egui_input(&gpu.window);
        let mut reload = false;
        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            reload = self.state.draw_ui(ctx);
        });
        gpu.egui_winit
            .handle_platform_output(&gpu.window, full_output.platform_output);

        let paint_jobs = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);
        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [width, height],
            pixels_per_point: full_output.pixels_per_point,
        };

        let device = gpu.backend.device();
        let queue = gpu.backend.queue();
        for (id, image_delta) in &full_output.textures_delta.set {
            gpu.egui_renderer
                .update_texture(device, queue, *id, image_delta);
        }
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("egui_encoder"),
        });
        gpu.egui_renderer.update_buffers(
            device,
            queue,
            &mut encoder,
            &paint_jobs,
            &screen_descriptor,
        );
        {
            let mut pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("egui_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: if scene_drawn {
                                wgpu::LoadOp::Load
                            } else {
                                wgpu::LoadOp::Clear(wgpu::Color::BLACK)
                            },
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    ..Default::default()
                })
                .forget_lifetime();
            gpu.egui_renderer
                .render(&mut pass, &paint_jobs, &screen_descriptor);
        }
        queue.submit(std::iter::once(encoder.finish()));
        for id in &full_output.textures_delta.free {
            gpu.egui_renderer.free_texture(id);
        }

        output.present();
        gpu.window.request_redraw();

        if reload {
            self.reload_scene();
        }
    }

    fn shutdown(&mut self) {
        if let Some(Gpu {
            backend: Backend::Ready(renderer),
            ..
        }) = self.gpu.take()
        {
            let device = renderer.shutdown();
            tracing::info!(pipelines = device.pipeline_count(), "renderer shut down");
        }
    }
}

impl ApplicationHandler for GpuApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.gpu.is_some() {
            return;
        }
        match self.init_gpu(event_loop) {
            Ok(gpu) => self.gpu = Some(gpu),
            Err(e) => {
                tracing::error!("failed to initialize GPU: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(gpu) = &mut self.gpu {
            let response = gpu.egui_winit.on_window_event(&gpu.window, &event);
            if response.consumed {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                self.shutdown();
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.config.width = new_size.width.max(1);
                    gpu.config.height = new_size.height.max(1);
                    gpu.surface.configure(gpu.backend.device(), &gpu.config);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => match key {
                KeyCode::F1 => self.state.overlay.visible = !self.state.overlay.visible,
                KeyCode::KeyR => self.reload_scene(),
                KeyCode::Escape => {
                    self.shutdown();
                    event_loop.exit();
                }
                _ => {}
            },
            WindowEvent::MouseInput {
                button: MouseButton::Left,
                state: btn_state,
                ..
            } => {
                self.state.dragging = btn_state == ElementState::Pressed;
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let steps = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 50.0,
                };
                self.state.scene.camera.zoom(steps);
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: winit::event::DeviceId,
        event: DeviceEvent,
    ) {
        if let DeviceEvent::MouseMotion { delta } = event {
            if self.state.dragging {
                self.state
                    .scene
                    .camera
                    .orbit(-delta.0 as f32, delta.1 as f32);
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(gpu) = &self.gpu {
            gpu.window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    tracing::info!("monet-desktop starting");

    let renderer_config = RendererConfig {
        shader_failure_policy: if cli.retain_failed_shaders {
            ShaderFailurePolicy::Remember
        } else {
            ShaderFailurePolicy::Retry
        },
        ..RendererConfig::default()
    };

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = GpuApp::new(cli.scene, renderer_config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
