use anyhow::Context;
use clap::{Parser, Subcommand};
use glam::{Mat4, Vec3};
use monet_assets::{CameraSpec, SceneDocument};
use monet_common::{FrameParams, Registry};
use monet_render::{FrameRenderer, RecordingDevice, RendererConfig, ShaderFailurePolicy};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "monet-cli", about = "CLI tool for monet scenes")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Load a scene file and check its names and meshes
    Validate {
        /// Scene file (.yaml, .yml or .json)
        scene: PathBuf,
    },
    /// Render a scene on the recording device and print every device call
    Trace {
        /// Scene file; the built-in demo scene when omitted
        scene: Option<PathBuf>,
        /// Number of frames to render
        #[arg(short, long, default_value = "1")]
        frames: u32,
        /// Logical canvas width
        #[arg(long, default_value = "800")]
        width: f32,
        /// Logical canvas height
        #[arg(long, default_value = "600")]
        height: f32,
        /// Physical pixels per logical pixel
        #[arg(long, default_value = "1.0")]
        pixel_ratio: f32,
        /// Cache failed shaders instead of recompiling them every frame
        #[arg(long)]
        retain_failed_shaders: bool,
    },
}

fn camera_matrices(camera: Option<CameraSpec>, aspect: f32) -> (Mat4, Mat4) {
    let camera = camera.unwrap_or(CameraSpec {
        eye: [6.0, -6.0, 5.0],
        target: [0.0; 3],
        fov_degrees: 60.0,
    });
    let view = Mat4::look_at_rh(
        Vec3::from(camera.eye),
        Vec3::from(camera.target),
        Vec3::Z,
    );
    let perspective = Mat4::perspective_rh(camera.fov_degrees.to_radians(), aspect, 0.1, 1000.0);
    (view, perspective)
}

fn load_scene(path: Option<&PathBuf>) -> anyhow::Result<SceneDocument> {
    match path {
        Some(path) => SceneDocument::load(path)
            .with_context(|| format!("loading scene {}", path.display())),
        None => Ok(SceneDocument::demo()),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Info => {
            println!("monet-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("render: {}", monet_render::crate_info());
            println!("assets: {}", monet_assets::crate_info());
        }
        Commands::Validate { scene } => {
            let doc = load_scene(Some(&scene))?;
            let mut registry = Registry::new();
            let instantiated = doc
                .instantiate(&mut registry)
                .with_context(|| format!("instantiating scene {}", scene.display()))?;
            println!(
                "{}: OK ({} layers, {} batches, {} meshes, {} shaders)",
                scene.display(),
                instantiated.layers.len(),
                instantiated.batch_count(),
                registry.mesh_count(),
                registry.shader_count()
            );
        }
        Commands::Trace {
            scene,
            frames,
            width,
            height,
            pixel_ratio,
            retain_failed_shaders,
        } => {
            let doc = load_scene(scene.as_ref())?;
            let mut registry = Registry::new();
            let scene = doc.instantiate(&mut registry)?;

            let (view, perspective) = camera_matrices(scene.camera, width / height.max(1.0));
            let params = FrameParams {
                width,
                height,
                pixel_ratio,
                view,
                perspective,
                clear_color: scene.clear_color,
            };
            let config = RendererConfig {
                shader_failure_policy: if retain_failed_shaders {
                    ShaderFailurePolicy::Remember
                } else {
                    ShaderFailurePolicy::Retry
                },
                ..RendererConfig::default()
            };

            let mut renderer = FrameRenderer::initialize(RecordingDevice::new(), config)?;
            for frame in 0..frames {
                let stats = renderer.render_frame(&registry, &params, &scene.layers);
                println!("# frame {frame}");
                for call in renderer.device_mut().take_calls() {
                    println!("{call}");
                }
                println!(
                    "# draws={} program_switches={} skipped={} instances={}",
                    stats.draw_calls, stats.program_switches, stats.skipped_batches, stats.instances
                );
                for error in renderer.errors() {
                    println!("# render error: {error}");
                }
            }
            let cache = renderer.cache_stats();
            println!(
                "# cached meshes={} instance_blocks={} shaders={} uploads={}",
                cache.meshes, cache.instance_blocks, cache.shaders, cache.uploads
            );
        }
    }

    Ok(())
}
