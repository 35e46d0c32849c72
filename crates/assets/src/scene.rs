use crate::SceneError;
use crate::primitives;
use monet_common::{
    Batch, Instance, InstanceBlock, Layer, Mesh, MeshId, Registry, ResourceId, ShaderId,
    ShaderSource, sort_layers,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

fn default_clear_color() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn default_target() -> [f32; 3] {
    [0.0; 3]
}

fn default_fov() -> f32 {
    60.0
}

fn default_direction() -> [f32; 2] {
    [1.0, 0.0]
}

fn default_color() -> [f32; 3] {
    [1.0; 3]
}

/// Initial camera placement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraSpec {
    pub eye: [f32; 3],
    #[serde(default = "default_target")]
    pub target: [f32; 3],
    #[serde(default = "default_fov")]
    pub fov_degrees: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    Quad,
    Cube,
    Triangle,
}

impl Primitive {
    pub fn mesh(self) -> Mesh {
        match self {
            Self::Quad => primitives::unit_quad(),
            Self::Cube => primitives::cube(),
            Self::Triangle => primitives::triangle(),
        }
    }
}

/// A named mesh: a primitive name, or inline positions and indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeshSpec {
    Primitive(Primitive),
    Custom { vertices: Vec<f32>, indices: Vec<u32> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderSpec {
    pub vertex: String,
    pub fragment: String,
}

/// One instance with the unit direction and white color as defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub position: [f32; 3],
    #[serde(default = "default_direction")]
    pub direction: [f32; 2],
    #[serde(default = "default_color")]
    pub color: [f32; 3],
}

impl From<InstanceSpec> for Instance {
    fn from(spec: InstanceSpec) -> Self {
        Instance::new(spec.position, spec.direction, spec.color)
    }
}

/// A batch lists its instances either typed or as raw interleaved floats.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchSpec {
    #[serde(default)]
    pub mesh: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instances: Vec<InstanceSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LayerSpec {
    #[serde(default)]
    pub decal: bool,
    #[serde(default)]
    pub shader: Option<String>,
    #[serde(default)]
    pub render_order: i32,
    #[serde(default)]
    pub batches: Vec<BatchSpec>,
}

/// A scene file: named meshes and shaders plus the layers drawing them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDocument {
    #[serde(default = "default_clear_color")]
    pub clear_color: [f32; 4],
    #[serde(default)]
    pub camera: Option<CameraSpec>,
    #[serde(default)]
    pub meshes: BTreeMap<String, MeshSpec>,
    #[serde(default)]
    pub shaders: BTreeMap<String, ShaderSpec>,
    #[serde(default)]
    pub layers: Vec<LayerSpec>,
}

impl Default for SceneDocument {
    fn default() -> Self {
        Self {
            clear_color: default_clear_color(),
            camera: None,
            meshes: BTreeMap::new(),
            shaders: BTreeMap::new(),
            layers: Vec::new(),
        }
    }
}

/// A document instantiated into a registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    /// Sorted by `render_order`.
    pub layers: Vec<Layer>,
    pub clear_color: [f32; 4],
    pub camera: Option<CameraSpec>,
    pub meshes: BTreeMap<String, MeshId>,
    pub shaders: BTreeMap<String, ShaderId>,
}

impl Scene {
    pub fn batch_count(&self) -> usize {
        self.layers.iter().map(|layer| layer.batches.len()).sum()
    }

    /// Every registry id the scene created, for unloading it again.
    pub fn resource_ids(&self) -> Vec<ResourceId> {
        let meshes = self.meshes.values().map(|&id| ResourceId::from(id));
        let shaders = self.shaders.values().map(|&id| ResourceId::from(id));
        let blocks = self
            .layers
            .iter()
            .flat_map(|layer| layer.batches.iter())
            .map(|batch| ResourceId::from(batch.instances));
        meshes.chain(shaders).chain(blocks).collect()
    }
}

impl SceneDocument {
    /// Loads a `.yaml`/`.yml` or `.json` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        let text = std::fs::read_to_string(path)?;
        let doc = match extension.as_deref() {
            Some("yaml" | "yml") => Self::from_yaml_str(&text)?,
            Some("json") => Self::from_json_str(&text)?,
            _ => return Err(SceneError::UnsupportedFormat(path.display().to_string())),
        };
        tracing::debug!(path = %path.display(), layers = doc.layers.len(), "scene loaded");
        Ok(doc)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, SceneError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self, SceneError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_yaml_string(&self) -> Result<String, SceneError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Checks names and meshes without touching a registry.
    pub fn validate(&self) -> Result<(), SceneError> {
        for (name, spec) in &self.meshes {
            if let MeshSpec::Custom { vertices, indices } = spec {
                check_custom_mesh(name, vertices, indices)?;
            }
        }
        for (layer_index, layer) in self.layers.iter().enumerate() {
            if let Some(shader) = &layer.shader {
                if !self.shaders.contains_key(shader) {
                    return Err(SceneError::UnknownShader {
                        layer: layer_index,
                        name: shader.clone(),
                    });
                }
            }
            for (batch_index, batch) in layer.batches.iter().enumerate() {
                if let Some(mesh) = &batch.mesh {
                    if !self.meshes.contains_key(mesh) {
                        return Err(SceneError::UnknownMesh {
                            layer: layer_index,
                            name: mesh.clone(),
                        });
                    }
                }
                if batch.raw.is_some() && !batch.instances.is_empty() {
                    return Err(SceneError::AmbiguousInstances {
                        layer: layer_index,
                        batch: batch_index,
                    });
                }
            }
        }
        Ok(())
    }

    /// Registers every mesh, shader and instance block and builds the layers.
    ///
    /// Raw instance data is registered as given; a malformed length is the
    /// renderer's to report when drawn.
    pub fn instantiate(&self, registry: &mut Registry) -> Result<Scene, SceneError> {
        self.validate()?;

        let meshes: BTreeMap<String, MeshId> = self
            .meshes
            .iter()
            .map(|(name, spec)| {
                let mesh = match spec {
                    MeshSpec::Primitive(primitive) => primitive.mesh(),
                    MeshSpec::Custom { vertices, indices } => {
                        Mesh::new(vertices.clone(), indices.clone())
                    }
                };
                (name.clone(), registry.insert_mesh(mesh))
            })
            .collect();
        let shaders: BTreeMap<String, ShaderId> = self
            .shaders
            .iter()
            .map(|(name, spec)| {
                let source = ShaderSource::new(spec.vertex.clone(), spec.fragment.clone());
                (name.clone(), registry.insert_shader(source))
            })
            .collect();

        let mut layers: Vec<Layer> = self
            .layers
            .iter()
            .map(|spec| Layer {
                decal: spec.decal,
                shader: spec
                    .shader
                    .as_ref()
                    .and_then(|name| shaders.get(name).copied())
                    .into(),
                render_order: spec.render_order,
                batches: spec
                    .batches
                    .iter()
                    .map(|batch| {
                        let block = match &batch.raw {
                            Some(raw) => InstanceBlock::from_raw(raw.clone()),
                            None => {
                                let instances: Vec<Instance> =
                                    batch.instances.iter().copied().map(Instance::from).collect();
                                InstanceBlock::from_instances(&instances)
                            }
                        };
                        Batch {
                            mesh: batch.mesh.as_ref().and_then(|name| meshes.get(name).copied()),
                            instances: registry.insert_instances(block),
                        }
                    })
                    .collect(),
            })
            .collect();
        sort_layers(&mut layers);

        Ok(Scene {
            layers,
            clear_color: self.clear_color,
            camera: self.camera,
            meshes,
            shaders,
        })
    }

    /// Ground quads under a ring of arrows, with a decal marker on top.
    pub fn demo() -> Self {
        let ring: Vec<InstanceSpec> = (0..12)
            .map(|i| {
                let angle = i as f32 / 12.0 * std::f32::consts::TAU;
                let hue = i as f32 / 12.0;
                InstanceSpec {
                    position: [3.0 * angle.cos(), 3.0 * angle.sin(), 0.5],
                    direction: [-angle.sin(), angle.cos()],
                    color: [hue, 0.6, 1.0 - hue],
                }
            })
            .collect();
        let tiles: Vec<InstanceSpec> = (-2..=2)
            .flat_map(|x| (-2..=2).map(move |y| (x, y)))
            .map(|(x, y)| InstanceSpec {
                position: [x as f32 * 2.0, y as f32 * 2.0, 0.0],
                direction: default_direction(),
                color: if (x + y) % 2 == 0 {
                    [0.25, 0.25, 0.3]
                } else {
                    [0.15, 0.15, 0.2]
                },
            })
            .collect();

        Self {
            clear_color: [0.05, 0.05, 0.08, 1.0],
            camera: Some(CameraSpec {
                eye: [8.0, -8.0, 7.0],
                target: default_target(),
                fov_degrees: default_fov(),
            }),
            meshes: BTreeMap::from([
                ("tile".to_string(), MeshSpec::Primitive(Primitive::Quad)),
                ("arrow".to_string(), MeshSpec::Primitive(Primitive::Triangle)),
                ("crate".to_string(), MeshSpec::Primitive(Primitive::Cube)),
            ]),
            shaders: BTreeMap::new(),
            layers: vec![
                LayerSpec {
                    render_order: 0,
                    batches: vec![BatchSpec {
                        mesh: Some("tile".to_string()),
                        instances: tiles,
                        raw: None,
                    }],
                    ..LayerSpec::default()
                },
                LayerSpec {
                    render_order: 1,
                    batches: vec![
                        BatchSpec {
                            mesh: Some("crate".to_string()),
                            instances: vec![InstanceSpec {
                                position: [0.0, 0.0, 0.5],
                                direction: default_direction(),
                                color: [0.8, 0.5, 0.2],
                            }],
                            raw: None,
                        },
                        BatchSpec {
                            mesh: Some("arrow".to_string()),
                            instances: ring,
                            raw: None,
                        },
                    ],
                    ..LayerSpec::default()
                },
                LayerSpec {
                    decal: true,
                    render_order: 2,
                    batches: vec![BatchSpec {
                        mesh: Some("arrow".to_string()),
                        instances: vec![InstanceSpec {
                            position: [0.0, 0.0, 0.0],
                            direction: default_direction(),
                            color: [1.0, 0.9, 0.1],
                        }],
                        raw: None,
                    }],
                    ..LayerSpec::default()
                },
            ],
        }
    }
}

fn check_custom_mesh(name: &str, vertices: &[f32], indices: &[u32]) -> Result<(), SceneError> {
    if vertices.len() % 3 != 0 {
        return Err(SceneError::InvalidMesh {
            name: name.to_string(),
            reason: format!("{} floats is not a whole number of positions", vertices.len()),
        });
    }
    if indices.len() % 3 != 0 {
        return Err(SceneError::InvalidMesh {
            name: name.to_string(),
            reason: format!("{} indices is not a whole number of triangles", indices.len()),
        });
    }
    let vertex_count = (vertices.len() / 3) as u32;
    if let Some(bad) = indices.iter().find(|&&i| i >= vertex_count) {
        return Err(SceneError::InvalidMesh {
            name: name.to_string(),
            reason: format!("index {bad} out of range for {vertex_count} vertices"),
        });
    }
    Ok(())
}
