use crate::registry::{InstanceBlockId, MeshId, ShaderId};

/// Which program a layer draws with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShaderChoice {
    /// The renderer's built-in solid-color shader.
    #[default]
    Default,
    Explicit(ShaderId),
}

impl From<Option<ShaderId>> for ShaderChoice {
    fn from(id: Option<ShaderId>) -> Self {
        id.map_or(Self::Default, Self::Explicit)
    }
}

/// One instanced draw: a mesh repeated once per instance in the block.
///
/// A batch without a mesh, or with an empty block, draws nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch {
    pub mesh: Option<MeshId>,
    pub instances: InstanceBlockId,
}

impl Batch {
    pub fn new(mesh: MeshId, instances: InstanceBlockId) -> Self {
        Self {
            mesh: Some(mesh),
            instances,
        }
    }
}

/// An ordered group of batches sharing a shader and a depth policy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layer {
    /// Decal layers ignore the depth buffer: no depth writes, always pass.
    pub decal: bool,
    pub shader: ShaderChoice,
    pub batches: Vec<Batch>,
    /// Sort key for [`sort_layers`]; renderers ignore it.
    pub render_order: i32,
}

impl Layer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decal(mut self, decal: bool) -> Self {
        self.decal = decal;
        self
    }

    pub fn with_shader(mut self, shader: ShaderId) -> Self {
        self.shader = ShaderChoice::Explicit(shader);
        self
    }

    pub fn with_render_order(mut self, render_order: i32) -> Self {
        self.render_order = render_order;
        self
    }

    pub fn with_batch(mut self, batch: Batch) -> Self {
        self.batches.push(batch);
        self
    }
}

/// Stable sort by `render_order`, for callers that submit layers pre-sorted.
pub fn sort_layers(layers: &mut [Layer]) {
    layers.sort_by_key(|layer| layer.render_order);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InstanceBlock, Mesh, Registry};

    #[test]
    fn shader_choice_defaults() {
        assert_eq!(Layer::new().shader, ShaderChoice::Default);
        assert_eq!(ShaderChoice::from(None), ShaderChoice::Default);
    }

    #[test]
    fn sort_is_stable() {
        let mut registry = Registry::new();
        let mesh = registry.insert_mesh(Mesh::default());
        let block = registry.insert_instances(InstanceBlock::default());

        let mut layers = vec![
            Layer::new().with_render_order(2),
            Layer::new().with_render_order(1).decal(true),
            Layer::new()
                .with_render_order(1)
                .with_batch(Batch::new(mesh, block)),
        ];
        sort_layers(&mut layers);

        let orders: Vec<i32> = layers.iter().map(|l| l.render_order).collect();
        assert_eq!(orders, vec![1, 1, 2]);
        assert!(layers[0].decal);
        assert_eq!(layers[1].batches.len(), 1);
    }
}
