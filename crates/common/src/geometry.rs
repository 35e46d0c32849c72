use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// One mesh shape: tightly packed `x, y, z` positions and a triangle list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Mesh {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new(vertices: Vec<f32>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    pub fn from_positions(positions: &[[f32; 3]], indices: Vec<u32>) -> Self {
        Self {
            vertices: bytemuck::cast_slice(positions).to_vec(),
            indices,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

/// Vertex and fragment stage source text for one shader program.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShaderSource {
    pub vertex: String,
    pub fragment: String,
}

impl ShaderSource {
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }
}

/// Per-instance attributes, laid out exactly as the GPU reads them.
///
/// `direction` is a unit 2D vector rotating the mesh about its up axis;
/// `color` is linear RGB in `0..=1`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Instance {
    pub position: [f32; 3],
    pub direction: [f32; 2],
    pub color: [f32; 3],
}

impl Instance {
    /// Floats per instance in an [`InstanceBlock`].
    pub const FLOATS: usize = 8;
    /// Byte stride between consecutive instances.
    pub const STRIDE: u32 = (Self::FLOATS * std::mem::size_of::<f32>()) as u32;
    pub const POSITION_OFFSET: u32 = 0;
    pub const DIRECTION_OFFSET: u32 = 3 * 4;
    pub const COLOR_OFFSET: u32 = 5 * 4;

    pub fn new(position: [f32; 3], direction: [f32; 2], color: [f32; 3]) -> Self {
        Self {
            position,
            direction,
            color,
        }
    }
}

impl Default for Instance {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            direction: [1.0, 0.0],
            color: [1.0; 3],
        }
    }
}

/// Flat interleaved instance data, [`Instance::FLOATS`] floats per instance.
///
/// Raw blocks are accepted as-is; a length that is not a multiple of eight is
/// only detected when the block is drawn.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceBlock {
    floats: Vec<f32>,
}

impl InstanceBlock {
    pub fn from_instances(instances: &[Instance]) -> Self {
        Self {
            floats: bytemuck::cast_slice(instances).to_vec(),
        }
    }

    pub fn from_raw(floats: Vec<f32>) -> Self {
        Self { floats }
    }

    pub fn len(&self) -> usize {
        self.floats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.floats.is_empty()
    }

    /// Number of whole instances, or `None` for a malformed block.
    pub fn instance_count(&self) -> Option<u32> {
        if self.floats.len() % Instance::FLOATS == 0 {
            Some((self.floats.len() / Instance::FLOATS) as u32)
        } else {
            None
        }
    }

    pub fn as_floats(&self) -> &[f32] {
        &self.floats
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.floats)
    }

    /// Typed view of the block; `None` when malformed.
    pub fn instances(&self) -> Option<&[Instance]> {
        self.instance_count()?;
        bytemuck::try_cast_slice(&self.floats).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_layout_is_eight_floats() {
        assert_eq!(std::mem::size_of::<Instance>(), 32);
        assert_eq!(Instance::STRIDE, 32);
        assert_eq!(Instance::DIRECTION_OFFSET, 12);
        assert_eq!(Instance::COLOR_OFFSET, 20);
    }

    #[test]
    fn instance_block_counts() {
        let block = InstanceBlock::from_raw(vec![0.0; 40]);
        assert_eq!(block.instance_count(), Some(5));

        let block = InstanceBlock::from_instances(&[Instance::default(); 3]);
        assert_eq!(block.len(), 24);
        assert_eq!(block.instances().map(<[Instance]>::len), Some(3));
    }

    #[test]
    fn malformed_block_has_no_count() {
        let block = InstanceBlock::from_raw(vec![0.0; 12]);
        assert_eq!(block.instance_count(), None);
        assert!(block.instances().is_none());
    }

    #[test]
    fn interleaving_matches_field_order() {
        let block = InstanceBlock::from_instances(&[Instance::new(
            [1.0, 2.0, 3.0],
            [0.0, 1.0],
            [0.25, 0.5, 0.75],
        )]);
        assert_eq!(
            block.as_floats(),
            &[1.0, 2.0, 3.0, 0.0, 1.0, 0.25, 0.5, 0.75]
        );
    }

    #[test]
    fn mesh_counts() {
        let mesh = Mesh::from_positions(
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            vec![0, 1, 2],
        );
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.index_count(), 3);
        assert_eq!(mesh.vertex_bytes().len(), 36);
        assert_eq!(mesh.index_bytes().len(), 12);
    }
}
