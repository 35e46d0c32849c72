use crate::geometry::{InstanceBlock, Mesh, ShaderSource};
use slotmap::{SlotMap, new_key_type};

new_key_type! {
    /// Identity of a registered [`Mesh`].
    pub struct MeshId;
    /// Identity of a registered [`InstanceBlock`].
    pub struct InstanceBlockId;
    /// Identity of a registered [`ShaderSource`].
    pub struct ShaderId;
}

/// Any registry identity, used when asking a renderer to drop GPU resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceId {
    Mesh(MeshId),
    Instances(InstanceBlockId),
    Shader(ShaderId),
}

impl From<MeshId> for ResourceId {
    fn from(id: MeshId) -> Self {
        Self::Mesh(id)
    }
}

impl From<InstanceBlockId> for ResourceId {
    fn from(id: InstanceBlockId) -> Self {
        Self::Instances(id)
    }
}

impl From<ShaderId> for ResourceId {
    fn from(id: ShaderId) -> Self {
        Self::Shader(id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("resource not registered: {0:?}")]
    NotFound(ResourceId),
}

/// Arena owning every CPU-side object a frame can reference.
///
/// Ids are generational: content equality never merges two entries, and a
/// removed id stays dead. Removing an object here does not free its GPU
/// counterpart; the owner must also release the id on the renderer.
#[derive(Debug, Default)]
pub struct Registry {
    meshes: SlotMap<MeshId, Mesh>,
    instances: SlotMap<InstanceBlockId, InstanceBlock>,
    shaders: SlotMap<ShaderId, ShaderSource>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_mesh(&mut self, mesh: Mesh) -> MeshId {
        let id = self.meshes.insert(mesh);
        tracing::debug!(?id, "registered mesh");
        id
    }

    pub fn insert_instances(&mut self, block: InstanceBlock) -> InstanceBlockId {
        let id = self.instances.insert(block);
        tracing::debug!(?id, "registered instance block");
        id
    }

    pub fn insert_shader(&mut self, source: ShaderSource) -> ShaderId {
        let id = self.shaders.insert(source);
        tracing::debug!(?id, "registered shader source");
        id
    }

    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(id)
    }

    pub fn instances(&self, id: InstanceBlockId) -> Option<&InstanceBlock> {
        self.instances.get(id)
    }

    pub fn shader(&self, id: ShaderId) -> Option<&ShaderSource> {
        self.shaders.get(id)
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        match id {
            ResourceId::Mesh(id) => self.meshes.contains_key(id),
            ResourceId::Instances(id) => self.instances.contains_key(id),
            ResourceId::Shader(id) => self.shaders.contains_key(id),
        }
    }

    pub fn remove_mesh(&mut self, id: MeshId) -> Result<Mesh, RegistryError> {
        self.meshes
            .remove(id)
            .ok_or(RegistryError::NotFound(id.into()))
    }

    pub fn remove_instances(&mut self, id: InstanceBlockId) -> Result<InstanceBlock, RegistryError> {
        self.instances
            .remove(id)
            .ok_or(RegistryError::NotFound(id.into()))
    }

    pub fn remove_shader(&mut self, id: ShaderId) -> Result<ShaderSource, RegistryError> {
        self.shaders
            .remove(id)
            .ok_or(RegistryError::NotFound(id.into()))
    }

    /// Removes whichever object `id` names, discarding it.
    pub fn remove(&mut self, id: ResourceId) -> Result<(), RegistryError> {
        match id {
            ResourceId::Mesh(id) => self.remove_mesh(id).map(drop),
            ResourceId::Instances(id) => self.remove_instances(id).map(drop),
            ResourceId::Shader(id) => self.remove_shader(id).map(drop),
        }
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn instance_block_count(&self) -> usize {
        self.instances.len()
    }

    pub fn shader_count(&self) -> usize {
        self.shaders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Mesh {
        Mesh::new(vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0], vec![0, 1, 2])
    }

    #[test]
    fn identical_content_gets_distinct_ids() {
        let mut registry = Registry::new();
        let a = registry.insert_mesh(triangle());
        let b = registry.insert_mesh(triangle());
        assert_ne!(a, b);
        assert_eq!(registry.mesh(a), registry.mesh(b));
        assert_eq!(registry.mesh_count(), 2);
    }

    #[test]
    fn removed_id_stays_dead() {
        let mut registry = Registry::new();
        let old = registry.insert_mesh(triangle());
        registry.remove_mesh(old).unwrap();
        let new = registry.insert_mesh(triangle());

        assert_ne!(old, new);
        assert!(registry.mesh(old).is_none());
        assert!(!registry.contains(old.into()));
        assert!(registry.contains(new.into()));
    }

    #[test]
    fn remove_unknown_is_an_error() {
        let mut registry = Registry::new();
        let id = registry.insert_shader(ShaderSource::new("v", "f"));
        registry.remove_shader(id).unwrap();
        assert!(matches!(
            registry.remove_shader(id),
            Err(RegistryError::NotFound(ResourceId::Shader(_)))
        ));
    }

    #[test]
    fn instance_blocks_round_trip_through_registry() {
        let mut registry = Registry::new();
        let id = registry.insert_instances(InstanceBlock::from_raw(vec![0.0; 16]));
        assert_eq!(registry.instances(id).and_then(InstanceBlock::instance_count), Some(2));
        assert_eq!(registry.instance_block_count(), 1);
    }

    #[test]
    fn remove_by_resource_id() {
        let mut registry = Registry::new();
        let mesh = registry.insert_mesh(triangle());
        let block = registry.insert_instances(InstanceBlock::from_raw(vec![0.0; 8]));
        registry.remove(mesh.into()).unwrap();
        registry.remove(block.into()).unwrap();
        assert_eq!(registry.mesh_count(), 0);
        assert_eq!(registry.instance_block_count(), 0);
        assert!(registry.remove(mesh.into()).is_err());
    }
}
