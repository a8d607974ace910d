use std::collections::BTreeMap;

use crate::device::{
    BarrierDesc, BufferDesc, BufferHandle, GpuResource, GraphicsDevice, TextureDesc, TextureHandle,
};
use crate::garbage::{Deletion, GarbageBin};
use crate::graph::resource::{
    extend_lifetime, GraphDesc, GraphResource, ResourceId, ResourceKind, ResourceVariant,
};
use crate::state::ResourceState;

/// Owner of every logical resource the graph knows about: declarations,
/// imports, alias chains and proxies, plus the per-frame bookkeeping that
/// turns them into device resources and state transitions.
///
/// Persists across frames. `tick` drops everything frame-local and keeps the
/// imports, which re-enter the next frame at their entry state.
///
/// Misdeclarations (duplicate ids, double aliasing, lifetime overlaps) are
/// programmer errors and panic at build time rather than producing a broken
/// frame.
pub struct ResourceRegistry {
    resources: BTreeMap<ResourceId, GraphResource>,
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self {
            resources: BTreeMap::new(),
        }
    }

    pub fn declare_texture(&mut self, id: impl Into<ResourceId>, desc: TextureDesc) -> ResourceId {
        let id = id.into();
        let init = desc.init_state;
        self.insert_new(
            id.clone(),
            GraphResource::new(
                ResourceVariant::Declared {
                    desc: GraphDesc::Texture(desc),
                },
                init,
            ),
        );
        id
    }

    pub fn declare_buffer(&mut self, id: impl Into<ResourceId>, desc: BufferDesc) -> ResourceId {
        let id = id.into();
        let init = desc.init_state;
        self.insert_new(
            id.clone(),
            GraphResource::new(
                ResourceVariant::Declared {
                    desc: GraphDesc::Buffer(desc),
                },
                init,
            ),
        );
        id
    }

    pub fn import_texture(
        &mut self,
        id: impl Into<ResourceId>,
        texture: TextureHandle,
        entry_state: ResourceState,
        exit_state: ResourceState,
    ) -> ResourceId {
        let id = id.into();
        let mut resource = GraphResource::new(
            ResourceVariant::Imported {
                kind: ResourceKind::Texture,
                entry_state,
                exit_state,
            },
            entry_state,
        );
        resource.backing = Some(GpuResource::Texture(texture));
        self.insert_new(id.clone(), resource);
        id
    }

    pub fn import_buffer(
        &mut self,
        id: impl Into<ResourceId>,
        buffer: BufferHandle,
        entry_state: ResourceState,
        exit_state: ResourceState,
    ) -> ResourceId {
        let id = id.into();
        let mut resource = GraphResource::new(
            ResourceVariant::Imported {
                kind: ResourceKind::Buffer,
                entry_state,
                exit_state,
            },
            entry_state,
        );
        resource.backing = Some(GpuResource::Buffer(buffer));
        self.insert_new(id.clone(), resource);
        id
    }

    pub fn declare_proxy(&mut self, id: impl Into<ResourceId>) -> ResourceId {
        let id = id.into();
        self.insert_new(
            id.clone(),
            GraphResource::new(ResourceVariant::Proxy, ResourceState::UNDEFINED),
        );
        id
    }

    /// Register `new_id` as the next version of `prev`. Each version may be
    /// aliased at most once; the chain shares the original's backing.
    pub fn alias_resource(
        &mut self,
        new_id: impl Into<ResourceId>,
        prev: impl Into<ResourceId>,
    ) -> ResourceId {
        let new_id = new_id.into();
        let prev = prev.into();
        let original = self.root_of(&prev);

        let prev_resource = self.get_mut(&prev);
        assert!(
            !matches!(prev_resource.variant, ResourceVariant::Proxy),
            "cannot alias proxy '{prev}'"
        );
        assert!(
            !prev_resource.has_been_aliased,
            "resource '{prev}' is already aliased; each version may be aliased once"
        );
        prev_resource.has_been_aliased = true;

        self.insert_new(
            new_id.clone(),
            GraphResource::new(
                ResourceVariant::Aliased { prev, original },
                ResourceState::UNDEFINED,
            ),
        );
        new_id
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.resources.contains_key(id)
    }

    pub fn kind(&self, id: &ResourceId) -> ResourceKind {
        let root = self.root_of(id);
        match &self.get(&root).variant {
            ResourceVariant::Declared { desc } => desc.kind(),
            ResourceVariant::Imported { kind, .. } => *kind,
            ResourceVariant::Proxy => panic!("proxy '{id}' has no resource kind"),
            ResourceVariant::Aliased { .. } => unreachable!("alias root is itself an alias"),
        }
    }

    pub fn is_imported(&self, id: &ResourceId) -> bool {
        let root = self.root_of(id);
        matches!(self.get(&root).variant, ResourceVariant::Imported { .. })
    }

    /// Fold a usage at `level` into this id's lifetime and its chain root's
    /// underlying-resource lifetime.
    pub(crate) fn resolve_lifetime(&mut self, id: &ResourceId, level: u32) {
        let root = self.root_of(id);
        extend_lifetime(&mut self.get_mut(id).usage, level);
        extend_lifetime(&mut self.get_mut(&root).resource_lifetime, level);
    }

    /// Verify that no alias begins before the previous version's last use.
    pub(crate) fn sanitize_aliasing_lifetimes(&self) {
        for (id, resource) in &self.resources {
            let ResourceVariant::Aliased { prev, .. } = &resource.variant else {
                continue;
            };
            let (Some(mine), Some(theirs)) = (resource.usage, self.get(prev).usage) else {
                continue;
            };
            assert!(
                theirs.last <= mine.first,
                "alias '{id}' is first used at level {} but '{prev}' is still used at level {}",
                mine.first,
                theirs.last
            );
        }
    }

    /// Create backing for every declared resource used this frame, then point
    /// each alias at its original's backing.
    pub(crate) fn realize_resources(&mut self, device: &mut dyn GraphicsDevice) {
        for (id, resource) in self.resources.iter_mut() {
            if resource.backing.is_some() {
                continue;
            }
            let ResourceVariant::Declared { desc } = &resource.variant else {
                continue;
            };
            if resource.resource_lifetime.is_none() {
                log::debug!("declared resource '{id}' is unused this frame");
                continue;
            }
            resource.backing = Some(match desc {
                GraphDesc::Texture(desc) => GpuResource::Texture(device.create_texture(desc.clone())),
                GraphDesc::Buffer(desc) => GpuResource::Buffer(device.create_buffer(desc.clone())),
            });
            resource.current_state = desc.init_state();
            log::trace!("realized '{id}'");
        }

        let aliases: Vec<(ResourceId, ResourceId)> = self
            .resources
            .iter()
            .filter(|(_, resource)| resource.backing.is_none())
            .filter_map(|(id, resource)| match &resource.variant {
                ResourceVariant::Aliased { original, .. } => Some((id.clone(), original.clone())),
                _ => None,
            })
            .collect();
        for (id, original) in aliases {
            let backing = self
                .get(&original)
                .backing
                .unwrap_or_else(|| panic!("alias '{id}' of unrealized resource '{original}'"));
            self.get_mut(&id).backing = Some(backing);
        }
    }

    pub fn backing(&self, id: &ResourceId) -> GpuResource {
        let root = self.root_of(id);
        self.get(&root)
            .backing
            .unwrap_or_else(|| panic!("resource '{id}' has no realized backing"))
    }

    pub fn texture(&self, id: &ResourceId) -> TextureHandle {
        match self.backing(id) {
            GpuResource::Texture(texture) => texture,
            GpuResource::Buffer(_) => panic!("resource '{id}' is a buffer, not a texture"),
        }
    }

    pub fn buffer(&self, id: &ResourceId) -> BufferHandle {
        match self.backing(id) {
            GpuResource::Buffer(buffer) => buffer,
            GpuResource::Texture(_) => panic!("resource '{id}' is a texture, not a buffer"),
        }
    }

    pub(crate) fn texture_desc(&self, id: &ResourceId) -> Option<&TextureDesc> {
        let root = self.root_of(id);
        match &self.resources.get(&root)?.variant {
            ResourceVariant::Declared {
                desc: GraphDesc::Texture(desc),
            } => Some(desc),
            _ => None,
        }
    }

    /// State of the underlying resource, shared along the alias chain.
    pub fn current_state(&self, id: &ResourceId) -> ResourceState {
        let root = self.root_of(id);
        self.get(&root).current_state
    }

    pub fn set_current_state(&mut self, id: &ResourceId, state: ResourceState) {
        let root = self.root_of(id);
        self.get_mut(&root).current_state = state;
    }

    pub(crate) fn root_of(&self, id: &ResourceId) -> ResourceId {
        match &self.get(id).variant {
            ResourceVariant::Aliased { original, .. } => original.clone(),
            _ => id.clone(),
        }
    }

    /// Barriers returning used imports to their promised exit states.
    pub(crate) fn imported_exit_transitions(&mut self) -> Vec<BarrierDesc> {
        let mut barriers = Vec::new();
        for resource in self.resources.values_mut() {
            let exit = match &resource.variant {
                ResourceVariant::Imported { exit_state, .. } => *exit_state,
                _ => continue,
            };
            if resource.resource_lifetime.is_none() {
                continue;
            }
            let Some(backing) = resource.backing else {
                continue;
            };
            if resource.current_state != exit {
                barriers.push(BarrierDesc {
                    resource: backing,
                    before: resource.current_state,
                    after: exit,
                });
                resource.current_state = exit;
            }
        }
        barriers
    }

    /// Barriers returning realized declared resources to their init states,
    /// so their backing retires in a known state.
    pub(crate) fn declared_to_init_transitions(&mut self) -> Vec<BarrierDesc> {
        let mut barriers = Vec::new();
        for resource in self.resources.values_mut() {
            let init = match &resource.variant {
                ResourceVariant::Declared { desc } => desc.init_state(),
                _ => continue,
            };
            let Some(backing) = resource.backing else {
                continue;
            };
            if resource.current_state != init {
                barriers.push(BarrierDesc {
                    resource: backing,
                    before: resource.current_state,
                    after: init,
                });
                resource.current_state = init;
            }
        }
        barriers
    }

    /// End of frame: retire declared backing through the bin, drop every
    /// frame-local entry, reset the imports for the next frame.
    pub fn tick(&mut self, bin: &mut GarbageBin) {
        self.resources.retain(|_, resource| match &resource.variant {
            ResourceVariant::Imported { entry_state, .. } => {
                resource.current_state = *entry_state;
                resource.usage = None;
                resource.resource_lifetime = None;
                resource.has_been_aliased = false;
                true
            }
            ResourceVariant::Declared { .. } => {
                if let Some(backing) = resource.backing.take() {
                    match backing {
                        GpuResource::Texture(texture) => bin.push(Deletion::Texture(texture)),
                        GpuResource::Buffer(buffer) => bin.push(Deletion::Buffer(buffer)),
                    }
                }
                false
            }
            ResourceVariant::Aliased { .. } | ResourceVariant::Proxy => false,
        });
    }

    fn insert_new(&mut self, id: ResourceId, resource: GraphResource) {
        if self.resources.insert(id.clone(), resource).is_some() {
            panic!("resource '{id}' declared twice");
        }
    }

    fn get(&self, id: &ResourceId) -> &GraphResource {
        self.resources
            .get(id)
            .unwrap_or_else(|| panic!("unknown resource '{id}'"))
    }

    fn get_mut(&mut self, id: &ResourceId) -> &mut GraphResource {
        self.resources
            .get_mut(id)
            .unwrap_or_else(|| panic!("unknown resource '{id}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::NullDevice;
    use ash::vk;

    fn color_target() -> TextureDesc {
        TextureDesc::default()
            .format(vk::Format::R8G8B8A8_UNORM)
            .extent(16, 16)
            .usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED)
    }

    #[test]
    #[should_panic(expected = "declared twice")]
    fn duplicate_declaration_panics() {
        let mut registry = ResourceRegistry::new();
        registry.declare_texture("hdr", color_target());
        registry.declare_texture("hdr", color_target());
    }

    #[test]
    #[should_panic(expected = "already aliased")]
    fn aliasing_the_same_version_twice_panics() {
        let mut registry = ResourceRegistry::new();
        registry.declare_texture("hdr", color_target());
        registry.alias_resource("hdr(2)", "hdr");
        registry.alias_resource("hdr-again", "hdr");
    }

    #[test]
    fn state_is_shared_along_the_alias_chain() {
        let mut registry = ResourceRegistry::new();
        registry.declare_texture("hdr", color_target());
        registry.alias_resource("hdr(2)", "hdr");
        registry.alias_resource("hdr(3)", "hdr(2)");

        let id = ResourceId::new("hdr(3)");
        registry.set_current_state(&id, ResourceState::PIXEL_SHADER_RESOURCE);
        assert_eq!(
            registry.current_state(&ResourceId::new("hdr")),
            ResourceState::PIXEL_SHADER_RESOURCE
        );
    }

    #[test]
    fn aliases_share_the_original_backing() {
        let mut device = NullDevice::new();
        let mut registry = ResourceRegistry::new();
        registry.declare_texture("hdr", color_target());
        registry.alias_resource("hdr(2)", "hdr");

        registry.resolve_lifetime(&ResourceId::new("hdr"), 0);
        registry.resolve_lifetime(&ResourceId::new("hdr(2)"), 1);
        registry.realize_resources(&mut device);

        assert_eq!(device.live_texture_count(), 1);
        assert_eq!(
            registry.backing(&ResourceId::new("hdr")),
            registry.backing(&ResourceId::new("hdr(2)"))
        );
    }

    #[test]
    #[should_panic(expected = "still used at level")]
    fn overlapping_alias_lifetimes_panic() {
        let mut registry = ResourceRegistry::new();
        registry.declare_texture("hdr", color_target());
        registry.alias_resource("hdr(2)", "hdr");

        // Previous version still read at level 3, alias written at level 1.
        registry.resolve_lifetime(&ResourceId::new("hdr"), 3);
        registry.resolve_lifetime(&ResourceId::new("hdr(2)"), 1);
        registry.sanitize_aliasing_lifetimes();
    }

    #[test]
    fn tick_keeps_imports_and_retires_declared_backing() {
        let mut device = NullDevice::new();
        let mut registry = ResourceRegistry::new();
        let mut bin = GarbageBin::new(1);

        let backbuffer = device.create_texture(color_target());
        registry.import_texture(
            "backbuffer",
            backbuffer,
            ResourceState::UNDEFINED,
            ResourceState::PRESENT,
        );
        registry.declare_texture("hdr", color_target());
        registry.resolve_lifetime(&ResourceId::new("hdr"), 0);
        registry.resolve_lifetime(&ResourceId::new("backbuffer"), 1);
        registry.realize_resources(&mut device);
        assert_eq!(device.live_texture_count(), 2);

        registry.set_current_state(&ResourceId::new("backbuffer"), ResourceState::PRESENT);
        registry.tick(&mut bin);
        assert!(registry.contains(&ResourceId::new("backbuffer")));
        assert!(!registry.contains(&ResourceId::new("hdr")));
        assert_eq!(
            registry.current_state(&ResourceId::new("backbuffer")),
            ResourceState::UNDEFINED
        );

        // Declared backing is queued, not destroyed yet.
        assert_eq!(device.live_texture_count(), 2);
        bin.end_frame();
        bin.begin_frame(&mut device);
        assert_eq!(device.live_texture_count(), 1);
    }

    #[test]
    fn unused_declared_resources_are_not_realized() {
        let mut device = NullDevice::new();
        let mut registry = ResourceRegistry::new();
        registry.declare_texture("never-used", color_target());
        registry.realize_resources(&mut device);
        assert_eq!(device.live_texture_count(), 0);
    }
}
