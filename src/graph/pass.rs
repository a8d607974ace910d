use std::collections::HashMap;

use smallvec::SmallVec;

use crate::device::{
    AccessPolicy, BufferDesc, BufferHandle, BufferViewDesc, CommandList, GraphicsDevice,
    RenderPassHandle, TextureDesc, TextureHandle, TextureViewDesc, ViewHandle, ViewType,
};
use crate::graph::graph::AliasState;
use crate::graph::registry::ResourceRegistry;
use crate::graph::resource::ResourceId;
use crate::state::ResourceState;

pub(crate) type ExecFn = Box<dyn FnMut(&mut dyn GraphicsDevice, CommandList, &PassResources)>;

#[derive(Copy, Clone)]
pub(crate) enum ViewRequest {
    Texture(TextureViewDesc),
    Buffer(BufferViewDesc),
}

pub(crate) struct PassRead {
    pub id: ResourceId,
    pub state: ResourceState,
    pub view: Option<ViewRequest>,
    /// Read-only depth attachment rather than a sampled view.
    pub depth_attachment: bool,
}

pub(crate) enum WriteKind {
    Color {
        access: AccessPolicy,
        view: TextureViewDesc,
    },
    Depth {
        depth_access: AccessPolicy,
        stencil_access: AccessPolicy,
        view: TextureViewDesc,
    },
    Storage(ViewRequest),
    Copy,
}

pub(crate) struct PassWrite {
    pub id: ResourceId,
    pub state: ResourceState,
    pub kind: WriteKind,
}

/// One scheduled unit of GPU work: declared IO plus the closure that records
/// its commands once the graph has realized views and computed barriers.
pub struct Pass {
    pub(crate) name: String,
    pub(crate) reads: SmallVec<[PassRead; 8]>,
    pub(crate) writes: SmallVec<[PassWrite; 4]>,
    /// Ordering-only edges (proxies, alias anti-dependencies); no views, no
    /// states, no lifetimes.
    pub(crate) order_reads: SmallVec<[ResourceId; 4]>,
    pub(crate) order_writes: SmallVec<[ResourceId; 4]>,
    pub(crate) render_pass: Option<RenderPassHandle>,
    pub(crate) resources: PassResources,
    pub(crate) exec: Option<ExecFn>,
    pub(crate) level: u32,
}

impl Pass {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            reads: SmallVec::new(),
            writes: SmallVec::new(),
            order_reads: SmallVec::new(),
            order_writes: SmallVec::new(),
            render_pass: None,
            resources: PassResources::default(),
            exec: None,
            level: 0,
        }
    }

    pub(crate) fn read_ids(&self) -> impl Iterator<Item = &ResourceId> {
        self.reads
            .iter()
            .map(|read| &read.id)
            .chain(self.order_reads.iter())
    }

    pub(crate) fn write_ids(&self) -> impl Iterator<Item = &ResourceId> {
        self.writes
            .iter()
            .map(|write| &write.id)
            .chain(self.order_writes.iter())
    }
}

/// Views and bindless descriptors realized for one pass, handed to its exec
/// closure at execute time.
#[derive(Default)]
pub struct PassResources {
    entries: HashMap<ResourceId, (ViewHandle, u32)>,
}

impl PassResources {
    pub fn view(&self, id: impl Into<ResourceId>) -> ViewHandle {
        let id = id.into();
        self.entries
            .get(&id)
            .unwrap_or_else(|| panic!("no realized view for '{id}' in this pass"))
            .0
    }

    /// Bindless descriptor index of the view realized for `id`.
    pub fn descriptor(&self, id: impl Into<ResourceId>) -> u32 {
        let id = id.into();
        self.entries
            .get(&id)
            .unwrap_or_else(|| panic!("no realized view for '{id}' in this pass"))
            .1
    }

    pub(crate) fn insert(&mut self, id: ResourceId, view: ViewHandle, descriptor: u32) {
        self.entries.insert(id, (view, descriptor));
    }

    pub(crate) fn into_views(self) -> impl Iterator<Item = ViewHandle> {
        self.entries.into_values().map(|(view, _)| view)
    }
}

/// Declaration surface handed to a pass's build closure. Reads and writes
/// name logical resources; a write to an already-written resource silently
/// becomes the next alias generation, with anti-dependency proxies keeping
/// earlier readers ordered before the new writer.
pub struct PassBuilder<'a> {
    pub(crate) registry: &'a mut ResourceRegistry,
    pub(crate) aliases: &'a mut AliasState,
    pub(crate) pass: &'a mut Pass,
    pub(crate) pass_index: usize,
}

impl PassBuilder<'_> {
    pub fn declare_texture(&mut self, id: impl Into<ResourceId>, desc: TextureDesc) -> ResourceId {
        self.registry.declare_texture(id, desc)
    }

    pub fn declare_buffer(&mut self, id: impl Into<ResourceId>, desc: BufferDesc) -> ResourceId {
        self.registry.declare_buffer(id, desc)
    }

    pub fn import_texture(
        &mut self,
        id: impl Into<ResourceId>,
        texture: TextureHandle,
        entry_state: ResourceState,
        exit_state: ResourceState,
    ) -> ResourceId {
        self.registry
            .import_texture(id, texture, entry_state, exit_state)
    }

    pub fn import_buffer(
        &mut self,
        id: impl Into<ResourceId>,
        buffer: BufferHandle,
        entry_state: ResourceState,
        exit_state: ResourceState,
    ) -> ResourceId {
        self.registry
            .import_buffer(id, buffer, entry_state, exit_state)
    }

    pub fn declare_proxy(&mut self, id: impl Into<ResourceId>) -> ResourceId {
        self.registry.declare_proxy(id)
    }

    pub fn read_texture(
        &mut self,
        id: impl Into<ResourceId>,
        state: ResourceState,
        view: TextureViewDesc,
    ) {
        self.read_common(id.into(), state, Some(ViewRequest::Texture(view)), false);
    }

    pub fn read_buffer(
        &mut self,
        id: impl Into<ResourceId>,
        state: ResourceState,
        view: BufferViewDesc,
    ) {
        self.read_common(id.into(), state, Some(ViewRequest::Buffer(view)), false);
    }

    /// Bind the depth target read-only while still testing against it.
    pub fn read_depth_stencil(&mut self, id: impl Into<ResourceId>, view: TextureViewDesc) {
        assert!(
            view.view_type == ViewType::DepthStencil,
            "read_depth_stencil needs a depth-stencil view"
        );
        self.read_common(
            id.into(),
            ResourceState::DEPTH_READ,
            Some(ViewRequest::Texture(view.depth_read_only())),
            true,
        );
    }

    pub fn write_render_target(
        &mut self,
        id: impl Into<ResourceId>,
        access: AccessPolicy,
        view: TextureViewDesc,
    ) {
        assert!(
            view.view_type == ViewType::RenderTarget,
            "write_render_target needs a render-target view"
        );
        self.write_common(
            id.into(),
            ResourceState::RENDER_TARGET,
            WriteKind::Color { access, view },
        );
    }

    pub fn write_depth_stencil(
        &mut self,
        id: impl Into<ResourceId>,
        depth_access: AccessPolicy,
        stencil_access: AccessPolicy,
        view: TextureViewDesc,
    ) {
        assert!(
            view.view_type == ViewType::DepthStencil,
            "write_depth_stencil needs a depth-stencil view"
        );
        self.write_common(
            id.into(),
            ResourceState::DEPTH_WRITE,
            WriteKind::Depth {
                depth_access,
                stencil_access,
                view,
            },
        );
    }

    /// Read-write storage access; counts as the resource's writer.
    pub fn read_write_texture(&mut self, id: impl Into<ResourceId>, view: TextureViewDesc) {
        self.write_common(
            id.into(),
            ResourceState::UNORDERED_ACCESS,
            WriteKind::Storage(ViewRequest::Texture(view)),
        );
    }

    pub fn read_write_buffer(&mut self, id: impl Into<ResourceId>, view: BufferViewDesc) {
        self.write_common(
            id.into(),
            ResourceState::STORAGE_BUFFER,
            WriteKind::Storage(ViewRequest::Buffer(view)),
        );
    }

    /// Transfer destination; the exec closure records the copy itself.
    pub fn copy_to(&mut self, id: impl Into<ResourceId>) {
        self.write_common(id.into(), ResourceState::COPY_DST, WriteKind::Copy);
    }

    pub fn copy_from(&mut self, id: impl Into<ResourceId>) {
        self.read_common(id.into(), ResourceState::COPY_SRC, None, false);
    }

    /// Ordering-only edge: this pass counts as the proxy's producer.
    pub fn proxy_write(&mut self, id: impl Into<ResourceId>) {
        self.pass.order_writes.push(id.into());
    }

    pub fn proxy_read(&mut self, id: impl Into<ResourceId>) {
        self.pass.order_reads.push(id.into());
    }

    fn read_common(
        &mut self,
        id: ResourceId,
        state: ResourceState,
        view: Option<ViewRequest>,
        depth_attachment: bool,
    ) {
        assert!(
            state.is_read(),
            "pass '{}' declares non-read state {state} for reading '{id}'",
            self.pass.name
        );
        let current = self.aliases.latest(&id);
        self.aliases.note_reader(current.clone(), self.pass_index);
        self.pass.reads.push(PassRead {
            id: current,
            state,
            view,
            depth_attachment,
        });
    }

    fn write_common(&mut self, id: ResourceId, state: ResourceState, kind: WriteKind) {
        let current = self.aliases.latest(&id);
        let target = if self.aliases.writer_of(&current).is_some() {
            // Second writer: the resource forks into its next alias
            // generation, ordered after the previous writer and after every
            // reader of the previous version.
            let next = self.aliases.next_generation(&id);
            self.registry.alias_resource(next.clone(), current.clone());
            log::debug!(
                "pass '{}' aliases '{current}' as '{next}'",
                self.pass.name
            );
            for reader in self.aliases.readers_of(&current) {
                if reader == self.pass_index {
                    continue;
                }
                let proxy = self.registry.declare_proxy(format!("{next}.war{reader}"));
                self.aliases.queue_proxy(reader, self.pass_index, proxy);
            }
            self.pass.order_reads.push(current);
            self.aliases.set_latest(id, next.clone());
            next
        } else {
            current
        };
        self.aliases.note_writer(target.clone(), self.pass_index);
        self.pass.writes.push(PassWrite { id: target, state, kind });
    }
}
