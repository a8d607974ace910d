use std::collections::HashMap;

use anyhow::Context;

use crate::device::{
    BarrierDesc, CommandList, DepthAttachment, GraphicsDevice, RenderPassDesc,
    RenderTargetAttachment,
};
use crate::garbage::{Deletion, GarbageBin};
use crate::graph::level::{DependencyLevel, PendingBarrier};
use crate::graph::pass::{Pass, PassBuilder, PassResources, ViewRequest, WriteKind};
use crate::graph::registry::ResourceRegistry;
use crate::graph::resource::ResourceId;
use ash::vk;

pub(crate) struct ProxyLink {
    pub reader: usize,
    pub writer: usize,
    pub id: ResourceId,
}

/// Per-frame write/read bookkeeping behind the builder's auto-aliasing:
/// which pass currently writes each id, who reads it, and which alias
/// generation a base name has reached.
#[derive(Default)]
pub(crate) struct AliasState {
    latest: HashMap<ResourceId, ResourceId>,
    generations: HashMap<ResourceId, u32>,
    writer_of: HashMap<ResourceId, usize>,
    readers_of: HashMap<ResourceId, Vec<usize>>,
    pending_proxies: Vec<ProxyLink>,
}

impl AliasState {
    /// Current generation an id resolves to; the id itself until aliased.
    pub(crate) fn latest(&self, base: &ResourceId) -> ResourceId {
        self.latest.get(base).cloned().unwrap_or_else(|| base.clone())
    }

    pub(crate) fn set_latest(&mut self, base: ResourceId, current: ResourceId) {
        self.latest.insert(base, current);
    }

    pub(crate) fn next_generation(&mut self, base: &ResourceId) -> ResourceId {
        let generation = self.generations.entry(base.clone()).or_insert(1);
        *generation += 1;
        base.generation(*generation)
    }

    pub(crate) fn writer_of(&self, id: &ResourceId) -> Option<usize> {
        self.writer_of.get(id).copied()
    }

    pub(crate) fn note_writer(&mut self, id: ResourceId, pass: usize) {
        self.writer_of.insert(id, pass);
    }

    pub(crate) fn note_reader(&mut self, id: ResourceId, pass: usize) {
        self.readers_of.entry(id).or_default().push(pass);
    }

    pub(crate) fn readers_of(&self, id: &ResourceId) -> Vec<usize> {
        self.readers_of.get(id).cloned().unwrap_or_default()
    }

    pub(crate) fn queue_proxy(&mut self, reader: usize, writer: usize, id: ResourceId) {
        self.pending_proxies.push(ProxyLink { reader, writer, id });
    }

    fn take_proxies(&mut self) -> Vec<ProxyLink> {
        std::mem::take(&mut self.pending_proxies)
    }

    fn reset(&mut self) {
        self.latest.clear();
        self.generations.clear();
        self.writer_of.clear();
        self.readers_of.clear();
        self.pending_proxies.clear();
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum GraphPhase {
    Recording,
    Built,
    Executed,
}

/// Frame render graph. Rebuilt every frame: record passes, `build` to
/// schedule them, `execute` to record and submit, `clear` to recycle.
///
/// Build derives everything from declared IO: pass adjacency, a topological
/// order, longest-path dependency levels, resource and view realization, and
/// one batch of entry barriers per level.
pub struct RenderGraph {
    passes: Vec<Pass>,
    aliases: AliasState,
    levels: Vec<DependencyLevel>,
    phase: GraphPhase,
}

impl Default for RenderGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderGraph {
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            aliases: AliasState::default(),
            levels: Vec::new(),
            phase: GraphPhase::Recording,
        }
    }

    /// Record a pass. `build` declares the pass's IO immediately; its return
    /// value is captured and handed back to `exec` every time the pass runs.
    pub fn add_pass<T, B, E>(
        &mut self,
        registry: &mut ResourceRegistry,
        name: impl AsRef<str>,
        build: B,
        exec: E,
    ) where
        T: 'static,
        B: FnOnce(&mut PassBuilder<'_>) -> T,
        E: FnMut(&mut dyn GraphicsDevice, CommandList, &PassResources, &T) + 'static,
    {
        assert!(
            self.phase == GraphPhase::Recording,
            "add_pass outside the recording phase"
        );
        let pass_index = self.passes.len();
        let mut pass = Pass::new(name.as_ref());
        let data = build(&mut PassBuilder {
            registry,
            aliases: &mut self.aliases,
            pass: &mut pass,
            pass_index,
        });
        let mut exec = exec;
        pass.exec = Some(Box::new(
            move |device: &mut dyn GraphicsDevice, cmd: CommandList, resources: &PassResources| {
                exec(device, cmd, resources, &data)
            },
        ));
        log::trace!(
            "pass '{}': {} reads, {} writes",
            pass.name,
            pass.reads.len(),
            pass.writes.len()
        );
        self.passes.push(pass);
    }

    /// Schedule the recorded passes and realize their resources and views.
    pub fn build(&mut self, registry: &mut ResourceRegistry, device: &mut dyn GraphicsDevice) {
        assert!(
            self.phase == GraphPhase::Recording,
            "build without clearing the previous frame"
        );
        self.flush_proxies();
        let adjacency = self.build_adjacency();
        let order = self.sort_topological(&adjacency);
        self.assign_levels(&adjacency, &order);
        self.track_lifetimes(registry);
        registry.sanitize_aliasing_lifetimes();
        registry.realize_resources(device);
        self.realize_views(registry, device);
        self.track_transitions(registry);
        self.phase = GraphPhase::Built;
        log::debug!(
            "graph built: {} passes across {} levels",
            self.passes.len(),
            self.levels.len()
        );
    }

    /// Record one command list for the whole frame and submit it. The list
    /// itself is recycled through the bin one rotation later.
    pub fn execute(
        &mut self,
        registry: &mut ResourceRegistry,
        bin: &mut GarbageBin,
        device: &mut dyn GraphicsDevice,
    ) -> anyhow::Result<()> {
        assert!(self.phase == GraphPhase::Built, "execute before build");
        let cmd = device.allocate_command_list();

        let levels = std::mem::take(&mut self.levels);
        for level in &levels {
            let barriers: Vec<BarrierDesc> = level
                .barriers
                .iter()
                .map(|barrier| BarrierDesc {
                    resource: registry.backing(&barrier.id),
                    before: barrier.before,
                    after: barrier.after,
                })
                .collect();
            if !barriers.is_empty() {
                device.cmd_barriers(cmd, &barriers);
            }

            for &pass_index in &level.passes {
                let pass = &mut self.passes[pass_index];
                log::trace!("executing pass '{}' (level {})", pass.name, level.index);
                let render_pass = pass.render_pass;
                if let Some(render_pass) = render_pass {
                    device.cmd_begin_render_pass(cmd, render_pass);
                }
                let Pass {
                    exec, resources, ..
                } = pass;
                if let Some(exec) = exec.as_mut() {
                    exec(device, cmd, resources);
                }
                if render_pass.is_some() {
                    device.cmd_end_render_pass(cmd);
                }
            }
        }
        self.levels = levels;

        let mut tail = registry.imported_exit_transitions();
        tail.extend(registry.declared_to_init_transitions());
        if !tail.is_empty() {
            device.cmd_barriers(cmd, &tail);
        }

        device
            .submit_command_list(cmd)
            .context("submitting the frame command list")?;
        bin.push(Deletion::CommandList(cmd));
        self.phase = GraphPhase::Executed;
        Ok(())
    }

    /// Recycle the frame: defer-free realized views and render passes, drop
    /// the pass list, return to recording.
    pub fn clear(&mut self, bin: &mut GarbageBin) {
        for pass in self.passes.drain(..) {
            let Pass {
                resources,
                render_pass,
                ..
            } = pass;
            for view in resources.into_views() {
                bin.push(Deletion::View(view));
            }
            if let Some(render_pass) = render_pass {
                bin.push(Deletion::RenderPass(render_pass));
            }
        }
        self.levels.clear();
        self.aliases.reset();
        self.phase = GraphPhase::Recording;
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Dependency level a pass landed on; meaningful once built.
    pub fn level_of(&self, name: &str) -> Option<u32> {
        self.passes
            .iter()
            .find(|pass| pass.name == name)
            .map(|pass| pass.level)
    }

    fn flush_proxies(&mut self) {
        for link in self.aliases.take_proxies() {
            self.passes[link.reader].order_writes.push(link.id.clone());
            self.passes[link.writer].order_reads.push(link.id);
        }
    }

    /// O(P^2) edge derivation: pass `i` precedes pass `j` when something `i`
    /// writes is read by `j`, compared by resource identity.
    fn build_adjacency(&self) -> Vec<Vec<usize>> {
        let mut adjacency = vec![Vec::new(); self.passes.len()];
        for (i, producer) in self.passes.iter().enumerate() {
            for (j, consumer) in self.passes.iter().enumerate() {
                if i == j {
                    continue;
                }
                let depends = consumer
                    .read_ids()
                    .any(|read| producer.write_ids().any(|write| write == read));
                if depends {
                    adjacency[i].push(j);
                }
            }
        }
        adjacency
    }

    /// Post-order depth-first search, reversed. Deterministic for a given
    /// recording order.
    fn sort_topological(&self, adjacency: &[Vec<usize>]) -> Vec<usize> {
        #[derive(Copy, Clone, PartialEq)]
        enum Mark {
            Unvisited,
            OnStack,
            Done,
        }

        fn visit(
            node: usize,
            adjacency: &[Vec<usize>],
            passes: &[Pass],
            marks: &mut [Mark],
            order: &mut Vec<usize>,
        ) {
            match marks[node] {
                Mark::Done => return,
                Mark::OnStack => panic!(
                    "render graph has a dependency cycle through pass '{}'",
                    passes[node].name
                ),
                Mark::Unvisited => {}
            }
            marks[node] = Mark::OnStack;
            for &next in &adjacency[node] {
                visit(next, adjacency, passes, marks, order);
            }
            marks[node] = Mark::Done;
            order.push(node);
        }

        let mut marks = vec![Mark::Unvisited; self.passes.len()];
        let mut order = Vec::with_capacity(self.passes.len());
        for node in 0..self.passes.len() {
            visit(node, adjacency, &self.passes, &mut marks, &mut order);
        }
        order.reverse();
        order
    }

    /// Longest-path layering: a pass's level is one more than the deepest of
    /// its producers, so independent passes share a level.
    fn assign_levels(&mut self, adjacency: &[Vec<usize>], order: &[usize]) {
        if self.passes.is_empty() {
            self.levels.clear();
            return;
        }
        let mut level = vec![0u32; self.passes.len()];
        for &node in order {
            for &next in &adjacency[node] {
                level[next] = level[next].max(level[node] + 1);
            }
        }

        let deepest = level.iter().copied().max().unwrap_or(0);
        self.levels = (0..=deepest).map(DependencyLevel::new).collect();
        for (pass_index, &pass_level) in level.iter().enumerate() {
            self.passes[pass_index].level = pass_level;
            self.levels[pass_level as usize].passes.push(pass_index);
        }
    }

    fn track_lifetimes(&self, registry: &mut ResourceRegistry) {
        for pass in &self.passes {
            for read in &pass.reads {
                registry.resolve_lifetime(&read.id, pass.level);
            }
            for write in &pass.writes {
                registry.resolve_lifetime(&write.id, pass.level);
            }
        }
    }

    /// Two-phase view realization. The first sweep realizes every attachment
    /// access (writes plus read-only depth) and assembles each pass's render
    /// pass; the second realizes sampled/storage read views, by which point
    /// every producer is known.
    fn realize_views(&mut self, registry: &mut ResourceRegistry, device: &mut dyn GraphicsDevice) {
        for pass_index in 0..self.passes.len() {
            let pass = &self.passes[pass_index];
            let mut realized = Vec::new();
            let mut render_pass_desc = RenderPassDesc::default();

            for write in &pass.writes {
                match &write.kind {
                    WriteKind::Color { access, view } => {
                        let texture = registry.texture(&write.id);
                        let handle = device.create_texture_view(texture, *view);
                        let (load_op, store_op) = access.load_store();
                        let clear_color = registry
                            .texture_desc(&write.id)
                            .map(|desc| desc.clear_color)
                            .unwrap_or([0.0, 0.0, 0.0, 1.0]);
                        render_pass_desc.render_targets.push(RenderTargetAttachment {
                            view: handle,
                            load_op,
                            store_op,
                            clear_color,
                        });
                        realized.push((write.id.clone(), handle));
                    }
                    WriteKind::Depth {
                        depth_access,
                        stencil_access,
                        view,
                    } => {
                        assert!(
                            render_pass_desc.depth_stencil.is_none(),
                            "pass '{}' declares two depth attachments",
                            pass.name
                        );
                        let texture = registry.texture(&write.id);
                        let handle = device.create_texture_view(texture, *view);
                        let (depth_load_op, depth_store_op) = depth_access.load_store();
                        let (stencil_load_op, stencil_store_op) = stencil_access.load_store();
                        let desc = registry.texture_desc(&write.id);
                        render_pass_desc.depth_stencil = Some(DepthAttachment {
                            view: handle,
                            depth_load_op,
                            depth_store_op,
                            stencil_load_op,
                            stencil_store_op,
                            depth_clear: desc.map(|d| d.depth_clear).unwrap_or(0.0),
                            stencil_clear: desc.map(|d| d.stencil_clear).unwrap_or(0),
                            read_only: false,
                        });
                        realized.push((write.id.clone(), handle));
                    }
                    WriteKind::Storage(request) => {
                        let handle = match request {
                            ViewRequest::Texture(view) => {
                                device.create_texture_view(registry.texture(&write.id), *view)
                            }
                            ViewRequest::Buffer(view) => {
                                device.create_buffer_view(registry.buffer(&write.id), *view)
                            }
                        };
                        realized.push((write.id.clone(), handle));
                    }
                    WriteKind::Copy => {}
                }
            }

            for read in &pass.reads {
                if !read.depth_attachment {
                    continue;
                }
                let Some(ViewRequest::Texture(view)) = read.view else {
                    continue;
                };
                if !registry.is_imported(&read.id) {
                    assert!(
                        self.aliases.writer_of(&read.id).is_some(),
                        "pass '{}' reads '{}' which no pass writes",
                        pass.name,
                        read.id
                    );
                }
                assert!(
                    render_pass_desc.depth_stencil.is_none(),
                    "pass '{}' declares two depth attachments",
                    pass.name
                );
                let handle = device.create_texture_view(registry.texture(&read.id), view);
                render_pass_desc.depth_stencil = Some(DepthAttachment {
                    view: handle,
                    depth_load_op: vk::AttachmentLoadOp::LOAD,
                    depth_store_op: vk::AttachmentStoreOp::STORE,
                    stencil_load_op: vk::AttachmentLoadOp::LOAD,
                    stencil_store_op: vk::AttachmentStoreOp::STORE,
                    depth_clear: 0.0,
                    stencil_clear: 0,
                    read_only: true,
                });
                realized.push((read.id.clone(), handle));
            }

            let pass = &mut self.passes[pass_index];
            for (id, handle) in realized {
                let descriptor = device.global_descriptor(handle);
                pass.resources.insert(id, handle, descriptor);
            }
            if !render_pass_desc.is_empty() {
                pass.render_pass = Some(device.create_render_pass(render_pass_desc));
            }
        }

        for pass_index in 0..self.passes.len() {
            let pass = &self.passes[pass_index];
            let mut realized = Vec::new();
            for read in &pass.reads {
                if read.depth_attachment {
                    continue;
                }
                if !registry.is_imported(&read.id) {
                    assert!(
                        self.aliases.writer_of(&read.id).is_some(),
                        "pass '{}' reads '{}' which no pass writes",
                        pass.name,
                        read.id
                    );
                }
                let Some(request) = read.view else {
                    continue;
                };
                let handle = match request {
                    ViewRequest::Texture(view) => {
                        device.create_texture_view(registry.texture(&read.id), view)
                    }
                    ViewRequest::Buffer(view) => {
                        device.create_buffer_view(registry.buffer(&read.id), view)
                    }
                };
                realized.push((read.id.clone(), handle));
            }

            let pass = &mut self.passes[pass_index];
            for (id, handle) in realized {
                let descriptor = device.global_descriptor(handle);
                pass.resources.insert(id, handle, descriptor);
            }
        }
    }

    /// Fold each level's accesses into one desired state per underlying
    /// resource and emit an entry barrier where the state changes. Multiple
    /// readers OR together; a writer is exclusive within its level.
    fn track_transitions(&mut self, registry: &mut ResourceRegistry) {
        for level in &mut self.levels {
            let mut desired: Vec<(ResourceId, crate::state::ResourceState, bool)> = Vec::new();
            for &pass_index in &level.passes {
                let pass = &self.passes[pass_index];
                for write in &pass.writes {
                    let root = registry.root_of(&write.id);
                    assert!(
                        !desired.iter().any(|(id, _, _)| *id == root),
                        "resource '{root}' is written while also accessed in level {}",
                        level.index
                    );
                    desired.push((root, write.state, true));
                }
                for read in &pass.reads {
                    let root = registry.root_of(&read.id);
                    if let Some(entry) = desired.iter_mut().find(|(id, _, _)| *id == root) {
                        assert!(
                            !entry.2,
                            "resource '{root}' is both read and written in level {}",
                            level.index
                        );
                        entry.1 = entry.1.combine_read(read.state);
                    } else {
                        desired.push((root, read.state, false));
                    }
                }
            }

            for (root, after, _) in desired {
                let before = registry.current_state(&root);
                registry.set_current_state(&root, after);
                if before != after {
                    log::trace!("level {}: '{root}' {before} -> {after}", level.index);
                    level.barriers.push(PendingBarrier {
                        id: root,
                        before,
                        after,
                    });
                }
            }
        }
    }
}
