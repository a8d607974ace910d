use crate::device::{
    BarrierDesc, BufferCopy, BufferDesc, BufferHandle, BufferViewDesc, CommandList,
    GraphicsDevice, MemoryLocation, RenderPassDesc, RenderPassHandle, TextureDesc, TextureHandle,
    TextureViewDesc, ViewDesc, ViewHandle,
};
use crate::handles::HandlePool;

struct NullBuffer {
    desc: BufferDesc,
    data: Vec<u8>,
}

struct NullView {
    descriptor: u32,
    _desc: ViewDesc,
}

#[derive(Clone, Debug)]
pub enum RecordedCommand {
    Barriers(Vec<BarrierDesc>),
    BeginRenderPass(RenderPassHandle),
    EndRenderPass,
    CopyBuffer {
        src: BufferHandle,
        dst: BufferHandle,
        regions: Vec<BufferCopy>,
    },
}

/// Headless [`GraphicsDevice`]: allocates real handles, keeps host-visible
/// and device-local buffer contents in CPU memory, and records every command
/// submitted so tests can assert on ordering and barrier contents. No GPU is
/// ever touched, so "in flight" completes instantly and `wait_idle` is free.
#[derive(Default)]
pub struct NullDevice {
    buffers: HandlePool<BufferHandle, NullBuffer>,
    textures: HandlePool<TextureHandle, TextureDesc>,
    views: HandlePool<ViewHandle, NullView>,
    render_passes: HandlePool<RenderPassHandle, RenderPassDesc>,
    command_lists: HandlePool<CommandList, Vec<RecordedCommand>>,
    submissions: Vec<Vec<RecordedCommand>>,
    next_descriptor: u32,
}

impl NullDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every barrier recorded across all submissions, in submission order.
    pub fn submitted_barriers(&self) -> Vec<BarrierDesc> {
        self.submissions
            .iter()
            .flatten()
            .filter_map(|cmd| match cmd {
                RecordedCommand::Barriers(barriers) => Some(barriers.iter().copied()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn submissions(&self) -> &[Vec<RecordedCommand>] {
        &self.submissions
    }

    pub fn buffer_contents(&self, buffer: BufferHandle) -> &[u8] {
        &self.buffers.get(buffer).data
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn live_view_count(&self) -> usize {
        self.views.len()
    }

    pub fn live_render_pass_count(&self) -> usize {
        self.render_passes.len()
    }

    fn record(&mut self, cmd: CommandList, command: RecordedCommand) {
        self.command_lists.get_mut(cmd).push(command);
    }
}

impl GraphicsDevice for NullDevice {
    fn create_buffer(&mut self, desc: BufferDesc) -> BufferHandle {
        assert!(desc.size > 0, "buffer needs a nonzero size");
        let data = vec![0u8; desc.size as usize];
        self.buffers.insert(NullBuffer { desc, data })
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(buffer);
    }

    fn create_texture(&mut self, desc: TextureDesc) -> TextureHandle {
        self.textures.insert(desc)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(texture);
    }

    fn create_texture_view(&mut self, texture: TextureHandle, desc: TextureViewDesc) -> ViewHandle {
        assert!(self.textures.contains(texture), "view of a dead texture");
        let descriptor = self.next_descriptor;
        self.next_descriptor += 1;
        self.views.insert(NullView {
            descriptor,
            _desc: ViewDesc::Texture(desc),
        })
    }

    fn create_buffer_view(&mut self, buffer: BufferHandle, desc: BufferViewDesc) -> ViewHandle {
        assert!(self.buffers.contains(buffer), "view of a dead buffer");
        let descriptor = self.next_descriptor;
        self.next_descriptor += 1;
        self.views.insert(NullView {
            descriptor,
            _desc: ViewDesc::Buffer(desc),
        })
    }

    fn destroy_view(&mut self, view: ViewHandle) {
        self.views.remove(view);
    }

    fn global_descriptor(&self, view: ViewHandle) -> u32 {
        self.views.get(view).descriptor
    }

    fn create_render_pass(&mut self, desc: RenderPassDesc) -> RenderPassHandle {
        assert!(!desc.is_empty(), "render pass needs at least one attachment");
        self.render_passes.insert(desc)
    }

    fn destroy_render_pass(&mut self, render_pass: RenderPassHandle) {
        self.render_passes.remove(render_pass);
    }

    fn allocate_command_list(&mut self) -> CommandList {
        self.command_lists.insert(Vec::new())
    }

    fn submit_command_list(&mut self, cmd: CommandList) -> anyhow::Result<()> {
        let commands = std::mem::take(self.command_lists.get_mut(cmd));
        self.submissions.push(commands);
        Ok(())
    }

    fn recycle_command_list(&mut self, cmd: CommandList) {
        self.command_lists.remove(cmd);
    }

    fn cmd_barriers(&mut self, cmd: CommandList, barriers: &[BarrierDesc]) {
        for barrier in barriers {
            log::trace!("barrier {:?}: {} -> {}", barrier.resource, barrier.before, barrier.after);
        }
        self.record(cmd, RecordedCommand::Barriers(barriers.to_vec()));
    }

    fn cmd_begin_render_pass(&mut self, cmd: CommandList, render_pass: RenderPassHandle) {
        assert!(
            self.render_passes.contains(render_pass),
            "begin of a dead render pass"
        );
        self.record(cmd, RecordedCommand::BeginRenderPass(render_pass));
    }

    fn cmd_end_render_pass(&mut self, cmd: CommandList) {
        self.record(cmd, RecordedCommand::EndRenderPass);
    }

    fn cmd_copy_buffer(
        &mut self,
        cmd: CommandList,
        src: BufferHandle,
        dst: BufferHandle,
        regions: &[BufferCopy],
    ) {
        // Headless: apply the copy immediately.
        for region in regions {
            let bytes = self.buffers.get(src).data
                [region.src_offset as usize..(region.src_offset + region.size) as usize]
                .to_vec();
            let dst_data = &mut self.buffers.get_mut(dst).data;
            dst_data[region.dst_offset as usize..(region.dst_offset + region.size) as usize]
                .copy_from_slice(&bytes);
        }
        self.record(
            cmd,
            RecordedCommand::CopyBuffer {
                src,
                dst,
                regions: regions.to_vec(),
            },
        );
    }

    fn write_mapped(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        let target = self.buffers.get_mut(buffer);
        assert!(
            target.desc.memory == MemoryLocation::HostVisible,
            "write_mapped on a device-local buffer"
        );
        target.data[offset as usize..offset as usize + data.len()].copy_from_slice(data);
    }

    fn wait_idle(&mut self) {}
}
