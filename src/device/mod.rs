mod null;
mod types;

pub use null::{NullDevice, RecordedCommand};
pub use types::{
    AccessPolicy, BarrierDesc, BufferCopy, BufferDesc, BufferViewDesc, DepthAttachment,
    GpuResource, MemoryLocation, RenderPassDesc, RenderTargetAttachment, TextureDesc,
    TextureViewDesc, ViewDesc, ViewType,
};

use slotmap::new_key_type;

new_key_type! { pub struct BufferHandle; }
new_key_type! { pub struct TextureHandle; }
new_key_type! { pub struct ViewHandle; }
new_key_type! { pub struct RenderPassHandle; }
new_key_type! { pub struct CommandList; }

/// The graphics API boundary. Everything the graph, tables and garbage bin
/// need from the backend, and nothing else; resource lifetimes above this
/// trait are the crate's responsibility, lifetimes below it are the
/// implementation's.
///
/// Creation failures are backend bugs or exhausted static budgets and may
/// panic; only command recording/submission is modelled as fallible.
pub trait GraphicsDevice {
    fn create_buffer(&mut self, desc: BufferDesc) -> BufferHandle;
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    fn create_texture(&mut self, desc: TextureDesc) -> TextureHandle;
    fn destroy_texture(&mut self, texture: TextureHandle);

    fn create_texture_view(&mut self, texture: TextureHandle, desc: TextureViewDesc) -> ViewHandle;
    fn create_buffer_view(&mut self, buffer: BufferHandle, desc: BufferViewDesc) -> ViewHandle;
    fn destroy_view(&mut self, view: ViewHandle);

    /// Index of the view in the backend's bindless descriptor table.
    fn global_descriptor(&self, view: ViewHandle) -> u32;

    fn create_render_pass(&mut self, desc: RenderPassDesc) -> RenderPassHandle;
    fn destroy_render_pass(&mut self, render_pass: RenderPassHandle);

    fn allocate_command_list(&mut self) -> CommandList;
    fn submit_command_list(&mut self, cmd: CommandList) -> anyhow::Result<()>;
    fn recycle_command_list(&mut self, cmd: CommandList);

    fn cmd_barriers(&mut self, cmd: CommandList, barriers: &[BarrierDesc]);
    fn cmd_begin_render_pass(&mut self, cmd: CommandList, render_pass: RenderPassHandle);
    fn cmd_end_render_pass(&mut self, cmd: CommandList);
    fn cmd_copy_buffer(
        &mut self,
        cmd: CommandList,
        src: BufferHandle,
        dst: BufferHandle,
        regions: &[BufferCopy],
    );

    /// Write into a host-visible buffer's mapped memory.
    fn write_mapped(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]);

    /// Block until the GPU has drained all submitted work.
    fn wait_idle(&mut self);
}
