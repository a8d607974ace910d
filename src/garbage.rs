use std::sync::{Arc, Mutex};

use crate::device::{
    BufferHandle, CommandList, GraphicsDevice, RenderPassHandle, TextureHandle, ViewHandle,
};
use crate::memory::{Allocation, FreeListAllocator};

/// One deferred destruction. The `Range` arm carries the allocator that owns
/// the sub-range, so the bin can return it without reaching back into the
/// table that handed it out.
pub enum Deletion {
    Buffer(BufferHandle),
    Texture(TextureHandle),
    View(ViewHandle),
    RenderPass(RenderPassHandle),
    CommandList(CommandList),
    Range(Arc<Mutex<FreeListAllocator>>, Allocation),
}

/// Deferred-deletion ring with one queue per frame in flight.
///
/// A deletion pushed while the cursor sits on slot `k` is executed by the
/// `begin_frame` that next lands on slot `k`, one full rotation later. By
/// then every command list that could have referenced the resource has
/// retired, so destruction is safe without a per-resource fence.
pub struct GarbageBin {
    slots: Vec<Vec<Deletion>>,
    cursor: usize,
}

impl GarbageBin {
    pub fn new(frames_in_flight: usize) -> Self {
        assert!(frames_in_flight > 0, "garbage bin needs at least one slot");
        Self {
            slots: (0..frames_in_flight).map(|_| Vec::new()).collect(),
            cursor: 0,
        }
    }

    pub fn push(&mut self, deletion: Deletion) {
        self.slots[self.cursor].push(deletion);
    }

    /// Execute everything queued a full rotation ago, then make the slot
    /// current for this frame's deletions.
    pub fn begin_frame(&mut self, device: &mut dyn GraphicsDevice) {
        let ready = std::mem::take(&mut self.slots[self.cursor]);
        if !ready.is_empty() {
            log::trace!("garbage bin slot {}: {} deletions", self.cursor, ready.len());
        }
        for deletion in ready {
            Self::execute(device, deletion);
        }
    }

    pub fn end_frame(&mut self) {
        self.cursor = (self.cursor + 1) % self.slots.len();
    }

    /// Drain every slot immediately. Only valid once the device has been
    /// flushed with `wait_idle`, typically at shutdown.
    pub fn force_clear(&mut self, device: &mut dyn GraphicsDevice) {
        for slot in &mut self.slots {
            for deletion in std::mem::take(slot) {
                Self::execute(device, deletion);
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }

    fn execute(device: &mut dyn GraphicsDevice, deletion: Deletion) {
        match deletion {
            Deletion::Buffer(buffer) => device.destroy_buffer(buffer),
            Deletion::Texture(texture) => device.destroy_texture(texture),
            Deletion::View(view) => device.destroy_view(view),
            Deletion::RenderPass(render_pass) => device.destroy_render_pass(render_pass),
            Deletion::CommandList(cmd) => device.recycle_command_list(cmd),
            Deletion::Range(allocator, alloc) => {
                let mut allocator = allocator
                    .lock()
                    .expect("table allocator mutex poisoned");
                allocator.free(alloc);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{BufferDesc, NullDevice};
    use crate::memory::AllocPolicy;

    #[test]
    fn deletion_waits_a_full_rotation() {
        let mut device = NullDevice::new();
        let mut bin = GarbageBin::new(3);
        let buffer = device.create_buffer(BufferDesc::default().size(4));

        bin.begin_frame(&mut device);
        bin.push(Deletion::Buffer(buffer));
        bin.end_frame();

        // Two more frames pass; the buffer must still be alive.
        for _ in 0..2 {
            bin.begin_frame(&mut device);
            assert_eq!(device.live_buffer_count(), 1);
            bin.end_frame();
        }

        // Cursor is back on the slot the deletion was pushed into.
        bin.begin_frame(&mut device);
        assert_eq!(device.live_buffer_count(), 0);
    }

    #[test]
    fn ring_keeps_cycling_across_many_frames() {
        let mut device = NullDevice::new();
        let mut bin = GarbageBin::new(2);

        for _ in 0..8 {
            bin.begin_frame(&mut device);
            let buffer = device.create_buffer(BufferDesc::default().size(4));
            bin.push(Deletion::Buffer(buffer));
            bin.end_frame();
        }
        // Only the last two frames' buffers can still be queued.
        assert_eq!(device.live_buffer_count(), 2);
        assert_eq!(bin.pending(), 2);
    }

    #[test]
    fn force_clear_drains_every_slot() {
        let mut device = NullDevice::new();
        let mut bin = GarbageBin::new(3);

        for _ in 0..3 {
            bin.begin_frame(&mut device);
            let buffer = device.create_buffer(BufferDesc::default().size(4));
            bin.push(Deletion::Buffer(buffer));
            bin.end_frame();
        }
        assert_eq!(device.live_buffer_count(), 3);

        device.wait_idle();
        bin.force_clear(&mut device);
        assert_eq!(device.live_buffer_count(), 0);
        assert_eq!(bin.pending(), 0);
    }

    #[test]
    fn range_deletion_returns_the_sub_allocation() {
        let mut device = NullDevice::new();
        let mut bin = GarbageBin::new(1);
        let allocator = Arc::new(Mutex::new(FreeListAllocator::new(
            256,
            AllocPolicy::FirstFit,
        )));

        let alloc = allocator.lock().unwrap().allocate(256, 1).unwrap();
        bin.push(Deletion::Range(allocator.clone(), alloc));
        assert!(allocator.lock().unwrap().allocate(1, 1).is_err());

        bin.end_frame();
        bin.begin_frame(&mut device);
        assert!(allocator.lock().unwrap().allocate(256, 1).is_ok());
    }
}
