use anyhow::Context;
use ash::vk;

use crate::device::{BufferCopy, BufferDesc, BufferHandle, GraphicsDevice, MemoryLocation};
use crate::memory::LinearAllocator;

struct QueuedCopy {
    dst: BufferHandle,
    region: BufferCopy,
}

/// Batched CPU to device-local transfer through one host-visible staging
/// buffer. Bytes are written into the mapped staging range as they are
/// pushed; the buffer-to-buffer copies are recorded and submitted together.
///
/// The staging range is single-versioned: `submit_copies` resets the cursor,
/// so a batch must be submitted before the caller starts the next frame's
/// uploads. The frame throttle upstream guarantees the GPU is done reading
/// the range by then.
pub struct UploadContext {
    staging: BufferHandle,
    allocator: LinearAllocator,
    queued: Vec<QueuedCopy>,
}

impl UploadContext {
    pub fn new(device: &mut dyn GraphicsDevice, staging_capacity: u64) -> Self {
        let staging = device.create_buffer(
            BufferDesc::default()
                .size(staging_capacity)
                .usage(vk::BufferUsageFlags::TRANSFER_SRC)
                .memory(MemoryLocation::HostVisible)
                .debug_name("upload staging"),
        );
        Self {
            staging,
            allocator: LinearAllocator::new(staging_capacity),
            queued: Vec::new(),
        }
    }

    /// Stage `data` and queue a copy of it into `dst` at `dst_offset`.
    /// Panics if the staging budget for this batch is exhausted.
    pub fn push_upload(
        &mut self,
        device: &mut dyn GraphicsDevice,
        dst: BufferHandle,
        dst_offset: u64,
        data: &[u8],
    ) {
        let src_offset = self.allocator.allocate(data.len() as u64, 16);
        device.write_mapped(self.staging, src_offset, data);
        self.queued.push(QueuedCopy {
            dst,
            region: BufferCopy {
                src_offset,
                dst_offset,
                size: data.len() as u64,
            },
        });
    }

    pub fn queued_copies(&self) -> usize {
        self.queued.len()
    }

    /// Record and submit every queued copy, then recycle the staging range
    /// for the next batch. A no-op when nothing is queued.
    pub fn submit_copies(&mut self, device: &mut dyn GraphicsDevice) -> anyhow::Result<()> {
        if self.queued.is_empty() {
            return Ok(());
        }
        log::trace!(
            "upload: {} copies, {} staged bytes",
            self.queued.len(),
            self.allocator.used()
        );

        let cmd = device.allocate_command_list();
        for copy in self.queued.drain(..) {
            device.cmd_copy_buffer(cmd, self.staging, copy.dst, &[copy.region]);
        }
        device
            .submit_command_list(cmd)
            .context("submitting upload copies")?;
        device.recycle_command_list(cmd);

        self.allocator.clear();
        Ok(())
    }

    pub fn staging_buffer(&self) -> BufferHandle {
        self.staging
    }

    /// Destroy the staging buffer. Call once the device is idle.
    pub fn destroy(self, device: &mut dyn GraphicsDevice) {
        device.destroy_buffer(self.staging);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::NullDevice;

    #[test]
    fn staged_bytes_land_in_the_destination() {
        let mut device = NullDevice::new();
        let mut upload = UploadContext::new(&mut device, 1024);
        let dst = device.create_buffer(BufferDesc::default().size(64));

        upload.push_upload(&mut device, dst, 8, &[0xAA; 4]);
        upload.push_upload(&mut device, dst, 32, &[0xBB; 4]);
        assert_eq!(upload.queued_copies(), 2);

        upload.submit_copies(&mut device).unwrap();
        assert_eq!(&device.buffer_contents(dst)[8..12], &[0xAA; 4]);
        assert_eq!(&device.buffer_contents(dst)[32..36], &[0xBB; 4]);
        assert_eq!(upload.queued_copies(), 0);
    }

    #[test]
    fn staging_cursor_resets_between_batches() {
        let mut device = NullDevice::new();
        let mut upload = UploadContext::new(&mut device, 64);
        let dst = device.create_buffer(BufferDesc::default().size(64));

        for _ in 0..4 {
            upload.push_upload(&mut device, dst, 0, &[1; 48]);
            upload.submit_copies(&mut device).unwrap();
        }
    }

    #[test]
    #[should_panic(expected = "linear allocator exhausted")]
    fn overflowing_a_batch_panics() {
        let mut device = NullDevice::new();
        let mut upload = UploadContext::new(&mut device, 32);
        let dst = device.create_buffer(BufferDesc::default().size(64));

        upload.push_upload(&mut device, dst, 0, &[1; 24]);
        upload.push_upload(&mut device, dst, 24, &[1; 24]);
    }
}
