use std::sync::{Arc, Mutex};

use ash::vk;
use slotmap::Key;

use crate::device::{
    BufferDesc, BufferHandle, BufferViewDesc, GraphicsDevice, MemoryLocation, ViewHandle, ViewType,
};
use crate::garbage::{Deletion, GarbageBin};
use crate::handles::HandlePool;
use crate::memory::{AllocPolicy, Allocation, FreeListAllocator};
use crate::upload::UploadContext;

/// Device-local element table: one large storage buffer sub-allocated into
/// fixed-stride element ranges, addressed from shaders by
/// `global_descriptor()` + `local_offset(handle)`.
///
/// Element data flows through the staging path: `allocate` and
/// `request_update` queue bytes, `flush_uploads` hands them to the
/// [`UploadContext`]. Updates never write an element in place; the old range
/// is retired through the garbage bin and a fresh one takes its place, so a
/// frame still in flight keeps reading consistent data.
pub struct GpuTableDeviceLocal<K: Key> {
    buffer: BufferHandle,
    view: ViewHandle,
    descriptor: u32,
    stride: u32,
    allocator: Arc<Mutex<FreeListAllocator>>,
    elements: HandlePool<K, Allocation>,
    pending: Vec<(u64, Vec<u8>)>,
    debug_name: String,
}

impl<K: Key> GpuTableDeviceLocal<K> {
    pub fn new(
        device: &mut dyn GraphicsDevice,
        debug_name: impl AsRef<str>,
        stride: u32,
        max_elements: u32,
    ) -> Self {
        assert!(stride > 0, "table stride must be nonzero");
        let capacity = stride as u64 * max_elements as u64;
        let buffer = device.create_buffer(
            BufferDesc::default()
                .size(capacity)
                .usage(vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
                .memory(MemoryLocation::DeviceLocal)
                .debug_name(debug_name.as_ref()),
        );
        let view = device.create_buffer_view(
            buffer,
            BufferViewDesc::new(ViewType::ShaderResource, 0, stride, max_elements),
        );
        let descriptor = device.global_descriptor(view);

        Self {
            buffer,
            view,
            descriptor,
            stride,
            allocator: Arc::new(Mutex::new(FreeListAllocator::new(
                capacity,
                AllocPolicy::FirstFit,
            ))),
            elements: HandlePool::default(),
            pending: Vec::new(),
            debug_name: debug_name.as_ref().to_owned(),
        }
    }

    /// Allocate `count` consecutive elements, optionally queueing their
    /// initial contents for the next upload flush.
    pub fn allocate(&mut self, count: u32, init: Option<&[u8]>) -> K {
        let size = count as u64 * self.stride as u64;
        // Every allocation is a whole number of elements, so offsets stay
        // stride-aligned without asking the allocator for alignment. The
        // guard must drop before the exhaustion panic or it poisons the
        // allocator shared with the bin's range deletions.
        let allocated = self
            .allocator
            .lock()
            .expect("table allocator mutex poisoned")
            .allocate(size, 1);
        let alloc =
            allocated.unwrap_or_else(|e| panic!("table '{}' exhausted: {e}", self.debug_name));

        if let Some(data) = init {
            assert!(data.len() as u64 <= size, "init data larger than the range");
            self.pending.push((alloc.offset, data.to_vec()));
        }
        self.elements.insert(alloc)
    }

    pub fn allocate_pod<T: bytemuck::Pod>(&mut self, value: &T) -> K {
        assert_eq!(
            std::mem::size_of::<T>(),
            self.stride as usize,
            "element type does not match the table stride"
        );
        self.allocate(1, Some(bytemuck::bytes_of(value)))
    }

    /// Replace an element's contents. The element moves to a fresh range and
    /// the old one is retired through the bin, never mutated under the GPU.
    /// The handle and its local offset change only in backing, not identity:
    /// callers must re-query `local_offset` after an update.
    pub fn request_update(&mut self, handle: K, bin: &mut GarbageBin, data: &[u8]) {
        let size = self.elements.get(handle).size;
        assert!(data.len() as u64 <= size, "update data larger than the range");

        let allocated = self
            .allocator
            .lock()
            .expect("table allocator mutex poisoned")
            .allocate(size, 1);
        let fresh =
            allocated.unwrap_or_else(|e| panic!("table '{}' exhausted: {e}", self.debug_name));
        self.pending.push((fresh.offset, data.to_vec()));

        let old = std::mem::replace(self.elements.get_mut(handle), fresh);
        bin.push(Deletion::Range(self.allocator.clone(), old));
    }

    pub fn request_update_pod<T: bytemuck::Pod>(
        &mut self,
        handle: K,
        bin: &mut GarbageBin,
        value: &T,
    ) {
        self.request_update(handle, bin, bytemuck::bytes_of(value));
    }

    /// Hand every queued element write to the upload context.
    pub fn flush_uploads(&mut self, device: &mut dyn GraphicsDevice, upload: &mut UploadContext) {
        for (offset, data) in self.pending.drain(..) {
            upload.push_upload(device, self.buffer, offset, &data);
        }
    }

    /// Drop the element now; its range is returned after a full bin rotation.
    pub fn free(&mut self, handle: K, bin: &mut GarbageBin) {
        let alloc = self.elements.remove(handle);
        bin.push(Deletion::Range(self.allocator.clone(), alloc));
    }

    /// Element index within the table, as shaders see it.
    pub fn local_offset(&self, handle: K) -> u32 {
        (self.elements.get(handle).offset / self.stride as u64) as u32
    }

    pub fn global_descriptor(&self) -> u32 {
        self.descriptor
    }

    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    pub fn live_elements(&self) -> usize {
        self.elements.len()
    }

    /// Queue the table's own backing for deferred destruction.
    pub fn retire(self, bin: &mut GarbageBin) {
        bin.push(Deletion::View(self.view));
        bin.push(Deletion::Buffer(self.buffer));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::NullDevice;
    use slotmap::new_key_type;

    new_key_type! { struct MaterialHandle; }

    #[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct Material {
        albedo: [f32; 4],
        roughness: f32,
        metallic: f32,
        _pad: [f32; 2],
    }

    fn material(roughness: f32) -> Material {
        Material {
            albedo: [1.0, 1.0, 1.0, 1.0],
            roughness,
            metallic: 0.0,
            _pad: [0.0; 2],
        }
    }

    #[test]
    fn local_offsets_count_in_elements() {
        let mut device = NullDevice::new();
        let mut table: GpuTableDeviceLocal<MaterialHandle> =
            GpuTableDeviceLocal::new(&mut device, "materials", 32, 16);

        let a = table.allocate(1, None);
        let b = table.allocate(1, None);
        let c = table.allocate(2, None);
        assert_eq!(table.local_offset(a), 0);
        assert_eq!(table.local_offset(b), 1);
        assert_eq!(table.local_offset(c), 2);
    }

    #[test]
    fn uploads_flow_through_staging_into_the_table_buffer() {
        let mut device = NullDevice::new();
        let mut upload = UploadContext::new(&mut device, 1024);
        let mut table: GpuTableDeviceLocal<MaterialHandle> =
            GpuTableDeviceLocal::new(&mut device, "materials", 32, 16);

        let handle = table.allocate_pod(&material(0.5));
        table.flush_uploads(&mut device, &mut upload);
        upload.submit_copies(&mut device).unwrap();

        let offset = table.local_offset(handle) as usize * 32;
        let bytes = &device.buffer_contents(table.buffer())[offset..offset + 32];
        let read: Material = bytemuck::pod_read_unaligned(bytes);
        assert_eq!(read.roughness, 0.5);
    }

    #[test]
    fn update_retires_the_old_range_one_rotation_later() {
        let mut device = NullDevice::new();
        let mut bin = GarbageBin::new(2);
        // Room for exactly two elements.
        let mut table: GpuTableDeviceLocal<MaterialHandle> =
            GpuTableDeviceLocal::new(&mut device, "materials", 32, 2);

        let handle = table.allocate(1, None);
        let before = table.local_offset(handle);
        table.request_update(handle, &mut bin, &[0u8; 32]);
        assert_ne!(table.local_offset(handle), before);

        // Old range is still held by the bin, so a second allocate must fail.
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            table.allocate(2, None);
        }));
        assert!(result.is_err());

        bin.end_frame();
        bin.begin_frame(&mut device);
        bin.end_frame();
        bin.begin_frame(&mut device);
        let _big = table.allocate(1, None);
    }

    #[test]
    fn free_defers_range_reuse() {
        let mut device = NullDevice::new();
        let mut bin = GarbageBin::new(2);
        let mut table: GpuTableDeviceLocal<MaterialHandle> =
            GpuTableDeviceLocal::new(&mut device, "materials", 32, 1);

        let handle = table.allocate(1, None);
        table.free(handle, &mut bin);
        assert_eq!(table.live_elements(), 0);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            table.allocate(1, None);
        }));
        assert!(result.is_err());

        bin.end_frame();
        bin.begin_frame(&mut device);
        bin.end_frame();
        bin.begin_frame(&mut device);
        let _again = table.allocate(1, None);
    }

    #[test]
    fn a_failed_allocation_leaves_the_allocator_usable() {
        let mut device = NullDevice::new();
        let mut bin = GarbageBin::new(1);
        let mut table: GpuTableDeviceLocal<MaterialHandle> =
            GpuTableDeviceLocal::new(&mut device, "materials", 32, 1);

        let handle = table.allocate(1, None);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            table.allocate(1, None);
        }));
        assert!(result.is_err());

        // The exhaustion panic released the lock cleanly; the bin can still
        // return the range and the table can hand it out again.
        table.free(handle, &mut bin);
        bin.end_frame();
        bin.begin_frame(&mut device);
        let _again = table.allocate(1, None);
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn capacity_overflow_names_the_table() {
        let mut device = NullDevice::new();
        let mut table: GpuTableDeviceLocal<MaterialHandle> =
            GpuTableDeviceLocal::new(&mut device, "materials", 32, 1);
        table.allocate(1, None);
        table.allocate(1, None);
    }
}
