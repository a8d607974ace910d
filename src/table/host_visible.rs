use std::sync::{Arc, Mutex};

use ash::vk;
use slotmap::Key;

use crate::device::{
    BufferDesc, BufferHandle, BufferViewDesc, GraphicsDevice, MemoryLocation, ViewHandle, ViewType,
};
use crate::garbage::{Deletion, GarbageBin};
use crate::handles::HandlePool;
use crate::memory::{AllocPolicy, Allocation, FreeListAllocator};

/// Host-visible variant of [`GpuTableDeviceLocal`](crate::table::GpuTableDeviceLocal):
/// element bytes go straight through the mapping instead of the staging path,
/// so there is no upload queue to flush. Updates still move to a fresh range
/// and retire the old one through the bin, because a frame in flight may read
/// the old bytes until the rotation completes.
pub struct GpuTableHostVisible<K: Key> {
    buffer: BufferHandle,
    view: ViewHandle,
    descriptor: u32,
    stride: u32,
    allocator: Arc<Mutex<FreeListAllocator>>,
    elements: HandlePool<K, Allocation>,
    debug_name: String,
}

impl<K: Key> GpuTableHostVisible<K> {
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
                .usage(vk::BufferUsageFlags::STORAGE_BUFFER)
                .memory(MemoryLocation::HostVisible)
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
            debug_name: debug_name.as_ref().to_owned(),
        }
    }

    pub fn allocate(
        &mut self,
        device: &mut dyn GraphicsDevice,
        count: u32,
        init: Option<&[u8]>,
    ) -> K {
        let size = count as u64 * self.stride as u64;
        // Drop the guard before the exhaustion panic; a poisoned allocator
        // would wedge the bin's range deletions.
        let allocated = self
            .allocator
            .lock()
            .expect("table allocator mutex poisoned")
            .allocate(size, 1);
        let alloc =
            allocated.unwrap_or_else(|e| panic!("table '{}' exhausted: {e}", self.debug_name));

        if let Some(data) = init {
            assert!(data.len() as u64 <= size, "init data larger than the range");
            device.write_mapped(self.buffer, alloc.offset, data);
        }
        self.elements.insert(alloc)
    }

    pub fn allocate_pod<T: bytemuck::Pod>(&mut self, device: &mut dyn GraphicsDevice, value: &T) -> K {
        assert_eq!(
            std::mem::size_of::<T>(),
            self.stride as usize,
            "element type does not match the table stride"
        );
        self.allocate(device, 1, Some(bytemuck::bytes_of(value)))
    }

    /// Write new contents into a fresh range; the previous range is retired
    /// through the bin so in-flight frames keep reading stable data.
    pub fn request_update(
        &mut self,
        device: &mut dyn GraphicsDevice,
        handle: K,
        bin: &mut GarbageBin,
        data: &[u8],
    ) {
        let size = self.elements.get(handle).size;
        assert!(data.len() as u64 <= size, "update data larger than the range");

        let allocated = self
            .allocator
            .lock()
            .expect("table allocator mutex poisoned")
            .allocate(size, 1);
        let fresh =
            allocated.unwrap_or_else(|e| panic!("table '{}' exhausted: {e}", self.debug_name));
        device.write_mapped(self.buffer, fresh.offset, data);

        let old = std::mem::replace(self.elements.get_mut(handle), fresh);
        bin.push(Deletion::Range(self.allocator.clone(), old));
    }

    pub fn free(&mut self, handle: K, bin: &mut GarbageBin) {
        let alloc = self.elements.remove(handle);
        bin.push(Deletion::Range(self.allocator.clone(), alloc));
    }

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

    new_key_type! { struct LightHandle; }

    #[test]
    fn writes_land_directly_in_the_mapped_buffer() {
        let mut device = NullDevice::new();
        let mut table: GpuTableHostVisible<LightHandle> =
            GpuTableHostVisible::new(&mut device, "lights", 16, 8);

        let handle = table.allocate(&mut device, 1, Some(&[0x42; 16]));
        let offset = table.local_offset(handle) as usize * 16;
        assert_eq!(
            &device.buffer_contents(table.buffer())[offset..offset + 16],
            &[0x42; 16]
        );
    }

    #[test]
    fn update_writes_fresh_range_and_keeps_old_bytes_until_rotation() {
        let mut device = NullDevice::new();
        let mut bin = GarbageBin::new(2);
        let mut table: GpuTableHostVisible<LightHandle> =
            GpuTableHostVisible::new(&mut device, "lights", 16, 8);

        let handle = table.allocate(&mut device, 1, Some(&[1; 16]));
        let old_offset = table.local_offset(handle) as usize * 16;

        table.request_update(&mut device, handle, &mut bin, &[2; 16]);
        let new_offset = table.local_offset(handle) as usize * 16;
        assert_ne!(old_offset, new_offset);

        // The range a frame in flight reads from is untouched.
        let contents = device.buffer_contents(table.buffer());
        assert_eq!(&contents[old_offset..old_offset + 16], &[1; 16]);
        assert_eq!(&contents[new_offset..new_offset + 16], &[2; 16]);
    }

    #[test]
    fn a_failed_allocation_leaves_the_allocator_usable() {
        let mut device = NullDevice::new();
        let mut bin = GarbageBin::new(1);
        let mut table: GpuTableHostVisible<LightHandle> =
            GpuTableHostVisible::new(&mut device, "lights", 16, 1);

        let handle = table.allocate(&mut device, 1, None);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            table.allocate(&mut device, 1, None);
        }));
        assert!(result.is_err());

        table.free(handle, &mut bin);
        bin.end_frame();
        bin.begin_frame(&mut device);
        let _again = table.allocate(&mut device, 1, None);
    }

    #[test]
    fn retire_routes_backing_through_the_bin() {
        let mut device = NullDevice::new();
        let mut bin = GarbageBin::new(1);
        let table: GpuTableHostVisible<LightHandle> =
            GpuTableHostVisible::new(&mut device, "lights", 16, 8);

        table.retire(&mut bin);
        assert_eq!(device.live_buffer_count(), 1);
        assert_eq!(device.live_view_count(), 1);

        bin.end_frame();
        bin.begin_frame(&mut device);
        assert_eq!(device.live_buffer_count(), 0);
        assert_eq!(device.live_view_count(), 0);
    }
}
