use ash::vk;

use crate::device::{BufferHandle, TextureHandle, ViewHandle};
use crate::state::ResourceState;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum MemoryLocation {
    DeviceLocal,
    HostVisible,
}

#[derive(Clone, PartialEq, Debug)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
    pub memory: MemoryLocation,
    pub init_state: ResourceState,
    pub debug_name: Option<String>,
}

impl Default for BufferDesc {
    fn default() -> Self {
        Self {
            size: 0,
            usage: vk::BufferUsageFlags::empty(),
            memory: MemoryLocation::DeviceLocal,
            init_state: ResourceState::UNDEFINED,
            debug_name: None,
        }
    }
}

impl BufferDesc {
    pub fn size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn usage(mut self, usage: vk::BufferUsageFlags) -> Self {
        self.usage = usage;
        self
    }

    pub fn memory(mut self, memory: MemoryLocation) -> Self {
        self.memory = memory;
        self
    }

    pub fn init_state(mut self, state: ResourceState) -> Self {
        self.init_state = state;
        self
    }

    pub fn debug_name(mut self, name: impl AsRef<str>) -> Self {
        self.debug_name = Some(name.as_ref().to_owned());
        self
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct TextureDesc {
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mips: u32,
    pub layers: u32,
    pub usage: vk::ImageUsageFlags,
    pub samples: vk::SampleCountFlags,
    pub init_state: ResourceState,
    pub clear_color: [f32; 4],
    pub depth_clear: f32,
    pub stencil_clear: u8,
    pub debug_name: Option<String>,
}

impl Default for TextureDesc {
    fn default() -> Self {
        Self {
            format: vk::Format::UNDEFINED,
            extent: vk::Extent3D {
                width: 1,
                height: 1,
                depth: 1,
            },
            mips: 1,
            layers: 1,
            usage: vk::ImageUsageFlags::empty(),
            samples: vk::SampleCountFlags::TYPE_1,
            init_state: ResourceState::UNDEFINED,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            // Reverse Z by default.
            depth_clear: 0.0,
            stencil_clear: 0,
            debug_name: None,
        }
    }
}

impl TextureDesc {
    pub fn format(mut self, format: vk::Format) -> Self {
        self.format = format;
        self
    }

    pub fn extent(mut self, width: u32, height: u32) -> Self {
        self.extent = vk::Extent3D {
            width,
            height,
            depth: 1,
        };
        self
    }

    pub fn mips(mut self, mips: u32) -> Self {
        self.mips = mips;
        self
    }

    pub fn usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage = usage;
        self
    }

    pub fn samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    pub fn init_state(mut self, state: ResourceState) -> Self {
        self.init_state = state;
        self
    }

    pub fn clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    pub fn depth_clear(mut self, depth: f32) -> Self {
        self.depth_clear = depth;
        self
    }

    pub fn debug_name(mut self, name: impl AsRef<str>) -> Self {
        self.debug_name = Some(name.as_ref().to_owned());
        self
    }

    pub fn is_depth_format(&self) -> bool {
        matches!(
            self.format,
            vk::Format::D16_UNORM
                | vk::Format::D32_SFLOAT
                | vk::Format::D24_UNORM_S8_UINT
                | vk::Format::D32_SFLOAT_S8_UINT
        )
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum ViewType {
    RenderTarget,
    DepthStencil,
    ShaderResource,
    UnorderedAccess,
}

#[derive(Copy, Clone, PartialEq, Debug)]
pub struct TextureViewDesc {
    pub view_type: ViewType,
    pub format: vk::Format,
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
    pub depth_read_only: bool,
    pub stencil_read_only: bool,
}

impl TextureViewDesc {
    pub fn new(view_type: ViewType, format: vk::Format) -> Self {
        Self {
            view_type,
            format,
            base_mip: 0,
            mip_count: 1,
            base_layer: 0,
            layer_count: 1,
            depth_read_only: false,
            stencil_read_only: false,
        }
    }

    pub fn mip_range(mut self, base: u32, count: u32) -> Self {
        self.base_mip = base;
        self.mip_count = count;
        self
    }

    pub fn layers(mut self, base: u32, count: u32) -> Self {
        self.base_layer = base;
        self.layer_count = count;
        self
    }

    pub fn depth_read_only(mut self) -> Self {
        self.depth_read_only = true;
        self
    }

    pub fn stencil_read_only(mut self) -> Self {
        self.stencil_read_only = true;
        self
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct BufferViewDesc {
    pub view_type: ViewType,
    pub offset: u64,
    pub stride: u32,
    pub element_count: u32,
}

impl BufferViewDesc {
    pub fn new(view_type: ViewType, offset: u64, stride: u32, element_count: u32) -> Self {
        Self {
            view_type,
            offset,
            stride,
            element_count,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Debug)]
pub enum ViewDesc {
    Texture(TextureViewDesc),
    Buffer(BufferViewDesc),
}

/// Attachment begin/end access for render-target and depth-stencil writes.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum AccessPolicy {
    ClearPreserve,
    PreservePreserve,
    ClearDiscard,
    PreserveDiscard,
    DiscardDiscard,
}

impl AccessPolicy {
    pub fn load_store(self) -> (vk::AttachmentLoadOp, vk::AttachmentStoreOp) {
        match self {
            AccessPolicy::ClearPreserve => {
                (vk::AttachmentLoadOp::CLEAR, vk::AttachmentStoreOp::STORE)
            }
            AccessPolicy::PreservePreserve => {
                (vk::AttachmentLoadOp::LOAD, vk::AttachmentStoreOp::STORE)
            }
            AccessPolicy::ClearDiscard => (
                vk::AttachmentLoadOp::CLEAR,
                vk::AttachmentStoreOp::DONT_CARE,
            ),
            AccessPolicy::PreserveDiscard => {
                (vk::AttachmentLoadOp::LOAD, vk::AttachmentStoreOp::DONT_CARE)
            }
            AccessPolicy::DiscardDiscard => (
                vk::AttachmentLoadOp::DONT_CARE,
                vk::AttachmentStoreOp::DONT_CARE,
            ),
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct RenderTargetAttachment {
    pub view: ViewHandle,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_color: [f32; 4],
}

#[derive(Copy, Clone, Debug)]
pub struct DepthAttachment {
    pub view: ViewHandle,
    pub depth_load_op: vk::AttachmentLoadOp,
    pub depth_store_op: vk::AttachmentStoreOp,
    pub stencil_load_op: vk::AttachmentLoadOp,
    pub stencil_store_op: vk::AttachmentStoreOp,
    pub depth_clear: f32,
    pub stencil_clear: u8,
    pub read_only: bool,
}

#[derive(Clone, Debug, Default)]
pub struct RenderPassDesc {
    pub render_targets: Vec<RenderTargetAttachment>,
    pub depth_stencil: Option<DepthAttachment>,
}

impl RenderPassDesc {
    pub fn is_empty(&self) -> bool {
        self.render_targets.is_empty() && self.depth_stencil.is_none()
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum GpuResource {
    Buffer(BufferHandle),
    Texture(TextureHandle),
}

/// One state transition, recorded between dependency levels.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct BarrierDesc {
    pub resource: GpuResource,
    pub before: ResourceState,
    pub after: ResourceState,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct BufferCopy {
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}
