use std::fmt;

use ash::vk;

/// Synchronization state of a graph resource: the layout it sits in and the
/// stage/access pair that last touched (or will next touch) it.
///
/// Buffers carry `vk::ImageLayout::UNDEFINED`; only the stage/access masks
/// are meaningful for them.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ResourceState {
    pub layout: vk::ImageLayout,
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
}

const READ_ACCESS_MASK: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
    vk::AccessFlags2::INDIRECT_COMMAND_READ.as_raw()
        | vk::AccessFlags2::INDEX_READ.as_raw()
        | vk::AccessFlags2::VERTEX_ATTRIBUTE_READ.as_raw()
        | vk::AccessFlags2::UNIFORM_READ.as_raw()
        | vk::AccessFlags2::INPUT_ATTACHMENT_READ.as_raw()
        | vk::AccessFlags2::SHADER_READ.as_raw()
        | vk::AccessFlags2::SHADER_SAMPLED_READ.as_raw()
        | vk::AccessFlags2::SHADER_STORAGE_READ.as_raw()
        | vk::AccessFlags2::COLOR_ATTACHMENT_READ.as_raw()
        | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ.as_raw()
        | vk::AccessFlags2::TRANSFER_READ.as_raw()
        | vk::AccessFlags2::HOST_READ.as_raw()
        | vk::AccessFlags2::MEMORY_READ.as_raw(),
);

impl ResourceState {
    pub const UNDEFINED: ResourceState = ResourceState {
        layout: vk::ImageLayout::UNDEFINED,
        stage: vk::PipelineStageFlags2::TOP_OF_PIPE,
        access: vk::AccessFlags2::NONE,
    };

    pub const RENDER_TARGET: ResourceState = ResourceState {
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
    };

    pub const DEPTH_WRITE: ResourceState = ResourceState {
        layout: vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        stage: vk::PipelineStageFlags2::from_raw(
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS.as_raw()
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS.as_raw(),
        ),
        access: vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
    };

    pub const DEPTH_READ: ResourceState = ResourceState {
        layout: vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL,
        stage: vk::PipelineStageFlags2::from_raw(
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS.as_raw()
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS.as_raw(),
        ),
        access: vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ,
    };

    pub const PIXEL_SHADER_RESOURCE: ResourceState = ResourceState {
        layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
        access: vk::AccessFlags2::SHADER_SAMPLED_READ,
    };

    pub const COMPUTE_SHADER_RESOURCE: ResourceState = ResourceState {
        layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
        access: vk::AccessFlags2::SHADER_SAMPLED_READ,
    };

    pub const UNORDERED_ACCESS: ResourceState = ResourceState {
        layout: vk::ImageLayout::GENERAL,
        stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
        access: vk::AccessFlags2::from_raw(
            vk::AccessFlags2::SHADER_STORAGE_READ.as_raw()
                | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw(),
        ),
    };

    pub const COPY_SRC: ResourceState = ResourceState {
        layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        stage: vk::PipelineStageFlags2::TRANSFER,
        access: vk::AccessFlags2::TRANSFER_READ,
    };

    pub const COPY_DST: ResourceState = ResourceState {
        layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        stage: vk::PipelineStageFlags2::TRANSFER,
        access: vk::AccessFlags2::TRANSFER_WRITE,
    };

    pub const PRESENT: ResourceState = ResourceState {
        layout: vk::ImageLayout::PRESENT_SRC_KHR,
        stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        access: vk::AccessFlags2::NONE,
    };

    // Buffer states.

    pub const VERTEX_BUFFER: ResourceState = ResourceState {
        layout: vk::ImageLayout::UNDEFINED,
        stage: vk::PipelineStageFlags2::VERTEX_INPUT,
        access: vk::AccessFlags2::VERTEX_ATTRIBUTE_READ,
    };

    pub const INDEX_BUFFER: ResourceState = ResourceState {
        layout: vk::ImageLayout::UNDEFINED,
        stage: vk::PipelineStageFlags2::INDEX_INPUT,
        access: vk::AccessFlags2::INDEX_READ,
    };

    pub const SHADER_READ_BUFFER: ResourceState = ResourceState {
        layout: vk::ImageLayout::UNDEFINED,
        stage: vk::PipelineStageFlags2::from_raw(
            vk::PipelineStageFlags2::FRAGMENT_SHADER.as_raw()
                | vk::PipelineStageFlags2::COMPUTE_SHADER.as_raw(),
        ),
        access: vk::AccessFlags2::SHADER_STORAGE_READ,
    };

    pub const STORAGE_BUFFER: ResourceState = ResourceState {
        layout: vk::ImageLayout::UNDEFINED,
        stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
        access: vk::AccessFlags2::from_raw(
            vk::AccessFlags2::SHADER_STORAGE_READ.as_raw()
                | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw(),
        ),
    };

    /// A state is a read when it touches memory at all and every access bit
    /// falls inside the read set.
    pub fn is_read(&self) -> bool {
        self.access != vk::AccessFlags2::NONE && READ_ACCESS_MASK.contains(self.access)
    }

    /// Fold another reader's desired state into this one. Read accesses are
    /// OR-combinable; this is the checked form of that assumption: combining
    /// a write, or two reads wanting different layouts, is a declaration bug.
    pub fn combine_read(self, other: ResourceState) -> ResourceState {
        assert!(
            self.is_read() && other.is_read(),
            "only read states combine: {self} | {other}"
        );
        assert!(
            self.layout == other.layout,
            "readers disagree on layout: {self} vs {other}"
        );
        ResourceState {
            layout: self.layout,
            stage: self.stage | other.stage,
            access: self.access | other.access,
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}/{:?}/{:?}",
            self.layout, self.stage, self.access
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_and_write_states_are_told_apart() {
        assert!(ResourceState::PIXEL_SHADER_RESOURCE.is_read());
        assert!(ResourceState::DEPTH_READ.is_read());
        assert!(ResourceState::COPY_SRC.is_read());
        assert!(!ResourceState::RENDER_TARGET.is_read());
        assert!(!ResourceState::UNORDERED_ACCESS.is_read());
        assert!(!ResourceState::UNDEFINED.is_read());
    }

    #[test]
    fn combining_readers_ors_stage_and_access() {
        let combined = ResourceState::PIXEL_SHADER_RESOURCE
            .combine_read(ResourceState::COMPUTE_SHADER_RESOURCE);
        assert_eq!(combined.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert!(combined.stage.contains(vk::PipelineStageFlags2::FRAGMENT_SHADER));
        assert!(combined.stage.contains(vk::PipelineStageFlags2::COMPUTE_SHADER));
        assert!(combined.access.contains(vk::AccessFlags2::SHADER_SAMPLED_READ));
    }

    #[test]
    #[should_panic(expected = "only read states combine")]
    fn combining_a_write_panics() {
        ResourceState::PIXEL_SHADER_RESOURCE.combine_read(ResourceState::RENDER_TARGET);
    }

    #[test]
    #[should_panic(expected = "disagree on layout")]
    fn combining_mismatched_layouts_panics() {
        ResourceState::PIXEL_SHADER_RESOURCE.combine_read(ResourceState::COPY_SRC);
    }
}
