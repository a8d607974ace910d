use smallvec::SmallVec;

use crate::graph::resource::ResourceId;
use crate::state::ResourceState;

/// Barrier recorded against a logical resource; the backing handle is looked
/// up at execute time, after realization.
pub(crate) struct PendingBarrier {
    pub id: ResourceId,
    pub before: ResourceState,
    pub after: ResourceState,
}

/// Passes with no dependencies among each other. All of a level's entry
/// barriers are batched ahead of its first pass.
pub(crate) struct DependencyLevel {
    pub index: u32,
    pub passes: SmallVec<[usize; 4]>,
    pub barriers: Vec<PendingBarrier>,
}

impl DependencyLevel {
    pub(crate) fn new(index: u32) -> Self {
        Self {
            index,
            passes: SmallVec::new(),
            barriers: Vec::new(),
        }
    }
}
