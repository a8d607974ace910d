use std::fmt;
use std::sync::Arc;

use crate::device::{BufferDesc, GpuResource, TextureDesc};
use crate::state::ResourceState;

/// Name of a logical graph resource. Passes talk about resources exclusively
/// through ids; backing handles only appear once the graph is built.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ResourceId(Arc<str>);

impl ResourceId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Derived id for an alias generation of this resource, e.g. `hdr(2)`.
    pub(crate) fn generation(&self, generation: u32) -> ResourceId {
        ResourceId::new(format!("{}({generation})", self.0))
    }
}

impl From<&str> for ResourceId {
    fn from(name: &str) -> Self {
        ResourceId::new(name)
    }
}

impl From<String> for ResourceId {
    fn from(name: String) -> Self {
        ResourceId::new(name)
    }
}

impl From<&ResourceId> for ResourceId {
    fn from(id: &ResourceId) -> Self {
        id.clone()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ResourceKind {
    Buffer,
    Texture,
}

/// Closed range of dependency levels over which something is alive or used.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Lifetime {
    pub first: u32,
    pub last: u32,
}

impl Lifetime {
    pub(crate) fn at(level: u32) -> Self {
        Self {
            first: level,
            last: level,
        }
    }

    pub(crate) fn extend(&mut self, level: u32) {
        self.first = self.first.min(level);
        self.last = self.last.max(level);
    }
}

pub(crate) fn extend_lifetime(slot: &mut Option<Lifetime>, level: u32) {
    match slot {
        Some(lifetime) => lifetime.extend(level),
        None => *slot = Some(Lifetime::at(level)),
    }
}

#[derive(Clone, Debug)]
pub(crate) enum GraphDesc {
    Texture(TextureDesc),
    Buffer(BufferDesc),
}

impl GraphDesc {
    pub(crate) fn kind(&self) -> ResourceKind {
        match self {
            GraphDesc::Texture(_) => ResourceKind::Texture,
            GraphDesc::Buffer(_) => ResourceKind::Buffer,
        }
    }

    pub(crate) fn init_state(&self) -> ResourceState {
        match self {
            GraphDesc::Texture(desc) => desc.init_state,
            GraphDesc::Buffer(desc) => desc.init_state,
        }
    }
}

pub(crate) enum ResourceVariant {
    /// Owned by the graph for this frame; backing is created at realize time
    /// and retired through the bin at tick.
    Declared { desc: GraphDesc },
    /// Backing owned outside the graph. Enters the frame in `entry_state` and
    /// must be returned to `exit_state` before submit.
    Imported {
        kind: ResourceKind,
        entry_state: ResourceState,
        exit_state: ResourceState,
    },
    /// A later version of `prev`, sharing the backing of the chain's
    /// `original`. State and backing queries are forwarded to the original.
    Aliased {
        prev: ResourceId,
        original: ResourceId,
    },
    /// Pure ordering edge, never realized.
    Proxy,
}

pub(crate) struct GraphResource {
    pub variant: ResourceVariant,
    pub backing: Option<GpuResource>,
    /// State of the *underlying* resource; only meaningful on chain roots.
    pub current_state: ResourceState,
    /// Levels at which this id itself appears in pass IO.
    pub usage: Option<Lifetime>,
    /// Levels at which the underlying resource is used through any id in its
    /// alias chain; only tracked on chain roots.
    pub resource_lifetime: Option<Lifetime>,
    pub has_been_aliased: bool,
}

impl GraphResource {
    pub(crate) fn new(variant: ResourceVariant, current_state: ResourceState) -> Self {
        Self {
            variant,
            backing: None,
            current_state,
            usage: None,
            resource_lifetime: None,
            has_been_aliased: false,
        }
    }
}
