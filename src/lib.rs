//! Frame render graph and GPU resource lifetime management.
//!
//! Passes declare reads and writes of logical resources; the graph derives
//! execution order, dependency levels, transient resource lifetimes and
//! pipeline barriers from those declarations, then records the frame against
//! an abstract [`GraphicsDevice`]. Around the graph sit the pieces that make
//! per-frame GPU memory safe: a deferred-deletion [`GarbageBin`],
//! sub-allocated element tables, and a staging [`upload::UploadContext`].

pub mod device;
pub mod garbage;
pub mod graph;
pub mod handles;
pub mod memory;
pub mod state;
pub mod table;
pub mod upload;

pub use device::{GraphicsDevice, NullDevice};
pub use garbage::{Deletion, GarbageBin};
pub use graph::{PassBuilder, PassResources, RenderGraph, ResourceId, ResourceRegistry};
pub use state::ResourceState;
