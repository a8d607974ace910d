mod graph;
mod level;
mod pass;
mod registry;
mod resource;

pub use graph::RenderGraph;
pub use pass::{PassBuilder, PassResources};
pub use registry::ResourceRegistry;
pub use resource::{ResourceId, ResourceKind};
