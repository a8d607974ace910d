mod device_local;
mod host_visible;

pub use device_local::GpuTableDeviceLocal;
pub use host_visible::GpuTableHostVisible;
