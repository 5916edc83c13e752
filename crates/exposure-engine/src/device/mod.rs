//! GPU device management and device-path selection.
//!
//! This module is responsible for:
//! - creating a headless wgpu Instance/Adapter/Device/Queue
//! - reporting whether compute shaders are available
//! - mapping a caller's [`DevicePreference`] onto the path that actually runs

mod gpu;
mod select;

pub use gpu::{Gpu, GpuInit};
pub use select::{DevicePreference, PhysicalDevice};
