use glam::{Mat4, Vec3};

use crate::device::DevicePreference;
use crate::geometry::{Bounds, CameraInfo, Resolution};

/// Identifies an evaluation stream, e.g. "airstream" or "sun" for a vehicle.
/// A new request for a target supersedes the pending one.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TargetId(pub u32);

/// What to evaluate: the bounds to frame, viewed along `direction`.
///
/// `bounds` and `direction` are in the local space mapped to world space by
/// `transform`.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub direction: Vec3,
    pub bounds: Bounds,
    pub transform: Mat4,
    pub resolution: Resolution,
    pub device: DevicePreference,
}

impl RenderRequest {
    pub fn new(direction: Vec3, bounds: Bounds) -> Self {
        Self {
            direction,
            bounds,
            transform: Mat4::IDENTITY,
            resolution: Resolution::square(512),
            device: DevicePreference::PreferGpu,
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_device(mut self, device: DevicePreference) -> Self {
        self.device = device;
        self
    }

    /// Framing camera, `None` when the request is degenerate.
    pub fn camera(&self) -> Option<CameraInfo> {
        if self.resolution.is_empty() {
            return None;
        }
        CameraInfo::fit(&self.bounds, self.direction, self.transform)
    }
}
