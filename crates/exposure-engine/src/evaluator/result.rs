use std::collections::HashMap;
use std::hash::Hash;

use glam::Vec3;

use crate::device::PhysicalDevice;
use crate::error::ExposureError;
use crate::geometry::{CameraInfo, Resolution};
use crate::reduce::Histogram;

use super::{RenderRequest, TargetId};

/// How a delivered result came about.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Rendered and counted.
    Measured,
    /// Zero-volume bounds, zero objects or an empty resolution.
    Degenerate,
    /// Device preference was `None`.
    Disabled,
    /// Both the requested path and the CPU retry failed.
    Failed(ExposureError),
}

/// Exposure of every visible tagged object for one request.
#[derive(Debug, Clone)]
pub struct RenderResult<K> {
    pub target: TargetId,
    /// Submission number; increases with every submit on an evaluator.
    pub generation: u64,
    /// Unit view direction in world space.
    pub forward: Vec3,
    /// Camera position in world space.
    pub position: Vec3,
    /// Distance from the camera to the bounds center.
    pub center_distance: f32,
    /// Square meters per pixel.
    pub pixel_area: f64,
    pub resolution: Resolution,
    /// Path that produced the counts, `None` when nothing was rendered.
    pub device: Option<PhysicalDevice>,
    pub histogram: Histogram,
    /// Square meters per object. Objects with no visible pixel are absent.
    pub areas: HashMap<K, f64>,
    /// Palette slot each visible object was drawn with.
    pub slots: HashMap<K, u32>,
    /// Tagged objects left out for lack of palette colors.
    pub omitted_objects: usize,
    pub outcome: Outcome,
}

impl<K: Eq + Hash> RenderResult<K> {
    pub(crate) fn measured(
        target: TargetId,
        generation: u64,
        request: &RenderRequest,
        camera: &CameraInfo,
        device: PhysicalDevice,
        histogram: Histogram,
        areas: HashMap<K, f64>,
        slots: HashMap<K, u32>,
    ) -> Self {
        Self {
            target,
            generation,
            forward: camera.forward,
            position: camera.position,
            center_distance: camera.center_distance,
            pixel_area: camera.pixel_area(request.resolution),
            resolution: request.resolution,
            device: Some(device),
            histogram,
            areas,
            slots,
            omitted_objects: 0,
            outcome: Outcome::Measured,
        }
    }

    /// Result with no areas, framed as well as the request allows.
    pub(crate) fn empty(
        target: TargetId,
        generation: u64,
        request: &RenderRequest,
        outcome: Outcome,
    ) -> Self {
        let camera = request.camera();
        Self {
            target,
            generation,
            forward: camera.map_or_else(
                || request.transform.transform_vector3(request.direction).normalize_or_zero(),
                |c| c.forward,
            ),
            position: camera.map_or_else(
                || request.transform.transform_point3(request.bounds.center),
                |c| c.position,
            ),
            center_distance: camera.map_or(0.0, |c| c.center_distance),
            pixel_area: camera.map_or(0.0, |c| c.pixel_area(request.resolution)),
            resolution: request.resolution,
            device: None,
            histogram: Histogram::default(),
            areas: HashMap::new(),
            slots: HashMap::new(),
            omitted_objects: 0,
            outcome,
        }
    }

    /// Area of `object`, zero when it was not visible.
    pub fn area_of(&self, object: &K) -> f64 {
        self.areas.get(object).copied().unwrap_or(0.0)
    }

    pub fn total_area(&self) -> f64 {
        self.areas.values().sum()
    }

    /// Area covered by the whole frame.
    pub fn frame_area(&self) -> f64 {
        self.pixel_area * self.resolution.pixel_count() as f64
    }

    /// Areas sorted largest first.
    pub fn sorted_areas(&self) -> Vec<(&K, f64)> {
        let mut sorted: Vec<(&K, f64)> = self.areas.iter().map(|(k, &a)| (k, a)).collect();
        sorted.sort_by(|a, b| b.1.total_cmp(&a.1));
        sorted
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
    }
}
