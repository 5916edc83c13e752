use glam::{Mat4, Vec3};

use super::{Bounds, Resolution};

/// Smallest frustum side treated as non-degenerate, in meters.
const MIN_FRUSTUM_SIDE: f32 = 1e-6;

/// Depth padding as a fraction of the depth span; keeps faces lying exactly on
/// the bounds planes inside the clip volume.
const DEPTH_PAD_RATIO: f32 = 1e-3;
const DEPTH_PAD_MIN: f32 = 1e-4;

/// Orthographic camera exactly framing a box viewed along a direction.
///
/// The frustum's cross-section is the tight rectangle around the projected
/// corners of the (transformed) bounds, so `pixel_area` maps pixel counts
/// straight to projected square meters.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CameraInfo {
    /// Eye position, on the near side of the bounds.
    pub position: Vec3,
    /// Unit view direction.
    pub forward: Vec3,
    pub up: Vec3,
    /// Distance from the eye to the bounds center along `forward`.
    pub center_distance: f32,
    /// Frustum width in meters.
    pub width: f32,
    /// Frustum height in meters.
    pub height: f32,
    pub view: Mat4,
    pub view_proj: Mat4,
}

impl CameraInfo {
    /// Frames `bounds` (local space, mapped by `transform`) looking along
    /// `direction` (local space as well).
    ///
    /// Returns `None` for degenerate input: zero-volume bounds, a zero or
    /// non-finite direction, or a projection with no area.
    pub fn fit(bounds: &Bounds, direction: Vec3, transform: Mat4) -> Option<Self> {
        if bounds.is_degenerate() {
            return None;
        }
        let forward = transform.transform_vector3(direction).normalize_or_zero();
        if forward == Vec3::ZERO || !forward.is_finite() {
            return None;
        }

        let corners = bounds.corners().map(|c| transform.transform_point3(c));
        let center = transform.transform_point3(bounds.center);

        let center_depth = center.dot(forward);
        let center_distance = corners
            .iter()
            .map(|c| (c.dot(forward) - center_depth).abs())
            .fold(0.0f32, f32::max)
            .max(MIN_FRUSTUM_SIDE);

        let up = if forward.cross(Vec3::Y).length_squared() < 1e-6 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let position = center - forward * center_distance;
        let view = Mat4::look_to_rh(position, forward, up);

        let mut lo = Vec3::splat(f32::INFINITY);
        let mut hi = Vec3::splat(f32::NEG_INFINITY);
        for c in corners {
            let v = view.transform_point3(c);
            lo = lo.min(v);
            hi = hi.max(v);
        }

        let width = hi.x - lo.x;
        let height = hi.y - lo.y;
        if !(width > MIN_FRUSTUM_SIDE && height > MIN_FRUSTUM_SIDE) {
            return None;
        }

        // Right-handed view space looks down -Z.
        let (mut near, mut far) = (-hi.z, -lo.z);
        let pad = (far - near) * DEPTH_PAD_RATIO + DEPTH_PAD_MIN;
        near -= pad;
        far += pad;

        let proj = Mat4::orthographic_rh(lo.x, hi.x, lo.y, hi.y, near, far);

        Some(Self {
            position,
            forward,
            up,
            center_distance,
            width,
            height,
            view,
            view_proj: proj * view,
        })
    }

    /// Projected area of the frustum cross-section in square meters.
    #[inline]
    pub fn projected_area(&self) -> f64 {
        self.width as f64 * self.height as f64
    }

    /// Square meters covered by one pixel at `resolution`.
    pub fn pixel_area(&self, resolution: Resolution) -> f64 {
        if resolution.is_empty() {
            return 0.0;
        }
        self.projected_area() / resolution.pixel_count() as f64
    }

    /// Maps a world point to clip space.
    #[inline]
    pub fn project(&self, point: Vec3) -> Vec3 {
        self.view_proj.project_point3(point)
    }
}
