use glam::{Mat4, Vec2, Vec3};

use crate::error::ExposureError;
use crate::geometry::{CameraInfo, Resolution};
use crate::palette::TagColor;
use crate::scene::DrawList;

use super::{Frame, Image, Rasterizer};

/// Scanline rasterizer on the host.
///
/// Samples pixel centers, depth tests with `Less` and keeps fragments whose
/// depth lies in `[0, 1]`, matching the GPU pipeline closely enough for pixel
/// counts to agree up to edge quantization.
#[derive(Debug, Default)]
pub struct SoftwareRasterizer {
    depth: Vec<f32>,
}

impl SoftwareRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders straight into a host image.
    pub fn rasterize(
        &mut self,
        scene: &DrawList,
        camera: Option<&CameraInfo>,
        resolution: Resolution,
    ) -> Image {
        let mut image = Image::new(resolution);
        let Some(camera) = camera else { return image };
        if resolution.is_empty() {
            return image;
        }

        self.depth.clear();
        self.depth.resize(resolution.pixel_count() as usize, f32::INFINITY);

        let size = Vec2::new(resolution.width as f32, resolution.height as f32);
        for item in scene.items() {
            let mvp = camera.view_proj * item.transform;
            for [a, b, c] in item.mesh.triangles() {
                let tri = [to_screen(mvp, a, size), to_screen(mvp, b, size), to_screen(mvp, c, size)];
                self.fill_triangle(&mut image, tri, item.tag);
            }
        }
        image
    }

    fn fill_triangle(&mut self, image: &mut Image, [a, mut b, mut c]: [Vec3; 3], tag: TagColor) {
        if !(a.is_finite() && b.is_finite() && c.is_finite()) {
            return;
        }
        let mut area = edge(a, b, c.truncate());
        if area.abs() <= f32::EPSILON {
            return;
        }
        if area < 0.0 {
            std::mem::swap(&mut b, &mut c);
            area = -area;
        }

        let (w, h) = (image.width(), image.height());
        let min = a.min(b).min(c);
        let max = a.max(b).max(c);
        let x0 = min.x.floor().max(0.0) as u32;
        let y0 = min.y.floor().max(0.0) as u32;
        let x1 = (max.x.ceil().max(0.0) as u32).min(w);
        let y1 = (max.y.ceil().max(0.0) as u32).min(h);

        for y in y0..y1 {
            for x in x0..x1 {
                let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let w0 = edge(b, c, p);
                let w1 = edge(c, a, p);
                let w2 = edge(a, b, p);
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }

                let z = (w0 * a.z + w1 * b.z + w2 * c.z) / area;
                if !(0.0..=1.0).contains(&z) {
                    continue;
                }
                let slot = (y * w + x) as usize;
                if z < self.depth[slot] {
                    self.depth[slot] = z;
                    image.set(x, y, tag);
                }
            }
        }
    }
}

impl Rasterizer for SoftwareRasterizer {
    fn name(&self) -> &'static str {
        "software"
    }

    fn render(
        &mut self,
        scene: &DrawList,
        camera: Option<&CameraInfo>,
        resolution: Resolution,
    ) -> Result<Frame, ExposureError> {
        Ok(Frame::Host(self.rasterize(scene, camera, resolution)))
    }
}

/// Clip space to pixel space (y down); z keeps NDC depth.
#[inline]
fn to_screen(mvp: Mat4, p: Vec3, size: Vec2) -> Vec3 {
    let ndc = mvp.project_point3(p);
    Vec3::new(
        (ndc.x + 1.0) * 0.5 * size.x,
        (1.0 - ndc.y) * 0.5 * size.y,
        ndc.z,
    )
}

/// Twice the signed area of (a, b, p).
#[inline]
fn edge(a: Vec3, b: Vec3, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}
