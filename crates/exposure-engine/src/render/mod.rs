//! Offscreen rasterization of the tagged scene.
//!
//! A [`Rasterizer`] turns a [`DrawList`] and a [`CameraInfo`] into a
//! [`Frame`]: flat tag colors, depth tested, cleared to
//! [`TagColor::BACKGROUND`](crate::palette::TagColor::BACKGROUND). No shading,
//! blending or antialiasing is applied.

mod frame;
mod gpu;
mod image;
mod readback;
mod software;

pub use frame::{DeviceFrame, Frame};
pub use gpu::GpuRasterizer;
pub use image::Image;
pub use software::SoftwareRasterizer;

pub(crate) use readback::TextureReadback;

use crate::error::ExposureError;
use crate::geometry::{CameraInfo, Resolution};
use crate::scene::DrawList;

/// Renders the tag image for one evaluation.
pub trait Rasterizer {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Draws `scene` framed by `camera`.
    ///
    /// `camera` is `None` for degenerate framing; the result is then an
    /// all-background frame of the requested size.
    fn render(
        &mut self,
        scene: &DrawList,
        camera: Option<&CameraInfo>,
        resolution: Resolution,
    ) -> Result<Frame, ExposureError>;
}
