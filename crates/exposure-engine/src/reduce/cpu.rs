use crate::device::PhysicalDevice;
use crate::error::ExposureError;
use crate::palette::TagColor;
use crate::render::{Frame, Image};

use super::{Histogram, PixelReducer, ReducedFrame, Reduction};

/// Sequential reducer. Always available and deterministic.
///
/// Device frames are downloaded synchronously first.
#[derive(Debug, Default, Copy, Clone)]
pub struct CpuReducer;

impl CpuReducer {
    pub fn new() -> Self {
        Self
    }

    pub fn count(image: &Image, palette_len: u32) -> Histogram {
        let mut histogram = Histogram::new(palette_len);
        for &texel in image.texels() {
            histogram.record(TagColor::from_packed(texel));
        }
        histogram
    }
}

impl PixelReducer for CpuReducer {
    fn device(&self) -> PhysicalDevice {
        PhysicalDevice::Cpu
    }

    fn reduce(
        &mut self,
        frame: &Frame,
        palette_len: u32,
        want_image: bool,
    ) -> Result<Reduction, ExposureError> {
        let image = frame.to_image()?;
        let histogram = Self::count(&image, palette_len);
        Ok(Reduction::Ready(ReducedFrame {
            histogram,
            image: want_image.then_some(image),
        }))
    }
}
