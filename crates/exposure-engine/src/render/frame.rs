use crate::error::ExposureError;
use crate::geometry::Resolution;

use super::{Image, TextureReadback};

/// Render target produced by a rasterizer.
#[derive(Debug)]
pub enum Frame {
    /// Image already in host memory.
    Host(Image),
    /// Texture still on the GPU.
    Device(DeviceFrame),
}

impl Frame {
    pub fn resolution(&self) -> Resolution {
        match self {
            Frame::Host(image) => image.resolution(),
            Frame::Device(frame) => frame.resolution,
        }
    }

    /// Host copy of the frame; blocks on the device for GPU frames.
    pub fn to_image(&self) -> Result<Image, ExposureError> {
        match self {
            Frame::Host(image) => Ok(image.clone()),
            Frame::Device(frame) => frame.download(),
        }
    }
}

/// Tag texture owned by a single evaluation.
#[derive(Debug)]
pub struct DeviceFrame {
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    pub(crate) texture: wgpu::Texture,
    pub(crate) resolution: Resolution,
}

impl DeviceFrame {
    #[inline]
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Copies the texture to host memory, waiting for the device.
    pub fn download(&self) -> Result<Image, ExposureError> {
        let layout = TextureReadback::new(self.resolution);
        let buffer = layout.create_buffer(&self.device, "exposure frame download");

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("exposure frame download encoder"),
            });
        layout.encode_copy(&mut encoder, &self.texture, &buffer);
        self.queue.submit(std::iter::once(encoder.finish()));

        let (tx, rx) = std::sync::mpsc::channel();
        buffer
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send(result);
            });

        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| ExposureError::device("frame download poll", e))?;

        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(ExposureError::device("frame download map", e)),
            Err(e) => return Err(ExposureError::device("frame download map", e)),
        }

        let image = {
            let view = buffer.slice(..).get_mapped_range();
            layout.read(&view)
        };
        buffer.unmap();
        Ok(image)
    }
}
