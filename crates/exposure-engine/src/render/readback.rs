use crate::geometry::Resolution;

use super::Image;

const BYTES_PER_TEXEL: u32 = 4;

/// Row layout for copying an RGBA8 texture into a mappable buffer.
///
/// wgpu requires each copied row to start on a 256-byte boundary, so rows are
/// padded in the buffer and stripped again on read.
#[derive(Debug, Copy, Clone)]
pub(crate) struct TextureReadback {
    resolution: Resolution,
    padded_bytes_per_row: u32,
}

impl TextureReadback {
    pub(crate) fn new(resolution: Resolution) -> Self {
        let unpadded = resolution.width * BYTES_PER_TEXEL;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        Self {
            resolution,
            padded_bytes_per_row: unpadded.div_ceil(align) * align,
        }
    }

    pub(crate) fn buffer_size(&self) -> u64 {
        self.padded_bytes_per_row as u64 * self.resolution.height as u64
    }

    pub(crate) fn create_buffer(&self, device: &wgpu::Device, label: &str) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: self.buffer_size(),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    pub(crate) fn encode_copy(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        texture: &wgpu::Texture,
        buffer: &wgpu::Buffer,
    ) {
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.resolution.height),
                },
            },
            wgpu::Extent3d {
                width: self.resolution.width,
                height: self.resolution.height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Strips row padding from mapped bytes.
    pub(crate) fn read(&self, bytes: &[u8]) -> Image {
        let row_bytes = (self.resolution.width * BYTES_PER_TEXEL) as usize;
        let mut texels = Vec::with_capacity(self.resolution.pixel_count() as usize);
        for row in bytes
            .chunks(self.padded_bytes_per_row as usize)
            .take(self.resolution.height as usize)
        {
            texels.extend(
                row[..row_bytes]
                    .chunks_exact(4)
                    .map(|px| u32::from_le_bytes([px[0], px[1], px[2], px[3]])),
            );
        }
        Image::from_texels(self.resolution, texels).unwrap_or_else(|| Image::new(self.resolution))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_copy_alignment() {
        let layout = TextureReadback::new(Resolution::new(3, 2));
        assert_eq!(layout.padded_bytes_per_row, 256);
        assert_eq!(layout.buffer_size(), 512);
    }

    #[test]
    fn read_strips_padding() {
        let layout = TextureReadback::new(Resolution::new(2, 2));
        let mut bytes = vec![0u8; 512];
        bytes[0..4].copy_from_slice(&[1, 0, 0, 255]);
        bytes[256 + 4..256 + 8].copy_from_slice(&[2, 0, 0, 255]);
        let image = layout.read(&bytes);
        assert_eq!(image.texels(), &[0xFF00_0001, 0, 0, 0xFF00_0002]);
    }
}
