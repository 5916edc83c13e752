/// Largest palette the 24-bit color encoding can address.
pub const MAX_CAPACITY: usize = 0x00FF_FFFF;

/// Flat RGBA8 color written by the rasterizer, packed little-endian
/// (red in the low byte), which matches `pack4x8unorm` in WGSL.
///
/// Slot `i` is encoded as the 24-bit value `i + 1` in RGB with alpha 255.
/// The background is all zero, so it never collides with a palette entry and
/// survives 8-bit quantization exactly.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct TagColor(u32);

impl TagColor {
    pub const BACKGROUND: TagColor = TagColor(0);

    const ALPHA: u32 = 0xFF00_0000;
    const VALUE: u32 = 0x00FF_FFFF;

    /// Color for palette slot `index`. Indices past [`MAX_CAPACITY`] wrap.
    #[inline]
    pub const fn from_index(index: u32) -> Self {
        TagColor(((index.wrapping_add(1)) & Self::VALUE) | Self::ALPHA)
    }

    #[inline]
    pub const fn from_packed(texel: u32) -> Self {
        TagColor(texel)
    }

    #[inline]
    pub const fn from_rgba8(rgba: [u8; 4]) -> Self {
        TagColor(u32::from_le_bytes(rgba))
    }

    #[inline]
    pub const fn packed(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn to_rgba8(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub const fn is_background(self) -> bool {
        self.0 >> 24 == 0
    }

    /// Palette slot encoded by this color, `None` for the background.
    #[inline]
    pub const fn index(self) -> Option<u32> {
        if self.is_background() {
            return None;
        }
        match self.0 & Self::VALUE {
            0 => None,
            v => Some(v - 1),
        }
    }
}
