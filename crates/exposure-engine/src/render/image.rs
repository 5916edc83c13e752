use crate::geometry::Resolution;
use crate::palette::TagColor;

/// Host-side tag image, row-major with row 0 at the top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    texels: Vec<u32>,
}

impl Image {
    /// All-background image.
    pub fn new(resolution: Resolution) -> Self {
        Self {
            width: resolution.width,
            height: resolution.height,
            texels: vec![TagColor::BACKGROUND.packed(); resolution.pixel_count() as usize],
        }
    }

    /// Wraps packed texels; `None` when the length does not match.
    pub fn from_texels(resolution: Resolution, texels: Vec<u32>) -> Option<Self> {
        (texels.len() as u64 == resolution.pixel_count()).then_some(Self {
            width: resolution.width,
            height: resolution.height,
            texels,
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    #[inline]
    pub fn texels(&self) -> &[u32] {
        &self.texels
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> TagColor {
        TagColor::from_packed(self.texels[(y * self.width + x) as usize])
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, color: TagColor) {
        self.texels[(y * self.width + x) as usize] = color.packed();
    }

    /// Tightly packed RGBA8 bytes.
    pub fn to_rgba8_bytes(&self) -> Vec<u8> {
        self.texels.iter().flat_map(|t| t.to_le_bytes()).collect()
    }

    pub fn count_of(&self, color: TagColor) -> usize {
        self.texels.iter().filter(|&&t| t == color.packed()).count()
    }
}
