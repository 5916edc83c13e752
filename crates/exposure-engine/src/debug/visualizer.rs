use std::fmt;
use std::hash::Hash;
use std::path::Path;

use glam::Vec3;
use image::{ImageFormat, RgbaImage};

use crate::evaluator::{RenderRequest, RenderResult, TargetId};
use crate::render::Image;

use super::{label, ColorMap, DebugError};

/// View-direction arrow in world space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Arrow {
    pub origin: Vec3,
    /// Unit direction.
    pub direction: Vec3,
    pub length: f32,
    pub color: [u8; 4],
}

impl Arrow {
    #[inline]
    pub fn tip(&self) -> Vec3 {
        self.origin + self.direction * self.length
    }
}

/// One object's line in the overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugRow {
    pub label: String,
    /// Square meters.
    pub area: f64,
    /// Share of the frame area, `0..=1`.
    pub fraction: f64,
    pub color: [u8; 4],
}

impl DebugRow {
    pub fn text(&self) -> String {
        format!("{}: {:.3} m2 ({:.1}%)", self.label, self.area, self.fraction * 100.0)
    }
}

/// Everything produced for the latest observed result.
#[derive(Debug, Clone)]
pub struct DebugView {
    pub target: TargetId,
    pub generation: u64,
    /// Tag image as rendered.
    pub raw: Image,
    /// Tag image with display colors, labels drawn when a font is loaded.
    pub colorized: RgbaImage,
    pub arrow: Option<Arrow>,
    /// Largest area first.
    pub rows: Vec<DebugRow>,
}

/// Builds debug output from delivered results.
pub struct DebugVisualizer {
    pub enabled: bool,
    /// Color painted where no object was drawn.
    pub background: [u8; 4],
    pub color_map: ColorMap,
    pub show_arrow: bool,
    pub arrow_color: [u8; 4],
    pub show_labels: bool,
    /// Label size in pixels.
    pub label_px: f32,

    font: Option<fontdue::Font>,
    latest: Option<DebugView>,
}

impl Default for DebugVisualizer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DebugVisualizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugVisualizer")
            .field("enabled", &self.enabled)
            .field("background", &self.background)
            .field("show_arrow", &self.show_arrow)
            .field("show_labels", &self.show_labels)
            .field("has_font", &self.font.is_some())
            .finish_non_exhaustive()
    }
}

impl DebugVisualizer {
    pub fn new() -> Self {
        Self {
            enabled: true,
            background: [0, 0, 0, 255],
            color_map: ColorMap::default(),
            show_arrow: true,
            arrow_color: [255, 0, 0, 255],
            show_labels: true,
            label_px: 14.0,
            font: None,
            latest: None,
        }
    }

    pub fn with_background(mut self, background: [u8; 4]) -> Self {
        self.background = background;
        self
    }

    /// Parses a TrueType or OpenType font used for on-image labels.
    pub fn load_font(&mut self, bytes: &[u8]) -> Result<(), DebugError> {
        let font = fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default())
            .map_err(|e| DebugError::Font(e.to_string()))?;
        self.font = Some(font);
        Ok(())
    }

    #[inline]
    pub fn latest(&self) -> Option<&DebugView> {
        self.latest.as_ref()
    }

    pub fn clear(&mut self) {
        self.latest = None;
    }

    /// Records a delivered result. Ignored while disabled.
    pub fn observe<K: fmt::Display + Eq + Hash>(
        &mut self,
        _request: &RenderRequest,
        result: &RenderResult<K>,
        image: &Image,
    ) {
        if !self.enabled {
            return;
        }

        let frame_area = result.frame_area();
        let rows: Vec<DebugRow> = result
            .sorted_areas()
            .into_iter()
            .map(|(object, area)| DebugRow {
                label: object.to_string(),
                area,
                fraction: if frame_area > 0.0 { area / frame_area } else { 0.0 },
                color: result
                    .slots
                    .get(object)
                    .map_or(self.background, |&slot| self.color_map.color(slot)),
            })
            .collect();

        let mut colorized = self.colorize(image);
        if self.show_labels {
            if let Some(font) = self.font.as_ref() {
                let lines: Vec<(String, [u8; 4])> =
                    rows.iter().map(|r| (r.text(), r.color)).collect();
                label::draw_lines(&mut colorized, font, self.label_px, &lines);
            }
        }

        let arrow = self.show_arrow.then(|| Arrow {
            origin: result.position,
            direction: result.forward,
            length: result.center_distance,
            color: self.arrow_color,
        });

        self.latest = Some(DebugView {
            target: result.target,
            generation: result.generation,
            raw: image.clone(),
            colorized,
            arrow,
            rows,
        });
    }

    /// Maps tag colors to display colors.
    pub fn colorize(&self, image: &Image) -> RgbaImage {
        let mut out = RgbaImage::new(image.width(), image.height());
        for (x, y, px) in out.enumerate_pixels_mut() {
            px.0 = match image.get(x, y).index() {
                Some(slot) => self.color_map.color(slot),
                None => self.background,
            };
        }
        out
    }

    /// Saves the latest image as PNG; `raw` writes the tag colors unmodified.
    pub fn save_png(&self, path: impl AsRef<Path>, raw: bool) -> Result<(), DebugError> {
        let view = self.latest.as_ref().ok_or(DebugError::NoFrame)?;
        let picture = if raw {
            RgbaImage::from_raw(view.raw.width(), view.raw.height(), view.raw.to_rgba8_bytes())
                .ok_or(DebugError::NoFrame)?
        } else {
            view.colorized.clone()
        };
        picture.save_with_format(path.as_ref(), ImageFormat::Png)?;
        log::info!("debug image saved to {}", path.as_ref().display());
        Ok(())
    }
}
