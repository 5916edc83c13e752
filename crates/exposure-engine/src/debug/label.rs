use image::RgbaImage;

/// Draws `lines` top-left aligned onto `canvas`, one color per line.
///
/// Glyph coverage is alpha blended over the existing pixels; glyphs falling
/// outside the canvas are clipped.
pub(super) fn draw_lines(
    canvas: &mut RgbaImage,
    font: &fontdue::Font,
    px: f32,
    lines: &[(String, [u8; 4])],
) {
    let Some(metrics) = font.horizontal_line_metrics(px) else { return };
    let margin = (px * 0.5).round() as i32;

    let mut baseline = margin + metrics.ascent.round() as i32;
    for (text, color) in lines {
        let mut pen_x = margin as f32;
        for ch in text.chars() {
            let (glyph, coverage) = font.rasterize(ch, px);
            let left = pen_x.round() as i32 + glyph.xmin;
            let top = baseline - glyph.height as i32 - glyph.ymin;
            blend_glyph(canvas, left, top, glyph.width, &coverage, *color);
            pen_x += glyph.advance_width;
        }
        baseline += metrics.new_line_size.round() as i32;
    }
}

fn blend_glyph(
    canvas: &mut RgbaImage,
    left: i32,
    top: i32,
    width: usize,
    coverage: &[u8],
    color: [u8; 4],
) {
    if width == 0 {
        return;
    }
    let (cw, ch) = (canvas.width() as i32, canvas.height() as i32);
    for (i, &a) in coverage.iter().enumerate() {
        if a == 0 {
            continue;
        }
        let x = left + (i % width) as i32;
        let y = top + (i / width) as i32;
        if x < 0 || y < 0 || x >= cw || y >= ch {
            continue;
        }
        let px = canvas.get_pixel_mut(x as u32, y as u32);
        let t = a as u32;
        for c in 0..3 {
            px.0[c] = ((color[c] as u32 * t + px.0[c] as u32 * (255 - t)) / 255) as u8;
        }
        px.0[3] = px.0[3].max(a);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_clips_outside_canvas() {
        let mut canvas = RgbaImage::new(2, 2);
        blend_glyph(&mut canvas, -1, -1, 2, &[255, 255, 255, 255], [255, 0, 0, 255]);
        assert_eq!(canvas.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(canvas.get_pixel(1, 1).0, [0, 0, 0, 0]);
    }
}
