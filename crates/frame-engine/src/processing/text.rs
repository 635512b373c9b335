//! Glyph rasterisation onto RGBA frames.

// Drawing helpers pass explicit geometry and colours to stay allocation free.
#![allow(clippy::too_many_arguments)]

use std::fs;
use std::path::Path;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont, point};
use anyhow::{Context, Result, anyhow};
use fontdb::{Database, Family, Query, Source};
use image::{Rgba, RgbaImage};

/// Load the overlay font: `custom` when given, otherwise the first available
/// preferred system family.
pub fn load_font(custom: Option<&Path>) -> Result<FontArc> {
    if let Some(path) = custom {
        let data =
            fs::read(path).with_context(|| format!("failed to read font at {}", path.display()))?;
        return FontArc::try_from_vec(data)
            .with_context(|| format!("failed to decode font at {}", path.display()));
    }

    let mut db = Database::new();
    db.load_system_fonts();

    let preferred_families = [
        Family::Name("DejaVu Sans"),
        Family::Name("Noto Sans"),
        Family::Name("Inter"),
        Family::SansSerif,
    ];

    for family in preferred_families {
        if let Some(id) = db.query(&Query {
            families: &[family],
            ..Default::default()
        }) && let Some(font) = load_face(&db, id)?
        {
            return Ok(font);
        }
    }

    for face in db.faces() {
        if let Some(font) = load_face(&db, face.id)? {
            return Ok(font);
        }
    }

    Err(anyhow!("no usable system font found for the overlay"))
}

fn load_face(db: &Database, id: fontdb::ID) -> Result<Option<FontArc>> {
    let face = db.face(id).context("missing font face in database")?;
    let data = match &face.source {
        Source::Binary(data) => data.as_ref().as_ref().to_vec(),
        Source::File(path) => {
            fs::read(path).with_context(|| format!("failed to read font at {}", path.display()))?
        }
        Source::SharedFile(_, data) => data.as_ref().as_ref().to_vec(),
    };
    Ok(FontArc::try_from_vec(data).ok())
}

#[derive(Debug, Clone, Copy)]
pub struct LineMetrics {
    pub ascent: f32,
    pub descent: f32,
}

impl LineMetrics {
    pub fn height(&self) -> f32 {
        self.ascent + self.descent
    }
}

pub fn line_metrics(font: &FontArc, scale: PxScale) -> LineMetrics {
    let scaled = font.as_scaled(scale);
    LineMetrics {
        ascent: scaled.ascent(),
        descent: scaled.descent().abs(),
    }
}

pub fn measure_text(text: &str, font: &FontArc, scale: PxScale) -> f32 {
    let scaled_font = font.as_scaled(scale);
    let mut width = 0.0f32;
    let mut previous = None;
    for ch in text.chars() {
        if ch.is_control() {
            continue;
        }
        let glyph_id = scaled_font.glyph_id(ch);
        if let Some(prev) = previous {
            width += scaled_font.kern(prev, glyph_id);
        }
        width += scaled_font.h_advance(glyph_id);
        previous = Some(glyph_id);
    }
    width.max(0.0)
}

pub fn draw_text(
    canvas: &mut RgbaImage,
    font: &FontArc,
    text: &str,
    color: Rgba<u8>,
    left: f32,
    baseline: f32,
    scale: PxScale,
) {
    let scaled = font.as_scaled(scale);
    let mut cursor_x = left;
    let mut previous = None;
    for ch in text.chars() {
        if ch.is_control() {
            continue;
        }
        let glyph = scaled.glyph_id(ch);
        if let Some(prev) = previous {
            cursor_x += scaled.kern(prev, glyph);
        }
        let advance = scaled.h_advance(glyph);
        let mut positioned = scaled.scaled_glyph(ch);
        positioned.position = point(cursor_x, baseline);
        if let Some(outline) = font.outline_glyph(positioned) {
            let bounds = outline.px_bounds();
            outline.draw(|x, y, coverage| {
                blend_pixel(
                    canvas,
                    bounds.min.x + x as f32,
                    bounds.min.y + y as f32,
                    color,
                    coverage,
                );
            });
        }
        cursor_x += advance;
        previous = Some(glyph);
    }
}

/// Draw `text` with a one pixel `outline` ring under the `fill` glyphs.
pub fn draw_outlined_text(
    canvas: &mut RgbaImage,
    font: &FontArc,
    text: &str,
    fill: Rgba<u8>,
    outline: Rgba<u8>,
    left: f32,
    baseline: f32,
    scale: PxScale,
) {
    for dx in -1i8..=1 {
        for dy in -1i8..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            draw_text(
                canvas,
                font,
                text,
                outline,
                left + f32::from(dx),
                baseline + f32::from(dy),
                scale,
            );
        }
    }
    draw_text(canvas, font, text, fill, left, baseline, scale);
}

/// Alpha-blend a solid rectangle; the colour's own alpha is the opacity.
pub fn fill_rect(canvas: &mut RgbaImage, left: i64, top: i64, width: u32, height: u32, color: Rgba<u8>) {
    let x0 = left.max(0);
    let y0 = top.max(0);
    let x1 = (left + i64::from(width)).min(i64::from(canvas.width()));
    let y1 = (top + i64::from(height)).min(i64::from(canvas.height()));
    for y in y0..y1 {
        for x in x0..x1 {
            blend_pixel(canvas, x as f32, y as f32, color, 1.0);
        }
    }
}

pub fn blend_pixel(canvas: &mut RgbaImage, x: f32, y: f32, color: Rgba<u8>, coverage: f32) {
    if coverage <= 0.0 {
        return;
    }
    let xi = x.floor() as i64;
    let yi = y.floor() as i64;
    if xi < 0 || yi < 0 || xi >= i64::from(canvas.width()) || yi >= i64::from(canvas.height()) {
        return;
    }
    let src_a = (f32::from(color[3]) / 255.0 * coverage).clamp(0.0, 1.0);
    let dst = canvas.get_pixel_mut(xi as u32, yi as u32);
    for c in 0..3 {
        let blended = f32::from(color[c]) * src_a + f32::from(dst[c]) * (1.0 - src_a);
        dst[c] = blended.round().clamp(0.0, 255.0) as u8;
    }
    let out_a = src_a + f32::from(dst[3]) / 255.0 * (1.0 - src_a);
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_rect_blends_and_clips() {
        let mut canvas = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        fill_rect(&mut canvas, -2, 2, 10, 10, Rgba([255, 255, 255, 128]));
        assert_eq!(canvas.get_pixel(0, 0).0, [0, 0, 0, 255]);
        let px = canvas.get_pixel(3, 3).0;
        assert!(px[0] > 120 && px[0] < 136, "{px:?}");
        assert_eq!(px[3], 255);
    }

    #[test]
    fn blend_pixel_ignores_out_of_bounds() {
        let mut canvas = RgbaImage::new(2, 2);
        blend_pixel(&mut canvas, -1.0, 0.0, Rgba([255, 0, 0, 255]), 1.0);
        blend_pixel(&mut canvas, 5.0, 5.0, Rgba([255, 0, 0, 255]), 1.0);
        assert!(canvas.pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }

    #[test]
    fn missing_custom_font_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_font(Some(&dir.path().join("nope.ttf"))).is_err());
    }
}
