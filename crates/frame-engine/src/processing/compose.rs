//! CPU frame composition: fitting, cropping and blending RGBA frames.

use anyhow::{Context, Result, anyhow, bail};
use fast_image_resize as fir;
use image::{Rgba, RgbaImage, imageops};

use crate::processing::layout::{center_offset, resize_to_contain};

const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

pub fn resize_rgba(source: &RgbaImage, target_w: u32, target_h: u32) -> Result<RgbaImage> {
    if target_w == 0 || target_h == 0 {
        bail!("resize dimensions must be positive");
    }
    if source.width() == target_w && source.height() == target_h {
        return Ok(source.clone());
    }

    let src_view = fir::images::ImageRef::new(
        source.width(),
        source.height(),
        source.as_raw(),
        fir::PixelType::U8x4,
    )
    .context("failed to create source view for resize")?;
    let mut dst_image = fir::images::Image::new(target_w, target_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::CatmullRom));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_view, &mut dst_image, Some(&options))
        .context("frame resize failed")?;
    let buffer = dst_image.into_vec();
    RgbaImage::from_raw(target_w, target_h, buffer)
        .ok_or_else(|| anyhow!("failed to construct resized RGBA image"))
}

pub fn black_frame(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width.max(1), height.max(1), BLACK)
}

/// Fit `source` inside a `width`×`height` black canvas, centered.
pub fn fit_to_canvas(source: &RgbaImage, width: u32, height: u32) -> Result<RgbaImage> {
    let (fw, fh) = resize_to_contain(width, height, source.width(), source.height());
    let fitted = resize_rgba(source, fw, fh)?;
    let mut canvas = black_frame(width, height);
    let (ox, oy) = center_offset(fw, fh, width, height);
    imageops::overlay(&mut canvas, &fitted, i64::from(ox), i64::from(oy));
    flatten_alpha(&mut canvas);
    Ok(canvas)
}

/// Copy the `width`×`height` window at (`x`, `y`) out of `source`.
///
/// The window is clamped so it always lies inside the source.
pub fn crop(source: &RgbaImage, x: u32, y: u32, width: u32, height: u32) -> RgbaImage {
    let width = width.min(source.width());
    let height = height.min(source.height());
    let x = x.min(source.width() - width);
    let y = y.min(source.height() - height);
    imageops::crop_imm(source, x, y, width, height).to_image()
}

/// Alpha-blend `next` over `previous`. `alpha` is 0 (all previous) to 255.
pub fn cross_fade(previous: &RgbaImage, next: &RgbaImage, alpha: u8) -> RgbaImage {
    let mut out = previous.clone();
    let a = u32::from(alpha);
    for (dst, src) in out.pixels_mut().zip(next.pixels()) {
        for c in 0..3 {
            let d = u32::from(dst[c]);
            let s = u32::from(src[c]);
            dst[c] = ((s * a + d * (255 - a) + 127) / 255) as u8;
        }
        dst[3] = 255;
    }
    out
}

/// Draw `next` over `previous` shifted by (`dx`, `dy`) pixels.
pub fn slide(previous: &RgbaImage, next: &RgbaImage, dx: i64, dy: i64) -> RgbaImage {
    let mut out = previous.clone();
    imageops::replace(&mut out, next, dx, dy);
    out
}

/// Darken `frame` toward black; `alpha` 255 is fully black.
pub fn darken(frame: &RgbaImage, alpha: u8) -> RgbaImage {
    let keep = 255 - u32::from(alpha);
    let mut out = frame.clone();
    for px in out.pixels_mut() {
        for c in 0..3 {
            px[c] = ((u32::from(px[c]) * keep + 127) / 255) as u8;
        }
    }
    out
}

/// Pack RGBA pixels as 0RGB words for the presentation surface.
pub fn to_xrgb(frame: &RgbaImage) -> Vec<u32> {
    frame
        .pixels()
        .map(|p| (u32::from(p[0]) << 16) | (u32::from(p[1]) << 8) | u32::from(p[2]))
        .collect()
}

fn flatten_alpha(frame: &mut RgbaImage) {
    for px in frame.pixels_mut() {
        px[3] = 255;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, rgb: [u8; 3]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([rgb[0], rgb[1], rgb[2], 255]))
    }

    #[test]
    fn fit_letterboxes_on_black() {
        let src = solid(40, 10, [255, 0, 0]);
        let out = fit_to_canvas(&src, 40, 40).unwrap();
        assert_eq!(out.dimensions(), (40, 40));
        assert_eq!(out.get_pixel(20, 0).0, [0, 0, 0, 255]);
        assert_eq!(out.get_pixel(20, 20).0[0], 255);
    }

    #[test]
    fn crop_clamps_window() {
        let src = solid(10, 10, [1, 2, 3]);
        let out = crop(&src, 8, 8, 5, 5);
        assert_eq!(out.dimensions(), (5, 5));
    }

    #[test]
    fn cross_fade_endpoints() {
        let a = solid(2, 2, [0, 0, 0]);
        let b = solid(2, 2, [200, 100, 50]);
        assert_eq!(cross_fade(&a, &b, 0).get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(cross_fade(&a, &b, 255).get_pixel(0, 0).0, [200, 100, 50, 255]);
    }

    #[test]
    fn slide_offsets_new_frame() {
        let a = solid(4, 1, [0, 0, 0]);
        let b = solid(4, 1, [9, 9, 9]);
        let out = slide(&a, &b, 2, 0);
        assert_eq!(out.get_pixel(1, 0).0[0], 0);
        assert_eq!(out.get_pixel(2, 0).0[0], 9);
    }

    #[test]
    fn darken_reaches_black() {
        let a = solid(1, 1, [255, 128, 1]);
        assert_eq!(darken(&a, 255).get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(darken(&a, 0).get_pixel(0, 0).0, [255, 128, 1, 255]);
    }

    #[test]
    fn packs_xrgb() {
        let a = solid(1, 1, [0x12, 0x34, 0x56]);
        assert_eq!(to_xrgb(&a), vec![0x0012_3456]);
    }
}
