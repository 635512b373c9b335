//! Full-screen slides shown instead of media: the "nothing to show" screen
//! and the title card that opens a named playlist.

use std::net::{IpAddr, UdpSocket};
use std::path::Path;
use std::time::Duration;

use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Result};
use image::{Luma, Rgba, RgbaImage, imageops};
use qrcode::QrCode;
use tracing::debug;

use crate::processing::compose::{black_frame, resize_rgba};
use crate::processing::decode::decode_rgba8_apply_exif;
use crate::processing::text::{draw_text, line_metrics, measure_text};

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const MUTED: Rgba<u8> = Rgba([190, 190, 190, 255]);
const TITLE_BACKGROUND: Rgba<u8> = Rgba([181, 136, 99, 255]);
const LOGO_WIDTH: u32 = 300;
const QR_SIDE: u32 = 220;
const GAP: u32 = 24;

/// Address other devices on the LAN can reach this host at.
///
/// Connecting a UDP socket sends nothing; it only asks the kernel which
/// interface would route to a public address.
pub fn local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

/// Black and white QR code for `url`, at least `side` pixels square.
pub fn qr_image(url: &str, side: u32) -> Result<RgbaImage> {
    let code = QrCode::new(url.as_bytes()).context("failed to generate QR code")?;
    let luma = code
        .render::<Luma<u8>>()
        .min_dimensions(side, side)
        .quiet_zone(true)
        .build();
    let mut rgba = RgbaImage::new(luma.width(), luma.height());
    for (dst, src) in rgba.pixels_mut().zip(luma.pixels()) {
        let v = src[0];
        *dst = Rgba([v, v, v, 255]);
    }
    Ok(rgba)
}

enum Block {
    Image(RgbaImage),
    Line {
        text: String,
        color: Rgba<u8>,
        scale: PxScale,
    },
}

impl Block {
    fn height(&self, font: &FontArc) -> u32 {
        match self {
            Block::Image(img) => img.height(),
            Block::Line { scale, .. } => line_metrics(font, *scale).height().ceil() as u32,
        }
    }
}

/// What the idle screen tells the operator.
#[derive(Debug, Clone)]
pub struct IdleInfo<'a> {
    pub logo_path: &'a Path,
    pub retry_in: Duration,
    pub ip: Option<IpAddr>,
    pub language: &'a str,
}

/// Render the "no media" screen: logo, message, address and a QR code
/// pointing at the configuration UI, stacked and centred.
pub fn idle_screen(font: &FontArc, width: u32, height: u32, info: &IdleInfo<'_>) -> RgbaImage {
    let mut canvas = black_frame(width, height);
    let base = (height as f32 / 22.0).clamp(18.0, 48.0);
    let fr = info.language == "fr";
    let mut blocks = Vec::new();

    match load_logo(info.logo_path) {
        Ok(logo) => blocks.push(Block::Image(logo)),
        Err(err) => debug!("idle logo unavailable: {err:#}"),
    }
    blocks.push(Block::Line {
        text: if fr { "Aucune photo trouvée" } else { "No photos found" }.to_string(),
        color: WHITE,
        scale: PxScale::from(base * 1.4),
    });
    let url = info.ip.map(|ip| format!("http://{ip}"));
    if let Some(url) = &url {
        blocks.push(Block::Line {
            text: url.clone(),
            color: WHITE,
            scale: PxScale::from(base),
        });
    }
    blocks.push(Block::Line {
        text: format!("{width}x{height}"),
        color: MUTED,
        scale: PxScale::from(base * 0.8),
    });
    blocks.push(Block::Line {
        text: if fr {
            format!("Nouvel essai dans {} s", info.retry_in.as_secs())
        } else {
            format!("Retrying in {} s", info.retry_in.as_secs())
        },
        color: MUTED,
        scale: PxScale::from(base * 0.8),
    });
    if let Some(url) = &url {
        match qr_image(url, QR_SIDE.min(height / 4).max(64)) {
            Ok(qr) => {
                blocks.push(Block::Image(qr));
                blocks.push(Block::Line {
                    text: if fr { "Scanner pour configurer" } else { "Scan to configure" }
                        .to_string(),
                    color: MUTED,
                    scale: PxScale::from(base * 0.8),
                });
            }
            Err(err) => debug!("skipping QR code: {err:#}"),
        }
    }

    let total: u32 = blocks.iter().map(|b| b.height(font)).sum::<u32>()
        + GAP * (blocks.len().saturating_sub(1) as u32);
    let mut y = i64::from(height.saturating_sub(total) / 2);
    for block in &blocks {
        match block {
            Block::Image(img) => {
                let x = (i64::from(width) - i64::from(img.width())) / 2;
                imageops::overlay(&mut canvas, img, x, y);
            }
            Block::Line { text, color, scale } => {
                let w = measure_text(text, font, *scale);
                let x = (width as f32 - w) / 2.0;
                let baseline = y as f32 + line_metrics(font, *scale).ascent;
                draw_text(&mut canvas, font, text, *color, x, baseline, *scale);
            }
        }
        y += i64::from(block.height(font) + GAP);
    }
    canvas
}

fn load_logo(path: &Path) -> Result<RgbaImage> {
    let logo = decode_rgba8_apply_exif(path)?;
    if logo.width() == 0 {
        return Ok(logo);
    }
    let w = LOGO_WIDTH.min(logo.width());
    let h = ((u64::from(logo.height()) * u64::from(w)) / u64::from(logo.width())).max(1) as u32;
    resize_rgba(&logo, w, h)
}

/// Solid card announcing a named playlist.
pub fn title_slide(font: &FontArc, width: u32, height: u32, title: &str) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(width.max(1), height.max(1), TITLE_BACKGROUND);
    let mut scale = PxScale::from((height as f32 / 8.0).max(16.0));
    let max_w = width as f32 * 0.9;
    let measured = measure_text(title, font, scale);
    if measured > max_w && measured > 0.0 {
        scale = PxScale::from(scale.y * max_w / measured);
    }
    let metrics = line_metrics(font, scale);
    let w = measure_text(title, font, scale);
    let x = (width as f32 - w) / 2.0;
    let baseline = (height as f32 - metrics.height()) / 2.0 + metrics.ascent;
    draw_text(&mut canvas, font, title, WHITE, x, baseline, scale);
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qr_is_square_and_binary() {
        let qr = qr_image("http://192.168.1.20", 120).unwrap();
        assert_eq!(qr.width(), qr.height());
        assert!(qr.width() >= 120);
        assert!(qr.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert!(qr.pixels().any(|p| p[0] == 0));
    }

    #[test]
    fn logo_is_scaled_to_fixed_width() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logo.png");
        RgbaImage::from_pixel(600, 200, Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();
        let logo = load_logo(&path).unwrap();
        assert_eq!(logo.dimensions(), (300, 100));
        assert!(load_logo(&dir.path().join("missing.png")).is_err());
    }
}
