/// Largest size with the source aspect ratio that fits inside the canvas.
///
/// Never upscales beyond the canvas and never returns a zero dimension.
pub fn resize_to_contain(canvas_w: u32, canvas_h: u32, src_w: u32, src_h: u32) -> (u32, u32) {
    let iw = src_w.max(1) as f32;
    let ih = src_h.max(1) as f32;
    let cw = canvas_w.max(1) as f32;
    let ch = canvas_h.max(1) as f32;
    let scale = (cw / iw).min(ch / ih).max(0.0);
    let scale = if scale.is_finite() { scale } else { 1.0 };
    let w = (iw * scale).round().clamp(1.0, cw);
    let h = (ih * scale).round().clamp(1.0, ch);
    (w as u32, h as u32)
}

pub fn center_offset(inner_w: u32, inner_h: u32, outer_w: u32, outer_h: u32) -> (u32, u32) {
    let ox = outer_w.saturating_sub(inner_w) / 2;
    let oy = outer_h.saturating_sub(inner_h) / 2;
    (ox, oy)
}

/// Dimensions of a frame enlarged by `zoom`, rounded down like a crop box.
pub fn zoomed(width: u32, height: u32, zoom: f64) -> (u32, u32) {
    let zoom = if zoom.is_finite() && zoom >= 1.0 { zoom } else { 1.0 };
    let w = (f64::from(width) * zoom).floor().max(f64::from(width));
    let h = (f64::from(height) * zoom).floor().max(f64::from(height));
    (w as u32, h as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contain_letterboxes_wide_source() {
        assert_eq!(resize_to_contain(1920, 1080, 4000, 1000), (1920, 480));
        assert_eq!(center_offset(1920, 480, 1920, 1080), (0, 300));
    }

    #[test]
    fn contain_upscales_small_source_to_fit() {
        assert_eq!(resize_to_contain(800, 600, 400, 300), (800, 600));
    }

    #[test]
    fn zoom_never_shrinks() {
        assert_eq!(zoomed(1000, 500, 1.15), (1150, 575));
        assert_eq!(zoomed(1000, 500, 0.5), (1000, 500));
    }
}
