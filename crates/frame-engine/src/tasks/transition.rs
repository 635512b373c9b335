use std::ops::ControlFlow;
use std::time::Duration;

use image::RgbaImage;
use tracing::debug;

use crate::processing::compose::{cross_fade, darken, slide};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    Fade,
    /// New frame enters from the right edge.
    SlideLeft,
    /// New frame enters from the left edge.
    SlideRight,
    /// New frame enters from the bottom edge.
    SlideUp,
    /// New frame enters from the top edge.
    SlideDown,
}

impl TransitionKind {
    /// Parse the operator's transition name. `none` disables transitions and
    /// unknown names fall back to a fade.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" => None,
            "fade" => Some(Self::Fade),
            "slide_left" => Some(Self::SlideLeft),
            "slide_right" => Some(Self::SlideRight),
            "slide_up" => Some(Self::SlideUp),
            "slide_down" => Some(Self::SlideDown),
            other => {
                debug!(kind = other, "unknown transition; using fade");
                Some(Self::Fade)
            }
        }
    }
}

/// Number of frame steps for `duration` at `fps`; at least one.
pub fn frame_count(duration: Duration, fps: u32) -> u32 {
    let frames = (duration.as_secs_f64() * f64::from(fps)).round();
    if frames.is_finite() && frames >= 1.0 {
        frames as u32
    } else {
        1
    }
}

/// Blend `previous` into `next` at `progress` in [0, 1].
pub fn blend(kind: TransitionKind, previous: &RgbaImage, next: &RgbaImage, progress: f64) -> RgbaImage {
    let p = progress.clamp(0.0, 1.0);
    let w = f64::from(previous.width());
    let h = f64::from(previous.height());
    let remaining = 1.0 - p;
    match kind {
        TransitionKind::Fade => cross_fade(previous, next, (255.0 * p).round() as u8),
        TransitionKind::SlideLeft => slide(previous, next, (w * remaining).round() as i64, 0),
        TransitionKind::SlideRight => slide(previous, next, -(w * remaining).round() as i64, 0),
        TransitionKind::SlideUp => slide(previous, next, 0, (h * remaining).round() as i64),
        TransitionKind::SlideDown => slide(previous, next, 0, -(h * remaining).round() as i64),
    }
}

/// Render frames `0..=frames` of a transition, handing each to `present`.
///
/// Returns `Break` if `present` asked to stop early.
pub fn run(
    kind: TransitionKind,
    previous: &RgbaImage,
    next: &RgbaImage,
    frames: u32,
    mut present: impl FnMut(RgbaImage) -> ControlFlow<()>,
) -> ControlFlow<()> {
    let frames = frames.max(1);
    if previous.dimensions() != next.dimensions() {
        debug!("frame sizes differ; cutting without transition");
        return present(next.clone());
    }
    for i in 0..=frames {
        let progress = f64::from(i) / f64::from(frames);
        present(blend(kind, previous, next, progress))?;
    }
    ControlFlow::Continue(())
}

/// Darken `previous` to black over `frames` steps.
pub fn fade_to_black(
    previous: &RgbaImage,
    frames: u32,
    mut present: impl FnMut(RgbaImage) -> ControlFlow<()>,
) -> ControlFlow<()> {
    let frames = frames.max(1);
    for i in 0..=frames {
        let alpha = (255.0 * f64::from(i) / f64::from(frames)).round() as u8;
        present(darken(previous, alpha))?;
    }
    ControlFlow::Continue(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(v: u8) -> RgbaImage {
        RgbaImage::from_pixel(10, 4, Rgba([v, v, v, 255]))
    }

    #[test]
    fn parses_names() {
        assert_eq!(TransitionKind::parse("none"), None);
        assert_eq!(TransitionKind::parse("slide_up"), Some(TransitionKind::SlideUp));
        assert_eq!(TransitionKind::parse("wipe"), Some(TransitionKind::Fade));
    }

    #[test]
    fn frame_count_rounds_and_floors_at_one() {
        assert_eq!(frame_count(Duration::from_secs(1), 60), 60);
        assert_eq!(frame_count(Duration::from_millis(508), 60), 30);
        assert_eq!(frame_count(Duration::ZERO, 60), 1);
    }

    #[test]
    fn slide_left_enters_from_right() {
        let prev = solid(0);
        let next = solid(200);
        let mid = blend(TransitionKind::SlideLeft, &prev, &next, 0.5);
        assert_eq!(mid.get_pixel(2, 0).0[0], 0);
        assert_eq!(mid.get_pixel(7, 0).0[0], 200);
        let done = blend(TransitionKind::SlideLeft, &prev, &next, 1.0);
        assert_eq!(done.get_pixel(0, 0).0[0], 200);
    }

    #[test]
    fn slide_down_enters_from_top() {
        let mid = blend(TransitionKind::SlideDown, &solid(0), &solid(200), 0.5);
        assert_eq!(mid.get_pixel(0, 0).0[0], 200);
        assert_eq!(mid.get_pixel(0, 3).0[0], 0);
    }

    #[test]
    fn run_presents_every_step_and_ends_on_target() {
        let mut presented = Vec::new();
        let flow = run(TransitionKind::Fade, &solid(0), &solid(250), 4, |f| {
            presented.push(f.get_pixel(0, 0).0[0]);
            ControlFlow::Continue(())
        });
        assert_eq!(flow, ControlFlow::Continue(()));
        assert_eq!(presented.len(), 5);
        assert_eq!(presented.first(), Some(&0));
        assert_eq!(presented.last(), Some(&250));
    }

    #[test]
    fn run_stops_when_asked() {
        let mut count = 0;
        let flow = fade_to_black(&solid(100), 10, |_| {
            count += 1;
            if count == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(flow, ControlFlow::Break(()));
        assert_eq!(count, 3);
    }
}
