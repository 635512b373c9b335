//! Slow "Ken Burns" motion across a still image.
//!
//! The fitted frame is enlarged by the zoom factor and a screen-sized window
//! slides between two points on the border of the valid crop-offset
//! rectangle. Position along the path follows a cosine ease so the motion
//! starts and stops gently.

use std::borrow::Cow;
use std::f64::consts::PI;
use std::time::Duration;

use anyhow::Result;
use image::RgbaImage;
use rand::Rng;
use tracing::debug;

use crate::processing::compose::{crop, resize_rgba};
use crate::processing::layout::zoomed;

const MAX_RESAMPLES: usize = 64;

/// Ease-in/ease-out progress for linear progress `t`, clamped to [0, 1].
pub fn eased(t: f64) -> f64 {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    0.5 * (1.0 - (PI * t).cos())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset {
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Top,
    Bottom,
    Left,
    Right,
}

const EDGES: [Edge; 4] = [Edge::Top, Edge::Bottom, Edge::Left, Edge::Right];

fn random_edge_point<R: Rng + ?Sized>(max_x: u32, max_y: u32, rng: &mut R) -> Offset {
    match EDGES[rng.random_range(0..EDGES.len())] {
        Edge::Top => Offset {
            x: rng.random_range(0..=max_x),
            y: 0,
        },
        Edge::Bottom => Offset {
            x: rng.random_range(0..=max_x),
            y: max_y,
        },
        Edge::Left => Offset {
            x: 0,
            y: rng.random_range(0..=max_y),
        },
        Edge::Right => Offset {
            x: max_x,
            y: rng.random_range(0..=max_y),
        },
    }
}

/// Start and end crop offsets; always distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanPath {
    pub start: Offset,
    pub end: Offset,
}

impl PanPath {
    /// Pick two distinct edge points in `[0, max_x] × [0, max_y]`.
    ///
    /// Returns `None` when the rectangle is a single point.
    pub fn choose<R: Rng + ?Sized>(max_x: u32, max_y: u32, rng: &mut R) -> Option<Self> {
        if max_x == 0 && max_y == 0 {
            return None;
        }
        let start = random_edge_point(max_x, max_y, rng);
        for _ in 0..MAX_RESAMPLES {
            let end = random_edge_point(max_x, max_y, rng);
            if end != start {
                return Some(Self { start, end });
            }
        }
        // Opposite corner is always distinct from a point on the border.
        let end = Offset {
            x: if start.x == 0 { max_x } else { 0 },
            y: if start.y == 0 { max_y } else { 0 },
        };
        Some(Self { start, end })
    }

    /// Offset at linear progress `t`.
    pub fn at(&self, t: f64) -> Offset {
        let e = eased(t);
        let lerp = |a: u32, b: u32| -> u32 {
            let v = f64::from(a) + (f64::from(b) - f64::from(a)) * e;
            v.trunc().max(0.0) as u32
        };
        Offset {
            x: lerp(self.start.x, self.end.x),
            y: lerp(self.start.y, self.end.y),
        }
    }
}

/// What a still image does while it is on screen.
pub enum Motion {
    Static(RgbaImage),
    Pan {
        scaled: RgbaImage,
        path: PanPath,
        width: u32,
        height: u32,
    },
}

impl Motion {
    /// Plan motion for a frame already fitted to the output. `zoom` of `None`
    /// means pan/zoom is disabled. A zoom that leaves no room to move falls
    /// back to a static hold.
    pub fn prepare<R: Rng + ?Sized>(
        fitted: RgbaImage,
        zoom: Option<f64>,
        rng: &mut R,
    ) -> Result<Self> {
        let Some(zoom) = zoom else {
            return Ok(Motion::Static(fitted));
        };
        let (width, height) = fitted.dimensions();
        let (sw, sh) = zoomed(width, height, zoom);
        let Some(path) = PanPath::choose(sw - width, sh - height, rng) else {
            debug!(zoom, "no pan headroom; holding still");
            return Ok(Motion::Static(fitted));
        };
        let scaled = resize_rgba(&fitted, sw, sh)?;
        debug!(?path, zoom, "pan/zoom path chosen");
        Ok(Motion::Pan {
            scaled,
            path,
            width,
            height,
        })
    }

    pub fn is_animated(&self) -> bool {
        matches!(self, Motion::Pan { .. })
    }

    /// Frame at linear progress `t`; progress 0 is the first frame.
    pub fn frame_at(&self, t: f64) -> Cow<'_, RgbaImage> {
        match self {
            Motion::Static(frame) => Cow::Borrowed(frame),
            Motion::Pan {
                scaled,
                path,
                width,
                height,
            } => {
                let offset = path.at(t);
                Cow::Owned(crop(scaled, offset.x, offset.y, *width, *height))
            }
        }
    }
}

/// Display-duration accounting that excludes time spent paused.
#[derive(Debug, Clone)]
pub struct HoldTimer {
    duration: Duration,
    started: Duration,
    paused_since: Option<Duration>,
    paused_total: Duration,
}

impl HoldTimer {
    pub fn start(now: Duration, duration: Duration) -> Self {
        Self {
            duration,
            started: now,
            paused_since: None,
            paused_total: Duration::ZERO,
        }
    }

    pub fn pause(&mut self, now: Duration) {
        if self.paused_since.is_none() {
            self.paused_since = Some(now);
        }
    }

    pub fn resume(&mut self, now: Duration) {
        if let Some(since) = self.paused_since.take() {
            self.paused_total += now.saturating_sub(since);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_since.is_some()
    }

    pub fn elapsed(&self, now: Duration) -> Duration {
        let now = self.paused_since.unwrap_or(now);
        now.saturating_sub(self.started)
            .saturating_sub(self.paused_total)
    }

    pub fn remaining(&self, now: Duration) -> Duration {
        self.duration.saturating_sub(self.elapsed(now))
    }

    pub fn progress(&self, now: Duration) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (self.elapsed(now).as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
    }

    pub fn expired(&self, now: Duration) -> bool {
        self.elapsed(now) >= self.duration
    }
}
