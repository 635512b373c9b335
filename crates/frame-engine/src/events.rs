#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Next,
    Previous,
}

/// Why a timed hold (still image, priority item) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldOutcome {
    /// The display duration ran out.
    Expired,
    Navigated(Navigation),
    /// The interrupt flag appeared; the caller consumes it.
    Interrupted,
    /// Shutdown was requested.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

/// Messages from the playback thread to the window on the main thread.
#[derive(Debug)]
pub enum DisplayEvent {
    /// A new frame is waiting in the shared frame slot.
    FrameReady,
    /// An external process is about to take over the screen.
    Release,
    /// The external process is gone; restore fullscreen state.
    Reclaim,
    Shutdown,
}

#[derive(Debug)]
pub struct PresentedFrame {
    pub width: u32,
    pub height: u32,
    /// 0RGB pixels, row-major.
    pub pixels: Vec<u32>,
}
