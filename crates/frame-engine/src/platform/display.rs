//! Fullscreen presentation surface.
//!
//! The playback loop runs on a worker thread and renders complete frames on
//! the CPU; the window lives on the main thread (winit requires it) and only
//! copies the latest frame into a softbuffer surface.

use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use image::RgbaImage;
use softbuffer::{Context as SoftContext, Surface};
use tracing::{debug, error, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy};
use winit::window::{Fullscreen, Window, WindowId};

use crate::events::{DisplayEvent, PresentedFrame};
use crate::processing::compose::to_xrgb;

/// Where rendered frames go.
pub trait FrameSink {
    /// Output size in pixels.
    fn size(&self) -> (u32, u32);
    fn present(&mut self, frame: &RgbaImage) -> Result<()>;
    /// Give the screen to an external process.
    fn release(&mut self);
    /// Take the screen back after [`FrameSink::release`].
    fn reclaim(&mut self);
}

/// Surface size published by the window, packed as `w << 32 | h`.
#[derive(Debug, Default)]
pub struct SharedSize {
    packed: AtomicU64,
    closed: AtomicBool,
}

impl SharedSize {
    pub fn set(&self, width: u32, height: u32) {
        self.packed
            .store((u64::from(width) << 32) | u64::from(height), Ordering::Release);
    }

    pub fn get(&self) -> Option<(u32, u32)> {
        let packed = self.packed.load(Ordering::Acquire);
        let (w, h) = ((packed >> 32) as u32, packed as u32);
        (w > 0 && h > 0).then_some((w, h))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Latest frame not yet picked up by the window. A newer frame replaces a
/// pending one, so a stalled window never holds more than one.
#[derive(Debug, Default)]
pub struct FrameSlot {
    pending: Mutex<Option<PresentedFrame>>,
}

impl FrameSlot {
    /// Store `frame`. Returns true when the slot was empty and the window
    /// therefore needs a wake-up.
    pub fn offer(&self, frame: PresentedFrame) -> bool {
        let mut pending = self.lock();
        let wake = pending.is_none();
        *pending = Some(frame);
        wake
    }

    pub fn take(&self) -> Option<PresentedFrame> {
        self.lock().take()
    }

    fn lock(&self) -> MutexGuard<'_, Option<PresentedFrame>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// [`FrameSink`] that hands frames to the window's event loop.
pub struct WindowSink {
    proxy: EventLoopProxy<DisplayEvent>,
    size: Arc<SharedSize>,
    slot: Arc<FrameSlot>,
}

impl WindowSink {
    const FALLBACK_SIZE: (u32, u32) = (1920, 1080);

    /// Block until the window has reported its size, or the event loop went
    /// away.
    pub fn wait_ready(&self, timeout: Duration) -> bool {
        let step = Duration::from_millis(10);
        let mut waited = Duration::ZERO;
        while self.size.get().is_none() && !self.size.is_closed() && waited < timeout {
            std::thread::sleep(step);
            waited += step;
        }
        self.size.get().is_some()
    }

    /// Ask the window to close. A closed event loop is already shut down.
    pub fn request_shutdown(&self) {
        if self.send(DisplayEvent::Shutdown).is_err() {
            debug!("display already closed");
        }
    }

    fn send(&self, event: DisplayEvent) -> Result<()> {
        self.proxy
            .send_event(event)
            .map_err(|_| anyhow!("display event loop closed"))
    }
}

impl FrameSink for WindowSink {
    fn size(&self) -> (u32, u32) {
        self.size.get().unwrap_or(Self::FALLBACK_SIZE)
    }

    fn present(&mut self, frame: &RgbaImage) -> Result<()> {
        let frame = PresentedFrame {
            width: frame.width(),
            height: frame.height(),
            pixels: to_xrgb(frame),
        };
        if self.slot.offer(frame) {
            self.send(DisplayEvent::FrameReady)?;
        } else if self.size.is_closed() {
            return Err(anyhow!("display event loop closed"));
        }
        Ok(())
    }

    fn release(&mut self) {
        if let Err(err) = self.send(DisplayEvent::Release) {
            debug!("release not delivered: {err}");
        }
    }

    fn reclaim(&mut self) {
        if let Err(err) = self.send(DisplayEvent::Reclaim) {
            debug!("reclaim not delivered: {err}");
        }
    }
}

/// Main-thread half of the display: owns the event loop until [`run`] is
/// called.
pub struct Display {
    event_loop: EventLoop<DisplayEvent>,
    size: Arc<SharedSize>,
    slot: Arc<FrameSlot>,
}

impl Display {
    pub fn new() -> Result<Self> {
        let event_loop = EventLoop::<DisplayEvent>::with_user_event()
            .build()
            .context("failed to build display event loop")?;
        Ok(Self {
            event_loop,
            size: Arc::new(SharedSize::default()),
            slot: Arc::new(FrameSlot::default()),
        })
    }

    pub fn sink(&self) -> WindowSink {
        WindowSink {
            proxy: self.event_loop.create_proxy(),
            size: self.size.clone(),
            slot: self.slot.clone(),
        }
    }

    /// Run the window until a [`DisplayEvent::Shutdown`] arrives or the
    /// window is closed.
    pub fn run(self) -> Result<()> {
        let mut app = DisplayApp::new(self.size.clone(), self.slot.clone());
        let result = self.event_loop.run_app(&mut app);
        self.size.close();
        result.context("display event loop failed")?;
        match app.fatal.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

type WindowHandle = Arc<Window>;

struct DisplayApp {
    window: Option<WindowHandle>,
    context: Option<SoftContext<WindowHandle>>,
    surface: Option<Surface<WindowHandle, WindowHandle>>,
    size: Arc<SharedSize>,
    slot: Arc<FrameSlot>,
    frame: Option<PresentedFrame>,
    released: bool,
    fatal: Option<anyhow::Error>,
}

impl DisplayApp {
    fn new(size: Arc<SharedSize>, slot: Arc<FrameSlot>) -> Self {
        Self {
            window: None,
            context: None,
            surface: None,
            size,
            slot,
            frame: None,
            released: false,
            fatal: None,
        }
    }

    fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        if self.window.is_some() {
            return Ok(());
        }
        let attrs = Window::default_attributes()
            .with_title("Frame Engine")
            .with_decorations(false)
            .with_fullscreen(Some(Fullscreen::Borderless(None)))
            .with_active(true);
        let window = event_loop
            .create_window(attrs)
            .context("failed to create display window")?;
        window.set_cursor_visible(false);
        let window = WindowHandle::new(window);

        let context = SoftContext::new(window.clone())
            .map_err(|err| anyhow!("failed to create softbuffer context: {err}"))?;
        let surface = Surface::new(&context, window.clone())
            .map_err(|err| anyhow!("failed to create softbuffer surface: {err}"))?;
        self.context = Some(context);
        self.surface = Some(surface);
        let size = window.inner_size();
        self.window = Some(window);
        self.handle_resize(size);
        info!(width = size.width, height = size.height, "display window ready");
        Ok(())
    }

    fn handle_resize(&mut self, size: PhysicalSize<u32>) {
        if let Some(surface) = self.surface.as_mut()
            && let (Some(width), Some(height)) =
                (NonZeroU32::new(size.width), NonZeroU32::new(size.height))
        {
            if let Err(err) = surface.resize(width, height) {
                warn!("failed to resize surface: {err}");
                return;
            }
            self.size.set(size.width, size.height);
        }
    }

    fn draw(&mut self) {
        let (Some(window), Some(surface)) = (self.window.as_ref(), self.surface.as_mut()) else {
            return;
        };
        let Some(frame) = self.frame.as_ref() else {
            return;
        };
        let size = window.inner_size();
        let mut buffer = match surface.buffer_mut() {
            Ok(buffer) => buffer,
            Err(err) => {
                warn!("failed to map surface buffer: {err}");
                return;
            }
        };
        blit(frame, &mut buffer, size.width, size.height);
        if let Err(err) = buffer.present() {
            warn!("failed to present frame: {err}");
        }
    }

    fn release(&mut self) {
        if let Some(window) = self.window.as_ref() {
            window.set_fullscreen(None);
            window.set_visible(false);
        }
        self.released = true;
        debug!("display released");
    }

    fn reclaim(&mut self) {
        if let Some(window) = self.window.as_ref() {
            window.set_visible(true);
            window.set_fullscreen(Some(Fullscreen::Borderless(None)));
            window.focus_window();
            window.request_redraw();
        }
        self.released = false;
        debug!("display reclaimed");
    }
}

/// Copy `frame` into `target`, clipping or padding with black when the
/// sizes disagree (a resize raced the renderer).
fn blit(frame: &PresentedFrame, target: &mut [u32], width: u32, height: u32) {
    if frame.width == width && frame.height == height && target.len() == frame.pixels.len() {
        target.copy_from_slice(&frame.pixels);
        return;
    }
    target.fill(0);
    let rows = frame.height.min(height) as usize;
    let cols = frame.width.min(width) as usize;
    for row in 0..rows {
        let src = row * frame.width as usize;
        let dst = row * width as usize;
        if dst + cols <= target.len() && src + cols <= frame.pixels.len() {
            target[dst..dst + cols].copy_from_slice(&frame.pixels[src..src + cols]);
        }
    }
}

impl ApplicationHandler<DisplayEvent> for DisplayApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(err) = self.ensure_window(event_loop) {
            error!("{err:#}");
            self.fatal = Some(err);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if window.id() != window_id {
            return;
        }
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                info!("display window closed");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => self.handle_resize(size),
            WindowEvent::RedrawRequested => self.draw(),
            _ => {}
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: DisplayEvent) {
        match event {
            DisplayEvent::FrameReady => {
                let Some(frame) = self.slot.take() else {
                    return;
                };
                self.frame = Some(frame);
                if !self.released
                    && let Some(window) = self.window.as_ref()
                {
                    window.request_redraw();
                }
            }
            DisplayEvent::Release => self.release(),
            DisplayEvent::Reclaim => self.reclaim(),
            DisplayEvent::Shutdown => {
                info!("display shutting down");
                event_loop.exit();
            }
        }
    }
}
