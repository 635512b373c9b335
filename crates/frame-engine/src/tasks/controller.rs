//! The playback state machine.
//!
//! One blocking loop owns the cursor, the paused flag and the previous frame.
//! Everything else (indexing, weighting, motion, transitions, video handoff,
//! interrupts, status) is a service it calls. Control requests only ever
//! arrive through [`ControlFlags`] and the interrupt flag file, and are
//! observed at poll points.

use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use ab_glyph::FontArc;
use anyhow::Result;
use chrono::Local;
use config_model::ActiveConfig;
use image::RgbaImage;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::Configuration;
use crate::events::{HoldOutcome, MediaKind, Navigation};
use crate::platform::audio::{AudioOutput, notification_sound};
use crate::platform::display::FrameSink;
use crate::platform::files;
use crate::platform::signals::ControlFlags;
use crate::processing::compose::{black_frame, fit_to_canvas};
use crate::processing::decode::{LoadError, decode_rgba8_apply_exif};
use crate::processing::idle::{IdleInfo, idle_screen, local_ip, title_slide};
use crate::processing::overlay::Overlay;
use crate::processing::text::load_font;
use crate::tasks::handoff::{ExternalMediaHandoff, HandoffOutcome, VideoOptions};
use crate::tasks::indexer::{MediaIndexer, MediaItem};
use crate::tasks::interrupt::{Attention, InterruptWatcher};
use crate::tasks::pan_zoom::{HoldTimer, Motion};
use crate::tasks::playlist::{self, BoostSettings, Playlist, RebuildReason};
use crate::tasks::status::StatusPublisher;
use crate::tasks::transition::{self, TransitionKind};

/// Position within one lap of a playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    index: usize,
    len: usize,
}

impl Cursor {
    pub fn new(len: usize) -> Self {
        Self { index: 0, len }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Step forward. Returns `false` when the step wrapped past the end,
    /// which completes the lap.
    pub fn advance(&mut self) -> bool {
        if self.index + 1 >= self.len {
            self.index = 0;
            false
        } else {
            self.index += 1;
            true
        }
    }

    /// Step back, wrapping to the last entry without ending the lap.
    pub fn retreat(&mut self) {
        self.index = if self.index == 0 {
            self.len.saturating_sub(1)
        } else {
            self.index - 1
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Advance,
    Retreat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LapEnd {
    Completed { shown: usize },
    Cancelled,
}

enum Shown {
    Held(HoldOutcome),
    Skipped,
}

/// Playback loop over a [`Clock`] and a [`FrameSink`].
pub struct Controller<C: Clock, S: FrameSink> {
    config: Configuration,
    clock: C,
    sink: S,
    flags: Arc<ControlFlags>,
    cancel: CancellationToken,
    handoff: ExternalMediaHandoff,
    audio: AudioOutput,
    interrupts: InterruptWatcher,
    status: StatusPublisher,
    overlay: Overlay,
    rng: StdRng,
    now_override: Option<SystemTime>,
    active: ActiveConfig,
    attention: Attention,
    paused: bool,
    previous: Option<RgbaImage>,
    slide_font: Option<Option<FontArc>>,
}

impl<C: Clock, S: FrameSink> Controller<C, S> {
    pub fn new(
        config: Configuration,
        clock: C,
        sink: S,
        flags: Arc<ControlFlags>,
        cancel: CancellationToken,
    ) -> Self {
        let handoff = ExternalMediaHandoff::new(config.decoder.clone());
        let audio = AudioOutput::new(config.cue_command.clone(), config.decoder.mixer_control.clone());
        Self {
            interrupts: InterruptWatcher::new(config.interrupt_flag_path.clone()),
            status: StatusPublisher::new(&config),
            overlay: Overlay::new(&config),
            handoff,
            audio,
            clock,
            sink,
            flags,
            cancel,
            rng: StdRng::from_os_rng(),
            now_override: None,
            active: ActiveConfig::default(),
            attention: Attention::default(),
            paused: false,
            previous: None,
            slide_font: None,
            config,
        }
    }

    pub fn with_handoff(mut self, handoff: ExternalMediaHandoff) -> Self {
        self.handoff = handoff;
        self
    }

    pub fn with_audio(mut self, audio: AudioOutput) -> Self {
        self.audio = audio;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Freeze the wall-clock "now" used for recency boosts.
    pub fn with_now(mut self, now: SystemTime) -> Self {
        self.now_override = Some(now);
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Run until cancelled.
    pub fn run(mut self) -> Result<()> {
        info!("playback started");
        self.status.set_paused(false);
        let mut reason = RebuildReason::Startup;
        while !self.cancel.is_cancelled() {
            self.reload_active();
            if self.service_interrupt().is_break() {
                break;
            }

            let playlist = match playlist::take_transient(
                &self.config.playlist_override_path,
                &self.config.prepared_dir,
            ) {
                Some(transient) => transient,
                None => self.regular_playlist(reason),
            };
            reason = RebuildReason::LapComplete;
            self.status.set_playlist(playlist.name.clone());

            if playlist.is_empty() {
                info!("nothing to show");
                if self.idle().is_break() {
                    break;
                }
                continue;
            }

            if let Some(name) = playlist.name.as_deref()
                && self.show_title(name).is_break()
            {
                break;
            }

            match self.play_lap(&playlist) {
                LapEnd::Cancelled => break,
                LapEnd::Completed { shown: 0 } => {
                    warn!(entries = playlist.len(), "every playlist entry was skipped");
                    if self.idle().is_break() {
                        break;
                    }
                }
                LapEnd::Completed { shown } => debug!(shown, "lap complete"),
            }
        }
        self.shutdown();
        Ok(())
    }

    fn reload_active(&mut self) {
        let path = &self.config.active_config_path;
        self.active = match ActiveConfig::from_json_file(path) {
            Ok(active) => active,
            Err(err) => {
                if path.exists() {
                    warn!("using default settings: {err:#}");
                } else {
                    debug!(path = %path.display(), "settings store missing; using defaults");
                }
                ActiveConfig::default()
            }
        };
        if self.active.pan_zoom_enabled && !(self.active.pan_zoom_factor > 1.0) {
            warn!(
                factor = self.active.pan_zoom_factor,
                using = self.active.effective_pan_zoom_factor(),
                "pan_zoom_factor must exceed 1.0"
            );
        }
        self.overlay.configure(&self.active);
    }

    fn regular_playlist(&mut self, reason: RebuildReason) -> Playlist {
        let items = MediaIndexer::from_disk(&self.config).index(&self.active.display_sources);
        let boosts = BoostSettings::from_active(&self.active);
        let now = self.now_override.unwrap_or_else(SystemTime::now);
        playlist::build(&items, &boosts, now, &mut self.rng, reason)
    }

    fn play_lap(&mut self, playlist: &Playlist) -> LapEnd {
        let mut cursor = Cursor::new(playlist.len());
        let mut shown = 0;
        loop {
            if self.cancel.is_cancelled() {
                return LapEnd::Cancelled;
            }
            if self.service_interrupt().is_break() {
                return LapEnd::Cancelled;
            }
            let Some(item) = playlist.get(cursor.index()).cloned() else {
                return LapEnd::Completed { shown };
            };
            debug!(index = cursor.index(), path = %item.display_path.display(), "playing entry");

            let step = match item.kind {
                MediaKind::Image => {
                    match self.show_image(&item.display_path, item.reported_path(), self.active.display_duration(), true)
                    {
                        Shown::Skipped => Step::Advance,
                        Shown::Held(outcome) => {
                            shown += 1;
                            match outcome {
                                HoldOutcome::Expired | HoldOutcome::Navigated(Navigation::Next) => {
                                    Step::Advance
                                }
                                HoldOutcome::Navigated(Navigation::Previous) => Step::Retreat,
                                HoldOutcome::Interrupted => {
                                    if self.service_interrupt().is_break() {
                                        return LapEnd::Cancelled;
                                    }
                                    Step::Advance
                                }
                                HoldOutcome::Cancelled => return LapEnd::Cancelled,
                            }
                        }
                    }
                }
                MediaKind::Video => match self.play_video(&item) {
                    ControlFlow::Break(()) => return LapEnd::Cancelled,
                    ControlFlow::Continue((launched, navigation)) => {
                        if launched {
                            shown += 1;
                        }
                        match navigation {
                            Some(Navigation::Previous) => Step::Retreat,
                            Some(Navigation::Next) | None => Step::Advance,
                        }
                    }
                },
            };

            match step {
                Step::Advance => {
                    if !cursor.advance() {
                        return LapEnd::Completed { shown };
                    }
                }
                Step::Retreat => cursor.retreat(),
            }
        }
    }

    /// Load, transition to and hold a still image.
    fn show_image(
        &mut self,
        path: &Path,
        reported: &Path,
        duration: Duration,
        watch_interrupts: bool,
    ) -> Shown {
        let decoded = match decode_rgba8_apply_exif(path) {
            Ok(decoded) => decoded,
            Err(LoadError::Missing(path)) => {
                warn!(path = %path.display(), "media file missing; skipping");
                return Shown::Skipped;
            }
            Err(err) => {
                warn!("skipping media: {:#}", anyhow::Error::from(err));
                self.previous = None;
                return Shown::Skipped;
            }
        };
        let motion = match self.prepare_motion(&decoded) {
            Ok(motion) => motion,
            Err(err) => {
                warn!(path = %path.display(), "skipping media: {err:#}");
                self.previous = None;
                return Shown::Skipped;
            }
        };
        let first = motion.frame_at(0.0).into_owned();
        if self.transition_to(first).is_break() {
            return Shown::Held(HoldOutcome::Cancelled);
        }
        self.status.set_current(reported);
        Shown::Held(self.hold(&motion, duration, watch_interrupts))
    }

    fn prepare_motion(&mut self, decoded: &RgbaImage) -> Result<Motion> {
        let (width, height) = self.sink.size();
        let zoom = self
            .active
            .pan_zoom_enabled
            .then(|| self.active.effective_pan_zoom_factor());
        let fitted = fit_to_canvas(decoded, width, height)?;
        Motion::prepare(fitted, zoom, &mut self.rng)
    }

    /// Move from the previous frame to `next`, then remember `next` as the
    /// new previous frame.
    fn transition_to(&mut self, next: RgbaImage) -> ControlFlow<()> {
        let kind = if self.active.transition_enabled {
            TransitionKind::parse(&self.active.transition_type)
        } else {
            None
        };
        let duration = self.active.transition_duration();
        let previous = self.previous.take();
        let flow = match (previous, kind) {
            (Some(previous), Some(kind)) if !duration.is_zero() => {
                let frames = transition::frame_count(duration, self.config.target_fps);
                transition::run(kind, &previous, &next, frames, |frame| self.present_paced(frame, true))
            }
            _ => self.present(next.clone(), true),
        };
        self.previous = Some(next);
        flow
    }

    /// Keep `motion` on screen for `duration` of unpaused time.
    fn hold(&mut self, motion: &Motion, duration: Duration, watch_interrupts: bool) -> HoldOutcome {
        let mut timer = HoldTimer::start(self.clock.now(), duration);
        if self.paused {
            timer.pause(self.clock.now());
        }
        let tick = if motion.is_animated() {
            self.config.frame_interval()
        } else {
            self.config.static_poll_interval
        };
        let redraw_overlay = self.overlay.is_enabled();
        let mut last_second = None;
        let mut progress = 0.0;

        let outcome = loop {
            if self.cancel.is_cancelled() {
                break HoldOutcome::Cancelled;
            }
            let now = self.clock.now();
            if self.flags.take_pause_toggle() {
                self.set_paused(!self.paused);
                if self.paused {
                    timer.pause(now);
                } else {
                    timer.resume(now);
                }
            }
            if let Some(navigation) = self.flags.take_navigation() {
                info!(?navigation, "navigation requested");
                break HoldOutcome::Navigated(navigation);
            }
            if self.paused {
                self.clock.sleep(self.config.pause_poll_interval);
                continue;
            }
            if watch_interrupts && self.interrupts.pending() {
                break HoldOutcome::Interrupted;
            }
            if timer.expired(now) {
                break HoldOutcome::Expired;
            }

            if motion.is_animated() {
                progress = timer.progress(now);
                let frame = motion.frame_at(progress).into_owned();
                if self.present(frame, true).is_break() {
                    break HoldOutcome::Cancelled;
                }
            } else if redraw_overlay {
                let second = Local::now().timestamp();
                if last_second != Some(second) {
                    last_second = Some(second);
                    let frame = motion.frame_at(0.0).into_owned();
                    if self.present(frame, true).is_break() {
                        break HoldOutcome::Cancelled;
                    }
                }
            }
            self.clock.sleep(tick.min(timer.remaining(now)));
        };

        if motion.is_animated() {
            self.previous = Some(motion.frame_at(progress).into_owned());
        }
        outcome
    }

    fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
        info!(paused, "pause toggled");
        self.status.set_paused(paused);
    }

    /// Consume a pending interrupt and show its item with priority.
    fn service_interrupt(&mut self) -> ControlFlow<()> {
        let Some(path) = self.interrupts.consume() else {
            return ControlFlow::Continue(());
        };
        self.attention.arm(self.clock.now(), self.config.attention_window);
        if !path.is_file() {
            warn!(path = %path.display(), "interrupt item missing; nothing to show");
            return ControlFlow::Continue(());
        }
        if let Some(sound) = notification_sound(&self.config.sounds_dir, &self.active.language)
            && let Err(err) = self
                .audio
                .play_cue(&sound, self.active.notification_sound_volume)
        {
            warn!("notification cue failed: {err:#}");
        }
        info!(path = %path.display(), "showing priority item");
        match self.show_image(&path, &path, self.active.priority_display_duration(), false) {
            Shown::Held(HoldOutcome::Cancelled) => ControlFlow::Break(()),
            _ => ControlFlow::Continue(()),
        }
    }

    /// Hand a video to the external decoder. Returns whether the decoder
    /// started and any navigation latched while it ran.
    fn play_video(&mut self, item: &MediaItem) -> ControlFlow<(), (bool, Option<Navigation>)> {
        if let Some(previous) = self.previous.take() {
            let frames = transition::frame_count(
                self.active.transition_duration() / 2,
                self.config.target_fps,
            );
            transition::fade_to_black(&previous, frames, |frame| self.present_paced(frame, false))?;
        }
        self.sink.release();

        let options = VideoOptions {
            hwdec: self.active.video_hwdec_enabled,
            audio_volume: self
                .active
                .video_audio_enabled
                .then_some(self.active.video_audio_volume),
        };
        let reported = item.reported_path().to_path_buf();
        let status = &mut self.status;
        let outcome = self.handoff.play(
            &item.display_path,
            options,
            &mut self.audio,
            &mut || status.set_current(&reported),
        );
        self.sink.reclaim();

        let launched = match &outcome {
            HandoffOutcome::Launched { status } => {
                debug!(%status, "video finished");
                true
            }
            HandoffOutcome::Failed(err) => err.launched(),
        };
        if self.cancel.is_cancelled() {
            return ControlFlow::Break(());
        }
        let navigation = self.flags.take_navigation();
        if navigation.is_some() {
            info!(?navigation, "navigation latched during video");
        }
        ControlFlow::Continue((launched, navigation))
    }

    fn show_title(&mut self, name: &str) -> ControlFlow<()> {
        let (width, height) = self.sink.size();
        let slide = match self.slide_font() {
            Some(font) => title_slide(&font, width, height, name),
            None => black_frame(width, height),
        };
        info!(name, "starting named playlist");
        self.transition_to(slide.clone())?;
        match self.hold(&Motion::Static(slide), self.active.info_display_duration(), true) {
            HoldOutcome::Cancelled => ControlFlow::Break(()),
            HoldOutcome::Interrupted => self.service_interrupt(),
            HoldOutcome::Expired | HoldOutcome::Navigated(_) => ControlFlow::Continue(()),
        }
    }

    /// Show the placeholder and wait out the backoff. Only shutdown ends the
    /// wait early.
    fn idle(&mut self) -> ControlFlow<()> {
        let (width, height) = self.sink.size();
        let backoff = self.config.idle_backoff;
        let frame = match self.slide_font() {
            Some(font) => idle_screen(
                &font,
                width,
                height,
                &IdleInfo {
                    logo_path: &self.config.logo_path,
                    retry_in: backoff,
                    ip: local_ip(),
                    language: &self.active.language,
                },
            ),
            None => black_frame(width, height),
        };
        self.previous = None;
        self.present(frame, false)?;
        info!(retry_in = ?backoff, "idle; waiting before re-indexing");

        let deadline = self.clock.now() + backoff;
        loop {
            if self.cancel.is_cancelled() {
                return ControlFlow::Break(());
            }
            let now = self.clock.now();
            if now >= deadline {
                return ControlFlow::Continue(());
            }
            self.clock
                .sleep((deadline - now).min(self.config.static_poll_interval));
        }
    }

    fn slide_font(&mut self) -> Option<FontArc> {
        let active = &self.active;
        self.slide_font
            .get_or_insert_with(|| match load_font(active.clock_font_path()) {
                Ok(font) => Some(font),
                Err(err) => {
                    warn!("slides will be blank: {err:#}");
                    None
                }
            })
            .clone()
    }

    fn present(&mut self, mut frame: RgbaImage, with_overlay: bool) -> ControlFlow<()> {
        if self.cancel.is_cancelled() {
            return ControlFlow::Break(());
        }
        if with_overlay {
            let attention = self.attention.is_active(self.clock.now());
            self.overlay.draw(&mut frame, Local::now(), attention);
        }
        if let Err(err) = self.sink.present(&frame) {
            error!("display unavailable: {err:#}");
            self.cancel.cancel();
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }

    fn present_paced(&mut self, frame: RgbaImage, with_overlay: bool) -> ControlFlow<()> {
        self.present(frame, with_overlay)?;
        self.clock.sleep(self.config.frame_interval());
        ControlFlow::Continue(())
    }

    fn shutdown(&mut self) {
        info!("playback stopping");
        self.audio.release();
        self.status.clear();
        if let Err(err) = files::delete_if_exists(&self.config.playlist_override_path) {
            warn!("failed to remove playlist override: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_wraps_and_completes_lap() {
        let mut cursor = Cursor::new(3);
        assert!(cursor.advance());
        assert!(cursor.advance());
        assert_eq!(cursor.index(), 2);
        assert!(!cursor.advance());
        assert_eq!(cursor.index(), 0);
    }

    #[test]
    fn retreat_wraps_within_lap() {
        let mut cursor = Cursor::new(3);
        cursor.retreat();
        assert_eq!(cursor.index(), 2);
        cursor.retreat();
        assert_eq!(cursor.index(), 1);
    }

    #[test]
    fn single_entry_lap() {
        let mut cursor = Cursor::new(1);
        cursor.retreat();
        assert_eq!(cursor.index(), 0);
        assert!(!cursor.advance());
    }
}
