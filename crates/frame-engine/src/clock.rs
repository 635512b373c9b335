//! Monotonic time source used by every timed loop in the engine.
//!
//! Hold timers, pause accounting and frame pacing read time exclusively
//! through [`Clock`], so tests can drive whole playback scenarios on a
//! simulated timeline with [`ManualClock`].

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary, fixed origin.
    fn now(&self) -> Duration;
    /// Block the playback thread for `duration`.
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

type ScheduledAction = Box<dyn FnOnce() + Send>;

/// Simulated clock: `sleep` advances time instantly and fires any actions
/// scheduled at or before the new instant, in schedule order.
#[derive(Clone, Default)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualState>>,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    scheduled: Vec<(Duration, ScheduledAction)>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` once simulated time reaches `at`.
    pub fn schedule(&self, at: Duration, action: impl FnOnce() + Send + 'static) {
        let mut state = self.lock();
        state.scheduled.push((at, Box::new(action)));
        state.scheduled.sort_by_key(|(at, _)| *at);
    }

    pub fn advance(&self, duration: Duration) {
        let due = {
            let mut state = self.lock();
            state.now += duration;
            let now = state.now;
            let split = state
                .scheduled
                .iter()
                .position(|(at, _)| *at > now)
                .unwrap_or(state.scheduled.len());
            state.scheduled.drain(..split).collect::<Vec<_>>()
        };
        for (_, action) in due {
            action();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.lock().now
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

impl std::fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ManualClock")
            .field("now", &state.now)
            .field("scheduled", &state.scheduled.len())
            .finish()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn manual_clock_fires_actions_in_order() {
        let clock = ManualClock::new();
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let hits = hits.clone();
            clock.schedule(Duration::from_secs(2), move || {
                hits.fetch_add(10, Ordering::SeqCst);
            });
        }
        {
            let hits = hits.clone();
            clock.schedule(Duration::from_secs(1), move || {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        clock.sleep(Duration::from_millis(1500));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        clock.sleep(Duration::from_millis(500));
        assert_eq!(hits.load(Ordering::SeqCst), 11);
        assert_eq!(clock.now(), Duration::from_secs(2));
    }
}
