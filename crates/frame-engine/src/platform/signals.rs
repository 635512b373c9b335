use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio_util::sync::CancellationToken;

use crate::events::Navigation;

/// Latched control requests.
///
/// Signal listeners only ever set or bump a flag; the playback loop drains
/// the flags with `swap` at its poll points. A request raised while the
/// loop is blocked (video playback) stays latched until the next poll.
#[derive(Debug, Default)]
pub struct ControlFlags {
    next: AtomicBool,
    previous: AtomicBool,
    pause_toggles: AtomicUsize,
}

impl ControlFlags {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn request_next(&self) {
        self.next.store(true, Ordering::Release);
    }

    pub fn request_previous(&self) {
        self.previous.store(true, Ordering::Release);
    }

    pub fn request_pause_toggle(&self) {
        self.pause_toggles.fetch_add(1, Ordering::AcqRel);
    }

    /// Drain any pending navigation. "Next" wins when both are latched.
    pub fn take_navigation(&self) -> Option<Navigation> {
        let next = self.next.swap(false, Ordering::AcqRel);
        let previous = self.previous.swap(false, Ordering::AcqRel);
        if next {
            Some(Navigation::Next)
        } else if previous {
            Some(Navigation::Previous)
        } else {
            None
        }
    }

    /// Whether the paused state should flip. Toggles that arrive in pairs
    /// between two polls cancel out.
    pub fn take_pause_toggle(&self) -> bool {
        self.pause_toggles.swap(0, Ordering::AcqRel) % 2 == 1
    }
}

/// Install listeners that translate process signals into [`ControlFlags`].
///
/// SIGUSR1 advances, SIGUSR2 retreats, SIGTSTP toggles pause, SIGTERM and
/// ctrl-c cancel `cancel`.
#[cfg(unix)]
pub fn spawn_listeners(flags: Arc<ControlFlags>, cancel: CancellationToken) {
    use tokio::signal::unix::{SignalKind, signal};

    let bindings: [(SignalKind, &'static str, fn(&ControlFlags)); 3] = [
        (SignalKind::user_defined1(), "SIGUSR1", ControlFlags::request_next),
        (SignalKind::user_defined2(), "SIGUSR2", ControlFlags::request_previous),
        (
            SignalKind::from_raw(SIGTSTP),
            "SIGTSTP",
            ControlFlags::request_pause_toggle,
        ),
    ];

    for (kind, name, apply) in bindings {
        let flags = flags.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match signal(kind) {
                Ok(mut stream) => loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        received = stream.recv() => {
                            if received.is_none() {
                                break;
                            }
                            tracing::debug!(signal = name, "control signal received");
                            apply(&flags);
                        }
                    }
                },
                Err(err) => tracing::warn!("failed to register {name} handler: {err}"),
            }
        });
    }

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = sigterm.recv() => {
                            tracing::info!("SIGTERM received; initiating shutdown");
                            cancel.cancel();
                        }
                    }
                }
                Err(err) => tracing::warn!("failed to register SIGTERM handler: {err}"),
            }
        });
    }

    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            res = tokio::signal::ctrl_c() => {
                match res {
                    Ok(()) => {
                        tracing::info!("ctrl-c received; initiating shutdown");
                        cancel.cancel();
                    }
                    Err(err) => tracing::warn!("ctrl-c handler failed: {err}"),
                }
            }
        }
    });
}

#[cfg(not(unix))]
pub fn spawn_listeners(_flags: Arc<ControlFlags>, cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });
}

// Not exposed by `SignalKind`.
#[cfg(target_os = "linux")]
const SIGTSTP: i32 = 20;
#[cfg(all(unix, not(target_os = "linux")))]
const SIGTSTP: i32 = 18;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigation_is_drained_once() {
        let flags = ControlFlags::new();
        flags.request_previous();
        assert_eq!(flags.take_navigation(), Some(Navigation::Previous));
        assert_eq!(flags.take_navigation(), None);
    }

    #[test]
    fn next_wins_over_previous() {
        let flags = ControlFlags::new();
        flags.request_previous();
        flags.request_next();
        assert_eq!(flags.take_navigation(), Some(Navigation::Next));
        assert_eq!(flags.take_navigation(), None);
    }

    #[test]
    fn pause_toggle_latches() {
        let flags = ControlFlags::new();
        assert!(!flags.take_pause_toggle());
        flags.request_pause_toggle();
        assert!(flags.take_pause_toggle());
        assert!(!flags.take_pause_toggle());
    }

    #[test]
    fn paired_pause_toggles_cancel_out() {
        let flags = ControlFlags::new();
        flags.request_pause_toggle();
        flags.request_pause_toggle();
        assert!(!flags.take_pause_toggle());
    }
}
