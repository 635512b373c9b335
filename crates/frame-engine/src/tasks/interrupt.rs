use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::platform::files;

/// Level-triggered, single-slot priority announcements.
///
/// The flag file's existence is the signal and its content names the item.
/// There is no queue: a second arrival before consumption replaces the
/// first.
#[derive(Debug, Clone)]
pub struct InterruptWatcher {
    flag_path: PathBuf,
}

impl InterruptWatcher {
    pub fn new(flag_path: impl Into<PathBuf>) -> Self {
        Self {
            flag_path: flag_path.into(),
        }
    }

    pub fn flag_path(&self) -> &Path {
        &self.flag_path
    }

    pub fn pending(&self) -> bool {
        self.flag_path.exists()
    }

    /// Read and delete the flag. Returns the announced path, or `None` when
    /// no flag was present or it was empty or unreadable.
    pub fn consume(&self) -> Option<PathBuf> {
        match files::read_and_delete(&self.flag_path) {
            Ok(Some(content)) => {
                let trimmed = content.trim();
                if trimmed.is_empty() {
                    warn!(flag = %self.flag_path.display(), "empty interrupt flag discarded");
                    return None;
                }
                info!(path = trimmed, "interrupt consumed");
                Some(PathBuf::from(trimmed))
            }
            Ok(None) => None,
            Err(err) => {
                warn!("discarding unreadable interrupt flag: {err:#}");
                None
            }
        }
    }
}

/// Time-boxed indicator that makes the overlay blink after an arrival.
#[derive(Debug, Clone, Copy, Default)]
pub struct Attention {
    until: Option<Duration>,
}

impl Attention {
    pub fn arm(&mut self, now: Duration, window: Duration) {
        self.until = Some(now + window);
    }

    pub fn is_active(&self, now: Duration) -> bool {
        self.until.is_some_and(|until| now < until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_is_single_shot() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = InterruptWatcher::new(dir.path().join("new_postcard.flag"));
        assert!(!watcher.pending());
        std::fs::write(watcher.flag_path(), "/cache/x.jpg\n").unwrap();
        assert!(watcher.pending());
        assert_eq!(watcher.consume(), Some(PathBuf::from("/cache/x.jpg")));
        assert!(!watcher.pending());
        assert_eq!(watcher.consume(), None);
    }

    #[test]
    fn later_arrival_overwrites_earlier() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = InterruptWatcher::new(dir.path().join("flag"));
        std::fs::write(watcher.flag_path(), "/a.jpg").unwrap();
        std::fs::write(watcher.flag_path(), "/b.jpg").unwrap();
        assert_eq!(watcher.consume(), Some(PathBuf::from("/b.jpg")));
        assert_eq!(watcher.consume(), None);
    }

    #[test]
    fn empty_flag_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = InterruptWatcher::new(dir.path().join("flag"));
        std::fs::write(watcher.flag_path(), "  \n").unwrap();
        assert_eq!(watcher.consume(), None);
        assert!(!watcher.pending());
    }

    #[test]
    fn attention_expires() {
        let mut attention = Attention::default();
        assert!(!attention.is_active(Duration::ZERO));
        attention.arm(Duration::from_secs(10), Duration::from_secs(30));
        assert!(attention.is_active(Duration::from_secs(39)));
        assert!(!attention.is_active(Duration::from_secs(40)));
    }
}
