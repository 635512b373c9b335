use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Configuration;
use crate::platform::files;

/// The status blob read by the web UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBlob {
    pub paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist: Option<String>,
}

/// Publishes engine state for other processes, last write wins.
///
/// Write failures are logged and otherwise ignored; readers treat a missing
/// or torn file as "no data".
#[derive(Debug)]
pub struct StatusPublisher {
    status_path: PathBuf,
    current_path: PathBuf,
    static_root: PathBuf,
    state: StatusBlob,
}

impl StatusPublisher {
    pub fn new(config: &Configuration) -> Self {
        Self {
            status_path: config.status_path.clone(),
            current_path: config.current_media_path.clone(),
            static_root: config.static_root.clone(),
            state: StatusBlob::default(),
        }
    }

    pub fn state(&self) -> &StatusBlob {
        &self.state
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.state.paused = paused;
        self.write_status();
    }

    pub fn set_playlist(&mut self, name: Option<String>) {
        if self.state.playlist != name {
            self.state.playlist = name;
            self.write_status();
        }
    }

    /// Record `path` as the asset now on screen.
    pub fn set_current(&mut self, path: &Path) {
        let relative = path
            .strip_prefix(&self.static_root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned();
        if let Err(err) = files::overwrite(&self.current_path, format!("{relative}\n").as_bytes())
        {
            warn!("failed to publish current media: {err:#}");
        }
        debug!(current = %relative, "current media published");
        self.state.current = Some(relative);
        self.write_status();
    }

    /// Remove both published files.
    pub fn clear(&mut self) {
        files::remove_quietly(&self.current_path);
        files::remove_quietly(&self.status_path);
        self.state = StatusBlob::default();
    }

    fn write_status(&self) {
        let result = serde_json::to_vec(&self.state)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| files::overwrite(&self.status_path, &bytes));
        if let Err(err) = result {
            warn!("failed to publish status: {err:#}");
        }
    }
}

/// Read a status blob; missing or corrupt files yield `None`.
pub fn read_status(path: &Path) -> Option<StatusBlob> {
    let raw = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}
