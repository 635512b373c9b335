use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

/// Deployment settings for the playback engine.
///
/// Operator-tunable behaviour (durations, sources, boosts, styling) lives in
/// [`config_model::ActiveConfig`] and is re-read every pass; this struct only
/// carries facts about where things live on disk and how the host is wired.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Root that "currently displayed" paths are reported relative to.
    pub static_root: PathBuf,
    /// Directory holding one sub-directory of prepared media per source.
    pub prepared_dir: PathBuf,
    /// JSON store written by the web UI.
    pub active_config_path: PathBuf,
    pub favorites_path: PathBuf,
    pub filter_states_path: PathBuf,
    /// Existence of this file announces a priority item; content is its path.
    pub interrupt_flag_path: PathBuf,
    pub status_path: PathBuf,
    pub current_media_path: PathBuf,
    pub playlist_override_path: PathBuf,
    pub sounds_dir: PathBuf,
    pub logo_path: PathBuf,
    pub weather_cache_path: PathBuf,
    pub tides_cache_path: PathBuf,
    /// Delay before re-indexing when there is nothing to show.
    #[serde(with = "humantime_serde")]
    pub idle_backoff: Duration,
    /// How long the overlay blinks after a priority item arrives.
    #[serde(with = "humantime_serde")]
    pub attention_window: Duration,
    pub target_fps: u32,
    #[serde(with = "humantime_serde")]
    pub static_poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub pause_poll_interval: Duration,
    pub decoder: DecoderConfig,
    /// argv for the notification cue; `{file}` is replaced by the sound path
    /// and `{volume}` by the 0-100 cue volume. Without `{volume}` the mixer
    /// level is set before the cue plays.
    pub cue_command: Vec<String>,
    pub source_policies: BTreeMap<String, SourcePolicy>,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Load `path` when it exists, otherwise fall back to the built-in layout.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_yaml_file(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))
        } else {
            tracing::warn!(path = %path.display(), "configuration file missing; using defaults");
            Ok(Self::default())
        }
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(self.target_fps > 0, "target-fps must be greater than zero");
        ensure!(
            self.target_fps <= 240,
            "target-fps must not exceed 240"
        );
        ensure!(
            !self.static_poll_interval.is_zero(),
            "static-poll-interval must be positive"
        );
        ensure!(
            !self.pause_poll_interval.is_zero(),
            "pause-poll-interval must be positive"
        );
        ensure!(
            !self.idle_backoff.is_zero(),
            "idle-backoff must be positive"
        );
        ensure!(
            !self.prepared_dir.as_os_str().is_empty(),
            "prepared-dir must not be empty"
        );
        ensure!(
            self.interrupt_flag_path.file_name().is_some(),
            "interrupt-flag-path must name a file"
        );
        ensure!(
            !self.decoder.binary.trim().is_empty(),
            "decoder.binary must not be blank"
        );
        ensure!(
            self.cue_command.iter().any(|arg| arg.contains("{file}")),
            "cue-command must contain a {{file}} placeholder"
        );
        Ok(self)
    }

    /// Frame period derived from `target-fps`.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.target_fps.max(1)))
    }

    pub fn policy_for(&self, source: &str) -> SourcePolicy {
        self.source_policies
            .get(source)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for Configuration {
    fn default() -> Self {
        let mut source_policies = BTreeMap::new();
        source_policies.insert(
            "telegram".to_string(),
            SourcePolicy {
                default_variant: Some(Variant::Postcard),
                time_boosted: true,
            },
        );
        Self {
            static_root: PathBuf::from("static"),
            prepared_dir: PathBuf::from("static/prepared"),
            active_config_path: PathBuf::from("config/config.json"),
            favorites_path: PathBuf::from("config/favorites.json"),
            filter_states_path: PathBuf::from("config/filter_states.json"),
            interrupt_flag_path: PathBuf::from("cache/new_postcard.flag"),
            status_path: PathBuf::from("/tmp/pimmich_slideshow_status.json"),
            current_media_path: PathBuf::from("/tmp/pimmich_current_photo.txt"),
            playlist_override_path: PathBuf::from("/tmp/pimmich_custom_playlist.json"),
            sounds_dir: PathBuf::from("static/sounds"),
            logo_path: PathBuf::from("static/pimmich_logo.png"),
            weather_cache_path: PathBuf::from("cache/weather.json"),
            tides_cache_path: PathBuf::from("cache/tides.json"),
            idle_backoff: Duration::from_secs(60),
            attention_window: Duration::from_secs(30),
            target_fps: 60,
            static_poll_interval: Duration::from_millis(100),
            pause_poll_interval: Duration::from_millis(100),
            decoder: DecoderConfig::default(),
            cue_command: [
                "mpv",
                "--no-video",
                "--no-terminal",
                "--volume={volume}",
                "{file}",
            ]
            .map(String::from)
            .to_vec(),
            source_policies,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct DecoderConfig {
    /// External video player executable.
    pub binary: String,
    /// Device-tree model file used to pick hardware decode flags.
    pub board_model_path: PathBuf,
    /// ALSA mixer control adjusted before playback with audio.
    pub mixer_control: String,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            binary: "mpv".to_string(),
            board_model_path: PathBuf::from("/proc/device-tree/model"),
            mixer_control: "Master".to_string(),
        }
    }
}

/// Derivative presentations produced by the preparation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    Polaroid,
    Postcard,
}

impl Variant {
    pub const fn suffix(self) -> &'static str {
        match self {
            Variant::Polaroid => "_polaroid",
            Variant::Postcard => "_postcard",
        }
    }
}

/// Per-source presentation rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct SourcePolicy {
    /// Variant shown when the operator has not picked a filter for an item.
    pub default_variant: Option<Variant>,
    /// Whether filenames carry an arrival timestamp that feeds recency boosts.
    pub time_boosted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = Configuration::default().validated().unwrap();
        assert_eq!(cfg.frame_interval(), Duration::from_secs_f64(1.0 / 60.0));
        let telegram = cfg.policy_for("telegram");
        assert_eq!(telegram.default_variant, Some(Variant::Postcard));
        assert!(telegram.time_boosted);
        assert_eq!(cfg.policy_for("immich"), SourcePolicy::default());
    }

    #[test]
    fn cue_command_requires_placeholder() {
        let cfg = Configuration {
            cue_command: vec!["aplay".to_string()],
            ..Configuration::default()
        };
        assert!(cfg.validated().is_err());
    }
}
