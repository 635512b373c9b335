use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde::de::{self, Deserializer};

pub use styling::{ClockPosition, OverlayStyle};

/// Operator-facing settings persisted by the web configuration UI.
///
/// Every field has a default so a partially written or older store still
/// deserializes. Numeric fields accept either JSON numbers or numeric strings
/// because the web form stores some values verbatim.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActiveConfig {
    #[serde(deserialize_with = "lenient::f64")]
    pub display_duration: f64,
    pub display_sources: Vec<String>,
    #[serde(deserialize_with = "lenient::u32")]
    pub favorite_boost_factor: u32,
    #[serde(deserialize_with = "lenient::bool")]
    pub telegram_boost_enabled: bool,
    #[serde(deserialize_with = "lenient::u32")]
    pub telegram_boost_factor: u32,
    #[serde(deserialize_with = "lenient::u32")]
    pub telegram_boost_duration_days: u32,
    #[serde(deserialize_with = "lenient::bool")]
    pub pan_zoom_enabled: bool,
    #[serde(deserialize_with = "lenient::f64")]
    pub pan_zoom_factor: f64,
    #[serde(deserialize_with = "lenient::bool")]
    pub transition_enabled: bool,
    pub transition_type: String,
    #[serde(deserialize_with = "lenient::f64")]
    pub transition_duration: f64,
    #[serde(deserialize_with = "lenient::bool")]
    pub video_audio_enabled: bool,
    #[serde(deserialize_with = "lenient::u32")]
    pub video_audio_volume: u32,
    #[serde(deserialize_with = "lenient::bool")]
    pub video_hwdec_enabled: bool,
    #[serde(deserialize_with = "lenient::u32")]
    pub notification_sound_volume: u32,
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub priority_display_duration: Option<f64>,
    #[serde(deserialize_with = "lenient::f64")]
    pub info_display_duration: f64,
    pub language: String,
    #[serde(flatten)]
    pub overlay: OverlayStyle,
}

impl ActiveConfig {
    const DEFAULT_DISPLAY_SECONDS: f64 = 10.0;
    const DEFAULT_PAN_ZOOM_FACTOR: f64 = 1.15;

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(raw)?;
        Ok(cfg)
    }

    /// Seconds an item stays on screen, never shorter than one frame's worth.
    pub fn display_duration(&self) -> Duration {
        seconds_or(self.display_duration, Self::DEFAULT_DISPLAY_SECONDS)
    }

    /// Hold time for an interrupt item; falls back to the regular duration.
    pub fn priority_display_duration(&self) -> Duration {
        match self.priority_display_duration {
            Some(value) => seconds_or(value, self.display_duration().as_secs_f64()),
            None => self.display_duration(),
        }
    }

    pub fn info_display_duration(&self) -> Duration {
        seconds_or(self.info_display_duration, 5.0)
    }

    pub fn transition_duration(&self) -> Duration {
        seconds_or(self.transition_duration, 0.0)
    }

    /// Zoom factor used by pan/zoom; values that would not leave room to pan
    /// fall back to the default.
    pub fn effective_pan_zoom_factor(&self) -> f64 {
        if self.pan_zoom_factor.is_finite() && self.pan_zoom_factor > 1.0 {
            self.pan_zoom_factor
        } else {
            Self::DEFAULT_PAN_ZOOM_FACTOR
        }
    }

    pub fn recent_window(&self) -> Duration {
        Duration::from_secs(u64::from(self.telegram_boost_duration_days) * 24 * 60 * 60)
    }

    pub fn clock_font_path(&self) -> Option<&Path> {
        self.overlay
            .clock_font_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

impl Default for ActiveConfig {
    fn default() -> Self {
        Self {
            display_duration: Self::DEFAULT_DISPLAY_SECONDS,
            display_sources: vec!["immich".to_string()],
            favorite_boost_factor: 2,
            telegram_boost_enabled: true,
            telegram_boost_factor: 4,
            telegram_boost_duration_days: 7,
            pan_zoom_enabled: false,
            pan_zoom_factor: Self::DEFAULT_PAN_ZOOM_FACTOR,
            transition_enabled: true,
            transition_type: "fade".to_string(),
            transition_duration: 1.0,
            video_audio_enabled: false,
            video_audio_volume: 100,
            video_hwdec_enabled: false,
            notification_sound_volume: 80,
            priority_display_duration: None,
            info_display_duration: 5.0,
            language: "fr".to_string(),
            overlay: OverlayStyle::default(),
        }
    }
}

/// Longest duration any setting may ask for.
const MAX_SECONDS: f64 = 7.0 * 24.0 * 60.0 * 60.0;

fn seconds_or(value: f64, fallback: f64) -> Duration {
    let seconds = if value.is_finite() && value > 0.0 {
        value
    } else {
        fallback
    };
    Duration::try_from_secs_f64(seconds.clamp(0.0, MAX_SECONDS)).unwrap_or(Duration::ZERO)
}

mod styling {
    use super::*;

    #[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
    #[serde(rename_all = "snake_case")]
    pub enum ClockPosition {
        Left,
        #[default]
        Center,
        Right,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(default)]
    pub struct OverlayStyle {
        #[serde(deserialize_with = "lenient::bool")]
        pub show_clock: bool,
        pub clock_format: String,
        #[serde(deserialize_with = "lenient::bool")]
        pub show_date: bool,
        pub date_format: String,
        #[serde(deserialize_with = "lenient::bool")]
        pub show_weather: bool,
        #[serde(deserialize_with = "lenient::bool")]
        pub show_tides: bool,
        pub clock_color: String,
        pub clock_outline_color: String,
        #[serde(deserialize_with = "lenient::u32")]
        pub clock_font_size: u32,
        pub clock_font_path: Option<PathBuf>,
        pub clock_position: ClockPosition,
        #[serde(deserialize_with = "lenient::i32")]
        pub clock_offset_x: i32,
        #[serde(deserialize_with = "lenient::i32")]
        pub clock_offset_y: i32,
        #[serde(deserialize_with = "lenient::bool")]
        pub clock_background_enabled: bool,
        pub clock_background_color: String,
        #[serde(deserialize_with = "lenient::i32")]
        pub tide_offset_x: i32,
        #[serde(deserialize_with = "lenient::i32")]
        pub tide_offset_y: i32,
    }

    impl OverlayStyle {
        /// Whether anything in the overlay would draw at all.
        pub fn any_enabled(&self) -> bool {
            self.show_clock || self.show_tides
        }
    }

    impl Default for OverlayStyle {
        fn default() -> Self {
            Self {
                show_clock: false,
                clock_format: "%H:%M".to_string(),
                show_date: false,
                date_format: "%A %d %B %Y".to_string(),
                show_weather: false,
                show_tides: false,
                clock_color: "#FFFFFF".to_string(),
                clock_outline_color: "#000000".to_string(),
                clock_font_size: 72,
                clock_font_path: None,
                clock_position: ClockPosition::Center,
                clock_offset_x: 0,
                clock_offset_y: 0,
                clock_background_enabled: false,
                clock_background_color: "#00000080".to_string(),
                tide_offset_x: 0,
                tide_offset_y: 0,
            }
        }
    }
}

// The web form writes whatever the input widget held, so `"10"`, `10` and
// `10.0` must all be accepted for numeric fields.
mod lenient {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Int(i64),
        Float(f64),
        Text(String),
    }

    impl Raw {
        fn as_f64<E: de::Error>(&self) -> Result<f64, E> {
            match self {
                Raw::Int(v) => Ok(*v as f64),
                Raw::Float(v) => Ok(*v),
                Raw::Text(s) => s
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| E::custom(format!("expected a number, found {s:?}"))),
                Raw::Bool(b) => Err(E::custom(format!("expected a number, found {b}"))),
            }
        }
    }

    pub fn f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Raw::deserialize(deserializer)?.as_f64()
    }

    pub fn opt_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Text(s)) if s.trim().is_empty() => Ok(None),
            Some(raw) => raw.as_f64().map(Some),
        }
    }

    pub fn u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        let value = Raw::deserialize(deserializer)?.as_f64::<D::Error>()?;
        if !(0.0..=f64::from(u32::MAX)).contains(&value) {
            return Err(de::Error::custom(format!("{value} is out of range")));
        }
        Ok(value.round() as u32)
    }

    pub fn i32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
        let value = Raw::deserialize(deserializer)?.as_f64::<D::Error>()?;
        if !(f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(&value) {
            return Err(de::Error::custom(format!("{value} is out of range")));
        }
        Ok(value.round() as i32)
    }

    pub fn bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Bool(b) => Ok(b),
            Raw::Int(v) => Ok(v != 0),
            Raw::Float(v) => Ok(v != 0.0),
            Raw::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "on" | "yes" | "1" => Ok(true),
                "false" | "off" | "no" | "0" | "" => Ok(false),
                other => Err(de::Error::custom(format!("expected a boolean, found {other:?}"))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let cfg = ActiveConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg.display_sources, vec!["immich".to_string()]);
        assert_eq!(cfg.favorite_boost_factor, 2);
        assert_eq!(cfg.telegram_boost_factor, 4);
        assert_eq!(cfg.display_duration(), Duration::from_secs(10));
        assert_eq!(cfg.priority_display_duration(), Duration::from_secs(10));
        assert_eq!(cfg.overlay.clock_format, "%H:%M");
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let cfg = ActiveConfig::from_json_str(
            r#"{"display_duration": "7", "favorite_boost_factor": "3", "pan_zoom_enabled": "true", "clock_offset_x": "-12"}"#,
        )
        .unwrap();
        assert_eq!(cfg.display_duration(), Duration::from_secs(7));
        assert_eq!(cfg.favorite_boost_factor, 3);
        assert!(cfg.pan_zoom_enabled);
        assert_eq!(cfg.overlay.clock_offset_x, -12);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let cfg = ActiveConfig::from_json_str(
            r#"{"immich_token": "secret", "show_clock": true, "clock_position": "right"}"#,
        )
        .unwrap();
        assert!(cfg.overlay.show_clock);
        assert_eq!(cfg.overlay.clock_position, ClockPosition::Right);
    }

    #[test]
    fn pan_zoom_factor_without_headroom_uses_default() {
        let cfg = ActiveConfig::from_json_str(r#"{"pan_zoom_factor": 0.9}"#).unwrap();
        assert!((cfg.effective_pan_zoom_factor() - 1.15).abs() < f64::EPSILON);
    }

    #[test]
    fn oversized_durations_are_capped() {
        let week = Duration::from_secs(7 * 24 * 60 * 60);
        let cfg = ActiveConfig::from_json_str(
            r#"{"display_duration": 1e20, "transition_duration": "1e25", "priority_display_duration": 1e300, "info_display_duration": "1e19"}"#,
        )
        .unwrap();
        assert_eq!(cfg.display_duration(), week);
        assert_eq!(cfg.transition_duration(), week);
        assert_eq!(cfg.priority_display_duration(), week);
        assert_eq!(cfg.info_display_duration(), week);
    }

    #[test]
    fn non_positive_transition_disables_it() {
        let cfg = ActiveConfig::from_json_str(r#"{"transition_duration": -2}"#).unwrap();
        assert_eq!(cfg.transition_duration(), Duration::ZERO);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(ActiveConfig::from_json_str("{not json").is_err());
        let dir = tempfile::tempdir().unwrap();
        assert!(ActiveConfig::from_json_file(dir.path().join("missing.json")).is_err());
    }
}
