//! Clock, weather and tide text drawn on top of every presented frame.
//!
//! Text is rasterised once per distinct content into small transparent
//! patches and blended onto each frame, so animation ticks only pay for
//! compositing.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use ab_glyph::{Font, FontArc, PxScale};
use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Timelike};
use config_model::{ActiveConfig, ClockPosition, OverlayStyle};
use image::{Rgba, RgbaImage, imageops};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Configuration;
use crate::processing::color::{parse_hex_color, parse_hex_color_or};
use crate::processing::text::{
    draw_outlined_text, fill_rect, line_metrics, load_font, measure_text,
};
use crate::tasks::indexer::{fresh_timestamp, fresh_timestamp_pattern};

const SEPARATOR: &str = "  |  ";
const TOP_PADDING: i64 = 15;
const BOTTOM_PADDING: i64 = 15;
const BAND_PADDING: i64 = 10;

#[derive(Debug, Clone, Default, Deserialize)]
struct WeatherCache {
    #[serde(default)]
    current: Option<CurrentWeather>,
    #[serde(default)]
    forecast: Vec<ForecastDay>,
}

#[derive(Debug, Clone, Deserialize)]
struct CurrentWeather {
    temp: f64,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ForecastDay {
    #[serde(default)]
    day: String,
    max_temp: f64,
    min_temp: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct TideCache {
    #[serde(default)]
    data: Vec<TideEvent>,
}

#[derive(Debug, Clone, Deserialize)]
struct TideEvent {
    time: String,
    #[serde(rename = "type")]
    kind: String,
}

/// Cached inputs, refreshed once per minute.
#[derive(Debug, Default)]
struct OverlayData {
    minute: Option<(NaiveDate, u32)>,
    weather: Option<WeatherCache>,
    tides: Option<Vec<TideEvent>>,
    postcards_today: usize,
}

struct Patch {
    x: i64,
    y: i64,
    image: RgbaImage,
}

struct CachedLayer {
    key: String,
    patches: Vec<Patch>,
}

struct Labels {
    today: &'static str,
    tomorrow: &'static str,
    high: &'static str,
    low: &'static str,
    unavailable: &'static str,
}

fn labels(language: &str) -> Labels {
    match language {
        "fr" => Labels {
            today: "Auj.",
            tomorrow: "Dem.",
            high: "PM",
            low: "BM",
            unavailable: "Données de marée non disponibles",
        },
        _ => Labels {
            today: "Today",
            tomorrow: "Tmrw",
            high: "HW",
            low: "LW",
            unavailable: "Tide data unavailable",
        },
    }
}

fn weekday_label(language: &str, day: chrono::Weekday) -> &'static str {
    use chrono::Weekday::*;
    let fr = language == "fr";
    match day {
        Mon => if fr { "Lun" } else { "Mon" },
        Tue => if fr { "Mar" } else { "Tue" },
        Wed => if fr { "Mer" } else { "Wed" },
        Thu => if fr { "Jeu" } else { "Thu" },
        Fri => if fr { "Ven" } else { "Fri" },
        Sat => if fr { "Sam" } else { "Sat" },
        Sun => if fr { "Dim" } else { "Sun" },
    }
}

/// Format `now` with an operator-supplied strftime pattern, falling back to
/// `fallback` when the pattern is invalid.
pub fn format_time<Tz: TimeZone>(now: &DateTime<Tz>, pattern: &str, fallback: &str) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut out = String::new();
    if write!(out, "{}", now.format(pattern)).is_ok() {
        return out;
    }
    out.clear();
    let _ = write!(out, "{}", now.format(fallback));
    out
}

pub struct Overlay {
    font_path: Option<PathBuf>,
    font: Option<FontArc>,
    font_failed: bool,
    style: OverlayStyle,
    language: String,
    weather_path: PathBuf,
    tides_path: PathBuf,
    /// Directories whose `*_postcard.jpg` arrivals are counted per day.
    postcard_dirs: Vec<(String, PathBuf)>,
    data: OverlayData,
    cache: Option<CachedLayer>,
}

impl Overlay {
    pub fn new(config: &Configuration) -> Self {
        let postcard_dirs = config
            .source_policies
            .iter()
            .filter(|(_, policy)| policy.time_boosted)
            .map(|(source, _)| (source.clone(), config.prepared_dir.join(source)))
            .collect();
        Self {
            font_path: None,
            font: None,
            font_failed: false,
            style: OverlayStyle::default(),
            language: "fr".to_string(),
            weather_path: config.weather_cache_path.clone(),
            tides_path: config.tides_cache_path.clone(),
            postcard_dirs,
            data: OverlayData::default(),
            cache: None,
        }
    }

    /// Adopt the operator's current styling; reloads the font when its path
    /// changed.
    pub fn configure(&mut self, active: &ActiveConfig) {
        let font_path = active.clock_font_path().map(Path::to_path_buf);
        if font_path != self.font_path || (self.font.is_none() && !self.font_failed) {
            self.font_path = font_path;
            self.font = None;
            self.font_failed = false;
        }
        self.style = active.overlay.clone();
        self.language = active.language.clone();
        self.cache = None;
        self.data.minute = None;
    }

    pub fn is_enabled(&self) -> bool {
        self.style.any_enabled() && !self.font_failed
    }

    fn font(&mut self) -> Option<FontArc> {
        if self.font.is_none() && !self.font_failed {
            match load_font(self.font_path.as_deref()) {
                Ok(font) => self.font = Some(font),
                Err(err) => {
                    warn!("overlay disabled: {err:#}");
                    self.font_failed = true;
                }
            }
        }
        self.font.clone()
    }

    /// Draw the overlay onto `frame` for wall-clock time `now`.
    pub fn draw(&mut self, frame: &mut RgbaImage, now: DateTime<Local>, attention: bool) {
        if !self.style.any_enabled() {
            return;
        }
        let Some(font) = self.font() else {
            return;
        };
        self.refresh(now);

        let top = self.style.show_clock.then(|| self.top_segments(&font, now, attention));
        let bottom = self.style.show_tides.then(|| self.tide_line(now));

        let key = format!(
            "{}x{}|{:?}|{:?}",
            frame.width(),
            frame.height(),
            top,
            bottom
        );
        if self.cache.as_ref().map(|c| c.key.as_str()) != Some(key.as_str()) {
            let patches = self.render_patches(&font, frame.width(), frame.height(), top, bottom);
            self.cache = Some(CachedLayer { key, patches });
        }
        if let Some(cache) = &self.cache {
            for patch in &cache.patches {
                imageops::overlay(frame, &patch.image, patch.x, patch.y);
            }
        }
    }

    fn refresh(&mut self, now: DateTime<Local>) {
        let minute = (now.date_naive(), now.hour() * 60 + now.minute());
        if self.data.minute == Some(minute) {
            return;
        }
        self.data.minute = Some(minute);
        if self.style.show_weather {
            self.data.weather = read_cache::<WeatherCache>(&self.weather_path);
        }
        if self.style.show_tides {
            self.data.tides = read_cache::<TideCache>(&self.tides_path).map(|t| t.data);
        }
        self.data.postcards_today = self
            .postcard_dirs
            .iter()
            .map(|(source, dir)| count_postcards_on(dir, source, now.date_naive()))
            .sum();
    }

    /// Text segments of the top block; `None` entries are blank slots that
    /// still take up room (the blinking marker).
    fn top_segments(
        &self,
        font: &FontArc,
        now: DateTime<Local>,
        attention: bool,
    ) -> Vec<Option<String>> {
        let mut segments = vec![Some(format_time(&now, &self.style.clock_format, "%H:%M"))];
        if self.style.show_date {
            segments.push(Some(format!(
                "{SEPARATOR}{}",
                format_time(&now, &self.style.date_format, "%d/%m/%Y")
            )));
        }
        if self.style.show_weather
            && let Some(weather) = &self.data.weather
        {
            if let Some(current) = &weather.current {
                segments.push(Some(format!(
                    " {:.0}°C, {}",
                    current.temp,
                    capitalize(&current.description)
                )));
            }
            for day in &weather.forecast {
                segments.push(Some(format!(
                    "{SEPARATOR}{}: {:.0}°/{:.0}°",
                    day.day, day.max_temp, day.min_temp
                )));
            }
        }
        if self.data.postcards_today > 0 {
            segments.push(Some(SEPARATOR.to_string()));
            let marker = if font.glyph_id('✉').0 != 0 { "✉" } else { "*" };
            let visible = !attention || now.second() % 2 == 0;
            segments.push(if visible {
                Some(marker.to_string())
            } else {
                // Keeps the block width stable while blinking.
                None
            });
            segments.push(Some(format!(" {}", self.data.postcards_today)));
        }
        segments
    }

    fn tide_line(&self, now: DateTime<Local>) -> String {
        let labels = labels(&self.language);
        let Some(tides) = &self.data.tides else {
            return labels.unavailable.to_string();
        };
        let today = now.date_naive();
        let tomorrow = today.succ_opt().unwrap_or(today);
        let parts: Vec<String> = tides
            .iter()
            .filter_map(|tide| {
                let at = DateTime::parse_from_rfc3339(&tide.time)
                    .ok()?
                    .with_timezone(&Local);
                Some((at, tide))
            })
            .filter(|(at, _)| *at >= now)
            .take(4)
            .map(|(at, tide)| {
                let date = at.date_naive();
                let day = if date == today {
                    labels.today
                } else if date == tomorrow {
                    labels.tomorrow
                } else {
                    weekday_label(&self.language, at.weekday())
                };
                let kind = if tide.kind == "high" {
                    labels.high
                } else {
                    labels.low
                };
                format!("{day} {kind}: {}", at.format("%H:%M"))
            })
            .collect();
        if parts.is_empty() {
            labels.unavailable.to_string()
        } else {
            parts.join(" | ")
        }
    }

    fn render_patches(
        &self,
        font: &FontArc,
        width: u32,
        height: u32,
        top: Option<Vec<Option<String>>>,
        bottom: Option<String>,
    ) -> Vec<Patch> {
        let fill = parse_hex_color(&self.style.clock_color);
        let outline = parse_hex_color(&self.style.clock_outline_color);
        let scale = PxScale::from(self.style.clock_font_size.max(8) as f32);
        let metrics = line_metrics(font, scale);
        let line_h = metrics.height().ceil() as u32 + 2;
        let mut patches = Vec::new();

        if let Some(segments) = top {
            let widths: Vec<f32> = segments
                .iter()
                .map(|s| measure_text(s.as_deref().unwrap_or("✉"), font, scale))
                .collect();
            let total: f32 = widths.iter().sum();
            let total_i = total.ceil() as i64;
            let offset_x = i64::from(self.style.clock_offset_x);
            let block_x = match self.style.clock_position {
                ClockPosition::Left => offset_x,
                ClockPosition::Right => i64::from(width) - total_i + offset_x,
                ClockPosition::Center => (i64::from(width) - total_i) / 2 + offset_x,
            };
            let block_y = TOP_PADDING + i64::from(self.style.clock_offset_y);

            if self.style.clock_background_enabled {
                let band_h = line_h + 2 * BAND_PADDING as u32;
                let mut band = RgbaImage::new(width, band_h);
                let color = parse_hex_color_or(
                    &self.style.clock_background_color,
                    Rgba([0, 0, 0, 128]),
                );
                fill_rect(&mut band, 0, 0, width, band_h, color);
                patches.push(Patch {
                    x: 0,
                    y: block_y - BAND_PADDING,
                    image: band,
                });
            }

            let mut text = RgbaImage::new((total_i + 2).max(1) as u32, line_h);
            let mut cursor = 1.0f32;
            let baseline = 1.0 + metrics.ascent;
            for (segment, w) in segments.iter().zip(&widths) {
                if let Some(s) = segment {
                    draw_outlined_text(&mut text, font, s, fill, outline, cursor, baseline, scale);
                }
                cursor += w;
            }
            patches.push(Patch {
                x: block_x - 1,
                y: block_y - 1,
                image: text,
            });
        }

        if let Some(line) = bottom {
            let w = measure_text(&line, font, scale).ceil() as i64;
            let mut text = RgbaImage::new((w + 2).max(1) as u32, line_h);
            draw_outlined_text(
                &mut text,
                font,
                &line,
                fill,
                outline,
                1.0,
                1.0 + metrics.ascent,
                scale,
            );
            let x = (i64::from(width) - w) / 2 + i64::from(self.style.tide_offset_x);
            let bottom_edge = i64::from(height) - BOTTOM_PADDING + i64::from(self.style.tide_offset_y);
            patches.push(Patch {
                x: x - 1,
                y: bottom_edge - i64::from(line_h) + 1,
                image: text,
            });
        }
        debug!(patches = patches.len(), "overlay layer rendered");
        patches
    }
}

fn read_cache<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(path = %path.display(), "ignoring unreadable cache: {err}");
            None
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Count `*_postcard.jpg` files in `dir` whose arrival timestamp falls on `day`.
pub fn count_postcards_on(dir: &Path, source: &str, day: NaiveDate) -> usize {
    let Some(pattern) = fresh_timestamp_pattern(source) else {
        return 0;
    };
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|name| name.ends_with("_postcard.jpg"))
        .filter_map(|name| fresh_timestamp(&pattern, &name))
        .filter(|fresh| DateTime::<Local>::from(*fresh).date_naive() == day)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_time_pattern_falls_back() {
        let now = Local.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        assert_eq!(format_time(&now, "%H:%M", "%H:%M"), "07:08");
        assert_eq!(format_time(&now, "%Q", "%H:%M"), "07:08");
    }

    #[test]
    fn capitalizes_description() {
        assert_eq!(capitalize("ciel dégagé"), "Ciel dégagé");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn counts_only_todays_postcards() {
        let dir = tempfile::tempdir().unwrap();
        let now = Local::now();
        let today = now.timestamp();
        let yesterday = today - 86_400 * 2;
        for name in [
            format!("telegram_{today}_1_postcard.jpg"),
            format!("telegram_{today}_2_postcard.jpg"),
            format!("telegram_{today}_2.jpg"),
            format!("telegram_{yesterday}_3_postcard.jpg"),
        ] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        assert_eq!(count_postcards_on(dir.path(), "telegram", now.date_naive()), 2);
    }

    #[test]
    fn tides_fall_back_when_missing() {
        let cfg = Configuration::default();
        let overlay = Overlay::new(&cfg);
        assert_eq!(overlay.tide_line(Local::now()), "Données de marée non disponibles");
    }

    #[test]
    fn tide_line_labels_upcoming_events() {
        let cfg = Configuration::default();
        let mut overlay = Overlay::new(&cfg);
        let now = Local.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap();
        let at = |d: u32, h: u32| {
            Local
                .with_ymd_and_hms(2024, 5, d, h, 30, 0)
                .unwrap()
                .to_rfc3339()
        };
        overlay.data.tides = Some(vec![
            TideEvent { time: at(6, 9), kind: "high".into() },
            TideEvent { time: at(6, 15), kind: "low".into() },
            TideEvent { time: at(7, 3), kind: "high".into() },
        ]);
        assert_eq!(overlay.tide_line(now), "Auj. BM: 15:30 | Dem. PM: 03:30");
    }
}
