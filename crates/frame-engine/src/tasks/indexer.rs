use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use regex::Regex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{Configuration, SourcePolicy, Variant};
use crate::events::MediaKind;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv"];
const DERIVATIVE_SUFFIXES: &[&str] = &["_polaroid.jpg", "_postcard.jpg", "_thumbnail.jpg"];

/// One displayable asset found during an indexing pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub source: String,
    /// File name of the base (non-derivative) asset.
    pub base_name: String,
    pub kind: MediaKind,
    /// Concrete file to show, after applying the active filter.
    pub display_path: PathBuf,
    /// Reported instead of `display_path` for videos.
    pub thumbnail: Option<PathBuf>,
    pub favorite: bool,
    /// Arrival time encoded in the file name, for time-boosted sources.
    pub fresh: Option<SystemTime>,
}

impl MediaItem {
    /// `source/base_name`, the key used by filter states and favorites.
    pub fn key(&self) -> String {
        format!("{}/{}", self.source, self.base_name)
    }

    /// Path reported as "currently displayed".
    pub fn reported_path(&self) -> &Path {
        match self.kind {
            MediaKind::Video => self.thumbnail.as_deref().unwrap_or(&self.display_path),
            MediaKind::Image => &self.display_path,
        }
    }
}

/// Favorite markers, keyed by normalised `source/name`.
#[derive(Debug, Clone, Default)]
pub struct Favorites(HashSet<String>);

impl Favorites {
    pub fn load(path: &Path) -> Self {
        let entries: Vec<String> = read_json_or_default(path, "favorites");
        Self(entries.iter().map(|e| normalize_key(e)).collect())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(&normalize_key(key))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Favorites {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(|s| normalize_key(&s.into())).collect())
    }
}

/// Strip a `_polaroid`/`_postcard` variant marker so favorites are
/// variant-agnostic.
pub fn normalize_key(key: &str) -> String {
    for variant in [Variant::Polaroid, Variant::Postcard] {
        let marker = format!("{}.jpg", variant.suffix());
        if let Some(stem) = key.strip_suffix(&marker) {
            return format!("{stem}.jpg");
        }
    }
    key.to_string()
}

/// Per-item filter selection persisted by the web UI.
#[derive(Debug, Clone, Default)]
pub struct FilterStates(HashMap<String, String>);

impl FilterStates {
    pub fn load(path: &Path) -> Self {
        Self(read_json_or_default(path, "filter states"))
    }

    fn variant_for(&self, key: &str) -> Option<Variant> {
        match self.0.get(key).map(String::as_str) {
            Some("polaroid") => Some(Variant::Polaroid),
            Some("postcard") => Some(Variant::Postcard),
            _ => None,
        }
    }
}

impl FromIterator<(String, String)> for FilterStates {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn read_json_or_default<T>(path: &Path, what: &str) -> T
where
    T: serde::de::DeserializeOwned + Default,
{
    match std::fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!(path = %path.display(), "ignoring unparsable {what}: {err}");
            T::default()
        }),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => T::default(),
        Err(err) => {
            warn!(path = %path.display(), "failed to read {what}: {err}");
            T::default()
        }
    }
}

/// Enumerates prepared media for the enabled sources.
pub struct MediaIndexer<'a> {
    config: &'a Configuration,
    filters: FilterStates,
    favorites: Favorites,
}

impl<'a> MediaIndexer<'a> {
    pub fn new(config: &'a Configuration, filters: FilterStates, favorites: Favorites) -> Self {
        Self {
            config,
            filters,
            favorites,
        }
    }

    /// Read filter states and favorites from their configured locations.
    pub fn from_disk(config: &'a Configuration) -> Self {
        Self::new(
            config,
            FilterStates::load(&config.filter_states_path),
            Favorites::load(&config.favorites_path),
        )
    }

    /// Items of every source in `sources`, in source order then file-name order.
    pub fn index(&self, sources: &[String]) -> Vec<MediaItem> {
        let mut items = Vec::new();
        for source in sources {
            let found = self.index_source(source);
            debug!(source = %source, items = found.len(), "source indexed");
            items.extend(found);
        }
        info!(sources = sources.len(), items = items.len(), "media indexed");
        items
    }

    fn index_source(&self, source: &str) -> Vec<MediaItem> {
        let dir = self.config.prepared_dir.join(source);
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "source directory missing; nothing to index");
            return Vec::new();
        }
        let policy = self.config.policy_for(source);
        let fresh_pattern = policy
            .time_boosted
            .then(|| fresh_timestamp_pattern(source))
            .flatten();

        WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!("skipping unreadable entry under {}: {err}", dir.display());
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_string();
                let kind = classify(&name)?;
                Some(self.item(source, &policy, fresh_pattern.as_ref(), entry.path(), name, kind))
            })
            .collect()
    }

    fn item(
        &self,
        source: &str,
        policy: &SourcePolicy,
        fresh_pattern: Option<&Regex>,
        path: &Path,
        base_name: String,
        kind: MediaKind,
    ) -> MediaItem {
        let key = format!("{source}/{base_name}");
        let (display_path, thumbnail) = match kind {
            MediaKind::Image => {
                let variant = self
                    .filters
                    .variant_for(&key)
                    .or(policy.default_variant);
                (resolve_variant(path, variant), None)
            }
            MediaKind::Video => (path.to_path_buf(), video_thumbnail(path)),
        };
        MediaItem {
            source: source.to_string(),
            favorite: self.favorites.contains(&key),
            fresh: fresh_pattern.and_then(|re| fresh_timestamp(re, &base_name)),
            base_name,
            kind,
            display_path,
            thumbnail,
        }
    }
}

/// Media kind of a base item, or `None` for derivatives, hidden files and
/// unsupported extensions.
fn classify(name: &str) -> Option<MediaKind> {
    if name.starts_with('.') {
        return None;
    }
    let lower = name.to_ascii_lowercase();
    if DERIVATIVE_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
        debug!(name, "skipping derivative");
        return None;
    }
    let ext = Path::new(&lower).extension()?.to_str()?.to_string();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

/// Kind inferred from an arbitrary path's extension; unknown is an image.
pub fn kind_of(path: &Path) -> MediaKind {
    let is_video = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    if is_video {
        MediaKind::Video
    } else {
        MediaKind::Image
    }
}

fn resolve_variant(base: &Path, variant: Option<Variant>) -> PathBuf {
    if let Some(variant) = variant {
        let derivative = sibling(base, &format!("{}.jpg", variant.suffix()));
        if derivative.is_file() {
            return derivative;
        }
    }
    base.to_path_buf()
}

/// `<stem>_thumbnail.jpg` next to a video, when the preparation step made one.
pub(crate) fn video_thumbnail(video: &Path) -> Option<PathBuf> {
    let thumb = sibling(video, "_thumbnail.jpg");
    thumb.is_file().then_some(thumb)
}

fn sibling(base: &Path, suffix: &str) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    base.with_file_name(format!("{stem}{suffix}"))
}

pub(crate) fn fresh_timestamp_pattern(source: &str) -> Option<Regex> {
    Regex::new(&format!(r"{}_(\d+)_", regex::escape(source))).ok()
}

pub(crate) fn fresh_timestamp(pattern: &Regex, name: &str) -> Option<SystemTime> {
    let secs: u64 = pattern.captures(name)?.get(1)?.as_str().parse().ok()?;
    UNIX_EPOCH.checked_add(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn classify_skips_derivatives_and_hidden() {
        assert_eq!(classify("a.JPG"), Some(MediaKind::Image));
        assert_eq!(classify("clip.mp4"), Some(MediaKind::Video));
        assert_eq!(classify("a_polaroid.jpg"), None);
        assert_eq!(classify("clip_thumbnail.jpg"), None);
        assert_eq!(classify(".hidden.jpg"), None);
        assert_eq!(classify("notes.txt"), None);
    }

    #[test]
    fn normalize_strips_variant_marker() {
        assert_eq!(normalize_key("immich/a_postcard.jpg"), "immich/a.jpg");
        assert_eq!(normalize_key("immich/a_polaroid.jpg"), "immich/a.jpg");
        assert_eq!(normalize_key("immich/a.png"), "immich/a.png");
    }

    #[test]
    fn fresh_timestamp_parses_source_prefix() {
        let re = fresh_timestamp_pattern("telegram").unwrap();
        assert_eq!(
            fresh_timestamp(&re, "telegram_1700000000_42.jpg"),
            Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
        );
        assert_eq!(fresh_timestamp(&re, "photo.jpg"), None);
    }

    #[test]
    fn video_reports_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Configuration {
            prepared_dir: dir.path().to_path_buf(),
            ..Configuration::default()
        };
        let src = dir.path().join("immich");
        fs::create_dir_all(&src).unwrap();
        touch(&src, "clip.mp4");
        touch(&src, "clip_thumbnail.jpg");
        let indexer = MediaIndexer::new(&cfg, FilterStates::default(), Favorites::default());
        let items = indexer.index(&["immich".to_string()]);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, MediaKind::Video);
        assert_eq!(items[0].display_path, src.join("clip.mp4"));
        assert_eq!(items[0].reported_path(), src.join("clip_thumbnail.jpg"));
    }

    #[test]
    fn kind_of_uses_extension() {
        assert_eq!(kind_of(Path::new("x/y.MKV")), MediaKind::Video);
        assert_eq!(kind_of(Path::new("x/y.jpg")), MediaKind::Image);
        assert_eq!(kind_of(Path::new("x/y")), MediaKind::Image);
    }
}
